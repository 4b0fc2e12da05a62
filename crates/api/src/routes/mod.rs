//! Route definitions.

pub mod alerts;
pub mod health;
pub mod ledger;
pub mod pricing;
pub mod transactions;
pub mod wallets;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ledger/credit                        credit (service)
/// /ledger/debit                         debit (service)
/// /ledger/holds                         place hold (service)
/// /ledger/holds/{ref_id}/release        release hold (service)
/// /ledger/refund                        refund (admin)
/// /ledger/adjust                        adjust (admin)
///
/// /wallets/{user_id}                    wallet row (admin)
/// /wallets/{user_id}/balance            balance snapshot (self/service)
/// /wallets/{user_id}/credit-limit       set credit limit (admin, PUT)
/// /wallets/{user_id}/rebuild-check      log-replay audit (admin)
///
/// /transactions                         filtered, cursor-paginated (admin)
///
/// /pricing/resolve                      price at an instant (authed)
/// /pricing/quote                        cost for a usage pair (authed)
/// /admin/pricing                        list, create (admin)
/// /admin/pricing/{id}                   update (admin, PUT)
/// /admin/pricing/{id}/retire            retire (admin, POST)
///
/// /admin/alerts                         list (admin)
/// /admin/alerts/{id}/ack                acknowledge (admin, POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/ledger", ledger::router())
        .nest("/wallets", wallets::router())
        .nest("/transactions", transactions::router())
        .nest("/pricing", pricing::router())
        .nest("/admin/pricing", pricing::admin_router())
        .nest("/admin/alerts", alerts::router())
}
