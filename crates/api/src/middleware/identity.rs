//! Caller identity extractors.
//!
//! Authentication happens at the upstream gateway; requests arrive with
//! `x-user-id` and `x-user-role` headers already verified. Each extractor
//! wraps [`Identity`] and rejects requests whose role does not meet the
//! minimum requirement, enforcing authorization at the type level.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use centime_core::error::CoreError;
use centime_core::roles::{ROLE_ADMIN, ROLE_SERVICE, ROLE_USER};
use centime_core::types::UserId;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller: a user id and a role.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: UserId,
    pub role: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Services and admins may act on any user's wallet.
    pub fn is_service(&self) -> bool {
        self.role == ROLE_SERVICE || self.role == ROLE_ADMIN
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<UserId>().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing or invalid x-user-id header".into(),
                ))
            })?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(ROLE_USER)
            .to_string();

        Ok(Identity { user_id, role })
    }
}

/// Requires the `admin` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn admin_only(RequireAdmin(caller): RequireAdmin) -> AppResult<Json<()>> {
///     // caller is guaranteed to be an admin here
///     Ok(Json(()))
/// }
/// ```
pub struct RequireAdmin(pub Identity);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = Identity::from_request_parts(parts, state).await?;
        if !caller.is_admin() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(caller))
    }
}

/// Requires `service` or `admin` role: the trusted internal callers that
/// perform ledger operations on behalf of users.
pub struct RequireService(pub Identity);

impl FromRequestParts<AppState> for RequireService {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = Identity::from_request_parts(parts, state).await?;
        if !caller.is_service() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Service or Admin role required".into(),
            )));
        }
        Ok(RequireService(caller))
    }
}
