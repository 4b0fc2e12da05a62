use centime_worker::{GuardrailSweep, SweepConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "centime_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = centime_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    centime_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let config = SweepConfig::from_env();
    let cancel = CancellationToken::new();

    let sweep = GuardrailSweep::new(pool, config);
    let sweep_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        sweep.run(sweep_cancel).await;
    });

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl-C handler");
    tracing::info!("Received SIGINT, shutting down");

    cancel.cancel();
    let _ = handle.await;
    tracing::info!("Guardrail sweep stopped");
}
