use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod models;
mod services;
mod store;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};

#[cfg(test)]
mod tests;

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub stores: store::Stores,
    pub engine: Arc<workflows::WorkflowEngine>,
    pub triggers: Arc<workflows::TriggerHandler>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let encryption = Arc::new(
        services::encryption::EncryptionService::new(&config.encryption_key)
            .map_err(|e| anyhow::anyhow!("encryption setup failed: {}", e))?,
    );
    let stores = store::postgres::postgres_stores(db_pool.clone(), encryption);

    let mailer: Arc<dyn services::email::Mailer> = if config.smtp.is_configured() {
        Arc::new(services::email::SmtpMailer::new(&config.smtp)?)
    } else {
        Arc::new(services::email::LogMailer)
    };

    let executor = workflows::ActionExecutor::new(stores.clone(), mailer);
    let engine = Arc::new(workflows::WorkflowEngine::new(stores.clone(), executor));
    let triggers = Arc::new(workflows::TriggerHandler::new(stores.clone(), engine.clone()));

    let scheduler = jobs::JobScheduler::new(
        stores.clone(),
        engine.clone(),
        triggers.clone(),
        config.jobs.clone(),
    )
    .await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState {
        db_pool,
        stores,
        engine,
        triggers,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Meridian Workflow Engine v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .nest("/api/v1/triggers", handlers::trigger_routes())
        .nest("/api/v1/executions", handlers::execution_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    info!("Listening on {}", config.server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
