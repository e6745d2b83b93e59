use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ghostpirates_orchestrator::api::{self, AppState};
use ghostpirates_orchestrator::config::Config;
use ghostpirates_orchestrator::infrastructure::completion::AnthropicClient;
use ghostpirates_orchestrator::infrastructure::Repositories;
use ghostpirates_orchestrator::orchestration::OrchestrationServices;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ghostpirates_orchestrator=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database connected successfully");

    let completion = AnthropicClient::new(
        config.anthropic_api_key.clone(),
        config.anthropic_model.clone(),
        config.completion_timeout,
    )?;
    let services = OrchestrationServices::build(Repositories::postgres(pool), Arc::new(completion), config.engine.clone());
    let app = api::router(AppState::new(services, config.jwt_secret.as_str()));

    // Start server
    tracing::info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
