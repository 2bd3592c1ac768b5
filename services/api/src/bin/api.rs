//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiSuggestionAdapter},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use classroom_core::{
    authoring::AuthoringService,
    performance::PerformanceService,
    ports::{CatalogStore, LedgerStore, RosterStore, SessionStore, SuggestionService},
    ranking::LinearScanRanking,
    submission::SubmissionService,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let catalog: Arc<dyn CatalogStore> = db_adapter.clone();
    let ledger: Arc<dyn LedgerStore> = db_adapter.clone();
    let roster: Arc<dyn RosterStore> = db_adapter.clone();
    let sessions: Arc<dyn SessionStore> = db_adapter;

    let suggestions: Option<Arc<dyn SuggestionService>> = match &config.suggestions {
        Some(settings) => {
            info!(model = %settings.model, "Reinforcement suggestions enabled");
            Some(Arc::new(OpenAiSuggestionAdapter::from_config(settings)))
        }
        None => {
            warn!("No suggestion API key configured; reinforcement suggestions are disabled");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let ranking = Arc::new(LinearScanRanking::new(
        catalog.clone(),
        ledger.clone(),
        roster.clone(),
    ));
    let app_state = Arc::new(AppState {
        sessions,
        submissions: Arc::new(SubmissionService::new(
            catalog.clone(),
            ledger.clone(),
            roster.clone(),
        )),
        authoring: Arc::new(AuthoringService::new(
            catalog.clone(),
            ledger.clone(),
            roster.clone(),
        )),
        performance: Arc::new(PerformanceService::new(
            catalog,
            ledger,
            roster,
            ranking,
            suggestions,
        )),
    });

    // --- 5. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
