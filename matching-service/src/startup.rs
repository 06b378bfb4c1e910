//! Application startup and lifecycle management.

use crate::config::MatchingConfig;
use crate::engine::MatchingEngine;
use crate::handlers;
use crate::services::extraction::gemini::{GeminiConfig, GeminiExtractionProvider};
use crate::services::extraction::mock::MockExtractionProvider;
use crate::services::extraction::ExtractionProvider;
use crate::services::store::LedgerStore;
use crate::services::{Database, get_metrics, init_metrics};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: MatchingConfig,
    pub db: Arc<Database>,
    pub store: Arc<dyn LedgerStore>,
    pub engine: Arc<MatchingEngine>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "matching-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "matching-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

fn build_extractor(config: &MatchingConfig) -> Result<Arc<dyn ExtractionProvider>, AppError> {
    match config.extraction.provider.as_str() {
        "gemini" => {
            let api_key = config.extraction.gemini_api_key.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "GEMINI_API_KEY is required when EXTRACTION_PROVIDER=gemini"
                ))
            })?;
            let provider = GeminiExtractionProvider::new(GeminiConfig {
                api_key,
                model: config.extraction.gemini_model.clone(),
            })
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{}", e)))?;
            Ok(Arc::new(provider))
        }
        _ => Ok(Arc::new(MockExtractionProvider::new(true))),
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: MatchingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: MatchingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: MatchingConfig, run_migrations: bool) -> Result<Self, AppError> {
        // Initialize metrics
        init_metrics();

        // Connect to database
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let store: Arc<dyn LedgerStore> = db.clone();
        let extractor = build_extractor(&config)?;
        let engine = Arc::new(MatchingEngine::new(store.clone(), extractor));

        let state = AppState {
            config: config.clone(),
            db,
            store,
            engine,
        };

        let addr: SocketAddr = format!("{}:{}", config.common.host, config.common.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid bind address: {}", e)))?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Matching service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Build the HTTP router.
    fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route(
                "/organizations/:org_id/rules/load",
                post(handlers::load_rules),
            )
            .route("/organizations/:org_id/rules", get(handlers::list_rules))
            .route("/organizations/:org_id/stats", get(handlers::get_stats))
            .route(
                "/transactions/:transaction_id/reconcile",
                post(handlers::reconcile_transaction),
            )
            .route(
                "/transactions/:transaction_id/matches",
                get(handlers::list_matches).post(handlers::create_suggestion),
            )
            .route(
                "/transactions/:transaction_id/ignore",
                post(handlers::ignore_transaction),
            )
            .route(
                "/transactions/:transaction_id/extract",
                post(handlers::extract_transaction),
            )
            .route(
                "/statements/:statement_id/reconcile",
                post(handlers::reconcile_statement),
            )
            .route("/matches/:match_id/accept", post(handlers::accept_match))
            .route("/matches/:match_id/reject", post(handlers::reject_match))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state)
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Self::router(self.state.clone());

        tracing::info!(
            service = "matching-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
