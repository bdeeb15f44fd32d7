//! Tutorgrade API Gateway
//!
//! The HTTP entry point of the grading service.
//! Handles:
//! - Submission parsing (multipart, JSON, url-encoded)
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tutorgrade_common::{
    auth::TokenSource,
    config::{AppConfig, ObservabilityConfig},
    llm::VertexGemini,
    metrics,
    ocr::VisionOcr,
    storage::GcsStore,
    GradingPipeline,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<GradingPipeline>,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting Tutorgrade API Gateway v{}",
        tutorgrade_common::VERSION
    );

    let missing = config.missing_gcp_settings();
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "Google Cloud settings incomplete, grading requests will fail");
    }

    // Initialize metrics
    let metrics_handle = install_metrics_recorder()?;
    metrics::register_metrics();

    let config = Arc::new(config);
    let pipeline = Arc::new(build_pipeline(&config)?);

    // Create app state
    let state = AppState {
        config: config.clone(),
        pipeline,
        metrics: Some(metrics_handle),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Log filter from `RUST_LOG` when set, else from configuration
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::GRADING_BUCKETS,
        )?
        .install_recorder()?;
    Ok(handle)
}

/// Create the cloud clients once and bundle them into the pipeline
fn build_pipeline(config: &AppConfig) -> anyhow::Result<GradingPipeline> {
    let gcp = &config.gcp;

    let http = reqwest::Client::builder()
        .timeout(gcp.http_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let tokens = Arc::new(TokenSource::from_config(http.clone(), gcp.access_token.clone()));

    let ocr = VisionOcr::new(
        http.clone(),
        tokens.clone(),
        gcp.vision_endpoint.clone(),
        gcp.project_id.clone(),
    );
    let store = GcsStore::new(http.clone(), tokens.clone(), gcp.storage_endpoint.clone());
    let model = VertexGemini::new(
        http,
        tokens,
        &gcp.vertex_base_url(),
        &gcp.project_id,
        &gcp.location,
        gcp.model_name.clone(),
    );

    info!(
        project = %gcp.project_id,
        location = %gcp.location,
        model = %gcp.model_name,
        bucket = %gcp.prompt_bucket,
        "Cloud clients initialized"
    );

    Ok(GradingPipeline::new(
        Arc::new(ocr),
        Arc::new(store),
        Arc::new(model),
        config,
    ))
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut api_routes = Router::new().route("/grade", post(handlers::grade::grade));

    if config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        api_routes = api_routes.route_layer(from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit,
        ));
    }

    // Compose the app
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .nest("/api", api_routes)
        .route_layer(from_fn(middleware::metrics::track_metrics))
        .layer(DefaultBodyLimit::max(config.server.body_limit_mb * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
