//! HRDesk API Gateway
//!
//! HTTP boundary for the two question-answering pipelines:
//! - Policy questions answered from the indexed PDF handbook
//! - Analytic questions answered from the employee dataset
//! - Read-only dataset views
//! - Health, readiness and Prometheus metrics

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use hrdesk_common::{
    assistant::Assistant,
    config::AppConfig,
    metrics::{self, EMBEDDING_BUCKETS, METRICS_PREFIX, QUERY_BUCKETS},
    telemetry::init_tracing,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub assistant: Arc<Assistant>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!("Starting HRDesk API Gateway v{}", hrdesk_common::VERSION);

    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port > 0 {
        install_metrics_exporter(&config)?;
    }

    // Load the index and dataset; a missing one only disables its pipeline
    let assistant = Arc::new(Assistant::from_config(&config)?);
    let status = assistant.status();
    info!(
        policy_ready = status.policy_ready,
        index_entries = ?status.index_entries,
        data_ready = status.data_ready,
        table_rows = ?status.table_rows,
        "Assistant initialised"
    );

    let state = AppState {
        config: config.clone(),
        assistant,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Serve Prometheus metrics on their own port
fn install_metrics_exporter(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!(
        "{}:{}",
        config.server.host, config.observability.metrics_port
    )
    .parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_query_duration_seconds", METRICS_PREFIX)),
            QUERY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_engine_duration_seconds", METRICS_PREFIX)),
            QUERY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_embedding_duration_seconds", METRICS_PREFIX)),
            EMBEDDING_BUCKETS,
        )?
        .install()?;

    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/policy/ask", post(handlers::policy::ask_policy))
        .route("/data/ask", post(handlers::data::ask_data))
        .route("/data/views/{view}", get(handlers::data::get_view));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout()))
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

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use hrdesk_common::assistant::DataPipeline;
    use hrdesk_common::errors::{AppError, Result as AppResult};
    use hrdesk_common::llm::{GenerationOptions, ReasoningEngine};
    use hrdesk_common::tabular::{NlQueryTranslator, Sandbox, Table};
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedEngine(&'static str);

    #[async_trait]
    impl ReasoningEngine for FixedEngine {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> AppResult<String> {
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn app(reply: &'static str) -> Router {
        let table = Table::from_reader(
            "Name,Department,Salary\nAda,Eng,100\nGrace,Eng,200\nLinus,HR,150\n".as_bytes(),
        )
        .unwrap();
        let data = DataPipeline::new(
            Arc::new(table),
            NlQueryTranslator::new(
                Arc::new(FixedEngine(reply)),
                GenerationOptions::default(),
                Sandbox::new(Duration::from_secs(1), 1000),
                5,
            ),
        );
        let policy = Err(AppError::IndexNotFound {
            path: "data/index".to_string(),
            reason: "manifest.json unreadable".to_string(),
        });

        create_router(AppState {
            config: Arc::new(AppConfig::default()),
            assistant: Arc::new(Assistant::new(policy, Ok(data))),
        })
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = call(app("{}"), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_missing_index() {
        let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
        let (status, body) = call(app("{}"), request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["data_ready"], true);
        assert_eq!(body["checks"]["table_rows"], 3);
    }

    #[tokio::test]
    async fn test_ask_data() {
        let app = app(r#"{"group_by": "Department", "operation": {"op": "mean", "column": "Salary"}}"#);
        let (status, body) = call(
            app,
            post_json("/v1/data/ask", serde_json::json!({"question": "average salary by department"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["answer"],
            "Mean of Salary by Department:\n- Eng: 150\n- HR: 150"
        );
    }

    #[tokio::test]
    async fn test_unsafe_translation_is_422() {
        let app = app("open('/etc/passwd').read()");
        let (status, body) = call(
            app,
            post_json("/v1/data/ask", serde_json::json!({"question": "show secrets"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "TRANSLATION_FAILED");
    }

    #[tokio::test]
    async fn test_policy_without_index_is_unavailable() {
        let (status, _) = call(
            app("{}"),
            post_json("/v1/policy/ask", serde_json::json!({"question": "remote work policy"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let (status, _) = call(
            app("{}"),
            post_json("/v1/data/ask", serde_json::json!({"question": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_views() {
        let request = Request::builder()
            .uri("/v1/data/views/departments")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app("{}"), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"][0], serde_json::json!(["Eng", 2.0]));

        let request = Request::builder()
            .uri("/v1/data/views/payroll")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app("{}"), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
