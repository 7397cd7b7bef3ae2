pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod ui;

use crate::{
    detect::DetectionPipeline,
    models::{ObjectDetector, YoloDetector},
    utils::error::DetectError,
    Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<DetectionPipeline>,
}

impl AppState {
    pub fn new(config: Config, pipeline: DetectionPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    // 启动时加载模型
    let detector: Arc<dyn ObjectDetector> = Arc::new(YoloDetector::new(&config)?);
    let pipeline = DetectionPipeline::from_config(&config, detector)?;
    let state = AppState::new(config.clone(), pipeline);

    // 构建应用路由
    let app = create_app(state);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        DetectError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /detect    - Multipart upload (field: image_file)");
    tracing::info!("  GET  /          - Web UI");
    tracing::info!("  GET  /history   - Detection history");
    tracing::info!("  GET  /health    - Health check");
    tracing::info!("  GET  /api/info  - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        DetectError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    if config.open_browser {
        open_browser(&config.local_url());
    }

    axum::serve(listener, app)
        .await
        .map_err(|e| DetectError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.config.server_config.max_request_size;
    Router::new()
        // 检测API路由
        .route("/detect", post(handlers::detect_handler))
        .route("/history", get(handlers::history_handler))
        // Web UI路由
        .route("/", get(ui::index_handler))
        // 系统路由
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        // 中间件
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 打开本地浏览器，失败只记录警告
fn open_browser(url: &str) {
    match open::that_detached(url) {
        Ok(()) => tracing::info!("Opened browser at {}", url),
        Err(e) => tracing::warn!("Failed to open browser at {}: {}", url, e),
    }
}

/// 健康检查端点
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pipeline = &state.pipeline;
    Json(json!({
        "service": "Object Detection Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "dev_mode": state.config.dev_mode,
        "model": pipeline.detector().info(),
        "thresholds": pipeline.thresholds(),
        "storage": {
            "uploads": pipeline.uploads().uploads_dir().display().to_string(),
            "results": pipeline.uploads().results_dir().display().to_string(),
            "history": pipeline.history().path().display().to_string(),
        }
    }))
}
