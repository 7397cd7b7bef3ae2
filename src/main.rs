use anyhow::Result;
use clap::Parser;
use object_detector::{config::Config, web::serve};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "object-detector")]
#[command(about = "ONNX-powered object detection service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Directory holding Uploads/, Results/ and Dataset.csv
    #[arg(long, default_value = "Assets")]
    assets_dir: PathBuf,

    /// Detection model path
    #[arg(long, default_value = "StitchDetection.onnx")]
    model: PathBuf,

    /// Optional class names file, one per line
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Do not open a browser on startup
    #[arg(long)]
    no_browser: bool,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting object detection service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Assets directory: {}", args.assets_dir.display());
    tracing::info!("Model: {}", args.model.display());

    // 创建配置
    let config = Config::new(
        args.bind,
        args.assets_dir,
        args.model,
        args.labels,
        !args.no_browser,
        args.dev,
    )?;

    // 启动服务器
    serve(config).await?;

    Ok(())
}
