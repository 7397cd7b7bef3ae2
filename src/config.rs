use crate::Result;
use std::path::PathBuf;

/// 置信度阈值（固定策略，不可按请求修改）
pub const CONFIDENCE_THRESHOLD: f32 = 0.025;

/// NMS 的 IoU 阈值（固定策略，不可按请求修改）
pub const IOU_THRESHOLD: f32 = 0.2;

/// YOLOv8 导出的默认输入边长
pub const DEFAULT_INPUT_SIZE: usize = 640;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 资源根目录（Uploads / Results / Dataset.csv）
    pub assets_dir: PathBuf,

    /// 检测模型文件路径
    pub model_path: PathBuf,

    /// 可选的类别名称文件（每行一个）
    pub labels_path: Option<PathBuf>,

    /// 启动后是否打开浏览器
    pub open_browser: bool,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 检测阈值
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,

    /// 模型输入边长
    pub input_size: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DetectionConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: CONFIDENCE_THRESHOLD,
            iou_threshold: IOU_THRESHOLD,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        assets_dir: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        labels_path: Option<PathBuf>,
        open_browser: bool,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
            input_size: DEFAULT_INPUT_SIZE,
        };

        let server_config = ServerConfig {
            max_request_size: 50 * 1024 * 1024, // 50MB
        };

        let assets_dir = assets_dir.into();
        if assets_dir.as_os_str().is_empty() {
            return Err(crate::DetectError::Config(
                "Assets directory must not be empty".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            assets_dir,
            model_path: model_path.into(),
            labels_path,
            open_browser,
            dev_mode,
            onnx_config,
            server_config,
            detection: DetectionConfig::default(),
        })
    }

    /// 上传文件目录
    pub fn uploads_dir(&self) -> PathBuf {
        self.assets_dir.join("Uploads")
    }

    /// 结果图像目录
    pub fn results_dir(&self) -> PathBuf {
        self.assets_dir.join("Results")
    }

    /// 历史记录CSV路径
    pub fn dataset_csv_path(&self) -> PathBuf {
        self.assets_dir.join("Dataset.csv")
    }

    /// 浏览器打开的本地地址，端口取自绑定地址
    pub fn local_url(&self) -> String {
        let port = self
            .bind_addr
            .rsplit(':')
            .next()
            .filter(|p| !p.is_empty())
            .unwrap_or("5000");
        format!("http://localhost:{}", port)
    }
}
