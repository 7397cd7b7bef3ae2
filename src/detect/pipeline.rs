use crate::{
    config::DetectionConfig,
    detect::{DetectionRecord, DetectionResponse},
    image::{draw_boxes, ImageLoader},
    models::ObjectDetector,
    storage::{HistoryLog, HistoryRow, UploadStore},
    Config, Result,
};
use image::{DynamicImage, GenericImageView};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// 一次检测请求的完整结果
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub id: u64,
    pub upload_path: PathBuf,
    pub result_path: PathBuf,
    pub response: DetectionResponse,
}

/// 检测流水线：编号、保存上传、推理、画框、保存结果、记录历史
pub struct DetectionPipeline {
    detector: Arc<dyn ObjectDetector>,
    uploads: UploadStore,
    history: HistoryLog,
    thresholds: DetectionConfig,
}

impl DetectionPipeline {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        uploads: UploadStore,
        history: HistoryLog,
        thresholds: DetectionConfig,
    ) -> Self {
        Self {
            detector,
            uploads,
            history,
            thresholds,
        }
    }

    /// 按配置创建存储目录并组装流水线
    pub fn from_config(config: &Config, detector: Arc<dyn ObjectDetector>) -> Result<Self> {
        let uploads = UploadStore::open(config.uploads_dir(), config.results_dir())?;
        let history = HistoryLog::open(config.dataset_csv_path())?;
        Ok(Self::new(detector, uploads, history, config.detection))
    }

    pub fn detector(&self) -> &Arc<dyn ObjectDetector> {
        &self.detector
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn thresholds(&self) -> DetectionConfig {
        self.thresholds
    }

    /// 处理一张上传图像。
    ///
    /// 任一步骤失败即返回错误，已写入的文件不会被清理。
    pub fn process(&self, bytes: &[u8]) -> Result<DetectionOutcome> {
        let start_time = Instant::now();

        let id = self.uploads.next_id()?;
        let upload_path = self.uploads.save_upload(id, bytes)?;

        let image = ImageLoader::from_bytes(bytes)?;
        let boxes = self.detect(&image)?;

        let annotated = DynamicImage::ImageRgb8(draw_boxes(&image, &boxes));
        let result_path = self.uploads.save_result(id, &annotated)?;

        let response = DetectionResponse::new(boxes);
        self.history.append(&HistoryRow::new(
            &upload_path,
            &result_path,
            response.count,
            chrono::Local::now(),
        ))?;

        tracing::info!(
            "Detection completed: id={}, objects={}, time={:.3}s",
            id,
            response.count,
            start_time.elapsed().as_secs_f32()
        );

        Ok(DetectionOutcome {
            id,
            upload_path,
            result_path,
            response,
        })
    }

    /// 以固定阈值调用模型，并转换为检测记录
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<DetectionRecord>> {
        let (width, height) = image.dimensions();
        let raw = self.detector.predict(
            image,
            self.thresholds.confidence_threshold,
            self.thresholds.iou_threshold,
        )?;

        Ok(raw
            .iter()
            .map(|d| DetectionRecord::from_raw(d, self.detector.label(d.class_id), width, height))
            .collect())
    }
}
