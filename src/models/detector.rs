use crate::detect::RawDetection;
use crate::image::{decode_yolo_output, non_max_suppression, DecodeParams, ImagePreprocessor};
use crate::utils::error::DetectError;
use crate::{Config, Result};
use image::{DynamicImage, GenericImageView};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{Value, ValueType},
};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;

/// 目标检测模型（黑盒）
pub trait ObjectDetector: Send + Sync {
    /// 返回原图像素坐标下、已经过 NMS 的检测框
    fn predict(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<RawDetection>>;

    /// 类别名称
    fn label(&self, class_id: usize) -> String;

    fn info(&self) -> ModelInfo;
}

/// 模型信息
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub input_size: usize,
    pub classes: Vec<String>,
}

/// 基于 ONNX Runtime 的 YOLOv8 检测器
pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,
    input_size: usize,
    labels: Vec<String>,
    name: String,
}

impl YoloDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = &config.model_path;

        if !model_path.exists() {
            return Err(DetectError::ModelLoad(format!(
                "Detection model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading detection model from: {}", model_path.display());

        let session = Session::builder()
            .map_err(model_load)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_load)?
            .with_intra_threads(config.onnx_config.intra_threads)
            .map_err(model_load)?
            .commit_from_file(model_path)
            .map_err(model_load)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| DetectError::ModelLoad("Detection model has no inputs".to_string()))?;
        let input_name = input.name.clone();
        let dims: Vec<i64> = match &input.input_type {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
            _ => Vec::new(),
        };
        let input_size = input_size_from_dims(&dims, config.onnx_config.input_size);
        tracing::info!("Detection model input '{}' {:?}, using {}x{}", input_name, dims, input_size, input_size);

        if session.outputs.is_empty() {
            return Err(DetectError::ModelLoad("Detection model has no outputs".to_string()));
        }
        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Detection output[{}]: '{}'", i, output.name);
        }

        let labels = match &config.labels_path {
            Some(path) => load_labels_file(path)?,
            None => session
                .metadata()
                .ok()
                .and_then(|meta| meta.custom("names").ok().flatten())
                .map(|names| parse_names_metadata(&names))
                .unwrap_or_default(),
        };

        if labels.is_empty() {
            tracing::warn!("No class names found, falling back to numeric labels");
        } else {
            tracing::info!("Detection model classes: {:?}", labels);
        }

        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "detector".to_string());

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_size,
            labels,
            name,
        })
    }
}

impl ObjectDetector for YoloDetector {
    fn predict(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        let (width, height) = image.dimensions();
        let (input, letterbox) = ImagePreprocessor::letterbox(image, self.input_size);
        let input_value = Value::from_array(input)?;

        // 推理 - 立即提取数据避免生命周期冲突
        let prediction = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![self.input_name.as_str() => input_value])?;
            outputs[0].try_extract_array::<f32>()?.into_owned()
        };

        let params = DecodeParams {
            confidence_threshold,
            num_classes: self.labels.len(),
            letterbox,
            image_width: width,
            image_height: height,
        };
        let candidates = decode_yolo_output(&prediction.view(), &params)?;
        let detections = non_max_suppression(candidates, iou_threshold);

        tracing::info!("Detected {} objects", detections.len());
        Ok(detections)
    }

    fn label(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.name.clone(),
            input_size: self.input_size,
            classes: self.labels.clone(),
        }
    }
}

/// 从声明的 NCHW 输入形状取边长；动态维度（<= 0）或非方形输入时使用 `fallback`
pub fn input_size_from_dims(dims: &[i64], fallback: usize) -> usize {
    match dims {
        [_, _, h, w] if *h > 0 && h == w => *h as usize,
        _ => fallback,
    }
}

fn model_load(err: impl std::fmt::Display) -> DetectError {
    DetectError::ModelLoad(err.to_string())
}

/// 读取类别文件，每行一个名称
pub fn load_labels_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        DetectError::ModelLoad(format!("Failed to read labels {}: {}", path.display(), e))
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// 解析 Ultralytics 导出时写入的 `names` 元数据，
/// 形如 `{0: 'stitch', 1: 'gap'}`，按类别编号排序
pub fn parse_names_metadata(raw: &str) -> Vec<String> {
    let body = raw.trim().trim_start_matches('{').trim_end_matches('}');

    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut rest = body;
    while let Some(colon) = rest.find(':') {
        let id = rest[..colon].trim().trim_start_matches(',').trim();
        let after = rest[colon + 1..].trim_start();

        let quote = match after.chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => break,
        };
        let Some(end) = after[1..].find(quote) else {
            break;
        };
        let name = &after[1..end + 1];

        if let Ok(id) = id.parse::<usize>() {
            entries.push((id, name.to_string()));
        }
        rest = &after[end + 2..];
    }

    entries.sort_by_key(|(id, _)| *id);
    entries.into_iter().map(|(_, name)| name).collect()
}
