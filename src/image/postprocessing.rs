use crate::detect::RawDetection;
use crate::image::preprocessing::Letterbox;
use crate::utils::error::DetectError;
use crate::Result;
use ndarray::{ArrayView2, ArrayViewD, Axis};
use std::cmp::Ordering;

/// NMS 之后最多保留的检测数量
pub const MAX_DETECTIONS: usize = 300;

/// 输出张量的解码参数
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    /// 已知的类别名数量，0 表示未知
    pub num_classes: usize,
    pub letterbox: Letterbox,
    pub image_width: u32,
    pub image_height: u32,
}

/// 解码 YOLOv8 输出。
///
/// 支持 `[1, 4+nc, N]` 以及转置后的 `[1, N, 4+nc]`；
/// 每个候选框为 `cx, cy, w, h` 加各类别得分。
pub fn decode_yolo_output(output: &ArrayViewD<f32>, params: &DecodeParams) -> Result<Vec<RawDetection>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(DetectError::Inference(format!(
            "Unsupported detection output shape: {:?}. Expected (1, 4+classes, anchors)",
            shape
        )));
    }

    let view = output.index_axis(Axis(0), 0);
    let view: ArrayView2<f32> = view
        .into_dimensionality()
        .map_err(|e| DetectError::Inference(format!("Invalid output layout: {}", e)))?;

    // 统一成 (4+nc, N) 布局。类别数以输出张量为准，
    // `num_classes` 只用于判断布局。
    let (dim0, dim1) = view.dim();
    let rows = 4 + params.num_classes;
    let view = if params.num_classes > 0 && dim0 == rows {
        view
    } else if params.num_classes > 0 && dim1 == rows {
        view.reversed_axes()
    } else {
        let transposed = match feature_axis(dim0, dim1) {
            Some(axis) => axis == 1,
            None => {
                return Err(DetectError::Inference(format!(
                    "Output shape {:?} has no feature axis with box and class rows",
                    shape
                )))
            }
        };
        let view = if transposed { view.reversed_axes() } else { view };
        if params.num_classes > 0 {
            tracing::warn!(
                "Model outputs {} classes but {} names are known, unnamed classes fall back to class_<id>",
                view.shape()[0] - 4,
                params.num_classes
            );
        }
        view
    };

    let (features, anchors) = view.dim();
    let mut detections = Vec::new();

    for i in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for c in 4..features {
            let score = view[[c, i]];
            if score > best_score {
                best_score = score;
                best_class = c - 4;
            }
        }

        if best_score < params.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (view[[0, i]], view[[1, i]], view[[2, i]], view[[3, i]]);
        let (x1, y1) = params.letterbox.restore(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = params.letterbox.restore(cx + w / 2.0, cy + h / 2.0);

        let max_x = params.image_width as f32;
        let max_y = params.image_height as f32;
        detections.push(RawDetection {
            x1: x1.clamp(0.0, max_x),
            y1: y1.clamp(0.0, max_y),
            x2: x2.clamp(0.0, max_x),
            y2: y2.clamp(0.0, max_y),
            class_id: best_class,
            confidence: best_score,
        });
    }

    tracing::debug!(
        "Decoded {} candidates above {:.3} from {} anchors",
        detections.len(),
        params.confidence_threshold,
        anchors
    );

    Ok(detections)
}

/// 类别数未知时找出特征维：只有一维大于 4 时取该维，否则取较短的一维
fn feature_axis(dim0: usize, dim1: usize) -> Option<usize> {
    match (dim0 > 4, dim1 > 4) {
        (true, true) if dim0 <= dim1 => Some(0),
        (true, true) => Some(1),
        (true, false) => Some(0),
        (false, true) => Some(1),
        (false, false) => None,
    }
}

/// 两个框的交并比
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let union = a.area() + b.area() - inter;

    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// 按类别的非极大值抑制：同类框 IoU 超过阈值时只保留得分更高者
pub fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
            if kept.len() >= MAX_DETECTIONS {
                break;
            }
        }
    }

    kept
}
