use serde::ser::{Serialize, SerializeTuple, Serializer};

/// 模型输出的原始检测框（原图像素坐标）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
    pub confidence: f32,
}

impl RawDetection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// 单个检测结果，序列化为
/// `[x1, y1, x2, y2, label, confidence, width, height]`
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub label: String,
    pub confidence: f32,
    pub width: u32,
    pub height: u32,
}

impl DetectionRecord {
    /// 由原始检测框构造：坐标按银行家舍入取整并裁剪到图像范围内，置信度保留两位小数
    pub fn from_raw(raw: &RawDetection, label: String, image_width: u32, image_height: u32) -> Self {
        let clamp = |v: f32, max: u32| -> u32 {
            if v.is_nan() {
                return 0;
            }
            v.round_ties_even().clamp(0.0, max as f32) as u32
        };

        let (ax, bx) = (clamp(raw.x1, image_width), clamp(raw.x2, image_width));
        let (ay, by) = (clamp(raw.y1, image_height), clamp(raw.y2, image_height));
        let (x1, x2) = (ax.min(bx), ax.max(bx));
        let (y1, y2) = (ay.min(by), ay.max(by));

        let confidence = ((raw.confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0).clamp(0.0, 1.0);

        Self {
            x1,
            y1,
            x2,
            y2,
            label,
            confidence,
            width: x2 - x1,
            height: y2 - y1,
        }
    }
}

impl Serialize for DetectionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(8)?;
        tuple.serialize_element(&self.x1)?;
        tuple.serialize_element(&self.y1)?;
        tuple.serialize_element(&self.x2)?;
        tuple.serialize_element(&self.y2)?;
        tuple.serialize_element(&self.label)?;
        tuple.serialize_element(&self.confidence)?;
        tuple.serialize_element(&self.width)?;
        tuple.serialize_element(&self.height)?;
        tuple.end()
    }
}

/// `/detect` 的响应体
#[derive(Debug, Clone, serde::Serialize)]
pub struct DetectionResponse {
    pub count: usize,
    pub boxes: Vec<DetectionRecord>,
}

impl DetectionResponse {
    pub fn new(boxes: Vec<DetectionRecord>) -> Self {
        Self {
            count: boxes.len(),
            boxes,
        }
    }
}
