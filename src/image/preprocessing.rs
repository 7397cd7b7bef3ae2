use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;

/// letterbox 填充色（与 Ultralytics 一致）
const PAD_VALUE: u8 = 114;

/// letterbox 变换参数，用于把模型坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// 计算把 `width x height` 等比缩放进 `size x size` 画布的参数
    pub fn fit(width: u32, height: u32, size: usize) -> Self {
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();

        Self {
            scale,
            pad_x: ((size as f32 - new_w) / 2.0).floor(),
            pad_y: ((size as f32 - new_h) / 2.0).floor(),
        }
    }

    /// 模型输入坐标 -> 原图坐标
    pub fn restore(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 等比缩放并填充到正方形，输出 NCHW、[0,1] 归一化的张量
    pub fn letterbox(image: &DynamicImage, size: usize) -> (Array4<f32>, Letterbox) {
        let (width, height) = image.dimensions();
        let letterbox = Letterbox::fit(width, height, size);

        let new_w = ((width as f32 * letterbox.scale).round() as u32).clamp(1, size as u32);
        let new_h = ((height as f32 * letterbox.scale).round() as u32).clamp(1, size as u32);
        let resized = image::imageops::resize(&image.to_rgb8(), new_w, new_h, FilterType::Triangle);

        let mut canvas = RgbImage::from_pixel(size as u32, size as u32, Rgb([PAD_VALUE; 3]));
        image::imageops::replace(
            &mut canvas,
            &resized,
            letterbox.pad_x as i64,
            letterbox.pad_y as i64,
        );

        let mut input = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        (input, letterbox)
    }
}
