use crate::utils::error::DetectError;
use crate::Result;
use image::{DynamicImage, GenericImageView, ImageFormat};

/// 最大上传大小（50MB）
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从字节流加载图像
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        // 检查文件大小
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(DetectError::InvalidInput(format!(
                "File too large: {} bytes, max allowed: {} bytes",
                bytes.len(),
                MAX_UPLOAD_BYTES
            )));
        }

        let image = image::load_from_memory(bytes)?;
        Self::validate_dimensions(&image)?;

        tracing::debug!(
            "Decoded image: {}x{}, format={:?}",
            image.width(),
            image.height(),
            Self::detect_format(bytes)
        );

        Ok(image)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像尺寸
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        if width == 0 || height == 0 {
            return Err(DetectError::ImageProcessing(format!(
                "Image has no pixels: {}x{}",
                width, height
            )));
        }

        Ok(())
    }
}
