use crate::utils::error::DetectError;
use crate::Result;
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// 上传文件与结果文件的存储，二者共享同一数字编号
pub struct UploadStore {
    uploads_dir: PathBuf,
    results_dir: PathBuf,
    next: AtomicU64,
}

impl UploadStore {
    /// 创建目录（如不存在）并从已有上传文件中初始化编号
    pub fn open(uploads_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Result<Self> {
        let uploads_dir = uploads_dir.into();
        let results_dir = results_dir.into();

        fs::create_dir_all(&uploads_dir)?;
        fs::create_dir_all(&results_dir)?;

        let next = first_free_id(&uploads_dir)?;
        tracing::info!(
            "Upload store ready: uploads={}, results={}, next_id={}",
            uploads_dir.display(),
            results_dir.display(),
            next
        );

        Ok(Self {
            uploads_dir,
            results_dir,
            next: AtomicU64::new(next),
        })
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// 分配下一个编号。
    ///
    /// 每次分配前重新扫描上传目录，计数器至少提升到 `max + 1`，
    /// 之后用原子自增取号，同一进程内的并发请求不会拿到相同编号。
    pub fn next_id(&self) -> Result<u64> {
        let floor = first_free_id(&self.uploads_dir)?;
        self.next.fetch_max(floor, Ordering::SeqCst);
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }

    pub fn upload_path(&self, id: u64) -> PathBuf {
        self.uploads_dir.join(file_name(id))
    }

    pub fn result_path(&self, id: u64) -> PathBuf {
        self.results_dir.join(file_name(id))
    }

    /// 原样保存上传的字节
    pub fn save_upload(&self, id: u64, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.upload_path(id);
        fs::write(&path, bytes)?;
        tracing::debug!("Saved upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// 以JPEG编码保存标注后的结果图像
    pub fn save_result(&self, id: u64, image: &DynamicImage) -> Result<PathBuf> {
        let path = self.result_path(id);
        // JPEG 不支持 alpha 通道
        DynamicImage::ImageRgb8(image.to_rgb8())
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|e| DetectError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
        tracing::debug!("Saved result {}", path.display());
        Ok(path)
    }
}

fn file_name(id: u64) -> String {
    format!("{}.jpg", id)
}

/// 文件名第一个 `.` 之前的部分为纯数字时返回该数字
pub fn numeric_stem(file_name: &str) -> Option<u64> {
    let stem = file_name.split('.').next()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// 目录中最大的数字文件名，没有则为 0
/// 已有最大编号加一，编号耗尽时报错
fn first_free_id(dir: &Path) -> Result<u64> {
    max_numeric_stem(dir)?.checked_add(1).ok_or_else(|| {
        DetectError::Storage(format!("Upload numbering exhausted in {}", dir.display()))
    })
}

pub fn max_numeric_stem(dir: &Path) -> Result<u64> {
    let mut max = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(n) = entry.file_name().to_str().and_then(numeric_stem) {
            max = max.max(n);
        }
    }
    Ok(max)
}
