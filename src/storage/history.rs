use crate::Result;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// 历史记录时间格式（本地时间，精确到秒）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Dataset.csv 中的一行：源文件、结果文件、检测数量、时间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub source_path: String,
    pub result_path: String,
    pub count: usize,
    pub timestamp: String,
}

impl HistoryRow {
    pub fn new(source: &Path, result: &Path, count: usize, at: DateTime<Local>) -> Self {
        Self {
            source_path: source.display().to_string(),
            result_path: result.display().to_string(),
            count,
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// 只追加的CSV历史日志
pub struct HistoryLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一行。每次追加都打开、写入、刷新并关闭文件；
    /// 写锁保证同一进程内的行不会交错。
    pub fn append(&self, row: &HistoryRow) -> Result<()> {
        let _guard = self.write_lock.lock();

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;

        let mut file = writer
            .into_inner()
            .map_err(|e| crate::DetectError::Storage(format!("Failed to flush history: {}", e)))?;
        file.flush()?;

        tracing::debug!("History row appended: {:?}", row);
        Ok(())
    }

    /// 读取全部历史记录；日志文件不存在时返回空列表
    pub fn read_all(&self) -> Result<Vec<HistoryRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;

        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn row(n: usize) -> HistoryRow {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        HistoryRow::new(
            Path::new(&format!("Assets/Uploads/{}.jpg", n)),
            Path::new(&format!("Assets/Results/{}.jpg", n)),
            n,
            at,
        )
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(row(1).timestamp, "2024-03-09 14:05:07");
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::open(dir.path().join("Dataset.csv")).unwrap();
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_writes_headerless_rows() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::open(dir.path().join("Assets").join("Dataset.csv")).unwrap();

        log.append(&row(1)).unwrap();
        log.append(&row(2)).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Assets/Uploads/1.jpg,Assets/Results/1.jpg,1,2024-03-09 14:05:07");

        assert_eq!(log.read_all().unwrap(), vec![row(1), row(2)]);
    }

    #[test]
    fn test_paths_with_commas_are_quoted() {
        let dir = TempDir::new().unwrap();
        let log = HistoryLog::open(dir.path().join("Dataset.csv")).unwrap();
        let mut tricky = row(3);
        tricky.source_path = "a,b/3.jpg".to_string();

        log.append(&tricky).unwrap();
        assert_eq!(log.read_all().unwrap(), vec![tricky]);
    }

    #[test]
    fn test_concurrent_appends_keep_line_integrity() {
        let dir = TempDir::new().unwrap();
        let log = std::sync::Arc::new(HistoryLog::open(dir.path().join("Dataset.csv")).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        log.append(&row(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.read_all().unwrap().len(), 80);
    }
}
