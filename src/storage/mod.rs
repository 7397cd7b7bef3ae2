pub mod history;
pub mod uploads;

pub use history::{HistoryLog, HistoryRow, TIMESTAMP_FORMAT};
pub use uploads::UploadStore;
