pub mod pipeline;
pub mod types;

pub use pipeline::{DetectionOutcome, DetectionPipeline};
pub use types::{DetectionRecord, DetectionResponse, RawDetection};
