pub mod detector;

pub use detector::{ModelInfo, ObjectDetector, YoloDetector};
