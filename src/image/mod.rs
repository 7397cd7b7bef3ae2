pub mod annotate;
pub mod loader;
pub mod postprocessing;
pub mod preprocessing;

pub use annotate::draw_boxes;
pub use loader::ImageLoader;
pub use postprocessing::{decode_yolo_output, non_max_suppression, DecodeParams};
pub use preprocessing::{ImagePreprocessor, Letterbox};
