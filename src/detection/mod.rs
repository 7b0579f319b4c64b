#[cfg(any(feature = "torch", test))]
pub mod annotate;
#[cfg(any(feature = "torch", test))]
mod crop;
#[cfg(feature = "torch")]
pub mod model;
pub mod options;
#[cfg(any(feature = "torch", test))]
pub mod postprocess;

#[cfg(any(feature = "torch", test))]
pub use crop::{run_detection, Detection, Detector};

pub const DEFAULT_RESULT_IMAGE: &str = "result.jpg";
pub const DEFAULT_CROPS_DIR: &str = "cropped_detections";
