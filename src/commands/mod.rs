pub mod camera;
pub mod controls;
pub mod service;

pub use camera::*;
pub use controls::*;
pub use service::{CameraInfo, CameraService, FrameSnapshot, StillImage};
