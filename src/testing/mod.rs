//! Testing utilities
//!
//! A scriptable simulated camera stack plus synthetic frames and device
//! profiles, so the session can be exercised without hardware.

pub mod simulated;
pub mod synthetic_data;

pub use simulated::{
    CaptureBehavior, HardwareEvent, OpenBehavior, SessionBehavior, SimulatedProvider,
};
pub use synthetic_data::{
    back_camera_descriptor, front_camera_descriptor, looks_like_jpeg, synthetic_jpeg,
    synthetic_yuv_frame,
};
