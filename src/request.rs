//! Hardware capture requests and how live controls map onto them.

use crate::controls::ControlState;
use crate::selector::select_frame_rate_range;
use crate::types::{DeviceDescriptor, FlashMode, FpsRange, Rect};
use serde::Serialize;

/// Request template the hardware optimises for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlMode {
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AfMode {
    ContinuousPicture,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AeMode {
    On,
    OnAutoFlash,
    OnAlwaysFlash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlashState {
    Off,
    Single,
    Torch,
}

/// Settings submitted to the hardware, either repeating or as a single capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    /// Surface ids the request writes to.
    pub targets: Vec<u64>,
    pub fps_range: FpsRange,
    pub control_mode: ControlMode,
    pub af_mode: AfMode,
    pub ae_mode: AeMode,
    pub flash: FlashState,
    pub crop_region: Rect,
    pub exposure_compensation: i32,
    pub video_stabilization: bool,
}

impl CaptureRequest {
    /// Build a request reflecting `controls` on `descriptor`.
    pub fn build(
        template: RequestTemplate,
        targets: Vec<u64>,
        descriptor: &DeviceDescriptor,
        controls: &ControlState,
    ) -> Self {
        let (ae_mode, flash) = flash_settings(template, controls.flash_mode, descriptor);
        Self {
            template,
            targets,
            fps_range: select_frame_rate_range(descriptor, controls.target_fps),
            control_mode: ControlMode::Auto,
            af_mode: if controls.focus_mode.is_auto() {
                AfMode::ContinuousPicture
            } else {
                AfMode::Off
            },
            ae_mode,
            flash,
            crop_region: crop_for_zoom(descriptor.active_array, controls.zoom_ratio),
            exposure_compensation: descriptor
                .clamp_exposure_compensation(controls.exposure_compensation),
            video_stabilization: false,
        }
    }

    pub fn targets_surface(&self, surface_id: u64) -> bool {
        self.targets.contains(&surface_id)
    }
}

/// AE mode and flash state for a flash setting.
///
/// Preview keeps the torch lit for `On`; a still capture fires once. Devices
/// without a flash unit always get plain auto-exposure.
pub fn flash_settings(
    template: RequestTemplate,
    mode: FlashMode,
    descriptor: &DeviceDescriptor,
) -> (AeMode, FlashState) {
    if !descriptor.flash_available {
        return (AeMode::On, FlashState::Off);
    }
    match (mode, template) {
        (FlashMode::Off, _) => (AeMode::On, FlashState::Off),
        (FlashMode::Auto, _) => (AeMode::OnAutoFlash, FlashState::Off),
        (FlashMode::On, RequestTemplate::Preview) => (AeMode::On, FlashState::Torch),
        (FlashMode::On, RequestTemplate::StillCapture) => {
            (AeMode::OnAlwaysFlash, FlashState::Single)
        }
    }
}

/// Clamp a requested zoom ratio to `[1.0, max_zoom]`. Non-finite input means 1.0.
pub fn clamp_zoom(ratio: f32, max_zoom: f32) -> f32 {
    if !ratio.is_finite() {
        return 1.0;
    }
    let max_zoom = if max_zoom.is_finite() { max_zoom.max(1.0) } else { 1.0 };
    ratio.clamp(1.0, max_zoom)
}

/// Centered crop of the active array for a zoom ratio.
pub fn crop_for_zoom(active_array: Rect, zoom_ratio: f32) -> Rect {
    let ratio = if zoom_ratio.is_finite() && zoom_ratio >= 1.0 {
        zoom_ratio
    } else {
        1.0
    };
    let width = (active_array.width() as f32 / ratio).round() as i32;
    let height = (active_array.height() as f32 / ratio).round() as i32;
    let left = active_array.left + (active_array.width() - width) / 2;
    let top = active_array.top + (active_array.height() - height) / 2;
    Rect::new(left, top, left + width, top + height)
}
