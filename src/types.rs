//! Value types shared by the selector, the session and the hardware backends.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Direction a physical camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Front,
    Back,
    External,
}

impl LensFacing {
    /// Facing used by `switch_camera`. External cameras switch to the back one.
    pub fn flipped(self) -> Self {
        match self {
            LensFacing::Back => LensFacing::Front,
            LensFacing::Front | LensFacing::External => LensFacing::Back,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LensFacing::Front => "front",
            LensFacing::Back => "back",
            LensFacing::External => "external",
        }
    }
}

impl fmt::Display for LensFacing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel dimensions of a stream or surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width over height; zero for a degenerate size.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn swapped(&self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn fits_within(&self, max_width: u32, max_height: u32) -> bool {
        self.width <= max_width && self.height <= max_height
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Auto-exposure target frame-rate range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FpsRange {
    pub lower: i32,
    pub upper: i32,
}

impl FpsRange {
    pub const fn new(lower: i32, upper: i32) -> Self {
        Self { lower, upper }
    }

    pub const fn fixed(fps: i32) -> Self {
        Self::new(fps, fps)
    }

    pub fn contains(&self, fps: i32) -> bool {
        self.lower <= fps && fps <= self.upper
    }

    pub fn width(&self) -> i32 {
        self.upper - self.lower
    }
}

impl fmt::Display for FpsRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Rectangle in sensor pixel coordinates, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Output stream formats a device advertises sizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamFormat {
    /// Opaque render surfaces (live preview).
    Private,
    /// YUV 4:2:0 planar frames for the analysis tap.
    Yuv420,
    /// Encoded still images.
    Jpeg,
}

/// Immutable capability metadata for one physical camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub facing: LensFacing,
    /// Clockwise rotation of the sensor relative to the display: 0, 90, 180 or 270.
    pub sensor_orientation: u32,
    pub max_digital_zoom: f32,
    pub fps_ranges: Vec<FpsRange>,
    pub output_sizes: HashMap<StreamFormat, Vec<Size>>,
    pub flash_available: bool,
    pub active_array: Rect,
    pub exposure_compensation_range: Option<(i32, i32)>,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, facing: LensFacing) -> Self {
        Self {
            id: id.into(),
            facing,
            sensor_orientation: 0,
            max_digital_zoom: 1.0,
            fps_ranges: Vec::new(),
            output_sizes: HashMap::new(),
            flash_available: false,
            active_array: Rect::from_size(1920, 1080),
            exposure_compensation_range: None,
        }
    }

    pub fn with_sensor_orientation(mut self, degrees: u32) -> Self {
        self.sensor_orientation = degrees % 360;
        self
    }

    pub fn with_max_zoom(mut self, max_zoom: f32) -> Self {
        self.max_digital_zoom = max_zoom;
        self
    }

    pub fn with_fps_ranges(mut self, ranges: Vec<FpsRange>) -> Self {
        self.fps_ranges = ranges;
        self
    }

    pub fn with_output_sizes(mut self, format: StreamFormat, sizes: Vec<Size>) -> Self {
        self.output_sizes.insert(format, sizes);
        self
    }

    pub fn with_flash(mut self, available: bool) -> Self {
        self.flash_available = available;
        self
    }

    pub fn with_active_array(mut self, active_array: Rect) -> Self {
        self.active_array = active_array;
        self
    }

    pub fn with_exposure_compensation_range(mut self, lower: i32, upper: i32) -> Self {
        self.exposure_compensation_range = Some((lower.min(upper), lower.max(upper)));
        self
    }

    /// Sizes advertised for `format`, empty when the format is unsupported.
    pub fn sizes_for(&self, format: StreamFormat) -> &[Size] {
        self.output_sizes
            .get(&format)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Digital zoom ceiling, never below 1.0 even for bogus metadata.
    pub fn max_zoom(&self) -> f32 {
        if self.max_digital_zoom.is_finite() && self.max_digital_zoom > 1.0 {
            self.max_digital_zoom
        } else {
            1.0
        }
    }

    /// Clamp an exposure-compensation index to the advertised range.
    /// Devices without a range only accept 0.
    pub fn clamp_exposure_compensation(&self, value: i32) -> i32 {
        match self.exposure_compensation_range {
            Some((lower, upper)) => value.clamp(lower, upper),
            None => 0,
        }
    }

    /// Whether the sensor is mounted sideways relative to the display.
    pub fn swaps_dimensions(&self) -> bool {
        self.sensor_orientation == 90 || self.sensor_orientation == 270
    }
}

/// Requested streaming parameters for one open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub target_fps: i32,
    pub preview_width: u32,
    pub preview_height: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    pub facing: LensFacing,
}

impl StreamConfig {
    /// 60 fps, front camera, 1920x1080 preview and capture.
    pub const DEFAULT: StreamConfig = StreamConfig {
        target_fps: 60,
        preview_width: 1920,
        preview_height: 1080,
        capture_width: 1920,
        capture_height: 1080,
        facing: LensFacing::Front,
    };

    /// 30 fps at 1280x720 for slower devices.
    pub const LOW_RESOLUTION: StreamConfig = StreamConfig {
        target_fps: 30,
        preview_width: 1280,
        preview_height: 720,
        capture_width: 1280,
        capture_height: 720,
        facing: LensFacing::Front,
    };

    pub const FRONT_CAMERA: StreamConfig = StreamConfig::DEFAULT;

    pub const BACK_CAMERA: StreamConfig = StreamConfig {
        facing: LensFacing::Back,
        ..StreamConfig::DEFAULT
    };

    pub fn preview_size(&self) -> Size {
        Size::new(self.preview_width, self.preview_height)
    }

    pub fn capture_size(&self) -> Size {
        Size::new(self.capture_width, self.capture_height)
    }

    pub fn preview_aspect_ratio(&self) -> f32 {
        self.preview_size().aspect_ratio()
    }

    pub fn capture_aspect_ratio(&self) -> f32 {
        self.capture_size().aspect_ratio()
    }

    pub fn with_facing(mut self, facing: LensFacing) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_target_fps(mut self, fps: i32) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_preview_size(mut self, width: u32, height: u32) -> Self {
        self.preview_width = width;
        self.preview_height = height;
        self
    }

    pub fn with_capture_size(mut self, width: u32, height: u32) -> Self {
        self.capture_width = width;
        self.capture_height = height;
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// User-facing flash setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    #[default]
    Off,
    On,
    Auto,
}

/// Auto-focus behaviour of the repeating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    #[default]
    Auto,
    Manual,
}

impl FocusMode {
    pub fn from_auto(auto: bool) -> Self {
        if auto {
            FocusMode::Auto
        } else {
            FocusMode::Manual
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, FocusMode::Auto)
    }
}

/// Encoded still image handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Sensor rotation at capture time, for orientation-correct storage.
    pub rotation_degrees: u32,
    pub timestamp_nanos: i64,
    pub facing: LensFacing,
}

impl CapturedImage {
    /// Rotation to store the image with while the display is turned by
    /// `display_degrees`. Front cameras are mirrored, so the turns add up.
    pub fn rotation_for_display(&self, display_degrees: u32) -> u32 {
        display_rotation(self.rotation_degrees, display_degrees, self.facing)
    }
}

/// Clockwise rotation that makes a sensor image upright on a turned display.
pub fn display_rotation(sensor_orientation: u32, display_degrees: u32, facing: LensFacing) -> u32 {
    let sensor = sensor_orientation % 360;
    let display = display_degrees % 360;
    match facing {
        LensFacing::Front => (sensor + display) % 360,
        LensFacing::Back | LensFacing::External => (sensor + 360 - display) % 360,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_presets() {
        let config = StreamConfig::DEFAULT;
        assert_eq!(config.target_fps, 60);
        assert_eq!(config.preview_size(), Size::new(1920, 1080));
        assert!((config.preview_aspect_ratio() - 16.0 / 9.0).abs() < 0.01);

        let low = StreamConfig::LOW_RESOLUTION;
        assert_eq!(low.target_fps, 30);
        assert_eq!(low.capture_size(), Size::new(1280, 720));

        assert_eq!(StreamConfig::BACK_CAMERA.facing, LensFacing::Back);
        assert_eq!(StreamConfig::FRONT_CAMERA.facing, LensFacing::Front);
        assert_eq!(StreamConfig::BACK_CAMERA.target_fps, 60);
    }

    #[test]
    fn test_facing_flip() {
        assert_eq!(LensFacing::Front.flipped(), LensFacing::Back);
        assert_eq!(LensFacing::Back.flipped(), LensFacing::Front);
        assert_eq!(LensFacing::External.flipped(), LensFacing::Back);
    }

    #[test]
    fn test_display_rotation() {
        assert_eq!(display_rotation(90, 0, LensFacing::Back), 90);
        assert_eq!(display_rotation(90, 90, LensFacing::Back), 0);
        assert_eq!(display_rotation(270, 0, LensFacing::Front), 270);
        assert_eq!(display_rotation(270, 90, LensFacing::Front), 0);
        assert_eq!(display_rotation(0, 270, LensFacing::External), 90);

        let image = CapturedImage {
            data: Bytes::new(),
            width: 1920,
            height: 1080,
            rotation_degrees: 270,
            timestamp_nanos: 0,
            facing: LensFacing::Front,
        };
        assert_eq!(image.rotation_for_display(180), 90);
    }

    #[test]
    fn test_descriptor_clamps() {
        let descriptor = DeviceDescriptor::new("0", LensFacing::Back)
            .with_max_zoom(f32::NAN)
            .with_exposure_compensation_range(6, -6);
        assert_eq!(descriptor.max_zoom(), 1.0);
        assert_eq!(descriptor.exposure_compensation_range, Some((-6, 6)));
        assert_eq!(descriptor.clamp_exposure_compensation(12), 6);
        assert_eq!(descriptor.clamp_exposure_compensation(-40), -6);

        let no_range = DeviceDescriptor::new("1", LensFacing::Front);
        assert_eq!(no_range.clamp_exposure_compensation(3), 0);
    }

    #[test]
    fn test_degenerate_size_ratio() {
        assert_eq!(Size::new(640, 0).aspect_ratio(), 0.0);
        assert_eq!(Size::new(640, 480).swapped(), Size::new(480, 640));
    }
}
