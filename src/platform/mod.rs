//! Hardware abstraction layer.
//!
//! Backends implement these traits and report every asynchronous result by
//! posting a callback to the [`Handler`] they were given, so that all device
//! activity for one camera is serialized on its executor thread.

#[cfg(feature = "native")]
pub mod native;

use crate::bridge::Release;
use crate::errors::{CameraError, Result};
use crate::executor::Handler;
use crate::image_reader::ImageReader;
use crate::request::CaptureRequest;
use crate::types::{DeviceDescriptor, Size};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1 << 32);

/// Opaque handle to an externally owned render surface.
///
/// The core never reads its pixels; it only routes the preview stream to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    id: u64,
    size: Size,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed),
            size: Size::new(width, height),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> Size {
        self.size
    }
}

/// One output of a capture session.
#[derive(Debug, Clone)]
pub enum Surface {
    Render(RenderTarget),
    Reader(Arc<ImageReader>),
}

impl Surface {
    pub fn id(&self) -> u64 {
        match self {
            Surface::Render(target) => target.id(),
            Surface::Reader(reader) => reader.id(),
        }
    }

    pub fn size(&self) -> Size {
        match self {
            Surface::Render(target) => target.size(),
            Surface::Reader(reader) => reader.size(),
        }
    }

    pub fn as_reader(&self) -> Option<&Arc<ImageReader>> {
        match self {
            Surface::Reader(reader) => Some(reader),
            Surface::Render(_) => None,
        }
    }
}

/// Outcome of opening a device. Every variant hands over the device handle,
/// which the receiver is responsible for closing.
pub enum DeviceStateEvent {
    Opened(Box<dyn CameraDevice>),
    Disconnected(Box<dyn CameraDevice>),
    Error(Box<dyn CameraDevice>, i32),
}

pub type DeviceStateCallback = Box<dyn FnOnce(DeviceStateEvent) + Send + 'static>;

/// Device error codes reported through [`DeviceStateEvent::Error`].
pub const ERROR_CAMERA_IN_USE: i32 = 1;
pub const ERROR_MAX_CAMERAS_IN_USE: i32 = 2;
/// Camera disabled by policy; surfaced as a permission failure.
pub const ERROR_CAMERA_DISABLED: i32 = 3;
pub const ERROR_CAMERA_DEVICE: i32 = 4;
pub const ERROR_CAMERA_SERVICE: i32 = 5;

/// Outcome of configuring a capture session.
pub enum SessionStateEvent {
    Configured(Box<dyn CaptureSession>),
    ConfigureFailed(CameraError),
}

pub type SessionStateCallback = Box<dyn FnOnce(SessionStateEvent) + Send + 'static>;

/// Outcome of a single still capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Completed { timestamp_nanos: i64 },
    Failed(CameraError),
}

pub type CaptureCallback = Box<dyn FnOnce(CaptureOutcome) + Send + 'static>;

/// Enumerates and opens cameras.
pub trait CameraProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Device ids in enumeration order.
    fn device_ids(&self) -> Result<Vec<String>>;

    fn descriptor(&self, id: &str) -> Result<DeviceDescriptor>;

    /// Start opening `id`. The result arrives through `callback` on `handler`.
    fn open_device(&self, id: &str, handler: Handler, callback: DeviceStateCallback)
        -> Result<()>;
}

/// An open camera.
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Start configuring a session writing to `outputs`.
    fn create_capture_session(
        &mut self,
        outputs: Vec<Surface>,
        handler: Handler,
        callback: SessionStateCallback,
    ) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// A configured set of outputs accepting capture requests.
pub trait CaptureSession: Send {
    /// Replace the request the hardware repeats for every frame.
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()>;

    fn stop_repeating(&mut self) -> Result<()>;

    /// Submit one request; `callback` reports completion.
    fn capture(&mut self, request: &CaptureRequest, callback: CaptureCallback) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

impl Release for Box<dyn CameraDevice> {
    fn release(mut self) {
        let id = self.id().to_string();
        if let Err(e) = self.close() {
            log::warn!("Failed to release camera {}: {}", id, e);
        }
    }
}

impl Release for Box<dyn CaptureSession> {
    fn release(mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to release capture session: {}", e);
        }
    }
}
