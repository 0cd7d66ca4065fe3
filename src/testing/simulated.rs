//! Scriptable in-process camera hardware.
//!
//! Behaves like a callback-driven camera stack: every result is posted to
//! the caller's executor, and each step can be told to succeed, fail, or
//! never answer. All hardware calls are recorded so tests can assert on
//! ordering.

use crate::errors::{CameraError, Result};
use crate::executor::Handler;
use crate::image_reader::ImageReader;
use crate::platform::{
    CameraDevice, CameraProvider, CaptureCallback, CaptureOutcome, CaptureSession,
    DeviceStateCallback, DeviceStateEvent, SessionStateCallback, SessionStateEvent, Surface,
};
use crate::request::CaptureRequest;
use crate::testing::synthetic_data::{
    back_camera_descriptor, front_camera_descriptor, synthetic_jpeg, synthetic_yuv_frame,
};
use crate::types::{DeviceDescriptor, StreamFormat};
use std::sync::{Arc, Mutex, MutexGuard};

/// How the next `open_device` call answers.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenBehavior {
    Succeed,
    /// Device reports a disconnect instead of opening.
    Disconnect,
    /// Device reports an error code instead of opening.
    Error(i32),
    /// `open_device` itself returns the error.
    Refuse(CameraError),
    /// No callback until [`SimulatedProvider::complete_pending_open`].
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionBehavior {
    Configure,
    /// Configuration callback reports failure.
    Fail(CameraError),
    /// `create_capture_session` returns the error.
    Refuse(CameraError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureBehavior {
    /// Write a JPEG into the still pool and report completion.
    Deliver,
    /// Report a capture failure without producing an image.
    Fail(CameraError),
    /// `capture` returns the error.
    Reject(CameraError),
    /// Never answer.
    Hang,
}

/// Hardware call log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareEvent {
    DeviceOpened { id: String },
    DeviceClosed { id: String, open_readers: usize },
    SessionConfigured { id: String, outputs: Vec<u64> },
    SessionClosed { id: String, open_readers: usize },
    RepeatingRequest(CaptureRequest),
    RepeatingStopped,
    Capture(CaptureRequest),
}

struct PendingOpen {
    id: String,
    handler: Handler,
    callback: DeviceStateCallback,
}

struct ProviderState {
    devices: Vec<DeviceDescriptor>,
    open_behavior: OpenBehavior,
    session_behavior: SessionBehavior,
    capture_behavior: CaptureBehavior,
    repeating_error: Option<CameraError>,
    events: Vec<HardwareEvent>,
    pending_open: Option<PendingOpen>,
    stalled_captures: Vec<CaptureCallback>,
    readers: Vec<Arc<ImageReader>>,
    last_handler: Option<Handler>,
    repeating: bool,
    frame_counter: u64,
}

impl ProviderState {
    fn open_readers(&self) -> usize {
        self.readers.iter().filter(|r| !r.is_closed()).count()
    }
}

type SharedState = Arc<Mutex<ProviderState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ProviderState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-process provider for tests and demos. Clones share the same hardware.
#[derive(Clone)]
pub struct SimulatedProvider {
    state: SharedState,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    /// A provider with no devices.
    pub fn new() -> Self {
        Self::with_devices(Vec::new())
    }

    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                devices,
                open_behavior: OpenBehavior::Succeed,
                session_behavior: SessionBehavior::Configure,
                capture_behavior: CaptureBehavior::Deliver,
                repeating_error: None,
                events: Vec::new(),
                pending_open: None,
                stalled_captures: Vec::new(),
                readers: Vec::new(),
                last_handler: None,
                repeating: false,
                frame_counter: 0,
            })),
        }
    }

    /// Back camera "0" and front camera "1".
    pub fn phone() -> Self {
        Self::with_devices(vec![
            back_camera_descriptor("0"),
            front_camera_descriptor("1"),
        ])
    }

    pub fn add_device(&self, descriptor: DeviceDescriptor) {
        lock(&self.state).devices.push(descriptor);
    }

    pub fn remove_device(&self, id: &str) {
        lock(&self.state).devices.retain(|d| d.id != id);
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        lock(&self.state).open_behavior = behavior;
    }

    pub fn set_session_behavior(&self, behavior: SessionBehavior) {
        lock(&self.state).session_behavior = behavior;
    }

    pub fn set_capture_behavior(&self, behavior: CaptureBehavior) {
        lock(&self.state).capture_behavior = behavior;
    }

    /// Make `set_repeating_request` fail with `error`, or accept again with `None`.
    pub fn reject_repeating_requests(&self, error: Option<CameraError>) {
        lock(&self.state).repeating_error = error;
    }

    pub fn events(&self) -> Vec<HardwareEvent> {
        lock(&self.state).events.clone()
    }

    pub fn clear_events(&self) {
        lock(&self.state).events.clear();
    }

    /// Repeating requests submitted so far, oldest first.
    pub fn repeating_requests(&self) -> Vec<CaptureRequest> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                HardwareEvent::RepeatingRequest(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Pools handed to the last session that are still open.
    pub fn open_readers(&self) -> usize {
        lock(&self.state).open_readers()
    }

    /// Executor handler passed to the most recent open.
    pub fn last_handler(&self) -> Option<Handler> {
        lock(&self.state).last_handler.clone()
    }

    pub fn has_pending_open(&self) -> bool {
        lock(&self.state).pending_open.is_some()
    }

    /// Answer a hung open with a successfully opened device.
    pub fn complete_pending_open(&self) -> bool {
        let pending = lock(&self.state).pending_open.take();
        let Some(pending) = pending else {
            return false;
        };
        let device = SimulatedDevice::new(&pending.id, Arc::clone(&self.state));
        let callback = pending.callback;
        pending
            .handler
            .post_or_run(move || callback(DeviceStateEvent::Opened(Box::new(device))));
        true
    }

    /// Answer every hung capture with a failure. Returns how many there were.
    pub fn fail_stalled_captures(&self) -> usize {
        let stalled = std::mem::take(&mut lock(&self.state).stalled_captures);
        let count = stalled.len();
        for callback in stalled {
            callback(CaptureOutcome::Failed(CameraError::CaptureFailed(
                "capture abandoned by hardware".to_string(),
            )));
        }
        count
    }

    /// Push one analysis frame, as the sensor would while repeating.
    ///
    /// Returns false if nothing is streaming or the pool is full.
    pub fn emit_preview_frame(&self) -> bool {
        let (reader, frame_number) = {
            let mut state = lock(&self.state);
            if !state.repeating {
                return false;
            }
            let reader = state
                .readers
                .iter()
                .find(|r| r.format() == StreamFormat::Yuv420 && !r.is_closed())
                .cloned();
            state.frame_counter += 1;
            (reader, state.frame_counter)
        };
        match reader {
            Some(reader) => {
                let size = reader.size();
                reader.queue_image(synthetic_yuv_frame(frame_number, size.width, size.height))
            }
            None => false,
        }
    }
}

impl CameraProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    fn device_ids(&self) -> Result<Vec<String>> {
        Ok(lock(&self.state)
            .devices
            .iter()
            .map(|d| d.id.clone())
            .collect())
    }

    fn descriptor(&self, id: &str) -> Result<DeviceDescriptor> {
        lock(&self.state)
            .devices
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| CameraError::Backend(format!("unknown camera {}", id)))
    }

    fn open_device(
        &self,
        id: &str,
        handler: Handler,
        callback: DeviceStateCallback,
    ) -> Result<()> {
        let behavior = {
            let mut state = lock(&self.state);
            if !state.devices.iter().any(|d| d.id == id) {
                return Err(CameraError::DeviceOpenFailed(format!("unknown camera {}", id)));
            }
            state.last_handler = Some(handler.clone());
            state.open_behavior.clone()
        };

        let event = match behavior {
            OpenBehavior::Refuse(e) => return Err(e),
            OpenBehavior::Hang => {
                lock(&self.state).pending_open = Some(PendingOpen {
                    id: id.to_string(),
                    handler,
                    callback,
                });
                return Ok(());
            }
            OpenBehavior::Succeed => {
                DeviceStateEvent::Opened(Box::new(SimulatedDevice::new(id, Arc::clone(&self.state))))
            }
            OpenBehavior::Disconnect => DeviceStateEvent::Disconnected(Box::new(
                SimulatedDevice::new(id, Arc::clone(&self.state)),
            )),
            OpenBehavior::Error(code) => DeviceStateEvent::Error(
                Box::new(SimulatedDevice::new(id, Arc::clone(&self.state))),
                code,
            ),
        };
        handler.post_or_run(move || callback(event));
        Ok(())
    }
}

/// Open handle; closes itself if dropped without `close`.
struct SimulatedDevice {
    id: String,
    state: SharedState,
    closed: bool,
}

impl SimulatedDevice {
    fn new(id: &str, state: SharedState) -> Self {
        lock(&state).events.push(HardwareEvent::DeviceOpened { id: id.to_string() });
        Self {
            id: id.to_string(),
            state,
            closed: false,
        }
    }
}

impl CameraDevice for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: Vec<Surface>,
        handler: Handler,
        callback: SessionStateCallback,
    ) -> Result<()> {
        if self.closed {
            return Err(CameraError::InvalidState(format!("camera {} is closed", self.id)));
        }
        let behavior = lock(&self.state).session_behavior.clone();
        let event = match behavior {
            SessionBehavior::Refuse(e) => return Err(e),
            SessionBehavior::Fail(e) => SessionStateEvent::ConfigureFailed(e),
            SessionBehavior::Configure => {
                let mut state = lock(&self.state);
                state.readers = outputs.iter().filter_map(|s| s.as_reader().cloned()).collect();
                state.events.push(HardwareEvent::SessionConfigured {
                    id: self.id.clone(),
                    outputs: outputs.iter().map(Surface::id).collect(),
                });
                drop(state);
                SessionStateEvent::Configured(Box::new(SimulatedSession {
                    device_id: self.id.clone(),
                    state: Arc::clone(&self.state),
                    handler: handler.clone(),
                    outputs,
                    closed: false,
                }))
            }
        };
        handler.post_or_run(move || callback(event));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut state = lock(&self.state);
        let open_readers = state.open_readers();
        state.events.push(HardwareEvent::DeviceClosed {
            id: self.id.clone(),
            open_readers,
        });
        Ok(())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct SimulatedSession {
    device_id: String,
    state: SharedState,
    handler: Handler,
    outputs: Vec<Surface>,
    closed: bool,
}

impl SimulatedSession {
    fn still_reader(&self, request: &CaptureRequest) -> Option<Arc<ImageReader>> {
        self.outputs
            .iter()
            .filter_map(Surface::as_reader)
            .find(|r| r.format() == StreamFormat::Jpeg && request.targets_surface(r.id()))
            .cloned()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CameraError::InvalidState("capture session closed".to_string()));
        }
        Ok(())
    }
}

impl CaptureSession for SimulatedSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        if let Some(e) = state.repeating_error.clone() {
            return Err(e);
        }
        state.repeating = true;
        state
            .events
            .push(HardwareEvent::RepeatingRequest(request.clone()));
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.repeating = false;
        state.events.push(HardwareEvent::RepeatingStopped);
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequest, callback: CaptureCallback) -> Result<()> {
        self.ensure_open()?;
        let (behavior, frame_number) = {
            let mut state = lock(&self.state);
            state.events.push(HardwareEvent::Capture(request.clone()));
            state.frame_counter += 1;
            (state.capture_behavior.clone(), state.frame_counter)
        };

        match behavior {
            CaptureBehavior::Reject(e) => Err(e),
            CaptureBehavior::Hang => {
                lock(&self.state).stalled_captures.push(callback);
                Ok(())
            }
            CaptureBehavior::Fail(e) => {
                self.handler
                    .post_or_run(move || callback(CaptureOutcome::Failed(e)));
                Ok(())
            }
            CaptureBehavior::Deliver => {
                let Some(reader) = self.still_reader(request) else {
                    return Err(CameraError::CaptureFailed(
                        "request has no still output".to_string(),
                    ));
                };
                let size = reader.size();
                let image = synthetic_jpeg(frame_number, size.width, size.height);
                let timestamp_nanos = image.timestamp_nanos;
                let outcome = if reader.queue_image(image) {
                    CaptureOutcome::Completed { timestamp_nanos }
                } else {
                    CaptureOutcome::Failed(CameraError::CaptureFailed(
                        "still pool full".to_string(),
                    ))
                };
                self.handler.post_or_run(move || callback(outcome));
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut state = lock(&self.state);
        state.repeating = false;
        let open_readers = state.open_readers();
        state.events.push(HardwareEvent::SessionClosed {
            id: self.device_id.clone(),
            open_readers,
        });
        Ok(())
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
