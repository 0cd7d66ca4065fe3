//! Camera session: owns one device from open to close.
//!
//! Lifecycle calls (`open`, `start_preview`, `switch_camera`, `close_camera`)
//! are serialized by an async lock. Controls and still capture are not; they
//! only take the short internal mutex. Hardware work always runs on the
//! device's executor thread.

use crate::bridge::{self, Release};
use crate::controls::ControlState;
use crate::dispatcher::{drain_listener, FrameSlot};
use crate::errors::{CameraError, Result};
use crate::executor::{CameraExecutor, Handler};
use crate::image_reader::{ImageAvailableListener, ImageReader};
use crate::platform::{
    CameraDevice, CameraProvider, CaptureOutcome, CaptureSession, DeviceStateEvent, RenderTarget,
    SessionStateEvent, Surface, ERROR_CAMERA_DISABLED,
};
use crate::registry;
use crate::request::{CaptureRequest, RequestTemplate};
use crate::selector::{fit_surface_size, select_preview_size};
use crate::state::{SessionState, StateMachine, Trigger};
use crate::types::{
    CapturedImage, DeviceDescriptor, FlashMode, FocusMode, LensFacing, Size, StreamConfig,
    StreamFormat,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};

/// Pool sizes and control defaults applied at every open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub analysis_pool_capacity: usize,
    pub still_pool_capacity: usize,
    pub initial_flash: FlashMode,
    pub initial_focus: FocusMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            analysis_pool_capacity: 3,
            still_pool_capacity: 2,
            initial_flash: FlashMode::Off,
            initial_focus: FocusMode::Auto,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) machine: StateMachine,
    /// Bumped on every open and close so late callbacks can tell they are stale.
    pub(crate) epoch: u64,
    pub(crate) config: Option<StreamConfig>,
    pub(crate) last_config: Option<StreamConfig>,
    pub(crate) descriptor: Option<DeviceDescriptor>,
    pub(crate) executor: Option<CameraExecutor>,
    pub(crate) device: Option<Box<dyn CameraDevice>>,
    pub(crate) capture_session: Option<Box<dyn CaptureSession>>,
    pub(crate) preview_target: Option<RenderTarget>,
    pub(crate) preview_size: Option<Size>,
    pub(crate) analysis_reader: Option<Arc<ImageReader>>,
    pub(crate) still_reader: Option<Arc<ImageReader>>,
    pub(crate) repeating: Option<CaptureRequest>,
    pub(crate) controls: ControlState,
    pub(crate) last_control_error: Option<CameraError>,
    pub(crate) frame_slot: Option<Arc<FrameSlot>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            machine: StateMachine::new(),
            epoch: 0,
            config: None,
            last_config: None,
            descriptor: None,
            executor: None,
            device: None,
            capture_session: None,
            preview_target: None,
            preview_size: None,
            analysis_reader: None,
            still_reader: None,
            repeating: None,
            controls: ControlState::default(),
            last_control_error: None,
            frame_slot: None,
        }
    }

    pub(crate) fn handler(&self) -> Option<Handler> {
        self.executor.as_ref().map(CameraExecutor::handler)
    }

    /// Everything that holds hardware, in release order.
    fn take_resources(&mut self) -> Resources {
        let mut resources = self.take_preview_resources();
        resources.device = self.device.take();
        resources.executor = self.executor.take();
        resources
    }

    /// Outputs of the current capture session, leaving the device open.
    fn take_preview_resources(&mut self) -> Resources {
        self.repeating = None;
        self.preview_size = None;
        Resources {
            session: self.capture_session.take(),
            device: None,
            analysis_reader: self.analysis_reader.take(),
            still_reader: self.still_reader.take(),
            frame_slot: self.frame_slot.take(),
            executor: None,
            handler: self.handler(),
        }
    }
}

#[derive(Default)]
struct Resources {
    session: Option<Box<dyn CaptureSession>>,
    device: Option<Box<dyn CameraDevice>>,
    analysis_reader: Option<Arc<ImageReader>>,
    still_reader: Option<Arc<ImageReader>>,
    frame_slot: Option<Arc<FrameSlot>>,
    executor: Option<CameraExecutor>,
    /// Where hardware closes run when the executor itself is not being released.
    handler: Option<Handler>,
}

impl Resources {
    fn is_empty(&self) -> bool {
        self.session.is_none()
            && self.device.is_none()
            && self.analysis_reader.is_none()
            && self.still_reader.is_none()
            && self.frame_slot.is_none()
            && self.executor.is_none()
    }

    /// Close session, device, analysis pool, still pool, in that order.
    /// Returns the job that does it so callers pick the thread.
    fn split(self) -> (impl FnOnce() + Send + 'static, Option<Handler>, Option<CameraExecutor>) {
        let Resources {
            session,
            device,
            analysis_reader,
            still_reader,
            frame_slot,
            executor,
            handler,
        } = self;
        let handler = executor.as_ref().map(CameraExecutor::handler).or(handler);

        let job = move || {
            if let Some(mut session) = session {
                if let Err(e) = session.close() {
                    log::warn!("Failed to close capture session: {}", e);
                }
            }
            if let Some(mut device) = device {
                let id = device.id().to_string();
                if let Err(e) = device.close() {
                    log::warn!("Failed to close camera {}: {}", id, e);
                }
            }
            if let Some(reader) = analysis_reader {
                reader.close();
            }
            if let Some(reader) = still_reader {
                reader.close();
            }
            if let Some(slot) = frame_slot {
                slot.close();
            }
        };
        (job, handler, executor)
    }
}

/// Release on the executor, wait for it, then stop the executor.
async fn release(resources: Resources) {
    if resources.is_empty() {
        return;
    }
    let (job, handler, executor) = resources.split();
    match handler {
        Some(handler) => {
            let (tx, rx) = oneshot::channel();
            handler.post_or_run(move || {
                job();
                let _ = tx.send(());
            });
            if rx.await.is_err() {
                log::warn!("Camera release job was dropped by {}", handler.name());
            }
        }
        None => job(),
    }
    if let Some(executor) = executor {
        executor.shutdown().await;
    }
}

/// Best-effort release without waiting, for drop paths.
fn release_now(resources: Resources) {
    if resources.is_empty() {
        return;
    }
    let (job, handler, executor) = resources.split();
    match handler {
        Some(handler) => handler.post_or_run(job),
        None => job(),
    }
    // Dropping the executor lets queued jobs run, then stops the thread.
    drop(executor);
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
    pub(crate) zoom_tx: watch::Sender<f32>,
    pub(crate) flash_tx: watch::Sender<FlashMode>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate and publish a state change.
    pub(crate) fn apply(&self, inner: &mut Inner, trigger: Trigger) -> Result<()> {
        let state = inner.machine.transition(trigger)?.clone();
        self.state_tx.send_replace(state);
        Ok(())
    }
}

/// Resets a half-finished open if the caller stops waiting for it.
struct OpenGuard {
    shared: Arc<Shared>,
    epoch: u64,
    armed: bool,
}

impl OpenGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let resources = {
            let mut inner = self.shared.lock();
            if inner.epoch != self.epoch || *inner.machine.current() != SessionState::Opening {
                return;
            }
            inner.epoch += 1;
            let resources = inner.take_resources();
            let _ = self.shared.apply(&mut inner, Trigger::Close);
            resources
        };
        log::warn!("Camera open abandoned, releasing");
        release_now(resources);
    }
}

/// Releases a half-configured preview if the caller stops waiting for it.
struct PreviewGuard {
    shared: Arc<Shared>,
    epoch: u64,
    armed: bool,
}

impl PreviewGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PreviewGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let resources = {
            let mut inner = self.shared.lock();
            if inner.epoch != self.epoch
                || !matches!(
                    inner.machine.current(),
                    SessionState::Opened | SessionState::Streaming
                )
            {
                return;
            }
            inner.preview_target = None;
            let resources = inner.take_preview_resources();
            let cause = CameraError::Backend("preview start abandoned".to_string());
            if let Err(e) = self.shared.apply(&mut inner, Trigger::PreviewFailed(cause)) {
                log::warn!("Failed to leave preview state: {}", e);
            }
            resources
        };
        log::warn!("Preview start abandoned, releasing capture session");
        release_now(resources);
    }
}

/// Returns the session to `Streaming` however a still capture ends.
struct CaptureGuard {
    shared: Arc<Shared>,
    epoch: u64,
    reader: Arc<ImageReader>,
    handler: Handler,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        // A capture still in flight must not leave its image for the next caller.
        self.reader
            .set_listener(Some(drain_listener()), Some(self.handler.clone()));
        if inner.epoch == self.epoch && *inner.machine.current() == SessionState::Capturing {
            if let Err(e) = self.shared.apply(&mut inner, Trigger::CaptureFinished) {
                log::warn!("Failed to leave capture state: {}", e);
            }
        }
    }
}

/// One still capture in flight.
struct StillCapture {
    completer: Mutex<Option<bridge::Completer<Result<CapturedImage>>>>,
    /// Set once the request is on its way; images queued before belong to nobody.
    submitted: AtomicBool,
}

impl StillCapture {
    fn new(completer: bridge::Completer<Result<CapturedImage>>) -> Arc<Self> {
        Arc::new(Self {
            completer: Mutex::new(Some(completer)),
            submitted: AtomicBool::new(false),
        })
    }

    fn resolve(&self, value: Result<CapturedImage>) {
        let completer = self
            .completer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(completer) = completer {
            completer.complete(value);
        }
    }

    /// Drop leftovers of earlier captures, then accept the next image.
    fn submit(&self, reader: &Arc<ImageReader>) {
        if let Some(stale) = reader.acquire_latest_image() {
            log::debug!("Discarding still left by an abandoned capture");
            stale.release();
        }
        self.submitted.store(true, Ordering::Release);
    }

    fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }
}

impl Release for CapturedImage {
    fn release(self) {}
}

fn still_listener(
    capture: Arc<StillCapture>,
    rotation_degrees: u32,
    facing: LensFacing,
) -> ImageAvailableListener {
    Arc::new(move |reader: &Arc<ImageReader>| {
        if reader.is_closed() {
            capture.resolve(Err(CameraError::CaptureFailed(
                "still pool closed".to_string(),
            )));
            return;
        }
        if !capture.is_submitted() {
            return;
        }
        let Some(image) = reader.acquire_next_image() else {
            return;
        };
        let captured = CapturedImage {
            data: Bytes::copy_from_slice(image.data()),
            width: image.width(),
            height: image.height(),
            rotation_degrees,
            timestamp_nanos: image.timestamp_nanos(),
            facing,
        };
        image.release();
        capture.resolve(Ok(captured));
    })
}

fn device_from_event(event: DeviceStateEvent) -> Result<Box<dyn CameraDevice>> {
    match event {
        DeviceStateEvent::Opened(device) => Ok(device),
        DeviceStateEvent::Disconnected(device) => {
            let id = device.id().to_string();
            device.release();
            Err(CameraError::DeviceOpenFailed(format!(
                "camera {} disconnected while opening",
                id
            )))
        }
        DeviceStateEvent::Error(device, code) => {
            let id = device.id().to_string();
            device.release();
            if code == ERROR_CAMERA_DISABLED {
                Err(CameraError::PermissionDenied(format!(
                    "camera {} is disabled",
                    id
                )))
            } else {
                Err(CameraError::DeviceOpenFailed(format!(
                    "camera {} reported error {}",
                    id, code
                )))
            }
        }
    }
}

/// A single camera device and everything streaming from it.
///
/// Not `Clone`: share it by reference or inside managed application state.
pub struct CameraSession {
    provider: Arc<dyn CameraProvider>,
    options: SessionOptions,
    pub(crate) shared: Arc<Shared>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl CameraSession {
    pub fn new(provider: Arc<dyn CameraProvider>) -> Self {
        Self::with_options(provider, SessionOptions::default())
    }

    pub fn with_options(provider: Arc<dyn CameraProvider>, options: SessionOptions) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (zoom_tx, _) = watch::channel(1.0);
        let (flash_tx, _) = watch::channel(options.initial_flash);
        Self {
            provider,
            options,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::new()),
                state_tx,
                zoom_tx,
                flash_tx,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Open the first device facing `config.facing`.
    ///
    /// Does nothing while a device is already open.
    pub async fn open(&self, config: StreamConfig) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.open_locked(config).await
    }

    /// Configure outputs for `target` and start the repeating preview request.
    pub async fn start_preview(&self, target: RenderTarget) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_preview_locked(target).await
    }

    /// Close, flip the lens facing, reopen and restart the preview.
    ///
    /// Without a target the previous preview target is reused, if any.
    pub async fn switch_camera(&self, target: Option<RenderTarget>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let (config, previous_target) = {
            let inner = self.shared.lock();
            (
                inner.config.or(inner.last_config),
                inner.preview_target.clone(),
            )
        };
        let config = config.ok_or_else(|| {
            CameraError::InvalidState("no camera has been opened to switch from".to_string())
        })?;
        let target = target.or(previous_target);

        self.close_locked().await;
        let next = config.with_facing(config.facing.flipped());
        log::info!("Switching camera {} -> {}", config.facing, next.facing);
        self.open_locked(next).await?;
        if let Some(target) = target {
            self.start_preview_locked(target).await?;
        }
        Ok(())
    }

    /// Release everything and return to `Idle`. Safe from any state.
    pub async fn close_camera(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.close_locked().await;
    }

    /// Take a still image. `None` unless streaming, or if the capture fails.
    pub async fn capture_image(&self) -> Option<CapturedImage> {
        let (capture, pending, guard, handler, request, still) = {
            let mut inner = self.shared.lock();
            if *inner.machine.current() != SessionState::Streaming {
                log::debug!("Ignoring capture in state {}", inner.machine.current());
                return None;
            }
            let (Some(descriptor), Some(still), Some(handler)) = (
                inner.descriptor.as_ref(),
                inner.still_reader.clone(),
                inner.handler(),
            ) else {
                return None;
            };
            let (rotation, facing) = (descriptor.sensor_orientation, descriptor.facing);
            let request = CaptureRequest::build(
                RequestTemplate::StillCapture,
                vec![still.id()],
                descriptor,
                &inner.controls,
            );
            if let Err(e) = self.shared.apply(&mut inner, Trigger::CaptureStarted) {
                log::warn!("Cannot start capture: {}", e);
                return None;
            }

            let (completer, pending) = bridge::one_shot("still_capture");
            let capture = StillCapture::new(completer);
            still.set_listener(
                Some(still_listener(Arc::clone(&capture), rotation, facing)),
                Some(handler.clone()),
            );
            let guard = CaptureGuard {
                shared: Arc::clone(&self.shared),
                epoch: inner.epoch,
                reader: Arc::clone(&still),
                handler: handler.clone(),
            };
            (capture, pending, guard, handler, request, still)
        };

        let shared = Arc::clone(&self.shared);
        let job_capture = Arc::clone(&capture);
        let posted = handler.post(move || {
            let mut inner = shared.lock();
            let callback_capture = Arc::clone(&job_capture);
            job_capture.submit(&still);
            let submitted = match inner.capture_session.as_mut() {
                Some(session) => session.capture(
                    &request,
                    Box::new(move |outcome| {
                        if let CaptureOutcome::Failed(e) = outcome {
                            callback_capture.resolve(Err(e));
                        }
                    }),
                ),
                None => Err(CameraError::InvalidState(
                    "capture session closed".to_string(),
                )),
            };
            if let Err(e) = submitted {
                job_capture.resolve(Err(e));
            }
        });
        if !posted {
            capture.resolve(Err(CameraError::InvalidState(
                "camera executor stopped".to_string(),
            )));
        }

        let result = pending.await;
        drop(guard);
        match result {
            Ok(Ok(image)) => {
                log::info!(
                    "Captured {}x{} still ({} bytes)",
                    image.width,
                    image.height,
                    image.data.len()
                );
                Some(image)
            }
            Ok(Err(e)) | Err(e) => {
                log::warn!("Still capture failed: {}", e);
                None
            }
        }
    }

    async fn open_locked(&self, config: StreamConfig) -> Result<()> {
        let stale = {
            let mut inner = self.shared.lock();
            if inner.machine.current().is_active() {
                log::debug!("Camera already open, ignoring open request");
                return Ok(());
            }
            inner.take_resources()
        };
        release(stale).await;

        let epoch = {
            let mut inner = self.shared.lock();
            inner.epoch += 1;
            inner.last_config = Some(config);
            inner.last_control_error = None;
            self.shared.apply(&mut inner, Trigger::Open)?;
            inner.epoch
        };
        log::info!("Opening {} camera", config.facing);

        let guard = OpenGuard {
            shared: Arc::clone(&self.shared),
            epoch,
            armed: true,
        };
        let result = self.open_device(config).await;

        if let Err(e) = result {
            let leftovers = {
                let mut inner = self.shared.lock();
                let leftovers = inner.take_resources();
                if let Err(err) = self.shared.apply(&mut inner, Trigger::OpenFailed(e.clone())) {
                    log::warn!("Failed to leave opening state: {}", err);
                }
                leftovers
            };
            guard.disarm();
            log::error!("Failed to open {} camera: {}", config.facing, e);
            release(leftovers).await;
            return Err(e);
        }
        guard.disarm();
        Ok(())
    }

    async fn open_device(&self, config: StreamConfig) -> Result<()> {
        let descriptor = registry::find_provider_device(self.provider.as_ref(), config.facing)?
            .ok_or(CameraError::DeviceNotFound(config.facing))?;
        let executor = CameraExecutor::start(&descriptor.id)?;
        let handler = executor.handler();
        self.shared.lock().executor = Some(executor);

        let (completer, pending) = bridge::one_shot("open_device");
        self.provider.open_device(
            &descriptor.id,
            handler,
            Box::new(move |event| {
                completer.complete(device_from_event(event));
            }),
        )?;
        let device = pending.await??;

        let controls = ControlState::new(
            config.target_fps,
            self.options.initial_flash,
            self.options.initial_focus,
        );
        let mut inner = self.shared.lock();
        log::info!(
            "Opened camera {} ({}, sensor at {} degrees)",
            descriptor.id,
            descriptor.facing,
            descriptor.sensor_orientation
        );
        inner.device = Some(device);
        inner.descriptor = Some(descriptor);
        inner.config = Some(config);
        inner.controls = controls;
        self.shared.zoom_tx.send_replace(controls.zoom_ratio);
        self.shared.flash_tx.send_replace(controls.flash_mode);
        self.shared.apply(&mut inner, Trigger::DeviceOpened)
    }

    async fn start_preview_locked(&self, target: RenderTarget) -> Result<()> {
        let (stale, epoch) = {
            let mut inner = self.shared.lock();
            let state = inner.machine.current();
            if !matches!(state, SessionState::Opened | SessionState::Streaming)
                || inner.device.is_none()
            {
                return Err(CameraError::InvalidState(format!(
                    "start_preview requires an opened camera, state is {}",
                    state
                )));
            }
            (inner.take_preview_resources(), inner.epoch)
        };
        let guard = PreviewGuard {
            shared: Arc::clone(&self.shared),
            epoch,
            armed: true,
        };
        release(stale).await;

        match self.configure_preview(target).await {
            Ok(()) => {
                guard.disarm();
                Ok(())
            }
            Err(e) => {
                let leftovers = {
                    let mut inner = self.shared.lock();
                    inner.preview_target = None;
                    let leftovers = inner.take_preview_resources();
                    if let Err(err) =
                        self.shared.apply(&mut inner, Trigger::PreviewFailed(e.clone()))
                    {
                        log::warn!("Failed to leave preview state: {}", err);
                    }
                    leftovers
                };
                guard.disarm();
                log::error!("Failed to start preview: {}", e);
                release(leftovers).await;
                Err(e)
            }
        }
    }

    async fn configure_preview(&self, target: RenderTarget) -> Result<()> {
        let (descriptor, config, handler) = {
            let inner = self.shared.lock();
            match (inner.descriptor.clone(), inner.config, inner.handler()) {
                (Some(descriptor), Some(config), Some(handler)) => (descriptor, config, handler),
                _ => return Err(CameraError::InvalidState("camera is not open".to_string())),
            }
        };

        let requested = target.size();
        let preview_size = select_preview_size(
            &descriptor,
            requested.width,
            requested.height,
            config.preview_width,
            config.preview_height,
        );
        let analysis = ImageReader::new(
            preview_size,
            StreamFormat::Yuv420,
            self.options.analysis_pool_capacity,
        );
        let still = ImageReader::new(
            config.capture_size(),
            StreamFormat::Jpeg,
            self.options.still_pool_capacity.clamp(1, 2),
        );
        {
            let mut inner = self.shared.lock();
            inner.preview_target = Some(target.clone());
            inner.preview_size = Some(preview_size);
            inner.analysis_reader = Some(Arc::clone(&analysis));
            inner.still_reader = Some(Arc::clone(&still));
        }
        log::debug!(
            "Configuring session: preview {} for surface {}, still {}",
            preview_size,
            requested,
            still.size()
        );

        let outputs = vec![
            Surface::Render(target.clone()),
            Surface::Reader(Arc::clone(&analysis)),
            Surface::Reader(Arc::clone(&still)),
        ];
        let (completer, pending) = bridge::one_shot("configure_session");
        let shared = Arc::clone(&self.shared);
        let session_handler = handler.clone();
        handler
            .run(move || {
                let mut inner = shared.lock();
                let device = inner
                    .device
                    .as_mut()
                    .ok_or_else(|| CameraError::InvalidState("camera closed".to_string()))?;
                device.create_capture_session(
                    outputs,
                    session_handler,
                    Box::new(move |event| {
                        let result = match event {
                            SessionStateEvent::Configured(session) => Ok(session),
                            SessionStateEvent::ConfigureFailed(e) => Err(e),
                        };
                        completer.complete(result);
                    }),
                )
            })
            .await??;
        let session = pending.await??;

        analysis.set_listener(Some(drain_listener()), Some(handler.clone()));

        let request = {
            let mut inner = self.shared.lock();
            inner.capture_session = Some(session);
            CaptureRequest::build(
                RequestTemplate::Preview,
                vec![target.id(), analysis.id()],
                &descriptor,
                &inner.controls,
            )
        };

        let shared = Arc::clone(&self.shared);
        let submitted = request.clone();
        handler
            .run(move || {
                let mut inner = shared.lock();
                match inner.capture_session.as_mut() {
                    Some(session) => session.set_repeating_request(&submitted),
                    None => Err(CameraError::InvalidState(
                        "capture session closed".to_string(),
                    )),
                }
            })
            .await??;

        let mut inner = self.shared.lock();
        log::info!(
            "Preview streaming at {} with fps range {}",
            preview_size,
            request.fps_range
        );
        inner.repeating = Some(request);
        self.shared.apply(&mut inner, Trigger::PreviewStarted)
    }

    async fn close_locked(&self) {
        let resources = {
            let mut inner = self.shared.lock();
            inner.epoch += 1;
            inner.config = None;
            inner.descriptor = None;
            inner.preview_target = None;
            inner.controls = ControlState::default();
            inner.take_resources()
        };
        let had_device = resources.device.is_some();
        release(resources).await;

        {
            let mut inner = self.shared.lock();
            let _ = self.shared.apply(&mut inner, Trigger::Close);
        }
        self.shared.zoom_tx.send_replace(1.0);
        if had_device {
            log::info!("Camera closed");
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn zoom_ratio(&self) -> f32 {
        *self.shared.zoom_tx.borrow()
    }

    pub fn subscribe_zoom(&self) -> watch::Receiver<f32> {
        self.shared.zoom_tx.subscribe()
    }

    pub fn flash_mode(&self) -> FlashMode {
        *self.shared.flash_tx.borrow()
    }

    pub fn subscribe_flash(&self) -> watch::Receiver<FlashMode> {
        self.shared.flash_tx.subscribe()
    }

    /// Zoom ceiling of the open device, 1.0 when closed.
    pub fn max_zoom(&self) -> f32 {
        self.shared
            .lock()
            .descriptor
            .as_ref()
            .map_or(1.0, DeviceDescriptor::max_zoom)
    }

    /// Sensor rotation of the open device, 0 when closed.
    pub fn sensor_orientation(&self) -> u32 {
        self.shared
            .lock()
            .descriptor
            .as_ref()
            .map_or(0, |d| d.sensor_orientation)
    }

    pub fn has_flash(&self) -> bool {
        self.shared
            .lock()
            .descriptor
            .as_ref()
            .map_or(false, |d| d.flash_available)
    }

    pub fn device_descriptor(&self) -> Option<DeviceDescriptor> {
        self.shared.lock().descriptor.clone()
    }

    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.shared.lock().config
    }

    /// Size the preview stream is running at.
    pub fn preview_size(&self) -> Option<Size> {
        self.shared.lock().preview_size
    }

    /// Best preview size for a surface of `width x height` on the open device.
    pub fn optimal_preview_size(&self, width: u32, height: u32) -> Option<Size> {
        let inner = self.shared.lock();
        let (descriptor, config) = (inner.descriptor.as_ref()?, inner.config?);
        Some(select_preview_size(
            descriptor,
            width,
            height,
            config.preview_width,
            config.preview_height,
        ))
    }

    /// Render-surface sizes of the open device.
    pub fn supported_preview_sizes(&self) -> Vec<Size> {
        self.shared
            .lock()
            .descriptor
            .as_ref()
            .map(|d| crate::selector::supported_preview_sizes(d).to_vec())
            .unwrap_or_default()
    }

    /// Letterboxed size of the running preview inside a view.
    pub fn fit_preview_to_view(&self, view_width: u32, view_height: u32) -> Option<Size> {
        let inner = self.shared.lock();
        let preview = inner.preview_size?;
        let orientation = inner.descriptor.as_ref()?.sensor_orientation;
        Some(fit_surface_size(preview, view_width, view_height, orientation))
    }

    /// Control values of the open device.
    pub fn control_state(&self) -> Option<ControlState> {
        let inner = self.shared.lock();
        inner.device.as_ref().map(|_| inner.controls)
    }

    /// Most recent control change the hardware rejected.
    pub fn last_control_error(&self) -> Option<CameraError> {
        self.shared.lock().last_control_error.clone()
    }

    /// Request the hardware is currently repeating.
    pub fn repeating_request(&self) -> Option<CaptureRequest> {
        self.shared.lock().repeating.clone()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        let resources = {
            let mut inner = self.shared.lock();
            inner.epoch += 1;
            let resources = inner.take_resources();
            let _ = self.shared.apply(&mut inner, Trigger::Close);
            resources
        };
        if !resources.is_empty() {
            log::debug!("Releasing camera on drop");
            release_now(resources);
        }
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("provider", &self.provider.name())
            .field("state", &self.state())
            .finish()
    }
}
