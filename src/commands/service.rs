use crate::config::TryAngleConfig;
use crate::controls::ControlState;
use crate::dispatcher::PreviewFrame;
use crate::errors::{CameraError, Result};
use crate::platform::{CameraProvider, RenderTarget};
use crate::registry::DeviceRegistry;
use crate::session::CameraSession;
use crate::state::SessionState;
use crate::types::{CapturedImage, DeviceDescriptor, FlashMode, LensFacing, Size};
use futures::StreamExt;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Most recent analysis frame, copied out of the pool for the webview.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: u32,
    pub timestamp_nanos: i64,
}

impl From<&PreviewFrame> for FrameSnapshot {
    fn from(frame: &PreviewFrame) -> Self {
        Self {
            data: frame.data().to_vec(),
            width: frame.width(),
            height: frame.height(),
            rotation_degrees: frame.rotation_degrees,
            timestamp_nanos: frame.timestamp_nanos,
        }
    }
}

/// Still image as returned to the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct StillImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: u32,
    pub timestamp_nanos: i64,
}

impl From<CapturedImage> for StillImage {
    fn from(image: CapturedImage) -> Self {
        Self {
            data: image.data.to_vec(),
            width: image.width,
            height: image.height,
            rotation_degrees: image.rotation_degrees,
            timestamp_nanos: image.timestamp_nanos,
        }
    }
}

/// Snapshot of everything the UI shows about the open camera.
#[derive(Debug, Clone, Serialize)]
pub struct CameraInfo {
    pub state: SessionState,
    pub facing: Option<LensFacing>,
    pub zoom_ratio: f32,
    pub max_zoom: f32,
    pub flash_mode: FlashMode,
    pub has_flash: bool,
    pub sensor_orientation: u32,
    pub preview_size: Option<Size>,
    pub supported_preview_sizes: Vec<Size>,
    pub controls: Option<ControlState>,
    pub last_control_error: Option<String>,
}

/// Managed plugin state: one session plus the latest-frame sink.
pub struct CameraService {
    provider: Arc<dyn CameraProvider>,
    session: CameraSession,
    config: TryAngleConfig,
    latest_frame: Arc<Mutex<Option<FrameSnapshot>>>,
}

fn lock_frame(frame: &Mutex<Option<FrameSnapshot>>) -> MutexGuard<'_, Option<FrameSnapshot>> {
    frame.lock().unwrap_or_else(|e| e.into_inner())
}

impl CameraService {
    pub fn new(provider: Arc<dyn CameraProvider>, config: TryAngleConfig) -> Self {
        let session = CameraSession::with_options(Arc::clone(&provider), config.session_options());
        Self {
            provider,
            session,
            config,
            latest_frame: Arc::new(Mutex::new(None)),
        }
    }

    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    pub fn config(&self) -> &TryAngleConfig {
        &self.config
    }

    pub fn list_cameras(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(DeviceRegistry::snapshot(self.provider.as_ref())?
            .descriptors()
            .to_vec())
    }

    /// Open the configured camera, or the one facing `facing`.
    pub async fn open(&self, facing: Option<LensFacing>) -> Result<SessionState> {
        let mut stream = self.config.stream_config();
        if let Some(facing) = facing {
            stream = stream.with_facing(facing);
        }
        self.session.open(stream).await?;
        Ok(self.session.state())
    }

    pub async fn start_preview(&self, width: u32, height: u32) -> Result<Size> {
        if width == 0 || height == 0 {
            return Err(CameraError::Config(format!(
                "Invalid preview surface {}x{}",
                width, height
            )));
        }
        self.session
            .start_preview(RenderTarget::new(width, height))
            .await?;
        self.attach_frame_sink();
        self.session
            .preview_size()
            .ok_or_else(|| CameraError::InvalidState("preview not running".to_string()))
    }

    pub async fn switch_camera(&self) -> Result<SessionState> {
        self.session.switch_camera(None).await?;
        if self.session.state() == SessionState::Streaming {
            self.attach_frame_sink();
        }
        Ok(self.session.state())
    }

    pub async fn close(&self) {
        self.session.close_camera().await;
        lock_frame(&self.latest_frame).take();
    }

    pub async fn capture(&self) -> Result<StillImage> {
        self.session
            .capture_image()
            .await
            .map(StillImage::from)
            .ok_or_else(|| {
                CameraError::CaptureFailed(format!(
                    "no image captured in state {}",
                    self.session.state()
                ))
            })
    }

    pub fn latest_frame(&self) -> Option<FrameSnapshot> {
        lock_frame(&self.latest_frame).clone()
    }

    pub fn info(&self) -> CameraInfo {
        let descriptor = self.session.device_descriptor();
        CameraInfo {
            state: self.session.state(),
            facing: descriptor.as_ref().map(|d| d.facing),
            zoom_ratio: self.session.zoom_ratio(),
            max_zoom: self.session.max_zoom(),
            flash_mode: self.session.flash_mode(),
            has_flash: self.session.has_flash(),
            sensor_orientation: self.session.sensor_orientation(),
            preview_size: self.session.preview_size(),
            supported_preview_sizes: self.session.supported_preview_sizes(),
            controls: self.session.control_state(),
            last_control_error: self.session.last_control_error().map(|e| e.to_string()),
        }
    }

    /// Keep the newest analysis frame around for polling.
    fn attach_frame_sink(&self) {
        let mut frames = self.session.preview_frames();
        let latest = Arc::clone(&self.latest_frame);
        tauri::async_runtime::spawn(async move {
            while let Some(frame) = frames.next().await {
                let snapshot = FrameSnapshot::from(&frame);
                frame.release();
                *lock_frame(&latest) = Some(snapshot);
            }
            log::debug!("Preview frame sink finished");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedProvider;
    use std::time::Duration;

    fn service() -> (SimulatedProvider, CameraService) {
        let provider = SimulatedProvider::phone();
        let service = CameraService::new(Arc::new(provider.clone()), TryAngleConfig::default());
        (provider, service)
    }

    #[tokio::test]
    async fn test_service_preview_and_capture() {
        let (provider, service) = service();
        assert_eq!(service.list_cameras().unwrap().len(), 2);

        let state = service.open(Some(LensFacing::Back)).await.unwrap();
        assert_eq!(state, SessionState::Opened);
        let size = service.start_preview(1080, 1920).await.unwrap();
        assert_eq!(size, Size::new(1920, 1080));

        let still = service.capture().await.unwrap();
        assert!(crate::testing::looks_like_jpeg(&still.data));

        let mut frame = None;
        for _ in 0..50 {
            provider.emit_preview_frame();
            tokio::time::sleep(Duration::from_millis(10)).await;
            frame = service.latest_frame();
            if frame.is_some() {
                break;
            }
        }
        assert!(frame.is_some());

        let info = service.info();
        assert_eq!(info.facing, Some(LensFacing::Back));
        assert_eq!(info.max_zoom, 8.0);

        service.close().await;
        assert!(service.latest_frame().is_none());
        assert_eq!(service.info().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_service_rejects_empty_surface() {
        let (_, service) = service();
        service.open(None).await.unwrap();
        assert!(matches!(
            service.start_preview(0, 720).await,
            Err(CameraError::Config(_))
        ));
        assert!(service.capture().await.is_err());
    }
}
