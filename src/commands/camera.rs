use crate::commands::service::{CameraInfo, CameraService, FrameSnapshot, StillImage};
use crate::state::SessionState;
use crate::types::{DeviceDescriptor, LensFacing, Size};
use tauri::{command, State};

/// List the cameras the backend can open
#[command]
pub async fn list_cameras(service: State<'_, CameraService>) -> Result<Vec<DeviceDescriptor>, String> {
    match service.list_cameras() {
        Ok(cameras) => {
            log::info!("Found {} cameras", cameras.len());
            for camera in &cameras {
                log::debug!("Camera: {} ({})", camera.id, camera.facing);
            }
            Ok(cameras)
        }
        Err(e) => {
            log::error!("Failed to list cameras: {}", e);
            Err(format!("Failed to list cameras: {}", e))
        }
    }
}

/// Open the camera facing `facing`, or the configured default
#[command]
pub async fn open_camera(
    service: State<'_, CameraService>,
    facing: Option<LensFacing>,
) -> Result<SessionState, String> {
    log::info!("Opening camera: {:?}", facing);
    service.open(facing).await.map_err(|e| {
        log::error!("Failed to open camera: {}", e);
        format!("Failed to open camera: {}", e)
    })
}

/// Start the preview for a surface of `width x height`
#[command]
pub async fn start_preview(
    service: State<'_, CameraService>,
    width: u32,
    height: u32,
) -> Result<Size, String> {
    match service.start_preview(width, height).await {
        Ok(size) => {
            log::info!("Preview started at {} for {}x{} surface", size, width, height);
            Ok(size)
        }
        Err(e) => {
            log::error!("Failed to start preview: {}", e);
            Err(format!("Failed to start preview: {}", e))
        }
    }
}

#[command]
pub async fn switch_camera(service: State<'_, CameraService>) -> Result<SessionState, String> {
    service.switch_camera().await.map_err(|e| {
        log::error!("Failed to switch camera: {}", e);
        format!("Failed to switch camera: {}", e)
    })
}

#[command]
pub async fn close_camera(service: State<'_, CameraService>) -> Result<(), String> {
    service.close().await;
    Ok(())
}

/// Take a still image
#[command]
pub async fn capture_image(service: State<'_, CameraService>) -> Result<StillImage, String> {
    match service.capture().await {
        Ok(image) => {
            log::info!(
                "Captured still: {}x{} ({} bytes)",
                image.width,
                image.height,
                image.data.len()
            );
            Ok(image)
        }
        Err(e) => {
            log::warn!("Capture failed: {}", e);
            Err(format!("Capture failed: {}", e))
        }
    }
}

#[command]
pub async fn get_camera_state(service: State<'_, CameraService>) -> Result<SessionState, String> {
    Ok(service.session().state())
}

#[command]
pub async fn get_camera_info(service: State<'_, CameraService>) -> Result<CameraInfo, String> {
    Ok(service.info())
}

/// Newest analysis frame, if the preview is running
#[command]
pub async fn get_preview_frame(
    service: State<'_, CameraService>,
) -> Result<Option<FrameSnapshot>, String> {
    Ok(service.latest_frame())
}

/// Letterboxed preview size for a view of `width x height`
#[command]
pub async fn fit_preview_to_view(
    service: State<'_, CameraService>,
    width: u32,
    height: u32,
) -> Result<Size, String> {
    service
        .session()
        .fit_preview_to_view(width, height)
        .ok_or_else(|| "Preview is not running".to_string())
}
