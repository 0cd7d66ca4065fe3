use crate::commands::service::CameraService;
use crate::types::FlashMode;
use tauri::{command, State};

/// Set digital zoom; returns the ratio actually applied
#[command]
pub async fn set_zoom(service: State<'_, CameraService>, ratio: f32) -> Result<f32, String> {
    let session = service.session();
    session.set_zoom(ratio);
    let applied = session.zoom_ratio();
    log::debug!("Zoom requested {} applied {}", ratio, applied);
    Ok(applied)
}

#[command]
pub async fn set_flash_mode(
    service: State<'_, CameraService>,
    mode: FlashMode,
) -> Result<FlashMode, String> {
    let session = service.session();
    if !session.has_flash() {
        log::info!("Camera has no flash unit, {:?} will have no effect", mode);
    }
    session.set_flash_mode(mode);
    Ok(session.flash_mode())
}

#[command]
pub async fn set_frame_rate(service: State<'_, CameraService>, fps: i32) -> Result<(), String> {
    if fps <= 0 || fps > 240 {
        return Err(format!("Invalid frame rate {} (must be 1-240)", fps));
    }
    service.session().set_frame_rate(fps);
    Ok(())
}

#[command]
pub async fn set_exposure_compensation(
    service: State<'_, CameraService>,
    value: i32,
) -> Result<(), String> {
    service.session().set_exposure_compensation(value);
    Ok(())
}

#[command]
pub async fn set_focus_mode(service: State<'_, CameraService>, auto: bool) -> Result<(), String> {
    service.session().set_focus_mode(auto);
    Ok(())
}
