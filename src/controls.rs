//! Live capture controls.
//!
//! Each setter stores the new value immediately and, if the hardware is
//! repeating a preview request, queues a re-submission on the executor.
//! Setters never change the session state and never fail the caller; a
//! rejected request is logged and kept as the last control error.

use crate::errors::CameraError;
use crate::request::{clamp_zoom, CaptureRequest, RequestTemplate};
use crate::session::{CameraSession, Inner, Shared};
use crate::types::{FlashMode, FocusMode};
use serde::Serialize;
use std::sync::Arc;

/// Control values owned by an open session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlState {
    pub zoom_ratio: f32,
    pub flash_mode: FlashMode,
    pub target_fps: i32,
    pub exposure_compensation: i32,
    pub focus_mode: FocusMode,
}

impl ControlState {
    pub fn new(target_fps: i32, flash_mode: FlashMode, focus_mode: FocusMode) -> Self {
        Self {
            zoom_ratio: 1.0,
            flash_mode,
            target_fps,
            exposure_compensation: 0,
            focus_mode,
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(30, FlashMode::Off, FocusMode::Auto)
    }
}

impl CameraSession {
    /// Set digital zoom, clamped to `[1.0, max_zoom]`.
    pub fn set_zoom(&self, ratio: f32) {
        self.update_controls("zoom", |inner, shared| {
            let max_zoom = inner.descriptor.as_ref().map_or(1.0, |d| d.max_zoom());
            let clamped = clamp_zoom(ratio, max_zoom);
            if clamped != ratio {
                log::debug!("Zoom {} clamped to {}", ratio, clamped);
            }
            inner.controls.zoom_ratio = clamped;
            shared.zoom_tx.send_replace(clamped);
            Ok(())
        });
    }

    pub fn set_flash_mode(&self, mode: FlashMode) {
        self.update_controls("flash", |inner, shared| {
            if inner.descriptor.as_ref().map_or(false, |d| !d.flash_available) {
                log::debug!("Camera has no flash unit, storing {:?} only", mode);
            }
            inner.controls.flash_mode = mode;
            shared.flash_tx.send_replace(mode);
            Ok(())
        });
    }

    /// Change the target frame rate; the AE range is re-selected from the device.
    pub fn set_frame_rate(&self, fps: i32) {
        self.update_controls("frame rate", |inner, _| {
            if fps <= 0 {
                return Err(CameraError::Config(format!(
                    "frame rate must be positive, got {}",
                    fps
                )));
            }
            inner.controls.target_fps = fps;
            if let Some(config) = inner.config.as_mut() {
                config.target_fps = fps;
            }
            Ok(())
        });
    }

    /// Exposure compensation index, clamped to the device's range.
    pub fn set_exposure_compensation(&self, value: i32) {
        self.update_controls("exposure compensation", |inner, _| {
            let clamped = inner
                .descriptor
                .as_ref()
                .map_or(0, |d| d.clamp_exposure_compensation(value));
            inner.controls.exposure_compensation = clamped;
            Ok(())
        });
    }

    /// Continuous auto-focus when `auto`, focus held otherwise.
    pub fn set_focus_mode(&self, auto: bool) {
        self.update_controls("focus", |inner, _| {
            inner.controls.focus_mode = FocusMode::from_auto(auto);
            Ok(())
        });
    }

    fn update_controls<F>(&self, control: &'static str, mutate: F)
    where
        F: FnOnce(&mut Inner, &Shared) -> crate::errors::Result<()>,
    {
        let mut inner = self.shared.lock();
        if inner.device.is_none() {
            log::debug!("Ignoring {} change, no camera open", control);
            return;
        }
        if let Err(e) = mutate(&mut *inner, &*self.shared) {
            log::warn!("Rejected {} change: {}", control, e);
            inner.last_control_error = Some(e);
            return;
        }
        resubmit(&self.shared, &mut *inner, control);
    }
}

/// Rebuild the repeating request from the controls and queue it.
fn resubmit(shared: &Arc<Shared>, inner: &mut Inner, control: &'static str) {
    let (Some(current), Some(descriptor)) = (inner.repeating.as_ref(), inner.descriptor.as_ref())
    else {
        return;
    };
    let request = CaptureRequest::build(
        RequestTemplate::Preview,
        current.targets.clone(),
        descriptor,
        &inner.controls,
    );
    inner.repeating = Some(request.clone());

    let Some(handler) = inner.handler() else {
        return;
    };
    let epoch = inner.epoch;
    let job_shared = Arc::clone(shared);
    let posted = handler.post(move || {
        let mut inner = job_shared.lock();
        if inner.epoch != epoch {
            return;
        }
        let Some(session) = inner.capture_session.as_mut() else {
            return;
        };
        match session.set_repeating_request(&request) {
            Ok(()) => log::debug!("Re-submitted preview request after {} change", control),
            Err(e) => {
                log::warn!("Hardware rejected {} change: {}", control, e);
                inner.last_control_error = Some(e);
            }
        }
    });
    if !posted {
        log::warn!("Camera executor stopped, {} change not applied", control);
        inner.last_control_error = Some(CameraError::InvalidState(
            "camera executor stopped".to_string(),
        ));
    }
}
