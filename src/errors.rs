use crate::types::LensFacing;

/// Errors raised by the camera core and its hardware backends.
///
/// The type is `Clone` so a failure can be carried as the cause inside
/// [`crate::state::SessionState::Error`] while also being returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("No camera device faces {0}")]
    DeviceNotFound(LensFacing),
    #[error("Camera device failed to open: {0}")]
    DeviceOpenFailed(String),
    #[error("Capture session configuration failed: {0}")]
    SessionConfigurationFailed(String),
    #[error("Still capture failed: {0}")]
    CaptureFailed(String),
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Operation not valid in camera state {0}")]
    InvalidState(String),
    #[error("Camera backend error: {0}")]
    Backend(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CameraError {
    /// True for failures the caller can only recover from by re-opening.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::DeviceNotFound(_)
                | CameraError::DeviceOpenFailed(_)
                | CameraError::SessionConfigurationFailed(_)
                | CameraError::PermissionDenied(_)
        )
    }
}

impl From<config::ConfigError> for CameraError {
    fn from(e: config::ConfigError) -> Self {
        CameraError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CameraError>;
