//! TryAngle camera core: device lookup, stream negotiation, live controls
//! and frame fan-out for a single camera session.
//!
//! # Features
//! - Facing-based device lookup over any [`platform::CameraProvider`]
//! - Preview size and frame-rate negotiation against device capabilities
//! - A session state machine observable through `tokio::sync::watch`
//! - Live zoom, flash, frame-rate, exposure and focus controls
//! - Bounded analysis and still image pools with a pull-based frame stream
//! - A simulated camera stack for hardware-free tests
//!
//! # Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use tryangle_camera::{CameraSession, RenderTarget, StreamConfig};
//! use tryangle_camera::testing::SimulatedProvider;
//!
//! let session = CameraSession::new(Arc::new(SimulatedProvider::phone()));
//! session.open(StreamConfig::BACK_CAMERA).await?;
//! session.start_preview(RenderTarget::new(1080, 1920)).await?;
//! let still = session.capture_image().await;
//! ```
//!
//! With the `plugin` feature the session is exposed to a Tauri app:
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(tryangle_camera::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
pub mod bridge;
pub mod config;
pub mod controls;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod image_reader;
pub mod platform;
pub mod registry;
pub mod request;
pub mod selector;
pub mod session;
pub mod state;
pub mod types;

#[cfg(feature = "plugin")]
pub mod commands;

// Testing utilities - simulated hardware for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::TryAngleConfig;
pub use controls::ControlState;
pub use dispatcher::{FrameStream, PreviewFrame};
pub use errors::{CameraError, Result};
pub use image_reader::{AcquiredImage, ImageReader};
pub use platform::{CameraProvider, RenderTarget};
pub use session::{CameraSession, SessionOptions};
pub use state::SessionState;
pub use types::{
    CapturedImage, DeviceDescriptor, FlashMode, FocusMode, FpsRange, LensFacing, Size,
    StreamConfig,
};

#[cfg(feature = "native")]
pub use platform::native::NativeProvider;

#[cfg(feature = "plugin")]
use tauri::{
    plugin::{Builder, TauriPlugin},
    Manager, Runtime,
};

/// Initialize the TryAngle camera plugin with all commands
#[cfg(feature = "plugin")]
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("tryangle-camera")
        .invoke_handler(tauri::generate_handler![
            // Session lifecycle
            commands::camera::list_cameras,
            commands::camera::open_camera,
            commands::camera::start_preview,
            commands::camera::switch_camera,
            commands::camera::close_camera,
            commands::camera::capture_image,
            commands::camera::get_camera_state,
            commands::camera::get_camera_info,
            commands::camera::get_preview_frame,
            commands::camera::fit_preview_to_view,
            // Live controls
            commands::controls::set_zoom,
            commands::controls::set_flash_mode,
            commands::controls::set_frame_rate,
            commands::controls::set_exposure_compensation,
            commands::controls::set_focus_mode,
        ])
        .setup(|app, _api| {
            let config = TryAngleConfig::load_or_default();
            let config = match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    log::warn!("Invalid camera configuration ({}), using defaults", e);
                    TryAngleConfig::default()
                }
            };
            let provider = std::sync::Arc::new(NativeProvider::new());
            app.manage(commands::CameraService::new(provider, config));
            Ok(())
        })
        .build()
}

/// Initialize logging for the camera core
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "tryangle_camera=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
