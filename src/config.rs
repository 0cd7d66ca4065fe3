//! Configuration management for the camera session
//!
//! Settings come from an optional TOML file overlaid with `TRYANGLE_*`
//! environment variables, e.g. `TRYANGLE_CAMERA__TARGET_FPS=30`.

use crate::errors::{CameraError, Result};
use crate::session::SessionOptions;
use crate::types::{FlashMode, FocusMode, LensFacing, StreamConfig};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "TRYANGLE";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TryAngleConfig {
    pub camera: CameraSection,
    pub buffers: BufferSection,
    pub controls: ControlSection,
}

/// Stream negotiation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    /// Lens to open first
    pub facing: LensFacing,
    /// Target frames per second
    pub target_fps: i32,
    /// Upper bound for the preview stream [width, height]
    pub preview_resolution: [u32; 2],
    /// Still capture size [width, height]
    pub capture_resolution: [u32; 2],
}

/// Buffer pool sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSection {
    /// Analysis frames in flight, queued plus held by the consumer
    pub analysis_pool_capacity: usize,
    /// Still images in flight (1 or 2)
    pub still_pool_capacity: usize,
}

/// Control values applied when a camera opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    pub flash: FlashMode,
    pub auto_focus: bool,
}

impl Default for CameraSection {
    fn default() -> Self {
        let stream = StreamConfig::DEFAULT;
        Self {
            facing: stream.facing,
            target_fps: stream.target_fps,
            preview_resolution: [stream.preview_width, stream.preview_height],
            capture_resolution: [stream.capture_width, stream.capture_height],
        }
    }
}

impl Default for BufferSection {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            analysis_pool_capacity: options.analysis_pool_capacity,
            still_pool_capacity: options.still_pool_capacity,
        }
    }
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            flash: FlashMode::Off,
            auto_focus: true,
        }
    }
}

impl TryAngleConfig {
    /// Load configuration from a TOML file plus environment overrides
    ///
    /// A missing file is not an error; defaults fill every unset value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_prefix(path.as_ref(), ENV_PREFIX)
    }

    pub(crate) fn load_with_prefix(path: &Path, prefix: &str) -> Result<Self> {
        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
        }

        let settings = Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TryAngleConfig = settings.try_deserialize()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("tryangle.toml")
    }

    /// Load from default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        let [pw, ph] = self.camera.preview_resolution;
        if pw == 0 || ph == 0 {
            return Err("Invalid preview resolution".to_string());
        }
        let [cw, ch] = self.camera.capture_resolution;
        if cw == 0 || ch == 0 {
            return Err("Invalid capture resolution".to_string());
        }
        if self.camera.target_fps <= 0 || self.camera.target_fps > 240 {
            return Err("Invalid target FPS (must be 1-240)".to_string());
        }

        if self.buffers.analysis_pool_capacity == 0 || self.buffers.analysis_pool_capacity > 16 {
            return Err("Analysis pool capacity must be between 1 and 16".to_string());
        }
        if !(1..=2).contains(&self.buffers.still_pool_capacity) {
            return Err("Still pool capacity must be 1 or 2".to_string());
        }

        Ok(())
    }

    /// Stream parameters for `CameraSession::open`
    pub fn stream_config(&self) -> StreamConfig {
        let [pw, ph] = self.camera.preview_resolution;
        let [cw, ch] = self.camera.capture_resolution;
        StreamConfig::DEFAULT
            .with_facing(self.camera.facing)
            .with_target_fps(self.camera.target_fps)
            .with_preview_size(pw, ph)
            .with_capture_size(cw, ch)
    }

    /// Pool sizes and initial controls for `CameraSession::with_options`
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            analysis_pool_capacity: self.buffers.analysis_pool_capacity,
            still_pool_capacity: self.buffers.still_pool_capacity,
            initial_flash: self.controls.flash,
            initial_focus: FocusMode::from_auto(self.controls.auto_focus),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = TryAngleConfig::default();
        assert_eq!(config.camera.preview_resolution, [1920, 1080]);
        assert_eq!(config.camera.target_fps, 60);
        assert_eq!(config.camera.facing, LensFacing::Front);
        assert_eq!(config.buffers.analysis_pool_capacity, 3);
        assert!(config.controls.auto_focus);
        assert_eq!(config.stream_config(), StreamConfig::DEFAULT);
    }

    #[test]
    fn test_config_validation() {
        let config = TryAngleConfig::default();
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.camera.preview_resolution = [0, 1080];
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.buffers.still_pool_capacity = 3;
        assert!(bad.validate().is_err());

        let mut bad = config;
        bad.camera.target_fps = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("tryangle.toml");

        let mut config = TryAngleConfig::default();
        config.camera.facing = LensFacing::Back;
        config.camera.target_fps = 30;
        config.controls.flash = FlashMode::Auto;
        config.save_to_file(&path).unwrap();

        let loaded = TryAngleConfig::load_with_prefix(&path, "TRYANGLE_TEST_ROUNDTRIP").unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.stream_config().facing, LensFacing::Back);
        assert_eq!(loaded.session_options().initial_flash, FlashMode::Auto);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[camera]\ntarget_fps = 24\n").unwrap();

        let loaded = TryAngleConfig::load_with_prefix(&path, "TRYANGLE_TEST_PARTIAL").unwrap();
        assert_eq!(loaded.camera.target_fps, 24);
        assert_eq!(loaded.camera.capture_resolution, [1920, 1080]);
        assert_eq!(loaded.buffers, BufferSection::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(&path, "[buffers]\nanalysis_pool_capacity = 4\n").unwrap();

        std::env::set_var("TRYANGLE_TEST_ENV_BUFFERS__ANALYSIS_POOL_CAPACITY", "6");
        let loaded = TryAngleConfig::load_with_prefix(&path, "TRYANGLE_TEST_ENV").unwrap();
        std::env::remove_var("TRYANGLE_TEST_ENV_BUFFERS__ANALYSIS_POOL_CAPACITY");

        assert_eq!(loaded.buffers.analysis_pool_capacity, 6);
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&TryAngleConfig::default()).unwrap();
        assert!(toml_string.contains("[camera]"));
        assert!(toml_string.contains("[buffers]"));
        assert!(toml_string.contains("[controls]"));
        assert!(toml_string.contains("facing = \"front\""));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = TryAngleConfig::load_with_prefix(
            Path::new("nonexistent_tryangle.toml"),
            "TRYANGLE_TEST_MISSING",
        );
        assert_eq!(result.unwrap(), TryAngleConfig::default());
    }
}
