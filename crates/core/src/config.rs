//! Application configuration loaded from an optional TOML file.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//!
//! ```toml
//! [window]
//! title = "Vulkan Tutorial"
//! width = 1920
//! height = 1080
//!
//! [graphics]
//! validation = true
//! shader_dir = "assets/shaders/bin"
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{Error, Result};

/// File name looked up in the working directory at startup.
pub const DEFAULT_CONFIG_FILE: &str = "quad.toml";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub graphics: GraphicsConfig,
}

/// Initial window parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_title() -> String {
    "Vulkan Tutorial".to_string()
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

/// Rendering context parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphicsConfig {
    /// Enable the Khronos validation layer and the debug messenger.
    #[serde(default = "default_validation")]
    pub validation: bool,
    /// Directory holding the compiled SPIR-V shaders.
    #[serde(default = "default_shader_dir")]
    pub shader_dir: PathBuf,
    /// RGBA clear color of the render pass.
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
}

fn default_validation() -> bool {
    cfg!(debug_assertions)
}
fn default_shader_dir() -> PathBuf {
    PathBuf::from("assets/shaders/bin")
}
fn default_clear_color() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            validation: default_validation(),
            shader_dir: default_shader_dir(),
            clear_color: default_clear_color(),
        }
    }
}

impl AppConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::parse(text).map_err(Error::Config)
    }

    /// Load a configuration file. A missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults when it does not exist.
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let config = Self::load(path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(format!(
                "window size must be nonzero, got {}x{}",
                self.window.width, self.window.height
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.window.title, "Vulkan Tutorial");
        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.height, 1080);
        assert_eq!(config.graphics.validation, cfg!(debug_assertions));
        assert_eq!(config.graphics.shader_dir, PathBuf::from("assets/shaders/bin"));
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = AppConfig::from_toml_str(
            r#"
            [window]
            width = 800

            [graphics]
            validation = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 1080);
        assert_eq!(config.window.title, "Vulkan Tutorial");
        assert!(!config.graphics.validation);
    }

    #[test]
    fn test_malformed_document() {
        let err = AppConfig::from_toml_str("[window\nwidth = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_window_size_rejected() {
        let err = AppConfig::from_toml_str("[window]\nheight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_error_names_file_once() {
        let path = std::env::temp_dir().join(format!("quad-bad-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = 0\n").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);

        let message = err.to_string();
        assert!(matches!(err, Error::Config(_)));
        assert!(message.contains(&path.display().to_string()));
        assert!(message.contains("window size must be nonzero"));
        assert_eq!(message.matches("Config error").count(), 1, "{}", message);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = AppConfig::load_or_default("does/not/exist/quad.toml").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_missing_file_strict_load_fails() {
        let err = AppConfig::load("does/not/exist/quad.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
