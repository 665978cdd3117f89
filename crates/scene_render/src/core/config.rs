//! # Unified Configuration System
//!
//! Configuration for the render system: engine behavior, the screen render
//! target and per-scene batching resources. Every struct is serde
//! serializable and can be loaded from TOML or RON through [`Config`].
//!
//! Missing fields fall back to their defaults, so a config file only has to
//! name what it changes.

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// # Engine Configuration
///
/// Core behavior: logging and frame pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Target FPS for frame rate limiting
    pub target_fps: Option<u32>,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            target_fps: None,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set target FPS
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Screen Configuration
///
/// Size and clear color of the screen render target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
    /// RGBA clear color
    pub clear_color: [f32; 4],
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            clear_color: [0.3, 0.3, 0.3, 0.0],
        }
    }
}

/// # Scene Configuration
///
/// Batching strategy and initial sizes of the GPU buffers a scene owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Use GPU multi-draw with invocation records instead of per-object state
    pub multirender: bool,
    /// Initial capacity, in matrices, of the CPU-instancing buffer
    pub initial_instance_capacity: usize,
    /// Initial capacity, in records, of the invocation record buffer
    pub initial_record_capacity: usize,
    /// Multiplier applied to buffer capacity when it has to grow
    pub growth_factor: f32,
}

impl SceneConfig {
    /// Enable or disable multirender
    pub fn with_multirender(mut self, enabled: bool) -> Self {
        self.multirender = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.growth_factor <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "growth factor must exceed 1.0, got {}",
                self.growth_factor
            )));
        }
        if self.initial_instance_capacity == 0 || self.initial_record_capacity == 0 {
            return Err(ConfigError::Invalid(
                "initial buffer capacities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            multirender: false,
            initial_instance_capacity: 64,
            initial_record_capacity: 256,
            growth_factor: 2.0,
        }
    }
}

/// # Render System Configuration
///
/// Top-level configuration for a [`crate::render::RenderSystem`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSystemConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Screen render target configuration
    pub screen: ScreenConfig,
    /// Default configuration for scenes created by the system
    pub scene: SceneConfig,
}

impl RenderSystemConfig {
    /// Set the screen size
    pub fn with_screen_size(mut self, width: u32, height: u32) -> Self {
        self.screen.width = width;
        self.screen.height = height;
        self
    }

    /// Set the engine configuration
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Set the default scene configuration
    pub fn with_scene(mut self, scene: SceneConfig) -> Self {
        self.scene = scene;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.screen.width == 0 || self.screen.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "screen size must be non-zero, got {}x{}",
                self.screen.width, self.screen.height
            )));
        }
        if self.engine.target_fps == Some(0) {
            return Err(ConfigError::Invalid("target fps must be at least 1".to_string()));
        }
        self.scene.validate()
    }
}

impl Config for RenderSystemConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RenderSystemConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_target_fps_rejected() {
        let config = RenderSystemConfig::default().with_engine(EngineConfig::new().with_target_fps(0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_growth_factor_must_grow() {
        let scene = SceneConfig {
            growth_factor: 1.0,
            ..SceneConfig::default()
        };
        assert!(matches!(scene.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let text = r#"
            [scene]
            multirender = true

            [screen]
            width = 640
        "#;
        let config = RenderSystemConfig::from_str_with_format(text, "render.toml").unwrap();
        assert!(config.scene.multirender);
        assert_eq!(config.screen.width, 640);
        assert_eq!(config.screen.height, ScreenConfig::default().height);
        assert_eq!(config.scene.growth_factor, 2.0);
    }

    #[test]
    fn test_ron_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("scene_render_cfg_{}.ron", std::process::id()));
        let path = path.to_string_lossy().to_string();
        let config = RenderSystemConfig::default()
            .with_screen_size(800, 600)
            .with_scene(SceneConfig::default().with_multirender(true));

        config.save_to_file(&path).unwrap();
        let loaded = RenderSystemConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = RenderSystemConfig::from_str_with_format("", "render.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
