//! # Core Module
//!
//! Shared configuration types used by the render system and scenes.

pub mod config;

pub use config::{
    Config,
    ConfigError,
    EngineConfig,
    RenderSystemConfig,
    SceneConfig,
    ScreenConfig,
};
