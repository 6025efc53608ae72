//! Tween engine configuration
//!
//! Loaded from a `[pool]` / `[manager]` / `[defaults]` TOML document. Every
//! field is optional; missing fields take the values below.
//!
//! ```toml
//! [pool]
//! preload = 32
//! expand_count = 16
//!
//! [defaults]
//! duration = 0.25
//! ease = "ease-out-cubic"
//! ```

use crate::easing::Easing;
use crate::error::Result;
use crate::tween::LoopType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level engine configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TweenConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub defaults: TweenDefaults,
}

impl TweenConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded tween config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_toml_string(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Object pool policy
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Recycle killed tweens (live clock only)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Instances created per value type on first use
    #[serde(default = "default_preload")]
    pub preload: usize,
    #[serde(default = "default_true")]
    pub auto_expand: bool,
    /// Instances added per expansion, unless overridden per type
    #[serde(default = "default_expand_count")]
    pub expand_count: usize,
    /// Expand once the free count drops below this
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preload: default_preload(),
            auto_expand: true,
            expand_count: default_expand_count(),
            low_water_mark: default_low_water_mark(),
        }
    }
}

/// Scheduler sizing
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ManagerConfig {
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
    /// Growth factor applied when the iteration cache is rebuilt
    #[serde(default = "default_cache_headroom")]
    pub cache_headroom: f32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            cache_headroom: default_cache_headroom(),
        }
    }
}

/// Values a tween is reset to
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct TweenDefaults {
    #[serde(default = "default_duration")]
    pub duration: f64,
    #[serde(default)]
    pub ease: Easing,
    #[serde(default = "default_true")]
    pub auto_kill: bool,
    #[serde(default)]
    pub loop_type: LoopType,
}

impl Default for TweenDefaults {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            ease: Easing::default(),
            auto_kill: true,
            loop_type: LoopType::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_preload() -> usize {
    16
}

fn default_expand_count() -> usize {
    8
}

fn default_low_water_mark() -> usize {
    2
}

fn default_initial_capacity() -> usize {
    64
}

fn default_cache_headroom() -> f32 {
    1.5
}

fn default_duration() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TweenError;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TweenConfig::from_toml_str("").unwrap();
        assert_eq!(config, TweenConfig::default());
        assert_eq!(config.pool.preload, 16);
        assert_eq!(config.defaults.ease, Easing::EaseOutQuad);
    }

    #[test]
    fn test_partial_sections() {
        let config = TweenConfig::from_toml_str(
            r#"
            [pool]
            preload = 4
            auto_expand = false

            [defaults]
            duration = 0.25
            ease = "ease-in-out-cubic"
            loop_type = "yoyo"
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.preload, 4);
        assert!(!config.pool.auto_expand);
        assert_eq!(config.pool.expand_count, 8);
        assert_eq!(config.defaults.duration, 0.25);
        assert_eq!(config.defaults.ease, Easing::EaseInOutCubic);
        assert_eq!(config.defaults.loop_type, LoopType::Yoyo);
        assert!(config.defaults.auto_kill);
        assert_eq!(config.manager, ManagerConfig::default());
    }

    #[test]
    fn test_parse_error() {
        let err = TweenConfig::from_toml_str("[pool]\npreload = \"many\"").unwrap_err();
        assert!(matches!(err, TweenError::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = TweenConfig::load("/definitely/not/here/tween.toml").unwrap_err();
        assert!(matches!(err, TweenError::ConfigRead(_)));
    }

    #[test]
    fn test_serialize_back() {
        let text = TweenConfig::default().to_toml_string().unwrap();
        let parsed = TweenConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, TweenConfig::default());
    }
}
