//! Viewer configuration.
//!
//! Handles loading, validating, and merging `zimview.toml`. Stock defaults are
//! the base layer; a user file only needs the keys it overrides.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [archive]
//! base_url = ""                           # Fetch over HTTP when set
//!
//! [typesetting]
//! script_path = "./mathjax/es5/tex-svg.js"
//! svg_scale = 0.85
//!
//! [images]
//! native_webp = false                     # Target decodes WebP itself
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::numbering::DEFAULT_ENGINE_SCRIPT_PATH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given.
pub const CONFIG_FILENAME: &str = "zimview.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Viewer configuration loaded from `zimview.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Where archive resources are read from.
    pub archive: ArchiveConfig,
    /// Formula typesetting engine settings.
    pub typesetting: TypesettingConfig,
    /// Image compatibility settings.
    pub images: ImagesConfig,
}

impl ViewerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = &self.archive.base_url;
        if !base_url.is_empty()
            && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(
                "archive.base_url must be an http(s) URL".into(),
            ));
        }
        if self.typesetting.script_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "typesetting.script_path must not be empty".into(),
            ));
        }
        let scale = self.typesetting.svg_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::Validation(
                "typesetting.svg_scale must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Base URL of an archive served over HTTP. Empty reads from disk.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypesettingConfig {
    /// Path of the engine runtime script, relative to the viewer.
    pub script_path: String,
    /// Scale applied to rendered SVG formulas.
    pub svg_scale: f64,
}

impl Default for TypesettingConfig {
    fn default() -> Self {
        Self {
            script_path: DEFAULT_ENGINE_SCRIPT_PATH.to_string(),
            svg_scale: 0.85,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Whether the display environment decodes WebP natively.
    pub native_webp: bool,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ViewerConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ViewerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ViewerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path` on top of stock defaults.
///
/// A missing file yields the defaults; an explicitly requested missing file
/// should be checked by the caller.
pub fn load_config(path: &Path) -> Result<ViewerConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(path)?)
}

/// Returns a fully-commented stock `zimview.toml`.
pub fn stock_config_toml() -> &'static str {
    r##"# zimview Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Archive
# ---------------------------------------------------------------------------
[archive]
# Base URL of an archive served over HTTP (e.g. "http://localhost:8080/viewer/").
# Leave empty to read the archive directory given on the command line.
base_url = ""

# ---------------------------------------------------------------------------
# Formula typesetting
# ---------------------------------------------------------------------------
[typesetting]
# Engine runtime script, relative to the viewer.
script_path = "./mathjax/es5/tex-svg.js"

# Scale of rendered SVG formulas.
svg_scale = 0.85

# ---------------------------------------------------------------------------
# Images
# ---------------------------------------------------------------------------
[images]
# Set to true when the environment displaying the output decodes WebP itself.
# When false, WebP images are converted to inline PNG.
native_webp = false
"##
}
