//! Configuration loading and parsing.
//!
//! Parses `lazyfeed.toml` (or an override path provided by the host) into
//! window, loader and header sections. Every field has a default, unknown
//! fields are ignored, and a file that fails to parse falls back to defaults
//! so a bad edit never prevents a page from rendering.
//!
//! Raw values are retained; `Config::apply_context` derives the effective
//! overscan and load-more threshold for the current viewport:
//! * overscan is capped at twice the number of rows the viewport can show at
//!   the estimated item height (at least 1 row),
//! * the proximity threshold is capped at the viewport height.
//!
//! A viewport height of zero means "not mounted yet" and leaves raw values in
//! place until a real height arrives.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "lazyfeed.toml";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigContext {
    pub viewport_height: f64,
}

impl ConfigContext {
    pub fn from_viewport_height(viewport_height: f64) -> Self {
        Self { viewport_height }
    }

    fn is_mounted(&self) -> bool {
        self.viewport_height.is_finite() && self.viewport_height > 0.0
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowConfig {
    #[serde(default = "WindowConfig::default_estimate_item_height")]
    pub estimate_item_height: f64,
    #[serde(default = "WindowConfig::default_overscan")]
    pub overscan: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            estimate_item_height: Self::default_estimate_item_height(),
            overscan: Self::default_overscan(),
        }
    }
}

impl WindowConfig {
    const fn default_estimate_item_height() -> f64 {
        64.0
    }
    const fn default_overscan() -> usize {
        5
    }

    /// Estimate used for layout; falls back to the default when the file
    /// holds a non-positive or non-finite value.
    pub fn sanitized_estimate(&self) -> f64 {
        if self.estimate_item_height.is_finite() && self.estimate_item_height > 0.0 {
            self.estimate_item_height
        } else {
            Self::default_estimate_item_height()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "LoaderConfig::default_page_size")]
    pub page_size: usize,
    #[serde(default = "LoaderConfig::default_proximity_px")]
    pub proximity_px: f64,
    #[serde(default = "LoaderConfig::default_sentinel_margin_px")]
    pub sentinel_margin_px: f64,
    #[serde(default = "LoaderConfig::default_pause_on_error")]
    pub pause_on_error: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
            proximity_px: Self::default_proximity_px(),
            sentinel_margin_px: Self::default_sentinel_margin_px(),
            pause_on_error: Self::default_pause_on_error(),
        }
    }
}

impl LoaderConfig {
    const fn default_page_size() -> usize {
        20
    }
    const fn default_proximity_px() -> f64 {
        200.0
    }
    const fn default_sentinel_margin_px() -> f64 {
        200.0
    }
    const fn default_pause_on_error() -> bool {
        true
    }

    pub fn sanitized_page_size(&self) -> usize {
        self.page_size.max(1)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HeaderConfig {
    #[serde(default = "HeaderConfig::default_collapse_offset_px")]
    pub collapse_offset_px: f64,
    #[serde(default = "HeaderConfig::default_bottom_tolerance_px")]
    pub bottom_tolerance_px: f64,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            collapse_offset_px: Self::default_collapse_offset_px(),
            bottom_tolerance_px: Self::default_bottom_tolerance_px(),
        }
    }
}

impl HeaderConfig {
    const fn default_collapse_offset_px() -> f64 {
        50.0
    }
    const fn default_bottom_tolerance_px() -> f64 {
        10.0
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub header: HeaderConfig,
}

/// Values derived from the raw file for the current viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveSettings {
    pub overscan: usize,
    pub proximity_px: f64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
    pub effective: EffectiveSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(None, ConfigFile::default())
    }
}

/// Best-effort config path: working directory first, then the platform
/// config dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("lazyfeed").join(CONFIG_FILE_NAME);
    }
    PathBuf::from(CONFIG_FILE_NAME)
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => Ok(Config::from_file(Some(content), file)),
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
            Ok(Config::default())
        }
    }
}

/// Parse from an in-memory string (same fallback rules as `load_from`).
pub fn from_str(content: &str) -> Config {
    match toml::from_str::<ConfigFile>(content) {
        Ok(file) => Config::from_file(Some(content.to_string()), file),
        Err(e) => {
            warn!(target: "config", error = %e, "config_parse_failed_using_defaults");
            Config::default()
        }
    }
}

impl Config {
    fn from_file(raw: Option<String>, file: ConfigFile) -> Self {
        let effective = EffectiveSettings {
            overscan: file.window.overscan,
            proximity_px: sanitize_px(file.loader.proximity_px),
        };
        Self {
            raw,
            file,
            effective,
        }
    }

    /// Apply viewport context to compute clamped overscan / proximity values.
    pub fn apply_context(&mut self, ctx: ConfigContext) -> EffectiveSettings {
        let raw_overscan = self.file.window.overscan;
        let raw_proximity = sanitize_px(self.file.loader.proximity_px);
        if !ctx.is_mounted() {
            self.effective = EffectiveSettings {
                overscan: raw_overscan,
                proximity_px: raw_proximity,
            };
            return self.effective;
        }

        let estimate = self.file.window.sanitized_estimate();
        let rows = ((ctx.viewport_height / estimate).ceil() as usize).max(1);
        let max_overscan = rows.saturating_mul(2);
        let overscan = raw_overscan.min(max_overscan);
        if overscan != raw_overscan {
            info!(
                target: "config",
                raw = raw_overscan,
                clamped = overscan,
                max = max_overscan,
                viewport_height = ctx.viewport_height,
                estimate,
                "overscan_clamped"
            );
        }

        let proximity_px = raw_proximity.min(ctx.viewport_height);
        if proximity_px != raw_proximity {
            info!(
                target: "config",
                raw = raw_proximity,
                clamped = proximity_px,
                viewport_height = ctx.viewport_height,
                "proximity_clamped"
            );
        }

        self.effective = EffectiveSettings {
            overscan,
            proximity_px,
        };
        self.effective
    }

    /// Recompute effective values after a viewport change. Returns `Some` when
    /// anything changed.
    pub fn recompute_with_context(&mut self, ctx: ConfigContext) -> Option<EffectiveSettings> {
        let prev = self.effective;
        let current = self.apply_context(ctx);
        if current != prev { Some(current) } else { None }
    }
}

fn sanitize_px(v: f64) -> f64 {
    if v.is_finite() && v >= 0.0 { v } else { 0.0 }
}
