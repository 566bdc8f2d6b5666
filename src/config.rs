// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Graphics Configuration
//!
//! Settings a graphics context is created from, loadable from TOML:
//!
//! ```toml
//! profile = "HiDef"
//! back_buffer_width = 1280
//! back_buffer_height = 720
//! depth_stencil_format = "Depth24Stencil8"
//! multisample_count = 4
//! log_level = "debug"
//! ```
//!
//! A process wide copy can be installed once at startup with
//! [`init_graphics_config`] and read anywhere with [`get_graphics_config`].

use crate::error::GfxResult;
use crate::graphics::capabilities::GraphicsProfile;
use crate::graphics::types::{DepthFormat, RenderTargetUsage, SurfaceFormat};
use crate::log::{init_log, parse_level};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

// ============================================================================
// Graphics Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub profile: GraphicsProfile,
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
    pub back_buffer_format: SurfaceFormat,
    pub depth_stencil_format: DepthFormat,
    pub multisample_count: u32,
    /// Usage policy of the back buffer, discard clears it on every rebind.
    pub render_target_usage: RenderTargetUsage,
    pub use_half_pixel_offset: bool,
    pub log_level: String,
    pub log_file: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            profile: GraphicsProfile::HiDef,
            back_buffer_width: 800,
            back_buffer_height: 600,
            back_buffer_format: SurfaceFormat::Color,
            depth_stencil_format: DepthFormat::Depth24Stencil8,
            multisample_count: 0,
            render_target_usage: RenderTargetUsage::DiscardContents,
            use_half_pixel_offset: false,
            log_level: String::from("info"),
            log_file: String::from("log/pixel_gfx.log"),
        }
    }
}

impl GraphicsConfig {
    pub fn from_toml_str(s: &str) -> GfxResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> GfxResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Start the file logger with `log_level` and `log_file`.
    pub fn init_logging(&self) -> GfxResult<()> {
        init_log(parse_level(&self.log_level), &self.log_file)
    }

    pub fn presentation_parameters(&self) -> PresentationParameters {
        PresentationParameters {
            profile: self.profile,
            back_buffer_width: self.back_buffer_width,
            back_buffer_height: self.back_buffer_height,
            back_buffer_format: self.back_buffer_format,
            depth_stencil_format: self.depth_stencil_format,
            multisample_count: self.multisample_count,
            render_target_usage: self.render_target_usage,
            use_half_pixel_offset: self.use_half_pixel_offset,
        }
    }
}

/// Global graphics configuration
pub static GRAPHICS_CONFIG: OnceLock<GraphicsConfig> = OnceLock::new();

/// Install the process wide config, later calls are ignored.
pub fn init_graphics_config(config: GraphicsConfig) {
    let _ = GRAPHICS_CONFIG.set(config);
}

/// The installed config, or the defaults when none was installed.
pub fn get_graphics_config() -> &'static GraphicsConfig {
    GRAPHICS_CONFIG.get_or_init(GraphicsConfig::default)
}

// ============================================================================
// Presentation Parameters
// ============================================================================

/// Back buffer description a context renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationParameters {
    pub profile: GraphicsProfile,
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
    pub back_buffer_format: SurfaceFormat,
    pub depth_stencil_format: DepthFormat,
    pub multisample_count: u32,
    pub render_target_usage: RenderTargetUsage,
    pub use_half_pixel_offset: bool,
}

impl Default for PresentationParameters {
    fn default() -> Self {
        GraphicsConfig::default().presentation_parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GfxError;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = GraphicsConfig::from_toml_str(
            r#"
            profile = "Reach"
            back_buffer_width = 320
            render_target_usage = "PreserveContents"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.profile, GraphicsProfile::Reach);
        assert_eq!(cfg.back_buffer_width, 320);
        assert_eq!(cfg.back_buffer_height, 600);
        assert_eq!(cfg.render_target_usage, RenderTargetUsage::PreserveContents);
        assert_eq!(cfg.depth_stencil_format, DepthFormat::Depth24Stencil8);
        assert_eq!(cfg.log_file, "log/pixel_gfx.log");
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = GraphicsConfig::from_toml_str("profile = 7").unwrap_err();
        assert!(matches!(err, GfxError::Config(_)));
        let err = GraphicsConfig::from_file("/nonexistent/pixel_gfx.toml").unwrap_err();
        assert!(matches!(err, GfxError::Config(_)));
    }

    #[test]
    fn test_round_trip_serialize() {
        let cfg = GraphicsConfig {
            multisample_count: 4,
            use_half_pixel_offset: true,
            ..Default::default()
        };
        let text = toml::to_string(&cfg).unwrap();
        assert_eq!(GraphicsConfig::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn test_global_config_defaults() {
        assert_eq!(get_graphics_config().back_buffer_width, 800);
    }
}
