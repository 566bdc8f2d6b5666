// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! pixel_gfx is the device agnostic graphics layer of RustPixel.
//!
//! A [`GraphicsContext`] tracks render state lazily: setters record what the
//! caller wants, and only state that actually changed is pushed to the
//! backend when a clear or draw needs it. Render target changes go through a
//! framebuffer cache keyed by the attachment set, multisampled targets are
//! resolved when they are unbound.
//!
//! Native APIs sit behind the [`GraphicsBackend`](backend::GraphicsBackend)
//! trait:
//! - `RecordingBackend`: headless, records every call, used by the tests
//! - `GlBackend` (feature `gl`): OpenGL through glow, bottom-left origin
//! - `WgpuBackend` (feature `wgpu`): wgpu with implicit render passes
//!
//! Modules config, error, log are the ambient pieces: TOML config with a
//! process wide copy, thiserror based errors, log4rs file logging.

pub mod backend;
pub mod config;
pub mod error;
pub mod graphics;
pub mod log;

pub use backend::{GraphicsBackend, RecordingBackend};
pub use config::{get_graphics_config, init_graphics_config, GraphicsConfig, PresentationParameters};
pub use error::{GfxError, GfxResult};
pub use graphics::GraphicsContext;
