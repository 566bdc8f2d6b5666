// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Error taxonomy of the graphics core.
//!
//! Every failure is reported synchronously to the immediate caller, nothing
//! is retried. Precondition checks run before the first backend call of the
//! failing operation.

/// Errors raised by [`GraphicsContext`](crate::graphics::GraphicsContext)
/// operations and backends.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum GfxError {
    /// A precondition of the call does not hold (no shader bound, present
    /// with an active render target, state bound to another device...).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("argument out of range: {name}: {reason}")]
    ArgumentOutOfRange { name: &'static str, reason: String },

    /// The backend lacks a capability the requested state or draw needs.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    /// Program link failed, carries the driver info log.
    #[error("unable to link shader program: {0}")]
    ShaderLink(String),

    /// Present reported device loss, call `GraphicsContext::reset`.
    #[error("graphics device lost")]
    DeviceLost,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    pub(crate) fn out_of_range(name: &'static str, reason: impl Into<String>) -> Self {
        GfxError::ArgumentOutOfRange {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        GfxError::InvalidOperation(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        GfxError::UnsupportedFeature(msg.into())
    }
}

impl From<toml::de::Error> for GfxError {
    fn from(e: toml::de::Error) -> Self {
        GfxError::Config(e.to_string())
    }
}

impl From<std::io::Error> for GfxError {
    fn from(e: std::io::Error) -> Self {
        GfxError::Config(e.to_string())
    }
}
