// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Graphics core
//!
//! Backend independent graphics context: render state objects, resources,
//! and the lazy state tracker that turns them into backend calls.
//!
//! ## Submodules
//! - `types`: plain values shared with backends (colors, rects, formats)
//! - `capabilities`: backend feature flags, limits and graphics profiles
//! - `state`: immutable blend, depth-stencil, rasterizer and sampler states
//! - `resource`: buffers, textures and render targets
//! - `vertex`: vertex declarations and per-program attribute layouts
//! - `attribs`: vertex attribute binding resolver
//! - `shader`: shaders and the linked program cache
//! - `render_target`: render target bindings and their cache key
//! - `framebuffer`: draw and resolve framebuffer cache
//! - `textures`: texture and sampler slot collections
//! - `metrics`: per frame counters
//! - `sync`: lock shared by contexts on one native device context
//! - `context`: the graphics context itself

pub mod attribs;
pub mod capabilities;
pub mod context;
pub mod framebuffer;
pub mod metrics;
pub mod render_target;
pub mod resource;
pub mod shader;
pub mod state;
pub mod sync;
pub mod textures;
pub mod types;
pub mod vertex;

pub use capabilities::{Capabilities, GraphicsProfile};
pub use context::{DirtyFlags, GraphicsContext};
pub use metrics::GraphicsMetrics;
pub use render_target::RenderTargetBinding;
pub use resource::{
    IndexBuffer, RenderTarget, RenderTargetDescriptor, Texture, TextureDescriptor, TextureKind,
    VertexBuffer,
};
pub use shader::{Shader, ShaderDesc, ShaderProfile};
pub use state::{BlendState, DepthStencilState, RasterizerState, SamplerState};
pub use sync::SyncHandle;
pub use types::*;
pub use vertex::{
    VertexBufferBinding, VertexDeclaration, VertexElement, VertexElementFormat, VertexElementUsage,
};
