// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Graphics Backend Seam
//!
//! The graphics core never touches a native API directly, every native call
//! goes through the [`GraphicsBackend`] trait. Three backends implement it:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      GraphicsContext                         │
//! │   state cache · dirty flags · framebuffer cache · programs   │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ Box<dyn GraphicsBackend>
//!          ┌─────────────────────┼──────────────────────┐
//!          ▼                     ▼                      ▼
//!   RecordingBackend         GlBackend             WgpuBackend
//!   (headless, tests)    (glow, bottom-left,    (wgpu, top-left,
//!                         persistent FBOs)       implicit passes)
//! ```
//!
//! Backends hand out small copyable handles. The core owns the lifetime of
//! every handle and destroys it explicitly, backends own the native objects.
//!
//! The coordinate convention tells the core whether render surfaces have a
//! bottom-left origin, in which case scissor and viewport rectangles on the
//! back buffer are flipped and off-screen rendering is y-inverted through the
//! position fixup.

use crate::error::GfxResult;
use crate::graphics::capabilities::Capabilities;
use crate::graphics::resource::TextureKind;
use crate::graphics::shader::{Shader, ShaderDesc};
use crate::graphics::state::{BlendState, CullFace, DepthStencilState, RasterizerState, SamplerState};
use crate::graphics::types::{
    ClearOptions, Color, DepthFormat, IndexElementSize, PrimitiveType, Rect, ShaderStage,
    SurfaceFormat, Viewport,
};
use std::any::Any;

pub mod recording;
pub use recording::{BackendCall, RecordingBackend};

#[cfg(gl_backend)]
pub mod gl;
#[cfg(gl_backend)]
pub use gl::GlBackend;

#[cfg(wgpu_backend)]
pub mod wgpu;
#[cfg(wgpu_backend)]
pub use self::wgpu::WgpuBackend;

macro_rules! backend_handles {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

backend_handles!(
    BufferHandle,
    TextureHandle,
    RenderbufferHandle,
    /// Native framebuffer object, or an attachment set on implicit backends.
    FramebufferHandle,
    ShaderHandle,
    ProgramHandle,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateConvention {
    /// Surfaces have their origin at the bottom-left corner (GL).
    BottomLeft,
    TopLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub kind: BufferKind,
    pub size: usize,
    pub dynamic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Array layer count, 6 for cube maps, 1 otherwise.
    pub layers: u32,
    pub levels: u32,
    pub format: SurfaceFormat,
    pub render_target: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderbufferFormat {
    Color(SurfaceFormat),
    Depth(DepthFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderbufferDesc {
    pub width: u32,
    pub height: u32,
    pub format: RenderbufferFormat,
    pub samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentPoint {
    Color(u32),
    Depth,
    Stencil,
    DepthStencil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSource {
    Renderbuffer(RenderbufferHandle),
    /// `layer` is the cube face or array slice.
    Texture {
        texture: TextureHandle,
        kind: TextureKind,
        level: u32,
        layer: u32,
    },
}

/// Component type of a vertex attribute as the shader reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttribType {
    F32,
    F16,
    U8,
    I16,
}

impl AttribType {
    pub fn size(&self) -> usize {
        match self {
            AttribType::F32 => 4,
            AttribType::F16 | AttribType::I16 => 2,
            AttribType::U8 => 1,
        }
    }
}

/// One resolved vertex attribute pointer.
///
/// `base_offset` is where the first vertex of the draw starts in the buffer,
/// `element_offset` is the attribute's offset inside the vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribPointer {
    pub slot: u32,
    pub location: u32,
    pub components: u32,
    pub ty: AttribType,
    pub normalized: bool,
    pub stride: u32,
    pub base_offset: usize,
    pub element_offset: usize,
}

impl AttribPointer {
    /// Combined byte offset as persistent-state APIs take it.
    pub fn offset(&self) -> usize {
        self.base_offset + self.element_offset
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentError {
    /// Recoverable through `GraphicsContext::reset`.
    DeviceLost,
    Fatal(String),
}

/// Native graphics API as seen by the core.
///
/// Calls are issued in the order the core needs them executed. Backends that
/// defer work (command encoders, render passes) must preserve that order.
pub trait GraphicsBackend {
    fn name(&self) -> &str;

    fn convention(&self) -> CoordinateConvention;

    /// Queried once at context creation and once per reset.
    fn query_capabilities(&mut self) -> Capabilities;

    /// Width and height of the presentable back buffer.
    fn back_buffer_size(&self) -> (u32, u32);

    // resources
    fn create_buffer(&mut self, desc: &BufferDesc) -> GfxResult<BufferHandle>;
    fn write_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> GfxResult<()>;
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureHandle>;
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        level: u32,
        layer: u32,
        rect: Rect,
        data: &[u8],
    ) -> GfxResult<()>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_renderbuffer(&mut self, desc: &RenderbufferDesc) -> GfxResult<RenderbufferHandle>;
    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    fn create_framebuffer(&mut self) -> GfxResult<FramebufferHandle>;
    fn attach(&mut self, fb: FramebufferHandle, point: AttachmentPoint, source: AttachmentSource);
    /// Completeness check of a freshly assembled framebuffer.
    fn check_framebuffer(&mut self, fb: FramebufferHandle) -> GfxResult<()>;
    fn destroy_framebuffer(&mut self, fb: FramebufferHandle);

    // framebuffer ops
    /// Bind for drawing and reading, `None` is the back buffer.
    fn bind_framebuffer(&mut self, fb: Option<FramebufferHandle>);
    fn bind_read_framebuffer(&mut self, fb: FramebufferHandle);
    fn set_draw_buffers(&mut self, count: usize);
    /// Copy color attachment `index` of the read framebuffer onto the same
    /// attachment of the draw framebuffer.
    fn blit_framebuffer(&mut self, index: usize, width: u32, height: u32);
    /// Discard the first `color_count` color attachments plus depth and stencil
    /// of the read framebuffer.
    fn invalidate_read_framebuffer(&mut self, color_count: usize);
    fn generate_mipmaps(&mut self, texture: TextureHandle, kind: TextureKind);

    // shaders
    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle, String>;
    fn destroy_shader(&mut self, shader: ShaderHandle);
    /// Returns the driver info log on failure.
    fn link_program(&mut self, vertex: &Shader, pixel: &Shader) -> Result<ProgramHandle, String>;
    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<u32>;
    fn use_program(&mut self, program: ProgramHandle);
    fn set_position_fixup(&mut self, program: ProgramHandle, fixup: [f32; 4]);
    fn destroy_program(&mut self, program: ProgramHandle);

    // state
    fn set_blend_state(&mut self, state: &BlendState);
    fn set_blend_factor(&mut self, factor: Color);
    fn set_depth_stencil_state(&mut self, state: &DepthStencilState);
    fn set_rasterizer_state(&mut self, state: &RasterizerState, cull: CullFace, depth_bias_scale: f32);
    fn set_scissor_test(&mut self, enable: bool);
    fn set_scissor_rect(&mut self, rect: Rect);
    fn set_viewport(&mut self, viewport: Viewport);
    fn bind_index_buffer(&mut self, buffer: BufferHandle, size: IndexElementSize);
    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle);
    fn set_attrib_pointer(&mut self, pointer: &AttribPointer);
    fn set_attrib_divisor(&mut self, location: u32, divisor: u32);
    fn enable_attrib(&mut self, location: u32);
    fn disable_attrib(&mut self, location: u32);
    fn bind_texture(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        texture: Option<(TextureHandle, TextureKind)>,
    );
    fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: &SamplerState);

    // commands
    fn clear(&mut self, options: ClearOptions, color: Color, depth: f32, stencil: i32);
    /// Draws fail synchronously when the backend can't build what they need.
    fn draw_arrays(&mut self, primitive: PrimitiveType, first: usize, count: usize) -> GfxResult<()>;
    fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        count: usize,
        size: IndexElementSize,
        start_index: usize,
    ) -> GfxResult<()>;
    fn draw_elements_instanced(
        &mut self,
        primitive: PrimitiveType,
        count: usize,
        size: IndexElementSize,
        start_index: usize,
        instance_count: usize,
        base_instance: usize,
    ) -> GfxResult<()>;
    /// Stream user memory into a transient buffer valid until the next upload.
    fn upload_user_vertices(&mut self, data: &[u8]) -> GfxResult<BufferHandle>;
    fn upload_user_indices(&mut self, data: &[u8]) -> GfxResult<BufferHandle>;
    fn flush(&mut self);
    fn present(&mut self) -> Result<(), PresentError>;
    /// Tightly packed RGBA8 rows of the back buffer, top row first.
    fn read_pixels(&mut self, rect: Rect, out: &mut [u8]) -> GfxResult<()>;

    fn as_any(&mut self) -> &mut dyn Any;
}
