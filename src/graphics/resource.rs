// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! GPU resources owned by a graphics context.
//!
//! Resources are created through the context and shared as `Arc`. Each one
//! carries a process-unique [`ResourceId`] the caches use as identity, so a
//! key never depends on where an `Arc` happens to live in memory.

use crate::backend::{BufferHandle, RenderbufferHandle, TextureHandle};
use crate::graphics::types::{
    BufferUsage, DepthFormat, IndexElementSize, RenderTargetUsage, SurfaceFormat,
};
use crate::graphics::vertex::VertexDeclaration;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub(crate) struct Disposed(AtomicBool);

impl Disposed {
    pub(crate) fn set(&self) -> bool {
        self.0.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct VertexBuffer {
    pub(crate) id: ResourceId,
    pub(crate) handle: BufferHandle,
    pub(crate) declaration: Arc<VertexDeclaration>,
    pub(crate) vertex_count: usize,
    pub(crate) usage: BufferUsage,
    pub(crate) disposed: Disposed,
}

impl VertexBuffer {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn declaration(&self) -> &Arc<VertexDeclaration> {
        &self.declaration
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn size_in_bytes(&self) -> usize {
        self.vertex_count * self.declaration.stride() as usize
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

#[derive(Debug)]
pub struct IndexBuffer {
    pub(crate) id: ResourceId,
    pub(crate) handle: BufferHandle,
    pub(crate) element_size: IndexElementSize,
    pub(crate) index_count: usize,
    pub(crate) usage: BufferUsage,
    pub(crate) disposed: Disposed,
}

impl IndexBuffer {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn element_size(&self) -> IndexElementSize {
        self.element_size
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureKind {
    #[default]
    Texture2D,
    TextureCube,
    Texture2DArray,
}

/// Parameters of `GraphicsContext::create_texture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Slice count of array textures, ignored otherwise.
    pub array_size: u32,
    pub mipmap: bool,
    pub format: SurfaceFormat,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            kind: TextureKind::Texture2D,
            width: 1,
            height: 1,
            array_size: 1,
            mipmap: false,
            format: SurfaceFormat::Color,
        }
    }
}

impl TextureDescriptor {
    pub fn layers(&self) -> u32 {
        match self.kind {
            TextureKind::Texture2D => 1,
            TextureKind::TextureCube => 6,
            TextureKind::Texture2DArray => self.array_size.max(1),
        }
    }

    pub fn level_count(&self) -> u32 {
        if self.mipmap {
            mip_level_count(self.width, self.height)
        } else {
            1
        }
    }
}

/// Full mip chain length for a `width` x `height` surface.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[derive(Debug)]
pub struct Texture {
    pub(crate) id: ResourceId,
    pub(crate) handle: TextureHandle,
    pub(crate) kind: TextureKind,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) layers: u32,
    pub(crate) level_count: u32,
    pub(crate) format: SurfaceFormat,
    pub(crate) disposed: Disposed,
}

impl Texture {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

/// Parameters of `GraphicsContext::create_render_target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDescriptor {
    pub texture: TextureDescriptor,
    pub depth_format: DepthFormat,
    /// 0 or 1 for a single sampled target.
    pub multisample_count: u32,
    pub usage: RenderTargetUsage,
}

impl Default for RenderTargetDescriptor {
    fn default() -> Self {
        Self {
            texture: TextureDescriptor::default(),
            depth_format: DepthFormat::None,
            multisample_count: 0,
            usage: RenderTargetUsage::DiscardContents,
        }
    }
}

impl RenderTargetDescriptor {
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            texture: TextureDescriptor {
                width,
                height,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// A texture that can be drawn to.
///
/// Multisampled targets render into `color_buffer` and are resolved into
/// `texture` when they are unbound.
#[derive(Debug)]
pub struct RenderTarget {
    pub(crate) id: ResourceId,
    pub(crate) texture: Arc<Texture>,
    pub(crate) depth_format: DepthFormat,
    pub(crate) multisample_count: u32,
    pub(crate) usage: RenderTargetUsage,
    pub(crate) color_buffer: Option<RenderbufferHandle>,
    pub(crate) depth_buffer: Option<RenderbufferHandle>,
    pub(crate) stencil_buffer: Option<RenderbufferHandle>,
}

impl RenderTarget {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The readable texture, bind it to a texture slot once the target is unbound.
    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.texture.width
    }

    pub fn height(&self) -> u32 {
        self.texture.height
    }

    pub fn depth_format(&self) -> DepthFormat {
        self.depth_format
    }

    pub fn multisample_count(&self) -> u32 {
        self.multisample_count
    }

    pub fn usage(&self) -> RenderTargetUsage {
        self.usage
    }

    pub fn color_buffer(&self) -> Option<RenderbufferHandle> {
        self.color_buffer
    }

    pub fn depth_buffer(&self) -> Option<RenderbufferHandle> {
        self.depth_buffer
    }

    pub fn stencil_buffer(&self) -> Option<RenderbufferHandle> {
        self.stencil_buffer
    }

    pub fn is_disposed(&self) -> bool {
        self.texture.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert!(b > a);
    }

    #[test]
    fn test_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(300, 20), 9);
        let desc = TextureDescriptor {
            width: 64,
            height: 16,
            mipmap: true,
            ..Default::default()
        };
        assert_eq!(desc.level_count(), 7);
    }

    #[test]
    fn test_layers() {
        let mut desc = TextureDescriptor::default();
        assert_eq!(desc.layers(), 1);
        desc.kind = TextureKind::TextureCube;
        assert_eq!(desc.layers(), 6);
        desc.kind = TextureKind::Texture2DArray;
        desc.array_size = 3;
        assert_eq!(desc.layers(), 3);
    }
}
