// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Resource creation and destruction.
//!
//! Resources are plain `Arc` values, the context owns their native handles.
//! Destroying one unbinds it wherever it is bound, drops cache entries that
//! reference it and releases the native objects.

use super::{range_end, DirtyFlags, GraphicsContext};
use crate::backend::{BufferDesc, BufferKind, RenderbufferDesc, RenderbufferFormat, TextureDesc};
use crate::error::{GfxError, GfxResult};
use crate::graphics::resource::{
    Disposed, IndexBuffer, RenderTarget, RenderTargetDescriptor, ResourceId, Texture,
    TextureDescriptor, VertexBuffer,
};
use crate::graphics::shader::{Shader, ShaderDesc};
use crate::graphics::types::{BufferUsage, IndexElement, IndexElementSize, Rect};
use crate::graphics::vertex::VertexDeclaration;
use log::{debug, error};
use std::sync::Arc;

impl GraphicsContext {
    pub fn create_vertex_buffer(
        &mut self,
        declaration: &Arc<VertexDeclaration>,
        vertex_count: usize,
        usage: BufferUsage,
    ) -> GfxResult<Arc<VertexBuffer>> {
        if vertex_count == 0 {
            return Err(GfxError::out_of_range("vertex_count", "must be greater than zero"));
        }
        let size = vertex_count
            .checked_mul(declaration.stride() as usize)
            .ok_or_else(|| GfxError::out_of_range("vertex_count", "buffer size overflows"))?;
        let handle = self.backend.create_buffer(&BufferDesc {
            kind: BufferKind::Vertex,
            size,
            dynamic: usage == BufferUsage::WriteOnly,
        })?;
        Ok(Arc::new(VertexBuffer {
            id: ResourceId::next(),
            handle,
            declaration: declaration.clone(),
            vertex_count,
            usage,
            disposed: Disposed::default(),
        }))
    }

    /// Write `data` starting at vertex `start_vertex`.
    pub fn set_vertex_data<T: bytemuck::Pod>(
        &mut self,
        buffer: &VertexBuffer,
        start_vertex: usize,
        data: &[T],
    ) -> GfxResult<()> {
        if buffer.is_disposed() {
            return Err(GfxError::invalid(format!("vertex buffer {:?} is disposed", buffer.id())));
        }
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let offset = start_vertex
            .checked_mul(buffer.declaration().stride() as usize)
            .ok_or_else(|| GfxError::out_of_range("start_vertex", "byte offset overflows"))?;
        if range_end("data", offset, bytes.len())? > buffer.size_in_bytes() {
            return Err(GfxError::out_of_range(
                "data",
                format!(
                    "{} bytes at {} overflow a {} byte buffer",
                    bytes.len(),
                    offset,
                    buffer.size_in_bytes()
                ),
            ));
        }
        self.backend.write_buffer(buffer.handle(), offset, bytes)
    }

    pub fn create_index_buffer(
        &mut self,
        element_size: IndexElementSize,
        index_count: usize,
        usage: BufferUsage,
    ) -> GfxResult<Arc<IndexBuffer>> {
        if index_count == 0 {
            return Err(GfxError::out_of_range("index_count", "must be greater than zero"));
        }
        let size = index_count
            .checked_mul(element_size.bytes())
            .ok_or_else(|| GfxError::out_of_range("index_count", "buffer size overflows"))?;
        let handle = self.backend.create_buffer(&BufferDesc {
            kind: BufferKind::Index,
            size,
            dynamic: usage == BufferUsage::WriteOnly,
        })?;
        Ok(Arc::new(IndexBuffer {
            id: ResourceId::next(),
            handle,
            element_size,
            index_count,
            usage,
            disposed: Disposed::default(),
        }))
    }

    pub fn set_index_data<I: IndexElement>(
        &mut self,
        buffer: &IndexBuffer,
        start_index: usize,
        data: &[I],
    ) -> GfxResult<()> {
        if buffer.is_disposed() {
            return Err(GfxError::invalid(format!("index buffer {:?} is disposed", buffer.id())));
        }
        if I::SIZE != buffer.element_size() {
            return Err(GfxError::invalid(format!(
                "{:?} indices written to a {:?} index buffer",
                I::SIZE,
                buffer.element_size()
            )));
        }
        if range_end("start_index", start_index, data.len())? > buffer.index_count() {
            return Err(GfxError::out_of_range(
                "data",
                format!(
                    "{} indices at {} overflow {}",
                    data.len(),
                    start_index,
                    buffer.index_count()
                ),
            ));
        }
        let offset = start_index * I::SIZE.bytes();
        self.backend
            .write_buffer(buffer.handle(), offset, bytemuck::cast_slice(data))
    }

    pub fn create_texture(&mut self, desc: &TextureDescriptor) -> GfxResult<Arc<Texture>> {
        self.create_texture_inner(desc, false).map(Arc::new)
    }

    fn create_texture_inner(
        &mut self,
        desc: &TextureDescriptor,
        render_target: bool,
    ) -> GfxResult<Texture> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GfxError::out_of_range(
                "size",
                format!("{}x{} texture", desc.width, desc.height),
            ));
        }
        let layers = desc.layers();
        let level_count = desc.level_count();
        let handle = self.backend.create_texture(&TextureDesc {
            kind: desc.kind,
            width: desc.width,
            height: desc.height,
            layers,
            levels: level_count,
            format: desc.format,
            render_target,
        })?;
        Ok(Texture {
            id: ResourceId::next(),
            handle,
            kind: desc.kind,
            width: desc.width,
            height: desc.height,
            layers,
            level_count,
            format: desc.format,
            disposed: Disposed::default(),
        })
    }

    /// Upload one mip level of one layer, `rect` defaults to the whole level.
    pub fn set_texture_data(
        &mut self,
        texture: &Texture,
        level: u32,
        layer: u32,
        rect: Option<Rect>,
        data: &[u8],
    ) -> GfxResult<()> {
        if texture.is_disposed() {
            return Err(GfxError::invalid(format!("texture {:?} is disposed", texture.id())));
        }
        if level >= texture.level_count() {
            return Err(GfxError::out_of_range(
                "level",
                format!("level {} of {}", level, texture.level_count()),
            ));
        }
        if layer >= texture.layers() {
            return Err(GfxError::out_of_range(
                "layer",
                format!("layer {} of {}", layer, texture.layers()),
            ));
        }
        let lw = (texture.width() >> level).max(1) as i32;
        let lh = (texture.height() >> level).max(1) as i32;
        let rect = rect.unwrap_or(Rect::new(0, 0, lw, lh));
        let inside = rect.x >= 0
            && rect.y >= 0
            && rect.x.checked_add(rect.width).is_some_and(|r| r <= lw)
            && rect.y.checked_add(rect.height).is_some_and(|b| b <= lh);
        if !inside {
            return Err(GfxError::out_of_range(
                "rect",
                format!("{:?} outside the {}x{} level", rect, lw, lh),
            ));
        }
        let pixels = rect.width.max(0) as usize * rect.height.max(0) as usize;
        let needed = pixels * texture.format().bytes_per_pixel();
        if data.len() < needed {
            return Err(GfxError::out_of_range(
                "data",
                format!("{} bytes given, {} needed", data.len(), needed),
            ));
        }
        self.backend
            .write_texture(texture.handle(), level, layer, rect, &data[..needed])
    }

    /// Create a render target, negotiating format and sample count with the
    /// backend. Multisampled targets get a color renderbuffer to draw into,
    /// a packed depth-stencil format shares one renderbuffer for both.
    pub fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> GfxResult<Arc<RenderTarget>> {
        if !self.caps.supports_framebuffer_object {
            return Err(GfxError::unsupported("render targets require framebuffer objects"));
        }
        let (format, samples) = self.caps.query_render_target_format(
            self.params.profile,
            desc.texture.format,
            desc.multisample_count,
        );
        let texture_desc = TextureDescriptor {
            format,
            ..desc.texture
        };
        let texture = self.create_texture_inner(&texture_desc, true)?;
        let (width, height) = (texture.width, texture.height);

        let color_buffer = if samples > 0 {
            Some(self.backend.create_renderbuffer(&RenderbufferDesc {
                width,
                height,
                format: RenderbufferFormat::Color(format),
                samples,
            })?)
        } else {
            None
        };

        let (depth_buffer, stencil_buffer) = if desc.depth_format.has_depth() {
            let rb = self.backend.create_renderbuffer(&RenderbufferDesc {
                width,
                height,
                format: RenderbufferFormat::Depth(desc.depth_format),
                samples,
            })?;
            let stencil = desc.depth_format.has_stencil().then_some(rb);
            (Some(rb), stencil)
        } else {
            (None, None)
        };

        let target = RenderTarget {
            id: ResourceId::next(),
            texture: Arc::new(texture),
            depth_format: desc.depth_format,
            multisample_count: samples,
            usage: desc.usage,
            color_buffer,
            depth_buffer,
            stencil_buffer,
        };
        debug!(
            "render target {:?}: {}x{} {:?} {:?} msaa={}",
            target.id, width, height, format, desc.depth_format, samples
        );
        Ok(Arc::new(target))
    }

    pub fn create_shader(&mut self, desc: &ShaderDesc) -> GfxResult<Arc<Shader>> {
        let handle = self.backend.compile_shader(desc).map_err(|log| {
            error!("{:?} shader compile failed: {}", desc.stage, log);
            GfxError::ShaderCompile(log)
        })?;
        Ok(Arc::new(Shader {
            id: ResourceId::next(),
            stage: desc.stage,
            handle,
            hash_key: desc.hash_key(),
            entry_point: desc.entry_point.clone(),
            attributes: desc.attributes.clone(),
            samplers: desc.samplers.clone(),
        }))
    }

    /// Unbinds the slots holding the buffer. Fails while the buffer is bound
    /// below a slot holding another buffer, the slot layout can't shift.
    pub fn destroy_vertex_buffer(&mut self, buffer: &VertexBuffer) -> GfxResult<()> {
        if buffer.is_disposed() {
            return Ok(());
        }
        if self.vertex_buffers.unbind(buffer.id())? {
            self.attribs.mark_dirty();
            self.dirty |= DirtyFlags::VERTEX_BUFFERS;
        }
        if !buffer.disposed.set() {
            self.backend.destroy_buffer(buffer.handle());
        }
        Ok(())
    }

    pub fn destroy_index_buffer(&mut self, buffer: &IndexBuffer) {
        if buffer.disposed.set() {
            return;
        }
        if self.index_buffer.as_ref().is_some_and(|ib| ib.id() == buffer.id()) {
            self.index_buffer = None;
            self.dirty |= DirtyFlags::INDEX_BUFFER;
        }
        self.backend.destroy_buffer(buffer.handle());
    }

    pub fn destroy_texture(&mut self, texture: &Texture) {
        if texture.disposed.set() {
            return;
        }
        self.textures.remove(texture.id());
        self.vertex_textures.remove(texture.id());
        self.backend.destroy_texture(texture.handle());
    }

    /// Fails while the target is bound.
    pub fn destroy_render_target(&mut self, target: &RenderTarget) -> GfxResult<()> {
        if self.render_targets.iter().any(|b| b.target.id() == target.id()) {
            return Err(GfxError::invalid(format!(
                "render target {:?} is bound and can't be destroyed",
                target.id()
            )));
        }
        if target.texture.disposed.set() {
            return Ok(());
        }
        let purged = self.framebuffers.purge(self.backend.as_mut(), target.id());
        debug!("render target {:?} destroyed, {} framebuffer(s) purged", target.id(), purged);
        self.textures.remove(target.texture.id());
        self.vertex_textures.remove(target.texture.id());
        self.backend.destroy_texture(target.texture.handle());
        if let Some(rb) = target.color_buffer {
            self.backend.destroy_renderbuffer(rb);
        }
        if let Some(rb) = target.depth_buffer {
            self.backend.destroy_renderbuffer(rb);
        }
        if let Some(rb) = target.stencil_buffer {
            if Some(rb) != target.depth_buffer {
                self.backend.destroy_renderbuffer(rb);
            }
        }
        Ok(())
    }

    /// Unbinds the shader and drops every program linked from it.
    pub fn destroy_shader(&mut self, shader: &Shader) {
        if self.vertex_shader.as_ref().is_some_and(|s| s.id() == shader.id()) {
            self.vertex_shader = None;
            self.dirty |= DirtyFlags::VERTEX_SHADER;
        }
        if self.pixel_shader.as_ref().is_some_and(|s| s.id() == shader.id()) {
            self.pixel_shader = None;
            self.dirty |= DirtyFlags::PIXEL_SHADER;
        }
        let hash = shader.hash_key();
        if self
            .current_program
            .as_ref()
            .is_some_and(|p| p.key().references(hash))
        {
            self.current_program = None;
            self.dirty |= DirtyFlags::VERTEX_SHADER | DirtyFlags::PIXEL_SHADER;
        }
        self.programs.purge_shader(self.backend.as_mut(), hash);
        self.attribute_infos.retain(|(_, key), _| !key.references(hash));
        self.backend.destroy_shader(shader.handle());
    }
}
