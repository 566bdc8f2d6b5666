// RustPixel
// copyright zipxing@hotmail.com 2022～2025

use super::{range_end, DirtyFlags, GraphicsContext};
use crate::backend::PresentError;
use crate::error::{GfxError, GfxResult};
use crate::graphics::attribs::AttribResolver;
use crate::graphics::capabilities::Capabilities;
use crate::graphics::metrics::GraphicsMetrics;
use crate::graphics::state::BlendState;
use crate::graphics::types::{
    ClearOptions, Color, IndexElement, IndexElementSize, PrimitiveType, Rect,
};
use crate::graphics::vertex::VertexDeclaration;
use log::{error, info};
use std::sync::Arc;

impl GraphicsContext {
    /// Clear color, depth and stencil of the current surface.
    pub fn clear_color(&mut self, color: Color) -> GfxResult<()> {
        self.clear(
            ClearOptions::TARGET | ClearOptions::DEPTH_BUFFER | ClearOptions::STENCIL,
            color,
            1.0,
            0,
        )
    }

    /// Clear the whole viewport regardless of the scissor, depth-stencil and
    /// blend state the caller has set. Those are restored afterwards.
    pub fn clear(
        &mut self,
        options: ClearOptions,
        color: Color,
        depth: f32,
        stencil: i32,
    ) -> GfxResult<()> {
        self.ensure_not_lost()?;
        let depth_format = self.active_depth_format();
        let mut options = options;
        if !depth_format.has_depth() {
            options.remove(ClearOptions::DEPTH_BUFFER);
        }
        if !depth_format.has_stencil() {
            options.remove(ClearOptions::STENCIL);
        }

        let prev_scissor = self.scissor;
        let prev_depth_stencil = self.depth_stencil_state.clone();
        let prev_blend = self.blend_state.clone();
        let prev_factor = self.blend_factor;

        self.set_scissor_rect(self.viewport.bounds());
        let clear_state = self.clear_depth_stencil_state.clone();
        self.set_depth_stencil_state(&clear_state)?;
        self.set_blend_state(&BlendState::opaque())?;
        self.apply_state(false)?;

        self.backend.clear(options, color, depth, stencil);

        self.set_scissor_rect(prev_scissor);
        self.set_depth_stencil_state(&prev_depth_stencil)?;
        self.set_blend_state(&prev_blend)?;
        self.set_blend_factor(prev_factor);

        self.metrics.clear_count += 1;
        Ok(())
    }

    /// Draw vertices of the bound vertex buffers, starting at `start_vertex`.
    pub fn draw_primitives(
        &mut self,
        primitive: PrimitiveType,
        start_vertex: usize,
        primitive_count: usize,
    ) -> GfxResult<()> {
        self.check_draw(false, true, primitive_count)?;
        let count = primitive.element_count(primitive_count);
        if let Some(b) = self.vertex_buffers.get(0) {
            let available = b.buffer.vertex_count().saturating_sub(b.vertex_offset);
            if range_end("start_vertex", start_vertex, count)? > available {
                return Err(GfxError::out_of_range(
                    "start_vertex",
                    format!("{} vertices from {} of {}", count, start_vertex, available),
                ));
            }
        }

        self.apply_state(true)?;
        self.apply_attribs(0)?;
        self.backend.draw_arrays(primitive, start_vertex, count)?;
        self.count_draw(primitive_count as u64);
        Ok(())
    }

    /// Draw through the bound index buffer, index values are offset by
    /// `base_vertex`.
    pub fn draw_indexed_primitives(
        &mut self,
        primitive: PrimitiveType,
        base_vertex: usize,
        start_index: usize,
        primitive_count: usize,
    ) -> GfxResult<()> {
        self.check_draw(true, true, primitive_count)?;
        let count = primitive.element_count(primitive_count);
        let (index_count, size) = self.bound_index_range()?;
        if range_end("start_index", start_index, count)? > index_count {
            return Err(GfxError::out_of_range(
                "start_index",
                format!("{} indices from {} of {}", count, start_index, index_count),
            ));
        }

        self.check_base_vertex(base_vertex)?;
        self.apply_state(true)?;
        self.apply_attribs(base_vertex)?;
        self.backend.draw_elements(primitive, count, size, start_index)?;
        self.count_draw(primitive_count as u64);
        Ok(())
    }

    pub fn draw_instanced_primitives(
        &mut self,
        primitive: PrimitiveType,
        base_vertex: usize,
        start_index: usize,
        primitive_count: usize,
        base_instance: usize,
        instance_count: usize,
    ) -> GfxResult<()> {
        if !self.caps.supports_instancing {
            return Err(GfxError::unsupported(
                "instanced geometry drawing requires instancing support (GL 3.3 / ES 3.0)",
            ));
        }
        if base_instance > 0 && !self.caps.supports_base_index_instancing {
            return Err(GfxError::unsupported(
                "instanced drawing with a base instance requires base instance support",
            ));
        }
        self.check_draw(true, true, primitive_count)?;
        if instance_count == 0 {
            return Err(GfxError::out_of_range("instance_count", "must be greater than zero"));
        }
        let count = primitive.element_count(primitive_count);
        let (index_count, size) = self.bound_index_range()?;
        if range_end("start_index", start_index, count)? > index_count {
            return Err(GfxError::out_of_range(
                "start_index",
                format!("{} indices from {} of {}", count, start_index, index_count),
            ));
        }

        self.check_base_vertex(base_vertex)?;
        self.apply_state(true)?;
        self.apply_attribs(base_vertex)?;
        self.backend.draw_elements_instanced(
            primitive,
            count,
            size,
            start_index,
            instance_count,
            base_instance,
        )?;
        self.count_draw((primitive_count as u64).saturating_mul(instance_count as u64));
        Ok(())
    }

    /// Draw vertices straight from memory, bypassing the vertex buffer
    /// bindings.
    pub fn draw_user_primitives<T: bytemuck::Pod>(
        &mut self,
        primitive: PrimitiveType,
        vertices: &[T],
        vertex_offset: usize,
        primitive_count: usize,
        declaration: &Arc<VertexDeclaration>,
    ) -> GfxResult<()> {
        self.check_draw(false, false, primitive_count)?;
        if vertex_offset >= vertices.len() {
            return Err(GfxError::out_of_range(
                "vertex_offset",
                format!("offset {} of {} vertices", vertex_offset, vertices.len()),
            ));
        }
        let count = primitive.element_count(primitive_count);
        if vertex_offset + count > vertices.len() {
            return Err(GfxError::out_of_range(
                "primitive_count",
                format!("{} vertices from {} of {}", count, vertex_offset, vertices.len()),
            ));
        }
        check_user_stride::<T>(declaration)?;

        self.apply_state(true)?;
        let data = bytemuck::cast_slice(&vertices[vertex_offset..vertex_offset + count]);
        let buffer = self.backend.upload_user_vertices(data)?;
        self.dirty |= DirtyFlags::VERTEX_BUFFERS;
        self.apply_user_attribs(buffer, declaration)?;
        self.backend.draw_arrays(primitive, 0, count)?;
        self.count_draw(primitive_count as u64);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_user_indexed_primitives<T: bytemuck::Pod, I: IndexElement>(
        &mut self,
        primitive: PrimitiveType,
        vertices: &[T],
        vertex_offset: usize,
        num_vertices: usize,
        indices: &[I],
        index_offset: usize,
        primitive_count: usize,
        declaration: &Arc<VertexDeclaration>,
    ) -> GfxResult<()> {
        self.check_draw(false, false, primitive_count)?;
        if vertex_offset >= vertices.len() {
            return Err(GfxError::out_of_range(
                "vertex_offset",
                format!("offset {} of {} vertices", vertex_offset, vertices.len()),
            ));
        }
        if num_vertices == 0 || range_end("num_vertices", vertex_offset, num_vertices)? > vertices.len() {
            return Err(GfxError::out_of_range(
                "num_vertices",
                format!("{} vertices from {} of {}", num_vertices, vertex_offset, vertices.len()),
            ));
        }
        if index_offset >= indices.len() {
            return Err(GfxError::out_of_range(
                "index_offset",
                format!("offset {} of {} indices", index_offset, indices.len()),
            ));
        }
        let count = primitive.element_count(primitive_count);
        if index_offset + count > indices.len() {
            return Err(GfxError::out_of_range(
                "primitive_count",
                format!("{} indices from {} of {}", count, index_offset, indices.len()),
            ));
        }
        check_user_stride::<T>(declaration)?;

        self.apply_state(true)?;
        let vdata = bytemuck::cast_slice(&vertices[vertex_offset..vertex_offset + num_vertices]);
        let vbuffer = self.backend.upload_user_vertices(vdata)?;
        let idata = bytemuck::cast_slice(&indices[index_offset..index_offset + count]);
        let ibuffer = self.backend.upload_user_indices(idata)?;
        self.backend.bind_index_buffer(ibuffer, I::SIZE);
        self.dirty |= DirtyFlags::INDEX_BUFFER | DirtyFlags::VERTEX_BUFFERS;
        self.apply_user_attribs(vbuffer, declaration)?;
        self.backend.draw_elements(primitive, count, I::SIZE, 0)?;
        self.count_draw(primitive_count as u64);
        Ok(())
    }

    /// Checks shared by every draw, all made before the backend is touched.
    fn check_draw(
        &self,
        indexed: bool,
        uses_vertex_buffers: bool,
        primitive_count: usize,
    ) -> GfxResult<()> {
        self.ensure_not_lost()?;
        if self.vertex_shader.is_none() {
            return Err(GfxError::invalid("a vertex shader must be set before drawing"));
        }
        if self.pixel_shader.is_none() {
            return Err(GfxError::invalid("a pixel shader must be set before drawing"));
        }
        if uses_vertex_buffers && self.vertex_buffers.count() == 0 {
            return Err(GfxError::invalid("a vertex buffer must be set before drawing"));
        }
        if indexed && self.index_buffer.is_none() {
            return Err(GfxError::invalid("an index buffer must be set before drawing"));
        }
        if primitive_count == 0 {
            return Err(GfxError::out_of_range(
                "primitive_count",
                "must be greater than zero",
            ));
        }
        let max = self.params.profile.max_primitive_count();
        if primitive_count > max {
            return Err(GfxError::unsupported(format!(
                "{} primitives in one draw, the {:?} profile allows {}",
                primitive_count, self.params.profile, max
            )));
        }
        if uses_vertex_buffers {
            let frequencies = self.vertex_buffers.iter().map(|b| b.instance_frequency);
            AttribResolver::check_instancing(&self.caps, frequencies)?;
        }
        Ok(())
    }

    fn bound_index_range(&self) -> GfxResult<(usize, IndexElementSize)> {
        self.index_buffer
            .as_ref()
            .map(|ib| (ib.index_count(), ib.element_size()))
            .ok_or_else(|| GfxError::invalid("an index buffer must be set before drawing"))
    }

    fn count_draw(&mut self, primitives: u64) {
        self.metrics.draw_count += 1;
        self.metrics.primitive_count += primitives;
    }

    pub fn flush(&mut self) -> GfxResult<()> {
        self.ensure_not_lost()?;
        self.backend.flush();
        Ok(())
    }

    /// Show the back buffer and start a new frame of metrics.
    pub fn present(&mut self) -> GfxResult<()> {
        if self.is_render_target_bound() {
            return Err(GfxError::invalid(
                "cannot present while a render target is bound",
            ));
        }
        self.ensure_not_lost()?;
        self.metrics = GraphicsMetrics::default();
        let result = {
            let _guard = self.sync.lock();
            self.backend.present()
        };
        match result {
            Ok(()) => Ok(()),
            Err(PresentError::DeviceLost) => {
                error!("graphics device {} lost on present", self.device.0);
                self.lost = true;
                Err(GfxError::DeviceLost)
            }
            Err(PresentError::Fatal(msg)) => {
                error!("present failed: {}", msg);
                Err(GfxError::Backend(msg))
            }
        }
    }

    /// Recover from device loss, or pick up new backend limits.
    ///
    /// Every cached native object is dropped and all state is reissued on
    /// the next apply. Resources created before the loss must be recreated
    /// by the caller.
    pub fn reset(&mut self) -> GfxResult<()> {
        info!("resetting graphics device {}", self.device.0);
        self.caps = Capabilities::query(self.backend.as_mut());
        let (w, h) = self.backend.back_buffer_size();
        self.params.back_buffer_width = w;
        self.params.back_buffer_height = h;

        self.framebuffers.clear(self.backend.as_mut());
        self.programs.clear(self.backend.as_mut());
        self.current_program = None;
        self.attribute_infos.clear();
        self.attribs
            .reallocate(self.caps.max_vertex_buffer_slots, self.caps.max_vertex_attributes);
        self.vertex_buffers.set_max_slots(self.caps.max_vertex_buffer_slots);
        self.textures.reallocate(self.caps.max_texture_slots);
        self.samplers.reallocate(self.caps.max_texture_slots);
        self.vertex_textures.reallocate(self.caps.max_vertex_texture_slots);
        self.vertex_samplers.reallocate(self.caps.max_vertex_texture_slots);

        self.dirty = DirtyFlags::all();
        self.applied_scissor_test = None;
        self.lost = false;

        let targets = std::mem::take(&mut self.render_targets);
        self.apply_render_targets(&targets)
    }

    /// Read RGBA8 pixels of the back buffer, `None` reads all of it.
    pub fn read_back_buffer(&mut self, rect: Option<Rect>, out: &mut [u8]) -> GfxResult<()> {
        self.ensure_not_lost()?;
        if self.is_render_target_bound() {
            return Err(GfxError::invalid(
                "cannot read the back buffer while a render target is bound",
            ));
        }
        let (w, h) = (
            self.params.back_buffer_width as i32,
            self.params.back_buffer_height as i32,
        );
        let rect = rect.unwrap_or(Rect::new(0, 0, w, h));
        let inside = rect.x >= 0
            && rect.y >= 0
            && rect.width > 0
            && rect.height > 0
            && rect.x.checked_add(rect.width).is_some_and(|r| r <= w)
            && rect.y.checked_add(rect.height).is_some_and(|b| b <= h);
        if !inside {
            return Err(GfxError::out_of_range(
                "rect",
                format!("{:?} outside the {}x{} back buffer", rect, w, h),
            ));
        }
        // bounded by the back buffer size
        let needed = rect.width as usize * rect.height as usize * 4;
        if out.len() < needed {
            return Err(GfxError::out_of_range(
                "out",
                format!("{} bytes given, {} needed", out.len(), needed),
            ));
        }
        let _guard = self.sync.lock();
        self.backend.read_pixels(rect, &mut out[..needed])
    }
}

fn check_user_stride<T>(declaration: &VertexDeclaration) -> GfxResult<()> {
    let size = std::mem::size_of::<T>();
    if (declaration.stride() as usize) < size {
        return Err(GfxError::out_of_range(
            "vertex_declaration",
            format!(
                "stride {} is smaller than the {} byte vertex type",
                declaration.stride(),
                size
            ),
        ));
    }
    Ok(())
}
