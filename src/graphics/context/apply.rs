// RustPixel
// copyright zipxing@hotmail.com 2022～2025

use super::{DirtyFlags, GraphicsContext};
use crate::backend::{BufferHandle, CoordinateConvention};
use crate::error::{GfxError, GfxResult};
use crate::graphics::attribs::SlotBinding;
use crate::graphics::resource::ResourceId;
use crate::graphics::shader::{ProgramKey, ShaderProgram};
use crate::graphics::types::DepthFormat;
use crate::graphics::vertex::{AttributeInfo, VertexDeclaration};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

impl GraphicsContext {
    /// Push every dirty piece of state. Clears stop after the scissor,
    /// draws continue with buffers, the program and textures.
    pub(crate) fn apply_state(&mut self, apply_shaders: bool) -> GfxResult<()> {
        if self.dirty.contains(DirtyFlags::BLEND_FACTOR) {
            self.backend.set_blend_factor(self.blend_factor);
            self.dirty.remove(DirtyFlags::BLEND_FACTOR);
        }
        if self.dirty.contains(DirtyFlags::BLEND) {
            self.backend.set_blend_state(&self.actual_blend_state);
            self.dirty.remove(DirtyFlags::BLEND);
        }
        if self.dirty.contains(DirtyFlags::DEPTH_STENCIL) {
            self.backend
                .set_depth_stencil_state(&self.actual_depth_stencil_state);
            self.dirty.remove(DirtyFlags::DEPTH_STENCIL);
        }
        if self.dirty.contains(DirtyFlags::RASTERIZER) {
            let desc = *self.actual_rasterizer_state.desc();
            // off-screen surfaces are y-inverted, so is the winding
            let cull = desc.cull_face(self.flip_winding());
            let bias_scale = self.active_depth_format().depth_bias_scale();
            self.backend
                .set_rasterizer_state(&self.actual_rasterizer_state, cull, bias_scale);
            if self.applied_scissor_test != Some(desc.scissor_test_enable) {
                self.backend.set_scissor_test(desc.scissor_test_enable);
                self.applied_scissor_test = Some(desc.scissor_test_enable);
            }
            self.dirty.remove(DirtyFlags::RASTERIZER);
        }
        if self.dirty.contains(DirtyFlags::SCISSOR) {
            let mut rect = self.scissor;
            if self.flip_back_buffer_rects() {
                rect = rect.flip_y(self.params.back_buffer_height as i32);
            }
            self.backend.set_scissor_rect(rect);
            self.dirty.remove(DirtyFlags::SCISSOR);
        }

        if !apply_shaders {
            return Ok(());
        }

        if self.dirty.contains(DirtyFlags::INDEX_BUFFER) {
            if let Some(ib) = &self.index_buffer {
                self.backend.bind_index_buffer(ib.handle(), ib.element_size());
            }
            self.dirty.remove(DirtyFlags::INDEX_BUFFER);
        }
        if self.dirty.contains(DirtyFlags::VERTEX_BUFFERS) {
            if let Some(b) = self.vertex_buffers.get(0) {
                self.backend.bind_vertex_buffer(0, b.buffer.handle());
            }
            self.dirty.remove(DirtyFlags::VERTEX_BUFFERS);
        }

        let (Some(vs), Some(ps)) = (self.vertex_shader.clone(), self.pixel_shader.clone()) else {
            return Err(GfxError::invalid(
                "a vertex shader and a pixel shader must be set before drawing",
            ));
        };
        if self
            .dirty
            .intersects(DirtyFlags::VERTEX_SHADER | DirtyFlags::PIXEL_SHADER)
        {
            let program = self.programs.get_program(self.backend.as_mut(), &vs, &ps)?;
            let changed = self
                .current_program
                .as_ref()
                .is_none_or(|p| p.handle() != program.handle());
            if changed {
                self.backend.use_program(program.handle());
            }
            self.backend
                .set_position_fixup(program.handle(), self.position_fixup());
            self.current_program = Some(program);

            if self.dirty.contains(DirtyFlags::VERTEX_SHADER) {
                self.metrics.vertex_shader_count += 1;
            }
            if self.dirty.contains(DirtyFlags::PIXEL_SHADER) {
                self.metrics.pixel_shader_count += 1;
            }
            self.dirty
                .remove(DirtyFlags::VERTEX_SHADER | DirtyFlags::PIXEL_SHADER);
        }

        let bound = self.textures.apply(self.backend.as_mut());
        self.samplers.apply(self.backend.as_mut());
        let vertex_bound = self.vertex_textures.apply(self.backend.as_mut());
        self.vertex_samplers.apply(self.backend.as_mut());
        self.metrics.texture_count += (bound + vertex_bound) as u64;
        Ok(())
    }

    /// Resolve and push the attribute layout of the bound vertex buffers,
    /// the first vertex read being `base_vertex`.
    pub(crate) fn apply_attribs(&mut self, base_vertex: usize) -> GfxResult<()> {
        let program = self.active_program()?;
        let mut slots: SmallVec<[SlotBinding; 4]> = SmallVec::new();
        for b in self.vertex_buffers.iter() {
            let decl = b.buffer.declaration();
            let attribute_info = attribute_info(&mut self.attribute_infos, decl, &program);
            slots.push(SlotBinding {
                buffer: b.buffer.handle(),
                attribute_info,
                base_offset: (decl.stride() as usize)
                    .saturating_mul(base_vertex.saturating_add(b.vertex_offset)),
                instance_frequency: b.instance_frequency,
            });
        }
        self.attribs.apply(self.backend.as_mut(), &self.caps, &slots)?;
        Ok(())
    }

    /// Byte offsets of every slot for a draw starting at `base_vertex` must
    /// fit in `usize`.
    pub(crate) fn check_base_vertex(&self, base_vertex: usize) -> GfxResult<()> {
        for b in self.vertex_buffers.iter() {
            base_vertex
                .checked_add(b.vertex_offset)
                .and_then(|v| v.checked_mul(b.buffer.declaration().stride() as usize))
                .ok_or_else(|| {
                    GfxError::out_of_range(
                        "base_vertex",
                        format!("{} overflows the slot offset", base_vertex),
                    )
                })?;
        }
        Ok(())
    }

    /// Layout for a transient user buffer. The resolver is forced dirty on
    /// both sides so the next buffer draw reissues every slot.
    pub(crate) fn apply_user_attribs(
        &mut self,
        buffer: BufferHandle,
        decl: &Arc<VertexDeclaration>,
    ) -> GfxResult<()> {
        let program = self.active_program()?;
        let attribute_info = attribute_info(&mut self.attribute_infos, decl, &program);
        self.attribs.mark_dirty();
        let slot = SlotBinding {
            buffer,
            attribute_info,
            base_offset: 0,
            instance_frequency: 0,
        };
        let result = self
            .attribs
            .apply(self.backend.as_mut(), &self.caps, std::slice::from_ref(&slot));
        self.attribs.mark_dirty();
        result.map(|_| ())
    }

    fn active_program(&self) -> GfxResult<Arc<ShaderProgram>> {
        self.current_program
            .clone()
            .ok_or_else(|| GfxError::invalid("no shader program is active"))
    }

    /// Position fixup uniform `[1, 1, hx, hy]`, y-inverted off-screen on
    /// bottom-left surfaces.
    pub(crate) fn position_fixup(&self) -> [f32; 4] {
        let mut fixup = [1.0, 1.0, 0.0, 0.0];
        if self.params.use_half_pixel_offset {
            if self.viewport.width > 0 {
                fixup[2] = (63.0 / 64.0) / self.viewport.width as f32;
            }
            if self.viewport.height > 0 {
                fixup[3] = -(63.0 / 64.0) / self.viewport.height as f32;
            }
        }
        if self.flip_winding() {
            fixup[1] = -fixup[1];
            fixup[3] = -fixup[3];
        }
        fixup
    }

    /// Bottom-left surface with a render target bound.
    pub(crate) fn flip_winding(&self) -> bool {
        self.convention == CoordinateConvention::BottomLeft && !self.render_targets.is_empty()
    }

    /// Bottom-left back buffer, rectangles given top-down must be flipped.
    pub(crate) fn flip_back_buffer_rects(&self) -> bool {
        self.convention == CoordinateConvention::BottomLeft && self.render_targets.is_empty()
    }

    /// Depth format of the surface currently drawn to.
    pub(crate) fn active_depth_format(&self) -> DepthFormat {
        match self.render_targets.first() {
            Some(b) => b.target.depth_format(),
            None => self.params.depth_stencil_format,
        }
    }
}

fn attribute_info(
    cache: &mut HashMap<(ResourceId, ProgramKey), Arc<AttributeInfo>>,
    decl: &VertexDeclaration,
    program: &ShaderProgram,
) -> Arc<AttributeInfo> {
    cache
        .entry((decl.id(), program.key()))
        .or_insert_with(|| Arc::new(AttributeInfo::build(decl, program)))
        .clone()
}
