// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Graphics Context
//!
//! One context drives one backend from one thread. State setters only
//! record what the caller wants and raise a dirty flag; the backend sees the
//! change when the next clear or draw applies state:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ set_blend_state / set_rasterizer_state / set_vertex_buffers .. │
//! │        │ resolve preset clone, validate, bind to device        │
//! │        ▼                                                       │
//! │   requested + actual stored, DirtyFlags |= X                   │
//! └────────┬───────────────────────────────────────────────────────┘
//!          │ draw_* / clear
//!          ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │ apply_state: blend factor, blend → depth-stencil → rasterizer  │
//! │              → scissor [→ index → vertex → program → textures] │
//! │ attribute resolver: per slot skip / rebind, enable-set diff    │
//! │ native draw                                                    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Render target changes go through the framebuffer cache, see
//! [`set_render_targets`](GraphicsContext::set_render_targets).
//!
//! The context holds a `Box<dyn GraphicsBackend>` without a `Send` bound, so
//! it can't be moved to another thread. Code that feeds the same native
//! context from several producers shares a [`SyncHandle`] instead.

use crate::backend::{CoordinateConvention, GraphicsBackend};
use crate::config::{GraphicsConfig, PresentationParameters};
use crate::error::{GfxError, GfxResult};
use crate::graphics::attribs::AttribResolver;
use crate::graphics::capabilities::{Capabilities, GraphicsProfile};
use crate::graphics::framebuffer::FramebufferCache;
use crate::graphics::metrics::GraphicsMetrics;
use crate::graphics::render_target::RenderTargetSet;
use crate::graphics::resource::{IndexBuffer, ResourceId, Texture, VertexBuffer};
use crate::graphics::shader::{ProgramKey, Shader, ShaderProgram, ShaderProgramCache};
use crate::graphics::state::{
    BlendState, BuiltinBlend, BuiltinDepthStencil, BuiltinRasterizer, BuiltinStates,
    DepthStencilState, DeviceId, DeviceState, RasterizerState, SamplerState,
};
use crate::graphics::sync::SyncHandle;
use crate::graphics::textures::{SamplerStateCollection, TextureCollection};
use crate::graphics::types::{Color, Rect, ShaderStage, Viewport};
use crate::graphics::vertex::{AttributeInfo, VertexBufferBinding, VertexBufferBindings};
use bitflags::bitflags;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

mod apply;
mod draw;
mod resources;
mod targets;

#[cfg(test)]
mod tests;

bitflags! {
    /// Backend state not pushed since it last changed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u16 {
        const BLEND = 1 << 0;
        const BLEND_FACTOR = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
        const RASTERIZER = 1 << 3;
        const SCISSOR = 1 << 4;
        const INDEX_BUFFER = 1 << 5;
        const VERTEX_BUFFERS = 1 << 6;
        const VERTEX_SHADER = 1 << 7;
        const PIXEL_SHADER = 1 << 8;
    }
}

pub struct GraphicsContext {
    backend: Box<dyn GraphicsBackend>,
    device: DeviceId,
    caps: Capabilities,
    params: PresentationParameters,
    convention: CoordinateConvention,
    sync: SyncHandle,
    dirty: DirtyFlags,

    blend_state: Arc<BlendState>,
    actual_blend_state: Arc<BlendState>,
    builtin_blend: BuiltinStates<BlendState, { BuiltinBlend::COUNT }>,
    blend_factor: Color,
    depth_stencil_state: Arc<DepthStencilState>,
    actual_depth_stencil_state: Arc<DepthStencilState>,
    builtin_depth_stencil: BuiltinStates<DepthStencilState, { BuiltinDepthStencil::COUNT }>,
    clear_depth_stencil_state: Arc<DepthStencilState>,
    rasterizer_state: Arc<RasterizerState>,
    actual_rasterizer_state: Arc<RasterizerState>,
    builtin_rasterizer: BuiltinStates<RasterizerState, { BuiltinRasterizer::COUNT }>,
    /// Scissor test as last pushed, `None` when the native state is unknown.
    applied_scissor_test: Option<bool>,
    scissor: Rect,
    viewport: Viewport,

    index_buffer: Option<Arc<IndexBuffer>>,
    vertex_buffers: VertexBufferBindings,
    vertex_shader: Option<Arc<Shader>>,
    pixel_shader: Option<Arc<Shader>>,
    programs: ShaderProgramCache,
    current_program: Option<Arc<ShaderProgram>>,
    attribute_infos: HashMap<(ResourceId, ProgramKey), Arc<AttributeInfo>>,
    attribs: AttribResolver,

    textures: TextureCollection,
    samplers: SamplerStateCollection,
    vertex_textures: TextureCollection,
    vertex_samplers: SamplerStateCollection,

    render_targets: RenderTargetSet,
    framebuffers: FramebufferCache,
    metrics: GraphicsMetrics,
    lost: bool,
}

impl GraphicsContext {
    pub fn new(backend: Box<dyn GraphicsBackend>, params: PresentationParameters) -> GfxResult<Self> {
        Self::with_sync_handle(backend, params, SyncHandle::new())
    }

    pub fn from_config(backend: Box<dyn GraphicsBackend>, config: &GraphicsConfig) -> GfxResult<Self> {
        Self::new(backend, config.presentation_parameters())
    }

    /// Create a context sharing `sync` with other contexts on the same
    /// native device context.
    pub fn with_sync_handle(
        mut backend: Box<dyn GraphicsBackend>,
        mut params: PresentationParameters,
        sync: SyncHandle,
    ) -> GfxResult<Self> {
        let device = DeviceId::next();
        let caps = Capabilities::query(backend.as_mut());
        let convention = backend.convention();
        let (w, h) = backend.back_buffer_size();
        params.back_buffer_width = w;
        params.back_buffer_height = h;
        let (format, samples) = caps.query_render_target_format(
            params.profile,
            params.back_buffer_format,
            params.multisample_count,
        );
        params.back_buffer_format = format;
        params.multisample_count = samples;

        let mut builtin_blend = BuiltinStates::new();
        let blend_state = BlendState::opaque();
        let actual_blend_state = builtin_blend.resolve(&blend_state);
        actual_blend_state.meta().bind(device, BlendState::KIND)?;

        let mut builtin_depth_stencil = BuiltinStates::new();
        let depth_stencil_state = DepthStencilState::default_state();
        let actual_depth_stencil_state = builtin_depth_stencil.resolve(&depth_stencil_state);
        actual_depth_stencil_state
            .meta()
            .bind(device, DepthStencilState::KIND)?;
        let clear_depth_stencil_state = Arc::new(DepthStencilState::for_clear());
        clear_depth_stencil_state
            .meta()
            .bind(device, DepthStencilState::KIND)?;

        let mut builtin_rasterizer = BuiltinStates::new();
        let rasterizer_state = RasterizerState::cull_counter_clockwise();
        let actual_rasterizer_state = builtin_rasterizer.resolve(&rasterizer_state);
        actual_rasterizer_state
            .meta()
            .bind(device, RasterizerState::KIND)?;

        let viewport = Viewport::new(0, 0, w as i32, h as i32);
        let blend_factor = blend_state.desc().blend_factor;

        info!(
            "graphics device {} on {}: {}x{} {:?} {:?} msaa={} profile={:?}",
            device.0,
            backend.name(),
            w,
            h,
            params.back_buffer_format,
            params.depth_stencil_format,
            params.multisample_count,
            params.profile,
        );

        let mut ctx = Self {
            device,
            convention,
            sync,
            dirty: DirtyFlags::all(),
            blend_state,
            actual_blend_state,
            builtin_blend,
            blend_factor,
            depth_stencil_state,
            actual_depth_stencil_state,
            builtin_depth_stencil,
            clear_depth_stencil_state,
            rasterizer_state,
            actual_rasterizer_state,
            builtin_rasterizer,
            applied_scissor_test: None,
            scissor: viewport.bounds(),
            viewport,
            index_buffer: None,
            vertex_buffers: VertexBufferBindings::new(caps.max_vertex_buffer_slots),
            vertex_shader: None,
            pixel_shader: None,
            programs: ShaderProgramCache::new(),
            current_program: None,
            attribute_infos: HashMap::new(),
            attribs: AttribResolver::new(caps.max_vertex_buffer_slots, caps.max_vertex_attributes),
            textures: TextureCollection::new(ShaderStage::Pixel, caps.max_texture_slots),
            samplers: SamplerStateCollection::new(ShaderStage::Pixel, device, caps.max_texture_slots),
            vertex_textures: TextureCollection::new(ShaderStage::Vertex, caps.max_vertex_texture_slots),
            vertex_samplers: SamplerStateCollection::new(
                ShaderStage::Vertex,
                device,
                caps.max_vertex_texture_slots,
            ),
            render_targets: RenderTargetSet::new(),
            framebuffers: FramebufferCache::new(),
            metrics: GraphicsMetrics::default(),
            lost: false,
            caps,
            params,
            backend,
        };
        ctx.apply_render_targets(&[])?;
        Ok(ctx)
    }

    // ------------------------------------------------------------------
    // render state
    // ------------------------------------------------------------------

    pub fn blend_state(&self) -> &Arc<BlendState> {
        &self.blend_state
    }

    /// Also resets the blend factor to the one the state carries.
    pub fn set_blend_state(&mut self, state: &Arc<BlendState>) -> GfxResult<()> {
        if Arc::ptr_eq(&self.blend_state, state) {
            return Ok(());
        }
        if state.desc().independent_blend_enable && !self.caps.supports_separate_blend_states {
            return Err(GfxError::unsupported(
                "independent blend states require separate blend state support",
            ));
        }
        let actual = self.builtin_blend.resolve(state);
        actual.meta().bind(self.device, BlendState::KIND)?;
        self.blend_state = state.clone();
        self.actual_blend_state = actual;

        let factor = state.desc().blend_factor;
        if factor != self.blend_factor {
            self.blend_factor = factor;
            self.dirty |= DirtyFlags::BLEND_FACTOR;
        }
        self.dirty |= DirtyFlags::BLEND;
        Ok(())
    }

    pub fn blend_factor(&self) -> Color {
        self.blend_factor
    }

    pub fn set_blend_factor(&mut self, factor: Color) {
        if self.blend_factor == factor {
            return;
        }
        self.blend_factor = factor;
        self.dirty |= DirtyFlags::BLEND_FACTOR;
    }

    pub fn depth_stencil_state(&self) -> &Arc<DepthStencilState> {
        &self.depth_stencil_state
    }

    pub fn set_depth_stencil_state(&mut self, state: &Arc<DepthStencilState>) -> GfxResult<()> {
        if Arc::ptr_eq(&self.depth_stencil_state, state) {
            return Ok(());
        }
        let actual = self.builtin_depth_stencil.resolve(state);
        actual.meta().bind(self.device, DepthStencilState::KIND)?;
        self.depth_stencil_state = state.clone();
        self.actual_depth_stencil_state = actual;
        self.dirty |= DirtyFlags::DEPTH_STENCIL;
        Ok(())
    }

    pub fn rasterizer_state(&self) -> &Arc<RasterizerState> {
        &self.rasterizer_state
    }

    pub fn set_rasterizer_state(&mut self, state: &Arc<RasterizerState>) -> GfxResult<()> {
        if Arc::ptr_eq(&self.rasterizer_state, state) {
            return Ok(());
        }
        if !state.desc().depth_clip_enable && !self.caps.supports_depth_clamp {
            return Err(GfxError::unsupported(
                "disabling depth clipping requires depth clamp support",
            ));
        }
        let actual = self.builtin_rasterizer.resolve(state);
        actual.meta().bind(self.device, RasterizerState::KIND)?;
        self.rasterizer_state = state.clone();
        self.actual_rasterizer_state = actual;
        self.dirty |= DirtyFlags::RASTERIZER;
        Ok(())
    }

    pub fn scissor_rect(&self) -> Rect {
        self.scissor
    }

    pub fn set_scissor_rect(&mut self, rect: Rect) {
        if self.scissor == rect {
            return;
        }
        self.scissor = rect;
        self.dirty |= DirtyFlags::SCISSOR;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Pushed right away, the position fixup depends on it so the vertex
    /// shader is marked dirty.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        let mut pushed = viewport;
        if self.flip_back_buffer_rects() {
            pushed.y = self.params.back_buffer_height as i32 - viewport.y - viewport.height;
        }
        self.backend.set_viewport(pushed);
        self.dirty |= DirtyFlags::VERTEX_SHADER;
    }

    // ------------------------------------------------------------------
    // buffers, shaders, textures
    // ------------------------------------------------------------------

    pub fn index_buffer(&self) -> Option<&Arc<IndexBuffer>> {
        self.index_buffer.as_ref()
    }

    pub fn set_index_buffer(&mut self, buffer: Option<&Arc<IndexBuffer>>) -> GfxResult<()> {
        if let Some(b) = buffer {
            if b.is_disposed() {
                return Err(GfxError::invalid(format!("index buffer {:?} is disposed", b.id())));
            }
        }
        let same = match (&self.index_buffer, buffer) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            self.index_buffer = buffer.cloned();
            self.dirty |= DirtyFlags::INDEX_BUFFER;
        }
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, buffer: Option<&Arc<VertexBuffer>>) -> GfxResult<()> {
        match buffer {
            Some(b) => self.set_vertex_buffers(&[VertexBufferBinding::new(b.clone())]),
            None => self.set_vertex_buffers(&[]),
        }
    }

    pub fn set_vertex_buffers(&mut self, bindings: &[VertexBufferBinding]) -> GfxResult<()> {
        if self.vertex_buffers.set(bindings)? {
            self.dirty |= DirtyFlags::VERTEX_BUFFERS;
        }
        Ok(())
    }

    pub fn vertex_buffers(&self) -> &VertexBufferBindings {
        &self.vertex_buffers
    }

    pub fn vertex_shader(&self) -> Option<&Arc<Shader>> {
        self.vertex_shader.as_ref()
    }

    pub fn set_vertex_shader(&mut self, shader: Option<&Arc<Shader>>) -> GfxResult<()> {
        if Self::replace_shader(&mut self.vertex_shader, shader, ShaderStage::Vertex)? {
            self.dirty |= DirtyFlags::VERTEX_SHADER;
        }
        Ok(())
    }

    pub fn pixel_shader(&self) -> Option<&Arc<Shader>> {
        self.pixel_shader.as_ref()
    }

    pub fn set_pixel_shader(&mut self, shader: Option<&Arc<Shader>>) -> GfxResult<()> {
        if Self::replace_shader(&mut self.pixel_shader, shader, ShaderStage::Pixel)? {
            self.dirty |= DirtyFlags::PIXEL_SHADER;
        }
        Ok(())
    }

    fn replace_shader(
        slot: &mut Option<Arc<Shader>>,
        shader: Option<&Arc<Shader>>,
        stage: ShaderStage,
    ) -> GfxResult<bool> {
        if let Some(s) = shader {
            if s.stage() != stage {
                return Err(GfxError::invalid(format!(
                    "{:?} shader {:?} set as {:?} shader",
                    s.stage(),
                    s.id(),
                    stage
                )));
            }
        }
        let same = match (&*slot, shader) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            *slot = shader.cloned();
        }
        Ok(!same)
    }

    pub fn set_texture(&mut self, slot: usize, texture: Option<&Arc<Texture>>) -> GfxResult<()> {
        self.textures.set(slot, texture.cloned())
    }

    pub fn set_vertex_texture(&mut self, slot: usize, texture: Option<&Arc<Texture>>) -> GfxResult<()> {
        self.vertex_textures.set(slot, texture.cloned())
    }

    pub fn textures(&self) -> &TextureCollection {
        &self.textures
    }

    pub fn set_sampler_state(&mut self, slot: usize, sampler: &Arc<SamplerState>) -> GfxResult<()> {
        self.samplers.set(slot, sampler.clone())
    }

    pub fn set_vertex_sampler_state(&mut self, slot: usize, sampler: &Arc<SamplerState>) -> GfxResult<()> {
        self.vertex_samplers.set(slot, sampler.clone())
    }

    pub fn samplers(&self) -> &SamplerStateCollection {
        &self.samplers
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    pub fn device_id(&self) -> DeviceId {
        self.device
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn presentation_parameters(&self) -> &PresentationParameters {
        &self.params
    }

    pub fn graphics_profile(&self) -> GraphicsProfile {
        self.params.profile
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn metrics(&self) -> GraphicsMetrics {
        self.metrics
    }

    pub fn sync_handle(&self) -> &SyncHandle {
        &self.sync
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn framebuffer_cache(&self) -> &FramebufferCache {
        &self.framebuffers
    }

    /// Downcast the backend, like adapters are reached through `as_any`.
    pub fn backend_as<T: 'static>(&mut self) -> Option<&mut T> {
        self.backend.as_any().downcast_mut::<T>()
    }

    fn ensure_not_lost(&self) -> GfxResult<()> {
        if self.lost {
            return Err(GfxError::DeviceLost);
        }
        Ok(())
    }
}

/// `start + len`, an argument range error when it overflows.
pub(crate) fn range_end(name: &'static str, start: usize, len: usize) -> GfxResult<usize> {
    start
        .checked_add(len)
        .ok_or_else(|| GfxError::out_of_range(name, format!("{} + {} overflows", start, len)))
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        self.framebuffers.clear(self.backend.as_mut());
        self.programs.clear(self.backend.as_mut());
    }
}
