// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Headless backend that records every call it receives.
//!
//! Handles are handed out from one counter starting at 1, so a sequence of
//! operations always produces the same handles. Capabilities, coordinate
//! convention and back buffer size are configurable, and link, framebuffer,
//! draw and present failures can be injected.

use super::*;
use crate::error::GfxError;
use crate::graphics::state::{DeviceState, StateId};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateBuffer { buffer: BufferHandle, kind: BufferKind, size: usize },
    WriteBuffer { buffer: BufferHandle, offset: usize, len: usize },
    DestroyBuffer(BufferHandle),
    CreateTexture { texture: TextureHandle, desc: TextureDesc },
    WriteTexture { texture: TextureHandle, level: u32, layer: u32, rect: Rect, len: usize },
    DestroyTexture(TextureHandle),
    CreateRenderbuffer { renderbuffer: RenderbufferHandle, desc: RenderbufferDesc },
    DestroyRenderbuffer(RenderbufferHandle),
    CreateFramebuffer(FramebufferHandle),
    Attach { fb: FramebufferHandle, point: AttachmentPoint, source: AttachmentSource },
    CheckFramebuffer(FramebufferHandle),
    DestroyFramebuffer(FramebufferHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    BindReadFramebuffer(FramebufferHandle),
    SetDrawBuffers(usize),
    BlitFramebuffer { index: usize, width: u32, height: u32 },
    InvalidateReadFramebuffer(usize),
    GenerateMipmaps(TextureHandle),
    CompileShader(ShaderHandle),
    DestroyShader(ShaderHandle),
    LinkProgram { program: ProgramHandle, vertex: ShaderHandle, pixel: ShaderHandle },
    UseProgram(ProgramHandle),
    SetPositionFixup { program: ProgramHandle, fixup: [f32; 4] },
    DestroyProgram(ProgramHandle),
    SetBlendState(StateId),
    SetBlendFactor(Color),
    SetDepthStencilState(StateId),
    SetRasterizerState { state: StateId, cull: CullFace },
    SetScissorTest(bool),
    SetScissorRect(Rect),
    SetViewport(Viewport),
    BindIndexBuffer { buffer: BufferHandle, size: IndexElementSize },
    BindVertexBuffer { slot: u32, buffer: BufferHandle },
    SetAttribPointer(AttribPointer),
    SetAttribDivisor { location: u32, divisor: u32 },
    EnableAttrib(u32),
    DisableAttrib(u32),
    BindTexture { stage: ShaderStage, slot: u32, texture: Option<TextureHandle> },
    BindSampler { stage: ShaderStage, slot: u32, state: StateId },
    Clear { options: ClearOptions, color: Color, depth: f32, stencil: i32 },
    DrawArrays { primitive: PrimitiveType, first: usize, count: usize },
    DrawElements { primitive: PrimitiveType, count: usize, start_index: usize },
    DrawElementsInstanced {
        primitive: PrimitiveType,
        count: usize,
        start_index: usize,
        instance_count: usize,
        base_instance: usize,
    },
    UploadUserVertices { buffer: BufferHandle, len: usize },
    UploadUserIndices { buffer: BufferHandle, len: usize },
    Flush,
    Present,
    ReadPixels(Rect),
}

impl BackendCall {
    pub fn is_clear(&self) -> bool {
        matches!(self, BackendCall::Clear { .. })
    }

    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            BackendCall::DrawArrays { .. }
                | BackendCall::DrawElements { .. }
                | BackendCall::DrawElementsInstanced { .. }
        )
    }
}

pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    next_handle: u32,
    caps: Capabilities,
    convention: CoordinateConvention,
    back_buffer: (u32, u32),
    link_error: Option<String>,
    framebuffer_error: Option<String>,
    draw_error: Option<String>,
    present_errors: VecDeque<PresentError>,
    hidden_attributes: HashSet<String>,
    program_attributes: HashMap<ProgramHandle, Vec<String>>,
    live_framebuffers: HashSet<FramebufferHandle>,
    back_buffer_color: Color,
    bound_framebuffer: Option<FramebufferHandle>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: vec![],
            next_handle: 1,
            caps: Capabilities::default(),
            convention: CoordinateConvention::BottomLeft,
            back_buffer: (800, 600),
            link_error: None,
            framebuffer_error: None,
            draw_error: None,
            present_errors: VecDeque::new(),
            hidden_attributes: HashSet::new(),
            program_attributes: HashMap::new(),
            live_framebuffers: HashSet::new(),
            back_buffer_color: Color::TRANSPARENT,
            bound_framebuffer: None,
        }
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_convention(mut self, convention: CoordinateConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn with_back_buffer_size(mut self, width: u32, height: u32) -> Self {
        self.back_buffer = (width, height);
        self
    }

    /// Capabilities reported by the next query.
    pub fn set_capabilities(&mut self, caps: Capabilities) {
        self.caps = caps;
    }

    /// Every link fails with `log` until cleared.
    pub fn fail_links(&mut self, log: Option<&str>) {
        self.link_error = log.map(str::to_string);
    }

    pub fn fail_framebuffer_checks(&mut self, reason: Option<&str>) {
        self.framebuffer_error = reason.map(str::to_string);
    }

    /// Every draw fails with `reason` and records nothing until cleared.
    pub fn fail_draws(&mut self, reason: Option<&str>) {
        self.draw_error = reason.map(str::to_string);
    }

    fn check_draw(&self) -> GfxResult<()> {
        match &self.draw_error {
            Some(reason) => Err(GfxError::Backend(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn queue_present_error(&mut self, err: PresentError) {
        self.present_errors.push_back(err);
    }

    /// Attributes with this name report no location, as if optimized out.
    pub fn hide_attribute(&mut self, name: &str) {
        self.hidden_attributes.insert(name.to_string());
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn count(&self, f: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|c| f(c)).count()
    }

    pub fn position(&self, f: impl Fn(&BackendCall) -> bool) -> Option<usize> {
        self.calls.iter().position(f)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.live_framebuffers.len()
    }

    pub fn is_framebuffer_live(&self, fb: FramebufferHandle) -> bool {
        self.live_framebuffers.contains(&fb)
    }

    fn next(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    fn record(&mut self, call: BackendCall) {
        self.calls.push(call);
    }
}

impl GraphicsBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn convention(&self) -> CoordinateConvention {
        self.convention
    }

    fn query_capabilities(&mut self) -> Capabilities {
        self.caps.clone()
    }

    fn back_buffer_size(&self) -> (u32, u32) {
        self.back_buffer
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> GfxResult<BufferHandle> {
        let buffer = BufferHandle(self.next());
        self.record(BackendCall::CreateBuffer {
            buffer,
            kind: desc.kind,
            size: desc.size,
        });
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> GfxResult<()> {
        self.record(BackendCall::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.record(BackendCall::DestroyBuffer(buffer));
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureHandle> {
        let texture = TextureHandle(self.next());
        self.record(BackendCall::CreateTexture {
            texture,
            desc: *desc,
        });
        Ok(texture)
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        level: u32,
        layer: u32,
        rect: Rect,
        data: &[u8],
    ) -> GfxResult<()> {
        self.record(BackendCall::WriteTexture {
            texture,
            level,
            layer,
            rect,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.record(BackendCall::DestroyTexture(texture));
    }

    fn create_renderbuffer(&mut self, desc: &RenderbufferDesc) -> GfxResult<RenderbufferHandle> {
        let renderbuffer = RenderbufferHandle(self.next());
        self.record(BackendCall::CreateRenderbuffer {
            renderbuffer,
            desc: *desc,
        });
        Ok(renderbuffer)
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.record(BackendCall::DestroyRenderbuffer(renderbuffer));
    }

    fn create_framebuffer(&mut self) -> GfxResult<FramebufferHandle> {
        let fb = FramebufferHandle(self.next());
        self.live_framebuffers.insert(fb);
        self.record(BackendCall::CreateFramebuffer(fb));
        Ok(fb)
    }

    fn attach(&mut self, fb: FramebufferHandle, point: AttachmentPoint, source: AttachmentSource) {
        self.record(BackendCall::Attach { fb, point, source });
    }

    fn check_framebuffer(&mut self, fb: FramebufferHandle) -> GfxResult<()> {
        self.record(BackendCall::CheckFramebuffer(fb));
        match &self.framebuffer_error {
            Some(reason) => Err(GfxError::Backend(format!(
                "framebuffer {:?} incomplete: {}",
                fb, reason
            ))),
            None => Ok(()),
        }
    }

    fn destroy_framebuffer(&mut self, fb: FramebufferHandle) {
        self.live_framebuffers.remove(&fb);
        self.record(BackendCall::DestroyFramebuffer(fb));
    }

    fn bind_framebuffer(&mut self, fb: Option<FramebufferHandle>) {
        self.bound_framebuffer = fb;
        self.record(BackendCall::BindFramebuffer(fb));
    }

    fn bind_read_framebuffer(&mut self, fb: FramebufferHandle) {
        self.record(BackendCall::BindReadFramebuffer(fb));
    }

    fn set_draw_buffers(&mut self, count: usize) {
        self.record(BackendCall::SetDrawBuffers(count));
    }

    fn blit_framebuffer(&mut self, index: usize, width: u32, height: u32) {
        self.record(BackendCall::BlitFramebuffer {
            index,
            width,
            height,
        });
    }

    fn invalidate_read_framebuffer(&mut self, color_count: usize) {
        self.record(BackendCall::InvalidateReadFramebuffer(color_count));
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle, _kind: TextureKind) {
        self.record(BackendCall::GenerateMipmaps(texture));
    }

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle, String> {
        if desc.code.is_empty() {
            return Err(String::from("empty shader code"));
        }
        let shader = ShaderHandle(self.next());
        self.record(BackendCall::CompileShader(shader));
        Ok(shader)
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.record(BackendCall::DestroyShader(shader));
    }

    fn link_program(&mut self, vertex: &Shader, pixel: &Shader) -> Result<ProgramHandle, String> {
        if let Some(log) = &self.link_error {
            return Err(log.clone());
        }
        let program = ProgramHandle(self.next());
        let names = vertex.attributes().iter().map(|a| a.name.clone()).collect();
        self.program_attributes.insert(program, names);
        self.record(BackendCall::LinkProgram {
            program,
            vertex: vertex.handle(),
            pixel: pixel.handle(),
        });
        Ok(program)
    }

    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<u32> {
        if self.hidden_attributes.contains(name) {
            return None;
        }
        self.program_attributes
            .get(&program)?
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.record(BackendCall::UseProgram(program));
    }

    fn set_position_fixup(&mut self, program: ProgramHandle, fixup: [f32; 4]) {
        self.record(BackendCall::SetPositionFixup { program, fixup });
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.program_attributes.remove(&program);
        self.record(BackendCall::DestroyProgram(program));
    }

    fn set_blend_state(&mut self, state: &BlendState) {
        self.record(BackendCall::SetBlendState(state.id()));
    }

    fn set_blend_factor(&mut self, factor: Color) {
        self.record(BackendCall::SetBlendFactor(factor));
    }

    fn set_depth_stencil_state(&mut self, state: &DepthStencilState) {
        self.record(BackendCall::SetDepthStencilState(state.id()));
    }

    fn set_rasterizer_state(&mut self, state: &RasterizerState, cull: CullFace, _depth_bias_scale: f32) {
        self.record(BackendCall::SetRasterizerState {
            state: state.id(),
            cull,
        });
    }

    fn set_scissor_test(&mut self, enable: bool) {
        self.record(BackendCall::SetScissorTest(enable));
    }

    fn set_scissor_rect(&mut self, rect: Rect) {
        self.record(BackendCall::SetScissorRect(rect));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.record(BackendCall::SetViewport(viewport));
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, size: IndexElementSize) {
        self.record(BackendCall::BindIndexBuffer { buffer, size });
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.record(BackendCall::BindVertexBuffer { slot, buffer });
    }

    fn set_attrib_pointer(&mut self, pointer: &AttribPointer) {
        self.record(BackendCall::SetAttribPointer(*pointer));
    }

    fn set_attrib_divisor(&mut self, location: u32, divisor: u32) {
        self.record(BackendCall::SetAttribDivisor { location, divisor });
    }

    fn enable_attrib(&mut self, location: u32) {
        self.record(BackendCall::EnableAttrib(location));
    }

    fn disable_attrib(&mut self, location: u32) {
        self.record(BackendCall::DisableAttrib(location));
    }

    fn bind_texture(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        texture: Option<(TextureHandle, TextureKind)>,
    ) {
        self.record(BackendCall::BindTexture {
            stage,
            slot,
            texture: texture.map(|(t, _)| t),
        });
    }

    fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: &SamplerState) {
        self.record(BackendCall::BindSampler {
            stage,
            slot,
            state: sampler.id(),
        });
    }

    fn clear(&mut self, options: ClearOptions, color: Color, depth: f32, stencil: i32) {
        if self.bound_framebuffer.is_none() && options.contains(ClearOptions::TARGET) {
            self.back_buffer_color = color;
        }
        self.record(BackendCall::Clear {
            options,
            color,
            depth,
            stencil,
        });
    }

    fn draw_arrays(&mut self, primitive: PrimitiveType, first: usize, count: usize) -> GfxResult<()> {
        self.check_draw()?;
        self.record(BackendCall::DrawArrays {
            primitive,
            first,
            count,
        });
        Ok(())
    }

    fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        count: usize,
        _size: IndexElementSize,
        start_index: usize,
    ) -> GfxResult<()> {
        self.check_draw()?;
        self.record(BackendCall::DrawElements {
            primitive,
            count,
            start_index,
        });
        Ok(())
    }

    fn draw_elements_instanced(
        &mut self,
        primitive: PrimitiveType,
        count: usize,
        _size: IndexElementSize,
        start_index: usize,
        instance_count: usize,
        base_instance: usize,
    ) -> GfxResult<()> {
        self.check_draw()?;
        self.record(BackendCall::DrawElementsInstanced {
            primitive,
            count,
            start_index,
            instance_count,
            base_instance,
        });
        Ok(())
    }

    fn upload_user_vertices(&mut self, data: &[u8]) -> GfxResult<BufferHandle> {
        let buffer = BufferHandle(self.next());
        self.record(BackendCall::UploadUserVertices {
            buffer,
            len: data.len(),
        });
        Ok(buffer)
    }

    fn upload_user_indices(&mut self, data: &[u8]) -> GfxResult<BufferHandle> {
        let buffer = BufferHandle(self.next());
        self.record(BackendCall::UploadUserIndices {
            buffer,
            len: data.len(),
        });
        Ok(buffer)
    }

    fn flush(&mut self) {
        self.record(BackendCall::Flush);
    }

    fn present(&mut self) -> Result<(), PresentError> {
        self.record(BackendCall::Present);
        match self.present_errors.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn read_pixels(&mut self, rect: Rect, out: &mut [u8]) -> GfxResult<()> {
        let needed = (rect.width.max(0) * rect.height.max(0) * 4) as usize;
        if out.len() < needed {
            return Err(GfxError::out_of_range(
                "out",
                format!("{} bytes needed, {} given", needed, out.len()),
            ));
        }
        let c = self.back_buffer_color;
        for px in out[..needed].chunks_exact_mut(4) {
            px.copy_from_slice(&[c.r, c.g, c.b, c.a]);
        }
        self.record(BackendCall::ReadPixels(rect));
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
