// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # OpenGL Backend
//!
//! Drives desktop GL 3.3+ and GLES 3.0+ through glow. Surfaces have a
//! bottom-left origin, so the core flips back buffer rectangles and inverts
//! off-screen rendering through the `posFixup` uniform every vertex shader
//! is expected to declare.
//!
//! ```text
//!  core handle ──► HashMap<u32, glow object>
//!  vertex slots ──► one VAO, ARRAY_BUFFER rebound per slot
//!  samplers    ──► sampler objects created on first use, keyed by StateId
//!  textures    ──► pixel units [0, n), vertex units [n, n + m)
//! ```
//!
//! The window system owns the swap chain: presenting calls back into the
//! closure given to [`GlBackend::with_present`].

use super::*;
use crate::error::GfxError;
use crate::graphics::state::{
    Blend, BlendFunction, ColorWriteChannels, CompareFunction, DeviceState, FillMode, FilterKind,
    FrontFace, StateId, StencilFace, StencilOperation, TextureAddressMode, TextureFilter,
};
use glow::HasContext;
use log::{debug, info, warn};
use std::collections::HashMap;

/// EXT_texture_filter_anisotropic, core since GL 4.6.
const TEXTURE_MAX_ANISOTROPY: u32 = 0x84FE;
const POS_FIXUP_UNIFORM: &str = "posFixup";

type PresentFn = Box<dyn FnMut() -> Result<(), PresentError>>;

struct GlProgram {
    program: glow::Program,
    pos_fixup: Option<glow::UniformLocation>,
}

pub struct GlBackend {
    gl: glow::Context,
    size: (u32, u32),
    present: Option<PresentFn>,
    next_handle: u32,

    vao: Option<glow::VertexArray>,
    stream_vertices: Option<(BufferHandle, glow::Buffer)>,
    stream_indices: Option<(BufferHandle, glow::Buffer)>,

    buffers: HashMap<u32, glow::Buffer>,
    textures: HashMap<u32, (glow::Texture, TextureKind, SurfaceFormat)>,
    renderbuffers: HashMap<u32, glow::Renderbuffer>,
    framebuffers: HashMap<u32, glow::Framebuffer>,
    shaders: HashMap<u32, glow::Shader>,
    programs: HashMap<u32, GlProgram>,
    samplers: HashMap<StateId, glow::Sampler>,

    bound_framebuffer: Option<glow::Framebuffer>,
    /// Texture bound on unit 0, restored after scratch binds.
    unit0: Option<(glow::Texture, u32)>,
    pixel_units: u32,
}

impl GlBackend {
    /// Wrap a current GL context whose default framebuffer is
    /// `width` x `height`.
    pub fn new(gl: glow::Context, width: u32, height: u32) -> GfxResult<Self> {
        let vao = unsafe {
            let vao = gl.create_vertex_array().map_err(GfxError::Backend)?;
            gl.bind_vertex_array(Some(vao));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            vao
        };
        let version = gl.version();
        info!(
            "gl backend: {}.{} embedded={} {}",
            version.major, version.minor, version.is_embedded, version.vendor_info
        );
        Ok(Self {
            gl,
            size: (width, height),
            present: None,
            next_handle: 1,
            vao: Some(vao),
            stream_vertices: None,
            stream_indices: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            samplers: HashMap::new(),
            bound_framebuffer: None,
            unit0: None,
            pixel_units: 16,
        })
    }

    /// Swap buffers through the window system, e.g. a glutin surface.
    pub fn with_present(mut self, f: impl FnMut() -> Result<(), PresentError> + 'static) -> Self {
        self.present = Some(Box::new(f));
        self
    }

    /// Track a new default framebuffer size, followed by
    /// `GraphicsContext::reset`.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn next(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    fn is_desktop_at_least(&self, major: u32, minor: u32) -> bool {
        let v = self.gl.version();
        !v.is_embedded && (v.major, v.minor) >= (major, minor)
    }

    fn is_es_at_least(&self, major: u32, minor: u32) -> bool {
        let v = self.gl.version();
        v.is_embedded && (v.major, v.minor) >= (major, minor)
    }

    fn has_extension(&self, name: &str) -> bool {
        self.gl.supported_extensions().contains(name)
    }

    fn unit(&self, stage: ShaderStage, slot: u32) -> u32 {
        match stage {
            ShaderStage::Pixel => slot,
            ShaderStage::Vertex => self.pixel_units + slot,
        }
    }

    /// Bind `texture` on unit 0 for an upload or mip rebuild, then restore
    /// whatever the core had there.
    fn with_scratch_texture(&mut self, texture: glow::Texture, target: u32, f: impl FnOnce(&glow::Context)) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0);
            self.gl.bind_texture(target, Some(texture));
            f(&self.gl);
            self.gl.bind_texture(target, None);
            if let Some((t, t_target)) = self.unit0 {
                self.gl.bind_texture(t_target, Some(t));
            }
        }
    }

    fn sampler_for(&mut self, state: &SamplerState) -> Option<glow::Sampler> {
        if let Some(s) = self.samplers.get(&state.id()) {
            return Some(*s);
        }
        let desc = state.desc();
        let sampler = match unsafe { self.gl.create_sampler() } {
            Ok(s) => s,
            Err(e) => {
                warn!("create sampler failed: {}", e);
                return None;
            }
        };
        let (min, mag, mip) = desc.filter.split();
        let min_filter = match (min, mip) {
            (FilterKind::Nearest, FilterKind::Nearest) => glow::NEAREST_MIPMAP_NEAREST,
            (FilterKind::Nearest, FilterKind::Linear) => glow::NEAREST_MIPMAP_LINEAR,
            (FilterKind::Linear, FilterKind::Nearest) => glow::LINEAR_MIPMAP_NEAREST,
            (FilterKind::Linear, FilterKind::Linear) => glow::LINEAR_MIPMAP_LINEAR,
        };
        let mag_filter = match mag {
            FilterKind::Nearest => glow::NEAREST,
            FilterKind::Linear => glow::LINEAR,
        };
        let desktop = !self.gl.version().is_embedded;
        unsafe {
            let gl = &self.gl;
            gl.sampler_parameter_i32(sampler, glow::TEXTURE_MIN_FILTER, min_filter as i32);
            gl.sampler_parameter_i32(sampler, glow::TEXTURE_MAG_FILTER, mag_filter as i32);
            gl.sampler_parameter_i32(sampler, glow::TEXTURE_WRAP_S, gl_address(desc.address_u, desktop));
            gl.sampler_parameter_i32(sampler, glow::TEXTURE_WRAP_T, gl_address(desc.address_v, desktop));
            gl.sampler_parameter_i32(sampler, glow::TEXTURE_WRAP_R, gl_address(desc.address_w, desktop));
            gl.sampler_parameter_f32(sampler, glow::TEXTURE_MIN_LOD, desc.max_mip_level as f32);
            if desktop {
                gl.sampler_parameter_f32_slice(
                    sampler,
                    glow::TEXTURE_BORDER_COLOR,
                    &desc.border_color.to_array(),
                );
                gl.sampler_parameter_f32(
                    sampler,
                    glow::TEXTURE_LOD_BIAS,
                    desc.mip_map_level_of_detail_bias,
                );
            }
            if matches!(desc.filter, TextureFilter::Anisotropic)
                && self.has_extension("GL_EXT_texture_filter_anisotropic")
            {
                gl.sampler_parameter_f32(
                    sampler,
                    TEXTURE_MAX_ANISOTROPY,
                    desc.max_anisotropy.max(1) as f32,
                );
            }
            match desc.comparison_function {
                Some(func) => {
                    gl.sampler_parameter_i32(
                        sampler,
                        glow::TEXTURE_COMPARE_MODE,
                        glow::COMPARE_REF_TO_TEXTURE as i32,
                    );
                    gl.sampler_parameter_i32(sampler, glow::TEXTURE_COMPARE_FUNC, gl_compare(func) as i32);
                }
                None => {
                    gl.sampler_parameter_i32(sampler, glow::TEXTURE_COMPARE_MODE, glow::NONE as i32);
                }
            }
        }
        debug!("gl sampler for {:?}", state.id());
        self.samplers.insert(state.id(), sampler);
        Some(sampler)
    }

    /// Bind `fb` for attachment work and return the previous binding.
    fn edit_framebuffer(&mut self, fb: FramebufferHandle) -> Option<glow::Framebuffer> {
        let native = self.framebuffers.get(&fb.0).copied();
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, native) };
        native
    }

    fn restore_framebuffer(&mut self) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, self.bound_framebuffer) };
    }

    fn upload_stream(&mut self, target: u32, data: &[u8], index: bool) -> GfxResult<BufferHandle> {
        let existing = if index { self.stream_indices } else { self.stream_vertices };
        let (handle, buffer) = match existing {
            Some(s) => s,
            None => {
                let buffer = unsafe { self.gl.create_buffer() }.map_err(GfxError::Backend)?;
                let handle = BufferHandle(self.next());
                self.buffers.insert(handle.0, buffer);
                if index {
                    self.stream_indices = Some((handle, buffer));
                } else {
                    self.stream_vertices = Some((handle, buffer));
                }
                (handle, buffer)
            }
        };
        unsafe {
            self.gl.bind_buffer(target, Some(buffer));
            self.gl.buffer_data_u8_slice(target, data, glow::STREAM_DRAW);
        }
        Ok(handle)
    }
}

impl GraphicsBackend for GlBackend {
    fn name(&self) -> &str {
        "opengl"
    }

    fn convention(&self) -> CoordinateConvention {
        CoordinateConvention::BottomLeft
    }

    fn query_capabilities(&mut self) -> Capabilities {
        let get = |p: u32| unsafe { self.gl.get_parameter_i32(p) }.max(0) as usize;
        let max_pixel_units = get(glow::MAX_TEXTURE_IMAGE_UNITS);
        let max_vertex_units = get(glow::MAX_VERTEX_TEXTURE_IMAGE_UNITS);
        let combined = get(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS);
        let pixel_units = max_pixel_units.min(crate::graphics::capabilities::MAX_TEXTURE_SLOTS);
        let vertex_units = max_vertex_units.min(combined.saturating_sub(pixel_units));

        let caps = Capabilities {
            supports_instancing: self.is_desktop_at_least(3, 3) || self.is_es_at_least(3, 0),
            // base instance draws are not routed through glow here
            supports_base_index_instancing: false,
            supports_separate_blend_states: self.is_desktop_at_least(4, 0)
                || self.is_es_at_least(3, 2)
                || self.has_extension("GL_ARB_draw_buffers_blend"),
            supports_blit_framebuffer: self.is_desktop_at_least(3, 0) || self.is_es_at_least(3, 0),
            supports_invalidate_framebuffer: self.is_desktop_at_least(4, 3)
                || self.is_es_at_least(3, 0),
            supports_depth_clamp: self.is_desktop_at_least(3, 2)
                || self.has_extension("GL_EXT_depth_clamp"),
            supports_framebuffer_object: true,
            supports_srgb: true,
            max_vertex_buffer_slots: crate::graphics::capabilities::MAX_VERTEX_BUFFER_SLOTS,
            max_render_targets: get(glow::MAX_DRAW_BUFFERS),
            max_texture_slots: pixel_units,
            max_vertex_texture_slots: vertex_units,
            max_vertex_attributes: get(glow::MAX_VERTEX_ATTRIBS),
            max_multisample_count: get(glow::MAX_SAMPLES) as u32,
        };
        self.pixel_units = pixel_units as u32;
        debug!("gl capabilities: {:?}", caps);
        caps
    }

    fn back_buffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> GfxResult<BufferHandle> {
        let target = gl_buffer_target(desc.kind);
        let usage = if desc.dynamic {
            glow::DYNAMIC_DRAW
        } else {
            glow::STATIC_DRAW
        };
        let buffer = unsafe {
            let buffer = self.gl.create_buffer().map_err(GfxError::Backend)?;
            self.gl.bind_buffer(target, Some(buffer));
            self.gl.buffer_data_size(target, desc.size as i32, usage);
            buffer
        };
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle.0, buffer);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> GfxResult<()> {
        let native = self
            .buffers
            .get(&buffer.0)
            .copied()
            .ok_or_else(|| GfxError::Backend(format!("unknown buffer {:?}", buffer)))?;
        unsafe {
            // COPY_WRITE_BUFFER leaves vertex and index bindings untouched
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(native));
            self.gl
                .buffer_sub_data_u8_slice(glow::COPY_WRITE_BUFFER, offset as i32, data);
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(native) = self.buffers.remove(&buffer.0) {
            unsafe { self.gl.delete_buffer(native) };
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureHandle> {
        let target = gl_texture_target(desc.kind);
        let (internal, _, _) = gl_surface_format(desc.format);
        let texture = unsafe { self.gl.create_texture() }.map_err(GfxError::Backend)?;
        let (w, h, levels) = (desc.width as i32, desc.height as i32, desc.levels.max(1) as i32);
        let layers = desc.layers as i32;
        self.with_scratch_texture(texture, target, |gl| unsafe {
            match desc.kind {
                TextureKind::Texture2D | TextureKind::TextureCube => {
                    gl.tex_storage_2d(target, levels, internal, w, h)
                }
                TextureKind::Texture2DArray => gl.tex_storage_3d(target, levels, internal, w, h, layers),
            }
        });
        let handle = TextureHandle(self.next());
        self.textures.insert(handle.0, (texture, desc.kind, desc.format));
        Ok(handle)
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        level: u32,
        layer: u32,
        rect: Rect,
        data: &[u8],
    ) -> GfxResult<()> {
        let (native, kind, format) = self
            .textures
            .get(&texture.0)
            .copied()
            .ok_or_else(|| GfxError::Backend(format!("unknown texture {:?}", texture)))?;
        let (_, fmt, ty) = gl_surface_format(format);
        let target = gl_texture_target(kind);
        self.with_scratch_texture(native, target, |gl| unsafe {
            let pixels = glow::PixelUnpackData::Slice(data);
            match kind {
                TextureKind::Texture2D => gl.tex_sub_image_2d(
                    target,
                    level as i32,
                    rect.x,
                    rect.y,
                    rect.width,
                    rect.height,
                    fmt,
                    ty,
                    pixels,
                ),
                TextureKind::TextureCube => gl.tex_sub_image_2d(
                    glow::TEXTURE_CUBE_MAP_POSITIVE_X + layer,
                    level as i32,
                    rect.x,
                    rect.y,
                    rect.width,
                    rect.height,
                    fmt,
                    ty,
                    pixels,
                ),
                TextureKind::Texture2DArray => gl.tex_sub_image_3d(
                    target,
                    level as i32,
                    rect.x,
                    rect.y,
                    layer as i32,
                    rect.width,
                    rect.height,
                    1,
                    fmt,
                    ty,
                    pixels,
                ),
            }
        });
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some((native, _, _)) = self.textures.remove(&texture.0) {
            if self.unit0.is_some_and(|(t, _)| t == native) {
                self.unit0 = None;
            }
            unsafe { self.gl.delete_texture(native) };
        }
    }

    fn create_renderbuffer(&mut self, desc: &RenderbufferDesc) -> GfxResult<RenderbufferHandle> {
        let internal = match desc.format {
            RenderbufferFormat::Color(f) => gl_surface_format(f).0,
            RenderbufferFormat::Depth(d) => gl_depth_format(d),
        };
        let rb = unsafe {
            let rb = self.gl.create_renderbuffer().map_err(GfxError::Backend)?;
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(rb));
            if desc.samples > 0 {
                self.gl.renderbuffer_storage_multisample(
                    glow::RENDERBUFFER,
                    desc.samples as i32,
                    internal,
                    desc.width as i32,
                    desc.height as i32,
                );
            } else {
                self.gl.renderbuffer_storage(
                    glow::RENDERBUFFER,
                    internal,
                    desc.width as i32,
                    desc.height as i32,
                );
            }
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            rb
        };
        let handle = RenderbufferHandle(self.next());
        self.renderbuffers.insert(handle.0, rb);
        Ok(handle)
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if let Some(rb) = self.renderbuffers.remove(&renderbuffer.0) {
            unsafe { self.gl.delete_renderbuffer(rb) };
        }
    }

    fn create_framebuffer(&mut self) -> GfxResult<FramebufferHandle> {
        let fb = unsafe { self.gl.create_framebuffer() }.map_err(GfxError::Backend)?;
        let handle = FramebufferHandle(self.next());
        self.framebuffers.insert(handle.0, fb);
        Ok(handle)
    }

    fn attach(&mut self, fb: FramebufferHandle, point: AttachmentPoint, source: AttachmentSource) {
        if self.edit_framebuffer(fb).is_none() {
            warn!("attach to unknown framebuffer {:?}", fb);
            return;
        }
        let attachment = match point {
            AttachmentPoint::Color(i) => glow::COLOR_ATTACHMENT0 + i,
            AttachmentPoint::Depth => glow::DEPTH_ATTACHMENT,
            AttachmentPoint::Stencil => glow::STENCIL_ATTACHMENT,
            AttachmentPoint::DepthStencil => glow::DEPTH_STENCIL_ATTACHMENT,
        };
        unsafe {
            match source {
                AttachmentSource::Renderbuffer(rb) => {
                    let native = self.renderbuffers.get(&rb.0).copied();
                    self.gl.framebuffer_renderbuffer(
                        glow::FRAMEBUFFER,
                        attachment,
                        glow::RENDERBUFFER,
                        native,
                    );
                }
                AttachmentSource::Texture {
                    texture,
                    kind,
                    level,
                    layer,
                } => {
                    let native = self.textures.get(&texture.0).map(|t| t.0);
                    match kind {
                        TextureKind::Texture2D => self.gl.framebuffer_texture_2d(
                            glow::FRAMEBUFFER,
                            attachment,
                            glow::TEXTURE_2D,
                            native,
                            level as i32,
                        ),
                        TextureKind::TextureCube => self.gl.framebuffer_texture_2d(
                            glow::FRAMEBUFFER,
                            attachment,
                            glow::TEXTURE_CUBE_MAP_POSITIVE_X + layer,
                            native,
                            level as i32,
                        ),
                        TextureKind::Texture2DArray => self.gl.framebuffer_texture_layer(
                            glow::FRAMEBUFFER,
                            attachment,
                            native,
                            level as i32,
                            layer as i32,
                        ),
                    }
                }
            }
        }
        self.restore_framebuffer();
    }

    fn check_framebuffer(&mut self, fb: FramebufferHandle) -> GfxResult<()> {
        if self.edit_framebuffer(fb).is_none() {
            return Err(GfxError::Backend(format!("unknown framebuffer {:?}", fb)));
        }
        let status = unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) };
        self.restore_framebuffer();
        if status != glow::FRAMEBUFFER_COMPLETE {
            return Err(GfxError::Backend(format!(
                "framebuffer {:?} incomplete: status 0x{:x}",
                fb, status
            )));
        }
        Ok(())
    }

    fn destroy_framebuffer(&mut self, fb: FramebufferHandle) {
        if let Some(native) = self.framebuffers.remove(&fb.0) {
            if self.bound_framebuffer == Some(native) {
                self.bound_framebuffer = None;
            }
            unsafe { self.gl.delete_framebuffer(native) };
        }
    }

    fn bind_framebuffer(&mut self, fb: Option<FramebufferHandle>) {
        self.bound_framebuffer = fb.and_then(|h| self.framebuffers.get(&h.0).copied());
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, self.bound_framebuffer) };
    }

    fn bind_read_framebuffer(&mut self, fb: FramebufferHandle) {
        let native = self.framebuffers.get(&fb.0).copied();
        unsafe { self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, native) };
    }

    fn set_draw_buffers(&mut self, count: usize) {
        let buffers: Vec<u32> = (0..count as u32).map(|i| glow::COLOR_ATTACHMENT0 + i).collect();
        unsafe { self.gl.draw_buffers(&buffers) };
    }

    fn blit_framebuffer(&mut self, index: usize, width: u32, height: u32) {
        let attachment = glow::COLOR_ATTACHMENT0 + index as u32;
        let mut draw = vec![glow::NONE; index + 1];
        draw[index] = attachment;
        let (w, h) = (width as i32, height as i32);
        unsafe {
            self.gl.read_buffer(attachment);
            self.gl.draw_buffers(&draw);
            self.gl.blit_framebuffer(
                0,
                0,
                w,
                h,
                0,
                0,
                w,
                h,
                glow::COLOR_BUFFER_BIT,
                glow::NEAREST,
            );
        }
    }

    fn invalidate_read_framebuffer(&mut self, color_count: usize) {
        let mut attachments: Vec<u32> = (0..color_count as u32)
            .map(|i| glow::COLOR_ATTACHMENT0 + i)
            .collect();
        attachments.push(glow::DEPTH_ATTACHMENT);
        attachments.push(glow::STENCIL_ATTACHMENT);
        unsafe {
            self.gl
                .invalidate_framebuffer(glow::READ_FRAMEBUFFER, &attachments)
        };
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle, kind: TextureKind) {
        let Some((native, _, _)) = self.textures.get(&texture.0).copied() else {
            warn!("mipmaps of unknown texture {:?}", texture);
            return;
        };
        let target = gl_texture_target(kind);
        self.with_scratch_texture(native, target, |gl| unsafe { gl.generate_mipmap(target) });
    }

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle, String> {
        let source = std::str::from_utf8(&desc.code).map_err(|e| e.to_string())?;
        let kind = match desc.stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Pixel => glow::FRAGMENT_SHADER,
        };
        let shader = unsafe {
            let shader = self.gl.create_shader(kind)?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(log);
            }
            shader
        };
        let handle = ShaderHandle(self.next());
        self.shaders.insert(handle.0, shader);
        Ok(handle)
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        if let Some(native) = self.shaders.remove(&shader.0) {
            unsafe { self.gl.delete_shader(native) };
        }
    }

    fn link_program(&mut self, vertex: &Shader, pixel: &Shader) -> Result<ProgramHandle, String> {
        let vs = self
            .shaders
            .get(&vertex.handle().0)
            .copied()
            .ok_or_else(|| format!("unknown vertex shader {:?}", vertex.handle()))?;
        let ps = self
            .shaders
            .get(&pixel.handle().0)
            .copied()
            .ok_or_else(|| format!("unknown pixel shader {:?}", pixel.handle()))?;
        let vertex_base = self.pixel_units as i32;
        let program = unsafe {
            let gl = &self.gl;
            let program = gl.create_program()?;
            gl.attach_shader(program, vs);
            gl.attach_shader(program, ps);
            gl.link_program(program);
            gl.detach_shader(program, vs);
            gl.detach_shader(program, ps);
            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(log);
            }
            // sampler uniforms are wired to their texture units once
            gl.use_program(Some(program));
            for s in pixel.samplers() {
                if let Some(loc) = gl.get_uniform_location(program, &s.name) {
                    gl.uniform_1_i32(Some(&loc), s.slot as i32);
                }
            }
            for s in vertex.samplers() {
                if let Some(loc) = gl.get_uniform_location(program, &s.name) {
                    gl.uniform_1_i32(Some(&loc), vertex_base + s.slot as i32);
                }
            }
            program
        };
        let pos_fixup = unsafe { self.gl.get_uniform_location(program, POS_FIXUP_UNIFORM) };
        if pos_fixup.is_none() {
            debug!("program without {} uniform", POS_FIXUP_UNIFORM);
        }
        let handle = ProgramHandle(self.next());
        self.programs.insert(handle.0, GlProgram { program, pos_fixup });
        Ok(handle)
    }

    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<u32> {
        let p = self.programs.get(&program.0)?;
        unsafe { self.gl.get_attrib_location(p.program, name) }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        let native = self.programs.get(&program.0).map(|p| p.program);
        unsafe { self.gl.use_program(native) };
    }

    fn set_position_fixup(&mut self, program: ProgramHandle, fixup: [f32; 4]) {
        if let Some(loc) = self.programs.get(&program.0).and_then(|p| p.pos_fixup.as_ref()) {
            unsafe {
                self.gl
                    .uniform_4_f32(Some(loc), fixup[0], fixup[1], fixup[2], fixup[3])
            };
        }
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if let Some(p) = self.programs.remove(&program.0) {
            unsafe { self.gl.delete_program(p.program) };
        }
    }

    fn set_blend_state(&mut self, state: &BlendState) {
        let desc = state.desc();
        let gl = &self.gl;
        unsafe {
            if desc.independent_blend_enable {
                for i in 0..crate::graphics::state::MAX_BLEND_TARGETS as u32 {
                    let t = desc.target(i as usize);
                    if t.blend_enabled() {
                        gl.enable_draw_buffer(glow::BLEND, i);
                    } else {
                        gl.disable_draw_buffer(glow::BLEND, i);
                    }
                    gl.blend_equation_separate_draw_buffer(
                        i,
                        gl_blend_function(t.color_blend_function),
                        gl_blend_function(t.alpha_blend_function),
                    );
                    gl.blend_func_separate_draw_buffer(
                        i,
                        gl_blend(t.color_source_blend),
                        gl_blend(t.color_destination_blend),
                        gl_blend(t.alpha_source_blend),
                        gl_blend(t.alpha_destination_blend),
                    );
                    let (r, g, b, a) = gl_color_mask(t.color_write_channels);
                    gl.color_mask_draw_buffer(i, r, g, b, a);
                }
            } else {
                let t = desc.target(0);
                if t.blend_enabled() {
                    gl.enable(glow::BLEND);
                } else {
                    gl.disable(glow::BLEND);
                }
                gl.blend_equation_separate(
                    gl_blend_function(t.color_blend_function),
                    gl_blend_function(t.alpha_blend_function),
                );
                gl.blend_func_separate(
                    gl_blend(t.color_source_blend),
                    gl_blend(t.color_destination_blend),
                    gl_blend(t.alpha_source_blend),
                    gl_blend(t.alpha_destination_blend),
                );
                let (r, g, b, a) = gl_color_mask(t.color_write_channels);
                gl.color_mask(r, g, b, a);
            }
        }
    }

    fn set_blend_factor(&mut self, factor: Color) {
        let [r, g, b, a] = factor.to_array();
        unsafe { self.gl.blend_color(r, g, b, a) };
    }

    fn set_depth_stencil_state(&mut self, state: &DepthStencilState) {
        let desc = state.desc();
        let gl = &self.gl;
        unsafe {
            if desc.depth_buffer_enable {
                gl.enable(glow::DEPTH_TEST);
            } else {
                gl.disable(glow::DEPTH_TEST);
            }
            gl.depth_mask(desc.depth_buffer_write_enable);
            gl.depth_func(gl_compare(desc.depth_buffer_function));

            if !desc.stencil_enable {
                gl.disable(glow::STENCIL_TEST);
                return;
            }
            gl.enable(glow::STENCIL_TEST);
            let faces: [(u32, &StencilFace); 2] =
                [(glow::FRONT, &desc.stencil), (glow::BACK, desc.back_face())];
            for (face, s) in faces {
                gl.stencil_func_separate(
                    face,
                    gl_compare(s.function),
                    desc.reference_stencil,
                    desc.stencil_mask,
                );
                gl.stencil_op_separate(
                    face,
                    gl_stencil_op(s.fail),
                    gl_stencil_op(s.depth_buffer_fail),
                    gl_stencil_op(s.pass),
                );
            }
            gl.stencil_mask(desc.stencil_write_mask);
        }
    }

    fn set_rasterizer_state(&mut self, state: &RasterizerState, cull: CullFace, depth_bias_scale: f32) {
        let desc = state.desc();
        let desktop = !self.gl.version().is_embedded;
        let gl = &self.gl;
        unsafe {
            if cull.enabled {
                gl.enable(glow::CULL_FACE);
                gl.cull_face(glow::BACK);
                gl.front_face(match cull.front_face {
                    FrontFace::Cw => glow::CW,
                    FrontFace::Ccw => glow::CCW,
                });
            } else {
                gl.disable(glow::CULL_FACE);
            }
            if desktop {
                let mode = match desc.fill_mode {
                    FillMode::Solid => glow::FILL,
                    FillMode::WireFrame => glow::LINE,
                };
                gl.polygon_mode(glow::FRONT_AND_BACK, mode);
                if desc.multi_sample_anti_alias {
                    gl.enable(glow::MULTISAMPLE);
                } else {
                    gl.disable(glow::MULTISAMPLE);
                }
                if desc.depth_clip_enable {
                    gl.disable(glow::DEPTH_CLAMP);
                } else {
                    gl.enable(glow::DEPTH_CLAMP);
                }
            }
            if desc.depth_bias != 0.0 || desc.slope_scale_depth_bias != 0.0 {
                gl.enable(glow::POLYGON_OFFSET_FILL);
                gl.polygon_offset(desc.slope_scale_depth_bias, desc.depth_bias * depth_bias_scale);
            } else {
                gl.disable(glow::POLYGON_OFFSET_FILL);
            }
        }
    }

    fn set_scissor_test(&mut self, enable: bool) {
        unsafe {
            if enable {
                self.gl.enable(glow::SCISSOR_TEST);
            } else {
                self.gl.disable(glow::SCISSOR_TEST);
            }
        }
    }

    fn set_scissor_rect(&mut self, rect: Rect) {
        unsafe { self.gl.scissor(rect.x, rect.y, rect.width, rect.height) };
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        unsafe {
            self.gl
                .viewport(viewport.x, viewport.y, viewport.width, viewport.height);
            self.gl.depth_range_f32(viewport.min_depth, viewport.max_depth);
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, _size: IndexElementSize) {
        let native = self.buffers.get(&buffer.0).copied();
        unsafe { self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, native) };
    }

    fn bind_vertex_buffer(&mut self, _slot: u32, buffer: BufferHandle) {
        // attribute pointers capture the ARRAY_BUFFER bound when they are set
        let native = self.buffers.get(&buffer.0).copied();
        unsafe { self.gl.bind_buffer(glow::ARRAY_BUFFER, native) };
    }

    fn set_attrib_pointer(&mut self, pointer: &AttribPointer) {
        let ty = match pointer.ty {
            AttribType::F32 => glow::FLOAT,
            AttribType::F16 => glow::HALF_FLOAT,
            AttribType::U8 => glow::UNSIGNED_BYTE,
            AttribType::I16 => glow::SHORT,
        };
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                pointer.location,
                pointer.components as i32,
                ty,
                pointer.normalized,
                pointer.stride as i32,
                pointer.offset() as i32,
            )
        };
    }

    fn set_attrib_divisor(&mut self, location: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(location, divisor) };
    }

    fn enable_attrib(&mut self, location: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(location) };
    }

    fn disable_attrib(&mut self, location: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(location) };
    }

    fn bind_texture(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        texture: Option<(TextureHandle, TextureKind)>,
    ) {
        let unit = self.unit(stage, slot);
        let bound = texture.and_then(|(t, kind)| {
            self.textures
                .get(&t.0)
                .map(|(native, _, _)| (*native, gl_texture_target(kind)))
        });
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            match bound {
                Some((native, target)) => self.gl.bind_texture(target, Some(native)),
                None => self.gl.bind_texture(glow::TEXTURE_2D, None),
            }
        }
        if unit == 0 {
            self.unit0 = bound;
        }
    }

    fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: &SamplerState) {
        let unit = self.unit(stage, slot);
        let native = self.sampler_for(sampler);
        unsafe { self.gl.bind_sampler(unit, native) };
    }

    fn clear(&mut self, options: ClearOptions, color: Color, depth: f32, stencil: i32) {
        let mut mask = 0;
        unsafe {
            if options.contains(ClearOptions::TARGET) {
                let [r, g, b, a] = color.to_array();
                self.gl.clear_color(r, g, b, a);
                mask |= glow::COLOR_BUFFER_BIT;
            }
            if options.contains(ClearOptions::DEPTH_BUFFER) {
                self.gl.clear_depth_f32(depth);
                mask |= glow::DEPTH_BUFFER_BIT;
            }
            if options.contains(ClearOptions::STENCIL) {
                self.gl.clear_stencil(stencil);
                mask |= glow::STENCIL_BUFFER_BIT;
            }
            if mask != 0 {
                self.gl.clear(mask);
            }
        }
    }

    fn draw_arrays(&mut self, primitive: PrimitiveType, first: usize, count: usize) -> GfxResult<()> {
        unsafe {
            self.gl
                .draw_arrays(gl_primitive(primitive), first as i32, count as i32)
        };
        Ok(())
    }

    fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        count: usize,
        size: IndexElementSize,
        start_index: usize,
    ) -> GfxResult<()> {
        unsafe {
            self.gl.draw_elements(
                gl_primitive(primitive),
                count as i32,
                gl_index_type(size),
                (start_index * size.bytes()) as i32,
            )
        };
        Ok(())
    }

    fn draw_elements_instanced(
        &mut self,
        primitive: PrimitiveType,
        count: usize,
        size: IndexElementSize,
        start_index: usize,
        instance_count: usize,
        base_instance: usize,
    ) -> GfxResult<()> {
        if base_instance > 0 {
            return Err(GfxError::unsupported(format!(
                "base instance {} on the gl backend",
                base_instance
            )));
        }
        unsafe {
            self.gl.draw_elements_instanced(
                gl_primitive(primitive),
                count as i32,
                gl_index_type(size),
                (start_index * size.bytes()) as i32,
                instance_count as i32,
            )
        };
        Ok(())
    }

    fn upload_user_vertices(&mut self, data: &[u8]) -> GfxResult<BufferHandle> {
        self.upload_stream(glow::ARRAY_BUFFER, data, false)
    }

    fn upload_user_indices(&mut self, data: &[u8]) -> GfxResult<BufferHandle> {
        self.upload_stream(glow::ELEMENT_ARRAY_BUFFER, data, true)
    }

    fn flush(&mut self) {
        unsafe { self.gl.flush() };
    }

    fn present(&mut self) -> Result<(), PresentError> {
        match self.present.as_mut() {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    fn read_pixels(&mut self, rect: Rect, out: &mut [u8]) -> GfxResult<()> {
        let row = rect.width.max(0) as usize * 4;
        let needed = row * rect.height.max(0) as usize;
        if out.len() < needed {
            return Err(GfxError::out_of_range(
                "out",
                format!("{} bytes needed, {} given", needed, out.len()),
            ));
        }
        let y = self.size.1 as i32 - (rect.y + rect.height);
        unsafe {
            self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
            self.gl.read_pixels(
                rect.x,
                y,
                rect.width,
                rect.height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut out[..needed]),
            );
            self.gl
                .bind_framebuffer(glow::READ_FRAMEBUFFER, self.bound_framebuffer);
        }
        // gl rows come bottom-up
        let rows = rect.height.max(0) as usize;
        for i in 0..rows / 2 {
            let (top, bottom) = out.split_at_mut((rows - 1 - i) * row);
            top[i * row..(i + 1) * row].swap_with_slice(&mut bottom[..row]);
        }
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for GlBackend {
    fn drop(&mut self) {
        unsafe {
            for (_, s) in self.samplers.drain() {
                self.gl.delete_sampler(s);
            }
            if let Some(vao) = self.vao.take() {
                self.gl.delete_vertex_array(vao);
            }
            for (_, b) in self.buffers.drain() {
                self.gl.delete_buffer(b);
            }
            for (_, (t, _, _)) in self.textures.drain() {
                self.gl.delete_texture(t);
            }
            for (_, rb) in self.renderbuffers.drain() {
                self.gl.delete_renderbuffer(rb);
            }
            for (_, fb) in self.framebuffers.drain() {
                self.gl.delete_framebuffer(fb);
            }
            for (_, p) in self.programs.drain() {
                self.gl.delete_program(p.program);
            }
            for (_, sh) in self.shaders.drain() {
                self.gl.delete_shader(sh);
            }
        }
    }
}

fn gl_buffer_target(kind: BufferKind) -> u32 {
    match kind {
        BufferKind::Vertex => glow::ARRAY_BUFFER,
        BufferKind::Index => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn gl_texture_target(kind: TextureKind) -> u32 {
    match kind {
        TextureKind::Texture2D => glow::TEXTURE_2D,
        TextureKind::TextureCube => glow::TEXTURE_CUBE_MAP,
        TextureKind::Texture2DArray => glow::TEXTURE_2D_ARRAY,
    }
}

/// `(internal format, format, type)`, bgra formats are stored as rgba.
fn gl_surface_format(format: SurfaceFormat) -> (u32, u32, u32) {
    match format {
        SurfaceFormat::Color | SurfaceFormat::Bgra32 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        SurfaceFormat::ColorSRgb | SurfaceFormat::Bgra32SRgb => {
            (glow::SRGB8_ALPHA8, glow::RGBA, glow::UNSIGNED_BYTE)
        }
        SurfaceFormat::Bgr565 => (glow::RGB565, glow::RGB, glow::UNSIGNED_SHORT_5_6_5),
        SurfaceFormat::Alpha8 => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        SurfaceFormat::Single => (glow::R32F, glow::RED, glow::FLOAT),
        SurfaceFormat::HalfSingle => (glow::R16F, glow::RED, glow::HALF_FLOAT),
        SurfaceFormat::HalfVector4 => (glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
        SurfaceFormat::Vector4 => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
        SurfaceFormat::Rgba1010102 => (
            glow::RGB10_A2,
            glow::RGBA,
            glow::UNSIGNED_INT_2_10_10_10_REV,
        ),
    }
}

fn gl_depth_format(format: DepthFormat) -> u32 {
    match format {
        DepthFormat::Depth16 => glow::DEPTH_COMPONENT16,
        DepthFormat::Depth24 => glow::DEPTH_COMPONENT24,
        DepthFormat::Depth24Stencil8 | DepthFormat::None => glow::DEPTH24_STENCIL8,
    }
}

fn gl_primitive(p: PrimitiveType) -> u32 {
    match p {
        PrimitiveType::TriangleList => glow::TRIANGLES,
        PrimitiveType::TriangleStrip => glow::TRIANGLE_STRIP,
        PrimitiveType::LineList => glow::LINES,
        PrimitiveType::LineStrip => glow::LINE_STRIP,
        PrimitiveType::PointList => glow::POINTS,
    }
}

fn gl_index_type(size: IndexElementSize) -> u32 {
    match size {
        IndexElementSize::SixteenBits => glow::UNSIGNED_SHORT,
        IndexElementSize::ThirtyTwoBits => glow::UNSIGNED_INT,
    }
}

fn gl_blend(b: Blend) -> u32 {
    match b {
        Blend::One => glow::ONE,
        Blend::Zero => glow::ZERO,
        Blend::SourceColor => glow::SRC_COLOR,
        Blend::InverseSourceColor => glow::ONE_MINUS_SRC_COLOR,
        Blend::SourceAlpha => glow::SRC_ALPHA,
        Blend::InverseSourceAlpha => glow::ONE_MINUS_SRC_ALPHA,
        Blend::DestinationColor => glow::DST_COLOR,
        Blend::InverseDestinationColor => glow::ONE_MINUS_DST_COLOR,
        Blend::DestinationAlpha => glow::DST_ALPHA,
        Blend::InverseDestinationAlpha => glow::ONE_MINUS_DST_ALPHA,
        Blend::BlendFactor => glow::CONSTANT_COLOR,
        Blend::InverseBlendFactor => glow::ONE_MINUS_CONSTANT_COLOR,
        Blend::SourceAlphaSaturation => glow::SRC_ALPHA_SATURATE,
    }
}

fn gl_blend_function(f: BlendFunction) -> u32 {
    match f {
        BlendFunction::Add => glow::FUNC_ADD,
        BlendFunction::Subtract => glow::FUNC_SUBTRACT,
        BlendFunction::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendFunction::Min => glow::MIN,
        BlendFunction::Max => glow::MAX,
    }
}

fn gl_color_mask(c: ColorWriteChannels) -> (bool, bool, bool, bool) {
    (
        c.contains(ColorWriteChannels::RED),
        c.contains(ColorWriteChannels::GREEN),
        c.contains(ColorWriteChannels::BLUE),
        c.contains(ColorWriteChannels::ALPHA),
    )
}

fn gl_compare(f: CompareFunction) -> u32 {
    match f {
        CompareFunction::Always => glow::ALWAYS,
        CompareFunction::Never => glow::NEVER,
        CompareFunction::Less => glow::LESS,
        CompareFunction::LessEqual => glow::LEQUAL,
        CompareFunction::Equal => glow::EQUAL,
        CompareFunction::GreaterEqual => glow::GEQUAL,
        CompareFunction::Greater => glow::GREATER,
        CompareFunction::NotEqual => glow::NOTEQUAL,
    }
}

fn gl_stencil_op(op: StencilOperation) -> u32 {
    match op {
        StencilOperation::Keep => glow::KEEP,
        StencilOperation::Zero => glow::ZERO,
        StencilOperation::Replace => glow::REPLACE,
        StencilOperation::Increment => glow::INCR_WRAP,
        StencilOperation::Decrement => glow::DECR_WRAP,
        StencilOperation::IncrementSaturation => glow::INCR,
        StencilOperation::DecrementSaturation => glow::DECR,
        StencilOperation::Invert => glow::INVERT,
    }
}

fn gl_address(mode: TextureAddressMode, desktop: bool) -> i32 {
    let m = match mode {
        TextureAddressMode::Wrap => glow::REPEAT,
        TextureAddressMode::Clamp => glow::CLAMP_TO_EDGE,
        TextureAddressMode::Mirror => glow::MIRRORED_REPEAT,
        TextureAddressMode::Border if desktop => glow::CLAMP_TO_BORDER,
        TextureAddressMode::Border => glow::CLAMP_TO_EDGE,
    };
    m as i32
}
