// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # WGPU Backend
//!
//! Maps the core's persistent-state calls onto wgpu's immutable pipelines
//! and explicit passes:
//!
//! ```text
//!  set_*_state ──► bound descriptors ─┐
//!  attrib pointers / divisors ────────┼─► PipelineKey ─► RenderPipeline cache
//!  bound target formats ──────────────┘
//!  clear / draw ─► PendingPass ─► one render pass per target run
//! ```
//!
//! Surfaces have a top-left origin, no y flip is needed anywhere. Rendering
//! goes to an owned back buffer texture that present copies to the surface.
//!
//! Shader conventions:
//! - code is WGSL, the entry point comes from the shader description
//! - vertex inputs use `@location(i)` in the order attributes were declared
//! - `@group(0) @binding(0)` is a `vec4<f32>` uniform holding `posFixup`
//! - pixel sampler slot `s` is `@group(1) @binding(2s)` for the texture and
//!   `@binding(2s + 1)` for the sampler, vertex samplers use group 2

mod convert;
mod mipmap;
mod pass;

use self::mipmap::MipmapGenerator;
use self::pass::{
    encode_pass, AttachmentView, DrawCommand, DrawKind, FramebufferRecord, PassTarget, PendingPass,
};
use super::*;
use crate::error::GfxError;
use crate::graphics::state::{
    BlendDesc, DepthStencilDesc, DeviceState, FillMode, FrontFace, RasterizerDesc, StateId,
};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
// the sibling module of the same name comes in through the glob above
use ::wgpu;
use ::wgpu::util::DeviceExt;

const BACK_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct TextureRecord {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    bytes_per_pixel: u32,
    levels: u32,
    layers: u32,
    size: (u32, u32),
}

#[derive(Clone)]
struct ShaderRecord {
    module: wgpu::ShaderModule,
    entry_point: String,
}

struct ProgramRecord {
    vertex: ShaderRecord,
    pixel: ShaderRecord,
    attributes: HashMap<String, u32>,
    pixel_slots: Vec<u32>,
    vertex_slots: Vec<u32>,
    fixup: wgpu::Buffer,
    fixup_value: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VertexLayoutKey {
    slot: u32,
    stride: u64,
    instanced: bool,
    attributes: Vec<(u32, wgpu::VertexFormat, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u32,
    blend: Option<StateId>,
    depth_stencil: Option<StateId>,
    rasterizer: Option<(StateId, CullFace, u32)>,
    layouts: Vec<VertexLayoutKey>,
    topology: wgpu::PrimitiveTopology,
    strip_index: Option<wgpu::IndexFormat>,
    colors: Vec<wgpu::TextureFormat>,
    depth: Option<wgpu::TextureFormat>,
    samples: u32,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<(wgpu::Surface<'static>, wgpu::SurfaceConfiguration)>,
    back_buffer: AttachmentView,
    back_buffer_depth: Option<AttachmentView>,
    depth_format: DepthFormat,
    next_handle: u32,

    buffers: HashMap<u32, wgpu::Buffer>,
    textures: HashMap<u32, TextureRecord>,
    renderbuffers: HashMap<u32, AttachmentView>,
    framebuffers: HashMap<u32, FramebufferRecord>,
    shaders: HashMap<u32, ShaderRecord>,
    programs: HashMap<u32, ProgramRecord>,
    samplers: HashMap<StateId, wgpu::Sampler>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    mipmaps: MipmapGenerator,
    dummy_view: wgpu::TextureView,
    default_sampler: wgpu::Sampler,

    draw_fb: Option<u32>,
    read_fb: Option<u32>,
    program: Option<u32>,
    blend: Option<(StateId, BlendDesc)>,
    blend_constant: wgpu::Color,
    depth_stencil: Option<(StateId, DepthStencilDesc)>,
    rasterizer: Option<(StateId, RasterizerDesc, CullFace, f32)>,
    scissor_test: bool,
    scissor: Rect,
    viewport: Viewport,
    index_buffer: Option<(u32, wgpu::IndexFormat)>,
    vertex_buffers: HashMap<u32, u32>,
    attribs: HashMap<u32, AttribPointer>,
    divisors: HashMap<u32, u32>,
    enabled: HashSet<u32>,
    bound_textures: HashMap<(ShaderStage, u32), u32>,
    bound_samplers: HashMap<(ShaderStage, u32), wgpu::Sampler>,
    user_vertices: Option<BufferHandle>,
    user_indices: Option<BufferHandle>,

    pass: PendingPass,
}

fn attachment(
    device: &wgpu::Device,
    label: &str,
    size: (u32, u32),
    format: wgpu::TextureFormat,
    samples: u32,
    usage: wgpu::TextureUsages,
) -> AttachmentView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size.0.max(1),
            height: size.1.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: samples.max(1),
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    AttachmentView {
        texture,
        view,
        format,
        samples: samples.max(1),
        size,
        level: 0,
        layer: 0,
    }
}

fn back_buffers(
    device: &wgpu::Device,
    size: (u32, u32),
    format: wgpu::TextureFormat,
    depth: DepthFormat,
) -> (AttachmentView, Option<AttachmentView>) {
    let color = attachment(
        device,
        "pixel_gfx back buffer",
        size,
        format,
        1,
        wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
    );
    let depth = depth.has_depth().then(|| {
        attachment(
            device,
            "pixel_gfx back buffer depth",
            size,
            convert::depth_format(depth),
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        )
    });
    (color, depth)
}

fn request_device(adapter: &wgpu::Adapter) -> GfxResult<(wgpu::Device, wgpu::Queue)> {
    info!("wgpu adapter: {:?}", adapter.get_info());
    let optional = wgpu::Features::POLYGON_MODE_LINE
        | wgpu::Features::DEPTH_CLIP_CONTROL
        | wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("pixel_gfx device"),
        required_features: adapter.features() & optional,
        required_limits: wgpu::Limits::default(),
        memory_hints: wgpu::MemoryHints::Performance,
        ..Default::default()
    }))
    .map_err(|e| GfxError::Backend(format!("request device: {}", e)))
}

impl WgpuBackend {
    /// Off-screen backend, present only flushes.
    pub fn headless(width: u32, height: u32, depth: DepthFormat) -> GfxResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| GfxError::Backend(format!("request adapter: {}", e)))?;
        let (device, queue) = request_device(&adapter)?;
        Ok(Self::build(device, queue, None, (width, height), BACK_BUFFER_FORMAT, depth))
    }

    /// Present to `surface`, which is configured here.
    pub fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        depth: DepthFormat,
    ) -> GfxResult<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| GfxError::Backend(format!("request adapter: {}", e)))?;
        let (device, queue) = request_device(&adapter)?;

        let caps = surface.get_capabilities(&adapter);
        if !caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
            return Err(GfxError::Backend(
                "surface textures can't be copied to".to_string(),
            ));
        }
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| GfxError::Backend("surface reports no formats".to_string()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!("wgpu surface {}x{} {:?}", config.width, config.height, config.format);
        Ok(Self::build(
            device,
            queue,
            Some((surface, config)),
            (width, height),
            format,
            depth,
        ))
    }

    fn build(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Option<(wgpu::Surface<'static>, wgpu::SurfaceConfiguration)>,
        size: (u32, u32),
        format: wgpu::TextureFormat,
        depth: DepthFormat,
    ) -> Self {
        device.on_uncaptured_error(Box::new(|e| error!("wgpu: {}", e)));
        let (back_buffer, back_buffer_depth) = back_buffers(&device, size, format, depth);
        let dummy = attachment(
            &device,
            "pixel_gfx unbound texture",
            (1, 1),
            wgpu::TextureFormat::Rgba8Unorm,
            1,
            wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let default_sampler = device.create_sampler(&wgpu::SamplerDescriptor::default());
        let mipmaps = MipmapGenerator::new(&device);
        Self {
            device,
            queue,
            surface,
            back_buffer,
            back_buffer_depth,
            depth_format: depth,
            next_handle: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            samplers: HashMap::new(),
            pipelines: HashMap::new(),
            mipmaps,
            dummy_view: dummy.view,
            default_sampler,
            draw_fb: None,
            read_fb: None,
            program: None,
            blend: None,
            blend_constant: wgpu::Color::WHITE,
            depth_stencil: None,
            rasterizer: None,
            scissor_test: false,
            scissor: Rect::new(0, 0, size.0 as i32, size.1 as i32),
            viewport: Viewport::new(0, 0, size.0 as i32, size.1 as i32),
            index_buffer: None,
            vertex_buffers: HashMap::new(),
            attribs: HashMap::new(),
            divisors: HashMap::new(),
            enabled: HashSet::new(),
            bound_textures: HashMap::new(),
            bound_samplers: HashMap::new(),
            user_vertices: None,
            user_indices: None,
            pass: PendingPass::default(),
        }
    }

    /// Recreate the back buffer, followed by `GraphicsContext::reset`.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.flush_pass();
        let (color, depth) = back_buffers(
            &self.device,
            (width, height),
            self.back_buffer.format,
            self.depth_format,
        );
        self.back_buffer = color;
        self.back_buffer_depth = depth;
        if let Some((surface, config)) = self.surface.as_mut() {
            config.width = width.max(1);
            config.height = height.max(1);
            surface.configure(&self.device, config);
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn next(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    fn current_target(&self) -> PassTarget {
        match self.draw_fb.and_then(|fb| self.framebuffers.get(&fb)) {
            Some(record) => record.target(),
            None => PassTarget {
                colors: vec![self.back_buffer.clone()],
                depth_stencil: self.back_buffer_depth.clone(),
            },
        }
    }

    /// Encode and submit everything recorded for the bound target.
    fn flush_pass(&mut self) {
        if self.pass.is_empty() {
            return;
        }
        let pass = self.pass.take();
        let target = self.current_target();
        if target.colors.is_empty() && target.depth_stencil.is_none() {
            warn!("dropping {} draw(s) without attachments", pass.draws.len());
            return;
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pixel_gfx pass encoder"),
            });
        encode_pass(&mut encoder, &target, &pass);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn submit_with(&mut self, label: &str, f: impl FnOnce(&mut Self, &mut wgpu::CommandEncoder)) {
        self.flush_pass();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        f(self, &mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn sampler_for(&mut self, state: &SamplerState) -> wgpu::Sampler {
        if let Some(s) = self.samplers.get(&state.id()) {
            return s.clone();
        }
        let desc = state.desc();
        let (min, mag, mip) = desc.filter.split();
        let border = self
            .device
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        let anisotropic = matches!(desc.filter, crate::graphics::state::TextureFilter::Anisotropic);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("pixel_gfx sampler"),
            address_mode_u: convert::address_mode(desc.address_u, border),
            address_mode_v: convert::address_mode(desc.address_v, border),
            address_mode_w: convert::address_mode(desc.address_w, border),
            mag_filter: convert::filter(mag),
            min_filter: convert::filter(min),
            mipmap_filter: convert::filter(mip),
            lod_min_clamp: desc.max_mip_level as f32,
            lod_max_clamp: 32.0,
            compare: desc.comparison_function.map(convert::compare),
            anisotropy_clamp: if anisotropic {
                desc.max_anisotropy.clamp(1, 16)
            } else {
                1
            },
            border_color: border.then(|| convert::border_color(desc.border_color)),
        });
        debug!("wgpu sampler for {:?}", state.id());
        self.samplers.insert(state.id(), sampler.clone());
        sampler
    }

    fn vertex_layouts(&self) -> Vec<VertexLayoutKey> {
        let mut by_slot: HashMap<u32, VertexLayoutKey> = HashMap::new();
        for loc in &self.enabled {
            let Some(p) = self.attribs.get(loc) else {
                continue;
            };
            let Some(format) = convert::vertex_format(p.ty, p.components, p.normalized) else {
                warn!(
                    "attribute {} has no wgpu format ({:?} x{})",
                    p.location, p.ty, p.components
                );
                continue;
            };
            let divisor = self.divisors.get(loc).copied().unwrap_or(0);
            if divisor > 1 {
                warn!("attribute divisor {} treated as 1", divisor);
            }
            let layout = by_slot.entry(p.slot).or_insert_with(|| VertexLayoutKey {
                slot: p.slot,
                stride: p.stride as u64,
                instanced: false,
                attributes: vec![],
            });
            layout.instanced |= divisor > 0;
            layout
                .attributes
                .push((p.location, format, p.element_offset as u64));
        }
        let mut layouts: Vec<VertexLayoutKey> = by_slot.into_values().collect();
        layouts.sort_by_key(|l| l.slot);
        for l in &mut layouts {
            l.attributes.sort_by_key(|a| a.0);
        }
        layouts
    }

    fn create_pipeline(&self, key: &PipelineKey, program: &ProgramRecord) -> GfxResult<wgpu::RenderPipeline> {
        let slot_count = key.layouts.last().map_or(0, |l| l.slot as usize + 1);
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = (0..slot_count)
            .map(|slot| {
                key.layouts
                    .iter()
                    .find(|l| l.slot as usize == slot)
                    .map(|l| {
                        l.attributes
                            .iter()
                            .map(|&(shader_location, format, offset)| wgpu::VertexAttribute {
                                format,
                                offset,
                                shader_location,
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = (0..slot_count)
            .map(|slot| {
                let layout = key.layouts.iter().find(|l| l.slot as usize == slot);
                wgpu::VertexBufferLayout {
                    array_stride: layout.map_or(0, |l| l.stride),
                    step_mode: if layout.is_some_and(|l| l.instanced) {
                        wgpu::VertexStepMode::Instance
                    } else {
                        wgpu::VertexStepMode::Vertex
                    },
                    attributes: &attributes[slot],
                }
            })
            .collect();

        let blend = self.blend.map(|(_, d)| d).unwrap_or_default();
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .colors
            .iter()
            .enumerate()
            .map(|(i, &format)| {
                let t = blend.target(i);
                Some(wgpu::ColorTargetState {
                    format,
                    blend: convert::blend_state(t),
                    write_mask: convert::color_writes(t.color_write_channels),
                })
            })
            .collect();

        let (raster, cull, bias_scale) = match self.rasterizer {
            Some((_, desc, cull, scale)) => (desc, cull, scale),
            None => (
                RasterizerDesc::default(),
                CullFace {
                    enabled: false,
                    front_face: FrontFace::Ccw,
                },
                1.0,
            ),
        };
        let features = self.device.features();
        let polygon_mode = match raster.fill_mode {
            FillMode::WireFrame if features.contains(wgpu::Features::POLYGON_MODE_LINE) => {
                wgpu::PolygonMode::Line
            }
            _ => wgpu::PolygonMode::Fill,
        };
        let unclipped_depth =
            !raster.depth_clip_enable && features.contains(wgpu::Features::DEPTH_CLIP_CONTROL);

        let depth_stencil = key.depth.map(|format| {
            let ds = self.depth_stencil.map(|(_, d)| d).unwrap_or_default();
            let stencil = if ds.stencil_enable && format.has_stencil_aspect() {
                wgpu::StencilState {
                    front: convert::stencil_face(&ds.stencil),
                    back: convert::stencil_face(ds.back_face()),
                    read_mask: ds.stencil_mask,
                    write_mask: ds.stencil_write_mask,
                }
            } else {
                wgpu::StencilState::default()
            };
            wgpu::DepthStencilState {
                format,
                depth_write_enabled: ds.depth_buffer_enable && ds.depth_buffer_write_enable,
                depth_compare: if ds.depth_buffer_enable {
                    convert::compare(ds.depth_buffer_function)
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil,
                bias: wgpu::DepthBiasState {
                    constant: (raster.depth_bias * bias_scale) as i32,
                    slope_scale: raster.slope_scale_depth_bias,
                    clamp: 0.0,
                },
            }
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("pixel_gfx pipeline"),
                layout: None,
                cache: None,
                vertex: wgpu::VertexState {
                    module: &program.vertex.module,
                    entry_point: Some(&program.vertex.entry_point),
                    buffers: &buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.pixel.module,
                    entry_point: Some(&program.pixel.entry_point),
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: key.topology,
                    strip_index_format: key.strip_index,
                    front_face: match cull.front_face {
                        FrontFace::Cw => wgpu::FrontFace::Cw,
                        FrontFace::Ccw => wgpu::FrontFace::Ccw,
                    },
                    cull_mode: cull.enabled.then_some(wgpu::Face::Back),
                    unclipped_depth,
                    polygon_mode,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: key.samples,
                    mask: blend.multi_sample_mask as u64,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            });
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            error!("pipeline creation failed: {}", e);
            return Err(GfxError::Backend(format!("pipeline creation failed: {}", e)));
        }
        debug!("pipeline cache miss: {} entries", self.pipelines.len() + 1);
        Ok(pipeline)
    }

    fn bind_groups(&self, pipeline: &wgpu::RenderPipeline, program: &ProgramRecord) -> Vec<wgpu::BindGroup> {
        let group_count = if !program.vertex_slots.is_empty() {
            3
        } else if !program.pixel_slots.is_empty() {
            2
        } else {
            1
        };
        let mut groups = vec![self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pixel_gfx fixup"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: program.fixup.as_entire_binding(),
            }],
        })];
        for (group, stage, slots) in [
            (1, ShaderStage::Pixel, &program.pixel_slots),
            (2, ShaderStage::Vertex, &program.vertex_slots),
        ] {
            if group >= group_count {
                break;
            }
            let views: Vec<&wgpu::TextureView> = slots
                .iter()
                .map(|slot| {
                    self.bound_textures
                        .get(&(stage, *slot))
                        .and_then(|t| self.textures.get(t))
                        .map_or(&self.dummy_view, |t| &t.view)
                })
                .collect();
            let samplers: Vec<&wgpu::Sampler> = slots
                .iter()
                .map(|slot| {
                    self.bound_samplers
                        .get(&(stage, *slot))
                        .unwrap_or(&self.default_sampler)
                })
                .collect();
            let mut entries = Vec::with_capacity(slots.len() * 2);
            for (i, slot) in slots.iter().enumerate() {
                entries.push(wgpu::BindGroupEntry {
                    binding: slot * 2,
                    resource: wgpu::BindingResource::TextureView(views[i]),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: slot * 2 + 1,
                    resource: wgpu::BindingResource::Sampler(samplers[i]),
                });
            }
            groups.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("pixel_gfx textures"),
                layout: &pipeline.get_bind_group_layout(group as u32),
                entries: &entries,
            }));
        }
        groups
    }

    fn record_draw(
        &mut self,
        primitive: PrimitiveType,
        index: Option<IndexElementSize>,
        kind: DrawKind,
    ) -> GfxResult<()> {
        let program_id = self
            .program
            .ok_or_else(|| GfxError::invalid("draw without a program in use"))?;
        let target = self.current_target();
        let layouts = self.vertex_layouts();
        let topology = convert::topology(primitive);
        let key = PipelineKey {
            program: program_id,
            blend: self.blend.map(|(id, _)| id),
            depth_stencil: self.depth_stencil.map(|(id, _)| id),
            rasterizer: self
                .rasterizer
                .map(|(id, _, cull, scale)| (id, cull, scale.to_bits())),
            layouts,
            topology,
            strip_index: match (primitive.is_strip(), index) {
                (true, Some(size)) => Some(convert::index_format(size)),
                _ => None,
            },
            colors: target.color_formats(),
            depth: target.depth_format(),
            samples: target.samples(),
        };

        let program = self
            .programs
            .get(&program_id)
            .ok_or_else(|| GfxError::Backend(format!("unknown program {}", program_id)))?;
        let pipeline = match self.pipelines.get(&key) {
            Some(p) => p.clone(),
            None => {
                let p = self.create_pipeline(&key, program)?;
                self.pipelines.insert(key.clone(), p.clone());
                p
            }
        };
        let program = self
            .programs
            .get(&program_id)
            .ok_or_else(|| GfxError::Backend(format!("unknown program {}", program_id)))?;
        let bind_groups = self.bind_groups(&pipeline, program);

        let vertex_buffers = key
            .layouts
            .iter()
            .filter_map(|l| {
                let buffer = self
                    .vertex_buffers
                    .get(&l.slot)
                    .and_then(|b| self.buffers.get(b))?;
                let base = self
                    .attribs
                    .values()
                    .find(|p| p.slot == l.slot && self.enabled.contains(&p.location))
                    .map_or(0, |p| p.base_offset as u64);
                Some((l.slot, buffer.clone(), base))
            })
            .collect();
        let index_buffer = self
            .index_buffer
            .and_then(|(b, f)| self.buffers.get(&b).map(|buf| (buf.clone(), f)));

        let (tw, th) = target.size();
        let v = self.viewport.bounds().clip(tw, th);
        let scissor = self.scissor_test.then(|| {
            let s = self.scissor.clip(tw, th);
            [s.x as u32, s.y as u32, s.width as u32, s.height as u32]
        });
        let stencil_reference = self
            .depth_stencil
            .map_or(0, |(_, d)| d.reference_stencil.max(0) as u32);

        self.pass.draws.push(DrawCommand {
            pipeline,
            bind_groups,
            vertex_buffers,
            index_buffer,
            viewport: [
                v.x as f32,
                v.y as f32,
                v.width.max(1) as f32,
                v.height.max(1) as f32,
                self.viewport.min_depth,
                self.viewport.max_depth,
            ],
            scissor,
            blend_constant: self.blend_constant,
            stencil_reference,
            kind,
        });
        Ok(())
    }

    fn upload_transient(&mut self, data: &[u8], index: bool) -> GfxResult<BufferHandle> {
        let usage = if index {
            wgpu::BufferUsages::INDEX
        } else {
            wgpu::BufferUsages::VERTEX
        };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("pixel_gfx user primitives"),
            contents: &padded(data),
            usage,
        });
        let existing = if index {
            self.user_indices
        } else {
            self.user_vertices
        };
        let handle = match existing {
            Some(h) => h,
            None => BufferHandle(self.next()),
        };
        if index {
            self.user_indices = Some(handle);
        } else {
            self.user_vertices = Some(handle);
        }
        // draws already recorded keep their own clone of the old buffer
        self.buffers.insert(handle.0, buffer);
        Ok(handle)
    }
}

/// Draw ranges are `u32` in wgpu.
fn u32_arg(value: usize) -> GfxResult<u32> {
    u32::try_from(value)
        .map_err(|_| GfxError::out_of_range("draw range", format!("{} exceeds u32", value)))
}

/// Round `data` up to the 4 byte copy alignment.
fn padded(data: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    if data.len() % align == 0 {
        return data.into();
    }
    let mut v = data.to_vec();
    v.resize(data.len().div_ceil(align) * align, 0);
    v.into()
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn convention(&self) -> CoordinateConvention {
        CoordinateConvention::TopLeft
    }

    fn query_capabilities(&mut self) -> Capabilities {
        let limits = self.device.limits();
        let features = self.device.features();
        let texture_slots = limits
            .max_sampled_textures_per_shader_stage
            .min(limits.max_samplers_per_shader_stage) as usize;
        Capabilities {
            supports_instancing: true,
            supports_base_index_instancing: true,
            supports_separate_blend_states: true,
            supports_blit_framebuffer: true,
            supports_invalidate_framebuffer: false,
            supports_depth_clamp: features.contains(wgpu::Features::DEPTH_CLIP_CONTROL),
            supports_framebuffer_object: true,
            supports_srgb: true,
            max_vertex_buffer_slots: limits.max_vertex_buffers as usize,
            max_render_targets: limits.max_color_attachments as usize,
            max_texture_slots: texture_slots,
            max_vertex_texture_slots: texture_slots,
            max_vertex_attributes: limits.max_vertex_attributes as usize,
            // 4 is the only count every format guarantees
            max_multisample_count: 4,
        }
    }

    fn back_buffer_size(&self) -> (u32, u32) {
        self.back_buffer.size
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> GfxResult<BufferHandle> {
        let usage = match desc.kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;
        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        let size = (desc.size as u64).div_ceil(align) * align;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixel_gfx buffer"),
            size,
            usage,
            mapped_at_creation: false,
        });
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle.0, buffer);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> GfxResult<()> {
        if offset as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GfxError::Backend(format!(
                "buffer offset {} is not 4 byte aligned",
                offset
            )));
        }
        self.flush_pass();
        let native = self
            .buffers
            .get(&buffer.0)
            .ok_or_else(|| GfxError::Backend(format!("unknown buffer {:?}", buffer)))?;
        // bytes past an unaligned tail up to the next 4 byte boundary are zeroed
        self.queue.write_buffer(native, offset as u64, &padded(data));
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureHandle> {
        let format = convert::texture_format(desc.format)
            .ok_or_else(|| GfxError::unsupported(format!("{:?} textures", desc.format)))?;
        let allowed = format
            .guaranteed_format_features(self.device.features())
            .allowed_usages;
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if (desc.render_target || desc.levels > 1)
            && allowed.contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let layers = desc.layers.max(1);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("pixel_gfx texture"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: layers,
            },
            mip_level_count: desc.levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let dimension = match desc.kind {
            TextureKind::Texture2D => wgpu::TextureViewDimension::D2,
            TextureKind::TextureCube => wgpu::TextureViewDimension::Cube,
            TextureKind::Texture2DArray => wgpu::TextureViewDimension::D2Array,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        });
        let handle = TextureHandle(self.next());
        self.textures.insert(
            handle.0,
            TextureRecord {
                texture,
                view,
                format,
                bytes_per_pixel: desc.format.bytes_per_pixel() as u32,
                levels: desc.levels.max(1),
                layers,
                size: (desc.width, desc.height),
            },
        );
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
        self.flush_pass();
        let t = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| GfxError::Backend(format!("unknown texture {:?}", texture)))?;
        let (w, h) = (rect.width.max(0) as u32, rect.height.max(0) as u32);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &t.texture,
                mip_level: level,
                origin: wgpu::Origin3d {
                    x: rect.x as u32,
                    y: rect.y as u32,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(w * t.bytes_per_pixel),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.bound_textures.retain(|_, t| *t != texture.0);
    }

    fn create_renderbuffer(&mut self, desc: &RenderbufferDesc) -> GfxResult<RenderbufferHandle> {
        let format = match desc.format {
            RenderbufferFormat::Color(f) => convert::texture_format(f)
                .ok_or_else(|| GfxError::unsupported(format!("{:?} renderbuffers", f)))?,
            RenderbufferFormat::Depth(d) => convert::depth_format(d),
        };
        let samples = desc.samples.max(1);
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if samples == 1 {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        let view = attachment(
            &self.device,
            "pixel_gfx renderbuffer",
            (desc.width, desc.height),
            format,
            samples,
            usage,
        );
        let handle = RenderbufferHandle(self.next());
        self.renderbuffers.insert(handle.0, view);
        Ok(handle)
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.renderbuffers.remove(&renderbuffer.0);
    }

    fn create_framebuffer(&mut self) -> GfxResult<FramebufferHandle> {
        let handle = FramebufferHandle(self.next());
        self.framebuffers.insert(handle.0, FramebufferRecord::default());
        Ok(handle)
    }

    fn attach(&mut self, fb: FramebufferHandle, point: AttachmentPoint, source: AttachmentSource) {
        let view = match source {
            AttachmentSource::Renderbuffer(rb) => self.renderbuffers.get(&rb.0).cloned(),
            AttachmentSource::Texture {
                texture,
                level,
                layer,
                ..
            } => self.textures.get(&texture.0).map(|t| AttachmentView {
                texture: t.texture.clone(),
                view: t.texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("pixel_gfx attachment"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                }),
                format: t.format,
                samples: 1,
                size: ((t.size.0 >> level).max(1), (t.size.1 >> level).max(1)),
                level,
                layer,
            }),
        };
        let Some(view) = view else {
            warn!("attach of unknown source {:?}", source);
            return;
        };
        let Some(record) = self.framebuffers.get_mut(&fb.0) else {
            warn!("attach to unknown framebuffer {:?}", fb);
            return;
        };
        match point {
            AttachmentPoint::Color(i) => record.set_color(i as usize, view),
            AttachmentPoint::Depth | AttachmentPoint::Stencil | AttachmentPoint::DepthStencil => {
                record.depth_stencil = Some(view)
            }
        }
    }

    fn check_framebuffer(&mut self, fb: FramebufferHandle) -> GfxResult<()> {
        let record = self
            .framebuffers
            .get(&fb.0)
            .ok_or_else(|| GfxError::Backend(format!("unknown framebuffer {:?}", fb)))?;
        let mut views = record.colors.iter().flatten().chain(record.depth_stencil.iter());
        let Some(first) = views.next() else {
            return Err(GfxError::Backend(format!("framebuffer {:?} has no attachments", fb)));
        };
        if let Some(bad) = views.find(|v| v.size != first.size || v.samples != first.samples) {
            return Err(GfxError::Backend(format!(
                "framebuffer {:?} mixes {:?}x{} and {:?}x{} attachments",
                fb, first.size, first.samples, bad.size, bad.samples
            )));
        }
        Ok(())
    }

    fn destroy_framebuffer(&mut self, fb: FramebufferHandle) {
        if self.draw_fb == Some(fb.0) {
            self.flush_pass();
            self.draw_fb = None;
        }
        if self.read_fb == Some(fb.0) {
            self.read_fb = None;
        }
        self.framebuffers.remove(&fb.0);
    }

    fn bind_framebuffer(&mut self, fb: Option<FramebufferHandle>) {
        let next = fb.map(|h| h.0);
        if next != self.draw_fb {
            self.flush_pass();
            self.draw_fb = next;
        }
    }

    fn bind_read_framebuffer(&mut self, fb: FramebufferHandle) {
        self.read_fb = Some(fb.0);
    }

    fn set_draw_buffers(&mut self, count: usize) {
        self.flush_pass();
        if let Some(record) = self.draw_fb.and_then(|fb| self.framebuffers.get_mut(&fb)) {
            record.draw_buffers = count.max(1);
        }
    }

    fn blit_framebuffer(&mut self, index: usize, width: u32, height: u32) {
        let src = self
            .read_fb
            .and_then(|fb| self.framebuffers.get(&fb))
            .and_then(|r| r.color(index))
            .cloned();
        let dst = match self.draw_fb {
            Some(fb) => self.framebuffers.get(&fb).and_then(|r| r.color(index)).cloned(),
            None => Some(self.back_buffer.clone()),
        };
        let (Some(src), Some(dst)) = (src, dst) else {
            warn!("blit of missing color attachment {}", index);
            return;
        };
        self.submit_with("pixel_gfx blit", |_, encoder| {
            if src.samples > 1 {
                // resolve at the end of an empty pass
                let _rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("pixel_gfx resolve"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &src.view,
                        resolve_target: Some(&dst.view),
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
            } else {
                encoder.copy_texture_to_texture(
                    src.copy_info(),
                    dst.copy_info(),
                    wgpu::Extent3d {
                        width: width.min(src.size.0).min(dst.size.0),
                        height: height.min(src.size.1).min(dst.size.1),
                        depth_or_array_layers: 1,
                    },
                );
            }
        });
    }

    fn invalidate_read_framebuffer(&mut self, _color_count: usize) {
        // never called, capabilities report no invalidate support
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle, _kind: TextureKind) {
        let Some(t) = self.textures.get(&texture.0) else {
            warn!("mipmaps of unknown texture {:?}", texture);
            return;
        };
        let (tex, format, levels, layers) = (t.texture.clone(), t.format, t.levels, t.layers);
        self.submit_with("pixel_gfx mipmaps", |this, encoder| {
            this.mipmaps
                .generate(&this.device, encoder, &tex, format, levels, layers);
        });
    }

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle, String> {
        let source = std::str::from_utf8(&desc.code).map_err(|e| e.to_string())?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.entry_point),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(e.to_string());
        }
        let handle = ShaderHandle(self.next());
        self.shaders.insert(
            handle.0,
            ShaderRecord {
                module,
                entry_point: desc.entry_point.clone(),
            },
        );
        Ok(handle)
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader.0);
    }

    fn link_program(&mut self, vertex: &Shader, pixel: &Shader) -> Result<ProgramHandle, String> {
        let vs = self
            .shaders
            .get(&vertex.handle().0)
            .cloned()
            .ok_or_else(|| format!("unknown vertex shader {:?}", vertex.handle()))?;
        let ps = self
            .shaders
            .get(&pixel.handle().0)
            .cloned()
            .ok_or_else(|| format!("unknown pixel shader {:?}", pixel.handle()))?;
        let attributes = vertex
            .attributes()
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i as u32))
            .collect();
        let slots = |s: &Shader| {
            let mut v: Vec<u32> = s.samplers().iter().map(|s| s.slot).collect();
            v.sort_unstable();
            v.dedup();
            v
        };
        let fixup_value = [1.0, 1.0, 0.0, 0.0];
        let fixup = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("pixel_gfx posFixup"),
            contents: bytemuck::cast_slice(&fixup_value),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let handle = ProgramHandle(self.next());
        self.programs.insert(
            handle.0,
            ProgramRecord {
                vertex: vs,
                pixel: ps,
                attributes,
                pixel_slots: slots(pixel),
                vertex_slots: slots(vertex),
                fixup,
                fixup_value,
            },
        );
        Ok(handle)
    }

    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs.get(&program.0)?.attributes.get(name).copied()
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.program = Some(program.0);
    }

    fn set_position_fixup(&mut self, program: ProgramHandle, fixup: [f32; 4]) {
        let changed = self
            .programs
            .get(&program.0)
            .is_some_and(|p| p.fixup_value != fixup);
        if !changed {
            return;
        }
        // recorded draws must keep reading the old value
        self.flush_pass();
        if let Some(p) = self.programs.get_mut(&program.0) {
            p.fixup_value = fixup;
            self.queue
                .write_buffer(&p.fixup, 0, bytemuck::cast_slice(&fixup));
        }
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        self.pipelines.retain(|k, _| k.program != program.0);
        if self.program == Some(program.0) {
            self.program = None;
        }
    }

    fn set_blend_state(&mut self, state: &BlendState) {
        self.blend = Some((state.id(), *state.desc()));
    }

    fn set_blend_factor(&mut self, factor: Color) {
        self.blend_constant = convert::color(factor);
    }

    fn set_depth_stencil_state(&mut self, state: &DepthStencilState) {
        self.depth_stencil = Some((state.id(), *state.desc()));
    }

    fn set_rasterizer_state(&mut self, state: &RasterizerState, cull: CullFace, depth_bias_scale: f32) {
        self.rasterizer = Some((state.id(), *state.desc(), cull, depth_bias_scale));
    }

    fn set_scissor_test(&mut self, enable: bool) {
        self.scissor_test = enable;
    }

    fn set_scissor_rect(&mut self, rect: Rect) {
        self.scissor = rect;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, size: IndexElementSize) {
        self.index_buffer = Some((buffer.0, convert::index_format(size)));
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.vertex_buffers.insert(slot, buffer.0);
    }

    fn set_attrib_pointer(&mut self, pointer: &AttribPointer) {
        self.attribs.insert(pointer.location, *pointer);
    }

    fn set_attrib_divisor(&mut self, location: u32, divisor: u32) {
        self.divisors.insert(location, divisor);
    }

    fn enable_attrib(&mut self, location: u32) {
        self.enabled.insert(location);
    }

    fn disable_attrib(&mut self, location: u32) {
        self.enabled.remove(&location);
    }

    fn bind_texture(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        texture: Option<(TextureHandle, TextureKind)>,
    ) {
        match texture {
            Some((t, _)) => {
                self.bound_textures.insert((stage, slot), t.0);
            }
            None => {
                self.bound_textures.remove(&(stage, slot));
            }
        }
    }

    fn bind_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: &SamplerState) {
        let s = self.sampler_for(sampler);
        self.bound_samplers.insert((stage, slot), s);
    }

    fn clear(&mut self, options: ClearOptions, color: Color, depth: f32, stencil: i32) {
        if !self.pass.draws.is_empty() {
            self.flush_pass();
        }
        let clear = &mut self.pass.clear;
        if options.contains(ClearOptions::TARGET) {
            clear.color = Some(convert::color(color));
        }
        if options.contains(ClearOptions::DEPTH_BUFFER) {
            clear.depth = Some(depth);
        }
        if options.contains(ClearOptions::STENCIL) {
            clear.stencil = Some(stencil.max(0) as u32);
        }
    }

    fn draw_arrays(&mut self, primitive: PrimitiveType, first: usize, count: usize) -> GfxResult<()> {
        let (first, count) = (u32_arg(first)?, u32_arg(count)?);
        self.record_draw(
            primitive,
            None,
            DrawKind::Arrays {
                vertices: first..first.saturating_add(count),
            },
        )
    }

    fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        count: usize,
        size: IndexElementSize,
        start_index: usize,
    ) -> GfxResult<()> {
        let (start, count) = (u32_arg(start_index)?, u32_arg(count)?);
        self.record_draw(
            primitive,
            Some(size),
            DrawKind::Indexed {
                indices: start..start.saturating_add(count),
                instances: 0..1,
            },
        )
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
        let (start, count) = (u32_arg(start_index)?, u32_arg(count)?);
        let (base, instances) = (u32_arg(base_instance)?, u32_arg(instance_count)?);
        self.record_draw(
            primitive,
            Some(size),
            DrawKind::Indexed {
                indices: start..start.saturating_add(count),
                instances: base..base.saturating_add(instances),
            },
        )
    }

    fn upload_user_vertices(&mut self, data: &[u8]) -> GfxResult<BufferHandle> {
        self.upload_transient(data, false)
    }

    fn upload_user_indices(&mut self, data: &[u8]) -> GfxResult<BufferHandle> {
        self.upload_transient(data, true)
    }

    fn flush(&mut self) {
        self.flush_pass();
    }

    fn present(&mut self) -> Result<(), PresentError> {
        self.flush_pass();
        let Some((surface, config)) = self.surface.as_ref() else {
            return Ok(());
        };
        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout, frame skipped");
                return Ok(());
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                surface.configure(&self.device, config);
                return Err(PresentError::DeviceLost);
            }
            Err(e) => return Err(PresentError::Fatal(e.to_string())),
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pixel_gfx present"),
            });
        let (w, h) = self.back_buffer.size;
        encoder.copy_texture_to_texture(
            self.back_buffer.copy_info(),
            frame.texture.as_image_copy(),
            wgpu::Extent3d {
                width: w.min(frame.texture.width()),
                height: h.min(frame.texture.height()),
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn read_pixels(&mut self, rect: Rect, out: &mut [u8]) -> GfxResult<()> {
        let (w, h) = (rect.width.max(0) as u32, rect.height.max(0) as u32);
        let row = w as usize * 4;
        let needed = row * h as usize;
        if out.len() < needed {
            return Err(GfxError::out_of_range(
                "out",
                format!("{} bytes needed, {} given", needed, out.len()),
            ));
        }
        if needed == 0 {
            return Ok(());
        }
        let padded_row = (row as u32).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixel_gfx readback"),
            size: padded_row as u64 * h as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let origin = wgpu::Origin3d {
            x: rect.x.max(0) as u32,
            y: rect.y.max(0) as u32,
            z: 0,
        };
        self.submit_with("pixel_gfx readback", |this, encoder| {
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &this.back_buffer.texture,
                    mip_level: 0,
                    origin,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(h),
                    },
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
        });

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| GfxError::Backend(format!("readback poll: {}", e)))?;
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(GfxError::Backend(format!("readback map: {}", e))),
            Err(e) => return Err(GfxError::Backend(format!("readback map: {}", e))),
        }
        {
            let data = slice.get_mapped_range();
            for y in 0..h as usize {
                let src = y * padded_row as usize;
                out[y * row..(y + 1) * row].copy_from_slice(&data[src..src + row]);
            }
        }
        staging.unmap();
        if matches!(
            self.back_buffer.format,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
        ) {
            for px in out[..needed].chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_to_copy_alignment() {
        assert_eq!(padded(&[1, 2, 3, 4]).len(), 4);
        let p = padded(&[1, 2, 3, 4, 5]);
        assert_eq!(p.len() as u64, 2 * wgpu::COPY_BUFFER_ALIGNMENT);
        assert_eq!(&p[4..], &[5, 0, 0, 0]);
    }

    #[test]
    fn test_draw_ranges_fit_u32() {
        assert_eq!(u32_arg(7).unwrap(), 7);
        assert!(matches!(
            u32_arg(u32::MAX as usize + 1),
            Err(GfxError::ArgumentOutOfRange { .. })
        ));
        assert_eq!(BACK_BUFFER_FORMAT, wgpu::TextureFormat::Rgba8Unorm);
    }
}
