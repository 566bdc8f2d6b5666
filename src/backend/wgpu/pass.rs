// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Implicit Render Passes
//!
//! wgpu only draws inside render passes whose attachments and load ops are
//! fixed when the pass begins. The backend collects clears and draws for the
//! bound target and encodes them as one pass when anything that must be
//! ordered after them happens:
//!
//! ```text
//!  clear ─┐                      target change · buffer/texture write
//!  draw  ─┼─► PendingPass ──────►  blit · mip rebuild · read · present
//!  draw  ─┘   (load ops +           │
//!              DrawCommand list)    ▼
//!                              encode_pass + queue.submit
//! ```
//!
//! A clear arriving after draws ends the pass, the next one starts with the
//! clear as its load op.

use std::ops::Range;

/// One single-mip, single-layer view usable as a pass attachment.
#[derive(Clone)]
pub struct AttachmentView {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub samples: u32,
    pub size: (u32, u32),
    pub level: u32,
    pub layer: u32,
}

impl AttachmentView {
    pub fn copy_info(&self) -> wgpu::TexelCopyTextureInfo<'_> {
        wgpu::TexelCopyTextureInfo {
            texture: &self.texture,
            mip_level: self.level,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: self.layer,
            },
            aspect: wgpu::TextureAspect::All,
        }
    }
}

/// Attachment set standing in for a framebuffer object.
pub struct FramebufferRecord {
    pub colors: Vec<Option<AttachmentView>>,
    pub depth_stencil: Option<AttachmentView>,
    pub draw_buffers: usize,
}

impl Default for FramebufferRecord {
    fn default() -> Self {
        Self {
            colors: vec![],
            depth_stencil: None,
            draw_buffers: 1,
        }
    }
}

impl FramebufferRecord {
    pub fn set_color(&mut self, index: usize, view: AttachmentView) {
        if self.colors.len() <= index {
            self.colors.resize(index + 1, None);
        }
        self.colors[index] = Some(view);
    }

    pub fn color(&self, index: usize) -> Option<&AttachmentView> {
        self.colors.get(index).and_then(|c| c.as_ref())
    }

    pub fn target(&self) -> PassTarget {
        PassTarget {
            colors: self
                .colors
                .iter()
                .take(self.draw_buffers)
                .flatten()
                .cloned()
                .collect(),
            depth_stencil: self.depth_stencil.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PassTarget {
    pub colors: Vec<AttachmentView>,
    pub depth_stencil: Option<AttachmentView>,
}

impl PassTarget {
    pub fn color_formats(&self) -> Vec<wgpu::TextureFormat> {
        self.colors.iter().map(|c| c.format).collect()
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_stencil.as_ref().map(|d| d.format)
    }

    pub fn samples(&self) -> u32 {
        self.colors
            .first()
            .or(self.depth_stencil.as_ref())
            .map_or(1, |v| v.samples)
    }

    pub fn size(&self) -> (u32, u32) {
        self.colors
            .first()
            .or(self.depth_stencil.as_ref())
            .map_or((0, 0), |v| v.size)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PendingClear {
    pub color: Option<wgpu::Color>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl PendingClear {
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.depth.is_none() && self.stencil.is_none()
    }
}

pub enum DrawKind {
    Arrays { vertices: Range<u32> },
    Indexed { indices: Range<u32>, instances: Range<u32> },
}

/// Everything a draw needs, captured when it was issued.
pub struct DrawCommand {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_groups: Vec<wgpu::BindGroup>,
    pub vertex_buffers: Vec<(u32, wgpu::Buffer, u64)>,
    pub index_buffer: Option<(wgpu::Buffer, wgpu::IndexFormat)>,
    /// x, y, width, height, min depth, max depth
    pub viewport: [f32; 6],
    pub scissor: Option<[u32; 4]>,
    pub blend_constant: wgpu::Color,
    pub stencil_reference: u32,
    pub kind: DrawKind,
}

#[derive(Default)]
pub struct PendingPass {
    pub clear: PendingClear,
    pub draws: Vec<DrawCommand>,
}

impl PendingPass {
    pub fn is_empty(&self) -> bool {
        self.clear.is_empty() && self.draws.is_empty()
    }

    pub fn take(&mut self) -> PendingPass {
        std::mem::take(self)
    }
}

fn load<T>(clear: Option<T>) -> wgpu::LoadOp<T> {
    match clear {
        Some(v) => wgpu::LoadOp::Clear(v),
        None => wgpu::LoadOp::Load,
    }
}

pub fn encode_pass(encoder: &mut wgpu::CommandEncoder, target: &PassTarget, pass: &PendingPass) {
    let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = target
        .colors
        .iter()
        .map(|c| {
            Some(wgpu::RenderPassColorAttachment {
                view: &c.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: load(pass.clear.color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })
        })
        .collect();
    let depth_stencil_attachment =
        target
            .depth_stencil
            .as_ref()
            .map(|d| wgpu::RenderPassDepthStencilAttachment {
                view: &d.view,
                depth_ops: d.format.has_depth_aspect().then(|| wgpu::Operations {
                    load: load(pass.clear.depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: d.format.has_stencil_aspect().then(|| wgpu::Operations {
                    load: load(pass.clear.stencil),
                    store: wgpu::StoreOp::Store,
                }),
            });

    let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("pixel_gfx pass"),
        color_attachments: &color_attachments,
        depth_stencil_attachment,
        occlusion_query_set: None,
        timestamp_writes: None,
    });

    let (tw, th) = target.size();
    for d in &pass.draws {
        rp.set_pipeline(&d.pipeline);
        for (i, bg) in d.bind_groups.iter().enumerate() {
            rp.set_bind_group(i as u32, bg, &[]);
        }
        for (slot, buffer, offset) in &d.vertex_buffers {
            rp.set_vertex_buffer(*slot, buffer.slice(*offset..));
        }
        if let Some((buffer, format)) = &d.index_buffer {
            rp.set_index_buffer(buffer.slice(..), *format);
        }
        let [x, y, w, h, min, max] = d.viewport;
        rp.set_viewport(x, y, w, h, min, max);
        // scissor is pass state, a prior draw's rect must not leak
        let [x, y, w, h] = d.scissor.unwrap_or([0, 0, tw, th]);
        rp.set_scissor_rect(x, y, w, h);
        rp.set_blend_constant(d.blend_constant);
        rp.set_stencil_reference(d.stencil_reference);
        match &d.kind {
            DrawKind::Arrays { vertices } => rp.draw(vertices.clone(), 0..1),
            DrawKind::Indexed { indices, instances } => {
                rp.draw_indexed(indices.clone(), 0, instances.clone())
            }
        }
    }
}
