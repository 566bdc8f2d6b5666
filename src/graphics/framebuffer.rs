// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Framebuffer Cache
//!
//! Two independent maps from [`BindingKey`] to a backend framebuffer:
//!
//! ```text
//!   draw    : key ──► fb with color i = msaa renderbuffer | texture slice,
//!                      depth/stencil from the slot 0 target
//!   resolve : key ──► fb with color i = texture slice (single sampled)
//! ```
//!
//! Entries are created on the first bind of a binding set and stay until the
//! context is reset or dropped, or until one of the targets they reference
//! is destroyed.

use crate::backend::{AttachmentPoint, AttachmentSource, FramebufferHandle, GraphicsBackend};
use crate::error::GfxResult;
use crate::graphics::capabilities::Capabilities;
use crate::graphics::render_target::{BindingKey, RenderTargetBinding};
use crate::graphics::resource::{RenderTarget, ResourceId};
use crate::graphics::types::RenderTargetUsage;
use log::debug;
use std::collections::HashMap;

#[derive(Default)]
pub struct FramebufferCache {
    draw: HashMap<BindingKey, FramebufferHandle>,
    resolve: HashMap<BindingKey, FramebufferHandle>,
}

fn texture_source(binding: &RenderTargetBinding) -> AttachmentSource {
    let tex = binding.target.texture();
    AttachmentSource::Texture {
        texture: tex.handle(),
        kind: tex.kind(),
        level: 0,
        layer: binding.array_slice,
    }
}

fn attach_depth_stencil(backend: &mut dyn GraphicsBackend, fb: FramebufferHandle, rt: &RenderTarget) {
    match (rt.depth_buffer(), rt.stencil_buffer()) {
        (Some(d), Some(s)) if d == s => {
            backend.attach(fb, AttachmentPoint::DepthStencil, AttachmentSource::Renderbuffer(d))
        }
        (depth, stencil) => {
            if let Some(d) = depth {
                backend.attach(fb, AttachmentPoint::Depth, AttachmentSource::Renderbuffer(d));
            }
            if let Some(s) = stencil {
                backend.attach(fb, AttachmentPoint::Stencil, AttachmentSource::Renderbuffer(s));
            }
        }
    }
}

impl FramebufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Framebuffer drawn to while `bindings` is the current target set.
    pub fn draw_framebuffer(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        bindings: &[RenderTargetBinding],
    ) -> GfxResult<FramebufferHandle> {
        let key = BindingKey::new(bindings);
        if let Some(fb) = self.draw.get(&key) {
            return Ok(*fb);
        }
        let fb = backend.create_framebuffer()?;
        if let Some(first) = bindings.first() {
            attach_depth_stencil(backend, fb, &first.target);
        }
        for (i, b) in bindings.iter().enumerate() {
            let source = match b.target.color_buffer() {
                Some(rb) => AttachmentSource::Renderbuffer(rb),
                None => texture_source(b),
            };
            backend.attach(fb, AttachmentPoint::Color(i as u32), source);
        }
        if let Err(e) = backend.check_framebuffer(fb) {
            backend.destroy_framebuffer(fb);
            return Err(e);
        }
        debug!("draw framebuffer cache miss {:?} -> {:?}", key.entries(), fb);
        self.draw.insert(key, fb);
        Ok(fb)
    }

    /// Single sampled framebuffer multisampled targets are blitted into.
    pub fn resolve_framebuffer(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        bindings: &[RenderTargetBinding],
    ) -> GfxResult<FramebufferHandle> {
        let key = BindingKey::new(bindings);
        if let Some(fb) = self.resolve.get(&key) {
            return Ok(*fb);
        }
        let fb = backend.create_framebuffer()?;
        for (i, b) in bindings.iter().enumerate() {
            backend.attach(fb, AttachmentPoint::Color(i as u32), texture_source(b));
        }
        if let Err(e) = backend.check_framebuffer(fb) {
            backend.destroy_framebuffer(fb);
            return Err(e);
        }
        debug!("resolve framebuffer cache miss {:?} -> {:?}", key.entries(), fb);
        self.resolve.insert(key, fb);
        Ok(fb)
    }

    /// Finish the outgoing target set: blit multisampled contents into the
    /// readable textures, then rebuild mip chains.
    ///
    /// Scissoring affects blits, so a scissor test left enabled by the last
    /// applied rasterizer state is switched off around them.
    pub fn resolve_targets(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        caps: &Capabilities,
        bindings: &[RenderTargetBinding],
        applied_scissor_test: bool,
    ) -> GfxResult<()> {
        let Some(first) = bindings.first() else {
            return Ok(());
        };

        if first.target.multisample_count() > 0 && caps.supports_blit_framebuffer {
            let resolve_fb = self.resolve_framebuffer(backend, bindings)?;
            let msaa_fb = self.draw_framebuffer(backend, bindings)?;
            backend.bind_framebuffer(Some(resolve_fb));
            if applied_scissor_test {
                backend.set_scissor_test(false);
            }
            backend.bind_read_framebuffer(msaa_fb);
            for (i, b) in bindings.iter().enumerate() {
                backend.blit_framebuffer(i, b.target.width(), b.target.height());
            }
            if first.target.usage() == RenderTargetUsage::DiscardContents
                && caps.supports_invalidate_framebuffer
            {
                backend.invalidate_read_framebuffer(bindings.len());
            }
            if applied_scissor_test {
                backend.set_scissor_test(true);
            }
            debug!("resolved {} msaa target(s) via {:?}", bindings.len(), resolve_fb);
        }

        for b in bindings {
            let tex = b.target.texture();
            if tex.level_count() > 1 {
                backend.generate_mipmaps(tex.handle(), tex.kind());
                debug!("regenerated {} mip levels of {:?}", tex.level_count(), tex.id());
            }
        }
        Ok(())
    }

    /// Destroy every framebuffer referencing `target`.
    pub fn purge(&mut self, backend: &mut dyn GraphicsBackend, target: ResourceId) -> usize {
        let mut purged = 0;
        for map in [&mut self.draw, &mut self.resolve] {
            map.retain(|key, fb| {
                let keep = !key.references(target);
                if !keep {
                    backend.destroy_framebuffer(*fb);
                    purged += 1;
                }
                keep
            });
        }
        purged
    }

    pub fn clear(&mut self, backend: &mut dyn GraphicsBackend) {
        for (_, fb) in self.draw.drain().chain(self.resolve.drain()) {
            backend.destroy_framebuffer(fb);
        }
    }

    pub fn draw_len(&self) -> usize {
        self.draw.len()
    }

    pub fn resolve_len(&self) -> usize {
        self.resolve.len()
    }

    pub fn contains_draw(&self, bindings: &[RenderTargetBinding]) -> bool {
        self.draw.contains_key(&BindingKey::new(bindings))
    }
}
