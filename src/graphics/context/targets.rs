// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Render target transitions.
//!
//! ```text
//!  set_render_targets(new)
//!     │ equal to current? ── yes ──► nothing
//!     ▼
//!  resolve outgoing: msaa blit into textures, mip regeneration
//!     ▼
//!  bind draw framebuffer of `new` (cached per binding key) or back buffer
//!     ▼
//!  rasterizer + textures dirty, viewport/scissor = surface size
//!     ▼
//!  DiscardContents? ──► clear to the discard color
//! ```

use super::{DirtyFlags, GraphicsContext};
use crate::error::{GfxError, GfxResult};
use crate::graphics::capabilities::GraphicsProfile;
use crate::graphics::render_target::RenderTargetBinding;
use crate::graphics::resource::RenderTarget;
use crate::graphics::types::{Color, Rect, RenderTargetUsage, Viewport};
use log::{debug, warn};
use std::sync::Arc;

impl GraphicsContext {
    /// Bind a single target, `None` returns to the back buffer.
    pub fn set_render_target(&mut self, target: Option<&Arc<RenderTarget>>) -> GfxResult<()> {
        match target {
            Some(t) => self.set_render_targets(&[RenderTargetBinding::new(t.clone())]),
            None => self.set_render_targets(&[]),
        }
    }

    /// Bind one cube face or array slice of `target`.
    pub fn set_render_target_slice(&mut self, target: &Arc<RenderTarget>, slice: u32) -> GfxResult<()> {
        self.set_render_targets(&[RenderTargetBinding::with_slice(target.clone(), slice)])
    }

    pub fn set_render_targets(&mut self, bindings: &[RenderTargetBinding]) -> GfxResult<()> {
        if bindings.len() > self.caps.max_render_targets {
            return Err(GfxError::out_of_range(
                "render_targets",
                format!(
                    "{} targets bound, {} supported",
                    bindings.len(),
                    self.caps.max_render_targets
                ),
            ));
        }
        if bindings.len() > 1 && self.params.profile == GraphicsProfile::Reach {
            return Err(GfxError::unsupported(
                "multiple render targets are not supported by the Reach profile",
            ));
        }
        for b in bindings {
            if b.target.is_disposed() {
                return Err(GfxError::invalid(format!(
                    "render target {:?} is disposed",
                    b.target.id()
                )));
            }
            if b.array_slice >= b.target.texture().layers() {
                return Err(GfxError::out_of_range(
                    "array_slice",
                    format!(
                        "slice {} of a target with {} layers",
                        b.array_slice,
                        b.target.texture().layers()
                    ),
                ));
            }
        }

        if bindings.len() == self.render_targets.len()
            && bindings.iter().zip(self.render_targets.iter()).all(|(a, b)| a == b)
        {
            return Ok(());
        }

        self.apply_render_targets(bindings)?;
        self.metrics.target_count += bindings.len().max(1) as u64;
        Ok(())
    }

    pub(crate) fn apply_render_targets(&mut self, bindings: &[RenderTargetBinding]) -> GfxResult<()> {
        self.ensure_not_lost()?;
        if !self.render_targets.is_empty() {
            self.framebuffers.resolve_targets(
                self.backend.as_mut(),
                &self.caps,
                &self.render_targets,
                self.applied_scissor_test == Some(true),
            )?;
        }

        let (width, height, usage) = match bindings.first() {
            None => {
                self.render_targets.clear();
                self.backend.bind_framebuffer(None);
                (
                    self.params.back_buffer_width,
                    self.params.back_buffer_height,
                    self.params.render_target_usage,
                )
            }
            Some(first) => {
                let fb = match self.framebuffers.draw_framebuffer(self.backend.as_mut(), bindings) {
                    Ok(fb) => fb,
                    Err(e) => {
                        warn!("render target framebuffer unusable, back to back buffer: {}", e);
                        self.render_targets.clear();
                        self.backend.bind_framebuffer(None);
                        self.surface_changed(
                            self.params.back_buffer_width,
                            self.params.back_buffer_height,
                        );
                        return Err(e);
                    }
                };
                self.render_targets = bindings.iter().cloned().collect();
                self.backend.bind_framebuffer(Some(fb));
                self.backend.set_draw_buffers(bindings.len());
                debug!("bound {} render target(s) via {:?}", bindings.len(), fb);
                (first.target.width(), first.target.height(), first.target.usage())
            }
        };

        self.surface_changed(width, height);
        if usage == RenderTargetUsage::DiscardContents {
            self.clear_color(Color::DISCARD)?;
        }
        Ok(())
    }

    fn surface_changed(&mut self, width: u32, height: u32) {
        self.dirty |= DirtyFlags::RASTERIZER | DirtyFlags::SCISSOR;
        self.textures.mark_all_dirty();
        self.vertex_textures.mark_all_dirty();
        self.set_viewport(Viewport::new(0, 0, width as i32, height as i32));
        self.scissor = Rect::new(0, 0, width as i32, height as i32);
    }

    /// Copy the current bindings into `out`.
    pub fn get_render_targets(&self, out: &mut Vec<RenderTargetBinding>) {
        out.clear();
        out.extend(self.render_targets.iter().cloned());
    }

    pub fn render_targets(&self) -> &[RenderTargetBinding] {
        &self.render_targets
    }

    pub fn render_target_count(&self) -> usize {
        self.render_targets.len()
    }

    pub fn is_render_target_bound(&self) -> bool {
        !self.render_targets.is_empty()
    }
}
