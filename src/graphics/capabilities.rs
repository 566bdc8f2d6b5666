// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Capabilities Registry
//!
//! Feature flags and limits of the active backend, queried once when the
//! context is created (and again after a device reset). The core never asks
//! the backend twice in between, every capability check reads this table.

use crate::backend::GraphicsBackend;
use crate::graphics::types::SurfaceFormat;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Upper bound of simultaneously bound render targets.
pub const MAX_RENDER_TARGETS: usize = 8;
/// Upper bound of vertex buffer slots.
pub const MAX_VERTEX_BUFFER_SLOTS: usize = 16;
/// Texture collections track dirty slots in a `u32` mask.
pub const MAX_TEXTURE_SLOTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_instancing: bool,
    pub supports_base_index_instancing: bool,
    pub supports_separate_blend_states: bool,
    pub supports_blit_framebuffer: bool,
    pub supports_invalidate_framebuffer: bool,
    pub supports_depth_clamp: bool,
    pub supports_framebuffer_object: bool,
    pub supports_srgb: bool,
    pub max_vertex_buffer_slots: usize,
    pub max_render_targets: usize,
    pub max_texture_slots: usize,
    pub max_vertex_texture_slots: usize,
    pub max_vertex_attributes: usize,
    pub max_multisample_count: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_instancing: true,
            supports_base_index_instancing: true,
            supports_separate_blend_states: true,
            supports_blit_framebuffer: true,
            supports_invalidate_framebuffer: true,
            supports_depth_clamp: true,
            supports_framebuffer_object: true,
            supports_srgb: true,
            max_vertex_buffer_slots: MAX_VERTEX_BUFFER_SLOTS,
            max_render_targets: 4,
            max_texture_slots: 16,
            max_vertex_texture_slots: 4,
            max_vertex_attributes: 16,
            max_multisample_count: 8,
        }
    }
}

impl Capabilities {
    /// Query the backend and clamp the reported limits to what the core tracks.
    pub fn query(backend: &mut dyn GraphicsBackend) -> Capabilities {
        let mut caps = backend.query_capabilities();
        caps.max_render_targets = caps.max_render_targets.clamp(1, MAX_RENDER_TARGETS);
        caps.max_vertex_buffer_slots = caps
            .max_vertex_buffer_slots
            .clamp(1, MAX_VERTEX_BUFFER_SLOTS);
        caps.max_texture_slots = caps.max_texture_slots.min(MAX_TEXTURE_SLOTS);
        caps.max_vertex_texture_slots = caps.max_vertex_texture_slots.min(MAX_TEXTURE_SLOTS);
        info!(
            "{}: instancing={} separate_blend={} blit={} invalidate={} depth_clamp={} \
             targets={} vb_slots={} tex_slots={} attribs={} msaa={}",
            backend.name(),
            caps.supports_instancing,
            caps.supports_separate_blend_states,
            caps.supports_blit_framebuffer,
            caps.supports_invalidate_framebuffer,
            caps.supports_depth_clamp,
            caps.max_render_targets,
            caps.max_vertex_buffer_slots,
            caps.max_texture_slots,
            caps.max_vertex_attributes,
            caps.max_multisample_count,
        );
        caps
    }

    /// Negotiate the format a render target is actually created with.
    ///
    /// Returns `(format, multisample_count)`. sRGB falls back to linear when
    /// the backend or the profile can't render to it, Reach allows only a
    /// couple of color formats and no multisampling.
    pub fn query_render_target_format(
        &self,
        profile: GraphicsProfile,
        format: SurfaceFormat,
        multisample_count: u32,
    ) -> (SurfaceFormat, u32) {
        let mut selected = format;
        if selected.is_srgb() && (!self.supports_srgb || profile == GraphicsProfile::Reach) {
            warn!("sRGB target format {:?} not available, using linear", format);
            selected = selected.to_linear();
        }
        if profile == GraphicsProfile::Reach
            && !matches!(selected, SurfaceFormat::Color | SurfaceFormat::Bgr565)
        {
            warn!("{:?} is not a Reach render target format, using Color", selected);
            selected = SurfaceFormat::Color;
        }

        let samples = if profile == GraphicsProfile::Reach || multisample_count <= 1 {
            0
        } else {
            let clamped = multisample_count.min(self.max_multisample_count);
            // round down to a power of two
            let pow2 = if clamped == 0 {
                0
            } else {
                1 << (31 - clamped.leading_zeros())
            };
            if pow2 != multisample_count {
                warn!(
                    "multisample count {} not available, using {}",
                    multisample_count, pow2
                );
            }
            if pow2 <= 1 {
                0
            } else {
                pow2
            }
        };
        (selected, samples)
    }
}

/// Feature level the game targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GraphicsProfile {
    /// Constrained profile
    Reach,
    #[default]
    HiDef,
}

impl GraphicsProfile {
    /// Largest primitive count a single draw call may submit.
    pub fn max_primitive_count(&self) -> usize {
        match self {
            GraphicsProfile::Reach => 65_535,
            GraphicsProfile::HiDef => 1_048_575,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_ceilings() {
        assert_eq!(GraphicsProfile::Reach.max_primitive_count(), 65535);
        assert_eq!(GraphicsProfile::HiDef.max_primitive_count(), 1048575);
    }

    #[test]
    fn test_srgb_fallback() {
        let mut caps = Capabilities::default();
        assert_eq!(
            caps.query_render_target_format(GraphicsProfile::HiDef, SurfaceFormat::ColorSRgb, 0),
            (SurfaceFormat::ColorSRgb, 0)
        );
        assert_eq!(
            caps.query_render_target_format(GraphicsProfile::Reach, SurfaceFormat::ColorSRgb, 0),
            (SurfaceFormat::Color, 0)
        );
        caps.supports_srgb = false;
        assert_eq!(
            caps.query_render_target_format(GraphicsProfile::HiDef, SurfaceFormat::Bgra32SRgb, 0),
            (SurfaceFormat::Bgra32, 0)
        );
    }

    #[test]
    fn test_reach_formats_and_msaa() {
        let caps = Capabilities::default();
        assert_eq!(
            caps.query_render_target_format(GraphicsProfile::Reach, SurfaceFormat::Vector4, 4),
            (SurfaceFormat::Color, 0)
        );
        assert_eq!(
            caps.query_render_target_format(GraphicsProfile::HiDef, SurfaceFormat::Vector4, 6),
            (SurfaceFormat::Vector4, 4)
        );
        assert_eq!(
            caps.query_render_target_format(GraphicsProfile::HiDef, SurfaceFormat::Color, 32),
            (SurfaceFormat::Color, 8)
        );
        assert_eq!(
            caps.query_render_target_format(GraphicsProfile::HiDef, SurfaceFormat::Color, 1),
            (SurfaceFormat::Color, 0)
        );
    }
}
