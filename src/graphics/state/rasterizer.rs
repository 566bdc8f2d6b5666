// RustPixel
// copyright zipxing@hotmail.com 2022～2025

use super::{DeviceState, StateMeta};
use std::sync::{Arc, OnceLock};

/// Which triangle winding gets culled, in top-left screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    CullClockwiseFace,
    CullCounterClockwiseFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    Solid,
    WireFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Cw,
    Ccw,
}

/// Cull setting as the backend applies it: back faces are culled, the
/// front winding is chosen from the cull mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CullFace {
    pub enabled: bool,
    pub front_face: FrontFace,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub depth_bias: f32,
    pub slope_scale_depth_bias: f32,
    pub scissor_test_enable: bool,
    pub multi_sample_anti_alias: bool,
    /// Disabling depth clipping clamps depth instead, needs depth clamp support.
    pub depth_clip_enable: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::CullCounterClockwiseFace,
            fill_mode: FillMode::Solid,
            depth_bias: 0.0,
            slope_scale_depth_bias: 0.0,
            scissor_test_enable: false,
            multi_sample_anti_alias: true,
            depth_clip_enable: true,
        }
    }
}

impl RasterizerDesc {
    /// Resolve the cull mode against the current render surface.
    ///
    /// `flip_winding` is set while drawing off-screen on a bottom-left origin
    /// backend, where the y flip of the position fixup reverses winding.
    pub fn cull_face(&self, flip_winding: bool) -> CullFace {
        match self.cull_mode {
            CullMode::None => CullFace {
                enabled: false,
                front_face: FrontFace::Ccw,
            },
            CullMode::CullClockwiseFace => CullFace {
                enabled: true,
                front_face: if flip_winding {
                    FrontFace::Cw
                } else {
                    FrontFace::Ccw
                },
            },
            CullMode::CullCounterClockwiseFace => CullFace {
                enabled: true,
                front_face: if flip_winding {
                    FrontFace::Ccw
                } else {
                    FrontFace::Cw
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRasterizer {
    CullClockwise,
    CullCounterClockwise,
    CullNone,
}

impl BuiltinRasterizer {
    pub const COUNT: usize = 3;
}

impl From<BuiltinRasterizer> for usize {
    fn from(b: BuiltinRasterizer) -> usize {
        b as usize
    }
}

#[derive(Debug)]
pub struct RasterizerState {
    desc: RasterizerDesc,
    meta: StateMeta<BuiltinRasterizer>,
}

impl RasterizerState {
    pub fn new(desc: RasterizerDesc) -> Self {
        Self {
            desc,
            meta: StateMeta::new(None),
        }
    }

    pub fn desc(&self) -> &RasterizerDesc {
        &self.desc
    }

    pub fn cull_clockwise() -> Arc<RasterizerState> {
        presets()[BuiltinRasterizer::CullClockwise as usize].clone()
    }

    pub fn cull_counter_clockwise() -> Arc<RasterizerState> {
        presets()[BuiltinRasterizer::CullCounterClockwise as usize].clone()
    }

    pub fn cull_none() -> Arc<RasterizerState> {
        presets()[BuiltinRasterizer::CullNone as usize].clone()
    }
}

fn presets() -> &'static [Arc<RasterizerState>; BuiltinRasterizer::COUNT] {
    static PRESETS: OnceLock<[Arc<RasterizerState>; BuiltinRasterizer::COUNT]> = OnceLock::new();
    PRESETS.get_or_init(|| {
        let make = |b: BuiltinRasterizer, cull_mode: CullMode| {
            Arc::new(RasterizerState {
                desc: RasterizerDesc {
                    cull_mode,
                    ..Default::default()
                },
                meta: StateMeta::new(Some(b)),
            })
        };
        [
            make(BuiltinRasterizer::CullClockwise, CullMode::CullClockwiseFace),
            make(
                BuiltinRasterizer::CullCounterClockwise,
                CullMode::CullCounterClockwiseFace,
            ),
            make(BuiltinRasterizer::CullNone, CullMode::None),
        ]
    })
}

impl DeviceState for RasterizerState {
    type Builtin = BuiltinRasterizer;
    const KIND: &'static str = "RasterizerState";

    fn meta(&self) -> &StateMeta<BuiltinRasterizer> {
        &self.meta
    }

    fn device_clone(&self) -> Self {
        RasterizerState::new(self.desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cull_face_winding() {
        let cw = *RasterizerState::cull_clockwise().desc();
        assert_eq!(
            cw.cull_face(false),
            CullFace {
                enabled: true,
                front_face: FrontFace::Ccw
            }
        );
        assert_eq!(cw.cull_face(true).front_face, FrontFace::Cw);

        let ccw = *RasterizerState::cull_counter_clockwise().desc();
        assert_eq!(ccw.cull_face(false).front_face, FrontFace::Cw);
        assert_eq!(ccw.cull_face(true).front_face, FrontFace::Ccw);

        let none = *RasterizerState::cull_none().desc();
        assert!(!none.cull_face(false).enabled);
        assert!(!none.cull_face(true).enabled);
    }
}
