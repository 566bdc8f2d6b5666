// RustPixel
// copyright zipxing@hotmail.com 2022～2025

use super::{CompareFunction, DeviceState, StateMeta};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    IncrementSaturation,
    DecrementSaturation,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub function: CompareFunction,
    pub pass: StencilOperation,
    pub fail: StencilOperation,
    pub depth_buffer_fail: StencilOperation,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            function: CompareFunction::Always,
            pass: StencilOperation::Keep,
            fail: StencilOperation::Keep,
            depth_buffer_fail: StencilOperation::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_buffer_enable: bool,
    pub depth_buffer_write_enable: bool,
    pub depth_buffer_function: CompareFunction,
    pub stencil_enable: bool,
    pub stencil: StencilFace,
    /// When false, counter clockwise faces use `stencil` as well.
    pub two_sided_stencil_mode: bool,
    pub counter_clockwise_stencil: StencilFace,
    pub reference_stencil: i32,
    pub stencil_mask: u32,
    pub stencil_write_mask: u32,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_buffer_enable: true,
            depth_buffer_write_enable: true,
            depth_buffer_function: CompareFunction::LessEqual,
            stencil_enable: false,
            stencil: StencilFace::default(),
            two_sided_stencil_mode: false,
            counter_clockwise_stencil: StencilFace::default(),
            reference_stencil: 0,
            stencil_mask: u32::MAX,
            stencil_write_mask: u32::MAX,
        }
    }
}

impl DepthStencilDesc {
    pub fn back_face(&self) -> &StencilFace {
        if self.two_sided_stencil_mode {
            &self.counter_clockwise_stencil
        } else {
            &self.stencil
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinDepthStencil {
    Default,
    DepthRead,
    None,
}

impl BuiltinDepthStencil {
    pub const COUNT: usize = 3;
}

impl From<BuiltinDepthStencil> for usize {
    fn from(b: BuiltinDepthStencil) -> usize {
        b as usize
    }
}

#[derive(Debug)]
pub struct DepthStencilState {
    desc: DepthStencilDesc,
    meta: StateMeta<BuiltinDepthStencil>,
}

impl DepthStencilState {
    pub fn new(desc: DepthStencilDesc) -> Self {
        Self {
            desc,
            meta: StateMeta::new(None),
        }
    }

    pub fn desc(&self) -> &DepthStencilDesc {
        &self.desc
    }

    /// Depth test and write on
    pub fn default_state() -> Arc<DepthStencilState> {
        presets()[BuiltinDepthStencil::Default as usize].clone()
    }

    /// Depth test on, write off
    pub fn depth_read() -> Arc<DepthStencilState> {
        presets()[BuiltinDepthStencil::DepthRead as usize].clone()
    }

    pub fn none() -> Arc<DepthStencilState> {
        presets()[BuiltinDepthStencil::None as usize].clone()
    }

    /// State used while clearing. Some drivers refuse to clear stencil while
    /// the stencil test is disabled, so it is forced on.
    pub(crate) fn for_clear() -> DepthStencilState {
        DepthStencilState::new(DepthStencilDesc {
            stencil_enable: true,
            ..Default::default()
        })
    }
}

fn presets() -> &'static [Arc<DepthStencilState>; BuiltinDepthStencil::COUNT] {
    static PRESETS: OnceLock<[Arc<DepthStencilState>; BuiltinDepthStencil::COUNT]> =
        OnceLock::new();
    PRESETS.get_or_init(|| {
        let make = |b: BuiltinDepthStencil, enable: bool, write: bool| {
            Arc::new(DepthStencilState {
                desc: DepthStencilDesc {
                    depth_buffer_enable: enable,
                    depth_buffer_write_enable: write,
                    ..Default::default()
                },
                meta: StateMeta::new(Some(b)),
            })
        };
        [
            make(BuiltinDepthStencil::Default, true, true),
            make(BuiltinDepthStencil::DepthRead, true, false),
            make(BuiltinDepthStencil::None, false, false),
        ]
    })
}

impl DeviceState for DepthStencilState {
    type Builtin = BuiltinDepthStencil;
    const KIND: &'static str = "DepthStencilState";

    fn meta(&self) -> &StateMeta<BuiltinDepthStencil> {
        &self.meta
    }

    fn device_clone(&self) -> Self {
        DepthStencilState::new(self.desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert!(DepthStencilState::default_state().desc().depth_buffer_write_enable);
        assert!(!DepthStencilState::depth_read().desc().depth_buffer_write_enable);
        assert!(!DepthStencilState::none().desc().depth_buffer_enable);
        assert!(DepthStencilState::for_clear().desc().stencil_enable);
    }

    #[test]
    fn test_back_face_follows_mode() {
        let mut desc = DepthStencilDesc::default();
        desc.counter_clockwise_stencil.pass = StencilOperation::Replace;
        assert_eq!(desc.back_face().pass, StencilOperation::Keep);
        desc.two_sided_stencil_mode = true;
        assert_eq!(desc.back_face().pass, StencilOperation::Replace);
    }
}
