// RustPixel
// copyright zipxing@hotmail.com 2022～2025

use super::{DeviceState, StateMeta};
use crate::graphics::types::Color;
use bitflags::bitflags;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    One,
    Zero,
    SourceColor,
    InverseSourceColor,
    SourceAlpha,
    InverseSourceAlpha,
    DestinationColor,
    InverseDestinationColor,
    DestinationAlpha,
    InverseDestinationAlpha,
    BlendFactor,
    InverseBlendFactor,
    SourceAlphaSaturation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFunction {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteChannels: u8 {
        const RED = 0b0001;
        const GREEN = 0b0010;
        const BLUE = 0b0100;
        const ALPHA = 0b1000;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// Blend equation of one render target slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetBlendState {
    pub color_source_blend: Blend,
    pub color_destination_blend: Blend,
    pub color_blend_function: BlendFunction,
    pub alpha_source_blend: Blend,
    pub alpha_destination_blend: Blend,
    pub alpha_blend_function: BlendFunction,
    pub color_write_channels: ColorWriteChannels,
}

impl TargetBlendState {
    pub const fn new(source: Blend, destination: Blend) -> Self {
        Self {
            color_source_blend: source,
            color_destination_blend: destination,
            color_blend_function: BlendFunction::Add,
            alpha_source_blend: source,
            alpha_destination_blend: destination,
            alpha_blend_function: BlendFunction::Add,
            color_write_channels: ColorWriteChannels::ALL,
        }
    }

    /// Blending can be switched off when the equation is a plain replace.
    pub fn blend_enabled(&self) -> bool {
        !(self.color_source_blend == Blend::One
            && self.color_destination_blend == Blend::Zero
            && self.alpha_source_blend == Blend::One
            && self.alpha_destination_blend == Blend::Zero)
    }
}

impl Default for TargetBlendState {
    fn default() -> Self {
        TargetBlendState::new(Blend::One, Blend::Zero)
    }
}

/// Blend states hold equations for up to four targets, targets beyond the
/// fourth follow target 0.
pub const MAX_BLEND_TARGETS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendDesc {
    pub targets: [TargetBlendState; MAX_BLEND_TARGETS],
    pub blend_factor: Color,
    pub multi_sample_mask: u32,
    /// Use a different equation per target, needs separate blend support.
    pub independent_blend_enable: bool,
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self {
            targets: [TargetBlendState::default(); MAX_BLEND_TARGETS],
            blend_factor: Color::WHITE,
            multi_sample_mask: u32::MAX,
            independent_blend_enable: false,
        }
    }
}

impl BlendDesc {
    pub fn with_target0(target: TargetBlendState) -> Self {
        Self {
            targets: [target; MAX_BLEND_TARGETS],
            ..Default::default()
        }
    }

    pub fn target(&self, index: usize) -> &TargetBlendState {
        if self.independent_blend_enable && index < MAX_BLEND_TARGETS {
            &self.targets[index]
        } else {
            &self.targets[0]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinBlend {
    Opaque,
    AlphaBlend,
    Additive,
    NonPremultiplied,
}

impl BuiltinBlend {
    pub const COUNT: usize = 4;
}

impl From<BuiltinBlend> for usize {
    fn from(b: BuiltinBlend) -> usize {
        b as usize
    }
}

#[derive(Debug)]
pub struct BlendState {
    desc: BlendDesc,
    meta: StateMeta<BuiltinBlend>,
}

impl BlendState {
    pub fn new(desc: BlendDesc) -> Self {
        Self {
            desc,
            meta: StateMeta::new(None),
        }
    }

    pub fn desc(&self) -> &BlendDesc {
        &self.desc
    }

    pub fn opaque() -> Arc<BlendState> {
        presets()[BuiltinBlend::Opaque as usize].clone()
    }

    /// Premultiplied alpha blending
    pub fn alpha_blend() -> Arc<BlendState> {
        presets()[BuiltinBlend::AlphaBlend as usize].clone()
    }

    pub fn additive() -> Arc<BlendState> {
        presets()[BuiltinBlend::Additive as usize].clone()
    }

    pub fn non_premultiplied() -> Arc<BlendState> {
        presets()[BuiltinBlend::NonPremultiplied as usize].clone()
    }
}

fn presets() -> &'static [Arc<BlendState>; BuiltinBlend::COUNT] {
    static PRESETS: OnceLock<[Arc<BlendState>; BuiltinBlend::COUNT]> = OnceLock::new();
    PRESETS.get_or_init(|| {
        let make = |b: BuiltinBlend, src: Blend, dst: Blend| {
            Arc::new(BlendState {
                desc: BlendDesc::with_target0(TargetBlendState::new(src, dst)),
                meta: StateMeta::new(Some(b)),
            })
        };
        [
            make(BuiltinBlend::Opaque, Blend::One, Blend::Zero),
            make(BuiltinBlend::AlphaBlend, Blend::One, Blend::InverseSourceAlpha),
            make(BuiltinBlend::Additive, Blend::SourceAlpha, Blend::One),
            make(
                BuiltinBlend::NonPremultiplied,
                Blend::SourceAlpha,
                Blend::InverseSourceAlpha,
            ),
        ]
    })
}

impl DeviceState for BlendState {
    type Builtin = BuiltinBlend;
    const KIND: &'static str = "BlendState";

    fn meta(&self) -> &StateMeta<BuiltinBlend> {
        &self.meta
    }

    fn device_clone(&self) -> Self {
        BlendState::new(self.desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_singletons() {
        assert!(Arc::ptr_eq(&BlendState::opaque(), &BlendState::opaque()));
        assert!(!Arc::ptr_eq(&BlendState::opaque(), &BlendState::additive()));
        assert_eq!(
            BlendState::alpha_blend().meta().builtin(),
            Some(BuiltinBlend::AlphaBlend)
        );
    }

    #[test]
    fn test_blend_enabled() {
        assert!(!BlendState::opaque().desc().targets[0].blend_enabled());
        assert!(BlendState::alpha_blend().desc().targets[0].blend_enabled());
    }

    #[test]
    fn test_independent_target_lookup() {
        let mut desc = BlendDesc::default();
        desc.targets[2] = TargetBlendState::new(Blend::SourceAlpha, Blend::One);
        assert_eq!(desc.target(2), &desc.targets[0]);
        desc.independent_blend_enable = true;
        assert_eq!(desc.target(2).color_destination_blend, Blend::One);
        assert_eq!(desc.target(6), &desc.targets[0]);
    }
}
