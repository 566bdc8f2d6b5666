// RustPixel
// copyright zipxing@hotmail.com 2022～2025

use super::{CompareFunction, DeviceState, StateMeta};
use crate::graphics::types::Color;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Linear,
    Point,
    Anisotropic,
    LinearMipPoint,
    PointMipLinear,
    MinLinearMagPointMipLinear,
    MinLinearMagPointMipPoint,
    MinPointMagLinearMipLinear,
    MinPointMagLinearMipPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureAddressMode {
    Wrap,
    Clamp,
    Mirror,
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Nearest,
    Linear,
}

impl TextureFilter {
    /// `(min, mag, mip)` filter kinds.
    pub fn split(&self) -> (FilterKind, FilterKind, FilterKind) {
        use FilterKind::*;
        match self {
            TextureFilter::Linear | TextureFilter::Anisotropic => (Linear, Linear, Linear),
            TextureFilter::Point => (Nearest, Nearest, Nearest),
            TextureFilter::LinearMipPoint => (Linear, Linear, Nearest),
            TextureFilter::PointMipLinear => (Nearest, Nearest, Linear),
            TextureFilter::MinLinearMagPointMipLinear => (Linear, Nearest, Linear),
            TextureFilter::MinLinearMagPointMipPoint => (Linear, Nearest, Nearest),
            TextureFilter::MinPointMagLinearMipLinear => (Nearest, Linear, Linear),
            TextureFilter::MinPointMagLinearMipPoint => (Nearest, Linear, Nearest),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: TextureFilter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub border_color: Color,
    pub max_anisotropy: u16,
    pub max_mip_level: u32,
    pub mip_map_level_of_detail_bias: f32,
    /// Some(func) turns the sampler into a depth comparison sampler.
    pub comparison_function: Option<CompareFunction>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: TextureFilter::Linear,
            address_u: TextureAddressMode::Wrap,
            address_v: TextureAddressMode::Wrap,
            address_w: TextureAddressMode::Wrap,
            border_color: Color::TRANSPARENT,
            max_anisotropy: 4,
            max_mip_level: 0,
            mip_map_level_of_detail_bias: 0.0,
            comparison_function: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinSampler {
    LinearClamp,
    LinearWrap,
    PointClamp,
    PointWrap,
    AnisotropicClamp,
    AnisotropicWrap,
}

impl BuiltinSampler {
    pub const COUNT: usize = 6;
}

impl From<BuiltinSampler> for usize {
    fn from(b: BuiltinSampler) -> usize {
        b as usize
    }
}

#[derive(Debug)]
pub struct SamplerState {
    desc: SamplerDesc,
    meta: StateMeta<BuiltinSampler>,
}

impl SamplerState {
    pub fn new(desc: SamplerDesc) -> Self {
        Self {
            desc,
            meta: StateMeta::new(None),
        }
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    pub fn linear_clamp() -> Arc<SamplerState> {
        presets()[BuiltinSampler::LinearClamp as usize].clone()
    }

    pub fn linear_wrap() -> Arc<SamplerState> {
        presets()[BuiltinSampler::LinearWrap as usize].clone()
    }

    pub fn point_clamp() -> Arc<SamplerState> {
        presets()[BuiltinSampler::PointClamp as usize].clone()
    }

    pub fn point_wrap() -> Arc<SamplerState> {
        presets()[BuiltinSampler::PointWrap as usize].clone()
    }

    pub fn anisotropic_clamp() -> Arc<SamplerState> {
        presets()[BuiltinSampler::AnisotropicClamp as usize].clone()
    }

    pub fn anisotropic_wrap() -> Arc<SamplerState> {
        presets()[BuiltinSampler::AnisotropicWrap as usize].clone()
    }
}

fn presets() -> &'static [Arc<SamplerState>; BuiltinSampler::COUNT] {
    static PRESETS: OnceLock<[Arc<SamplerState>; BuiltinSampler::COUNT]> = OnceLock::new();
    PRESETS.get_or_init(|| {
        let make = |b: BuiltinSampler, filter: TextureFilter, address: TextureAddressMode| {
            Arc::new(SamplerState {
                desc: SamplerDesc {
                    filter,
                    address_u: address,
                    address_v: address,
                    address_w: address,
                    ..Default::default()
                },
                meta: StateMeta::new(Some(b)),
            })
        };
        use TextureAddressMode::{Clamp, Wrap};
        [
            make(BuiltinSampler::LinearClamp, TextureFilter::Linear, Clamp),
            make(BuiltinSampler::LinearWrap, TextureFilter::Linear, Wrap),
            make(BuiltinSampler::PointClamp, TextureFilter::Point, Clamp),
            make(BuiltinSampler::PointWrap, TextureFilter::Point, Wrap),
            make(BuiltinSampler::AnisotropicClamp, TextureFilter::Anisotropic, Clamp),
            make(BuiltinSampler::AnisotropicWrap, TextureFilter::Anisotropic, Wrap),
        ]
    })
}

impl DeviceState for SamplerState {
    type Builtin = BuiltinSampler;
    const KIND: &'static str = "SamplerState";

    fn meta(&self) -> &StateMeta<BuiltinSampler> {
        &self.meta
    }

    fn device_clone(&self) -> Self {
        SamplerState::new(self.desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_address_modes() {
        let s = SamplerState::point_clamp();
        assert_eq!(s.desc().filter, TextureFilter::Point);
        assert_eq!(s.desc().address_v, TextureAddressMode::Clamp);
        assert_eq!(
            SamplerState::anisotropic_wrap().desc().address_w,
            TextureAddressMode::Wrap
        );
    }

    #[test]
    fn test_filter_split() {
        assert_eq!(
            TextureFilter::MinPointMagLinearMipPoint.split(),
            (FilterKind::Nearest, FilterKind::Linear, FilterKind::Nearest)
        );
    }
}
