// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Core value types to wgpu descriptors.

use crate::backend::AttribType;
use crate::graphics::state::{
    Blend, BlendFunction, ColorWriteChannels, CompareFunction, FilterKind, StencilFace,
    StencilOperation, TargetBlendState, TextureAddressMode,
};
use crate::graphics::types::{Color, DepthFormat, IndexElementSize, PrimitiveType, SurfaceFormat};

/// `None` for formats wgpu has no texel layout for.
pub fn texture_format(format: SurfaceFormat) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as F;
    Some(match format {
        SurfaceFormat::Color => F::Rgba8Unorm,
        SurfaceFormat::ColorSRgb => F::Rgba8UnormSrgb,
        SurfaceFormat::Bgra32 => F::Bgra8Unorm,
        SurfaceFormat::Bgra32SRgb => F::Bgra8UnormSrgb,
        SurfaceFormat::Bgr565 => return None,
        SurfaceFormat::Alpha8 => F::R8Unorm,
        SurfaceFormat::Single => F::R32Float,
        SurfaceFormat::HalfSingle => F::R16Float,
        SurfaceFormat::HalfVector4 => F::Rgba16Float,
        SurfaceFormat::Vector4 => F::Rgba32Float,
        SurfaceFormat::Rgba1010102 => F::Rgb10a2Unorm,
    })
}

pub fn depth_format(format: DepthFormat) -> wgpu::TextureFormat {
    match format {
        DepthFormat::Depth16 => wgpu::TextureFormat::Depth16Unorm,
        DepthFormat::Depth24 => wgpu::TextureFormat::Depth24Plus,
        DepthFormat::Depth24Stencil8 | DepthFormat::None => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

pub fn color(c: Color) -> wgpu::Color {
    let [r, g, b, a] = c.to_array();
    wgpu::Color {
        r: r as f64,
        g: g as f64,
        b: b as f64,
        a: a as f64,
    }
}

/// wgpu only has three fixed border colors, pick the closest.
pub fn border_color(c: Color) -> wgpu::SamplerBorderColor {
    if c.a < 128 {
        wgpu::SamplerBorderColor::TransparentBlack
    } else if (c.r as u32 + c.g as u32 + c.b as u32) < 384 {
        wgpu::SamplerBorderColor::OpaqueBlack
    } else {
        wgpu::SamplerBorderColor::OpaqueWhite
    }
}

fn blend_factor(b: Blend) -> wgpu::BlendFactor {
    use wgpu::BlendFactor as F;
    match b {
        Blend::One => F::One,
        Blend::Zero => F::Zero,
        Blend::SourceColor => F::Src,
        Blend::InverseSourceColor => F::OneMinusSrc,
        Blend::SourceAlpha => F::SrcAlpha,
        Blend::InverseSourceAlpha => F::OneMinusSrcAlpha,
        Blend::DestinationColor => F::Dst,
        Blend::InverseDestinationColor => F::OneMinusDst,
        Blend::DestinationAlpha => F::DstAlpha,
        Blend::InverseDestinationAlpha => F::OneMinusDstAlpha,
        Blend::BlendFactor => F::Constant,
        Blend::InverseBlendFactor => F::OneMinusConstant,
        Blend::SourceAlphaSaturation => F::SrcAlphaSaturated,
    }
}

fn blend_component(src: Blend, dst: Blend, func: BlendFunction) -> wgpu::BlendComponent {
    let operation = match func {
        BlendFunction::Add => wgpu::BlendOperation::Add,
        BlendFunction::Subtract => wgpu::BlendOperation::Subtract,
        BlendFunction::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendFunction::Min => wgpu::BlendOperation::Min,
        BlendFunction::Max => wgpu::BlendOperation::Max,
    };
    // min and max ignore the factors and must be given One
    let (src_factor, dst_factor) = match func {
        BlendFunction::Min | BlendFunction::Max => (wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        _ => (blend_factor(src), blend_factor(dst)),
    };
    wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation,
    }
}

pub fn blend_state(t: &TargetBlendState) -> Option<wgpu::BlendState> {
    if !t.blend_enabled() {
        return None;
    }
    Some(wgpu::BlendState {
        color: blend_component(t.color_source_blend, t.color_destination_blend, t.color_blend_function),
        alpha: blend_component(t.alpha_source_blend, t.alpha_destination_blend, t.alpha_blend_function),
    })
}

pub fn color_writes(c: ColorWriteChannels) -> wgpu::ColorWrites {
    let mut w = wgpu::ColorWrites::empty();
    if c.contains(ColorWriteChannels::RED) {
        w |= wgpu::ColorWrites::RED;
    }
    if c.contains(ColorWriteChannels::GREEN) {
        w |= wgpu::ColorWrites::GREEN;
    }
    if c.contains(ColorWriteChannels::BLUE) {
        w |= wgpu::ColorWrites::BLUE;
    }
    if c.contains(ColorWriteChannels::ALPHA) {
        w |= wgpu::ColorWrites::ALPHA;
    }
    w
}

pub fn compare(f: CompareFunction) -> wgpu::CompareFunction {
    use wgpu::CompareFunction as C;
    match f {
        CompareFunction::Always => C::Always,
        CompareFunction::Never => C::Never,
        CompareFunction::Less => C::Less,
        CompareFunction::LessEqual => C::LessEqual,
        CompareFunction::Equal => C::Equal,
        CompareFunction::GreaterEqual => C::GreaterEqual,
        CompareFunction::Greater => C::Greater,
        CompareFunction::NotEqual => C::NotEqual,
    }
}

fn stencil_operation(op: StencilOperation) -> wgpu::StencilOperation {
    use wgpu::StencilOperation as S;
    match op {
        StencilOperation::Keep => S::Keep,
        StencilOperation::Zero => S::Zero,
        StencilOperation::Replace => S::Replace,
        StencilOperation::Increment => S::IncrementWrap,
        StencilOperation::Decrement => S::DecrementWrap,
        StencilOperation::IncrementSaturation => S::IncrementClamp,
        StencilOperation::DecrementSaturation => S::DecrementClamp,
        StencilOperation::Invert => S::Invert,
    }
}

pub fn stencil_face(s: &StencilFace) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: compare(s.function),
        fail_op: stencil_operation(s.fail),
        depth_fail_op: stencil_operation(s.depth_buffer_fail),
        pass_op: stencil_operation(s.pass),
    }
}

pub fn topology(p: PrimitiveType) -> wgpu::PrimitiveTopology {
    use wgpu::PrimitiveTopology as T;
    match p {
        PrimitiveType::TriangleList => T::TriangleList,
        PrimitiveType::TriangleStrip => T::TriangleStrip,
        PrimitiveType::LineList => T::LineList,
        PrimitiveType::LineStrip => T::LineStrip,
        PrimitiveType::PointList => T::PointList,
    }
}

pub fn index_format(size: IndexElementSize) -> wgpu::IndexFormat {
    match size {
        IndexElementSize::SixteenBits => wgpu::IndexFormat::Uint16,
        IndexElementSize::ThirtyTwoBits => wgpu::IndexFormat::Uint32,
    }
}

/// wgpu has no three component 8 or 16 bit formats.
pub fn vertex_format(ty: AttribType, components: u32, normalized: bool) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as V;
    Some(match (ty, components, normalized) {
        (AttribType::F32, 1, _) => V::Float32,
        (AttribType::F32, 2, _) => V::Float32x2,
        (AttribType::F32, 3, _) => V::Float32x3,
        (AttribType::F32, 4, _) => V::Float32x4,
        (AttribType::F16, 2, _) => V::Float16x2,
        (AttribType::F16, 4, _) => V::Float16x4,
        (AttribType::U8, 2, true) => V::Unorm8x2,
        (AttribType::U8, 4, true) => V::Unorm8x4,
        (AttribType::U8, 2, false) => V::Uint8x2,
        (AttribType::U8, 4, false) => V::Uint8x4,
        (AttribType::I16, 2, true) => V::Snorm16x2,
        (AttribType::I16, 4, true) => V::Snorm16x4,
        (AttribType::I16, 2, false) => V::Sint16x2,
        (AttribType::I16, 4, false) => V::Sint16x4,
        _ => return None,
    })
}

pub fn address_mode(mode: TextureAddressMode, border: bool) -> wgpu::AddressMode {
    match mode {
        TextureAddressMode::Wrap => wgpu::AddressMode::Repeat,
        TextureAddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        TextureAddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
        TextureAddressMode::Border if border => wgpu::AddressMode::ClampToBorder,
        TextureAddressMode::Border => wgpu::AddressMode::ClampToEdge,
    }
}

pub fn filter(kind: FilterKind) -> wgpu::FilterMode {
    match kind {
        FilterKind::Nearest => wgpu::FilterMode::Nearest,
        FilterKind::Linear => wgpu::FilterMode::Linear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_force_unit_factors() {
        let c = blend_component(Blend::SourceAlpha, Blend::InverseSourceAlpha, BlendFunction::Max);
        assert_eq!(c.src_factor, wgpu::BlendFactor::One);
        assert_eq!(c.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(c.operation, wgpu::BlendOperation::Max);
    }

    #[test]
    fn test_vertex_formats() {
        assert_eq!(vertex_format(AttribType::F32, 3, false), Some(wgpu::VertexFormat::Float32x3));
        assert_eq!(vertex_format(AttribType::U8, 4, true), Some(wgpu::VertexFormat::Unorm8x4));
        assert_eq!(vertex_format(AttribType::U8, 3, true), None);
    }

    #[test]
    fn test_border_color() {
        assert_eq!(border_color(Color::TRANSPARENT), wgpu::SamplerBorderColor::TransparentBlack);
        assert_eq!(border_color(Color::BLACK), wgpu::SamplerBorderColor::OpaqueBlack);
        assert_eq!(border_color(Color::WHITE), wgpu::SamplerBorderColor::OpaqueWhite);
        assert!(texture_format(SurfaceFormat::Bgr565).is_none());
    }
}
