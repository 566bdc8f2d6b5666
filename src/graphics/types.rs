// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Plain value types shared by the graphics core and the backends.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);
    pub const BLACK: Color = Color::new(0, 0, 0, 255);
    pub const WHITE: Color = Color::new(255, 255, 255, 255);
    /// Fill color used when a target with discard usage is bound.
    pub const DISCARD: Color = Color::new(68, 34, 136, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Mirror the rectangle vertically inside a surface of `surface_height`,
    /// converting between top-left and bottom-left origins.
    pub fn flip_y(&self, surface_height: i32) -> Rect {
        Rect::new(
            self.x,
            surface_height - (self.y + self.height),
            self.width,
            self.height,
        )
    }

    /// Intersection with a `width` x `height` surface anchored at the origin.
    pub fn clip(&self, width: u32, height: u32) -> Rect {
        let x0 = self.x.clamp(0, width as i32);
        let y0 = self.y.clamp(0, height as i32);
        let x1 = (self.x + self.width).clamp(x0, width as i32);
        let y1 = (self.y + self.height).clamp(y0, height as i32);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport::new(0, 0, 0, 0)
    }
}

bitflags! {
    /// Surfaces touched by a clear call
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearOptions: u8 {
        const TARGET = 0b001;
        const DEPTH_BUFFER = 0b010;
        const STENCIL = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

impl PrimitiveType {
    /// Number of vertices (or indices) needed for `primitive_count` primitives.
    pub fn element_count(&self, primitive_count: usize) -> usize {
        match self {
            PrimitiveType::LineList => primitive_count * 2,
            PrimitiveType::LineStrip => primitive_count + 1,
            PrimitiveType::TriangleList => primitive_count * 3,
            PrimitiveType::TriangleStrip => primitive_count + 2,
            PrimitiveType::PointList => primitive_count,
        }
    }

    pub fn is_strip(&self) -> bool {
        matches!(self, PrimitiveType::TriangleStrip | PrimitiveType::LineStrip)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexElementSize {
    SixteenBits,
    ThirtyTwoBits,
}

impl IndexElementSize {
    pub fn bytes(&self) -> usize {
        match self {
            IndexElementSize::SixteenBits => 2,
            IndexElementSize::ThirtyTwoBits => 4,
        }
    }
}

/// Index types accepted by user-memory indexed draws
pub trait IndexElement: bytemuck::Pod {
    const SIZE: IndexElementSize;
}

impl IndexElement for u16 {
    const SIZE: IndexElementSize = IndexElementSize::SixteenBits;
}

impl IndexElement for u32 {
    const SIZE: IndexElementSize = IndexElementSize::ThirtyTwoBits;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BufferUsage {
    #[default]
    None,
    WriteOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SurfaceFormat {
    #[default]
    Color,
    ColorSRgb,
    Bgra32,
    Bgra32SRgb,
    Bgr565,
    Alpha8,
    Single,
    HalfSingle,
    HalfVector4,
    Vector4,
    Rgba1010102,
}

impl SurfaceFormat {
    pub fn is_srgb(&self) -> bool {
        matches!(self, SurfaceFormat::ColorSRgb | SurfaceFormat::Bgra32SRgb)
    }

    /// Linear counterpart of an sRGB format, other formats map to themselves.
    pub fn to_linear(&self) -> SurfaceFormat {
        match self {
            SurfaceFormat::ColorSRgb => SurfaceFormat::Color,
            SurfaceFormat::Bgra32SRgb => SurfaceFormat::Bgra32,
            other => *other,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            SurfaceFormat::Alpha8 => 1,
            SurfaceFormat::Bgr565 | SurfaceFormat::HalfSingle => 2,
            SurfaceFormat::HalfVector4 => 8,
            SurfaceFormat::Vector4 => 16,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthFormat {
    None,
    Depth16,
    Depth24,
    #[default]
    Depth24Stencil8,
}

impl DepthFormat {
    pub fn has_depth(&self) -> bool {
        !matches!(self, DepthFormat::None)
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, DepthFormat::Depth24Stencil8)
    }

    /// Scale applied to integer depth bias on fixed-point depth buffers.
    pub fn depth_bias_scale(&self) -> f32 {
        match self {
            DepthFormat::Depth16 => 65535.0,
            DepthFormat::None => 0.0,
            _ => 16777215.0,
        }
    }
}

/// What happens to a target's contents when it is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderTargetUsage {
    #[default]
    DiscardContents,
    PreserveContents,
    PlatformContents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_clip() {
        assert_eq!(Rect::new(-10, 5, 50, 200).clip(32, 64), Rect::new(0, 5, 32, 59));
        assert_eq!(Rect::new(40, 0, 8, 8).clip(32, 64), Rect::new(32, 0, 0, 8));
    }

    #[test]
    fn test_element_count() {
        assert_eq!(PrimitiveType::TriangleList.element_count(2), 6);
        assert_eq!(PrimitiveType::TriangleStrip.element_count(2), 4);
        assert_eq!(PrimitiveType::LineList.element_count(3), 6);
        assert_eq!(PrimitiveType::LineStrip.element_count(3), 4);
        assert_eq!(PrimitiveType::PointList.element_count(5), 5);
    }

    #[test]
    fn test_rect_flip() {
        let r = Rect::new(10, 20, 100, 50);
        assert_eq!(r.flip_y(600), Rect::new(10, 530, 100, 50));
        assert_eq!(r.flip_y(600).flip_y(600), r);
    }

    #[test]
    fn test_srgb_linear() {
        assert!(SurfaceFormat::ColorSRgb.is_srgb());
        assert_eq!(SurfaceFormat::ColorSRgb.to_linear(), SurfaceFormat::Color);
        assert_eq!(SurfaceFormat::Bgra32SRgb.to_linear(), SurfaceFormat::Bgra32);
        assert_eq!(SurfaceFormat::Single.to_linear(), SurfaceFormat::Single);
    }
}
