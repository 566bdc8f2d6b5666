// RustPixel
// copyright zipxing@hotmail.com 2022～2025

use std::ops::{Add, Sub};

/// Per-frame counters, reset by every present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphicsMetrics {
    pub clear_count: u64,
    pub draw_count: u64,
    pub primitive_count: u64,
    pub pixel_shader_count: u64,
    pub vertex_shader_count: u64,
    pub target_count: u64,
    pub texture_count: u64,
}

macro_rules! metrics_op {
    ($tr:ident, $f:ident, $op:ident) => {
        impl $tr for GraphicsMetrics {
            type Output = GraphicsMetrics;

            fn $f(self, rhs: GraphicsMetrics) -> GraphicsMetrics {
                GraphicsMetrics {
                    clear_count: self.clear_count.$op(rhs.clear_count),
                    draw_count: self.draw_count.$op(rhs.draw_count),
                    primitive_count: self.primitive_count.$op(rhs.primitive_count),
                    pixel_shader_count: self.pixel_shader_count.$op(rhs.pixel_shader_count),
                    vertex_shader_count: self.vertex_shader_count.$op(rhs.vertex_shader_count),
                    target_count: self.target_count.$op(rhs.target_count),
                    texture_count: self.texture_count.$op(rhs.texture_count),
                }
            }
        }
    };
}

metrics_op!(Add, add, wrapping_add);
metrics_op!(Sub, sub, wrapping_sub);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_delta() {
        let before = GraphicsMetrics {
            draw_count: 3,
            primitive_count: 10,
            ..Default::default()
        };
        let after = GraphicsMetrics {
            draw_count: 5,
            primitive_count: 16,
            clear_count: 1,
            ..Default::default()
        };
        let d = after - before;
        assert_eq!(d.draw_count, 2);
        assert_eq!(d.primitive_count, 6);
        assert_eq!(d + before, after);
    }
}
