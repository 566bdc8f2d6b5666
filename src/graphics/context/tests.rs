// RustPixel
// copyright zipxing@hotmail.com 2022～2025

use super::*;
use crate::backend::{BackendCall, FramebufferHandle, PresentError, RecordingBackend};
use crate::graphics::render_target::RenderTargetBinding;
use crate::graphics::resource::{
    RenderTarget, RenderTargetDescriptor, TextureDescriptor, TextureKind,
};
use crate::graphics::shader::{ShaderDesc, ShaderProfile};
use crate::graphics::state::{BlendDesc, RasterizerDesc};
use crate::graphics::types::{
    BufferUsage, ClearOptions, DepthFormat, IndexElementSize, PrimitiveType, RenderTargetUsage,
};
use crate::graphics::vertex::{
    VertexDeclaration, VertexElement, VertexElementFormat, VertexElementUsage,
};

fn context_with(backend: RecordingBackend, params: PresentationParameters) -> GraphicsContext {
    GraphicsContext::new(Box::new(backend), params).unwrap()
}

fn context() -> GraphicsContext {
    context_with(RecordingBackend::new(), PresentationParameters::default())
}

fn rec(ctx: &mut GraphicsContext) -> &mut RecordingBackend {
    ctx.backend_as::<RecordingBackend>().unwrap()
}

fn position_decl() -> Arc<VertexDeclaration> {
    VertexDeclaration::new(vec![VertexElement::new(
        0,
        VertexElementFormat::Vector3,
        VertexElementUsage::Position,
        0,
    )])
}

fn shader_pair(ctx: &mut GraphicsContext, ps_code: &str) -> (Arc<Shader>, Arc<Shader>) {
    let vs = ctx
        .create_shader(
            &ShaderDesc::new(ShaderStage::Vertex, ShaderProfile::Glsl, "vs main").with_attribute(
                "a_position",
                VertexElementUsage::Position,
                0,
            ),
        )
        .unwrap();
    let ps = ctx
        .create_shader(&ShaderDesc::new(ShaderStage::Pixel, ShaderProfile::Glsl, ps_code))
        .unwrap();
    (vs, ps)
}

/// Shaders, a 64 vertex buffer and a 96 index buffer bound.
fn ready(ctx: &mut GraphicsContext) -> (Arc<VertexBuffer>, Arc<IndexBuffer>) {
    let (vs, ps) = shader_pair(ctx, "ps main");
    ctx.set_vertex_shader(Some(&vs)).unwrap();
    ctx.set_pixel_shader(Some(&ps)).unwrap();
    let vb = ctx
        .create_vertex_buffer(&position_decl(), 64, BufferUsage::None)
        .unwrap();
    let ib = ctx
        .create_index_buffer(IndexElementSize::SixteenBits, 96, BufferUsage::None)
        .unwrap();
    ctx.set_vertex_buffer(Some(&vb)).unwrap();
    ctx.set_index_buffer(Some(&ib)).unwrap();
    (vb, ib)
}

fn target(ctx: &mut GraphicsContext, usage: RenderTargetUsage) -> Arc<RenderTarget> {
    let mut desc = RenderTargetDescriptor::new_2d(256, 128);
    desc.usage = usage;
    ctx.create_render_target(&desc).unwrap()
}

fn draw(ctx: &mut GraphicsContext) -> GfxResult<()> {
    ctx.draw_indexed_primitives(PrimitiveType::TriangleList, 0, 0, 2)
}

#[test]
fn test_init_binds_back_buffer_and_discard_clears_once() {
    let mut ctx = context();
    assert_eq!(ctx.metrics().clear_count, 1);
    let r = rec(&mut ctx);
    assert_eq!(r.count(|c| c.is_clear()), 1);
    let bind = r.position(|c| *c == BackendCall::BindFramebuffer(None)).unwrap();
    let clear = r.position(|c| c.is_clear()).unwrap();
    assert!(bind < clear);
    assert_eq!(
        r.calls()[clear],
        BackendCall::Clear {
            options: ClearOptions::all(),
            color: Color::DISCARD,
            depth: 1.0,
            stencil: 0,
        }
    );
    assert!(r.calls().contains(&BackendCall::SetViewport(Viewport::new(0, 0, 800, 600))));
}

#[test]
fn test_preserved_back_buffer_is_not_cleared() {
    let params = PresentationParameters {
        render_target_usage: RenderTargetUsage::PreserveContents,
        ..Default::default()
    };
    let mut ctx = context_with(RecordingBackend::new(), params);
    assert_eq!(rec(&mut ctx).count(|c| c.is_clear()), 0);
    assert_eq!(ctx.metrics().clear_count, 0);
}

#[test]
fn test_setting_current_state_does_not_dirty() {
    let mut ctx = context();
    let before = ctx.dirty();
    assert!(!before.contains(DirtyFlags::BLEND));
    let opaque = ctx.blend_state().clone();
    ctx.set_blend_state(&opaque).unwrap();
    let rs = ctx.rasterizer_state().clone();
    ctx.set_rasterizer_state(&rs).unwrap();
    ctx.set_scissor_rect(ctx.scissor_rect());
    ctx.set_blend_factor(ctx.blend_factor());
    assert_eq!(ctx.dirty(), before);

    ctx.set_blend_state(&BlendState::alpha_blend()).unwrap();
    assert!(ctx.dirty().contains(DirtyFlags::BLEND));
    // both presets carry a white blend factor
    assert!(!ctx.dirty().contains(DirtyFlags::BLEND_FACTOR));

    let tinted = Arc::new(BlendState::new(BlendDesc {
        blend_factor: Color::new(10, 20, 30, 40),
        ..Default::default()
    }));
    ctx.set_blend_state(&tinted).unwrap();
    assert!(ctx.dirty().contains(DirtyFlags::BLEND_FACTOR));
    assert_eq!(ctx.blend_factor(), Color::new(10, 20, 30, 40));
}

#[test]
fn test_second_identical_draw_issues_only_the_draw() {
    let mut ctx = context();
    ready(&mut ctx);
    draw(&mut ctx).unwrap();
    assert!(ctx.dirty().is_empty());
    rec(&mut ctx).clear_calls();
    draw(&mut ctx).unwrap();
    assert_eq!(
        rec(&mut ctx).calls(),
        &[BackendCall::DrawElements {
            primitive: PrimitiveType::TriangleList,
            count: 6,
            start_index: 0,
        }]
    );
}

#[test]
fn test_attributes_pushed_once_across_draws() {
    let mut ctx = context();
    ready(&mut ctx);
    rec(&mut ctx).clear_calls();
    for _ in 0..5 {
        draw(&mut ctx).unwrap();
    }
    let r = rec(&mut ctx);
    assert_eq!(r.count(|c| matches!(c, BackendCall::SetAttribPointer(_))), 1);
    assert_eq!(r.count(|c| *c == BackendCall::EnableAttrib(0)), 1);
    assert_eq!(r.count(|c| c.is_draw()), 5);
    assert_eq!(ctx.metrics().draw_count, 5);
    assert_eq!(ctx.metrics().primitive_count, 10);
}

#[test]
fn test_base_vertex_moves_attribute_offset() {
    let mut ctx = context();
    ready(&mut ctx);
    draw(&mut ctx).unwrap();
    rec(&mut ctx).clear_calls();
    ctx.draw_indexed_primitives(PrimitiveType::TriangleList, 4, 0, 2)
        .unwrap();
    let pointers: Vec<_> = rec(&mut ctx)
        .calls()
        .iter()
        .filter_map(|c| match c {
            BackendCall::SetAttribPointer(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(pointers.len(), 1);
    assert_eq!(pointers[0].base_offset, 48);
    assert_eq!(pointers[0].stride, 12);
    assert_eq!(pointers[0].offset(), 48);
}

#[test]
fn test_program_cache_hit_and_miss() {
    let mut ctx = context();
    ready(&mut ctx);
    let first_ps = ctx.pixel_shader().cloned().unwrap();
    draw(&mut ctx).unwrap();
    draw(&mut ctx).unwrap();
    assert_eq!(ctx.program_count(), 1);

    let (_, other_ps) = shader_pair(&mut ctx, "ps other");
    ctx.set_pixel_shader(Some(&other_ps)).unwrap();
    draw(&mut ctx).unwrap();
    assert_eq!(ctx.program_count(), 2);

    rec(&mut ctx).clear_calls();
    ctx.set_pixel_shader(Some(&first_ps)).unwrap();
    draw(&mut ctx).unwrap();
    let r = rec(&mut ctx);
    assert_eq!(r.count(|c| matches!(c, BackendCall::LinkProgram { .. })), 0);
    assert_eq!(r.count(|c| matches!(c, BackendCall::UseProgram(_))), 1);
    assert_eq!(ctx.program_count(), 2);
    assert_eq!(ctx.metrics().pixel_shader_count, 3);
}

#[test]
fn test_link_failure_surfaces_before_drawing() {
    let mut ctx = context();
    ready(&mut ctx);
    rec(&mut ctx).fail_links(Some("varying mismatch"));
    let err = draw(&mut ctx).unwrap_err();
    assert_eq!(err, GfxError::ShaderLink(String::from("varying mismatch")));
    assert_eq!(rec(&mut ctx).count(|c| c.is_draw()), 0);
    assert_eq!(ctx.program_count(), 0);

    rec(&mut ctx).fail_links(None);
    draw(&mut ctx).unwrap();
    assert_eq!(ctx.program_count(), 1);
}

#[test]
fn test_empty_shader_code_fails_to_compile() {
    let mut ctx = context();
    let err = ctx
        .create_shader(&ShaderDesc::new(ShaderStage::Pixel, ShaderProfile::Glsl, ""))
        .unwrap_err();
    assert!(matches!(err, GfxError::ShaderCompile(_)));
}

#[test]
fn test_shader_stage_mismatch_rejected() {
    let mut ctx = context();
    let (vs, ps) = shader_pair(&mut ctx, "ps main");
    assert!(matches!(
        ctx.set_vertex_shader(Some(&ps)),
        Err(GfxError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctx.set_pixel_shader(Some(&vs)),
        Err(GfxError::InvalidOperation(_))
    ));
    assert!(ctx.vertex_shader().is_none());
}

#[test]
fn test_bind_discard_target_clears_once() {
    let mut ctx = context();
    let t = target(&mut ctx, RenderTargetUsage::DiscardContents);
    rec(&mut ctx).clear_calls();
    ctx.set_render_target(Some(&t)).unwrap();
    assert_eq!(rec(&mut ctx).count(|c| c.is_clear()), 1);
    // no depth buffer on the target, only color is cleared
    assert!(rec(&mut ctx).calls().contains(&BackendCall::Clear {
        options: ClearOptions::TARGET,
        color: Color::DISCARD,
        depth: 1.0,
        stencil: 0,
    }));

    // same binding again is a no-op
    rec(&mut ctx).clear_calls();
    ctx.set_render_target(Some(&t)).unwrap();
    assert!(rec(&mut ctx).calls().is_empty());
    assert_eq!(ctx.metrics().target_count, 1);
}

#[test]
fn test_bind_preserved_target_skips_clear() {
    let mut ctx = context();
    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    rec(&mut ctx).clear_calls();
    ctx.set_render_target(Some(&t)).unwrap();
    assert_eq!(rec(&mut ctx).count(|c| c.is_clear()), 0);
    assert!(ctx.dirty().contains(DirtyFlags::RASTERIZER));
    assert_eq!(ctx.viewport(), Viewport::new(0, 0, 256, 128));
    assert_eq!(ctx.scissor_rect(), Rect::new(0, 0, 256, 128));
    assert!(ctx.is_render_target_bound());
}

#[test]
fn test_array_slices_get_their_own_framebuffer() {
    let mut ctx = context();
    let desc = RenderTargetDescriptor {
        texture: TextureDescriptor {
            kind: TextureKind::Texture2DArray,
            width: 64,
            height: 32,
            array_size: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let a = ctx.create_render_target(&desc).unwrap();

    // slice 0, discard usage
    ctx.set_render_target(Some(&a)).unwrap();
    assert_eq!(rec(&mut ctx).count(|c| c.is_clear()), 2);
    assert_eq!(ctx.viewport(), Viewport::new(0, 0, 64, 32));
    let first_fb = rec(&mut ctx)
        .calls()
        .iter()
        .find_map(|c| match c {
            BackendCall::CreateFramebuffer(fb) => Some(*fb),
            _ => None,
        })
        .unwrap();

    // slice 1 of the same resource
    rec(&mut ctx).clear_calls();
    ctx.set_render_target_slice(&a, 1).unwrap();
    assert_eq!(
        rec(&mut ctx).count(|c| matches!(c, BackendCall::CreateFramebuffer(_))),
        1
    );
    // the new surface reissues the rasterizer, here through the discard clear
    assert_eq!(
        rec(&mut ctx).count(|c| matches!(c, BackendCall::SetRasterizerState { .. })),
        1
    );

    // back to slice 0 reuses the first framebuffer
    rec(&mut ctx).clear_calls();
    ctx.set_render_target(Some(&a)).unwrap();
    let r = rec(&mut ctx);
    assert_eq!(r.count(|c| matches!(c, BackendCall::CreateFramebuffer(_))), 0);
    assert!(r.calls().contains(&BackendCall::BindFramebuffer(Some(first_fb))));
    assert_eq!(ctx.framebuffer_cache().draw_len(), 2);
}

#[test]
fn test_msaa_resolve_order_with_scissor() {
    let mut ctx = context();
    let desc = RenderTargetDescriptor {
        texture: TextureDescriptor {
            width: 128,
            height: 64,
            mipmap: true,
            ..Default::default()
        },
        multisample_count: 4,
        ..Default::default()
    };
    let t = ctx.create_render_target(&desc).unwrap();
    assert_eq!(t.multisample_count(), 4);
    assert!(t.color_buffer().is_some());

    let scissored = Arc::new(RasterizerState::new(RasterizerDesc {
        scissor_test_enable: true,
        ..Default::default()
    }));
    ctx.set_rasterizer_state(&scissored).unwrap();
    // the discard clear applies the rasterizer, enabling the scissor test
    ctx.set_render_target(Some(&t)).unwrap();
    assert!(rec(&mut ctx).calls().contains(&BackendCall::SetScissorTest(true)));

    rec(&mut ctx).clear_calls();
    ctx.set_render_target(None).unwrap();
    let r = rec(&mut ctx);
    let pos = |want: &BackendCall| r.position(|c| c == want).unwrap();
    let scissor_off = pos(&BackendCall::SetScissorTest(false));
    let blit = pos(&BackendCall::BlitFramebuffer {
        index: 0,
        width: 128,
        height: 64,
    });
    let invalidate = pos(&BackendCall::InvalidateReadFramebuffer(1));
    let scissor_on = pos(&BackendCall::SetScissorTest(true));
    let mips = pos(&BackendCall::GenerateMipmaps(t.texture().handle()));
    let back = pos(&BackendCall::BindFramebuffer(None));
    let read = r
        .position(|c| matches!(c, BackendCall::BindReadFramebuffer(_)))
        .unwrap();
    assert!(scissor_off < read);
    assert!(read < blit);
    assert!(blit < invalidate);
    assert!(invalidate < scissor_on);
    assert!(scissor_on < mips);
    assert!(mips < back);
    assert_eq!(ctx.framebuffer_cache().resolve_len(), 1);
}

#[test]
fn test_msaa_skipped_without_blit_support() {
    let caps = Capabilities {
        supports_blit_framebuffer: false,
        ..Default::default()
    };
    let mut ctx = context_with(
        RecordingBackend::new().with_capabilities(caps),
        PresentationParameters::default(),
    );
    let desc = RenderTargetDescriptor {
        multisample_count: 4,
        ..RenderTargetDescriptor::new_2d(32, 32)
    };
    let t = ctx.create_render_target(&desc).unwrap();
    ctx.set_render_target(Some(&t)).unwrap();
    rec(&mut ctx).clear_calls();
    ctx.set_render_target(None).unwrap();
    let r = rec(&mut ctx);
    assert_eq!(r.count(|c| matches!(c, BackendCall::BlitFramebuffer { .. })), 0);
}

#[test]
fn test_render_target_validation() {
    let mut ctx = context();
    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    let five: Vec<_> = (0..5).map(|_| RenderTargetBinding::new(t.clone())).collect();
    assert!(matches!(
        ctx.set_render_targets(&five),
        Err(GfxError::ArgumentOutOfRange { .. })
    ));
    assert!(matches!(
        ctx.set_render_target_slice(&t, 1),
        Err(GfxError::ArgumentOutOfRange {
            name: "array_slice",
            ..
        })
    ));
    assert!(!ctx.is_render_target_bound());

    let params = PresentationParameters {
        profile: GraphicsProfile::Reach,
        ..Default::default()
    };
    let mut reach = context_with(RecordingBackend::new(), params);
    let a = target(&mut reach, RenderTargetUsage::PreserveContents);
    let b = target(&mut reach, RenderTargetUsage::PreserveContents);
    let two = [RenderTargetBinding::new(a), RenderTargetBinding::new(b)];
    assert!(matches!(
        reach.set_render_targets(&two),
        Err(GfxError::UnsupportedFeature(_))
    ));
}

#[test]
fn test_multiple_targets_set_draw_buffers() {
    let mut ctx = context();
    let a = target(&mut ctx, RenderTargetUsage::PreserveContents);
    let b = target(&mut ctx, RenderTargetUsage::PreserveContents);
    rec(&mut ctx).clear_calls();
    ctx.set_render_targets(&[RenderTargetBinding::new(a), RenderTargetBinding::new(b)])
        .unwrap();
    assert!(rec(&mut ctx).calls().contains(&BackendCall::SetDrawBuffers(2)));
    assert_eq!(ctx.render_target_count(), 2);
    assert_eq!(ctx.metrics().target_count, 2);
    let mut out = vec![];
    ctx.get_render_targets(&mut out);
    assert_eq!(out.len(), 2);
    ctx.set_render_target(None).unwrap();
    assert_eq!(ctx.metrics().target_count, 3);
}

#[test]
fn test_framebuffer_failure_falls_back_to_back_buffer() {
    let mut ctx = context();
    let t = target(&mut ctx, RenderTargetUsage::DiscardContents);
    rec(&mut ctx).fail_framebuffer_checks(Some("missing attachment"));
    assert!(matches!(
        ctx.set_render_target(Some(&t)),
        Err(GfxError::Backend(_))
    ));
    assert!(!ctx.is_render_target_bound());
    assert_eq!(ctx.viewport(), Viewport::new(0, 0, 800, 600));
    let r = rec(&mut ctx);
    assert_eq!(r.live_framebuffers(), 0);
    assert_eq!(
        r.calls().iter().rev().find(|c| matches!(c, BackendCall::BindFramebuffer(_))),
        Some(&BackendCall::BindFramebuffer(None))
    );
}

#[test]
fn test_primitive_limit_depends_on_profile() {
    let params = PresentationParameters {
        profile: GraphicsProfile::Reach,
        ..Default::default()
    };
    let mut reach = context_with(RecordingBackend::new(), params);
    ready(&mut reach);
    rec(&mut reach).clear_calls();
    let err = reach
        .draw_indexed_primitives(PrimitiveType::TriangleList, 0, 0, 65_536)
        .unwrap_err();
    assert!(matches!(err, GfxError::UnsupportedFeature(_)));
    assert!(rec(&mut reach).calls().is_empty());

    let mut hidef = context();
    ready(&mut hidef);
    let big = hidef
        .create_index_buffer(IndexElementSize::ThirtyTwoBits, 65_536 * 3, BufferUsage::None)
        .unwrap();
    hidef.set_index_buffer(Some(&big)).unwrap();
    hidef
        .draw_indexed_primitives(PrimitiveType::TriangleList, 0, 0, 65_536)
        .unwrap();
    assert_eq!(hidef.metrics().primitive_count, 65_536);
}

#[test]
fn test_draw_preconditions() {
    let mut ctx = context();
    rec(&mut ctx).clear_calls();
    assert!(matches!(draw(&mut ctx), Err(GfxError::InvalidOperation(_))));

    ready(&mut ctx);
    ctx.set_index_buffer(None).unwrap();
    assert!(matches!(draw(&mut ctx), Err(GfxError::InvalidOperation(_))));
    assert!(matches!(
        ctx.draw_primitives(PrimitiveType::TriangleList, 0, 0),
        Err(GfxError::ArgumentOutOfRange { .. })
    ));
    // 64 vertices hold 21 triangles
    assert!(matches!(
        ctx.draw_primitives(PrimitiveType::TriangleList, 0, 22),
        Err(GfxError::ArgumentOutOfRange { .. })
    ));
    assert_eq!(rec(&mut ctx).count(|c| c.is_draw()), 0);

    ctx.draw_primitives(PrimitiveType::TriangleStrip, 2, 10).unwrap();
    assert!(rec(&mut ctx).calls().contains(&BackendCall::DrawArrays {
        primitive: PrimitiveType::TriangleStrip,
        first: 2,
        count: 12,
    }));

    ctx.set_vertex_buffer(None).unwrap();
    assert!(matches!(
        ctx.draw_primitives(PrimitiveType::TriangleList, 0, 1),
        Err(GfxError::InvalidOperation(_))
    ));
}

#[test]
fn test_index_range_checked() {
    let mut ctx = context();
    ready(&mut ctx);
    assert!(matches!(
        ctx.draw_indexed_primitives(PrimitiveType::TriangleList, 0, 90, 3),
        Err(GfxError::ArgumentOutOfRange {
            name: "start_index",
            ..
        })
    ));
}

#[test]
fn test_instancing_checked_before_backend_calls() {
    let caps = Capabilities {
        supports_instancing: false,
        supports_base_index_instancing: false,
        ..Default::default()
    };
    let mut ctx = context_with(
        RecordingBackend::new().with_capabilities(caps),
        PresentationParameters::default(),
    );
    let (vb, _) = ready(&mut ctx);
    let per_instance = ctx
        .create_vertex_buffer(&position_decl(), 4, BufferUsage::None)
        .unwrap();
    ctx.set_vertex_buffers(&[
        VertexBufferBinding::new(vb),
        VertexBufferBinding::instanced(per_instance, 1),
    ])
    .unwrap();
    rec(&mut ctx).clear_calls();
    assert!(matches!(draw(&mut ctx), Err(GfxError::UnsupportedFeature(_))));
    assert!(matches!(
        ctx.draw_instanced_primitives(PrimitiveType::TriangleList, 0, 0, 2, 0, 4),
        Err(GfxError::UnsupportedFeature(_))
    ));
    assert!(rec(&mut ctx).calls().is_empty());
}

#[test]
fn test_instanced_draw() {
    let caps = Capabilities {
        supports_base_index_instancing: false,
        ..Default::default()
    };
    let mut ctx = context_with(
        RecordingBackend::new().with_capabilities(caps),
        PresentationParameters::default(),
    );
    let (vb, _) = ready(&mut ctx);
    let vs = ctx
        .create_shader(
            &ShaderDesc::new(ShaderStage::Vertex, ShaderProfile::Glsl, "vs instanced")
                .with_attribute("a_position", VertexElementUsage::Position, 0)
                .with_attribute("a_offset", VertexElementUsage::TextureCoordinate, 0),
        )
        .unwrap();
    ctx.set_vertex_shader(Some(&vs)).unwrap();
    let offsets = VertexDeclaration::new(vec![VertexElement::new(
        0,
        VertexElementFormat::Vector3,
        VertexElementUsage::TextureCoordinate,
        0,
    )]);
    let per_instance = ctx
        .create_vertex_buffer(&offsets, 4, BufferUsage::None)
        .unwrap();
    ctx.set_vertex_buffers(&[
        VertexBufferBinding::new(vb),
        VertexBufferBinding::instanced(per_instance, 1),
    ])
    .unwrap();
    assert!(matches!(
        ctx.draw_instanced_primitives(PrimitiveType::TriangleList, 0, 0, 2, 1, 4),
        Err(GfxError::UnsupportedFeature(_))
    ));
    ctx.draw_instanced_primitives(PrimitiveType::TriangleList, 0, 0, 2, 0, 4)
        .unwrap();
    let r = rec(&mut ctx);
    assert!(r.calls().contains(&BackendCall::DrawElementsInstanced {
        primitive: PrimitiveType::TriangleList,
        count: 6,
        start_index: 0,
        instance_count: 4,
        base_instance: 0,
    }));
    assert!(r
        .calls()
        .contains(&BackendCall::SetAttribDivisor { location: 0, divisor: 0 }));
    assert!(r
        .calls()
        .contains(&BackendCall::SetAttribDivisor { location: 1, divisor: 1 }));
    assert!(r.calls().contains(&BackendCall::EnableAttrib(1)));
    assert_eq!(ctx.metrics().primitive_count, 8);
}

#[test]
fn test_user_primitives_stream_and_reset_attributes() {
    let mut ctx = context();
    ready(&mut ctx);
    draw(&mut ctx).unwrap();
    rec(&mut ctx).clear_calls();

    let verts: [[f32; 3]; 4] = [[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0; 3]];
    ctx.draw_user_primitives(PrimitiveType::TriangleList, &verts, 1, 1, &position_decl())
        .unwrap();
    let r = rec(&mut ctx);
    assert!(r
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::UploadUserVertices { len: 36, .. })));
    assert!(r.calls().contains(&BackendCall::DrawArrays {
        primitive: PrimitiveType::TriangleList,
        first: 0,
        count: 3,
    }));

    // next buffer draw reissues its layout
    r.clear_calls();
    draw(&mut ctx).unwrap();
    assert_eq!(
        rec(&mut ctx).count(|c| matches!(c, BackendCall::SetAttribPointer(_))),
        1
    );
}

#[test]
fn test_user_primitive_argument_checks() {
    let mut ctx = context();
    ready(&mut ctx);
    let verts = [[0.0f32; 3]; 3];
    assert!(matches!(
        ctx.draw_user_primitives(PrimitiveType::TriangleList, &verts, 3, 1, &position_decl()),
        Err(GfxError::ArgumentOutOfRange {
            name: "vertex_offset",
            ..
        })
    ));
    assert!(matches!(
        ctx.draw_user_primitives(PrimitiveType::TriangleList, &verts, 0, 2, &position_decl()),
        Err(GfxError::ArgumentOutOfRange {
            name: "primitive_count",
            ..
        })
    ));
    let narrow = VertexDeclaration::new(vec![VertexElement::new(
        0,
        VertexElementFormat::Vector2,
        VertexElementUsage::Position,
        0,
    )]);
    assert!(matches!(
        ctx.draw_user_primitives(PrimitiveType::TriangleList, &verts, 0, 1, &narrow),
        Err(GfxError::ArgumentOutOfRange {
            name: "vertex_declaration",
            ..
        })
    ));
}

#[test]
fn test_user_indexed_primitives_rebind_index_buffer_after() {
    let mut ctx = context();
    let (_, ib) = ready(&mut ctx);
    draw(&mut ctx).unwrap();
    rec(&mut ctx).clear_calls();

    let verts = [[0.0f32; 3]; 4];
    let indices: [u16; 6] = [0, 1, 2, 2, 1, 3];
    ctx.draw_user_indexed_primitives(
        PrimitiveType::TriangleList,
        &verts,
        0,
        4,
        &indices,
        0,
        2,
        &position_decl(),
    )
    .unwrap();
    let r = rec(&mut ctx);
    assert!(r
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::UploadUserIndices { len: 12, .. })));
    assert!(r.calls().contains(&BackendCall::DrawElements {
        primitive: PrimitiveType::TriangleList,
        count: 6,
        start_index: 0,
    }));

    r.clear_calls();
    draw(&mut ctx).unwrap();
    assert!(rec(&mut ctx).calls().contains(&BackendCall::BindIndexBuffer {
        buffer: ib.handle(),
        size: IndexElementSize::SixteenBits,
    }));
}

#[test]
fn test_viewport_and_scissor_flip_on_bottom_left_back_buffer() {
    let mut ctx = context();
    ready(&mut ctx);
    ctx.set_viewport(Viewport::new(10, 20, 100, 50));
    assert!(rec(&mut ctx)
        .calls()
        .contains(&BackendCall::SetViewport(Viewport::new(10, 530, 100, 50))));
    assert_eq!(ctx.viewport(), Viewport::new(10, 20, 100, 50));
    assert!(ctx.dirty().contains(DirtyFlags::VERTEX_SHADER));

    ctx.set_scissor_rect(Rect::new(0, 0, 100, 100));
    draw(&mut ctx).unwrap();
    assert!(rec(&mut ctx)
        .calls()
        .contains(&BackendCall::SetScissorRect(Rect::new(0, 500, 100, 100))));
}

#[test]
fn test_top_left_backend_does_not_flip() {
    let mut ctx = context_with(
        RecordingBackend::new().with_convention(CoordinateConvention::TopLeft),
        PresentationParameters::default(),
    );
    ready(&mut ctx);
    ctx.set_viewport(Viewport::new(10, 20, 100, 50));
    assert!(rec(&mut ctx)
        .calls()
        .contains(&BackendCall::SetViewport(Viewport::new(10, 20, 100, 50))));

    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    ctx.set_render_target(Some(&t)).unwrap();
    rec(&mut ctx).clear_calls();
    draw(&mut ctx).unwrap();
    let fixup = rec(&mut ctx).calls().iter().find_map(|c| match c {
        BackendCall::SetPositionFixup { fixup, .. } => Some(*fixup),
        _ => None,
    });
    assert_eq!(fixup, Some([1.0, 1.0, 0.0, 0.0]));
}

#[test]
fn test_offscreen_flips_fixup_and_winding() {
    let params = PresentationParameters {
        use_half_pixel_offset: true,
        ..Default::default()
    };
    let mut ctx = context_with(RecordingBackend::new(), params);
    ready(&mut ctx);
    draw(&mut ctx).unwrap();
    let find_fixup = |r: &RecordingBackend| {
        r.calls().iter().rev().find_map(|c| match c {
            BackendCall::SetPositionFixup { fixup, .. } => Some(*fixup),
            _ => None,
        })
    };
    let find_cull = |r: &RecordingBackend| {
        r.calls().iter().rev().find_map(|c| match c {
            BackendCall::SetRasterizerState { cull, .. } => Some(*cull),
            _ => None,
        })
    };
    let on_screen = find_fixup(rec(&mut ctx)).unwrap();
    assert_eq!(on_screen[1], 1.0);
    assert!((on_screen[2] - (63.0 / 64.0) / 800.0).abs() < 1e-9);
    assert!((on_screen[3] + (63.0 / 64.0) / 600.0).abs() < 1e-9);
    let on_screen_cull = find_cull(rec(&mut ctx)).unwrap();

    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    ctx.set_render_target(Some(&t)).unwrap();
    draw(&mut ctx).unwrap();
    let off_screen = find_fixup(rec(&mut ctx)).unwrap();
    assert_eq!(off_screen[1], -1.0);
    assert!((off_screen[2] - (63.0 / 64.0) / 256.0).abs() < 1e-9);
    assert!((off_screen[3] - (63.0 / 64.0) / 128.0).abs() < 1e-9);
    let off_screen_cull = find_cull(rec(&mut ctx)).unwrap();
    assert!(off_screen_cull.enabled);
    assert_ne!(on_screen_cull.front_face, off_screen_cull.front_face);
}

#[test]
fn test_clear_overrides_then_restores_state() {
    let mut ctx = context();
    let custom_scissor = Rect::new(5, 5, 10, 10);
    ctx.set_scissor_rect(custom_scissor);
    let alpha = BlendState::alpha_blend();
    ctx.set_blend_state(&alpha).unwrap();
    let depth_read = DepthStencilState::depth_read();
    ctx.set_depth_stencil_state(&depth_read).unwrap();
    let clear_state = ctx.clear_depth_stencil_state.id();

    rec(&mut ctx).clear_calls();
    ctx.clear_color(Color::BLACK).unwrap();
    let r = rec(&mut ctx);
    let clear = r.position(|c| c.is_clear()).unwrap();
    let before = &r.calls()[..clear];
    assert!(before.contains(&BackendCall::SetScissorRect(Rect::new(0, 0, 800, 600))));
    assert!(before.contains(&BackendCall::SetDepthStencilState(clear_state)));
    assert!(before
        .iter()
        .any(|c| matches!(c, BackendCall::SetBlendState(_))));

    assert_eq!(ctx.scissor_rect(), custom_scissor);
    assert!(Arc::ptr_eq(ctx.blend_state(), &alpha));
    assert!(Arc::ptr_eq(ctx.depth_stencil_state(), &depth_read));
    assert!(ctx.dirty().contains(DirtyFlags::BLEND));
    assert_eq!(ctx.metrics().clear_count, 2);
}

#[test]
fn test_clear_drops_planes_the_surface_lacks() {
    let params = PresentationParameters {
        depth_stencil_format: DepthFormat::Depth24,
        ..Default::default()
    };
    let mut ctx = context_with(RecordingBackend::new(), params);
    rec(&mut ctx).clear_calls();
    ctx.clear(ClearOptions::all(), Color::WHITE, 0.5, 3).unwrap();
    assert!(rec(&mut ctx).calls().contains(&BackendCall::Clear {
        options: ClearOptions::TARGET | ClearOptions::DEPTH_BUFFER,
        color: Color::WHITE,
        depth: 0.5,
        stencil: 3,
    }));
}

#[test]
fn test_custom_state_belongs_to_first_device() {
    let mut a = context();
    let mut b = context();
    let custom = Arc::new(BlendState::new(BlendDesc::default()));
    a.set_blend_state(&custom).unwrap();
    let err = b.set_blend_state(&custom).unwrap_err();
    assert!(matches!(err, GfxError::InvalidOperation(_)));
    assert!(Arc::ptr_eq(b.blend_state(), &BlendState::opaque()));

    // presets are cloned per device, both contexts can use them
    a.set_blend_state(&BlendState::additive()).unwrap();
    b.set_blend_state(&BlendState::additive()).unwrap();
    let sampler = Arc::new(SamplerState::new(Default::default()));
    a.set_sampler_state(0, &sampler).unwrap();
    assert!(b.set_sampler_state(0, &sampler).is_err());
}

#[test]
fn test_unsupported_state_leaves_previous() {
    let caps = Capabilities {
        supports_separate_blend_states: false,
        supports_depth_clamp: false,
        ..Default::default()
    };
    let mut ctx = context_with(
        RecordingBackend::new().with_capabilities(caps),
        PresentationParameters::default(),
    );
    let independent = Arc::new(BlendState::new(BlendDesc {
        independent_blend_enable: true,
        ..Default::default()
    }));
    assert!(matches!(
        ctx.set_blend_state(&independent),
        Err(GfxError::UnsupportedFeature(_))
    ));
    assert!(Arc::ptr_eq(ctx.blend_state(), &BlendState::opaque()));
    // a rejected state isn't bound to this device
    assert_eq!(independent.meta().device(), None);

    let unclipped = Arc::new(RasterizerState::new(RasterizerDesc {
        depth_clip_enable: false,
        ..Default::default()
    }));
    assert!(matches!(
        ctx.set_rasterizer_state(&unclipped),
        Err(GfxError::UnsupportedFeature(_))
    ));
    assert!(Arc::ptr_eq(
        ctx.rasterizer_state(),
        &RasterizerState::cull_counter_clockwise()
    ));
}

#[test]
fn test_textures_bound_on_draw_and_after_target_change() {
    let mut ctx = context();
    ready(&mut ctx);
    let tex = ctx
        .create_texture(&TextureDescriptor {
            width: 16,
            height: 16,
            ..Default::default()
        })
        .unwrap();
    ctx.set_texture(0, Some(&tex)).unwrap();
    draw(&mut ctx).unwrap();
    let bind = BackendCall::BindTexture {
        stage: ShaderStage::Pixel,
        slot: 0,
        texture: Some(tex.handle()),
    };
    assert!(rec(&mut ctx).calls().contains(&bind));
    assert_eq!(ctx.metrics().texture_count, 1);

    rec(&mut ctx).clear_calls();
    draw(&mut ctx).unwrap();
    assert!(!rec(&mut ctx).calls().contains(&bind));

    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    ctx.set_render_target(Some(&t)).unwrap();
    rec(&mut ctx).clear_calls();
    draw(&mut ctx).unwrap();
    assert!(rec(&mut ctx).calls().contains(&bind));
}

#[test]
fn test_texture_data_checks() {
    let mut ctx = context();
    let tex = ctx
        .create_texture(&TextureDescriptor {
            width: 8,
            height: 4,
            mipmap: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(tex.level_count(), 4);
    ctx.set_texture_data(&tex, 1, 0, None, &[0u8; 4 * 2 * 4]).unwrap();
    assert!(matches!(
        ctx.set_texture_data(&tex, 4, 0, None, &[]),
        Err(GfxError::ArgumentOutOfRange { name: "level", .. })
    ));
    assert!(matches!(
        ctx.set_texture_data(&tex, 0, 0, None, &[0u8; 16]),
        Err(GfxError::ArgumentOutOfRange { name: "data", .. })
    ));
}

#[test]
fn test_buffer_data_checks() {
    let mut ctx = context();
    let vb = ctx
        .create_vertex_buffer(&position_decl(), 4, BufferUsage::WriteOnly)
        .unwrap();
    ctx.set_vertex_data(&vb, 1, &[[0.0f32; 3]; 3]).unwrap();
    assert!(rec(&mut ctx).calls().contains(&BackendCall::WriteBuffer {
        buffer: vb.handle(),
        offset: 12,
        len: 36,
    }));
    assert!(ctx.set_vertex_data(&vb, 2, &[[0.0f32; 3]; 3]).is_err());

    let ib = ctx
        .create_index_buffer(IndexElementSize::SixteenBits, 6, BufferUsage::None)
        .unwrap();
    assert!(matches!(
        ctx.set_index_data(&ib, 0, &[0u32; 3]),
        Err(GfxError::InvalidOperation(_))
    ));
    ctx.set_index_data(&ib, 3, &[0u16; 3]).unwrap();
}

#[test]
fn test_present_resets_metrics() {
    let mut ctx = context();
    ready(&mut ctx);
    draw(&mut ctx).unwrap();
    assert_eq!(ctx.metrics().draw_count, 1);
    ctx.present().unwrap();
    assert_eq!(ctx.metrics(), GraphicsMetrics::default());
    assert!(rec(&mut ctx).calls().contains(&BackendCall::Present));
}

#[test]
fn test_present_with_target_bound_fails() {
    let mut ctx = context();
    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    ctx.set_render_target(Some(&t)).unwrap();
    assert!(matches!(ctx.present(), Err(GfxError::InvalidOperation(_))));
    assert!(!rec(&mut ctx).calls().contains(&BackendCall::Present));
}

#[test]
fn test_device_lost_until_reset() {
    let mut ctx = context();
    ready(&mut ctx);
    draw(&mut ctx).unwrap();
    rec(&mut ctx).queue_present_error(PresentError::DeviceLost);
    assert_eq!(ctx.present(), Err(GfxError::DeviceLost));
    assert!(ctx.is_lost());
    assert_eq!(draw(&mut ctx), Err(GfxError::DeviceLost));
    assert_eq!(ctx.clear_color(Color::BLACK), Err(GfxError::DeviceLost));

    rec(&mut ctx).clear_calls();
    ctx.reset().unwrap();
    assert!(!ctx.is_lost());
    assert_eq!(ctx.program_count(), 0);
    assert_eq!(ctx.dirty() & DirtyFlags::VERTEX_SHADER, DirtyFlags::VERTEX_SHADER);
    let r = rec(&mut ctx);
    assert!(r.calls().contains(&BackendCall::BindFramebuffer(None)));
    assert!(r.calls().iter().any(|c| matches!(c, BackendCall::DestroyProgram(_))));

    draw(&mut ctx).unwrap();
    assert!(rec(&mut ctx)
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::LinkProgram { .. })));
}

#[test]
fn test_fatal_present_is_backend_error() {
    let mut ctx = context();
    rec(&mut ctx).queue_present_error(PresentError::Fatal(String::from("swapchain gone")));
    assert_eq!(
        ctx.present(),
        Err(GfxError::Backend(String::from("swapchain gone")))
    );
    assert!(!ctx.is_lost());
}

#[test]
fn test_reset_rebinds_current_target() {
    let mut ctx = context();
    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    ctx.set_render_target(Some(&t)).unwrap();
    rec(&mut ctx).clear_calls();
    ctx.reset().unwrap();
    assert!(ctx.is_render_target_bound());
    let r = rec(&mut ctx);
    assert_eq!(r.count(|c| matches!(c, BackendCall::CreateFramebuffer(_))), 1);
    assert!(r
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::BindFramebuffer(Some(_)))));
}

#[test]
fn test_destroy_render_target_purges_framebuffers() {
    let mut ctx = context();
    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    ctx.set_render_target(Some(&t)).unwrap();
    assert!(matches!(
        ctx.destroy_render_target(&t),
        Err(GfxError::InvalidOperation(_))
    ));
    ctx.set_render_target(None).unwrap();
    ctx.set_texture(0, Some(t.texture())).unwrap();
    assert_eq!(ctx.framebuffer_cache().draw_len(), 1);

    ctx.destroy_render_target(&t).unwrap();
    assert_eq!(ctx.framebuffer_cache().draw_len(), 0);
    assert!(t.is_disposed());
    assert!(ctx.textures().get(0).is_none());
    let r = rec(&mut ctx);
    assert_eq!(r.live_framebuffers(), 0);
    assert!(r
        .calls()
        .contains(&BackendCall::DestroyTexture(t.texture().handle())));
    assert!(matches!(
        ctx.set_render_target(Some(&t)),
        Err(GfxError::InvalidOperation(_))
    ));
}

#[test]
fn test_shared_depth_stencil_renderbuffer_destroyed_once() {
    let mut ctx = context();
    let desc = RenderTargetDescriptor {
        depth_format: DepthFormat::Depth24Stencil8,
        ..RenderTargetDescriptor::new_2d(32, 32)
    };
    let t = ctx.create_render_target(&desc).unwrap();
    assert_eq!(t.depth_buffer(), t.stencil_buffer());
    let rb = t.depth_buffer().unwrap();
    ctx.destroy_render_target(&t).unwrap();
    assert_eq!(
        rec(&mut ctx).count(|c| *c == BackendCall::DestroyRenderbuffer(rb)),
        1
    );
}

#[test]
fn test_destroy_shader_purges_programs() {
    let mut ctx = context();
    ready(&mut ctx);
    draw(&mut ctx).unwrap();
    let ps = ctx.pixel_shader().cloned().unwrap();
    ctx.destroy_shader(&ps);
    assert_eq!(ctx.program_count(), 0);
    assert!(ctx.pixel_shader().is_none());
    assert!(rec(&mut ctx)
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::DestroyProgram(_))));
    assert!(matches!(draw(&mut ctx), Err(GfxError::InvalidOperation(_))));
}

#[test]
fn test_destroyed_buffers_are_unbound() {
    let mut ctx = context();
    let (vb, ib) = ready(&mut ctx);
    ctx.destroy_vertex_buffer(&vb).unwrap();
    ctx.destroy_index_buffer(&ib);
    assert_eq!(ctx.vertex_buffers().count(), 0);
    assert!(ctx.index_buffer().is_none());
    assert!(matches!(
        ctx.set_vertex_buffer(Some(&vb)),
        Err(GfxError::InvalidOperation(_))
    ));
    ctx.destroy_vertex_buffer(&vb).unwrap();
    assert_eq!(
        rec(&mut ctx).count(|c| *c == BackendCall::DestroyBuffer(vb.handle())),
        1
    );
}

#[test]
fn test_read_back_buffer() {
    let mut ctx = context();
    let mut px = [0u8; 2 * 2 * 4];
    ctx.read_back_buffer(Some(Rect::new(0, 0, 2, 2)), &mut px).unwrap();
    let d = Color::DISCARD;
    assert_eq!(&px[..4], &[d.r, d.g, d.b, d.a]);
    assert!(matches!(
        ctx.read_back_buffer(Some(Rect::new(799, 0, 2, 2)), &mut px),
        Err(GfxError::ArgumentOutOfRange { .. })
    ));

    let t = target(&mut ctx, RenderTargetUsage::PreserveContents);
    ctx.set_render_target(Some(&t)).unwrap();
    assert!(matches!(
        ctx.read_back_buffer(Some(Rect::new(0, 0, 2, 2)), &mut px),
        Err(GfxError::InvalidOperation(_))
    ));
}

#[test]
fn test_render_target_format_negotiation() {
    let params = PresentationParameters {
        profile: GraphicsProfile::Reach,
        ..Default::default()
    };
    let mut ctx = context_with(RecordingBackend::new(), params);
    let desc = RenderTargetDescriptor {
        multisample_count: 4,
        ..RenderTargetDescriptor::new_2d(16, 16)
    };
    let t = ctx.create_render_target(&desc).unwrap();
    assert_eq!(t.multisample_count(), 0);
    assert!(t.color_buffer().is_none());
}

#[test]
fn test_contexts_share_sync_handle() {
    let sync = SyncHandle::new();
    let a = GraphicsContext::with_sync_handle(
        Box::new(RecordingBackend::new()),
        PresentationParameters::default(),
        sync.clone(),
    )
    .unwrap();
    let b = GraphicsContext::with_sync_handle(
        Box::new(RecordingBackend::new()),
        PresentationParameters::default(),
        sync.clone(),
    )
    .unwrap();
    assert!(a.sync_handle().same_as(b.sync_handle()));
    assert_ne!(a.device_id(), b.device_id());
}

#[test]
fn test_from_config() {
    let config = GraphicsConfig::from_toml_str("profile = \"Reach\"\nmultisample_count = 4").unwrap();
    let ctx = GraphicsContext::from_config(Box::new(RecordingBackend::new()), &config).unwrap();
    assert_eq!(ctx.graphics_profile(), GraphicsProfile::Reach);
    assert_eq!(ctx.presentation_parameters().multisample_count, 0);
    assert_eq!(ctx.capabilities().max_render_targets, 4);
}

#[test]
fn test_destroy_vertex_buffer_keeps_lower_slots() {
    let mut ctx = context();
    let (vb, _) = ready(&mut ctx);
    let other = ctx
        .create_vertex_buffer(&position_decl(), 8, BufferUsage::None)
        .unwrap();
    ctx.set_vertex_buffers(&[
        VertexBufferBinding::new(vb.clone()),
        VertexBufferBinding::new(other.clone()),
    ])
    .unwrap();
    ctx.destroy_vertex_buffer(&other).unwrap();
    assert_eq!(ctx.vertex_buffers().count(), 1);
    assert!(Arc::ptr_eq(&ctx.vertex_buffers().get(0).unwrap().buffer, &vb));
    assert!(other.is_disposed());

    // slot 0 can't go away while slot 1 stays bound
    let other = ctx
        .create_vertex_buffer(&position_decl(), 8, BufferUsage::None)
        .unwrap();
    ctx.set_vertex_buffers(&[
        VertexBufferBinding::new(vb.clone()),
        VertexBufferBinding::new(other.clone()),
    ])
    .unwrap();
    rec(&mut ctx).clear_calls();
    assert!(matches!(
        ctx.destroy_vertex_buffer(&vb),
        Err(GfxError::InvalidOperation(_))
    ));
    assert!(!vb.is_disposed());
    assert_eq!(ctx.vertex_buffers().count(), 2);
    assert!(rec(&mut ctx).calls().is_empty());
    assert!(draw(&mut ctx).is_ok());
}

#[test]
fn test_range_checks_reject_overflow() {
    let mut ctx = context();
    let (vb, ib) = ready(&mut ctx);
    let tex = ctx
        .create_texture(&TextureDescriptor {
            width: 16,
            height: 16,
            ..Default::default()
        })
        .unwrap();
    rec(&mut ctx).clear_calls();

    let out_of_range = |r: GfxResult<()>| matches!(r, Err(GfxError::ArgumentOutOfRange { .. }));
    assert!(out_of_range(ctx.draw_primitives(
        PrimitiveType::TriangleList,
        usize::MAX,
        1
    )));
    assert!(out_of_range(ctx.draw_indexed_primitives(
        PrimitiveType::TriangleList,
        0,
        usize::MAX - 2,
        1
    )));
    assert!(out_of_range(ctx.draw_instanced_primitives(
        PrimitiveType::TriangleList,
        0,
        usize::MAX,
        1,
        0,
        2
    )));
    assert!(out_of_range(ctx.draw_indexed_primitives(
        PrimitiveType::TriangleList,
        usize::MAX,
        0,
        1
    )));
    let verts = [[0.0f32; 3]; 4];
    let indices = [0u16, 1, 2];
    assert!(out_of_range(ctx.draw_user_indexed_primitives(
        PrimitiveType::TriangleList,
        &verts,
        1,
        usize::MAX,
        &indices,
        0,
        1,
        &position_decl()
    )));
    let mut px = [0u8; 4];
    assert!(out_of_range(
        ctx.read_back_buffer(Some(Rect::new(i32::MAX, 0, 1, 1)), &mut px)
    ));
    assert!(out_of_range(
        ctx.read_back_buffer(Some(Rect::new(0, 1, 1, i32::MAX)), &mut px)
    ));
    assert!(out_of_range(ctx.set_index_data(&ib, usize::MAX, &[0u16])));
    assert!(out_of_range(ctx.set_vertex_data(&vb, usize::MAX, &verts)));
    assert!(out_of_range(ctx.set_vertex_data(&vb, usize::MAX / 12, &verts)));
    assert!(out_of_range(ctx.set_texture_data(
        &tex,
        0,
        0,
        Some(Rect::new(i32::MAX, 0, 1, 1)),
        &[0u8; 4]
    )));
    assert!(matches!(
        ctx.create_vertex_buffer(&position_decl(), usize::MAX, BufferUsage::None),
        Err(GfxError::ArgumentOutOfRange { .. })
    ));
    assert!(matches!(
        ctx.create_index_buffer(IndexElementSize::ThirtyTwoBits, usize::MAX, BufferUsage::None),
        Err(GfxError::ArgumentOutOfRange { .. })
    ));
    assert!(rec(&mut ctx).calls().is_empty());
    assert_eq!(ctx.metrics().draw_count, 0);
}

#[test]
fn test_backend_draw_failure_is_returned() {
    let mut ctx = context();
    ready(&mut ctx);
    rec(&mut ctx).fail_draws(Some("pipeline validation failed"));
    assert!(matches!(draw(&mut ctx), Err(GfxError::Backend(_))));
    assert!(matches!(
        ctx.draw_primitives(PrimitiveType::TriangleList, 0, 2),
        Err(GfxError::Backend(_))
    ));
    let m = ctx.metrics();
    assert_eq!(m.draw_count, 0);
    assert_eq!(m.primitive_count, 0);
    assert_eq!(
        rec(&mut ctx).count(|c| matches!(
            c,
            BackendCall::DrawArrays { .. } | BackendCall::DrawElements { .. }
        )),
        0
    );

    rec(&mut ctx).fail_draws(None);
    draw(&mut ctx).unwrap();
    assert_eq!(ctx.metrics().draw_count, 1);
    assert_eq!(ctx.metrics().primitive_count, 2);
}

#[test]
fn test_msaa_resolved_before_next_target_bound() {
    let mut ctx = context();
    let desc = RenderTargetDescriptor {
        multisample_count: 4,
        ..RenderTargetDescriptor::new_2d(64, 32)
    };
    let a = ctx.create_render_target(&desc).unwrap();
    let b = target(&mut ctx, RenderTargetUsage::PreserveContents);
    ctx.set_render_target(Some(&a)).unwrap();

    rec(&mut ctx).clear_calls();
    ctx.set_render_target(Some(&b)).unwrap();
    let r = rec(&mut ctx);
    let created: Vec<FramebufferHandle> = r
        .calls()
        .iter()
        .filter_map(|c| match c {
            BackendCall::CreateFramebuffer(fb) => Some(*fb),
            _ => None,
        })
        .collect();
    // resolve framebuffer of a, then the draw framebuffer of b
    assert_eq!(created.len(), 2);
    let (resolve_fb, fb_b) = (created[0], created[1]);
    let blit = r
        .position(|c| {
            *c == BackendCall::BlitFramebuffer {
                index: 0,
                width: 64,
                height: 32,
            }
        })
        .unwrap();
    let bind_resolve = r
        .position(|c| *c == BackendCall::BindFramebuffer(Some(resolve_fb)))
        .unwrap();
    let bind_b = r
        .position(|c| *c == BackendCall::BindFramebuffer(Some(fb_b)))
        .unwrap();
    assert!(bind_resolve < blit);
    assert!(blit < bind_b);
    assert_eq!(ctx.render_target_count(), 1);
    assert!(Arc::ptr_eq(&ctx.render_targets()[0].target, &b));
}
