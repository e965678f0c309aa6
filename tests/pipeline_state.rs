mod common;

use glam::Vec3;
use statecore::renderer::device::{
    BlendDesc, CullMode, DepthStencilDesc, FillMode, RawView, SamplerDesc, ShaderStage, Viewport,
};
use statecore::renderer::{
    DefaultRasterizerState, DeviceCall, HeadlessDevice, RenderTargetId, Renderer, SamplerId,
    ShaderDesc, ShaderId, TextureId, Topology, MAX_RENDER_TARGETS,
};

use common::*;

/// Call kinds only, for checking the order of an apply.
fn kinds(calls: &[DeviceCall]) -> Vec<&'static str> {
    calls
        .iter()
        .map(|call| match call {
            DeviceCall::SetVertexBuffer { .. } => "vertex buffer",
            DeviceCall::SetIndexBuffer(_) => "index buffer",
            DeviceCall::SetInputLayout(_) => "input layout",
            DeviceCall::SetShader { .. } => "shader",
            DeviceCall::WriteBuffer { .. } => "write",
            DeviceCall::SetConstantBuffer { .. } => "constant buffer",
            DeviceCall::SetTexture { .. } => "texture",
            DeviceCall::SetSampler { .. } => "sampler",
            DeviceCall::SetViewport(_) => "viewport",
            DeviceCall::SetRasterizerState(_) => "rasterizer",
            DeviceCall::SetBlendState(_) => "blend",
            DeviceCall::SetRenderTargets { .. } => "targets",
            DeviceCall::SetDepthStencilState(_) => "depth stencil",
            DeviceCall::SetTopology(_) => "topology",
            DeviceCall::Draw { .. } => "draw",
            DeviceCall::DrawIndexed { .. } => "draw indexed",
            DeviceCall::ClearRenderTarget { .. } => "clear color",
            DeviceCall::ClearDepthStencil { .. } => "clear depth",
            DeviceCall::Present { .. } => "present",
        })
        .collect()
}

fn texture_calls(calls: &[DeviceCall]) -> Vec<(ShaderStage, u32, Option<RawView>)> {
    calls
        .iter()
        .filter_map(|call| match call {
            DeviceCall::SetTexture { stage, slot, view } => Some((*stage, *slot, *view)),
            _ => None,
        })
        .collect()
}

/// Renderer with the colored shader active and the triangle bound.
fn ready() -> (Renderer<HeadlessDevice>, ShaderId) {
    let mut renderer = renderer();
    let shader = renderer.create_shader(colored_shader("Colored"));
    let buffer = triangle(&mut renderer);
    renderer.set_shader(shader);
    renderer.set_buffer_obj(buffer);
    renderer.device_mut().clear_calls();
    (renderer, shader)
}

fn line_shader() -> ShaderDesc {
    ShaderDesc {
        input_layout: Vec::new(),
        ..ShaderDesc::new("Line")
            .with_stage(ShaderStage::Vertex, VS)
            .with_stage(ShaderStage::Pixel, PS)
            .with_constant_buffer(
                "LineParams",
                ShaderStage::Vertex,
                0,
                &[("view_proj", 64), ("p1", 12), ("p2", 12), ("color", 12)],
            )
    }
}

#[test]
fn apply_without_shader_logs_and_issues_nothing() {
    capture_logs();
    let mut renderer = renderer();
    renderer.device_mut().clear_calls();

    renderer.apply();

    assert_eq!(errors(), ["Renderer::apply() : Shader null"]);
    assert!(renderer.device().calls().is_empty());
}

#[test]
fn apply_commits_state_in_order() {
    capture_logs();
    let (mut renderer, _) = ready();
    let texture = renderer.create_texture_2d(&sampled_texture("albedo", 4));
    let sampler = renderer.create_sampler_state(&SamplerDesc::default());
    renderer.set_constant_3f("color", Vec3::ONE);
    renderer.set_texture("tex", texture);
    renderer.set_sampler_state("tex_sampler", sampler);

    renderer.apply();

    let mut expected = vec!["vertex buffer", "index buffer", "input layout"];
    expected.extend(std::iter::repeat("shader").take(ShaderStage::COUNT));
    expected.extend([
        "write",
        "constant buffer",
        "texture",
        "sampler",
        "viewport",
        "rasterizer",
        "targets",
        "depth stencil",
    ]);
    assert_eq!(kinds(renderer.device().calls()), expected);
    assert!(errors().is_empty(), "unexpected errors: {:?}", errors());
}

#[test]
fn apply_binds_every_stage_of_the_shader() {
    let (mut renderer, shader) = ready();
    renderer.apply();

    let stages: Vec<_> = renderer
        .device()
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::SetShader { stage, shader } => Some((*stage, *shader)),
            _ => None,
        })
        .collect();
    let program = renderer.get_shader(shader);
    assert_eq!(stages.len(), ShaderStage::COUNT);
    for (stage, raw) in stages {
        assert_eq!(raw, program.stage(stage));
    }
    assert!(program.stage(ShaderStage::Geometry).is_none());
}

#[test]
fn switching_shaders_unbinds_the_previous_textures() {
    let mut renderer = renderer();
    let a = renderer.create_shader(colored_shader("A"));
    let b = renderer.create_shader(colored_shader("B"));

    renderer.set_shader(a);
    assert!(renderer.device().calls().is_empty());
    renderer.set_shader(a);
    assert!(renderer.device().calls().is_empty());

    renderer.set_shader(b);
    assert_eq!(
        renderer.device().calls(),
        [
            DeviceCall::SetTexture {
                stage: ShaderStage::Pixel,
                slot: 0,
                view: None
            },
            DeviceCall::SetRenderTargets {
                targets: Vec::new(),
                depth_stencil: None
            },
            DeviceCall::SetBlendState(None),
        ]
    );
    assert_eq!(renderer.active_shader(), b);
}

#[test]
fn queued_textures_are_bound_in_order_and_drained() {
    let (mut renderer, _) = ready();
    let first = renderer.create_texture_2d(&sampled_texture("first", 4));
    let second = renderer.create_texture_2d(&sampled_texture("second", 4));
    let first_view = renderer.get_texture_object(first).view;
    let second_view = renderer.get_texture_object(second).view;

    renderer.set_texture("tex", first);
    renderer.set_texture("tex", second);
    renderer.apply();
    assert_eq!(
        texture_calls(&renderer.device_mut().take_calls()),
        [
            (ShaderStage::Pixel, 0, first_view),
            (ShaderStage::Pixel, 0, second_view)
        ]
    );

    renderer.apply();
    assert!(texture_calls(renderer.device().calls()).is_empty());
}

#[test]
fn texture_shared_by_two_stages_binds_both() {
    let mut renderer = renderer();
    let desc = ShaderDesc::new("Displaced")
        .with_stage(ShaderStage::Vertex, VS)
        .with_stage(ShaderStage::Pixel, PS)
        .with_texture("height", ShaderStage::Vertex, 1)
        .with_texture("height", ShaderStage::Pixel, 2);
    let shader = renderer.create_shader(desc);
    let texture = renderer.create_texture_2d(&sampled_texture("heightmap", 16));
    let view = renderer.get_texture_object(texture).view;
    renderer.set_shader(shader);
    renderer.device_mut().clear_calls();

    renderer.set_texture("height", texture);
    renderer.apply();

    assert_eq!(
        texture_calls(renderer.device().calls()),
        [(ShaderStage::Vertex, 1, view), (ShaderStage::Pixel, 2, view)]
    );
}

#[test]
fn invalid_ids_unbind_the_slot() {
    capture_logs();
    let (mut renderer, _) = ready();
    renderer.set_texture("tex", TextureId::INVALID);
    renderer.set_sampler_state("tex_sampler", SamplerId::INVALID);
    renderer.apply();

    let calls = renderer.device().calls();
    assert_eq!(texture_calls(calls), [(ShaderStage::Pixel, 0, None)]);
    assert!(calls.contains(&DeviceCall::SetSampler {
        stage: ShaderStage::Pixel,
        slot: 0,
        sampler: None
    }));
    assert!(errors().is_empty());
    assert!(logged(log::Level::Warn).is_empty());
}

#[test]
fn unknown_binding_names_log_once_and_queue_nothing() {
    capture_logs();
    let (mut renderer, _) = ready();
    let texture = renderer.create_texture_2d(&sampled_texture("albedo", 4));

    renderer.set_texture("normal_map", texture);
    assert_eq!(errors().len(), 1);
    renderer.set_sampler_state("normal_sampler", SamplerId::INVALID);
    assert_eq!(errors().len(), 2);

    renderer.apply();
    assert!(texture_calls(renderer.device().calls()).is_empty());
}

#[test]
fn render_target_texture_can_be_sampled() {
    let (mut renderer, _) = ready();
    let target = renderer.add_render_target(&color_target("gbuffer"));
    let texture = renderer.render_target_texture(target);
    let raw = renderer.get_texture_object(texture).texture;

    renderer.set_texture("tex", texture);
    renderer.apply();

    let bound = texture_calls(renderer.device().calls());
    let view = bound[0].2.unwrap();
    assert_eq!(renderer.device().view_texture(view), Some(raw));
}

#[test]
fn blend_state_is_only_set_when_enabled() {
    let (mut renderer, _) = ready();
    let is_blend = |call: &DeviceCall| matches!(call, DeviceCall::SetBlendState(_));

    renderer.apply();
    assert!(!renderer.device_mut().take_calls().iter().any(is_blend));

    renderer.enable_blending(true);
    renderer.apply();
    let calls = renderer.device_mut().take_calls();
    assert_eq!(calls.iter().filter(|c| is_blend(c)).count(), 1);
    assert!(!calls.contains(&DeviceCall::SetBlendState(None)));
}

#[test]
fn selected_states_reach_the_device() {
    let (mut renderer, _) = ready();
    let rasterizer = renderer.add_rasterizer_state(CullMode::Front, FillMode::Wireframe, true);
    let blend = renderer.add_blend_state(&BlendDesc {
        enabled: true,
        ..BlendDesc::default()
    });
    let depth = renderer.add_depth_stencil_state(&DepthStencilDesc {
        depth_write: false,
        ..DepthStencilDesc::default()
    });
    renderer.set_rasterizer_state(rasterizer);
    renderer.set_blend_state(blend);
    renderer.set_depth_stencil_state(depth);
    renderer.enable_blending(true);

    renderer.apply();

    let states: Vec<_> = renderer
        .device()
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::SetRasterizerState(raw)
            | DeviceCall::SetDepthStencilState(raw)
            | DeviceCall::SetBlendState(Some(raw)) => Some(*raw),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        [
            renderer.get_rasterizer_state(rasterizer).state,
            renderer.get_blend_state(blend).state,
            renderer.get_depth_stencil_state(depth).state,
        ]
    );
    assert_ne!(
        states[0],
        renderer
            .get_rasterizer_state(DefaultRasterizerState::CullBack.id())
            .state
    );
}

#[test]
fn binding_a_single_target_replaces_the_list() {
    let (mut renderer, _) = ready();
    let albedo = renderer.add_render_target(&color_target("albedo"));
    let normals = renderer.add_render_target(&color_target("normals"));

    renderer.bind_render_targets(&[albedo, normals]);
    renderer.apply();
    let targets = |calls: Vec<DeviceCall>| -> Vec<RawView> {
        calls
            .into_iter()
            .find_map(|call| match call {
                DeviceCall::SetRenderTargets { targets, .. } => Some(targets),
                _ => None,
            })
            .unwrap()
    };
    assert_eq!(targets(renderer.device_mut().take_calls()).len(), 2);

    renderer.bind_render_target(normals);
    renderer.apply();
    let bound = targets(renderer.device_mut().take_calls());
    assert_eq!(bound.len(), 1);
    let normals_texture = renderer.get_texture_object(renderer.render_target_texture(normals));
    assert_eq!(renderer.device().view_texture(bound[0]), Some(normals_texture.texture));
}

#[test]
fn unbinding_leaves_no_targets_or_depth() {
    let (mut renderer, _) = ready();
    renderer.unbind_render_target();
    renderer.unbind_depth_stencil();
    renderer.apply();
    assert!(renderer.device().calls().contains(&DeviceCall::SetRenderTargets {
        targets: Vec::new(),
        depth_stencil: None
    }));
}

#[test]
#[should_panic(expected = "at most 8")]
fn more_than_eight_targets_panics() {
    let mut renderer = renderer();
    let main = renderer.main_render_target();
    renderer.bind_render_targets(&[main; MAX_RENDER_TARGETS + 1]);
}

#[test]
#[should_panic(expected = "out of range")]
fn binding_an_unknown_target_panics() {
    let mut renderer = renderer();
    renderer.bind_render_target(RenderTargetId::new(7));
}

#[test]
#[should_panic(expected = "out of range")]
fn selecting_an_unknown_shader_panics() {
    let mut renderer = renderer();
    renderer.set_shader(ShaderId::new(3));
}

#[test]
fn viewport_is_committed_on_apply() {
    let (mut renderer, _) = ready();
    renderer.apply();
    assert!(renderer
        .device_mut()
        .take_calls()
        .contains(&DeviceCall::SetViewport(Viewport::from_size(320, 240))));

    renderer.set_viewport(100, 50);
    renderer.apply();
    assert!(renderer
        .device()
        .calls()
        .contains(&DeviceCall::SetViewport(Viewport::from_size(100, 50))));
}

#[test]
fn full_viewport_description_is_passed_through() {
    let (mut renderer, _) = ready();
    let viewport = Viewport {
        x: 16.0,
        y: 8.0,
        min_depth: 0.25,
        ..Viewport::from_size(64, 32)
    };
    renderer.set_viewport_desc(viewport);
    renderer.apply();
    assert!(renderer
        .device()
        .calls()
        .contains(&DeviceCall::SetViewport(viewport)));
}

#[test]
fn begin_clears_bound_targets_and_depth() {
    let (mut renderer, _) = ready();
    let gbuffer = renderer.add_render_target(&color_target("gbuffer"));
    let main = renderer.main_render_target();
    renderer.bind_render_targets(&[main, gbuffer]);

    renderer.begin([0.1, 0.2, 0.3, 1.0], 1.0);
    assert_eq!(
        kinds(&renderer.device_mut().take_calls()),
        ["clear color", "clear color", "clear depth"]
    );

    renderer.unbind_depth_stencil();
    renderer.begin([0.0; 4], 1.0);
    let calls = renderer.device().calls();
    assert_eq!(kinds(calls), ["clear color", "clear color"]);
    assert!(matches!(
        calls[0],
        DeviceCall::ClearRenderTarget { color, .. } if color == [0.0; 4]
    ));
}

#[test]
fn end_presents_and_counts_frames() {
    let mut renderer = renderer();
    renderer.device_mut().clear_calls();
    renderer.end();
    renderer.end();
    assert_eq!(renderer.frame_count(), 2);
    assert_eq!(
        renderer.device().calls(),
        [DeviceCall::Present { vsync: true }, DeviceCall::Present { vsync: true }]
    );
}

#[test]
fn draws_use_the_active_buffer_counts() {
    let (mut renderer, _) = ready();
    renderer.draw(Topology::LineStrip);
    renderer.draw_indexed(Topology::TriangleStrip);
    renderer.draw_indexed_instanced(4);
    assert_eq!(
        renderer.device().calls(),
        [
            DeviceCall::SetTopology(Topology::LineStrip),
            DeviceCall::Draw { vertex_count: 3 },
            DeviceCall::SetTopology(Topology::TriangleStrip),
            DeviceCall::DrawIndexed {
                index_count: 3,
                instance_count: 1
            },
            DeviceCall::SetTopology(Topology::TriangleList),
            DeviceCall::DrawIndexed {
                index_count: 3,
                instance_count: 4
            },
        ]
    );
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "without an active buffer")]
fn draw_without_buffer_is_a_programming_error() {
    let mut renderer = renderer();
    let shader = renderer.create_shader(colored_shader("A"));
    renderer.set_shader(shader);
    renderer.draw_indexed(Topology::TriangleList);
}

#[test]
fn draw_line_emits_a_two_vertex_line() {
    capture_logs();
    let mut renderer = renderer();
    let shader = renderer.create_shader(line_shader());
    assert!(shader.is_valid());
    renderer.set_shader(shader);
    renderer.device_mut().clear_calls();

    renderer.draw_line(Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0));

    let calls = renderer.device().calls();
    assert_eq!(
        calls[calls.len() - 2..],
        [DeviceCall::SetTopology(Topology::LineList), DeviceCall::Draw { vertex_count: 2 }]
    );
    assert!(calls.contains(&DeviceCall::SetInputLayout(None)));
    assert!(!kinds(calls).contains(&"vertex buffer"));

    let raw = renderer.get_shader(shader).constant_buffers()[0].buffer;
    let contents = renderer.device().buffer_contents(raw).unwrap();
    // p2 follows p1 in the row after the 64-byte matrix.
    assert_eq!(&contents[80..92], bytemuck::cast_slice::<f32, u8>(&[1.0, 0.0, 0.0]));
    assert!(errors().is_empty(), "unexpected errors: {:?}", errors());
}

#[test]
fn reset_forgets_shader_and_buffer() {
    capture_logs();
    let (mut renderer, _) = ready();
    renderer.reset();
    assert_eq!(renderer.active_shader(), ShaderId::INVALID);
    assert!(!renderer.state().active_buffer.is_valid());

    renderer.apply();
    assert_eq!(errors().len(), 1);
}
