mod common;

use glam::{Mat4, Vec3, Vec4};
use statecore::renderer::device::ShaderStage;
use statecore::renderer::{CpuConstantId, DeviceCall, ShaderDesc, Topology};

use common::*;

fn uploads(calls: &[DeviceCall]) -> usize {
    calls
        .iter()
        .filter(|call| matches!(call, DeviceCall::WriteBuffer { .. }))
        .count()
}

#[test]
fn repeated_identical_constant_uploads_once() {
    capture_logs();
    let mut renderer = renderer();
    let shader = renderer.create_shader(colored_shader("Colored"));
    let buffer = triangle(&mut renderer);
    renderer.set_shader(shader);
    renderer.set_buffer_obj(buffer);
    renderer.device_mut().clear_calls();

    let mut total = 0;
    for _ in 0..10 {
        renderer.set_constant_3f("color", Vec3::new(0.25, 0.5, 0.75));
        renderer.apply();
        total += uploads(&renderer.device_mut().take_calls());
    }
    assert_eq!(total, 1);
    assert!(errors().is_empty());
}

#[test]
fn changed_value_marks_buffer_dirty_again() {
    let mut renderer = renderer();
    let shader = renderer.create_shader(colored_shader("Colored"));
    renderer.set_shader(shader);

    renderer.set_constant_3f("color", Vec3::new(1.0, 0.0, 0.0));
    renderer.apply();
    assert!(!renderer.get_shader(shader).constant_buffers()[0].dirty);

    renderer.set_constant_3f("color", Vec3::new(1.0, 0.0, 0.0));
    assert!(!renderer.get_shader(shader).constant_buffers()[0].dirty);
    renderer.set_constant_3f("color", Vec3::new(0.0, 1.0, 0.0));
    assert!(renderer.get_shader(shader).constant_buffers()[0].dirty);
}

#[test]
fn committed_constant_bytes_match_the_value() {
    capture_logs();
    let mut renderer = renderer();
    let shader = renderer.create_shader(colored_shader("Colored"));
    let buffer = triangle(&mut renderer);
    let texture = renderer.create_texture_2d(&sampled_texture("albedo", 4));

    renderer.set_shader(shader);
    renderer.set_buffer_obj(buffer);
    renderer.set_constant_3f("color", Vec3::new(1.0, 0.0, 0.0));
    renderer.set_texture("tex", texture);
    renderer.apply();
    renderer.draw_indexed(Topology::TriangleList);

    assert!(errors().is_empty(), "unexpected errors: {:?}", errors());
    let raw = renderer.get_shader(shader).constant_buffers()[0].buffer;
    let mut expected = bytemuck::cast_slice::<f32, u8>(&[1.0, 0.0, 0.0]).to_vec();
    expected.extend_from_slice(&[0; 4]);
    assert_eq!(renderer.device().buffer_contents(raw), Some(expected.as_slice()));
    assert!(renderer
        .device()
        .calls()
        .contains(&DeviceCall::DrawIndexed {
            index_count: 3,
            instance_count: 1
        }));
}

#[test]
fn unknown_constant_logs_once_and_leaves_buffers_alone() {
    capture_logs();
    let mut renderer = renderer();
    let shader = renderer.create_shader(colored_shader("Colored"));
    renderer.set_shader(shader);
    let raw = renderer.get_shader(shader).constant_buffers()[0].buffer;
    let before = renderer.device().buffer_contents(raw).map(<[u8]>::to_vec);

    renderer.set_constant_3f("nonexistent", Vec3::ONE);
    assert_eq!(errors().len(), 1);
    assert!(errors()[0].contains("nonexistent"));

    renderer.device_mut().clear_calls();
    renderer.apply();
    assert_eq!(uploads(renderer.device().calls()), 0);
    assert_eq!(renderer.device().buffer_contents(raw).map(<[u8]>::to_vec), before);
}

#[test]
fn matrices_are_stored_column_major() {
    let mut renderer = renderer();
    let desc = ShaderDesc::new("Transform")
        .with_stage(ShaderStage::Vertex, VS)
        .with_constant_buffer("PerObject", ShaderStage::Vertex, 0, &[("world", 64), ("tint", 16)]);
    let shader = renderer.create_shader(desc);
    renderer.set_shader(shader);

    let cols: [f32; 16] = std::array::from_fn(|i| i as f32);
    let matrix = Mat4::from_cols_array(&cols);
    renderer.set_constant_4x4f("world", &matrix);
    renderer.set_constant_4f("tint", Vec4::new(0.5, 0.5, 0.5, 1.0));
    renderer.apply();

    let raw = renderer.get_shader(shader).constant_buffers()[0].buffer;
    let contents = renderer.device().buffer_contents(raw).unwrap();
    assert_eq!(&contents[..64], bytemuck::cast_slice::<f32, u8>(&cols));
    assert_eq!(
        &contents[64..80],
        bytemuck::cast_slice::<f32, u8>(&[0.5, 0.5, 0.5, 1.0])
    );
}

#[test]
fn first_constant_with_a_name_wins() {
    let mut renderer = renderer();
    let desc = ShaderDesc::new("Duplicated")
        .with_stage(ShaderStage::Vertex, VS)
        .with_stage(ShaderStage::Pixel, PS)
        .with_constant_buffer("VsParams", ShaderStage::Vertex, 0, &[("scale", 4)])
        .with_constant_buffer("PsParams", ShaderStage::Pixel, 0, &[("scale", 4)]);
    let shader = renderer.create_shader(desc);
    renderer.set_shader(shader);

    renderer.set_constant_1f("scale", 2.0);
    let buffers = renderer.get_shader(shader).constant_buffers();
    assert!(buffers[0].dirty);
    assert!(!buffers[1].dirty);
    assert_eq!(renderer.find_shader_constant("scale"), CpuConstantId::new(0));
}

#[test]
fn longer_input_is_truncated_to_the_constant() {
    let mut renderer = renderer();
    let shader = renderer.create_shader(colored_shader("Colored"));
    renderer.set_shader(shader);

    renderer.set_constant_4f("color", Vec4::new(1.0, 2.0, 3.0, 4.0));
    let id = renderer.find_shader_constant("color");
    assert_eq!(
        renderer.cpu_constant(id).data,
        bytemuck::cast_slice::<f32, u8>(&[1.0, 2.0, 3.0])
    );
}

#[test]
fn integers_and_structs_are_written_verbatim() {
    let mut renderer = renderer();
    let desc = ShaderDesc::new("Params")
        .with_stage(ShaderStage::Pixel, PS)
        .with_constant_buffer("Params", ShaderStage::Pixel, 1, &[("mode", 4), ("offset", 8)]);
    let shader = renderer.create_shader(desc);
    renderer.set_shader(shader);

    renderer.set_constant_1i("mode", -3);
    renderer.set_constant_struct("offset", &[7u32, 9u32]);
    let mode = renderer.find_shader_constant("mode");
    let offset = renderer.find_shader_constant("offset");
    assert_eq!(renderer.cpu_constant(mode).data, (-3i32).to_ne_bytes());
    assert_eq!(
        renderer.cpu_constant(offset).data,
        bytemuck::cast_slice::<u32, u8>(&[7, 9])
    );
}

#[test]
#[cfg(debug_assertions)]
#[should_panic]
fn short_constant_input_is_a_programming_error() {
    let mut renderer = renderer();
    let shader = renderer.create_shader(colored_shader("Colored"));
    renderer.set_shader(shader);
    renderer.set_constant_1f("color", 1.0);
}

#[test]
fn two_component_constant_packs_after_a_scalar() {
    let mut renderer = renderer();
    let desc = ShaderDesc::new("Scroll")
        .with_stage(ShaderStage::Pixel, PS)
        .with_constant_buffer("Scroll", ShaderStage::Pixel, 0, &[("time", 4), ("speed", 8)]);
    let shader = renderer.create_shader(desc);
    renderer.set_shader(shader);

    renderer.set_constant_2f("speed", glam::Vec2::new(0.5, -0.25));
    renderer.apply();

    let raw = renderer.get_shader(shader).constant_buffers()[0].buffer;
    let contents = renderer.device().buffer_contents(raw).unwrap();
    assert_eq!(contents.len(), 16);
    assert_eq!(&contents[8..16], bytemuck::cast_slice::<f32, u8>(&[0.5, -0.25]));
}
