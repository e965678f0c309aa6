#![allow(dead_code)]

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};

use statecore::renderer::device::{ShaderStage, TextureDesc, TextureFormat, TextureUsage};
use statecore::renderer::{v, BufferId, HeadlessDevice, Renderer, ShaderDesc};
use statecore::settings::RendererSettings;

pub const VS: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }";
pub const PS: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Keeps records per thread so parallel tests do not see each other's logs.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            RECORDS.with(|records| {
                records
                    .borrow_mut()
                    .push((record.level(), record.args().to_string()))
            });
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();

/// Installs the capturing logger and forgets this thread's earlier records.
pub fn capture_logs() {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Warn);
    });
    RECORDS.with(|records| records.borrow_mut().clear());
}

pub fn logged(level: Level) -> Vec<String> {
    RECORDS.with(|records| {
        records
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    })
}

pub fn errors() -> Vec<String> {
    logged(Level::Error)
}

/// A directory that is unique to the calling test.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("statecore_{}_{}", tag, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn settings_with_roots(shader_root: PathBuf, texture_root: PathBuf) -> RendererSettings {
    RendererSettings {
        shader_root,
        texture_root,
        ..RendererSettings::default()
    }
}

/// A headless renderer that finds no shader manifest.
pub fn renderer() -> Renderer<HeadlessDevice> {
    let empty = std::env::temp_dir().join("statecore_tests_without_assets");
    let settings = settings_with_roots(empty.clone(), empty);
    Renderer::initialize(HeadlessDevice::new(320, 240), settings).unwrap()
}

/// Pixel-stage "color" constant plus a "tex" texture, the usual test subject.
pub fn colored_shader(name: &str) -> ShaderDesc {
    ShaderDesc::new(name)
        .with_stage(ShaderStage::Vertex, VS)
        .with_stage(ShaderStage::Pixel, PS)
        .with_constant_buffer("Material", ShaderStage::Pixel, 0, &[("color", 12)])
        .with_texture("tex", ShaderStage::Pixel, 0)
        .with_sampler("tex_sampler", ShaderStage::Pixel, 0)
}

pub fn triangle(renderer: &mut Renderer<HeadlessDevice>) -> BufferId {
    let vertices = [
        v([0.0, 0.5, 0.0], [0.0, 0.0, 1.0], [0.5, 0.0]),
        v([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        v([0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
    ];
    renderer.add_buffer(&vertices, &[0, 1, 2])
}

pub fn sampled_texture(label: &str, size: u32) -> TextureDesc {
    TextureDesc::new_2d(size, size, TextureFormat::Rgba8Unorm, TextureUsage::SHADER_RESOURCE)
        .with_label(label)
}

pub fn color_target(label: &str) -> TextureDesc {
    TextureDesc::new_2d(320, 240, TextureFormat::Rgba16Float, TextureUsage::SHADER_RESOURCE)
        .with_label(label)
}
