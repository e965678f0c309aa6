// app.rs
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use log::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowId},
};

use crate::renderer::device::SamplerDesc;
use crate::renderer::{
    cube_mesh, BufferId, DecodedImage, DefaultRasterizerState, RenderError, Renderer, SamplerId,
    ShaderId, TextureId, Topology, WgpuDevice,
};
use crate::settings::RendererSettings;

const DEMO_SHADER: &str = "Textured";
const CLEAR_COLOR: [f32; 4] = [0.08, 0.08, 0.12, 1.0];

/// Resources the demo draws with every frame.
struct Scene {
    shader: ShaderId,
    cube: BufferId,
    texture: TextureId,
    sampler: SamplerId,
}

impl Scene {
    fn setup(renderer: &mut Renderer<WgpuDevice>) -> Self {
        let (vertices, indices) = cube_mesh();
        let checker = DecodedImage::checkerboard(256, 32, [230, 230, 230, 255], [40, 90, 160, 255]);
        let scene = Self {
            shader: renderer.shader_id(DEMO_SHADER),
            cube: renderer.add_buffer(&vertices, &indices),
            texture: renderer.create_texture_from_image("checker", &checker),
            sampler: renderer.create_sampler_state(&SamplerDesc::default()),
        };
        if !scene.shader.is_valid() {
            warn!("Shader {} is missing, only clearing the screen", DEMO_SHADER);
        }
        scene
    }

    fn render(&self, renderer: &mut Renderer<WgpuDevice>, time: f32) {
        renderer.begin(CLEAR_COLOR, 1.0);

        if self.shader.is_valid() && self.cube.is_valid() {
            let world = Mat4::from_rotation_y(time) * Mat4::from_rotation_x(time * 0.5);
            let view = Mat4::look_at_rh(Vec3::new(0.0, 1.2, 3.0), Vec3::ZERO, Vec3::Y);
            let proj = Mat4::perspective_rh(45f32.to_radians(), renderer.aspect_ratio(), 0.1, 100.0);

            renderer.set_shader(self.shader);
            renderer.set_buffer_obj(self.cube);
            renderer.set_constant_4x4f("world_view_proj", &(proj * view * world));
            renderer.set_constant_4x4f("world", &world);
            renderer.set_constant_3f("light_dir", Vec3::new(0.4, 1.0, 0.6).normalize());
            renderer.set_constant_1f("ambient", 0.25);
            renderer.set_texture("diffuse", self.texture);
            renderer.set_sampler_state("diffuse_sampler", self.sampler);
            renderer.set_rasterizer_state(DefaultRasterizerState::CullNone.id());
            renderer.apply();
            renderer.draw_indexed(Topology::TriangleList);
        }

        renderer.end();
    }
}

pub struct App {
    settings: RendererSettings,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuDevice>>,
    scene: Option<Scene>,
    start: Instant,
    error: Option<RenderError>,
}

impl App {
    pub fn new(settings: RendererSettings) -> Self {
        Self {
            settings,
            window: None,
            renderer: None,
            scene: None,
            start: Instant::now(),
            error: None,
        }
    }

    /// The error that stopped the application, if any.
    pub fn take_error(&mut self) -> Option<RenderError> {
        self.error.take()
    }

    fn create_renderer(
        &self,
        event_loop: &ActiveEventLoop,
    ) -> Result<(Arc<Window>, Renderer<WgpuDevice>), RenderError> {
        let window_settings = &self.settings.window;
        let mut attributes = Window::default_attributes()
            .with_title("statecore")
            .with_inner_size(PhysicalSize::new(window_settings.width, window_settings.height))
            .with_resizable(false);
        if window_settings.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attributes)?);

        let device = WgpuDevice::new(window.clone(), &self.settings)?;
        let renderer = Renderer::initialize(device, self.settings.clone())?;
        Ok((window, renderer))
    }

    fn reload_shaders(&mut self) {
        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_mut()) else {
            return;
        };
        let unloaded = renderer.reload_shaders();
        info!("Reloaded {} shaders", unloaded.len());
        scene.shader = renderer.shader_id(DEMO_SHADER);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.scene = None;
        if let Some(mut renderer) = self.renderer.take() {
            info!("Rendered {} frames", renderer.frame_count());
            renderer.exit();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match self.create_renderer(event_loop) {
            Ok((window, mut renderer)) => {
                self.scene = Some(Scene::setup(&mut renderer));
                window.request_redraw();
                self.window = Some(window);
                self.renderer = Some(renderer);
                self.start = Instant::now();
            }
            Err(err) => {
                error!("Failed to start renderer: {}", err);
                self.error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().map(|w| w.id()) != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let time = self.start.elapsed().as_secs_f32();
                if let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_ref()) {
                    scene.render(renderer, time);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match logical_key.as_ref() {
                Key::Named(NamedKey::Escape) => self.shutdown(event_loop),
                Key::Character("r") => self.reload_shaders(),
                _ => {}
            },
            _ => {}
        }
    }
}
