// renderer/renderer.rs
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use glam::{Mat4, Vec2, Vec3, Vec4};
use log::{error, info, warn};

use crate::settings::RendererSettings;

use super::buffer::{BufferObject, Vertex};
use super::commands::{BindingQueue, SetSamplerCommand, SetTextureCommand};
use super::constants::{ConstantRegistry, CpuConstant};
use super::device::{
    BlendDesc, CullMode, DepthStencilDesc, DepthStencilViewDesc, DeviceError, FillMode,
    GraphicsDevice, RasterizerDesc, RawResource, RawView, SamplerDesc, ShaderStage, TextureDesc,
    TextureFormat, TextureUsage, Topology, Viewport,
};
use super::error::RenderError;
use super::handle::*;
use super::shader::{load_manifest, Shader, ShaderDesc, ShaderRegistry};
use super::state::PipelineState;
use super::states::{
    BlendState, DefaultBlendState, DefaultRasterizerState, DepthStencilState, RasterizerState,
    StateObject,
};
use super::table::ResourceTable;
use super::texture::{DecodedImage, DepthStencil, RenderTarget, Sampler, Texture, TextureLoadError};

const SHADER_MANIFEST: &str = "shaders.json";

fn default_resource(what: &'static str) -> impl FnOnce(DeviceError) -> RenderError {
    move |source| RenderError::DefaultResource { what, source }
}

/// Handle-based front end over a [`GraphicsDevice`].
///
/// Resources are created once and referred to by IDs. Per draw, callers pick
/// a shader and buffer, set constants, textures and states by name or ID,
/// then [`apply`](Renderer::apply) commits everything and a draw call issues
/// the primitive.
pub struct Renderer<D: GraphicsDevice> {
    device: D,
    settings: RendererSettings,

    shaders: ResourceTable<Shader>,
    shader_descs: Vec<ShaderDesc>,
    shader_registry: ShaderRegistry,
    constants: ConstantRegistry,

    textures: ResourceTable<Texture>,
    samplers: ResourceTable<Sampler>,
    render_targets: ResourceTable<RenderTarget>,
    depth_stencils: ResourceTable<DepthStencil>,
    rasterizer_states: ResourceTable<RasterizerState>,
    blend_states: ResourceTable<BlendState>,
    depth_stencil_states: ResourceTable<DepthStencilState>,
    buffers: ResourceTable<BufferObject>,

    texture_queue: BindingQueue<SetTextureCommand>,
    sampler_queue: BindingQueue<SetSamplerCommand>,
    state: PipelineState,
    blending_enabled: bool,

    width: u32,
    height: u32,
    frame_count: u64,
    released: bool,
}

impl<D: GraphicsDevice> Renderer<D> {
    pub fn initialize(device: D, settings: RendererSettings) -> Result<Self, RenderError> {
        let mut renderer = Self {
            device,
            settings,
            shaders: ResourceTable::default(),
            shader_descs: Vec::new(),
            shader_registry: ShaderRegistry::default(),
            constants: ConstantRegistry::default(),
            textures: ResourceTable::default(),
            samplers: ResourceTable::default(),
            render_targets: ResourceTable::default(),
            depth_stencils: ResourceTable::default(),
            rasterizer_states: ResourceTable::default(),
            blend_states: ResourceTable::default(),
            depth_stencil_states: ResourceTable::default(),
            buffers: ResourceTable::default(),
            texture_queue: BindingQueue::default(),
            sampler_queue: BindingQueue::default(),
            state: PipelineState::default(),
            blending_enabled: false,
            width: 0,
            height: 0,
            frame_count: 0,
            released: false,
        };

        renderer.create_defaults()?;
        renderer.load_shaders();
        info!(
            "Renderer initialized ({}x{}, vsync {})",
            renderer.width, renderer.height, renderer.settings.window.vsync
        );
        Ok(renderer)
    }

    fn create_defaults(&mut self) -> Result<(), RenderError> {
        let (backbuffer, desc) = self.device.backbuffer()?;
        self.width = desc.width;
        self.height = desc.height;
        let texture = Texture::from_backbuffer(backbuffer, &desc);
        let view = self
            .device
            .create_render_target_view(backbuffer)
            .map_err(default_resource("main render target"))?;
        let texture_id = self.textures.insert(texture.clone());
        let main = self.render_targets.insert(RenderTarget {
            texture,
            texture_id,
            view,
        });

        let depth_desc = TextureDesc::new_2d(
            self.width,
            self.height,
            TextureFormat::Depth24PlusStencil8,
            TextureUsage::DEPTH_STENCIL,
        )
        .with_label("default depth");
        let depth_texture = Texture::create(&mut self.device, "default depth", &depth_desc, &[])
            .map_err(default_resource("depth buffer"))?;
        let depth_raw = depth_texture.texture;
        let depth_texture_id = self.textures.insert(depth_texture);
        let view_desc = DepthStencilViewDesc::default();
        let depth_view = self
            .device
            .create_depth_stencil_view(depth_raw, &view_desc)
            .map_err(default_resource("depth-stencil view"))?;
        let depth = self.depth_stencils.insert(DepthStencil {
            view: depth_view,
            texture_id: depth_texture_id,
            format: view_desc.format,
        });

        let desc = DepthStencilDesc::default();
        let state = self
            .device
            .create_depth_stencil_state(&desc)
            .map_err(default_resource("depth-stencil state"))?;
        self.depth_stencil_states.insert(StateObject { state, desc });

        for default in DefaultRasterizerState::ALL {
            let desc = default.desc();
            let state = self
                .device
                .create_rasterizer_state(&desc)
                .map_err(default_resource("rasterizer state"))?;
            self.rasterizer_states.insert(StateObject { state, desc });
        }

        for default in DefaultBlendState::ALL {
            let desc = default.desc();
            let state = self
                .device
                .create_blend_state(&desc)
                .map_err(default_resource("blend state"))?;
            self.blend_states.insert(StateObject { state, desc });
        }

        self.state.main_render_target = main;
        self.state.bind_render_targets(&[main]);
        self.state.bound_depth_stencil = depth;
        self.state.viewport = Viewport::from_size(self.width, self.height);
        Ok(())
    }

    /// Compiles every shader listed in `<shader_root>/shaders.json`, if present.
    fn load_shaders(&mut self) {
        let manifest = self.settings.shader_root.join(SHADER_MANIFEST);
        if !manifest.exists() {
            info!("No shader manifest at {:?}", manifest);
            return;
        }
        match load_manifest(&manifest) {
            Ok(descs) => {
                info!("COMPILING SHADERS");
                for desc in descs {
                    self.create_shader(desc);
                }
            }
            Err(err) => error!("{}", err),
        }
    }

    pub fn create_shader(&mut self, desc: ShaderDesc) -> ShaderId {
        let result = Shader::compile(
            &mut self.device,
            &desc,
            &self.settings.shader_root,
            &mut self.constants,
        );
        let id = match result {
            Ok(shader) => {
                let id = self.shaders.insert(shader);
                self.shader_registry.register(&desc.name, id);
                id
            }
            Err(err) => {
                error!("Cannot create shader {}: {}", desc.name, err);
                ShaderId::INVALID
            }
        };
        self.shader_descs.push(desc);
        id
    }

    pub fn create_texture_2d(&mut self, desc: &TextureDesc) -> TextureId {
        let name = desc
            .label
            .clone()
            .unwrap_or_else(|| format!("texture {}", self.textures.len()));
        match Texture::create(&mut self.device, &name, desc, &[]) {
            Ok(texture) => self.textures.insert(texture),
            Err(err) => {
                error!("Cannot create texture {}: {}", name, err);
                TextureId::INVALID
            }
        }
    }

    /// Loads `file` relative to the texture root. A name that was loaded
    /// before returns the existing ID; a load failure falls back to the first
    /// texture.
    pub fn create_texture_from_file(&mut self, file: &str) -> TextureId {
        if let Some(existing) = self.textures.find(|t| t.name == file) {
            return existing;
        }

        let path = self.settings.texture_root.join(file);
        match self.load_texture(&path, file) {
            Ok(texture) => self.textures.insert(texture),
            Err(err) => {
                error!("Cannot load texture {}: {}", file, err);
                self.textures.first_id().unwrap_or(TextureId::INVALID)
            }
        }
    }

    /// Uploads an already decoded RGBA image as a sampled texture.
    pub fn create_texture_from_image(&mut self, name: &str, image: &DecodedImage) -> TextureId {
        match Self::image_texture(&mut self.device, name, image) {
            Ok(texture) => self.textures.insert(texture),
            Err(err) => {
                error!("Cannot create texture {}: {}", name, err);
                TextureId::INVALID
            }
        }
    }

    fn load_texture(&mut self, path: &Path, name: &str) -> Result<Texture, TextureLoadError> {
        let image = DecodedImage::from_path(path)?;
        Ok(Self::image_texture(&mut self.device, name, &image)?)
    }

    fn image_texture(device: &mut D, name: &str, image: &DecodedImage) -> Result<Texture, DeviceError> {
        let desc = TextureDesc::new_2d(
            image.width,
            image.height,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DST,
        )
        .with_label(name);
        Texture::create(device, name, &desc, &[&image.rgba])
    }

    /// Builds a cubemap from six face images (+X, -X, +Y, -Y, +Z, -Z).
    pub fn create_cubemap_texture(&mut self, files: &[&str; 6]) -> TextureId {
        let name = format!("cubemap:{}", files.join(";"));
        if let Some(existing) = self.textures.find(|t| t.name == name) {
            return existing;
        }

        let root = &self.settings.texture_root;
        let paths: [PathBuf; 6] = std::array::from_fn(|face| root.join(files[face]));
        let result = DecodedImage::cube_faces(&paths).and_then(|faces| {
            let desc = TextureDesc {
                array_size: 6,
                cube: true,
                ..TextureDesc::new_2d(
                    faces[0].width,
                    faces[0].height,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DST,
                )
                .with_label(name.as_str())
            };
            let layers: Vec<&[u8]> = faces.iter().map(|face| face.rgba.as_slice()).collect();
            Ok(Texture::create(&mut self.device, &name, &desc, &layers)?)
        });

        match result {
            Ok(texture) => self.textures.insert(texture),
            Err(err) => {
                error!("Cannot create {}: {}", name, err);
                TextureId::INVALID
            }
        }
    }

    pub fn create_sampler_state(&mut self, desc: &SamplerDesc) -> SamplerId {
        match self.device.create_sampler(desc) {
            Ok(sampler) => self.samplers.insert(Sampler {
                sampler,
                desc: desc.clone(),
            }),
            Err(err) => {
                error!("Cannot create sampler state: {}", err);
                SamplerId::INVALID
            }
        }
    }

    /// Creates a color texture (also registered as a texture) and its
    /// render-target view.
    pub fn add_render_target(&mut self, desc: &TextureDesc) -> RenderTargetId {
        let mut desc = desc.clone();
        desc.usage |= TextureUsage::RENDER_TARGET;
        let texture_id = self.create_texture_2d(&desc);
        if !texture_id.is_valid() {
            return RenderTargetId::INVALID;
        }

        let texture = self.textures.get(texture_id).clone();
        match self.device.create_render_target_view(texture.texture) {
            Ok(view) => self.render_targets.insert(RenderTarget {
                texture,
                texture_id,
                view,
            }),
            Err(err) => {
                error!("Cannot create render target view for {}: {}", texture.name, err);
                RenderTargetId::INVALID
            }
        }
    }

    pub fn add_depth_stencil(
        &mut self,
        desc: &DepthStencilViewDesc,
        surface: TextureId,
    ) -> DepthStencilId {
        let texture = self.textures.get(surface).texture;
        match self.device.create_depth_stencil_view(texture, desc) {
            Ok(view) => self.depth_stencils.insert(DepthStencil {
                view,
                texture_id: surface,
                format: desc.format,
            }),
            Err(err) => {
                error!("Cannot create depth stencil view: {}", err);
                DepthStencilId::INVALID
            }
        }
    }

    pub fn add_rasterizer_state(
        &mut self,
        cull: CullMode,
        fill: FillMode,
        depth_clip: bool,
    ) -> RasterizerStateId {
        let desc = RasterizerDesc {
            cull,
            fill,
            depth_clip,
            ..RasterizerDesc::default()
        };
        match self.device.create_rasterizer_state(&desc) {
            Ok(state) => self.rasterizer_states.insert(StateObject { state, desc }),
            Err(err) => {
                error!("Cannot create rasterizer state: {}", err);
                RasterizerStateId::INVALID
            }
        }
    }

    pub fn add_depth_stencil_state(&mut self, desc: &DepthStencilDesc) -> DepthStencilStateId {
        match self.device.create_depth_stencil_state(desc) {
            Ok(state) => self
                .depth_stencil_states
                .insert(StateObject { state, desc: *desc }),
            Err(err) => {
                error!("Cannot create depth stencil state: {}", err);
                DepthStencilStateId::INVALID
            }
        }
    }

    pub fn add_blend_state(&mut self, desc: &BlendDesc) -> BlendStateId {
        match self.device.create_blend_state(desc) {
            Ok(state) => self.blend_states.insert(StateObject { state, desc: *desc }),
            Err(err) => {
                error!("Cannot create blend state: {}", err);
                BlendStateId::INVALID
            }
        }
    }

    pub fn add_buffer(&mut self, vertices: &[Vertex], indices: &[u32]) -> BufferId {
        match BufferObject::create(&mut self.device, vertices, indices) {
            Ok(buffer) => self.buffers.insert(buffer),
            Err(err) => {
                error!("Cannot create buffer: {}", err);
                BufferId::INVALID
            }
        }
    }

    pub fn get_shader(&self, id: ShaderId) -> &Shader {
        self.shaders.get(id)
    }

    pub fn get_texture_object(&self, id: TextureId) -> &Texture {
        self.textures.get(id)
    }

    pub fn get_rasterizer_state(&self, id: RasterizerStateId) -> &RasterizerState {
        self.rasterizer_states.get(id)
    }

    pub fn get_blend_state(&self, id: BlendStateId) -> &BlendState {
        self.blend_states.get(id)
    }

    pub fn get_depth_stencil_state(&self, id: DepthStencilStateId) -> &DepthStencilState {
        self.depth_stencil_states.get(id)
    }

    pub fn get_texture(&self, name: &str) -> TextureId {
        match self.textures.find(|t| t.name == name) {
            Some(id) => id,
            None => {
                error!("Texture not found: {}", name);
                TextureId::INVALID
            }
        }
    }

    pub fn shader_id(&self, name: &str) -> ShaderId {
        match self.shader_registry.get(name) {
            Some(id) => id,
            None => {
                error!("Shader not found: {}", name);
                ShaderId::INVALID
            }
        }
    }

    /// First staging constant of the active shader called `name`.
    pub fn find_shader_constant(&self, name: &str) -> CpuConstantId {
        let shader = self.shaders.get(self.state.active_shader);
        let found = shader
            .constants
            .iter()
            .map(|(_, id)| *id)
            .find(|id| self.constants.get(*id).name == name);
        match found {
            Some(id) => id,
            None => {
                error!("Shader constant not found: {} in {}", name, shader.name());
                CpuConstantId::INVALID
            }
        }
    }

    pub fn cpu_constant(&self, id: CpuConstantId) -> &CpuConstant {
        self.constants.get(id)
    }

    pub fn render_target_texture(&self, id: RenderTargetId) -> TextureId {
        self.render_targets.get(id).texture_id
    }

    pub fn main_render_target(&self) -> RenderTargetId {
        self.state.main_render_target
    }

    pub fn default_depth_stencil(&self) -> DepthStencilId {
        DepthStencilId::new(0)
    }

    pub fn window_width(&self) -> u32 {
        self.width
    }

    pub fn window_height(&self) -> u32 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn active_shader(&self) -> ShaderId {
        self.state.active_shader
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn set_shader(&mut self, id: ShaderId) {
        assert!(
            self.shaders.contains(id),
            "set_shader: shader id {} out of range",
            id.raw()
        );

        let previous = self.state.active_shader;
        if previous != id {
            if let Some(previous_shader) = self.shaders.try_get(previous) {
                for point in previous_shader.texture_bind_points() {
                    self.device.set_texture(point.stage, point.slot, None);
                }
                self.device.set_render_targets(&[], None);
                self.device.set_blend_state(None);
            }
            self.shaders.get_mut(id).clear_dirty();
        }
        self.state.active_shader = id;
    }

    pub fn set_buffer_obj(&mut self, id: BufferId) {
        assert!(
            self.buffers.contains(id),
            "set_buffer_obj: buffer id {} out of range",
            id.raw()
        );
        self.state.active_buffer = id;
    }

    /// Stages `bytes` for the first constant called `name` in the active
    /// shader. Identical bytes leave the buffer clean.
    pub fn set_constant(&mut self, name: &str, bytes: &[u8]) {
        let shader = self.shaders.get_mut(self.state.active_shader);
        let found = shader
            .constants
            .iter()
            .copied()
            .find(|(_, id)| self.constants.get(*id).name == name);

        match found {
            Some((buffer, id)) => {
                if self.constants.write(id, bytes) {
                    shader.constant_buffers[buffer].dirty = true;
                }
            }
            None => error!("Shader constant not found: {} in {}", name, shader.name()),
        }
    }

    pub fn set_constant_4x4f(&mut self, name: &str, matrix: &Mat4) {
        self.set_constant(name, bytemuck::bytes_of(&matrix.to_cols_array()));
    }

    pub fn set_constant_4f(&mut self, name: &str, value: Vec4) {
        self.set_constant(name, bytemuck::bytes_of(&value.to_array()));
    }

    pub fn set_constant_3f(&mut self, name: &str, value: Vec3) {
        self.set_constant(name, bytemuck::bytes_of(&value.to_array()));
    }

    pub fn set_constant_2f(&mut self, name: &str, value: Vec2) {
        self.set_constant(name, bytemuck::bytes_of(&value.to_array()));
    }

    pub fn set_constant_1f(&mut self, name: &str, value: f32) {
        self.set_constant(name, bytemuck::bytes_of(&value));
    }

    pub fn set_constant_1i(&mut self, name: &str, value: i32) {
        self.set_constant(name, bytemuck::bytes_of(&value));
    }

    pub fn set_constant_struct<T: Pod>(&mut self, name: &str, value: &T) {
        self.set_constant(name, bytemuck::bytes_of(value));
    }

    /// Queues `id` for every texture bind point called `name`.
    pub fn set_texture(&mut self, name: &str, id: TextureId) {
        let shader = self.shaders.get(self.state.active_shader);
        let mut found = false;
        for point in shader.texture_bind_points().iter().filter(|p| p.name == name) {
            self.texture_queue.push(SetTextureCommand {
                bind_point: point.into(),
                texture: id,
            });
            found = true;
        }
        if !found {
            error!("Texture not found: \"{}\" in shader {}", name, shader.name());
        }
    }

    /// Queues `id` for every sampler bind point called `name`.
    pub fn set_sampler_state(&mut self, name: &str, id: SamplerId) {
        let shader = self.shaders.get(self.state.active_shader);
        let mut found = false;
        for point in shader.sampler_bind_points().iter().filter(|p| p.name == name) {
            self.sampler_queue.push(SetSamplerCommand {
                bind_point: point.into(),
                sampler: id,
            });
            found = true;
        }
        if !found {
            error!("Sampler not found: \"{}\" in shader {}", name, shader.name());
        }
    }

    pub fn set_rasterizer_state(&mut self, id: RasterizerStateId) {
        assert!(
            self.rasterizer_states.contains(id),
            "set_rasterizer_state: id {} out of range",
            id.raw()
        );
        self.state.active_rasterizer_state = id;
    }

    pub fn set_blend_state(&mut self, id: BlendStateId) {
        assert!(
            self.blend_states.contains(id),
            "set_blend_state: id {} out of range",
            id.raw()
        );
        self.state.active_blend_state = id;
    }

    pub fn set_depth_stencil_state(&mut self, id: DepthStencilStateId) {
        assert!(
            self.depth_stencil_states.contains(id),
            "set_depth_stencil_state: id {} out of range",
            id.raw()
        );
        self.state.active_depth_stencil_state = id;
    }

    pub fn bind_render_target(&mut self, id: RenderTargetId) {
        self.bind_render_targets(&[id]);
    }

    pub fn bind_render_targets(&mut self, ids: &[RenderTargetId]) {
        for id in ids {
            assert!(
                self.render_targets.contains(*id),
                "bind_render_targets: id {} out of range",
                id.raw()
            );
        }
        self.state.bind_render_targets(ids);
    }

    pub fn unbind_render_target(&mut self) {
        self.state.unbind_render_targets();
    }

    pub fn bind_depth_stencil(&mut self, id: DepthStencilId) {
        assert!(
            self.depth_stencils.contains(id),
            "bind_depth_stencil: id {} out of range",
            id.raw()
        );
        self.state.bound_depth_stencil = id;
    }

    pub fn unbind_depth_stencil(&mut self) {
        self.state.bound_depth_stencil = DepthStencilId::INVALID;
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.state.viewport = Viewport::from_size(width, height);
    }

    pub fn set_viewport_desc(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    pub fn enable_blending(&mut self, enabled: bool) {
        self.blending_enabled = enabled;
    }

    /// Forces a full rebind on the next draw.
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Clears every bound render target and the bound depth-stencil.
    pub fn begin(&mut self, clear_color: [f32; 4], depth: f32) {
        for id in self.state.bound_targets() {
            let view = self.render_targets.get(id).view;
            self.device.clear_render_target(view, clear_color);
        }
        if let Some(depth_stencil) = self.depth_stencils.try_get(self.state.bound_depth_stencil) {
            self.device.clear_depth_stencil(depth_stencil.view, depth);
        }
    }

    /// Commits the pending pipeline state to the device.
    pub fn apply(&mut self) {
        let shader_id = self.state.active_shader;
        if !shader_id.is_valid() {
            error!("Renderer::apply() : Shader null");
            return;
        }
        let shader = self.shaders.get_mut(shader_id);
        let device = &mut self.device;

        if let Some(buffer) = self.buffers.try_get(self.state.active_buffer) {
            device.set_vertex_buffer(buffer.vertex_buffer, Vertex::STRIDE);
            if let Some(index_buffer) = buffer.index_buffer {
                device.set_index_buffer(index_buffer);
            }
        }

        device.set_input_layout(shader.layout());
        for stage in ShaderStage::ALL {
            device.set_shader(stage, shader.stage(stage));
        }

        for cb in &mut shader.constant_buffers {
            if cb.dirty {
                let bytes = cb.assemble(&self.constants);
                device.write_buffer(cb.buffer, &bytes);
                cb.dirty = false;
            }
            device.set_constant_buffer(cb.stage, cb.slot, Some(cb.buffer));
        }

        for command in self.texture_queue.drain() {
            let view = self
                .textures
                .try_get(command.texture)
                .and_then(|texture| texture.view);
            if view.is_none() && command.texture.is_valid() {
                warn!("Texture {:?} has no shader view, unbinding", command.texture);
            }
            let slot = command.bind_point;
            device.set_texture(slot.stage, slot.slot, view);
        }

        for command in self.sampler_queue.drain() {
            let sampler = self
                .samplers
                .try_get(command.sampler)
                .map(|sampler| sampler.sampler);
            let slot = command.bind_point;
            device.set_sampler(slot.stage, slot.slot, sampler);
        }

        device.set_viewport(&self.state.viewport);
        device.set_rasterizer_state(
            self.rasterizer_states
                .get(self.state.active_rasterizer_state)
                .state,
        );
        if self.blending_enabled {
            let blend = self.blend_states.get(self.state.active_blend_state).state;
            device.set_blend_state(Some(blend));
        }

        let views: Vec<RawView> = self
            .state
            .bound_targets()
            .map(|id| self.render_targets.get(id).view)
            .collect();
        let depth_view = self
            .depth_stencils
            .try_get(self.state.bound_depth_stencil)
            .map(|depth| depth.view);
        device.set_render_targets(&views, depth_view);

        device.set_depth_stencil_state(
            self.depth_stencil_states
                .get(self.state.active_depth_stencil_state)
                .state,
        );
    }

    fn active_buffer_object(&self) -> Option<&BufferObject> {
        debug_assert!(
            self.state.active_buffer.is_valid(),
            "draw issued without an active buffer"
        );
        let buffer = self.buffers.try_get(self.state.active_buffer);
        if buffer.is_none() {
            error!("Draw issued without an active buffer");
        }
        buffer
    }

    pub fn draw(&mut self, topology: Topology) {
        let Some(count) = self.active_buffer_object().map(|b| b.vertex_count) else {
            return;
        };
        self.device.set_topology(topology);
        self.device.draw(count);
    }

    pub fn draw_indexed(&mut self, topology: Topology) {
        let Some(count) = self.active_buffer_object().map(|b| b.index_count) else {
            return;
        };
        self.device.set_topology(topology);
        self.device.draw_indexed(count, 1);
    }

    /// Draws the active buffer `instance_count` times as a triangle list.
    pub fn draw_indexed_instanced(&mut self, instance_count: u32) {
        let Some(count) = self.active_buffer_object().map(|b| b.index_count) else {
            return;
        };
        self.device.set_topology(Topology::TriangleList);
        self.device.draw_indexed(count, instance_count);
    }

    /// Two vertices with the endpoints in constants; the active shader picks
    /// `p1` or `p2` by vertex index. Needs no buffer.
    pub fn draw_line(&mut self, p1: Vec3, p2: Vec3, color: Vec3) {
        self.set_constant_3f("p1", p1);
        self.set_constant_3f("p2", p2);
        self.set_constant_3f("color", color);
        self.apply();
        self.device.set_topology(Topology::LineList);
        self.device.draw(2);
    }

    pub fn end(&mut self) {
        if let Err(err) = self.device.present(self.settings.window.vsync) {
            error!("Present failed: {}", err);
        }
        self.frame_count += 1;
    }

    /// Releases and forgets every shader, returning their names. Staging
    /// constants go with them.
    pub fn unload_shaders(&mut self) -> Vec<String> {
        info!("UNLOADING SHADERS");
        let mut names = Vec::with_capacity(self.shaders.len());
        for shader in self.shaders.drain() {
            shader.release(&mut self.device);
            names.push(shader.name().to_string());
        }
        self.constants.reset();
        self.shader_registry.clear();
        self.texture_queue.clear();
        self.sampler_queue.clear();
        self.state.active_shader = ShaderId::INVALID;
        names
    }

    /// Recompiles every shader ever created, in creation order, re-reading
    /// stage files. IDs are reissued from 0.
    pub fn reload_shaders(&mut self) -> Vec<String> {
        let unloaded = self.unload_shaders();
        info!("COMPILING SHADERS");
        for desc in std::mem::take(&mut self.shader_descs) {
            self.create_shader(desc);
        }
        unloaded
    }

    /// Releases every native object. Safe to call more than once.
    pub fn exit(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        info!("Renderer exiting");

        let device = &mut self.device;
        for buffer in self.buffers.drain() {
            buffer.release(device);
        }
        self.constants.reset();
        for shader in self.shaders.drain() {
            shader.release(device);
        }
        for texture in self.textures.drain() {
            texture.release(device);
        }
        for sampler in self.samplers.drain() {
            device.release(RawResource::Sampler(sampler.sampler));
        }
        for target in self.render_targets.drain() {
            device.release(RawResource::View(target.view));
        }
        for state in self.rasterizer_states.drain() {
            state.release(device);
        }
        for state in self.depth_stencil_states.drain() {
            state.release(device);
        }
        for state in self.blend_states.drain() {
            state.release(device);
        }
        for depth_stencil in self.depth_stencils.drain() {
            device.release(RawResource::View(depth_stencil.view));
        }
        self.texture_queue.clear();
        self.sampler_queue.clear();
        self.state = PipelineState::default();
    }
}

impl<D: GraphicsDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        self.exit();
    }
}
