use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use log::{debug, error, info, warn};
use slotmap::{Key, KeyData, SlotMap};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::device::*;
use crate::settings::{RendererSettings, WindowSettings};

/// First binding number used for texture registers inside a stage's group.
pub const TEXTURE_BINDING_BASE: u32 = 32;
/// First binding number used for sampler registers inside a stage's group.
pub const SAMPLER_BINDING_BASE: u32 = 160;

const VERTEX_GROUP: usize = 0;
const PIXEL_GROUP: usize = 1;

slotmap::new_key_type! {
    struct ObjectKey;
}

fn key_of(raw: u64) -> ObjectKey {
    KeyData::from_ffi(raw).into()
}

fn raw_of(key: ObjectKey) -> u64 {
    key.data().as_ffi()
}

struct ShaderObject {
    module: wgpu::ShaderModule,
    stage: ShaderStage,
    entry_point: String,
    bindings: StageBindings,
}

enum GpuObject {
    Texture {
        texture: wgpu::Texture,
        desc: TextureDesc,
    },
    /// Placeholder for the swap chain image, acquired once per frame.
    Backbuffer,
    View {
        view: wgpu::TextureView,
        format: wgpu::TextureFormat,
        size: (u32, u32),
    },
    BackbufferView,
    Sampler(wgpu::Sampler),
    Shader(ShaderObject),
    Layout(Vec<InputElement>),
    Buffer(wgpu::Buffer),
    Rasterizer(RasterizerDesc),
    Blend(BlendDesc),
    DepthStencil(DepthStencilDesc),
}

struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    present_modes: Vec<wgpu::PresentMode>,
    vsync: bool,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
}

/// Immediate-context state as last set through the [`GraphicsDevice`] calls.
#[derive(Default)]
struct BoundState {
    vertex_buffer: Option<(RawBuffer, u32)>,
    index_buffer: Option<RawBuffer>,
    layout: Option<RawLayout>,
    shaders: [Option<RawShader>; ShaderStage::COUNT],
    constant_buffers: HashMap<(ShaderStage, u32), RawBuffer>,
    textures: HashMap<(ShaderStage, u32), RawView>,
    samplers: HashMap<(ShaderStage, u32), RawSampler>,
    viewport: Option<Viewport>,
    rasterizer: Option<RawState>,
    blend: Option<RawState>,
    depth_stencil_state: Option<RawState>,
    targets: Vec<RawView>,
    depth_stencil: Option<RawView>,
    topology: Option<Topology>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    vertex: RawShader,
    pixel: Option<RawShader>,
    layout: Option<RawLayout>,
    stride: u32,
    rasterizer: Option<RawState>,
    blend: Option<RawState>,
    depth_state: Option<RawState>,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    topology: Topology,
}

impl PipelineKey {
    fn references(&self, raw: u64) -> bool {
        self.vertex.0 == raw
            || self.pixel.map(|s| s.0) == Some(raw)
            || self.layout.map(|l| l.0) == Some(raw)
            || [self.rasterizer, self.blend, self.depth_state]
                .iter()
                .any(|state| state.map(|s| s.0) == Some(raw))
    }
}

struct CachedPipeline {
    pipeline: wgpu::RenderPipeline,
    groups: [wgpu::BindGroupLayout; 2],
}

enum DrawKind {
    Vertices(u32),
    Indexed { indices: u32, instances: u32 },
}

/// [`GraphicsDevice`] on top of wgpu.
///
/// Stage objects are WGSL modules whose resources follow a fixed layout:
/// group 0 holds the vertex stage and group 1 the pixel stage. Inside a group
/// constant buffer `bN` is binding `N`, texture `tN` is binding
/// `TEXTURE_BINDING_BASE + N` and sampler `sN` is binding
/// `SAMPLER_BINDING_BASE + N`. Pipelines are built lazily from the bound state
/// at draw time and cached.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    features: wgpu::Features,
    surface: Option<SurfaceTarget>,
    objects: SlotMap<ObjectKey, GpuObject>,
    backbuffer: RawTexture,
    backbuffer_desc: TextureDesc,
    bound: BoundState,
    pipelines: HashMap<PipelineKey, Option<CachedPipeline>>,
}

impl WgpuDevice {
    /// Opens a device presenting to `window`.
    pub fn new(window: Arc<Window>, settings: &RendererSettings) -> DeviceResult<Self> {
        pollster::block_on(Self::new_async(window, settings))
    }

    /// Opens a device that renders into an off-screen back buffer.
    pub fn offscreen(width: u32, height: u32) -> DeviceResult<Self> {
        pollster::block_on(Self::offscreen_async(width, height))
    }

    async fn new_async(window: Arc<Window>, settings: &RendererSettings) -> DeviceResult<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window)
            .map_err(|err| DeviceError::Surface(err.to_string()))?;
        let (adapter, device, queue, features) = request_device(&instance, Some(&surface)).await?;

        let caps = surface.get_capabilities(&adapter);
        let (format, backbuffer_format) = surface_format(&caps.formats, settings.hdr_enabled)
            .ok_or_else(|| DeviceError::Surface("no supported surface format".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: settings.window.present_mode(&caps.present_modes),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            "Surface configured: {}x{} {:?} {:?}",
            config.width, config.height, config.format, config.present_mode
        );

        let backbuffer_desc = TextureDesc::new_2d(
            config.width,
            config.height,
            backbuffer_format,
            TextureUsage::RENDER_TARGET,
        )
        .with_label("backbuffer");

        let mut objects = SlotMap::with_key();
        let backbuffer = RawTexture(raw_of(objects.insert(GpuObject::Backbuffer)));

        Ok(Self {
            device,
            queue,
            features,
            surface: Some(SurfaceTarget {
                surface,
                config,
                present_modes: caps.present_modes,
                vsync: settings.window.vsync,
                frame: None,
            }),
            objects,
            backbuffer,
            backbuffer_desc,
            bound: BoundState::default(),
            pipelines: HashMap::new(),
        })
    }

    async fn offscreen_async(width: u32, height: u32) -> DeviceResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let (_adapter, device, queue, features) = request_device(&instance, None).await?;

        let mut gpu = Self {
            device,
            queue,
            features,
            surface: None,
            objects: SlotMap::with_key(),
            backbuffer: RawTexture(0),
            backbuffer_desc: TextureDesc::new_2d(
                width.max(1),
                height.max(1),
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE,
            )
            .with_label("backbuffer"),
            bound: BoundState::default(),
            pipelines: HashMap::new(),
        };
        let desc = gpu.backbuffer_desc.clone();
        gpu.backbuffer = gpu.create_texture(&desc, &[])?;
        Ok(gpu)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn insert(&mut self, object: GpuObject) -> u64 {
        raw_of(self.objects.insert(object))
    }

    fn get(&self, raw: u64) -> Option<&GpuObject> {
        self.objects.get(key_of(raw))
    }

    fn shader(&self, shader: RawShader) -> Option<&ShaderObject> {
        match self.get(shader.0) {
            Some(GpuObject::Shader(object)) => Some(object),
            _ => None,
        }
    }

    fn buffer(&self, buffer: RawBuffer) -> Option<&wgpu::Buffer> {
        match self.get(buffer.0) {
            Some(GpuObject::Buffer(buffer)) => Some(buffer),
            _ => None,
        }
    }

    /// Resolves a view to the texture view it renders into, its format and size.
    fn target(&self, view: RawView) -> Option<(&wgpu::TextureView, wgpu::TextureFormat, (u32, u32))> {
        match self.get(view.0)? {
            GpuObject::View { view, format, size } => Some((view, *format, *size)),
            GpuObject::BackbufferView => {
                let target = self.surface.as_ref()?;
                let (_, view) = target.frame.as_ref()?;
                Some((view, target.config.format, (target.config.width, target.config.height)))
            }
            _ => None,
        }
    }

    fn uses_backbuffer(&self, views: &[RawView]) -> bool {
        views
            .iter()
            .any(|view| matches!(self.get(view.0), Some(GpuObject::BackbufferView)))
    }

    /// Acquires the swap chain image for this frame if it is not held yet.
    fn ensure_frame(&mut self) -> DeviceResult<()> {
        let Some(target) = self.surface.as_mut() else {
            return Ok(());
        };
        if target.frame.is_some() {
            return Ok(());
        }
        let frame = match target.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("Surface lost or outdated, reconfiguring");
                target.surface.configure(&self.device, &target.config);
                target
                    .surface
                    .get_current_texture()
                    .map_err(|err| DeviceError::Surface(err.to_string()))?
            }
            Err(err) => return Err(DeviceError::Surface(err.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        target.frame = Some((frame, view));
        Ok(())
    }

    fn prepare_targets(&mut self, views: &[RawView]) -> DeviceResult<()> {
        if self.uses_backbuffer(views) {
            self.ensure_frame()?;
        }
        Ok(())
    }

    fn validated<T>(&self, label: &str, create: impl FnOnce(&wgpu::Device) -> T) -> DeviceResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let object = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(DeviceError::Compilation {
                label: label.to_string(),
                message: err.to_string(),
            }),
            None => Ok(object),
        }
    }

    fn build_pipeline(&self, key: &PipelineKey) -> Option<CachedPipeline> {
        let vertex = self.shader(key.vertex)?;
        let pixel = key.pixel.and_then(|shader| self.shader(shader));

        let groups = [
            self.group_layout("vertex bindings", wgpu::ShaderStages::VERTEX, Some(&vertex.bindings)),
            self.group_layout(
                "pixel bindings",
                wgpu::ShaderStages::FRAGMENT,
                pixel.map(|p| &p.bindings),
            ),
        ];
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Pipeline Layout"),
                bind_group_layouts: &[&groups[VERTEX_GROUP], &groups[PIXEL_GROUP]],
                push_constant_ranges: &[],
            });

        let elements: &[InputElement] = match key.layout.and_then(|l| self.get(l.0)) {
            Some(GpuObject::Layout(elements)) => elements,
            _ => &[],
        };
        let mut offset = 0u64;
        let attributes: Vec<wgpu::VertexAttribute> = elements
            .iter()
            .enumerate()
            .map(|(location, element)| {
                let attribute = wgpu::VertexAttribute {
                    format: vertex_format(element.format),
                    offset,
                    shader_location: location as u32,
                };
                offset += element.format.size() as u64;
                attribute
            })
            .collect();
        let vertex_buffers = if key.stride > 0 {
            vec![wgpu::VertexBufferLayout {
                array_stride: key.stride as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }]
        } else {
            Vec::new()
        };

        let raster = match key.rasterizer.and_then(|s| self.get(s.0)) {
            Some(GpuObject::Rasterizer(desc)) => *desc,
            _ => RasterizerDesc::default(),
        };
        let blend = match key.blend.and_then(|s| self.get(s.0)) {
            Some(GpuObject::Blend(desc)) => *desc,
            _ => BlendDesc::default(),
        };
        let depth_state = match key.depth_state.and_then(|s| self.get(s.0)) {
            Some(GpuObject::DepthStencil(desc)) => *desc,
            _ => DepthStencilDesc::default(),
        };

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: blend.enabled.then(|| wgpu::BlendState {
                        color: blend_component(blend.color),
                        alpha: blend_component(blend.alpha),
                    }),
                    write_mask: wgpu::ColorWrites::from_bits_truncate(blend.write_mask.bits() as u32),
                })
            })
            .collect();

        let strip = matches!(key.topology, Topology::LineStrip | Topology::TriangleStrip);
        let primitive = wgpu::PrimitiveState {
            topology: topology(key.topology),
            strip_index_format: strip.then_some(wgpu::IndexFormat::Uint32),
            front_face: if raster.front_counter_clockwise {
                wgpu::FrontFace::Ccw
            } else {
                wgpu::FrontFace::Cw
            },
            cull_mode: match raster.cull {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            unclipped_depth: !raster.depth_clip
                && self.features.contains(wgpu::Features::DEPTH_CLIP_CONTROL),
            polygon_mode: if raster.fill == FillMode::Wireframe
                && self.features.contains(wgpu::Features::POLYGON_MODE_LINE)
            {
                wgpu::PolygonMode::Line
            } else {
                wgpu::PolygonMode::Fill
            },
            conservative: false,
        };

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: depth_state.depth_enable && depth_state.depth_write,
            depth_compare: if depth_state.depth_enable {
                compare(depth_state.depth_func)
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: if depth_state.stencil_enable && format.has_stencil_aspect() {
                wgpu::StencilState {
                    front: stencil_face(depth_state.front),
                    back: stencil_face(depth_state.back),
                    read_mask: depth_state.stencil_read_mask as u32,
                    write_mask: depth_state.stencil_write_mask as u32,
                }
            } else {
                wgpu::StencilState::default()
            },
            bias: wgpu::DepthBiasState {
                constant: raster.depth_bias,
                slope_scale: 0.0,
                clamp: 0.0,
            },
        });

        let created = self.validated("render pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(&vertex.entry_point),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: pixel.map(|pixel| wgpu::FragmentState {
                    module: &pixel.module,
                    entry_point: Some(&pixel.entry_point),
                    targets: &color_targets,
                    compilation_options: Default::default(),
                }),
                primitive,
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });
        match created {
            Ok(pipeline) => {
                debug!("Created pipeline for {:?}", key);
                Some(CachedPipeline { pipeline, groups })
            }
            Err(err) => {
                error!("{}", err);
                None
            }
        }
    }

    fn group_layout(
        &self,
        label: &str,
        visibility: wgpu::ShaderStages,
        bindings: Option<&StageBindings>,
    ) -> wgpu::BindGroupLayout {
        let mut entries = Vec::new();
        if let Some(bindings) = bindings {
            for &(slot, size) in &bindings.constant_buffers {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: slot,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(size as u64),
                    },
                    count: None,
                });
            }
            for texture in &bindings.textures {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: TEXTURE_BINDING_BASE + texture.slot,
                    visibility,
                    ty: wgpu::BindingType::Texture {
                        sample_type: match texture.sample {
                            SampleKind::Float => wgpu::TextureSampleType::Float { filterable: true },
                            SampleKind::UnfilterableFloat => {
                                wgpu::TextureSampleType::Float { filterable: false }
                            }
                            SampleKind::Depth => wgpu::TextureSampleType::Depth,
                        },
                        view_dimension: match texture.dimension {
                            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                            TextureDimension::D2Array => wgpu::TextureViewDimension::D2Array,
                            TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
                        },
                        multisampled: false,
                    },
                    count: None,
                });
            }
            for sampler in &bindings.samplers {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: SAMPLER_BINDING_BASE + sampler.slot,
                    visibility,
                    ty: wgpu::BindingType::Sampler(if sampler.comparison {
                        wgpu::SamplerBindingType::Comparison
                    } else {
                        wgpu::SamplerBindingType::Filtering
                    }),
                    count: None,
                });
            }
        }
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            })
    }

    fn bind_group(
        &self,
        stage: ShaderStage,
        layout: &wgpu::BindGroupLayout,
    ) -> DeviceResult<wgpu::BindGroup> {
        let bindings = self.bound.shaders[stage.index()]
            .and_then(|shader| self.shader(shader))
            .map(|shader| &shader.bindings);

        let mut entries = Vec::new();
        if let Some(bindings) = bindings {
            for &(slot, _) in &bindings.constant_buffers {
                let buffer = self
                    .bound
                    .constant_buffers
                    .get(&(stage, slot))
                    .and_then(|buffer| self.buffer(*buffer))
                    .ok_or_else(|| DeviceError::MissingBinding(format!("{:?} b{}", stage, slot)))?;
                entries.push(wgpu::BindGroupEntry {
                    binding: slot,
                    resource: buffer.as_entire_binding(),
                });
            }
            for texture in &bindings.textures {
                let view = match self
                    .bound
                    .textures
                    .get(&(stage, texture.slot))
                    .and_then(|view| self.get(view.0))
                {
                    Some(GpuObject::View { view, .. }) => view,
                    _ => {
                        return Err(DeviceError::MissingBinding(format!(
                            "{:?} t{}",
                            stage, texture.slot
                        )))
                    }
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: TEXTURE_BINDING_BASE + texture.slot,
                    resource: wgpu::BindingResource::TextureView(view),
                });
            }
            for sampler in &bindings.samplers {
                let sampler_object = match self
                    .bound
                    .samplers
                    .get(&(stage, sampler.slot))
                    .and_then(|s| self.get(s.0))
                {
                    Some(GpuObject::Sampler(sampler)) => sampler,
                    _ => {
                        return Err(DeviceError::MissingBinding(format!(
                            "{:?} s{}",
                            stage, sampler.slot
                        )))
                    }
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: SAMPLER_BINDING_BASE + sampler.slot,
                    resource: wgpu::BindingResource::Sampler(sampler_object),
                });
            }
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Stage Bind Group"),
            layout,
            entries: &entries,
        }))
    }

    fn draw_with(&mut self, kind: DrawKind) {
        if let Err(err) = self.try_draw(kind) {
            warn!("Draw skipped: {}", err);
        }
    }

    fn try_draw(&mut self, kind: DrawKind) -> DeviceResult<()> {
        let vertex = self.bound.shaders[ShaderStage::Vertex.index()]
            .ok_or_else(|| DeviceError::MissingBinding("vertex shader".into()))?;
        let pixel = self.bound.shaders[ShaderStage::Pixel.index()];

        let mut views = self.bound.targets.clone();
        views.extend(self.bound.depth_stencil);
        self.prepare_targets(&views)?;

        let colors: Vec<_> = if pixel.is_some() {
            self.bound
                .targets
                .iter()
                .map(|view| self.target(*view).ok_or(DeviceError::UnknownHandle(view.0)))
                .collect::<DeviceResult<_>>()?
        } else {
            Vec::new()
        };
        let depth = match self.bound.depth_stencil {
            Some(view) => Some(self.target(view).ok_or(DeviceError::UnknownHandle(view.0))?),
            None => None,
        };
        let target_size = colors
            .first()
            .or(depth.as_ref())
            .map(|(_, _, size)| *size)
            .ok_or_else(|| DeviceError::MissingBinding("render target".into()))?;

        let key = PipelineKey {
            vertex,
            pixel,
            layout: self.bound.layout,
            stride: self.bound.vertex_buffer.map_or(0, |(_, stride)| stride),
            rasterizer: self.bound.rasterizer,
            blend: self.bound.blend,
            depth_state: self.bound.depth_stencil_state,
            color_formats: colors.iter().map(|(_, format, _)| *format).collect(),
            depth_format: depth.as_ref().map(|(_, format, _)| *format),
            topology: self.bound.topology.unwrap_or(Topology::TriangleList),
        };

        if !self.pipelines.contains_key(&key) {
            let built = self.build_pipeline(&key);
            self.pipelines.insert(key.clone(), built);
        }
        let cached = self
            .pipelines
            .get(&key)
            .and_then(Option::as_ref)
            .ok_or_else(|| DeviceError::InvalidDescriptor("pipeline creation failed".into()))?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let recorded = self.record_draw(&key, cached, target_size, kind);
        let scope = pollster::block_on(self.device.pop_error_scope());
        recorded?;
        match scope {
            Some(err) => Err(DeviceError::InvalidDescriptor(err.to_string())),
            None => Ok(()),
        }
    }

    fn record_draw(
        &self,
        key: &PipelineKey,
        cached: &CachedPipeline,
        target_size: (u32, u32),
        kind: DrawKind,
    ) -> DeviceResult<()> {
        let vertex_group = self.bind_group(ShaderStage::Vertex, &cached.groups[VERTEX_GROUP])?;
        let pixel_group = self.bind_group(ShaderStage::Pixel, &cached.groups[PIXEL_GROUP])?;

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = if key.pixel.is_some() {
            self.bound
                .targets
                .iter()
                .filter_map(|view| self.target(*view))
                .map(|(view, _, _)| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect()
        } else {
            Vec::new()
        };
        let depth_stencil_attachment = self
            .bound
            .depth_stencil
            .and_then(|view| self.target(view))
            .map(|(view, format, _)| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: format.has_stencil_aspect().then_some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
            });

        let vertex_buffer = match self.bound.vertex_buffer {
            Some((buffer, stride)) if stride > 0 => Some(
                self.buffer(buffer)
                    .ok_or(DeviceError::UnknownHandle(buffer.0))?,
            ),
            _ => None,
        };
        let index_buffer = match kind {
            DrawKind::Indexed { .. } => {
                let buffer = self
                    .bound
                    .index_buffer
                    .ok_or_else(|| DeviceError::MissingBinding("index buffer".into()))?;
                Some(self.buffer(buffer).ok_or(DeviceError::UnknownHandle(buffer.0))?)
            }
            DrawKind::Vertices(_) => None,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Draw Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Draw Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some(viewport) = self.bound.viewport {
                let Some((x, y, w, h)) = clamp_viewport(&viewport, target_size) else {
                    return Ok(());
                };
                pass.set_viewport(x, y, w, h, viewport.min_depth, viewport.max_depth);
            }
            pass.set_pipeline(&cached.pipeline);
            pass.set_bind_group(VERTEX_GROUP as u32, &vertex_group, &[]);
            pass.set_bind_group(PIXEL_GROUP as u32, &pixel_group, &[]);
            if let Some(buffer) = vertex_buffer {
                pass.set_vertex_buffer(0, buffer.slice(..));
            }
            match (kind, index_buffer) {
                (DrawKind::Indexed { indices, instances }, Some(buffer)) => {
                    pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..indices, 0, 0..instances);
                }
                (DrawKind::Vertices(count), _) => pass.draw(0..count, 0..1),
                (DrawKind::Indexed { .. }, None) => {}
            }
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn clear_pass(&mut self, view: RawView, color: Option<[f32; 4]>, depth: Option<f32>) {
        if let Err(err) = self.prepare_targets(&[view]) {
            warn!("Clear skipped: {}", err);
            return;
        }
        let Some((target, format, _)) = self.target(view) else {
            warn!("Clear of unknown view {}", view.0);
            return;
        };

        let color_attachment = color.map(|[r, g, b, a]| wgpu::RenderPassColorAttachment {
            view: target,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                store: wgpu::StoreOp::Store,
            },
        });
        let depth_attachment = depth.map(|depth| wgpu::RenderPassDepthStencilAttachment {
            view: target,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(depth),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: format.has_stencil_aspect().then_some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(0),
                store: wgpu::StoreOp::Store,
            }),
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear Encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[color_attachment],
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
    }
}

async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> DeviceResult<(wgpu::Adapter, wgpu::Device, wgpu::Queue, wgpu::Features)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|err| DeviceError::Adapter(err.to_string()))?;
    info!("Using adapter {:?}", adapter.get_info());

    let wanted = wgpu::Features::POLYGON_MODE_LINE
        | wgpu::Features::DEPTH_CLIP_CONTROL
        | wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
    let required_features = adapter.features() & wanted;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(|err| DeviceError::Adapter(err.to_string()))?;
    Ok((adapter, device, queue, required_features))
}

/// Intersects a viewport with the target; `None` when nothing is left.
fn clamp_viewport(viewport: &Viewport, (width, height): (u32, u32)) -> Option<(f32, f32, f32, f32)> {
    let (width, height) = (width as f32, height as f32);
    let x = viewport.x.clamp(0.0, width);
    let y = viewport.y.clamp(0.0, height);
    let w = (viewport.x + viewport.width).min(width) - x;
    let h = (viewport.y + viewport.height).min(height) - y;
    (w > 0.0 && h > 0.0).then_some((x, y, w, h))
}

fn to_wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// Half-float when HDR is on and offered, else the first linear format, else
/// whatever the surface lists first that we can describe.
fn surface_format(
    formats: &[wgpu::TextureFormat],
    hdr: bool,
) -> Option<(wgpu::TextureFormat, TextureFormat)> {
    let is_hdr = |f: &wgpu::TextureFormat| *f == wgpu::TextureFormat::Rgba16Float;
    let all = formats.iter().copied();
    all.clone()
        .filter(|f| hdr && is_hdr(f))
        .chain(all.clone().filter(|f| !f.is_srgb() && !is_hdr(f)))
        .chain(all)
        .find_map(|f| from_wgpu_format(f).map(|ours| (f, ours)))
}

fn from_wgpu_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    Some(match format {
        wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
        wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
        _ => return None,
    })
}

fn compare(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

fn blend_component(component: BlendComponent) -> wgpu::BlendComponent {
    wgpu::BlendComponent {
        src_factor: blend_factor(component.src),
        dst_factor: blend_factor(component.dst),
        operation: match component.op {
            BlendOp::Add => wgpu::BlendOperation::Add,
            BlendOp::Subtract => wgpu::BlendOperation::Subtract,
            BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            BlendOp::Min => wgpu::BlendOperation::Min,
            BlendOp::Max => wgpu::BlendOperation::Max,
        },
    }
}

fn stencil_op(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

fn stencil_face(face: StencilFace) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: compare(face.func),
        fail_op: stencil_op(face.fail),
        depth_fail_op: stencil_op(face.depth_fail),
        pass_op: stencil_op(face.pass),
    }
}

fn topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32 => wgpu::VertexFormat::Float32,
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

fn address_mode(mode: AddressMode, features: wgpu::Features) -> wgpu::AddressMode {
    match mode {
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Border if features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER) => {
            wgpu::AddressMode::ClampToBorder
        }
        AddressMode::Border => wgpu::AddressMode::ClampToEdge,
    }
}

fn border_color(color: [f32; 4]) -> wgpu::SamplerBorderColor {
    match color {
        [0.0, 0.0, 0.0, 0.0] => wgpu::SamplerBorderColor::TransparentBlack,
        [0.0, 0.0, 0.0, _] => wgpu::SamplerBorderColor::OpaqueBlack,
        _ => wgpu::SamplerBorderColor::OpaqueWhite,
    }
}

impl GraphicsDevice for WgpuDevice {
    fn backbuffer(&mut self) -> DeviceResult<(RawTexture, TextureDesc)> {
        Ok((self.backbuffer, self.backbuffer_desc.clone()))
    }

    fn create_texture(&mut self, desc: &TextureDesc, layers: &[&[u8]]) -> DeviceResult<RawTexture> {
        desc.validate(layers)?;

        let mut usage = wgpu::TextureUsages::COPY_DST;
        if desc.usage.contains(TextureUsage::SHADER_RESOURCE) {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if desc
            .usage
            .intersects(TextureUsage::RENDER_TARGET | TextureUsage::DEPTH_STENCIL)
        {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: desc.array_size,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size,
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: to_wgpu_format(desc.format),
            usage,
            view_formats: &[],
        });

        for (layer, data) in layers.iter().enumerate() {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &data[..desc.layer_size()],
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                    rows_per_image: Some(desc.height),
                },
                wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
            );
        }

        Ok(RawTexture(self.insert(GpuObject::Texture {
            texture,
            desc: desc.clone(),
        })))
    }

    fn create_shader_view(&mut self, texture: RawTexture) -> DeviceResult<RawView> {
        let object = match self.get(texture.0) {
            Some(GpuObject::Texture { texture, desc }) => {
                if !desc.usage.contains(TextureUsage::SHADER_RESOURCE) {
                    return Err(DeviceError::InvalidDescriptor(format!(
                        "texture {:?} was not created for sampling",
                        desc.label
                    )));
                }
                let dimension = if desc.cube {
                    wgpu::TextureViewDimension::Cube
                } else if desc.array_size > 1 {
                    wgpu::TextureViewDimension::D2Array
                } else {
                    wgpu::TextureViewDimension::D2
                };
                let aspect = if desc.format.is_depth() {
                    wgpu::TextureAspect::DepthOnly
                } else {
                    wgpu::TextureAspect::All
                };
                GpuObject::View {
                    view: texture.create_view(&wgpu::TextureViewDescriptor {
                        label: desc.label.as_deref(),
                        dimension: Some(dimension),
                        aspect,
                        ..Default::default()
                    }),
                    format: to_wgpu_format(desc.format),
                    size: (desc.width, desc.height),
                }
            }
            _ => return Err(DeviceError::UnknownHandle(texture.0)),
        };
        Ok(RawView(self.insert(object)))
    }

    fn create_render_target_view(&mut self, texture: RawTexture) -> DeviceResult<RawView> {
        let object = match self.get(texture.0) {
            Some(GpuObject::Backbuffer) => GpuObject::BackbufferView,
            Some(GpuObject::Texture { texture, desc }) => {
                if !desc.usage.contains(TextureUsage::RENDER_TARGET) {
                    return Err(DeviceError::InvalidDescriptor(format!(
                        "texture {:?} was not created as a render target",
                        desc.label
                    )));
                }
                GpuObject::View {
                    view: texture.create_view(&wgpu::TextureViewDescriptor {
                        label: desc.label.as_deref(),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        mip_level_count: Some(1),
                        array_layer_count: Some(1),
                        ..Default::default()
                    }),
                    format: to_wgpu_format(desc.format),
                    size: (desc.width, desc.height),
                }
            }
            _ => return Err(DeviceError::UnknownHandle(texture.0)),
        };
        Ok(RawView(self.insert(object)))
    }

    fn create_depth_stencil_view(
        &mut self,
        texture: RawTexture,
        view_desc: &DepthStencilViewDesc,
    ) -> DeviceResult<RawView> {
        let object = match self.get(texture.0) {
            Some(GpuObject::Texture { texture, desc }) => {
                if !desc.usage.contains(TextureUsage::DEPTH_STENCIL)
                    || !view_desc.format.is_depth()
                    || view_desc.format != desc.format
                {
                    return Err(DeviceError::InvalidDescriptor(format!(
                        "texture {:?} cannot be viewed as {:?}",
                        desc.label, view_desc.format
                    )));
                }
                GpuObject::View {
                    view: texture.create_view(&wgpu::TextureViewDescriptor {
                        label: desc.label.as_deref(),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        mip_level_count: Some(1),
                        array_layer_count: Some(1),
                        ..Default::default()
                    }),
                    format: to_wgpu_format(desc.format),
                    size: (desc.width, desc.height),
                }
            }
            _ => return Err(DeviceError::UnknownHandle(texture.0)),
        };
        Ok(RawView(self.insert(object)))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> DeviceResult<RawSampler> {
        if desc.max_anisotropy == 0 || desc.min_lod > desc.max_lod {
            return Err(DeviceError::InvalidDescriptor(format!(
                "sampler anisotropy {} / lod range {}..{}",
                desc.max_anisotropy, desc.min_lod, desc.max_lod
            )));
        }
        let (filter, anisotropy) = match desc.filter {
            Filter::Point => (wgpu::FilterMode::Nearest, 1),
            Filter::Linear => (wgpu::FilterMode::Linear, 1),
            Filter::Anisotropic => (wgpu::FilterMode::Linear, desc.max_anisotropy.clamp(1, 16)),
        };
        let uses_border = [desc.address_u, desc.address_v, desc.address_w].contains(&AddressMode::Border);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sampler"),
            address_mode_u: address_mode(desc.address_u, self.features),
            address_mode_v: address_mode(desc.address_v, self.features),
            address_mode_w: address_mode(desc.address_w, self.features),
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            lod_min_clamp: desc.min_lod,
            lod_max_clamp: desc.max_lod.min(32.0),
            compare: desc.compare.map(compare),
            anisotropy_clamp: anisotropy,
            border_color: uses_border.then(|| border_color(desc.border_color)),
        });
        Ok(RawSampler(self.insert(GpuObject::Sampler(sampler))))
    }

    fn create_shader_stage(&mut self, desc: &StageDesc<'_>) -> DeviceResult<RawShader> {
        if !matches!(desc.stage, ShaderStage::Vertex | ShaderStage::Pixel) {
            return Err(DeviceError::Unsupported(format!(
                "{:?} stage of {}",
                desc.stage, desc.label
            )));
        }
        if desc.source.trim().is_empty() {
            return Err(DeviceError::Compilation {
                label: desc.label.to_string(),
                message: "empty source".into(),
            });
        }
        let module = self.validated(desc.label, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            })
        })?;
        Ok(RawShader(self.insert(GpuObject::Shader(ShaderObject {
            module,
            stage: desc.stage,
            entry_point: desc.entry_point.to_string(),
            bindings: desc.bindings.clone(),
        }))))
    }

    fn create_input_layout(
        &mut self,
        elements: &[InputElement],
        vertex_shader: RawShader,
    ) -> DeviceResult<RawLayout> {
        match self.shader(vertex_shader) {
            Some(shader) if shader.stage == ShaderStage::Vertex => {}
            _ => return Err(DeviceError::UnknownHandle(vertex_shader.0)),
        }
        if elements.is_empty() {
            return Err(DeviceError::InvalidDescriptor("empty input layout".into()));
        }
        Ok(RawLayout(self.insert(GpuObject::Layout(elements.to_vec()))))
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> DeviceResult<RawBuffer> {
        if contents.is_empty() {
            return Err(DeviceError::InvalidDescriptor(format!("empty {:?} buffer", kind)));
        }
        let (label, usage) = match kind {
            BufferKind::Vertex => ("Vertex Buffer", wgpu::BufferUsages::VERTEX),
            BufferKind::Index => ("Index Buffer", wgpu::BufferUsages::INDEX),
            BufferKind::Constant => ("Constant Buffer", wgpu::BufferUsages::UNIFORM),
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            });
        Ok(RawBuffer(self.insert(GpuObject::Buffer(buffer))))
    }

    fn create_rasterizer_state(&mut self, desc: &RasterizerDesc) -> DeviceResult<RawState> {
        if desc.fill == FillMode::Wireframe && !self.features.contains(wgpu::Features::POLYGON_MODE_LINE) {
            warn!("Wireframe fill is not supported by this adapter; drawing solid");
        }
        Ok(RawState(self.insert(GpuObject::Rasterizer(*desc))))
    }

    fn create_blend_state(&mut self, desc: &BlendDesc) -> DeviceResult<RawState> {
        Ok(RawState(self.insert(GpuObject::Blend(*desc))))
    }

    fn create_depth_stencil_state(&mut self, desc: &DepthStencilDesc) -> DeviceResult<RawState> {
        Ok(RawState(self.insert(GpuObject::DepthStencil(*desc))))
    }

    fn release(&mut self, resource: RawResource) {
        let raw = match resource {
            RawResource::Texture(t) => t.0,
            RawResource::View(v) => v.0,
            RawResource::Sampler(s) => s.0,
            RawResource::Shader(s) => s.0,
            RawResource::Layout(l) => l.0,
            RawResource::Buffer(b) => b.0,
            RawResource::State(s) => s.0,
        };
        match self.objects.remove(key_of(raw)) {
            Some(GpuObject::Texture { texture, .. }) => texture.destroy(),
            Some(GpuObject::Buffer(buffer)) => buffer.destroy(),
            Some(_) => {}
            None => {
                warn!("Release of unknown object {:?}", resource);
                return;
            }
        }
        self.pipelines.retain(|key, _| !key.references(raw));
    }

    fn write_buffer(&mut self, buffer: RawBuffer, data: &[u8]) {
        match self.buffer(buffer) {
            Some(target) => self.queue.write_buffer(target, 0, data),
            None => warn!("Write to unknown buffer {}", buffer.0),
        }
    }

    fn set_vertex_buffer(&mut self, buffer: RawBuffer, stride: u32) {
        self.bound.vertex_buffer = Some((buffer, stride));
    }

    fn set_index_buffer(&mut self, buffer: RawBuffer) {
        self.bound.index_buffer = Some(buffer);
    }

    fn set_input_layout(&mut self, layout: Option<RawLayout>) {
        self.bound.layout = layout;
    }

    fn set_shader(&mut self, stage: ShaderStage, shader: Option<RawShader>) {
        self.bound.shaders[stage.index()] = shader;
    }

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: Option<RawBuffer>) {
        match buffer {
            Some(buffer) => self.bound.constant_buffers.insert((stage, slot), buffer),
            None => self.bound.constant_buffers.remove(&(stage, slot)),
        };
    }

    fn set_texture(&mut self, stage: ShaderStage, slot: u32, view: Option<RawView>) {
        match view {
            Some(view) => self.bound.textures.insert((stage, slot), view),
            None => self.bound.textures.remove(&(stage, slot)),
        };
    }

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<RawSampler>) {
        match sampler {
            Some(sampler) => self.bound.samplers.insert((stage, slot), sampler),
            None => self.bound.samplers.remove(&(stage, slot)),
        };
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.bound.viewport = Some(*viewport);
    }

    fn set_rasterizer_state(&mut self, state: RawState) {
        self.bound.rasterizer = Some(state);
    }

    fn set_blend_state(&mut self, state: Option<RawState>) {
        self.bound.blend = state;
    }

    fn set_render_targets(&mut self, targets: &[RawView], depth_stencil: Option<RawView>) {
        self.bound.targets = targets.to_vec();
        self.bound.depth_stencil = depth_stencil;
    }

    fn set_depth_stencil_state(&mut self, state: RawState) {
        self.bound.depth_stencil_state = Some(state);
    }

    fn set_topology(&mut self, topology: Topology) {
        self.bound.topology = Some(topology);
    }

    fn draw(&mut self, vertex_count: u32) {
        self.draw_with(DrawKind::Vertices(vertex_count));
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.draw_with(DrawKind::Indexed {
            indices: index_count,
            instances: instance_count,
        });
    }

    fn clear_render_target(&mut self, view: RawView, color: [f32; 4]) {
        self.clear_pass(view, Some(color), None);
    }

    fn clear_depth_stencil(&mut self, view: RawView, depth: f32) {
        self.clear_pass(view, None, Some(depth));
    }

    fn present(&mut self, vsync: bool) -> DeviceResult<()> {
        let Some(target) = self.surface.as_mut() else {
            return Ok(());
        };
        if let Some((frame, view)) = target.frame.take() {
            drop(view);
            frame.present();
        }
        if vsync != target.vsync {
            target.vsync = vsync;
            target.config.present_mode = WindowSettings {
                vsync,
                ..WindowSettings::default()
            }
            .present_mode(&target.present_modes);
            target.surface.configure(&self.device, &target.config);
            info!("Present mode switched to {:?}", target.config.present_mode);
        }
        Ok(())
    }
}
