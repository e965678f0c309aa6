//! The native graphics API seam.
//!
//! [`GraphicsDevice`] has the shape of an immediate-mode context: objects are
//! created from plain descriptors and referred to by raw handles, and pipeline
//! state is set slot by slot before each draw. The renderer only talks to the
//! GPU through this trait.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! raw_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

raw_handle!(
    /// Native texture resource.
    RawTexture,
    /// Shader-resource, render-target or depth-stencil view of a texture.
    RawView,
    RawSampler,
    /// One compiled program stage.
    RawShader,
    /// Vertex input layout bound to a vertex shader signature.
    RawLayout,
    RawBuffer,
    /// Rasterizer, blend or depth-stencil state object.
    RawState,
);

/// Any native object, for release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawResource {
    Texture(RawTexture),
    View(RawView),
    Sampler(RawSampler),
    Shader(RawShader),
    Layout(RawLayout),
    Buffer(RawBuffer),
    State(RawState),
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("unsupported by this device: {0}")]
    Unsupported(String),
    #[error("shader compilation failed for {label}: {message}")]
    Compilation { label: String, message: String },
    #[error("unknown native handle {0}")]
    UnknownHandle(u64),
    #[error("nothing bound for {0}")]
    MissingBinding(String),
    #[error("no suitable adapter: {0}")]
    Adapter(String),
    #[error("surface error: {0}")]
    Surface(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Domain,
    Hull,
    Compute,
    Pixel,
}

impl ShaderStage {
    pub const COUNT: usize = 6;

    /// Lookup order for stage files on disk.
    pub const ALL: [ShaderStage; Self::COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::Geometry,
        ShaderStage::Domain,
        ShaderStage::Hull,
        ShaderStage::Compute,
        ShaderStage::Pixel,
    ];

    pub const fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Geometry => 1,
            ShaderStage::Domain => 2,
            ShaderStage::Hull => 3,
            ShaderStage::Compute => 4,
            ShaderStage::Pixel => 5,
        }
    }

    /// Suffix used in stage file names, e.g. `Forward_Phong_vs.wgsl`.
    pub const fn file_suffix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::Geometry => "gs",
            ShaderStage::Domain => "ds",
            ShaderStage::Hull => "hs",
            ShaderStage::Compute => "cs",
            ShaderStage::Pixel => "ps",
        }
    }

    pub const fn default_entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Geometry => "gs_main",
            ShaderStage::Domain => "ds_main",
            ShaderStage::Hull => "hs_main",
            ShaderStage::Compute => "cs_main",
            ShaderStage::Pixel => "fs_main",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Depth24PlusStencil8,
    Depth32Float,
}

impl TextureFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::R32Float
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth24PlusStencil8 | TextureFormat::Depth32Float
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SHADER_RESOURCE = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
        const COPY_DST = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    /// Layers; six for a cubemap.
    pub array_size: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub cube: bool,
}

impl TextureDesc {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            width,
            height,
            mip_levels: 1,
            array_size: 1,
            format,
            usage,
            cube: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Byte size of one full layer of mip 0.
    pub fn layer_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }

    /// Checks the description and optional initial data the way a driver
    /// would before allocating anything.
    pub fn validate(&self, layers: &[&[u8]]) -> DeviceResult<()> {
        if self.width == 0 || self.height == 0 || self.mip_levels == 0 || self.array_size == 0 {
            return Err(DeviceError::InvalidDescriptor(format!(
                "texture {:?} has a zero dimension",
                self.label
            )));
        }
        if self.cube && (self.array_size != 6 || self.width != self.height) {
            return Err(DeviceError::InvalidDescriptor(
                "cubemaps need six square layers".into(),
            ));
        }
        if self.format.is_depth() && self.usage.contains(TextureUsage::RENDER_TARGET) {
            return Err(DeviceError::InvalidDescriptor(format!(
                "{:?} cannot be a color target",
                self.format
            )));
        }
        if layers.is_empty() {
            return Ok(());
        }
        if self.format.is_depth() {
            return Err(DeviceError::InvalidDescriptor(
                "depth textures cannot take initial data".into(),
            ));
        }
        if layers.len() != self.array_size as usize {
            return Err(DeviceError::InvalidDescriptor(format!(
                "expected {} layers of initial data, got {}",
                self.array_size,
                layers.len()
            )));
        }
        if let Some(short) = layers.iter().find(|layer| layer.len() < self.layer_size()) {
            return Err(DeviceError::InvalidDescriptor(format!(
                "layer holds {} bytes, {} required",
                short.len(),
                self.layer_size()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilViewDesc {
    pub format: TextureFormat,
}

impl Default for DepthStencilViewDesc {
    fn default() -> Self {
        Self {
            format: TextureFormat::Depth24PlusStencil8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Point,
    Linear,
    Anisotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub compare: Option<CompareFunction>,
    pub max_anisotropy: u16,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: [f32; 4],
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::Linear,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            compare: None,
            max_anisotropy: 1,
            min_lod: 0.0,
            max_lod: f32::MAX,
            border_color: [0.0; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    Front,
    None,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerDesc {
    pub cull: CullMode,
    pub fill: FillMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_clip: bool,
    pub scissor: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            cull: CullMode::Back,
            fill: FillMode::Solid,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_clip: true,
            scissor: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub op: BlendOp,
}

impl BlendComponent {
    pub const REPLACE: Self = Self {
        src: BlendFactor::One,
        dst: BlendFactor::Zero,
        op: BlendOp::Add,
    };
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// Blend configuration applied to every bound color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendDesc {
    pub enabled: bool,
    pub color: BlendComponent,
    pub alpha: BlendComponent,
    pub write_mask: ColorWrites,
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self {
            enabled: false,
            color: BlendComponent::REPLACE,
            alpha: BlendComponent::REPLACE,
            write_mask: ColorWrites::ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
    pub func: CompareFunction,
}

impl StencilFace {
    pub const KEEP: Self = Self {
        fail: StencilOp::Keep,
        depth_fail: StencilOp::Keep,
        pass: StencilOp::Keep,
        func: CompareFunction::Always,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: StencilFace,
    pub back: StencilFace,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front: StencilFace {
                depth_fail: StencilOp::IncrementWrap,
                ..StencilFace::KEEP
            },
            back: StencilFace {
                depth_fail: StencilOp::DecrementWrap,
                ..StencilFace::KEEP
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub const fn size(self) -> u32 {
        match self {
            VertexFormat::Float32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// One vertex attribute; attributes are packed back to back in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputElement {
    pub semantic: String,
    pub format: VertexFormat,
}

impl InputElement {
    pub fn new(semantic: impl Into<String>, format: VertexFormat) -> Self {
        Self {
            semantic: semantic.into(),
            format,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureDimension {
    #[default]
    D2,
    D2Array,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    #[default]
    Float,
    UnfilterableFloat,
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSlot {
    pub slot: u32,
    pub dimension: TextureDimension,
    pub sample: SampleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerSlot {
    pub slot: u32,
    pub comparison: bool,
}

/// Register usage of one compiled stage, the reflection data a native
/// compiler would report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StageBindings {
    /// `(slot, byte size)` per constant buffer.
    pub constant_buffers: Vec<(u32, u32)>,
    pub textures: Vec<TextureSlot>,
    pub samplers: Vec<SamplerSlot>,
}

pub struct StageDesc<'a> {
    pub label: &'a str,
    pub stage: ShaderStage,
    pub source: &'a str,
    pub entry_point: &'a str,
    pub bindings: StageBindings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Constant,
}

/// Immediate-context style native API.
///
/// Creation calls return raw handles owned by the caller until passed to
/// [`GraphicsDevice::release`]. Binding calls only record state; nothing is
/// executed until a clear or draw.
pub trait GraphicsDevice {
    /// Texture backing the swap chain, with its description.
    fn backbuffer(&mut self) -> DeviceResult<(RawTexture, TextureDesc)>;

    fn create_texture(&mut self, desc: &TextureDesc, layers: &[&[u8]]) -> DeviceResult<RawTexture>;
    fn create_shader_view(&mut self, texture: RawTexture) -> DeviceResult<RawView>;
    fn create_render_target_view(&mut self, texture: RawTexture) -> DeviceResult<RawView>;
    fn create_depth_stencil_view(
        &mut self,
        texture: RawTexture,
        desc: &DepthStencilViewDesc,
    ) -> DeviceResult<RawView>;
    fn create_sampler(&mut self, desc: &SamplerDesc) -> DeviceResult<RawSampler>;
    fn create_shader_stage(&mut self, desc: &StageDesc<'_>) -> DeviceResult<RawShader>;
    fn create_input_layout(
        &mut self,
        elements: &[InputElement],
        vertex_shader: RawShader,
    ) -> DeviceResult<RawLayout>;
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> DeviceResult<RawBuffer>;
    fn create_rasterizer_state(&mut self, desc: &RasterizerDesc) -> DeviceResult<RawState>;
    fn create_blend_state(&mut self, desc: &BlendDesc) -> DeviceResult<RawState>;
    fn create_depth_stencil_state(&mut self, desc: &DepthStencilDesc) -> DeviceResult<RawState>;
    fn release(&mut self, resource: RawResource);

    /// Replaces the whole contents of a constant buffer.
    fn write_buffer(&mut self, buffer: RawBuffer, data: &[u8]);

    fn set_vertex_buffer(&mut self, buffer: RawBuffer, stride: u32);
    fn set_index_buffer(&mut self, buffer: RawBuffer);
    fn set_input_layout(&mut self, layout: Option<RawLayout>);
    fn set_shader(&mut self, stage: ShaderStage, shader: Option<RawShader>);
    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: Option<RawBuffer>);
    fn set_texture(&mut self, stage: ShaderStage, slot: u32, view: Option<RawView>);
    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<RawSampler>);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_rasterizer_state(&mut self, state: RawState);
    fn set_blend_state(&mut self, state: Option<RawState>);
    fn set_render_targets(&mut self, targets: &[RawView], depth_stencil: Option<RawView>);
    fn set_depth_stencil_state(&mut self, state: RawState);
    fn set_topology(&mut self, topology: Topology);

    fn draw(&mut self, vertex_count: u32);
    fn draw_indexed(&mut self, index_count: u32, instance_count: u32);

    fn clear_render_target(&mut self, view: RawView, color: [f32; 4]);
    fn clear_depth_stencil(&mut self, view: RawView, depth: f32);

    fn present(&mut self, vsync: bool) -> DeviceResult<()>;
}
