pub mod buffer;
pub mod commands;
pub mod constants;
pub mod device;
pub mod error;
pub mod gpu;
pub mod handle;
pub mod headless;
pub mod primitives;
pub mod renderer;
pub mod shader;
pub mod state;
pub mod states;
pub mod table;
pub mod texture;

pub use buffer::{v, BufferObject, Vertex};
pub use device::{GraphicsDevice, Topology};
pub use error::RenderError;
pub use gpu::WgpuDevice;
pub use handle::*;
pub use headless::{DeviceCall, HeadlessDevice};
pub use primitives::cube_mesh;
pub use renderer::Renderer;
pub use shader::ShaderDesc;
pub use state::{PipelineState, MAX_RENDER_TARGETS};
pub use states::{DefaultBlendState, DefaultRasterizerState};
pub use texture::DecodedImage;
