// renderer/texture.rs

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::device::{
    DeviceError, DeviceResult, GraphicsDevice, RawResource, RawSampler, RawTexture, RawView,
    SamplerDesc, TextureDesc, TextureFormat, TextureUsage,
};
use super::handle::TextureId;

#[derive(Debug, Error)]
pub enum TextureLoadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cubemap face {path:?} is {width}x{height}, expected {expected:?}")]
    FaceSize {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: (u32, u32),
    },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Tightly packed RGBA8 pixels.
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    pub fn from_path(path: &Path) -> Result<Self, TextureLoadError> {
        log::info!("Loading texture: {:?}", path);
        let bytes = crate::io::load_binary(path).map_err(|source| TextureLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let img = image::load_from_memory(&bytes).map_err(|source| TextureLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }

    /// Six faces in +X, -X, +Y, -Y, +Z, -Z order, all the size of the first.
    pub fn cube_faces(paths: &[PathBuf; 6]) -> Result<Vec<Self>, TextureLoadError> {
        let mut faces: Vec<Self> = Vec::with_capacity(6);
        for path in paths {
            let face = Self::from_path(path)?;
            if let Some(first) = faces.first() {
                if (face.width, face.height) != (first.width, first.height) {
                    return Err(TextureLoadError::FaceSize {
                        path: path.clone(),
                        width: face.width,
                        height: face.height,
                        expected: (first.width, first.height),
                    });
                }
            }
            faces.push(face);
        }
        Ok(faces)
    }

    /// Procedural checkerboard, handy as a placeholder.
    pub fn checkerboard(size: u32, checker_size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut rgba = vec![0u8; rgba_len(size, size)];
        let checker_size = checker_size.max(1);

        for (i, texel) in rgba.chunks_exact_mut(4).enumerate() {
            let x = (i % size as usize) as u32;
            let y = (i / size as usize) as u32;
            let checker_x = (x / checker_size) % 2;
            let checker_y = (y / checker_size) % 2;
            let color = if (checker_x + checker_y) % 2 == 0 {
                color1
            } else {
                color2
            };
            texel.copy_from_slice(&color);
        }

        Self {
            width: size,
            height: size,
            rgba,
        }
    }
}

/// A native texture and, when sampleable, its shader view.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    pub texture: RawTexture,
    pub view: Option<RawView>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub cube: bool,
    /// The swap chain owns the back buffer; only its views are ours.
    pub(crate) swapchain: bool,
}

impl Texture {
    pub fn create<D: GraphicsDevice>(
        device: &mut D,
        name: &str,
        desc: &TextureDesc,
        layers: &[&[u8]],
    ) -> DeviceResult<Self> {
        let texture = device.create_texture(desc, layers)?;
        let view = if desc.usage.contains(TextureUsage::SHADER_RESOURCE) {
            match device.create_shader_view(texture) {
                Ok(view) => Some(view),
                Err(err) => {
                    device.release(RawResource::Texture(texture));
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Self {
            name: name.to_string(),
            texture,
            view,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            cube: desc.cube,
            swapchain: false,
        })
    }

    pub(crate) fn from_backbuffer(texture: RawTexture, desc: &TextureDesc) -> Self {
        Self {
            name: desc.label.clone().unwrap_or_else(|| "backbuffer".into()),
            texture,
            view: None,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            cube: false,
            swapchain: true,
        }
    }

    pub(crate) fn release<D: GraphicsDevice>(&self, device: &mut D) {
        if let Some(view) = self.view {
            device.release(RawResource::View(view));
        }
        if !self.swapchain {
            device.release(RawResource::Texture(self.texture));
        }
    }
}

#[derive(Debug)]
pub struct Sampler {
    pub sampler: RawSampler,
    pub desc: SamplerDesc,
}

/// Color target. The texture is a copy of the entry registered in the
/// texture table under `texture_id`, which owns the native object.
#[derive(Debug)]
pub struct RenderTarget {
    pub texture: Texture,
    pub texture_id: TextureId,
    pub view: RawView,
}

#[derive(Debug)]
pub struct DepthStencil {
    pub view: RawView,
    pub texture_id: TextureId,
    pub format: TextureFormat,
}

/// Byte length of a tightly packed RGBA8 image.
fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
