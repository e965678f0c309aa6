use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::buffer::Vertex;
use super::constants::{pack_layout, ConstantBuffer, ConstantRegistry, PackedConstant};
use super::device::{
    BufferKind, DeviceError, GraphicsDevice, InputElement, RawBuffer, RawLayout, RawResource,
    RawShader, SampleKind, SamplerSlot, ShaderStage, StageBindings, StageDesc, TextureDimension,
    TextureSlot,
};
use super::handle::{CpuConstantId, ShaderId};

#[derive(Debug, Error)]
pub enum ShaderLoadError {
    #[error("no suitable shader paths for {name}")]
    NoStages { name: String },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse shader manifest {path:?}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("constant buffer {buffer} of {name} does not fit in 32-bit offsets")]
    Layout { name: String, buffer: String },
    #[error("device rejected shader {name}: {source}")]
    Device {
        name: String,
        #[source]
        source: DeviceError,
    },
}

/// One program stage. Without inline `source` the code is read from
/// `<shader_root>/<name>_<suffix>.wgsl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSource {
    pub stage: ShaderStage,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantDecl {
    pub name: String,
    pub size: u32,
    #[serde(default)]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantBufferDesc {
    pub name: String,
    pub stage: ShaderStage,
    pub slot: u32,
    pub constants: Vec<ConstantDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureBindDesc {
    pub name: String,
    pub stage: ShaderStage,
    pub slot: u32,
    #[serde(default)]
    pub dimension: TextureDimension,
    #[serde(default)]
    pub sample: SampleKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerBindDesc {
    pub name: String,
    pub stage: ShaderStage,
    pub slot: u32,
    #[serde(default)]
    pub comparison: bool,
}

/// Everything needed to build a [`Shader`]: stage code plus the register
/// usage a shader compiler would reflect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderDesc {
    pub name: String,
    /// Empty means "look for every stage suffix on disk".
    #[serde(default)]
    pub stages: Vec<StageSource>,
    #[serde(default = "Vertex::input_layout")]
    pub input_layout: Vec<InputElement>,
    #[serde(default)]
    pub constant_buffers: Vec<ConstantBufferDesc>,
    #[serde(default)]
    pub textures: Vec<TextureBindDesc>,
    #[serde(default)]
    pub samplers: Vec<SamplerBindDesc>,
}

impl ShaderDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            input_layout: Vertex::input_layout(),
            constant_buffers: Vec::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: ShaderStage, source: impl Into<String>) -> Self {
        self.stages.push(StageSource {
            stage,
            source: Some(source.into()),
            entry_point: None,
        });
        self
    }

    /// Appends a constant buffer; `constants` are `(name, byte size)` pairs.
    pub fn with_constant_buffer(
        mut self,
        name: &str,
        stage: ShaderStage,
        slot: u32,
        constants: &[(&str, u32)],
    ) -> Self {
        self.constant_buffers.push(ConstantBufferDesc {
            name: name.to_string(),
            stage,
            slot,
            constants: constants
                .iter()
                .map(|(name, size)| ConstantDecl {
                    name: name.to_string(),
                    size: *size,
                    offset: None,
                })
                .collect(),
        });
        self
    }

    pub fn with_texture(mut self, name: &str, stage: ShaderStage, slot: u32) -> Self {
        self.textures.push(TextureBindDesc {
            name: name.to_string(),
            stage,
            slot,
            dimension: TextureDimension::D2,
            sample: SampleKind::Float,
        });
        self
    }

    pub fn with_sampler(mut self, name: &str, stage: ShaderStage, slot: u32) -> Self {
        self.samplers.push(SamplerBindDesc {
            name: name.to_string(),
            stage,
            slot,
            comparison: false,
        });
        self
    }

    fn stage_path(&self, root: &Path, stage: ShaderStage) -> PathBuf {
        root.join(format!("{}_{}.wgsl", self.name, stage.file_suffix()))
    }

    /// Stage code in stage order, reading from disk where needed.
    fn resolve_sources(
        &self,
        root: &Path,
    ) -> Result<Vec<(ShaderStage, String, String)>, ShaderLoadError> {
        let mut sources = Vec::new();
        if self.stages.is_empty() {
            for stage in ShaderStage::ALL {
                let path = self.stage_path(root, stage);
                if path.exists() {
                    let code = read_source(&path)?;
                    sources.push((stage, code, stage.default_entry_point().to_string()));
                }
            }
        } else {
            for entry in &self.stages {
                let code = match &entry.source {
                    Some(code) => code.clone(),
                    None => read_source(&self.stage_path(root, entry.stage))?,
                };
                let entry_point = entry
                    .entry_point
                    .clone()
                    .unwrap_or_else(|| entry.stage.default_entry_point().to_string());
                sources.push((entry.stage, code, entry_point));
            }
        }

        if sources.is_empty() {
            return Err(ShaderLoadError::NoStages {
                name: self.name.clone(),
            });
        }
        Ok(sources)
    }

    fn stage_bindings(&self, stage: ShaderStage, buffer_sizes: &[u32]) -> StageBindings {
        StageBindings {
            constant_buffers: self
                .constant_buffers
                .iter()
                .zip(buffer_sizes)
                .filter(|(cb, _)| cb.stage == stage)
                .map(|(cb, size)| (cb.slot, *size))
                .collect(),
            textures: self
                .textures
                .iter()
                .filter(|t| t.stage == stage)
                .map(|t| TextureSlot {
                    slot: t.slot,
                    dimension: t.dimension,
                    sample: t.sample,
                })
                .collect(),
            samplers: self
                .samplers
                .iter()
                .filter(|s| s.stage == stage)
                .map(|s| SamplerSlot {
                    slot: s.slot,
                    comparison: s.comparison,
                })
                .collect(),
        }
    }
}

fn read_source(path: &Path) -> Result<String, ShaderLoadError> {
    crate::io::load_text(path).map_err(|source| ShaderLoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON array of [`ShaderDesc`].
pub fn load_manifest(path: &Path) -> Result<Vec<ShaderDesc>, ShaderLoadError> {
    let text = read_source(path)?;
    serde_json::from_str(&text).map_err(|source| ShaderLoadError::Manifest {
        path: path.to_path_buf(),
        source,
    })
}

/// Named texture or sampler input of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindPoint {
    pub name: String,
    pub stage: ShaderStage,
    pub slot: u32,
}

/// A compiled program: its stages, input layout, constant buffers and bind
/// points.
pub struct Shader {
    name: String,
    stages: [Option<RawShader>; ShaderStage::COUNT],
    layout: Option<RawLayout>,
    input_layout: Vec<InputElement>,
    pub(crate) constant_buffers: Vec<ConstantBuffer>,
    /// `(index into constant_buffers, staging constant)` in declaration order.
    pub(crate) constants: Vec<(usize, CpuConstantId)>,
    textures: Vec<BindPoint>,
    samplers: Vec<BindPoint>,
}

impl Shader {
    pub fn compile<D: GraphicsDevice>(
        device: &mut D,
        desc: &ShaderDesc,
        shader_root: &Path,
        registry: &mut ConstantRegistry,
    ) -> Result<Self, ShaderLoadError> {
        let sources = desc.resolve_sources(shader_root)?;
        let layouts = desc
            .constant_buffers
            .iter()
            .map(|cb| {
                pack_layout(cb.constants.iter().map(|c| (c.size, c.offset))).ok_or_else(|| {
                    ShaderLoadError::Layout {
                        name: desc.name.clone(),
                        buffer: cb.name.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let buffer_sizes: Vec<u32> = layouts.iter().map(|(_, size)| *size).collect();

        let mut created = Vec::new();
        let result = Self::create_objects(device, desc, &sources, &buffer_sizes, &mut created);
        let (stages, layout, buffers) = match result {
            Ok(objects) => objects,
            Err(source) => {
                for resource in created {
                    device.release(resource);
                }
                return Err(ShaderLoadError::Device {
                    name: desc.name.clone(),
                    source,
                });
            }
        };

        let mut constants = Vec::new();
        let constant_buffers = desc
            .constant_buffers
            .iter()
            .zip(layouts)
            .zip(buffers)
            .enumerate()
            .map(|(index, ((cb, (offsets, size)), buffer))| {
                let fields = cb
                    .constants
                    .iter()
                    .zip(offsets)
                    .map(|(decl, offset)| {
                        let constant = registry.register(&decl.name, decl.size as usize);
                        constants.push((index, constant));
                        PackedConstant { constant, offset }
                    })
                    .collect();
                ConstantBuffer {
                    name: cb.name.clone(),
                    buffer,
                    stage: cb.stage,
                    slot: cb.slot,
                    size,
                    dirty: false,
                    fields,
                }
            })
            .collect();

        let bind_points = |name: &str, stage, slot| BindPoint {
            name: name.to_string(),
            stage,
            slot,
        };

        Ok(Self {
            name: desc.name.clone(),
            stages,
            layout,
            input_layout: desc.input_layout.clone(),
            constant_buffers,
            constants,
            textures: desc
                .textures
                .iter()
                .map(|t| bind_points(&t.name, t.stage, t.slot))
                .collect(),
            samplers: desc
                .samplers
                .iter()
                .map(|s| bind_points(&s.name, s.stage, s.slot))
                .collect(),
        })
    }

    #[allow(clippy::type_complexity)]
    fn create_objects<D: GraphicsDevice>(
        device: &mut D,
        desc: &ShaderDesc,
        sources: &[(ShaderStage, String, String)],
        buffer_sizes: &[u32],
        created: &mut Vec<RawResource>,
    ) -> Result<
        (
            [Option<RawShader>; ShaderStage::COUNT],
            Option<RawLayout>,
            Vec<RawBuffer>,
        ),
        DeviceError,
    > {
        let mut stages = [None; ShaderStage::COUNT];
        for (stage, code, entry_point) in sources {
            let label = format!("{}_{}", desc.name, stage.file_suffix());
            let shader = device.create_shader_stage(&StageDesc {
                label: &label,
                stage: *stage,
                source: code,
                entry_point,
                bindings: desc.stage_bindings(*stage, buffer_sizes),
            })?;
            created.push(RawResource::Shader(shader));
            stages[stage.index()] = Some(shader);
        }

        // An empty layout means the vertex stage reads no vertex attributes.
        let layout = match stages[ShaderStage::Vertex.index()] {
            Some(vs) if !desc.input_layout.is_empty() => {
                let layout = device.create_input_layout(&desc.input_layout, vs)?;
                created.push(RawResource::Layout(layout));
                Some(layout)
            }
            _ => None,
        };

        let mut buffers = Vec::with_capacity(buffer_sizes.len());
        for size in buffer_sizes {
            let buffer = device.create_buffer(BufferKind::Constant, &vec![0u8; *size as usize])?;
            created.push(RawResource::Buffer(buffer));
            buffers.push(buffer);
        }

        Ok((stages, layout, buffers))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<RawShader> {
        self.stages[stage.index()]
    }

    pub fn input_layout(&self) -> &[InputElement] {
        &self.input_layout
    }

    pub(crate) fn layout(&self) -> Option<RawLayout> {
        self.layout
    }

    pub fn constant_buffers(&self) -> &[ConstantBuffer] {
        &self.constant_buffers
    }

    pub fn texture_bind_points(&self) -> &[BindPoint] {
        &self.textures
    }

    pub fn sampler_bind_points(&self) -> &[BindPoint] {
        &self.samplers
    }

    pub(crate) fn clear_dirty(&mut self) {
        for cb in &mut self.constant_buffers {
            cb.dirty = false;
        }
    }

    pub(crate) fn release<D: GraphicsDevice>(&self, device: &mut D) {
        for shader in self.stages.iter().flatten() {
            device.release(RawResource::Shader(*shader));
        }
        if let Some(layout) = self.layout {
            device.release(RawResource::Layout(layout));
        }
        for cb in &self.constant_buffers {
            device.release(RawResource::Buffer(cb.buffer));
        }
    }
}

/// Shader IDs by name, rebuilt on every (re)load.
#[derive(Default)]
pub struct ShaderRegistry {
    ids: HashMap<String, ShaderId>,
}

impl ShaderRegistry {
    pub fn register(&mut self, name: &str, id: ShaderId) {
        if self.ids.insert(name.to_string(), id).is_some() {
            info!("Shader {} registered again, now {:?}", name, id);
        }
    }

    pub fn get(&self, name: &str) -> Option<ShaderId> {
        self.ids.get(name).copied()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
