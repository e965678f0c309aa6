use std::collections::HashMap;

use super::device::*;

/// One immediate-context call as seen by [`HeadlessDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetVertexBuffer { buffer: RawBuffer, stride: u32 },
    SetIndexBuffer(RawBuffer),
    SetInputLayout(Option<RawLayout>),
    SetShader {
        stage: ShaderStage,
        shader: Option<RawShader>,
    },
    WriteBuffer { buffer: RawBuffer, data: Vec<u8> },
    SetConstantBuffer {
        stage: ShaderStage,
        slot: u32,
        buffer: Option<RawBuffer>,
    },
    SetTexture {
        stage: ShaderStage,
        slot: u32,
        view: Option<RawView>,
    },
    SetSampler {
        stage: ShaderStage,
        slot: u32,
        sampler: Option<RawSampler>,
    },
    SetViewport(Viewport),
    SetRasterizerState(RawState),
    SetBlendState(Option<RawState>),
    SetRenderTargets {
        targets: Vec<RawView>,
        depth_stencil: Option<RawView>,
    },
    SetDepthStencilState(RawState),
    SetTopology(Topology),
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    ClearRenderTarget { view: RawView, color: [f32; 4] },
    ClearDepthStencil { view: RawView, depth: f32 },
    Present { vsync: bool },
}

#[derive(Debug, Clone)]
enum Object {
    Texture(TextureDesc),
    View { texture: RawTexture },
    Sampler,
    Shader(ShaderStage),
    Layout,
    Buffer { kind: BufferKind, contents: Vec<u8> },
    State,
}

/// A device without a GPU.
///
/// Objects are validated the way a driver would reject them and then kept as
/// plain data. Every binding, draw and present call is appended to a log that
/// tests can inspect with [`HeadlessDevice::calls`].
pub struct HeadlessDevice {
    next_handle: u64,
    objects: HashMap<u64, Object>,
    calls: Vec<DeviceCall>,
    released: Vec<RawResource>,
    backbuffer: RawTexture,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        let mut device = Self {
            next_handle: 1,
            objects: HashMap::new(),
            calls: Vec::new(),
            released: Vec::new(),
            backbuffer: RawTexture(0),
        };
        let desc = TextureDesc::new_2d(
            width.max(1),
            height.max(1),
            TextureFormat::Bgra8Unorm,
            TextureUsage::RENDER_TARGET,
        )
        .with_label("backbuffer");
        device.backbuffer = RawTexture(device.alloc(Object::Texture(desc)));
        device
    }

    fn alloc(&mut self, object: Object) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }

    fn texture_desc(&self, texture: RawTexture) -> DeviceResult<&TextureDesc> {
        match self.objects.get(&texture.0) {
            Some(Object::Texture(desc)) => Ok(desc),
            _ => Err(DeviceError::UnknownHandle(texture.0)),
        }
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn buffer_contents(&self, buffer: RawBuffer) -> Option<&[u8]> {
        match self.objects.get(&buffer.0) {
            Some(Object::Buffer { contents, .. }) => Some(contents),
            _ => None,
        }
    }

    pub fn buffer_kind(&self, buffer: RawBuffer) -> Option<BufferKind> {
        match self.objects.get(&buffer.0) {
            Some(Object::Buffer { kind, .. }) => Some(*kind),
            _ => None,
        }
    }

    /// Texture a view was created from.
    pub fn view_texture(&self, view: RawView) -> Option<RawTexture> {
        match self.objects.get(&view.0) {
            Some(Object::View { texture }) => Some(*texture),
            _ => None,
        }
    }

    pub fn released(&self) -> &[RawResource] {
        &self.released
    }

    /// Objects created and not yet released, the back buffer included.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    fn record(&mut self, call: DeviceCall) {
        log::trace!("{:?}", call);
        self.calls.push(call);
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn backbuffer(&mut self) -> DeviceResult<(RawTexture, TextureDesc)> {
        let desc = self.texture_desc(self.backbuffer)?.clone();
        Ok((self.backbuffer, desc))
    }

    fn create_texture(&mut self, desc: &TextureDesc, layers: &[&[u8]]) -> DeviceResult<RawTexture> {
        desc.validate(layers)?;
        Ok(RawTexture(self.alloc(Object::Texture(desc.clone()))))
    }

    fn create_shader_view(&mut self, texture: RawTexture) -> DeviceResult<RawView> {
        let desc = self.texture_desc(texture)?;
        if !desc.usage.contains(TextureUsage::SHADER_RESOURCE) {
            return Err(DeviceError::InvalidDescriptor(format!(
                "texture {:?} was not created for sampling",
                desc.label
            )));
        }
        Ok(RawView(self.alloc(Object::View { texture })))
    }

    fn create_render_target_view(&mut self, texture: RawTexture) -> DeviceResult<RawView> {
        let desc = self.texture_desc(texture)?;
        if !desc.usage.contains(TextureUsage::RENDER_TARGET) {
            return Err(DeviceError::InvalidDescriptor(format!(
                "texture {:?} was not created as a render target",
                desc.label
            )));
        }
        Ok(RawView(self.alloc(Object::View { texture })))
    }

    fn create_depth_stencil_view(
        &mut self,
        texture: RawTexture,
        desc: &DepthStencilViewDesc,
    ) -> DeviceResult<RawView> {
        let texture_desc = self.texture_desc(texture)?;
        if !texture_desc.usage.contains(TextureUsage::DEPTH_STENCIL) || !desc.format.is_depth() {
            return Err(DeviceError::InvalidDescriptor(format!(
                "texture {:?} cannot be viewed as {:?}",
                texture_desc.label, desc.format
            )));
        }
        Ok(RawView(self.alloc(Object::View { texture })))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> DeviceResult<RawSampler> {
        if desc.max_anisotropy == 0 || desc.min_lod > desc.max_lod {
            return Err(DeviceError::InvalidDescriptor(format!(
                "sampler anisotropy {} / lod range {}..{}",
                desc.max_anisotropy, desc.min_lod, desc.max_lod
            )));
        }
        Ok(RawSampler(self.alloc(Object::Sampler)))
    }

    fn create_shader_stage(&mut self, desc: &StageDesc<'_>) -> DeviceResult<RawShader> {
        if desc.source.trim().is_empty() {
            return Err(DeviceError::Compilation {
                label: desc.label.to_string(),
                message: "empty source".into(),
            });
        }
        Ok(RawShader(self.alloc(Object::Shader(desc.stage))))
    }

    fn create_input_layout(
        &mut self,
        elements: &[InputElement],
        vertex_shader: RawShader,
    ) -> DeviceResult<RawLayout> {
        match self.objects.get(&vertex_shader.0) {
            Some(Object::Shader(ShaderStage::Vertex)) => {}
            _ => return Err(DeviceError::UnknownHandle(vertex_shader.0)),
        }
        if elements.is_empty() {
            return Err(DeviceError::InvalidDescriptor("empty input layout".into()));
        }
        Ok(RawLayout(self.alloc(Object::Layout)))
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> DeviceResult<RawBuffer> {
        if contents.is_empty() {
            return Err(DeviceError::InvalidDescriptor(format!(
                "zero sized {:?} buffer",
                kind
            )));
        }
        let contents = contents.to_vec();
        Ok(RawBuffer(self.alloc(Object::Buffer { kind, contents })))
    }

    fn create_rasterizer_state(&mut self, _desc: &RasterizerDesc) -> DeviceResult<RawState> {
        Ok(RawState(self.alloc(Object::State)))
    }

    fn create_blend_state(&mut self, _desc: &BlendDesc) -> DeviceResult<RawState> {
        Ok(RawState(self.alloc(Object::State)))
    }

    fn create_depth_stencil_state(&mut self, _desc: &DepthStencilDesc) -> DeviceResult<RawState> {
        Ok(RawState(self.alloc(Object::State)))
    }

    fn release(&mut self, resource: RawResource) {
        let handle = match resource {
            RawResource::Texture(RawTexture(h))
            | RawResource::View(RawView(h))
            | RawResource::Sampler(RawSampler(h))
            | RawResource::Shader(RawShader(h))
            | RawResource::Layout(RawLayout(h))
            | RawResource::Buffer(RawBuffer(h))
            | RawResource::State(RawState(h)) => h,
        };
        if self.objects.remove(&handle).is_none() {
            log::warn!("Releasing unknown native object {:?}", resource);
        }
        self.released.push(resource);
    }

    fn write_buffer(&mut self, buffer: RawBuffer, data: &[u8]) {
        if let Some(Object::Buffer { contents, .. }) = self.objects.get_mut(&buffer.0) {
            let len = data.len().min(contents.len());
            contents[..len].copy_from_slice(&data[..len]);
        } else {
            log::warn!("write to unknown buffer {:?}", buffer);
        }
        self.record(DeviceCall::WriteBuffer {
            buffer,
            data: data.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, buffer: RawBuffer, stride: u32) {
        self.record(DeviceCall::SetVertexBuffer { buffer, stride });
    }

    fn set_index_buffer(&mut self, buffer: RawBuffer) {
        self.record(DeviceCall::SetIndexBuffer(buffer));
    }

    fn set_input_layout(&mut self, layout: Option<RawLayout>) {
        self.record(DeviceCall::SetInputLayout(layout));
    }

    fn set_shader(&mut self, stage: ShaderStage, shader: Option<RawShader>) {
        self.record(DeviceCall::SetShader { stage, shader });
    }

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, buffer: Option<RawBuffer>) {
        self.record(DeviceCall::SetConstantBuffer {
            stage,
            slot,
            buffer,
        });
    }

    fn set_texture(&mut self, stage: ShaderStage, slot: u32, view: Option<RawView>) {
        self.record(DeviceCall::SetTexture { stage, slot, view });
    }

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: Option<RawSampler>) {
        self.record(DeviceCall::SetSampler {
            stage,
            slot,
            sampler,
        });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(DeviceCall::SetViewport(*viewport));
    }

    fn set_rasterizer_state(&mut self, state: RawState) {
        self.record(DeviceCall::SetRasterizerState(state));
    }

    fn set_blend_state(&mut self, state: Option<RawState>) {
        self.record(DeviceCall::SetBlendState(state));
    }

    fn set_render_targets(&mut self, targets: &[RawView], depth_stencil: Option<RawView>) {
        self.record(DeviceCall::SetRenderTargets {
            targets: targets.to_vec(),
            depth_stencil,
        });
    }

    fn set_depth_stencil_state(&mut self, state: RawState) {
        self.record(DeviceCall::SetDepthStencilState(state));
    }

    fn set_topology(&mut self, topology: Topology) {
        self.record(DeviceCall::SetTopology(topology));
    }

    fn draw(&mut self, vertex_count: u32) {
        self.record(DeviceCall::Draw { vertex_count });
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.record(DeviceCall::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn clear_render_target(&mut self, view: RawView, color: [f32; 4]) {
        self.record(DeviceCall::ClearRenderTarget { view, color });
    }

    fn clear_depth_stencil(&mut self, view: RawView, depth: f32) {
        self.record(DeviceCall::ClearDepthStencil { view, depth });
    }

    fn present(&mut self, vsync: bool) -> DeviceResult<()> {
        self.record(DeviceCall::Present { vsync });
        Ok(())
    }
}
