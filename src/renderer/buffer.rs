use bytemuck::{Pod, Zeroable};
use std::mem;

use super::device::{
    BufferKind, DeviceResult, GraphicsDevice, InputElement, RawBuffer, RawResource, VertexFormat,
};

/// The one vertex layout every geometry buffer uses.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u32 = mem::size_of::<Vertex>() as u32;

    pub fn input_layout() -> Vec<InputElement> {
        vec![
            InputElement::new("POSITION", VertexFormat::Float32x3),
            InputElement::new("NORMAL", VertexFormat::Float32x3),
            InputElement::new("TANGENT", VertexFormat::Float32x3),
            InputElement::new("TEXCOORD", VertexFormat::Float32x2),
        ]
    }
}

#[inline]
pub fn v(pos: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Vertex {
    Vertex {
        pos,
        normal,
        tangent: [0.0; 3],
        uv,
    }
}

/// Vertex and optional index buffer of one mesh.
#[derive(Debug)]
pub struct BufferObject {
    pub vertex_buffer: RawBuffer,
    pub index_buffer: Option<RawBuffer>,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl BufferObject {
    pub fn create<D: GraphicsDevice>(
        device: &mut D,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> DeviceResult<Self> {
        let vertex_buffer =
            device.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(vertices))?;
        let index_buffer = if indices.is_empty() {
            None
        } else {
            match device.create_buffer(BufferKind::Index, bytemuck::cast_slice(indices)) {
                Ok(buffer) => Some(buffer),
                Err(err) => {
                    device.release(RawResource::Buffer(vertex_buffer));
                    return Err(err);
                }
            }
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        })
    }

    pub(crate) fn release<D: GraphicsDevice>(&self, device: &mut D) {
        device.release(RawResource::Buffer(self.vertex_buffer));
        if let Some(index_buffer) = self.index_buffer {
            device.release(RawResource::Buffer(index_buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::HeadlessDevice;

    #[test]
    fn input_layout_covers_the_whole_vertex() {
        let total: u32 = Vertex::input_layout().iter().map(|e| e.format.size()).sum();
        assert_eq!(total, Vertex::STRIDE);
    }

    #[test]
    fn create_uploads_vertices_and_indices() {
        let mut device = HeadlessDevice::default();
        let vertices = [
            v([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
            v([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            v([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        ];
        let object = BufferObject::create(&mut device, &vertices, &[0, 1, 2]).unwrap();

        assert_eq!(object.vertex_count, 3);
        assert_eq!(object.index_count, 3);
        let index_buffer = object.index_buffer.unwrap();
        assert_eq!(device.buffer_kind(index_buffer), Some(BufferKind::Index));
        assert_eq!(device.buffer_kind(object.vertex_buffer), Some(BufferKind::Vertex));
        assert_eq!(
            device.buffer_contents(index_buffer),
            Some(bytemuck::cast_slice::<u32, u8>(&[0, 1, 2]))
        );
        assert_eq!(
            device.buffer_contents(object.vertex_buffer).map(|b| b.len()),
            Some(3 * Vertex::STRIDE as usize)
        );
    }

    #[test]
    fn vertices_only_has_no_index_buffer() {
        let mut device = HeadlessDevice::default();
        let object = BufferObject::create(&mut device, &[Vertex::zeroed()], &[]).unwrap();
        assert!(object.index_buffer.is_none());
    }
}
