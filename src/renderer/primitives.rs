use glam::Vec3;

use super::buffer::Vertex;

/// Unit cube centered on the origin, four vertices per face so every face
/// has its own normal, tangent and full 0..1 UVs.
pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, tangent) per face; bitangent is normal x tangent.
    const FACES: [([f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent) in FACES {
        let n = Vec3::from(normal);
        let t = Vec3::from(tangent);
        let b = n.cross(t);
        let base = vertices.len() as u32;
        for (u, w) in CORNERS {
            let pos = (n + t * u + b * w) * 0.5;
            vertices.push(Vertex {
                pos: pos.to_array(),
                normal,
                tangent,
                uv: [(u + 1.0) * 0.5, (1.0 - w) * 0.5],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_24_vertices_and_12_triangles() {
        let (vertices, indices) = cube_mesh();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn cube_vertices_lie_on_their_face() {
        let (vertices, _) = cube_mesh();
        for vertex in &vertices {
            let pos = Vec3::from(vertex.pos);
            let normal = Vec3::from(vertex.normal);
            assert!((pos.dot(normal) - 0.5).abs() < 1e-6);
            assert!(pos.abs().max_element() <= 0.5 + 1e-6);
        }
    }

    #[test]
    fn triangles_wind_counter_clockwise_seen_from_outside() {
        let (vertices, indices) = cube_mesh();
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(vertices[i as usize].pos));
            let face_normal = (b - a).cross(c - a);
            let normal = Vec3::from(vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(normal) > 0.0);
        }
    }
}
