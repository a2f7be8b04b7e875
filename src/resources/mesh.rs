use cgmath::{InnerSpace, Vector3};

use crate::data_structures::model::ModelVertex;

/**
 * Converts one tobj model into pool vertices and mesh-relative indices.
 *
 * Obj files don't have to come with normals. When they are missing, the normals are
 * accumulated from the triangles so lighting still works.
 */
pub fn pool_geometry(m: &tobj::Model) -> (Vec<ModelVertex>, Vec<u32>) {
    let mut vertices = (0..m.mesh.positions.len() / 3)
        .map(|i| ModelVertex {
            position: [
                m.mesh.positions[i * 3],
                m.mesh.positions[i * 3 + 1],
                m.mesh.positions[i * 3 + 2],
            ],
            tex_coords: [
                m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                1.0 - m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
            ],
            normal: [
                m.mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                m.mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                m.mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
            ],
        })
        .collect::<Vec<_>>();

    let indices = m.mesh.indices.clone();
    if m.mesh.normals.is_empty() {
        accumulate_normals(&mut vertices, &indices);
    }
    (vertices, indices)
}

/// Area-weighted vertex normals. Out-of-range triangles are skipped; the catalog
/// rejects them later with a proper error.
fn accumulate_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut sums = vec![Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for c in indices.chunks_exact(3) {
        let [a, b, d] = [c[0] as usize, c[1] as usize, c[2] as usize];
        if a.max(b).max(d) >= vertices.len() {
            continue;
        }
        let pos0: Vector3<f32> = vertices[a].position.into();
        let pos1: Vector3<f32> = vertices[b].position.into();
        let pos2: Vector3<f32> = vertices[d].position.into();
        // Not normalized: larger triangles weigh more.
        let face = (pos1 - pos0).cross(pos2 - pos0);
        for i in [a, b, d] {
            sums[i] += face;
        }
    }
    for (vertex, sum) in vertices.iter_mut().zip(sums) {
        if sum.magnitude2() > 0.0 {
            vertex.normal = sum.normalize().into();
        }
    }
}
