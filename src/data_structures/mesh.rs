//! Shared mesh pool and the per-mesh descriptors instances refer to.
//!
//! All meshes live in one vertex pool and one index pool. A [`MeshDescriptor`]
//! locates a mesh inside those pools and is what the draw-command compiler looks up
//! for every instance. The catalog is built once and never changes afterwards.

use cgmath::Point3;

use crate::{
    data_structures::{instance::TOMBSTONE, model::ModelVertex},
    error::CatalogError,
};

/// Axis aligned bounding box in mesh-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// The box around all `positions`, or a degenerate box at the origin if empty.
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a [f32; 3]>) -> Self {
        let mut positions = positions.into_iter();
        let Some(first) = positions.next() else {
            return Self {
                min: Point3::new(0.0, 0.0, 0.0),
                max: Point3::new(0.0, 0.0, 0.0),
            };
        };
        let (mut min, mut max) = (*first, *first);
        for p in positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Self {
            min: min.into(),
            max: max.into(),
        }
    }
}

/**
 * GPU-side mesh record, laid out like `struct MeshDescriptor` in the compile shader.
 *
 * `vertex_count` is the number of pool indices the mesh draws, i.e. the element count
 * of the indexed draw.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshDescriptor {
    pub aabb_min: [f32; 3],
    pub base_vertex: u32,
    pub aabb_max: [f32; 3],
    pub base_index: u32,
    pub vertex_count: u32,
    _padding: [u32; 3],
}

impl MeshDescriptor {
    pub const SIZE: u64 = std::mem::size_of::<MeshDescriptor>() as u64;

    pub fn new(aabb: Aabb, base_vertex: u32, base_index: u32, vertex_count: u32) -> Self {
        Self {
            aabb_min: aabb.min.into(),
            base_vertex,
            aabb_max: aabb.max.into(),
            base_index,
            vertex_count,
            _padding: [0; 3],
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: self.aabb_min.into(),
            max: self.aabb_max.into(),
        }
    }
}

/// The shared vertex/index pool plus one descriptor per mesh.
#[derive(Clone, Debug, Default)]
pub struct MeshCatalog {
    vertices: Vec<ModelVertex>,
    indices: Vec<u32>,
    meshes: Vec<MeshDescriptor>,
    names: Vec<String>,
}

impl MeshCatalog {
    /// Mesh ids are stored in a byte and `0xFF` marks deleted instances.
    pub const MAX_MESHES: usize = TOMBSTONE as usize;

    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mesh to the pool and returns its id.
    ///
    /// `indices` are relative to `vertices`; they are stored unchanged and the draw
    /// offsets them through the descriptor's `base_vertex`.
    pub fn push_mesh(
        &mut self,
        name: &str,
        vertices: &[ModelVertex],
        indices: &[u32],
    ) -> Result<u32, CatalogError> {
        if self.meshes.len() >= Self::MAX_MESHES {
            return Err(CatalogError::TooManyMeshes(self.meshes.len()));
        }
        if indices.len() % 3 != 0 {
            return Err(CatalogError::NotTriangulated {
                name: name.to_string(),
                index_count: indices.len(),
            });
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(CatalogError::IndexOutOfBounds {
                name: name.to_string(),
                index,
                vertex_count: vertices.len(),
            });
        }

        let base_vertex =
            u32::try_from(self.vertices.len()).map_err(|_| CatalogError::PoolOverflow)?;
        let base_index =
            u32::try_from(self.indices.len()).map_err(|_| CatalogError::PoolOverflow)?;
        let vertex_count = u32::try_from(indices.len()).map_err(|_| CatalogError::PoolOverflow)?;
        base_vertex
            .checked_add(vertices.len() as u32)
            .and(base_index.checked_add(vertex_count))
            .ok_or(CatalogError::PoolOverflow)?;

        let aabb = Aabb::from_positions(vertices.iter().map(|v| &v.position));
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
        self.meshes
            .push(MeshDescriptor::new(aabb, base_vertex, base_index, vertex_count));
        self.names.push(name.to_string());

        Ok((self.meshes.len() - 1) as u32)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn get(&self, mesh_id: u32) -> Option<&MeshDescriptor> {
        self.meshes.get(mesh_id as usize)
    }

    pub fn name(&self, mesh_id: u32) -> Option<&str> {
        self.names.get(mesh_id as usize).map(String::as_str)
    }

    /// Id of the first mesh called `name`.
    pub fn find(&self, name: &str) -> Option<u32> {
        self.names.iter().position(|n| n == name).map(|i| i as u32)
    }

    pub fn descriptors(&self) -> &[MeshDescriptor] {
        &self.meshes
    }

    pub fn vertices(&self) -> &[ModelVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}
