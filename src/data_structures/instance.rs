//! Per-instance records as they are stored on the CPU and on the GPU.
//!
//! An [`Instance`] is plain old data: the arena keeps a `Vec<Instance>` and the
//! instance buffer on the GPU is a byte-for-byte copy of that vector, so a slot id
//! doubles as the index into both. The same record is read by the draw-command
//! compute pass (as a storage buffer) and by the vertex shader (as an
//! instance-stepped vertex buffer addressed through `first_instance`).

use bitflags::bitflags;
use cgmath::SquareMatrix;

use crate::data_structures::model;

/// Mesh id that marks a slot as deleted.
pub const TOMBSTONE: u8 = 0xFF;

/// Id that is never handed out for a live instance.
pub const INVALID_INSTANCE: u32 = u32::MAX;

bitflags! {
    /// Per-instance flag bits, stored in [`Instance::flags`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u8 {
        const VISIBLE = 1 << 0;
    }
}

/**
 * The raw instance is the actual data stored on the GPU.
 *
 * Layout matches `struct Instance` in the WGSL shaders: a column-major model matrix
 * followed by one packed word (mesh id, flags, material index) and padding up to the
 * 16 byte alignment of `mat4x4<f32>`.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Instance {
    local: [[f32; 4]; 4],
    mesh_id: u8,
    flags: u8,
    material_index: u16,
    _padding: [u32; 3],
}

impl Instance {
    /// Size of one record in bytes, on both sides of the bus.
    pub const SIZE: u64 = std::mem::size_of::<Instance>() as u64;

    /// A visible instance of `mesh_id` at the origin without rotation or scale.
    pub fn new(mesh_id: u8) -> Self {
        Self {
            local: cgmath::Matrix4::<f32>::identity().into(),
            mesh_id,
            flags: InstanceFlags::VISIBLE.bits(),
            material_index: 0,
            _padding: [0; 3],
        }
    }

    pub fn mesh_id(&self) -> u8 {
        self.mesh_id
    }

    pub fn is_live(&self) -> bool {
        self.mesh_id != TOMBSTONE
    }

    pub fn flags(&self) -> InstanceFlags {
        InstanceFlags::from_bits_truncate(self.flags)
    }

    pub fn is_visible(&self) -> bool {
        self.flags().contains(InstanceFlags::VISIBLE)
    }

    pub fn material_index(&self) -> u16 {
        self.material_index
    }

    pub fn local(&self) -> cgmath::Matrix4<f32> {
        self.local.into()
    }

    pub(crate) fn local_raw(&self) -> &[[f32; 4]; 4] {
        &self.local
    }

    pub(crate) fn set_local(&mut self, local: [[f32; 4]; 4]) {
        self.local = local;
    }

    pub(crate) fn set_material_index(&mut self, material_index: u16) {
        self.material_index = material_index;
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        let mut flags = self.flags();
        flags.set(InstanceFlags::VISIBLE, visible);
        self.flags = flags.bits();
    }

    /// Marks the slot as deleted. Everything but the mesh id is left as it was.
    pub(crate) fn tombstone(&mut self) {
        self.mesh_id = TOMBSTONE;
    }

    /// The header word as the shaders see it: `mesh | flags << 8 | material << 16`.
    pub fn packed_header(&self) -> u32 {
        u32::from(self.mesh_id)
            | u32::from(self.flags) << 8
            | u32::from(self.material_index) << 16
    }
}

/**
 * As the instance buffer is also bound as a vertex buffer we need to tell what the bytes refer to:
 *
 * stride: one full record, stepped once per instance.
 *
 * The model matrix occupies four vec4 slots, the packed header one u32 slot. The
 * padding is never read.
 */
impl model::Vertex for Instance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Instance>() as wgpu::BufferAddress,
            // The shader only moves on to the next record when it starts a new
            // instance; `first_instance` of each indirect command selects the slot.
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Uint32,
                },
            ],
        }
    }
}
