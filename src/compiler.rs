//! Compilation of instance records into indexed indirect draw commands.
//!
//! Every slot of the instance buffer gets exactly one [`DrawCommand`] at the same
//! index, so command `i` always draws slot `i` through `first_instance`. Slots that
//! must not be drawn (tombstoned, hidden, or referencing a mesh outside the catalog)
//! still get a command, with zero counts, which the multi-draw skips for free.
//!
//! The kernel runs on the GPU (`compile_commands.wgsl`). [`compile_commands`] is the
//! same kernel on the CPU; the recording backend executes it and tests compare GPU
//! read-backs against it.

use crate::{
    backend::GpuBackend,
    buffers::GpuBufferSet,
    data_structures::{instance::Instance, mesh::MeshDescriptor},
    error::GpuError,
};

/// Threads per workgroup of the compile shader. Must match `@workgroup_size`.
pub const WORKGROUP_SIZE: u32 = 64;

/**
 * One indexed indirect draw, laid out like `wgpu::util::DrawIndexedIndirectArgs`.
 *
 * `index_count` is taken from the mesh descriptor's `vertex_count`.
 */
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawCommand {
    pub const SIZE: u64 = std::mem::size_of::<DrawCommand>() as u64;

    /// A command that draws nothing but still points at its own slot.
    pub fn empty(slot: u32) -> Self {
        Self {
            first_instance: slot,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index_count == 0 || self.instance_count == 0
    }
}

/// Uniform block of the compile shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompileParams {
    pub slot_count: u32,
    pub mesh_count: u32,
    pub _padding: [u32; 2],
}

impl CompileParams {
    pub fn new(slot_count: u32, mesh_count: u32) -> Self {
        Self {
            slot_count,
            mesh_count,
            _padding: [0; 2],
        }
    }

    /// Workgroups needed to cover `slot_count` threads.
    pub fn workgroup_count(&self) -> u32 {
        self.slot_count.div_ceil(WORKGROUP_SIZE)
    }
}

/// Everything a backend needs to run the compile pass.
pub struct CompilePass<'a, B> {
    pub instances: &'a B,
    pub meshes: &'a B,
    pub commands: &'a B,
    pub params: CompileParams,
}

/// The command for `instance` sitting at `slot`.
pub fn compile_command(slot: u32, instance: &Instance, meshes: &[MeshDescriptor]) -> DrawCommand {
    if !instance.is_live() || !instance.is_visible() {
        return DrawCommand::empty(slot);
    }
    match meshes.get(instance.mesh_id() as usize) {
        Some(mesh) => DrawCommand {
            index_count: mesh.vertex_count,
            instance_count: 1,
            first_index: mesh.base_index,
            base_vertex: mesh.base_vertex as i32,
            first_instance: slot,
        },
        None => DrawCommand::empty(slot),
    }
}

/// CPU version of the compile shader: one command per entry of `instances`.
pub fn compile_commands(instances: &[Instance], meshes: &[MeshDescriptor]) -> Vec<DrawCommand> {
    instances
        .iter()
        .enumerate()
        .map(|(slot, instance)| compile_command(slot as u32, instance, meshes))
        .collect()
}

/// Drives the compile pass over a [`GpuBufferSet`].
#[derive(Debug, Default)]
pub struct DrawCommandCompiler;

impl DrawCommandCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regenerates the first `slot_count` commands and returns how many the
    /// following multi-draw should issue.
    ///
    /// Both the instance and mesh-descriptor buffers must already hold the data of
    /// this frame. Nothing is submitted when there are no slots or no buffers yet.
    pub fn compile<B: GpuBackend>(
        &self,
        gpu: &mut B,
        buffers: &GpuBufferSet<B>,
        slot_count: u32,
        mesh_count: u32,
    ) -> Result<u32, GpuError> {
        let (Some(instances), Some(meshes), Some(commands)) = (
            buffers.instance_buffer(),
            buffers.mesh_buffer(),
            buffers.command_buffer(),
        ) else {
            return Ok(0);
        };
        if slot_count == 0 {
            return Ok(0);
        }

        debug_assert!(slot_count as usize <= buffers.capacity());
        let pass = CompilePass {
            instances,
            meshes,
            commands,
            params: CompileParams::new(slot_count, mesh_count),
        };
        gpu.compile_draw_commands(&pass)?;
        Ok(slot_count)
    }
}
