//! The seam between the instance manager and a graphics API.
//!
//! Everything the manager does on the GPU goes through [`GpuBackend`]: creating and
//! destroying the three buffers it owns, writing byte ranges into them, running the
//! draw-command compile pass and issuing the final multi-draw. Calls arrive in
//! submission order and a backend must execute them in that order.
//!
//! - `wgpu_backend` drives a real device through wgpu
//! - `recording` mirrors every buffer in memory and records each call, for tests
//!   and for running the manager without a GPU

pub mod recording;
pub mod wgpu_backend;

use crate::{compiler::CompilePass, error::GpuError, render::IndirectDraw};

/// Which of the manager's buffers a request is for. Backends derive usage flags
/// from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Instance records; read by the compile pass and by the vertex stage.
    Instances,
    /// Mesh descriptors; read by the compile pass.
    MeshDescriptors,
    /// Indexed indirect commands; written by the compile pass, read by the draw.
    DrawCommands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSpec<'a> {
    pub label: &'a str,
    pub role: BufferRole,
    pub size: u64,
}

pub trait GpuBackend {
    type Buffer;

    /// Allocates a buffer. Contents are unspecified until written.
    fn create_buffer(&mut self, spec: &BufferSpec<'_>) -> Result<Self::Buffer, GpuError>;

    /// Releases a buffer. Work already submitted against it still completes.
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// Writes `data` at byte `offset`. Both are multiples of four.
    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    /// Records the pass that fills `pass.commands` from instances and meshes.
    fn compile_draw_commands(&mut self, pass: &CompilePass<'_, Self::Buffer>)
    -> Result<(), GpuError>;

    /// Records one multi-draw over `draw.commands`.
    fn multi_draw_indexed_indirect(
        &mut self,
        draw: &IndirectDraw<'_, Self::Buffer>,
    ) -> Result<(), GpuError>;
}
