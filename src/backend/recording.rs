//! A [`GpuBackend`] without a GPU.
//!
//! Every buffer is mirrored in memory and every call is appended to a log, so the
//! whole instance pipeline (uploads, the compile pass, the final multi-draw) can be
//! observed and checked byte for byte. The compile pass runs the CPU kernel from
//! [`crate::compiler`] on the mirrored bytes.

use std::collections::HashMap;

use crate::{
    backend::{BufferRole, BufferSpec, GpuBackend},
    compiler::{self, CompilePass, DrawCommand},
    data_structures::{instance::Instance, mesh::MeshDescriptor},
    error::GpuError,
    render::IndirectDraw,
};

/// Handle of a mirrored buffer. Ids are never reused.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RecordedBuffer {
    id: usize,
}

impl RecordedBuffer {
    pub fn id(&self) -> usize {
        self.id
    }
}

/// One call made against the backend, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Create {
        buffer: usize,
        role: BufferRole,
        size: u64,
    },
    Destroy {
        buffer: usize,
    },
    Write {
        buffer: usize,
        offset: u64,
        len: usize,
    },
    Compile {
        slot_count: u32,
        mesh_count: u32,
    },
    Draw {
        draw_count: u32,
    },
}

#[derive(Debug)]
struct Mirror {
    label: String,
    role: BufferRole,
    data: Vec<u8>,
}

/// A multi-draw as it would have reached the GPU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedDraw {
    pub commands: Vec<DrawCommand>,
}

impl RecordedDraw {
    /// Slots the draw actually renders.
    pub fn drawn_slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.commands
            .iter()
            .filter(|command| !command.is_empty())
            .map(|command| command.first_instance)
    }
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    buffers: HashMap<usize, Mirror>,
    // Kept after destruction so old calls can still be attributed.
    roles: HashMap<usize, BufferRole>,
    next_id: usize,
    calls: Vec<Call>,
    draws: Vec<RecordedDraw>,
    allocations_left: Option<usize>,
    max_buffer_size: Option<u64>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the next `n` allocations succeed and fails every one after that, the
    /// way an exhausted device would.
    pub fn fail_allocations_after(&mut self, n: usize) {
        self.allocations_left = Some(n);
    }

    /// Allocations succeed again.
    pub fn heal(&mut self) {
        self.allocations_left = None;
    }

    /// Rejects buffers larger than `size` bytes with [`GpuError::CapacityExceeded`].
    pub fn with_max_buffer_size(mut self, size: u64) -> Self {
        self.max_buffer_size = Some(size);
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
        self.draws.clear();
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn last_draw(&self) -> Option<&RecordedDraw> {
        self.draws.last()
    }

    /// Number of buffers currently alive.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn creations(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Create { .. }))
            .count()
    }

    pub fn destructions(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Destroy { .. }))
            .count()
    }

    /// `(offset, len)` of every recorded write that went to a buffer of `role`.
    pub fn writes_to(&self, role: BufferRole) -> Vec<(u64, usize)> {
        self.calls
            .iter()
            .filter_map(|call| match *call {
                Call::Write {
                    buffer,
                    offset,
                    len,
                } if self.roles.get(&buffer) == Some(&role) => Some((offset, len)),
                _ => None,
            })
            .collect()
    }

    /// Current contents of `buffer`.
    pub fn contents(&self, buffer: &RecordedBuffer) -> &[u8] {
        self.buffers
            .get(&buffer.id)
            .map(|mirror| mirror.data.as_slice())
            .unwrap_or_default()
    }

    /// Contents of the one live buffer with `role`, if there is exactly one.
    pub fn contents_of(&self, role: BufferRole) -> Option<&[u8]> {
        let mut found = self.buffers.values().filter(|mirror| mirror.role == role);
        match (found.next(), found.next()) {
            (Some(mirror), None) => Some(mirror.data.as_slice()),
            _ => None,
        }
    }

    pub fn label(&self, buffer: &RecordedBuffer) -> Option<&str> {
        self.buffers
            .get(&buffer.id)
            .map(|mirror| mirror.label.as_str())
    }

    fn read<T: bytemuck::Pod>(&self, buffer: &RecordedBuffer, count: usize) -> Vec<T> {
        self.contents(buffer)
            .chunks_exact(std::mem::size_of::<T>())
            .take(count)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

impl GpuBackend for RecordingBackend {
    type Buffer = RecordedBuffer;

    fn create_buffer(&mut self, spec: &BufferSpec<'_>) -> Result<RecordedBuffer, GpuError> {
        if let Some(max) = self.max_buffer_size.filter(|&max| spec.size > max) {
            return Err(GpuError::CapacityExceeded {
                label: spec.label.to_string(),
                size: spec.size,
                max,
            });
        }
        match self.allocations_left {
            Some(0) => {
                return Err(GpuError::Allocation {
                    label: spec.label.to_string(),
                    size: spec.size,
                    reason: "out of memory".to_string(),
                });
            }
            Some(ref mut left) => *left -= 1,
            None => {}
        }

        let id = self.next_id;
        self.next_id += 1;
        self.roles.insert(id, spec.role);
        self.buffers.insert(
            id,
            Mirror {
                label: spec.label.to_string(),
                role: spec.role,
                data: vec![0; spec.size as usize],
            },
        );
        self.calls.push(Call::Create {
            buffer: id,
            role: spec.role,
            size: spec.size,
        });
        Ok(RecordedBuffer { id })
    }

    fn destroy_buffer(&mut self, buffer: RecordedBuffer) {
        self.buffers.remove(&buffer.id);
        self.calls.push(Call::Destroy { buffer: buffer.id });
    }

    fn write_buffer(&mut self, buffer: &RecordedBuffer, offset: u64, data: &[u8]) {
        if let Some(mirror) = self.buffers.get_mut(&buffer.id) {
            let start = offset as usize;
            let end = start + data.len();
            assert!(
                end <= mirror.data.len(),
                "write of {} bytes at {} overruns {:?} ({} bytes)",
                data.len(),
                offset,
                mirror.label,
                mirror.data.len()
            );
            mirror.data[start..end].copy_from_slice(data);
        }
        self.calls.push(Call::Write {
            buffer: buffer.id,
            offset,
            len: data.len(),
        });
    }

    fn compile_draw_commands(
        &mut self,
        pass: &CompilePass<'_, RecordedBuffer>,
    ) -> Result<(), GpuError> {
        let slot_count = pass.params.slot_count as usize;
        let instances: Vec<Instance> = self.read(pass.instances, slot_count);
        let meshes: Vec<MeshDescriptor> = self.read(pass.meshes, pass.params.mesh_count as usize);
        let commands = compiler::compile_commands(&instances, &meshes);
        self.write_buffer(pass.commands, 0, bytemuck::cast_slice(&commands));
        // The compile pass is a GPU write, not an upload.
        self.calls.pop();
        self.calls.push(Call::Compile {
            slot_count: pass.params.slot_count,
            mesh_count: pass.params.mesh_count,
        });
        Ok(())
    }

    fn multi_draw_indexed_indirect(
        &mut self,
        draw: &IndirectDraw<'_, RecordedBuffer>,
    ) -> Result<(), GpuError> {
        let commands = self.read(draw.commands, draw.draw_count as usize);
        assert_eq!(
            commands.len(),
            draw.draw_count as usize,
            "draw reads past the end of the command buffer"
        );
        self.draws.push(RecordedDraw { commands });
        self.calls.push(Call::Draw {
            draw_count: draw.draw_count,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(size: u64) -> BufferSpec<'static> {
        BufferSpec {
            label: "test",
            role: BufferRole::Instances,
            size,
        }
    }

    #[test]
    fn allocations_fail_after_budget() {
        let mut gpu = RecordingBackend::new();
        gpu.fail_allocations_after(1);
        assert!(gpu.create_buffer(&spec(16)).is_ok());
        assert!(matches!(
            gpu.create_buffer(&spec(16)),
            Err(GpuError::Allocation { .. })
        ));
        gpu.heal();
        assert!(gpu.create_buffer(&spec(16)).is_ok());
    }

    #[test]
    fn writes_are_mirrored() {
        let mut gpu = RecordingBackend::new();
        let buffer = gpu.create_buffer(&spec(8)).unwrap();
        gpu.write_buffer(&buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(gpu.contents(&buffer), &[0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(gpu.writes_to(BufferRole::Instances), vec![(4, 4)]);
        gpu.destroy_buffer(buffer);
        assert_eq!(gpu.live_buffers(), 0);
    }
}
