//! The GPU side of the instance manager.
//!
//! [`GpuBufferSet`] owns the three buffers mirroring CPU state and is the only thing
//! that writes to them:
//!
//! - the instance buffer, a copy of the arena's slots, `capacity` records long
//! - the draw-command buffer, one [`DrawCommand`] per instance record it can hold
//! - the mesh-descriptor buffer, uploaded once from the catalog
//!
//! Instance and command buffers always share the same capacity and are only ever
//! replaced together. Replacement creates and fills the new pair first; the old pair
//! is destroyed only afterwards, and not at all if allocating the new pair fails.
//! A replaced instance buffer starts out empty, so the sync after a replacement is
//! always a full write, whatever the tracker planned.

use crate::{
    backend::{BufferRole, BufferSpec, GpuBackend},
    compiler::DrawCommand,
    data_structures::{
        arena::InstanceArena,
        dirty::{DirtyTracker, SyncPlan},
        instance::Instance,
        mesh::MeshDescriptor,
    },
    error::GpuError,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncKind {
    /// Nothing was pending.
    #[default]
    Idle,
    /// Pending slots were written one record at a time.
    Patch,
    /// `[0, len)` was written in one go.
    Full,
    /// The buffers were recreated at a larger capacity and then fully written.
    Resized,
}

/// What one call to [`GpuBufferSet::sync_instances`] uploaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub kind: SyncKind,
    /// Number of `write_buffer` calls against the instance buffer.
    pub writes: usize,
    pub bytes: u64,
}

pub struct GpuBufferSet<B: GpuBackend> {
    instances: Option<B::Buffer>,
    commands: Option<B::Buffer>,
    meshes: Option<B::Buffer>,
    capacity: usize,
    mesh_count: usize,
    // Set when the instance buffer was replaced and nothing has filled it yet.
    needs_full: bool,
}

impl<B: GpuBackend> Default for GpuBufferSet<B> {
    fn default() -> Self {
        Self {
            instances: None,
            commands: None,
            meshes: None,
            capacity: 0,
            mesh_count: 0,
            needs_full: false,
        }
    }
}

impl<B: GpuBackend> GpuBufferSet<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure instance and command buffers hold at least `capacity` records.
    ///
    /// Returns whether the buffers were recreated. The new buffers are empty, and the
    /// next [`sync_instances`](Self::sync_instances) writes the whole arena into them.
    pub fn ensure_instance_buffer(
        &mut self,
        gpu: &mut B,
        capacity: usize,
    ) -> Result<bool, GpuError> {
        if self.instance_capacity().is_some_and(|current| current >= capacity) {
            return Ok(false);
        }
        let (instances, commands, capacity) = self.allocate(gpu, capacity)?;
        self.replace(gpu, instances, commands, capacity);
        Ok(true)
    }

    fn allocate(
        &self,
        gpu: &mut B,
        capacity: usize,
    ) -> Result<(B::Buffer, B::Buffer, usize), GpuError> {
        let capacity = capacity.max(1);
        let records = capacity as u64;
        let instances = gpu.create_buffer(&BufferSpec {
            label: "Instance Buffer",
            role: BufferRole::Instances,
            size: records * Instance::SIZE,
        })?;
        let commands = match gpu.create_buffer(&BufferSpec {
            label: "Draw Command Buffer",
            role: BufferRole::DrawCommands,
            size: records * DrawCommand::SIZE,
        }) {
            Ok(commands) => commands,
            Err(e) => {
                gpu.destroy_buffer(instances);
                return Err(e);
            }
        };
        Ok((instances, commands, capacity))
    }

    fn replace(
        &mut self,
        gpu: &mut B,
        instances: B::Buffer,
        commands: B::Buffer,
        capacity: usize,
    ) {
        log::info!(
            "instance buffers grow from {} to {} records",
            self.capacity,
            capacity
        );
        if let Some(old) = self.instances.replace(instances) {
            gpu.destroy_buffer(old);
        }
        if let Some(old) = self.commands.replace(commands) {
            gpu.destroy_buffer(old);
        }
        self.capacity = capacity;
        self.needs_full = true;
    }

    /// Uploads the catalog's descriptors. Only the first call does anything.
    pub fn upload_mesh_descriptors(
        &mut self,
        gpu: &mut B,
        meshes: &[MeshDescriptor],
    ) -> Result<(), GpuError> {
        if self.meshes.is_some() {
            return Ok(());
        }
        // An empty catalog still gets one record so the buffer can be bound.
        let buffer = gpu.create_buffer(&BufferSpec {
            label: "Mesh Descriptor Buffer",
            role: BufferRole::MeshDescriptors,
            size: meshes.len().max(1) as u64 * MeshDescriptor::SIZE,
        })?;
        if !meshes.is_empty() {
            gpu.write_buffer(&buffer, 0, bytemuck::cast_slice(meshes));
        }
        log::info!("uploaded {} mesh descriptors", meshes.len());
        self.meshes = Some(buffer);
        self.mesh_count = meshes.len();
        Ok(())
    }

    /// Brings the instance buffer up to date with `arena`, as planned by `tracker`.
    ///
    /// The tracker is cleared only when this returns `Ok`. On error the previous
    /// buffers are still in place and still hold the previous frame's data.
    pub fn sync_instances(
        &mut self,
        gpu: &mut B,
        tracker: &mut DirtyTracker,
        arena: &InstanceArena,
    ) -> Result<SyncReport, GpuError> {
        let required = arena.capacity().max(arena.len());
        let plan = match tracker.plan(self.instance_capacity(), required) {
            SyncPlan::Idle | SyncPlan::Patch if self.needs_full => {
                SyncPlan::Full { resize: false }
            }
            plan => plan,
        };
        let report = match (plan, &self.instances) {
            (SyncPlan::Idle, _) => Some(SyncReport::default()),
            (SyncPlan::Patch, Some(instances)) => {
                let mut report = SyncReport {
                    kind: SyncKind::Patch,
                    ..Default::default()
                };
                for slot in tracker.pending() {
                    let Some(bytes) = arena.slot_bytes(slot) else {
                        continue;
                    };
                    gpu.write_buffer(instances, u64::from(slot) * Instance::SIZE, bytes);
                    report.writes += 1;
                    report.bytes += bytes.len() as u64;
                }
                Some(report)
            }
            (SyncPlan::Full { resize: false }, Some(instances)) => {
                Some(Self::write_all(gpu, instances, arena, SyncKind::Full))
            }
            _ => None,
        };
        let report = match report {
            Some(report) => report,
            None => {
                let (instances, commands, capacity) = self.allocate(gpu, required)?;
                let report = Self::write_all(gpu, &instances, arena, SyncKind::Resized);
                self.replace(gpu, instances, commands, capacity);
                report
            }
        };
        self.needs_full = false;

        if report.kind != SyncKind::Idle {
            log::debug!(
                "instance sync: {:?}, {} writes, {} bytes",
                report.kind,
                report.writes,
                report.bytes
            );
        }
        tracker.clear();
        Ok(report)
    }

    fn write_all(
        gpu: &mut B,
        instances: &B::Buffer,
        arena: &InstanceArena,
        kind: SyncKind,
    ) -> SyncReport {
        let bytes = arena.as_bytes();
        if bytes.is_empty() {
            return SyncReport {
                kind,
                ..Default::default()
            };
        }
        gpu.write_buffer(instances, 0, bytes);
        SyncReport {
            kind,
            writes: 1,
            bytes: bytes.len() as u64,
        }
    }

    /// Destroys every buffer. The set can be used again afterwards and starts over
    /// from nothing.
    pub fn release(&mut self, gpu: &mut B) {
        for buffer in [self.instances.take(), self.commands.take(), self.meshes.take()]
            .into_iter()
            .flatten()
        {
            gpu.destroy_buffer(buffer);
        }
        self.capacity = 0;
        self.mesh_count = 0;
        self.needs_full = false;
    }

    /// Records the instance and command buffers can hold. `None` before the first
    /// allocation.
    pub fn instance_capacity(&self) -> Option<usize> {
        self.instances.as_ref().map(|_| self.capacity)
    }

    /// Whether the next sync writes the whole arena regardless of the tracker.
    pub fn needs_full_upload(&self) -> bool {
        self.needs_full
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mesh_count(&self) -> usize {
        self.mesh_count
    }

    pub fn instance_buffer(&self) -> Option<&B::Buffer> {
        self.instances.as_ref()
    }

    pub fn command_buffer(&self) -> Option<&B::Buffer> {
        self.commands.as_ref()
    }

    pub fn mesh_buffer(&self) -> Option<&B::Buffer> {
        self.meshes.as_ref()
    }
}
