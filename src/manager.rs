//! The instance manager facade.
//!
//! [`ModelManager`] composes the arena, the dirty tracker, the GPU buffer set and the
//! draw-command compiler behind one handle-based API:
//!
//! ```ignore
//! let mut manager = ModelManager::new(catalog, ManagerConfig::default());
//! let tree = manager.add_instance(catalog_tree_id)?;
//! manager.set_instance_local(tree, Matrix4::from_translation(position))?;
//! manager.render(&mut gpu)?;
//! ```
//!
//! Mutations only touch CPU state and mark slots dirty. `render` then brings the GPU
//! up to date and draws everything in one multi-draw, in this order on the backend's
//! command stream: instance buffer resize and upload, mesh descriptor upload,
//! draw-command compilation, multi-draw.

use crate::{
    backend::GpuBackend,
    buffers::GpuBufferSet,
    compiler::DrawCommandCompiler,
    config::ManagerConfig,
    data_structures::{arena::InstanceArena, dirty::DirtyTracker, mesh::MeshCatalog},
    error::{InstanceError, RenderError},
    render::{FrameStats, IndirectDraw},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    /// CPU state has changes the GPU has not seen yet.
    Dirty,
    /// The last render uploaded everything.
    Synced,
    /// The last render failed to allocate GPU memory. The next successful render
    /// leaves this state.
    Unavailable,
}

pub struct ModelManager<B: GpuBackend> {
    catalog: MeshCatalog,
    arena: InstanceArena,
    dirty: DirtyTracker,
    buffers: GpuBufferSet<B>,
    compiler: DrawCommandCompiler,
    config: ManagerConfig,
    unavailable: bool,
}

impl<B: GpuBackend> ModelManager<B> {
    /// Takes ownership of `catalog`. No GPU resources are created until the first
    /// [`ModelManager::render`].
    pub fn new(catalog: MeshCatalog, config: ManagerConfig) -> Self {
        log::info!(
            "instance manager created for {} meshes ({} patch writes max, {} initial slots)",
            catalog.mesh_count(),
            config.max_patch_count,
            config.initial_capacity
        );
        Self {
            catalog,
            arena: InstanceArena::new(config.initial_capacity),
            dirty: DirtyTracker::new(config.max_patch_count),
            buffers: GpuBufferSet::new(),
            compiler: DrawCommandCompiler::new(),
            config,
            unavailable: false,
        }
    }

    /// Adds a visible instance of `mesh_id` with an identity transform and material 0.
    pub fn add_instance(&mut self, mesh_id: u32) -> Result<u32, InstanceError> {
        let mesh_count = self.catalog.mesh_count();
        let mesh = u8::try_from(mesh_id)
            .ok()
            .filter(|&mesh| (mesh as usize) < mesh_count)
            .ok_or(InstanceError::InvalidMesh {
                mesh_id,
                mesh_count,
            })?;
        let id = self.arena.add(mesh)?;
        self.dirty.mark(id);
        Ok(id)
    }

    /// Deletes an instance. Its id may be handed out again by a later
    /// [`ModelManager::add_instance`].
    ///
    /// Unknown or already deleted ids are ignored and `false` is returned.
    pub fn delete_instance(&mut self, id: u32) -> bool {
        if !self.arena.delete(id) {
            log::warn!("ignoring delete of unknown or deleted instance {}", id);
            return false;
        }
        self.dirty.mark(id);
        true
    }

    pub fn set_instance_local(
        &mut self,
        id: u32,
        local: cgmath::Matrix4<f32>,
    ) -> Result<(), InstanceError> {
        let changed = self.arena.set_local(id, local)?;
        self.mark_if(changed, id);
        Ok(())
    }

    pub fn instance_local(&self, id: u32) -> Result<cgmath::Matrix4<f32>, InstanceError> {
        self.arena.local(id)
    }

    pub fn set_instance_material(&mut self, id: u32, material: u16) -> Result<(), InstanceError> {
        let changed = self.arena.set_material(id, material)?;
        self.mark_if(changed, id);
        Ok(())
    }

    pub fn instance_material(&self, id: u32) -> Result<u16, InstanceError> {
        self.arena.material(id)
    }

    pub fn set_instance_visible(&mut self, id: u32, visible: bool) -> Result<(), InstanceError> {
        let changed = self.arena.set_visible(id, visible)?;
        self.mark_if(changed, id);
        Ok(())
    }

    pub fn instance_visible(&self, id: u32) -> Result<bool, InstanceError> {
        self.arena.visible(id)
    }

    pub fn instance_mesh(&self, id: u32) -> Result<u32, InstanceError> {
        self.arena.mesh(id).map(u32::from)
    }

    fn mark_if(&mut self, changed: bool, id: u32) {
        if changed {
            self.dirty.mark(id);
        }
    }

    /// Makes room for `count` instances up front.
    ///
    /// Growing past the current GPU buffers makes the next render recreate them and
    /// upload everything in one write.
    pub fn reserve(&mut self, count: usize) {
        if self.arena.reserve(count) {
            self.dirty.request_full();
        }
    }

    /// Syncs, compiles and draws every instance.
    ///
    /// On error nothing was drawn, the previous GPU buffers are still intact and every
    /// pending change is kept for the next call.
    pub fn render(&mut self, gpu: &mut B) -> Result<FrameStats, RenderError> {
        match self.try_render(gpu) {
            Ok(stats) => {
                if self.unavailable {
                    log::info!("instance rendering available again");
                }
                self.unavailable = false;
                Ok(stats)
            }
            Err(e) => {
                log::error!("instance frame aborted: {}", e);
                if matches!(e, RenderError::Gpu(_)) {
                    self.unavailable = true;
                }
                Err(e)
            }
        }
    }

    fn try_render(&mut self, gpu: &mut B) -> Result<FrameStats, RenderError> {
        let slot_count =
            u32::try_from(self.arena.len()).map_err(|_| RenderError::TooManySlots(self.arena.len()))?;
        let mesh_count = self.catalog.mesh_count() as u32;

        let sync = self
            .buffers
            .sync_instances(gpu, &mut self.dirty, &self.arena)?;
        self.buffers
            .upload_mesh_descriptors(gpu, self.catalog.descriptors())?;
        let draw_count = self
            .compiler
            .compile(gpu, &self.buffers, slot_count, mesh_count)?;

        if let (Some(instances), Some(commands)) =
            (self.buffers.instance_buffer(), self.buffers.command_buffer())
            && draw_count > 0
        {
            gpu.multi_draw_indexed_indirect(&IndirectDraw {
                instances,
                commands,
                draw_count,
            })?;
        }

        let stats = FrameStats {
            sync,
            draw_count,
            live_instances: self.arena.live_count(),
        };
        log::debug!("instance frame: {:?}", stats);
        Ok(stats)
    }

    /// Releases every GPU buffer. The manager cannot be used afterwards.
    pub fn destroy(mut self, gpu: &mut B) {
        self.buffers.release(gpu);
        log::info!(
            "instance manager destroyed with {} live instances",
            self.arena.live_count()
        );
    }

    pub fn state(&self) -> ManagerState {
        if self.unavailable {
            ManagerState::Unavailable
        } else if self.dirty.is_clean() && self.buffers.instance_capacity().is_some() {
            ManagerState::Synced
        } else {
            ManagerState::Dirty
        }
    }

    pub fn catalog(&self) -> &MeshCatalog {
        &self.catalog
    }

    pub fn arena(&self) -> &InstanceArena {
        &self.arena
    }

    pub fn dirty(&self) -> &DirtyTracker {
        &self.dirty
    }

    pub fn buffers(&self) -> &GpuBufferSet<B> {
        &self.buffers
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn live_instances(&self) -> usize {
        self.arena.live_count()
    }
}
