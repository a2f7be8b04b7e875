//! Error types for the instance manager.
//!
//! Misuse of the instance API (bad slot ids, unknown meshes) is reported through
//! [`InstanceError`] and never aborts the render loop. GPU resource exhaustion is
//! reported through [`GpuError`] and aborts the frame it happened in, wrapped in
//! [`RenderError`] when it surfaces from [`crate::manager::ModelManager::render`].

use thiserror::Error;

/// Misuse of instance handles or mesh ids.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceError {
    /// The mesh id is not part of the catalog the manager was created with.
    #[error("mesh id {mesh_id} is out of range (catalog holds {mesh_count} meshes)")]
    InvalidMesh { mesh_id: u32, mesh_count: usize },

    /// The slot id was never handed out by this arena.
    #[error("instance id {slot} is out of range (arena holds {len} slots)")]
    SlotOutOfRange { slot: u32, len: usize },

    /// The slot id was handed out but the instance has been deleted since.
    #[error("instance id {0} was deleted")]
    DeletedSlot(u32),

    /// Every representable slot id is in use.
    #[error("instance arena is full")]
    ArenaFull,
}

/// Failures while building a [`crate::data_structures::mesh::MeshCatalog`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("mesh catalog is full ({0} meshes)")]
    TooManyMeshes(usize),

    #[error("mesh {name:?} references vertex {index} but only has {vertex_count} vertices")]
    IndexOutOfBounds {
        name: String,
        index: u32,
        vertex_count: usize,
    },

    #[error("mesh {name:?} has {index_count} indices which is not a multiple of three")]
    NotTriangulated { name: String, index_count: usize },

    #[error("the shared mesh pool exceeds the addressable 32-bit range")]
    PoolOverflow,
}

/// Failures reported by a [`crate::backend::GpuBackend`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// The device could not provide memory for the buffer.
    #[error("allocating {size} bytes for {label:?} failed: {reason}")]
    Allocation {
        label: String,
        size: u64,
        reason: String,
    },

    /// The requested buffer is larger than the device allows.
    #[error("{label:?} needs {size} bytes but the device allows at most {max}")]
    CapacityExceeded { label: String, size: u64, max: u64 },

    /// A draw was requested without a frame to draw into.
    #[error("no frame target was set before drawing")]
    NoFrameTarget,

    #[error("no suitable GPU adapter found: {0}")]
    NoAdapter(String),

    #[error("requesting the GPU device failed: {0}")]
    DeviceRequest(String),

    #[error("reading back GPU buffer failed: {0}")]
    Readback(String),
}

/// Failure of a whole frame.
///
/// Whenever `render` returns one of these, nothing was drawn for the frame and the
/// pending dirty set is kept for the next attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("GPU resource failure: {0}")]
    Gpu(#[from] GpuError),

    /// The instance population does not fit the 32-bit draw parameters.
    #[error("{0} instance slots exceed the indirect draw range")]
    TooManySlots(usize),
}
