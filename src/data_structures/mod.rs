//! CPU-side data of the instance manager.
//!
//! - `instance` holds the per-instance record shared byte-for-byte with the GPU
//! - `model` contains the vertex layout of the shared mesh pool
//! - `mesh` contains mesh descriptors and the catalog that owns the pool
//! - `arena` allocates and recycles instance slots
//! - `dirty` tracks which slots still need uploading and how

pub mod arena;
pub mod dirty;
pub mod instance;
pub mod mesh;
pub mod model;
