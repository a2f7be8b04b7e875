//! flow-instancer
//!
//! GPU instance management for drawing tens of thousands of independently
//! transformable mesh instances out of one shared vertex/index pool. Instances live
//! in a slot arena on the CPU, changed slots are tracked and uploaded either one
//! record at a time or in a single write, a compute pass turns the instance buffer
//! into indexed indirect commands, and one multi-draw renders everything.
//!
//! High-level modules
//! - `manager`: the [`ModelManager`] facade used by the render loop
//! - `data_structures`: instance records, mesh catalog, slot arena, dirty tracking
//! - `buffers`: the GPU buffers mirroring CPU state and their growth
//! - `compiler`: instance records to indirect draw commands
//! - `backend`: the seam to the graphics API (wgpu, or an in-memory recorder)
//! - `context`: headless device/queue setup
//! - `pipelines`: compute and render pipelines of the wgpu backend
//! - `resources`: OBJ loading into a mesh catalog
//! - `render`: per-frame draw descriptions and statistics
//!

pub mod backend;
pub mod buffers;
pub mod compiler;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod manager;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use backend::{GpuBackend, recording::RecordingBackend, wgpu_backend::WgpuBackend};
pub use config::ManagerConfig;
pub use data_structures::{
    instance::{INVALID_INSTANCE, Instance, InstanceFlags},
    mesh::{MeshCatalog, MeshDescriptor},
};
pub use error::{CatalogError, GpuError, InstanceError, RenderError};
pub use manager::{ManagerState, ModelManager};
pub use render::{FrameStats, FrameTarget};
pub use cgmath;
pub use wgpu;

/// Sets up logging for the current platform. Calling it more than once is harmless.
pub fn init_logger() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&format!("Could not initialize logger: {}", e).into());
        }
    }
}
