//! Pipelines used by the wgpu backend.
//!
//! - `compile`: compute pipeline turning instance records into indirect commands
//! - `indirect`: render pipeline drawing the shared mesh pool once per command

pub mod compile;
pub mod indirect;
