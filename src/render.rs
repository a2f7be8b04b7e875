//! Draw descriptions handed from the manager to a backend.
//!
//! The manager never talks to a render pass directly. Each frame it produces an
//! [`IndirectDraw`] that names the buffers involved and how many commands to issue,
//! and the backend turns it into one multi-draw-indirect call, or one indirect draw
//! per slot on devices that ignore `first_instance`.
//!
//! # Key types
//!
//! - [`IndirectDraw<'a, B>`] is one multi-draw over the compiled command buffer
//! - [`FrameTarget`] is what the wgpu backend draws into
//! - [`FrameStats`] summarizes what a call to `render` did
//!

use crate::{buffers::SyncReport, compiler::DrawCommand, data_structures::instance::Instance};

/// A multi-draw over the compiled command buffer.
///
/// `draw_count` commands are read from the start of `commands`; command `i` draws
/// the instance record at slot `i` of `instances`.
pub struct IndirectDraw<'a, B> {
    pub instances: &'a B,
    pub commands: &'a B,
    pub draw_count: u32,
}

impl<B> Clone for IndirectDraw<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B> Copy for IndirectDraw<'_, B> {}

impl<B> IndirectDraw<'_, B> {
    /// `(instance offset, command offset)` in bytes of every command, for devices
    /// that ignore `first_instance` and need one draw per slot with the slot's
    /// record bound first.
    pub fn per_slot_offsets(&self) -> impl Iterator<Item = (u64, u64)> + use<B> {
        (0..u64::from(self.draw_count))
            .map(|slot| (slot * Instance::SIZE, slot * DrawCommand::SIZE))
    }
}

/// Colour/depth views plus the camera of one frame.
///
/// Camera math lives with the caller; only the finished view-projection matrix is
/// uploaded.
#[derive(Clone, Debug)]
pub struct FrameTarget {
    pub color: wgpu::TextureView,
    pub depth: Option<wgpu::TextureView>,
    pub view_proj: cgmath::Matrix4<f32>,
    pub clear_colour: Option<wgpu::Color>,
}

/// What one call to `render` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStats {
    pub sync: SyncReport,
    /// Commands issued to the multi-draw, tombstoned and hidden slots included.
    pub draw_count: u32,
    pub live_instances: usize,
}
