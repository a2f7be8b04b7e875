//! Stable-identity storage for instance records.
//!
//! Slots are never moved or compacted. Deleting an instance tombstones its slot and
//! queues the id on a FIFO free list; the next [`InstanceArena::add`] hands out the
//! oldest freed id before the slot vector grows.

use std::collections::VecDeque;

use crate::{
    data_structures::instance::{INVALID_INSTANCE, Instance, TOMBSTONE},
    error::InstanceError,
};

#[derive(Debug, Default)]
pub struct InstanceArena {
    slots: Vec<Instance>,
    free: VecDeque<u32>,
    capacity: usize,
    initial_capacity: usize,
    live: usize,
}

impl InstanceArena {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            initial_capacity: initial_capacity.max(1),
            ..Default::default()
        }
    }

    /// Creates a visible instance of `mesh_id` with an identity transform.
    ///
    /// The caller is responsible for checking `mesh_id` against its catalog; only the
    /// tombstone value itself is rejected here.
    pub fn add(&mut self, mesh_id: u8) -> Result<u32, InstanceError> {
        if mesh_id == TOMBSTONE {
            return Err(InstanceError::InvalidMesh {
                mesh_id: u32::from(mesh_id),
                mesh_count: TOMBSTONE as usize,
            });
        }

        let slot = match self.free.pop_front() {
            Some(slot) => {
                self.slots[slot as usize] = Instance::new(mesh_id);
                slot
            }
            None => {
                let slot = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|&slot| slot != INVALID_INSTANCE)
                    .ok_or(InstanceError::ArenaFull)?;
                if self.slots.len() == self.capacity {
                    self.grow_to((self.capacity * 2).max(self.initial_capacity));
                }
                self.slots.push(Instance::new(mesh_id));
                slot
            }
        };
        self.live += 1;
        Ok(slot)
    }

    /// Tombstones `slot` and queues it for reuse.
    ///
    /// Returns `false` without touching anything if the id is unknown or already
    /// deleted, so a double delete never queues the same id twice.
    pub fn delete(&mut self, slot: u32) -> bool {
        match self.slots.get_mut(slot as usize) {
            Some(instance) if instance.is_live() => {
                instance.tombstone();
                self.free.push_back(slot);
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, slot: u32) -> Result<&Instance, InstanceError> {
        match self.slots.get(slot as usize) {
            Some(instance) if instance.is_live() => Ok(instance),
            Some(_) => Err(InstanceError::DeletedSlot(slot)),
            None => Err(InstanceError::SlotOutOfRange {
                slot,
                len: self.slots.len(),
            }),
        }
    }

    fn get_mut(&mut self, slot: u32) -> Result<&mut Instance, InstanceError> {
        let len = self.slots.len();
        match self.slots.get_mut(slot as usize) {
            Some(instance) if instance.is_live() => Ok(instance),
            Some(_) => Err(InstanceError::DeletedSlot(slot)),
            None => Err(InstanceError::SlotOutOfRange { slot, len }),
        }
    }

    /// Returns whether the record changed. Equal values leave the slot untouched.
    pub fn set_local(
        &mut self,
        slot: u32,
        local: cgmath::Matrix4<f32>,
    ) -> Result<bool, InstanceError> {
        let instance = self.get_mut(slot)?;
        let local: [[f32; 4]; 4] = local.into();
        if *instance.local_raw() == local {
            return Ok(false);
        }
        instance.set_local(local);
        Ok(true)
    }

    pub fn set_material(&mut self, slot: u32, material_index: u16) -> Result<bool, InstanceError> {
        let instance = self.get_mut(slot)?;
        if instance.material_index() == material_index {
            return Ok(false);
        }
        instance.set_material_index(material_index);
        Ok(true)
    }

    pub fn set_visible(&mut self, slot: u32, visible: bool) -> Result<bool, InstanceError> {
        let instance = self.get_mut(slot)?;
        if instance.is_visible() == visible {
            return Ok(false);
        }
        instance.set_visible(visible);
        Ok(true)
    }

    pub fn local(&self, slot: u32) -> Result<cgmath::Matrix4<f32>, InstanceError> {
        self.get(slot).map(Instance::local)
    }

    pub fn material(&self, slot: u32) -> Result<u16, InstanceError> {
        self.get(slot).map(Instance::material_index)
    }

    pub fn visible(&self, slot: u32) -> Result<bool, InstanceError> {
        self.get(slot).map(Instance::is_visible)
    }

    pub fn mesh(&self, slot: u32) -> Result<u8, InstanceError> {
        self.get(slot).map(Instance::mesh_id)
    }

    /// Grows the logical capacity to hold at least `count` slots.
    ///
    /// Returns whether it grew. A grown arena no longer fits GPU buffers sized for
    /// the old capacity; those are recreated on the next sync.
    pub fn reserve(&mut self, count: usize) -> bool {
        if count <= self.capacity {
            return false;
        }
        self.grow_to(count);
        true
    }

    fn grow_to(&mut self, capacity: usize) {
        self.slots.reserve_exact(capacity - self.slots.len());
        log::debug!(
            "instance arena grows from {} to {} slots",
            self.capacity,
            capacity
        );
        self.capacity = capacity;
    }

    /// Number of slots ever handed out, deleted ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn instances(&self) -> &[Instance] {
        &self.slots
    }

    /// Live slots with their records, in slot order.
    pub fn iter_live(&self) -> impl Iterator<Item = (u32, &Instance)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, instance)| instance.is_live())
            .map(|(slot, instance)| (slot as u32, instance))
    }

    /// All slots in upload order, `[0, len)`.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.slots)
    }

    /// The bytes of a single slot, deleted or not. `None` past the end.
    pub fn slot_bytes(&self, slot: u32) -> Option<&[u8]> {
        self.slots.get(slot as usize).map(bytemuck::bytes_of)
    }

    /// Drops every slot and starts over from `initial_capacity`. Ids handed out
    /// before are reused from 0.
    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.free.clear();
        self.capacity = 0;
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_doubles_from_the_initial_size() {
        let mut arena = InstanceArena::new(4);
        assert_eq!(arena.capacity(), 0);
        for _ in 0..5 {
            arena.add(0).unwrap();
        }
        assert_eq!(arena.capacity(), 8);
        assert!(!arena.reserve(8));
        assert!(arena.reserve(20));
        assert_eq!(arena.capacity(), 20);
    }

    #[test]
    fn free_list_is_fifo() {
        let mut arena = InstanceArena::new(8);
        let ids: Vec<u32> = (0..4).map(|_| arena.add(0).unwrap()).collect();
        assert!(arena.delete(ids[2]));
        assert!(arena.delete(ids[0]));
        assert_eq!(arena.add(1).unwrap(), ids[2]);
        assert_eq!(arena.add(1).unwrap(), ids[0]);
        assert_eq!(arena.add(1).unwrap(), 4);
    }

    #[test]
    fn iter_live_skips_tombstones() {
        let mut arena = InstanceArena::new(4);
        for mesh in 0..4 {
            arena.add(mesh).unwrap();
        }
        arena.delete(1);
        arena.delete(3);
        let live: Vec<(u32, u8)> = arena
            .iter_live()
            .map(|(slot, instance)| (slot, instance.mesh_id()))
            .collect();
        assert_eq!(live, vec![(0, 0), (2, 2)]);
        assert_eq!(arena.live_count(), live.len());
    }

    #[test]
    fn clear_resets_slots_and_capacity() {
        let mut arena = InstanceArena::new(2);
        for _ in 0..5 {
            arena.add(0).unwrap();
        }
        arena.delete(4);
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.capacity(), 0);
        assert_eq!(arena.free_count(), 0);
        assert_eq!(arena.live_count(), 0);
        assert_eq!(arena.add(0).unwrap(), 0);
        assert_eq!(arena.capacity(), 2);
    }

    #[test]
    fn tombstone_mesh_id_is_rejected() {
        let mut arena = InstanceArena::new(1);
        assert!(matches!(
            arena.add(TOMBSTONE),
            Err(InstanceError::InvalidMesh { .. })
        ));
        assert!(arena.is_empty());
    }
}
