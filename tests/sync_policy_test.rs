use cgmath::{Matrix4, Vector3};
use flow_instancer::{
    GpuError, Instance, ManagerConfig, ManagerState, RecordingBackend, RenderError,
    backend::{BufferRole, recording::Call},
    buffers::{GpuBufferSet, SyncKind},
    data_structures::{arena::InstanceArena, dirty::DirtyTracker},
};

use crate::common::test_utils::{manager, synced_manager};
mod common;

const RECORD: usize = Instance::SIZE as usize;

#[test]
fn render_uploads_the_record_and_clears_the_dirty_set() {
    let mut manager = manager(ManagerConfig::default());
    let mut gpu = RecordingBackend::new();
    let id = manager.add_instance(0).unwrap();
    manager
        .set_instance_local(id, Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0)))
        .unwrap();
    assert_eq!(manager.state(), ManagerState::Dirty);

    manager.render(&mut gpu).unwrap();

    assert!(manager.dirty().is_clean());
    assert_eq!(manager.state(), ManagerState::Synced);
    let uploaded = gpu.contents_of(BufferRole::Instances).unwrap();
    assert_eq!(
        &uploaded[..RECORD],
        bytemuck::bytes_of(&manager.arena().instances()[0])
    );
}

#[test]
fn unchanged_values_cause_no_upload() {
    let (mut manager, mut gpu, ids) = synced_manager(ManagerConfig::default(), 4);

    manager.set_instance_material(ids[2], 0).unwrap();
    manager.set_instance_visible(ids[1], true).unwrap();
    manager
        .set_instance_local(ids[0], manager.instance_local(ids[0]).unwrap())
        .unwrap();
    assert!(manager.dirty().is_clean());

    let stats = manager.render(&mut gpu).unwrap();
    assert_eq!(stats.sync.kind, SyncKind::Idle);
    assert!(gpu.writes_to(BufferRole::Instances).is_empty());
}

#[test]
fn few_changes_are_patched_slot_by_slot() {
    let (mut manager, mut gpu, ids) = synced_manager(ManagerConfig::default(), 300);

    for &id in ids.iter().take(100) {
        manager.set_instance_material(id, 1).unwrap();
    }
    // Touching the same slot again does not count twice.
    manager.set_instance_material(ids[0], 2).unwrap();
    let stats = manager.render(&mut gpu).unwrap();

    assert_eq!(stats.sync.kind, SyncKind::Patch);
    assert_eq!(stats.sync.writes, 100);
    let writes = gpu.writes_to(BufferRole::Instances);
    assert_eq!(writes.len(), 100);
    for (slot, (offset, len)) in writes.into_iter().enumerate() {
        assert_eq!(offset, (slot * RECORD) as u64);
        assert_eq!(len, RECORD);
    }
    assert_eq!(
        gpu.contents_of(BufferRole::Instances).unwrap()[..300 * RECORD],
        *manager.arena().as_bytes()
    );
}

#[test]
fn many_changes_are_uploaded_in_one_write() {
    let (mut manager, mut gpu, ids) = synced_manager(ManagerConfig::default(), 300);

    for &id in ids.iter().take(200) {
        manager.set_instance_visible(id, false).unwrap();
    }
    let stats = manager.render(&mut gpu).unwrap();

    assert_eq!(stats.sync.kind, SyncKind::Full);
    assert_eq!(gpu.writes_to(BufferRole::Instances), vec![(0, 300 * RECORD)]);
}

#[test]
fn patch_threshold_is_configurable() {
    let config = ManagerConfig::default().with_max_patch_count(4);
    let (mut manager, mut gpu, ids) = synced_manager(config, 10);

    for &id in ids.iter().take(3) {
        manager.set_instance_material(id, 5).unwrap();
    }
    assert_eq!(manager.render(&mut gpu).unwrap().sync.kind, SyncKind::Patch);

    for &id in ids.iter().take(4) {
        manager.set_instance_material(id, 6).unwrap();
    }
    assert_eq!(manager.render(&mut gpu).unwrap().sync.kind, SyncKind::Full);
}

#[test]
fn reserve_forces_a_full_upload_into_new_buffers() {
    let (mut manager, mut gpu, ids) = synced_manager(ManagerConfig::default(), 10);
    let before = manager.buffers().instance_capacity().unwrap();

    manager.reserve(before * 4);
    manager.set_instance_material(ids[3], 1).unwrap();
    let stats = manager.render(&mut gpu).unwrap();

    assert_eq!(stats.sync.kind, SyncKind::Resized);
    assert_eq!(gpu.writes_to(BufferRole::Instances), vec![(0, 10 * RECORD)]);
    assert_eq!(manager.buffers().instance_capacity(), Some(before * 4));
    assert_eq!(gpu.live_buffers(), 3);
}

#[test]
fn reserve_within_capacity_changes_nothing() {
    let (mut manager, mut gpu, _) = synced_manager(ManagerConfig::default(), 10);
    manager.reserve(1);
    assert!(manager.dirty().is_clean());
    assert_eq!(manager.render(&mut gpu).unwrap().sync.kind, SyncKind::Idle);
}

#[test]
fn growth_populates_new_buffers_before_retiring_old_ones() {
    let config = ManagerConfig::default().with_initial_capacity(4);
    let (mut manager, mut gpu, _) = synced_manager(config, 4);
    manager.add_instance(1).unwrap();

    manager.render(&mut gpu).unwrap();

    let calls = gpu.calls();
    let upload = calls
        .iter()
        .position(|call| matches!(call, Call::Write { offset: 0, len, .. } if *len == 5 * RECORD))
        .unwrap();
    let first_destroy = calls
        .iter()
        .position(|call| matches!(call, Call::Destroy { .. }))
        .unwrap();
    let last_create = calls
        .iter()
        .rposition(|call| matches!(call, Call::Create { .. }))
        .unwrap();
    assert!(last_create < upload);
    assert!(upload < first_destroy);
    assert_eq!(gpu.destructions(), 2);
    assert_eq!(manager.buffers().instance_capacity(), Some(8));
}

#[test]
fn failed_growth_keeps_old_buffers_and_pending_changes() {
    let config = ManagerConfig::default().with_initial_capacity(4);
    let (mut manager, mut gpu, _) = synced_manager(config, 4);
    let grown = manager.add_instance(1).unwrap();

    for budget in [0, 1] {
        gpu.fail_allocations_after(budget);
        let err = manager.render(&mut gpu).unwrap_err();
        assert!(matches!(err, RenderError::Gpu(GpuError::Allocation { .. })));
        assert_eq!(manager.state(), ManagerState::Unavailable);
        assert!(manager.dirty().is_pending(grown));
        assert_eq!(manager.buffers().instance_capacity(), Some(4));
        assert_eq!(gpu.live_buffers(), 3);
        assert!(gpu.draws().is_empty());
    }

    gpu.heal();
    let stats = manager.render(&mut gpu).unwrap();
    assert_eq!(stats.sync.kind, SyncKind::Resized);
    assert_eq!(manager.state(), ManagerState::Synced);
    assert_eq!(manager.buffers().instance_capacity(), Some(8));
    assert_eq!(
        gpu.contents_of(BufferRole::Instances).unwrap()[..5 * RECORD],
        *manager.arena().as_bytes()
    );
}

#[test]
fn oversized_buffers_are_refused() {
    let mut manager = manager(ManagerConfig::default());
    let mut gpu = RecordingBackend::new().with_max_buffer_size(16 * Instance::SIZE);
    manager.add_instance(0).unwrap();

    let err = manager.render(&mut gpu).unwrap_err();
    assert!(matches!(
        err,
        RenderError::Gpu(GpuError::CapacityExceeded { .. })
    ));
    assert_eq!(gpu.live_buffers(), 0);
    assert!(!manager.dirty().is_clean());
}

#[test]
fn deletes_reach_the_gpu_as_tombstones() {
    let (mut manager, mut gpu, ids) = synced_manager(ManagerConfig::default(), 3);
    manager.delete_instance(ids[1]);
    manager.render(&mut gpu).unwrap();

    let uploaded = gpu.contents_of(BufferRole::Instances).unwrap();
    let record: Instance = bytemuck::pod_read_unaligned(&uploaded[RECORD..2 * RECORD]);
    assert!(!record.is_live());
}

#[test]
fn replaced_buffers_are_refilled_before_patching() {
    let mut gpu = RecordingBackend::new();
    let mut arena = InstanceArena::new(8);
    let mut tracker = DirtyTracker::new(128);
    let mut buffers = GpuBufferSet::new();
    for _ in 0..5 {
        let slot = arena.add(0).unwrap();
        tracker.mark(slot);
    }
    buffers.sync_instances(&mut gpu, &mut tracker, &arena).unwrap();
    assert!(!buffers.needs_full_upload());

    assert!(buffers.ensure_instance_buffer(&mut gpu, 16).unwrap());
    assert!(buffers.needs_full_upload());
    let instances = buffers.instance_buffer().unwrap();
    assert_eq!(gpu.label(instances), Some("Instance Buffer"));
    assert!(gpu.contents(instances).iter().all(|&b| b == 0));

    arena.set_material(2, 7).unwrap();
    tracker.mark(2);
    gpu.clear_calls();
    let report = buffers.sync_instances(&mut gpu, &mut tracker, &arena).unwrap();

    assert_eq!(report.kind, SyncKind::Full);
    assert_eq!(gpu.writes_to(BufferRole::Instances), vec![(0, 5 * RECORD)]);
    assert!(!buffers.needs_full_upload());
    assert!(tracker.is_clean());
    let instances = buffers.instance_buffer().unwrap();
    assert_eq!(gpu.contents(instances)[..5 * RECORD], *arena.as_bytes());
}

#[test]
fn replaced_buffers_are_refilled_even_without_pending_changes() {
    let mut gpu = RecordingBackend::new();
    let mut arena = InstanceArena::new(4);
    let mut tracker = DirtyTracker::new(128);
    let mut buffers = GpuBufferSet::new();
    for _ in 0..3 {
        let slot = arena.add(1).unwrap();
        tracker.mark(slot);
    }
    buffers.sync_instances(&mut gpu, &mut tracker, &arena).unwrap();
    buffers.ensure_instance_buffer(&mut gpu, 32).unwrap();

    let report = buffers.sync_instances(&mut gpu, &mut tracker, &arena).unwrap();
    assert_eq!(report.kind, SyncKind::Full);
    let instances = buffers.instance_buffer().unwrap();
    assert_eq!(gpu.contents(instances)[..3 * RECORD], *arena.as_bytes());

    let report = buffers.sync_instances(&mut gpu, &mut tracker, &arena).unwrap();
    assert_eq!(report.kind, SyncKind::Idle);
}

#[test]
fn failed_mesh_upload_is_retried_on_the_next_frame() {
    let mut manager = manager(ManagerConfig::default());
    let mut gpu = RecordingBackend::new();
    let id = manager.add_instance(1).unwrap();

    // Instance and command buffers fit, the mesh descriptors don't.
    gpu.fail_allocations_after(2);
    let err = manager.render(&mut gpu).unwrap_err();
    assert!(matches!(err, RenderError::Gpu(GpuError::Allocation { .. })));
    assert_eq!(manager.state(), ManagerState::Unavailable);
    assert!(manager.buffers().mesh_buffer().is_none());
    assert!(gpu.draws().is_empty());
    assert_eq!(gpu.live_buffers(), 2);

    gpu.heal();
    let stats = manager.render(&mut gpu).unwrap();
    assert_eq!(manager.state(), ManagerState::Synced);
    assert_eq!(stats.draw_count, 1);
    assert_eq!(gpu.live_buffers(), 3);
    let drawn: Vec<u32> = gpu.last_draw().unwrap().drawn_slots().collect();
    assert_eq!(drawn, vec![id]);
}
