use cgmath::{Matrix4, SquareMatrix, Vector3};
use flow_instancer::{InstanceError, ManagerConfig};

use crate::common::test_utils::manager;
mod common;

#[test]
fn first_instance_gets_slot_zero_with_defaults() {
    let mut manager = manager(ManagerConfig::default());
    let id = manager.add_instance(0).unwrap();

    assert_eq!(id, 0);
    assert_eq!(manager.instance_visible(id), Ok(true));
    assert_eq!(manager.instance_material(id), Ok(0));
    assert_eq!(manager.instance_mesh(id), Ok(0));
    assert_eq!(manager.instance_local(id), Ok(Matrix4::identity()));
}

#[test]
fn unknown_mesh_ids_are_rejected() {
    let mut manager = manager(ManagerConfig::default());
    for mesh_id in [2, 0xFF, 300, u32::MAX] {
        assert_eq!(
            manager.add_instance(mesh_id),
            Err(InstanceError::InvalidMesh {
                mesh_id,
                mesh_count: 2
            })
        );
    }
    assert_eq!(manager.live_instances(), 0);
    assert!(manager.dirty().is_clean());
}

#[test]
fn other_slots_survive_add_and_delete() {
    let mut manager = manager(ManagerConfig::default());
    let keep = manager.add_instance(1).unwrap();
    let moved = Matrix4::from_translation(Vector3::new(4.0, 5.0, 6.0));
    manager.set_instance_local(keep, moved).unwrap();
    manager.set_instance_material(keep, 9).unwrap();

    let others: Vec<u32> = (0..10).map(|_| manager.add_instance(0).unwrap()).collect();
    for id in others.iter().step_by(2) {
        assert!(manager.delete_instance(*id));
    }
    for _ in 0..7 {
        manager.add_instance(0).unwrap();
    }

    assert_eq!(manager.instance_local(keep), Ok(moved));
    assert_eq!(manager.instance_material(keep), Ok(9));
    assert_eq!(manager.instance_mesh(keep), Ok(1));
    assert_eq!(manager.instance_visible(keep), Ok(true));
}

#[test]
fn deleted_ids_are_recycled_in_fifo_order() {
    let mut manager = manager(ManagerConfig::default());
    let ids: Vec<u32> = (0..5).map(|_| manager.add_instance(0).unwrap()).collect();

    assert!(manager.delete_instance(ids[3]));
    assert_eq!(manager.add_instance(1), Ok(ids[3]));

    assert!(manager.delete_instance(ids[1]));
    assert!(manager.delete_instance(ids[4]));
    assert!(manager.delete_instance(ids[0]));
    assert_eq!(manager.add_instance(0), Ok(ids[1]));
    assert_eq!(manager.add_instance(0), Ok(ids[4]));
    assert_eq!(manager.add_instance(0), Ok(ids[0]));
    // Free list drained, the arena grows again.
    assert_eq!(manager.add_instance(0), Ok(5));
}

#[test]
fn recycled_slot_starts_from_defaults() {
    let mut manager = manager(ManagerConfig::default());
    let id = manager.add_instance(0).unwrap();
    manager.set_instance_visible(id, false).unwrap();
    manager.set_instance_material(id, 3).unwrap();
    manager.delete_instance(id);

    assert_eq!(manager.add_instance(1), Ok(id));
    assert_eq!(manager.instance_visible(id), Ok(true));
    assert_eq!(manager.instance_material(id), Ok(0));
    assert_eq!(manager.instance_mesh(id), Ok(1));
}

#[test]
fn double_delete_queues_the_id_once() {
    let mut manager = manager(ManagerConfig::default());
    let id = manager.add_instance(0).unwrap();

    assert!(manager.delete_instance(id));
    assert!(!manager.delete_instance(id));
    assert_eq!(manager.arena().free_count(), 1);

    assert_eq!(manager.add_instance(0), Ok(id));
    assert_eq!(manager.add_instance(0), Ok(1));
}

#[test]
fn bad_handles_are_typed_errors() {
    let mut manager = manager(ManagerConfig::default());
    let id = manager.add_instance(0).unwrap();
    manager.delete_instance(id);

    assert_eq!(
        manager.set_instance_material(id, 1),
        Err(InstanceError::DeletedSlot(id))
    );
    assert_eq!(manager.instance_visible(id), Err(InstanceError::DeletedSlot(id)));
    assert_eq!(
        manager.set_instance_local(7, Matrix4::identity()),
        Err(InstanceError::SlotOutOfRange { slot: 7, len: 1 })
    );
    assert_eq!(
        manager.instance_material(7),
        Err(InstanceError::SlotOutOfRange { slot: 7, len: 1 })
    );
    assert!(!manager.delete_instance(7));
}
