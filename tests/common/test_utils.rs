use flow_instancer::{
    ManagerConfig, MeshCatalog, ModelManager, RecordingBackend,
    data_structures::model::ModelVertex,
};

/// Axis-aligned unit cube, 8 shared corners.
pub fn cube() -> (Vec<ModelVertex>, Vec<u32>) {
    let corners = [
        [-0.5, -0.5, -0.5],
        [0.5, -0.5, -0.5],
        [0.5, 0.5, -0.5],
        [-0.5, 0.5, -0.5],
        [-0.5, -0.5, 0.5],
        [0.5, -0.5, 0.5],
        [0.5, 0.5, 0.5],
        [-0.5, 0.5, 0.5],
    ];
    let vertices = corners
        .iter()
        .map(|&p| ModelVertex::new(p, p))
        .collect();
    let indices = vec![
        0, 2, 1, 0, 3, 2, // back
        4, 5, 6, 4, 6, 7, // front
        0, 1, 5, 0, 5, 4, // bottom
        3, 6, 2, 3, 7, 6, // top
        0, 4, 7, 0, 7, 3, // left
        1, 2, 6, 1, 6, 5, // right
    ];
    (vertices, indices)
}

pub fn quad() -> (Vec<ModelVertex>, Vec<u32>) {
    let normal = [0.0, 0.0, 1.0];
    let vertices = vec![
        ModelVertex::new([-1.0, -1.0, 0.0], normal),
        ModelVertex::new([1.0, -1.0, 0.0], normal),
        ModelVertex::new([1.0, 1.0, 0.0], normal),
        ModelVertex::new([-1.0, 1.0, 0.0], normal),
    ];
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

/// Catalog with a cube (id 0) and a quad (id 1).
pub fn catalog() -> MeshCatalog {
    let mut catalog = MeshCatalog::new();
    let (vertices, indices) = cube();
    catalog.push_mesh("cube", &vertices, &indices).unwrap();
    let (vertices, indices) = quad();
    catalog.push_mesh("quad", &vertices, &indices).unwrap();
    catalog
}

pub fn manager(config: ManagerConfig) -> ModelManager<RecordingBackend> {
    flow_instancer::init_logger();
    ModelManager::new(catalog(), config)
}

/// A manager that already rendered `count` cubes once, with the recorder's log
/// cleared afterwards.
pub fn synced_manager(
    config: ManagerConfig,
    count: usize,
) -> (ModelManager<RecordingBackend>, RecordingBackend, Vec<u32>) {
    let mut manager = manager(config);
    let mut gpu = RecordingBackend::new();
    let ids = (0..count)
        .map(|_| manager.add_instance(0).unwrap())
        .collect();
    manager.render(&mut gpu).unwrap();
    gpu.clear_calls();
    (manager, gpu, ids)
}
