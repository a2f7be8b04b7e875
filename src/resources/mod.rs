/**
 * This module contains all logic for loading meshes from external files into a
 * [`MeshCatalog`]. Materials referenced by the files are ignored; instances carry a
 * plain material index instead.
 */
pub mod mesh;

use std::io::{BufReader, Cursor};

use crate::data_structures::mesh::MeshCatalog;

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("window has no origin"))?;
    let base = reqwest::Url::parse(&format!("{}/assets/", origin))?;
    Ok(base.join(file_name)?)
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = {
        let path = std::path::Path::new("./").join("assets").join(file_name);
        std::fs::read_to_string(path)?
    };

    Ok(txt)
}

/// Loads `assets/<file_name>` with one catalog mesh per OBJ object.
pub async fn load_catalog_obj(file_name: &str) -> anyhow::Result<MeshCatalog> {
    let obj_text = load_string(file_name).await?;
    catalog_from_obj_str(file_name, &obj_text).await
}

/// Like [`load_catalog_obj`], for OBJ text that is already in memory. `name` is
/// used in log and error messages only.
pub async fn catalog_from_obj_str(name: &str, obj_text: &str) -> anyhow::Result<MeshCatalog> {
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let (models, _) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| async { Err(tobj::LoadError::OpenFileFailed) },
    )
    .await?;

    let mut catalog = MeshCatalog::new();
    for (idx, model) in models.iter().enumerate() {
        let (vertices, indices) = mesh::pool_geometry(model);
        let mesh_name = if model.name.is_empty() {
            format!("{}#{}", name, idx)
        } else {
            model.name.clone()
        };
        catalog.push_mesh(&mesh_name, &vertices, &indices)?;
    }
    log::info!(
        "loaded {} meshes from {} ({} vertices, {} indices)",
        catalog.mesh_count(),
        name,
        catalog.vertices().len(),
        catalog.indices().len()
    );
    Ok(catalog)
}
