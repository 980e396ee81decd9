//! Loads binary glTF models built in memory and drives the demo loop with
//! them, without a GPU.
//!
//! Run with: cargo test --test scene_loading

use std::sync::Arc;

use duneview::config::{DemoConfig, GroundConfig};
use duneview::controls::ControlsKind;
use duneview::demo::{DemoState, BOOK_NAME, GROUND_NAME, SKYDOME_NAME};
use duneview::error::LoadError;
use duneview::instanced_grid::ScrollAxis;
use duneview::loader::{FsAssets, MemoryAssets, ModelLoader};
use duneview::material::Side;
use duneview::model::ModelAsset;
use glam::Vec3;

const GLB_MAGIC: u32 = 0x4654_6C67;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// One red, double-sided triangle in the XY plane, lifted one unit on Y by
/// its node.
fn triangle_glb() -> Vec<u8> {
    let mut bin = Vec::new();
    for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        for c in p {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }

    let json = format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "mesh": 0, "translation": [0.0, 1.0, 0.0] }}],
  "meshes": [{{
    "name": "triangle",
    "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "material": 0 }}]
  }}],
  "materials": [{{
    "pbrMetallicRoughness": {{ "baseColorFactor": [1.0, 0.0, 0.0, 1.0] }},
    "doubleSided": true
  }}],
  "buffers": [{{ "byteLength": {} }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]
}}"#,
        bin.len()
    );

    glb(json.as_bytes(), &bin)
}

fn glb(json: &[u8], bin: &[u8]) -> Vec<u8> {
    let mut json = json.to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json);

    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);
    out
}

fn assets() -> MemoryAssets {
    let mut assets = MemoryAssets::new();
    for path in ["models/book.glb", "models/sky.glb", "models/ground.glb"] {
        assets.insert(path, triangle_glb());
    }
    assets
}

fn config() -> DemoConfig {
    DemoConfig {
        book_model: Some("models/book.glb".to_string()),
        skydome_model: Some("models/sky.glb".to_string()),
        ground: Some(GroundConfig {
            model: "models/ground.glb".to_string(),
            grid_size: 4,
            spacing: 2.0,
            scroll_axis: ScrollAxis::Z,
            scroll_speed: 0.5,
            ..GroundConfig::default()
        }),
        controls: ControlsKind::Keyboard,
        ..DemoConfig::default()
    }
}

#[test]
fn test_glb_decodes_geometry_and_material() {
    let asset = ModelAsset::from_gltf("triangle.glb".to_string(), &triangle_glb()).unwrap();
    assert_eq!(asset.parts.len(), 1);
    assert_eq!(asset.triangle_count(), 1);

    let part = &asset.parts[0];
    assert_eq!(part.indices, vec![0, 1, 2]);
    assert_eq!(part.local_matrix.w_axis.truncate(), Vec3::new(0.0, 1.0, 0.0));
    // No normals in the file, so they are generated facing +Z
    assert!((part.vertices[0].normal[2] - 1.0).abs() < 1e-5);

    assert_eq!(part.material.side, Side::Double);
    assert_eq!(part.material.color.r, 1.0);
    assert_eq!(part.material.color.g, 0.0);
    assert!(!part.material.transparent);
}

#[test]
fn test_loader_caches_by_path() {
    let mut loader = ModelLoader::new(assets());
    let first = loader.load("models/book.glb").unwrap();
    let second = loader.load("models/book.glb").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(loader.registry().contains("models/book.glb"));
}

#[test]
fn test_grid_from_glb_keeps_wrapping() {
    let mut loader = ModelLoader::new(assets());
    let mut grid = None;
    loader.load_instanced_grid(
        "models/ground.glb",
        4,
        2.0,
        |g| grid = Some(g),
        None,
        Some(|e: LoadError| panic!("unexpected load error: {}", e)),
    );
    let mut grid = grid.unwrap();
    assert_eq!(grid.count(), 16);
    assert!((grid.spacing() - 2.0).abs() < 1e-5);
    assert!(grid.take_needs_update());

    let threshold = grid.wrap_threshold();
    for _ in 0..100 {
        grid.scroll(ScrollAxis::X, 0.3);
        assert!(grid.take_needs_update());
        for matrix in grid.matrices() {
            let p = matrix.w_axis.truncate();
            assert!(p.x >= -threshold - 1e-4 && p.x < threshold + 1e-4);
            assert!(p.z >= -threshold - 1e-4 && p.z < threshold + 1e-4);
        }
    }
}

#[test]
fn test_demo_loop_with_glb_assets() {
    let mut demo = DemoState::new(config());
    demo.setup(&mut ModelLoader::new(assets()));

    assert!(demo.object_id(BOOK_NAME).is_some());
    let sky = demo.object_id(SKYDOME_NAME).unwrap();
    let ground = demo.object_id(GROUND_NAME).unwrap();

    for _ in 0..50 {
        demo.update(1.0 / 60.0);
    }
    assert_eq!(demo.frame(), 50);

    let sky_position = demo.scene.get(sky).unwrap().transform.position;
    assert_eq!(sky_position, demo.camera.position);

    // 25 units of scrolling on an 8-unit grid: every tile wrapped at least once
    // and the grid still covers [-4, 4) on Z with 2-unit steps.
    let grid = demo.scene.get(ground).unwrap().as_grid().unwrap();
    let mut zs: Vec<i32> = grid
        .matrices()
        .iter()
        .map(|m| (m.w_axis.z * 10.0).round() as i32)
        .collect();
    zs.sort();
    zs.dedup();
    assert_eq!(zs.len(), 4);
    for pair in zs.windows(2) {
        assert_eq!(pair[1] - pair[0], 20);
    }
}

#[test]
fn test_demo_from_filesystem() {
    let root = std::env::temp_dir().join(format!("duneview-scene-loading-{}", std::process::id()));
    std::fs::create_dir_all(root.join("models")).unwrap();
    std::fs::write(root.join("models/book.glb"), triangle_glb()).unwrap();

    let config = DemoConfig {
        assets_dir: root.clone(),
        skydome_model: Some("models/missing.glb".to_string()),
        ..config()
    };
    let mut demo = DemoState::new(config.clone());
    demo.setup(&mut ModelLoader::new(FsAssets::new(config.assets_dir.clone())));

    // The book loads; the missing skydome and ground are skipped
    assert!(demo.object_id(BOOK_NAME).is_some());
    assert!(demo.object_id(SKYDOME_NAME).is_none());
    assert!(demo.object_id(GROUND_NAME).is_none());
    demo.update(1.0 / 60.0);

    std::fs::remove_dir_all(&root).unwrap();
}
