pub mod camera;
pub mod color;
pub mod config;
pub mod controls;
pub mod demo;
pub mod error;
pub mod gpu;
pub mod input;
pub mod instanced_grid;
pub mod lighting;
pub mod loader;
pub mod material;
pub mod matrix;
pub mod model;
pub mod scene_graph;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
