//! Model loading helpers.
//!
//! Models are read through an [`AssetSource`]: the filesystem on native
//! builds, or an in-memory map that the browser host fills with fetched
//! bytes before setup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::LoadError;
use crate::instanced_grid::InstancedGrid;
use crate::model::{ModelAsset, ModelRegistry};

/// Where model bytes come from.
pub trait AssetSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads assets relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsAssets {
    root: PathBuf,
}

impl FsAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for FsAssets {
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let full = self.root.join(path);
        std::fs::read(&full).map_err(|source| LoadError::Io {
            path: full.display().to_string(),
            source,
        })
    }
}

/// Assets registered by path ahead of time.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetSource for MemoryAssets {
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::MissingAsset(path.to_string()))
    }
}

/// Loads and caches models from an asset source.
pub struct ModelLoader<S: AssetSource> {
    source: S,
    registry: ModelRegistry,
}

impl<S: AssetSource> ModelLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            registry: ModelRegistry::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Load a model, reusing the cached asset when the path was seen before.
    ///
    /// `.obj` files are parsed as Wavefront OBJ; everything else as glTF/GLB.
    pub fn load(&mut self, path: &str) -> Result<Arc<ModelAsset>, LoadError> {
        if let Some(asset) = self.registry.get(path) {
            return Ok(asset);
        }

        let bytes = self.source.read(path)?;
        let asset = if is_obj(path) {
            let text = String::from_utf8_lossy(&bytes);
            ModelAsset::from_obj(path.to_string(), &text)?
        } else {
            ModelAsset::from_gltf(path.to_string(), &bytes)?
        };

        log::info!(
            "Loaded model '{}': {} part(s), {} triangles",
            path,
            asset.parts.len(),
            asset.triangle_count()
        );

        Ok(self.registry.register(asset))
    }

    /// Load a model and hand it to `on_load`.
    ///
    /// Failures go to `on_error` when given, otherwise they are logged.
    pub fn load_model<F, E>(&mut self, path: &str, on_load: F, on_error: Option<E>)
    where
        F: FnOnce(Arc<ModelAsset>),
        E: FnOnce(LoadError),
    {
        match self.load(path) {
            Ok(asset) => on_load(asset),
            Err(e) => report(e, on_error),
        }
    }

    /// Build an instanced grid from the first mesh of a model.
    ///
    /// `scale` defaults to 1 and multiplies both the instance size and
    /// `spacing`.
    pub fn instanced_grid(
        &mut self,
        path: &str,
        grid_size: u32,
        spacing: f32,
        scale: Option<f32>,
    ) -> Result<InstancedGrid, LoadError> {
        let asset = self.load(path)?;
        let part = asset
            .first_part()
            .cloned()
            .ok_or_else(|| LoadError::EmptyModel(path.to_string()))?;

        InstancedGrid::new(part, grid_size, spacing, scale.unwrap_or(1.0))
    }

    /// Callback form of [`ModelLoader::instanced_grid`].
    pub fn load_instanced_grid<F, E>(
        &mut self,
        path: &str,
        grid_size: u32,
        spacing: f32,
        on_grid: F,
        scale: Option<f32>,
        on_error: Option<E>,
    ) where
        F: FnOnce(InstancedGrid),
        E: FnOnce(LoadError),
    {
        match self.instanced_grid(path, grid_size, spacing, scale) {
            Ok(grid) => on_grid(grid),
            Err(e) => report(e, on_error),
        }
    }
}

fn report<E: FnOnce(LoadError)>(error: LoadError, on_error: Option<E>) {
    match on_error {
        Some(handler) => handler(error),
        None => log::error!("An error occurred while loading the model: {}", error),
    }
}

fn is_obj(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("obj"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const TRIANGLE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
    const TWO_OBJECTS: &str = "o first\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\no second\nv 0 0 1\nv 1 0 1\nv 0 1 1\nv 1 1 1\nf 4 5 6\nf 5 7 6\n";

    fn loader() -> ModelLoader<MemoryAssets> {
        let mut assets = MemoryAssets::new();
        assets.insert("tri.obj", TRIANGLE_OBJ.as_bytes().to_vec());
        assets.insert("two.OBJ", TWO_OBJECTS.as_bytes().to_vec());
        ModelLoader::new(assets)
    }

    #[test]
    fn test_load_caches() {
        let mut loader = loader();
        let a = loader.load("tri.obj").unwrap();
        let b = loader.load("tri.obj").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(loader.registry().contains("tri.obj"));
    }

    #[test]
    fn test_missing_asset() {
        let mut loader = loader();
        let err = loader.load("nope.glb").unwrap_err();
        assert!(matches!(err, LoadError::MissingAsset(_)));
    }

    #[test]
    fn test_load_model_callbacks() {
        let mut loader = loader();
        let loaded = Cell::new(false);
        loader.load_model("tri.obj", |_| loaded.set(true), None::<fn(LoadError)>);
        assert!(loaded.get());

        let failed = Cell::new(false);
        loader.load_model("missing.glb", |_| panic!("should not load"), Some(|_| failed.set(true)));
        assert!(failed.get());

        // Without an error handler the failure is only logged
        loader.load_model("missing.glb", |_| panic!("should not load"), None::<fn(LoadError)>);
    }

    #[test]
    fn test_grid_uses_first_part() {
        let mut loader = loader();
        let grid = loader.instanced_grid("two.OBJ", 3, 1.0, None).unwrap();
        assert_eq!(grid.count(), 9);
        assert_eq!(grid.mesh.part.triangle_count(), 1);
    }

    #[test]
    fn test_load_instanced_grid_callback() {
        let mut loader = loader();
        let count = Cell::new(0);
        loader.load_instanced_grid(
            "tri.obj",
            4,
            2.0,
            |grid| count.set(grid.count()),
            Some(0.5),
            None::<fn(LoadError)>,
        );
        assert_eq!(count.get(), 16);
    }

    #[test]
    fn test_fs_assets_reports_path() {
        let assets = FsAssets::new("/definitely/not/here");
        let err = assets.read("model.glb").unwrap_err();
        assert!(err.to_string().contains("model.glb"));
    }

    #[test]
    fn test_is_obj() {
        assert!(is_obj("a/b.obj"));
        assert!(is_obj("B.OBJ"));
        assert!(!is_obj("book.glb"));
        assert!(!is_obj("noext"));
    }
}
