//! Errors raised while loading assets and building scene objects.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("asset '{0}' is not registered")]
    MissingAsset(String),

    #[error("failed to parse glTF '{path}': {message}")]
    Gltf { path: String, message: String },

    #[error("failed to parse OBJ '{path}': {message}")]
    Obj { path: String, message: String },

    #[error("model '{0}' contains no meshes")]
    EmptyModel(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),
}
