//! Demo configuration.
//!
//! Loaded from an optional JSON file. Every field has a default so a
//! partial file (or none at all) is valid; the CLI applies its overrides on
//! top.

use std::f32::consts::FRAC_PI_4;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::controls::ControlsKind;
use crate::instanced_grid::{ScrollAxis, MAX_GRID_SIZE};

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_book_model() -> Option<String> {
    Some("models/testBook.glb".to_string())
}

fn default_skydome_model() -> Option<String> {
    Some("models/skydome_RustigKoppie_PureSky.glb".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DemoConfig {
    /// Root for relative model paths.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    #[serde(default = "default_book_model")]
    pub book_model: Option<String>,

    #[serde(default = "default_skydome_model")]
    pub skydome_model: Option<String>,

    /// Scrolling ground grid. Off unless configured.
    #[serde(default)]
    pub ground: Option<GroundConfig>,

    /// Spinning test cube.
    #[serde(default)]
    pub show_cube: bool,

    #[serde(default)]
    pub controls: ControlsKind,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub render: RenderConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            book_model: default_book_model(),
            skydome_model: default_skydome_model(),
            ground: None,
            show_cube: false,
            controls: ControlsKind::default(),
            camera: CameraConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl DemoConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.render.virtual_width == 0 || self.render.virtual_height == 0 {
            anyhow::bail!("virtual resolution must be non-zero");
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            anyhow::bail!(
                "camera clip planes must satisfy 0 < near < far (near {}, far {})",
                self.camera.near,
                self.camera.far
            );
        }
        if let Some(ground) = &self.ground {
            if !ground.spacing.is_finite() || !ground.scale.is_finite() || !ground.scroll_speed.is_finite() {
                anyhow::bail!("ground spacing, scale and scroll speed must be finite");
            }
            if ground.grid_size > MAX_GRID_SIZE {
                anyhow::bail!("ground grid size {} exceeds {}", ground.grid_size, MAX_GRID_SIZE);
            }
        }
        Ok(())
    }
}

fn default_ground_model() -> String {
    "models/ground.glb".to_string()
}

fn default_grid_size() -> u32 {
    20
}

fn default_spacing() -> f32 {
    2.0
}

fn default_scale() -> f32 {
    1.0
}

fn default_scroll_speed() -> f32 {
    0.05
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroundConfig {
    #[serde(default = "default_ground_model")]
    pub model: String,

    /// Instances per side.
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,

    /// Distance between neighbouring tiles before scaling.
    #[serde(default = "default_spacing")]
    pub spacing: f32,

    #[serde(default = "default_scale")]
    pub scale: f32,

    #[serde(default)]
    pub scroll_axis: ScrollAxis,

    /// World units per frame.
    #[serde(default = "default_scroll_speed")]
    pub scroll_speed: f32,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            model: default_ground_model(),
            grid_size: default_grid_size(),
            spacing: default_spacing(),
            scale: default_scale(),
            scroll_axis: ScrollAxis::default(),
            scroll_speed: default_scroll_speed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    /// Initial rotation about X, in radians.
    pub pitch: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            position: [0.0, 5.0, 5.0],
            pitch: FRAC_PI_4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    /// Render into a small target and upscale it for a pixelated look.
    pub reduced_resolution: bool,
    pub virtual_width: u32,
    pub virtual_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            reduced_resolution: true,
            virtual_width: 320,
            virtual_height: 240,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = DemoConfig::from_json("{}").unwrap();
        assert_eq!(config, DemoConfig::default());
        assert_eq!(config.assets_dir, PathBuf::from("assets"));
        assert_eq!(config.book_model.as_deref(), Some("models/testBook.glb"));
        assert!(config.ground.is_none());
        assert!(config.render.reduced_resolution);
        assert_eq!(config.camera.fov_degrees, 75.0);
    }

    #[test]
    fn test_partial_ground() {
        let config = DemoConfig::from_json(
            r#"{ "ground": { "model": "models/sand.glb", "scrollAxis": "x" }, "controls": "keyboard" }"#,
        )
        .unwrap();
        let ground = config.ground.unwrap();
        assert_eq!(ground.model, "models/sand.glb");
        assert_eq!(ground.grid_size, 20);
        assert_eq!(ground.spacing, 2.0);
        assert_eq!(ground.scroll_axis, ScrollAxis::X);
        assert_eq!(config.controls, ControlsKind::Keyboard);
    }

    #[test]
    fn test_models_can_be_disabled() {
        let config = DemoConfig::from_json(r#"{ "bookModel": null, "render": { "virtualWidth": 160 } }"#).unwrap();
        assert!(config.book_model.is_none());
        assert_eq!(config.render.virtual_width, 160);
        assert_eq!(config.render.virtual_height, 240);
    }

    #[test]
    fn test_validate() {
        let mut config = DemoConfig::default();
        assert!(config.validate().is_ok());

        config.render.virtual_height = 0;
        assert!(config.validate().is_err());

        let mut config = DemoConfig::default();
        config.camera.near = 0.0;
        assert!(config.validate().is_err());

        let mut config = DemoConfig::default();
        config.ground = Some(GroundConfig {
            spacing: f32::NAN,
            ..GroundConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_grid() {
        let config = DemoConfig::from_json(r#"{ "ground": { "gridSize": 70000 } }"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("70000"));

        let config = DemoConfig::from_json(r#"{ "ground": { "gridSize": 1024 } }"#).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = DemoConfig::load(Path::new("/no/such/duneview.json")).unwrap_err();
        assert!(err.to_string().contains("/no/such/duneview.json"));
    }
}
