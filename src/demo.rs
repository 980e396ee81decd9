//! The demo scene and its per-frame animation.
//!
//! `DemoState` owns everything the renderer reads: the scene graph, the
//! camera and the lights. Front ends (the native window, the headless
//! renderer and the browser) create it, call [`DemoState::setup`] once with
//! a model loader and then [`DemoState::update`] every frame.

use std::sync::Arc;

use glam::{EulerRot, Quat, Vec3};

use crate::camera::Camera;
use crate::color::Color;
use crate::config::DemoConfig;
use crate::controls::CameraControls;
use crate::error::LoadError;
use crate::input::InputState;
use crate::lighting::{AmbientLight, DirectionalLight, Lights};
use crate::loader::{AssetSource, ModelLoader};
use crate::matrix::print_matrix;
use crate::model::ModelAsset;
use crate::scene_graph::{EntityId, SceneGraph, SceneObject};

pub const BOOK_NAME: &str = "test_book";
pub const SKYDOME_NAME: &str = "skydome";
pub const GROUND_NAME: &str = "ground";
pub const CUBE_NAME: &str = "cube";

/// Radians added to the test cube's X and Y rotation each frame.
const CUBE_SPIN: f32 = 0.01;

pub struct DemoState {
    pub config: DemoConfig,
    pub scene: SceneGraph,
    pub camera: Camera,
    pub lights: Lights,
    pub input: InputState,
    controls: Box<dyn CameraControls>,
    skydome: Option<EntityId>,
    ground: Option<EntityId>,
    cube: Option<EntityId>,
    cube_rotation: Vec3,
    last_camera_position: Vec3,
    frame: u64,
    elapsed: f32,
}

impl DemoState {
    pub fn new(config: DemoConfig) -> Self {
        let aspect = config.render.virtual_width as f32 / config.render.virtual_height.max(1) as f32;
        let camera = Camera::from_config(&config.camera, aspect);
        let controls = config.controls.create();

        Self {
            config,
            scene: SceneGraph::new(),
            camera,
            lights: Lights::new(),
            input: InputState::new(),
            controls,
            skydome: None,
            ground: None,
            cube: None,
            cube_rotation: Vec3::ZERO,
            last_camera_position: Vec3::ZERO,
            frame: 0,
            elapsed: 0.0,
        }
    }

    /// Add the lights and load every configured object.
    ///
    /// A model that fails to load is logged and left out; the rest of the
    /// scene still comes up. Calling it again rebuilds the scene from
    /// scratch, picking up assets added since.
    pub fn setup<S: AssetSource>(&mut self, loader: &mut ModelLoader<S>) {
        self.scene.clear();
        self.skydome = None;
        self.ground = None;
        self.cube = None;
        self.cube_rotation = Vec3::ZERO;
        self.last_camera_position = Vec3::ZERO;

        self.lights.ambient = Some(AmbientLight::default());
        self.lights.directional = Some(DirectionalLight::default());

        if let Some(path) = self.config.book_model.clone() {
            let mut book = None;
            loader.load_model(&path, |asset| book = Some(asset), None::<fn(LoadError)>);
            if let Some(asset) = book {
                self.scene.add(SceneObject::model(BOOK_NAME, asset));
            }
        }

        if let Some(path) = self.config.skydome_model.clone() {
            let mut skydome = None;
            loader.load_model(&path, |asset| skydome = Some(asset), None::<fn(LoadError)>);
            if let Some(asset) = skydome {
                let mut object = SceneObject::model(SKYDOME_NAME, asset);
                object.copy_position(self.camera.position);
                object.set_front_side();
                object.convert_to_basic_material();
                object.disable_depth();
                // Drawn before everything else
                object.set_render_order(-1);
                self.skydome = Some(self.scene.add(object));
            }
        }

        if let Some(ground) = self.config.ground.clone() {
            let mut grid = None;
            loader.load_instanced_grid(
                &ground.model,
                ground.grid_size,
                ground.spacing,
                |g| grid = Some(g),
                Some(ground.scale),
                None::<fn(LoadError)>,
            );
            if let Some(grid) = grid {
                log::info!(
                    "Ground grid: {} instances, spacing {}",
                    grid.count(),
                    grid.spacing()
                );
                if let Some(first) = grid.matrix_at(0) {
                    print_matrix(&first);
                }
                self.ground = Some(self.scene.add(SceneObject::grid(GROUND_NAME, grid)));
            }
        }

        if self.config.show_cube {
            let asset = green_cube();
            self.cube = Some(self.scene.add(SceneObject::model(CUBE_NAME, asset)));
        }

        log::info!("Scene ready with {} object(s)", self.scene.len());
    }

    /// Advance the scene by one frame.
    pub fn update(&mut self, dt: f32) {
        self.frame += 1;
        self.elapsed += dt;

        // Keep the skydome centred on the camera
        if let Some(object) = self.skydome.and_then(|id| self.scene.get_mut(id)) {
            if self.last_camera_position != self.camera.position {
                object.copy_position(self.camera.position);
                self.last_camera_position = self.camera.position;
            }
        }

        if let Some(ground) = &self.config.ground {
            if let Some(grid) = self
                .ground
                .and_then(|id| self.scene.get_mut(id))
                .and_then(|object| object.as_grid_mut())
            {
                grid.scroll(ground.scroll_axis, ground.scroll_speed);
            }
        }

        if let Some(object) = self.cube.and_then(|id| self.scene.get_mut(id)) {
            self.cube_rotation.x += CUBE_SPIN;
            self.cube_rotation.y += CUBE_SPIN;
            object.transform.rotation = Quat::from_euler(
                EulerRot::XYZ,
                self.cube_rotation.x,
                self.cube_rotation.y,
                self.cube_rotation.z,
            );
        }

        self.controls.update(&mut self.camera, &mut self.input);
    }

    /// Follow a change in output size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_aspect(width, height);
        self.controls.resize(width, height);
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn object_id(&self, name: &str) -> Option<EntityId> {
        self.scene.find(name)
    }
}

fn green_cube() -> Arc<ModelAsset> {
    Arc::new(ModelAsset::cube(CUBE_NAME.to_string(), Color::from_hex(0x00ff00)))
}
