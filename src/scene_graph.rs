//! Scene graph for the demo.
//!
//! Objects are either whole models or instanced grids. Each object owns a
//! per-mesh copy of its materials, so the helpers here (side, depth, layers,
//! render order, ...) never touch the shared asset.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::instanced_grid::InstancedGrid;
use crate::material::{Material, Side};
use crate::model::{MeshPart, ModelAsset};

/// Unique identifier for scene objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Transform component for scene objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Model = Translation * Rotation * Scale
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Render layer membership as a 32-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layers(pub u32);

impl Default for Layers {
    fn default() -> Self {
        Self(1)
    }
}

impl Layers {
    /// Membership in exactly this layer.
    pub fn set(&mut self, layer: u32) {
        self.0 = 1 << (layer & 31);
    }

    pub fn enable(&mut self, layer: u32) {
        self.0 |= 1 << (layer & 31);
    }

    pub fn disable(&mut self, layer: u32) {
        self.0 &= !(1 << (layer & 31));
    }

    /// True if the two masks share at least one layer.
    pub fn test(&self, other: &Layers) -> bool {
        self.0 & other.0 != 0
    }
}

/// A drawable mesh inside an object.
#[derive(Debug, Clone)]
pub struct MeshNode {
    pub part: Arc<MeshPart>,
    pub material: Material,
    pub layers: Layers,
    /// Lower values draw first.
    pub render_order: i32,
}

impl MeshNode {
    pub fn new(part: Arc<MeshPart>) -> Self {
        Self {
            material: part.material.clone(),
            part,
            layers: Layers::default(),
            render_order: 0,
        }
    }
}

/// A model placed in the scene.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub asset: Arc<ModelAsset>,
    pub meshes: Vec<MeshNode>,
}

impl ModelInstance {
    pub fn new(asset: Arc<ModelAsset>) -> Self {
        let meshes = asset.parts.iter().cloned().map(MeshNode::new).collect();
        Self { asset, meshes }
    }
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Model(ModelInstance),
    Grid(InstancedGrid),
}

/// A scene object: a model or an instanced grid, with its transform.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    pub transform: Transform,
    pub visible: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl SceneObject {
    pub fn model(name: impl Into<String>, asset: Arc<ModelAsset>) -> Self {
        Self::with_kind(name, ObjectKind::Model(ModelInstance::new(asset)))
    }

    pub fn grid(name: impl Into<String>, grid: InstancedGrid) -> Self {
        Self::with_kind(name, ObjectKind::Grid(grid))
    }

    fn with_kind(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            transform: Transform::default(),
            visible: true,
            cast_shadow: false,
            receive_shadow: false,
        }
    }

    pub fn as_grid_mut(&mut self) -> Option<&mut InstancedGrid> {
        match &mut self.kind {
            ObjectKind::Grid(grid) => Some(grid),
            ObjectKind::Model(_) => None,
        }
    }

    pub fn as_grid(&self) -> Option<&InstancedGrid> {
        match &self.kind {
            ObjectKind::Grid(grid) => Some(grid),
            ObjectKind::Model(_) => None,
        }
    }

    /// Visit every mesh of this object.
    pub fn traverse_meshes(&self, mut f: impl FnMut(&MeshNode)) {
        match &self.kind {
            ObjectKind::Model(model) => model.meshes.iter().for_each(|m| f(m)),
            ObjectKind::Grid(grid) => f(&grid.mesh),
        }
    }

    /// Visit every mesh of this object mutably.
    pub fn traverse_meshes_mut(&mut self, mut f: impl FnMut(&mut MeshNode)) {
        match &mut self.kind {
            ObjectKind::Model(model) => model.meshes.iter_mut().for_each(|m| f(m)),
            ObjectKind::Grid(grid) => f(&mut grid.mesh),
        }
    }

    pub fn copy_position(&mut self, position: Vec3) {
        self.transform.position = position;
    }

    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.transform.position = Vec3::new(x, y, z);
    }

    pub fn disable_shadows(&mut self) {
        self.cast_shadow = false;
        self.receive_shadow = false;
    }

    /// Turn off depth testing and depth writes on every mesh.
    pub fn disable_depth(&mut self) {
        self.traverse_meshes_mut(|mesh| {
            mesh.material.depth_test = false;
            mesh.material.depth_write = false;
        });
    }

    pub fn set_back_side(&mut self) {
        self.traverse_meshes_mut(|mesh| mesh.material.side = Side::Back);
    }

    pub fn set_front_side(&mut self) {
        self.traverse_meshes_mut(|mesh| mesh.material.side = Side::Front);
    }

    /// Replace every material with its unlit equivalent.
    pub fn convert_to_basic_material(&mut self) {
        self.traverse_meshes_mut(|mesh| mesh.material = mesh.material.to_basic());
    }

    pub fn set_emissive_intensity(&mut self, intensity: f32) {
        self.traverse_meshes_mut(|mesh| mesh.material.emissive_intensity = intensity);
    }

    pub fn set_layer(&mut self, layer: u32) {
        self.traverse_meshes_mut(|mesh| mesh.layers.set(layer));
    }

    pub fn set_render_order(&mut self, order: i32) {
        self.traverse_meshes_mut(|mesh| mesh.render_order = order);
    }
}

/// The scene graph - owns all objects in insertion order.
#[derive(Debug)]
pub struct SceneGraph {
    objects: HashMap<EntityId, SceneObject>,
    order: Vec<EntityId>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            order: Vec::new(),
            next_id: 1,
        }
    }

    pub fn add(&mut self, object: SceneObject) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, object);
        self.order.push(id);
        id
    }

    pub fn remove(&mut self, id: EntityId) -> Option<SceneObject> {
        self.order.retain(|&e| e != id);
        self.objects.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id)
    }

    /// First object with the given name.
    pub fn find(&self, name: &str) -> Option<EntityId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.objects.get(id).is_some_and(|o| o.name == name))
    }

    /// All objects in insertion order.
    pub fn objects(&self) -> impl Iterator<Item = (EntityId, &SceneObject)> {
        self.order
            .iter()
            .filter_map(|&id| self.objects.get(&id).map(|o| (id, o)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.order.clear();
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::material::Shading;

    fn cube_object() -> SceneObject {
        let asset = Arc::new(ModelAsset::cube("cube".to_string(), Color::WHITE));
        SceneObject::model("cube", asset)
    }

    #[test]
    fn test_add_and_find() {
        let mut scene = SceneGraph::new();
        let a = scene.add(cube_object());
        let mut other = cube_object();
        other.name = "other".to_string();
        let b = scene.add(other);

        assert_ne!(a, b);
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.find("other"), Some(b));
        assert_eq!(scene.find("missing"), None);

        let ids: Vec<_> = scene.objects().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_remove() {
        let mut scene = SceneGraph::new();
        let id = scene.add(cube_object());
        assert!(scene.remove(id).is_some());
        assert!(scene.get(id).is_none());
        assert!(scene.is_empty());
        assert!(scene.remove(id).is_none());
    }

    #[test]
    fn test_layers() {
        let mut layers = Layers::default();
        assert!(layers.test(&Layers(1)));

        layers.set(3);
        assert_eq!(layers.0, 0b1000);
        assert!(!layers.test(&Layers::default()));

        layers.enable(0);
        assert!(layers.test(&Layers::default()));
        layers.disable(0);
        assert!(!layers.test(&Layers::default()));
    }

    #[test]
    fn test_material_helpers_touch_every_mesh() {
        let mut object = cube_object();
        object.set_back_side();
        object.disable_depth();
        object.set_render_order(-1);
        object.set_layer(2);
        object.set_emissive_intensity(4.0);

        object.traverse_meshes(|mesh| {
            assert_eq!(mesh.material.side, Side::Back);
            assert!(!mesh.material.depth_test);
            assert!(!mesh.material.depth_write);
            assert_eq!(mesh.render_order, -1);
            assert_eq!(mesh.layers, Layers(0b100));
            assert_eq!(mesh.material.emissive_intensity, 4.0);
        });

        object.set_front_side();
        object.convert_to_basic_material();
        object.traverse_meshes(|mesh| {
            assert_eq!(mesh.material.side, Side::Front);
            assert_eq!(mesh.material.shading, Shading::Basic);
        });
    }

    #[test]
    fn test_helpers_do_not_touch_shared_asset() {
        let mut object = cube_object();
        object.disable_depth();
        if let ObjectKind::Model(model) = &object.kind {
            assert!(model.asset.parts[0].material.depth_test);
        }
    }

    #[test]
    fn test_position_and_shadows() {
        let mut object = cube_object();
        object.cast_shadow = true;
        object.receive_shadow = true;
        object.disable_shadows();
        assert!(!object.cast_shadow && !object.receive_shadow);

        object.set_position(1.0, 2.0, 3.0);
        assert_eq!(object.transform.position, Vec3::new(1.0, 2.0, 3.0));
        object.copy_position(Vec3::new(0.0, 5.0, 5.0));
        assert_eq!(object.transform.position, Vec3::new(0.0, 5.0, 5.0));
    }

    #[test]
    fn test_transform_matrix() {
        let transform = Transform {
            position: Vec3::new(1.0, 0.0, 0.0),
            scale: Vec3::splat(2.0),
            ..Transform::default()
        };
        let p = transform.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(p, Vec3::new(3.0, 0.0, 0.0));
    }
}
