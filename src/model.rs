//! Model assets: geometry and materials decoded from glTF or OBJ.
//!
//! A model is flattened into a list of [`MeshPart`]s in depth-first node
//! order, each carrying the accumulated node transform. The first part is
//! what the instanced grid tiles.
//!
//! ## Normal Handling
//!
//! Provided normals are used when available. Missing normals are generated
//! with area-weighted averaging of adjacent face normals.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Mat4;

use crate::color::Color;
use crate::error::LoadError;
use crate::gpu::mesh::{self, Vertex};
use crate::material::{Material, Side, TextureData};

/// Axis-aligned bounding box for a mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    /// Compute bounding box from a set of vertices.
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        if vertices.is_empty() {
            return Self::default();
        }

        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];

        for v in vertices {
            for i in 0..3 {
                min[i] = min[i].min(v.position[i]);
                max[i] = max[i].max(v.position[i]);
            }
        }

        Self { min, max }
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> Self {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = out.min[i].min(other.min[i]);
            out.max[i] = out.max[i].max(other.max[i]);
        }
        out
    }

    /// Box enclosing this one after transformation by `matrix`.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for corner in 0..8 {
            let p = glam::Vec3::new(
                if corner & 1 == 0 { self.min[0] } else { self.max[0] },
                if corner & 2 == 0 { self.min[1] } else { self.max[1] },
                if corner & 4 == 0 { self.min[2] } else { self.max[2] },
            );
            let world = matrix.transform_point3(p).to_array();
            for i in 0..3 {
                min[i] = min[i].min(world[i]);
                max[i] = max[i].max(world[i]);
            }
        }
        Self { min, max }
    }

    /// Get the center of the bounding box.
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    /// Get the dimensions of the bounding box.
    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// One drawable primitive of a model.
#[derive(Debug, Clone)]
pub struct MeshPart {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: Material,
    /// Node transform relative to the model root.
    pub local_matrix: Mat4,
    pub bounds: BoundingBox,
}

impl MeshPart {
    pub fn new(name: String, vertices: Vec<Vertex>, indices: Vec<u32>, material: Material) -> Self {
        let bounds = BoundingBox::from_vertices(&vertices);
        Self {
            name,
            vertices,
            indices,
            material,
            local_matrix: Mat4::IDENTITY,
            bounds,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// A loaded model asset with geometry data ready for rendering.
#[derive(Debug, Clone)]
pub struct ModelAsset {
    /// Unique identifier for this asset (usually its path).
    pub id: String,
    pub parts: Vec<Arc<MeshPart>>,
    /// Bounds of all parts in model space.
    pub bounds: BoundingBox,
}

impl ModelAsset {
    pub fn new(id: String, parts: Vec<MeshPart>) -> Self {
        let bounds = parts
            .iter()
            .map(|p| p.bounds.transformed(&p.local_matrix))
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();

        Self {
            id,
            parts: parts.into_iter().map(Arc::new).collect(),
            bounds,
        }
    }

    /// The part an instanced grid replicates.
    pub fn first_part(&self) -> Option<&Arc<MeshPart>> {
        self.parts.first()
    }

    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(|p| p.triangle_count()).sum()
    }

    /// Built-in unit cube with a single flat-coloured material.
    pub fn cube(id: String, color: Color) -> Self {
        let (vertices, indices) = mesh::create_cube_geometry();
        let part = MeshPart::new("cube".to_string(), vertices, indices, Material::with_color(color));
        Self::new(id, vec![part])
    }

    /// Parse a glTF (JSON with embedded buffers) or GLB binary.
    pub fn from_gltf(id: String, bytes: &[u8]) -> Result<Self, LoadError> {
        let (document, buffers, images) = gltf::import_slice(bytes).map_err(|e| LoadError::Gltf {
            path: id.clone(),
            message: e.to_string(),
        })?;

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| LoadError::EmptyModel(id.clone()))?;

        let mut ctx = GltfContext {
            asset_id: &id,
            buffers: &buffers,
            images: &images,
            textures: HashMap::new(),
            parts: Vec::new(),
        };

        for node in scene.nodes() {
            ctx.collect_node(&node, Mat4::IDENTITY);
        }

        if ctx.parts.is_empty() {
            return Err(LoadError::EmptyModel(id));
        }

        let parts = std::mem::take(&mut ctx.parts);
        Ok(Self::new(id, parts))
    }

    /// Parse a Wavefront OBJ string. Each OBJ object becomes one part.
    pub fn from_obj(id: String, obj_content: &str) -> Result<Self, LoadError> {
        let mut cursor = std::io::Cursor::new(obj_content.as_bytes());

        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, _materials) = tobj::load_obj_buf(&mut cursor, &load_options, |_| {
            Ok((vec![], HashMap::new()))
        })
        .map_err(|e| LoadError::Obj {
            path: id.clone(),
            message: e.to_string(),
        })?;

        let mut parts = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            if mesh.positions.is_empty() {
                continue;
            }

            let vertex_count = mesh.positions.len() / 3;
            let positions: Vec<[f32; 3]> = mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect();

            let normals = if mesh.normals.len() == mesh.positions.len() {
                mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect()
            } else {
                compute_vertex_normals(&positions, &mesh.indices)
            };

            let has_uvs = mesh.texcoords.len() == vertex_count * 2;
            let vertices = positions
                .iter()
                .zip(normals.iter())
                .enumerate()
                .map(|(i, (position, normal))| {
                    let uv = if has_uvs {
                        // OBJ has V pointing up
                        [mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1]]
                    } else {
                        [0.0, 0.0]
                    };
                    Vertex::new(*position, *normal, uv)
                })
                .collect();

            parts.push(MeshPart::new(
                model.name.clone(),
                vertices,
                mesh.indices.clone(),
                Material::default(),
            ));
        }

        if parts.is_empty() {
            return Err(LoadError::EmptyModel(id));
        }

        Ok(Self::new(id, parts))
    }
}

/// Walk state for flattening a glTF scene.
struct GltfContext<'a> {
    asset_id: &'a str,
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    textures: HashMap<usize, Option<Arc<TextureData>>>,
    parts: Vec<MeshPart>,
}

impl GltfContext<'_> {
    fn collect_node(&mut self, node: &gltf::Node, parent: Mat4) {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

        if let Some(gltf_mesh) = node.mesh() {
            let mesh_name = gltf_mesh.name().unwrap_or("mesh").to_string();
            for primitive in gltf_mesh.primitives() {
                if let Some(mut part) = self.read_primitive(&primitive, &mesh_name) {
                    part.local_matrix = world;
                    self.parts.push(part);
                }
            }
        }

        for child in node.children() {
            self.collect_node(&child, world);
        }
    }

    fn read_primitive(&mut self, primitive: &gltf::Primitive, mesh_name: &str) -> Option<MeshPart> {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!(
                "{}: skipping primitive of '{}' with mode {:?}",
                self.asset_id,
                mesh_name,
                primitive.mode()
            );
            return None;
        }

        let buffers = self.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

        let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        let normals: Vec<[f32; 3]> = match reader.read_normals() {
            Some(normals) => normals.collect(),
            None => compute_vertex_normals(&positions, &indices),
        };
        let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
            Some(uvs) => uvs.into_f32().collect(),
            None => vec![[0.0, 0.0]; positions.len()],
        };

        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, position)| {
                let normal = normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]);
                let uv = uvs.get(i).copied().unwrap_or([0.0, 0.0]);
                Vertex::new(*position, normal, uv)
            })
            .collect();

        let material = self.read_material(&primitive.material());
        let name = format!("{}#{}", mesh_name, primitive.index());
        Some(MeshPart::new(name, vertices, indices, material))
    }

    fn read_material(&mut self, source: &gltf::Material) -> Material {
        let pbr = source.pbr_metallic_roughness();
        let [r, g, b, a] = pbr.base_color_factor();

        let map = pbr
            .base_color_texture()
            .and_then(|info| self.texture(info.texture().source().index()));

        Material {
            color: Color::new(r, g, b),
            opacity: a,
            map,
            emissive: Color::from(source.emissive_factor()),
            side: if source.double_sided() { Side::Double } else { Side::Front },
            transparent: source.alpha_mode() == gltf::material::AlphaMode::Blend,
            ..Material::default()
        }
    }

    fn texture(&mut self, image_index: usize) -> Option<Arc<TextureData>> {
        if let Some(cached) = self.textures.get(&image_index) {
            return cached.clone();
        }

        let decoded = self.images.get(image_index).and_then(|image| {
            let pixels = to_rgba8(image);
            if pixels.is_none() {
                log::warn!(
                    "{}: unsupported texture format {:?} for image {}",
                    self.asset_id,
                    image.format,
                    image_index
                );
            }
            pixels.map(|pixels| {
                Arc::new(TextureData {
                    key: format!("{}#image{}", self.asset_id, image_index),
                    width: image.width,
                    height: image.height,
                    pixels,
                })
            })
        });

        self.textures.insert(image_index, decoded.clone());
        decoded
    }
}

/// Expand an 8-bit glTF image to RGBA8. Other bit depths are unsupported.
fn to_rgba8(image: &gltf::image::Data) -> Option<Vec<u8>> {
    use gltf::image::Format;

    let pixels = &image.pixels;
    let rgba = match image.format {
        Format::R8G8B8A8 => pixels.clone(),
        Format::R8G8B8 => pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        Format::R8 => pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        _ => return None,
    };
    Some(rgba)
}

/// Compute area-weighted vertex normals from face normals.
///
/// For each vertex, accumulates the (unnormalized) face normal of each adjacent triangle.
/// Larger triangles contribute proportionally more to the normal.
fn compute_vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![glam::Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }

        let p0 = glam::Vec3::from(positions[i0]);
        let p1 = glam::Vec3::from(positions[i1]);
        let p2 = glam::Vec3::from(positions[i2]);

        // Magnitude = 2 * triangle area
        let face_normal = (p1 - p0).cross(p2 - p0);
        for idx in [i0, i1, i2] {
            normals[idx] += face_normal;
        }
    }

    normals
        .into_iter()
        .map(|n| {
            if n.length_squared() > 1e-12 {
                n.normalize().to_array()
            } else {
                // Degenerate normal, use Y-up as fallback
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

/// Registry for loaded model assets.
///
/// Caches assets to avoid redundant loading and allows sharing across objects.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    assets: HashMap<String, Arc<ModelAsset>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, asset: ModelAsset) -> Arc<ModelAsset> {
        let asset = Arc::new(asset);
        self.assets.insert(asset.id.clone(), asset.clone());
        asset
    }

    pub fn get(&self, asset_id: &str) -> Option<Arc<ModelAsset>> {
        self.assets.get(asset_id).cloned()
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.assets.contains_key(asset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_from_vertices() {
        let vertices = vec![
            Vertex::new([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0; 2]),
            Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0; 2]),
            Vertex::new([0.0, 2.0, 0.0], [0.0, 1.0, 0.0], [0.0; 2]),
        ];

        let bounds = BoundingBox::from_vertices(&vertices);
        assert_eq!(bounds.min, [-1.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [1.0, 2.0, 0.0]);
        assert_eq!(bounds.center(), [0.0, 1.0, 0.0]);
        assert_eq!(bounds.size(), [2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_bounds_transformed() {
        let bounds = BoundingBox {
            min: [-0.5; 3],
            max: [0.5; 3],
        };
        let moved = bounds.transformed(&Mat4::from_translation(glam::Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.center(), [10.0, 0.0, 0.0]);
        assert_eq!(moved.size(), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_obj_parsing() {
        let obj_content = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f 1 2 3
        "#;

        let asset = ModelAsset::from_obj("test.obj".to_string(), obj_content).unwrap();
        assert_eq!(asset.parts.len(), 1);
        let part = &asset.parts[0];
        assert_eq!(part.vertices.len(), 3);
        assert_eq!(part.triangle_count(), 1);
        // Generated normal faces +Z for a CCW triangle in the XY plane
        assert!((part.vertices[0].normal[2] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_obj_without_faces_is_empty() {
        let err = ModelAsset::from_obj("empty.obj".to_string(), "# nothing here\n").unwrap_err();
        assert!(matches!(err, LoadError::EmptyModel(_)));
    }

    #[test]
    fn test_gltf_garbage_is_rejected() {
        let err = ModelAsset::from_gltf("bad.glb".to_string(), b"not a model").unwrap_err();
        assert!(matches!(err, LoadError::Gltf { .. }));
    }

    #[test]
    fn test_cube_asset() {
        let cube = ModelAsset::cube("cube".to_string(), Color::from_hex(0x00ff00));
        assert_eq!(cube.parts.len(), 1);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.bounds.size(), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_to_rgba8_expands_rgb() {
        let image = gltf::image::Data {
            pixels: vec![10, 20, 30, 40, 50, 60],
            format: gltf::image::Format::R8G8B8,
            width: 2,
            height: 1,
        };
        assert_eq!(to_rgba8(&image).unwrap(), vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_registry() {
        let mut registry = ModelRegistry::new();
        registry.register(ModelAsset::cube("cube".to_string(), Color::WHITE));

        assert!(registry.contains("cube"));
        assert!(!registry.contains("nonexistent"));
        assert_eq!(registry.get("cube").unwrap().id, "cube");

        // Re-registering an id replaces the cached asset
        let first = registry.get("cube").unwrap();
        let second = registry.register(ModelAsset::cube("cube".to_string(), Color::BLACK));
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&registry.get("cube").unwrap(), &second));
    }
}
