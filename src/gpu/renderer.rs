//! GPU renderer for the demo scene.
//!
//! Draws every visible mesh of the scene graph with one indexed, instanced
//! draw call. Regular models draw a single identity instance; instanced
//! grids bind their own per-instance matrix buffer. Per-draw values (model
//! matrix and material) live in one dynamic-offset uniform buffer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::camera::CameraUniforms;
use crate::config::RenderConfig;
use crate::demo::DemoState;
use crate::gpu::mesh::InstanceRaw;
use crate::gpu::pipeline::{self, PipelineKey};
use crate::gpu::pixel_pass::PixelPass;
use crate::gpu::texture::{GpuTexture, WHITE_TEXTURE_KEY};
use crate::lighting::LightingUniforms;
use crate::material::{Material, Shading};
use crate::model::MeshPart;
use crate::scene_graph::{EntityId, Layers, MeshNode, ObjectKind, SceneGraph};

/// Maximum number of draw calls per frame.
/// Each draw needs its own slot in the dynamic uniform buffer.
const MAX_DRAWS_PER_FRAME: usize = 256;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
const UNIFORM_ALIGNMENT: usize = 256;

const MSAA_SAMPLES: u32 = 4;

const CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    /// Draw into the low-resolution pixel target and upscale it.
    pub reduced_resolution: bool,
    pub virtual_width: u32,
    pub virtual_height: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for RenderSettings {
    fn from(config: &RenderConfig) -> Self {
        Self {
            reduced_resolution: config.reduced_resolution,
            virtual_width: config.virtual_width,
            virtual_height: config.virtual_height,
        }
    }
}

impl RenderSettings {
    /// Antialiasing is only wanted when drawing at full resolution.
    pub fn sample_count(&self) -> u32 {
        if self.reduced_resolution {
            1
        } else {
            MSAA_SAMPLES
        }
    }
}

/// Per-frame values shared by every draw.
/// Total size: 128 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Globals {
    camera: CameraUniforms,     // 80 bytes
    lighting: LightingUniforms, // 48 bytes
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DrawUniforms {
    model: [[f32; 4]; 4],
    base_color: [f32; 4],
    emissive: [f32; 4],
    flags: [u32; 4],
    // Padding to reach 256-byte alignment (112 bytes of data + 144 bytes padding)
    _padding: [[f32; 4]; 9],
}

impl DrawUniforms {
    fn new(model: Mat4, material: &Material) -> Self {
        let emissive = material.emissive.scaled(material.emissive_intensity);
        Self {
            model: model.to_cols_array_2d(),
            base_color: [material.color.r, material.color.g, material.color.b, material.opacity],
            emissive: [emissive.r, emissive.g, emissive.b, 0.0],
            flags: [
                u32::from(material.shading == Shading::Basic),
                u32::from(material.transparent && material.premultiplied_alpha),
                0,
                0,
            ],
            _padding: [[0.0; 4]; 9],
        }
    }
}

/// One draw call for the current frame.
#[derive(Debug, Clone)]
pub struct DrawItem<'a> {
    pub entity: EntityId,
    pub mesh: &'a MeshNode,
    /// Object (and mesh-local) transform; grids add their instance matrices.
    pub model: Mat4,
    /// `Some(n)` for an instanced grid of `n` tiles.
    pub grid_instances: Option<u32>,
}

/// Collect visible meshes whose layers match the camera, opaque before
/// transparent and by ascending render order within each group.
pub fn build_draw_list(scene: &SceneGraph, camera_layers: Layers) -> Vec<DrawItem<'_>> {
    let mut items = Vec::new();

    for (entity, object) in scene.objects() {
        if !object.visible {
            continue;
        }
        let object_matrix = object.transform.matrix();

        match &object.kind {
            ObjectKind::Model(model) => {
                for mesh in &model.meshes {
                    if !camera_layers.test(&mesh.layers) {
                        continue;
                    }
                    items.push(DrawItem {
                        entity,
                        mesh,
                        model: object_matrix * mesh.part.local_matrix,
                        grid_instances: None,
                    });
                }
            }
            ObjectKind::Grid(grid) => {
                if grid.count() == 0 || !camera_layers.test(&grid.mesh.layers) {
                    continue;
                }
                items.push(DrawItem {
                    entity,
                    mesh: &grid.mesh,
                    model: object_matrix,
                    grid_instances: Some(grid.count() as u32),
                });
            }
        }
    }

    // Stable, so insertion order breaks ties
    items.sort_by_key(|item| (item.mesh.material.transparent, item.mesh.render_order));
    items
}

/// Buffers for one mesh part, kept alive with the part they were built from.
struct MeshBuffers {
    _part: Arc<MeshPart>,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

struct GridBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
}

struct TextureBinding {
    _texture: GpuTexture,
    bind_group: wgpu::BindGroup,
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    settings: RenderSettings,
    /// Fixed at creation from the initial settings.
    sample_count: u32,

    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,

    texture_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    textures: HashMap<String, TextureBinding>,

    // Keyed by the address of the shared mesh part
    mesh_buffers: HashMap<usize, MeshBuffers>,
    identity_instance_buffer: wgpu::Buffer,
    grid_buffers: HashMap<EntityId, GridBuffer>,

    depth: GpuTexture,
    msaa: Option<GpuTexture>,
    pixel_pass: PixelPass,
}

impl Renderer {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        settings: RenderSettings,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let sample_count = settings.sample_count();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_scene.wgsl").into()),
        });

        // Group 0: globals
        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Globals Buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("globals_bind_group_layout"),
        });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &globals_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
            label: Some("globals_bind_group"),
        });

        // Group 1: per-draw uniforms, one slot per draw call
        let draw_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_DRAWS_PER_FRAME) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let draw_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                },
                count: None,
            }],
            label: Some("draw_bind_group_layout"),
        });

        let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &draw_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &draw_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
            label: Some("draw_bind_group"),
        });

        // Group 2: material map
        let texture_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material_texture_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[
                &globals_bind_group_layout,
                &draw_bind_group_layout,
                &texture_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let identity_instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Identity Instance Buffer"),
            contents: bytemuck::cast_slice(&[InstanceRaw::from_matrix(&Mat4::IDENTITY)]),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let depth = GpuTexture::depth(&device, width, height, sample_count);
        let msaa = (sample_count > 1)
            .then(|| GpuTexture::multisampled(&device, format, width, height, sample_count));
        let pixel_pass = PixelPass::new(
            &device,
            format,
            settings.virtual_width,
            settings.virtual_height,
            width,
            height,
        );

        log::info!(
            "Renderer ready: {}x{}, {:?}, {} sample(s), reduced resolution {}",
            width,
            height,
            format,
            sample_count,
            settings.reduced_resolution
        );

        Self {
            device,
            queue,
            format,
            width,
            height,
            settings,
            sample_count,
            shader,
            pipeline_layout,
            pipelines: HashMap::new(),
            globals_buffer,
            globals_bind_group,
            draw_buffer,
            draw_bind_group,
            texture_bind_group_layout,
            sampler,
            textures: HashMap::new(),
            mesh_buffers: HashMap::new(),
            identity_instance_buffer,
            grid_buffers: HashMap::new(),
            depth,
            msaa,
            pixel_pass,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.depth = GpuTexture::depth(&self.device, width, height, self.sample_count);
        if self.sample_count > 1 {
            self.msaa = Some(GpuTexture::multisampled(
                &self.device,
                self.format,
                width,
                height,
                self.sample_count,
            ));
        }
        self.pixel_pass.resize(width, height);
    }

    /// Toggle the pixelated look. Antialiasing stays as chosen at creation.
    pub fn set_reduced_resolution(&mut self, reduced: bool) {
        if self.settings.reduced_resolution != reduced {
            log::info!("Reduced resolution: {}", reduced);
        }
        self.settings.reduced_resolution = reduced;
    }

    /// Draw the demo scene into `view`.
    ///
    /// Takes the demo mutably to consume each grid's dirty flag when its
    /// instance matrices are uploaded.
    pub fn render(&mut self, view: &wgpu::TextureView, demo: &mut DemoState) {
        self.upload_grids(&mut demo.scene);

        let globals = Globals {
            camera: demo.camera.to_uniforms(),
            lighting: demo.lights.to_uniforms(),
        };
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::cast_slice(&[globals]));

        let reduced = self.settings.reduced_resolution;
        let pass_samples = if reduced { 1 } else { self.sample_count };

        let mut items = build_draw_list(&demo.scene, demo.camera.layers);
        if items.len() > MAX_DRAWS_PER_FRAME {
            log::warn!(
                "Too many draws ({} > {}), some will not be rendered",
                items.len(),
                MAX_DRAWS_PER_FRAME
            );
            items.truncate(MAX_DRAWS_PER_FRAME);
        }

        // Write every draw's uniforms BEFORE the render pass; write_buffer is
        // not recorded in the command stream.
        let mut keys = Vec::with_capacity(items.len());
        for (slot, item) in items.iter().enumerate() {
            let material = &item.mesh.material;
            let key = PipelineKey::for_material(material, pass_samples);
            self.ensure_pipeline(&key);
            self.ensure_mesh_buffers(&item.mesh.part);
            self.ensure_texture(material);
            keys.push(key);

            self.queue.write_buffer(
                &self.draw_buffer,
                (slot * UNIFORM_ALIGNMENT) as u64,
                bytemuck::cast_slice(&[DrawUniforms::new(item.model, material)]),
            );
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let (color_view, resolve_target, depth_view) = if reduced {
                (self.pixel_pass.target_view(), None, self.pixel_pass.depth_view())
            } else if let Some(msaa) = &self.msaa {
                (&msaa.view, Some(view), &self.depth.view)
            } else {
                (view, None, &self.depth.view)
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.globals_bind_group, &[]);

            for (slot, (item, key)) in items.iter().zip(keys.iter()).enumerate() {
                let Some(pipeline) = self.pipelines.get(key) else {
                    continue;
                };
                let Some(buffers) = self.mesh_buffers.get(&part_key(&item.mesh.part)) else {
                    continue;
                };
                let Some(texture) = self.textures.get(texture_key(&item.mesh.material)) else {
                    continue;
                };
                let (instance_buffer, instances) = match item.grid_instances {
                    Some(count) => match self.grid_buffers.get(&item.entity) {
                        Some(grid) => (&grid.buffer, count),
                        None => continue,
                    },
                    None => (&self.identity_instance_buffer, 1),
                };

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(1, &self.draw_bind_group, &[(slot * UNIFORM_ALIGNMENT) as u32]);
                render_pass.set_bind_group(2, &texture.bind_group, &[]);
                render_pass.set_vertex_buffer(0, buffers.vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, instance_buffer.slice(..));
                render_pass.set_index_buffer(buffers.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..buffers.num_indices, 0, 0..instances);
            }
        }

        if reduced {
            self.pixel_pass.blit(&mut encoder, view);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Create or refresh the instance buffer of every grid in the scene.
    fn upload_grids(&mut self, scene: &mut SceneGraph) {
        let ids: Vec<EntityId> = scene.objects().map(|(id, _)| id).collect();
        let mut live = HashSet::new();

        for id in ids {
            let Some(grid) = scene.get_mut(id).and_then(|object| object.as_grid_mut()) else {
                continue;
            };
            live.insert(id);

            let dirty = grid.take_needs_update();
            let count = grid.count();
            if count == 0 {
                continue;
            }

            let instances: Vec<InstanceRaw> = grid.matrices().iter().map(InstanceRaw::from_matrix).collect();
            let fits = self.grid_buffers.get(&id).is_some_and(|b| b.capacity >= count);

            if !fits {
                let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Grid Instance Buffer"),
                    contents: bytemuck::cast_slice(&instances),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                });
                self.grid_buffers.insert(id, GridBuffer { buffer, capacity: count });
            } else if dirty {
                if let Some(grid_buffer) = self.grid_buffers.get(&id) {
                    self.queue
                        .write_buffer(&grid_buffer.buffer, 0, bytemuck::cast_slice(&instances));
                }
            }
        }

        self.grid_buffers.retain(|id, _| live.contains(id));
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        let pipeline =
            pipeline::create_scene_pipeline(&self.device, &self.pipeline_layout, &self.shader, self.format, key);
        self.pipelines.insert(*key, pipeline);
    }

    fn ensure_mesh_buffers(&mut self, part: &Arc<MeshPart>) {
        let key = part_key(part);
        if self.mesh_buffers.contains_key(&key) {
            return;
        }

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Mesh Vertex Buffer: {}", part.name)),
            contents: bytemuck::cast_slice(&part.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Mesh Index Buffer: {}", part.name)),
            contents: bytemuck::cast_slice(&part.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        self.mesh_buffers.insert(
            key,
            MeshBuffers {
                _part: Arc::clone(part),
                vertex_buffer,
                index_buffer,
                num_indices: part.indices.len() as u32,
            },
        );
    }

    fn ensure_texture(&mut self, material: &Material) {
        let key = texture_key(material);
        if self.textures.contains_key(key) {
            return;
        }

        let texture = match &material.map {
            Some(data) => GpuTexture::from_texture_data(&self.device, &self.queue, data),
            None => GpuTexture::white(&self.device, &self.queue),
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Texture Bind Group"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        self.textures.insert(
            key.to_string(),
            TextureBinding {
                _texture: texture,
                bind_group,
            },
        );
    }
}

fn part_key(part: &Arc<MeshPart>) -> usize {
    Arc::as_ptr(part) as usize
}

fn texture_key(material: &Material) -> &str {
    material
        .map
        .as_ref()
        .map(|data| data.key.as_str())
        .unwrap_or(WHITE_TEXTURE_KEY)
}
