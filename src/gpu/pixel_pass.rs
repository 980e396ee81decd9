//! Low-resolution render target for the pixelated look.
//!
//! The scene is drawn into a small fixed-size target, then stretched over
//! the whole output with nearest filtering so each virtual pixel becomes a
//! crisp block.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gpu::texture::GpuTexture;

/// Vertex for fullscreen quad rendering.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Two triangles covering NDC. Texture V runs top to bottom.
const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0,  1.0], uv: [0.0, 0.0] },
];

pub struct PixelPass {
    target: GpuTexture,
    depth: GpuTexture,
    quad_vertex_buffer: wgpu::Buffer,
    blit_pipeline: wgpu::RenderPipeline,
    blit_bind_group: wgpu::BindGroup,
    virtual_width: u32,
    virtual_height: u32,
    output_width: u32,
    output_height: u32,
}

impl PixelPass {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        virtual_width: u32,
        virtual_height: u32,
        output_width: u32,
        output_height: u32,
    ) -> Self {
        let virtual_width = virtual_width.max(1);
        let virtual_height = virtual_height.max(1);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pixel Target"),
            size: wgpu::Extent3d {
                width: virtual_width,
                height: virtual_height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let target = GpuTexture { texture, view };
        let depth = GpuTexture::depth(device, virtual_width, virtual_height, 1);

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Pixel Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pixel Blit Bind Group Layout"),
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

        let blit_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pixel Blit Bind Group"),
            layout: &texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Pixel Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_pixel_blit.wgsl").into()),
        });

        let blit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pixel Blit Pipeline Layout"),
            bind_group_layouts: &[&texture_bind_group_layout],
            push_constant_ranges: &[],
        });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Pixel Blit Pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            target,
            depth,
            quad_vertex_buffer,
            blit_pipeline,
            blit_bind_group,
            virtual_width,
            virtual_height,
            output_width: output_width.max(1),
            output_height: output_height.max(1),
        }
    }

    /// Render the scene into this view when reduced resolution is on.
    pub fn target_view(&self) -> &wgpu::TextureView {
        &self.target.view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth.view
    }

    pub fn virtual_size(&self) -> (u32, u32) {
        (self.virtual_width, self.virtual_height)
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.output_width, self.output_height)
    }

    /// Record the new output size. The virtual target keeps its resolution;
    /// the blit stretches it over whatever the output is.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.output_width = width;
            self.output_height = height;
        }
    }

    /// Upscale the virtual target onto `output`.
    pub fn blit(&self, encoder: &mut wgpu::CommandEncoder, output: &wgpu::TextureView) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Pixel Blit Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.blit_pipeline);
        render_pass.set_bind_group(0, &self.blit_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_covers_clip_space() {
        assert_eq!(QUAD_VERTICES.len(), 6);
        for v in QUAD_VERTICES {
            // Top of clip space samples the top row of the target
            let expected_u = (v.position[0] + 1.0) / 2.0;
            let expected_v = (1.0 - v.position[1]) / 2.0;
            assert_eq!(v.uv, [expected_u, expected_v]);
        }
    }

    #[test]
    fn test_quad_vertex_size() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 16);
    }
}
