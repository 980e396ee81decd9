use crate::gpu::mesh::{InstanceRaw, Vertex};
use crate::gpu::texture::DEPTH_FORMAT;
use crate::material::{Material, Side};

/// How a material's colour combines with what is already drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Opaque,
    Alpha,
    Premultiplied,
}

impl BlendMode {
    pub fn for_material(material: &Material) -> Self {
        match (material.transparent, material.premultiplied_alpha) {
            (false, _) => BlendMode::Opaque,
            (true, false) => BlendMode::Alpha,
            (true, true) => BlendMode::Premultiplied,
        }
    }

    fn state(self) -> wgpu::BlendState {
        match self {
            BlendMode::Opaque => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Premultiplied => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        }
    }
}

/// Everything that forces a separate scene pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub side: Side,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
    pub sample_count: u32,
}

impl PipelineKey {
    pub fn for_material(material: &Material, sample_count: u32) -> Self {
        Self {
            side: material.side,
            depth_test: material.depth_test,
            depth_write: material.depth_write,
            blend: BlendMode::for_material(material),
            sample_count,
        }
    }

    /// Front-sided materials cull back faces and vice versa.
    pub fn cull_mode(&self) -> Option<wgpu::Face> {
        match self.side {
            Side::Front => Some(wgpu::Face::Back),
            Side::Back => Some(wgpu::Face::Front),
            Side::Double => None,
        }
    }

    pub fn depth_compare(&self) -> wgpu::CompareFunction {
        if self.depth_test {
            wgpu::CompareFunction::LessEqual
        } else {
            wgpu::CompareFunction::Always
        }
    }
}

pub fn create_scene_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    log::debug!("Creating scene pipeline for {:?}", key);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Scene Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[
                // Slot 0: mesh vertices
                Vertex::desc(),
                // Slot 1: instance matrices
                InstanceRaw::desc(),
            ],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(key.blend.state()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: key.cull_mode(),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: key.depth_write,
            depth_compare: key.depth_compare(),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: key.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}
