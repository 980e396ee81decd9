use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use glam::Vec2;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowBuilder};

use crate::config::DemoConfig;
use crate::demo::DemoState;
use crate::gpu::renderer::{RenderSettings, Renderer};
use crate::input::Key;
use crate::loader::{FsAssets, ModelLoader};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by both subcommands.
#[derive(Args, Debug, Clone)]
struct SceneArgs {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Asset root directory (overrides the config file)
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Render at full resolution with antialiasing instead of the pixelated look
    #[arg(long)]
    full_resolution: bool,

    /// Output width
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Output height
    #[arg(long, default_value_t = 600)]
    height: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a window and run the demo
    Run {
        #[command(flatten)]
        scene: SceneArgs,
    },
    /// Render frames to disk
    Render {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Number of frames to render
        #[arg(long, default_value_t = 120)]
        frames: u32,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { scene } => {
            let config = load_config(&scene)?;
            run_window(config, scene.width, scene.height)?;
        }
        Commands::Render { scene, out, frames, fps } => {
            let config = load_config(&scene)?;
            pollster::block_on(render_offline(config, out, frames, fps, scene.width, scene.height))?;
        }
    }
    Ok(())
}

fn load_config(args: &SceneArgs) -> Result<DemoConfig> {
    let mut config = match &args.config {
        Some(path) => DemoConfig::load(path)?,
        None => DemoConfig::default(),
    };
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut DemoConfig, args: &SceneArgs) {
    if let Some(assets) = &args.assets {
        config.assets_dir = assets.clone();
    }
    if args.full_resolution {
        config.render.reduced_resolution = false;
    }
}

/// Build the demo scene from the configured asset directory.
fn build_demo(config: DemoConfig, width: u32, height: u32) -> DemoState {
    let mut loader = ModelLoader::new(FsAssets::new(config.assets_dir.clone()));
    let mut demo = DemoState::new(config);
    demo.setup(&mut loader);
    demo.resize(width, height);
    demo
}

struct WindowApp {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    renderer: Renderer,
    demo: DemoState,
    cursor: Vec2,
    last_frame: Instant,
}

impl WindowApp {
    async fn new(window: Arc<Window>, config: DemoConfig) -> Result<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("Surface reports no supported formats"))?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let settings = RenderSettings::from(&config.render);
        let renderer = Renderer::new(device, queue, surface_format, width, height, settings);
        let demo = build_demo(config, width, height);

        Ok(Self {
            window,
            surface,
            surface_config,
            renderer,
            demo,
            cursor: Vec2::ZERO,
            last_frame: Instant::now(),
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(self.renderer.device(), &self.surface_config);
        self.renderer.resize(width, height);
        self.demo.resize(width, height);
    }

    fn handle_window_event(&mut self, event: WindowEvent, elwt: &EventLoopWindowTarget<()>) {
        match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(key) = Key::from_keycode(code) {
                        match event.state {
                            ElementState::Pressed => self.demo.input.key_down(key),
                            ElementState::Released => self.demo.input.key_up(key),
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                self.demo.input.pointer_move(self.cursor.x, self.cursor.y);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => self.demo.input.pointer_down(self.cursor.x, self.cursor.y),
                ElementState::Released => self.demo.input.pointer_up(),
            },
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 100.0) as f32,
                };
                self.demo.input.wheel(steps);
            }
            WindowEvent::Focused(false) => self.demo.input.clear(),
            WindowEvent::RedrawRequested => self.redraw(elwt),
            _ => {}
        }
    }

    fn redraw(&mut self, elwt: &EventLoopWindowTarget<()>) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.demo.update(dt);

        match self.surface.get_current_texture() {
            Ok(output) => {
                let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                self.renderer.render(&view, &mut self.demo);
                output.present();
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.renderer.device(), &self.surface_config);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Surface out of memory");
                elwt.exit();
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
            }
        }
    }
}

fn run_window(config: DemoConfig, width: u32, height: u32) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("duneview")
            .with_inner_size(PhysicalSize::new(width, height))
            .build(&event_loop)?,
    );

    let mut app = pollster::block_on(WindowApp::new(Arc::clone(&window), config))?;

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, window_id } if window_id == app.window.id() => {
            app.handle_window_event(event, elwt);
        }
        Event::AboutToWait => app.window.request_redraw(),
        _ => {}
    })?;

    Ok(())
}

async fn render_offline(
    config: DemoConfig,
    out_dir: PathBuf,
    frames: u32,
    fps: f32,
    width: u32,
    height: u32,
) -> Result<()> {
    if !(fps > 0.0) {
        anyhow::bail!("fps must be positive (got {})", fps);
    }
    if width == 0 || height == 0 {
        anyhow::bail!("output size must be non-zero (got {}x{})", width, height);
    }
    let dt = 1.0 / fps;

    std::fs::create_dir_all(&out_dir)?;

    // WGPU Init
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // Headless
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;

    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Target Texture"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };

    let texture = device.create_texture(&texture_desc);
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Buffer for reading back data
    let unpadded_bytes_per_row = 4 * width;
    let padded_bytes_per_row = padded_row_bytes(width);

    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Output Buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let settings = RenderSettings::from(&config.render);
    let mut renderer = Renderer::new(device, queue, texture_desc.format, width, height, settings);
    let mut demo = build_demo(config, width, height);

    println!("Rendering {} frames to {:?}...", frames, out_dir);

    for i in 0..frames {
        demo.update(dt);

        // Render to texture
        renderer.render(&texture_view, &mut demo);

        // Copy texture to buffer
        let mut encoder = renderer
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            texture_desc.size,
        );

        renderer.queue().submit(Some(encoder.finish()));

        // Map buffer and save
        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        renderer.device().poll(wgpu::Maintain::Wait);
        rx.recv()??;

        let data = buffer_slice.get_mapped_range();

        // Unpad data
        let mut unpadded_data = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            let end = start + unpadded_bytes_per_row as usize;
            unpadded_data.extend_from_slice(&data[start..end]);
        }

        // Save frame
        let frame_path = out_dir.join(frame_file_name(i));
        image::save_buffer(&frame_path, &unpadded_data, width, height, image::ColorType::Rgba8)?;

        drop(data);
        output_buffer.unmap();

        if i % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }
    println!("\nDone.");

    Ok(())
}

/// Row pitch for texture readback; wgpu requires a multiple of 256 bytes.
fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = 4 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded + (align - unpadded % align) % align
}

fn frame_file_name(index: u32) -> String {
    format!("frame_{:05}.png", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render_command() {
        let cli = Cli::try_parse_from([
            "duneview", "render", "--out", "frames", "--frames", "10", "--width", "320", "--height", "240",
        ])
        .unwrap();

        match cli.command {
            Commands::Render { scene, out, frames, fps } => {
                assert_eq!(out, PathBuf::from("frames"));
                assert_eq!(frames, 10);
                assert_eq!(fps, 60.0);
                assert_eq!((scene.width, scene.height), (320, 240));
                assert!(!scene.full_resolution);
                assert!(scene.config.is_none());
            }
            Commands::Run { .. } => panic!("expected render"),
        }
    }

    #[test]
    fn test_render_requires_out() {
        assert!(Cli::try_parse_from(["duneview", "render"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from(["duneview", "run", "--assets", "/data", "--full-resolution"]).unwrap();
        let Commands::Run { scene } = cli.command else {
            panic!("expected run");
        };

        let mut config = DemoConfig::default();
        apply_overrides(&mut config, &scene);
        assert_eq!(config.assets_dir, PathBuf::from("/data"));
        assert!(!config.render.reduced_resolution);
    }

    #[test]
    fn test_overrides_keep_config_values() {
        let cli = Cli::try_parse_from(["duneview", "run"]).unwrap();
        let Commands::Run { scene } = cli.command else {
            panic!("expected run");
        };

        let mut config = DemoConfig::default();
        apply_overrides(&mut config, &scene);
        assert_eq!(config, DemoConfig::default());
    }

    #[test]
    fn test_padded_row_bytes() {
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
        assert_eq!(padded_row_bytes(320), 1280);
    }

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name(0), "frame_00000.png");
        assert_eq!(frame_file_name(1234), "frame_01234.png");
    }
}
