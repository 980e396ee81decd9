use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::HtmlCanvasElement;

use crate::config::DemoConfig;
use crate::demo::DemoState;
use crate::gpu::renderer::{RenderSettings, Renderer};
use crate::input::Key;
use crate::loader::{MemoryAssets, ModelLoader};

#[wasm_bindgen]
pub struct WasmDemo {
    inner: Rc<RefCell<DemoContext>>,
}

struct DemoContext {
    renderer: Renderer,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    state: DemoState,
    /// Filled by the host with fetched model bytes before `setup`.
    loader: ModelLoader<MemoryAssets>,
}

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

#[wasm_bindgen]
impl WasmDemo {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WasmDemo, JsValue> {
        Err(JsValue::from_str("Use create_demo async constructor"))
    }

    /// Register model bytes under the path the scene config refers to.
    pub fn add_asset(&self, path: &str, bytes: &[u8]) {
        log::info!("Asset received: {} ({} bytes)", path, bytes.len());
        let mut inner = self.inner.borrow_mut();
        inner.loader.source_mut().insert(path, bytes.to_vec());
    }

    /// Build the scene from the assets added so far.
    pub fn setup(&self) {
        let mut inner = self.inner.borrow_mut();
        let ctx = &mut *inner;
        ctx.state.setup(&mut ctx.loader);
    }

    pub fn render(&self, dt: f32) {
        let mut inner = self.inner.borrow_mut();
        let ctx = &mut *inner;

        ctx.state.update(dt);

        match ctx.surface.get_current_texture() {
            Ok(output) => {
                let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                ctx.renderer.render(&view, &mut ctx.state);
                output.present();
            }
            Err(wgpu::SurfaceError::Lost) => {
                ctx.renderer.resize(ctx.config.width, ctx.config.height);
                ctx.surface.configure(ctx.renderer.device(), &ctx.config);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Surface out of memory");
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
            }
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        let mut inner = self.inner.borrow_mut();
        let ctx = &mut *inner;

        ctx.renderer.resize(width, height);
        ctx.state.resize(width, height);
        ctx.config.width = width;
        ctx.config.height = height;

        ctx.surface.configure(ctx.renderer.device(), &ctx.config);
    }

    /// `key` is a DOM `KeyboardEvent.key` value.
    pub fn key_down(&self, key: &str) {
        if let Some(key) = Key::from_dom(key) {
            self.inner.borrow_mut().state.input.key_down(key);
        }
    }

    pub fn key_up(&self, key: &str) {
        if let Some(key) = Key::from_dom(key) {
            self.inner.borrow_mut().state.input.key_up(key);
        }
    }

    pub fn pointer_down(&self, x: f32, y: f32) {
        self.inner.borrow_mut().state.input.pointer_down(x, y);
    }

    pub fn pointer_move(&self, x: f32, y: f32) {
        self.inner.borrow_mut().state.input.pointer_move(x, y);
    }

    pub fn pointer_up(&self) {
        self.inner.borrow_mut().state.input.pointer_up();
    }

    /// `delta_y` is a DOM `WheelEvent.deltaY`; negative scrolls away from the user.
    pub fn wheel(&self, delta_y: f32) {
        if delta_y != 0.0 {
            self.inner.borrow_mut().state.input.wheel(-delta_y.signum());
        }
    }

    pub fn set_reduced_resolution(&self, reduced: bool) {
        self.inner.borrow_mut().renderer.set_reduced_resolution(reduced);
    }
}

/// Create the demo on `canvas`. `config_json` may be empty for the defaults.
#[wasm_bindgen]
pub async fn create_demo(canvas: HtmlCanvasElement, config_json: Option<String>) -> Result<WasmDemo, JsValue> {
    init_panic_hook();

    let demo_config = match config_json.as_deref().map(str::trim) {
        Some(json) if !json.is_empty() => {
            let config = DemoConfig::from_json(json)
                .map_err(|e| JsValue::from_str(&format!("Failed to parse config: {}", e)))?;
            config.validate().map_err(|e| JsValue::from_str(&format!("Invalid config: {:#}", e)))?;
            config
        }
        _ => DemoConfig::default(),
    };

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        dx12_shader_compiler: Default::default(),
        flags: wgpu::InstanceFlags::default(),
        gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
    });

    let width = canvas.width().max(1);
    let height = canvas.height().max(1);

    let target = wgpu::SurfaceTarget::Canvas(canvas);
    let surface = instance
        .create_surface(target)
        .map_err(|e| JsValue::from_str(&format!("Failed to create surface: {}", e)))?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::None,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| JsValue::from_str("Failed to find an appropriate adapter"))?;

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults(),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .map_err(|e| JsValue::from_str(&format!("Failed to create device: {}", e)))?;

    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .copied()
        .find(|f: &wgpu::TextureFormat| f.is_srgb())
        .or_else(|| surface_caps.formats.first().copied())
        .ok_or_else(|| JsValue::from_str("Surface reports no supported formats"))?;

    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width,
        height,
        present_mode: surface_caps
            .present_modes
            .first()
            .copied()
            .unwrap_or(wgpu::PresentMode::Fifo),
        alpha_mode: surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let settings = RenderSettings::from(&demo_config.render);
    let renderer = Renderer::new(device, queue, config.format, config.width, config.height, settings);

    let mut state = DemoState::new(demo_config);
    state.resize(width, height);

    Ok(WasmDemo {
        inner: Rc::new(RefCell::new(DemoContext {
            renderer,
            surface,
            config,
            state,
            loader: ModelLoader::new(MemoryAssets::new()),
        })),
    })
}
