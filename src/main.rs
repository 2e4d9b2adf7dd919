use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use postfx::{
    ControlHandle, GpuContext, OverrideConfig, OverrideController, OverrideRegistry,
    ShaderLibrary, Stage, WgpuBackend,
};

const OVERRIDE_NAME: &str = "postfx";
const BLEND_STEP: f32 = 0.1;

struct Demo {
    window: Option<Arc<Window>>,
    backend: Option<WgpuBackend>,
    postfx: Option<OverrideController<WgpuBackend>>,
    registry: OverrideRegistry,
    library: ShaderLibrary,
    start_time: Instant,
    animate: bool,
    error: Option<anyhow::Error>,
}

impl Demo {
    fn new(library: ShaderLibrary) -> Self {
        Self {
            window: None,
            backend: None,
            postfx: None,
            registry: OverrideRegistry::new(),
            library,
            start_time: Instant::now(),
            animate: true,
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop
                .create_window(Window::default_attributes().with_title("postfx"))
                .context("failed to create window")?,
        );

        let gpu = GpuContext::new(window.clone())?;
        let backend = WgpuBackend::new(gpu, self.library.clone())?;

        let mut postfx = OverrideController::new(OverrideConfig::new().name(OVERRIDE_NAME))
            .with_redraw(window.clone());
        postfx.register(&mut self.registry)?;

        tracing::info!(
            "keys: F fisheye, S swirl, E edge detect, B blend, Up/Down blend factor, \
             R reload shaders, Space pause, Esc quit"
        );

        window.request_redraw();
        self.backend = Some(backend);
        self.postfx = Some(postfx);
        self.window = Some(window);
        Ok(())
    }

    /// Handles a key the way an external command would: look the override up
    /// by name, then call into its control surface.
    fn command(&mut self, key: KeyCode) -> postfx::Result<()> {
        let toggle = |handle: &ControlHandle, stage: Stage| -> postfx::Result<()> {
            let enabled = !handle.enabled(stage.name())?;
            tracing::info!(%stage, enabled, "toggled stage");
            handle.set_enabled(stage.name(), enabled)
        };
        let nudge = |handle: &ControlHandle, delta: f32| -> postfx::Result<()> {
            let blend = handle.parameter("blend")? + delta;
            handle.set_parameter("blend", blend)?;
            tracing::info!(blend = handle.parameter("blend")?, "blend factor");
            Ok(())
        };

        match key {
            KeyCode::KeyF => toggle(&self.registry.find(OVERRIDE_NAME)?, Stage::Fisheye),
            KeyCode::KeyS => toggle(&self.registry.find(OVERRIDE_NAME)?, Stage::Swirl),
            KeyCode::KeyE => toggle(&self.registry.find(OVERRIDE_NAME)?, Stage::EdgeDetect),
            KeyCode::KeyB => toggle(&self.registry.find(OVERRIDE_NAME)?, Stage::Blend),
            KeyCode::ArrowUp => nudge(&self.registry.find(OVERRIDE_NAME)?, BLEND_STEP),
            KeyCode::ArrowDown => nudge(&self.registry.find(OVERRIDE_NAME)?, -BLEND_STEP),
            KeyCode::KeyR => {
                tracing::info!("reloading shaders");
                self.registry.find(OVERRIDE_NAME)?.reload_shaders()
            }
            KeyCode::Space => {
                self.animate = !self.animate;
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        if let (Some(postfx), Some(backend)) = (self.postfx.as_mut(), self.backend.as_mut()) {
            postfx.unregister(&mut self.registry, backend);
        }
    }

    fn redraw(&mut self) {
        let (Some(backend), Some(postfx)) = (self.backend.as_mut(), self.postfx.as_mut()) else {
            return;
        };
        let time = self.start_time.elapsed().as_secs_f32();

        if let Err(err) = backend.begin_frame(time) {
            tracing::warn!(error = %err, "skipping frame");
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            return;
        }
        let viewport = backend.gpu().viewport();
        if let Err(err) = postfx.render(backend, viewport) {
            tracing::debug!(error = %err, "override frame failed");
        }
        backend.end_frame();

        if self.animate {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }
}

impl ApplicationHandler for Demo {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(backend) = &mut self.backend {
                    backend.gpu_mut().resize(size.width, size.height);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if key == KeyCode::Escape {
                    self.shutdown();
                    event_loop.exit();
                } else if let Err(err) = self.command(key) {
                    tracing::warn!(error = %err, "command failed");
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => (),
        }
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("postfx=info,postfx_demo=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    initialise_tracing();

    let mut library = ShaderLibrary::new();
    if let Some(dir) = std::env::var_os("POSTFX_SHADER_DIR") {
        tracing::info!(dir = %dir.to_string_lossy(), "loading shader overrides");
        library = library.with_search_dir(dir);
    }

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut demo = Demo::new(library);
    event_loop.run_app(&mut demo)?;

    match demo.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
