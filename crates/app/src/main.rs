//! quad - draws a spinning colored quad with Vulkan.
//!
//! Reads `quad.toml` from the working directory when present. Exits with
//! status 1 and prints the error on any fatal failure.

use anyhow::Result;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use quad_core::{AppConfig, DEFAULT_CONFIG_FILE, Timer};
use quad_platform::Window;
use quad_renderer::{FrameOutcome, Renderer};

struct App {
    config: AppConfig,
    // Dropped before the window it renders into.
    renderer: Option<Renderer>,
    window: Option<Window>,
    frame_timer: Timer,
    frames: u32,
    frame_time: f32,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            frame_timer: Timer::new(),
            frames: 0,
            frame_time: 0.0,
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let renderer = Renderer::new(&window, &self.config.graphics)?;
        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Records a fatal error and leaves the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.teardown();
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn teardown(&mut self) {
        if let Some(mut renderer) = self.renderer.take()
            && let Err(e) = renderer.shutdown()
        {
            error!("Renderer shutdown failed: {:?}", e);
        }
        self.window = None;
    }

    /// Logs the average frame rate roughly once per second.
    fn count_frame(&mut self) {
        self.frames += 1;
        self.frame_time += self.frame_timer.delta_secs();
        if self.frame_time >= 1.0 {
            let frames = self.frames as f32;
            debug!(
                "{:.1} fps ({:.2} ms/frame)",
                frames / self.frame_time,
                1000.0 * self.frame_time / frames
            );
            self.frames = 0;
            self.frame_time = 0.0;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e.context("Initialization failed"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.teardown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.render_frame() {
                    Ok(FrameOutcome::Presented) => self.count_frame(),
                    Ok(FrameOutcome::Rebuilt | FrameOutcome::Paused) => {}
                    Err(e) => self.fail(event_loop, anyhow::Error::new(e).context("Render failed")),
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    quad_core::init_logging();
    info!("Starting quad");

    let config = AppConfig::load_or_default(DEFAULT_CONFIG_FILE)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => {
            info!("Exited cleanly");
            Ok(())
        }
    }
}
