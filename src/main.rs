// =============================================================================
// TRIANGLE RENDERER - window loop embedding the renderer library
// =============================================================================
//
// FLOW:
// 1. Load renderer.toml, start logging
// 2. Create the window once the event loop is running
// 3. Construct the renderer; a failure ends the process with a failure code
// 4. Draw once per redraw request until the window closes
//
// A draw error is fatal: there is no swapchain recreation path.
// =============================================================================

use anyhow::Result;
use std::process::ExitCode;
use triangle_renderer::logging::init_logging;
use triangle_renderer::{Config, InitResult, Renderer};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

fn main() -> Result<ExitCode> {
    let config = Config::load();
    init_logging(&config.debug);
    log::info!(
        "Starting {} ({}x{}, {} frame(s) in flight)",
        config.window.title,
        config.window.width,
        config.window.height,
        config.frame_draws()
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(app.exit_code())
}

/// Field order matters: the renderer must drop before the window whose
/// surface it presents to.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Window>,
    init_result: Option<InitResult>,
    draw_failed: bool,
    frames_drawn: u64,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            init_result: None,
            draw_failed: false,
            frames_drawn: 0,
        }
    }

    fn exit_code(&self) -> ExitCode {
        match self.init_result {
            Some(InitResult::Success) if !self.draw_failed => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    }

    fn is_minimized(&self) -> bool {
        self.window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                size.width == 0 || size.height == 0
            })
            .unwrap_or(true)
    }

    fn draw_frame(&mut self, event_loop: &ActiveEventLoop) {
        if self.is_minimized() {
            return;
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match renderer.draw() {
            Ok(()) => self.frames_drawn += 1,
            Err(e) => {
                log::error!("Draw failed ({:?}): {}", e.kind(), e);
                self.draw_failed = true;
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.init_result.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(attributes) {
            Ok(w) => w,
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                self.init_result = Some(InitResult::Failure);
                event_loop.exit();
                return;
            }
        };

        let outcome = Renderer::construct(&window, &self.config);
        let init_result = InitResult::of(&outcome);
        self.init_result = Some(init_result);
        self.window = Some(window);

        match outcome {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(_) => event_loop.exit(),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => self.draw_frame(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("Drew {} frame(s)", self.frames_drawn);
        // Release GPU objects while the window still exists.
        self.renderer = None;
    }
}
