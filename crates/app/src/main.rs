//! Spinning quad demo entry point.
//!
//! Opens a window and renders a rotating textured quad until the window is
//! closed. Initialization and render failures terminate the process with a
//! stage-specific exit code.

use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use spinquad_core::Error;
use spinquad_platform::Window;
use spinquad_render::Renderer;

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;
const WINDOW_TITLE: &str = "Spinning Quad";

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    exit_code: Option<u8>,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            exit_code: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: &Error) {
        error!("{e}");
        self.exit_code = Some(e.exit_code());
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, &e),
        };

        match Renderer::new(&window) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, &e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let result = match (&mut self.renderer, &self.window) {
                    (Some(renderer), Some(window)) => renderer.render_frame(window),
                    _ => Ok(()),
                };
                if let Err(e) = result {
                    self.fail(event_loop, &e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn run() -> anyhow::Result<Option<u8>> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app).context("event loop failed")?;

    // Dropping the renderer waits for the device and releases everything.
    drop(app.renderer.take());
    Ok(app.exit_code)
}

fn main() -> ExitCode {
    spinquad_core::init_logging();
    info!("Starting {WINDOW_TITLE}");

    match run() {
        Ok(None) => ExitCode::SUCCESS,
        Ok(Some(code)) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(Error::Window(e.to_string()).exit_code())
        }
    }
}
