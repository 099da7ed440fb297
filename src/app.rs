//! Native windowed host: a winit window, the wgpu renderer and one session.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorIcon, Fullscreen, Window, WindowId};

use crate::clock::MonotonicTime;
use crate::config::ViewerConfig;
use crate::error::{RenderError, SessionError, SessionResult};
use crate::fullscreen::FullscreenMode;
use crate::loader::FileLoader;
use crate::render::{SceneRenderer, WgpuRenderer};
use crate::session::Session;
use crate::surface::{CursorState, DisplaySurface, SurfaceRect};

/// [`DisplaySurface`] over a winit window. The style string records window
/// decorations, e.g. `decorations=true`.
pub struct WindowSurface {
    window: Arc<Window>,
    size: (u32, u32),
}

impl WindowSurface {
    pub fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();
        Self {
            window,
            size: (size.width, size.height),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl DisplaySurface for WindowSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        if self.window.fullscreen().is_none() {
            let _ = self
                .window
                .request_inner_size(PhysicalSize::new(width, height));
        }
    }

    fn bounds(&self) -> SurfaceRect {
        let size = self.window.inner_size();
        SurfaceRect::from_size(size.width, size.height)
    }

    fn style(&self) -> String {
        format!("decorations={}", self.window.is_decorated())
    }

    fn set_style(&mut self, style: &str) {
        for entry in style.split(';').map(str::trim) {
            match entry.split_once('=') {
                Some(("decorations", value)) => {
                    self.window.set_decorations(value.trim() == "true")
                }
                _ if entry.is_empty() => {}
                _ => log::debug!("ignoring window style entry {entry:?}"),
            }
        }
    }

    fn set_cursor(&mut self, cursor: CursorState) {
        let icon = match cursor {
            CursorState::Default => CursorIcon::Default,
            CursorState::Pointer => CursorIcon::Pointer,
        };
        self.window.set_cursor(icon);
    }

    fn screen_size(&self) -> (u32, u32) {
        self.window
            .current_monitor()
            .map(|monitor| {
                let size = monitor.size();
                (size.width, size.height)
            })
            .unwrap_or(self.size)
    }

    fn supports_fullscreen(&self) -> bool {
        self.window.current_monitor().is_some()
    }

    fn is_fullscreen(&self) -> bool {
        self.window.fullscreen().is_some()
    }

    fn request_fullscreen(&mut self) -> SessionResult<()> {
        if !self.supports_fullscreen() {
            return Err(SessionError::FullscreenUnavailable);
        }
        self.window
            .set_fullscreen(Some(Fullscreen::Borderless(None)));
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> SessionResult<()> {
        self.window.set_fullscreen(None);
        Ok(())
    }
}

type WindowSession = Session<WindowSurface, WgpuRenderer>;

/// Raised when no window or event loop can be created, so callers can fall
/// back to a headless run.
#[derive(Debug)]
pub struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

/// Opens a window and runs the viewer until it is closed.
pub fn run_windowed(config: ViewerConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = ViewerApp::new(config);
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct ViewerApp {
    config: ViewerConfig,
    loader: FileLoader,
    session: Option<WindowSession>,
    drag_from: Option<PhysicalPosition<f64>>,
    dragging: bool,
    error: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            loader: FileLoader::new("."),
            session: None,
            drag_from: None,
            dragging: false,
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title("Viewport Session")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let renderer = pollster::block_on(WgpuRenderer::new(Arc::clone(&window)))
            .map_err(|err| WindowInitError::from_error("renderer", format!("{err:#}")))?;
        let mut session = Session::initialize(
            WindowSurface::new(Arc::clone(&window)),
            renderer,
            &self.config,
            Box::new(MonotonicTime::new()),
        )?;

        match self.config.model.clone() {
            Some(url) => {
                if let Err(err) = pollster::block_on(session.request_asset(&self.loader, &url)) {
                    log::error!("viewer stays empty: {err}");
                }
            }
            None => session.mark_ready()?,
        }
        if !session.fullscreen_available() {
            log::info!("fullscreen is not available on this display");
        }

        window.request_redraw();
        self.session = Some(session);
        Ok(())
    }

    fn handle_key(&mut self, key: KeyCode) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match key {
            KeyCode::KeyF if session.fullscreen_available() => session.toggle_fullscreen()?,
            KeyCode::Escape if session.fullscreen_mode() == FullscreenMode::Fullscreen => {
                session.toggle_fullscreen()?
            }
            _ => {}
        }
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.run_frame() {
            Ok(_) => {}
            Err(SessionError::Render(RenderError::SurfaceLost)) => {
                let (width, height) = session.size();
                session.renderer_mut().resize(width, height);
            }
            Err(SessionError::Render(RenderError::OutOfMemory)) => {
                self.error = Some(anyhow!("GPU is out of memory"));
                session.teardown();
                event_loop.exit();
            }
            Err(err) => log::warn!("frame skipped: {err}"),
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(session) = self.session.as_mut() {
                    session.teardown();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let fullscreen = session.surface().window().fullscreen().is_some();
                if let Err(err) = session.on_fullscreen_change(fullscreen) {
                    log::warn!("fullscreen change failed: {err}");
                }
                match session.resize(size.width, size.height) {
                    Ok(()) => {}
                    Err(SessionError::InvalidDimension { .. }) => {
                        log::debug!("window minimized; keeping previous size")
                    }
                    Err(err) => log::warn!("resize failed: {err}"),
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        if let Err(err) = self.handle_key(key) {
                            log::warn!("key {key:?} ignored: {err}");
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                session.pointer_hover(Vec2::new(position.x as f32, position.y as f32));
                if self.dragging {
                    if let Some(from) = self.drag_from {
                        let height = session.size().1;
                        session.controls_mut().rotate_by_pixels(
                            (position.x - from.x) as f32,
                            (position.y - from.y) as f32,
                            height,
                        );
                    }
                }
                self.drag_from = Some(position);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => (position.y / 40.0) as f32,
                };
                if let Some(session) = self.session.as_mut() {
                    session.controls_mut().zoom_by_wheel(lines);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(session) = &self.session {
            if session.is_running() {
                session.surface().window().request_redraw();
            }
        }
    }
}
