//! Browser host: one canvas element, the canvas renderer and a session
//! driven by `requestAnimationFrame`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use glam::Vec2;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    console, Document, Event, EventTarget, HtmlCanvasElement, MouseEvent, Performance, Response,
    WheelEvent, Window,
};

use crate::clock::TimeSource;
use crate::config::ViewerConfig;
use crate::error::{AssetLoadError, SessionError, SessionResult};
use crate::loader::{decode_asset, AssetLoader, LoadedAsset};
use crate::post::BloomSettings;
use crate::render::CanvasRenderer;
use crate::session::Session;
use crate::surface::{CursorState, DisplaySurface, SurfaceRect};

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            log::Level::Error => console::error_1(&message),
            log::Level::Warn => console::warn_1(&message),
            _ => console::log_1(&message),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

/// [`DisplaySurface`] over a canvas element. The style string is the
/// element's inline `style` attribute.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    window: Window,
    document: Document,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement, window: Window, document: Document) -> Self {
        Self {
            canvas,
            window,
            document,
        }
    }
}

impl DisplaySurface for CanvasSurface {
    fn size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }

    fn bounds(&self) -> SurfaceRect {
        let rect = self.canvas.get_bounding_client_rect();
        SurfaceRect::new(
            rect.left() as f32,
            rect.top() as f32,
            rect.width() as f32,
            rect.height() as f32,
        )
    }

    fn style(&self) -> String {
        self.canvas.get_attribute("style").unwrap_or_default()
    }

    fn set_style(&mut self, style: &str) {
        if let Err(err) = self.canvas.set_attribute("style", style) {
            log::warn!("failed to set canvas style: {err:?}");
        }
    }

    fn set_cursor(&mut self, cursor: CursorState) {
        let value = match cursor {
            CursorState::Default => "default",
            CursorState::Pointer => "pointer",
        };
        if let Err(err) = self.canvas.style().set_property("cursor", value) {
            log::warn!("failed to set cursor: {err:?}");
        }
    }

    fn screen_size(&self) -> (u32, u32) {
        self.window
            .screen()
            .ok()
            .and_then(|screen| Some((screen.width().ok()?, screen.height().ok()?)))
            .filter(|&(width, height)| width > 0 && height > 0)
            .map(|(width, height)| (width as u32, height as u32))
            .unwrap_or_else(|| self.size())
    }

    fn supports_fullscreen(&self) -> bool {
        self.document.fullscreen_enabled()
    }

    fn is_fullscreen(&self) -> bool {
        self.document.fullscreen_element().is_some()
    }

    fn request_fullscreen(&mut self) -> SessionResult<()> {
        self.canvas
            .request_fullscreen()
            .map_err(|err| SessionError::Surface(format!("requestFullscreen failed: {err:?}")))
    }

    fn exit_fullscreen(&mut self) -> SessionResult<()> {
        if self.is_fullscreen() {
            self.document.exit_fullscreen();
        }
        Ok(())
    }
}

/// Time source backed by `performance.now()`.
pub struct PerformanceTime {
    performance: Performance,
}

impl PerformanceTime {
    pub fn new(window: &Window) -> Result<Self> {
        let performance = window
            .performance()
            .ok_or_else(|| anyhow!("performance timer not available"))?;
        Ok(Self { performance })
    }
}

impl TimeSource for PerformanceTime {
    fn now(&self) -> Duration {
        Duration::from_secs_f64(self.performance.now().max(0.0) / 1000.0)
    }
}

/// Loads assets over HTTP with `fetch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchLoader;

impl AssetLoader for FetchLoader {
    async fn load(&self, url: &str) -> Result<LoadedAsset, AssetLoadError> {
        let bytes = fetch_bytes(url).await?;
        decode_asset(url, &bytes)
    }
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, AssetLoadError> {
    let network = |reason: String| AssetLoadError::Network {
        url: url.to_string(),
        reason,
    };
    let window = web_sys::window().ok_or_else(|| network("window not available".into()))?;
    let response: Response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|err| network(describe(err)))?
        .dyn_into()
        .map_err(|_| network("fetch did not resolve to a Response".into()))?;
    match response.status() {
        404 => return Err(AssetLoadError::NotFound(url.to_string())),
        _ if !response.ok() => return Err(network(format!("HTTP {}", response.status()))),
        _ => {}
    }
    let buffer = JsFuture::from(response.array_buffer().map_err(|err| network(describe(err)))?)
        .await
        .map_err(|err| network(describe(err)))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

fn describe(value: JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

type CanvasSession = Session<CanvasSurface, CanvasRenderer>;

struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Err(err) = self
            .target
            .remove_event_listener_with_callback(self.kind, self.callback.as_ref().unchecked_ref())
        {
            log::debug!("failed to remove {} listener: {err:?}", self.kind);
        }
    }
}

struct Host {
    window: Window,
    session: RefCell<CanvasSession>,
    frame_callback: RefCell<Option<Closure<dyn FnMut()>>>,
    frame_request: Cell<Option<i32>>,
    listeners: RefCell<Vec<Listener>>,
    drag_from: Cell<Option<Vec2>>,
}

impl Host {
    fn listen<F>(
        self: &Rc<Self>,
        target: &EventTarget,
        kind: &'static str,
        mut handler: F,
    ) -> Result<()>
    where
        F: FnMut(&Host, Event) + 'static,
    {
        let weak = Rc::downgrade(self);
        let callback = Closure::wrap(Box::new(move |event: Event| {
            if let Some(host) = weak.upgrade() {
                handler(&host, event);
            }
        }) as Box<dyn FnMut(Event)>);
        target
            .add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())
            .map_err(|err| anyhow!("failed to listen for {kind}: {err:?}"))?;
        self.listeners.borrow_mut().push(Listener {
            target: target.clone(),
            kind,
            callback,
        });
        Ok(())
    }

    /// Requests the next animation frame unless one is already queued or the
    /// session's loop is not running.
    fn schedule_frame(self: &Rc<Self>) -> Result<()> {
        if self.frame_request.get().is_some() || !self.session.borrow().is_running() {
            return Ok(());
        }
        let mut slot = self.frame_callback.borrow_mut();
        let callback = slot.get_or_insert_with(|| {
            let weak = Rc::downgrade(self);
            Closure::wrap(Box::new(move || {
                if let Some(host) = weak.upgrade() {
                    host.tick();
                }
            }) as Box<dyn FnMut()>)
        });
        let id = self
            .window
            .request_animation_frame(callback.as_ref().unchecked_ref())
            .map_err(|err| anyhow!("requestAnimationFrame failed: {err:?}"))?;
        self.frame_request.set(Some(id));
        Ok(())
    }

    fn tick(self: &Rc<Self>) {
        self.frame_request.set(None);
        let running = match self.session.borrow_mut().run_frame() {
            Ok(running) => running,
            Err(err) => {
                log::warn!("frame skipped: {err}");
                true
            }
        };
        if running {
            if let Err(err) = self.schedule_frame() {
                log::error!("{err:#}");
            }
        }
    }

    fn load(self: &Rc<Self>, url: String) {
        let ticket = match self.session.borrow_mut().begin_load(&url) {
            Ok(ticket) => ticket,
            Err(err) => {
                log::warn!("{err}");
                return;
            }
        };
        let weak = Rc::downgrade(self);
        spawn_local(async move {
            let result = FetchLoader.load(&url).await;
            let Some(host) = weak.upgrade() else {
                log::debug!("viewer was dropped while loading {url}");
                return;
            };
            let outcome = host.session.borrow_mut().complete_load(ticket, result);
            match outcome {
                Ok(()) => {
                    if let Err(err) = host.schedule_frame() {
                        log::error!("{err:#}");
                    }
                }
                Err(err) => log::error!("viewer stays empty: {err}"),
            }
        });
    }

    fn pointer_moved(&self, event: &MouseEvent) {
        let pointer = Vec2::new(event.client_x() as f32, event.client_y() as f32);
        let mut session = self.session.borrow_mut();
        session.pointer_hover(pointer);
        if let Some(from) = self.drag_from.get() {
            let delta = pointer - from;
            let height = session.size().1;
            session.controls_mut().rotate_by_pixels(delta.x, delta.y, height);
            self.drag_from.set(Some(pointer));
        }
    }

    fn dispose(&self) {
        if let Some(id) = self.frame_request.take() {
            if let Err(err) = self.window.cancel_animation_frame(id) {
                log::debug!("failed to cancel animation frame {id}: {err:?}");
            }
        }
        self.frame_callback.borrow_mut().take();
        self.listeners.borrow_mut().clear();
        self.session.borrow_mut().teardown();
    }
}

/// Handle returned to JavaScript for a running viewer.
#[wasm_bindgen]
pub struct ViewerHandle {
    host: Rc<Host>,
}

#[wasm_bindgen]
impl ViewerHandle {
    /// Replaces the current model. Ignored while another load is pending.
    pub fn load_model(&self, url: String) {
        self.host.load(url);
    }

    pub fn load_state(&self) -> String {
        format!("{:?}", self.host.session.borrow().load_state())
    }

    pub fn set_bloom_threshold(&self, value: f32) {
        self.with_bloom(|bloom| bloom.set_threshold(value));
    }

    pub fn set_bloom_strength(&self, value: f32) {
        self.with_bloom(|bloom| bloom.set_strength(value));
    }

    pub fn set_bloom_radius(&self, value: f32) {
        self.with_bloom(|bloom| bloom.set_radius(value));
    }

    pub fn set_exposure(&self, value: f32) {
        if let Some(composer) = self.host.session.borrow_mut().composer_mut() {
            composer.set_exposure(value);
        }
    }

    pub fn fullscreen_available(&self) -> bool {
        self.host.session.borrow().fullscreen_available()
    }

    pub fn toggle_fullscreen(&self) -> Result<(), JsValue> {
        self.host
            .session
            .borrow_mut()
            .toggle_fullscreen()
            .map_err(|err| JsValue::from_str(&err.to_string()))
    }

    /// Re-reads the canvas position after layout changes the page did not
    /// signal with a scroll or resize event.
    pub fn refresh_bounds(&self) {
        self.host.session.borrow_mut().refresh_bounds();
    }

    /// Stops the frame loop and removes every listener.
    pub fn dispose(&self) {
        self.host.dispose();
    }
}

impl ViewerHandle {
    fn with_bloom(&self, update: impl FnOnce(&mut BloomSettings)) {
        let mut session = self.host.session.borrow_mut();
        match session.composer_mut().and_then(|composer| composer.bloom_mut()) {
            Some(bloom) => update(bloom),
            None => log::debug!("bloom is not configured for this viewer"),
        }
    }
}

/// Starts a viewer on the canvas with id `canvas_id`. `config_xml` is an
/// optional `<viewer>` document; `model_url` overrides its model.
#[wasm_bindgen]
pub fn start_viewer(
    canvas_id: &str,
    model_url: Option<String>,
    config_xml: Option<String>,
) -> Result<ViewerHandle, JsValue> {
    start(canvas_id, model_url, config_xml).map_err(|err| JsValue::from_str(&format!("{err:#}")))
}

fn start(
    canvas_id: &str,
    model_url: Option<String>,
    config_xml: Option<String>,
) -> Result<ViewerHandle> {
    let window = web_sys::window().ok_or_else(|| anyhow!("window not available"))?;
    let document = window
        .document()
        .ok_or_else(|| anyhow!("document not available"))?;
    let canvas = document
        .get_element_by_id(canvas_id)
        .ok_or_else(|| anyhow!("no element with id {canvas_id:?}"))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| anyhow!("element {canvas_id:?} is not a canvas"))?;

    let mut config = match config_xml {
        Some(xml) => ViewerConfig::from_xml(&xml)?,
        None => ViewerConfig::default(),
    };
    if model_url.is_some() {
        config.model = model_url;
    }

    let session = Session::initialize(
        CanvasSurface::new(canvas.clone(), window.clone(), document.clone()),
        CanvasRenderer::new(canvas.clone())?,
        &config,
        Box::new(PerformanceTime::new(&window)?),
    )?;
    let host = Rc::new(Host {
        window: window.clone(),
        session: RefCell::new(session),
        frame_callback: RefCell::new(None),
        frame_request: Cell::new(None),
        listeners: RefCell::new(Vec::new()),
        drag_from: Cell::new(None),
    });

    let fullscreen_document = document.clone();
    host.listen(&document, "fullscreenchange", move |host, _| {
        let active = fullscreen_document.fullscreen_element().is_some();
        if let Err(err) = host.session.borrow_mut().on_fullscreen_change(active) {
            log::warn!("fullscreen change failed: {err}");
        }
    })?;
    for kind in ["scroll", "resize"] {
        host.listen(&window, kind, |host, _| {
            host.session.borrow_mut().refresh_bounds();
        })?;
    }
    host.listen(&canvas, "mousemove", |host, event| {
        if let Some(event) = event.dyn_ref::<MouseEvent>() {
            host.pointer_moved(event);
        }
    })?;
    host.listen(&canvas, "mousedown", |host, event| {
        if let Some(event) = event.dyn_ref::<MouseEvent>() {
            if event.button() == 0 {
                host.drag_from
                    .set(Some(Vec2::new(event.client_x() as f32, event.client_y() as f32)));
            }
        }
    })?;
    host.listen(&window, "mouseup", |host, _| host.drag_from.set(None))?;
    host.listen(&canvas, "wheel", |host, event| {
        if let Some(event) = event.dyn_ref::<WheelEvent>() {
            event.prevent_default();
            let lines = -(event.delta_y() / 100.0) as f32;
            host.session.borrow_mut().controls_mut().zoom_by_wheel(lines);
        }
    })?;

    match config.model.clone() {
        Some(url) => host.load(url),
        None => {
            host.session.borrow_mut().mark_ready()?;
            host.schedule_frame()?;
        }
    }
    Ok(ViewerHandle { host })
}
