//! Viewport session controller.
//!
//! A [`Session`] owns everything one viewer needs: the display surface, the
//! renderer, the scene graph, camera and orbit controls, the optional
//! post-processing composer and animation mixer, and the frame clock. Hosts
//! feed it events (resize, fullscreen notifications, pointer moves, display
//! refresh ticks) and it keeps the pieces consistent.
//!
//! Load lifecycle: `Initializing → Loading → {Ready | LoadFailed}`. The frame
//! loop starts on the first transition to `Ready` and runs until
//! [`Session::teardown`]. Fullscreen (`Normal ⇄ Fullscreen`) is tracked
//! independently of the load state.

use glam::Vec2;

use crate::animation::{AnimationClip, AnimationMixer};
use crate::camera::PerspectiveCamera;
use crate::clock::{Clock, TimeSource};
use crate::config::ViewerConfig;
use crate::controls::OrbitControls;
use crate::error::{AssetLoadError, SessionError, SessionResult};
use crate::fullscreen::{FullscreenMode, FullscreenState, SurfaceSnapshot};
use crate::loader::{AssetLoader, LoadedAsset};
use crate::post::{Composer, Pass, ToneMapping};
use crate::render::{Frame, SceneRenderer};
use crate::scene::{SceneGraph, SceneNode};
use crate::surface::{hover_state, CursorState, DisplaySurface, SurfaceRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Initializing,
    Loading,
    Ready,
    LoadFailed,
}

/// Handle for the one pending asset request, redeemed by
/// [`Session::complete_load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    id: u64,
    url: String,
}

impl LoadTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Default)]
struct FrameLoop {
    frames: u64,
}

pub struct Session<S: DisplaySurface, R: SceneRenderer> {
    surface: S,
    renderer: R,
    config: ViewerConfig,
    scene: SceneGraph,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    composer: Option<Composer>,
    mixer: Option<AnimationMixer>,
    clock: Clock,
    size: (u32, u32),
    fullscreen: FullscreenState,
    load_state: LoadState,
    pending: Option<LoadTicket>,
    next_ticket: u64,
    model: Option<String>,
    frame_loop: Option<FrameLoop>,
    loop_starts: u32,
    torn_down: bool,
    bounds: SurfaceRect,
    cursor: CursorState,
    last_delta: f32,
}

impl<S: DisplaySurface, R: SceneRenderer> Session<S, R> {
    /// Binds `renderer` to `surface` and builds camera, controls, lights and
    /// the post-processing chain described by `config`.
    pub fn initialize(
        mut surface: S,
        mut renderer: R,
        config: &ViewerConfig,
        time: Box<dyn TimeSource>,
    ) -> SessionResult<Self> {
        let (width, height) = (config.width, config.height);
        if width == 0 || height == 0 {
            return Err(SessionError::InvalidDimension { width, height });
        }

        surface.set_size(width, height);
        renderer.resize(width, height);

        let mut camera = config.camera.build(width, height);
        let mut controls = config.controls.build(config.camera.target);
        controls.update(&mut camera);

        let mut scene = SceneGraph::new();
        scene.background = config.background;
        for (index, light) in config.lights.iter().enumerate() {
            scene.add(SceneNode::light(format!("light-{index}"), *light));
        }

        let composer = match (config.bloom, config.tone_mapping) {
            (Some(bloom), tone_mapping) => Some(Composer::bloom(
                width,
                height,
                bloom,
                tone_mapping,
                config.exposure,
            )),
            (None, ToneMapping::Reinhard) => {
                let mut composer = Composer::new(width, height);
                composer.add_pass(Pass::Output {
                    tone_mapping: ToneMapping::Reinhard,
                    exposure: 1.0,
                });
                composer.set_exposure(config.exposure);
                Some(composer)
            }
            (None, ToneMapping::None) => None,
        };

        let bounds = surface.bounds();
        log::info!(
            "session initialized at {width}x{height} with {} light(s){}",
            config.lights.len(),
            if composer.is_some() { " and post-processing" } else { "" }
        );

        Ok(Self {
            surface,
            renderer,
            config: config.clone(),
            scene,
            camera,
            controls,
            composer,
            mixer: None,
            clock: Clock::new(time),
            size: (width, height),
            fullscreen: FullscreenState::new(),
            load_state: LoadState::Initializing,
            pending: None,
            next_ticket: 1,
            model: None,
            frame_loop: None,
            loop_starts: 0,
            torn_down: false,
            bounds,
            cursor: CursorState::Default,
            last_delta: 0.0,
        })
    }

    /// Loads `url` through `loader` and attaches it to the scene.
    pub async fn request_asset<L>(&mut self, loader: &L, url: &str) -> SessionResult<()>
    where
        L: AssetLoader + ?Sized,
    {
        let ticket = self.begin_load(url)?;
        let result = loader.load(url).await;
        self.complete_load(ticket, result)
    }

    /// First half of [`request_asset`](Self::request_asset), for hosts that
    /// cannot hold the session across the await.
    pub fn begin_load(&mut self, url: &str) -> SessionResult<LoadTicket> {
        if let Some(pending) = &self.pending {
            log::warn!("rejecting load of {url}: {} is still loading", pending.url);
            return Err(SessionError::LoadInProgress(pending.url.clone()));
        }
        let ticket = LoadTicket {
            id: self.next_ticket,
            url: url.to_string(),
        };
        self.next_ticket += 1;
        self.pending = Some(ticket.clone());
        self.load_state = LoadState::Loading;
        log::info!("loading {url} (request #{})", ticket.id);
        Ok(ticket)
    }

    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<LoadedAsset, AssetLoadError>,
    ) -> SessionResult<()> {
        if self.pending.as_ref().map(|pending| pending.id) != Some(ticket.id) {
            log::warn!("ignoring completion of stale request #{} for {}", ticket.id, ticket.url);
            return Err(SessionError::StaleLoad(ticket.id));
        }
        self.pending = None;

        match result {
            Ok(asset) => {
                self.attach(asset);
                self.load_state = LoadState::Ready;
                log::info!("{} is ready", ticket.url);
                self.start_loop();
                Ok(())
            }
            Err(err) => {
                log::error!("failed to load {}: {err}", ticket.url);
                self.load_state = LoadState::LoadFailed;
                Err(err.into())
            }
        }
    }

    fn attach(&mut self, asset: LoadedAsset) {
        let LoadedAsset {
            root: mut model,
            animations,
        } = asset;

        for rule in &self.config.material_overrides {
            let replaced = model.replace_materials(
                |material| rule.matches(material),
                |material| rule.apply(material),
            );
            log::debug!("material override touched {replaced} mesh(es)");
        }

        if let Some(previous) = self.model.take() {
            self.scene.remove(&previous);
        }

        let mut mixer = AnimationMixer::new();
        if self.config.autoplay {
            if let Some(clip) = animations.first() {
                mixer.clip_action(clip.clone().optimize()).play();
            }
        }
        if let Some(spin) = self.config.spin {
            mixer
                .clip_action(AnimationClip::turntable(model.name.clone(), spin.axis, spin.period))
                .play();
        }
        self.mixer = (!mixer.actions().is_empty()).then_some(mixer);

        self.model = Some(model.name.clone());
        self.scene.add(model);
    }

    /// Readies a session that has no model to load.
    pub fn mark_ready(&mut self) -> SessionResult<()> {
        if let Some(pending) = &self.pending {
            return Err(SessionError::LoadInProgress(pending.url.clone()));
        }
        if self.load_state != LoadState::Initializing {
            return Err(SessionError::InvalidState {
                operation: "mark_ready",
                state: self.load_state,
            });
        }
        self.load_state = LoadState::Ready;
        self.start_loop();
        Ok(())
    }

    fn start_loop(&mut self) {
        if self.torn_down {
            log::debug!("session was torn down; not starting the frame loop");
            return;
        }
        if self.frame_loop.is_some() {
            log::debug!("frame loop already running");
            return;
        }
        self.clock.start();
        self.frame_loop = Some(FrameLoop::default());
        self.loop_starts += 1;
        log::info!("frame loop started");
    }

    /// Stops the frame loop for good. Later [`run_frame`](Self::run_frame)
    /// calls do nothing, and a load still in flight completes as stale.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        if let Some(ticket) = self.pending.take() {
            log::debug!("dropping pending request #{} for {}", ticket.id, ticket.url);
        }
        if let Some(frame_loop) = self.frame_loop.take() {
            log::info!("frame loop stopped after {} frame(s)", frame_loop.frames);
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn resize(&mut self, width: u32, height: u32) -> SessionResult<()> {
        if width == 0 || height == 0 {
            log::warn!("ignoring resize to {width}x{height}");
            return Err(SessionError::InvalidDimension { width, height });
        }

        self.camera.set_aspect(width, height);
        if self.size != (width, height) {
            log::debug!("resizing viewport to {width}x{height}");
            self.size = (width, height);
            self.renderer.resize(width, height);
            if let Some(composer) = &mut self.composer {
                composer.resize(width, height);
            }
        }
        if self.surface.size() != (width, height) {
            self.surface.set_size(width, height);
        }
        self.refresh_bounds();
        Ok(())
    }

    /// Whether hosts should offer a fullscreen affordance at all.
    pub fn fullscreen_available(&self) -> bool {
        self.surface.supports_fullscreen()
    }

    /// Asks the platform to enter or leave fullscreen.
    ///
    /// The mode only changes once the surface is actually fullscreen. Hosts
    /// where the request completes later report it through
    /// [`on_fullscreen_change`](Self::on_fullscreen_change), so a rejected
    /// request leaves the session in `Normal`. Leaving likewise waits for the
    /// notification, unless the surface already dropped out of fullscreen
    /// without reporting it, in which case the session restores right away.
    pub fn toggle_fullscreen(&mut self) -> SessionResult<()> {
        if !self.surface.supports_fullscreen() {
            return Err(SessionError::FullscreenUnavailable);
        }
        match self.fullscreen.mode() {
            FullscreenMode::Normal => {
                self.surface.request_fullscreen()?;
                if self.surface.is_fullscreen() {
                    self.enter_fullscreen()
                } else {
                    log::debug!("fullscreen requested; waiting for the platform");
                    Ok(())
                }
            }
            FullscreenMode::Fullscreen if self.surface.is_fullscreen() => {
                self.surface.exit_fullscreen()
            }
            FullscreenMode::Fullscreen => {
                log::warn!("surface left fullscreen without notice; restoring");
                self.on_fullscreen_change(false)
            }
        }
    }

    /// Platform notification that fullscreen was entered or left.
    pub fn on_fullscreen_change(&mut self, active: bool) -> SessionResult<()> {
        match (active, self.fullscreen.mode()) {
            (true, FullscreenMode::Normal) => self.enter_fullscreen(),
            (false, FullscreenMode::Fullscreen) => {
                let Some(snapshot) = self.fullscreen.exit() else {
                    return Ok(());
                };
                log::info!(
                    "leaving fullscreen, restoring {}x{}",
                    snapshot.width,
                    snapshot.height
                );
                self.surface.set_style(&snapshot.style);
                self.resize(snapshot.width, snapshot.height)
            }
            _ => Ok(()),
        }
    }

    fn enter_fullscreen(&mut self) -> SessionResult<()> {
        let (width, height) = self.size;
        let style = self.surface.style();
        self.fullscreen.enter(|| SurfaceSnapshot {
            width,
            height,
            style,
        });
        if let Some(style) = &self.config.fullscreen_style {
            self.surface.set_style(style);
        }
        let (screen_width, screen_height) = self.surface.screen_size();
        log::info!("entering fullscreen at {screen_width}x{screen_height}");
        self.resize(screen_width, screen_height)
    }

    /// Advances controls and animation by one tick and draws. Returns
    /// `Ok(false)` when the loop is not running.
    pub fn run_frame(&mut self) -> SessionResult<bool> {
        let Some(frame_loop) = self.frame_loop.as_mut() else {
            return Ok(false);
        };

        self.controls.update(&mut self.camera);
        let delta = self.clock.delta();
        self.last_delta = delta;
        if let Some(mixer) = &mut self.mixer {
            mixer.update(delta, self.scene.root_mut());
        }

        match &self.composer {
            Some(composer) => composer.render(&mut self.renderer, &self.scene, &self.camera)?,
            None => self.renderer.draw(&Frame {
                scene: &self.scene,
                camera: &self.camera,
                effects: None,
            })?,
        }
        frame_loop.frames += 1;
        Ok(true)
    }

    /// Hit-tests `pointer` against the cached surface bounds and updates the
    /// cursor when the result changes.
    pub fn pointer_hover(&mut self, pointer: Vec2) -> CursorState {
        if !self.config.hover_cursor {
            return CursorState::Default;
        }
        let state = hover_state(pointer, &self.bounds);
        if state != self.cursor {
            self.cursor = state;
            self.surface.set_cursor(state);
        }
        state
    }

    /// Re-reads the surface bounds, e.g. after the page scrolled.
    pub fn refresh_bounds(&mut self) {
        self.bounds = self.surface.bounds();
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn fullscreen_mode(&self) -> FullscreenMode {
        self.fullscreen.mode()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn bounds(&self) -> SurfaceRect {
        self.bounds
    }

    pub fn cursor(&self) -> CursorState {
        self.cursor
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.controls
    }

    pub fn composer(&self) -> Option<&Composer> {
        self.composer.as_ref()
    }

    pub fn composer_mut(&mut self) -> Option<&mut Composer> {
        self.composer.as_mut()
    }

    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.mixer.as_ref()
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn pending_load(&self) -> Option<&LoadTicket> {
        self.pending.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.frame_loop.is_some()
    }

    /// How many times a frame loop has been started. Never above one.
    pub fn loop_starts(&self) -> u32 {
        self.loop_starts
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_loop.as_ref().map_or(0, |frame_loop| frame_loop.frames)
    }

    /// Seconds between the last two ticks.
    pub fn last_delta(&self) -> f32 {
        self.last_delta
    }
}

impl<S, R> std::fmt::Debug for Session<S, R>
where
    S: DisplaySurface,
    R: SceneRenderer,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("size", &self.size)
            .field("load_state", &self.load_state)
            .field("fullscreen", &self.fullscreen.mode())
            .field("running", &self.is_running())
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualTime;
    use crate::error::RenderError;
    use crate::loader::MemoryLoader;
    use crate::render::HeadlessRenderer;
    use crate::surface::OffscreenSurface;

    const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    type TestSession = Session<OffscreenSurface, HeadlessRenderer>;

    fn session(width: u32, height: u32) -> (TestSession, ManualTime) {
        let config = ViewerConfig {
            width,
            height,
            ..ViewerConfig::default()
        };
        session_with(OffscreenSurface::new(1, 1), &config)
    }

    fn session_with(surface: OffscreenSurface, config: &ViewerConfig) -> (TestSession, ManualTime) {
        let time = ManualTime::new();
        let session = Session::initialize(
            surface,
            HeadlessRenderer::new(),
            config,
            Box::new(time.clone()),
        )
        .unwrap();
        (session, time)
    }

    fn loader() -> MemoryLoader {
        MemoryLoader::new()
            .with_file("model.obj", TRIANGLE)
            .with_file("broken.obj", "f 1 2 3\n")
    }

    #[test]
    fn initialize_binds_surface_and_renderer() {
        let (session, _) = session(800, 600);
        assert_eq!(session.load_state(), LoadState::Initializing);
        assert_eq!(session.surface().size(), (800, 600));
        assert_eq!(session.renderer().stats().size, (800, 600));
        assert!((session.camera().aspect() - 800.0 / 600.0).abs() < 1e-6);
        assert_eq!(session.scene().lights().len(), 2);
        assert!(!session.is_running());
        assert!(session.composer().is_none());
    }

    #[test]
    fn initialize_rejects_zero_size() {
        let config = ViewerConfig {
            width: 0,
            ..ViewerConfig::default()
        };
        let result = Session::initialize(
            OffscreenSurface::new(1, 1),
            HeadlessRenderer::new(),
            &config,
            Box::new(ManualTime::new()),
        );
        assert!(matches!(
            result,
            Err(SessionError::InvalidDimension { width: 0, height: 500 })
        ));
    }

    #[test]
    fn successful_load_starts_the_loop() {
        let (mut session, _) = session(500, 500);
        pollster::block_on(session.request_asset(&loader(), "model.obj")).unwrap();
        assert_eq!(session.load_state(), LoadState::Ready);
        assert!(session.is_running());
        assert_eq!(session.camera().aspect(), 1.0);
        assert!(session.scene().root().find("model").is_some());
    }

    #[test]
    fn failed_load_never_starts_the_loop() {
        let (mut session, _) = session(800, 600);
        let err = pollster::block_on(session.request_asset(&loader(), "broken.obj")).unwrap_err();
        assert!(matches!(
            err,
            SessionError::AssetLoad(AssetLoadError::Decode { .. })
        ));
        assert_eq!(session.load_state(), LoadState::LoadFailed);
        assert!(!session.is_running());
        assert_eq!(session.loop_starts(), 0);
        assert!(!session.run_frame().unwrap());
    }

    #[test]
    fn concurrent_load_is_rejected() {
        let (mut session, _) = session(500, 500);
        let ticket = session.begin_load("model.obj").unwrap();
        assert!(matches!(
            session.begin_load("other.obj"),
            Err(SessionError::LoadInProgress(url)) if url == "model.obj"
        ));
        assert_eq!(session.pending_load(), Some(&ticket));
    }

    #[test]
    fn duplicate_completion_cannot_double_start() {
        let (mut session, _) = session(500, 500);
        let loader = loader();
        let ticket = session.begin_load("model.obj").unwrap();
        let first = pollster::block_on(loader.load("model.obj"));
        let second = pollster::block_on(loader.load("model.obj"));
        session.complete_load(ticket.clone(), first).unwrap();
        assert!(matches!(
            session.complete_load(ticket, second),
            Err(SessionError::StaleLoad(1))
        ));
        assert_eq!(session.loop_starts(), 1);
        assert_eq!(session.scene().root().mesh_count(), 1);
    }

    #[test]
    fn reload_replaces_model_and_keeps_single_loop() {
        let (mut session, _) = session(500, 500);
        let loader = loader();
        pollster::block_on(session.request_asset(&loader, "model.obj")).unwrap();
        pollster::block_on(session.request_asset(&loader, "model.obj")).unwrap();
        assert_eq!(session.loop_starts(), 1);
        assert_eq!(session.scene().root().mesh_count(), 1);

        assert!(pollster::block_on(session.request_asset(&loader, "broken.obj")).is_err());
        assert_eq!(session.load_state(), LoadState::LoadFailed);
        assert!(session.is_running());
    }

    #[test]
    fn mark_ready_starts_loop_without_model() {
        let (mut session, _) = session(500, 500);
        session.mark_ready().unwrap();
        assert!(matches!(
            session.mark_ready(),
            Err(SessionError::InvalidState {
                state: LoadState::Ready,
                ..
            })
        ));
        assert_eq!(session.load_state(), LoadState::Ready);
        assert_eq!(session.loop_starts(), 1);
        assert!(session.run_frame().unwrap());
    }

    #[test]
    fn frame_delta_is_measured_from_previous_tick() {
        let (mut session, time) = session(500, 500);
        session.mark_ready().unwrap();
        time.advance(Duration::from_millis(500));
        session.run_frame().unwrap();
        assert!((session.last_delta() - 0.5).abs() < 1e-6);
        time.advance(Duration::from_millis(250));
        session.run_frame().unwrap();
        assert!((session.last_delta() - 0.25).abs() < 1e-6);
        session.run_frame().unwrap();
        assert_eq!(session.last_delta(), 0.0);
        assert_eq!(session.frames_rendered(), 3);
    }

    #[test]
    fn resize_updates_aspect_and_is_idempotent() {
        let (mut session, _) = session(500, 500);
        session.resize(1024, 512).unwrap();
        let camera = session.camera().clone();
        let stats = session.renderer().stats().clone();
        session.resize(1024, 512).unwrap();
        assert_eq!(session.camera(), &camera);
        assert_eq!(session.renderer().stats(), &stats);
        assert_eq!(session.camera().aspect(), 2.0);
        assert_eq!(session.surface().size(), (1024, 512));
        assert_eq!(session.bounds(), SurfaceRect::from_size(1024, 512));
    }

    #[test]
    fn zero_resize_leaves_state_untouched() {
        let (mut session, _) = session(500, 500);
        assert!(matches!(
            session.resize(0, 300),
            Err(SessionError::InvalidDimension { width: 0, height: 300 })
        ));
        assert_eq!(session.size(), (500, 500));
        assert_eq!(session.camera().aspect(), 1.0);
    }

    #[test]
    fn fullscreen_round_trip_restores_size_and_style() {
        let surface = OffscreenSurface::new(1, 1).with_style("border: 1px solid");
        let config = ViewerConfig {
            fullscreen_style: Some("border: none".to_string()),
            ..ViewerConfig::default()
        };
        let (mut session, _) = session_with(surface, &config);

        session.toggle_fullscreen().unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Fullscreen);
        assert_eq!(session.size(), (1920, 1080));
        assert_eq!(session.surface().style(), "border: none");
        assert!(session.surface().fullscreen_requested());

        session.toggle_fullscreen().unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Fullscreen);
        assert!(!session.surface().fullscreen_requested());

        session.on_fullscreen_change(false).unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Normal);
        assert_eq!(session.size(), (500, 500));
        assert_eq!(session.surface().size(), (500, 500));
        assert_eq!(session.surface().style(), "border: 1px solid");
        assert_eq!(session.camera().aspect(), 1.0);
    }

    #[test]
    fn platform_initiated_fullscreen_is_tracked() {
        let (mut session, _) = session(640, 480);
        session.on_fullscreen_change(true).unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Fullscreen);
        session.on_fullscreen_change(true).unwrap();
        session.on_fullscreen_change(false).unwrap();
        assert_eq!(session.size(), (640, 480));
        session.on_fullscreen_change(false).unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Normal);
    }

    #[test]
    fn fullscreen_unavailable_is_reported() {
        let surface = OffscreenSurface::new(1, 1).with_screen(None);
        let (mut session, _) = session_with(surface, &ViewerConfig::default());
        assert!(!session.fullscreen_available());
        assert!(matches!(
            session.toggle_fullscreen(),
            Err(SessionError::FullscreenUnavailable)
        ));
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Normal);
    }

    #[test]
    fn hover_uses_cached_bounds() {
        let surface = OffscreenSurface::new(1, 1).with_origin(10.0, 20.0);
        let (mut session, _) = session_with(surface, &ViewerConfig::default());
        assert_eq!(session.pointer_hover(Vec2::new(100.0, 100.0)), CursorState::Pointer);
        assert_eq!(session.surface().cursor(), CursorState::Pointer);
        assert_eq!(session.pointer_hover(Vec2::new(510.0, 520.0)), CursorState::Pointer);
        assert_eq!(session.pointer_hover(Vec2::new(5.0, 5.0)), CursorState::Default);
        assert_eq!(session.surface().cursor(), CursorState::Default);
    }

    #[test]
    fn bloom_config_renders_through_composer() {
        let (mut session, _) = session_with(
            OffscreenSurface::new(1, 1),
            &ViewerConfig::bloom_showcase(),
        );
        session.mark_ready().unwrap();
        session.composer_mut().unwrap().set_exposure(2.0);
        session.run_frame().unwrap();
        let effects = session.renderer().stats().last_effects.unwrap();
        assert!(effects.bloom.is_some());
        assert_eq!(effects.exposure, 16.0);
        assert_eq!(effects.tone_mapping, ToneMapping::Reinhard);
    }

    #[test]
    fn render_errors_surface_and_loop_survives() {
        let (mut session, _) = session(500, 500);
        session.mark_ready().unwrap();
        session.renderer_mut().fail_next_draw(RenderError::SurfaceLost);
        assert!(matches!(
            session.run_frame(),
            Err(SessionError::Render(RenderError::SurfaceLost))
        ));
        assert!(session.run_frame().unwrap());
        assert_eq!(session.frames_rendered(), 1);
    }

    #[test]
    fn teardown_stops_frames() {
        let (mut session, _) = session(500, 500);
        session.mark_ready().unwrap();
        session.run_frame().unwrap();
        session.teardown();
        assert!(!session.is_running());
        assert!(!session.run_frame().unwrap());
        assert_eq!(session.renderer().stats().frames, 1);
    }

    #[test]
    fn mark_ready_after_failed_load_is_refused() {
        let (mut session, _) = session(500, 500);
        assert!(pollster::block_on(session.request_asset(&loader(), "broken.obj")).is_err());
        assert!(matches!(
            session.mark_ready(),
            Err(SessionError::InvalidState {
                operation: "mark_ready",
                state: LoadState::LoadFailed,
            })
        ));
        assert_eq!(session.load_state(), LoadState::LoadFailed);
        assert!(!session.is_running());
        assert_eq!(session.loop_starts(), 0);
    }

    #[test]
    fn completion_after_teardown_is_stale() {
        let (mut session, _) = session(500, 500);
        let ticket = session.begin_load("model.obj").unwrap();
        session.teardown();
        assert!(session.is_torn_down());
        assert!(session.pending_load().is_none());

        let result = pollster::block_on(loader().load("model.obj"));
        assert!(matches!(
            session.complete_load(ticket, result),
            Err(SessionError::StaleLoad(1))
        ));
        assert!(!session.is_running());
        assert_eq!(session.loop_starts(), 0);
        assert!(!session.run_frame().unwrap());
    }

    #[test]
    fn torn_down_session_never_restarts_the_loop() {
        let (mut session, _) = session(500, 500);
        session.teardown();
        pollster::block_on(session.request_asset(&loader(), "model.obj")).unwrap();
        assert_eq!(session.load_state(), LoadState::Ready);
        assert!(!session.is_running());
        assert_eq!(session.loop_starts(), 0);
        assert!(session.mark_ready().is_err());
    }

    #[test]
    fn deferred_fullscreen_waits_for_the_platform() {
        let surface = OffscreenSurface::new(1, 1)
            .with_style("border: 1px solid")
            .with_deferred_fullscreen();
        let (mut session, _) = session_with(surface, &ViewerConfig::default());

        session.toggle_fullscreen().unwrap();
        assert!(session.surface().fullscreen_requested());
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Normal);
        assert_eq!(session.size(), (500, 500));

        // Rejected: no notification arrives, so asking again is still an entry.
        session.toggle_fullscreen().unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Normal);

        session.surface_mut().set_fullscreen_active(true);
        session.on_fullscreen_change(true).unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Fullscreen);
        assert_eq!(session.size(), (1920, 1080));
    }

    #[test]
    fn unreported_fullscreen_exit_restores_on_toggle() {
        let surface = OffscreenSurface::new(1, 1).with_style("border: 1px solid");
        let config = ViewerConfig {
            fullscreen_style: Some("border: none".to_string()),
            ..ViewerConfig::default()
        };
        let (mut session, _) = session_with(surface, &config);
        session.toggle_fullscreen().unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Fullscreen);

        session.surface_mut().set_fullscreen_active(false);
        session.toggle_fullscreen().unwrap();
        assert_eq!(session.fullscreen_mode(), FullscreenMode::Normal);
        assert_eq!(session.size(), (500, 500));
        assert_eq!(session.surface().style(), "border: 1px solid");
    }
}
