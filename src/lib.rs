//! Viewport session controller for 3D model viewers.
//!
//! A [`Session`] binds a [`DisplaySurface`] to a [`SceneRenderer`], loads a
//! model asynchronously, drives the frame loop and keeps the camera,
//! post-processing chain and fullscreen state in sync with the surface.
//! Platform hosts live in [`app`] (native window) and `web` (browser
//! canvas); everything else is host-agnostic and runs headless in tests.

pub mod animation;
#[cfg(not(target_arch = "wasm32"))]
pub mod app;
pub mod camera;
pub mod clock;
pub mod config;
pub mod controls;
pub mod error;
pub mod fullscreen;
pub mod loader;
pub mod obj;
pub mod post;
pub mod render;
pub mod scene;
pub mod session;
pub mod surface;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use animation::{AnimationAction, AnimationClip, AnimationMixer};
pub use camera::PerspectiveCamera;
#[cfg(not(target_arch = "wasm32"))]
pub use clock::MonotonicTime;
pub use clock::{Clock, ManualTime, TimeSource};
pub use config::ViewerConfig;
pub use controls::OrbitControls;
pub use error::{AssetLoadError, RenderError, SessionError, SessionResult};
pub use fullscreen::FullscreenMode;
#[cfg(not(target_arch = "wasm32"))]
pub use loader::FileLoader;
pub use loader::{decode_asset, AssetLoader, LoadedAsset, MemoryLoader};
pub use obj::parse_obj;
pub use post::{BloomSettings, Composer, ToneMapping};
pub use render::{Frame, HeadlessRenderer, RenderStats, SceneRenderer};
pub use scene::{Light, LightKind, Material, MeshData, SceneGraph, SceneNode};
pub use session::{LoadState, LoadTicket, Session};
pub use surface::{CursorState, DisplaySurface, OffscreenSurface, SurfaceRect};
