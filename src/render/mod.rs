//! Renderer seam between the session and a drawing backend.

pub mod headless;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;
pub mod raster;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

use crate::camera::PerspectiveCamera;
use crate::error::RenderError;
use crate::post::FrameEffects;
use crate::scene::SceneGraph;

pub use headless::{HeadlessRenderer, RenderStats};
#[cfg(not(target_arch = "wasm32"))]
pub use native::WgpuRenderer;
#[cfg(target_arch = "wasm32")]
pub use wasm::CanvasRenderer;

/// One frame's worth of input to a renderer.
pub struct Frame<'a> {
    pub scene: &'a SceneGraph,
    pub camera: &'a PerspectiveCamera,
    /// Post-processing to apply; `None` means a plain draw.
    pub effects: Option<FrameEffects>,
}

/// Drawing backend driven by the session.
pub trait SceneRenderer {
    /// Resizes the output buffer. Dimensions are always non-zero.
    fn resize(&mut self, width: u32, height: u32);

    /// Draws and presents one frame.
    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), RenderError>;
}
