use crate::error::RenderError;
use crate::post::FrameEffects;

use super::{raster, Frame, SceneRenderer};

/// What a [`HeadlessRenderer`] has been asked to do so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub frames: u64,
    pub resizes: u64,
    pub size: (u32, u32),
    pub last_draw_items: usize,
    /// Triangles that survived projection in the last frame.
    pub last_visible_triangles: usize,
    pub last_light_count: usize,
    pub last_aspect: f32,
    pub last_effects: Option<FrameEffects>,
}

/// Renderer that draws nothing and records every call. Used for headless
/// runs and when no window can be created.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    stats: RenderStats,
    fail_next: Option<RenderError>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Makes the next draw fail with `error`.
    pub fn fail_next_draw(&mut self, error: RenderError) {
        self.fail_next = Some(error);
    }
}

impl SceneRenderer for HeadlessRenderer {
    fn resize(&mut self, width: u32, height: u32) {
        self.stats.resizes += 1;
        self.stats.size = (width, height);
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), RenderError> {
        if let Some(error) = self.fail_next.take() {
            return Err(error);
        }
        self.stats.frames += 1;
        self.stats.last_draw_items = frame.scene.draw_list().len();
        self.stats.last_visible_triangles =
            raster::rasterize(frame, self.stats.size.0, self.stats.size.1).len();
        self.stats.last_light_count = frame.scene.lights().len();
        self.stats.last_aspect = frame.camera.aspect();
        self.stats.last_effects = frame.effects;
        Ok(())
    }
}
