use anyhow::{anyhow, Result};
use glam::Vec3;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::error::RenderError;

use super::{raster, Frame, SceneRenderer};

/// Renderer backed by a 2D canvas for WebAssembly builds. Triangles are
/// projected and shaded on the CPU and painted back to front.
pub struct CanvasRenderer {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    size: (u32, u32),
}

impl CanvasRenderer {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let context = canvas
            .get_context("2d")
            .map_err(|err| anyhow!("failed to query canvas context: {err:?}"))?
            .ok_or_else(|| anyhow!("canvas does not support 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| anyhow!("failed to cast canvas context"))?;

        let size = (canvas.width(), canvas.height());
        Ok(Self {
            canvas,
            context,
            size,
        })
    }

    fn clear_background(&self, color: Vec3) {
        self.context.set_fill_style_str(&raster::css_color(color));
        self.context
            .fill_rect(0.0, 0.0, f64::from(self.size.0), f64::from(self.size.1));
    }
}

impl SceneRenderer for CanvasRenderer {
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), RenderError> {
        self.clear_background(frame.scene.background.unwrap_or(Vec3::new(0.02, 0.02, 0.04)));

        for triangle in raster::rasterize(frame, self.size.0, self.size.1) {
            let color = raster::css_color(triangle.color);
            let [a, b, c] = triangle.points;
            self.context.begin_path();
            self.context.move_to(f64::from(a.x), f64::from(a.y));
            self.context.line_to(f64::from(b.x), f64::from(b.y));
            self.context.line_to(f64::from(c.x), f64::from(c.y));
            self.context.close_path();
            self.context.set_fill_style_str(&color);
            self.context.set_stroke_style_str(&color);
            self.context.fill();
            // Hairline stroke hides seams between adjacent triangles.
            self.context.stroke();
        }
        Ok(())
    }
}
