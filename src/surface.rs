use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Bounding rectangle of a surface in host pointer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    /// Pointer position relative to the top-left corner of the surface.
    pub fn to_local(&self, pointer: Vec2) -> Vec2 {
        pointer - Vec2::new(self.left, self.top)
    }

    /// Edges count as inside.
    pub fn contains(&self, pointer: Vec2) -> bool {
        let local = self.to_local(pointer);
        local.x >= 0.0 && local.y >= 0.0 && local.x <= self.width && local.y <= self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorState {
    #[default]
    Default,
    /// Pointer is over the surface.
    Pointer,
}

/// Cursor the surface should show for a pointer at `pointer`.
pub fn hover_state(pointer: Vec2, bounds: &SurfaceRect) -> CursorState {
    if bounds.contains(pointer) {
        CursorState::Pointer
    } else {
        CursorState::Default
    }
}

/// Visual target the session renders into.
pub trait DisplaySurface {
    fn size(&self) -> (u32, u32);

    fn set_size(&mut self, width: u32, height: u32);

    fn bounds(&self) -> SurfaceRect;

    /// Host-specific style string, snapshotted and restored verbatim around
    /// fullscreen.
    fn style(&self) -> String;

    fn set_style(&mut self, style: &str);

    fn set_cursor(&mut self, cursor: CursorState);

    /// Size the surface takes when fullscreen.
    fn screen_size(&self) -> (u32, u32);

    fn supports_fullscreen(&self) -> bool;

    /// Whether the platform currently shows this surface fullscreen.
    fn is_fullscreen(&self) -> bool;

    fn request_fullscreen(&mut self) -> SessionResult<()>;

    fn exit_fullscreen(&mut self) -> SessionResult<()>;
}

/// Surface with no backing window. The host reports fullscreen changes
/// itself, as a platform would.
#[derive(Debug, Clone, PartialEq)]
pub struct OffscreenSurface {
    size: (u32, u32),
    origin: Vec2,
    style: String,
    cursor: CursorState,
    screen: Option<(u32, u32)>,
    fullscreen_requested: bool,
    fullscreen_active: bool,
    deferred_fullscreen: bool,
}

impl OffscreenSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            origin: Vec2::ZERO,
            style: String::new(),
            cursor: CursorState::Default,
            screen: Some((1920, 1080)),
            fullscreen_requested: false,
            fullscreen_active: false,
            deferred_fullscreen: false,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_origin(mut self, left: f32, top: f32) -> Self {
        self.origin = Vec2::new(left, top);
        self
    }

    /// `None` makes the surface report that fullscreen is unsupported.
    pub fn with_screen(mut self, screen: Option<(u32, u32)>) -> Self {
        self.screen = screen;
        self
    }

    /// Fullscreen requests only take effect once
    /// [`set_fullscreen_active`](Self::set_fullscreen_active) is called, as
    /// on platforms that grant fullscreen asynchronously.
    pub fn with_deferred_fullscreen(mut self) -> Self {
        self.deferred_fullscreen = true;
        self
    }

    /// Plays the platform: marks the surface as shown fullscreen or not.
    pub fn set_fullscreen_active(&mut self, active: bool) {
        self.fullscreen_active = active;
    }

    pub fn cursor(&self) -> CursorState {
        self.cursor
    }

    pub fn fullscreen_requested(&self) -> bool {
        self.fullscreen_requested
    }
}

impl DisplaySurface for OffscreenSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn bounds(&self) -> SurfaceRect {
        SurfaceRect::new(
            self.origin.x,
            self.origin.y,
            self.size.0 as f32,
            self.size.1 as f32,
        )
    }

    fn style(&self) -> String {
        self.style.clone()
    }

    fn set_style(&mut self, style: &str) {
        self.style = style.to_string();
    }

    fn set_cursor(&mut self, cursor: CursorState) {
        self.cursor = cursor;
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen.unwrap_or(self.size)
    }

    fn supports_fullscreen(&self) -> bool {
        self.screen.is_some()
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen_active
    }

    fn request_fullscreen(&mut self) -> SessionResult<()> {
        if self.screen.is_none() {
            return Err(SessionError::FullscreenUnavailable);
        }
        self.fullscreen_requested = true;
        if !self.deferred_fullscreen {
            self.fullscreen_active = true;
        }
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> SessionResult<()> {
        self.fullscreen_requested = false;
        if !self.deferred_fullscreen {
            self.fullscreen_active = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hover_is_inclusive_at_edges() {
        let bounds = SurfaceRect::new(10.0, 20.0, 500.0, 500.0);
        assert_eq!(hover_state(Vec2::new(10.0, 20.0), &bounds), CursorState::Pointer);
        assert_eq!(hover_state(Vec2::new(510.0, 520.0), &bounds), CursorState::Pointer);
        assert_eq!(hover_state(Vec2::new(250.0, 250.0), &bounds), CursorState::Pointer);
        assert_eq!(hover_state(Vec2::new(9.9, 250.0), &bounds), CursorState::Default);
        assert_eq!(hover_state(Vec2::new(250.0, 520.5), &bounds), CursorState::Default);
    }

    #[test]
    fn to_local_subtracts_origin() {
        let bounds = SurfaceRect::new(10.0, 20.0, 100.0, 100.0);
        assert_eq!(bounds.to_local(Vec2::new(15.0, 25.0)), Vec2::new(5.0, 5.0));
    }

    #[test]
    fn offscreen_without_screen_rejects_fullscreen() {
        let mut surface = OffscreenSurface::new(500, 500).with_screen(None);
        assert!(!surface.supports_fullscreen());
        assert!(matches!(
            surface.request_fullscreen(),
            Err(SessionError::FullscreenUnavailable)
        ));
    }
}
