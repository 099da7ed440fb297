use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FullscreenMode {
    #[default]
    Normal,
    Fullscreen,
}

/// Surface dimensions and style captured before going fullscreen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    pub width: u32,
    pub height: u32,
    pub style: String,
}

/// `Normal ⇄ Fullscreen` bookkeeping, independent of the load state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullscreenState {
    mode: FullscreenMode,
    snapshot: Option<SurfaceSnapshot>,
}

impl FullscreenState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> FullscreenMode {
        self.mode
    }

    pub fn is_fullscreen(&self) -> bool {
        self.mode == FullscreenMode::Fullscreen
    }

    pub fn snapshot(&self) -> Option<&SurfaceSnapshot> {
        self.snapshot.as_ref()
    }

    /// Switches to `Fullscreen`, capturing `current` unless a snapshot is
    /// already held. Returns `false` when already fullscreen.
    pub fn enter(&mut self, current: impl FnOnce() -> SurfaceSnapshot) -> bool {
        if self.is_fullscreen() {
            return false;
        }
        if self.snapshot.is_none() {
            self.snapshot = Some(current());
        }
        self.mode = FullscreenMode::Fullscreen;
        true
    }

    /// Switches back to `Normal` and hands out the snapshot to restore.
    pub fn exit(&mut self) -> Option<SurfaceSnapshot> {
        if !self.is_fullscreen() {
            return None;
        }
        self.mode = FullscreenMode::Normal;
        self.snapshot.take()
    }
}
