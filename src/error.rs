//! Error types shared by the session controller and its collaborators.

use thiserror::Error;

use crate::session::LoadState;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failure reported by an [`AssetLoader`](crate::loader::AssetLoader).
#[derive(Error, Debug)]
pub enum AssetLoadError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("failed to read {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("network error while fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("unsupported asset format: {0}")]
    UnsupportedFormat(String),
}

/// Failure reported by a [`SceneRenderer`](crate::render::SceneRenderer).
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("render surface was lost or is outdated")]
    SurfaceLost,

    #[error("GPU is out of memory")]
    OutOfMemory,

    #[error("render backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the [`Session`](crate::session::Session) controller.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid viewport dimensions {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },

    #[error("fullscreen is not available on this surface")]
    FullscreenUnavailable,

    #[error("an asset load is already pending for {0}")]
    LoadInProgress(String),

    #[error("load request #{0} is not the pending request")]
    StaleLoad(u64),

    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LoadState,
    },

    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),

    #[error("surface error: {0}")]
    Surface(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}
