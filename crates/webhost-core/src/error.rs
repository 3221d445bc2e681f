//! Error types for the embedding core.

use thiserror::Error;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors that can occur at the embedding boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    /// The engine platform failed its one-time initialization.
    #[error("engine runtime failed to initialize: {0}")]
    RuntimeFailed(String),

    /// Operation requires a successful `initialize` first.
    #[error("not initialized")]
    NotInitialized,

    /// `initialize` called on an already initialized object.
    #[error("already initialized")]
    AlreadyInitialized,

    /// The bridge failed to initialize or was closed; build a new one.
    #[error("bridge is closed")]
    Closed,

    /// Zero-sized viewport or surface.
    #[error("degenerate size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    /// URL longer than the configured maximum.
    #[error("URL is {len} characters long, maximum is {max}")]
    UrlTooLong { len: usize, max: usize },

    /// URL that does not parse as an absolute URL.
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    /// URL whose scheme is not in the allowed list.
    #[error("URL scheme `{0}` is not allowed")]
    DisallowedScheme(String),

    /// Engine-reported failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// No usable GPU adapter.
    #[error("no suitable GPU adapter")]
    NoAdapter,

    /// GPU device or queue error.
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Swapchain went out of date (typically mid-resize) and was reconfigured;
    /// the frame was not shown but the surface is still usable.
    #[error("swapchain outdated")]
    SwapchainOutdated,

    /// Presentation surface unavailable or lost.
    #[error("presentation surface error: {0}")]
    Surface(String),
}

/// Error taxonomy used to decide where an error is recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation invoked before required initialization.
    Precondition,
    /// Malformed or oversized input, rejected before any engine call.
    Validation,
    /// Engine-reported navigation or rendering failure.
    Engine,
    /// GPU device or surface unavailable.
    Resource,
    /// Engine runtime failure; the process cannot embed content anymore.
    Fatal,
}

impl EmbedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbedError::RuntimeFailed(_) => ErrorKind::Fatal,
            EmbedError::NotInitialized | EmbedError::AlreadyInitialized | EmbedError::Closed => {
                ErrorKind::Precondition
            }
            EmbedError::InvalidSize { .. }
            | EmbedError::UrlTooLong { .. }
            | EmbedError::MalformedUrl(_)
            | EmbedError::DisallowedScheme(_) => ErrorKind::Validation,
            EmbedError::Engine(_) => ErrorKind::Engine,
            EmbedError::NoAdapter
            | EmbedError::Gpu(_)
            | EmbedError::SwapchainOutdated
            | EmbedError::Surface(_) => ErrorKind::Resource,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}
