//! Embedding core for an opaque web engine.
//!
//! - [`EngineRuntime`] runs the engine platform's one-time initialization
//! - [`EngineBridge`] owns one engine instance and its callback client
//! - [`ContentState`] is the navigation state machine hosts talk to
//! - [`compositor::CompositorSurface`] presents engine frames on a GPU surface
//!
//! Engines and GPUs are reached through capability traits ([`EnginePlatform`],
//! [`compositor::GpuBackend`]). [`scripted`] and [`compositor::headless`] are
//! in-process implementations for tests and offscreen hosts.

mod address;
mod bridge;
mod content;
mod engine;
mod error;
mod frame;
mod input;
mod liveness;
mod runtime;

pub mod compositor;
pub mod scripted;

pub use address::{UrlPolicy, normalize_input};
pub use bridge::{BridgeState, EngineBridge};
pub use compositor::{
    CompositorHandle, CompositorSurface, DropReason, FrameStats, FrameTicket, SubmitOutcome,
    SurfacePhase,
};
pub use content::{ContentObserver, ContentSnapshot, ContentState, NavigationPhase};
pub use engine::{
    EngineClient, EngineEvent, EngineEventSink, EngineInstance, EnginePlatform, EngineSnapshot,
    HistoryState,
};
pub use error::{EmbedError, ErrorKind, Result};
pub use frame::{DirtyRect, FrameBuffer, PixelFormat};
pub use input::{
    InputEvent, KeyEvent, KeyEventKind, Modifiers, MouseButton, MouseEvent, MouseEventKind,
};
pub use liveness::{Liveness, LivenessToken};
pub use runtime::{EngineRuntime, RuntimeState};

/// Largest physical dimension a viewport may have (wgpu's default
/// `max_texture_dimension_2d`).
pub const MAX_PHYSICAL_DIMENSION: u32 = 8192;

/// Logical viewport size with its device scale factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scale_factor: 1.0,
        }
    }

    pub fn with_scale(self, scale_factor: f32) -> Self {
        Self {
            scale_factor,
            ..self
        }
    }

    /// Not renderable: zero in either dimension, a scale factor that is not
    /// finite and positive, or a physical dimension above
    /// [`MAX_PHYSICAL_DIMENSION`].
    pub fn is_degenerate(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return true;
        }
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return true;
        }
        let (width, height) = self.physical();
        width == 0 || height == 0 || width > MAX_PHYSICAL_DIMENSION || height > MAX_PHYSICAL_DIMENSION
    }

    /// Dimensions in device pixels. Unusable scale factors count as 1.0.
    pub fn physical(&self) -> (u32, u32) {
        let scale = if self.scale_factor.is_finite() && self.scale_factor > 0.0 {
            self.scale_factor
        } else {
            1.0
        };
        (
            (self.width as f32 * scale).round() as u32,
            (self.height as f32 * scale).round() as u32,
        )
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
