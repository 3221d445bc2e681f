//! Capability interfaces the embedded engine is driven through.
//!
//! A concrete engine binding implements [`EnginePlatform`] (process-wide setup
//! and instance factory) and [`EngineInstance`] (one content instance). The
//! engine reports back through the [`EngineClient`] handed to it at creation.
//! Implementations do their own marshalling onto engine threads: every method
//! takes `&self` and may be called from the host's UI thread.

use std::sync::Arc;

use webhost_config::EngineConfig;

use crate::Size;
use crate::error::Result;
use crate::frame::FrameBuffer;
use crate::input::InputEvent;

/// Process-wide engine platform layer.
pub trait EnginePlatform: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// One-time platform initialization (thread pools, resource loaders).
    fn initialize(&self, config: &EngineConfig) -> Result<()>;

    /// Allocate a content instance at the given size.
    fn create_instance(
        &self,
        size: Size,
        config: &EngineConfig,
        client: Arc<dyn EngineClient>,
    ) -> Result<Arc<dyn EngineInstance>>;
}

/// Back/forward availability as reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryState {
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

/// Point-in-time view of what the engine is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// URL of the committed document; empty before the first commit.
    pub url: String,
    pub title: String,
    pub is_loading: bool,
}

/// One engine content instance.
pub trait EngineInstance: Send + Sync {
    fn load_url(&self, url: &str) -> Result<()>;

    fn resize(&self, size: Size) -> Result<()>;

    /// Coordinates are already in device pixels.
    fn send_input(&self, event: &InputEvent);

    /// Returns whether the engine accepted the request.
    fn go_back(&self) -> Result<bool>;

    /// Returns whether the engine accepted the request.
    fn go_forward(&self) -> Result<bool>;

    /// Returns whether the engine accepted the request.
    fn reload(&self) -> Result<bool>;

    fn stop(&self);

    fn history(&self) -> HistoryState;

    fn snapshot(&self) -> EngineSnapshot;

    /// Synchronously produce a frame, delivered through [`EngineClient::on_paint`].
    fn paint(&self) -> Result<()>;

    /// Release engine-side resources. No further commands follow.
    fn close(&self);
}

/// Callback hooks the engine invokes, possibly from its own threads.
pub trait EngineClient: Send + Sync {
    /// A navigation began, requested by the host or by the page itself.
    fn on_navigation_started(&self, url: &str);

    /// The navigation committed; `url` is the final URL after redirects.
    fn on_navigation_finished(&self, url: &str, title: &str);

    fn on_navigation_failed(&self, url: &str, error: &str);

    fn on_title_changed(&self, title: &str);

    /// Load progress in `0.0..=1.0`.
    fn on_progress(&self, progress: f32);

    /// A new frame from the engine's compositor.
    fn on_paint(&self, frame: FrameBuffer);
}

/// Navigation events forwarded from a bridge to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    NavigationStarted { url: String },
    NavigationFinished { url: String, title: String },
    NavigationFailed { url: String, error: String },
    TitleChanged { title: String },
    Progress { progress: f32 },
}

/// Receiver of [`EngineEvent`]s; held weakly by the bridge.
pub trait EngineEventSink: Send + Sync {
    fn handle_engine_event(&self, event: EngineEvent);
}
