//! Navigation state machine for one piece of browsable content.

use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use webhost_config::NavigationConfig;

use crate::Size;
use crate::address::{UrlPolicy, normalize_input};
use crate::bridge::EngineBridge;
use crate::compositor::CompositorHandle;
use crate::engine::{EngineEvent, EngineEventSink};
use crate::error::{EmbedError, ErrorKind, Result};
use crate::input::InputEvent;
use crate::runtime::EngineRuntime;

/// Error recorded when a load is stopped before anything committed.
const STOPPED_ERROR: &str = "navigation stopped";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationPhase {
    /// Nothing loaded yet.
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// Everything the query surface reports, copied at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentSnapshot {
    pub phase: NavigationPhase,
    pub url: String,
    pub title: String,
    pub is_loading: bool,
    pub progress: f32,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub last_error: Option<String>,
}

/// Notified after every state change, outside any internal lock.
pub trait ContentObserver: Send + Sync {
    fn content_changed(&self, snapshot: &ContentSnapshot);
}

#[derive(Debug, Clone, Default)]
struct Session {
    phase: NavigationPhase,
    /// Requested URL shown while loading.
    pending_url: Option<String>,
    committed_url: String,
    committed_title: String,
    progress: f32,
    last_error: Option<String>,
    revision: u64,
}

impl Session {
    fn display_url(&self) -> &str {
        match (&self.phase, &self.pending_url) {
            (NavigationPhase::Loading, Some(url)) => url,
            _ => &self.committed_url,
        }
    }

    fn start_loading(&mut self, url: Option<String>) {
        self.phase = NavigationPhase::Loading;
        if url.is_some() {
            self.pending_url = url;
        }
        self.progress = 0.0;
        self.last_error = None;
    }

    fn fail(&mut self, error: String) {
        self.phase = NavigationPhase::Failed;
        self.pending_url = None;
        self.progress = 0.0;
        self.last_error = Some(error);
    }
}

/// State shared with the bridge's event path.
struct ContentShared {
    session: Mutex<Session>,
    observer: Mutex<Option<Arc<dyn ContentObserver>>>,
    bridge: OnceCell<EngineBridge>,
}

impl ContentShared {
    /// Apply `f` and notify the observer. Returns the new revision.
    fn update(&self, f: impl FnOnce(&mut Session)) -> u64 {
        let revision = {
            let mut session = self.session.lock();
            f(&mut session);
            session.revision += 1;
            session.revision
        };
        self.notify();
        revision
    }

    /// Apply `f` only if nothing changed since `revision`.
    fn update_if_unchanged(&self, revision: u64, f: impl FnOnce(&mut Session)) -> bool {
        {
            let mut session = self.session.lock();
            if session.revision != revision {
                return false;
            }
            f(&mut session);
            session.revision += 1;
        }
        self.notify();
        true
    }

    fn snapshot(&self) -> ContentSnapshot {
        let session = self.session.lock().clone();
        let bridge = self.bridge.get();
        ContentSnapshot {
            phase: session.phase,
            url: session.display_url().to_string(),
            title: session.committed_title.clone(),
            is_loading: session.phase == NavigationPhase::Loading,
            progress: session.progress,
            can_go_back: bridge.is_some_and(|b| b.can_go_back()),
            can_go_forward: bridge.is_some_and(|b| b.can_go_forward()),
            last_error: session.last_error,
        }
    }

    fn notify(&self) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer.content_changed(&self.snapshot());
        }
    }
}

impl EngineEventSink for ContentShared {
    fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::NavigationStarted { url } => {
                log::debug!("navigation started: {}", url);
                self.update(|s| s.start_loading(Some(url)));
            }
            EngineEvent::NavigationFinished { url, title } => {
                log::debug!("navigation finished: {}", url);
                self.update(|s| {
                    s.phase = NavigationPhase::Loaded;
                    s.pending_url = None;
                    s.committed_url = url;
                    s.committed_title = title;
                    s.progress = 1.0;
                    s.last_error = None;
                });
            }
            EngineEvent::NavigationFailed { url: _, error } => {
                self.update(|s| s.fail(error));
            }
            EngineEvent::TitleChanged { title } => {
                self.update(|s| s.committed_title = title);
            }
            EngineEvent::Progress { progress } => {
                self.update(|s| {
                    if s.phase == NavigationPhase::Loading {
                        s.progress = progress.clamp(0.0, 1.0);
                    }
                });
            }
        }
    }
}

/// One navigable content session; the object host glue talks to.
///
/// The engine bridge is created on first use and closed synchronously when
/// the content is dropped. Commands return immediately; engine completion
/// moves the phase later, through the bridge's event path.
pub struct ContentState {
    shared: Arc<ContentShared>,
    runtime: Arc<EngineRuntime>,
    navigation: NavigationConfig,
    policy: UrlPolicy,
    size: Mutex<Size>,
}

impl ContentState {
    pub fn new(runtime: Arc<EngineRuntime>, navigation: NavigationConfig) -> Self {
        let engine = runtime.engine_config();
        let size = Size::new(engine.width, engine.height).with_scale(engine.scale_factor);
        Self {
            shared: Arc::new(ContentShared {
                session: Mutex::new(Session::default()),
                observer: Mutex::new(None),
                bridge: OnceCell::new(),
            }),
            policy: UrlPolicy::from_config(&navigation),
            runtime,
            navigation,
            size: Mutex::new(size),
        }
    }

    pub fn set_observer(&self, observer: Arc<dyn ContentObserver>) {
        *self.shared.observer.lock() = Some(observer);
    }

    pub fn clear_observer(&self) {
        *self.shared.observer.lock() = None;
    }

    /// Navigate to `url`. The URL is shown immediately while the engine resolves it.
    ///
    /// Invalid URLs are rejected before any engine work and leave the state
    /// untouched.
    pub fn load_url(&self, url: &str) -> Result<()> {
        if let Err(e) = self.policy.validate(url) {
            log::warn!("rejected URL: {}", e);
            return Err(e);
        }
        let bridge = self.bridge()?;

        let previous = self.shared.session.lock().clone();
        let revision = self.shared.update(|s| s.start_loading(Some(url.to_string())));

        if let Err(e) = bridge.load_url(url) {
            if e.kind() == ErrorKind::Engine {
                self.shared
                    .update_if_unchanged(revision, |s| s.fail(e.to_string()));
            } else {
                self.shared.update_if_unchanged(revision, |s| {
                    let revision = s.revision;
                    *s = previous;
                    s.revision = revision;
                });
            }
            return Err(e);
        }
        Ok(())
    }

    /// Normalize address-bar text (bare hosts, search terms) and load it.
    pub fn load_input(&self, text: &str) -> Result<()> {
        match normalize_input(text, &self.navigation.search_url) {
            Some(url) => self.load_url(&url),
            None => Err(EmbedError::MalformedUrl("empty input".into())),
        }
    }

    pub fn load_homepage(&self) -> Result<()> {
        let homepage = self.navigation.homepage.clone();
        self.load_url(&homepage)
    }

    /// Returns whether the engine accepted the request.
    pub fn go_back(&self) -> Result<bool> {
        self.navigate(|bridge| {
            if !bridge.can_go_back() {
                return Ok(false);
            }
            bridge.go_back()
        })
    }

    /// Returns whether the engine accepted the request.
    pub fn go_forward(&self) -> Result<bool> {
        self.navigate(|bridge| {
            if !bridge.can_go_forward() {
                return Ok(false);
            }
            bridge.go_forward()
        })
    }

    /// Returns whether the engine accepted the request.
    pub fn reload(&self) -> Result<bool> {
        self.navigate(|bridge| bridge.reload())
    }

    /// Run a history command; enter `Loading` if the engine accepted it and
    /// no engine event has already moved the state.
    fn navigate(&self, command: impl FnOnce(&EngineBridge) -> Result<bool>) -> Result<bool> {
        let Some(bridge) = self.shared.bridge.get() else {
            return Ok(false);
        };
        let revision = self.shared.session.lock().revision;
        let accepted = command(bridge)?;
        if accepted {
            self.shared
                .update_if_unchanged(revision, |s| s.start_loading(None));
        }
        Ok(accepted)
    }

    /// Stop a load in flight.
    ///
    /// Ends in `Loaded` when the engine still shows a committed document,
    /// `Failed` otherwise; never back in `Idle`.
    pub fn stop(&self) {
        let Some(bridge) = self.shared.bridge.get() else {
            return;
        };
        bridge.stop();
        if self.shared.session.lock().phase != NavigationPhase::Loading {
            return;
        }

        let engine = bridge.engine_snapshot();
        self.shared.update(|s| {
            if s.phase != NavigationPhase::Loading {
                return;
            }
            if !engine.is_loading && !engine.url.is_empty() {
                s.phase = NavigationPhase::Loaded;
                s.pending_url = None;
                s.committed_url = engine.url;
                s.committed_title = engine.title;
                s.progress = 1.0;
            } else {
                s.fail(STOPPED_ERROR.to_string());
            }
        });
    }

    /// Record the new size; forwarded to the bridge once it exists.
    pub fn resize(&self, size: Size) {
        if size.is_degenerate() {
            log::warn!(
                "content: ignoring unusable size {}x{} @{}x",
                size.width,
                size.height,
                size.scale_factor
            );
            return;
        }
        *self.size.lock() = size;
        if let Some(bridge) = self.shared.bridge.get() {
            bridge.resize(size);
        }
    }

    pub fn handle_input_event(&self, event: &InputEvent) {
        if let Some(bridge) = self.shared.bridge.get() {
            bridge.handle_input_event(event);
        }
    }

    /// Ask the engine for a frame. A no-op before the bridge exists.
    pub fn paint(&self) -> Result<()> {
        match self.shared.bridge.get() {
            Some(bridge) => bridge.paint(),
            None => Ok(()),
        }
    }

    /// Compositor output of this content's bridge, creating the bridge if needed.
    pub fn compositor_handle(&self) -> Result<CompositorHandle> {
        Ok(self.bridge()?.compositor_handle())
    }

    pub fn phase(&self) -> NavigationPhase {
        self.shared.session.lock().phase
    }

    /// Requested URL while loading, last committed URL otherwise.
    pub fn current_url(&self) -> String {
        self.shared.session.lock().display_url().to_string()
    }

    pub fn title(&self) -> String {
        self.shared.session.lock().committed_title.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == NavigationPhase::Loading
    }

    /// Asks the engine each time.
    pub fn can_go_back(&self) -> bool {
        self.shared.bridge.get().is_some_and(|b| b.can_go_back())
    }

    pub fn can_go_forward(&self) -> bool {
        self.shared.bridge.get().is_some_and(|b| b.can_go_forward())
    }

    pub fn progress(&self) -> f32 {
        self.shared.session.lock().progress
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.session.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> ContentSnapshot {
        self.shared.snapshot()
    }

    /// Whether the engine bridge has been created.
    pub fn has_bridge(&self) -> bool {
        self.shared.bridge.get().is_some()
    }

    pub fn size(&self) -> Size {
        *self.size.lock()
    }

    fn bridge(&self) -> Result<&EngineBridge> {
        self.shared.bridge.get_or_try_init(|| {
            self.runtime.require_ready()?;
            let sink: Weak<ContentShared> = Arc::downgrade(&self.shared);
            let sink: Weak<dyn EngineEventSink> = sink;
            let bridge = EngineBridge::new(self.runtime.clone(), self.policy.clone())
                .with_event_sink(sink);
            bridge.initialize(*self.size.lock())?;
            Ok(bridge)
        })
    }
}

impl Drop for ContentState {
    fn drop(&mut self) {
        self.clear_observer();
        if let Some(bridge) = self.shared.bridge.get() {
            bridge.close();
        }
    }
}

impl std::fmt::Debug for ContentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentState")
            .field("phase", &self.phase())
            .field("url", &self.current_url())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{Completion, ScriptedPlatform};
    use webhost_config::EngineConfig;

    fn content(platform: ScriptedPlatform) -> (Arc<ScriptedPlatform>, ContentState) {
        let platform = Arc::new(platform);
        let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
        (platform, ContentState::new(runtime, NavigationConfig::default()))
    }

    #[test]
    fn starts_idle_without_a_bridge() {
        let (platform, content) = content(ScriptedPlatform::new());
        assert_eq!(content.phase(), NavigationPhase::Idle);
        assert_eq!(content.current_url(), "");
        assert!(!content.can_go_back());
        assert!(!content.can_go_forward());
        assert_eq!(content.go_back(), Ok(false));
        content.stop();
        content.resize(Size::new(320, 240));
        assert!(!content.has_bridge());
        assert_eq!(platform.instances_created(), 0);
    }

    #[test]
    fn unusable_resize_keeps_previous_size() {
        let (platform, content) = content(ScriptedPlatform::new());
        content.resize(Size::new(10, 10).with_scale(f32::INFINITY));
        assert_eq!(content.size(), Size::new(1280, 720));

        content.load_url("https://a.example/").unwrap();
        content.resize(Size::new(10, 10).with_scale(f32::NAN));
        assert!(content.paint().is_ok());
        assert_eq!(platform.last_instance().unwrap().size(), Size::new(1280, 720));
    }

    #[test]
    fn optimistic_url_then_redirect() {
        let (platform, content) = content(ScriptedPlatform::new());
        content.load_url("http://example.com/").unwrap();
        assert_eq!(content.phase(), NavigationPhase::Loading);
        assert_eq!(content.current_url(), "http://example.com/");

        let instance = platform.last_instance().unwrap();
        instance.set_redirect("http://example.com/", "https://www.example.com/");
        instance.set_title("https://www.example.com/", "Example Domain");
        instance.complete_pending();

        assert_eq!(content.phase(), NavigationPhase::Loaded);
        assert_eq!(content.current_url(), "https://www.example.com/");
        assert_eq!(content.title(), "Example Domain");
        assert_eq!(content.progress(), 1.0);
    }

    #[test]
    fn failure_keeps_last_committed_page() {
        let (platform, content) = content(ScriptedPlatform::new());
        content.load_url("https://a.example/").unwrap();
        let instance = platform.last_instance().unwrap();
        instance.set_title("https://a.example/", "A");
        instance.complete_pending();

        content.load_url("https://broken.example/").unwrap();
        assert_eq!(content.current_url(), "https://broken.example/");
        instance.fail_pending("net::ERR_CONNECTION_REFUSED");

        assert_eq!(content.phase(), NavigationPhase::Failed);
        assert_eq!(content.current_url(), "https://a.example/");
        assert_eq!(content.title(), "A");
        assert_eq!(content.last_error().as_deref(), Some("net::ERR_CONNECTION_REFUSED"));
    }

    #[test]
    fn rejected_url_leaves_state_unchanged() {
        let (platform, content) = content(ScriptedPlatform::new().with_completion(Completion::Immediate));
        content.load_url("https://a.example/").unwrap();
        let before = content.snapshot();

        assert!(content.load_url("ftp://files.example/").is_err());
        assert!(content.load_url("").is_err());
        assert_eq!(content.snapshot(), before);
        assert_eq!(platform.last_instance().unwrap().load_requests().len(), 1);
    }

    #[test]
    fn stop_with_committed_page_is_loaded() {
        let (platform, content) = content(ScriptedPlatform::new());
        content.load_url("https://a.example/").unwrap();
        let instance = platform.last_instance().unwrap();
        instance.complete_pending();

        content.load_url("https://slow.example/").unwrap();
        content.stop();
        assert_eq!(content.phase(), NavigationPhase::Loaded);
        assert_eq!(content.current_url(), "https://a.example/");
        assert_eq!(instance.stop_count(), 1);
    }

    #[test]
    fn stop_before_first_commit_is_failed() {
        let (_platform, content) = content(ScriptedPlatform::new());
        content.load_url("https://slow.example/").unwrap();
        content.stop();
        assert_eq!(content.phase(), NavigationPhase::Failed);
        assert_eq!(content.last_error().as_deref(), Some(STOPPED_ERROR));
        assert_eq!(content.current_url(), "");
    }

    #[test]
    fn page_initiated_navigation_enters_loading() {
        let (platform, content) = content(ScriptedPlatform::new());
        content.load_url("https://a.example/").unwrap();
        let instance = platform.last_instance().unwrap();
        instance.complete_pending();

        instance.navigate_from_page("https://a.example/next");
        assert_eq!(content.phase(), NavigationPhase::Loading);
        assert_eq!(content.current_url(), "https://a.example/next");
        instance.complete_pending();
        assert!(content.can_go_back());
    }

    #[test]
    fn title_and_progress_do_not_change_phase() {
        let (platform, content) = content(ScriptedPlatform::new());
        content.load_url("https://a.example/").unwrap();
        let instance = platform.last_instance().unwrap();
        instance.report_progress(0.5);
        assert_eq!(content.progress(), 0.5);
        assert_eq!(content.phase(), NavigationPhase::Loading);

        instance.complete_pending();
        instance.change_title("Renamed");
        assert_eq!(content.title(), "Renamed");
        assert_eq!(content.phase(), NavigationPhase::Loaded);
    }

    #[test]
    fn load_input_normalizes_text() {
        let (platform, content) = content(ScriptedPlatform::new());
        content.load_input("example.org").unwrap();
        content.load_input("rust lang").unwrap();
        assert!(content.load_input("   ").is_err());
        content.load_homepage().unwrap();

        assert_eq!(
            platform.last_instance().unwrap().load_requests(),
            vec![
                "https://example.org".to_string(),
                "https://www.google.com/search?q=rust%20lang".to_string(),
                "https://www.google.com".to_string(),
            ]
        );
    }

    #[test]
    fn observer_sees_every_transition() {
        #[derive(Default)]
        struct Phases(Mutex<Vec<NavigationPhase>>);
        impl ContentObserver for Phases {
            fn content_changed(&self, snapshot: &ContentSnapshot) {
                self.0.lock().push(snapshot.phase);
            }
        }

        let (platform, content) = content(ScriptedPlatform::new());
        let observer = Arc::new(Phases::default());
        content.set_observer(observer.clone());
        content.load_url("https://a.example/").unwrap();
        platform.last_instance().unwrap().complete_pending();

        let phases = observer.0.lock().clone();
        assert_eq!(phases.first(), Some(&NavigationPhase::Loading));
        assert_eq!(phases.last(), Some(&NavigationPhase::Loaded));
    }

    #[test]
    fn failed_runtime_refuses_loads() {
        let (_platform, content) = content(ScriptedPlatform::new().failing_init("no GPU process"));
        let err = content.load_url("https://a.example/").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(content.phase(), NavigationPhase::Idle);
        assert!(!content.has_bridge());
    }
}
