//! In-process engine driven by the host or a test.
//!
//! [`ScriptedPlatform`] implements the engine capability without a real
//! renderer: navigations are kept in a linear history, completion is either
//! triggered by the caller or scheduled automatically, and painting produces
//! solid-color frames at the instance's physical size. Every callback is made
//! without holding the instance lock, like a real engine calling back from
//! its own threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use webhost_config::EngineConfig;

use crate::Size;
use crate::engine::{EngineClient, EngineInstance, EnginePlatform, EngineSnapshot, HistoryState};
use crate::error::{EmbedError, Result};
use crate::frame::FrameBuffer;
use crate::input::InputEvent;

/// User agent reported when the config does not override it.
pub const DEFAULT_USER_AGENT: &str = "webhost-scripted/0.1";

/// When a started navigation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Only when [`ScriptedInstance::complete_pending`] or
    /// [`ScriptedInstance::fail_pending`] is called.
    #[default]
    Manual,
    /// Synchronously, before the command returns.
    Immediate,
    /// On a background thread after the given delay.
    Delayed(Duration),
}

/// Engine platform backed by [`ScriptedInstance`]s.
#[derive(Default)]
pub struct ScriptedPlatform {
    init_failure: Option<String>,
    create_failure: Option<String>,
    init_delay: Option<Duration>,
    completion: Completion,
    init_count: AtomicUsize,
    instances: Mutex<Vec<Arc<ScriptedInstance>>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make platform initialization fail with `message`.
    pub fn failing_init(mut self, message: &str) -> Self {
        self.init_failure = Some(message.to_string());
        self
    }

    /// Make instance creation fail with `message`.
    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_failure = Some(message.to_string());
        self
    }

    /// Sleep during initialization, widening the window for racing callers.
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    /// How many times `initialize` actually ran.
    pub fn initialize_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    pub fn instances_created(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn last_instance(&self) -> Option<Arc<ScriptedInstance>> {
        self.instances.lock().last().cloned()
    }
}

impl EnginePlatform for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted"
    }

    fn initialize(&self, _config: &EngineConfig) -> Result<()> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.init_delay {
            thread::sleep(delay);
        }
        match &self.init_failure {
            Some(message) => Err(EmbedError::Engine(message.clone())),
            None => Ok(()),
        }
    }

    fn create_instance(
        &self,
        size: Size,
        config: &EngineConfig,
        client: Arc<dyn EngineClient>,
    ) -> Result<Arc<dyn EngineInstance>> {
        if let Some(message) = &self.create_failure {
            return Err(EmbedError::Engine(message.clone()));
        }
        let instance = ScriptedInstance::new(size, client, self.completion, config);
        self.instances.lock().push(instance.clone());
        Ok(instance)
    }
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    url: String,
    title: String,
}

#[derive(Debug, Clone)]
enum PendingKind {
    New,
    Traverse(usize),
    Reload,
}

#[derive(Debug, Clone)]
struct Pending {
    url: String,
    kind: PendingKind,
}

#[derive(Default)]
struct InstanceState {
    entries: Vec<HistoryEntry>,
    index: Option<usize>,
    pending: Option<Pending>,
    size: Size,
    redirects: HashMap<String, String>,
    titles: HashMap<String, String>,
    closed: bool,
    load_requests: Vec<String>,
    inputs: Vec<InputEvent>,
    resizes: Vec<Size>,
    stops: usize,
    paints: usize,
}

impl InstanceState {
    fn current(&self) -> Option<&HistoryEntry> {
        self.index.and_then(|i| self.entries.get(i))
    }
}

/// One scripted content instance.
pub struct ScriptedInstance {
    state: Mutex<InstanceState>,
    client: Arc<dyn EngineClient>,
    completion: Completion,
    user_agent: String,
    javascript_enabled: bool,
    this: Weak<ScriptedInstance>,
}

impl ScriptedInstance {
    fn new(
        size: Size,
        client: Arc<dyn EngineClient>,
        completion: Completion,
        config: &EngineConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(InstanceState {
                size,
                ..Default::default()
            }),
            client,
            completion,
            user_agent: config
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            javascript_enabled: config.javascript_enabled,
            this: this.clone(),
        })
    }

    /// User agent this instance sends with its requests.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The client the engine calls back into. Remains usable after close so
    /// tests can deliver callbacks that were already in flight.
    pub fn client(&self) -> Arc<dyn EngineClient> {
        self.client.clone()
    }

    /// Commit the pending navigation. Returns false when nothing is pending.
    pub fn complete_pending(&self) -> bool {
        let (url, title) = {
            let mut state = self.state.lock();
            let Some(pending) = state.pending.take() else {
                return false;
            };
            let url = state
                .redirects
                .get(&pending.url)
                .cloned()
                .unwrap_or(pending.url);
            let title = state.titles.get(&url).cloned().unwrap_or_else(|| url.clone());
            let entry = HistoryEntry {
                url: url.clone(),
                title: title.clone(),
            };

            match pending.kind {
                PendingKind::New => {
                    let keep = state.index.map_or(0, |i| i + 1);
                    state.entries.truncate(keep);
                    state.entries.push(entry);
                    state.index = Some(state.entries.len() - 1);
                }
                PendingKind::Traverse(i) => {
                    if let Some(slot) = state.entries.get_mut(i) {
                        *slot = entry;
                        state.index = Some(i);
                    }
                }
                PendingKind::Reload => {
                    if let Some(i) = state.index {
                        if let Some(slot) = state.entries.get_mut(i) {
                            *slot = entry;
                        }
                    }
                }
            }
            (url, title)
        };

        self.client.on_progress(1.0);
        self.client.on_navigation_finished(&url, &title);
        true
    }

    /// Fail the pending navigation; history is left untouched.
    pub fn fail_pending(&self, error: &str) -> bool {
        let pending = self.state.lock().pending.take();
        match pending {
            Some(pending) => {
                self.client.on_navigation_failed(&pending.url, error);
                true
            }
            None => false,
        }
    }

    pub fn report_progress(&self, progress: f32) {
        self.client.on_progress(progress);
    }

    /// Start a navigation the page initiated itself (link click, script).
    pub fn navigate_from_page(&self, url: &str) {
        self.begin(url.to_string(), PendingKind::New);
    }

    /// Make navigations to `from` commit at `to`.
    pub fn set_redirect(&self, from: &str, to: &str) {
        self.state.lock().redirects.insert(from.to_string(), to.to_string());
    }

    /// Title reported when `url` commits.
    pub fn set_title(&self, url: &str, title: &str) {
        self.state.lock().titles.insert(url.to_string(), title.to_string());
    }

    /// Change the current document's title, as a script would.
    ///
    /// Returns false, changing nothing, when JavaScript is disabled.
    pub fn change_title(&self, title: &str) -> bool {
        if !self.javascript_enabled {
            return false;
        }
        {
            let mut state = self.state.lock();
            if let Some(i) = state.index {
                if let Some(entry) = state.entries.get_mut(i) {
                    entry.title = title.to_string();
                }
            }
        }
        self.client.on_title_changed(title);
        true
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    pub fn load_requests(&self) -> Vec<String> {
        self.state.lock().load_requests.clone()
    }

    pub fn inputs(&self) -> Vec<InputEvent> {
        self.state.lock().inputs.clone()
    }

    pub fn resizes(&self) -> Vec<Size> {
        self.state.lock().resizes.clone()
    }

    pub fn size(&self) -> Size {
        self.state.lock().size
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().stops
    }

    pub fn paint_count(&self) -> usize {
        self.state.lock().paints
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn begin(&self, url: String, kind: PendingKind) {
        self.state.lock().pending = Some(Pending {
            url: url.clone(),
            kind,
        });
        self.client.on_navigation_started(&url);
        self.client.on_progress(0.1);
        self.schedule_completion();
    }

    fn schedule_completion(&self) {
        match self.completion {
            Completion::Manual => {}
            Completion::Immediate => {
                self.complete_pending();
            }
            Completion::Delayed(delay) => {
                let this = self.this.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    if let Some(instance) = this.upgrade() {
                        if !instance.is_closed() {
                            instance.complete_pending();
                        }
                    }
                });
            }
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.state.lock().closed {
            Err(EmbedError::Engine("instance closed".into()))
        } else {
            Ok(())
        }
    }
}

impl EngineInstance for ScriptedInstance {
    fn load_url(&self, url: &str) -> Result<()> {
        self.check_open()?;
        self.state.lock().load_requests.push(url.to_string());
        self.begin(url.to_string(), PendingKind::New);
        Ok(())
    }

    fn resize(&self, size: Size) -> Result<()> {
        self.check_open()?;
        let mut state = self.state.lock();
        state.size = size;
        state.resizes.push(size);
        Ok(())
    }

    fn send_input(&self, event: &InputEvent) {
        self.state.lock().inputs.push(event.clone());
    }

    fn go_back(&self) -> Result<bool> {
        self.check_open()?;
        let target = {
            let state = self.state.lock();
            match state.index {
                Some(i) if i > 0 => state.entries.get(i - 1).map(|e| (i - 1, e.url.clone())),
                _ => None,
            }
        };
        match target {
            Some((i, url)) => {
                self.begin(url, PendingKind::Traverse(i));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn go_forward(&self) -> Result<bool> {
        self.check_open()?;
        let target = {
            let state = self.state.lock();
            state
                .index
                .and_then(|i| state.entries.get(i + 1).map(|e| (i + 1, e.url.clone())))
        };
        match target {
            Some((i, url)) => {
                self.begin(url, PendingKind::Traverse(i));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn reload(&self) -> Result<bool> {
        self.check_open()?;
        let url = self.state.lock().current().map(|e| e.url.clone());
        match url {
            Some(url) => {
                self.begin(url, PendingKind::Reload);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.pending = None;
        state.stops += 1;
    }

    fn history(&self) -> HistoryState {
        let state = self.state.lock();
        match state.index {
            Some(i) => HistoryState {
                can_go_back: i > 0,
                can_go_forward: i + 1 < state.entries.len(),
            },
            None => HistoryState::default(),
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        let state = self.state.lock();
        let (url, title) = state
            .current()
            .map(|e| (e.url.clone(), e.title.clone()))
            .unwrap_or_default();
        EngineSnapshot {
            url,
            title,
            is_loading: state.pending.is_some(),
        }
    }

    fn paint(&self) -> Result<()> {
        let (width, height) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(EmbedError::Engine("instance closed".into()));
            }
            state.paints += 1;
            state.size.physical()
        };
        self.client.on_paint(FrameBuffer::solid(width, height, [0xff, 0xff, 0xff, 0xff]));
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending = None;
    }
}
