//! Owner of one engine content instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::Size;
use crate::address::UrlPolicy;
use crate::compositor::{CompositorHandle, CompositorOutput};
use crate::engine::{EngineClient, EngineEvent, EngineEventSink, EngineInstance, EngineSnapshot};
use crate::error::{EmbedError, Result};
use crate::frame::FrameBuffer;
use crate::input::InputEvent;
use crate::liveness::{Liveness, LivenessToken};
use crate::runtime::EngineRuntime;

/// Lifecycle of an [`EngineBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Ready,
    /// Initialization failed; build a new bridge.
    Failed,
    Closed,
}

/// Flags shared with the engine client.
#[derive(Debug, Default)]
struct BridgeFlags {
    load_pending: AtomicBool,
    navigated: AtomicBool,
}

/// Drives one engine instance and exposes its state and compositor output.
///
/// Commands never block on engine completion. Completion arrives through the
/// bridge's [`EngineClient`], which is guarded by a liveness token so late
/// callbacks after [`close`](Self::close) are ignored.
pub struct EngineBridge {
    runtime: Arc<EngineRuntime>,
    policy: UrlPolicy,
    state: Mutex<BridgeState>,
    instance: Mutex<Option<Arc<dyn EngineInstance>>>,
    flags: Arc<BridgeFlags>,
    output: Arc<CompositorOutput>,
    liveness: Liveness,
    requested_size: Mutex<Option<Size>>,
    applied_size: Mutex<Size>,
    resizing: AtomicBool,
    sink: Option<Weak<dyn EngineEventSink>>,
}

impl EngineBridge {
    pub fn new(runtime: Arc<EngineRuntime>, policy: UrlPolicy) -> Self {
        Self {
            runtime,
            policy,
            state: Mutex::new(BridgeState::Uninitialized),
            instance: Mutex::new(None),
            flags: Arc::new(BridgeFlags::default()),
            output: Arc::new(CompositorOutput::new()),
            liveness: Liveness::new(),
            requested_size: Mutex::new(None),
            applied_size: Mutex::new(Size::default()),
            resizing: AtomicBool::new(false),
            sink: None,
        }
    }

    /// Forward navigation events to `sink` while it is alive.
    pub fn with_event_sink(mut self, sink: Weak<dyn EngineEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Allocate the engine instance.
    ///
    /// A resize requested before this call wins over `size`. Any failure is
    /// terminal for this bridge.
    pub fn initialize(&self, size: Size) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            BridgeState::Uninitialized => {}
            BridgeState::Ready => return Err(EmbedError::AlreadyInitialized),
            BridgeState::Failed | BridgeState::Closed => return Err(EmbedError::Closed),
        }

        let size = self.requested_size.lock().take().unwrap_or(size);
        if size.is_degenerate() {
            log::warn!("bridge: refusing degenerate size {}x{}", size.width, size.height);
            *state = BridgeState::Failed;
            return Err(EmbedError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }

        if let Err(e) = self.runtime.require_ready() {
            *state = BridgeState::Failed;
            return Err(e);
        }

        let client: Arc<dyn EngineClient> = Arc::new(BridgeClient {
            token: self.liveness.token(),
            flags: self.flags.clone(),
            output: Arc::downgrade(&self.output),
            sink: self.sink.clone(),
        });

        let (width, height) = size.physical();
        self.output.set_expected_size(width, height);

        let instance = match self.runtime.platform().create_instance(
            size,
            self.runtime.engine_config(),
            client,
        ) {
            Ok(instance) => instance,
            Err(e) => {
                log::warn!("bridge: engine instance creation failed: {}", e);
                *state = BridgeState::Failed;
                return Err(e);
            }
        };

        *self.applied_size.lock() = size;
        *self.instance.lock() = Some(instance);
        *state = BridgeState::Ready;
        log::info!(
            "bridge created {}x{} @{}x",
            size.width,
            size.height,
            size.scale_factor
        );
        Ok(())
    }

    pub fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    /// Validate `url` and hand it to the engine.
    pub fn load_url(&self, url: &str) -> Result<()> {
        let instance = self.ready_instance()?;
        if let Err(e) = self.policy.validate(url) {
            log::warn!("bridge: rejected URL: {}", e);
            return Err(e);
        }

        log::debug!("bridge: load {}", url);
        self.flags.load_pending.store(true, Ordering::Release);
        self.flags.navigated.store(true, Ordering::Release);
        if let Err(e) = instance.load_url(url) {
            log::warn!("bridge: engine refused {}: {}", url, e);
            self.flags.load_pending.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Request a new logical size.
    ///
    /// Before initialization the latest request is kept for `initialize`.
    /// Afterwards concurrent calls are coalesced: one caller at a time applies
    /// sizes to the engine until the most recent request has been applied.
    pub fn resize(&self, size: Size) {
        if size.is_degenerate() {
            log::debug!("bridge: ignoring degenerate resize {}x{}", size.width, size.height);
            return;
        }

        {
            let state = self.state.lock();
            *self.requested_size.lock() = Some(size);
            if *state != BridgeState::Ready {
                log::debug!("bridge: queued resize {}x{}", size.width, size.height);
                return;
            }
        }

        self.apply_requested_sizes();
    }

    fn apply_requested_sizes(&self) {
        loop {
            if self.resizing.swap(true, Ordering::AcqRel) {
                // The caller currently applying will pick our request up.
                return;
            }

            loop {
                let next = self.requested_size.lock().take();
                let Some(size) = next else {
                    break;
                };
                let Some(instance) = self.instance() else {
                    break;
                };
                let previous = *self.applied_size.lock();
                if previous == size {
                    continue;
                }

                let (width, height) = size.physical();
                self.output.set_expected_size(width, height);
                match instance.resize(size) {
                    Ok(()) => {
                        log::debug!("bridge: resized to {}x{}", size.width, size.height);
                        *self.applied_size.lock() = size;
                    }
                    Err(e) => {
                        log::warn!("bridge: resize to {}x{} failed: {}", size.width, size.height, e);
                        let (width, height) = previous.physical();
                        self.output.set_expected_size(width, height);
                    }
                }
            }

            self.resizing.store(false, Ordering::Release);
            if self.requested_size.lock().is_none() || self.instance().is_none() {
                return;
            }
        }
    }

    /// Forward input, scaled to device pixels. Ignored before initialization.
    pub fn handle_input_event(&self, event: &InputEvent) {
        let Some(instance) = self.instance() else {
            return;
        };
        let scale = self.applied_size.lock().scale_factor;
        instance.send_input(&event.to_device(scale));
    }

    /// Go back one history entry. `Ok(false)` when there is none.
    pub fn go_back(&self) -> Result<bool> {
        let instance = self.ready_instance()?;
        if !instance.history().can_go_back {
            return Ok(false);
        }
        self.run_navigation(|| instance.go_back())
    }

    /// Go forward one history entry. `Ok(false)` when there is none.
    pub fn go_forward(&self) -> Result<bool> {
        let instance = self.ready_instance()?;
        if !instance.history().can_go_forward {
            return Ok(false);
        }
        self.run_navigation(|| instance.go_forward())
    }

    pub fn reload(&self) -> Result<bool> {
        let instance = self.ready_instance()?;
        self.run_navigation(|| instance.reload())
    }

    fn run_navigation(&self, navigate: impl FnOnce() -> Result<bool>) -> Result<bool> {
        self.flags.load_pending.store(true, Ordering::Release);
        match navigate() {
            Ok(true) => Ok(true),
            other => {
                self.flags.load_pending.store(false, Ordering::Release);
                other
            }
        }
    }

    pub fn stop(&self) {
        if let Some(instance) = self.instance() {
            instance.stop();
            self.flags.load_pending.store(false, Ordering::Release);
        }
    }

    /// URL the engine currently shows; empty before the first navigation.
    pub fn current_url(&self) -> String {
        self.engine_snapshot().url
    }

    pub fn title(&self) -> String {
        self.engine_snapshot().title
    }

    /// True from a load request until the engine reports completion or failure.
    pub fn is_load_pending(&self) -> bool {
        self.flags.load_pending.load(Ordering::Acquire)
    }

    /// Live engine history; never cached.
    pub fn can_go_back(&self) -> bool {
        self.navigated_instance()
            .is_some_and(|instance| instance.history().can_go_back)
    }

    pub fn can_go_forward(&self) -> bool {
        self.navigated_instance()
            .is_some_and(|instance| instance.history().can_go_forward)
    }

    /// Engine-reported view of the current document.
    pub fn engine_snapshot(&self) -> EngineSnapshot {
        self.navigated_instance()
            .map(|instance| instance.snapshot())
            .unwrap_or_default()
    }

    /// Applied size, or the queued one before initialization.
    pub fn size(&self) -> Size {
        let ready = self.state() == BridgeState::Ready;
        let requested = *self.requested_size.lock();
        match requested {
            Some(requested) if !ready => requested,
            _ => *self.applied_size.lock(),
        }
    }

    /// Handle to this bridge's compositor output. It yields nothing once the
    /// bridge is dropped.
    pub fn compositor_handle(&self) -> CompositorHandle {
        CompositorHandle::new(&self.output)
    }

    /// Ask the engine for a frame now. A no-op before initialization.
    pub fn paint(&self) -> Result<()> {
        match self.instance() {
            Some(instance) => instance.paint(),
            None => Ok(()),
        }
    }

    /// Stop any load, revoke callbacks and release the engine instance. Idempotent.
    pub fn close(&self) {
        let instance = {
            let mut state = self.state.lock();
            if *state == BridgeState::Closed {
                return;
            }
            *state = BridgeState::Closed;
            self.liveness.revoke();
            self.instance.lock().take()
        };

        self.flags.load_pending.store(false, Ordering::Release);
        if let Some(instance) = instance {
            instance.stop();
            instance.close();
            log::info!("bridge closed");
        }
    }

    fn instance(&self) -> Option<Arc<dyn EngineInstance>> {
        self.instance.lock().clone()
    }

    fn navigated_instance(&self) -> Option<Arc<dyn EngineInstance>> {
        if self.flags.navigated.load(Ordering::Acquire) {
            self.instance()
        } else {
            None
        }
    }

    fn ready_instance(&self) -> Result<Arc<dyn EngineInstance>> {
        if let Some(instance) = self.instance() {
            return Ok(instance);
        }
        match self.state() {
            BridgeState::Uninitialized => Err(EmbedError::NotInitialized),
            _ => Err(EmbedError::Closed),
        }
    }
}

impl Drop for EngineBridge {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EngineBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBridge")
            .field("state", &self.state())
            .field("load_pending", &self.is_load_pending())
            .finish()
    }
}

/// Callback receiver handed to the engine.
struct BridgeClient {
    token: LivenessToken,
    flags: Arc<BridgeFlags>,
    output: Weak<CompositorOutput>,
    sink: Option<Weak<dyn EngineEventSink>>,
}

impl BridgeClient {
    fn forward(&self, event: EngineEvent) {
        if let Some(sink) = self.sink.as_ref().and_then(Weak::upgrade) {
            sink.handle_engine_event(event);
        }
    }
}

impl EngineClient for BridgeClient {
    fn on_navigation_started(&self, url: &str) {
        if !self.token.is_alive() {
            return;
        }
        self.flags.load_pending.store(true, Ordering::Release);
        self.flags.navigated.store(true, Ordering::Release);
        self.forward(EngineEvent::NavigationStarted { url: url.to_string() });
    }

    fn on_navigation_finished(&self, url: &str, title: &str) {
        if !self.token.is_alive() {
            return;
        }
        self.flags.load_pending.store(false, Ordering::Release);
        self.forward(EngineEvent::NavigationFinished {
            url: url.to_string(),
            title: title.to_string(),
        });
    }

    fn on_navigation_failed(&self, url: &str, error: &str) {
        if !self.token.is_alive() {
            return;
        }
        log::warn!("navigation to {} failed: {}", url, error);
        self.flags.load_pending.store(false, Ordering::Release);
        self.forward(EngineEvent::NavigationFailed {
            url: url.to_string(),
            error: error.to_string(),
        });
    }

    fn on_title_changed(&self, title: &str) {
        if !self.token.is_alive() {
            return;
        }
        self.forward(EngineEvent::TitleChanged { title: title.to_string() });
    }

    fn on_progress(&self, progress: f32) {
        if !self.token.is_alive() {
            return;
        }
        self.forward(EngineEvent::Progress { progress });
    }

    fn on_paint(&self, frame: FrameBuffer) {
        if !self.token.is_alive() {
            return;
        }
        if let Some(output) = self.output.upgrade() {
            output.publish(frame);
        }
    }
}
