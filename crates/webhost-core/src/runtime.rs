//! Process-wide engine platform initialization.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::OnceCell;
use webhost_config::EngineConfig;

use crate::engine::EnginePlatform;
use crate::error::{EmbedError, Result};

/// Lifecycle of the engine platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl RuntimeState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RuntimeState::Initializing,
            2 => RuntimeState::Ready,
            3 => RuntimeState::Failed,
            _ => RuntimeState::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RuntimeState::Uninitialized => 0,
            RuntimeState::Initializing => 1,
            RuntimeState::Ready => 2,
            RuntimeState::Failed => 3,
        }
    }
}

/// The process slot used by hosts; tests build private runtimes instead.
static PROCESS_RUNTIME: OnceCell<Arc<EngineRuntime>> = OnceCell::new();

/// Explicit context for the engine's one-time platform setup.
///
/// The first [`ensure_initialized`](Self::ensure_initialized) call runs the
/// platform's initialization; concurrent callers block until it finishes and
/// every caller observes the same cached outcome. A failure is permanent.
pub struct EngineRuntime {
    platform: Arc<dyn EnginePlatform>,
    config: EngineConfig,
    state: AtomicU8,
    outcome: OnceCell<std::result::Result<(), String>>,
}

impl EngineRuntime {
    pub fn new(platform: Arc<dyn EnginePlatform>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            platform,
            config,
            state: AtomicU8::new(RuntimeState::Uninitialized.as_u8()),
            outcome: OnceCell::new(),
        })
    }

    /// Install the process-wide runtime. Only the first call installs;
    /// later calls return the runtime already in place.
    pub fn install(platform: Arc<dyn EnginePlatform>, config: EngineConfig) -> Arc<Self> {
        PROCESS_RUNTIME
            .get_or_init(|| Self::new(platform, config))
            .clone()
    }

    pub fn global() -> Option<Arc<Self>> {
        PROCESS_RUNTIME.get().cloned()
    }

    /// Initialize the platform once; a no-op returning the cached outcome afterwards.
    pub fn ensure_initialized(&self) -> RuntimeState {
        let outcome = self.outcome.get_or_init(|| {
            self.state.store(RuntimeState::Initializing.as_u8(), Ordering::Release);
            log::info!("initializing engine platform `{}`", self.platform.name());

            match self.platform.initialize(&self.config) {
                Ok(()) => {
                    self.state.store(RuntimeState::Ready.as_u8(), Ordering::Release);
                    log::info!("engine platform `{}` ready", self.platform.name());
                    Ok(())
                }
                Err(e) => {
                    self.state.store(RuntimeState::Failed.as_u8(), Ordering::Release);
                    log::error!("engine platform `{}` failed: {}", self.platform.name(), e);
                    Err(e.to_string())
                }
            }
        });

        match outcome {
            Ok(()) => RuntimeState::Ready,
            Err(_) => RuntimeState::Failed,
        }
    }

    /// Initialize if needed and turn a failed runtime into a fatal error.
    pub fn require_ready(&self) -> Result<()> {
        match self.ensure_initialized() {
            RuntimeState::Ready => Ok(()),
            _ => Err(EmbedError::RuntimeFailed(
                self.failure().unwrap_or("unknown failure").to_string(),
            )),
        }
    }

    /// Current state without triggering initialization.
    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn failure(&self) -> Option<&str> {
        match self.outcome.get() {
            Some(Err(msg)) => Some(msg.as_str()),
            _ => None,
        }
    }

    pub fn platform(&self) -> &Arc<dyn EnginePlatform> {
        &self.platform
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for EngineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRuntime")
            .field("platform", &self.platform.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedPlatform;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn starts_uninitialized_and_becomes_ready() {
        let platform = Arc::new(ScriptedPlatform::new());
        let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
        assert_eq!(runtime.state(), RuntimeState::Uninitialized);

        assert_eq!(runtime.ensure_initialized(), RuntimeState::Ready);
        assert_eq!(runtime.ensure_initialized(), RuntimeState::Ready);
        assert_eq!(runtime.state(), RuntimeState::Ready);
        assert_eq!(platform.initialize_count(), 1);
        assert!(runtime.require_ready().is_ok());
    }

    #[test]
    fn failure_is_cached_and_fatal() {
        let platform = Arc::new(ScriptedPlatform::new().failing_init("missing resources"));
        let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());

        assert_eq!(runtime.ensure_initialized(), RuntimeState::Failed);
        assert_eq!(runtime.ensure_initialized(), RuntimeState::Failed);
        assert_eq!(platform.initialize_count(), 1);
        assert!(runtime.failure().unwrap().contains("missing resources"));

        let err = runtime.require_ready().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn concurrent_callers_share_one_initialization() {
        let platform = Arc::new(ScriptedPlatform::new().with_init_delay(Duration::from_millis(20)));
        let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runtime = runtime.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    runtime.ensure_initialized()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), RuntimeState::Ready);
        }
        assert_eq!(platform.initialize_count(), 1);
    }

    #[test]
    fn concurrent_callers_share_one_failure() {
        let platform = Arc::new(
            ScriptedPlatform::new()
                .failing_init("gpu process crashed")
                .with_init_delay(Duration::from_millis(10)),
        );
        let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let runtime = runtime.clone();
                thread::spawn(move || runtime.ensure_initialized())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), RuntimeState::Failed);
        }
        assert_eq!(platform.initialize_count(), 1);
    }
}
