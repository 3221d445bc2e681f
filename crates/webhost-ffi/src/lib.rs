//! C ABI for embedding webhost content in native applications.
//!
//! The native side registers its engine platform from Rust glue with
//! [`register_platform`] (or gets the scripted platform), calls
//! `webhost_runtime_init` once, then creates one `WebhostContent` per web view.

pub mod ffi;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use webhost_config::WebhostConfig;
use webhost_core::scripted::{Completion, ScriptedPlatform};
use webhost_core::{ContentState, EnginePlatform, EngineRuntime, RuntimeState, Size};

static PLATFORM: OnceCell<Mutex<Option<Arc<dyn EnginePlatform>>>> = OnceCell::new();
static CONFIG: OnceCell<WebhostConfig> = OnceCell::new();

fn platform_slot() -> &'static Mutex<Option<Arc<dyn EnginePlatform>>> {
    PLATFORM.get_or_init(|| Mutex::new(None))
}

/// Register the engine platform used by `webhost_runtime_init`.
///
/// Has no effect once the runtime is installed.
pub fn register_platform(platform: Arc<dyn EnginePlatform>) {
    let mut slot = platform_slot().lock();
    if EngineRuntime::global().is_some() {
        log::warn!("register_platform: runtime already installed, ignoring `{}`", platform.name());
        return;
    }
    *slot = Some(platform);
}

/// Install the process runtime from `webhost.toml` + environment and initialize it.
///
/// The platform slot stays locked from the installed check through `install`,
/// so concurrent callers all end up with the registered platform.
pub(crate) fn init_runtime() -> RuntimeState {
    let runtime = {
        let mut slot = platform_slot().lock();
        match EngineRuntime::global() {
            Some(runtime) => runtime,
            None => {
                let config = WebhostConfig::load();
                let platform = slot.take().unwrap_or_else(|| {
                    log::warn!("no engine platform registered, using the scripted engine");
                    let fallback: Arc<dyn EnginePlatform> =
                        Arc::new(ScriptedPlatform::new().with_completion(Completion::Immediate));
                    fallback
                });
                let engine = config.engine.clone();
                let _ = CONFIG.set(config);
                EngineRuntime::install(platform, engine)
            }
        }
    };
    runtime.ensure_initialized()
}

/// Configuration loaded by `webhost_runtime_init`, defaults before it.
pub(crate) fn config() -> WebhostConfig {
    CONFIG.get().cloned().unwrap_or_default()
}

/// Opaque content handle handed across the C boundary.
pub struct WebhostContent {
    content: ContentState,
}

impl WebhostContent {
    pub(crate) fn create(size: Size) -> Option<Self> {
        if size.is_degenerate() {
            log::warn!(
                "webhost_content_create: unusable size {}x{} @{}x",
                size.width,
                size.height,
                size.scale_factor
            );
            return None;
        }
        let runtime = EngineRuntime::global()?;
        if runtime.ensure_initialized() != RuntimeState::Ready {
            return None;
        }
        let content = ContentState::new(runtime, config().navigation);
        content.resize(size);
        Some(Self { content })
    }

    pub fn content(&self) -> &ContentState {
        &self.content
    }
}
