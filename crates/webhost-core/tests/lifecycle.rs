use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use webhost_config::{EngineConfig, NavigationConfig};
use webhost_core::scripted::ScriptedPlatform;
use webhost_core::{
    BridgeState, ContentObserver, ContentSnapshot, ContentState, EngineBridge, EngineRuntime,
    RuntimeState, Size, UrlPolicy,
};

#[derive(Default)]
struct CountingObserver(AtomicUsize);

impl ContentObserver for CountingObserver {
    fn content_changed(&self, _snapshot: &ContentSnapshot) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn concurrent_runtime_initialization_runs_once() {
    let platform = Arc::new(ScriptedPlatform::new().with_init_delay(Duration::from_millis(25)));
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
    let callers = 16;
    let barrier = Arc::new(Barrier::new(callers));

    let outcomes: Vec<RuntimeState> = (0..callers)
        .map(|_| {
            let runtime = runtime.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                runtime.ensure_initialized()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().expect("caller panicked"))
        .collect();

    assert_eq!(platform.initialize_count(), 1);
    assert!(outcomes.iter().all(|state| *state == RuntimeState::Ready));
    assert_eq!(runtime.state(), RuntimeState::Ready);
}

#[test]
fn bridges_from_many_threads_share_one_runtime() {
    let platform = Arc::new(ScriptedPlatform::new().with_init_delay(Duration::from_millis(10)));
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let runtime = runtime.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let bridge = EngineBridge::new(runtime, UrlPolicy::default());
                bridge.initialize(Size::new(64, 64)).is_ok()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("caller panicked"));
    }
    assert_eq!(platform.initialize_count(), 1);
    assert_eq!(platform.instances_created(), 4);
}

#[test]
fn callback_after_destruction_is_ignored() -> Result<()> {
    let platform = Arc::new(ScriptedPlatform::new());
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
    let observer = Arc::new(CountingObserver::default());

    let content = ContentState::new(runtime, NavigationConfig::default());
    content.set_observer(observer.clone());
    content.load_url("https://slow.example/")?;
    let handle = content.compositor_handle()?;
    let instance = platform.last_instance().expect("instance");
    let notifications = observer.0.load(Ordering::SeqCst);

    drop(content);
    assert!(instance.is_closed());
    assert!(!handle.is_live());

    // Callbacks the engine had already queued before teardown.
    let client = instance.client();
    client.on_navigation_started("https://slow.example/");
    client.on_progress(0.7);
    client.on_navigation_finished("https://slow.example/", "Slow");
    client.on_title_changed("Slow");
    client.on_navigation_failed("https://slow.example/", "aborted");
    client.on_paint(webhost_core::FrameBuffer::solid(8, 8, [0; 4]));
    instance.complete_pending();

    assert_eq!(observer.0.load(Ordering::SeqCst), notifications);
    assert!(handle.take_frame().is_none());
    Ok(())
}

#[test]
fn destruction_stops_and_releases_engine_once() -> Result<()> {
    let platform = Arc::new(ScriptedPlatform::new());
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
    let content = ContentState::new(runtime, NavigationConfig::default());
    content.load_url("https://a.example/")?;
    let instance = platform.last_instance().expect("instance");

    drop(content);
    assert!(instance.is_closed());
    assert_eq!(instance.stop_count(), 1);
    assert!(!instance.has_pending());
    Ok(())
}

#[test]
fn resize_before_initialize_is_reflected_by_initialize() {
    let platform = Arc::new(ScriptedPlatform::new());
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
    let bridge = EngineBridge::new(runtime, UrlPolicy::default());

    bridge.resize(Size::new(200, 100));
    bridge.resize(Size::new(0, 100));
    bridge.resize(Size::new(1280, 800).with_scale(2.0));
    assert_eq!(bridge.state(), BridgeState::Uninitialized);
    assert_eq!(platform.instances_created(), 0);

    bridge
        .initialize(Size::new(640, 480))
        .expect("initialize after queued resize");
    let instance = platform.last_instance().expect("instance");
    assert_eq!(instance.size(), Size::new(1280, 800).with_scale(2.0));
}

#[test]
fn content_resize_before_first_load_sizes_the_engine() -> Result<()> {
    let platform = Arc::new(ScriptedPlatform::new());
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
    let content = ContentState::new(runtime, NavigationConfig::default());

    content.resize(Size::new(900, 700));
    content.load_url("https://a.example/")?;
    assert_eq!(platform.last_instance().expect("instance").size(), Size::new(900, 700));
    Ok(())
}

#[test]
fn concurrent_resizes_settle_on_latest_request() {
    let platform = Arc::new(ScriptedPlatform::new());
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
    let bridge = Arc::new(EngineBridge::new(runtime, UrlPolicy::default()));
    bridge.initialize(Size::new(100, 100)).expect("initialize");

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads as u32)
        .map(|t| {
            let bridge = bridge.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 1..=50 {
                    bridge.resize(Size::new(100 + t * 100 + i, 100 + i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("resizer panicked");
    }

    bridge.resize(Size::new(1920, 1080));
    let instance = platform.last_instance().expect("instance");
    assert_eq!(instance.size(), Size::new(1920, 1080));
    assert_eq!(bridge.size(), Size::new(1920, 1080));
}

#[test]
fn failed_runtime_blocks_every_content() {
    let platform = Arc::new(ScriptedPlatform::new().failing_init("resources missing"));
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());

    for _ in 0..3 {
        let content = ContentState::new(runtime.clone(), NavigationConfig::default());
        let err = content.load_url("https://a.example/").unwrap_err();
        assert!(err.is_fatal());
    }
    assert_eq!(platform.initialize_count(), 1);
    assert_eq!(runtime.state(), RuntimeState::Failed);
    assert_eq!(platform.instances_created(), 0);
}
