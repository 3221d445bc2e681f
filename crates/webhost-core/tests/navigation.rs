use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use webhost_config::{EngineConfig, NavigationConfig};
use webhost_core::scripted::{Completion, ScriptedPlatform};
use webhost_core::{ContentState, EmbedError, EngineRuntime, NavigationPhase};

fn content_with(completion: Completion) -> (Arc<ScriptedPlatform>, ContentState) {
    let platform = Arc::new(ScriptedPlatform::new().with_completion(completion));
    let runtime = EngineRuntime::new(platform.clone(), EngineConfig::default());
    (platform, ContentState::new(runtime, NavigationConfig::default()))
}

#[test]
fn fresh_content_reports_nothing() {
    let (_platform, content) = content_with(Completion::Immediate);
    assert!(!content.can_go_back());
    assert!(!content.can_go_forward());
    assert_eq!(content.current_url(), "");
    assert_eq!(content.title(), "");
    assert!(!content.is_loading());
}

#[test]
fn back_after_two_loads_restores_first_page() -> Result<()> {
    let (platform, content) = content_with(Completion::Manual);

    content.load_url("https://a.example/")?;
    let instance = platform.last_instance().expect("instance created on first load");
    instance.set_title("https://a.example/", "Page A");
    instance.set_title("https://b.example/", "Page B");
    instance.complete_pending();
    assert!(!content.can_go_back());

    content.load_url("https://b.example/")?;
    instance.complete_pending();
    assert!(content.can_go_back());
    assert!(!content.can_go_forward());

    assert!(content.go_back()?);
    assert_eq!(content.phase(), NavigationPhase::Loading);
    instance.complete_pending();

    assert_eq!(content.phase(), NavigationPhase::Loaded);
    assert_eq!(content.current_url(), "https://a.example/");
    assert_eq!(content.title(), "Page A");
    assert!(!content.can_go_back());
    assert!(content.can_go_forward());

    assert!(content.go_forward()?);
    instance.complete_pending();
    assert_eq!(content.current_url(), "https://b.example/");
    Ok(())
}

#[test]
fn back_at_start_of_history_stays_put() -> Result<()> {
    let (_platform, content) = content_with(Completion::Immediate);
    content.load_url("https://a.example/")?;
    let before = content.snapshot();

    assert!(!content.go_back()?);
    assert!(!content.go_forward()?);
    assert_eq!(content.snapshot(), before);
    Ok(())
}

#[test]
fn oversized_url_never_reaches_engine() -> Result<()> {
    let (platform, content) = content_with(Completion::Immediate);
    content.load_url("https://a.example/")?;
    let before = content.snapshot();

    let max = NavigationConfig::default().max_url_length;
    let url = format!("https://a.example/?q={}", "x".repeat(max));
    let err = content.load_url(&url).unwrap_err();
    assert_eq!(err, EmbedError::UrlTooLong { len: url.len(), max });

    assert_eq!(content.snapshot(), before);
    let requests = platform.last_instance().expect("instance").load_requests();
    assert_eq!(requests, vec!["https://a.example/".to_string()]);
    Ok(())
}

#[test]
fn oversized_first_url_does_not_create_engine() {
    let (platform, content) = content_with(Completion::Immediate);
    let url = format!("https://a.example/{}", "x".repeat(5000));
    assert!(content.load_url(&url).is_err());
    assert!(!content.has_bridge());
    assert_eq!(platform.instances_created(), 0);
    assert_eq!(content.phase(), NavigationPhase::Idle);
}

#[test]
fn reload_reenters_loading() -> Result<()> {
    let (platform, content) = content_with(Completion::Manual);
    content.load_url("https://a.example/")?;
    let instance = platform.last_instance().expect("instance");
    instance.complete_pending();

    assert!(content.reload()?);
    assert!(content.is_loading());
    assert_eq!(content.current_url(), "https://a.example/");
    instance.complete_pending();
    assert_eq!(content.phase(), NavigationPhase::Loaded);
    Ok(())
}

#[test]
fn delayed_engine_completes_in_background() -> Result<()> {
    let (_platform, content) = content_with(Completion::Delayed(Duration::from_millis(10)));
    content.load_url("https://a.example/")?;
    assert!(content.is_loading());

    let deadline = Instant::now() + Duration::from_secs(5);
    while content.is_loading() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(content.phase(), NavigationPhase::Loaded);
    assert_eq!(content.current_url(), "https://a.example/");
    Ok(())
}
