use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use webhost_config::WebhostConfig;
use webhost_core::compositor::wgpu_backend::WgpuBackend;
use webhost_core::scripted::{Completion, ScriptedPlatform};
use webhost_core::{
    CompositorSurface, ContentState, EngineRuntime, InputEvent, KeyEvent, KeyEventKind, Modifiers,
    MouseButton, MouseEvent, MouseEventKind, SubmitOutcome, Size,
};
use winit::event::{ElementState, Event, MouseScrollDelta, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{Key, ModifiersState, NamedKey};
use winit::window::WindowBuilder;

const LINE_HEIGHT: f32 = 40.0;

fn modifiers_from(state: ModifiersState) -> Modifiers {
    Modifiers {
        shift: state.shift_key(),
        ctrl: state.control_key(),
        alt: state.alt_key(),
        meta: state.super_key(),
    }
}

fn mouse_button(button: winit::event::MouseButton) -> MouseButton {
    match button {
        winit::event::MouseButton::Left => MouseButton::Left,
        winit::event::MouseButton::Middle => MouseButton::Middle,
        winit::event::MouseButton::Right => MouseButton::Right,
        _ => MouseButton::None,
    }
}

/// Browser shortcuts handled by the host instead of the page.
fn handle_shortcut(content: &ContentState, key: &Key, modifiers: ModifiersState) -> bool {
    let result = match key {
        Key::Named(NamedKey::ArrowLeft) if modifiers.alt_key() => content.go_back(),
        Key::Named(NamedKey::ArrowRight) if modifiers.alt_key() => content.go_forward(),
        Key::Named(NamedKey::F5) => content.reload(),
        Key::Named(NamedKey::Escape) => {
            content.stop();
            Ok(true)
        }
        _ => return false,
    };
    if let Err(e) = result {
        log::warn!("shortcut failed: {}", e);
    }
    true
}

fn main() -> Result<()> {
    let _ = env_logger::try_init();
    let config = WebhostConfig::load();

    let platform = Arc::new(ScriptedPlatform::new().with_completion(Completion::Delayed(
        Duration::from_millis(config.demo.navigation_latency_ms),
    )));
    let runtime = EngineRuntime::install(platform, config.engine.clone());
    let content = ContentState::new(runtime, config.navigation.clone());

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Webhost Demo")
            .build(&event_loop)?,
    );
    let mut size = window.inner_size();

    // Physical pixels throughout; the content runs at scale 1.0.
    content.resize(Size::new(size.width, size.height));

    let backend = WgpuBackend::new(config.compositor.clone());
    let surface = Arc::new(backend.create_surface(window.clone(), size.width, size.height)?);
    let compositor = CompositorSurface::new(backend);
    compositor.initialize(&surface)?;
    compositor.attach(content.compositor_handle()?);
    if let Some(device) = compositor.device() {
        log::info!("presenting on {} ({})", device.name, device.backend);
    }

    let start = match config.demo.url.as_deref() {
        Some(text) => content.load_input(text),
        None => content.load_homepage(),
    };
    if let Err(e) = start {
        log::error!("initial navigation failed: {}", e);
    }

    let mut modifiers = ModifiersState::empty();
    let mut cursor = (0.0f32, 0.0f32);
    let mut shown_title = String::new();

    event_loop.run(move |event, target| match event {
        Event::WindowEvent {
            event: WindowEvent::CloseRequested,
            window_id,
        } if window_id == window.id() => {
            compositor.teardown();
            target.exit();
        }
        Event::WindowEvent {
            event: WindowEvent::Resized(new_size),
            window_id,
        } if window_id == window.id() => {
            size = new_size;
            content.resize(Size::new(size.width, size.height));
            surface.set_size(size.width, size.height);
            compositor.resize(size.width, size.height);
            window.request_redraw();
        }
        Event::WindowEvent {
            event: WindowEvent::RedrawRequested,
            window_id,
        } if window_id == window.id() => {
            if let Err(e) = content.paint() {
                log::debug!("paint skipped: {}", e);
            }
            if let SubmitOutcome::Dropped(reason) = compositor.submit_frame() {
                log::debug!("frame dropped: {:?}", reason);
            }
        }
        Event::WindowEvent {
            event: WindowEvent::ModifiersChanged(new_modifiers),
            ..
        } => {
            modifiers = new_modifiers.state();
        }
        Event::WindowEvent {
            event: WindowEvent::KeyboardInput { event, .. },
            window_id,
        } if window_id == window.id() => {
            if event.state == ElementState::Pressed
                && handle_shortcut(&content, &event.logical_key, modifiers)
            {
                return;
            }
            let kind = match event.state {
                ElementState::Pressed => KeyEventKind::Down,
                ElementState::Released => KeyEventKind::Up,
            };
            let char = match &event.logical_key {
                Key::Character(text) => text.chars().next(),
                _ => None,
            };
            content.handle_input_event(&InputEvent::Key(KeyEvent {
                key_code: 0,
                char,
                kind,
                modifiers: modifiers_from(modifiers),
            }));
        }
        Event::WindowEvent {
            event: WindowEvent::CursorMoved { position, .. },
            window_id,
        } if window_id == window.id() => {
            cursor = (position.x as f32, position.y as f32);
            content.handle_input_event(&InputEvent::Mouse(MouseEvent {
                x: cursor.0,
                y: cursor.1,
                kind: MouseEventKind::Move,
                button: MouseButton::None,
                modifiers: modifiers_from(modifiers),
            }));
        }
        Event::WindowEvent {
            event: WindowEvent::MouseInput { state, button, .. },
            window_id,
        } if window_id == window.id() => {
            let kind = match state {
                ElementState::Pressed => MouseEventKind::Down,
                ElementState::Released => MouseEventKind::Up,
            };
            content.handle_input_event(&InputEvent::Mouse(MouseEvent {
                x: cursor.0,
                y: cursor.1,
                kind,
                button: mouse_button(button),
                modifiers: modifiers_from(modifiers),
            }));
        }
        Event::WindowEvent {
            event: WindowEvent::MouseWheel { delta, .. },
            window_id,
        } if window_id == window.id() => {
            let (delta_x, delta_y) = match delta {
                MouseScrollDelta::LineDelta(x, y) => (x * LINE_HEIGHT, y * LINE_HEIGHT),
                MouseScrollDelta::PixelDelta(pos) => (pos.x as f32, pos.y as f32),
            };
            content.handle_input_event(&InputEvent::Mouse(MouseEvent {
                x: cursor.0,
                y: cursor.1,
                kind: MouseEventKind::Wheel { delta_x, delta_y },
                button: MouseButton::None,
                modifiers: modifiers_from(modifiers),
            }));
        }
        Event::AboutToWait => {
            let title = content.title();
            if title != shown_title {
                window.set_title(if title.is_empty() { "Webhost Demo" } else { &title });
                shown_title = title;
            }
            window.request_redraw();
        }
        _ => {}
    })?;

    Ok(())
}
