//! FFI exports for embedding webhost content in native applications.
//!
//! These functions are exported as C symbols for use from Objective-C/Swift.
//! Commands return `false` on a null handle, invalid UTF-8 or any rejected
//! command; queries on a null handle return `false` or an empty string.

use std::ffi::{CStr, CString, c_char};

use webhost_core::{
    InputEvent, KeyEvent, KeyEventKind, Modifiers, MouseButton, MouseEvent, MouseEventKind,
    RuntimeState, Size,
};

use crate::{WebhostContent, init_runtime};

fn content_ref<'a>(content: *const WebhostContent) -> Option<&'a WebhostContent> {
    // Safety: the host passes a pointer from `webhost_content_create` that has
    // not been destroyed, or null.
    unsafe { content.as_ref() }
}

fn str_arg<'a>(value: *const c_char) -> Option<&'a str> {
    if value.is_null() {
        return None;
    }
    // Safety: non-null strings from the host are NUL-terminated.
    unsafe { CStr::from_ptr(value).to_str().ok() }
}

fn to_c_string(value: &str) -> *mut c_char {
    let sanitized: String = value.chars().filter(|c| *c != '\0').collect();
    match CString::new(sanitized) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Initialize logging, configuration and the engine runtime.
///
/// Safe to call repeatedly; only the first call initializes.
///
/// # Returns
/// `true` when the runtime is ready, `false` if it failed
#[unsafe(no_mangle)]
pub extern "C" fn webhost_runtime_init() -> bool {
    // Initialize logging (ignore errors if already initialized)
    let _ = env_logger::try_init();

    let state = init_runtime();
    log::info!("webhost_runtime_init: {:?}", state);
    state == RuntimeState::Ready
}

/// Create a content handle.
///
/// # Arguments
/// * `width` - Logical width
/// * `height` - Logical height
/// * `scale` - Device scale factor (e.g., 2.0 for Retina)
///
/// # Returns
/// A handle to release with `webhost_content_destroy`, or null when the
/// runtime is not ready or the size is unusable
#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_create(width: u32, height: u32, scale: f32) -> *mut WebhostContent {
    let size = Size::new(width, height).with_scale(scale);
    match WebhostContent::create(size) {
        Some(content) => Box::into_raw(Box::new(content)),
        None => {
            log::error!("webhost_content_create: no content created");
            std::ptr::null_mut()
        }
    }
}

/// Destroy a content handle, stopping any load and releasing the engine.
#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_destroy(content: *mut WebhostContent) {
    if content.is_null() {
        return;
    }
    // Safety: the pointer came from `webhost_content_create` and is destroyed once.
    drop(unsafe { Box::from_raw(content) });
}

#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_load_url(content: *const WebhostContent, url: *const c_char) -> bool {
    let (Some(content), Some(url)) = (content_ref(content), str_arg(url)) else {
        return false;
    };
    match content.content().load_url(url) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("webhost_content_load_url: {}", e);
            false
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_go_back(content: *const WebhostContent) -> bool {
    content_ref(content).is_some_and(|c| c.content().go_back().unwrap_or(false))
}

#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_go_forward(content: *const WebhostContent) -> bool {
    content_ref(content).is_some_and(|c| c.content().go_forward().unwrap_or(false))
}

#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_reload(content: *const WebhostContent) -> bool {
    content_ref(content).is_some_and(|c| c.content().reload().unwrap_or(false))
}

#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_stop(content: *const WebhostContent) {
    if let Some(content) = content_ref(content) {
        content.content().stop();
    }
}

/// Resize the viewport.
///
/// # Arguments
/// * `width` - New logical width
/// * `height` - New logical height
/// * `scale` - Device scale factor
#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_resize(
    content: *const WebhostContent,
    width: u32,
    height: u32,
    scale: f32,
) -> bool {
    log::debug!("webhost_content_resize: width={} height={} scale={}", width, height, scale);
    let Some(content) = content_ref(content) else {
        return false;
    };
    let size = Size::new(width, height).with_scale(scale);
    if size.is_degenerate() {
        return false;
    }
    content.content().resize(size);
    true
}

/// Forward a mouse event.
///
/// # Arguments
/// * `x`, `y` - Position in logical pixels
/// * `kind` - 0 move, 1 down, 2 up, 3 wheel
/// * `button` - 0 none, 1 left, 2 middle, 3 right
/// * `delta_x`, `delta_y` - Wheel deltas (ignored unless `kind` is 3)
/// * `modifiers` - Bit set: 1 shift, 2 ctrl, 4 alt, 8 meta
#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_mouse_event(
    content: *const WebhostContent,
    x: f32,
    y: f32,
    kind: i32,
    button: i32,
    delta_x: f32,
    delta_y: f32,
    modifiers: u32,
) -> bool {
    let Some(content) = content_ref(content) else {
        return false;
    };
    let kind = match kind {
        0 => MouseEventKind::Move,
        1 => MouseEventKind::Down,
        2 => MouseEventKind::Up,
        3 => MouseEventKind::Wheel { delta_x, delta_y },
        _ => return false,
    };
    let button = match button {
        1 => MouseButton::Left,
        2 => MouseButton::Middle,
        3 => MouseButton::Right,
        _ => MouseButton::None,
    };
    content.content().handle_input_event(&InputEvent::Mouse(MouseEvent {
        x,
        y,
        kind,
        button,
        modifiers: Modifiers::from_bits(modifiers),
    }));
    true
}

/// Forward a key event.
///
/// # Arguments
/// * `key_code` - Platform virtual key code
/// * `character` - Unicode scalar produced by the key, 0 for none
/// * `kind` - 0 down, 1 up, 2 char
/// * `modifiers` - Bit set: 1 shift, 2 ctrl, 4 alt, 8 meta
#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_key_event(
    content: *const WebhostContent,
    key_code: u32,
    character: u32,
    kind: i32,
    modifiers: u32,
) -> bool {
    let Some(content) = content_ref(content) else {
        return false;
    };
    let kind = match kind {
        0 => KeyEventKind::Down,
        1 => KeyEventKind::Up,
        2 => KeyEventKind::Char,
        _ => return false,
    };
    content.content().handle_input_event(&InputEvent::Key(KeyEvent {
        key_code,
        char: if character == 0 { None } else { char::from_u32(character) },
        kind,
        modifiers: Modifiers::from_bits(modifiers),
    }));
    true
}

/// Ask the engine for a new frame.
#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_paint(content: *const WebhostContent) -> bool {
    content_ref(content).is_some_and(|c| c.content().paint().is_ok())
}

#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_is_loading(content: *const WebhostContent) -> bool {
    content_ref(content).is_some_and(|c| c.content().is_loading())
}

#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_can_go_back(content: *const WebhostContent) -> bool {
    content_ref(content).is_some_and(|c| c.content().can_go_back())
}

#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_can_go_forward(content: *const WebhostContent) -> bool {
    content_ref(content).is_some_and(|c| c.content().can_go_forward())
}

/// Copy the current URL. Release with `webhost_string_free`.
#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_copy_url(content: *const WebhostContent) -> *mut c_char {
    let url = content_ref(content).map(|c| c.content().current_url()).unwrap_or_default();
    to_c_string(&url)
}

/// Copy the current title. Release with `webhost_string_free`.
#[unsafe(no_mangle)]
pub extern "C" fn webhost_content_copy_title(content: *const WebhostContent) -> *mut c_char {
    let title = content_ref(content).map(|c| c.content().title()).unwrap_or_default();
    to_c_string(&title)
}

/// Release a string returned by this library.
#[unsafe(no_mangle)]
pub extern "C" fn webhost_string_free(value: *mut c_char) {
    if value.is_null() {
        return;
    }
    // Safety: the pointer came from `CString::into_raw` in this library.
    drop(unsafe { CString::from_raw(value) });
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub use metal::*;

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod metal {
    use std::ffi::c_void;
    use std::sync::Arc;

    use webhost_core::compositor::wgpu_backend::{WgpuBackend, WgpuSurface};
    use webhost_core::{CompositorSurface, SubmitOutcome};

    use super::content_ref;
    use crate::{WebhostContent, config};

    /// Compositor presenting one content's frames on a `CAMetalLayer`.
    pub struct WebhostCompositor {
        compositor: CompositorSurface<WgpuBackend>,
        surface: Arc<WgpuSurface>,
    }

    /// Bind a compositor to a `CAMetalLayer` and attach it to `content`.
    ///
    /// # Arguments
    /// * `metal_layer` - Pointer to CAMetalLayer, owned by the host
    /// * `width`, `height` - Drawable size in physical pixels
    ///
    /// # Returns
    /// A handle to release with `webhost_compositor_destroy`, or null on failure
    #[unsafe(no_mangle)]
    pub extern "C" fn webhost_compositor_create(
        content: *const WebhostContent,
        metal_layer: *mut c_void,
        width: u32,
        height: u32,
    ) -> *mut WebhostCompositor {
        log::info!(
            "webhost_compositor_create: width={} height={} layer={:p}",
            width,
            height,
            metal_layer
        );
        let Some(content) = content_ref(content) else {
            return std::ptr::null_mut();
        };
        if metal_layer.is_null() {
            log::error!("webhost_compositor_create: metal_layer is null");
            return std::ptr::null_mut();
        }

        let backend = WgpuBackend::new(config().compositor);
        // Safety: the host keeps the layer alive until `webhost_compositor_destroy`.
        let surface = match unsafe { backend.create_surface_from_layer(metal_layer, width, height) } {
            Ok(surface) => Arc::new(surface),
            Err(e) => {
                log::error!("webhost_compositor_create: {}", e);
                return std::ptr::null_mut();
            }
        };

        let compositor = CompositorSurface::new(backend);
        if let Err(e) = compositor.initialize(&surface) {
            log::error!("webhost_compositor_create: {}", e);
            return std::ptr::null_mut();
        }
        match content.content().compositor_handle() {
            Ok(handle) => compositor.attach(handle),
            Err(e) => {
                log::error!("webhost_compositor_create: {}", e);
                return std::ptr::null_mut();
            }
        }
        Box::into_raw(Box::new(WebhostCompositor { compositor, surface }))
    }

    /// Resize the drawable.
    ///
    /// # Arguments
    /// * `width` - New width in physical pixels
    /// * `height` - New height in physical pixels
    #[unsafe(no_mangle)]
    pub extern "C" fn webhost_compositor_resize(compositor: *const WebhostCompositor, width: u32, height: u32) {
        // Safety: pointer from `webhost_compositor_create`, or null.
        let Some(compositor) = (unsafe { compositor.as_ref() }) else {
            return;
        };
        compositor.surface.set_size(width, height);
        compositor.compositor.resize(width, height);
    }

    /// Present the newest frame.
    ///
    /// Call this from the display link callback.
    ///
    /// # Returns
    /// 0 presented, 1 no new frame, 2 dropped
    #[unsafe(no_mangle)]
    pub extern "C" fn webhost_compositor_submit(compositor: *const WebhostCompositor) -> i32 {
        // Safety: pointer from `webhost_compositor_create`, or null.
        let Some(compositor) = (unsafe { compositor.as_ref() }) else {
            return 2;
        };
        match compositor.compositor.submit_frame() {
            SubmitOutcome::Presented => 0,
            SubmitOutcome::NoNewFrame => 1,
            SubmitOutcome::Dropped(_) => 2,
        }
    }

    /// Tear the compositor down. Call before the host destroys its layer.
    #[unsafe(no_mangle)]
    pub extern "C" fn webhost_compositor_destroy(compositor: *mut WebhostCompositor) {
        if compositor.is_null() {
            return;
        }
        // Safety: pointer from `webhost_compositor_create`, destroyed once.
        let compositor = unsafe { Box::from_raw(compositor) };
        compositor.compositor.teardown();
        compositor.surface.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_and_free(value: *mut c_char) -> String {
        assert!(!value.is_null());
        let text = unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned();
        webhost_string_free(value);
        text
    }

    #[test]
    fn null_handles_are_harmless() {
        let null = std::ptr::null::<WebhostContent>();
        assert!(!webhost_content_load_url(null, c"https://example.com/".as_ptr()));
        assert!(!webhost_content_go_back(null));
        assert!(!webhost_content_is_loading(null));
        assert!(!webhost_content_can_go_back(null));
        assert!(!webhost_content_can_go_forward(null));
        assert!(!webhost_content_resize(null, 10, 10, 1.0));
        webhost_content_stop(null);
        webhost_content_destroy(std::ptr::null_mut());
        webhost_string_free(std::ptr::null_mut());
        assert_eq!(read_and_free(webhost_content_copy_url(null)), "");
        assert_eq!(read_and_free(webhost_content_copy_title(null)), "");
    }

    #[test]
    fn content_round_trip_through_c_abi() {
        assert!(webhost_runtime_init());
        assert!(webhost_runtime_init());

        let content = webhost_content_create(800, 600, 2.0);
        assert!(!content.is_null());
        assert_eq!(read_and_free(webhost_content_copy_url(content)), "");

        assert!(webhost_content_load_url(content, c"https://a.example/".as_ptr()));
        assert!(webhost_content_load_url(content, c"https://b.example/".as_ptr()));
        assert!(!webhost_content_is_loading(content));
        assert_eq!(read_and_free(webhost_content_copy_url(content)), "https://b.example/");
        assert!(webhost_content_can_go_back(content));

        assert!(webhost_content_go_back(content));
        assert_eq!(read_and_free(webhost_content_copy_url(content)), "https://a.example/");
        assert!(webhost_content_can_go_forward(content));

        assert!(webhost_content_mouse_event(content, 1.0, 2.0, 1, 1, 0.0, 0.0, 0));
        assert!(!webhost_content_mouse_event(content, 1.0, 2.0, 9, 1, 0.0, 0.0, 0));
        assert!(webhost_content_key_event(content, 65, 'a' as u32, 2, Modifiers::SHIFT));
        assert!(webhost_content_paint(content));
        webhost_content_destroy(content);
    }

    #[test]
    fn rejected_input_reports_failure() {
        assert!(webhost_runtime_init());
        let content = webhost_content_create(100, 100, 1.0);
        assert!(!content.is_null());

        assert!(!webhost_content_load_url(content, std::ptr::null()));
        assert!(!webhost_content_load_url(content, c"javascript:alert(1)".as_ptr()));
        let invalid_utf8 = [0x68u8, 0x74, 0xff, 0x00];
        assert!(!webhost_content_load_url(content, invalid_utf8.as_ptr().cast()));
        assert!(!webhost_content_resize(content, 0, 100, 1.0));
        assert!(!webhost_content_go_back(content));
        webhost_content_destroy(content);
    }

    #[test]
    fn unusable_sizes_are_refused() {
        assert!(webhost_runtime_init());
        assert!(webhost_content_create(0, 600, 1.0).is_null());
        assert!(webhost_content_create(800, 600, f32::INFINITY).is_null());
        assert!(webhost_content_create(800, 600, -1.0).is_null());

        let content = webhost_content_create(10, 10, 1.0);
        assert!(!content.is_null());
        assert!(webhost_content_load_url(content, c"https://a.example/".as_ptr()));
        assert!(!webhost_content_resize(content, 10, 10, f32::INFINITY));
        assert!(!webhost_content_resize(content, 10, 10, f32::NAN));
        assert!(!webhost_content_resize(content, 100_000, 10, 1.0));
        assert!(webhost_content_paint(content));
        webhost_content_destroy(content);
    }
}
