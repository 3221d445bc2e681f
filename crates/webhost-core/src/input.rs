//! Input events forwarded from the host to the engine.

/// Mouse event in logical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseEvent {
    pub x: f32,
    pub y: f32,
    pub kind: MouseEventKind,
    pub button: MouseButton,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseEventKind {
    Move,
    Down,
    Up,
    Wheel { delta_x: f32, delta_y: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    None,
    Left,
    Middle,
    Right,
}

/// Keyboard event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: u32,
    pub char: Option<char>,
    pub kind: KeyEventKind,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
    Char,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const SHIFT: u32 = 1 << 0;
    pub const CTRL: u32 = 1 << 1;
    pub const ALT: u32 = 1 << 2;
    pub const META: u32 = 1 << 3;

    /// Decode the bit layout used across the C ABI.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            shift: bits & Self::SHIFT != 0,
            ctrl: bits & Self::CTRL != 0,
            alt: bits & Self::ALT != 0,
            meta: bits & Self::META != 0,
        }
    }
}

/// Host input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Mouse(MouseEvent),
    Key(KeyEvent),
}

impl InputEvent {
    /// Translate logical coordinates to device pixels.
    pub fn to_device(&self, scale_factor: f32) -> InputEvent {
        match self {
            InputEvent::Mouse(mouse) => {
                let kind = match mouse.kind {
                    MouseEventKind::Wheel { delta_x, delta_y } => MouseEventKind::Wheel {
                        delta_x: delta_x * scale_factor,
                        delta_y: delta_y * scale_factor,
                    },
                    other => other,
                };
                InputEvent::Mouse(MouseEvent {
                    x: mouse.x * scale_factor,
                    y: mouse.y * scale_factor,
                    kind,
                    ..*mouse
                })
            }
            InputEvent::Key(key) => InputEvent::Key(key.clone()),
        }
    }
}

impl From<MouseEvent> for InputEvent {
    fn from(event: MouseEvent) -> Self {
        InputEvent::Mouse(event)
    }
}

impl From<KeyEvent> for InputEvent {
    fn from(event: KeyEvent) -> Self {
        InputEvent::Key(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_coordinates_scale_to_device_pixels() {
        let event = InputEvent::Mouse(MouseEvent {
            x: 10.0,
            y: 4.5,
            kind: MouseEventKind::Wheel { delta_x: 0.0, delta_y: -3.0 },
            button: MouseButton::None,
            modifiers: Modifiers::default(),
        });
        let InputEvent::Mouse(scaled) = event.to_device(2.0) else {
            panic!("expected mouse event");
        };
        assert_eq!((scaled.x, scaled.y), (20.0, 9.0));
        assert_eq!(scaled.kind, MouseEventKind::Wheel { delta_x: 0.0, delta_y: -6.0 });
    }

    #[test]
    fn modifier_bits_round_trip_the_c_layout() {
        let mods = Modifiers::from_bits(Modifiers::SHIFT | Modifiers::META);
        assert!(mods.shift && mods.meta);
        assert!(!mods.ctrl && !mods.alt);
    }
}
