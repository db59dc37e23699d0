//! Keyboard state as a 256x3 single-channel bitmap.
//!
//! Column = JavaScript key code. Row 0 holds keys that are down, row 1 keys
//! pressed since the last upload, row 2 a toggle flipped on every press.

use winit::keyboard::KeyCode;

pub const KEYBOARD_WIDTH: u32 = 256;
pub const KEYBOARD_HEIGHT: u32 = 3;

const HELD: usize = 0;
const PRESSED: usize = 256;
const TOGGLE: usize = 512;

#[derive(Clone)]
pub struct KeyboardState {
    bytes: [u8; 256 * 3],
    dirty: bool,
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self {
            bytes: [0; 256 * 3],
            dirty: true,
        }
    }
}

impl KeyboardState {
    pub fn set_key(&mut self, code: u8, pressed: bool) {
        let key = usize::from(code);
        self.bytes[HELD + key] = if pressed { 255 } else { 0 };
        if pressed {
            self.bytes[PRESSED + key] = 255;
            self.bytes[TOGGLE + key] = 255 - self.bytes[TOGGLE + key];
        }
        self.dirty = true;
    }

    pub fn is_down(&self, code: u8) -> bool {
        self.bytes[HELD + usize::from(code)] != 0
    }

    pub fn was_pressed(&self, code: u8) -> bool {
        self.bytes[PRESSED + usize::from(code)] != 0
    }

    pub fn is_toggled(&self, code: u8) -> bool {
        self.bytes[TOGGLE + usize::from(code)] != 0
    }

    /// Whether the bitmap changed since the last [`take_upload`](Self::take_upload).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the bitmap to upload if it changed, then clears the
    /// pressed-this-frame row so each press is seen exactly once.
    pub fn take_upload(&mut self) -> Option<[u8; 256 * 3]> {
        if !self.dirty {
            return None;
        }
        let snapshot = self.bytes;
        let had_presses = self.bytes[PRESSED..TOGGLE].iter().any(|&b| b != 0);
        self.bytes[PRESSED..TOGGLE].fill(0);
        // The cleared row must reach the GPU on the next frame too.
        self.dirty = had_presses;
        Some(snapshot)
    }

    /// Forces the next [`take_upload`](Self::take_upload), e.g. after the
    /// texture holding the bitmap was recreated.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.bytes = [0; 256 * 3];
        self.dirty = true;
    }
}

/// JavaScript `keyCode` of a physical key, if it has one.
pub fn js_key_code(key: KeyCode) -> Option<u8> {
    use KeyCode::*;
    let code = match key {
        Backspace => 8,
        Tab => 9,
        Enter | NumpadEnter => 13,
        ShiftLeft | ShiftRight => 16,
        ControlLeft | ControlRight => 17,
        AltLeft | AltRight => 18,
        Pause => 19,
        CapsLock => 20,
        Escape => 27,
        Space => 32,
        PageUp => 33,
        PageDown => 34,
        End => 35,
        Home => 36,
        ArrowLeft => 37,
        ArrowUp => 38,
        ArrowRight => 39,
        ArrowDown => 40,
        Insert => 45,
        Delete => 46,
        Digit0 => 48,
        Digit1 => 49,
        Digit2 => 50,
        Digit3 => 51,
        Digit4 => 52,
        Digit5 => 53,
        Digit6 => 54,
        Digit7 => 55,
        Digit8 => 56,
        Digit9 => 57,
        KeyA => 65,
        KeyB => 66,
        KeyC => 67,
        KeyD => 68,
        KeyE => 69,
        KeyF => 70,
        KeyG => 71,
        KeyH => 72,
        KeyI => 73,
        KeyJ => 74,
        KeyK => 75,
        KeyL => 76,
        KeyM => 77,
        KeyN => 78,
        KeyO => 79,
        KeyP => 80,
        KeyQ => 81,
        KeyR => 82,
        KeyS => 83,
        KeyT => 84,
        KeyU => 85,
        KeyV => 86,
        KeyW => 87,
        KeyX => 88,
        KeyY => 89,
        KeyZ => 90,
        Numpad0 => 96,
        Numpad1 => 97,
        Numpad2 => 98,
        Numpad3 => 99,
        Numpad4 => 100,
        Numpad5 => 101,
        Numpad6 => 102,
        Numpad7 => 103,
        Numpad8 => 104,
        Numpad9 => 105,
        NumpadMultiply => 106,
        NumpadAdd => 107,
        NumpadSubtract => 109,
        NumpadDecimal => 110,
        NumpadDivide => 111,
        F1 => 112,
        F2 => 113,
        F3 => 114,
        F4 => 115,
        F5 => 116,
        F6 => 117,
        F7 => 118,
        F8 => 119,
        F9 => 120,
        F10 => 121,
        F11 => 122,
        F12 => 123,
        Semicolon => 186,
        Equal => 187,
        Comma => 188,
        Minus => 189,
        Period => 190,
        Slash => 191,
        Backquote => 192,
        BracketLeft => 219,
        Backslash => 220,
        BracketRight => 221,
        Quote => 222,
        _ => return None,
    };
    Some(code)
}
