use glam::Vec2;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::keyboard::js_key_code;
use crate::renderer::ShadertoyRenderer;

/// Collects window input and hands it to a renderer once per frame.
#[derive(Debug, Default)]
pub struct Input {
    mouse_position: Vec2,
    left_down: bool,
    right_down: bool,
    key_events: Vec<(u8, bool)>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a window event and update input state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.key(key, event.state == ElementState::Pressed, event.repeat);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse_button(*button, *state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(position.x as f32, position.y as f32);
            }
            _ => {}
        }
    }

    /// Queues a key transition. Auto-repeat is ignored so toggles flip once
    /// per physical press.
    pub fn key(&mut self, key: KeyCode, pressed: bool, repeat: bool) {
        if repeat {
            return;
        }
        if let Some(code) = js_key_code(key) {
            self.key_events.push((code, pressed));
        }
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Left => self.left_down = pressed,
            MouseButton::Right => self.right_down = pressed,
            _ => {}
        }
    }

    /// Cursor position in window coordinates, origin top-left.
    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        self.mouse_position = Vec2::new(x, y);
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    /// Mouse position in shader pixels, origin bottom-left.
    pub fn shader_mouse(&self, window_height: u32) -> Vec2 {
        Vec2::new(
            self.mouse_position.x,
            window_height as f32 - self.mouse_position.y,
        )
    }

    /// Pushes the mouse state and queued key transitions to `renderer`.
    pub fn apply(&mut self, renderer: &mut ShadertoyRenderer, window_height: u32) {
        renderer.set_mouse(
            self.shader_mouse(window_height),
            self.left_down,
            self.right_down,
        );
        for (code, pressed) in self.key_events.drain(..) {
            renderer.set_keyboard(code, pressed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RendererConfig;

    #[test]
    fn mouse_is_flipped_to_bottom_left_origin() {
        let mut input = Input::new();
        input.cursor_moved(10.0, 30.0);
        input.mouse_button(MouseButton::Left, true);

        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        input.apply(&mut renderer, 100);
        assert_eq!(renderer.frame_inputs().mouse, [10.0, 70.0, 1.0, 0.0]);

        input.mouse_button(MouseButton::Left, false);
        input.mouse_button(MouseButton::Right, true);
        input.apply(&mut renderer, 100);
        assert_eq!(renderer.frame_inputs().mouse, [10.0, 70.0, 0.0, 1.0]);
    }

    #[test]
    fn repeats_and_unmapped_keys_are_dropped() {
        let mut input = Input::new();
        input.key(KeyCode::KeyA, true, false);
        input.key(KeyCode::KeyA, true, true);
        input.key(KeyCode::KeyA, false, false);
        input.key(KeyCode::Fn, true, false);
        assert_eq!(input.key_events, vec![(65, true), (65, false)]);

        let mut renderer = ShadertoyRenderer::new(RendererConfig::new());
        input.apply(&mut renderer, 1);
        assert!(input.key_events.is_empty());
    }
}
