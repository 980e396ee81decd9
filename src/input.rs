//! Keyboard and pointer state shared by the native and browser front ends.

use std::collections::HashSet;

use glam::Vec2;

/// Movement keys the demo understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Forward,
    Back,
    Left,
    Right,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` string.
    pub fn from_dom(key: &str) -> Option<Self> {
        match key {
            "w" | "W" | "ArrowUp" => Some(Key::Forward),
            "s" | "S" | "ArrowDown" => Some(Key::Back),
            "a" | "A" | "ArrowLeft" => Some(Key::Left),
            "d" | "D" | "ArrowRight" => Some(Key::Right),
            _ => None,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_keycode(code: winit::keyboard::KeyCode) -> Option<Self> {
        use winit::keyboard::KeyCode;
        match code {
            KeyCode::KeyW | KeyCode::ArrowUp => Some(Key::Forward),
            KeyCode::KeyS | KeyCode::ArrowDown => Some(Key::Back),
            KeyCode::KeyA | KeyCode::ArrowLeft => Some(Key::Left),
            KeyCode::KeyD | KeyCode::ArrowRight => Some(Key::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InputState {
    held: HashSet<Key>,
    dragging: bool,
    last_pointer: Option<Vec2>,
    drag_delta: Vec2,
    wheel_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, key: Key) {
        self.held.insert(key);
    }

    pub fn key_up(&mut self, key: Key) {
        self.held.remove(&key);
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.dragging = true;
        self.last_pointer = Some(Vec2::new(x, y));
    }

    /// Track the pointer. Movement only counts as drag while a button is held.
    pub fn pointer_move(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if self.dragging {
            if let Some(last) = self.last_pointer {
                self.drag_delta += position - last;
            }
        }
        self.last_pointer = Some(position);
    }

    pub fn pointer_up(&mut self) {
        self.dragging = false;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Positive values scroll away from the user (zoom in).
    pub fn wheel(&mut self, steps: f32) {
        self.wheel_delta += steps;
    }

    /// Drag movement in pixels since the last call.
    pub fn take_drag(&mut self) -> Vec2 {
        std::mem::take(&mut self.drag_delta)
    }

    /// Wheel steps since the last call.
    pub fn take_wheel(&mut self) -> f32 {
        std::mem::take(&mut self.wheel_delta)
    }

    /// Forget held keys and drags, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.held.clear();
        self.dragging = false;
        self.drag_delta = Vec2::ZERO;
        self.wheel_delta = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_keys() {
        assert_eq!(Key::from_dom("w"), Some(Key::Forward));
        assert_eq!(Key::from_dom("ArrowLeft"), Some(Key::Left));
        assert_eq!(Key::from_dom("D"), Some(Key::Right));
        assert_eq!(Key::from_dom("q"), None);
    }

    #[test]
    fn test_held_keys() {
        let mut input = InputState::new();
        input.key_down(Key::Forward);
        input.key_down(Key::Forward);
        assert!(input.is_held(Key::Forward));
        input.key_up(Key::Forward);
        assert!(!input.is_held(Key::Forward));
    }

    #[test]
    fn test_drag_accumulates_and_is_consumed() {
        let mut input = InputState::new();
        input.pointer_move(5.0, 5.0);
        assert_eq!(input.take_drag(), Vec2::ZERO);

        input.pointer_down(10.0, 10.0);
        input.pointer_move(12.0, 11.0);
        input.pointer_move(15.0, 9.0);
        assert_eq!(input.take_drag(), Vec2::new(5.0, -1.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);

        input.pointer_up();
        input.pointer_move(30.0, 30.0);
        assert_eq!(input.take_drag(), Vec2::ZERO);
    }

    #[test]
    fn test_wheel_is_consumed() {
        let mut input = InputState::new();
        input.wheel(1.0);
        input.wheel(2.0);
        assert_eq!(input.take_wheel(), 3.0);
        assert_eq!(input.take_wheel(), 0.0);
    }
}
