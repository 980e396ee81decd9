//! Camera controllers driven by [`InputState`].

use std::f32::consts::{PI, TAU};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::input::{InputState, Key};

/// Something that moves the camera once per frame.
pub trait CameraControls {
    fn update(&mut self, camera: &mut Camera, input: &mut InputState);

    /// Called when the output surface changes size.
    fn resize(&mut self, _width: u32, _height: u32) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControlsKind {
    #[default]
    Orbit,
    Keyboard,
}

impl ControlsKind {
    pub fn create(self) -> Box<dyn CameraControls> {
        match self {
            ControlsKind::Orbit => Box::new(OrbitControls::default()),
            ControlsKind::Keyboard => Box::new(KeyboardControls::default()),
        }
    }
}

const POLAR_EPSILON: f32 = 1e-4;

/// Orbit around a target point: drag to rotate, wheel to dolly.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Distance multiplier per wheel step towards the target.
    pub zoom_factor: f32,
    viewport_height: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            min_distance: 0.5,
            max_distance: 500.0,
            zoom_factor: 0.95,
            viewport_height: 600.0,
        }
    }
}

impl CameraControls for OrbitControls {
    fn update(&mut self, camera: &mut Camera, input: &mut InputState) {
        let offset = camera.position - self.target;
        let mut radius = offset.length();
        let (mut theta, mut phi) = if radius > 0.0 {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            (0.0, PI / 2.0)
        };

        let drag = input.take_drag();
        theta -= TAU * drag.x / self.viewport_height;
        phi -= TAU * drag.y / self.viewport_height;
        phi = phi.clamp(POLAR_EPSILON, PI - POLAR_EPSILON);

        let steps = input.take_wheel();
        if steps != 0.0 {
            radius *= self.zoom_factor.powf(steps);
        }
        radius = radius.clamp(self.min_distance, self.max_distance);

        let sin_phi = phi.sin();
        camera.position = self.target
            + Vec3::new(
                radius * sin_phi * theta.sin(),
                radius * phi.cos(),
                radius * sin_phi * theta.cos(),
            );
        camera.look_at(self.target);
    }

    fn resize(&mut self, _width: u32, height: u32) {
        if height > 0 {
            self.viewport_height = height as f32;
        }
    }
}

/// WASD movement on the XZ plane at a fixed step per frame.
#[derive(Debug, Clone)]
pub struct KeyboardControls {
    pub speed: f32,
}

impl Default for KeyboardControls {
    fn default() -> Self {
        Self { speed: 0.1 }
    }
}

impl CameraControls for KeyboardControls {
    fn update(&mut self, camera: &mut Camera, input: &mut InputState) {
        if input.is_held(Key::Forward) {
            camera.position.z -= self.speed;
        }
        if input.is_held(Key::Back) {
            camera.position.z += self.speed;
        }
        if input.is_held(Key::Left) {
            camera.position.x -= self.speed;
        }
        if input.is_held(Key::Right) {
            camera.position.x += self.speed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_orbit_idle_keeps_position_and_faces_target() {
        let mut camera = Camera::default();
        let mut input = InputState::new();
        let mut controls = OrbitControls::default();

        controls.update(&mut camera, &mut input);
        assert!(close(camera.position, Vec3::new(0.0, 5.0, 5.0)));
        assert!(close(camera.forward(), -camera.position.normalize()));
    }

    #[test]
    fn test_orbit_drag_rotates_azimuth() {
        let mut camera = Camera::default();
        let mut input = InputState::new();
        let mut controls = OrbitControls::default();
        controls.resize(800, 400);

        // A quarter of the viewport height is a quarter turn
        input.pointer_down(0.0, 0.0);
        input.pointer_move(100.0, 0.0);
        controls.update(&mut camera, &mut input);
        assert!(close(camera.position, Vec3::new(-5.0, 5.0, 0.0)));
    }

    #[test]
    fn test_orbit_polar_is_clamped() {
        let mut camera = Camera::default();
        let mut input = InputState::new();
        let mut controls = OrbitControls::default();

        input.pointer_down(0.0, 0.0);
        input.pointer_move(0.0, 10_000.0);
        controls.update(&mut camera, &mut input);
        // Dragged far past the pole; the camera stops just short of it
        let radius = 50.0f32.sqrt();
        assert!((camera.position.y - radius).abs() < 1e-3);
        assert!(camera.position.is_finite());
        assert!(camera.rotation.is_finite());
    }

    #[test]
    fn test_orbit_wheel_dollies() {
        let mut camera = Camera::default();
        let mut input = InputState::new();
        let mut controls = OrbitControls::default();
        let start = camera.position.length();

        input.wheel(1.0);
        controls.update(&mut camera, &mut input);
        assert!((camera.position.length() - start * 0.95).abs() < 1e-4);

        input.wheel(-1000.0);
        controls.update(&mut camera, &mut input);
        assert!((camera.position.length() - controls.max_distance).abs() < 1e-2);
    }

    #[test]
    fn test_keyboard_moves_on_plane() {
        let mut camera = Camera::default();
        let mut input = InputState::new();
        let mut controls = KeyboardControls::default();

        input.key_down(Key::Forward);
        input.key_down(Key::Right);
        controls.update(&mut camera, &mut input);
        assert!(close(camera.position, Vec3::new(0.1, 5.0, 4.9)));

        input.clear();
        input.key_down(Key::Back);
        input.key_down(Key::Left);
        controls.update(&mut camera, &mut input);
        assert!(close(camera.position, Vec3::new(0.0, 5.0, 5.0)));
    }

    #[test]
    fn test_kind_from_json() {
        let kind: ControlsKind = serde_json::from_str("\"keyboard\"").unwrap();
        assert_eq!(kind, ControlsKind::Keyboard);
        assert_eq!(ControlsKind::default(), ControlsKind::Orbit);
    }
}
