//! Scene lights: one ambient term and one directional light.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::color::Color;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Color::from_hex(0x404040),
            intensity: 1.0,
        }
    }
}

/// Light arriving from `position` towards the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Color,
    pub intensity: f32,
    pub position: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Color::from_hex(0xffffff),
            intensity: 10.0,
            position: Vec3::new(1.0, 1.0, 1.0).normalize(),
        }
    }
}

impl DirectionalLight {
    /// Unit vector pointing from the surface towards the light.
    pub fn direction_to_light(&self) -> Vec3 {
        self.position.try_normalize().unwrap_or(Vec3::Y)
    }
}

/// The lights currently in the scene. Missing lights contribute nothing.
#[derive(Debug, Clone, Default)]
pub struct Lights {
    pub ambient: Option<AmbientLight>,
    pub directional: Option<DirectionalLight>,
}

impl Lights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_uniforms(&self) -> LightingUniforms {
        let ambient = self
            .ambient
            .map(|l| l.color.scaled(l.intensity))
            .unwrap_or(Color::BLACK);

        let (direction, color) = match &self.directional {
            Some(light) => (light.direction_to_light(), light.color.scaled(light.intensity)),
            None => (Vec3::Y, Color::BLACK),
        };

        LightingUniforms {
            ambient: [ambient.r, ambient.g, ambient.b, 0.0],
            direction: direction.extend(0.0).to_array(),
            color: [color.r, color.g, color.b, 0.0],
        }
    }
}

/// GPU-ready lighting values. Colours are premultiplied by intensity.
/// Total size: 48 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LightingUniforms {
    pub ambient: [f32; 4],   // 16 bytes
    pub direction: [f32; 4], // 16 bytes
    pub color: [f32; 4],     // 16 bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let light = DirectionalLight::default();
        assert_eq!(light.intensity, 10.0);
        assert!((light.position.length() - 1.0).abs() < 1e-6);
        assert!((light.position.x - light.position.z).abs() < 1e-6);

        let ambient = AmbientLight::default();
        // 0x40 in sRGB is roughly 0.051 linear
        assert!((ambient.color.r - 0.0513).abs() < 1e-3);
    }

    #[test]
    fn test_empty_scene_is_dark() {
        let uniforms = Lights::new().to_uniforms();
        assert_eq!(uniforms.ambient[..3], [0.0; 3]);
        assert_eq!(uniforms.color[..3], [0.0; 3]);
    }

    #[test]
    fn test_uniforms_scale_by_intensity() {
        let lights = Lights {
            ambient: Some(AmbientLight::default()),
            directional: Some(DirectionalLight::default()),
        };
        let uniforms = lights.to_uniforms();
        assert!((uniforms.color[0] - 10.0).abs() < 1e-3);
        let d = Vec3::new(uniforms.direction[0], uniforms.direction[1], uniforms.direction[2]);
        assert!((d - Vec3::ONE.normalize()).length() < 1e-5);
    }

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<LightingUniforms>(), 48);
    }
}
