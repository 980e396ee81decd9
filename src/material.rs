//! Surface materials attached to meshes.
//!
//! Materials are plain data. Pipeline state (culling, depth, blending) is
//! derived from them by the renderer.

use std::sync::Arc;

use crate::color::Color;

/// Which faces of a mesh are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// How a material responds to scene lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Shading {
    /// Lambert diffuse from ambient and directional lights.
    #[default]
    Lit,
    /// Unlit: colour and texture only.
    Basic,
}

/// Decoded RGBA8 image, shared between materials.
#[derive(Debug)]
pub struct TextureData {
    /// Stable key used to cache the GPU upload.
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub color: Color,
    pub opacity: f32,
    pub map: Option<Arc<TextureData>>,
    pub emissive: Color,
    pub emissive_intensity: f32,
    pub side: Side,
    pub transparent: bool,
    pub premultiplied_alpha: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub shading: Shading,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            opacity: 1.0,
            map: None,
            emissive: Color::BLACK,
            emissive_intensity: 1.0,
            side: Side::Front,
            transparent: false,
            premultiplied_alpha: false,
            depth_test: true,
            depth_write: true,
            shading: Shading::Lit,
        }
    }
}

impl Material {
    pub fn with_color(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// An unlit copy keeping only map, colour, side and blending settings.
    /// Opacity goes back to 1.
    pub fn to_basic(&self) -> Self {
        Self {
            color: self.color,
            map: self.map.clone(),
            side: self.side,
            transparent: self.transparent,
            premultiplied_alpha: self.premultiplied_alpha,
            shading: Shading::Basic,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_basic_keeps_surface() {
        let texture = Arc::new(TextureData {
            key: "t".into(),
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        });
        let lit = Material {
            color: Color::new(0.5, 0.2, 0.1),
            map: Some(texture),
            emissive: Color::WHITE,
            emissive_intensity: 3.0,
            side: Side::Back,
            opacity: 0.25,
            transparent: true,
            depth_write: false,
            ..Material::default()
        };

        let basic = lit.to_basic();
        assert_eq!(basic.shading, Shading::Basic);
        assert_eq!(basic.color, lit.color);
        assert_eq!(basic.side, Side::Back);
        assert!(basic.transparent);
        assert!(basic.map.is_some());
        // Lighting-only and depth properties are reset
        assert_eq!(basic.emissive, Color::BLACK);
        assert_eq!(basic.emissive_intensity, 1.0);
        assert!(basic.depth_write);
        assert_eq!(basic.opacity, 1.0);
    }
}
