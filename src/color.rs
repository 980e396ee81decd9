/// Linear RGB color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Decode an sRGB hex triplet (`0xRRGGBB`) into linear space.
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
        Self {
            r: channel(16),
            g: channel(8),
            b: channel(0),
        }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<[f32; 3]> for Color {
    fn from(c: [f32; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c < 0.04045 {
        c * 0.0773993808
    } else {
        (c * 0.9478672986 + 0.0521327014).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_extremes() {
        let white = Color::from_hex(0xffffff);
        assert!((white.r - 1.0).abs() < 1e-5);
        assert!((white.b - 1.0).abs() < 1e-5);
        assert_eq!(Color::from_hex(0x000000), Color::BLACK);
    }

    #[test]
    fn test_hex_is_linearised() {
        let c = Color::from_hex(0x404040);
        // 0x40 / 255 = 0.251 in sRGB, ~0.0513 linear
        assert!((c.r - 0.0513).abs() < 1e-3);
        assert_eq!(c.r, c.g);
        assert_eq!(c.g, c.b);
    }

    #[test]
    fn test_hex_channel_order() {
        let c = Color::from_hex(0x00ff00);
        assert_eq!(c.r, 0.0);
        assert!((c.g - 1.0).abs() < 1e-5);
        assert_eq!(c.b, 0.0);
    }
}
