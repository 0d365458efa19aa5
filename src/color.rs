use glam::Vec3;

/// Linear RGB colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(pub Vec3);

impl Color {
    pub const WHITE: Color = Color(Vec3::ONE);

    /// Parses an sRGB hex triplet such as `0xfff5e1` into linear RGB.
    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xff) as f32 / 255.0;
        let g = ((hex >> 8) & 0xff) as f32 / 255.0;
        let b = (hex & 0xff) as f32 / 255.0;

        Color(Vec3::new(
            srgb_to_linear(r),
            srgb_to_linear(g),
            srgb_to_linear(b),
        ))
    }

    pub fn linear(self) -> Vec3 {
        self.0
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.0.x as f64,
            g: self.0.y as f64,
            b: self.0.z as f64,
            a: 1.0,
        }
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
    fn white_and_black_are_unchanged() {
        assert!(Color::from_hex(0xffffff).linear().abs_diff_eq(Vec3::ONE, 1e-5));
        assert_eq!(Color::from_hex(0x000000).linear(), Vec3::ZERO);
    }

    #[test]
    fn mid_grey_is_darker_in_linear_space() {
        let grey = Color::from_hex(0x808080).linear();
        assert!((grey.x - 0.2158605).abs() < 1e-4);
        assert_eq!(grey.x, grey.y);
        assert_eq!(grey.y, grey.z);
    }

    #[test]
    fn channels_are_read_in_rgb_order() {
        let c = Color::from_hex(0xff0000).linear();
        assert!(c.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
    }
}
