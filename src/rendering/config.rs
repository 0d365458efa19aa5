use crate::color::Color;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Upper bound for the shadow map edge; the light's own size is used when smaller.
    pub shadow_map_size: u32,
    pub exposure: f32,
    pub clear_color: Color,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            shadow_map_size: 4096,
            exposure: 1.5,
            clear_color: Color::from_hex(0xf0f0f0),
        }
    }
}
