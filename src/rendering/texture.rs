pub struct Texture {
    _texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
}

impl Texture {
    /// Wraps a depth texture with a comparison sampler for shadow lookups.
    pub fn from_wgpu_texture(texture: wgpu::Texture, device: &wgpu::Device) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            _texture: texture,
            view,
            sampler,
        }
    }
}

fn create_depth_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DepthTexture::DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

pub struct DepthTexture {
    texture: Texture,
    label: String,
}

impl DepthTexture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        label: impl Into<String>,
    ) -> Self {
        let label: String = label.into();
        let texture = create_depth_texture(device, config.width, config.height, &label);

        DepthTexture {
            texture: Texture::from_wgpu_texture(texture, device),
            label,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) {
        self.texture = Texture::from_wgpu_texture(
            create_depth_texture(device, config.width, config.height, &self.label),
            device,
        );
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.texture.view
    }
}

/// Square depth target the shadow-casting light renders into.
pub struct ShadowMap {
    texture: Texture,
    size: u32,
}

impl ShadowMap {
    pub fn new(device: &wgpu::Device, size: u32) -> Self {
        let texture = create_depth_texture(device, size, size, "Shadow map");

        Self {
            texture: Texture::from_wgpu_texture(texture, device),
            size: size.max(1),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.texture.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.texture.sampler
    }
}

/// Picks the shadow map edge: what the light asks for, capped by config and device.
pub fn shadow_map_size(requested: u32, configured_max: u32, device_max: u32) -> u32 {
    requested.min(configured_max).min(device_max).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_map_size_is_capped() {
        assert_eq!(shadow_map_size(4096, 4096, 8192), 4096);
        assert_eq!(shadow_map_size(4096, 2048, 8192), 2048);
        assert_eq!(shadow_map_size(4096, 4096, 2048), 2048);
        assert_eq!(shadow_map_size(0, 4096, 8192), 1);
    }
}
