use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::{util::DeviceExt, TexelCopyBufferLayout, TexelCopyTextureInfo, TextureDescriptor};

use crate::material_manager::{
    ColorSpace, Material, MaterialId, MaterialManager, TextureData, TextureId, TextureManager,
};

/// Mirrors `MaterialUniform` in the scene shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
pub struct MaterialUniform {
    /// rgb: linear base colour, w: 1.0 when a map is bound.
    pub color: [f32; 4],
    /// x: roughness, y: metalness.
    pub params: [f32; 4],
}

impl MaterialUniform {
    pub fn new(material: &Material, has_map: bool) -> Self {
        Self {
            color: material
                .color
                .linear()
                .extend(if has_map { 1.0 } else { 0.0 })
                .to_array(),
            params: [material.roughness, material.metalness, 0.0, 0.0],
        }
    }
}

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    version: u64,
    /// Bumped when the texture object is replaced and bind groups go stale.
    generation: u64,
}

struct MaterialEntry {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    bound_map: Option<(TextureId, u64)>,
}

pub struct RenderMaterialManager {
    device: wgpu::Device,
    queue: wgpu::Queue,

    default_texture: TextureEntry,
    textures: HashMap<TextureId, TextureEntry>,
    materials: HashMap<MaterialId, MaterialEntry>,

    sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
}

pub fn texture_format(color_space: ColorSpace) -> wgpu::TextureFormat {
    match color_space {
        ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
    }
}

impl RenderMaterialManager {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let default_texture = Self::create_default_texture(device, queue);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),

            default_texture,
            textures: HashMap::new(),
            materials: HashMap::new(),

            sampler,
            bind_group_layout,
        }
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self, material: MaterialId) -> Option<&wgpu::BindGroup> {
        self.materials.get(&material).map(|entry| &entry.bind_group)
    }

    /// Uploads changed textures and rebuilds the bind groups of changed materials.
    pub fn sync(&mut self, materials: &mut MaterialManager, textures: &TextureManager) {
        for (id, slot) in textures.iter() {
            let Some(data) = slot.data() else {
                continue;
            };

            let up_to_date = self
                .textures
                .get(&id)
                .is_some_and(|entry| entry.version == slot.version());
            if !up_to_date {
                self.upload_texture(id, &slot.name, slot.color_space, data, slot.version());
            }
        }

        for (id, material) in materials.iter_mut() {
            let wanted_map = material
                .map
                .and_then(|map| self.textures.get(&map).map(|entry| (map, entry.generation)));

            let dirty = material.take_needs_update();
            let stale = self
                .materials
                .get(&id)
                .is_none_or(|entry| entry.bound_map != wanted_map);

            if !dirty && !stale {
                continue;
            }

            let uniform = MaterialUniform::new(material, wanted_map.is_some());

            if !stale {
                // Only the parameters changed.
                if let Some(entry) = self.materials.get(&id) {
                    self.queue
                        .write_buffer(&entry.buffer, 0, bytemuck::cast_slice(&[uniform]));
                    continue;
                }
            }

            let entry = self.create_material(&material.name, uniform, wanted_map);
            self.materials.insert(id, entry);
        }
    }

    fn create_material(
        &self,
        name: &str,
        uniform: MaterialUniform,
        map: Option<(TextureId, u64)>,
    ) -> MaterialEntry {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Material uniform ({})", name)),
                contents: bytemuck::cast_slice(&[uniform]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let view = map
            .and_then(|(id, _)| self.textures.get(&id))
            .map_or(&self.default_texture.view, |entry| &entry.view);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Material bind group ({})", name)),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        MaterialEntry {
            buffer,
            bind_group,
            bound_map: map,
        }
    }

    fn upload_texture(
        &mut self,
        id: TextureId,
        name: &str,
        color_space: ColorSpace,
        data: &TextureData,
        version: u64,
    ) {
        // Video frames keep their size, so they take the cheap path.
        if let Some(entry) = self.textures.get_mut(&id) {
            if entry.width == data.width && entry.height == data.height {
                write_pixels(&self.queue, &entry.texture, data);
                entry.version = version;
                return;
            }
        }

        let generation = self
            .textures
            .get(&id)
            .map_or(0, |entry| entry.generation + 1);

        let texture = self.device.create_texture_with_data(
            &self.queue,
            &TextureDescriptor {
                label: Some(name),
                size: wgpu::Extent3d {
                    width: data.width,
                    height: data.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(color_space),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::wgt::TextureDataOrder::default(),
            &data.pixels,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        log::debug!("Uploaded texture {} ({}x{})", name, data.width, data.height);

        self.textures.insert(
            id,
            TextureEntry {
                texture,
                view,
                width: data.width,
                height: data.height,
                version,
                generation,
            },
        );
    }

    fn create_default_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> TextureEntry {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Default texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let white = TextureData {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        };
        write_pixels(queue, &texture, &white);

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        TextureEntry {
            texture,
            view,
            width: 1,
            height: 1,
            version: 0,
            generation: 0,
        }
    }
}

fn write_pixels(queue: &wgpu::Queue, texture: &wgpu::Texture, data: &TextureData) {
    queue.write_texture(
        TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &data.pixels,
        TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * data.width),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn color_space_picks_the_texture_format() {
        assert_eq!(
            texture_format(ColorSpace::Srgb),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(
            texture_format(ColorSpace::Linear),
            wgpu::TextureFormat::Rgba8Unorm
        );
    }

    #[test]
    fn uniform_flags_bound_maps() {
        let mut material = Material::standard("sofa").with_color(Color::WHITE);
        material.set_roughness(0.4);

        let with_map = MaterialUniform::new(&material, true);
        let without_map = MaterialUniform::new(&material, false);

        assert_eq!(with_map.color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(without_map.color[3], 0.0);
        assert_eq!(with_map.params[0], 0.4);
    }
}
