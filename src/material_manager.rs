use std::collections::HashMap;
use std::path::{Path, PathBuf};

use id_arena::{Arena, Id};

use crate::color::Color;

pub type MaterialId = Id<Material>;
pub type TextureId = Id<TextureSlot>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    /// Lit by every light in the scene.
    Standard,
    /// Unlit, shows its colour and map as-is.
    Basic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Front,
    Back,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub color: Color,
    pub map: Option<TextureId>,
    pub side: Side,
    pub depth_test: bool,
    pub roughness: f32,
    pub metalness: f32,
    needs_update: bool,
}

impl Material {
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MaterialKind::Standard,
            color: Color::WHITE,
            map: None,
            side: Side::Front,
            depth_test: true,
            roughness: 1.0,
            metalness: 0.0,
            needs_update: true,
        }
    }

    pub fn basic(name: impl Into<String>) -> Self {
        Self {
            kind: MaterialKind::Basic,
            ..Self::standard(name)
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_map(mut self, map: impl Into<Option<TextureId>>) -> Self {
        self.map = map.into();
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn without_depth_test(mut self) -> Self {
        self.depth_test = false;
        self
    }

    /// Swaps the texture and flags the material for re-upload.
    pub fn set_map(&mut self, map: Option<TextureId>) {
        self.map = map;
        self.needs_update = true;
    }

    pub fn set_roughness(&mut self, roughness: f32) {
        self.roughness = roughness;
        self.needs_update = true;
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Clears the update flag, returning whether it was set.
    pub fn take_needs_update(&mut self) -> bool {
        std::mem::take(&mut self.needs_update)
    }
}

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn from_rgba_image(image: image::RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        }
    }

    pub fn from_gltf_image(data: gltf::image::Data) -> anyhow::Result<Self> {
        use gltf::image::Format;

        let pixels = match data.format {
            Format::R8G8B8A8 => data.pixels,
            Format::R8G8B8 => data
                .pixels
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
                .collect(),
            Format::R8 => data.pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
            Format::R8G8 => data
                .pixels
                .chunks_exact(2)
                .flat_map(|la| [la[0], la[0], la[0], la[1]])
                .collect(),
            other => anyhow::bail!("Unsupported glTF image format: {:?}", other),
        };

        Ok(Self {
            width: data.width,
            height: data.height,
            pixels,
        })
    }
}

/// CPU side of a texture. The data may arrive after the slot is created.
#[derive(Debug)]
pub struct TextureSlot {
    pub name: String,
    pub color_space: ColorSpace,
    pub path: Option<PathBuf>,
    data: Option<TextureData>,
    version: u64,
}

impl TextureSlot {
    pub fn data(&self) -> Option<&TextureData> {
        self.data.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Bumped on every write, so the renderer knows when to upload.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn set_data(&mut self, data: TextureData) {
        self.data = Some(data);
        self.version += 1;
    }
}

pub struct TextureManager {
    textures: Arena<TextureSlot>,
    by_path: HashMap<PathBuf, TextureId>,
}

impl TextureManager {
    pub fn new() -> Self {
        Self {
            textures: Arena::new(),
            by_path: HashMap::new(),
        }
    }

    pub fn create(&mut self, name: impl Into<String>, color_space: ColorSpace) -> TextureId {
        self.textures.alloc(TextureSlot {
            name: name.into(),
            color_space,
            path: None,
            data: None,
            version: 0,
        })
    }

    /// Returns the slot for `path`, creating an empty one on first use.
    /// The bool is true when the caller should start loading it.
    pub fn create_for_path(&mut self, path: &Path, color_space: ColorSpace) -> (TextureId, bool) {
        if let Some(id) = self.by_path.get(path) {
            return (*id, false);
        }

        let id = self.textures.alloc(TextureSlot {
            name: path.to_string_lossy().into_owned(),
            color_space,
            path: Some(path.to_path_buf()),
            data: None,
            version: 0,
        });
        self.by_path.insert(path.to_path_buf(), id);
        (id, true)
    }

    pub fn get(&self, id: TextureId) -> Option<&TextureSlot> {
        self.textures.get(id)
    }

    pub fn set_data(&mut self, id: TextureId, data: TextureData) {
        if let Some(slot) = self.textures.get_mut(id) {
            slot.set_data(data);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureId, &TextureSlot)> {
        self.textures.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GltfMaterialKey {
    pub file_name: String,
    pub material_name: String,
}

pub struct MaterialManager {
    materials: Arena<Material>,
    materials_by_gltf: HashMap<GltfMaterialKey, MaterialId>,
}

impl MaterialManager {
    pub fn new() -> Self {
        Self {
            materials: Arena::new(),
            materials_by_gltf: HashMap::new(),
        }
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.alloc(material)
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (MaterialId, &mut Material)> {
        self.materials.iter_mut()
    }

    /// Imports every material of a glTF file. Base colour textures are decoded
    /// into new texture slots; other texture channels are ignored.
    pub fn load_all_materials_from_gltf(
        &mut self,
        textures: &mut TextureManager,
        file_name: &str,
        document: &gltf::Document,
        images: &[gltf::image::Data],
    ) -> Vec<MaterialId> {
        let mut ids = Vec::with_capacity(document.materials().len());

        for material in document.materials() {
            let material_name = material
                .name()
                .map(String::from)
                .unwrap_or_else(|| format!("Material {}", material.index().unwrap_or(0)));

            let key = GltfMaterialKey {
                file_name: file_name.to_string(),
                material_name: material_name.clone(),
            };

            if let Some(id) = self.materials_by_gltf.get(&key) {
                ids.push(*id);
                continue;
            }

            let pbr = material.pbr_metallic_roughness();
            let [r, g, b, _] = pbr.base_color_factor();

            let map = pbr.base_color_texture().and_then(|info| {
                let image_index = info.texture().source().index();
                // Images can be shared between materials, so they are copied.
                let image = images.get(image_index)?.clone();

                match TextureData::from_gltf_image(image) {
                    Ok(data) => {
                        let id = textures.create(
                            format!("{file_name}/{material_name} (base color)"),
                            ColorSpace::Srgb,
                        );
                        textures.set_data(id, data);
                        Some(id)
                    }
                    Err(e) => {
                        log::error!("{file_name}/{material_name}: {e}");
                        None
                    }
                }
            });

            let side = if material.double_sided() {
                Side::Double
            } else {
                Side::Front
            };

            let mut imported = Material::standard(material_name)
                .with_color(Color(glam::Vec3::new(r, g, b)))
                .with_side(side);
            imported.map = map;
            imported.roughness = pbr.roughness_factor();
            imported.metalness = pbr.metallic_factor();

            let id = self.add_material(imported);
            self.materials_by_gltf.insert(key, id);
            ids.push(id);
        }

        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_map_flags_material_for_upload() {
        let mut textures = TextureManager::new();
        let first = textures.create("first", ColorSpace::Linear);
        let second = textures.create("second", ColorSpace::Linear);

        let mut material = Material::standard("wall").with_map(first);
        assert!(material.take_needs_update());
        assert!(!material.needs_update());

        material.set_map(Some(second));

        assert_eq!(material.map, Some(second));
        assert!(material.needs_update());
        assert!(material.take_needs_update());
        assert!(!material.needs_update());
    }

    #[test]
    fn texture_versions_bump_on_each_write() {
        let mut textures = TextureManager::new();
        let id = textures.create("screen", ColorSpace::Srgb);
        assert!(!textures.get(id).unwrap().is_loaded());
        assert_eq!(textures.get(id).unwrap().version(), 0);

        let frame = TextureData {
            width: 1,
            height: 1,
            pixels: vec![1, 2, 3, 255],
        };
        textures.set_data(id, frame.clone());
        textures.set_data(id, frame.clone());

        let slot = textures.get(id).unwrap();
        assert_eq!(slot.version(), 2);
        assert_eq!(slot.data(), Some(&frame));
    }

    #[test]
    fn paths_share_a_slot() {
        let mut textures = TextureManager::new();
        let path = Path::new("assets/door-texture.jpg");

        let (a, load_a) = textures.create_for_path(path, ColorSpace::Srgb);
        let (b, load_b) = textures.create_for_path(path, ColorSpace::Srgb);

        assert_eq!(a, b);
        assert!(load_a);
        assert!(!load_b);
    }

    #[test]
    fn rgb_gltf_images_are_expanded_to_rgba() {
        let data = gltf::image::Data {
            pixels: vec![10, 20, 30, 40, 50, 60],
            format: gltf::image::Format::R8G8B8,
            width: 2,
            height: 1,
        };

        let texture = TextureData::from_gltf_image(data).unwrap();
        assert_eq!(texture.pixels, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }
}
