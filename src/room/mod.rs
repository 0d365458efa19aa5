use std::f32::consts::FRAC_PI_2;
use std::path::{Path, PathBuf};

use glam::{Quat, Vec3};

use crate::{
    animation::clip::AnimationClip,
    asset_pipeline::loader::{Asset, AssetLoader, GltfImport, Loaded},
    camera::PerspectiveCamera,
    config::RoomConfig,
    lights::Lights,
    material_manager::{ColorSpace, MaterialId, MaterialManager, TextureId, TextureManager},
    orbit_controls::OrbitControls,
    scene_graph::{object3d::ObjectId, scene::Scene},
    video::VideoPlayer,
};

pub mod character;
pub mod controls;
pub mod layout;

use character::{Character, CharacterRequest};
use controls::{ControlAction, ControlPanel};
use layout::{RoomLayout, RoomLights};

const SOFA_POSITION: Vec3 = Vec3::new(0.0, -8.5, 15.0);
const SOFA_SCALE: f32 = 16.0;
const SOFA_ROUGHNESS: f32 = 0.4;
const FAN_POSITION: Vec3 = Vec3::new(0.0, 9.9, 0.0);
const FAN_SCALE: f32 = 0.01;
/// Radians per 60 Hz frame.
const FAN_SPEED: f32 = 0.1;

/// What a finished load is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKey {
    Texture(TextureId),
    Sofa,
    Fan,
    Character,
    WalkClip,
    SitClip,
    Video(usize),
}

struct Fan {
    root: ObjectId,
    angle: f32,
}

pub struct RoomState {
    pub config: RoomConfig,
    pub scene: Scene,
    pub materials: MaterialManager,
    pub textures: TextureManager,
    pub lights: Lights,
    pub camera: PerspectiveCamera,
    pub orbit: OrbitControls,
    pub video: VideoPlayer,
    pub panel: ControlPanel,
    pub character: Option<Character>,
    /// Walk or sit asked for while the character was still loading.
    pending_request: Option<CharacterRequest>,
    layout: RoomLayout,
    room_lights: RoomLights,
    wall_textures: Vec<TextureId>,
    floor_textures: Vec<TextureId>,
    fan: Option<Fan>,
    fan_on: bool,
    loader: AssetLoader<AssetKey>,
}

impl RoomState {
    /// Builds the static room and starts loading every external asset.
    pub fn new(config: RoomConfig, width: u32, height: u32) -> Self {
        let loader = AssetLoader::new();
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let mut textures = TextureManager::new();
        let mut lights = Lights::new();

        let load_texture = |textures: &mut TextureManager, relative: &str, color_space| {
            let path = config.asset_path(relative);
            let (id, should_load) = textures.create_for_path(&path, color_space);
            if should_load {
                loader.request_image(AssetKey::Texture(id), path);
            }
            id
        };

        // Wall and floor maps stay linear, only the door is tagged sRGB.
        let wall_textures: Vec<TextureId> = config
            .wall_textures
            .iter()
            .map(|relative| load_texture(&mut textures, relative, ColorSpace::Linear))
            .collect();
        let floor_textures: Vec<TextureId> = config
            .floor_textures
            .iter()
            .map(|relative| load_texture(&mut textures, relative, ColorSpace::Linear))
            .collect();
        let door_texture = load_texture(&mut textures, &config.door_texture, ColorSpace::Srgb);

        let wall_texture = wall_textures.first().copied();
        let floor_texture = floor_textures.first().copied();
        if wall_texture.is_none() || floor_texture.is_none() {
            log::error!("No wall or floor textures configured, leaving them unmapped");
        }

        let room_layout = layout::build_room(
            &mut scene,
            &mut materials,
            wall_texture,
            floor_texture,
            door_texture,
        );
        let room_lights = layout::add_lights(&mut lights);

        let video_texture = textures.create("Video", ColorSpace::Srgb);
        let video_sources: Vec<PathBuf> = config
            .video_sources
            .iter()
            .map(|relative| config.asset_path(relative))
            .collect();
        let video = VideoPlayer::new(video_sources, video_texture);
        match video.current_source() {
            Some(source) => {
                layout::setup_screen(&mut scene, &mut materials, video_texture);
                loader.request_frames(AssetKey::Video(0), source.to_path_buf());
            }
            None => log::error!("No video sources configured, the TV has no screen"),
        }

        loader.request_gltf(AssetKey::Sofa, config.asset_path(&config.sofa_model));
        loader.request_gltf(AssetKey::Fan, config.asset_path(&config.fan_model));
        loader.request_gltf(
            AssetKey::Character,
            config.asset_path(&config.character_model),
        );

        let camera = PerspectiveCamera::new(&config.camera, width, height);
        let orbit = OrbitControls::new(config.orbit.clone(), height);

        log::info!(
            "Room ready, {} assets loading from {}",
            loader.pending(),
            config.asset_root.display()
        );

        Self {
            config,
            scene,
            materials,
            textures,
            lights,
            camera,
            orbit,
            video,
            panel: ControlPanel::default(),
            character: None,
            pending_request: None,
            layout: room_layout,
            room_lights,
            wall_textures,
            floor_textures,
            fan: None,
            fan_on: false,
            loader,
        }
    }

    pub fn wall_material(&self) -> MaterialId {
        self.layout.wall_material
    }

    pub fn floor_material(&self) -> MaterialId {
        self.layout.floor_material
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_size(width, height);
        self.orbit.set_viewport_height(height);
    }

    pub fn set_lights_on(&mut self, on: bool) {
        self.room_lights.set_on(&mut self.lights, on);
    }

    pub fn apply(&mut self, action: ControlAction) {
        log::debug!("{:?}", action);

        match action {
            ControlAction::SetLights(on) => self.set_lights_on(on),
            ControlAction::SetFan(on) => self.fan_on = on,
            ControlAction::PlayTv => self.video.play(),
            ControlAction::PauseTv => self.video.pause(),
            ControlAction::MuteTv => self.video.mute(),
            ControlAction::UnmuteTv => self.video.unmute(),
            ControlAction::ChangeVideo => {
                if let Some(source) = self.video.change_video().map(Path::to_path_buf) {
                    self.loader
                        .request_frames(AssetKey::Video(self.video.index()), source);
                }
            }
            ControlAction::WalkToSofa => self.request_character(CharacterRequest::Walk),
            ControlAction::Sit => self.request_character(CharacterRequest::Sit),
            ControlAction::SetWallTexture(index) => {
                let texture = self.wall_textures.get(index).copied();
                self.set_material_map(self.layout.wall_material, texture, index);
            }
            ControlAction::SetFloorTexture(index) => {
                let texture = self.floor_textures.get(index).copied();
                self.set_material_map(self.layout.floor_material, texture, index);
            }
        }
    }

    /// Requests made before the character has loaded are kept and applied on
    /// arrival. The first one wins, like a request to a busy character.
    fn request_character(&mut self, request: CharacterRequest) {
        match &mut self.character {
            Some(character) => character.request(request),
            None => {
                log::info!("Character still loading, {:?} starts once it arrives", request);
                self.pending_request = self.pending_request.or(Some(request));
            }
        }
    }

    fn set_material_map(&mut self, material: MaterialId, texture: Option<TextureId>, index: usize) {
        let Some(texture) = texture else {
            log::warn!("No texture {}", index);
            return;
        };

        if let Some(material) = self.materials.get_mut(material) {
            material.set_map(Some(texture));
        }
    }

    /// Integrates finished loads. Called once per frame, before `update`.
    pub fn poll_assets(&mut self) {
        for Loaded { key, path, asset } in self.loader.poll() {
            match (key, asset) {
                (AssetKey::Texture(id), Asset::Image(data)) => self.textures.set_data(id, data),
                (AssetKey::Video(index), Asset::Frames(frames)) => {
                    self.video.set_frames(index, frames, &mut self.textures)
                }
                (AssetKey::Sofa, Asset::Gltf(import)) => self.add_sofa(&path, &import),
                (AssetKey::Fan, Asset::Gltf(import)) => self.add_fan(&path, &import),
                (AssetKey::Character, Asset::Gltf(import)) => self.add_character(&path, &import),
                (AssetKey::WalkClip | AssetKey::SitClip, Asset::Gltf(import)) => {
                    self.add_clip(key, &path, &import)
                }
                (key, _) => log::warn!("Unexpected asset type for {:?} ({})", key, path.display()),
            }
        }
    }

    fn spawn(&mut self, path: &Path, import: &GltfImport) -> Option<ObjectId> {
        let file_name = path
            .strip_prefix(&self.config.asset_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        match self
            .scene
            .spawn_gltf_scene(&mut self.materials, &mut self.textures, &file_name, import)
        {
            Ok(root) => Some(root),
            Err(e) => {
                log::error!("Failed to spawn {}: {:#}", file_name, e);
                None
            }
        }
    }

    fn add_sofa(&mut self, path: &Path, import: &GltfImport) {
        let Some(root) = self.spawn(path, import) else {
            return;
        };

        self.scene.set_object_transform(
            root,
            SOFA_POSITION,
            Quat::from_rotation_y(-FRAC_PI_2),
            Vec3::splat(SOFA_SCALE),
        );

        let mut sofa_materials = Vec::new();
        self.scene.traverse_mut(root, |object| {
            if object.model_id.is_some() {
                object.cast_shadow = true;
                object.receive_shadow = true;
            }
        });
        for id in self.scene.descendants(root) {
            if let Some(model) = self.scene.objects[id]
                .model_id
                .and_then(|model_id| self.scene.get_model(model_id))
            {
                sofa_materials.extend(model.materials.iter().copied());
            }
        }
        for material in sofa_materials {
            if let Some(material) = self.materials.get_mut(material) {
                material.set_roughness(SOFA_ROUGHNESS);
            }
        }
    }

    fn add_fan(&mut self, path: &Path, import: &GltfImport) {
        let Some(root) = self.spawn(path, import) else {
            return;
        };

        self.scene.set_object_transform(
            root,
            FAN_POSITION,
            Quat::IDENTITY,
            Vec3::splat(FAN_SCALE),
        );
        self.fan = Some(Fan { root, angle: 0.0 });
    }

    fn add_character(&mut self, path: &Path, import: &GltfImport) {
        let Some(root) = self.spawn(path, import) else {
            return;
        };

        self.attach_character(root);
    }

    fn attach_character(&mut self, root: ObjectId) {
        let mut character = Character::new(&mut self.scene, root);
        if let Some(request) = self.pending_request.take() {
            log::info!("Applying {:?} requested while loading", request);
            character.request(request);
        }
        self.character = Some(character);

        self.loader.request_gltf(
            AssetKey::WalkClip,
            self.config.asset_path(&self.config.walk_clip),
        );
        self.loader.request_gltf(
            AssetKey::SitClip,
            self.config.asset_path(&self.config.sit_clip),
        );
    }

    fn add_clip(&mut self, key: AssetKey, path: &Path, import: &GltfImport) {
        let Some(character) = &mut self.character else {
            return;
        };

        let clip = match AnimationClip::first_from_gltf(import) {
            Ok(clip) => clip,
            Err(e) => {
                log::error!("No usable animation in {}: {:#}", path.display(), e);
                return;
            }
        };

        log::info!("Loaded clip {} ({:.2}s)", clip.name, clip.duration);
        if key == AssetKey::SitClip {
            character.set_sit_clip(clip);
        } else {
            character.set_walk_clip(clip);
        }
    }

    /// Advances the room by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.poll_assets();

        if let (true, Some(fan)) = (self.fan_on, &mut self.fan) {
            fan.angle += FAN_SPEED * dt * 60.0;
            self.scene
                .set_object_rotation(fan.root, Quat::from_rotation_y(fan.angle));
        }

        if let Some(character) = &mut self.character {
            character.update(dt, &mut self.scene);
        }

        self.video.advance(dt, &mut self.textures);
        self.orbit.update(&mut self.camera);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::character::{CharacterState, WALK_TARGET};
    use crate::room::layout::{EXTRA_ON_INTENSITY, TUBE_ON_INTENSITY};
    use crate::scene_graph::object3d::Object3D;

    fn room() -> (RoomState, tempfile::TempDir) {
        // An empty asset root: every load fails and is only logged.
        let dir = tempfile::tempdir().unwrap();
        let config = RoomConfig {
            asset_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        (RoomState::new(config, 800, 600), dir)
    }

    fn intensities(state: &RoomState) -> (f32, Vec<f32>) {
        let tube = state.lights.get(state.room_lights.tube).unwrap().intensity;
        let extras = state
            .room_lights
            .extras
            .iter()
            .map(|&id| state.lights.get(id).unwrap().intensity)
            .collect();
        (tube, extras)
    }

    #[test]
    fn light_toggle_sets_exact_intensities() {
        let (mut state, _dir) = room();

        state.apply(ControlAction::SetLights(false));
        let (tube, extras) = intensities(&state);
        assert_eq!(tube, 0.0);
        assert!(extras.iter().all(|&i| i == 0.0));

        state.apply(ControlAction::SetLights(true));
        let (tube, extras) = intensities(&state);
        assert_eq!(tube, TUBE_ON_INTENSITY);
        assert_eq!(extras, vec![EXTRA_ON_INTENSITY; 6]);
    }

    #[test]
    fn selecting_a_texture_swaps_the_map_and_flags_the_material() {
        let (mut state, _dir) = room();
        let wall = state.wall_material();
        state.materials.get_mut(wall).unwrap().take_needs_update();

        state.apply(ControlAction::SetWallTexture(2));

        let material = state.materials.get(wall).unwrap();
        assert_eq!(material.map, Some(state.wall_textures[2]));
        assert!(material.needs_update());

        state.apply(ControlAction::SetFloorTexture(3));
        let floor = state.materials.get(state.floor_material()).unwrap();
        assert_eq!(floor.map, Some(state.floor_textures[3]));
    }

    #[test]
    fn out_of_range_texture_is_ignored() {
        let (mut state, _dir) = room();
        let wall = state.wall_material();
        state.materials.get_mut(wall).unwrap().take_needs_update();

        state.apply(ControlAction::SetWallTexture(9));

        let material = state.materials.get(wall).unwrap();
        assert_eq!(material.map, Some(state.wall_textures[0]));
        assert!(!material.needs_update());
    }

    #[test]
    fn resize_updates_the_projection() {
        let (mut state, _dir) = room();
        let before = state.camera.projection_matrix();

        state.resize(1000, 500);

        assert_eq!(state.camera.aspect(), 2.0);
        assert_ne!(state.camera.projection_matrix(), before);
        assert_eq!(
            state.camera.projection_matrix(),
            glam::Mat4::perspective_rh(45f32.to_radians(), 2.0, 0.1, 1000.0)
        );
    }

    #[test]
    fn tv_controls_drive_the_player() {
        let (mut state, _dir) = room();
        assert!(!state.video.is_playing());
        assert!(state.video.is_muted());

        state.apply(ControlAction::PlayTv);
        state.apply(ControlAction::UnmuteTv);
        assert!(state.video.is_playing());
        assert!(!state.video.is_muted());

        state.apply(ControlAction::ChangeVideo);
        assert_eq!(state.video.index(), 1);
        assert!(state.video.is_playing());
    }

    #[test]
    fn walking_before_the_character_loads_starts_on_arrival() {
        let (mut state, _dir) = room();
        state.apply(ControlAction::WalkToSofa);
        state.apply(ControlAction::Sit);
        state.update(1.0 / 60.0);
        assert!(state.character.is_none());

        let root = state.scene.add_object(Object3D::new("character"));
        state.attach_character(root);
        assert!(state.character.as_ref().unwrap().steering.is_walking());

        for _ in 0..600 {
            state.update(1.0 / 60.0);
        }

        // The clips cannot load from an empty asset root, so it stops standing.
        let steering = &state.character.as_ref().unwrap().steering;
        assert_eq!(steering.state(), CharacterState::Idle);
        assert_eq!(steering.position, WALK_TARGET);
        assert_eq!(state.scene.objects[root].transform.translation(), WALK_TARGET);
    }

    #[test]
    fn an_empty_config_builds_a_bare_room() {
        let dir = tempfile::tempdir().unwrap();
        let config = RoomConfig {
            asset_root: dir.path().to_path_buf(),
            wall_textures: Vec::new(),
            floor_textures: Vec::new(),
            video_sources: Vec::new(),
            ..Default::default()
        };
        let mut state = RoomState::new(config, 800, 600);

        assert_eq!(state.materials.get(state.wall_material()).unwrap().map, None);
        assert_eq!(state.materials.get(state.floor_material()).unwrap().map, None);
        assert!(state.scene.get_object_by_name(layout::SCREEN_NAME).is_none());

        state.apply(ControlAction::ChangeVideo);
        state.apply(ControlAction::SetWallTexture(0));
        state.update(1.0 / 60.0);
        assert_eq!(state.video.index(), 0);
    }

    #[test]
    fn the_room_has_one_screen() {
        let (state, _dir) = room();
        let screen = state.scene.get_object_by_name(layout::SCREEN_NAME).unwrap();
        assert_eq!(state.scene.objects[screen].render_order, 1);
    }
}
