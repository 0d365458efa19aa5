use std::path::PathBuf;

use glam::Vec3;

pub const ASSET_ROOT_ENV: &str = "ROOM_ASSETS";

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            position: Vec3::new(0.0, 8.0, 40.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrbitConfig {
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub zoom_speed: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.05,
            min_distance: 5.0,
            max_distance: 38.0,
            zoom_speed: 1.0,
        }
    }
}

/// Every path is relative to `asset_root`.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub asset_root: PathBuf,
    pub wall_textures: Vec<String>,
    pub floor_textures: Vec<String>,
    pub door_texture: String,
    pub sofa_model: String,
    pub fan_model: String,
    pub character_model: String,
    pub walk_clip: String,
    pub sit_clip: String,
    pub video_sources: Vec<String>,
    pub camera: CameraConfig,
    pub orbit: OrbitConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            wall_textures: (1..=4)
                .map(|i| format!("wall textures/wall-texture{i}.jpg"))
                .collect(),
            floor_textures: (1..=4)
                .map(|i| format!("wood floor textures/wood-floor{i}.jpg"))
                .collect(),
            door_texture: "door-texture.jpg".to_string(),
            sofa_model: "GLB/Couch.glb".to_string(),
            fan_model: "GLB/Ceiling fan.glb".to_string(),
            character_model: "character/Standing Idle.glb".to_string(),
            walk_clip: "character/Walking.glb".to_string(),
            sit_clip: "character/Stand To Sit.glb".to_string(),
            video_sources: vec![
                "video.gif".to_string(),
                "video2.gif".to_string(),
                "video3.gif".to_string(),
            ],
            camera: CameraConfig::default(),
            orbit: OrbitConfig::default(),
        }
    }
}

impl RoomConfig {
    /// Defaults, with the asset root taken from `ROOM_ASSETS` when it is set.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var(ASSET_ROOT_ENV) {
            log::info!("Using asset root {root}");
            config.asset_root = PathBuf::from(root);
        }

        config
    }

    pub fn asset_path(&self, relative: &str) -> PathBuf {
        self.asset_root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_texture_sets_have_four_entries() {
        let config = RoomConfig::default();
        assert_eq!(config.wall_textures.len(), 4);
        assert_eq!(config.floor_textures.len(), 4);
        assert_eq!(config.wall_textures[0], "wall textures/wall-texture1.jpg");
        assert_eq!(config.floor_textures[3], "wood floor textures/wood-floor4.jpg");
    }

    #[test]
    fn asset_paths_are_joined_to_the_root() {
        let config = RoomConfig {
            asset_root: PathBuf::from("/srv/room"),
            ..Default::default()
        };

        assert_eq!(
            config.asset_path(&config.sofa_model),
            PathBuf::from("/srv/room/GLB/Couch.glb")
        );
    }
}
