//! The static part of the room: walls, floor, door, TV and light fixtures.

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};

use crate::{
    color::Color,
    geometry::{box_geometry, cylinder_geometry, plane_geometry},
    lights::{Light, LightId, LightKind, Lights, ShadowCamera},
    material_manager::{Material, MaterialId, MaterialManager, Side, TextureId},
    model::{Model, ModelPrimitive},
    scene_graph::{
        object3d::{Object3D, ObjectId},
        scene::Scene,
        scene_model::SceneModel,
        transform::Transform,
    },
};

pub const SCREEN_NAME: &str = "screenMesh";

const FLOOR_Y: f32 = -12.5;
const DOOR_WIDTH: f32 = 8.0;
const DOOR_HEIGHT: f32 = 18.0;

const TUBE_POSITION: Vec3 = Vec3::new(24.5, 10.0, 0.0);
const EXTRA_LIGHT_POSITIONS: [Vec3; 6] = [
    Vec3::new(-24.0, 12.0, -24.0),
    Vec3::new(24.0, 12.0, -24.0),
    Vec3::new(-24.0, 12.0, 24.0),
    Vec3::new(24.0, 12.0, 24.0),
    Vec3::new(0.0, 12.0, -24.0),
    Vec3::new(0.0, 12.0, 24.0),
];

pub const TUBE_ON_INTENSITY: f32 = 6.0;
pub const EXTRA_ON_INTENSITY: f32 = 3.0;

/// Materials whose maps the texture controls swap.
pub struct RoomLayout {
    pub wall_material: MaterialId,
    pub floor_material: MaterialId,
}

/// The lights behind the "Toggle Lights" control.
pub struct RoomLights {
    pub tube: LightId,
    pub extras: Vec<LightId>,
}

/// Adds a single-primitive mesh as a root object.
pub fn add_mesh(
    scene: &mut Scene,
    name: &str,
    primitive: ModelPrimitive,
    material: MaterialId,
    transform: Transform,
) -> ObjectId {
    let model_id = scene.add_model(SceneModel::new(
        Model::from_primitive(name, primitive),
        vec![material],
    ));

    scene.add_object(
        Object3D::new(name)
            .with_model(model_id)
            .with_transform(transform),
    )
}

pub fn build_room(
    scene: &mut Scene,
    materials: &mut MaterialManager,
    wall_texture: Option<TextureId>,
    floor_texture: Option<TextureId>,
    door_texture: TextureId,
) -> RoomLayout {
    let wall_material = materials.add_material(
        Material::standard("Walls")
            .with_map(wall_texture)
            .with_side(Side::Back),
    );
    let room = add_mesh(
        scene,
        "Room",
        box_geometry(50.0, 25.0, 50.0),
        wall_material,
        Transform::default(),
    );
    scene.objects[room].receive_shadow = true;

    let floor_material = materials.add_material(
        Material::standard("Floor")
            .with_map(floor_texture)
            .without_depth_test(),
    );
    let floor = add_mesh(
        scene,
        "Floor",
        plane_geometry(50.0, 50.0),
        floor_material,
        Transform::from_trs(
            Vec3::new(0.0, FLOOR_Y, 0.0),
            Quat::from_rotation_x(-FRAC_PI_2),
            Vec3::ONE,
        ),
    );
    scene.objects[floor].receive_shadow = true;
    // Drawn before everything else since it ignores depth.
    scene.objects[floor].render_order = -1;

    let door_material = materials.add_material(
        Material::standard("Door")
            .with_map(door_texture)
            .with_side(Side::Double),
    );
    let door = add_mesh(
        scene,
        "Door",
        box_geometry(DOOR_WIDTH, DOOR_HEIGHT, 0.3),
        door_material,
        Transform::from_trs(
            Vec3::new(-24.9, FLOOR_Y + DOOR_HEIGHT / 2.0, 0.0),
            Quat::from_rotation_y(FRAC_PI_2),
            Vec3::ONE,
        ),
    );
    scene.objects[door].cast_shadow = true;

    let frame_material = materials
        .add_material(Material::standard("Door frame").with_color(Color::from_hex(0x4a3c2a)));
    add_mesh(
        scene,
        "Door frame",
        box_geometry(8.4, 18.4, 0.2),
        frame_material,
        Transform::from_trs(
            Vec3::new(-24.95, FLOOR_Y + 9.0, 0.0),
            Quat::from_rotation_y(FRAC_PI_2),
            Vec3::ONE,
        ),
    );

    let handle_material = materials
        .add_material(Material::standard("Door handle").with_color(Color::from_hex(0x666666)));
    add_mesh(
        scene,
        "Door handle",
        cylinder_geometry(0.1, 0.1, 0.5, 32),
        handle_material,
        Transform::from_trs(
            Vec3::new(
                -24.85,
                FLOOR_Y + DOOR_HEIGHT / 2.0 - 2.0,
                -DOOR_WIDTH / 2.0 + 0.5,
            ),
            Quat::from_rotation_z(FRAC_PI_2),
            Vec3::ONE,
        ),
    );

    let tv_material =
        materials.add_material(Material::standard("TV").with_color(Color::from_hex(0x222222)));
    let tv = add_mesh(
        scene,
        "TV",
        box_geometry(17.0, 10.0, 0.3),
        tv_material,
        Transform::from_translation(Vec3::new(0.0, 3.0, -25.0)),
    );
    scene.objects[tv].cast_shadow = true;

    let housing_material = materials
        .add_material(Material::standard("Tube housing").with_color(Color::from_hex(0xaaaaaa)));
    add_mesh(
        scene,
        "Tube housing",
        box_geometry(6.0, 0.3, 0.5),
        housing_material,
        Transform::from_trs(TUBE_POSITION, tube_rotation(), Vec3::ONE),
    );

    RoomLayout {
        wall_material,
        floor_material,
    }
}

/// Adds the TV screen showing `video_texture`, replacing an earlier screen.
pub fn setup_screen(
    scene: &mut Scene,
    materials: &mut MaterialManager,
    video_texture: TextureId,
) -> ObjectId {
    if let Some(old) = scene.get_object_by_name(SCREEN_NAME) {
        scene.remove_object(old);
    }

    let material = materials.add_material(
        Material::basic("Screen")
            .with_map(video_texture)
            .with_side(Side::Double)
            .without_depth_test(),
    );
    let screen = add_mesh(
        scene,
        SCREEN_NAME,
        plane_geometry(16.5, 9.3),
        material,
        Transform::from_translation(Vec3::new(0.0, 3.0, -24.95)),
    );
    // Sits on top of the TV body, which it would otherwise z-fight with.
    if let Some(object) = scene.get_object_mut(screen) {
        object.render_order = 1;
    }
    screen
}

fn tube_rotation() -> Quat {
    Quat::from_rotation_y(-FRAC_PI_2)
}

pub fn add_lights(lights: &mut Lights) -> RoomLights {
    let white = Color::from_hex(0xffffff);

    lights.add(Light::ambient("Ambient", white, 0.6));

    lights.add(
        Light::directional("Sun", white, 0.5, Vec3::new(10.0, 20.0, 10.0)).with_shadow(
            ShadowCamera {
                left: -30.0,
                right: 30.0,
                top: 30.0,
                bottom: -30.0,
                near: 0.5,
                far: 50.0,
                map_size: 4096,
            },
        ),
    );

    let mut spot = Light::spot(
        "Sofa spot",
        Color::from_hex(0xfff5e1),
        1.5,
        Vec3::new(0.0, 15.0, 5.0),
        std::f32::consts::PI / 6.0,
        0.3,
    );
    spot.cast_shadow = true;
    lights.add(spot);

    let mut tube = Light::rect_area("Tube", white, TUBE_ON_INTENSITY, 6.0, 0.5);
    tube.position = TUBE_POSITION;
    if let LightKind::RectArea { rotation, .. } = &mut tube.kind {
        *rotation = tube_rotation();
    }
    let tube = lights.add(tube);

    // Start dark even though the light toggle starts on; the first toggle
    // brings them up.
    let extras = EXTRA_LIGHT_POSITIONS
        .iter()
        .enumerate()
        .map(|(i, &position)| {
            lights.add(Light::point(
                format!("Extra light {}", i + 1),
                white,
                0.0,
                position,
                40.0,
            ))
        })
        .collect();

    RoomLights {
        tube,
        extras,
    }
}

impl RoomLights {
    pub fn set_on(&self, lights: &mut Lights, on: bool) {
        lights.set_intensity(self.tube, if on { TUBE_ON_INTENSITY } else { 0.0 });
        for &extra in &self.extras {
            lights.set_intensity(extra, if on { EXTRA_ON_INTENSITY } else { 0.0 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material_manager::{ColorSpace, TextureManager};

    fn textures() -> (TextureManager, [TextureId; 4]) {
        let mut textures = TextureManager::new();
        let ids = ["wall", "floor", "door", "video"]
            .map(|name| textures.create(name, ColorSpace::Srgb));
        (textures, ids)
    }

    #[test]
    fn builds_the_room_with_its_shadow_flags() {
        let (_, [wall, floor, door, _]) = textures();
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();

        let layout = build_room(&mut scene, &mut materials, Some(wall), Some(floor), door);
        scene.late_update();
        let [room, floor, door, tv] =
            ["Room", "Floor", "Door", "TV"].map(|name| scene.get_object_by_name(name).unwrap());

        assert!(scene.objects[room].receive_shadow);
        assert!(scene.objects[door].cast_shadow);
        assert!(scene.objects[tv].cast_shadow);
        assert_eq!(scene.objects[floor].render_order, -1);
        assert!(!materials.get(layout.floor_material).unwrap().depth_test);
        assert_eq!(materials.get(layout.wall_material).unwrap().side, Side::Back);

        let door_position = scene.objects[door].transform.world_position();
        assert!(door_position.abs_diff_eq(Vec3::new(-24.9, -3.5, 0.0), 1e-5));

        // The floor plane faces up after its rotation.
        let floor_normal = scene.world_matrix(floor).transform_vector3(Vec3::Z);
        assert!(floor_normal.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn setting_up_the_screen_twice_keeps_one_screen() {
        let (_, [_, _, _, video]) = textures();
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();

        let first = setup_screen(&mut scene, &mut materials, video);
        let second = setup_screen(&mut scene, &mut materials, video);

        assert_ne!(first, second);
        assert_eq!(scene.get_object_by_name(SCREEN_NAME), Some(second));
        assert!(!scene.is_rendered(first));
    }

    #[test]
    fn extra_lights_start_dark() {
        let mut lights = Lights::new();
        let room_lights = add_lights(&mut lights);

        assert_eq!(lights.get(room_lights.tube).unwrap().intensity, 6.0);
        assert!(room_lights
            .extras
            .iter()
            .all(|&id| lights.get(id).unwrap().intensity == 0.0));
        assert_eq!(lights.shadow_caster().unwrap().name, "Sun");
    }
}
