use glam::{Mat4, Quat, Vec3};
use id_arena::{Arena, Id};

use crate::color::Color;

pub type LightId = Id<Light>;

/// Orthographic frustum the directional light renders its shadow map with.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowCamera {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
    pub map_size: u32,
}

impl ShadowCamera {
    pub fn view_projection(&self, position: Vec3, target: Vec3) -> Mat4 {
        let forward = (target - position).normalize_or(Vec3::NEG_Y);
        // look_at breaks down when looking straight along the up vector.
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };

        let view = Mat4::look_at_rh(position, target, up);
        let projection = Mat4::orthographic_rh(
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        );
        projection * view
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Ambient,
    Directional {
        target: Vec3,
        shadow: Option<ShadowCamera>,
    },
    Spot {
        target: Vec3,
        angle: f32,
        penumbra: f32,
        distance: f32,
        decay: f32,
    },
    /// Emits from one side of a `width` x `height` rectangle, along the
    /// rotated +Z axis.
    RectArea {
        width: f32,
        height: f32,
        rotation: Quat,
    },
    Point {
        distance: f32,
        decay: f32,
    },
}

#[derive(Debug, Clone)]
pub struct Light {
    pub name: String,
    pub color: Color,
    pub intensity: f32,
    pub position: Vec3,
    pub cast_shadow: bool,
    pub kind: LightKind,
}

impl Light {
    pub fn ambient(name: impl Into<String>, color: Color, intensity: f32) -> Self {
        Self {
            name: name.into(),
            color,
            intensity,
            position: Vec3::ZERO,
            cast_shadow: false,
            kind: LightKind::Ambient,
        }
    }

    pub fn directional(
        name: impl Into<String>,
        color: Color,
        intensity: f32,
        position: Vec3,
    ) -> Self {
        Self {
            name: name.into(),
            color,
            intensity,
            position,
            cast_shadow: false,
            kind: LightKind::Directional {
                target: Vec3::ZERO,
                shadow: None,
            },
        }
    }

    pub fn spot(
        name: impl Into<String>,
        color: Color,
        intensity: f32,
        position: Vec3,
        angle: f32,
        penumbra: f32,
    ) -> Self {
        Self {
            name: name.into(),
            color,
            intensity,
            position,
            cast_shadow: false,
            kind: LightKind::Spot {
                target: Vec3::ZERO,
                angle,
                penumbra,
                distance: 0.0,
                decay: 2.0,
            },
        }
    }

    pub fn rect_area(
        name: impl Into<String>,
        color: Color,
        intensity: f32,
        width: f32,
        height: f32,
    ) -> Self {
        Self {
            name: name.into(),
            color,
            intensity,
            position: Vec3::ZERO,
            cast_shadow: false,
            kind: LightKind::RectArea {
                width,
                height,
                rotation: Quat::IDENTITY,
            },
        }
    }

    pub fn point(
        name: impl Into<String>,
        color: Color,
        intensity: f32,
        position: Vec3,
        distance: f32,
    ) -> Self {
        Self {
            name: name.into(),
            color,
            intensity,
            position,
            cast_shadow: false,
            kind: LightKind::Point {
                distance,
                decay: 2.0,
            },
        }
    }

    pub fn with_shadow(mut self, camera: ShadowCamera) -> Self {
        self.cast_shadow = true;
        if let LightKind::Directional { shadow, .. } = &mut self.kind {
            *shadow = Some(camera);
        }
        self
    }

    /// Matrix of the shadow-casting directional light, if this is one.
    pub fn shadow_view_projection(&self) -> Option<(Mat4, u32)> {
        match &self.kind {
            LightKind::Directional {
                target,
                shadow: Some(camera),
            } if self.cast_shadow => Some((
                camera.view_projection(self.position, *target),
                camera.map_size,
            )),
            _ => None,
        }
    }
}

pub struct Lights {
    lights: Arena<Light>,
}

impl Lights {
    pub fn new() -> Self {
        Self {
            lights: Arena::new(),
        }
    }

    pub fn add(&mut self, light: Light) -> LightId {
        self.lights.alloc(light)
    }

    pub fn get(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    pub fn get_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    pub fn set_intensity(&mut self, id: LightId, intensity: f32) {
        if let Some(light) = self.lights.get_mut(id) {
            light.intensity = intensity;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter()
    }

    /// The first directional light that casts shadows.
    pub fn shadow_caster(&self) -> Option<&Light> {
        self.lights
            .iter()
            .map(|(_, light)| light)
            .find(|light| light.shadow_view_projection().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sun_shadow() -> ShadowCamera {
        ShadowCamera {
            left: -30.0,
            right: 30.0,
            top: 30.0,
            bottom: -30.0,
            near: 0.5,
            far: 50.0,
            map_size: 4096,
        }
    }

    #[test]
    fn shadow_camera_keeps_the_target_in_view() {
        let sun = Light::directional("sun", Color::WHITE, 0.5, Vec3::new(10.0, 20.0, 10.0))
            .with_shadow(sun_shadow());

        let (view_proj, size) = sun.shadow_view_projection().unwrap();
        let clip = view_proj * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;

        assert_eq!(size, 4096);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn shadow_camera_survives_a_vertical_light() {
        let camera = sun_shadow();
        let view_proj = camera.view_projection(Vec3::new(0.0, 20.0, 0.0), Vec3::ZERO);
        assert!(view_proj.is_finite());
    }

    #[test]
    fn only_directional_lights_with_shadows_are_casters() {
        let mut lights = Lights::new();
        lights.add(Light::ambient("ambient", Color::WHITE, 0.6));
        lights.add(Light::directional("fill", Color::WHITE, 0.5, Vec3::Y));
        assert!(lights.shadow_caster().is_none());

        lights.add(
            Light::directional("sun", Color::WHITE, 0.5, Vec3::new(10.0, 20.0, 10.0))
                .with_shadow(sun_shadow()),
        );
        assert_eq!(lights.shadow_caster().unwrap().name, "sun");
    }
}
