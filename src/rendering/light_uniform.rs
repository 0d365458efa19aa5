use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::lights::{LightKind, Lights};

pub const MAX_LIGHTS: usize = 16;

const KIND_AMBIENT: f32 = 0.0;
const KIND_DIRECTIONAL: f32 = 1.0;
const KIND_SPOT: f32 = 2.0;
const KIND_RECT_AREA: f32 = 3.0;
const KIND_POINT: f32 = 4.0;

const SHADOW_BIAS: f32 = 0.0005;

/// Mirrors `Light` in `shared/lighting.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable, PartialEq)]
pub struct GpuLight {
    /// rgb: colour times intensity, w: kind.
    pub color: [f32; 4],
    /// xyz: position, w: cutoff distance (0 for none).
    pub position: [f32; 4],
    /// xyz: direction the light travels, w: decay.
    pub direction: [f32; 4],
    /// Directional: x is 1.0 for the shadow caster. Spot: cos of the outer and
    /// inner cone. Rect area: half width and height.
    pub params: [f32; 4],
    /// Rect area width axis.
    pub right: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LightsUniform {
    pub lights: [GpuLight; MAX_LIGHTS],
    pub count: u32,
    _padding: [u32; 3],
    pub shadow_view_proj: [[f32; 4]; 4],
    /// x: map size, y: bias, z: 1.0 when a shadow map is bound.
    pub shadow: [f32; 4],
}

impl LightsUniform {
    pub fn from_lights(lights: &Lights) -> Self {
        let mut uniform = Self::zeroed();

        // Only one light gets the shadow map.
        let shadow_caster = lights
            .iter()
            .find(|(_, light)| light.shadow_view_projection().is_some())
            .map(|(id, _)| id);

        let packed = lights
            .iter()
            .filter(|(_, light)| light.intensity > 0.0)
            .map(|(id, light)| {
                let radiance = light.color.linear() * light.intensity;

                match &light.kind {
                    LightKind::Ambient => GpuLight {
                        color: radiance.extend(KIND_AMBIENT).to_array(),
                        ..Default::default()
                    },
                    LightKind::Directional { target, .. } => GpuLight {
                        color: radiance.extend(KIND_DIRECTIONAL).to_array(),
                        position: light.position.extend(0.0).to_array(),
                        direction: direction(light.position, *target).extend(0.0).to_array(),
                        params: [
                            if Some(id) == shadow_caster { 1.0 } else { 0.0 },
                            0.0,
                            0.0,
                            0.0,
                        ],
                        ..Default::default()
                    },
                    LightKind::Spot {
                        target,
                        angle,
                        penumbra,
                        distance,
                        decay,
                    } => GpuLight {
                        color: radiance.extend(KIND_SPOT).to_array(),
                        position: light.position.extend(*distance).to_array(),
                        direction: direction(light.position, *target).extend(*decay).to_array(),
                        params: [angle.cos(), (angle * (1.0 - penumbra)).cos(), 0.0, 0.0],
                        ..Default::default()
                    },
                    LightKind::RectArea {
                        width,
                        height,
                        rotation,
                    } => GpuLight {
                        color: radiance.extend(KIND_RECT_AREA).to_array(),
                        position: light.position.extend(0.0).to_array(),
                        direction: (*rotation * Vec3::Z).extend(0.0).to_array(),
                        params: [width / 2.0, height / 2.0, 0.0, 0.0],
                        right: (*rotation * Vec3::X).extend(0.0).to_array(),
                    },
                    LightKind::Point { distance, decay } => GpuLight {
                        color: radiance.extend(KIND_POINT).to_array(),
                        position: light.position.extend(*distance).to_array(),
                        direction: [0.0, 0.0, 0.0, *decay],
                        ..Default::default()
                    },
                }
            });

        let mut count = 0;
        for (slot, light) in uniform.lights.iter_mut().zip(packed) {
            *slot = light;
            count += 1;
        }

        let lit = lights
            .iter()
            .filter(|(_, light)| light.intensity > 0.0)
            .count();
        if lit > MAX_LIGHTS {
            log::warn!("{} lights are on, only {} are shaded", lit, MAX_LIGHTS);
        }

        uniform.count = count;
        uniform.shadow_view_proj = Mat4::IDENTITY.to_cols_array_2d();
        uniform
    }

    pub fn set_shadow(&mut self, view_proj: Mat4, map_size: u32) {
        self.shadow_view_proj = view_proj.to_cols_array_2d();
        self.shadow = [map_size as f32, SHADOW_BIAS, 1.0, 0.0];
    }
}

fn direction(from: Vec3, to: Vec3) -> Vec3 {
    (to - from).normalize_or(Vec3::NEG_Y)
}

pub struct LightsBuffer {
    buffer: wgpu::Buffer,
}

impl LightsBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lights uniform buffer"),
            contents: bytemuck::cast_slice(&[LightsUniform::zeroed()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self { buffer }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn update(&self, queue: &wgpu::Queue, uniform: &LightsUniform) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[*uniform]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{color::Color, lights::Light};

    #[test]
    fn layout_matches_the_shader() {
        assert_eq!(std::mem::size_of::<GpuLight>(), 80);
        assert_eq!(std::mem::size_of::<LightsUniform>(), 80 * MAX_LIGHTS + 16 + 64 + 16);
    }

    #[test]
    fn dark_lights_are_skipped() {
        let mut lights = Lights::new();
        lights.add(Light::ambient("ambient", Color::WHITE, 0.6));
        lights.add(Light::point("off", Color::WHITE, 0.0, Vec3::Y, 40.0));

        let uniform = LightsUniform::from_lights(&lights);

        assert_eq!(uniform.count, 1);
        assert_eq!(uniform.lights[0].color[3], KIND_AMBIENT);
        assert!((uniform.lights[0].color[0] - 0.6).abs() < 1e-6);
        assert_eq!(uniform.shadow[2], 0.0);
    }

    #[test]
    fn spot_cone_narrows_with_penumbra() {
        let mut lights = Lights::new();
        lights.add(Light::spot(
            "spot",
            Color::WHITE,
            1.5,
            Vec3::new(0.0, 15.0, 5.0),
            std::f32::consts::PI / 6.0,
            0.3,
        ));

        let light = LightsUniform::from_lights(&lights).lights[0];
        let [outer, inner, ..] = light.params;

        assert!(inner > outer);
        assert!(light.direction[1] < 0.0);
        assert_eq!(light.direction[3], 2.0);
    }

    #[test]
    fn only_the_first_caster_is_shadowed() {
        let shadow = crate::lights::ShadowCamera {
            left: -30.0,
            right: 30.0,
            top: 30.0,
            bottom: -30.0,
            near: 0.5,
            far: 50.0,
            map_size: 4096,
        };
        let mut lights = Lights::new();
        lights.add(Light::directional("fill", Color::WHITE, 0.2, Vec3::Y));
        lights.add(
            Light::directional("sun", Color::WHITE, 0.5, Vec3::new(10.0, 20.0, 10.0))
                .with_shadow(shadow.clone()),
        );
        lights.add(Light::directional("moon", Color::WHITE, 0.1, Vec3::X).with_shadow(shadow));

        let uniform = LightsUniform::from_lights(&lights);
        let flags: Vec<f32> = uniform.lights[..3].iter().map(|l| l.params[0]).collect();

        assert_eq!(flags, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn caps_the_number_of_lights() {
        let mut lights = Lights::new();
        for i in 0..20 {
            lights.add(Light::point(format!("p{}", i), Color::WHITE, 1.0, Vec3::ZERO, 10.0));
        }

        assert_eq!(LightsUniform::from_lights(&lights).count, MAX_LIGHTS as u32);
    }

    #[test]
    fn rect_light_faces_along_its_rotation() {
        let mut lights = Lights::new();
        let mut tube = Light::rect_area("tube", Color::WHITE, 6.0, 6.0, 0.5);
        if let LightKind::RectArea { rotation, .. } = &mut tube.kind {
            *rotation = glam::Quat::from_rotation_y(-std::f32::consts::FRAC_PI_2);
        }
        lights.add(tube);

        let light = LightsUniform::from_lights(&lights).lights[0];
        let facing = Vec3::from_slice(&light.direction);

        assert!(facing.abs_diff_eq(Vec3::NEG_X, 1e-5));
        assert_eq!(light.params[0], 3.0);
    }
}
