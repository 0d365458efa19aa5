use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::config::CameraConfig;

/// Right-handed perspective camera looking at `target`.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    fov_y_degrees: f32,
    aspect: f32,
    near: f32,
    far: f32,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, width: u32, height: u32) -> Self {
        let mut camera = Self {
            position: config.position,
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees: config.fov_y_degrees,
            aspect: 1.0,
            near: config.near,
            far: config.far,
            projection: Mat4::IDENTITY,
        };

        camera.set_size(width, height);
        camera.update_projection_matrix();
        camera
    }

    /// Ignores zero-sized windows, which winit reports while minimized.
    pub fn set_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.aspect = width as f32 / height as f32;
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        );
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fov_y_degrees(&self) -> f32 {
        self.fov_y_degrees
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view_matrix()
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Default)]
pub struct CameraUniform {
    view_proj: Mat4,
    eye: [f32; 4],
}

impl CameraUniform {
    pub fn update(&mut self, camera: &PerspectiveCamera) {
        self.view_proj = camera.view_projection();
        self.eye = camera.position.extend(1.0).to_array();
    }

    /// For the shadow pass, where only the matrix matters.
    pub fn from_view_projection(view_proj: Mat4, eye: Vec3) -> Self {
        Self {
            view_proj,
            eye: eye.extend(1.0).to_array(),
        }
    }

    pub fn create_buffer(&self, device: &wgpu::Device, label: &str) -> wgpu::Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&[*self]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }

    pub fn update_buffer(&self, queue: &wgpu::Queue, buffer: &wgpu::Buffer) {
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[*self]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_the_configured_pose() {
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 1600, 900);
        assert_eq!(camera.position, Vec3::new(0.0, 8.0, 40.0));
        assert!((camera.aspect() - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn resize_updates_aspect_and_projection() {
        let config = CameraConfig::default();
        let mut camera = PerspectiveCamera::new(&config, 800, 600);
        let before = camera.projection_matrix();

        camera.set_size(1920, 1080);

        let expected = Mat4::perspective_rh(
            config.fov_y_degrees.to_radians(),
            1920.0 / 1080.0,
            config.near,
            config.far,
        );
        assert!((camera.aspect() - 1920.0 / 1080.0).abs() < 1e-6);
        assert!(camera.projection_matrix().abs_diff_eq(expected, 1e-6));
        assert!(!camera.projection_matrix().abs_diff_eq(before, 1e-6));
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut camera = PerspectiveCamera::new(&CameraConfig::default(), 800, 600);
        let before = camera.projection_matrix();

        camera.set_size(0, 600);

        assert_eq!(camera.projection_matrix(), before);
        assert!((camera.aspect() - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn target_projects_to_screen_centre() {
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 800, 600);
        let clip = camera.view_projection() * camera.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;

        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
