use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use crate::{camera::PerspectiveCamera, config::OrbitConfig};

const EPS: f32 = 0.000001;

#[derive(Debug, Clone, Copy)]
struct Spherical {
    radius: f32,
    // Polar angle from +Y
    phi: f32,
    // Azimuth around +Y, measured from +Z
    theta: f32,
}

impl Spherical {
    fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius == 0.0 {
            return Self {
                radius,
                phi: 0.0,
                theta: 0.0,
            };
        }

        Self {
            radius,
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            theta: offset.x.atan2(offset.z),
        }
    }

    fn to_offset(self) -> Vec3 {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vec3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

/// Orbits the camera around a target with mouse drag and wheel dolly, and
/// pans the target with the secondary button.
/// Input accumulates into a delta that decays by `damping_factor` every update.
pub struct OrbitControls {
    pub target: Vec3,
    config: OrbitConfig,
    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    // Screen pixels dragged since the last update.
    pan_pixels: Vec2,
    pan_offset: Vec3,
    rotating: bool,
    panning: bool,
    last_pointer: Option<Vec2>,
    viewport_height: f32,
}

impl OrbitControls {
    pub fn new(config: OrbitConfig, viewport_height: u32) -> Self {
        Self {
            target: Vec3::ZERO,
            config,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_pixels: Vec2::ZERO,
            pan_offset: Vec3::ZERO,
            rotating: false,
            panning: false,
            last_pointer: None,
            viewport_height: viewport_height.max(1) as f32,
        }
    }

    pub fn set_viewport_height(&mut self, height: u32) {
        if height > 0 {
            self.viewport_height = height as f32;
        }
    }

    pub fn on_rotate_button(&mut self, pressed: bool) {
        self.rotating = pressed;
    }

    pub fn on_pan_button(&mut self, pressed: bool) {
        self.panning = pressed;
    }

    pub fn on_pointer_moved(&mut self, position: Vec2) {
        if let Some(last) = self.last_pointer {
            let delta = position - last;
            if self.rotating {
                self.rotate_left(TAU * delta.x / self.viewport_height);
                self.rotate_up(TAU * delta.y / self.viewport_height);
            } else if self.panning {
                self.pan_pixels += delta;
            }
        }

        self.last_pointer = Some(position);
    }

    /// Positive steps move the camera closer.
    pub fn on_scroll(&mut self, steps: f32) {
        if steps == 0.0 {
            return;
        }

        let zoom_scale = 0.95f32.powf(self.config.zoom_speed * steps.abs());
        if steps > 0.0 {
            self.scale *= zoom_scale;
        } else {
            self.scale /= zoom_scale;
        }
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    /// Turns dragged pixels into a world offset in the camera's view plane,
    /// scaled so the point under the cursor at the target's depth follows it.
    fn resolve_pan(&mut self, camera: &PerspectiveCamera) {
        if self.pan_pixels == Vec2::ZERO {
            return;
        }

        let half_fov = (camera.fov_y_degrees() / 2.0).to_radians();
        let target_distance = (camera.position - self.target).length() * half_fov.tan();
        let world_per_pixel = 2.0 * target_distance / self.viewport_height;

        let camera_world = camera.view_matrix().inverse();
        let right = camera_world.x_axis.truncate();
        let up = camera_world.y_axis.truncate();

        self.pan_offset += (up * self.pan_pixels.y - right * self.pan_pixels.x) * world_per_pixel;
        self.pan_pixels = Vec2::ZERO;
    }

    /// Applies the pending motion to the camera.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) {
        let damping = self.config.damping_factor;
        self.resolve_pan(camera);
        let mut spherical = Spherical::from_offset(camera.position - self.target);

        spherical.theta += self.theta_delta * damping;
        spherical.phi += self.phi_delta * damping;
        spherical.phi = spherical.phi.clamp(EPS, PI - EPS);

        spherical.radius = (spherical.radius * self.scale)
            .clamp(self.config.min_distance, self.config.max_distance);

        self.target += self.pan_offset * damping;
        camera.position = self.target + spherical.to_offset();
        camera.target = self.target;

        self.theta_delta *= 1.0 - damping;
        self.phi_delta *= 1.0 - damping;
        self.pan_offset *= 1.0 - damping;
        self.scale = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;

    fn setup() -> (OrbitControls, PerspectiveCamera) {
        let controls = OrbitControls::new(OrbitConfig::default(), 600);
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 800, 600);
        (controls, camera)
    }

    #[test]
    fn first_update_clamps_to_max_distance() {
        let (mut controls, mut camera) = setup();
        assert!(camera.position.length() > 38.0);

        controls.update(&mut camera);

        assert!((camera.position.length() - 38.0).abs() < 1e-4);
    }

    #[test]
    fn dolly_never_goes_below_min_distance() {
        let (mut controls, mut camera) = setup();

        for _ in 0..200 {
            controls.on_scroll(3.0);
            controls.update(&mut camera);
        }

        assert!((camera.position.length() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn damping_spreads_rotation_across_frames() {
        let (mut controls, mut camera) = setup();
        controls.update(&mut camera);
        let start = camera.position;

        controls.rotate_left(1.0);
        controls.update(&mut camera);
        let first_step = Spherical::from_offset(camera.position).theta
            - Spherical::from_offset(start).theta;

        assert!((first_step + 0.05).abs() < 1e-5);

        for _ in 0..500 {
            controls.update(&mut camera);
        }
        let total =
            Spherical::from_offset(camera.position).theta - Spherical::from_offset(start).theta;
        assert!((total + 1.0).abs() < 1e-3);
    }

    #[test]
    fn drag_without_button_does_nothing() {
        let (mut controls, mut camera) = setup();
        controls.update(&mut camera);
        let before = camera.position;

        controls.on_pointer_moved(Vec2::new(10.0, 10.0));
        controls.on_pointer_moved(Vec2::new(200.0, 10.0));
        controls.update(&mut camera);

        assert!(camera.position.abs_diff_eq(before, 1e-5));
    }

    #[test]
    fn secondary_drag_pans_target_and_camera_together() {
        let (mut controls, mut camera) = setup();
        controls.update(&mut camera);
        let offset = camera.position - controls.target;

        controls.on_pan_button(true);
        controls.on_pointer_moved(Vec2::new(100.0, 100.0));
        controls.on_pointer_moved(Vec2::new(150.0, 100.0));
        controls.on_pan_button(false);
        controls.on_pointer_moved(Vec2::new(400.0, 300.0));

        for _ in 0..500 {
            controls.update(&mut camera);
        }

        // Dragging right slides the view plane left by the visible span.
        let expected = 2.0 * 50.0 * 38.0 * 22.5f32.to_radians().tan() / 600.0;
        assert!((controls.target.x + expected).abs() < 1e-3);
        assert!(controls.target.y.abs() < 1e-4);
        assert!(controls.target.z.abs() < 1e-4);
        assert!((camera.position - controls.target).abs_diff_eq(offset, 1e-3));
        assert_eq!(camera.target, controls.target);
    }

    #[test]
    fn polar_angle_stays_above_the_pole() {
        let (mut controls, mut camera) = setup();

        for _ in 0..100 {
            controls.rotate_up(10.0);
            controls.update(&mut camera);
        }

        assert!(camera.position.y > 37.9);
        assert!(camera.position.is_finite());
        assert!(camera.view_matrix().is_finite());
    }
}
