use std::mem::offset_of;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};
use wgpu::BufferUsages;

/// Per-object data streamed next to the vertex buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct Instance {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of the model matrix, padded to three vec4 columns.
    pub normal: [[f32; 4]; 3],
    /// x: 1.0 when the object receives shadows.
    pub params: [f32; 4],
}

impl Instance {
    pub fn new(model: Mat4, receive_shadow: bool) -> Self {
        let normal = normal_matrix(model);

        Self {
            model: model.to_cols_array_2d(),
            normal: [
                normal.x_axis.extend(0.0).to_array(),
                normal.y_axis.extend(0.0).to_array(),
                normal.z_axis.extend(0.0).to_array(),
            ],
            params: [if receive_shadow { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

fn normal_matrix(model: Mat4) -> Mat3 {
    let upper = Mat3::from_mat4(model);
    let determinant = upper.determinant();

    // Zero scale collapses the object anyway, keep the shader input finite.
    if determinant.abs() < f32::EPSILON {
        upper
    } else {
        upper.inverse().transpose()
    }
}

pub const INSTANCE_VBL: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<Instance>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Instance,
    attributes: &wgpu::vertex_attr_array![
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4,
        9 => Float32x4,
        10 => Float32x4,
        11 => Float32x4,
        12 => Float32x4,
    ],
};

const _: () = assert!(offset_of!(Instance, params) == 112);

pub struct Instances {
    instances: Vec<Instance>,
}

impl Instances {
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
        }
    }

    pub fn add(&mut self, instance: Instance) {
        if self.instances.len() as u64 >= InstanceBuffer::MAX_INSTANCES {
            log::warn!("Instance buffer full, dropping instance");
            return;
        }
        self.instances.push(instance);
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    pub fn write_to_buffer(&self, queue: &wgpu::Queue, instance_buffer: &InstanceBuffer) {
        if self.instances.is_empty() {
            return;
        }
        queue.write_buffer(
            instance_buffer.buffer(),
            0,
            bytemuck::cast_slice(&self.instances),
        );
    }

    pub fn should_render(&self) -> bool {
        !self.instances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }
}

pub struct InstanceBuffer(wgpu::Buffer);

impl InstanceBuffer {
    const MAX_INSTANCES: u64 = 128;

    pub fn new(device: &wgpu::Device, name: impl Into<String>) -> Self {
        let name: String = name.into();

        let descriptor = Self::descriptor(&name);
        let buffer = device.create_buffer(&descriptor);

        Self(buffer)
    }

    fn descriptor(name: &str) -> wgpu::BufferDescriptor<'static> {
        // Labels outlive the descriptor, leaking a handful of short strings is fine.
        let label = format!("Instance buffer ({})", name);
        let label = label.into_boxed_str();
        let label = Box::leak(label);

        wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<Instance>() as u64 * Self::MAX_INSTANCES,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.0
    }

    pub fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(1, self.buffer().slice(..));
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let instance = Instance::new(model, true);

        assert_eq!(instance.normal[0][0], 0.5);
        assert_eq!(instance.normal[1][1], 1.0);
        assert_eq!(instance.params[0], 1.0);
    }

    #[test]
    fn rotation_keeps_normals_rotated() {
        let model = Mat4::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(5.0, 0.0, 0.0),
        );
        let instance = Instance::new(model, false);
        let normal = Mat3::from_cols(
            Vec3::from_slice(&instance.normal[0]),
            Vec3::from_slice(&instance.normal[1]),
            Vec3::from_slice(&instance.normal[2]),
        );

        assert!((normal * Vec3::Z).abs_diff_eq(Vec3::X, 1e-5));
        assert_eq!(instance.params[0], 0.0);
    }

    #[test]
    fn degenerate_scale_stays_finite() {
        let instance = Instance::new(Mat4::from_scale(Vec3::ZERO), true);
        assert!(instance.normal.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn instance_list_is_bounded() {
        let mut instances = Instances::new();
        for _ in 0..200 {
            instances.add(Instance::new(Mat4::IDENTITY, false));
        }
        assert_eq!(instances.len(), InstanceBuffer::MAX_INSTANCES as usize);
        assert!(instances.should_render());
    }
}
