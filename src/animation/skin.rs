use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::{
    model::{SkinWeights, Vertex},
    scene_graph::{object3d::ObjectId, object3d::SkinBinding, scene::Scene},
};

/// Joint matrices in the mesh's local space, so the skinned vertices can be
/// drawn with the mesh object's own world matrix.
pub fn joint_matrices(scene: &Scene, mesh_object: ObjectId, skin: &SkinBinding) -> Vec<Mat4> {
    let inverse_mesh_world = scene.world_matrix(mesh_object).inverse();

    skin.joints
        .iter()
        .zip(&skin.inverse_bind_matrices)
        .map(|(&joint, inverse_bind)| {
            inverse_mesh_world * scene.world_matrix(joint) * *inverse_bind
        })
        .collect()
}

fn skin_matrix(joints: [u16; 4], weights: [f32; 4], joint_matrices: &[Mat4]) -> Option<Mat4> {
    let mut matrix = Mat4::ZERO;
    let mut total = 0.0;

    for (joint, weight) in joints.into_iter().zip(weights) {
        if weight <= 0.0 {
            continue;
        }
        let joint_matrix = joint_matrices.get(joint as usize)?;
        matrix += *joint_matrix * weight;
        total += weight;
    }

    if total <= 0.0 {
        return None;
    }

    // Exporters don't always normalize weights.
    Some(matrix * (1.0 / total))
}

pub fn skin_vertices(base: &[Vertex], skin: &SkinWeights, joint_matrices: &[Mat4]) -> Vec<Vertex> {
    base.par_iter()
        .zip(skin.joints.par_iter())
        .zip(skin.weights.par_iter())
        .map(|((vertex, &joints), &weights)| {
            let Some(matrix) = skin_matrix(joints, weights, joint_matrices) else {
                return *vertex;
            };

            Vertex {
                position: matrix.transform_point3(vertex.position),
                normal: matrix.transform_vector3(vertex.normal).normalize_or(vertex.normal),
                tex_coords: vertex.tex_coords,
                tangent: matrix
                    .transform_vector3(vertex.tangent)
                    .normalize_or(Vec3::ZERO),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec2};

    use super::*;
    use crate::scene_graph::{object3d::Object3D, transform::Transform};

    fn vertex(position: Vec3) -> Vertex {
        Vertex::new(position, Vec3::Z, Vec2::ZERO)
    }

    #[test]
    fn bind_pose_leaves_vertices_in_place() {
        let mut scene = Scene::new();
        let root = scene.add_object(
            Object3D::new("character").with_transform(Transform::from_translation(Vec3::X * 5.0)),
        );
        let mesh = scene.add_child(root, Object3D::new("Body"));
        let bone = scene.add_child(
            root,
            Object3D::new("Hips").with_transform(Transform::from_translation(Vec3::Y)),
        );
        scene.late_update();

        let skin = SkinBinding {
            joints: vec![bone],
            inverse_bind_matrices: vec![Mat4::from_translation(Vec3::NEG_Y)],
        };
        let matrices = joint_matrices(&scene, mesh, &skin);
        assert!(matrices[0].abs_diff_eq(Mat4::IDENTITY, 1e-5));

        let base = vec![vertex(Vec3::new(0.0, 1.0, 0.0))];
        let weights = SkinWeights {
            joints: vec![[0, 0, 0, 0]],
            weights: vec![[1.0, 0.0, 0.0, 0.0]],
        };
        let skinned = skin_vertices(&base, &weights, &matrices);
        assert!(skinned[0].position.abs_diff_eq(base[0].position, 1e-5));
    }

    #[test]
    fn rotated_joint_moves_weighted_vertices() {
        let matrices = [
            Mat4::IDENTITY,
            Mat4::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
        ];
        let base = vec![vertex(Vec3::X), vertex(Vec3::X)];
        let weights = SkinWeights {
            joints: vec![[1, 0, 0, 0], [0, 1, 0, 0]],
            weights: vec![[1.0, 0.0, 0.0, 0.0], [0.5, 0.5, 0.0, 0.0]],
        };

        let skinned = skin_vertices(&base, &weights, &matrices);

        assert!(skinned[0].position.abs_diff_eq(Vec3::Y, 1e-5));
        assert!(skinned[1].position.abs_diff_eq(Vec3::new(0.5, 0.5, 0.0), 1e-5));
    }

    #[test]
    fn unweighted_vertices_are_untouched() {
        let base = vec![vertex(Vec3::ONE)];
        let weights = SkinWeights {
            joints: vec![[3, 0, 0, 0]],
            weights: vec![[0.0; 4]],
        };

        let skinned = skin_vertices(&base, &weights, &[Mat4::from_scale(Vec3::splat(2.0))]);

        assert_eq!(skinned[0], base[0]);
    }
}
