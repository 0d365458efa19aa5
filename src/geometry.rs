//! Procedural meshes for the room: boxes, planes and cylinders.
//!
//! Texture coordinates use the wgpu convention, with `v = 0` along the top
//! edge of each face. Triangles wind counter-clockwise seen from outside.

use std::f32::consts::TAU;

use glam::{Vec2, Vec3};

use crate::model::{ModelPrimitive, Vertex};

#[derive(Default)]
struct GeometryBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl GeometryBuilder {
    /// Adds a quad centred on `center`. `half_u` points right and `half_v`
    /// points up when the quad is seen from its front side.
    fn quad(&mut self, center: Vec3, half_u: Vec3, half_v: Vec3) {
        let normal = half_u.cross(half_v).normalize();
        let base = self.vertices.len() as u32;

        self.vertices.extend([
            Vertex::new(center - half_u - half_v, normal, Vec2::new(0.0, 1.0)),
            Vertex::new(center + half_u - half_v, normal, Vec2::new(1.0, 1.0)),
            Vertex::new(center + half_u + half_v, normal, Vec2::new(1.0, 0.0)),
            Vertex::new(center - half_u + half_v, normal, Vec2::new(0.0, 0.0)),
        ]);
        self.indices
            .extend([base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    fn build(self) -> ModelPrimitive {
        ModelPrimitive::new(self.vertices, self.indices)
    }
}

/// Axis-aligned box centred on the origin.
pub fn box_geometry(width: f32, height: f32, depth: f32) -> ModelPrimitive {
    let (hx, hy, hz) = (width / 2.0, height / 2.0, depth / 2.0);
    let mut builder = GeometryBuilder::default();

    builder.quad(Vec3::X * hx, Vec3::NEG_Z * hz, Vec3::Y * hy);
    builder.quad(Vec3::NEG_X * hx, Vec3::Z * hz, Vec3::Y * hy);
    builder.quad(Vec3::Y * hy, Vec3::X * hx, Vec3::NEG_Z * hz);
    builder.quad(Vec3::NEG_Y * hy, Vec3::X * hx, Vec3::Z * hz);
    builder.quad(Vec3::Z * hz, Vec3::X * hx, Vec3::Y * hy);
    builder.quad(Vec3::NEG_Z * hz, Vec3::NEG_X * hx, Vec3::Y * hy);

    builder.build()
}

/// Plane in the XY plane facing +Z.
pub fn plane_geometry(width: f32, height: f32) -> ModelPrimitive {
    let mut builder = GeometryBuilder::default();
    builder.quad(Vec3::ZERO, Vec3::X * width / 2.0, Vec3::Y * height / 2.0);
    builder.build()
}

/// Capped cylinder along Y, centred on the origin.
pub fn cylinder_geometry(
    radius_top: f32,
    radius_bottom: f32,
    height: f32,
    radial_segments: u32,
) -> ModelPrimitive {
    let segments = radial_segments.max(3);
    let half_height = height / 2.0;
    let slope = (radius_bottom - radius_top) / height;
    let mut builder = GeometryBuilder::default();

    // Side: a top row and a bottom row, with a seam vertex repeated at the end.
    for (y, radius, v) in [
        (half_height, radius_top, 0.0),
        (-half_height, radius_bottom, 1.0),
    ] {
        for i in 0..=segments {
            let u = i as f32 / segments as f32;
            let (sin, cos) = (u * TAU).sin_cos();
            builder.vertices.push(Vertex::new(
                Vec3::new(radius * sin, y, radius * cos),
                Vec3::new(sin, slope, cos).normalize(),
                Vec2::new(u, v),
            ));
        }
    }

    let row = segments + 1;
    for i in 0..segments {
        let a = i;
        let b = i + row;
        let c = i + 1 + row;
        let d = i + 1;
        builder.indices.extend([a, b, d, b, c, d]);
    }

    for top in [true, false] {
        let (y, radius, normal) = if top {
            (half_height, radius_top, Vec3::Y)
        } else {
            (-half_height, radius_bottom, Vec3::NEG_Y)
        };

        let center = builder.vertices.len() as u32;
        builder
            .vertices
            .push(Vertex::new(Vec3::new(0.0, y, 0.0), normal, Vec2::splat(0.5)));

        for i in 0..=segments {
            let (sin, cos) = (i as f32 / segments as f32 * TAU).sin_cos();
            builder.vertices.push(Vertex::new(
                Vec3::new(radius * sin, y, radius * cos),
                normal,
                Vec2::new(sin * 0.5 + 0.5, cos * 0.5 + 0.5),
            ));
        }

        for i in 0..segments {
            let current = center + 1 + i;
            let next = current + 1;
            if top {
                builder.indices.extend([center, current, next]);
            } else {
                builder.indices.extend([center, next, current]);
            }
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_normal(primitive: &ModelPrimitive, face: usize) -> Vec3 {
        let a = primitive.vertex_by_triangle_index(face, 0).position;
        let b = primitive.vertex_by_triangle_index(face, 1).position;
        let c = primitive.vertex_by_triangle_index(face, 2).position;
        (b - a).cross(c - a)
    }

    #[test]
    fn box_has_six_quads_spanning_its_extents() {
        let primitive = box_geometry(50.0, 25.0, 50.0);
        assert_eq!(primitive.vertices.len(), 24);
        assert_eq!(primitive.indices.len(), 36);

        let max = primitive
            .vertices
            .iter()
            .fold(Vec3::splat(f32::MIN), |acc, v| acc.max(v.position));
        assert_eq!(max, Vec3::new(25.0, 12.5, 25.0));
    }

    #[test]
    fn box_triangles_wind_outward() {
        let primitive = box_geometry(2.0, 3.0, 4.0);

        for face in 0..primitive.indices.len() / 3 {
            let winding = triangle_normal(&primitive, face);
            let centroid = (0..3)
                .map(|v| primitive.vertex_by_triangle_index(face, v).position)
                .sum::<Vec3>()
                / 3.0;
            assert!(winding.dot(centroid) > 0.0, "face {face} winds inward");
            assert!(winding
                .normalize()
                .abs_diff_eq(primitive.vertex_by_triangle_index(face, 0).normal, 1e-5));
        }
    }

    #[test]
    fn plane_faces_positive_z() {
        let primitive = plane_geometry(16.5, 9.3);
        assert_eq!(primitive.vertices.len(), 4);
        assert!(primitive.vertices.iter().all(|v| v.normal == Vec3::Z));
        assert!(triangle_normal(&primitive, 0).z > 0.0);
        assert!(triangle_normal(&primitive, 1).z > 0.0);
    }

    #[test]
    fn plane_top_edge_samples_the_top_of_the_image() {
        let primitive = plane_geometry(2.0, 2.0);
        for vertex in &primitive.vertices {
            let expected_v = if vertex.position.y > 0.0 { 0.0 } else { 1.0 };
            assert_eq!(vertex.tex_coords.y, expected_v);
        }
    }

    #[test]
    fn cylinder_vertex_and_index_counts() {
        let primitive = cylinder_geometry(0.1, 0.1, 0.5, 32);
        assert_eq!(primitive.vertices.len(), 2 * 33 + 2 * 34);
        assert_eq!(primitive.indices.len(), 12 * 32);
    }

    #[test]
    fn cylinder_side_and_caps_wind_outward() {
        let primitive = cylinder_geometry(1.0, 1.0, 2.0, 16);

        for face in 0..primitive.indices.len() / 3 {
            let winding = triangle_normal(&primitive, face);
            let centroid = (0..3)
                .map(|v| primitive.vertex_by_triangle_index(face, v).position)
                .sum::<Vec3>()
                / 3.0;
            assert!(winding.dot(centroid) > 0.0, "face {face} winds inward");
        }
    }
}
