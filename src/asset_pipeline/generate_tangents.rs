// glTF exporters only write tangents when asked to, and the procedural
// geometry has none, so they are generated here with mikktspace.

use anyhow::bail;
use bevy_mikktspace::Geometry;

use crate::model::ModelPrimitive;

struct MikkTSpace<'a>(&'a mut ModelPrimitive);

impl Geometry for MikkTSpace<'_> {
    fn num_faces(&self) -> usize {
        self.0.indices.len() / 3
    }

    fn num_vertices_of_face(&self, _face: usize) -> usize {
        3
    }

    fn position(&self, face: usize, vert: usize) -> [f32; 3] {
        self.0.vertex_by_triangle_index(face, vert).position.to_array()
    }

    fn normal(&self, face: usize, vert: usize) -> [f32; 3] {
        self.0.vertex_by_triangle_index(face, vert).normal.to_array()
    }

    fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2] {
        self.0.vertex_by_triangle_index(face, vert).tex_coords.to_array()
    }

    fn set_tangent_encoded(&mut self, tangent: [f32; 4], face: usize, vert: usize) {
        let vertex = self.0.vertex_by_triangle_index_mut(face, vert);
        vertex.tangent = glam::Vec4::from_array(tangent).truncate();
    }
}

pub fn generate_tangents(primitive: &mut ModelPrimitive) -> anyhow::Result<()> {
    if primitive.indices.len() < 3 {
        bail!("Cannot generate tangents for a primitive without triangles");
    }

    if !bevy_mikktspace::generate_tangents(&mut MikkTSpace(primitive)) {
        bail!("Failed to generate tangents")
    }

    Ok(())
}
