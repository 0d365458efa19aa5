use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use gltf::buffer;
use itertools::izip;

use crate::asset_pipeline::generate_tangents::generate_tangents;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coords: Vec2,
    pub tangent: Vec3,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coords,
            tangent: Vec3::ZERO,
        }
    }
}

/// Per-vertex joint indices and weights of a skinned primitive.
#[derive(Debug, Clone)]
pub struct SkinWeights {
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
}

#[derive(Debug, Clone)]
pub struct ModelPrimitive {
    pub index: usize,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// glTF material index, if the primitive came from a glTF file.
    pub material: Option<usize>,
    pub skin: Option<SkinWeights>,
}

impl ModelPrimitive {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            index: 0,
            vertices,
            indices,
            material: None,
            skin: None,
        }
    }

    pub fn vertex_by_triangle_index(&self, face: usize, vert: usize) -> &Vertex {
        &self.vertices[self.indices[face * 3 + vert] as usize]
    }

    pub fn vertex_by_triangle_index_mut(&mut self, face: usize, vert: usize) -> &mut Vertex {
        let index = self.indices[face * 3 + vert] as usize;
        &mut self.vertices[index]
    }

    /// Area-weighted vertex normals, for meshes exported without them.
    fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];

        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let pa = self.vertices[a].position;
            let face_normal =
                (self.vertices[b].position - pa).cross(self.vertices[c].position - pa);

            normals[a] += face_normal;
            normals[b] += face_normal;
            normals[c] += face_normal;
        }

        for (vertex, normal) in self.vertices.iter_mut().zip(normals) {
            vertex.normal = normal.normalize_or(Vec3::Y);
        }
    }
}

pub struct Model {
    pub name: String,
    pub primitives: Vec<ModelPrimitive>,
}

pub type Buffers<'a> = &'a [buffer::Data];

impl Model {
    pub fn from_primitive(name: impl Into<String>, primitive: ModelPrimitive) -> Self {
        Self {
            name: name.into(),
            primitives: vec![primitive],
        }
    }

    pub fn from_gltf(
        name: impl Into<String>,
        mesh: gltf::Mesh,
        buffers: Buffers,
    ) -> anyhow::Result<Model> {
        let mut model = Model {
            name: name.into(),
            primitives: Vec::new(),
        };

        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping primitive {} of {}: unsupported mode {:?}",
                    primitive.index(),
                    model.name,
                    primitive.mode()
                );
                continue;
            }

            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let Some(positions) = reader.read_positions() else {
                log::warn!("Primitive without positions in {}", model.name);
                continue;
            };
            let positions: Vec<Vec3> = positions.map(Vec3::from).collect();
            let vertex_count = positions.len();

            let normals: Option<Vec<Vec3>> =
                reader.read_normals().map(|n| n.map(Vec3::from).collect());
            let tex_coords: Vec<Vec2> = match reader.read_tex_coords(0) {
                Some(tex_coords) => tex_coords.into_f32().map(Vec2::from).collect(),
                None => vec![Vec2::ZERO; vertex_count],
            };
            let tangents: Option<Vec<Vec3>> = reader
                .read_tangents()
                .map(|t| t.map(|t| Vec4::from(t).xyz()).collect());

            let vertices = izip!(
                positions.iter().copied(),
                normals
                    .clone()
                    .unwrap_or_else(|| vec![Vec3::ZERO; vertex_count]),
                tex_coords,
                tangents
                    .clone()
                    .unwrap_or_else(|| vec![Vec3::ZERO; vertex_count])
            )
            .map(|(position, normal, tex_coords, tangent)| Vertex {
                position,
                normal,
                tex_coords,
                tangent,
            })
            .collect::<Vec<Vertex>>();

            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect::<Vec<u32>>(),
                None => (0..vertex_count as u32).collect(),
            };

            let skin = match (reader.read_joints(0), reader.read_weights(0)) {
                (Some(joints), Some(weights)) => Some(SkinWeights {
                    joints: joints.into_u16().collect(),
                    weights: weights.into_f32().collect(),
                }),
                _ => None,
            };

            let mut model_primitive = ModelPrimitive {
                index: primitive.index(),
                vertices,
                indices,
                material: primitive.material().index(),
                skin,
            };

            if normals.is_none() {
                model_primitive.compute_normals();
            }

            if tangents.is_none() {
                if let Err(e) = generate_tangents(&mut model_primitive) {
                    log::warn!("{} (primitive {}): {}", model.name, primitive.index(), e);
                }
            }

            model.primitives.push(model_primitive);
        }

        if model.primitives.is_empty() {
            return Err(anyhow::anyhow!("Mesh without primitives: {}", model.name));
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_normals_face_away_from_ccw_winding() {
        let mut primitive = ModelPrimitive::new(
            vec![
                Vertex::new(Vec3::ZERO, Vec3::ZERO, Vec2::ZERO),
                Vertex::new(Vec3::X, Vec3::ZERO, Vec2::ZERO),
                Vertex::new(Vec3::Y, Vec3::ZERO, Vec2::ZERO),
            ],
            vec![0, 1, 2],
        );

        primitive.compute_normals();

        for vertex in &primitive.vertices {
            assert_eq!(vertex.normal, Vec3::Z);
        }
    }

    #[test]
    fn triangle_lookup_follows_indices() {
        let primitive = ModelPrimitive::new(
            vec![
                Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO),
                Vertex::new(Vec3::X, Vec3::Z, Vec2::ZERO),
                Vertex::new(Vec3::Y, Vec3::Z, Vec2::ZERO),
            ],
            vec![2, 0, 1],
        );

        assert_eq!(primitive.vertex_by_triangle_index(0, 0).position, Vec3::Y);
        assert_eq!(primitive.vertex_by_triangle_index(0, 2).position, Vec3::X);
    }
}
