use std::mem::offset_of;

use id_arena::{Arena, Id};
use wgpu::util::DeviceExt;

use crate::{
    animation::skin::{joint_matrices, skin_vertices},
    material_manager::MaterialId,
    model::{Model, ModelPrimitive, Vertex},
    rendering::instance::{Instance, InstanceBuffer, Instances},
    scene_graph::{object3d::ObjectId, scene::Scene, scene_model::SceneModelId},
};

pub type RenderModelId = Id<RenderModel>;

pub struct RenderPrimitive {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
    pub material: MaterialId,
}

impl RenderPrimitive {
    fn from_primitive(
        device: &wgpu::Device,
        model: &Model,
        primitive: &ModelPrimitive,
        material: MaterialId,
    ) -> Self {
        let vertex_buffer_name = format!(
            "Vertex buffer ({}, primitive {})",
            model.name, primitive.index
        );
        let index_buffer_name = format!(
            "Index buffer ({}, primitive {})",
            model.name, primitive.index
        );

        // Skinned vertices are rewritten every frame.
        let mut vertex_usage = wgpu::BufferUsages::VERTEX;
        if primitive.skin.is_some() {
            vertex_usage |= wgpu::BufferUsages::COPY_DST;
        }

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&vertex_buffer_name),
            contents: bytemuck::cast_slice(&primitive.vertices),
            usage: vertex_usage,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&index_buffer_name),
            contents: bytemuck::cast_slice(&primitive.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_indices: primitive.indices.len() as u32,
            material,
        }
    }
}

pub struct RenderModel {
    pub name: String,
    pub primitives: Vec<RenderPrimitive>,
    pub instances: Instances,
    pub shadow_instances: Instances,
    pub instance_buffer: InstanceBuffer,
    pub shadow_instance_buffer: InstanceBuffer,
    /// Lowest render order among this frame's instances.
    pub render_order: i32,
    /// Object whose skeleton deforms the vertices this frame.
    skinned_by: Option<ObjectId>,
}

impl RenderModel {
    pub fn from_model(device: &wgpu::Device, model: &Model, materials: &[MaterialId]) -> Self {
        let primitives = model
            .primitives
            .iter()
            .zip(materials)
            .map(|(primitive, &material)| {
                RenderPrimitive::from_primitive(device, model, primitive, material)
            })
            .collect();

        RenderModel {
            name: model.name.clone(),
            primitives,
            instances: Instances::new(),
            shadow_instances: Instances::new(),
            instance_buffer: InstanceBuffer::new(device, &model.name),
            shadow_instance_buffer: InstanceBuffer::new(device, format!("{} shadow", model.name)),
            render_order: 0,
            skinned_by: None,
        }
    }
}

pub const RENDER_MODEL_VBL: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, position) as wgpu::BufferAddress,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, normal) as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, tex_coords) as wgpu::BufferAddress,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32x2,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(Vertex, tangent) as wgpu::BufferAddress,
            shader_location: 3,
            format: wgpu::VertexFormat::Float32x3,
        },
    ],
};

/// One entry of a frame's render list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub object: ObjectId,
    pub render_order: i32,
    pub instance: Instance,
    pub cast_shadow: bool,
}

/// Collects the rendered mesh objects of the scene, per scene model.
pub fn gather_instances(scene: &Scene) -> Vec<(SceneModelId, DrawItem)> {
    scene
        .objects
        .iter()
        .filter_map(|(id, object)| Some((id, object, object.model_id?)))
        .filter(|(id, _, _)| scene.is_rendered(*id))
        .map(|(id, object, model_id)| {
            let world = *object.transform.get_world_matrix();
            (
                model_id,
                DrawItem {
                    object: id,
                    render_order: object.render_order,
                    instance: Instance::new(world, object.receive_shadow),
                    cast_shadow: object.cast_shadow,
                },
            )
        })
        .collect()
}

/// GPU copies of the scene's models.
pub struct RenderModels {
    models: Arena<RenderModel>,
    draw_order: Vec<RenderModelId>,
}

impl RenderModels {
    pub fn new() -> Self {
        Self {
            models: Arena::new(),
            draw_order: Vec::new(),
        }
    }

    /// Uploads models that were added to the scene since the last frame.
    pub fn upload_new(&mut self, device: &wgpu::Device, scene: &mut Scene) -> usize {
        let mut uploaded = 0;

        for (_, scene_model) in scene.models.iter_mut() {
            if scene_model.render_model.is_some() {
                continue;
            }

            let render_model =
                RenderModel::from_model(device, &scene_model.model, &scene_model.materials);
            scene_model.render_model = Some(self.models.alloc(render_model));
            uploaded += 1;
        }

        if uploaded > 0 {
            log::debug!("Uploaded {} models", uploaded);
        }

        uploaded
    }

    /// Rebuilds the instance lists and the draw order from the scene.
    pub fn gather(&mut self, scene: &Scene) {
        for (_, model) in self.models.iter_mut() {
            model.instances.clear();
            model.shadow_instances.clear();
            model.render_order = i32::MAX;
            model.skinned_by = None;
        }

        for (scene_model_id, item) in gather_instances(scene) {
            let Some(render_model_id) = scene.models[scene_model_id].render_model else {
                continue;
            };
            let model = &mut self.models[render_model_id];

            model.instances.add(item.instance);
            if item.cast_shadow {
                model.shadow_instances.add(item.instance);
            }
            model.render_order = model.render_order.min(item.render_order);

            if scene.objects[item.object].skin.is_some() && model.skinned_by.is_none() {
                model.skinned_by = Some(item.object);
            }
        }

        self.draw_order = self
            .models
            .iter()
            .filter(|(_, model)| model.instances.should_render())
            .map(|(id, _)| id)
            .collect();
        // Stable, so equal orders keep insertion order.
        self.draw_order
            .sort_by_key(|&id| self.models[id].render_order);
    }

    pub fn write_instances(&self, queue: &wgpu::Queue) {
        for (_, model) in self.models.iter() {
            model.instances.write_to_buffer(queue, &model.instance_buffer);
            model
                .shadow_instances
                .write_to_buffer(queue, &model.shadow_instance_buffer);
        }
    }

    /// Deforms skinned meshes on the CPU and rewrites their vertex buffers.
    pub fn update_skins(&self, queue: &wgpu::Queue, scene: &Scene) {
        for (_, scene_model) in scene.models.iter() {
            let Some(render_model) = scene_model.render_model.and_then(|id| self.models.get(id))
            else {
                continue;
            };
            let Some(object_id) = render_model.skinned_by else {
                continue;
            };
            let Some(skin) = scene.objects[object_id].skin.as_ref() else {
                continue;
            };

            let matrices = joint_matrices(scene, object_id, skin);

            for (primitive, render_primitive) in scene_model
                .model
                .primitives
                .iter()
                .zip(&render_model.primitives)
            {
                let Some(weights) = primitive.skin.as_ref() else {
                    continue;
                };
                let vertices = skin_vertices(&primitive.vertices, weights, &matrices);
                queue.write_buffer(
                    &render_primitive.vertex_buffer,
                    0,
                    bytemuck::cast_slice(&vertices),
                );
            }
        }
    }

    pub fn draw_order(&self) -> impl Iterator<Item = &RenderModel> {
        self.draw_order.iter().map(|&id| &self.models[id])
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{
        geometry::box_geometry,
        material_manager::{Material, MaterialManager},
        scene_graph::{object3d::Object3D, scene_model::SceneModel, transform::Transform},
    };

    fn scene_with_boxes() -> (Scene, ObjectId, ObjectId) {
        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let material = materials.add_material(Material::standard("box"));

        let model = scene.add_model(SceneModel::new(
            Model::from_primitive("box", box_geometry(1.0, 1.0, 1.0)),
            vec![material],
        ));

        let a = scene.add_object(
            Object3D::new("a")
                .with_model(model)
                .with_transform(Transform::from_translation(Vec3::X)),
        );
        let b = scene.add_object(Object3D::new("b").with_model(model));
        scene.objects[b].cast_shadow = true;
        scene.late_update();

        (scene, a, b)
    }

    #[test]
    fn gathers_rendered_mesh_objects() {
        let (mut scene, a, b) = scene_with_boxes();
        scene.add_object(Object3D::new("empty"));

        let items = gather_instances(&scene);
        assert_eq!(items.len(), 2);

        let a_item = items.iter().find(|(_, item)| item.object == a).unwrap().1;
        assert_eq!(a_item.instance.model[3][0], 1.0);
        assert!(!a_item.cast_shadow);
        assert!(items.iter().any(|(_, item)| item.object == b && item.cast_shadow));
    }

    #[test]
    fn hidden_and_removed_objects_are_skipped() {
        let (mut scene, a, b) = scene_with_boxes();
        scene.objects[a].visible = false;
        scene.remove_object(b);

        assert!(gather_instances(&scene).is_empty());
    }
}
