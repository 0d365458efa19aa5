use glam::{Mat4, Quat, Vec3};
use id_arena::Arena;
use std::collections::HashMap;

use crate::asset_pipeline::loader::GltfImport;
use crate::material_manager::{Material, MaterialId, MaterialManager, TextureManager};
use crate::model::Model;
use crate::scene_graph::object3d::{Object3D, ObjectId, SkinBinding};
use crate::scene_graph::scene_model::{SceneModel, SceneModelId};

pub struct Scene {
    pub objects: Arena<Object3D>,
    pub models: Arena<SceneModel>,
}

/// Per-import lookup tables used while spawning one glTF file.
struct GltfSpawn<'a> {
    file_name: &'a str,
    import: &'a GltfImport,
    materials: Vec<MaterialId>,
    default_material: Option<MaterialId>,
    mesh_to_model: HashMap<usize, SceneModelId>,
    node_to_object: HashMap<usize, ObjectId>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Arena::new(),
            models: Arena::new(),
        }
    }

    pub fn add_object(&mut self, object: Object3D) -> ObjectId {
        self.objects.alloc(object)
    }

    pub fn add_child(&mut self, parent: ObjectId, object: Object3D) -> ObjectId {
        let id = self.add_object(object);
        self.set_object_parent(id, Some(parent));
        id
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&Object3D> {
        self.objects.get(id)
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut Object3D> {
        self.objects.get_mut(id)
    }

    pub fn get_object_by_name(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|(_, object)| !object.removed && object.name == name)
            .map(|(id, _)| id)
    }

    /// Finds a named object below `root`, including `root` itself.
    pub fn find_in_subtree(&self, root: ObjectId, name: &str) -> Option<ObjectId> {
        self.descendants(root)
            .into_iter()
            .find(|id| self.objects[*id].name == name)
    }

    pub fn add_model(&mut self, model: SceneModel) -> SceneModelId {
        self.models.alloc(model)
    }

    pub fn get_model(&self, id: SceneModelId) -> Option<&SceneModel> {
        self.models.get(id)
    }

    /// Detaches the object from its parent and hides the whole subtree. Arena
    /// slots are never reused, so the ids stay valid but unreachable.
    pub fn remove_object(&mut self, object_id: ObjectId) {
        self.set_object_parent(object_id, None);

        for id in self.descendants(object_id) {
            self.objects[id].removed = true;
        }
    }

    /// `root` followed by every descendant, depth first.
    pub fn descendants(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut result = Vec::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            result.push(id);
            stack.extend(object.child_ids.iter().rev());
        }

        result
    }

    pub fn traverse_mut(&mut self, root: ObjectId, mut f: impl FnMut(&mut Object3D)) {
        for id in self.descendants(root) {
            f(&mut self.objects[id]);
        }
    }

    /// True when the object and all its ancestors are visible and in the scene.
    pub fn is_rendered(&self, object_id: ObjectId) -> bool {
        let mut current = Some(object_id);

        while let Some(id) = current {
            match self.objects.get(id) {
                Some(object) if object.visible && !object.removed => {
                    current = object.parent_id;
                }
                _ => return false,
            }
        }

        true
    }

    /// Spawns the default scene of a glTF file under a new root object named
    /// after the file. Materials and skins are imported along the way.
    pub fn spawn_gltf_scene(
        &mut self,
        material_manager: &mut MaterialManager,
        textures: &mut TextureManager,
        file_name: &str,
        import: &GltfImport,
    ) -> anyhow::Result<ObjectId> {
        let gltf_scene = import
            .document
            .default_scene()
            .or_else(|| import.document.scenes().next())
            .ok_or_else(|| anyhow::anyhow!("No scenes in {}", file_name))?;

        let materials = material_manager.load_all_materials_from_gltf(
            textures,
            file_name,
            &import.document,
            &import.images,
        );

        let mut spawn = GltfSpawn {
            file_name,
            import,
            materials,
            default_material: None,
            mesh_to_model: HashMap::new(),
            node_to_object: HashMap::new(),
        };

        let root = self.add_object(Object3D::new(file_name));

        for node in gltf_scene.nodes() {
            self.spawn_gltf_node(material_manager, &mut spawn, &node, root)?;
        }

        self.bind_gltf_skins(&spawn);

        log::info!(
            "Spawned {} ({} objects, {} models)",
            file_name,
            spawn.node_to_object.len(),
            spawn.mesh_to_model.len()
        );

        Ok(root)
    }

    fn spawn_gltf_node(
        &mut self,
        material_manager: &mut MaterialManager,
        spawn: &mut GltfSpawn,
        node: &gltf::Node,
        parent: ObjectId,
    ) -> anyhow::Result<ObjectId> {
        let node_name = node
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("Node {}", node.index()));

        let (translation, rotation, scale) = node.transform().decomposed();
        let mut object = Object3D::new(node_name.clone());
        object.transform.set_transform(
            Vec3::from(translation),
            Quat::from_array(rotation),
            Vec3::from(scale),
        );

        if let Some(mesh) = node.mesh() {
            let model_id = match spawn.mesh_to_model.get(&mesh.index()).copied() {
                Some(model_id) => model_id,
                None => {
                    let mesh_name = mesh
                        .name()
                        .map(String::from)
                        .unwrap_or_else(|| format!("{} (Mesh)", node_name));

                    let model = Model::from_gltf(
                        format!("{}/{}", spawn.file_name, mesh_name),
                        mesh.clone(),
                        &spawn.import.buffers,
                    )?;

                    let primitive_materials = model
                        .primitives
                        .iter()
                        .map(|primitive| {
                            primitive
                                .material
                                .and_then(|index| spawn.materials.get(index).copied())
                                .unwrap_or_else(|| {
                                    *spawn.default_material.get_or_insert_with(|| {
                                        material_manager.add_material(Material::standard(
                                            format!("{} (default)", spawn.file_name),
                                        ))
                                    })
                                })
                        })
                        .collect();

                    let model_id = self.add_model(SceneModel::new(model, primitive_materials));
                    spawn.mesh_to_model.insert(mesh.index(), model_id);
                    model_id
                }
            };

            object.model_id = Some(model_id);
        }

        let object_id = self.add_child(parent, object);
        spawn.node_to_object.insert(node.index(), object_id);

        for child in node.children() {
            self.spawn_gltf_node(material_manager, spawn, &child, object_id)?;
        }

        Ok(object_id)
    }

    fn bind_gltf_skins(&mut self, spawn: &GltfSpawn) {
        for node in spawn.import.document.nodes() {
            let object_id = spawn.node_to_object.get(&node.index());
            let (Some(skin), Some(&object_id)) = (node.skin(), object_id) else {
                continue;
            };

            let joints: Vec<ObjectId> = skin
                .joints()
                .filter_map(|joint| spawn.node_to_object.get(&joint.index()).copied())
                .collect();

            let reader = skin.reader(|buffer| Some(&spawn.import.buffers[buffer.index()]));
            let inverse_bind_matrices: Vec<Mat4> = match reader.read_inverse_bind_matrices() {
                Some(matrices) => matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect(),
                None => vec![Mat4::IDENTITY; joints.len()],
            };

            if joints.len() != inverse_bind_matrices.len() {
                log::warn!(
                    "Skin of {} has {} joints but {} inverse bind matrices",
                    self.objects[object_id].name,
                    joints.len(),
                    inverse_bind_matrices.len()
                );
                continue;
            }

            self.objects[object_id].skin = Some(SkinBinding {
                joints,
                inverse_bind_matrices,
            });
        }
    }

    /// Updates all object transforms in hierarchical order
    fn update_transforms(&self) {
        let root_objects = self
            .objects
            .iter()
            .filter(|(_, object)| object.parent_id.is_none() && !object.removed)
            .map(|(id, _)| id);

        for root_id in root_objects {
            self.update_object_transform_recursive(root_id, Mat4::IDENTITY, false);
        }
    }

    fn update_object_transform_recursive(
        &self,
        object_id: ObjectId,
        parent_world_matrix: Mat4,
        parent_changed: bool,
    ) {
        let Some(object) = self.objects.get(object_id) else {
            return;
        };

        let changed = parent_changed || object.transform.is_world_dirty();
        if changed {
            let local_matrix = *object.transform.get_local_matrix();
            object
                .transform
                .set_world_matrix(parent_world_matrix * local_matrix);
        }

        let world_matrix = *object.transform.get_world_matrix();
        for &child_id in &object.child_ids {
            self.update_object_transform_recursive(child_id, world_matrix, changed);
        }
    }

    /// Invalidates world transforms for an object and all its descendants
    pub fn invalidate_object_hierarchy(&self, object_id: ObjectId) {
        if let Some(object) = self.objects.get(object_id) {
            object.transform.invalidate_world();

            for &child_id in &object.child_ids {
                self.invalidate_object_hierarchy(child_id);
            }
        }
    }

    /// Sets the parent of an object and updates child relationships
    pub fn set_object_parent(&mut self, child_id: ObjectId, new_parent_id: Option<ObjectId>) {
        if let Some(old_parent_id) = self.objects.get(child_id).and_then(|c| c.parent_id) {
            if let Some(old_parent) = self.objects.get_mut(old_parent_id) {
                old_parent.child_ids.retain(|&id| id != child_id);
            }
        }

        if let Some(child) = self.objects.get_mut(child_id) {
            child.parent_id = new_parent_id;

            if let Some(new_parent_id) = new_parent_id {
                if let Some(new_parent) = self.objects.get_mut(new_parent_id) {
                    new_parent.child_ids.push(child_id);
                }
            }
        }

        self.invalidate_object_hierarchy(child_id);
    }

    pub fn set_object_rotation(&mut self, object_id: ObjectId, rotation: Quat) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_rotation(rotation);
        }
    }

    pub fn set_object_transform(
        &mut self,
        object_id: ObjectId,
        translation: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) {
        if let Some(object) = self.objects.get_mut(object_id) {
            object.transform.set_transform(translation, rotation, scale);
        }
    }

    pub fn world_matrix(&self, object_id: ObjectId) -> Mat4 {
        self.objects
            .get(object_id)
            .map(|object| *object.transform.get_world_matrix())
            .unwrap_or(Mat4::IDENTITY)
    }

    pub fn early_update(&mut self) {
        for (_, object) in self.objects.iter() {
            object.transform.reset_flags();
        }
    }

    pub fn late_update(&mut self) {
        self.update_transforms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_graph::transform::Transform;

    #[test]
    fn children_inherit_parent_transforms() {
        let mut scene = Scene::new();
        let parent = scene.add_object(
            Object3D::new("parent").with_transform(Transform::from_translation(Vec3::X)),
        );
        let child = scene.add_child(
            parent,
            Object3D::new("child").with_transform(Transform::from_translation(Vec3::Y)),
        );

        scene.late_update();
        assert!(scene.objects[child]
            .transform
            .world_position()
            .abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));

        scene.set_object_transform(parent, Vec3::ZERO, Quat::IDENTITY, Vec3::splat(2.0));
        scene.early_update();
        scene.late_update();
        assert!(scene.objects[child]
            .transform
            .world_position()
            .abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-6));
        assert!(scene.objects[child].transform.has_changed());
    }

    #[test]
    fn reparenting_moves_the_child_list() {
        let mut scene = Scene::new();
        let a = scene.add_object(Object3D::new("a"));
        let b = scene.add_object(Object3D::new("b"));
        let child = scene.add_child(a, Object3D::new("child"));

        scene.set_object_parent(child, Some(b));

        assert!(scene.objects[a].child_ids.is_empty());
        assert_eq!(scene.objects[b].child_ids, vec![child]);
        assert_eq!(
            scene.objects[b]
                .children(&scene)
                .map(|o| o.name.as_str())
                .collect::<Vec<_>>(),
            vec!["child"]
        );
    }

    #[test]
    fn removed_objects_are_hidden_and_unnamed() {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::new("root"));
        let screen = scene.add_child(root, Object3D::new("screenMesh"));
        let glass = scene.add_child(screen, Object3D::new("glass"));

        scene.remove_object(screen);

        assert_eq!(scene.get_object_by_name("screenMesh"), None);
        assert!(!scene.is_rendered(glass));
        assert!(scene.is_rendered(root));
        assert!(scene.objects[root].child_ids.is_empty());

        let replacement = scene.add_child(root, Object3D::new("screenMesh"));
        assert_eq!(scene.get_object_by_name("screenMesh"), Some(replacement));
    }

    #[test]
    fn hidden_parents_hide_children() {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::new("root"));
        let child = scene.add_child(root, Object3D::new("child"));

        scene.objects[root].visible = false;

        assert!(!scene.is_rendered(child));
    }

    #[test]
    fn traverse_visits_the_whole_subtree() {
        let mut scene = Scene::new();
        let root = scene.add_object(Object3D::new("root"));
        let a = scene.add_child(root, Object3D::new("a"));
        scene.add_child(a, Object3D::new("b"));
        let other = scene.add_object(Object3D::new("other"));

        scene.traverse_mut(root, |object| object.cast_shadow = true);

        assert_eq!(scene.descendants(root).len(), 3);
        assert!(scene.find_in_subtree(root, "b").is_some());
        assert!(scene.find_in_subtree(root, "other").is_none());
        assert!(!scene.objects[other].cast_shadow);
        assert!(scene
            .descendants(root)
            .iter()
            .all(|id| scene.objects[*id].cast_shadow));
    }

    #[test]
    fn spawns_gltf_node_hierarchy_under_a_named_root() {
        let json = br#"{
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [ { "nodes": [0] } ],
            "nodes": [
                { "name": "Hips", "translation": [0.0, 1.0, 0.0], "children": [1] },
                { "name": "Spine", "translation": [0.0, 0.5, 0.0] }
            ]
        }"#;
        let (document, buffers, images) = gltf::import_slice(json).unwrap();
        let import = GltfImport {
            document,
            buffers,
            images,
        };

        let mut scene = Scene::new();
        let mut materials = MaterialManager::new();
        let mut textures = TextureManager::new();
        let root = scene
            .spawn_gltf_scene(&mut materials, &mut textures, "rig.glb", &import)
            .unwrap();
        scene.late_update();

        assert_eq!(scene.objects[root].name, "rig.glb");
        let spine = scene.find_in_subtree(root, "Spine").unwrap();
        assert!(scene.objects[spine]
            .transform
            .world_position()
            .abs_diff_eq(Vec3::new(0.0, 1.5, 0.0), 1e-6));
    }
}
