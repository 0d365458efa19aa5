use glam::Mat4;
use id_arena::Id;

use crate::scene_graph::scene::Scene;
use crate::scene_graph::scene_model::SceneModelId;
use crate::scene_graph::transform::Transform;

pub type ObjectId = Id<Object3D>;

/// Joints driving a skinned mesh. Vertex joint indices index into `joints`.
#[derive(Debug, Clone)]
pub struct SkinBinding {
    pub joints: Vec<ObjectId>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

pub struct Object3D {
    pub name: String,
    pub transform: Transform,
    pub model_id: Option<SceneModelId>,
    pub parent_id: Option<ObjectId>,
    pub child_ids: Vec<ObjectId>,
    pub visible: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    /// Lower values draw first.
    pub render_order: i32,
    pub skin: Option<SkinBinding>,
    pub(crate) removed: bool,
}

impl Object3D {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model_id: SceneModelId) -> Self {
        self.model_id = Some(model_id);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn children<'a, 'b>(&'a self, scene: &'b Scene) -> impl Iterator<Item = &'b Object3D> + 'b
    where
        'a: 'b,
    {
        self.child_ids
            .iter()
            .filter_map(move |id| scene.get_object(*id))
    }
}

impl Default for Object3D {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Transform::default(),
            model_id: None,
            parent_id: None,
            child_ids: Vec::new(),
            visible: true,
            cast_shadow: false,
            receive_shadow: false,
            render_order: 0,
            skin: None,
            removed: false,
        }
    }
}
