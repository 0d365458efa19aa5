use id_arena::Id;

use crate::material_manager::MaterialId;
use crate::model::Model;
use crate::rendering::render_model::RenderModelId;

pub type SceneModelId = Id<SceneModel>;

pub struct SceneModel {
    pub model: Model,
    /// One material per primitive.
    pub materials: Vec<MaterialId>,
    pub render_model: Option<RenderModelId>,
}

impl SceneModel {
    pub fn new(model: Model, materials: Vec<MaterialId>) -> Self {
        debug_assert_eq!(model.primitives.len(), materials.len());

        Self {
            model,
            materials,
            render_model: None,
        }
    }
}
