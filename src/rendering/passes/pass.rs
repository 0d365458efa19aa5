use wgpu::RenderPass;

use crate::rendering::shader_loader::PipelineCache;

pub trait Pass {
    type TextureViews;

    /// Begins the pass, binds what the pass owns and hands it to `render_callback`
    /// for the draws.
    fn render<'a, F>(
        &self,
        texture_views: &Self::TextureViews,
        encoder: &mut wgpu::CommandEncoder,
        pipeline_cache: &PipelineCache,
        render_callback: F,
    ) where
        F: FnOnce(&mut RenderPass) + 'a;
}
