use anyhow::Result;

mod animation;
mod asset_pipeline;
mod camera;
mod color;
mod config;
mod engine;
mod geometry;
mod lights;
mod material_manager;
mod model;
mod orbit_controls;
mod rendering;
mod room;
mod scene_graph;
mod video;
mod window;

fn main() -> Result<()> {
    pretty_env_logger::init();

    pollster::block_on(window::run())?;

    Ok(())
}
