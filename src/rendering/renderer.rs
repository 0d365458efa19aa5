use std::{sync::Arc, time::Instant};

use anyhow::Context;
use glam::{Mat4, Vec3};
use wgpu::CommandEncoderDescriptor;
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    camera::CameraUniform,
    material_manager::MaterialManager,
    rendering::{
        config::RenderConfig,
        global_uniform::GlobalUniformState,
        imgui_renderer::{create_imgui_renderer, ImguiRendererState},
        light_uniform::{LightsBuffer, LightsUniform},
        passes::{
            pass::Pass,
            scene_pass::{ScenePass, ScenePassTextureViews},
            shadow_pass::{ShadowPass, ShadowPassTextureViews},
        },
        render_common::RenderCommon,
        render_material_manager::RenderMaterialManager,
        render_model::RenderModels,
        shader_loader::{PipelineCache, PipelineCacheBuilder, ShaderLoader},
        texture::{shadow_map_size, DepthTexture, ShadowMap},
    },
    room::RoomState,
};

/// A frame whose scene is recorded but not yet submitted.
pub struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

pub struct Renderer {
    pub window: Arc<Window>,
    pub size: PhysicalSize<u32>,

    config: RenderConfig,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,

    common: Arc<RenderCommon>,
    depth_texture: DepthTexture,
    shadow_map: ShadowMap,

    camera_uniform: CameraUniform,
    lights_buffer: LightsBuffer,
    render_models: RenderModels,
    material_manager: RenderMaterialManager,

    shader_loader: ShaderLoader,

    shadow_pass: ShadowPass,
    scene_pass: ScenePass,
    imgui_renderer: ImguiRendererState,

    start_time: Instant,
}

impl Renderer {
    pub async fn new(
        window: Arc<Window>,
        state: &RoomState,
        imgui_context: &mut imgui::Context,
    ) -> anyhow::Result<Renderer> {
        let size = window.inner_size();
        let config = RenderConfig::default();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to create device")?;

        log::info!("Rendering with {}", adapter.get_info().name);

        let mut camera_uniform = CameraUniform::default();
        camera_uniform.update(&state.camera);
        let camera_uniform_buffer = camera_uniform.create_buffer(&device, "Camera buffer");

        let common = Arc::new(RenderCommon::new(
            &device,
            &adapter,
            &surface,
            size,
            camera_uniform_buffer,
            config.exposure,
        ));

        let surface_config = common
            .output_surface_config
            .read()
            .map_err(|_| anyhow::anyhow!("Surface config lock poisoned"))?
            .clone();
        let depth_texture = DepthTexture::new(&device, &surface_config, "Depth texture");

        let requested_shadow_size = state
            .lights
            .shadow_caster()
            .and_then(|light| light.shadow_view_projection())
            .map_or(1, |(_, size)| size);
        let shadow_map = ShadowMap::new(
            &device,
            shadow_map_size(
                requested_shadow_size,
                config.shadow_map_size,
                device.limits().max_texture_dimension_2d,
            ),
        );

        let lights_buffer = LightsBuffer::new(&device);
        let material_manager = RenderMaterialManager::new(&device, &queue);

        let mut cache_builder = PipelineCacheBuilder::new();

        let shadow_pass = ShadowPass::create(&device, &mut cache_builder);
        let scene_pass = ScenePass::create(
            &device,
            common.clone(),
            &mut cache_builder,
            &material_manager,
            &lights_buffer,
            &shadow_map,
            config.clear_color.to_wgpu(),
        );

        let shader_loader = ShaderLoader::new(device.clone(), cache_builder)?;

        let imgui_renderer =
            create_imgui_renderer(&device, &queue, common.surface_format(), imgui_context);

        Ok(Self {
            window,
            size,
            config,
            surface,
            device,
            queue,
            common,
            depth_texture,
            shadow_map,
            camera_uniform,
            lights_buffer,
            render_models: RenderModels::new(),
            material_manager,
            shader_loader,
            shadow_pass,
            scene_pass,
            imgui_renderer,
            start_time: Instant::now(),
        })
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        let Ok(mut config) = self.common.output_surface_config.write() else {
            log::error!("Surface config lock poisoned, skipping resize");
            return;
        };

        self.size = new_size;
        config.width = new_size.width;
        config.height = new_size.height;
        self.surface.configure(&self.device, &config);
        self.depth_texture.resize(&self.device, &config);
    }

    /// Syncs the room to the GPU and records the shadow and scene passes.
    pub fn render(&mut self, state: &mut RoomState) -> Result<Frame, wgpu::SurfaceError> {
        self.shader_loader.load_pending_shaders();

        self.render_models.upload_new(&self.device, &mut state.scene);
        self.material_manager
            .sync(&mut state.materials, &state.textures);

        self.render_models.gather(&state.scene);
        self.render_models.update_skins(&self.queue, &state.scene);
        self.render_models.write_instances(&self.queue);

        self.camera_uniform.update(&state.camera);
        self.camera_uniform
            .update_buffer(&self.queue, &self.common.camera_uniform_buffer);
        self.common.global_uniform.update(
            &self.queue,
            GlobalUniformState::new(
                self.size,
                self.start_time.elapsed().as_secs_f32(),
                self.config.exposure,
            ),
        );

        let shadow = self.update_lights(state);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let pipeline_cache = &self.shader_loader.cache;

        if shadow.is_some() {
            self.shadow_pass.render(
                &ShadowPassTextureViews {
                    depth: self.shadow_map.view().clone(),
                },
                &mut encoder,
                pipeline_cache,
                |render_pass| draw_shadow_casters(render_pass, &self.render_models),
            );
        }

        self.scene_pass.render(
            &ScenePassTextureViews {
                color: view.clone(),
                depth: self.depth_texture.view().clone(),
            },
            &mut encoder,
            pipeline_cache,
            |render_pass| {
                draw_scene(
                    render_pass,
                    &self.render_models,
                    &state.materials,
                    &self.material_manager,
                    &self.scene_pass,
                    pipeline_cache,
                )
            },
        );

        Ok(Frame {
            output,
            view,
            encoder,
        })
    }

    /// Draws the GUI over the frame, then submits and presents it.
    pub fn finish_frame(&mut self, mut frame: Frame, imgui_context: &mut imgui::Context) {
        self.imgui_renderer.render(
            &frame.view,
            imgui_context,
            &self.device,
            &self.queue,
            &mut frame.encoder,
        );

        self.queue.submit([frame.encoder.finish()]);
        frame.output.present();
    }

    /// Writes the light uniform, returning the shadow camera if a light casts shadows.
    fn update_lights(&self, state: &RoomState) -> Option<(Mat4, Vec3)> {
        let mut uniform = LightsUniform::from_lights(&state.lights);

        let shadow = state.lights.shadow_caster().and_then(|light| {
            light
                .shadow_view_projection()
                .map(|(view_proj, _)| (view_proj, light.position))
        });

        if let Some((view_proj, light_position)) = shadow {
            uniform.set_shadow(view_proj, self.shadow_map.size());
            self.shadow_pass
                .update(&self.queue, view_proj, light_position);
        }

        self.lights_buffer.update(&self.queue, &uniform);
        shadow
    }
}

fn draw_shadow_casters(render_pass: &mut wgpu::RenderPass<'_>, render_models: &RenderModels) {
    for model in render_models.draw_order() {
        if !model.shadow_instances.should_render() {
            continue;
        }

        model.shadow_instance_buffer.bind(render_pass);

        for primitive in &model.primitives {
            render_pass.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
            render_pass.set_index_buffer(
                primitive.index_buffer.slice(..),
                wgpu::IndexFormat::Uint32,
            );
            render_pass.draw_indexed(
                0..primitive.num_indices,
                0,
                0..model.shadow_instances.len() as u32,
            );
        }
    }
}

fn draw_scene(
    render_pass: &mut wgpu::RenderPass<'_>,
    render_models: &RenderModels,
    materials: &MaterialManager,
    material_manager: &RenderMaterialManager,
    scene_pass: &ScenePass,
    pipeline_cache: &PipelineCache,
) {
    for model in render_models.draw_order() {
        model.instance_buffer.bind(render_pass);
        render_pass.insert_debug_marker(&model.name);

        for primitive in &model.primitives {
            let Some(material) = materials.get(primitive.material) else {
                continue;
            };
            let Some(pipeline) = scene_pass
                .pipeline_for(material)
                .and_then(|id| pipeline_cache.get(id))
            else {
                continue;
            };
            let Some(bind_group) = material_manager.bind_group(primitive.material) else {
                continue;
            };

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(3, bind_group, &[]);
            render_pass.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
            render_pass.set_index_buffer(
                primitive.index_buffer.slice(..),
                wgpu::IndexFormat::Uint32,
            );
            render_pass.draw_indexed(0..primitive.num_indices, 0, 0..model.instances.len() as u32);
        }
    }
}
