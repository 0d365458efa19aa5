use std::{collections::HashMap, sync::Arc};

use wgpu::{
    DepthBiasState, Device, MultisampleState, PipelineCompilationOptions, RenderPass,
    RenderPassDescriptor, ShaderSource, StencilState,
};

use crate::{
    material_manager::{Material, MaterialKind, Side},
    rendering::{
        instance::INSTANCE_VBL,
        light_uniform::LightsBuffer,
        passes::pass::Pass,
        render_common::RenderCommon,
        render_material_manager::RenderMaterialManager,
        render_model::RENDER_MODEL_VBL,
        shader_loader::{PipelineCache, PipelineCacheBuilder, PipelineId, ShaderDefinition},
        texture::{DepthTexture, ShadowMap},
    },
};

const STANDARD_SHADER: ShaderDefinition = ShaderDefinition {
    name: "Standard material",
    path: "standard.wgsl",
};

const BASIC_SHADER: ShaderDefinition = ShaderDefinition {
    name: "Basic material",
    path: "basic.wgsl",
};

/// The render state a material needs from its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub kind: MaterialKind,
    pub side: Side,
    pub depth_test: bool,
}

impl PipelineKey {
    pub fn for_material(material: &Material) -> Self {
        Self {
            kind: material.kind,
            side: material.side,
            depth_test: material.depth_test,
        }
    }

    fn all() -> impl Iterator<Item = PipelineKey> {
        [MaterialKind::Standard, MaterialKind::Basic]
            .into_iter()
            .flat_map(|kind| {
                [Side::Front, Side::Back, Side::Double]
                    .into_iter()
                    .flat_map(move |side| {
                        [true, false].into_iter().map(move |depth_test| PipelineKey {
                            kind,
                            side,
                            depth_test,
                        })
                    })
            })
    }

    fn cull_mode(&self) -> Option<wgpu::Face> {
        match self.side {
            Side::Front => Some(wgpu::Face::Back),
            Side::Back => Some(wgpu::Face::Front),
            Side::Double => None,
        }
    }

    /// Without a depth test the mesh still writes depth, it just never loses.
    fn depth_compare(&self) -> wgpu::CompareFunction {
        if self.depth_test {
            wgpu::CompareFunction::Less
        } else {
            wgpu::CompareFunction::Always
        }
    }

    fn shader(&self) -> ShaderDefinition {
        match self.kind {
            MaterialKind::Standard => STANDARD_SHADER,
            MaterialKind::Basic => BASIC_SHADER,
        }
    }
}

/// Draws the scene to the surface with every light applied.
pub struct ScenePass {
    pipelines: HashMap<PipelineKey, PipelineId>,
    camera_bind_group: wgpu::BindGroup,
    lights_bind_group: wgpu::BindGroup,
    clear_color: wgpu::Color,
    common: Arc<RenderCommon>,
}

pub struct ScenePassTextureViews {
    pub color: wgpu::TextureView,
    pub depth: wgpu::TextureView,
}

impl ScenePass {
    pub fn create(
        device: &wgpu::Device,
        common: Arc<RenderCommon>,
        cache_builder: &mut PipelineCacheBuilder,
        material_manager: &RenderMaterialManager,
        lights_buffer: &LightsBuffer,
        shadow_map: &ShadowMap,
        clear_color: wgpu::Color,
    ) -> Self {
        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera bind group layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera bind group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: common.camera_uniform_buffer.as_entire_binding(),
            }],
        });

        let lights_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Lights bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                        count: None,
                    },
                ],
            });

        let lights_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lights bind group"),
            layout: &lights_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: lights_buffer.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(shadow_map.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(shadow_map.sampler()),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene pipeline layout"),
            bind_group_layouts: &[
                &camera_bind_group_layout,
                &common.global_uniform.bind_group_layout,
                &lights_bind_group_layout,
                material_manager.bind_group_layout(),
            ],
            push_constant_ranges: &[],
        });

        let surface_format = common.surface_format();

        let pipelines = PipelineKey::all()
            .map(|key| {
                let pipeline_layout = pipeline_layout.clone();

                let pipeline_id = cache_builder.add_shader(
                    key.shader(),
                    Box::new(
                        move |device: &Device, shader_def: &ShaderDefinition, source: &str| {
                            let shader =
                                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                                    label: Some(shader_def.name),
                                    source: ShaderSource::Wgsl(source.into()),
                                });

                            let label = format!("{} pipeline ({:?})", shader_def.name, key);

                            let pipeline =
                                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                                    label: Some(&label),
                                    layout: Some(&pipeline_layout),
                                    vertex: wgpu::VertexState {
                                        module: &shader,
                                        entry_point: Some("vs_main"),
                                        buffers: &[RENDER_MODEL_VBL, INSTANCE_VBL],
                                        compilation_options: PipelineCompilationOptions::default(),
                                    },
                                    fragment: Some(wgpu::FragmentState {
                                        module: &shader,
                                        entry_point: Some("fs_main"),
                                        targets: &[Some(wgpu::ColorTargetState {
                                            format: surface_format,
                                            blend: Some(wgpu::BlendState::REPLACE),
                                            write_mask: wgpu::ColorWrites::ALL,
                                        })],
                                        compilation_options: PipelineCompilationOptions::default(),
                                    }),
                                    primitive: wgpu::PrimitiveState {
                                        topology: wgpu::PrimitiveTopology::TriangleList,
                                        strip_index_format: None,
                                        front_face: wgpu::FrontFace::Ccw,
                                        cull_mode: key.cull_mode(),
                                        polygon_mode: wgpu::PolygonMode::Fill,
                                        unclipped_depth: false,
                                        conservative: false,
                                    },
                                    depth_stencil: Some(wgpu::DepthStencilState {
                                        format: DepthTexture::DEPTH_FORMAT,
                                        depth_write_enabled: true,
                                        depth_compare: key.depth_compare(),
                                        stencil: StencilState::default(),
                                        bias: DepthBiasState::default(),
                                    }),
                                    multisample: MultisampleState::default(),
                                    multiview: None,
                                    cache: None,
                                });

                            Ok(pipeline)
                        },
                    ),
                );

                (key, pipeline_id)
            })
            .collect();

        ScenePass {
            pipelines,
            camera_bind_group,
            lights_bind_group,
            clear_color,
            common,
        }
    }

    pub fn pipeline_for(&self, material: &Material) -> Option<PipelineId> {
        self.pipelines
            .get(&PipelineKey::for_material(material))
            .copied()
    }
}

impl Pass for ScenePass {
    type TextureViews = ScenePassTextureViews;

    fn render<'a, F>(
        &self,
        texture_views: &Self::TextureViews,
        encoder: &mut wgpu::CommandEncoder,
        _pipeline_cache: &PipelineCache,
        render_callback: F,
    ) where
        F: FnOnce(&mut RenderPass) + 'a,
    {
        let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Scene pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &texture_views.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &texture_views.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        // Pipelines differ per material, the callback sets them.
        render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
        render_pass.set_bind_group(1, &self.common.global_uniform.bind_group, &[]);
        render_pass.set_bind_group(2, &self.lights_bind_group, &[]);

        render_callback(&mut render_pass);
    }
}
