use crate::mesh::{self, Batches, GridVertex, InstanceData, Vertex};
use crate::shaders;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use simrig_render::{ContextDevice, RenderContext, VisualScene};
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    light_dir: [f32; 4],
}

impl Uniforms {
    fn new(view_proj: Mat4) -> Self {
        let light = Vec3::new(0.3, -0.5, 1.0).normalize();
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            light_dir: light.extend(0.0).to_array(),
        }
    }
}

struct Mesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

impl Mesh {
    fn upload(device: &wgpu::Device, label: &str, (verts, indices): (Vec<Vertex>, Vec<u16>)) -> Self {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_vertex_buffer")),
            contents: bytemuck::cast_slice(&verts),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_index_buffer")),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertices,
            indices: index_buffer,
            index_count: indices.len() as u32,
        }
    }
}

/// Model-dependent objects a render context owns on the GPU.
#[derive(Debug)]
pub(crate) struct GridObjects {
    buffer: wgpu::Buffer,
    vertex_count: u32,
}

impl GridObjects {
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// Builds render contexts on a backend's device.
pub(crate) struct DeviceContext {
    device: Arc<wgpu::Device>,
}

impl DeviceContext {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self { device }
    }
}

impl ContextDevice for DeviceContext {
    type Objects = GridObjects;

    fn build(&self, ctx: &RenderContext) -> GridObjects {
        let verts = mesh::grid_mesh(ctx);
        tracing::debug!(lines = verts.len() / 2, "uploading floor grid");
        GridObjects {
            buffer: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("grid_vertex_buffer"),
                contents: bytemuck::cast_slice(&verts),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            vertex_count: verts.len() as u32,
        }
    }
}

/// GPU-side drawing of a [`VisualScene`]: the context's floor grid plus
/// instanced cubes, spheres and cylinders.
///
/// Shared by the windowed and offscreen backends. Holds only what is
/// independent of the model; everything built from the model lives in the
/// render context.
pub(crate) struct GpuRenderer {
    mesh_pipeline: wgpu::RenderPipeline,
    grid_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    cube: Mesh,
    sphere: Mesh,
    cylinder: Mesh,
    instance_buffer: wgpu::Buffer,
    max_instances: u64,
    depth_texture: wgpu::TextureView,
    target_format: wgpu::TextureFormat,
}

impl GpuRenderer {
    pub fn new(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniform_buffer"),
            contents: bytemuck::bytes_of(&Uniforms::new(Mat4::IDENTITY)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform_bind_group_layout"),
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

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let depth_stencil = wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        };

        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::MESH_SHADER.into()),
        });

        let mesh_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("mesh_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &mesh_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x3,
                            1 => Float32x3,
                        ],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<InstanceData>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &wgpu::vertex_attr_array![
                            2 => Float32x4,
                            3 => Float32x4,
                            4 => Float32x4,
                            5 => Float32x4,
                            6 => Float32x4,
                        ],
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &mesh_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // Non-uniform and mirrored scales flip winding; draw both faces.
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(depth_stencil.clone()),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let grid_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("grid_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::GRID_SHADER.into()),
        });

        let grid_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("grid_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &grid_shader,
                entry_point: Some("vs_grid"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<GridVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x3,
                        1 => Float32x4,
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &grid_shader,
                entry_point: Some("fs_grid"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: Some(depth_stencil),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let max_instances = 1024;
        Self {
            mesh_pipeline,
            grid_pipeline,
            uniform_buffer,
            uniform_bind_group,
            cube: Mesh::upload(device, "cube", mesh::cube_mesh()),
            sphere: Mesh::upload(device, "sphere", mesh::sphere_mesh(24, 12)),
            cylinder: Mesh::upload(device, "cylinder", mesh::cylinder_mesh(24)),
            instance_buffer: Self::create_instance_buffer(device, max_instances),
            max_instances,
            depth_texture: Self::create_depth_texture(device, width, height),
            target_format,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.depth_texture = Self::create_depth_texture(device, width, height);
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    /// Record one frame of `scene` into `encoder`, clearing `target` first.
    ///
    /// Buffers are written through `queue` immediately; the caller submits.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        scene: &VisualScene,
        ctx: &RenderContext<GridObjects>,
        view_proj: Mat4,
    ) {
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&Uniforms::new(view_proj)),
        );

        let batches = Batches::from_scene(scene, ctx);
        let total = batches.len() as u64;
        if total > self.max_instances {
            self.max_instances = total.next_power_of_two();
            self.instance_buffer = Self::create_instance_buffer(device, self.max_instances);
        }
        let mut ranges: [Range<u32>; 3] = [0..0, 0..0, 0..0];
        let mut offset = 0u32;
        for (slot, batch) in [&batches.cubes, &batches.spheres, &batches.cylinders]
            .into_iter()
            .enumerate()
        {
            if !batch.is_empty() {
                queue.write_buffer(
                    &self.instance_buffer,
                    offset as u64 * std::mem::size_of::<InstanceData>() as u64,
                    bytemuck::cast_slice(batch),
                );
            }
            ranges[slot] = offset..offset + batch.len() as u32;
            offset += batch.len() as u32;
        }

        let [r, g, b, a] = ctx.clear_color.map(f64::from);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_texture,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        let grid = &ctx.device;
        pass.set_pipeline(&self.grid_pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_vertex_buffer(0, grid.buffer.slice(..));
        pass.draw(0..grid.vertex_count(), 0..1);

        pass.set_pipeline(&self.mesh_pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        let stride = std::mem::size_of::<InstanceData>() as u64;
        for (mesh, range) in [&self.cube, &self.sphere, &self.cylinder]
            .into_iter()
            .zip(ranges)
        {
            if range.is_empty() {
                continue;
            }
            // Offset the binding rather than the instance index; GL lacks base instance.
            let bytes = range.start as u64 * stride..range.end as u64 * stride;
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.set_vertex_buffer(1, self.instance_buffer.slice(bytes));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..mesh.index_count, 0, 0..range.len() as u32);
        }
    }

    fn create_instance_buffer(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("instance_buffer"),
            size: capacity * std::mem::size_of::<InstanceData>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }
}
