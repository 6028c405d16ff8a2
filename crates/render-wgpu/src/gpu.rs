use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use meander_common::{CameraPose, Index, TerrainVertex};
use meander_render::{
    BufferHandle, BufferKind, DeviceKind, Pipeline, RenderDevice, RenderError, check_kind,
    validate_upload,
};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use crate::shaders;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.55,
    g: 0.7,
    b: 0.85,
    a: 1.0,
};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    sun_direction: [f32; 4],
    camera_position: [f32; 4],
}

impl Uniforms {
    fn from_pose(pose: &CameraPose) -> Self {
        let sun = Vec3::new(0.4, 0.3, 1.0).normalize();
        Self {
            view_proj: pose.view_projection().to_cols_array_2d(),
            sun_direction: sun.extend(0.0).to_array(),
            camera_position: pose.position.extend(1.0).to_array(),
        }
    }
}

/// Resource stored inside a [`BufferHandle`] created by [`WgpuDevice`].
struct GpuBuffer(wgpu::Buffer);

fn buffer_usage(kind: BufferKind) -> wgpu::BufferUsages {
    match kind {
        BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
        BufferKind::Index => wgpu::BufferUsages::INDEX,
        BufferKind::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    }
}

fn terrain_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x3,
    ];
    wgpu::VertexBufferLayout {
        array_stride: size_of::<TerrainVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

struct DrawCall {
    vertex: BufferHandle,
    index: BufferHandle,
}

#[derive(Default)]
struct FrameState {
    in_frame: bool,
    pipeline: Option<Pipeline>,
    draws: Vec<DrawCall>,
}

struct SurfaceState {
    config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,
}

/// Render device backed by a wgpu surface.
///
/// Buffers may be created from any thread. Draws between `begin_frame` and
/// `end_frame` are recorded; `end_frame` acquires the surface texture, encodes
/// one pass, submits and presents.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    terrain_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    surface_state: Mutex<SurfaceState>,
    frame: Mutex<FrameState>,
}

impl WgpuDevice {
    /// Configure `surface` with `config` and build the terrain pipeline.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    ) -> Self {
        surface.configure(&device, &config);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniform_buffer"),
            contents: bytemuck::bytes_of(&Uniforms::from_pose(&CameraPose::default())),
            usage: buffer_usage(BufferKind::Uniform),
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

        let terrain_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("terrain_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::TERRAIN_SHADER.into()),
        });

        let terrain_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("terrain_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &terrain_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[terrain_vertex_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &terrain_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let depth = create_depth_texture(&device, config.width, config.height);
        tracing::info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "wgpu device ready"
        );

        Self {
            device,
            queue,
            surface,
            terrain_pipeline,
            uniform_buffer,
            uniform_bind_group,
            surface_state: Mutex::new(SurfaceState { config, depth }),
            frame: Mutex::new(FrameState::default()),
        }
    }

    fn gpu_buffer(handle: &BufferHandle) -> Result<&wgpu::Buffer, RenderError> {
        handle
            .resource::<GpuBuffer>()
            .map(|buffer| &buffer.0)
            .ok_or(RenderError::ForeignBuffer(handle.id()))
    }

    fn encode(
        &self,
        target: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        draws: &[DrawCall],
    ) -> Result<wgpu::CommandBuffer, RenderError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("terrain_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            if !draws.is_empty() {
                pass.set_pipeline(&self.terrain_pipeline);
                pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            }
            for draw in draws {
                pass.set_vertex_buffer(0, Self::gpu_buffer(&draw.vertex)?.slice(..));
                pass.set_index_buffer(
                    Self::gpu_buffer(&draw.index)?.slice(..),
                    wgpu::IndexFormat::Uint32,
                );
                pass.draw_indexed(0..draw.index.element_count(), 0, 0..1);
            }
        }
        Ok(encoder.finish())
    }
}

impl RenderDevice for WgpuDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Wgpu
    }

    fn create_buffer(
        &self,
        kind: BufferKind,
        data: &[u8],
        element_size: u32,
        element_count: u32,
    ) -> Result<BufferHandle, RenderError> {
        validate_upload(data, element_size, element_count)?;
        if kind == BufferKind::Index && element_size != size_of::<Index>() as u32 {
            return Err(RenderError::SizeMismatch {
                len: data.len(),
                element_size,
                element_count,
            });
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(match kind {
                    BufferKind::Vertex => "chunk_vertex_buffer",
                    BufferKind::Index => "chunk_index_buffer",
                    BufferKind::Uniform => "uniform_buffer",
                }),
                contents: data,
                usage: buffer_usage(kind),
            });
        Ok(BufferHandle::new(
            kind,
            element_size,
            element_count,
            GpuBuffer(buffer),
        ))
    }

    fn begin_frame(&self, pose: &CameraPose) -> Result<(), RenderError> {
        let mut frame = self.frame.lock();
        if frame.in_frame {
            return Err(RenderError::FrameAlreadyStarted);
        }
        self.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&Uniforms::from_pose(pose)),
        );
        frame.in_frame = true;
        frame.pipeline = None;
        frame.draws.clear();
        Ok(())
    }

    fn bind_pipeline(&self, pipeline: Pipeline) -> Result<(), RenderError> {
        let mut frame = self.frame.lock();
        if !frame.in_frame {
            return Err(RenderError::FrameNotStarted);
        }
        match pipeline {
            Pipeline::Terrain => {
                frame.pipeline = Some(pipeline);
                Ok(())
            }
            other => Err(RenderError::UnsupportedPipeline(other)),
        }
    }

    fn draw_with_buffers(
        &self,
        vertex: &BufferHandle,
        index: &BufferHandle,
    ) -> Result<(), RenderError> {
        let mut frame = self.frame.lock();
        if !frame.in_frame {
            return Err(RenderError::FrameNotStarted);
        }
        if frame.pipeline.is_none() {
            return Err(RenderError::NoPipelineBound);
        }
        check_kind(vertex, BufferKind::Vertex)?;
        check_kind(index, BufferKind::Index)?;
        Self::gpu_buffer(vertex)?;
        Self::gpu_buffer(index)?;
        frame.draws.push(DrawCall {
            vertex: vertex.clone(),
            index: index.clone(),
        });
        Ok(())
    }

    fn end_frame(&self) -> Result<(), RenderError> {
        let draws = {
            let mut frame = self.frame.lock();
            if !frame.in_frame {
                return Err(RenderError::FrameNotStarted);
            }
            frame.in_frame = false;
            frame.pipeline = None;
            std::mem::take(&mut frame.draws)
        };

        let surface_state = self.surface_state.lock();
        let output = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost; reconfiguring");
                self.surface.configure(&self.device, &surface_state.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface texture timed out; frame dropped");
                return Ok(());
            }
            Err(err) => return Err(RenderError::Surface(err.to_string())),
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let commands = self.encode(&view, &surface_state.depth, &draws)?;
        self.queue.submit(std::iter::once(commands));
        output.present();
        Ok(())
    }

    fn wait_for_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
        tracing::debug!("gpu idle");
    }

    fn resize(&self, width: u32, height: u32) {
        let mut state = self.surface_state.lock();
        state.config.width = width.max(1);
        state.config.height = height.max(1);
        self.surface.configure(&self.device, &state.config);
        state.depth = create_depth_texture(&self.device, state.config.width, state.config.height);
    }

    fn aspect(&self) -> f32 {
        let state = self.surface_state.lock();
        state.config.width as f32 / state.config.height.max(1) as f32
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn uniforms_are_std140_sized() {
        assert_eq!(size_of::<Uniforms>(), 96);
        assert_eq!(size_of::<Uniforms>() % 16, 0);
    }

    #[test]
    fn uniforms_carry_pose() {
        let pose = CameraPose {
            position: Vec3::new(1.0, 2.0, 3.0),
            view: Mat4::from_translation(Vec3::X),
            proj: Mat4::from_scale(Vec3::splat(2.0)),
        };
        let uniforms = Uniforms::from_pose(&pose);
        assert_eq!(uniforms.view_proj, pose.view_projection().to_cols_array_2d());
        assert_eq!(uniforms.camera_position, [1.0, 2.0, 3.0, 1.0]);
        let sun = Vec3::from_slice(&uniforms.sun_direction[..3]);
        assert!((sun.length() - 1.0).abs() < 1e-6);
        assert!(sun.z > 0.0);
    }

    #[test]
    fn vertex_layout_matches_terrain_vertex() {
        let layout = terrain_vertex_layout();
        assert_eq!(layout.array_stride, 36);
        assert_eq!(layout.attributes.len(), 3);
        assert_eq!(layout.attributes[2].offset, 24);
    }

    #[test]
    fn usages_follow_buffer_kind() {
        assert!(buffer_usage(BufferKind::Vertex).contains(wgpu::BufferUsages::VERTEX));
        assert!(buffer_usage(BufferKind::Index).contains(wgpu::BufferUsages::INDEX));
        assert!(buffer_usage(BufferKind::Uniform).contains(wgpu::BufferUsages::COPY_DST));
    }

    #[test]
    fn foreign_buffers_are_rejected() {
        let null_buffer = BufferHandle::new(BufferKind::Vertex, 4, 1, ());
        assert!(matches!(
            WgpuDevice::gpu_buffer(&null_buffer),
            Err(RenderError::ForeignBuffer(_))
        ));
    }

    #[test]
    fn terrain_shader_exports_entry_points() {
        assert!(shaders::TERRAIN_SHADER.contains("fn vs_main"));
        assert!(shaders::TERRAIN_SHADER.contains("fn fs_main"));
    }
}
