// wgpu backend for table-scene

use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::Context;
use glam::{Mat3, Mat4, Vec3};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::device::{AttributeSlot, MeshHandle, ProgramHandle, RenderDevice, Topology, UniformSlot};
use crate::error::{DeviceError, LinkError};
use crate::mesh::fan_to_list;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const INITIAL_DRAW_CAPACITY: usize = 16;

/// Uniform names in slot order.
const UNIFORM_NAMES: [&str; 7] = [
    "model_view",
    "projection",
    "normal_matrix",
    "light_position",
    "ambient_color",
    "diffuse_color",
    "specular_color",
];

/// Vertex attributes and their shader locations. Each attribute has its own
/// vertex buffer, bound at the buffer slot equal to its location.
const ATTRIBUTES: [(&str, u32); 2] = [("position", 0), ("normal", 1)];

// Mirror of the WGSL `Uniforms` struct, including its vec3/mat3 padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    model_view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 3],
    light_position: [f32; 3],
    _pad0: f32,
    ambient_color: [f32; 3],
    _pad1: f32,
    diffuse_color: [f32; 3],
    _pad2: f32,
    specular_color: [f32; 3],
    _pad3: f32,
}

const UNIFORM_SIZE: u64 = std::mem::size_of::<Uniforms>() as u64;

impl Uniforms {
    fn new() -> Self {
        let mut uniforms: Self = bytemuck::Zeroable::zeroed();
        uniforms.model_view = Mat4::IDENTITY.to_cols_array_2d();
        uniforms.projection = Mat4::IDENTITY.to_cols_array_2d();
        uniforms.set_normal_matrix(&Mat3::IDENTITY);
        uniforms
    }

    fn set_normal_matrix(&mut self, value: &Mat3) {
        let [x, y, z] = value.to_cols_array_2d();
        self.normal_matrix = [
            [x[0], x[1], x[2], 0.0],
            [y[0], y[1], y[2], 0.0],
            [z[0], z[1], z[2], 0.0],
        ];
    }

    fn set_mat4(&mut self, slot: UniformSlot, value: &Mat4) -> bool {
        match UNIFORM_NAMES.get(slot.0 as usize) {
            Some(&"model_view") => self.model_view = value.to_cols_array_2d(),
            Some(&"projection") => self.projection = value.to_cols_array_2d(),
            _ => return false,
        }
        true
    }

    fn set_mat3(&mut self, slot: UniformSlot, value: &Mat3) -> bool {
        match UNIFORM_NAMES.get(slot.0 as usize) {
            Some(&"normal_matrix") => self.set_normal_matrix(value),
            _ => return false,
        }
        true
    }

    fn set_vec3(&mut self, slot: UniformSlot, value: Vec3) -> bool {
        let target = match UNIFORM_NAMES.get(slot.0 as usize) {
            Some(&"light_position") => &mut self.light_position,
            Some(&"ambient_color") => &mut self.ambient_color,
            Some(&"diffuse_color") => &mut self.diffuse_color,
            Some(&"specular_color") => &mut self.specular_color,
            _ => return false,
        };
        *target = value.to_array();
        true
    }
}

struct GpuProgram {
    handle: ProgramHandle,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Distance between per-draw uniform blocks.
    stride: u64,
    capacity: usize,
}

impl GpuProgram {
    /// Grows the per-draw uniform buffer to hold at least `draws` blocks.
    fn ensure_capacity(&mut self, device: &wgpu::Device, draws: usize) {
        if draws <= self.capacity {
            return;
        }
        let capacity = draws.next_power_of_two();
        let (uniform_buffer, bind_group) =
            create_uniform_storage(device, &self.bind_group_layout, self.stride, capacity);
        self.uniform_buffer = uniform_buffer;
        self.bind_group = bind_group;
        self.capacity = capacity;
        log::debug!("uniform buffer grown to {capacity} draws");
    }
}

struct GpuMesh {
    positions: wgpu::Buffer,
    normals: wgpu::Buffer,
    indices: wgpu::Buffer,
    /// The index list re-expressed as a triangle list, for fan draws.
    fan_indices: Option<wgpu::Buffer>,
}

struct DrawCommand {
    mesh: MeshHandle,
    topology: Topology,
    count: u32,
    uniforms: Uniforms,
}

/// [`RenderDevice`] on top of wgpu, presenting to a winit window.
///
/// Uniform writes update a CPU-side block; every draw call snapshots it.
/// `finish_frame` uploads all snapshots into one buffer and replays the
/// draws with dynamic offsets.
pub struct GpuDevice {
    _instance: wgpu::Instance,
    _adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    program: Option<GpuProgram>,
    next_program: u32,
    meshes: Vec<GpuMesh>,
    vertex_slots: (u32, u32),
    uniforms: Uniforms,
    draws: Vec<DrawCommand>,
    lost: bool,
}

impl GpuDevice {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable graphics adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("table-scene device"),
                    required_features: wgpu::Features::default(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to request device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no texture formats")?;

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        let depth_view = create_depth_view(&device, surface_config.width, surface_config.height);

        log::info!(
            "using adapter {:?} with format {:?}",
            adapter.get_info().name,
            surface_format
        );

        Ok(Self {
            _instance: instance,
            _adapter: adapter,
            device,
            queue,
            surface,
            surface_config,
            depth_view,
            program: None,
            next_program: 0,
            meshes: Vec::new(),
            vertex_slots: (ATTRIBUTES[0].1, ATTRIBUTES[1].1),
            uniforms: Uniforms::new(),
            draws: Vec::new(),
            lost: false,
        })
    }

    /// Drops every program and mesh, as a real context loss would.
    pub fn lose_context(&mut self) {
        log::warn!("simulating context loss: dropping {} meshes", self.meshes.len());
        self.lost = true;
        self.program = None;
        self.meshes.clear();
        self.draws.clear();
        self.uniforms = Uniforms::new();
    }

    /// Makes the device usable again. Resources must be recreated.
    pub fn restore_context(&mut self) {
        self.lost = false;
    }

    fn current_program(&self, program: ProgramHandle) -> Option<&GpuProgram> {
        self.program.as_ref().filter(|current| current.handle == program)
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(
            &self.device,
            self.surface_config.width,
            self.surface_config.height,
        );
        log::debug!(
            "surface configured at {}x{}",
            self.surface_config.width,
            self.surface_config.height
        );
    }

    fn build_program(
        &self,
        vertex_module: &wgpu::ShaderModule,
        fragment_module: &wgpu::ShaderModule,
        handle: ProgramHandle,
    ) -> GpuProgram {
        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(UNIFORM_SIZE),
                    },
                    count: None,
                }],
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let attributes = ATTRIBUTES.map(|(_, location)| wgpu::VertexAttribute {
            offset: 0,
            shader_location: location,
            format: wgpu::VertexFormat::Float32x3,
        });
        let buffers: Vec<wgpu::VertexBufferLayout> = attributes
            .iter()
            .map(|attribute| wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: std::slice::from_ref(attribute),
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: "vs_main",
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_config.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            });

        let alignment = self.device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = UNIFORM_SIZE.div_ceil(alignment) * alignment;
        let (uniform_buffer, bind_group) =
            create_uniform_storage(&self.device, &bind_group_layout, stride, INITIAL_DRAW_CAPACITY);

        GpuProgram {
            handle,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            bind_group,
            stride,
            capacity: INITIAL_DRAW_CAPACITY,
        }
    }

    fn submit_draws(&mut self) -> Result<(), DeviceError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated, skipping frame");
                self.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(DeviceError::OutOfMemory),
            Err(err) => {
                log::warn!("skipping frame: {err}");
                return Ok(());
            }
        };

        let Some(program) = self.program.as_mut() else {
            // Nothing linked: present a cleared frame only.
            log::warn!("no linked program, {} draws dropped", self.draws.len());
            self.draws.clear();
            frame.present();
            return Ok(());
        };
        program.ensure_capacity(&self.device, self.draws.len());
        let program = &*program;

        for (index, draw) in self.draws.iter().enumerate() {
            self.queue.write_buffer(
                &program.uniform_buffer,
                index as u64 * program.stride,
                bytemuck::bytes_of(&draw.uniforms),
            );
        }

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(&program.pipeline);
            let (position_slot, normal_slot) = self.vertex_slots;

            for (index, draw) in self.draws.iter().enumerate() {
                let Some(mesh) = self.meshes.get(draw.mesh.0 as usize) else {
                    log::warn!("draw of unknown mesh {:?} skipped", draw.mesh);
                    continue;
                };
                let (indices, count) = match (draw.topology, &mesh.fan_indices) {
                    (Topology::TriangleList, _) => (&mesh.indices, draw.count),
                    (Topology::TriangleFan, Some(fan)) => (fan, draw.count.saturating_sub(2) * 3),
                    (Topology::TriangleFan, None) => continue,
                };

                let offset = (index as u64 * program.stride) as u32;
                render_pass.set_bind_group(0, &program.bind_group, &[offset]);
                render_pass.set_vertex_buffer(position_slot, mesh.positions.slice(..));
                render_pass.set_vertex_buffer(normal_slot, mesh.normals.slice(..));
                render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.draws.clear();
        Ok(())
    }
}

impl RenderDevice for GpuDevice {
    fn compile_and_link(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramHandle, LinkError> {
        if self.lost {
            return Err(LinkError::ContextLost);
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Vertex Shader"),
                source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
            });
        let fragment_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Fragment Shader"),
                source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("shader compilation failed: {err}");
            return Err(LinkError::Compile(err.to_string()));
        }

        self.next_program += 1;
        let handle = ProgramHandle(self.next_program);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let program = self.build_program(&vertex_module, &fragment_module, handle);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("program link failed: {err}");
            return Err(LinkError::Link(err.to_string()));
        }

        self.program = Some(program);
        self.uniforms = Uniforms::new();
        Ok(handle)
    }

    fn attribute_slot(&self, program: ProgramHandle, name: &str) -> Option<AttributeSlot> {
        self.current_program(program)?;
        ATTRIBUTES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, location)| AttributeSlot(*location))
    }

    fn uniform_slot(&self, program: ProgramHandle, name: &str) -> Option<UniformSlot> {
        self.current_program(program)?;
        UNIFORM_NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|index| UniformSlot(index as u32))
    }

    fn enable_vertex_attributes(&mut self, position: AttributeSlot, normal: AttributeSlot) {
        self.vertex_slots = (position.0, normal.0);
    }

    fn set_uniform_mat4(&mut self, slot: UniformSlot, value: &Mat4) {
        if !self.uniforms.set_mat4(slot, value) {
            log::warn!("uniform slot {slot:?} is not a mat4");
        }
    }

    fn set_uniform_mat3(&mut self, slot: UniformSlot, value: &Mat3) {
        if !self.uniforms.set_mat3(slot, value) {
            log::warn!("uniform slot {slot:?} is not a mat3");
        }
    }

    fn set_uniform_vec3(&mut self, slot: UniformSlot, value: Vec3) {
        if !self.uniforms.set_vec3(slot, value) {
            log::warn!("uniform slot {slot:?} is not a vec3");
        }
    }

    fn upload_mesh(
        &mut self,
        positions: &[f32],
        normals: &[f32],
        indices: &[u16],
    ) -> Result<MeshHandle, DeviceError> {
        if self.lost {
            return Err(DeviceError::ContextLost);
        }
        if positions.is_empty() || positions.len() % 3 != 0 {
            return Err(DeviceError::InvalidMesh(format!(
                "{} position floats is not a list of triplets",
                positions.len()
            )));
        }
        if normals.len() != positions.len() {
            return Err(DeviceError::InvalidMesh(format!(
                "{} normal floats for {} position floats",
                normals.len(),
                positions.len()
            )));
        }
        let vertex_count = positions.len() / 3;
        if let Some(bad) = indices.iter().find(|&&index| index as usize >= vertex_count) {
            return Err(DeviceError::InvalidMesh(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }

        let buffer = |label: &str, contents: &[u8], usage: wgpu::BufferUsages| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                })
        };
        let fan = fan_to_list(indices);
        let mesh = GpuMesh {
            positions: buffer("Position Buffer", bytemuck::cast_slice(positions), wgpu::BufferUsages::VERTEX),
            normals: buffer("Normal Buffer", bytemuck::cast_slice(normals), wgpu::BufferUsages::VERTEX),
            indices: buffer("Index Buffer", bytemuck::cast_slice(indices), wgpu::BufferUsages::INDEX),
            fan_indices: (!fan.is_empty())
                .then(|| buffer("Fan Index Buffer", bytemuck::cast_slice(&fan), wgpu::BufferUsages::INDEX)),
        };

        let handle = MeshHandle(self.meshes.len() as u32);
        self.meshes.push(mesh);
        Ok(handle)
    }

    fn draw_indexed(&mut self, mesh: MeshHandle, topology: Topology, count: u32) {
        if self.lost {
            return;
        }
        if mesh.0 as usize >= self.meshes.len() {
            log::warn!("draw of unknown mesh {mesh:?} ignored");
            return;
        }
        self.draws.push(DrawCommand {
            mesh,
            topology,
            count,
            uniforms: self.uniforms,
        });
    }

    fn viewport_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if (width, height) != (self.surface_config.width, self.surface_config.height) {
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.reconfigure();
        }
    }

    fn clear_frame(&mut self) {
        self.draws.clear();
    }

    fn finish_frame(&mut self) -> Result<(), DeviceError> {
        if self.lost {
            self.draws.clear();
            return Err(DeviceError::ContextLost);
        }
        self.submit_draws()
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_uniform_storage(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    stride: u64,
    capacity: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Uniform Buffer"),
        size: stride * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Uniform Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &uniform_buffer,
                offset: 0,
                size: NonZeroU64::new(UNIFORM_SIZE),
            }),
        }],
    });

    (uniform_buffer, bind_group)
}
