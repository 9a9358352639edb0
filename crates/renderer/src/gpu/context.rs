use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::compile::ShaderSource;
use crate::context::{
    Arena, ContextUnavailable, DeviceProfile, GeometryHandle, ProgramHandle, RenderContext,
    StageHandle, SurfaceTarget, Viewport,
};
use crate::types::DrawError;
use crate::uniforms::UniformLayout;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct GpuQuad {
    buffer: wgpu::Buffer,
    vertex_count: u32,
}

/// `wgpu` device and surface for one winit window.
pub struct WgpuContext {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    profile: DeviceProfile,
    uniform_layout: wgpu::BindGroupLayout,
    stages: Arena<wgpu::ShaderModule>,
    programs: Arena<GpuProgram>,
    geometry: Arena<GpuQuad>,
    viewport: Option<Viewport>,
}

impl WgpuContext {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let initial_size = window.inner_size();
        let surface = instance
            .create_surface(window)
            .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        let constrained = matches!(
            info.device_type,
            wgpu::DeviceType::Cpu | wgpu::DeviceType::IntegratedGpu
        );
        let profile = DeviceProfile {
            name: info.name.clone(),
            backend: format!("{:?}", info.backend),
            constrained,
        };
        tracing::debug!(
            name = %profile.name,
            backend = %profile.backend,
            device_type = ?info.device_type,
            constrained,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("backdrop device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        if surface_format.is_srgb() {
            tracing::warn!(
                ?surface_format,
                "no non-sRGB surface format available; colors will be gamma encoded twice"
            );
        }
        let present_mode = if surface_caps.present_modes.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        };
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: initial_size.width.max(1),
            height: initial_size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("backdrop uniform layout"),
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

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            profile,
            uniform_layout,
            stages: Arena::default(),
            programs: Arena::default(),
            geometry: Arena::default(),
            viewport: None,
        })
    }

    /// Runs `create` inside a validation error scope and reports its error text.
    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}

impl RenderContext for WgpuContext {
    fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    fn create_stage(&mut self, source: &ShaderSource) -> Result<StageHandle, String> {
        let module = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.label),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Owned(source.text.to_string()),
                    stage: source.stage.naga_stage(),
                    defines: &[],
                },
            })
        })?;
        Ok(StageHandle(self.stages.insert(module)))
    }

    fn create_program(
        &mut self,
        vertex: StageHandle,
        fragment: StageHandle,
        layout: &UniformLayout,
    ) -> Result<ProgramHandle, String> {
        let vertex_module = self
            .stages
            .get(vertex.0)
            .ok_or("vertex stage is not live")?;
        let fragment_module = self
            .stages
            .get(fragment.0)
            .ok_or("fragment stage is not live")?;

        let program = self.scoped(|device| {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("backdrop pipeline layout"),
                bind_group_layouts: &[&self.uniform_layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("backdrop pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: Some("main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &QUAD_ATTRIBUTES,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });
            let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("backdrop uniforms"),
                size: u64::from(layout.size().max(16)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("backdrop uniform bind group"),
                layout: &self.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });
            GpuProgram {
                pipeline,
                uniform_buffer,
                bind_group,
            }
        })?;
        Ok(ProgramHandle(self.programs.insert(program)))
    }

    fn create_quad(&mut self, vertices: &[[f32; 2]]) -> GeometryHandle {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("backdrop quad"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        GeometryHandle(self.geometry.insert(GpuQuad {
            buffer,
            vertex_count: vertices.len() as u32,
        }))
    }

    fn write_uniforms(&mut self, program: ProgramHandle, bytes: &[u8]) -> Result<(), DrawError> {
        let program = self
            .programs
            .get(program.0)
            .ok_or(DrawError::UnknownHandle("program"))?;
        self.queue.write_buffer(&program.uniform_buffer, 0, bytes);
        Ok(())
    }

    fn resize_backing(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.reconfigure();
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    fn draw(&mut self, program: ProgramHandle, geometry: GeometryHandle) -> Result<(), DrawError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated; reconfiguring and skipping frame");
                self.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timeout; retrying next frame");
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(DrawError::OutOfMemory),
            Err(other) => return Err(DrawError::Device(other.to_string())),
        };

        let gpu_program = self
            .programs
            .get(program.0)
            .ok_or(DrawError::UnknownHandle("program"))?;
        let quad = self
            .geometry
            .get(geometry.0)
            .ok_or(DrawError::UnknownHandle("geometry"))?;

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("backdrop frame"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("backdrop pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some(viewport) = self.viewport {
                let width = viewport.width.min(self.config.width);
                let height = viewport.height.min(self.config.height);
                if width > 0 && height > 0 {
                    render_pass.set_viewport(
                        viewport.x as f32,
                        viewport.y as f32,
                        width as f32,
                        height as f32,
                        0.0,
                        1.0,
                    );
                }
            }
            render_pass.set_pipeline(&gpu_program.pipeline);
            render_pass.set_bind_group(0, &gpu_program.bind_group, &[]);
            render_pass.set_vertex_buffer(0, quad.buffer.slice(..));
            render_pass.draw(0..quad.vertex_count, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn release_stage(&mut self, stage: StageHandle) -> bool {
        self.stages.remove(stage.0).is_some()
    }

    fn release_program(&mut self, program: ProgramHandle) -> bool {
        match self.programs.remove(program.0) {
            Some(program) => {
                program.uniform_buffer.destroy();
                true
            }
            None => false,
        }
    }

    fn release_geometry(&mut self, geometry: GeometryHandle) -> bool {
        match self.geometry.remove(geometry.0) {
            Some(quad) => {
                quad.buffer.destroy();
                true
            }
            None => false,
        }
    }

    fn release(self) {
        let live = self.stages.live() + self.programs.live() + self.geometry.live();
        if live > 0 {
            tracing::warn!(live, "releasing GPU context with live objects");
        }
        tracing::debug!(adapter = %self.profile.name, "GPU context released");
    }
}

/// A winit window as a backdrop surface.
#[derive(Clone)]
pub struct WindowTarget {
    window: Arc<Window>,
}

impl WindowTarget {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl SurfaceTarget for WindowTarget {
    type Context = WgpuContext;

    fn acquire(&self) -> Result<WgpuContext, ContextUnavailable> {
        WgpuContext::new(self.window.clone())
            .map_err(|err| ContextUnavailable::new(format!("{err:#}")))
    }

    fn logical_size(&self) -> (f64, f64) {
        let logical = self
            .window
            .inner_size()
            .to_logical::<f64>(self.window.scale_factor());
        (logical.width, logical.height)
    }

    fn density_scale(&self) -> f64 {
        self.window.scale_factor()
    }
}
