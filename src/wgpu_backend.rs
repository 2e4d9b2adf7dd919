//! [`RenderBackend`] implementation on top of wgpu.
//!
//! Every quad technique is compiled into its own pipeline against one shared
//! bind-group layout:
//!
//! ```wgsl
//! struct Uniforms {
//!     resolution: vec2f,
//!     blend: f32,
//!     time: f32,
//! }
//! @group(0) @binding(0) var<uniform> u: Uniforms;
//! @group(0) @binding(1) var input_texture: texture_2d<f32>;
//! @group(0) @binding(2) var scene_texture: texture_2d<f32>;
//! @group(0) @binding(3) var input_sampler: sampler;
//! ```
//!
//! The vertex entry point is always `vs`; the technique's entry names the
//! fragment stage. Passes with a single input see it bound to both textures.

use std::collections::HashMap;

use crate::error::{OverrideError, Result};
use crate::gpu::GpuContext;
use crate::render_graph::{
    ClearSpec, QuadDraw, RenderBackend, RenderTarget, SceneDraw, ShaderHandle, Surface,
    TargetDesc, Technique,
};
use crate::scene_pass::ScenePass;
use crate::shader_library::ShaderLibrary;

/// Uniforms shared by every quad technique.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadUniforms {
    pub resolution: [f32; 2],
    pub blend: f32,
    pub time: f32,
}

struct QuadPipeline {
    technique: Technique,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
}

struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

fn color_load(clear: &ClearSpec) -> wgpu::LoadOp<wgpu::Color> {
    match clear.color {
        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }),
        None => wgpu::LoadOp::Load,
    }
}

fn depth_load(clear: &ClearSpec) -> wgpu::LoadOp<f32> {
    match clear.depth {
        Some(depth) => wgpu::LoadOp::Clear(depth),
        None => wgpu::LoadOp::Load,
    }
}

/// Renders the override into a window surface.
///
/// Call [`begin_frame`](Self::begin_frame) before running the operation list
/// and [`end_frame`](Self::end_frame) after it to submit and present.
pub struct WgpuBackend {
    gpu: GpuContext,
    library: ShaderLibrary,
    scene: ScenePass,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<u32, QuadPipeline>,
    next_shader: u32,
    frame: Option<Frame>,
    time: f32,
}

impl WgpuBackend {
    pub fn new(gpu: GpuContext, library: ShaderLibrary) -> Result<Self> {
        let scene = ScenePass::new(&gpu, &library)?;
        let device = &gpu.device;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Quad Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Bind Group Layout"),
            entries: &[
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Previous pass output
                texture_entry(1),
                // Scene capture
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Ok(Self {
            gpu,
            library,
            scene,
            bind_group_layout,
            pipeline_layout,
            sampler,
            pipelines: HashMap::new(),
            next_shader: 0,
            frame: None,
            time: 0.0,
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut GpuContext {
        &mut self.gpu
    }

    pub fn library(&self) -> &ShaderLibrary {
        &self.library
    }

    /// Acquires the next surface texture and starts recording.
    pub fn begin_frame(&mut self, time: f32) -> Result<()> {
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gpu.surface.configure(&self.gpu.device, &self.gpu.config);
                return Err(OverrideError::Device("surface lost; reconfigured".into()));
            }
            Err(e) => return Err(OverrideError::Device(format!("failed to acquire frame: {e}"))),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("postfx Encoder"),
            });
        self.time = time;
        self.frame = Some(Frame {
            output,
            view,
            encoder,
        });
        Ok(())
    }

    /// Submits the recorded commands and presents the surface.
    pub fn end_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.gpu.queue.submit(std::iter::once(frame.encoder.finish()));
            frame.output.present();
        }
    }

    fn compile(&self, technique: &Technique) -> Result<QuadPipeline> {
        let source = self.library.source(&technique.effect)?;
        let device = &self.gpu.device;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(technique.effect.as_str()),
            source: wgpu::ShaderSource::Wgsl(source),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(technique.effect.as_str()),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(technique.entry.as_str()),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(OverrideError::shader_load(technique.to_string(), err.to_string()));
        }

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Quad Uniforms"),
            size: std::mem::size_of::<QuadUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(QuadPipeline {
            technique: technique.clone(),
            pipeline,
            uniform_buffer,
        })
    }
}

impl RenderBackend for WgpuBackend {
    type Target = RenderTarget;

    fn create_target(&mut self, desc: &TargetDesc) -> Result<RenderTarget> {
        let max = self.gpu.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(OverrideError::allocation(
                &desc.name,
                format!("{}x{} exceeds the device limit of {max}", desc.width, desc.height),
            ));
        }

        self.gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let target = RenderTarget::new(&self.gpu, desc);
        if let Some(err) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            return Err(OverrideError::allocation(&desc.name, err.to_string()));
        }
        Ok(target)
    }

    fn destroy_target(&mut self, target: RenderTarget) {
        target.texture.destroy();
    }

    fn load_shader(&mut self, technique: &Technique) -> Result<ShaderHandle> {
        let pipeline = self.compile(technique)?;
        self.next_shader += 1;
        self.pipelines.insert(self.next_shader, pipeline);
        tracing::debug!(technique = %technique, handle = self.next_shader, "compiled technique");
        Ok(ShaderHandle(self.next_shader))
    }

    fn release_shader(&mut self, shader: ShaderHandle) {
        self.pipelines.remove(&shader.0);
    }

    fn render_scene(&mut self, draw: SceneDraw<'_, RenderTarget>) -> Result<()> {
        let Some(frame) = self.frame.as_mut() else {
            return Err(OverrideError::Device("render_scene outside begin_frame".into()));
        };

        let (view, resolution) = match draw.color {
            Surface::Target(t) => (&t.view, [t.width() as f32, t.height() as f32]),
            Surface::Backbuffer => (
                &frame.view,
                [self.gpu.width() as f32, self.gpu.height() as f32],
            ),
        };

        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Capture Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load(&draw.clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: draw.depth.map(|depth| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load(&draw.clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        self.scene.render(
            &self.gpu,
            &mut render_pass,
            resolution,
            self.time,
            draw.depth.is_some(),
        );
        Ok(())
    }

    fn draw_quad(&mut self, draw: QuadDraw<'_, RenderTarget>) -> Result<()> {
        let Some(frame) = self.frame.as_mut() else {
            return Err(OverrideError::Device("draw_quad outside begin_frame".into()));
        };
        let quad = self.pipelines.get(&draw.shader.0).ok_or_else(|| {
            OverrideError::shader_load(format!("#{}", draw.shader.0), "shader was released")
        })?;
        let Some(&input) = draw.inputs.first() else {
            return Err(OverrideError::allocation(draw.label, "quad draw without an input"));
        };
        let scene = draw.inputs.get(1).copied().unwrap_or(input);

        let (view, width, height) = match draw.output {
            Surface::Target(t) => (&t.view, t.width(), t.height()),
            Surface::Backbuffer => (&frame.view, self.gpu.width(), self.gpu.height()),
        };

        let uniforms = QuadUniforms {
            resolution: [width as f32, height as f32],
            blend: draw.params.blend,
            time: self.time,
        };
        self.gpu
            .queue
            .write_buffer(&quad.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(quad.technique.effect.as_str()),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: quad.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&input.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&scene.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(draw.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load(&draw.clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let (x, y, w, h) = draw.view_rect.to_pixels(width, height);
        if w <= 0.0 || h <= 0.0 {
            return Ok(());
        }
        render_pass.set_viewport(x, y, w, h, 0.0, 1.0);
        render_pass.set_pipeline(&quad.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
        Ok(())
    }
}
