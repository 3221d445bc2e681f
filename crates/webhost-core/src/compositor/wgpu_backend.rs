//! wgpu implementation of the GPU capability.
//!
//! Frames arrive as BGRA pixel buffers from the engine's compositor; they are
//! converted to RGBA, uploaded into a sampled texture and drawn as a
//! full-screen quad onto the swapchain.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use webhost_config::{CompositorConfig, PresentMode};
use wgpu::util::DeviceExt;

use super::gpu::{DeviceHandle, GpuBackend, GpuDevice, PresentationSurface};
use crate::error::{EmbedError, Result};
use crate::frame::FrameBuffer;

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// A wgpu surface plus the host-reported drawable size.
pub struct WgpuSurface {
    surface: wgpu::Surface<'static>,
    size: Mutex<(u32, u32)>,
    valid: AtomicBool,
}

impl WgpuSurface {
    /// Record the drawable size after the host resized its window or layer.
    pub fn set_size(&self, width: u32, height: u32) {
        *self.size.lock() = (width, height);
    }

    /// Mark the surface dead; the compositor tears down on its next use.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn raw(&self) -> &wgpu::Surface<'static> {
        &self.surface
    }
}

impl PresentationSurface for WgpuSurface {
    fn size(&self) -> (u32, u32) {
        *self.size.lock()
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// Backend owning the wgpu instance.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    config: CompositorConfig,
}

impl WgpuBackend {
    pub fn new(config: CompositorConfig) -> Self {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        Self { instance, config }
    }

    /// Create a surface for a window-like target (e.g. `Arc<winit::window::Window>`).
    pub fn create_surface(
        &self,
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<WgpuSurface> {
        let surface = self
            .instance
            .create_surface(target)
            .map_err(|e| EmbedError::Surface(e.to_string()))?;
        Ok(WgpuSurface {
            surface,
            size: Mutex::new((width, height)),
            valid: AtomicBool::new(true),
        })
    }

    /// Create a surface from a host-owned `CAMetalLayer`.
    ///
    /// # Safety
    /// `layer` must point to a live `CAMetalLayer` that outlives the returned
    /// surface.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub unsafe fn create_surface_from_layer(
        &self,
        layer: *mut std::ffi::c_void,
        width: u32,
        height: u32,
    ) -> Result<WgpuSurface> {
        let surface = unsafe {
            self.instance
                .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::CoreAnimationLayer(layer))
        }
        .map_err(|e| EmbedError::Surface(e.to_string()))?;
        Ok(WgpuSurface {
            surface,
            size: Mutex::new((width, height)),
            valid: AtomicBool::new(true),
        })
    }
}

impl GpuBackend for WgpuBackend {
    type Surface = WgpuSurface;
    type Device = WgpuDevice;

    fn acquire(&mut self, surface: &WgpuSurface) -> Result<WgpuDevice> {
        let adapter = pollster::block_on(self.instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: Some(&surface.surface),
        }))
        .ok_or(EmbedError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("webhost-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| EmbedError::Gpu(e.to_string()))?;

        let caps = surface.surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .first()
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let present_mode = match self.config.present_mode {
            PresentMode::Auto => wgpu::PresentMode::AutoVsync,
            PresentMode::Fifo => wgpu::PresentMode::Fifo,
            PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
            PresentMode::Immediate => wgpu::PresentMode::Immediate,
        };
        let present_mode = if present_mode == wgpu::PresentMode::AutoVsync
            || caps.present_modes.contains(&present_mode)
        {
            present_mode
        } else {
            log::warn!("present mode {:?} unsupported, falling back to Fifo", present_mode);
            wgpu::PresentMode::Fifo
        };

        let pipeline = QuadPipeline::new(&device, format);
        let [r, g, b, a] = self.config.clear_color;

        Ok(WgpuDevice {
            id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
            adapter_name: info.name,
            device,
            queue,
            format,
            alpha_mode,
            present_mode,
            max_frame_latency: self.config.max_frame_latency.max(1),
            clear_color: wgpu::Color { r, g, b, a },
            surface_config: None,
            pipeline,
            texture: None,
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { pos: [-1.0, -1.0], uv: [0.0, 1.0] },
    Vertex { pos: [1.0, -1.0], uv: [1.0, 1.0] },
    Vertex { pos: [1.0, 1.0], uv: [1.0, 0.0] },
    Vertex { pos: [-1.0, 1.0], uv: [0.0, 0.0] },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

struct QuadPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
}

impl QuadPipeline {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("quad.wgsl").into()),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("quad-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x2,
                        },
                        wgpu::VertexAttribute {
                            offset: 8,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x2,
                        },
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad-vb"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad-ib"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            vertex_buffer,
            index_buffer,
        }
    }
}

/// Sampled texture holding the last uploaded frame.
struct FrameTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

/// wgpu device, queue and quad pipeline for one surface.
pub struct WgpuDevice {
    id: u64,
    adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    alpha_mode: wgpu::CompositeAlphaMode,
    present_mode: wgpu::PresentMode,
    max_frame_latency: u32,
    clear_color: wgpu::Color,
    surface_config: Option<wgpu::SurfaceConfiguration>,
    pipeline: QuadPipeline,
    texture: Option<FrameTexture>,
}

impl WgpuDevice {
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn ensure_texture(&mut self, width: u32, height: u32) {
        let stale = self
            .texture
            .as_ref()
            .is_none_or(|t| t.width != width || t.height != height);

        if stale {
            log::debug!("Creating frame texture {}x{}", width, height);
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("frame-texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("frame_bind_group"),
                layout: &self.pipeline.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.pipeline.sampler),
                    },
                ],
            });
            self.texture = Some(FrameTexture {
                texture,
                bind_group,
                width,
                height,
            });
        }
    }

    fn upload(&mut self, frame: &FrameBuffer) -> Result<()> {
        let rgba = frame.to_rgba();
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if rgba.len() < expected {
            return Err(EmbedError::Gpu(format!(
                "frame has {} bytes, expected {}",
                rgba.len(),
                expected
            )));
        }

        self.ensure_texture(frame.width, frame.height);
        let Some(target) = self.texture.as_ref() else {
            return Err(EmbedError::Gpu("frame texture unavailable".into()));
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba[..expected],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

impl GpuDevice for WgpuDevice {
    type Surface = WgpuSurface;

    fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            backend: "wgpu",
            name: self.adapter_name.clone(),
            id: self.id,
        }
    }

    fn configure(&mut self, surface: &WgpuSurface, width: u32, height: u32) -> Result<()> {
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: self.format,
            width,
            height,
            present_mode: self.present_mode,
            alpha_mode: self.alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: self.max_frame_latency,
        };
        surface.surface.configure(&self.device, &config);
        self.surface_config = Some(config);
        Ok(())
    }

    fn present(&mut self, surface: &WgpuSurface, frame: &FrameBuffer) -> Result<()> {
        self.upload(frame)?;

        let output = match surface.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                if let Some(config) = &self.surface_config {
                    surface.surface.configure(&self.device, config);
                }
                return Err(EmbedError::SwapchainOutdated);
            }
            Err(e) => return Err(EmbedError::Gpu(e.to_string())),
        };

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(texture) = self.texture.as_ref() {
                rpass.set_pipeline(&self.pipeline.pipeline);
                rpass.set_bind_group(0, &texture.bind_group, &[]);
                rpass.set_vertex_buffer(0, self.pipeline.vertex_buffer.slice(..));
                rpass.set_index_buffer(self.pipeline.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                rpass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        output.present();
        Ok(())
    }
}
