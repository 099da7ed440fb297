use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Vec3};
use wgpu::util::DeviceExt;
use winit::window::{Window, WindowId};

use crate::error::RenderError;
use crate::post::ToneMapping;
use crate::scene::{DrawItem, LightKind, MeshData, MeshId};

use super::{Frame, SceneRenderer};

const DEFAULT_CLEAR: Vec3 = Vec3::new(0.03, 0.03, 0.05);

/// GPU renderer backed by wgpu that draws the session's scene graph into a
/// winit window.
pub struct WgpuRenderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    mesh_cache: HashMap<MeshId, MeshBuffers>,
}

impl WgpuRenderer {
    /// Initializes the GPU renderer for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("viewport-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viewport-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let global_layout = uniform_layout::<GlobalUniform>(&device, "global-bind-layout");
        let object_layout = uniform_layout::<ObjectConstants>(&device, "object-bind-layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("viewport-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("viewport-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (MeshData::STRIDE * std::mem::size_of::<f32>()) as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: (3 * std::mem::size_of::<f32>()) as u64,
                            shader_location: 1,
                        },
                    ],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        log::info!(
            "wgpu renderer ready on {} ({surface_format:?})",
            adapter.get_info().name
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            pipeline,
            global_buffer,
            global_bind_group,
            object_layout,
            mesh_cache: HashMap::new(),
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn upload_meshes(&mut self, items: &[DrawItem]) {
        let used: HashSet<MeshId> = items.iter().map(|item| item.mesh.id()).collect();
        self.mesh_cache.retain(|id, _| used.contains(id));
        for item in items {
            let id = item.mesh.id();
            if !self.mesh_cache.contains_key(&id) {
                log::debug!("uploading mesh {id:?} ({} vertices)", item.mesh.vertex_count());
                let buffers = MeshBuffers::from_mesh(&self.device, &item.mesh);
                self.mesh_cache.insert(id, buffers);
            }
        }
    }
}

impl SceneRenderer for WgpuRenderer {
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, width, height);
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), RenderError> {
        let output = self.surface.get_current_texture().map_err(|err| match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => RenderError::SurfaceLost,
            wgpu::SurfaceError::OutOfMemory => RenderError::OutOfMemory,
            other => RenderError::Backend(other.to_string()),
        })?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&GlobalUniform::from_frame(frame)));

        let items = frame.scene.draw_list();
        self.upload_meshes(&items);

        let bind_groups: Vec<wgpu::BindGroup> = items
            .iter()
            .map(|item| {
                let constants = ObjectConstants::from_item(item);
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("object-uniform"),
                        contents: bytes_of(&constants),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("object-bind-group"),
                    layout: &self.object_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let clear = frame.scene.background.unwrap_or(DEFAULT_CLEAR);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewport-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(clear.x),
                            g: f64::from(clear.y),
                            b: f64::from(clear.z),
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.global_bind_group, &[]);
            for (item, bind_group) in items.iter().zip(&bind_groups) {
                let Some(mesh) = self.mesh_cache.get(&item.mesh.id()) else {
                    continue;
                };
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.set_bind_group(1, bind_group, &[]);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }
}

fn uniform_layout<T>(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
            },
            count: None,
        }],
    })
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData) -> Self {
        let label = format!("mesh-{:?}", mesh.id());
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    /// xyz towards the light, w is 1 when a directional light exists.
    light_direction: [f32; 4],
    /// rgb color, w intensity.
    light_color: [f32; 4],
    ambient: [f32; 4],
    /// threshold, strength, radius, exposure.
    effects: [f32; 4],
    /// x bloom enabled, y Reinhard tone mapping.
    flags: [f32; 4],
}

impl GlobalUniform {
    fn from_frame(frame: &Frame<'_>) -> Self {
        let lights = frame.scene.lights();
        let ambient = lights
            .iter()
            .filter(|light| light.kind == LightKind::Ambient)
            .fold(Vec3::ZERO, |sum, light| sum + light.color * light.intensity);
        let sun = lights
            .iter()
            .find(|light| light.kind == LightKind::Directional);
        let (light_direction, light_color) = match sun {
            Some(light) => (
                light.position.normalize_or_zero().extend(1.0),
                light.color.extend(light.intensity),
            ),
            None => (Vec3::Y.extend(0.0), Vec3::ZERO.extend(0.0)),
        };

        let (effects, flags) = match frame.effects {
            Some(effects) => {
                let bloom = effects.bloom.unwrap_or_default();
                (
                    [
                        bloom.threshold(),
                        bloom.strength(),
                        bloom.radius(),
                        effects.exposure,
                    ],
                    [
                        if effects.bloom.is_some() { 1.0 } else { 0.0 },
                        if effects.tone_mapping == ToneMapping::Reinhard { 1.0 } else { 0.0 },
                        0.0,
                        0.0,
                    ],
                )
            }
            None => ([0.0, 0.0, 0.0, 1.0], [0.0; 4]),
        };

        Self {
            view_proj: frame.camera.view_proj().to_cols_array_2d(),
            camera_position: frame.camera.position.extend(1.0).into(),
            light_direction: light_direction.into(),
            light_color: light_color.into(),
            ambient: ambient.extend(1.0).into(),
            effects,
            flags,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    color: [f32; 4],
    emissive: [f32; 4],
}

impl ObjectConstants {
    fn from_item(item: &DrawItem) -> Self {
        let normal = Mat3::from_mat4(item.model).inverse().transpose();
        Self {
            model: item.model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            color: item.material.color.extend(item.material.opacity).into(),
            emissive: item.material.emissive.extend(1.0).into(),
        }
    }
}

const SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
    ambient: vec4<f32>,
    effects: vec4<f32>,
    flags: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
    emissive: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let normal = normalize(input.normal);
    let diffuse = max(dot(normal, globals.light_direction.xyz), 0.0)
        * globals.light_direction.w * globals.light_color.w;
    var color = object.color.rgb * (globals.ambient.rgb + diffuse * globals.light_color.rgb)
        + object.emissive.rgb;

    if (globals.flags.x > 0.5) {
        let luminance = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
        let threshold = globals.effects.x;
        let glow = max(luminance - threshold, 0.0) / max(1.0 - threshold, 0.001);
        color = color + color * glow * globals.effects.y * (1.0 + globals.effects.z);
    }

    color = color * globals.effects.w;
    if (globals.flags.y > 0.5) {
        color = color / (vec3<f32>(1.0) + color);
    }
    return vec4<f32>(color, object.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::post::{BloomSettings, FrameEffects};
    use crate::scene::{Light, SceneGraph, SceneNode};

    fn scene() -> SceneGraph {
        let mut scene = SceneGraph::new();
        scene.add(SceneNode::light(
            "sun",
            Light::directional(Vec3::new(1.0, 1.0, 0.0), 10.0, Vec3::new(0.0, 2.0, 0.0)),
        ));
        scene.add(SceneNode::light("fill", Light::ambient(Vec3::ONE, 0.25)));
        scene.add(SceneNode::light("fill-2", Light::ambient(Vec3::ONE, 0.25)));
        scene
    }

    #[test]
    fn globals_collect_lights() {
        let scene = scene();
        let camera = PerspectiveCamera::new(45.0, 1.0, 10000.0, 1.0);
        let globals = GlobalUniform::from_frame(&Frame {
            scene: &scene,
            camera: &camera,
            effects: None,
        });
        assert_eq!(globals.light_direction, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(globals.light_color, [1.0, 1.0, 0.0, 10.0]);
        assert_eq!(globals.ambient, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(globals.effects, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(globals.flags, [0.0; 4]);
    }

    #[test]
    fn globals_encode_effects() {
        let scene = SceneGraph::new();
        let camera = PerspectiveCamera::new(45.0, 1.0, 10000.0, 1.0);
        let globals = GlobalUniform::from_frame(&Frame {
            scene: &scene,
            camera: &camera,
            effects: Some(FrameEffects {
                bloom: Some(BloomSettings::new(0.25, 2.0, 0.5)),
                tone_mapping: ToneMapping::Reinhard,
                exposure: 16.0,
                buffer_size: (500, 500),
            }),
        });
        assert_eq!(globals.effects, [0.25, 2.0, 0.5, 16.0]);
        assert_eq!(globals.flags, [1.0, 1.0, 0.0, 0.0]);
        assert_eq!(globals.light_direction[3], 0.0);
    }

    #[test]
    fn uniform_sizes_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<GlobalUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<ObjectConstants>() % 16, 0);
    }
}
