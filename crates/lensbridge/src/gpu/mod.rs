//! wgpu implementation of [`GpuPlatform`].
//!
//! wgpu has no display connection or current-context concept, so the pieces
//! of the graphics chain map onto it as follows:
//! - `target` turns raw host handles or a winit window into a wgpu surface.
//! - `context` requests the adapter (bounded by a timeout), negotiates the
//!   surface format against the requested bit depths, and opens the device.
//! - `pipeline` parses and validates GLSL with naga so compile errors come
//!   back as a log, and links stages into a render pipeline inside a
//!   validation error scope.
//! - `uniforms` reflects the parameter block out of the parsed module and
//!   writes float members straight through the queue.
//!
//! "Current" is tracked per thread here so a context is only ever driven by
//! the thread that made it current.

mod context;
mod pipeline;
mod target;
mod uniforms;

use std::thread::{self, ThreadId};
use std::time::Duration;

pub use context::DEFAULT_ACQUIRE_TIMEOUT;
pub use pipeline::{WgpuProgram, WgpuShader};
pub use target::{NativeWindow, SurfaceTarget, WindowKind};

use crate::platform::GpuPlatform;
use crate::types::{ApiVersion, ConfigAttributes, ConfigDescriptor, ShaderStage};

/// Instance plus the window surface and adapter found for it.
pub struct WgpuDisplay {
    instance: wgpu::Instance,
    surface: Option<wgpu::Surface<'static>>,
    adapter: Option<wgpu::Adapter>,
    api: Option<ApiVersion>,
}

/// Negotiated surface format and the capabilities it was chosen from.
pub struct WgpuConfig {
    format: wgpu::TextureFormat,
    capabilities: wgpu::SurfaceCapabilities,
}

pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    uniform_layout: wgpu::BindGroupLayout,
    max_dimension: u32,
}

/// Configured window surface. `frame` is declared first so a pending
/// texture is dropped before the surface it came from.
pub struct WgpuSurface {
    frame: Option<wgpu::SurfaceTexture>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl WgpuSurface {
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

pub struct WgpuPlatform {
    target: SurfaceTarget,
    acquire_timeout: Duration,
    current: Option<ThreadId>,
}

impl WgpuPlatform {
    pub fn new(target: impl Into<SurfaceTarget>) -> Self {
        Self {
            target: target.into(),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            current: None,
        }
    }

    /// Bounds how long display initialization waits for an adapter.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl GpuPlatform for WgpuPlatform {
    type Display = WgpuDisplay;
    type Config = WgpuConfig;
    type Context = WgpuContext;
    type Surface = WgpuSurface;
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Location = u32;

    fn get_display(&mut self) -> Option<WgpuDisplay> {
        let instance = context::create_instance();
        let surface = match self.target.create_surface(&instance) {
            Ok(surface) => surface,
            Err(err) => {
                tracing::warn!(error = %err, "failed to create window surface");
                return None;
            }
        };
        Some(WgpuDisplay {
            instance,
            surface: Some(surface),
            adapter: None,
            api: None,
        })
    }

    fn initialize_display(&mut self, display: &mut WgpuDisplay) -> Result<ApiVersion, String> {
        let surface = display
            .surface
            .take()
            .ok_or_else(|| "display has no window surface".to_string())?;
        let (surface, adapter) = context::request_adapter(
            &display.instance,
            surface,
            wgpu::PowerPreference::HighPerformance,
            self.acquire_timeout,
        )?;

        let info = adapter.get_info();
        let shader_model = adapter.get_downlevel_capabilities().shader_model;
        let api = context::api_version_for(shader_model);
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            ?shader_model,
            "selected GPU adapter"
        );

        display.surface = Some(surface);
        display.adapter = Some(adapter);
        display.api = Some(api);
        Ok(api)
    }

    fn choose_config(
        &mut self,
        display: &WgpuDisplay,
        attributes: &ConfigAttributes,
    ) -> Option<(WgpuConfig, ConfigDescriptor)> {
        let (surface, adapter, api) = match (&display.surface, &display.adapter, display.api) {
            (Some(surface), Some(adapter), Some(api)) => (surface, adapter, api),
            _ => return None,
        };
        let capabilities = surface.get_capabilities(adapter);
        if !capabilities
            .usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            tracing::warn!("surface cannot be used as a render attachment");
            return None;
        }
        let (format, descriptor) = context::select_format(&capabilities.formats, api, attributes)?;
        tracing::debug!(?format, "negotiated surface format");
        Some((
            WgpuConfig {
                format,
                capabilities,
            },
            descriptor,
        ))
    }

    fn create_context(
        &mut self,
        display: &WgpuDisplay,
        _config: &WgpuConfig,
    ) -> Result<WgpuContext, String> {
        let adapter = display
            .adapter
            .as_ref()
            .ok_or_else(|| "display was not initialized".to_string())?;
        let (device, queue) = context::request_device(adapter)?;
        let uniform_layout = uniforms::uniform_layout(&device);
        let max_dimension = device.limits().max_texture_dimension_2d;
        Ok(WgpuContext {
            device,
            queue,
            uniform_layout,
            max_dimension,
        })
    }

    fn create_surface(
        &mut self,
        display: &mut WgpuDisplay,
        config: &WgpuConfig,
        context: &WgpuContext,
    ) -> Result<WgpuSurface, String> {
        let surface = display
            .surface
            .take()
            .ok_or_else(|| "window surface already in use".to_string())?;
        let surface_config = context::surface_configuration(
            &config.capabilities,
            config.format,
            self.target.size(),
            context.max_dimension,
        );
        surface.configure(&context.device, &surface_config);
        tracing::debug!(
            width = surface_config.width,
            height = surface_config.height,
            present_mode = ?surface_config.present_mode,
            "surface configured"
        );
        Ok(WgpuSurface {
            frame: None,
            surface,
            config: surface_config,
        })
    }

    fn make_current(
        &mut self,
        _display: &WgpuDisplay,
        _surface: &WgpuSurface,
        _context: &WgpuContext,
    ) -> Result<(), String> {
        let me = thread::current().id();
        match self.current {
            Some(owner) if owner != me => Err("context is already current on another thread".into()),
            _ => {
                self.current = Some(me);
                Ok(())
            }
        }
    }

    fn release_current(&mut self, _display: &WgpuDisplay) {
        self.current = None;
    }

    fn is_current(&self) -> bool {
        self.current == Some(thread::current().id())
    }

    fn resize_surface(
        &mut self,
        context: &WgpuContext,
        surface: &mut WgpuSurface,
        width: u32,
        height: u32,
    ) {
        surface.frame = None;
        surface.config.width = width.clamp(1, context.max_dimension.max(1));
        surface.config.height = height.clamp(1, context.max_dimension.max(1));
        surface.surface.configure(&context.device, &surface.config);
    }

    fn destroy_surface(&mut self, _display: &WgpuDisplay, surface: WgpuSurface) {
        drop(surface);
    }

    fn destroy_context(&mut self, _display: &WgpuDisplay, context: WgpuContext) {
        drop(context);
    }

    fn terminate_display(&mut self, display: WgpuDisplay) {
        drop(display);
    }

    fn compile_shader(
        &mut self,
        context: &WgpuContext,
        stage: ShaderStage,
        source: &str,
    ) -> Result<WgpuShader, String> {
        pipeline::compile_shader(&context.device, stage, source)
    }

    fn delete_shader(&mut self, _context: &WgpuContext, shader: WgpuShader) {
        drop(shader);
    }

    fn link_program(
        &mut self,
        context: &WgpuContext,
        config: &WgpuConfig,
        vertex: &WgpuShader,
        fragment: &WgpuShader,
    ) -> Result<WgpuProgram, String> {
        pipeline::link_program(
            &context.device,
            &context.uniform_layout,
            config.format,
            vertex,
            fragment,
        )
    }

    fn delete_program(&mut self, _context: &WgpuContext, program: WgpuProgram) {
        drop(program);
    }

    fn uniform_location(
        &mut self,
        _context: &WgpuContext,
        program: &WgpuProgram,
        name: &str,
    ) -> Option<u32> {
        program.block.offset_of(name)
    }

    // Pipelines are bound per render pass in `draw`.
    fn use_program(&mut self, _context: &WgpuContext, _program: &WgpuProgram) {}

    fn set_uniform_f32(
        &mut self,
        context: &WgpuContext,
        program: &WgpuProgram,
        location: u32,
        value: f32,
    ) {
        program.uniforms.write_f32(&context.queue, location, value);
    }

    fn draw(
        &mut self,
        context: &WgpuContext,
        surface: &mut WgpuSurface,
        program: &WgpuProgram,
    ) -> Result<(), String> {
        let frame = match surface.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                surface.surface.configure(&context.device, &surface.config);
                return Err("surface lost or outdated; reconfigured".into());
            }
            Err(err) => return Err(err.to_string()),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lensbridge frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lens distortion pass"),
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
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &program.uniforms.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        context.queue.submit(Some(encoder.finish()));
        surface.frame = Some(frame);
        Ok(())
    }

    fn present(&mut self, _context: &WgpuContext, surface: &mut WgpuSurface) -> Result<(), String> {
        let frame = surface
            .frame
            .take()
            .ok_or_else(|| "no frame was drawn".to_string())?;
        frame.present();
        Ok(())
    }
}
