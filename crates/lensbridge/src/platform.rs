//! The seam between the lifecycle core and a concrete GPU API.
//!
//! `GpuPlatform` exposes the primitive calls the core sequences: display
//! connection, configuration choice, context/surface creation, current-context
//! binding, shader objects, uniforms, and presentation. Handles are associated
//! types so each backend owns its own resource representation; the core only
//! moves them around and guarantees each is destroyed exactly once.
//!
//! Implementations are explicit values handed to [`RenderBridge`](crate::RenderBridge),
//! never process-wide singletons, so several independent instances (for
//! example a mock per test) can coexist.

use std::fmt;

use crate::types::{ApiVersion, ConfigAttributes, ConfigDescriptor, ShaderStage};

pub trait GpuPlatform {
    type Display;
    type Config;
    type Context;
    type Surface;
    type Shader;
    type Program;
    type Location: Copy + fmt::Debug;

    /// Opens the display connection, or `None` when none can be obtained.
    fn get_display(&mut self) -> Option<Self::Display>;

    /// Brings up the graphics layer on `display` and reports the API version it offers.
    fn initialize_display(&mut self, display: &mut Self::Display) -> Result<ApiVersion, String>;

    /// Picks a configuration satisfying `attributes`, or `None` when nothing matches.
    fn choose_config(
        &mut self,
        display: &Self::Display,
        attributes: &ConfigAttributes,
    ) -> Option<(Self::Config, ConfigDescriptor)>;

    fn create_context(
        &mut self,
        display: &Self::Display,
        config: &Self::Config,
    ) -> Result<Self::Context, String>;

    /// Creates the window surface backing `context`.
    fn create_surface(
        &mut self,
        display: &mut Self::Display,
        config: &Self::Config,
        context: &Self::Context,
    ) -> Result<Self::Surface, String>;

    /// Binds `context` and `surface` to the calling thread.
    fn make_current(
        &mut self,
        display: &Self::Display,
        surface: &Self::Surface,
        context: &Self::Context,
    ) -> Result<(), String>;

    /// Unbinds whatever context is current on the calling thread.
    fn release_current(&mut self, display: &Self::Display);

    /// Whether a context from this platform is current on the calling thread.
    fn is_current(&self) -> bool;

    fn resize_surface(
        &mut self,
        context: &Self::Context,
        surface: &mut Self::Surface,
        width: u32,
        height: u32,
    );

    fn destroy_surface(&mut self, display: &Self::Display, surface: Self::Surface);
    fn destroy_context(&mut self, display: &Self::Display, context: Self::Context);
    fn terminate_display(&mut self, display: Self::Display);

    /// Compiles one stage; on failure returns the platform diagnostic log.
    fn compile_shader(
        &mut self,
        context: &Self::Context,
        stage: ShaderStage,
        source: &str,
    ) -> Result<Self::Shader, String>;

    fn delete_shader(&mut self, context: &Self::Context, shader: Self::Shader);

    /// Links two compiled stages; on failure returns the link log.
    fn link_program(
        &mut self,
        context: &Self::Context,
        config: &Self::Config,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, String>;

    fn delete_program(&mut self, context: &Self::Context, program: Self::Program);

    /// Resolves a scalar uniform by name; `None` when the program does not use it.
    fn uniform_location(
        &mut self,
        context: &Self::Context,
        program: &Self::Program,
        name: &str,
    ) -> Option<Self::Location>;

    fn use_program(&mut self, context: &Self::Context, program: &Self::Program);

    fn set_uniform_f32(
        &mut self,
        context: &Self::Context,
        program: &Self::Program,
        location: Self::Location,
        value: f32,
    );

    /// Records the draw of the bound program into the surface's next frame.
    fn draw(
        &mut self,
        context: &Self::Context,
        surface: &mut Self::Surface,
        program: &Self::Program,
    ) -> Result<(), String>;

    fn present(&mut self, context: &Self::Context, surface: &mut Self::Surface)
        -> Result<(), String>;
}
