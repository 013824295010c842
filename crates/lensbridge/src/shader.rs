use std::collections::HashMap;

use crate::error::ShaderError;
use crate::platform::GpuPlatform;
use crate::types::{ParameterPair, ShaderStage, K1_UNIFORM, K2_UNIFORM};

/// Names of the two scalar uniforms the program is fed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformNames {
    pub k1: String,
    pub k2: String,
}

impl Default for UniformNames {
    fn default() -> Self {
        Self {
            k1: K1_UNIFORM.to_string(),
            k2: K2_UNIFORM.to_string(),
        }
    }
}

/// Compiled vertex/fragment stages, the linked program, and its uniform cache.
///
/// Locations are looked up once right after linking; a name the program does
/// not use is cached as `None` and writes to it are skipped.
pub struct ShaderProgram<P: GpuPlatform> {
    vertex: Option<P::Shader>,
    fragment: Option<P::Shader>,
    program: Option<P::Program>,
    names: UniformNames,
    locations: HashMap<String, Option<P::Location>>,
    bound: bool,
}

impl<P: GpuPlatform> ShaderProgram<P> {
    /// Compiles both stages, links them, and resolves the parameter uniforms.
    ///
    /// Every object created before a failure is deleted before the error is returned.
    pub fn compile(
        platform: &mut P,
        context: &P::Context,
        config: &P::Config,
        vertex_source: &str,
        fragment_source: &str,
        names: &UniformNames,
    ) -> Result<Self, ShaderError> {
        let vertex = compile_stage(platform, context, ShaderStage::Vertex, vertex_source)?;
        let fragment =
            match compile_stage(platform, context, ShaderStage::Fragment, fragment_source) {
                Ok(fragment) => fragment,
                Err(err) => {
                    platform.delete_shader(context, vertex);
                    return Err(err);
                }
            };

        let program = match platform.link_program(context, config, &vertex, &fragment) {
            Ok(program) => program,
            Err(log) => {
                tracing::error!(log = %log, "shader program failed to link");
                platform.delete_shader(context, vertex);
                platform.delete_shader(context, fragment);
                return Err(ShaderError::LinkError { log });
            }
        };

        let mut locations = HashMap::with_capacity(2);
        for name in [&names.k1, &names.k2] {
            let location = platform.uniform_location(context, &program, name);
            if location.is_none() {
                tracing::debug!(uniform = %name, "program does not use uniform; writes will be skipped");
            }
            locations.insert(name.clone(), location);
        }

        tracing::debug!(?locations, "shader program linked");
        Ok(Self {
            vertex: Some(vertex),
            fragment: Some(fragment),
            program: Some(program),
            names: names.clone(),
            locations,
            bound: false,
        })
    }

    /// Cached location for `name`; `None` when the program ignores it or it was never resolved.
    pub fn location(&self, name: &str) -> Option<P::Location> {
        self.locations.get(name).copied().flatten()
    }

    pub fn program(&self) -> Option<&P::Program> {
        self.program.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.program.is_some()
    }

    /// Binds the program if needed and writes both coefficients.
    ///
    /// A context must be current on the calling thread. Without one this
    /// panics in debug builds and does nothing in release builds.
    pub fn apply_parameters(&mut self, platform: &mut P, context: &P::Context, pair: ParameterPair) {
        let current = platform.is_current();
        debug_assert!(current, "apply_parameters called without a current context");
        if !current {
            return;
        }
        let Some(program) = self.program.as_ref() else {
            return;
        };
        if !self.bound {
            platform.use_program(context, program);
            self.bound = true;
        }
        let k1 = self.locations.get(&self.names.k1).copied().flatten();
        let k2 = self.locations.get(&self.names.k2).copied().flatten();
        if let Some(location) = k1 {
            platform.set_uniform_f32(context, program, location, pair.k1);
        }
        if let Some(location) = k2 {
            platform.set_uniform_f32(context, program, location, pair.k2);
        }
    }

    /// Deletes the program and both stages. Safe to call more than once.
    pub fn release(&mut self, platform: &mut P, context: &P::Context) {
        let mut released = false;
        if let Some(program) = self.program.take() {
            platform.delete_program(context, program);
            released = true;
        }
        if let Some(vertex) = self.vertex.take() {
            platform.delete_shader(context, vertex);
        }
        if let Some(fragment) = self.fragment.take() {
            platform.delete_shader(context, fragment);
        }
        self.locations.clear();
        self.bound = false;
        if released {
            tracing::debug!("shader program released");
        }
    }
}

fn compile_stage<P: GpuPlatform>(
    platform: &mut P,
    context: &P::Context,
    stage: ShaderStage,
    source: &str,
) -> Result<P::Shader, ShaderError> {
    platform
        .compile_shader(context, stage, source)
        .map_err(|log| {
            tracing::error!(%stage, log = %log, "shader stage failed to compile");
            ShaderError::CompileError { stage, log }
        })
}
