//! Deterministic in-memory platform for tests and headless demos.
//!
//! `MockPlatform` behaves like a small GL/EGL stack: it hands out integer
//! handles, tracks which of them are still alive, remembers which thread owns
//! the current context, and records the uniform values each draw observed.
//! Every acquisition stage can be told to fail. A [`MockProbe`] shares the
//! recorded state so tests can inspect it after the platform has been moved
//! into a bridge or onto a renderer thread.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::platform::GpuPlatform;
use crate::types::{ApiVersion, ConfigAttributes, ConfigDescriptor, ShaderStage};

/// Knobs controlling how the mock responds.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub display_available: bool,
    pub initialize_error: Option<String>,
    /// API version reported by display initialization.
    pub api: ApiVersion,
    /// Configurations offered to `choose_config`, in preference order.
    pub configs: Vec<ConfigDescriptor>,
    pub context_error: Option<String>,
    pub surface_error: Option<String>,
    pub link_error: Option<String>,
    pub draw_error: Option<String>,
    pub surface_size: (u32, u32),
}

impl Default for MockBehavior {
    fn default() -> Self {
        let api = ApiVersion::new(3, 2);
        Self {
            display_available: true,
            initialize_error: None,
            api,
            configs: vec![
                ConfigDescriptor {
                    red_bits: 5,
                    green_bits: 6,
                    blue_bits: 5,
                    alpha_bits: 0,
                    window_surface: true,
                    api,
                },
                ConfigDescriptor {
                    red_bits: 8,
                    green_bits: 8,
                    blue_bits: 8,
                    alpha_bits: 8,
                    window_surface: true,
                    api,
                },
            ],
            context_error: None,
            surface_error: None,
            link_error: None,
            draw_error: None,
            surface_size: (1280, 720),
        }
    }
}

/// Counts of handles that have been created and not yet destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveResources {
    pub displays: usize,
    pub contexts: usize,
    pub surfaces: usize,
    pub shaders: usize,
    pub programs: usize,
}

impl LiveResources {
    pub fn total(&self) -> usize {
        self.displays + self.contexts + self.surfaces + self.shaders + self.programs
    }
}

/// Uniform values in effect when a draw was issued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    pub k1: Option<f32>,
    pub k2: Option<f32>,
    pub thread: ThreadId,
}

#[derive(Debug, Default)]
struct Handles {
    displays: HashSet<u32>,
    contexts: HashSet<u32>,
    surfaces: HashSet<u32>,
    shaders: HashSet<u32>,
    programs: HashSet<u32>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u32,
    handles: Handles,
    double_releases: usize,
    gpu_calls: usize,
    current_thread: Option<ThreadId>,
    bound_program: Option<u32>,
    use_program_calls: usize,
    unbound_uniform_writes: usize,
    uniform_values: HashMap<String, f32>,
    draws: Vec<DrawRecord>,
    presents: usize,
    resizes: Vec<(u32, u32)>,
}

impl MockState {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

fn release(set: &mut HashSet<u32>, id: u32, double_releases: &mut usize) {
    if !set.remove(&id) {
        *double_releases += 1;
    }
}

pub struct MockDisplay {
    id: u32,
    initialized: bool,
}

pub struct MockConfig {
    descriptor: ConfigDescriptor,
}

pub struct MockContext {
    id: u32,
}

pub struct MockSurface {
    id: u32,
    pub width: u32,
    pub height: u32,
}

pub struct MockShader {
    id: u32,
    stage: ShaderStage,
    uniforms: Vec<String>,
}

pub struct MockProgram {
    id: u32,
    uniforms: Vec<String>,
}

pub struct MockPlatform {
    behavior: MockBehavior,
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
        }
    }

    /// Replaces the behavior used by subsequent calls.
    pub fn set_behavior(&mut self, behavior: MockBehavior) {
        self.behavior = behavior;
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    fn record_call(&self) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.gpu_calls += 1;
        state
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Read-only view onto a [`MockPlatform`]'s recorded state.
#[derive(Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    pub fn live_resources(&self) -> LiveResources {
        let state = lock(&self.state);
        LiveResources {
            displays: state.handles.displays.len(),
            contexts: state.handles.contexts.len(),
            surfaces: state.handles.surfaces.len(),
            shaders: state.handles.shaders.len(),
            programs: state.handles.programs.len(),
        }
    }

    /// Destroy calls that targeted a handle which was not alive.
    pub fn double_releases(&self) -> usize {
        lock(&self.state).double_releases
    }

    pub fn gpu_calls(&self) -> usize {
        lock(&self.state).gpu_calls
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        lock(&self.state).current_thread
    }

    pub fn use_program_calls(&self) -> usize {
        lock(&self.state).use_program_calls
    }

    /// Uniform writes issued while the target program was not bound.
    pub fn unbound_uniform_writes(&self) -> usize {
        lock(&self.state).unbound_uniform_writes
    }

    pub fn uniform_value(&self, name: &str) -> Option<f32> {
        lock(&self.state).uniform_values.get(name).copied()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        lock(&self.state).draws.clone()
    }

    pub fn last_draw(&self) -> Option<DrawRecord> {
        lock(&self.state).draws.last().copied()
    }

    pub fn presents(&self) -> usize {
        lock(&self.state).presents
    }

    pub fn resizes(&self) -> Vec<(u32, u32)> {
        lock(&self.state).resizes.clone()
    }
}

impl GpuPlatform for MockPlatform {
    type Display = MockDisplay;
    type Config = MockConfig;
    type Context = MockContext;
    type Surface = MockSurface;
    type Shader = MockShader;
    type Program = MockProgram;
    type Location = i32;

    fn get_display(&mut self) -> Option<MockDisplay> {
        let mut state = self.record_call();
        if !self.behavior.display_available {
            return None;
        }
        let id = state.allocate();
        state.handles.displays.insert(id);
        Some(MockDisplay {
            id,
            initialized: false,
        })
    }

    fn initialize_display(&mut self, display: &mut MockDisplay) -> Result<ApiVersion, String> {
        let _state = self.record_call();
        if let Some(err) = &self.behavior.initialize_error {
            return Err(err.clone());
        }
        display.initialized = true;
        Ok(self.behavior.api)
    }

    fn choose_config(
        &mut self,
        display: &MockDisplay,
        attributes: &ConfigAttributes,
    ) -> Option<(MockConfig, ConfigDescriptor)> {
        let _state = self.record_call();
        if !display.initialized {
            return None;
        }
        self.behavior
            .configs
            .iter()
            .find(|candidate| attributes.accepts(candidate))
            .map(|descriptor| {
                (
                    MockConfig {
                        descriptor: *descriptor,
                    },
                    *descriptor,
                )
            })
    }

    fn create_context(
        &mut self,
        _display: &MockDisplay,
        config: &MockConfig,
    ) -> Result<MockContext, String> {
        let mut state = self.record_call();
        if let Some(err) = &self.behavior.context_error {
            return Err(err.clone());
        }
        if config.descriptor.api > self.behavior.api {
            return Err(format!(
                "requested API {} exceeds driver API {}",
                config.descriptor.api, self.behavior.api
            ));
        }
        let id = state.allocate();
        state.handles.contexts.insert(id);
        Ok(MockContext { id })
    }

    fn create_surface(
        &mut self,
        _display: &mut MockDisplay,
        config: &MockConfig,
        _context: &MockContext,
    ) -> Result<MockSurface, String> {
        let mut state = self.record_call();
        if let Some(err) = &self.behavior.surface_error {
            return Err(err.clone());
        }
        if !config.descriptor.window_surface {
            return Err("configuration cannot back a window surface".into());
        }
        let id = state.allocate();
        state.handles.surfaces.insert(id);
        let (width, height) = self.behavior.surface_size;
        Ok(MockSurface { id, width, height })
    }

    fn make_current(
        &mut self,
        _display: &MockDisplay,
        surface: &MockSurface,
        context: &MockContext,
    ) -> Result<(), String> {
        let mut state = self.record_call();
        if !state.handles.contexts.contains(&context.id)
            || !state.handles.surfaces.contains(&surface.id)
        {
            return Err("EGL_BAD_ACCESS".into());
        }
        let me = thread::current().id();
        match state.current_thread {
            Some(owner) if owner != me => {
                Err("context is already current on another thread".into())
            }
            _ => {
                state.current_thread = Some(me);
                Ok(())
            }
        }
    }

    fn release_current(&mut self, _display: &MockDisplay) {
        let mut state = self.record_call();
        state.current_thread = None;
        state.bound_program = None;
    }

    fn is_current(&self) -> bool {
        self.state().current_thread == Some(thread::current().id())
    }

    fn resize_surface(
        &mut self,
        _context: &MockContext,
        surface: &mut MockSurface,
        width: u32,
        height: u32,
    ) {
        let mut state = self.record_call();
        surface.width = width;
        surface.height = height;
        state.resizes.push((width, height));
    }

    fn destroy_surface(&mut self, _display: &MockDisplay, surface: MockSurface) {
        let mut state = self.record_call();
        let MockState {
            handles,
            double_releases,
            ..
        } = &mut *state;
        release(&mut handles.surfaces, surface.id, double_releases);
    }

    fn destroy_context(&mut self, _display: &MockDisplay, context: MockContext) {
        let mut state = self.record_call();
        let MockState {
            handles,
            double_releases,
            ..
        } = &mut *state;
        release(&mut handles.contexts, context.id, double_releases);
    }

    fn terminate_display(&mut self, display: MockDisplay) {
        let mut state = self.record_call();
        let MockState {
            handles,
            double_releases,
            ..
        } = &mut *state;
        release(&mut handles.displays, display.id, double_releases);
    }

    fn compile_shader(
        &mut self,
        _context: &MockContext,
        stage: ShaderStage,
        source: &str,
    ) -> Result<MockShader, String> {
        let mut state = self.record_call();
        check_source(source)?;
        let id = state.allocate();
        state.handles.shaders.insert(id);
        Ok(MockShader {
            id,
            stage,
            uniforms: scan_float_uniforms(source),
        })
    }

    fn delete_shader(&mut self, _context: &MockContext, shader: MockShader) {
        let mut state = self.record_call();
        let MockState {
            handles,
            double_releases,
            ..
        } = &mut *state;
        release(&mut handles.shaders, shader.id, double_releases);
    }

    fn link_program(
        &mut self,
        _context: &MockContext,
        _config: &MockConfig,
        vertex: &MockShader,
        fragment: &MockShader,
    ) -> Result<MockProgram, String> {
        let mut state = self.record_call();
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err("error: program stages attached in the wrong slots".into());
        }
        if let Some(err) = &self.behavior.link_error {
            return Err(err.clone());
        }
        let mut uniforms = vertex.uniforms.clone();
        for name in &fragment.uniforms {
            if !uniforms.contains(name) {
                uniforms.push(name.clone());
            }
        }
        let id = state.allocate();
        state.handles.programs.insert(id);
        Ok(MockProgram { id, uniforms })
    }

    fn delete_program(&mut self, _context: &MockContext, program: MockProgram) {
        let mut state = self.record_call();
        if state.bound_program == Some(program.id) {
            state.bound_program = None;
        }
        let MockState {
            handles,
            double_releases,
            ..
        } = &mut *state;
        release(&mut handles.programs, program.id, double_releases);
    }

    fn uniform_location(
        &mut self,
        _context: &MockContext,
        program: &MockProgram,
        name: &str,
    ) -> Option<i32> {
        let _state = self.record_call();
        program
            .uniforms
            .iter()
            .position(|uniform| uniform == name)
            .and_then(|index| i32::try_from(index).ok())
    }

    fn use_program(&mut self, _context: &MockContext, program: &MockProgram) {
        let mut state = self.record_call();
        state.bound_program = Some(program.id);
        state.use_program_calls += 1;
    }

    fn set_uniform_f32(
        &mut self,
        _context: &MockContext,
        program: &MockProgram,
        location: i32,
        value: f32,
    ) {
        let mut state = self.record_call();
        if state.bound_program != Some(program.id) {
            state.unbound_uniform_writes += 1;
            return;
        }
        let name = usize::try_from(location)
            .ok()
            .and_then(|index| program.uniforms.get(index));
        if let Some(name) = name {
            state.uniform_values.insert(name.clone(), value);
        }
    }

    fn draw(
        &mut self,
        _context: &MockContext,
        _surface: &mut MockSurface,
        _program: &MockProgram,
    ) -> Result<(), String> {
        let mut state = self.record_call();
        if let Some(err) = &self.behavior.draw_error {
            return Err(err.clone());
        }
        let record = DrawRecord {
            k1: state.uniform_values.get("k1").copied(),
            k2: state.uniform_values.get("k2").copied(),
            thread: thread::current().id(),
        };
        state.draws.push(record);
        Ok(())
    }

    fn present(&mut self, _context: &MockContext, _surface: &mut MockSurface) -> Result<(), String> {
        let mut state = self.record_call();
        state.presents += 1;
        Ok(())
    }
}

/// Rejects sources a real compiler would trip over in the most common ways.
fn check_source(source: &str) -> Result<(), String> {
    let mut depth: i64 = 0;
    let mut last_line = 1;
    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        last_line = line_no;
        if let Some(message) = line.trim_start().strip_prefix("#error") {
            return Err(format!("0:{line_no}: error: #error{message}"));
        }
        for ch in line.chars() {
            match ch {
                '{' | '(' => depth += 1,
                '}' | ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(format!("0:{line_no}: error: syntax error, unexpected '{ch}'"));
                    }
                }
                _ => {}
            }
        }
    }
    if depth != 0 {
        return Err(format!(
            "0:{last_line}: error: syntax error, unexpected end of file"
        ));
    }
    if !source.contains("main") {
        return Err("0:1: error: missing entry point 'main'".into());
    }
    Ok(())
}

/// Collects `float <name>;` declarations, standalone or inside a uniform block.
fn scan_float_uniforms(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim();
        let declaration = trimmed.strip_prefix("uniform ").unwrap_or(trimmed).trim();
        let Some(rest) = declaration.strip_prefix("float ") else {
            continue;
        };
        let Some(name) = rest.trim().strip_suffix(';') else {
            continue;
        };
        let name = name.trim();
        let is_identifier = !name.is_empty()
            && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if is_identifier && !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}
