use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::channel::ParameterChannel;
use crate::compile::{FRAGMENT_SHADER_GLSL, VERTEX_SHADER_GLSL};
use crate::context::GraphicsContext;
use crate::error::{BridgeError, ContextError};
use crate::platform::GpuPlatform;
use crate::shader::{ShaderProgram, UniformNames};
use crate::types::{
    ApiVersion, BridgeState, ConfigAttributes, ConfigDescriptor, ParameterPair, ParameterSnapshot,
    DEFAULT_K1, DEFAULT_K2,
};

/// Everything `initialize` needs besides the initial coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOptions {
    pub attributes: ConfigAttributes,
    pub vertex_source: String,
    pub fragment_source: String,
    pub uniforms: UniformNames,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            attributes: ConfigAttributes::default(),
            vertex_source: VERTEX_SHADER_GLSL.to_string(),
            fragment_source: FRAGMENT_SHADER_GLSL.to_string(),
            uniforms: UniformNames::default(),
        }
    }
}

/// State visible to caller threads: the parameter channel and the lifecycle.
struct Shared {
    channel: ParameterChannel,
    state: AtomicU8,
}

impl Shared {
    fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Transitions under the channel lock, so no writer that saw the old
    /// state can publish after this returns.
    fn set_state(&self, state: BridgeState) {
        self.channel
            .locked(|| self.state.store(state as u8, Ordering::Release));
    }

    fn publish(&self, pair: ParameterPair) -> Result<u64, BridgeError> {
        self.channel.write_when(pair, || match self.state() {
            BridgeState::Ready => Ok(()),
            state => Err(BridgeError::NotInitialized { state }),
        })
    }
}

/// Cheap, cloneable handle caller threads use to publish new coefficients.
///
/// It never touches GPU state; it only writes into the parameter channel the
/// renderer reads once per frame.
#[derive(Clone)]
pub struct ParamUpdater {
    shared: Arc<Shared>,
}

impl ParamUpdater {
    /// Publishes `(k1, k2)` and returns its version.
    ///
    /// Outside `Ready` this reports `NotInitialized` and publishes nothing.
    pub fn update_params(&self, k1: f32, k2: f32) -> Result<u64, BridgeError> {
        self.shared.publish(ParameterPair::new(k1, k2))
    }

    pub fn state(&self) -> BridgeState {
        self.shared.state()
    }

    /// Latest published pair, as the next frame would read it.
    pub fn latest(&self) -> ParameterSnapshot {
        self.shared.channel.read_latest()
    }
}

/// Façade composing the graphics context, shader program and parameter channel.
///
/// ```text
///   host threads ──update_params──▶ ParameterChannel ◀──read_latest── frame()
///                                                                      │
///   initialize ──▶ GraphicsContext::acquire ──▶ ShaderProgram::compile  ▼
///                                                        apply_parameters ─▶ draw ─▶ present
/// ```
///
/// `initialize`, `frame`, `resize`, `reload_shaders` and `teardown` must run
/// on the renderer thread that keeps the context current. Other threads use
/// a [`ParamUpdater`] obtained from [`RenderBridge::updater`].
pub struct RenderBridge<P: GpuPlatform> {
    platform: P,
    options: BridgeOptions,
    graphics: Option<GraphicsContext<P>>,
    program: Option<ShaderProgram<P>>,
    shared: Arc<Shared>,
}

impl<P: GpuPlatform> RenderBridge<P> {
    pub fn new(platform: P, options: BridgeOptions) -> Self {
        Self {
            platform,
            options,
            graphics: None,
            program: None,
            shared: Arc::new(Shared {
                channel: ParameterChannel::new(ParameterPair::new(DEFAULT_K1, DEFAULT_K2)),
                state: AtomicU8::new(BridgeState::Uninitialized as u8),
            }),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.shared.state()
    }

    pub fn updater(&self) -> ParamUpdater {
        ParamUpdater {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Replaces the options used by the next `initialize`.
    pub fn set_options(&mut self, options: BridgeOptions) -> Result<(), BridgeError> {
        if self.state() == BridgeState::Ready {
            return Err(BridgeError::AlreadyInitialized);
        }
        self.options = options;
        Ok(())
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Configuration the context was created with, once `Ready`.
    pub fn config_descriptor(&self) -> Option<ConfigDescriptor> {
        self.graphics.as_ref().and_then(GraphicsContext::descriptor)
    }

    pub fn api_version(&self) -> Option<ApiVersion> {
        self.graphics.as_ref().and_then(GraphicsContext::api_version)
    }

    /// Acquires the context, builds the program and seeds the channel with `(k1, k2)`.
    ///
    /// On failure every partially created resource is released and the
    /// bridge is left in `Failed`; calling `initialize` again starts over.
    pub fn initialize(&mut self, k1: f32, k2: f32) -> Result<(), BridgeError> {
        if self.state() == BridgeState::Ready {
            return Err(BridgeError::AlreadyInitialized);
        }
        self.release_resources();
        self.shared.set_state(BridgeState::Initializing);
        tracing::info!(k1, k2, "initializing render bridge");

        match self.build(k1, k2) {
            Ok(version) => {
                self.shared.set_state(BridgeState::Ready);
                tracing::info!(
                    config = ?self.config_descriptor(),
                    api = ?self.api_version(),
                    version,
                    "render bridge ready"
                );
                Ok(())
            }
            Err(err) => {
                self.release_resources();
                self.shared.set_state(BridgeState::Failed);
                tracing::error!(error = %err, status = ?err.status(), "render bridge initialization failed");
                Err(err)
            }
        }
    }

    fn build(&mut self, k1: f32, k2: f32) -> Result<u64, BridgeError> {
        let graphics = self.graphics.insert(GraphicsContext::acquire(
            &mut self.platform,
            &self.options.attributes,
        )?);
        let (context, config) = graphics.handles().ok_or_else(|| {
            ContextError::ContextCreationFailed("context missing after acquisition".into())
        })?;

        let program = ShaderProgram::compile(
            &mut self.platform,
            context,
            config,
            &self.options.vertex_source,
            &self.options.fragment_source,
            &self.options.uniforms,
        )?;
        self.program = Some(program);

        Ok(self.shared.channel.seed(ParameterPair::new(k1, k2)))
    }

    /// Publishes new coefficients from the renderer thread's side.
    pub fn update_params(&self, k1: f32, k2: f32) -> Result<u64, BridgeError> {
        self.updater().update_params(k1, k2)
    }

    /// Applies the latest coefficients, draws, and presents.
    ///
    /// This is the only place uniform state is written. Outside `Ready` it
    /// reports `NotInitialized` without issuing any GPU call; on a thread the
    /// context is not current on it reports `FrameFailed` before drawing.
    pub fn frame(&mut self) -> Result<ParameterSnapshot, BridgeError> {
        let state = self.state();
        if state != BridgeState::Ready {
            return Err(BridgeError::NotInitialized { state });
        }
        let (Some(graphics), Some(program)) = (self.graphics.as_mut(), self.program.as_mut())
        else {
            return Err(BridgeError::NotInitialized { state });
        };
        let Some((context, surface)) = graphics.render_target() else {
            return Err(BridgeError::NotInitialized { state });
        };

        if !self.platform.is_current() {
            return Err(BridgeError::FrameFailed(
                "context is not current on the calling thread".into(),
            ));
        }

        let snapshot = self.shared.channel.read_latest();
        program.apply_parameters(&mut self.platform, context, snapshot.pair);
        let Some(linked) = program.program() else {
            return Err(BridgeError::NotInitialized { state });
        };
        self.platform
            .draw(context, surface, linked)
            .map_err(BridgeError::FrameFailed)?;
        self.platform
            .present(context, surface)
            .map_err(BridgeError::FrameFailed)?;

        tracing::trace!(
            version = snapshot.version,
            k1 = snapshot.pair.k1,
            k2 = snapshot.pair.k2,
            "frame presented"
        );
        Ok(snapshot)
    }

    /// Reconfigures the surface after the host window changed size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), BridgeError> {
        let state = self.state();
        if state != BridgeState::Ready {
            return Err(BridgeError::NotInitialized { state });
        }
        if width == 0 || height == 0 {
            return Ok(());
        }
        if let Some((context, surface)) = self.graphics.as_mut().and_then(|g| g.render_target()) {
            self.platform.resize_surface(context, surface, width, height);
            tracing::debug!(width, height, "surface resized");
        }
        Ok(())
    }

    /// Swaps in a program built from new sources.
    ///
    /// The running program keeps rendering if the new one fails to build.
    pub fn reload_shaders(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<(), BridgeError> {
        let state = self.state();
        if state != BridgeState::Ready {
            return Err(BridgeError::NotInitialized { state });
        }
        let Some((context, config)) = self.graphics.as_ref().and_then(GraphicsContext::handles)
        else {
            return Err(BridgeError::NotInitialized { state });
        };

        let replacement = match ShaderProgram::compile(
            &mut self.platform,
            context,
            config,
            vertex_source,
            fragment_source,
            &self.options.uniforms,
        ) {
            Ok(program) => program,
            Err(err) => {
                tracing::error!(error = %err, "shader reload failed; keeping current program");
                return Err(err.into());
            }
        };

        if let Some(mut previous) = self.program.replace(replacement) {
            previous.release(&mut self.platform, context);
        }
        self.options.vertex_source = vertex_source.to_string();
        self.options.fragment_source = fragment_source.to_string();
        tracing::info!("shader program reloaded");
        Ok(())
    }

    /// Releases the program and the context and moves to `Destroyed`.
    ///
    /// A second call does nothing.
    pub fn teardown(&mut self) {
        if self.state() == BridgeState::Destroyed {
            return;
        }
        self.release_resources();
        self.shared.set_state(BridgeState::Destroyed);
        tracing::info!("render bridge torn down");
    }

    fn release_resources(&mut self) {
        if let Some(mut program) = self.program.take() {
            if let Some(context) = self.graphics.as_ref().and_then(GraphicsContext::context) {
                program.release(&mut self.platform, context);
            }
        }
        if let Some(mut graphics) = self.graphics.take() {
            graphics.release(&mut self.platform);
        }
    }
}

impl<P: GpuPlatform> Drop for RenderBridge<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockPlatform};

    fn bridge(behavior: MockBehavior) -> (RenderBridge<MockPlatform>, crate::mock::MockProbe) {
        let platform = MockPlatform::new(behavior);
        let probe = platform.probe();
        (RenderBridge::new(platform, BridgeOptions::default()), probe)
    }

    #[test]
    fn initialize_moves_to_ready_and_frame_applies_seed() {
        let (mut bridge, probe) = bridge(MockBehavior::default());
        assert_eq!(bridge.state(), BridgeState::Uninitialized);
        bridge.initialize(0.0, 1.0).unwrap();
        assert_eq!(bridge.state(), BridgeState::Ready);

        let applied = bridge.frame().unwrap();
        assert_eq!(applied.pair, ParameterPair::new(0.0, 1.0));
        let draw = probe.last_draw().unwrap();
        assert_eq!((draw.k1, draw.k2), (Some(0.0), Some(1.0)));
        assert_eq!(probe.presents(), 1);
    }

    #[test]
    fn frame_before_initialize_makes_no_gpu_calls() {
        let (mut bridge, probe) = bridge(MockBehavior::default());
        let err = bridge.frame().unwrap_err();
        assert!(err.is_not_initialized());
        assert_eq!(probe.gpu_calls(), 0);
    }

    #[test]
    fn update_before_ready_reports_not_initialized() {
        let (mut bridge, _probe) = bridge(MockBehavior::default());
        let err = bridge.update_params(1.0, 2.0).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::NotInitialized {
                state: BridgeState::Uninitialized
            }
        ));

        bridge.initialize(0.1, 0.2).unwrap();
        bridge.teardown();
        let err = bridge.update_params(1.0, 2.0).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::NotInitialized {
                state: BridgeState::Destroyed
            }
        ));
    }

    #[test]
    fn second_initialize_is_rejected_while_ready() {
        let (mut bridge, probe) = bridge(MockBehavior::default());
        bridge.initialize(0.1, 0.2).unwrap();
        let live = probe.live_resources();
        let err = bridge.initialize(0.3, 0.4).unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyInitialized));
        assert_eq!(probe.live_resources(), live);
        assert_eq!(bridge.frame().unwrap().pair, ParameterPair::new(0.1, 0.2));
    }

    #[test]
    fn teardown_twice_releases_once() {
        let (mut bridge, probe) = bridge(MockBehavior::default());
        bridge.initialize(0.1, 0.2).unwrap();
        bridge.teardown();
        let calls = probe.gpu_calls();
        bridge.teardown();
        assert_eq!(bridge.state(), BridgeState::Destroyed);
        assert_eq!(probe.gpu_calls(), calls);
        assert_eq!(probe.double_releases(), 0);
        assert_eq!(probe.live_resources().total(), 0);
    }

    #[test]
    fn drop_releases_everything() {
        let (mut bridge, probe) = bridge(MockBehavior::default());
        bridge.initialize(0.1, 0.2).unwrap();
        drop(bridge);
        assert_eq!(probe.live_resources().total(), 0);
        assert_eq!(probe.double_releases(), 0);
    }

    #[test]
    fn frame_failure_keeps_bridge_ready() {
        let (mut bridge, _probe) = bridge(MockBehavior::default());
        bridge.initialize(0.1, 0.2).unwrap();
        bridge.platform_mut().set_behavior(MockBehavior {
            draw_error: Some("surface lost".into()),
            ..MockBehavior::default()
        });
        let err = bridge.frame().unwrap_err();
        assert!(matches!(&err, BridgeError::FrameFailed(log) if log == "surface lost"));
        assert_eq!(bridge.state(), BridgeState::Ready);

        bridge.platform_mut().set_behavior(MockBehavior::default());
        assert!(bridge.frame().is_ok());
    }

    #[test]
    fn resize_reaches_the_surface_and_ignores_zero() {
        let (mut bridge, probe) = bridge(MockBehavior::default());
        assert!(bridge.resize(640, 480).unwrap_err().is_not_initialized());
        bridge.initialize(0.1, 0.2).unwrap();
        bridge.resize(0, 480).unwrap();
        bridge.resize(640, 480).unwrap();
        assert_eq!(probe.resizes(), vec![(640, 480)]);
    }

    #[test]
    fn reload_keeps_old_program_on_failure() {
        let (mut bridge, probe) = bridge(MockBehavior::default());
        bridge.initialize(0.5, 0.25).unwrap();
        let err = bridge
            .reload_shaders(VERTEX_SHADER_GLSL, "void main() {")
            .unwrap_err();
        assert!(matches!(err, BridgeError::Shader(_)));
        assert_eq!(bridge.frame().unwrap().pair, ParameterPair::new(0.5, 0.25));

        bridge
            .reload_shaders(VERTEX_SHADER_GLSL, "uniform float k2;\nvoid main() {\n}\n")
            .unwrap();
        let live = probe.live_resources();
        assert_eq!((live.programs, live.shaders), (1, 2));
        bridge.update_params(9.0, 8.0).unwrap();
        bridge.frame().unwrap();
        assert_eq!(probe.uniform_value("k2"), Some(8.0));
    }

    #[test]
    fn set_options_is_rejected_while_ready() {
        let (mut bridge, _probe) = bridge(MockBehavior::default());
        bridge.initialize(0.1, 0.2).unwrap();
        let err = bridge.set_options(BridgeOptions::default()).unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyInitialized));
    }
}
