use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use lensbridge::mock::{MockBehavior, MockPlatform, MockProbe};
use lensbridge::{
    ApiVersion, BridgeError, BridgeOptions, BridgeState, ConfigAttributes, ConfigDescriptor,
    ContextError, ParameterPair, RenderBridge, ShaderError, ShaderStage,
};

fn bridge_with(
    behavior: MockBehavior,
    options: BridgeOptions,
) -> (RenderBridge<MockPlatform>, MockProbe) {
    let bridge = RenderBridge::new(MockPlatform::new(behavior), options);
    let gpu = bridge.platform().probe();
    (bridge, gpu)
}

fn bridge() -> (RenderBridge<MockPlatform>, MockProbe) {
    bridge_with(MockBehavior::default(), BridgeOptions::default())
}

#[test]
fn update_from_second_thread_reaches_next_frame() {
    let (mut bridge, probe) = bridge();
    bridge.initialize(0.0, 1.0).unwrap();

    let applied = bridge.frame().unwrap();
    assert_eq!(applied.pair, ParameterPair::new(0.0, 1.0));
    assert_eq!(probe.uniform_value("k1"), Some(0.0));
    assert_eq!(probe.uniform_value("k2"), Some(1.0));

    let updater = bridge.updater();
    thread::spawn(move || updater.update_params(2.5, -1.0))
        .join()
        .unwrap()
        .unwrap();

    let applied = bridge.frame().unwrap();
    assert_eq!(applied.pair, ParameterPair::new(2.5, -1.0));
    let draw = probe.last_draw().unwrap();
    assert_eq!((draw.k1, draw.k2), (Some(2.5), Some(-1.0)));
}

#[test]
fn concurrent_updates_never_reach_a_frame_torn() {
    let (mut bridge, probe) = bridge();
    bridge.initialize(0.0, 0.0).unwrap();

    let writers: Vec<_> = (0..4u32)
        .map(|writer| {
            let updater = bridge.updater();
            thread::spawn(move || {
                for step in 0..2_000u32 {
                    let k1 = (writer * 10_000 + step) as f32;
                    updater.update_params(k1, -k1 * 10.0).unwrap();
                }
            })
        })
        .collect();

    let mut last_version = 0;
    for _ in 0..500 {
        let applied = bridge.frame().unwrap();
        assert!(applied.version >= last_version);
        last_version = applied.version;
    }
    for writer in writers {
        writer.join().unwrap();
    }
    let last = bridge.frame().unwrap();
    assert_eq!(last.pair.k2, -last.pair.k1 * 10.0);

    for draw in probe.draws() {
        let (k1, k2) = (draw.k1.unwrap(), draw.k2.unwrap());
        assert_eq!(k2, -k1 * 10.0, "torn pair applied: ({k1}, {k2})");
    }
}

#[test]
fn failed_initialize_leaks_nothing_and_can_be_retried() {
    let only_565 = ConfigDescriptor {
        red_bits: 5,
        green_bits: 6,
        blue_bits: 5,
        alpha_bits: 0,
        window_surface: true,
        api: ApiVersion::new(3, 2),
    };
    let (mut bridge, probe) = bridge_with(
        MockBehavior {
            configs: vec![only_565],
            ..MockBehavior::default()
        },
        BridgeOptions::default(),
    );

    let err = bridge.initialize(0.25, 0.05).unwrap_err();
    assert!(
        matches!(err, BridgeError::Context(ContextError::NoMatchingConfig { .. })),
        "{err:?}"
    );
    assert_eq!(bridge.state(), BridgeState::Failed);
    assert_eq!(probe.live_resources().total(), 0);

    let relaxed = BridgeOptions {
        attributes: ConfigAttributes {
            red_bits: 5,
            green_bits: 6,
            blue_bits: 5,
            ..ConfigAttributes::default()
        },
        ..BridgeOptions::default()
    };
    bridge.set_options(relaxed).unwrap();
    bridge.initialize(0.25, 0.05).unwrap();
    assert_eq!(bridge.state(), BridgeState::Ready);
    assert_eq!(bridge.config_descriptor(), Some(only_565));

    let live = probe.live_resources();
    assert_eq!(
        (live.displays, live.contexts, live.surfaces, live.shaders, live.programs),
        (1, 1, 1, 2, 1)
    );
    assert_eq!(probe.double_releases(), 0);
}

#[test]
fn fragment_syntax_error_releases_the_context() {
    let options = BridgeOptions {
        fragment_source: "void main() {\n    outColor = vec4(1.0);\n}\n}\n".into(),
        ..BridgeOptions::default()
    };
    let (mut bridge, probe) = bridge_with(MockBehavior::default(), options);

    let err = bridge.initialize(0.25, 0.05).unwrap_err();
    match err {
        BridgeError::Shader(ShaderError::CompileError { stage, log }) => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert_eq!(log, "0:4: error: syntax error, unexpected '}'");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(bridge.state(), BridgeState::Failed);
    assert_eq!(probe.live_resources().total(), 0);
    assert_eq!(probe.current_thread(), None);
}

#[test]
fn every_acquisition_failure_is_retryable_from_clean_state() {
    let failing = [
        MockBehavior {
            display_available: false,
            ..MockBehavior::default()
        },
        MockBehavior {
            initialize_error: Some("no driver".into()),
            ..MockBehavior::default()
        },
        MockBehavior {
            context_error: Some("EGL_BAD_MATCH".into()),
            ..MockBehavior::default()
        },
        MockBehavior {
            surface_error: Some("EGL_BAD_NATIVE_WINDOW".into()),
            ..MockBehavior::default()
        },
        MockBehavior {
            link_error: Some("error: interface mismatch".into()),
            ..MockBehavior::default()
        },
    ];

    for behavior in failing {
        let (mut bridge, probe) = bridge_with(behavior, BridgeOptions::default());
        let err = bridge.initialize(0.1, 0.2).unwrap_err();
        assert_eq!(probe.live_resources().total(), 0, "leak after {err:?}");

        bridge.platform_mut().set_behavior(MockBehavior::default());
        bridge.initialize(0.1, 0.2).unwrap();
        assert_eq!(bridge.frame().unwrap().pair, ParameterPair::new(0.1, 0.2));
        bridge.teardown();
        assert_eq!(probe.live_resources().total(), 0);
        assert_eq!(probe.double_releases(), 0);
    }
}

#[test]
fn frame_after_teardown_is_not_initialized_and_silent() {
    let (mut bridge, probe) = bridge();
    bridge.initialize(0.1, 0.2).unwrap();
    bridge.teardown();
    let calls = probe.gpu_calls();

    let err = bridge.frame().unwrap_err();
    assert!(matches!(
        err,
        BridgeError::NotInitialized {
            state: BridgeState::Destroyed
        }
    ));
    assert_eq!(probe.gpu_calls(), calls);
}

#[test]
fn reinitialize_after_teardown_starts_fresh() {
    let (mut bridge, probe) = bridge();
    bridge.initialize(0.1, 0.2).unwrap();
    bridge.update_params(0.7, 0.8).unwrap();
    bridge.teardown();

    bridge.initialize(0.3, 0.4).unwrap();
    assert_eq!(bridge.frame().unwrap().pair, ParameterPair::new(0.3, 0.4));
    assert_eq!(probe.live_resources().programs, 1);
}

#[test]
fn frames_run_on_the_thread_that_initialized() {
    let platform = MockPlatform::new(MockBehavior::default());
    let probe = platform.probe();
    let draws = Arc::new(std::sync::Mutex::new(Vec::new()));

    let renderer = {
        let draws = Arc::clone(&draws);
        thread::spawn(move || {
            let mut bridge = RenderBridge::new(platform, BridgeOptions::default());
            bridge.initialize(0.25, 0.05).unwrap();
            let applied = bridge.frame().unwrap();
            draws.lock().unwrap().push(applied.pair);
            thread::current().id()
        })
    };
    let renderer_id = renderer.join().unwrap();

    assert_eq!(probe.last_draw().unwrap().thread, renderer_id);
    assert_eq!(
        draws.lock().unwrap().as_slice(),
        &[ParameterPair::new(0.25, 0.05)]
    );
    // Dropping the bridge on its thread released everything.
    assert_eq!(probe.live_resources().total(), 0);
}

#[test]
fn vertex_syntax_error_is_reported_for_the_vertex_stage() {
    let options = BridgeOptions {
        vertex_source: "void main() {\n    gl_Position = vec4(0.0);\n".into(),
        ..BridgeOptions::default()
    };
    let (mut bridge, gpu) = bridge_with(MockBehavior::default(), options);

    match bridge.initialize(0.25, 0.05).unwrap_err() {
        BridgeError::Shader(ShaderError::CompileError { stage, log }) => {
            assert_eq!(stage, ShaderStage::Vertex);
            assert_eq!(log, "0:2: error: syntax error, unexpected end of file");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(bridge.state(), BridgeState::Failed);
    let live = gpu.live_resources();
    assert_eq!((live.shaders, live.programs), (0, 0));
    assert_eq!(live.total(), 0);
}

#[test]
fn fragment_without_main_is_a_compile_error() {
    let options = BridgeOptions {
        fragment_source: "void shade() {\n}\n".into(),
        ..BridgeOptions::default()
    };
    let (mut bridge, gpu) = bridge_with(MockBehavior::default(), options);

    match bridge.initialize(0.25, 0.05).unwrap_err() {
        BridgeError::Shader(ShaderError::CompileError { stage, log }) => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert_eq!(log, "0:1: error: missing entry point 'main'");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(gpu.live_resources().total(), 0);
}

#[test]
fn link_log_reaches_the_caller_verbatim() {
    let log = "error: varying 'v_uv' is not written by the vertex shader";
    let (mut bridge, gpu) = bridge_with(
        MockBehavior {
            link_error: Some(log.into()),
            ..MockBehavior::default()
        },
        BridgeOptions::default(),
    );

    match bridge.initialize(0.25, 0.05).unwrap_err() {
        BridgeError::Shader(ShaderError::LinkError { log: reported }) => assert_eq!(reported, log),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(bridge.state(), BridgeState::Failed);
    assert_eq!(gpu.live_resources().total(), 0);
}

#[test]
fn no_publication_lands_after_teardown_returns() {
    let (mut bridge, _gpu) = bridge();
    bridge.initialize(0.1, 0.2).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let writer = {
        let updater = bridge.updater();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let _ = updater.update_params(9.0, 9.0);
            }
        })
    };

    let observer = bridge.updater();
    for _ in 0..200 {
        bridge.teardown();
        let settled = observer.latest();
        for _ in 0..50 {
            thread::yield_now();
        }
        assert_eq!(observer.latest(), settled, "write landed after teardown");
        bridge.initialize(0.1, 0.2).unwrap();
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[test]
fn frame_from_a_thread_without_the_context_presents_nothing() {
    let (mut bridge, gpu) = bridge();
    bridge.initialize(0.1, 0.2).unwrap();
    let presents = gpu.presents();
    let draws = gpu.draws().len();

    let result = thread::scope(|scope| scope.spawn(|| bridge.frame()).join().unwrap());
    assert!(
        matches!(result, Err(BridgeError::FrameFailed(_))),
        "{result:?}"
    );
    assert_eq!(gpu.presents(), presents);
    assert_eq!(gpu.draws().len(), draws);
    assert_eq!(bridge.state(), BridgeState::Ready);

    assert_eq!(bridge.frame().unwrap().pair, ParameterPair::new(0.1, 0.2));
}

#[test]
fn reload_swaps_sources_only_on_success() {
    let (mut bridge, gpu) = bridge();
    bridge.initialize(0.1, 0.2).unwrap();

    let fragment = "uniform float k1;\nuniform float k2;\nvoid main() {\n}\n";
    bridge
        .reload_shaders(lensbridge::VERTEX_SHADER_GLSL, fragment)
        .unwrap();
    assert_eq!(bridge.options().fragment_source, fragment);
    assert_eq!(gpu.live_resources().programs, 1);

    let err = bridge
        .reload_shaders(lensbridge::VERTEX_SHADER_GLSL, "void main() {\n")
        .unwrap_err();
    assert!(matches!(err, BridgeError::Shader(ShaderError::CompileError { .. })));
    assert_eq!(bridge.options().fragment_source, fragment);
    assert_eq!(bridge.frame().unwrap().pair, ParameterPair::new(0.1, 0.2));
}
