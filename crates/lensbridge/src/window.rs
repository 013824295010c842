use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use tracing::{error, info};

use crate::bridge::{BridgeOptions, ParamUpdater, RenderBridge};
use crate::gpu::{WgpuPlatform, DEFAULT_ACQUIRE_TIMEOUT};
use crate::runtime::{FrameScheduler, DEFAULT_MAX_FPS};
use crate::types::{DEFAULT_K1, DEFAULT_K2};

/// Everything the preview thread needs to open its window and bridge.
#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub title: String,
    pub size: (u32, u32),
    pub k1: f32,
    pub k2: f32,
    pub max_fps: u32,
    pub acquire_timeout: Duration,
    pub bridge: BridgeOptions,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            title: "Lens Distortion Preview".into(),
            size: (1280, 720),
            k1: DEFAULT_K1,
            k2: DEFAULT_K2,
            max_fps: DEFAULT_MAX_FPS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            bridge: BridgeOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
enum PreviewCommand {
    Reload { vertex: String, fragment: String },
    Shutdown,
}

type Ready = Result<(EventLoopProxy<PreviewCommand>, ParamUpdater)>;

/// Sends replacement shader sources to a running preview from any thread.
#[derive(Clone)]
pub struct ShaderReloader {
    proxy: EventLoopProxy<PreviewCommand>,
}

impl ShaderReloader {
    /// Asks the renderer to rebuild its program; compile failures are logged there
    /// and the previous program keeps drawing.
    pub fn reload(&self, vertex: String, fragment: String) -> Result<()> {
        self.proxy
            .send_event(PreviewCommand::Reload { vertex, fragment })
            .map_err(|_| anyhow!("preview window has closed"))
    }
}

/// Winit window rendering the distortion on its own thread.
pub struct PreviewWindow {
    proxy: EventLoopProxy<PreviewCommand>,
    updater: ParamUpdater,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl PreviewWindow {
    /// Opens the window and returns once the bridge is `Ready` or has failed.
    pub fn spawn(options: PreviewOptions) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("lensbridge-window".into())
            .spawn(move || run_window_thread(options, ready_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let (proxy, updater) = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            updater,
            join_handle: Some(handle),
        })
    }

    pub fn updater(&self) -> ParamUpdater {
        self.updater.clone()
    }

    pub fn reloader(&self) -> ShaderReloader {
        ShaderReloader {
            proxy: self.proxy.clone(),
        }
    }

    /// Blocks until the user closes the window.
    pub fn wait(mut self) -> Result<()> {
        self.join()
    }

    pub fn shutdown(mut self) -> Result<()> {
        let _ = self.proxy.send_event(PreviewCommand::Shutdown);
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(PreviewCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(options: PreviewOptions, ready_tx: Sender<Ready>) -> Result<()> {
    let mut builder = EventLoopBuilder::<PreviewCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => return fail(&ready_tx, anyhow!("failed to create event loop: {err}")),
    };
    let proxy = event_loop.create_proxy();

    let window = match WindowBuilder::new()
        .with_title(options.title.as_str())
        .with_inner_size(PhysicalSize::new(options.size.0, options.size.1))
        .build(&event_loop)
    {
        Ok(window) => Arc::new(window),
        Err(err) => return fail(&ready_tx, anyhow!("failed to create preview window: {err}")),
    };

    let platform =
        WgpuPlatform::new(Arc::clone(&window)).with_acquire_timeout(options.acquire_timeout);
    let mut bridge = RenderBridge::new(platform, options.bridge.clone());
    if let Err(err) = bridge.initialize(options.k1, options.k2) {
        return fail(&ready_tx, anyhow!("failed to initialise preview renderer: {err}"));
    }
    info!(
        config = ?bridge.config_descriptor(),
        api = ?bridge.api_version(),
        "preview window ready"
    );

    let mut scheduler = FrameScheduler::new(options.max_fps);
    window.request_redraw();
    let _ = ready_tx.send(Ok((proxy, bridge.updater())));

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(PreviewCommand::Reload { vertex, fragment }) => {
            if let Err(err) = bridge.reload_shaders(&vertex, &fragment) {
                error!("failed to reload preview shaders: {err}");
            }
            window.request_redraw();
        }
        Event::UserEvent(PreviewCommand::Shutdown) => elwt.exit(),
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                let escape = event.state == ElementState::Pressed
                    && matches!(event.logical_key, Key::Named(NamedKey::Escape));
                if escape {
                    elwt.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Err(err) = bridge.resize(size.width, size.height) {
                    error!("failed to resize preview surface: {err}");
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = bridge.frame() {
                    tracing::warn!(error = %err, "preview frame failed; retrying next frame");
                }
                scheduler.mark_rendered();
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if scheduler.ready_for_frame(now) {
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else if let Some(deadline) = scheduler.next_deadline() {
                elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
        }
        Event::LoopExiting => bridge.teardown(),
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

fn fail(ready_tx: &Sender<Ready>, err: anyhow::Error) -> Result<()> {
    let message = err.to_string();
    let _ = ready_tx.send(Err(anyhow!(message)));
    Err(err)
}
