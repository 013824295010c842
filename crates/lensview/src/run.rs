use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use lensbridge::compile::wrap_fragment;
use lensbridge::{
    BridgeOptions, ParamUpdater, ParameterPair, PreviewOptions, PreviewWindow, ShaderReloader,
    ShaderStage, FRAGMENT_SHADER_GLSL, VERTEX_SHADER_GLSL,
};
use lensconfig::LensConfig;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::AppPaths;

const SWEEP_PERIOD: Duration = Duration::from_millis(16);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let options = preview_options(&config)?;
    let base = config.distortion.pair();

    info!(
        k1 = base.k1,
        k2 = base.k2,
        size = %config.surface.size,
        max_fps = config.render.max_fps,
        "opening preview window"
    );
    let window = PreviewWindow::spawn(options).context("failed to start preview")?;

    let (stop_tx, stop_rx) = bounded::<()>(1);
    let sweep = if args.sweep {
        Some(spawn_sweep(window.updater(), base, stop_rx)?)
    } else {
        None
    };
    if args.stdin {
        // Blocked reads cannot be interrupted; the thread ends with the process.
        spawn_stdin_reader(window.updater(), window.reloader(), config)?;
    }

    let result = window.wait();
    drop(stop_tx);
    if let Some(handle) = sweep {
        let _ = handle.join();
    }
    result
}

pub fn print_config(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let rendered = config
        .to_toml_string()
        .context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

pub fn print_shader(args: &RunArgs, stage: ShaderStage) -> Result<()> {
    let config = resolve_config(args)?;
    let source = shader_source(&config, stage)?;
    let source = match stage {
        ShaderStage::Vertex => source,
        ShaderStage::Fragment => wrap_fragment(&source),
    };
    print!("{source}");
    if !source.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// Loads the configuration file and applies command-line overrides on top.
///
/// An explicit `--config` must exist; the default location is optional.
pub fn resolve_config(args: &RunArgs) -> Result<LensConfig> {
    let mut config = match &args.config {
        Some(path) => LensConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let path = AppPaths::discover()?.config_file();
            if path.is_file() {
                debug!(path = %path.display(), "loading configuration");
                LensConfig::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?
            } else {
                debug!(path = %path.display(), "no configuration file; using defaults");
                LensConfig::default()
            }
        }
    };
    apply_overrides(&mut config, args);
    config.validate().context("invalid command-line override")?;
    Ok(config)
}

fn apply_overrides(config: &mut LensConfig, args: &RunArgs) {
    if let Some(k1) = args.k1 {
        config.distortion.k1 = k1;
    }
    if let Some(k2) = args.k2 {
        config.distortion.k2 = k2;
    }
    if let Some(fps) = args.fps {
        config.render.max_fps = fps;
    }
    if let Some(size) = args.size {
        config.surface.size = size;
    }
    if let Some(vertex) = &args.vertex {
        config.shader.vertex = Some(vertex.clone());
    }
    if let Some(fragment) = &args.fragment {
        config.shader.fragment = Some(fragment.clone());
    }
}

fn shader_source(config: &LensConfig, stage: ShaderStage) -> Result<String> {
    let custom = config
        .shader
        .read(stage)
        .with_context(|| format!("failed to load {stage} shader"))?;
    Ok(custom.unwrap_or_else(|| match stage {
        ShaderStage::Vertex => VERTEX_SHADER_GLSL.to_string(),
        ShaderStage::Fragment => FRAGMENT_SHADER_GLSL.to_string(),
    }))
}

fn preview_options(config: &LensConfig) -> Result<PreviewOptions> {
    let bridge = BridgeOptions {
        attributes: config.attributes(),
        vertex_source: shader_source(config, ShaderStage::Vertex)?,
        fragment_source: shader_source(config, ShaderStage::Fragment)?,
        ..BridgeOptions::default()
    };
    let size = config.surface.size;
    Ok(PreviewOptions {
        size: (size.width, size.height),
        k1: config.distortion.k1,
        k2: config.distortion.k2,
        max_fps: config.render.max_fps,
        acquire_timeout: config.surface.acquire_timeout,
        bridge,
        ..PreviewOptions::default()
    })
}

/// One line of `--stdin` input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StdinCommand {
    Params(ParameterPair),
    /// Re-read the configured shader files and rebuild the program.
    Reload,
}

/// Parses one `k1 k2` or `reload` line. Blank lines and `#` comments yield `None`.
pub fn parse_stdin_line(line: &str) -> Result<Option<StdinCommand>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    if trimmed.eq_ignore_ascii_case("reload") {
        return Ok(Some(StdinCommand::Reload));
    }

    let fields: Vec<&str> = trimmed
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|field| !field.is_empty())
        .collect();
    let [k1, k2] = fields.as_slice() else {
        return Err(format!("expected two values, got {}", fields.len()));
    };
    let k1 = k1
        .parse::<f32>()
        .map_err(|_| format!("invalid k1 '{k1}'"))?;
    let k2 = k2
        .parse::<f32>()
        .map_err(|_| format!("invalid k2 '{k2}'"))?;
    if !k1.is_finite() || !k2.is_finite() {
        return Err("coefficients must be finite".into());
    }
    Ok(Some(StdinCommand::Params(ParameterPair::new(k1, k2))))
}

fn spawn_stdin_reader(
    updater: ParamUpdater,
    reloader: ShaderReloader,
    config: LensConfig,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lensview-stdin".into())
        .spawn(move || {
            let published = read_stdin(io::stdin().lock(), &updater, || {
                reload_from_config(&reloader, &config)
            });
            debug!(published, "stdin reader finished");
        })
        .map_err(|err| anyhow!("failed to spawn stdin reader: {err}"))
}

fn reload_from_config(reloader: &ShaderReloader, config: &LensConfig) -> Result<()> {
    let vertex = shader_source(config, ShaderStage::Vertex)?;
    let fragment = shader_source(config, ShaderStage::Fragment)?;
    reloader.reload(vertex, fragment)
}

/// Feeds parsed lines to `updater` until input ends or the bridge goes away.
/// `reload` lines call `on_reload`. Returns the number of pairs published.
fn read_stdin(
    input: impl BufRead,
    updater: &ParamUpdater,
    mut on_reload: impl FnMut() -> Result<()>,
) -> usize {
    let mut published = 0;
    for (index, line) in input.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("stopped reading parameters: {err}");
                break;
            }
        };
        let pair = match parse_stdin_line(&line) {
            Ok(Some(StdinCommand::Params(pair))) => pair,
            Ok(Some(StdinCommand::Reload)) => {
                match on_reload() {
                    Ok(()) => info!("shader reload requested"),
                    Err(err) => warn!("shader reload skipped: {err:#}"),
                }
                continue;
            }
            Ok(None) => continue,
            Err(err) => {
                warn!(line = index + 1, "skipping malformed parameter line: {err}");
                continue;
            }
        };
        match updater.update_params(pair.k1, pair.k2) {
            Ok(version) => {
                published += 1;
                debug!(k1 = pair.k1, k2 = pair.k2, version, "published parameters");
            }
            Err(err) if err.is_not_initialized() => break,
            Err(err) => warn!("failed to publish parameters: {err}"),
        }
    }
    published
}

/// Coefficients for the synthetic sweep, oscillating around `base`.
pub fn sweep_pair(base: ParameterPair, elapsed: Duration) -> ParameterPair {
    let t = elapsed.as_secs_f32();
    ParameterPair::new(
        base.k1 + 0.15 * (t * 0.8).sin(),
        base.k2 + 0.05 * (t * 0.5).sin(),
    )
}

fn spawn_sweep(
    updater: ParamUpdater,
    base: ParameterPair,
    stop: Receiver<()>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lensview-sweep".into())
        .spawn(move || run_sweep(&updater, base, &stop))
        .map_err(|err| anyhow!("failed to spawn sweep thread: {err}"))
}

fn run_sweep(updater: &ParamUpdater, base: ParameterPair, stop: &Receiver<()>) {
    let started = Instant::now();
    loop {
        let pair = sweep_pair(base, started.elapsed());
        if let Err(err) = updater.update_params(pair.k1, pair.k2) {
            debug!("sweep stopped: {err}");
            return;
        }
        match stop.recv_timeout(SWEEP_PERIOD) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
