use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::bridge::{ParamUpdater, RenderBridge};
use crate::error::{BridgeError, ContextError};
use crate::platform::GpuPlatform;

/// Frame cap used when the host does not ask for one.
pub const DEFAULT_MAX_FPS: u32 = 90;

/// Decides when the next frame is due under an optional frame-rate cap.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl FrameScheduler {
    /// `max_fps` of 0 disables the cap.
    pub fn new(max_fps: u32) -> Self {
        let interval = (max_fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(max_fps)));
        Self {
            interval,
            last_frame: None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        match self.next_deadline() {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    pub fn mark_rendered(&mut self) {
        self.mark_rendered_at(Instant::now());
    }

    pub fn mark_rendered_at(&mut self, now: Instant) {
        self.last_frame = Some(now);
    }

    /// Instant the next frame becomes due; `None` when one is due right away.
    pub fn next_deadline(&self) -> Option<Instant> {
        let interval = self.interval?;
        self.last_frame.map(|last| last + interval)
    }

    pub fn reset(&mut self) {
        self.last_frame = None;
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FPS)
    }
}

#[derive(Debug, Clone, Copy)]
enum LoopCommand {
    Resize { width: u32, height: u32 },
    Shutdown,
}

/// Renderer thread driving a [`RenderBridge`] at a capped frame rate.
///
/// The bridge is built and initialized on the spawned thread, so the context
/// is current there for its whole life. Callers keep the returned handle and
/// publish coefficients through [`RenderLoop::updater`].
pub struct RenderLoop {
    updater: ParamUpdater,
    commands: Sender<LoopCommand>,
    frames: Arc<AtomicU64>,
    join_handle: Option<JoinHandle<u64>>,
}

impl RenderLoop {
    /// Spawns the renderer thread and waits until `initialize(k1, k2)` finished there.
    pub fn spawn<P, F>(build: F, k1: f32, k2: f32, max_fps: u32) -> Result<Self, BridgeError>
    where
        P: GpuPlatform + 'static,
        F: FnOnce() -> RenderBridge<P> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded(1);
        let (command_tx, command_rx) = unbounded();
        let frames = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&frames);

        let handle = thread::Builder::new()
            .name("lensbridge-render".into())
            .spawn(move || {
                let mut bridge = build();
                if let Err(err) = bridge.initialize(k1, k2) {
                    let _ = ready_tx.send(Err(err));
                    return 0;
                }
                let _ = ready_tx.send(Ok(bridge.updater()));
                run_render_loop(&mut bridge, FrameScheduler::new(max_fps), command_rx, &counter)
            })
            .map_err(|err| {
                ContextError::InitializationFailed(format!("failed to spawn render thread: {err}"))
            })?;

        let ready = ready_rx.recv().map_err(|err| {
            BridgeError::from(ContextError::InitializationFailed(format!(
                "render thread exited before reporting: {err}"
            )))
        });
        let updater = match ready {
            Ok(Ok(updater)) => updater,
            Ok(Err(err)) | Err(err) => {
                let _ = handle.join();
                return Err(err);
            }
        };

        Ok(Self {
            updater,
            commands: command_tx,
            frames,
            join_handle: Some(handle),
        })
    }

    pub fn updater(&self) -> ParamUpdater {
        self.updater.clone()
    }

    /// Frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn resize(&self, width: u32, height: u32) {
        let _ = self.commands.send(LoopCommand::Resize { width, height });
    }

    /// Stops the thread, tears the bridge down, and returns the frame count.
    pub fn shutdown(mut self) -> u64 {
        self.stop()
    }

    fn stop(&mut self) -> u64 {
        let Some(handle) = self.join_handle.take() else {
            return self.frames();
        };
        let _ = self.commands.send(LoopCommand::Shutdown);
        match handle.join() {
            Ok(frames) => frames,
            Err(_) => {
                tracing::error!("render thread panicked");
                self.frames()
            }
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_render_loop<P: GpuPlatform>(
    bridge: &mut RenderBridge<P>,
    mut scheduler: FrameScheduler,
    commands: Receiver<LoopCommand>,
    frames: &AtomicU64,
) -> u64 {
    tracing::debug!(interval = ?scheduler.interval(), "render loop started");
    loop {
        let now = Instant::now();
        if scheduler.ready_for_frame(now) {
            match bridge.frame() {
                Ok(_) => {
                    frames.fetch_add(1, Ordering::AcqRel);
                }
                Err(err) => tracing::warn!(error = %err, "frame failed; retrying next frame"),
            }
            scheduler.mark_rendered_at(now);
        }

        let command = match scheduler.next_deadline() {
            Some(deadline) => match commands.recv_deadline(deadline) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(LoopCommand::Shutdown),
            },
            None => match commands.try_recv() {
                Ok(command) => Some(command),
                Err(crossbeam_channel::TryRecvError::Empty) => None,
                Err(crossbeam_channel::TryRecvError::Disconnected) => Some(LoopCommand::Shutdown),
            },
        };

        match command {
            Some(LoopCommand::Resize { width, height }) => {
                if let Err(err) = bridge.resize(width, height) {
                    tracing::warn!(error = %err, "resize ignored");
                }
            }
            Some(LoopCommand::Shutdown) => break,
            None => {}
        }
    }

    bridge.teardown();
    let total = frames.load(Ordering::Acquire);
    tracing::debug!(frames = total, "render loop stopped");
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_scheduler_is_always_ready() {
        let mut scheduler = FrameScheduler::new(0);
        let now = Instant::now();
        assert!(scheduler.ready_for_frame(now));
        scheduler.mark_rendered_at(now);
        assert!(scheduler.ready_for_frame(now));
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn capped_scheduler_waits_one_interval() {
        let mut scheduler = FrameScheduler::new(50);
        let start = Instant::now();
        assert!(scheduler.ready_for_frame(start));
        scheduler.mark_rendered_at(start);
        assert!(!scheduler.ready_for_frame(start + Duration::from_millis(10)));
        assert!(scheduler.ready_for_frame(start + Duration::from_millis(20)));
        assert_eq!(
            scheduler.next_deadline(),
            Some(start + Duration::from_millis(20))
        );

        scheduler.reset();
        assert!(scheduler.ready_for_frame(start));
    }

    #[test]
    fn default_cap_is_ninety() {
        let interval = FrameScheduler::default().interval().unwrap();
        assert_eq!(interval, Duration::from_secs_f64(1.0 / 90.0));
    }
}
