//! GPU context and shader-parameter lifecycle for VR lens pre-distortion.
//!
//! A host hands over a native window, asks the bridge to initialize with two
//! radial distortion coefficients, and then publishes new `(k1, k2)` pairs
//! from whatever thread it likes while a renderer thread draws frames:
//!
//! ```text
//!   host threads ──ParamUpdater::update_params──▶ ParameterChannel
//!                                                       │ read_latest()
//!   renderer ──initialize──▶ GraphicsContext            ▼
//!        │                   (display, config, ─▶ ShaderProgram::apply_parameters
//!        │                    context, surface)          │
//!        └──────────── frame() ────────────────▶ draw ─▶ present
//! ```
//!
//! [`RenderBridge`] owns the chain and enforces the lifecycle
//! (`Uninitialized → Initializing → Ready | Failed → Destroyed`). GPU work is
//! routed through the [`GpuPlatform`] trait; [`gpu::WgpuPlatform`] is the real
//! backend and [`mock::MockPlatform`] records calls for tests. Hosts outside
//! Rust use the C functions in [`ffi`].

pub mod bridge;
pub mod channel;
pub mod compile;
pub mod context;
pub mod error;
pub mod ffi;
pub mod mock;
pub mod platform;
pub mod runtime;
pub mod shader;
pub mod types;

#[cfg(feature = "wgpu")]
pub mod gpu;
#[cfg(feature = "wgpu")]
pub mod window;

pub use bridge::{BridgeOptions, ParamUpdater, RenderBridge};
pub use channel::ParameterChannel;
pub use compile::{FRAGMENT_SHADER_GLSL, VERTEX_SHADER_GLSL};
pub use context::GraphicsContext;
pub use error::{BridgeError, BridgeStatus, ContextError, ShaderError};
pub use platform::GpuPlatform;
pub use runtime::{FrameScheduler, RenderLoop, DEFAULT_MAX_FPS};
pub use shader::{ShaderProgram, UniformNames};
pub use types::{
    ApiVersion, BridgeState, ConfigAttributes, ConfigDescriptor, ParameterPair,
    ParameterSnapshot, ShaderStage, DEFAULT_K1, DEFAULT_K2,
};

#[cfg(feature = "wgpu")]
pub use gpu::{NativeWindow, WgpuPlatform, WindowKind};
#[cfg(feature = "wgpu")]
pub use window::{PreviewOptions, PreviewWindow, ShaderReloader};
