use thiserror::Error;

use crate::types::{BridgeState, ConfigAttributes, ShaderStage};

/// Failures while acquiring the display, configuration, context and surface.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("no display connection is available")]
    DisplayUnavailable,
    #[error("graphics layer failed to initialize: {0}")]
    InitializationFailed(String),
    #[error("no display configuration satisfies {requested:?}")]
    NoMatchingConfig { requested: ConfigAttributes },
    #[error("context creation rejected: {0}")]
    ContextCreationFailed(String),
}

/// Failures while building the shader program.
///
/// The `log` fields carry the platform diagnostic verbatim.
#[derive(Debug, Clone, Error)]
pub enum ShaderError {
    #[error("shader compile error ({stage}):\n{log}")]
    CompileError { stage: ShaderStage, log: String },
    #[error("shader link error:\n{log}")]
    LinkError { log: String },
}

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error("render bridge is not initialized (state: {state})")]
    NotInitialized { state: BridgeState },
    #[error("render bridge is already initialized")]
    AlreadyInitialized,
    #[error("frame failed: {0}")]
    FrameFailed(String),
}

/// Numeric status reported across the C boundary.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    Ok = 0,
    DisplayUnavailable = 1,
    InitializationFailed = 2,
    NoMatchingConfig = 3,
    ContextCreationFailed = 4,
    CompileError = 5,
    LinkError = 6,
    NotInitialized = 7,
    AlreadyInitialized = 8,
    FrameFailed = 9,
    InvalidHandle = 10,
}

impl BridgeError {
    pub fn status(&self) -> BridgeStatus {
        match self {
            BridgeError::Context(ContextError::DisplayUnavailable) => {
                BridgeStatus::DisplayUnavailable
            }
            BridgeError::Context(ContextError::InitializationFailed(_)) => {
                BridgeStatus::InitializationFailed
            }
            BridgeError::Context(ContextError::NoMatchingConfig { .. }) => {
                BridgeStatus::NoMatchingConfig
            }
            BridgeError::Context(ContextError::ContextCreationFailed(_)) => {
                BridgeStatus::ContextCreationFailed
            }
            BridgeError::Shader(ShaderError::CompileError { .. }) => BridgeStatus::CompileError,
            BridgeError::Shader(ShaderError::LinkError { .. }) => BridgeStatus::LinkError,
            BridgeError::NotInitialized { .. } => BridgeStatus::NotInitialized,
            BridgeError::AlreadyInitialized => BridgeStatus::AlreadyInitialized,
            BridgeError::FrameFailed(_) => BridgeStatus::FrameFailed,
        }
    }

    pub fn is_not_initialized(&self) -> bool {
        matches!(self, BridgeError::NotInitialized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display_includes_stage_and_log() {
        let err = ShaderError::CompileError {
            stage: ShaderStage::Fragment,
            log: "0:7: error: unexpected '}'".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fragment"), "missing stage in: {msg}");
        assert!(msg.contains("0:7: error: unexpected '}'"), "missing log in: {msg}");
    }

    #[test]
    fn bridge_error_is_transparent_over_shader_errors() {
        let err = BridgeError::from(ShaderError::LinkError {
            log: "varying v_uv not written".into(),
        });
        assert_eq!(
            err.to_string(),
            "shader link error:\nvarying v_uv not written"
        );
    }

    #[test]
    fn every_kind_maps_to_a_distinct_status() {
        let errors = [
            BridgeError::from(ContextError::DisplayUnavailable),
            BridgeError::from(ContextError::InitializationFailed("x".into())),
            BridgeError::from(ContextError::NoMatchingConfig {
                requested: ConfigAttributes::default(),
            }),
            BridgeError::from(ContextError::ContextCreationFailed("x".into())),
            BridgeError::from(ShaderError::CompileError {
                stage: ShaderStage::Vertex,
                log: String::new(),
            }),
            BridgeError::from(ShaderError::LinkError { log: String::new() }),
            BridgeError::NotInitialized {
                state: BridgeState::Uninitialized,
            },
            BridgeError::AlreadyInitialized,
            BridgeError::FrameFailed(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|err| err.status() as i32).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&(BridgeStatus::Ok as i32)));
    }
}
