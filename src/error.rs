//! Error taxonomy for the render override.
//!
//! GPU faults ([`OverrideError::Allocation`], [`OverrideError::ShaderLoad`]) are
//! caught by the pipeline assembler and downgraded to a disabled stage. Control
//! errors are returned straight to whoever issued the call.

/// Errors raised by the override pipeline and its control surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverrideError {
    /// The host could not create a GPU resource for a render target.
    #[error("failed to allocate render target '{target}': {reason}")]
    Allocation { target: String, reason: String },

    /// A shader technique is missing or failed to compile.
    #[error("failed to load shader technique '{technique}': {reason}")]
    ShaderLoad { technique: String, reason: String },

    /// The stage name is not part of the pipeline, or the stage has no such parameter.
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    /// No override is registered under this name.
    #[error("render override '{0}' is not registered")]
    NotRegistered(String),

    /// An override with this name is already registered.
    #[error("render override '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Device or surface setup failed.
    #[error("GPU device error: {0}")]
    Device(String),
}

impl OverrideError {
    pub(crate) fn allocation(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Allocation {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shader_load(technique: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ShaderLoad {
            technique: technique.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for misuse of the control surface rather than a GPU fault.
    pub fn is_control_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownStage(_) | Self::NotRegistered(_) | Self::AlreadyRegistered(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = OverrideError> = std::result::Result<T, E>;
