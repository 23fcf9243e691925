//! Facade error type.

use cfsec_config::ConfigError;
use cfsec_kernel::KernelError;
use thiserror::Error;

/// Errors surfaced by [`crate::CfSec`] and [`crate::SessionHandle`].
#[derive(Debug, Error)]
pub enum CfSecError {
    /// Validation, collision, registry or storage failure from the kernel.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// Invalid configuration values.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Layered configuration could not be loaded.
    #[error("failed to load configuration: {0:#}")]
    Load(#[from] anyhow::Error),

    /// No controller was wired for the entity type.
    #[error("no controller wired for {entity}")]
    NotWired { entity: &'static str },

    /// The tracing subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Telemetry(String),

    /// The session row behind a handle is gone or already closed.
    #[error("session {session} is not open")]
    SessionClosed { session: cfsec_types::IdentityKey },
}

impl CfSecError {
    /// True when re-fetching and retrying may succeed.
    pub fn is_collision(&self) -> bool {
        matches!(self, CfSecError::Kernel(err) if err.is_collision())
    }

    /// True for argument and precondition failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, CfSecError::Kernel(err) if err.is_validation())
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, CfSecError>;
