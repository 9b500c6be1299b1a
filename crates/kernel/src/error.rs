//! Error type for solver construction.

use thiserror::Error;

/// Errors reported by the kernel.
///
/// Only construction can fail. Once a solver exists, `step` never returns an
/// error; a bad `dt` is logged and the step is skipped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// A solver parameter is out of its valid range.
    #[error("invalid solver parameter `{field}`: {reason}")]
    InvalidConfig {
        /// Name of the offending parameter.
        field: &'static str,
        /// Human-readable description of the constraint that was violated.
        reason: String,
    },
}

impl KernelError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
