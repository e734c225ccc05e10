//! Result and error types for Vigia.

use thiserror::Error;

/// Result type for Vigia operations
pub type VigiaResult<T> = Result<T, VigiaError>;

/// Errors that can occur in Vigia
#[derive(Debug, Error)]
pub enum VigiaError {
    /// Selector matched no element
    #[error("Element not found: {selector}")]
    NotFound {
        /// Selector that matched nothing
        selector: String,
    },

    /// Element exists but cannot be interacted with
    #[error("Element not visible: {reason}")]
    NotVisible {
        /// Specific reason the element was judged non-interactable
        reason: String,
    },

    /// Operation called in the wrong state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Inbound message could not be routed
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// Requested capability is provided by the host shell, not the engine
    #[error("Host capability unavailable: {capability}")]
    HostCapability {
        /// Name of the missing capability
        capability: String,
    },

    /// Input simulation failed mid-sequence
    #[error("Input simulation failed: {message}")]
    InputError {
        /// Error message
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VigiaError {
    /// Shorthand for a not-found error
    #[must_use]
    pub fn not_found(selector: impl Into<String>) -> Self {
        Self::NotFound {
            selector: selector.into(),
        }
    }

    /// Shorthand for a not-visible error
    #[must_use]
    pub fn not_visible(reason: impl Into<String>) -> Self {
        Self::NotVisible {
            reason: reason.into(),
        }
    }

    /// Shorthand for an invalid-state error
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Shorthand for a host-capability error
    #[must_use]
    pub fn host_capability(capability: impl Into<String>) -> Self {
        Self::HostCapability {
            capability: capability.into(),
        }
    }
}
