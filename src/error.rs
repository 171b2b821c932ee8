//! Error types used by the watchkeeper runtime, shared state and services.
//!
//! This module defines the error enums of the crate:
//!
//! - [`RuntimeError`]: errors raised by the supervision runtime itself.
//! - [`ServiceError`]: errors raised by a single service iteration or construction.
//! - [`StateError`]: errors raised by [`SharedState`](crate::SharedState), including
//!   contract violations of the mutability rules.
//! - [`RegistryError`]: errors raised while resolving the configured service list.
//! - [`ConfigError`]: errors raised while loading or querying settings.
//!
//! Every type provides `as_label` (stable snake_case label for logs).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the supervision runtime.
///
/// These represent failures of the orchestration itself, such as a shutdown
/// sequence exceeding its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some services did not observe cancellation in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the services that did not stop in time.
        stuck: Vec<String>,
    },

    /// Registering OS signal handlers failed.
    #[error("failed to install shutdown signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use watchkeeper::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

/// # Errors produced by service execution.
///
/// An `Err` returned from an iteration counts as one consecutive error on the
/// service's [`HealthTracker`](crate::HealthTracker); it never leaves the run loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The iteration detected a fault (empty or corrupt data, disconnected hardware, ...).
    #[error("iteration failed: {error}")]
    Fault {
        /// The underlying error message.
        error: String,
    },

    /// The service could not be constructed.
    #[error("construction failed: {error}")]
    Build {
        /// The underlying error message.
        error: String,
    },

    /// A shared-state operation failed inside the service.
    #[error(transparent)]
    State(#[from] StateError),

    /// Service observed cancellation and exits its loop.
    #[error("context cancelled")]
    Canceled,
}

impl ServiceError {
    /// Shorthand for [`ServiceError::Fault`].
    pub fn fault(error: impl Into<String>) -> Self {
        ServiceError::Fault {
            error: error.into(),
        }
    }

    /// Shorthand for [`ServiceError::Build`].
    pub fn build(error: impl Into<String>) -> Self {
        ServiceError::Build {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use watchkeeper::ServiceError;
    ///
    /// assert_eq!(ServiceError::fault("empty frame").as_label(), "service_fault");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Fault { .. } => "service_fault",
            ServiceError::Build { .. } => "service_build",
            ServiceError::State(_) => "service_state",
            ServiceError::Canceled => "service_canceled",
        }
    }
}

/// # Errors produced by [`SharedState`](crate::SharedState).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StateError {
    /// The key was never registered in the volatile space.
    #[error("volatile key '{0}' not registered")]
    KeyNotFound(String),

    /// The key is already registered (in either mutability kind).
    #[error("volatile key '{0}' already registered")]
    AlreadyRegistered(String),

    /// Misuse of the mutability rules, e.g. `set_volatile` on a reference-kind key.
    #[error("contract violation on key '{key}': {reason}")]
    ContractViolation {
        /// Offending key.
        key: String,
        /// What rule was broken.
        reason: &'static str,
    },

    /// The reference stored under the key is not of the requested type.
    #[error("reference under key '{key}' is not a {expected}")]
    TypeMismatch {
        /// Offending key.
        key: String,
        /// Requested type name.
        expected: &'static str,
    },

    /// A persisted counter is not an integer.
    #[error("persisted key '{0}' does not hold an integer")]
    NotACounter(String),

    /// Reading or writing durable storage failed.
    #[error("persisted storage i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted document could not be encoded.
    #[error("persisted storage encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StateError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StateError::KeyNotFound(_) => "state_key_not_found",
            StateError::AlreadyRegistered(_) => "state_already_registered",
            StateError::ContractViolation { .. } => "state_contract_violation",
            StateError::TypeMismatch { .. } => "state_type_mismatch",
            StateError::NotACounter(_) => "state_not_a_counter",
            StateError::Io(_) => "state_io",
            StateError::Encode(_) => "state_encode",
        }
    }

    /// True for programming errors (as opposed to runtime/storage faults).
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            StateError::ContractViolation { .. } | StateError::TypeMismatch { .. }
        )
    }
}

/// # Errors produced while resolving the service list.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No factory is registered for the identifier.
    #[error("unknown service identifier '{0}'")]
    UnknownService(String),

    /// Two identifiers resolve to the same short name.
    #[error("duplicate service name '{0}'")]
    DuplicateName(String),

    /// The service list file could not be read.
    #[error("service list i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The service list file is not valid JSON.
    #[error("service list format: {0}")]
    Format(#[from] serde_json::Error),
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::UnknownService(_) => "registry_unknown_service",
            RegistryError::DuplicateName(_) => "registry_duplicate_name",
            RegistryError::Io(_) => "registry_io",
            RegistryError::Format(_) => "registry_format",
        }
    }
}

/// # Errors produced while loading or querying settings.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file could not be read.
    #[error("settings i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Settings document is not valid YAML.
    #[error("settings format: {0}")]
    Format(#[from] serde_yaml::Error),

    /// A value exists at the path but has the wrong shape.
    #[error("settings value at '{path}' is invalid: {reason}")]
    Invalid {
        /// Dotted key path.
        path: String,
        /// Decoder message.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "config_io",
            ConfigError::Format(_) => "config_format",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violations_are_classified() {
        let err = StateError::ContractViolation {
            key: "camera_frame_queue".into(),
            reason: "set_volatile on reference-kind key",
        };
        assert!(err.is_contract_violation());
        assert!(!StateError::KeyNotFound("x".into()).is_contract_violation());
    }

    #[test]
    fn state_error_converts_into_service_error() {
        let err: ServiceError = StateError::KeyNotFound("voltage".into()).into();
        assert_eq!(err.as_label(), "service_state");
        assert_eq!(err.to_string(), "volatile key 'voltage' not registered");
    }
}
