//! Shared error taxonomy honored by every transport.
//!
//! Transports wrap their native failures into [`PortalError`] and keep the
//! original cause reachable through `std::error::Error::source`. The
//! dispatch layers (`Registry`, `Consumer`) only add name/address context;
//! they never swallow or re-classify.

use portico_schema::ValidationIssue;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Convenience result type for portal operations.
pub type PortalResult<T> = Result<T, PortalError>;

/// Which validation gate rejected the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    ParameterValidation,
    ResultValidation,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterValidation => write!(f, "parameter_validation"),
            Self::ResultValidation => write!(f, "result_validation"),
        }
    }
}

/// Transport-local execution stage tag. `Syntax` is produced by the script
/// transport when the source fails to parse or the entry point is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Syntax,
    Runtime,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax_error"),
            Self::Runtime => write!(f, "execution"),
        }
    }
}

/// Errors that can occur while addressing, registering, resolving, or
/// calling a portal function.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("invalid address `{address}`: {reason}")]
    Address { address: String, reason: String },

    #[error("{stage} rejected the value ({} issue(s))", .issues.len())]
    Validation {
        stage: ValidationStage,
        issues: Vec<ValidationIssue>,
    },

    #[error("{stage}: {message}")]
    Execution {
        stage: ExecutionStage,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("call timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("transport failure for `{address}`: {message}")]
    Transport {
        address: String,
        status: Option<u16>,
        message: String,
        body: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("no portal registered for scheme `{scheme}`")]
    UnknownScheme { scheme: String },

    #[error("no function registered under name `{name}`")]
    UnknownName { name: String },

    #[error("function `{name}` is already registered")]
    DuplicateName { name: String },

    #[error("a portal is already mounted for scheme `{scheme}`")]
    DuplicateScheme { scheme: String },

    #[error("payload type mismatch for scheme `{scheme}`: expected {expected}")]
    PayloadType {
        scheme: String,
        expected: &'static str,
    },
}

impl PortalError {
    pub fn address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Address {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_params(issues: Vec<ValidationIssue>) -> Self {
        Self::Validation {
            stage: ValidationStage::ParameterValidation,
            issues,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Execution {
            stage: ExecutionStage::Syntax,
            message: message.into(),
            source: None,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            stage: ExecutionStage::Runtime,
            message: message.into(),
            source: None,
        }
    }

    pub fn execution_with_source(message: impl Into<String>, source: BoxError) -> Self {
        Self::Execution {
            stage: ExecutionStage::Runtime,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn transport(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            address: address.into(),
            status: None,
            message: message.into(),
            body: None,
            source: None,
        }
    }

    /// The network status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Validation issues carried by this error, if any.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}
