use thiserror::Error;
use crate::faults::{FaultClass, RemoteFault};

/// Declarative input that can never be sent to the platform. Raised before any remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("cannot encode identity, {value:?} contains the delimiter '{delimiter}'")]
    Encoding {
        value: String,
        delimiter: char,
    },
    #[error("malformed identity {encoded:?}: {reason}")]
    Malformed {
        encoded: String,
        reason: String,
    },
}

/// A single remote call that failed, with the fault the platform reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed ({}): {fault}", .fault.class())]
pub struct RemoteError {
    pub operation: String,
    #[source]
    pub fault: RemoteFault,
}

impl RemoteError {
    pub fn new(operation: impl Into<String>, fault: RemoteFault) -> Self {
        Self { operation: operation.into(), fault }
    }

    pub fn class(&self) -> FaultClass {
        self.fault.class()
    }
}

/// A planned operation failed while applying a plan. Operations before it stay applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{failed} failed ({}): {fault}; already applied: {}", .fault.class(), format_applied(.applied))]
pub struct ApplyError {
    pub failed: String,
    pub applied: Vec<String>,
    /// operations that were planned after the failed one and never attempted
    pub skipped: Vec<String>,
    #[source]
    pub fault: RemoteFault,
}

impl ApplyError {
    pub fn class(&self) -> FaultClass {
        self.fault.class()
    }
}

fn format_applied(applied: &[String]) -> String {
    if applied.is_empty() {
        "none".to_string()
    } else {
        applied.join(", ")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl SwitchError {
    /// Fault class for errors that came from the platform, `None` for local errors.
    pub fn class(&self) -> Option<FaultClass> {
        match self {
            SwitchError::Validation(_) | SwitchError::Identity(_) => None,
            SwitchError::Remote(err) => Some(err.class()),
            SwitchError::Apply(err) => Some(err.class()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == Some(FaultClass::NotFound)
    }
}
