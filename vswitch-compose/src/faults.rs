use std::fmt;
use std::fmt::Formatter;
use std::future::Future;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vswitch_compose_schemas::settings::EngineSettings;
use crate::error::RemoteError;

/// Structured fault information returned by the platform. Classification only ever looks at
/// `kind`, the message is for humans.
#[derive(Error, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[error("{kind}: {message}")]
pub struct RemoteFault {
    pub kind: FaultKind,
    pub message: String,
}

impl RemoteFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn class(&self) -> FaultClass {
        self.kind.class()
    }
}

/// The platform fault types this crate knows how to classify.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum FaultKind {
    ManagedObjectNotFound { obj: String },
    NotFound,
    AlreadyExists { name: String },
    DuplicateName { name: String },
    ConcurrentAccess,
    ResourceInUse,
    Timedout,
    HostCommunication,
    ConnectionReset,
    RequestCanceled,
    InvalidArgument { property: String },
    NoPermission { privilege: String },
    NotAuthenticated,
    NotSupported,
    /// a fault type from a newer platform
    Unrecognized { type_name: String },
}

impl FaultKind {
    pub fn class(&self) -> FaultClass {
        match self {
            FaultKind::ManagedObjectNotFound { .. }
            | FaultKind::NotFound => FaultClass::NotFound,
            FaultKind::AlreadyExists { .. }
            | FaultKind::DuplicateName { .. }
            | FaultKind::ConcurrentAccess
            | FaultKind::ResourceInUse => FaultClass::Conflict,
            FaultKind::Timedout
            | FaultKind::HostCommunication
            | FaultKind::ConnectionReset => FaultClass::Transient,
            // a cancelled request was cancelled by the caller, retrying it is not our call
            FaultKind::RequestCanceled
            | FaultKind::InvalidArgument { .. }
            | FaultKind::NoPermission { .. }
            | FaultKind::NotAuthenticated
            | FaultKind::NotSupported
            | FaultKind::Unrecognized { .. } => FaultClass::Fatal,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::ManagedObjectNotFound { obj } => write!(f, "managed object {obj} not found"),
            FaultKind::NotFound => write!(f, "not found"),
            FaultKind::AlreadyExists { name } => write!(f, "{name} already exists"),
            FaultKind::DuplicateName { name } => write!(f, "duplicate name {name}"),
            FaultKind::ConcurrentAccess => write!(f, "concurrent access"),
            FaultKind::ResourceInUse => write!(f, "resource in use"),
            FaultKind::Timedout => write!(f, "timed out"),
            FaultKind::HostCommunication => write!(f, "host communication failure"),
            FaultKind::ConnectionReset => write!(f, "connection reset"),
            FaultKind::RequestCanceled => write!(f, "request cancelled"),
            FaultKind::InvalidArgument { property } => write!(f, "invalid argument {property}"),
            FaultKind::NoPermission { privilege } => write!(f, "missing privilege {privilege}"),
            FaultKind::NotAuthenticated => write!(f, "session not authenticated"),
            FaultKind::NotSupported => write!(f, "not supported"),
            FaultKind::Unrecognized { type_name } => write!(f, "unrecognized fault {type_name}"),
        }
    }
}

/// What a caller should do about a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// the target vanished, a delete path can treat this as done
    NotFound,
    /// concurrent modification or a name collision
    Conflict,
    /// safe to retry with backoff
    Transient,
    Fatal,
}

impl FaultClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FaultClass::Transient)
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FaultClass::NotFound => write!(f, "not found"),
            FaultClass::Conflict => write!(f, "conflict"),
            FaultClass::Transient => write!(f, "transient"),
            FaultClass::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for RetryPolicy {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            max_attempts: settings.transient_retry_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// Run `f` again while it fails with a transient fault, doubling the backoff each time. Other
/// classes are returned straight away with the original fault.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteFault>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(fault) if fault.class().is_retryable() && attempt < policy.max_attempts => {
                tracing::warn!("{operation} failed with {fault} (attempt {attempt}/{}), retrying in {:?}", policy.max_attempts, backoff);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(fault) => return Err(RemoteError::new(operation, fault)),
        }
    }
}
