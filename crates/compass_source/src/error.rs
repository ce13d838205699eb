// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for node source creation and release.

use std::fmt;

use recoverable::{Recovery, RecoveryInfo};

use crate::DeploymentId;

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A deployment is configured with a source type that nothing can construct.
    Configuration,
    /// A node source constructor or its initialization failed.
    Creation,
    /// Releasing the resources held by a node source failed.
    Release,
}

impl ErrorKind {
    /// A short, stable name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Creation => "creation",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while creating or releasing a node source.
///
/// The error is clonable: a single creation outcome is handed to every caller that was waiting
/// on it, failures included.
///
/// # Examples
///
/// ```
/// use compass_source::{DeploymentId, Error, ErrorKind};
///
/// let id = DeploymentId::new("search", "ap-south");
/// let error = Error::configuration(&id, "unsupported node source type 'zookeeper'");
///
/// assert_eq!(error.kind(), ErrorKind::Configuration);
/// assert_eq!(error.deployment(), "search/ap-south");
/// assert!(error.to_string().contains("zookeeper"));
/// ```
#[ohno::error]
#[derive(Clone)]
#[display("{kind} error for deployment {deployment}")]
pub struct Error {
    kind: ErrorKind,
    deployment: String,
}

impl Error {
    /// A deployment names a source type with no matching constructor or factory.
    pub fn configuration(deployment: &DeploymentId, message: impl Into<String>) -> Self {
        Self::caused_by(ErrorKind::Configuration, deployment.to_string(), message.into())
    }

    /// A node source constructor or its asynchronous initialization failed.
    pub fn creation(deployment: &DeploymentId, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Creation, deployment.to_string(), cause)
    }

    /// Releasing a node source's resources failed.
    pub fn release(deployment: &DeploymentId, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Release, deployment.to_string(), cause)
    }

    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The deployment this error concerns, rendered as `service/zone`.
    #[must_use]
    pub fn deployment(&self) -> &str {
        &self.deployment
    }
}

impl Recovery for Error {
    fn recovery(&self) -> RecoveryInfo {
        match self.kind {
            // Fixing configuration needs an operator, not another attempt.
            ErrorKind::Configuration => RecoveryInfo::never(),
            ErrorKind::Creation => RecoveryInfo::retry(),
            ErrorKind::Release => RecoveryInfo::unknown(),
        }
    }
}

/// A specialized [`Result`] type for node source operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use recoverable::RecoveryKind;

    use super::*;

    fn id() -> DeploymentId {
        DeploymentId::new("orders", "eu-north")
    }

    #[test]
    fn configuration_error_names_deployment_and_cause() {
        let error = Error::configuration(&id(), "unsupported node source type 'etcd'");
        let display = error.to_string();

        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(display.contains("configuration error for deployment orders/eu-north"), "got: {display}");
        assert!(display.contains("etcd"), "got: {display}");
    }

    #[test]
    fn creation_error_keeps_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "registry unreachable");
        let error = Error::creation(&id(), io);

        assert_eq!(error.kind(), ErrorKind::Creation);
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.to_string().contains("registry unreachable"));
    }

    #[test]
    fn clone_preserves_kind_and_message() {
        let error = Error::release(&id(), "watch already closed");
        let cloned = error.clone();

        assert_eq!(cloned.kind(), ErrorKind::Release);
        assert_eq!(cloned.deployment(), error.deployment());
        assert_eq!(cloned.to_string(), error.to_string());
    }

    #[test]
    fn recovery_follows_kind() {
        assert_eq!(Error::configuration(&id(), "x").recovery().kind(), RecoveryKind::Never);
        assert_eq!(Error::creation(&id(), "x").recovery().kind(), RecoveryKind::Retry);
        assert_eq!(Error::release(&id(), "x").recovery().kind(), RecoveryKind::Unknown);
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ErrorKind::Configuration.to_string(), "configuration");
        assert_eq!(ErrorKind::Creation.as_str(), "creation");
        assert_eq!(ErrorKind::Release.as_str(), "release");
    }
}
