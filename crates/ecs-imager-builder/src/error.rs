//! Error types for the image build
//!
//! Three layers: [`ApiError`] is what a single provider call returns,
//! [`PollError`] is what the poller reports once it stops retrying, and
//! [`BuildError`] is what a pipeline step hands back to the runner.

use crate::config::ConfigError;
use ecs_imager_common::ResourceKind;
use ecs_imager_common::retry_codes::is_no_stock;
use std::time::Duration;
use thiserror::Error;

/// Error from a single provider API call
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The service rejected the request with an error code
    #[error("{code}: {message} (request id: {request_id})")]
    Service {
        code: String,
        message: String,
        request_id: String,
    },

    /// The request never produced a service response
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request could not be signed
    #[error("failed to sign request: {0}")]
    Signing(String),
}

impl ApiError {
    /// Build a service error from a code and message
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Service {
            code: code.into(),
            message: message.into(),
            request_id: String::new(),
        }
    }

    /// Provider error code, if the service produced one
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Check if this error reports a missing resource
    pub fn is_not_found(&self) -> bool {
        self.code().is_some_and(|c| c.ends_with(".NotFound"))
    }

    /// Check if this error reports exhausted zone capacity
    pub fn is_no_stock(&self) -> bool {
        self.code().is_some_and(is_no_stock)
    }
}

/// Convert a not-found error into `Ok(None)`
///
/// Cleanup deletes resources that may already be gone; that is success.
pub fn ignore_not_found<T>(result: Result<T, ApiError>) -> Result<Option<T>, ApiError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Why the poller stopped without the expected outcome
#[derive(Debug, Error)]
pub enum PollError {
    /// The evaluation function classified the error as fatal
    #[error("{what} failed: {source}")]
    Rejected {
        what: String,
        #[source]
        source: ApiError,
    },

    /// The call succeeded but the evaluation function rejected the response
    #[error("{what} reached an unexpected state")]
    Unexpected { what: String },

    /// Attempt ceiling reached while still retrying
    #[error("{what}: evaluate failed after {attempts} attempts")]
    Exhausted {
        what: String,
        attempts: u32,
        #[source]
        last_error: Option<ApiError>,
    },

    /// Wall-clock limit reached while still retrying
    #[error("timed out waiting for {what} after {elapsed:?} ({attempts} attempts)")]
    TimedOut {
        what: String,
        elapsed: Duration,
        attempts: u32,
    },

    /// Cancelled by the caller
    #[error("wait for {what} cancelled")]
    Cancelled { what: String },
}

impl PollError {
    /// The provider error behind this failure, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            PollError::Rejected { source, .. } => Some(source),
            PollError::Exhausted { last_error, .. } => last_error.as_ref(),
            _ => None,
        }
    }

    /// Check if the underlying provider error reports exhausted capacity
    pub fn is_no_stock(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_no_stock)
    }
}

/// Errors returned by pipeline steps
#[derive(Debug, Error)]
pub enum BuildError {
    /// Target image name is already taken
    ///
    /// Not a crash: the caller may treat it as "nothing to build".
    #[error("image '{name}' already exists; use force_delete to replace it")]
    ImageAlreadyExists { name: String },

    /// Source or destination regions not offered by the provider
    #[error("invalid region(s): {}", .0.join(", "))]
    InvalidRegions(Vec<String>),

    /// A user-pinned resource could not be located
    #[error("{} '{id}' not found", .kind.display_name())]
    PinnedResourceNotFound { kind: ResourceKind, id: String },

    /// A user-pinned ID matched more than one resource
    #[error("{} '{id}' matched {count} resources", .kind.display_name())]
    AmbiguousResource {
        kind: ResourceKind,
        id: String,
        count: usize,
    },

    /// No zone currently sells the requested instance type
    #[error("no available zone offers instance type '{instance_type}'")]
    NoCandidateZones { instance_type: String },

    /// Every candidate zone was tried and none produced a ready resource
    #[error("failed to create {} in any of the zones [{}]", .kind.display_name(), .zones.join(", "))]
    ZonesExhausted {
        kind: ResourceKind,
        zones: Vec<String>,
        #[source]
        last_error: Option<Box<BuildError>>,
    },

    /// A step ran before the step that produces its input
    #[error("missing build state: {0}")]
    MissingState(&'static str),

    /// Provisioner reported a failure
    #[error("provisioning failed: {0}")]
    Provision(#[source] anyhow::Error),

    /// Build was cancelled between steps
    #[error("build cancelled")]
    Cancelled,

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BuildError {
    /// True for the benign "image already exists" early exit
    pub fn is_sentinel(&self) -> bool {
        matches!(self, BuildError::ImageAlreadyExists { .. })
    }

    /// True when the build was cancelled, between steps or mid-wait
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            BuildError::Cancelled | BuildError::Poll(PollError::Cancelled { .. })
        )
    }

    /// Check if this failure was caused by exhausted zone capacity
    pub fn is_no_stock(&self) -> bool {
        match self {
            BuildError::Poll(e) => e.is_no_stock(),
            BuildError::Api(e) => e.is_no_stock(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let err = ApiError::Service {
            code: "InvalidVSwitchId.NotFound".to_string(),
            message: "The specified vswitch does not exist".to_string(),
            request_id: "6B0A1F".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "InvalidVSwitchId.NotFound: The specified vswitch does not exist (request id: 6B0A1F)"
        );
        assert!(err.is_not_found());
        assert_eq!(err.code(), Some("InvalidVSwitchId.NotFound"));
    }

    #[test]
    fn test_transport_error_has_no_code() {
        let err = ApiError::Transport("connection reset".to_string());
        assert!(err.code().is_none());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_ignore_not_found() {
        let gone: Result<(), ApiError> = Err(ApiError::service("InvalidInstanceId.NotFound", ""));
        assert!(ignore_not_found(gone).unwrap().is_none());

        let busy: Result<(), ApiError> = Err(ApiError::service("DependencyViolation", ""));
        assert!(ignore_not_found(busy).is_err());

        assert_eq!(ignore_not_found(Ok::<_, ApiError>(7)).unwrap(), Some(7));
    }

    #[test]
    fn test_sentinel_detection() {
        let sentinel = BuildError::ImageAlreadyExists {
            name: "my-image".to_string(),
        };
        assert!(sentinel.is_sentinel());
        assert!(sentinel.to_string().contains("my-image"));
        assert!(!BuildError::Cancelled.is_sentinel());
    }

    #[test]
    fn test_no_stock_through_poll_error() {
        let err = BuildError::from(PollError::Rejected {
            what: "create instance".to_string(),
            source: ApiError::service("OperationDenied.NoStock", "sold out"),
        });
        assert!(err.is_no_stock());

        let err = BuildError::from(PollError::Exhausted {
            what: "create instance".to_string(),
            attempts: 3,
            last_error: None,
        });
        assert!(!err.is_no_stock());
    }

    #[test]
    fn test_zones_exhausted_display() {
        let err = BuildError::ZonesExhausted {
            kind: ResourceKind::VSwitch,
            zones: vec!["cn-hangzhou-a".to_string(), "cn-hangzhou-b".to_string()],
            last_error: None,
        };
        assert_eq!(
            err.to_string(),
            "failed to create vswitch in any of the zones [cn-hangzhou-a, cn-hangzhou-b]"
        );
    }
}
