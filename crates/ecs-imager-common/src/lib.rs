//! ecs-imager-common - Shared types and constants
//!
//! Provider-facing vocabulary that both the build pipeline and its tests
//! rely on, kept free of any HTTP or runtime dependencies.
//!
//! ## Modules
//!
//! - [`defaults`]: Default retry ceilings, wait timeouts and address blocks
//! - [`resource_kind`]: The kinds of cloud resources a build touches
//! - [`retry_codes`]: Retryable error code tables per resource and direction
//! - [`status`]: Provider status strings for terminal and transitional states
//! - [`tags`]: Tag keys stamped on every resource a build creates

pub mod defaults;
pub mod resource_kind;
pub mod retry_codes;
pub mod status;
pub mod tags;

// Re-export commonly used types
pub use resource_kind::ResourceKind;
pub use retry_codes::{OperationCodes, RetryCodes, RetryPolicy};
pub use status::ResourceStatus;
