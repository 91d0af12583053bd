//! Default configuration values
//!
//! These mirror the provider SDK's own waiter defaults so a build template
//! without a `retry` section behaves like the stock tooling.

/// Default number of attempts for create/delete calls and status waits
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 12;

/// Attempt ceiling for waits that are expected to settle quickly
pub const SHORT_RETRY_ATTEMPTS: u32 = 3;

/// Default interval between attempts, in seconds
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// Default time to wait for an instance to reach a power state (10 minutes)
pub const DEFAULT_INSTANCE_WAIT_SECS: u64 = 600;

/// Default time to wait for an image to become available (1 hour)
pub const DEFAULT_IMAGE_WAIT_SECS: u64 = 3600;

/// Address block for a VPC created by the builder
pub const DEFAULT_VPC_CIDR_BLOCK: &str = "172.16.0.0/16";

/// Address block for a vswitch created by the builder
pub const DEFAULT_VSWITCH_CIDR_BLOCK: &str = "172.16.0.0/24";

/// Default internet charge type for instances
pub const DEFAULT_INTERNET_CHARGE_TYPE: &str = "PayByTraffic";

/// Port opened on security groups created by the builder
pub const SSH_PORT: u16 = 22;

// Serde default functions for struct field defaults

/// Returns the default retry attempt ceiling
pub fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

/// Returns the short retry attempt ceiling
pub fn default_short_retry_attempts() -> u32 {
    SHORT_RETRY_ATTEMPTS
}

/// Returns the default retry interval
pub fn default_retry_interval_secs() -> u64 {
    DEFAULT_RETRY_INTERVAL_SECS
}

/// Returns the default instance wait timeout
pub fn default_instance_wait_secs() -> u64 {
    DEFAULT_INSTANCE_WAIT_SECS
}

/// Returns the default image wait timeout
pub fn default_image_wait_secs() -> u64 {
    DEFAULT_IMAGE_WAIT_SECS
}

/// Returns the default internet charge type
pub fn default_internet_charge_type() -> String {
    DEFAULT_INTERNET_CHARGE_TYPE.to_string()
}
