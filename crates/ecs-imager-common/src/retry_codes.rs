//! Retryable provider error codes
//!
//! The same resource shows different transient states depending on the
//! direction of the operation, so create-class and delete-class calls carry
//! separate code sets. A [`RetryPolicy`] is built once per build and handed to
//! each step; nothing here is mutable shared state.

use crate::ResourceKind;
use std::collections::BTreeSet;

/// VSwitch creation is still settling an earlier request with the same token
pub const VSWITCH_CREATE_RETRY: &[&str] = &["TOKEN_PROCESSING"];

/// VSwitch deletion blocked by attached resources or in-flight route changes
pub const VSWITCH_DELETE_RETRY: &[&str] = &[
    "IncorrectVSwitchStatus",
    "DependencyViolation",
    "DependencyViolation.HaVip",
    "IncorrectRouteEntryStatus",
    "TaskConflict",
];

/// VPC creation is still settling an earlier request with the same token
pub const VPC_CREATE_RETRY: &[&str] = &["TOKEN_PROCESSING"];

/// VPC deletion blocked while dependants are released
pub const VPC_DELETE_RETRY: &[&str] = &[
    "DependencyViolation.Instance",
    "DependencyViolation.RouteEntry",
    "DependencyViolation.VSwitch",
    "DependencyViolation.SecurityGroup",
    "Forbbiden",
    "TaskConflict",
];

/// Security group creation still being processed
pub const SECURITY_GROUP_CREATE_RETRY: &[&str] = &["IdempotentProcessing"];

/// Security group still referenced by an instance being released
pub const SECURITY_GROUP_DELETE_RETRY: &[&str] = &["DependencyViolation"];

/// Instance creation still being processed
pub const INSTANCE_CREATE_RETRY: &[&str] = &["IdempotentProcessing"];

/// Instance cannot be deleted while it is still initializing
pub const INSTANCE_DELETE_RETRY: &[&str] = &["IncorrectInstanceStatus.Initializing"];

/// Start/stop rejected while the instance is between states
pub const INSTANCE_POWER_RETRY: &[&str] = &["IncorrectInstanceStatus"];

/// Image creation still being processed
pub const IMAGE_CREATE_RETRY: &[&str] = &["IdempotentProcessing"];

/// Image deletion rejected while a copy or share is still in progress
pub const IMAGE_DELETE_RETRY: &[&str] = &["IncorrectImageStatus"];

/// Rate limiting and service hiccups, retryable for every operation
pub const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "Throttling.User",
    "ServiceUnavailable",
    "InternalError",
];

/// Capacity exhaustion that triggers the zone fallback path
pub const NO_STOCK_CODES: &[&str] = &[
    "OperationDenied.NoStock",
    "Zone.NotOnSale",
    "InvalidResourceType.NotSupported",
];

/// Check whether an error code reports exhausted capacity in a zone
pub fn is_no_stock(code: &str) -> bool {
    NO_STOCK_CODES.contains(&code)
}

/// An immutable set of error codes that mean "try again"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryCodes(BTreeSet<String>);

impl RetryCodes {
    /// Build a code set from a static table
    pub fn from_table(codes: &[&str]) -> Self {
        Self(codes.iter().map(|c| (*c).to_string()).collect())
    }

    /// Check whether `code` is retryable, including throttling codes
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code) || THROTTLING_CODES.contains(&code)
    }

    /// Return a copy with extra codes added
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(extra.into_iter().map(Into::into));
        self
    }

    /// Number of explicitly listed codes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when only throttling codes apply
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Create-class and delete-class code sets for one resource kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationCodes {
    pub create: RetryCodes,
    pub delete: RetryCodes,
}

impl OperationCodes {
    fn from_tables(create: &[&str], delete: &[&str]) -> Self {
        Self {
            create: RetryCodes::from_table(create),
            delete: RetryCodes::from_table(delete),
        }
    }
}

/// Retry code sets for every resource kind a build touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub vpc: OperationCodes,
    pub vswitch: OperationCodes,
    pub security_group: OperationCodes,
    pub instance: OperationCodes,
    pub image: OperationCodes,
    /// Codes retried when starting or stopping an instance
    pub instance_power: RetryCodes,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            vpc: OperationCodes::from_tables(VPC_CREATE_RETRY, VPC_DELETE_RETRY),
            vswitch: OperationCodes::from_tables(VSWITCH_CREATE_RETRY, VSWITCH_DELETE_RETRY),
            security_group: OperationCodes::from_tables(
                SECURITY_GROUP_CREATE_RETRY,
                SECURITY_GROUP_DELETE_RETRY,
            ),
            instance: OperationCodes::from_tables(INSTANCE_CREATE_RETRY, INSTANCE_DELETE_RETRY),
            image: OperationCodes::from_tables(IMAGE_CREATE_RETRY, IMAGE_DELETE_RETRY),
            instance_power: RetryCodes::from_table(INSTANCE_POWER_RETRY),
        }
    }
}

impl RetryPolicy {
    /// Code sets for a resource kind
    pub fn for_kind(&self, kind: ResourceKind) -> &OperationCodes {
        match kind {
            ResourceKind::Vpc => &self.vpc,
            ResourceKind::VSwitch => &self.vswitch,
            ResourceKind::SecurityGroup => &self.security_group,
            ResourceKind::Instance => &self.instance,
            ResourceKind::Image => &self.image,
        }
    }

    /// Add extra create and delete codes for one resource kind
    pub fn extend(&mut self, kind: ResourceKind, create: &[String], delete: &[String]) {
        let codes = match kind {
            ResourceKind::Vpc => &mut self.vpc,
            ResourceKind::VSwitch => &mut self.vswitch,
            ResourceKind::SecurityGroup => &mut self.security_group,
            ResourceKind::Instance => &mut self.instance,
            ResourceKind::Image => &mut self.image,
        };
        codes.create = std::mem::take(&mut codes.create).with_extra(create.iter().cloned());
        codes.delete = std::mem::take(&mut codes.delete).with_extra(delete.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_delete_sets_differ() {
        let policy = RetryPolicy::default();
        let vsw = policy.for_kind(ResourceKind::VSwitch);
        assert!(vsw.create.contains("TOKEN_PROCESSING"));
        assert!(!vsw.create.contains("DependencyViolation"));
        assert!(vsw.delete.contains("DependencyViolation"));
        assert!(!vsw.delete.contains("TOKEN_PROCESSING"));
    }

    #[test]
    fn test_throttling_always_retryable() {
        let empty = RetryCodes::default();
        assert!(empty.is_empty());
        assert!(empty.contains("Throttling"));
        assert!(!empty.contains("InvalidParameter"));
    }

    #[test]
    fn test_extend_adds_codes_for_one_kind() {
        let mut policy = RetryPolicy::default();
        policy.extend(
            ResourceKind::Instance,
            &["QuotaExceed.Temporary".to_string()],
            &[],
        );
        assert!(policy.instance.create.contains("QuotaExceed.Temporary"));
        assert!(policy.instance.create.contains("IdempotentProcessing"));
        assert!(!policy.vswitch.create.contains("QuotaExceed.Temporary"));
        assert_eq!(policy.instance.delete.len(), INSTANCE_DELETE_RETRY.len());
    }

    #[test]
    fn test_no_stock_codes() {
        assert!(is_no_stock("OperationDenied.NoStock"));
        assert!(!is_no_stock("IdempotentProcessing"));
    }
}
