//! Transient-error classification
//!
//! Classification is pure: an error code and a set of known retryable codes
//! in, a verdict out. The evaluation functions handed to the poller are built
//! from it here so every step classifies the same way.

use crate::error::ApiError;
use crate::wait::PollOutcome;
use ecs_imager_common::{ResourceStatus, RetryCodes};

use super::types::{Image, Instance, VSwitch, Vpc};

/// Verdict for a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

/// Classify a provider error code against a retryable set.
///
/// A missing code means the request never got a service answer (transport or
/// decode failure), which is always worth another attempt.
pub fn classify(code: Option<&str>, retryable: &RetryCodes) -> ErrorClass {
    match code {
        None => ErrorClass::Retryable,
        Some(c) if retryable.contains(c) => ErrorClass::Retryable,
        Some(_) => ErrorClass::Fatal,
    }
}

fn outcome_for(error: &ApiError, retryable: &RetryCodes) -> PollOutcome {
    match classify(error.code(), retryable) {
        ErrorClass::Retryable => PollOutcome::Retry,
        ErrorClass::Fatal => PollOutcome::Fail,
    }
}

/// Evaluation for create-class and delete-class calls: success on `Ok`,
/// retry on codes in `codes`, fail on anything else.
pub fn retry_on<T>(codes: &RetryCodes) -> impl FnMut(&Result<T, ApiError>) -> PollOutcome + '_ {
    move |result| match result {
        Ok(_) => PollOutcome::Succeed,
        Err(e) => outcome_for(e, codes),
    }
}

/// Resources whose provider status the builder waits on
pub trait HasStatus {
    fn status(&self) -> &str;
}

impl HasStatus for Vpc {
    fn status(&self) -> &str {
        &self.status
    }
}

impl HasStatus for VSwitch {
    fn status(&self) -> &str {
        &self.status
    }
}

impl HasStatus for Instance {
    fn status(&self) -> &str {
        &self.status
    }
}

impl HasStatus for Image {
    fn status(&self) -> &str {
        &self.status
    }
}

/// Evaluation for status waits on a describe-by-id call.
///
/// A resource missing from the response is still propagating and is retried.
/// Service errors are fatal; transport errors are retried.
pub fn until_status<T: HasStatus>(
    expected: ResourceStatus,
) -> impl FnMut(&Result<Option<T>, ApiError>) -> PollOutcome {
    let no_codes = RetryCodes::default();
    move |result| match result {
        Ok(Some(resource)) if expected.matches(resource.status()) => PollOutcome::Succeed,
        Ok(_) => PollOutcome::Retry,
        Err(e) => outcome_for(e, &no_codes),
    }
}

/// Evaluation for a describe-by-id call that only needs the resource to exist
pub fn until_found<T>() -> impl FnMut(&Result<Option<T>, ApiError>) -> PollOutcome {
    let no_codes = RetryCodes::default();
    move |result| match result {
        Ok(Some(_)) => PollOutcome::Succeed,
        Ok(None) => PollOutcome::Retry,
        Err(e) => outcome_for(e, &no_codes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecs_imager_common::retry_codes::{VSWITCH_CREATE_RETRY, VSWITCH_DELETE_RETRY};

    #[test]
    fn test_classify_known_and_unknown_codes() {
        let create = RetryCodes::from_table(VSWITCH_CREATE_RETRY);
        assert_eq!(
            classify(Some("TOKEN_PROCESSING"), &create),
            ErrorClass::Retryable
        );
        assert_eq!(
            classify(Some("InvalidCidrBlock.Overlapped"), &create),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_same_code_differs_by_direction() {
        let create = RetryCodes::from_table(VSWITCH_CREATE_RETRY);
        let delete = RetryCodes::from_table(VSWITCH_DELETE_RETRY);
        assert_eq!(
            classify(Some("DependencyViolation"), &create),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify(Some("DependencyViolation"), &delete),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn test_missing_code_is_retryable() {
        assert_eq!(
            classify(None, &RetryCodes::default()),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn test_retry_on_maps_results() {
        let codes = RetryCodes::from_table(&["TaskConflict"]);
        let mut eval = retry_on::<()>(&codes);
        assert_eq!(eval(&Ok(())), PollOutcome::Succeed);
        assert_eq!(
            eval(&Err(ApiError::service("TaskConflict", ""))),
            PollOutcome::Retry
        );
        assert_eq!(
            eval(&Err(ApiError::service("Forbidden.RAM", ""))),
            PollOutcome::Fail
        );
        assert_eq!(
            eval(&Err(ApiError::Transport("reset".to_string()))),
            PollOutcome::Retry
        );
    }

    #[test]
    fn test_until_status() {
        let image = |status: &str| Image {
            image_id: "m-1".to_string(),
            image_name: "my-image".to_string(),
            status: status.to_string(),
        };
        let mut eval = until_status::<Image>(ResourceStatus::Available);
        assert_eq!(eval(&Ok(Some(image("Creating")))), PollOutcome::Retry);
        assert_eq!(eval(&Ok(None)), PollOutcome::Retry);
        assert_eq!(eval(&Ok(Some(image("Available")))), PollOutcome::Succeed);
        assert_eq!(
            eval(&Err(ApiError::service("InvalidImageId.NotFound", ""))),
            PollOutcome::Fail
        );
    }

    #[test]
    fn test_until_found_ignores_status() {
        let mut eval = until_found::<Image>();
        let image = Image {
            image_id: "m-1".to_string(),
            image_name: "my-image".to_string(),
            status: "Creating".to_string(),
        };
        assert_eq!(eval(&Ok(Some(image))), PollOutcome::Succeed);
        assert_eq!(eval(&Ok(None)), PollOutcome::Retry);
    }
}
