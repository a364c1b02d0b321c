//! Response classification and retry timing

use cfproxy_cloud::{CloudError, RetryConfig};
use std::time::Duration;

/// Map a non-success HTTP status to an error; `None` for 2xx
pub(crate) fn classify_status(
    status: u16,
    retry_after: Option<u64>,
    message: String,
) -> Option<CloudError> {
    match status {
        200..=299 => None,
        401 | 403 => Some(CloudError::AuthenticationFailed { status, message }),
        429 => Some(CloudError::RateLimited {
            retry_after,
            message,
        }),
        _ => Some(CloudError::Http { status, message }),
    }
}

pub(crate) fn classify_transport(error: reqwest::Error) -> CloudError {
    if error.is_timeout() {
        CloudError::Timeout(error.to_string())
    } else {
        CloudError::Network(error.to_string())
    }
}

/// Delay before retry number `attempt` (zero-based)
///
/// `Retry-After` wins over the computed backoff but is capped at `max_delay`.
pub(crate) fn retry_delay(retry: &RetryConfig, error: &CloudError, attempt: u32) -> Duration {
    match error {
        CloudError::RateLimited {
            retry_after: Some(secs),
            ..
        } => Duration::from_secs(*secs).min(retry.max_delay),
        _ => retry.backoff(attempt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_not_an_error() {
        assert!(classify_status(200, None, String::new()).is_none());
        assert!(classify_status(204, None, String::new()).is_none());
    }

    #[test]
    fn test_auth_failures_are_terminal() {
        let err = classify_status(403, None, "forbidden".into()).unwrap();
        assert!(matches!(
            err,
            CloudError::AuthenticationFailed { status: 403, .. }
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_client_errors_are_terminal() {
        let err = classify_status(404, None, "not found".into()).unwrap();
        assert!(!err.is_transient());
        let err = classify_status(400, None, "bad request".into()).unwrap();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        let err = classify_status(429, Some(7), "slow down".into()).unwrap();
        assert!(err.is_transient());
        assert!(matches!(
            err,
            CloudError::RateLimited {
                retry_after: Some(7),
                ..
            }
        ));

        for status in [500, 502, 503, 504] {
            assert!(classify_status(status, None, String::new()).unwrap().is_transient());
        }
    }

    #[test]
    fn test_retry_after_is_honoured_and_capped() {
        let retry = RetryConfig::default();
        let limited = |secs| CloudError::RateLimited {
            retry_after: Some(secs),
            message: String::new(),
        };
        assert_eq!(retry_delay(&retry, &limited(3), 0), Duration::from_secs(3));
        assert_eq!(
            retry_delay(&retry, &limited(3600), 0),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_backoff_without_retry_after() {
        let retry = RetryConfig::default();
        let err = CloudError::Network("reset".into());
        assert_eq!(retry_delay(&retry, &err, 0), Duration::from_millis(500));
        assert_eq!(retry_delay(&retry, &err, 2), Duration::from_secs(2));
    }
}
