use serde::Serialize;

use crate::error::{ErrorKind, ServiceError, Severity};

/// Codes that never succeed on a second try.
pub const NON_RETRYABLE_CODES: [&str; 5] = [
    "ECONNREFUSED",
    "ETIMEDOUT",
    "ENOTFOUND",
    "AUTH_ERROR",
    "CRITICAL_FAILURE",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub message: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub severity: Severity,
}

/// Map a failure to its kind and severity.
pub fn classify(error: &ServiceError) -> ErrorInfo {
    let root = error.root();
    let (kind, severity) = match root {
        ServiceError::Connection { .. } => (ErrorKind::Connection, Severity::High),
        ServiceError::Http { status, .. } => match *status {
            401 | 403 => (ErrorKind::Auth, Severity::Critical),
            429 => (ErrorKind::RateLimit, Severity::Medium),
            s if s >= 500 => (ErrorKind::Api, Severity::High),
            _ => (ErrorKind::Unknown, Severity::Low),
        },
        ServiceError::Validation { .. } => (ErrorKind::Validation, Severity::Low),
        ServiceError::Timeout { .. } => (ErrorKind::Timeout, Severity::Medium),
        ServiceError::RateLimited { .. } => (ErrorKind::RateLimit, Severity::Medium),
        ServiceError::CircuitOpen => (ErrorKind::Api, Severity::High),
        ServiceError::Failure { code, critical, .. } => match code.as_deref() {
            Some("AUTH_ERROR") => (ErrorKind::Auth, Severity::Critical),
            _ if *critical => (ErrorKind::Unknown, Severity::Critical),
            _ => (ErrorKind::Unknown, Severity::Low),
        },
        // root() never returns an Exhausted
        ServiceError::Exhausted { .. } => (ErrorKind::Unknown, Severity::Low),
    };

    ErrorInfo {
        message: error.to_string(),
        code: error.code(),
        kind,
        severity,
    }
}

pub fn is_non_retryable(error: &ServiceError) -> bool {
    let code = error.code();
    NON_RETRYABLE_CODES.contains(&code.as_str())
        || error.is_flagged_critical()
        || classify(error).severity == Severity::Critical
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn kind_and_severity(error: ServiceError) -> (ErrorKind, Severity) {
        let info = classify(&error);
        (info.kind, info.severity)
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(kind_and_severity(ServiceError::http(401, "no")), (ErrorKind::Auth, Severity::Critical));
        assert_eq!(kind_and_severity(ServiceError::http(403, "no")), (ErrorKind::Auth, Severity::Critical));
        assert_eq!(kind_and_severity(ServiceError::http(429, "slow")), (ErrorKind::RateLimit, Severity::Medium));
        assert_eq!(kind_and_severity(ServiceError::http(502, "bad gw")), (ErrorKind::Api, Severity::High));
        assert_eq!(kind_and_severity(ServiceError::http(404, "gone")), (ErrorKind::Unknown, Severity::Low));
    }

    #[test]
    fn test_other_mappings() {
        assert_eq!(
            kind_and_severity(ServiceError::connection("ECONNRESET", "reset")),
            (ErrorKind::Connection, Severity::High)
        );
        assert_eq!(
            kind_and_severity(ServiceError::Validation { errors: vec!["x".into()] }),
            (ErrorKind::Validation, Severity::Low)
        );
        assert_eq!(
            kind_and_severity(ServiceError::Timeout { after: Duration::from_secs(1) }),
            (ErrorKind::Timeout, Severity::Medium)
        );
        assert_eq!(kind_and_severity(ServiceError::failure("boom")), (ErrorKind::Unknown, Severity::Low));
    }

    #[test]
    fn test_info_carries_message_and_code() {
        let info = classify(&ServiceError::http(503, "upstream down"));
        assert_eq!(info.code, "HTTP_503");
        assert_eq!(info.message, "HTTP 503: upstream down");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "api");
        assert_eq!(json["severity"], "high");
    }

    #[test]
    fn test_non_retryable() {
        assert!(is_non_retryable(&ServiceError::connection("ECONNREFUSED", "refused")));
        assert!(is_non_retryable(&ServiceError::connection("ENOTFOUND", "dns")));
        assert!(is_non_retryable(&ServiceError::http(401, "unauthorized")));
        assert!(is_non_retryable(&ServiceError::critical("DISK", "full")));
        assert!(is_non_retryable(&ServiceError::coded("AUTH_ERROR", "bad key")));

        assert!(!is_non_retryable(&ServiceError::connection("ECONNRESET", "reset")));
        assert!(!is_non_retryable(&ServiceError::http(503, "unavailable")));
        assert!(!is_non_retryable(&ServiceError::failure("flaky")));
    }
}
