//! Interpretation of lettre errors raised mid-session.

use super::result::SmtpReply;
use crate::core::error::AppError;
use lettre::transport::smtp::Error as SmtpError;

/// Recovers the server reply carried by a negative-response error.
///
/// Returns `None` for errors that never reached a reply (I/O, TLS, parse failures).
pub(crate) fn reply_from_error(error: &SmtpError) -> Option<SmtpReply> {
    let code: u16 = error.status()?.to_string().parse().ok()?;
    Some(SmtpReply::new(code, error.to_string()))
}

/// Short human-readable classification of a failure that ended a host session.
pub(crate) fn describe_session_error(error: &AppError, server: &str) -> String {
    let err_string = error.to_string().to_lowercase();

    if err_string.contains("starttls")
        || (err_string.contains("530")
            && err_string.contains("5.7.0")
            && !err_string.contains("authentication required"))
    {
        tracing::warn!(target: "smtp_task", "{} appears to require STARTTLS: {}", server, error);
        return format!("server requires TLS: {}", error);
    }

    if err_string.contains("timed out")
        || err_string.contains("connection refused")
        || err_string.contains("network is unreachable")
    {
        tracing::error!(target: "smtp_task",
            "SMTP connection failed for {}: {}. Port 25 may be blocked.", server, error);
        return format!("connection failed: {}", error);
    }

    if err_string.contains("connection reset") || err_string.contains("broken pipe") {
        tracing::warn!(target: "smtp_task", "SMTP connection reset by {}: {}", server, error);
        return format!("connection reset by {}: {}", server, error);
    }

    tracing::error!(target: "smtp_task", "SMTP error for {}: {}", server, error);
    format!("smtp error: {}", error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_blocked_port() {
        let err = AppError::transport("mx.example.com", "Connection refused (os error 111)");
        assert!(describe_session_error(&err, "mx.example.com").starts_with("connection failed"));
    }

    #[test]
    fn test_describe_fallback() {
        let err = AppError::Timeout("host attempt".to_string());
        assert!(describe_session_error(&err, "mx.example.com").contains("timed out"));
    }
}
