//! VCS-host error types.
//!
//! Host failures fall into three buckets that the core treats differently:
//!
//! - **NotFound**: the resource no longer exists. Absorbed as benign wherever
//!   the error-handling policy says so (missing branch protection, already
//!   deleted refs).
//! - **Transient**: 5xx, rate limits, network-level failures. The affected
//!   pull is left for reconsideration on a future event; nothing retries
//!   inline.
//! - **Permanent**: everything else.

use std::fmt;

use thiserror::Error;

/// Categorization of a host API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorKind {
    /// The resource does not exist (HTTP 404).
    NotFound,

    /// Likely to succeed on a later attempt (5xx, rate limit, network).
    Transient,

    /// Requires a state change or human intervention.
    Permanent,
}

/// A VCS-host API error.
#[derive(Debug, Error)]
pub struct HostError {
    /// The failure category.
    pub kind: HostErrorKind,

    /// The HTTP status code, if one could be determined.
    pub status_code: Option<u16>,

    /// Human-readable description.
    pub message: String,

    /// The underlying octocrab error, if any.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "host API error (HTTP {}): {}", code, self.message),
            None => write!(f, "host API error: {}", self.message),
        }
    }
}

impl HostError {
    /// Returns true if the failure means "resource no longer exists".
    pub fn is_not_found(&self) -> bool {
        self.kind == HostErrorKind::NotFound
    }

    /// Creates a not-found error without an underlying source.
    pub fn not_found(message: impl Into<String>) -> Self {
        HostError {
            kind: HostErrorKind::NotFound,
            status_code: Some(404),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a permanent error without an underlying source.
    pub fn permanent(message: impl Into<String>) -> Self {
        HostError {
            kind: HostErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transient error without an underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        HostError {
            kind: HostErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Categorizes an octocrab error.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = extract_status_code(&err);
        let message = err.to_string();

        let kind = match status_code {
            Some(404) => HostErrorKind::NotFound,
            Some(429) => HostErrorKind::Transient,
            Some(403) if is_rate_limit_message(&message) => HostErrorKind::Transient,
            Some(code) if (500..600).contains(&code) => HostErrorKind::Transient,
            Some(_) => HostErrorKind::Permanent,
            None => {
                if is_network_message(&message) {
                    HostErrorKind::Transient
                } else {
                    HostErrorKind::Permanent
                }
            }
        };

        HostError {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }
}

/// Extracts the HTTP status code from an octocrab error, if present.
///
/// octocrab's `Error` doesn't expose a stable status accessor across all
/// variants, so this falls back to message patterns. Returning `None` is
/// safe: it results in conservative categorization above.
fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
    status_code_from_message(&err.to_string())
}

fn status_code_from_message(message: &str) -> Option<u16> {
    if let Some(idx) = message.find("status: ") {
        let rest = &message[idx + 8..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(code) = digits.parse() {
            return Some(code);
        }
    }

    // Bare digit matches are ambiguous: a commit SHA or URL in the message
    // can contain "404". The codes with benign handling downstream must also
    // carry their reason phrase before they are believed.
    let lower = message.to_lowercase();
    if lower.contains("404") && lower.contains("not found") {
        return Some(404);
    }
    if lower.contains("409") && lower.contains("conflict") {
        return Some(409);
    }
    for code in [422u16, 403, 401, 429, 500, 502, 503] {
        if lower.contains(&code.to_string()) {
            return Some(code);
        }
    }

    None
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit")
        || message.contains("api rate")
        || message.contains("secondary rate")
        || message.contains("abuse detection")
}

/// Checks if an error message indicates a network-level failure.
fn is_network_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("timeout")
        || message.contains("connection")
        || message.contains("network")
        || message.contains("dns")
        || message.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limit_message("API rate limit exceeded"));
        assert!(is_rate_limit_message("secondary rate limit hit"));
        assert!(!is_rate_limit_message("Permission denied"));
    }

    #[test]
    fn network_detection() {
        assert!(is_network_message("connection refused"));
        assert!(is_network_message("request timed out"));
        assert!(!is_network_message("Not found"));
    }

    #[test]
    fn not_found_is_benign() {
        let err = HostError::not_found("ref heads/merge-queue/bp/main/1 not found");
        assert!(err.is_not_found());
        assert_eq!(err.status_code, Some(404));
    }

    #[test]
    fn constructors_set_kind() {
        assert_eq!(HostError::transient("x").kind, HostErrorKind::Transient);
        assert_eq!(HostError::permanent("x").kind, HostErrorKind::Permanent);
    }

    #[test]
    fn explicit_status_segment_wins() {
        assert_eq!(
            status_code_from_message("GitHub error, status: 422, message: Validation Failed"),
            Some(422)
        );
    }

    #[test]
    fn bare_404_needs_a_not_found_phrase() {
        // A SHA or URL containing "404" must not read as "resource gone".
        assert_eq!(
            status_code_from_message(
                "PUT .../branches/main/protection: commit 404fab9 Validation Failed (422)"
            ),
            Some(422)
        );
        assert_eq!(
            status_code_from_message("GET .../pulls/9: Not Found (404)"),
            Some(404)
        );
        assert_eq!(status_code_from_message("digest 404deadbeef"), None);
    }

    #[test]
    fn bare_409_needs_a_conflict_phrase() {
        assert_eq!(status_code_from_message("merge: 409 Conflict"), Some(409));
        assert_eq!(status_code_from_message("ref at 409abc"), None);
    }
}
