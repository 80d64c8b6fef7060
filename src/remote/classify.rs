//! Transport failure classification.
//!
//! [`classify`] is total: every [`TransportError`] maps to exactly one
//! [`RemoteFailure`]. The sync passes and the scheduler decide retry and
//! backoff timing from the category alone.

use serde::Deserialize;

/// Raw failure reported by a remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportError {
    /// HTTP status, if a response was received.
    pub status: Option<u16>,
    /// Value of the `X-Rate-Limit-Remaining` header, if present.
    pub rate_limit_remaining: Option<String>,
    /// Response body or client-side error message.
    pub body: String,
    /// The request exceeded its deadline.
    pub timed_out: bool,
}

impl TransportError {
    /// A non-success HTTP response.
    #[must_use]
    pub fn http(status: u16, rate_limit_remaining: Option<&str>, body: &str) -> Self {
        Self {
            status: Some(status),
            rate_limit_remaining: rate_limit_remaining.map(str::to_string),
            body: body.to_string(),
            timed_out: false,
        }
    }

    /// A request that never produced a response in time.
    #[must_use]
    pub fn timeout(message: &str) -> Self {
        Self {
            body: message.to_string(),
            timed_out: true,
            ..Self::default()
        }
    }

    /// Connection failures, undecodable bodies and other client-side errors.
    #[must_use]
    pub fn client(message: &str) -> Self {
        Self {
            body: message.to_string(),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.status, self.timed_out) {
            (_, true) => write!(f, "request timed out: {}", self.body),
            (Some(status), false) => write!(f, "HTTP {status}: {}", self.body),
            (None, false) => write!(f, "{}", self.body),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            rate_limit_remaining: None,
            body: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }
}

/// Why Podio rejected a request with HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadRequestReason {
    InvalidSecret,
    InvalidUsername,
    InvalidClientId,
    InvalidPassword,
    /// Any other `error_detail` (usually a null or malformed query parameter).
    Other(String),
}

impl BadRequestReason {
    fn from_detail(detail: &str) -> Self {
        match detail {
            "oauth.client.invalid_secret" => Self::InvalidSecret,
            "user.invalid.username" => Self::InvalidUsername,
            "oauth.client.invalid_id" => Self::InvalidClientId,
            "user.invalid.password" => Self::InvalidPassword,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for BadRequestReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSecret => write!(f, "invalid client secret"),
            Self::InvalidUsername => write!(f, "invalid username"),
            Self::InvalidClientId => write!(f, "invalid client id"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::Other(detail) if detail.is_empty() => write!(f, "invalid request"),
            Self::Other(detail) => write!(f, "invalid request ({detail})"),
        }
    }
}

/// Outcome category of a failed remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// Hourly request quota exhausted.
    RateLimit,
    /// Access token expired or revoked.
    AuthExpired,
    /// Malformed request or invalid credentials.
    BadRequest(BadRequestReason),
    /// Upstream took too long.
    Timeout,
    /// Anything else.
    Unknown,
}

impl RemoteFailure {
    /// Stable snake_case name for logs and JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::AuthExpired => "auth_expired",
            Self::BadRequest(_) => "bad_request",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(reason) => write!(f, "bad_request: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Deserialize)]
struct PodioErrorBody {
    #[serde(default)]
    error_detail: Option<String>,
}

/// Classify a transport failure.
///
/// Precedence: exhausted quota (header `0`, or HTTP 420/429), then 401,
/// 400 (with sub-reason from the body's `error_detail`), then timeouts
/// (client deadline or HTTP 504). Everything else is `Unknown`.
#[must_use]
pub fn classify(err: &TransportError) -> RemoteFailure {
    let quota_exhausted = err
        .rate_limit_remaining
        .as_deref()
        .is_some_and(|remaining| remaining.trim() == "0");

    if quota_exhausted || matches!(err.status, Some(420 | 429)) {
        return RemoteFailure::RateLimit;
    }

    match err.status {
        Some(401) => RemoteFailure::AuthExpired,
        Some(400) => {
            let detail = serde_json::from_str::<PodioErrorBody>(&err.body)
                .ok()
                .and_then(|b| b.error_detail)
                .unwrap_or_default();
            RemoteFailure::BadRequest(BadRequestReason::from_detail(&detail))
        }
        Some(504) => RemoteFailure::Timeout,
        _ if err.timed_out => RemoteFailure::Timeout,
        _ => RemoteFailure::Unknown,
    }
}
