//! Response decoration: status and rate-limit headers derived from a [`Decision`].

use super::Decision;
use http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use http::StatusCode;

/// `X-RateLimit-Limit`
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// `X-RateLimit-Remaining`
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// `X-RateLimit-Reset`
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Header set for one response.
///
/// The three `X-RateLimit-*` headers go on every limited response; `Retry-After`
/// only on a 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds of the next bucket boundary.
    pub reset: u64,
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset: decision.reset_at,
            retry_after: if decision.allowed { None } else { decision.retry_after },
        }
    }

    /// `429 Too Many Requests` when denied, otherwise `200 OK`.
    ///
    /// Middleware leaves an allowed response's own status untouched; this is
    /// for callers that build responses themselves.
    pub fn status(&self) -> StatusCode {
        if self.retry_after.is_some() {
            StatusCode::TOO_MANY_REQUESTS
        } else {
            StatusCode::OK
        }
    }

    /// Insert (replacing) the headers into `headers`.
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset));
        match self.retry_after {
            Some(secs) => {
                headers.insert(RETRY_AFTER, HeaderValue::from(secs));
            }
            None => {
                headers.remove(RETRY_AFTER);
            }
        }
    }

    /// Canonically cased name/value pairs, for non-`http` transports.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset.to_string()),
        ];
        if let Some(secs) = self.retry_after {
            pairs.push(("Retry-After", secs.to_string()));
        }
        pairs
    }
}

impl From<&Decision> for RateLimitHeaders {
    fn from(decision: &Decision) -> Self {
        Self::from_decision(decision)
    }
}
