//! Error taxonomy for the Uplink client
//!
//! A closed set of error kinds so callers can branch exhaustively instead of
//! string-matching. Lifecycle-internal failures (`TokenExchangeFailed`,
//! `TokenRefreshFailed`) are absorbed and retried across strategies inside
//! [`TokenLifecycle`](crate::lifecycle::TokenLifecycle); everything else
//! surfaces to the caller as-is.

use thiserror::Error;

/// Errors produced by the Uplink client.
#[derive(Debug, Error)]
pub enum Error {
    /// Construction-time validation failure. Aggregates every violated
    /// constraint into a single message rather than failing on the first.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No usable authentication path remains. Terminal for the current call:
    /// the operator must obtain a new authorization code out-of-band at the
    /// carried URL and reconstruct the client.
    #[error("need new authCode, go to {authorize_url}")]
    AuthorizationRequired {
        /// Ready-to-use `/oauth/authorize` URL for the human operator.
        authorize_url: String,
    },

    /// Exchanging the single-use authorization code failed. The code is never
    /// retried; a repeat attempt would also fail.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Refreshing the access token failed.
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// Upstream returned a non-success status.
    #[error("{status} {detail}")]
    Http {
        /// HTTP status code of the response.
        status: u16,
        /// Classified detail text, best-effort extracted from the error body.
        detail: String,
    },

    /// Network-level failure (connection refused, reset, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A 2xx response body did not match the expected shape of a typed helper.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Whether this is an explicit `401 Unauthorized` classification.
    ///
    /// The lifecycle swallows (but logs) unauthorized probe failures, since
    /// they are the expected signal for a stale access token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http { status: 401, .. })
    }
}
