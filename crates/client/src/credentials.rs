//! Credential record and OAuth token-endpoint wire types
//!
//! A [`Credentials`] record is either empty (serializes to `{}`) or fully
//! populated from one successful token exchange; it is never partially
//! populated. The record is rewritten wholesale on refresh and cleared to
//! empty on an irrecoverable refresh failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Safety margin subtracted from `expires_in` when computing the absolute
/// expiry, so a token is never presented in its final moments of validity.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 5;

/// Durable token set for one Uplink account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Short-lived bearer credential authorizing resource calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Longer-lived credential exchanged for a new access token without
    /// re-authorization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry (`issued_at + expires_in - 5s`). Present whenever
    /// `access_token` is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes, space-separated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// When the token set was obtained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Whether this record holds no token at all (the `{}` state).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
    }

    /// Whether the access token has passed its expiry.
    ///
    /// An absent expiry counts as expired: a record carrying a token without
    /// one violates the population invariant and must not be trusted.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => true,
        }
    }
}

/// Token response from `POST /oauth/token` (RFC 6749).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Issued access token.
    pub access_token: String,
    /// Issued refresh token, when the grant yields one.
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Granted scopes.
    pub scope: Option<String>,
    /// Always `bearer` for this API.
    pub token_type: Option<String>,
}

impl From<TokenResponse> for Credentials {
    fn from(response: TokenResponse) -> Self {
        let issued_at = Utc::now();
        let expires_at =
            issued_at + chrono::Duration::seconds(response.expires_in - EXPIRY_SAFETY_MARGIN_SECS);

        Self {
            access_token: Some(response.access_token),
            refresh_token: response.refresh_token,
            expires_at: Some(expires_at),
            scope: response.scope,
            issued_at: Some(issued_at),
        }
    }
}
