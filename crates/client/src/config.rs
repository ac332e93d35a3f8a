//! Client configuration
//!
//! [`ClientConfig`] is immutable after construction. Validation runs once in
//! the builder and aggregates every violated constraint into a single
//! [`Error::Configuration`](crate::Error::Configuration) message, so the
//! operator sees all problems at once instead of fixing them one by one.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Upstream API hostname.
pub const DEFAULT_HOST: &str = "api.nibeuplink.com";

/// Redirect URI registered for the stock client application.
pub const DEFAULT_REDIRECT_URI: &str = "http://z0mt3c.github.io/nibe.html";

/// Default OAuth scope (read-only system access).
pub const DEFAULT_SCOPE: &str = "READSYSTEM";

/// Authorization codes issued by the Uplink portal are long opaque blobs;
/// anything shorter than this was truncated during copy-paste.
pub const MIN_AUTH_CODE_LEN: usize = 380;

/// How long a gate waiter tolerates a stuck prior request before proceeding.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(7);

/// Immutable configuration for an [`UplinkClient`](crate::UplinkClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// OAuth client id issued by the Uplink developer portal.
    pub client_id: String,
    /// OAuth client secret paired with `client_id`.
    pub client_secret: String,
    /// Single-use authorization code from the portal's consent redirect.
    pub auth_code: Option<String>,
    /// Redirect URI the authorization code was issued against.
    pub redirect_uri: String,
    /// Requested OAuth scopes, space-separated.
    pub scope: String,
    /// Upstream host, or a full `http(s)://` base URL override for tests.
    pub host: String,
    /// Preselected system id; discovered from the first listed system when
    /// absent.
    pub system_id: Option<u64>,
    /// Path of the durable session blob. `None` disables persistence.
    pub session_store: Option<PathBuf>,
    /// Deadline after which gate waiters stop honoring a stuck holder.
    pub gate_timeout: Duration,
}

impl ClientConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Base URL for every request.
    ///
    /// A bare hostname gets the `https://` scheme; a value already carrying a
    /// scheme is used verbatim (integration tests point this at a local mock
    /// server).
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host)
        }
    }

    /// Ready-to-use `/oauth/authorize` URL for obtaining a fresh
    /// authorization code out-of-band.
    #[must_use]
    pub fn authorize_url(&self) -> String {
        let params = [
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("scope", self.scope.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("state", "init"),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/oauth/authorize?{query}", self.base_url())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_code: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    host: Option<String>,
    system_id: Option<u64>,
    session_store: Option<PathBuf>,
    gate_timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    /// OAuth client id (required).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// OAuth client secret (required).
    #[must_use]
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Single-use authorization code.
    #[must_use]
    pub fn auth_code(mut self, auth_code: impl Into<String>) -> Self {
        self.auth_code = Some(auth_code.into());
        self
    }

    /// Redirect URI the authorization code was issued against.
    #[must_use]
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Requested OAuth scopes.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Upstream host or full base URL.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Preselected system id.
    #[must_use]
    pub fn system_id(mut self, system_id: u64) -> Self {
        self.system_id = Some(system_id);
        self
    }

    /// Path of the durable session blob.
    #[must_use]
    pub fn session_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_store = Some(path.into());
        self
    }

    /// Gate lockout-breaker deadline.
    #[must_use]
    pub fn gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout = Some(timeout);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] listing every violated constraint.
    pub fn build(self) -> Result<ClientConfig, Error> {
        let mut faults = Vec::new();

        if self.client_id.as_deref().map_or(true, str::is_empty) {
            faults.push("clientId is missing from options. Add clientId to continue.");
        }
        if self.client_secret.as_deref().map_or(true, str::is_empty) {
            faults.push("clientSecret is missing from options. Add clientSecret to continue.");
        }
        if self.auth_code.as_deref().is_some_and(|code| code.len() < MIN_AUTH_CODE_LEN) {
            faults.push("authCode seems too short. Try a new authCode.");
        }

        if !faults.is_empty() {
            return Err(Error::Configuration(faults.join(" ")));
        }

        Ok(ClientConfig {
            client_id: self.client_id.unwrap_or_default(),
            client_secret: self.client_secret.unwrap_or_default(),
            auth_code: self.auth_code,
            redirect_uri: self.redirect_uri.unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            scope: self.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            system_id: self.system_id,
            session_store: self.session_store,
            gate_timeout: self.gate_timeout.unwrap_or(DEFAULT_GATE_TIMEOUT),
        })
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for configuration building and validation.
    use super::*;

    fn minimal() -> ClientConfigBuilder {
        ClientConfig::builder().client_id("id").client_secret("secret")
    }

    #[test]
    fn defaults_match_upstream() {
        let config = minimal().build().unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.scope, DEFAULT_SCOPE);
        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.gate_timeout, DEFAULT_GATE_TIMEOUT);
        assert!(config.auth_code.is_none());
        assert!(config.system_id.is_none());
    }

    #[test]
    fn validation_aggregates_every_fault() {
        let result = ClientConfig::builder().auth_code("short").build();

        let Err(Error::Configuration(message)) = result else {
            panic!("expected configuration error");
        };
        assert!(message.contains("clientId is missing"));
        assert!(message.contains("clientSecret is missing"));
        assert!(message.contains("authCode seems too short"));
    }

    #[test]
    fn valid_length_auth_code_is_accepted() {
        let config = minimal().auth_code("x".repeat(MIN_AUTH_CODE_LEN)).build().unwrap();
        assert!(config.auth_code.is_some());
    }

    #[test]
    fn base_url_defaults_to_https() {
        let config = minimal().build().unwrap();
        assert_eq!(config.base_url(), "https://api.nibeuplink.com");
    }

    #[test]
    fn base_url_passes_through_scheme_overrides() {
        let config = minimal().host("http://127.0.0.1:8080/").build().unwrap();
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn authorize_url_carries_encoded_query() {
        let config = minimal().build().unwrap();
        let url = config.authorize_url();
        assert!(url.starts_with("https://api.nibeuplink.com/oauth/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=id"));
        assert!(url.contains("scope=READSYSTEM"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Fz0mt3c.github.io%2Fnibe.html"));
        assert!(url.contains("state=init"));
    }
}
