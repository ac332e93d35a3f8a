//! Client facade
//!
//! [`UplinkClient`] exposes the four verb methods, each gated behind the
//! token lifecycle's `ensure_ready` and serialized through the request gate.
//! No implicit retries: one call, one outcome.

use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::credentials::Credentials;
use crate::error::Error;
use crate::lifecycle::{InitPhase, PhaseObserver, TokenLifecycle, PROBE_PATH};
use crate::store::{CredentialStore, FileCredentialStore};
use crate::transport::{Payload, TransportClient};

/// Session blob path used when none is configured.
pub const DEFAULT_SESSION_STORE: &str = ".session.json";

/// One page of the list-systems response.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemsPage {
    /// Systems visible to the authenticated account.
    #[serde(default)]
    pub objects: Vec<System>,
    /// Total number of systems across pages.
    #[serde(default, rename = "numItems")]
    pub num_items: Option<u32>,
}

/// A heating system registered under the account.
#[derive(Debug, Clone, Deserialize)]
pub struct System {
    /// Upstream identifier used in resource paths.
    #[serde(rename = "systemId")]
    pub system_id: u64,
    /// Owner-assigned name.
    #[serde(default)]
    pub name: Option<String>,
    /// Device product name.
    #[serde(default, rename = "productName")]
    pub product_name: Option<String>,
}

/// Async client for the Nibe Uplink REST API.
///
/// Owns the authentication lifecycle, the request gate, and the transport.
/// Generic over the credential store so tests can inject an in-memory double;
/// defaults to the file-backed store.
pub struct UplinkClient<S: CredentialStore + 'static = FileCredentialStore> {
    config: Arc<ClientConfig>,
    transport: Arc<TransportClient>,
    lifecycle: TokenLifecycle<S>,
}

impl UplinkClient<FileCredentialStore> {
    /// Create a client persisting its session to the configured path (or
    /// [`DEFAULT_SESSION_STORE`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the transport cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let path = config
            .session_store
            .clone()
            .unwrap_or_else(|| std::path::PathBuf::from(DEFAULT_SESSION_STORE));
        Self::with_store(config, Arc::new(FileCredentialStore::new(path)))
    }
}

impl<S: CredentialStore + 'static> UplinkClient<S> {
    /// Create a client over an injected credential store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the transport cannot be built.
    pub fn with_store(config: ClientConfig, store: Arc<S>) -> Result<Self, Error> {
        Self::build(config, store, None)
    }

    /// Create a client that also reports lifecycle phases to `observer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the transport cannot be built.
    pub fn with_observer(
        config: ClientConfig,
        store: Arc<S>,
        observer: PhaseObserver,
    ) -> Result<Self, Error> {
        Self::build(config, store, Some(observer))
    }

    fn build(
        config: ClientConfig,
        store: Arc<S>,
        observer: Option<PhaseObserver>,
    ) -> Result<Self, Error> {
        let config = Arc::new(config);
        let transport = Arc::new(TransportClient::new(&config)?);
        let lifecycle =
            TokenLifecycle::new(Arc::clone(&config), Arc::clone(&transport), store, observer);
        Ok(Self { config, transport, lifecycle })
    }

    /// Make sure a server-accepted access token is available.
    ///
    /// # Errors
    ///
    /// [`Error::AuthorizationRequired`] when manual re-authorization is
    /// needed; see [`TokenLifecycle::ensure_ready`].
    pub async fn ensure_ready(&self) -> Result<(), Error> {
        self.lifecycle.ensure_ready().await
    }

    /// GET a resource, with URL-encoded query parameters.
    ///
    /// # Errors
    ///
    /// Authentication, classification, or transport errors per [`Error`].
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, Error> {
        self.lifecycle.ensure_ready().await?;
        let path = path_with_query(path, query);
        debug!(path = %path, "GET");
        self.request(Method::GET, &path, Payload::None).await
    }

    /// PUT a JSON body to a resource.
    ///
    /// # Errors
    ///
    /// Authentication, classification, or transport errors per [`Error`].
    pub async fn put(&self, path: &str, body: Value) -> Result<Value, Error> {
        self.lifecycle.ensure_ready().await?;
        let path = path_with_query(path, &[]);
        debug!(path = %path, "PUT");
        self.request(Method::PUT, &path, Payload::Json(body)).await
    }

    /// POST a JSON body to a resource.
    ///
    /// # Errors
    ///
    /// Authentication, classification, or transport errors per [`Error`].
    pub async fn post(&self, path: &str, body: Value) -> Result<Value, Error> {
        self.lifecycle.ensure_ready().await?;
        let path = path_with_query(path, &[]);
        debug!(path = %path, "POST");
        self.request(Method::POST, &path, Payload::Json(body)).await
    }

    /// PATCH a JSON body on a resource.
    ///
    /// # Errors
    ///
    /// Authentication, classification, or transport errors per [`Error`].
    pub async fn patch(&self, path: &str, body: Value) -> Result<Value, Error> {
        self.lifecycle.ensure_ready().await?;
        let path = path_with_query(path, &[]);
        debug!(path = %path, "PATCH");
        self.request(Method::PATCH, &path, Payload::Json(body)).await
    }

    /// List the systems visible to the authenticated account.
    ///
    /// # Errors
    ///
    /// Propagates request errors; a body not matching the systems shape is
    /// [`Error::UnexpectedResponse`].
    pub async fn systems(&self) -> Result<SystemsPage, Error> {
        let value = self.get(PROBE_PATH, &[]).await?;
        serde_json::from_value(value).map_err(|err| Error::UnexpectedResponse(err.to_string()))
    }

    /// Configured system id, or the one discovered from the first listed
    /// system during authentication.
    #[must_use]
    pub fn system_id(&self) -> Option<u64> {
        self.lifecycle.system_id()
    }

    /// Last recorded lifecycle phase, for diagnostics.
    #[must_use]
    pub fn last_phase(&self) -> Option<InitPhase> {
        self.lifecycle.last_phase()
    }

    /// Snapshot of the current credential record.
    pub async fn credentials(&self) -> Credentials {
        self.lifecycle.credentials().await
    }

    /// The immutable client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn request(&self, method: Method, path: &str, payload: Payload) -> Result<Value, Error> {
        let bearer = self.lifecycle.access_token().await;
        self.transport.send(method, path, bearer.as_deref(), payload).await
    }
}

impl<S: CredentialStore + 'static> std::fmt::Debug for UplinkClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UplinkClient")
            .field("host", &self.config.host)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Normalize a resource path to a leading `/` and append URL-encoded query
/// parameters.
fn path_with_query(path: &str, query: &[(&str, &str)]) -> String {
    let mut normalized =
        if path.starts_with('/') { path.to_string() } else { format!("/{path}") };

    if !query.is_empty() {
        let encoded = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        normalized.push('?');
        normalized.push_str(&encoded);
    }
    normalized
}
