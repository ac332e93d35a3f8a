//! Token lifecycle state machine
//!
//! Decides, given the current credential state, whether to use the stored
//! access token, refresh it, exchange the single-use authorization code, or
//! fail requiring manual re-authorization. The decision tree is evaluated on
//! each [`TokenLifecycle::ensure_ready`] call unless a previous pass succeeded
//! and the token has not expired (the fast path taken by every request after
//! the first).
//!
//! The whole initialization pass runs under an async mutex, so concurrent
//! callers share one in-flight pass instead of racing duplicate refresh or
//! exchange attempts against a single-use endpoint.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use reqwest::Method;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credentials::Credentials;
use crate::error::Error;
use crate::store::CredentialStore;
use crate::transport::{Payload, TransportClient};

/// Lightweight authenticated request used to validate that a token is
/// actually accepted by the server.
pub const PROBE_PATH: &str = "/api/v1/systems";

/// Named phase of an initialization pass.
///
/// Purely observational: phases are logged and handed to the optional
/// subscriber so a caller can inspect why authorization failed, but they
/// never alter control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// A fresh pass began.
    Starting,
    /// A stored access token with an expiry was found.
    AccessTokenFound,
    /// The stored token has expired; refreshing.
    RefreshRequired,
    /// Refresh of the expired token succeeded and the probe passed.
    Refreshed,
    /// Refresh of the expired token (or its probe) failed.
    RefreshFailed,
    /// The unexpired stored token passed the probe.
    TokenStillValid,
    /// The probe failed although the token should not be expired yet.
    ProbeFailedEarly,
    /// An early refresh recovered a token the server had stopped accepting.
    RefreshedEarly,
    /// The single-use authorization code was exchanged for a token set.
    CodeExchanged,
    /// The post-exchange probe succeeded.
    ProbeSucceeded,
    /// The post-exchange probe failed.
    ProbeFailed,
    /// The authorization code exchange failed; the code was likely spent.
    CodeSpent,
    /// No usable path remains; a new authorization code is required.
    AuthorizationRequired,
}

impl fmt::Display for InitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Starting => "starting",
            Self::AccessTokenFound => "access_token found",
            Self::RefreshRequired => "access_token must be refreshed, trying now",
            Self::Refreshed => "access_token is now refreshed",
            Self::RefreshFailed => "access_token expired and failed at refresh",
            Self::TokenStillValid => "access_token has not expired yet",
            Self::ProbeFailedEarly => "access_token failed even though it should not be expired yet",
            Self::RefreshedEarly => "access_token is now refreshed before it should have expired",
            Self::CodeExchanged => "one time use authCode now exchanged for new access_token",
            Self::ProbeSucceeded => "testing new access_token returned success",
            Self::ProbeFailed => "testing new access_token failed",
            Self::CodeSpent => "one time use authCode might have been used already",
            Self::AuthorizationRequired => "request new authCode",
        };
        f.write_str(text)
    }
}

/// Subscriber for lifecycle phase events.
pub type PhaseObserver = Arc<dyn Fn(InitPhase) + Send + Sync>;

/// Authentication lifecycle for one client instance.
pub struct TokenLifecycle<S: CredentialStore> {
    config: Arc<ClientConfig>,
    transport: Arc<TransportClient>,
    store: Arc<S>,
    credentials: RwLock<Credentials>,
    ready: AtomicBool,
    init_lock: Mutex<()>,
    last_phase: std::sync::Mutex<Option<InitPhase>>,
    observer: Option<PhaseObserver>,
    discovered_system_id: OnceLock<u64>,
}

impl<S: CredentialStore> TokenLifecycle<S> {
    /// Create a lifecycle over the given transport and store.
    #[must_use]
    pub fn new(
        config: Arc<ClientConfig>,
        transport: Arc<TransportClient>,
        store: Arc<S>,
        observer: Option<PhaseObserver>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            credentials: RwLock::new(Credentials::default()),
            ready: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            last_phase: std::sync::Mutex::new(None),
            observer,
            discovered_system_id: OnceLock::new(),
        }
    }

    /// Make sure a server-accepted access token is available.
    ///
    /// Fast path: returns immediately without network traffic when a previous
    /// pass succeeded this process and the token has not expired.
    ///
    /// # Errors
    ///
    /// [`Error::AuthorizationRequired`] when no usable authentication path
    /// remains; the carried URL is the documented recovery path.
    pub async fn ensure_ready(&self) -> Result<(), Error> {
        if self.is_ready().await {
            return Ok(());
        }

        let _pass = self.init_lock.lock().await;
        if self.is_ready().await {
            debug!("initialization already completed by a concurrent caller");
            return Ok(());
        }
        self.initialize().await
    }

    /// Current access token, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.credentials.read().await.access_token.clone()
    }

    /// Snapshot of the current credential record.
    pub async fn credentials(&self) -> Credentials {
        self.credentials.read().await.clone()
    }

    /// Last recorded initialization phase, for diagnostics.
    #[must_use]
    pub fn last_phase(&self) -> Option<InitPhase> {
        self.last_phase.lock().ok().and_then(|last| *last)
    }

    /// Configured system id, or the one discovered from the first probe.
    #[must_use]
    pub fn system_id(&self) -> Option<u64> {
        self.config.system_id.or_else(|| self.discovered_system_id.get().copied())
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && !self.credentials.read().await.is_expired()
    }

    async fn initialize(&self) -> Result<(), Error> {
        self.transport.gate().reset();
        self.ready.store(false, Ordering::Release);
        self.phase(InitPhase::Starting);

        {
            let mut credentials = self.credentials.write().await;
            if credentials.is_empty() {
                match self.store.load().await {
                    Ok(stored) => *credentials = stored,
                    Err(err) => {
                        warn!(error = %err, "failed to load stored session, starting fresh");
                    }
                }
            }
        }

        let snapshot = self.credentials.read().await.clone();
        if snapshot.access_token.is_some() && snapshot.expires_at.is_some() {
            self.phase(InitPhase::AccessTokenFound);

            if snapshot.is_expired() {
                self.phase(InitPhase::RefreshRequired);
                match self.refresh_and_probe().await {
                    Ok(()) => {
                        self.phase(InitPhase::Refreshed);
                        return self.finish_ready();
                    }
                    Err(err) => {
                        debug!(error = %err, "refresh of expired token failed");
                        self.phase(InitPhase::RefreshFailed);
                    }
                }
            } else {
                match self.probe().await {
                    Ok(()) => {
                        self.phase(InitPhase::TokenStillValid);
                        return self.finish_ready();
                    }
                    Err(err) => {
                        self.phase(InitPhase::ProbeFailedEarly);
                        // Unauthorized is the expected stale-token signal and
                        // is swallowed; anything else is worth a trace.
                        if !err.is_unauthorized() {
                            warn!(error = %err, "probe failed with an unexpired token");
                        }
                    }
                }
                if snapshot.refresh_token.is_some() {
                    match self.refresh_and_probe().await {
                        Ok(()) => {
                            self.phase(InitPhase::RefreshedEarly);
                            return self.finish_ready();
                        }
                        Err(err) => debug!(error = %err, "early refresh failed"),
                    }
                }
            }

            // The stored session is unusable. Clear it so a corrupt record
            // cannot drive an infinite retry loop on the next pass.
            self.clear_credentials().await;
        }

        if let Some(code) = self.config.auth_code.as_deref() {
            // The code is single-use: whatever the failure, it is not retried.
            match self.exchange_code(code).await {
                Ok(()) => {
                    self.phase(InitPhase::CodeExchanged);
                    match self.probe().await {
                        Ok(()) => {
                            self.phase(InitPhase::ProbeSucceeded);
                            return self.finish_ready();
                        }
                        Err(err) => {
                            self.phase(InitPhase::ProbeFailed);
                            warn!(error = %err, "probe after code exchange failed");
                        }
                    }
                }
                Err(err) => {
                    self.phase(InitPhase::CodeSpent);
                    debug!(error = %err, "authorization code exchange failed");
                }
            }
        }

        self.phase(InitPhase::AuthorizationRequired);
        Err(Error::AuthorizationRequired { authorize_url: self.config.authorize_url() })
    }

    fn finish_ready(&self) -> Result<(), Error> {
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn refresh_and_probe(&self) -> Result<(), Error> {
        self.refresh().await?;
        self.probe().await
    }

    /// Exchange the refresh token for a new token set.
    async fn refresh(&self) -> Result<(), Error> {
        let refresh_token = self
            .credentials
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or_else(|| Error::TokenRefreshFailed("no refresh token in session".to_string()))?;

        info!("refreshing access token");
        let response = self
            .transport
            .post_token(&[
                ("grant_type", "refresh_token"),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("refresh_token", &refresh_token),
            ])
            .await
            .map_err(|err| Error::TokenRefreshFailed(err.to_string()))?;

        self.install(response.into()).await;
        Ok(())
    }

    /// Exchange the single-use authorization code for the initial token set.
    async fn exchange_code(&self, code: &str) -> Result<(), Error> {
        info!("exchanging authorization code for access token");
        let response = self
            .transport
            .post_token(&[
                ("grant_type", "authorization_code"),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("code", code),
                ("redirect_uri", &self.config.redirect_uri),
                ("scope", &self.config.scope),
            ])
            .await
            .map_err(|err| Error::TokenExchangeFailed(err.to_string()))?;

        self.install(response.into()).await;
        Ok(())
    }

    /// Persist then cache a freshly issued token set.
    ///
    /// The store write is issued before success is reported so a crash right
    /// after authentication does not silently lose the token; a write failure
    /// is logged, not surfaced (best-effort persistence).
    async fn install(&self, credentials: Credentials) {
        if let Err(err) = self.store.save(&credentials).await {
            warn!(error = %err, "failed to persist session, continuing with in-memory tokens");
        }
        *self.credentials.write().await = credentials;
    }

    async fn clear_credentials(&self) {
        *self.credentials.write().await = Credentials::default();
        self.ready.store(false, Ordering::Release);
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear stored session");
        }
    }

    /// Validate the current token with a list-systems call, recording the
    /// first system id when none was configured.
    async fn probe(&self) -> Result<(), Error> {
        let bearer = self.access_token().await.unwrap_or_default();
        let payload =
            self.transport.send(Method::GET, PROBE_PATH, Some(&bearer), Payload::None).await?;

        if self.config.system_id.is_none() {
            if let Some(id) = payload.pointer("/objects/0/systemId").and_then(Value::as_u64) {
                let _ = self.discovered_system_id.set(id);
            }
        }
        Ok(())
    }

    fn phase(&self, phase: InitPhase) {
        debug!(phase = %phase, "auth lifecycle");
        if let Ok(mut last) = self.last_phase.lock() {
            *last = Some(phase);
        }
        if let Some(observer) = &self.observer {
            observer(phase);
        }
    }
}

impl<S: CredentialStore> fmt::Debug for TokenLifecycle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenLifecycle")
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .field("last_phase", &self.last_phase())
            .finish()
    }
}
