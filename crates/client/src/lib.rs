//! Async client for the Nibe Uplink cloud REST API
//!
//! Obtains and maintains an OAuth2 access token, persists it across process
//! restarts, serializes outbound calls against the single upstream host, and
//! exposes typed read/write operations over device parameters.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   UplinkClient   │  get / put / post / patch, systems()
//! └────────┬─────────┘
//!          │
//!          ├──► TokenLifecycle    (ensure_ready decision tree)
//!          │         │
//!          │         └──► CredentialStore  (durable session blob)
//!          │
//!          └──► TransportClient   (HTTPS exchange + classification)
//!                    │
//!                    └──► RequestGate      (one exchange in flight)
//! ```
//!
//! Every verb call runs `ensure_ready()` first: the stored token is used
//! while valid, refreshed when expired, and the single-use authorization code
//! is exchanged when nothing else works. When no path remains the call fails
//! with [`Error::AuthorizationRequired`] carrying a ready-to-use authorize
//! URL for the operator.
//!
//! # Usage
//!
//! ```no_run
//! use nibe_uplink::{ClientConfig, UplinkClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .client_id("client-id")
//!         .client_secret("client-secret")
//!         .session_store("/var/lib/uplink/.session.json")
//!         .build()?;
//!
//!     let client = UplinkClient::new(config)?;
//!
//!     let systems = client.systems().await?;
//!     for system in &systems.objects {
//!         println!("{}: {:?}", system.system_id, system.name);
//!     }
//!
//!     let system_id = client.system_id().ok_or("no system")?;
//!     let status = client
//!         .get(&format!("/api/v1/systems/{system_id}/status/system"), &[])
//!         .await?;
//!     println!("{status}");
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod store;
pub mod transport;

pub use client::{System, SystemsPage, UplinkClient, DEFAULT_SESSION_STORE};
pub use config::{
    ClientConfig, ClientConfigBuilder, DEFAULT_GATE_TIMEOUT, DEFAULT_HOST, DEFAULT_REDIRECT_URI,
    DEFAULT_SCOPE, MIN_AUTH_CODE_LEN,
};
pub use credentials::{Credentials, TokenResponse, EXPIRY_SAFETY_MARGIN_SECS};
pub use error::Error;
pub use gate::{GatePermit, RequestGate};
pub use lifecycle::{InitPhase, PhaseObserver, TokenLifecycle, PROBE_PATH};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError};
