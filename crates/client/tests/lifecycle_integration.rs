//! Authentication lifecycle scenarios against a mock upstream.

use std::sync::Arc;

use chrono::Utc;
use nibe_uplink::{
    ClientConfig, CredentialStore, Credentials, Error, InitPhase, MemoryCredentialStore,
    UplinkClient,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn valid_auth_code() -> String {
    "x".repeat(380)
}

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::builder()
        .client_id("id")
        .client_secret("secret")
        .host(server.uri())
        .build()
        .unwrap()
}

fn config_with_auth_code(server: &MockServer) -> ClientConfig {
    ClientConfig::builder()
        .client_id("id")
        .client_secret("secret")
        .auth_code(valid_auth_code())
        .host(server.uri())
        .build()
        .unwrap()
}

fn token_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "access_1",
        "refresh_token": "refresh_1",
        "expires_in": 300,
        "scope": "READSYSTEM",
        "token_type": "bearer"
    }))
}

fn systems_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "numItems": 1,
        "objects": [{"systemId": 123, "name": "Home"}]
    }))
}

fn unexpired_credentials() -> Credentials {
    let now = Utc::now();
    Credentials {
        access_token: Some("access_0".to_string()),
        refresh_token: Some("refresh_0".to_string()),
        expires_at: Some(now + chrono::Duration::seconds(295)),
        scope: Some("READSYSTEM".to_string()),
        issued_at: Some(now),
    }
}

fn expired_credentials() -> Credentials {
    let now = Utc::now();
    Credentials {
        access_token: Some("access_0".to_string()),
        refresh_token: Some("refresh_0".to_string()),
        expires_at: Some(now - chrono::Duration::seconds(1000)),
        scope: Some("READSYSTEM".to_string()),
        issued_at: Some(now - chrono::Duration::seconds(1300)),
    }
}

async fn token_posts(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/oauth/token")
        .map(|request| String::from_utf8_lossy(&request.body).into_owned())
        .collect()
}

#[tokio::test]
async fn auth_code_is_exchanged_then_probed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/systems"))
        .respond_with(systems_response())
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let client = UplinkClient::with_store(config_with_auth_code(&server), Arc::clone(&store)).unwrap();

    client.ensure_ready().await.unwrap();

    // Token set installed in memory and persisted before ensure_ready returned.
    let credentials = client.credentials().await;
    assert_eq!(credentials.access_token.as_deref(), Some("access_1"));
    assert_eq!(store.load().await.unwrap(), credentials);

    // First listed system backfills the unconfigured system id.
    assert_eq!(client.system_id(), Some(123));
    assert_eq!(client.last_phase(), Some(InitPhase::ProbeSucceeded));
}

#[tokio::test]
async fn expired_token_refreshes_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/systems"))
        .respond_with(systems_response())
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::seeded(expired_credentials()));
    let client = UplinkClient::with_store(config_for(&server), store).unwrap();

    client.ensure_ready().await.unwrap();

    let posts = token_posts(&server).await;
    assert_eq!(posts.len(), 1, "exactly one token-endpoint call");
    assert!(posts[0].contains("grant_type=refresh_token"));
    assert!(posts[0].contains("refresh_token=refresh_0"));
    assert!(!posts[0].contains("authorization_code"));
    assert_eq!(client.last_phase(), Some(InitPhase::Refreshed));
}

#[tokio::test]
async fn refresh_failure_without_auth_code_is_terminal_and_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::seeded(expired_credentials()));
    let client = UplinkClient::with_store(config_for(&server), Arc::clone(&store)).unwrap();

    let err = client.ensure_ready().await.unwrap_err();
    let Error::AuthorizationRequired { authorize_url } = err else {
        panic!("expected AuthorizationRequired, got {err:?}");
    };
    assert!(authorize_url.contains("/oauth/authorize?"));
    assert!(authorize_url.contains("client_id=id"));
    assert!(authorize_url.contains("response_type=code"));

    // The unusable session was cleared, in memory and in the store.
    assert!(client.credentials().await.is_empty());
    assert!(store.load().await.unwrap().is_empty());

    // A repeat call is the same terminal failure, without another refresh.
    let err = client.ensure_ready().await.unwrap_err();
    assert!(matches!(err, Error::AuthorizationRequired { .. }));
    assert_eq!(client.last_phase(), Some(InitPhase::AuthorizationRequired));
}

#[tokio::test]
async fn unauthorized_probe_attempts_one_refresh_then_fails_terminally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/systems"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::seeded(unexpired_credentials()));
    let client = UplinkClient::with_store(config_for(&server), store).unwrap();

    let err = client.ensure_ready().await.unwrap_err();
    assert!(matches!(err, Error::AuthorizationRequired { .. }));

    let posts = token_posts(&server).await;
    assert_eq!(posts.len(), 1);
    assert!(posts[0].contains("grant_type=refresh_token"));
}

#[tokio::test]
async fn fast_path_performs_no_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/systems"))
        .respond_with(systems_response())
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::seeded(unexpired_credentials()));
    let client = UplinkClient::with_store(config_for(&server), store).unwrap();

    client.ensure_ready().await.unwrap();
    client.ensure_ready().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "second ensure_ready must stay off the network");
}

#[tokio::test]
async fn concurrent_callers_share_a_single_initialization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(token_response())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/systems"))
        .respond_with(systems_response())
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let client = UplinkClient::with_store(config_with_auth_code(&server), store).unwrap();

    let (first, second) = futures::join!(client.ensure_ready(), client.ensure_ready());
    first.unwrap();
    second.unwrap();

    assert_eq!(token_posts(&server).await.len(), 1, "one exchange shared by both callers");
}

#[tokio::test]
async fn phase_observer_sees_the_terminal_transition() {
    let server = MockServer::start().await;

    let seen: Arc<std::sync::Mutex<Vec<InitPhase>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let observer: nibe_uplink::PhaseObserver = Arc::new(move |phase| {
        if let Ok(mut phases) = sink.lock() {
            phases.push(phase);
        }
    });

    let store = Arc::new(MemoryCredentialStore::new());
    let client = UplinkClient::with_observer(config_for(&server), store, observer).unwrap();

    let _ = client.ensure_ready().await.unwrap_err();

    let phases = seen.lock().unwrap().clone();
    assert_eq!(phases.first(), Some(&InitPhase::Starting));
    assert_eq!(phases.last(), Some(&InitPhase::AuthorizationRequired));
}
