//! HTTP transport and response classification
//!
//! Performs the actual upstream exchange and classifies the outcome. Every
//! exchange is serialized through the [`RequestGate`]; the permit is held for
//! the full request/response cycle and released on every exit path.

use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::credentials::TokenResponse;
use crate::error::Error;
use crate::gate::RequestGate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth token endpoint path.
pub const TOKEN_PATH: &str = "/oauth/token";

/// Request body variants the transport knows how to encode.
#[derive(Debug)]
pub enum Payload {
    /// No body (GET and probe calls).
    None,
    /// JSON body for resource writes.
    Json(Value),
    /// Form-encoded body for the token endpoint grants.
    Form(Vec<(String, String)>),
}

/// Performs HTTPS exchanges against the configured upstream host.
#[derive(Debug)]
pub struct TransportClient {
    http: Client,
    base_url: String,
    gate: RequestGate,
}

impl TransportClient {
    /// Build a transport for the configured host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| Error::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { http, base_url: config.base_url(), gate: RequestGate::new(config.gate_timeout) })
    }

    /// The gate serializing exchanges through this transport.
    #[must_use]
    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Perform one exchange and classify the response.
    ///
    /// The full response body is accumulated before classification. A 2xx
    /// body that is not valid JSON is returned as the raw text unchanged;
    /// some endpoints respond with empty bodies or plain text.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] for status >= 300, [`Error::Transport`] for
    /// network-level failures.
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        bearer: Option<&str>,
        payload: Payload,
    ) -> Result<Value, Error> {
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let request = match payload {
            Payload::None => request,
            Payload::Json(body) => request.json(&body),
            Payload::Form(fields) => request.form(&fields),
        };

        let _permit = self.gate.acquire().await;
        debug!(%method, path = %path_and_query, "sending request");

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(%method, path = %path_and_query, status = status.as_u16(), "received response");

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    /// Post a grant to the token endpoint and parse the issued token set.
    ///
    /// # Errors
    ///
    /// Propagates exchange failures; a 2xx body carrying an OAuth `error`
    /// field or not matching the token shape is [`Error::UnexpectedResponse`].
    pub async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, Error> {
        let fields = params.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();

        let value = self.send(Method::POST, TOKEN_PATH, None, Payload::Form(fields)).await?;

        if let Some(oauth_error) = value.get("error") {
            let description = value
                .get("error_description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| oauth_error.to_string());
            return Err(Error::UnexpectedResponse(format!(
                "token endpoint returned error: {description}"
            )));
        }

        serde_json::from_value(value).map_err(|err| Error::UnexpectedResponse(err.to_string()))
    }
}

/// Classify a non-success status into a typed error.
///
/// The well-known parameter API statuses get their documented detail text; for
/// everything else a best-effort `details[0]` string from the JSON error body
/// is used, falling back to the stale-token hint.
fn classify_status(status: u16, body: &str) -> Error {
    let detail = match status {
        400 => "Request content from client not accepted by server".to_string(),
        401 => "Unauthorized".to_string(),
        403 => "Not authorized for action".to_string(),
        404 => "Requested parameter not found".to_string(),
        _ => body_detail(body).unwrap_or_else(|| {
            "Error in response from API. Access token might have expired".to_string()
        }),
    };
    Error::Http { status, detail }
}

fn body_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("details")?.get(0)?.as_str().map(str::to_string)
}
