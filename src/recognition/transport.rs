use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use super::error::RecognitionError;
use crate::settings::RecognitionSettings;

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, RecognitionError>> + Send + 'a>>;

/// One way of reaching the recognition service.
///
/// Implementations return the raw response body; interpreting it is the
/// normalizer's job.
pub trait RecognitionTransport: Send + Sync {
    fn recognize<'a>(&'a self, payload: &'a Value) -> TransportFuture<'a>;

    /// Releases long-lived connections. One-shot transports have none.
    fn disconnect(&self) {}
}

/// Supplies the bearer token for each outbound call.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// Request/response transport over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(4)
            .build()
            .context("failed to build recognition HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            tokens,
        })
    }

    pub fn from_settings(
        settings: &RecognitionSettings,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        Self::new(
            settings.endpoint.clone(),
            tokens,
            Duration::from_millis(settings.timeout_ms),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, payload: &Value) -> Result<String, RecognitionError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(token) = self.tokens.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .json(payload)
            .send()
            .await
            .map_err(|e| RecognitionError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                RecognitionError::Transport(format!("failed to read response body: {e}"))
            })?;

        if !status.is_success() {
            return Err(error_from_status(status.as_u16(), body));
        }

        Ok(body)
    }
}

impl RecognitionTransport for HttpTransport {
    fn recognize<'a>(&'a self, payload: &'a Value) -> TransportFuture<'a> {
        Box::pin(self.send(payload))
    }
}

/// Prefers the service's own `message`/`error` field over the bare status.
fn error_from_status(status: u16, body: String) -> RecognitionError {
    let message = serde_json::from_str::<Value>(&body).ok().and_then(|value| {
        ["message", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    match message {
        Some(message) => RecognitionError::Service(message),
        None => RecognitionError::Status { status, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_prefer_service_message() {
        assert_eq!(
            error_from_status(401, r#"{"message":"token expired"}"#.into()),
            RecognitionError::Service("token expired".into())
        );
        assert_eq!(
            error_from_status(500, "<html>oops</html>".into()),
            RecognitionError::Status {
                status: 500,
                body: "<html>oops</html>".into()
            }
        );
    }

    #[test]
    fn empty_static_token_sends_no_auth() {
        assert_eq!(StaticToken(String::new()).bearer_token(), None);
        assert_eq!(StaticToken("abc".into()).bearer_token(), Some("abc".into()));
    }

    #[test]
    fn settings_endpoint_is_used() {
        let settings = RecognitionSettings::default();
        let transport = HttpTransport::from_settings(&settings, Arc::new(NoToken)).expect("client");
        assert_eq!(transport.endpoint(), "http://localhost:8000/api/calculate");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let transport = HttpTransport::new(
            "http://127.0.0.1:9/recognize",
            Arc::new(NoToken),
            Duration::from_secs(2),
        )
        .expect("client");

        let err = transport
            .recognize(&serde_json::json!({}))
            .await
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, RecognitionError::Transport(_)));
    }
}
