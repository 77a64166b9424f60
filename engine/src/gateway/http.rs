//! REST gateway over the table API served by `gymsync-server`.
//!
//! Routes:
//!
//! - `GET    {base}/tables/{table}`
//! - `POST   {base}/tables/{table}`
//! - `PATCH  {base}/tables/{table}/{id}`
//! - `DELETE {base}/tables/{table}/{id}`

use super::{GatewayError, GatewayErrorKind, GatewayResult, RemoteGateway};
use crate::{Record, RecordId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Where the remote lives and how to authenticate.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `GYMSYNC_REMOTE_URL` and the optional `GYMSYNC_REMOTE_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("GYMSYNC_REMOTE_URL").ok()?;
        let mut config = Self::new(base_url);
        if let Ok(token) = std::env::var("GYMSYNC_REMOTE_TOKEN") {
            if !token.is_empty() {
                config = config.with_token(token);
            }
        }
        Some(config)
    }
}

/// [`RemoteGateway`] talking HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::network(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/tables/{}", self.config.base_url, table)
    }

    fn record_url(&self, table: &str, id: &str) -> String {
        format!("{}/tables/{}/{}", self.config.base_url, table, id)
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::timeout(self.config.timeout)
            } else {
                GatewayError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let kind = classify_status(status);
        let message = error_message(&body).unwrap_or_else(|| status.to_string());
        tracing::debug!(status = status.as_u16(), %kind, message = %message, "remote call failed");
        Err(GatewayError { kind, message })
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> GatewayResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::network(format!("malformed response: {e}")))
    }
}

/// Map a non-success status to an error class. Server trouble, throttling and
/// credential problems are retryable; any other client error means the data
/// itself was refused.
pub(crate) fn classify_status(status: StatusCode) -> GatewayErrorKind {
    if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
        )
    {
        GatewayErrorKind::Network
    } else {
        GatewayErrorKind::Validation
    }
}

/// The `error` field of a JSON error body, if any.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn select(&self, table: &str) -> GatewayResult<Vec<Record>> {
        let response = self.send(self.client.get(self.table_url(table))).await?;
        Self::json(response).await
    }

    async fn insert(&self, table: &str, record: &Record) -> GatewayResult<Record> {
        let response = self
            .send(self.client.post(self.table_url(table)).json(record))
            .await?;
        Self::json(response).await
    }

    async fn update(&self, table: &str, id: &RecordId, patch: &Value) -> GatewayResult<Record> {
        let response = self
            .send(self.client.patch(self.record_url(table, id)).json(patch))
            .await?;
        Self::json(response).await
    }

    async fn delete(&self, table: &str, id: &RecordId) -> GatewayResult<()> {
        self.send(self.client.delete(self.record_url(table, id)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(classify_status(StatusCode::INTERNAL_SERVER_ERROR), GatewayErrorKind::Network);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), GatewayErrorKind::Network);
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT), GatewayErrorKind::Network);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), GatewayErrorKind::Network);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), GatewayErrorKind::Network);

        assert_eq!(classify_status(StatusCode::CONFLICT), GatewayErrorKind::Validation);
        assert_eq!(classify_status(StatusCode::UNPROCESSABLE_ENTITY), GatewayErrorKind::Validation);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), GatewayErrorKind::Validation);
    }

    #[test]
    fn error_body() {
        assert_eq!(
            error_message(r#"{"error":"duplicate key"}"#).as_deref(),
            Some("duplicate key")
        );
        assert_eq!(error_message("<html>oops</html>"), None);
        assert_eq!(error_message(r#"{"message":"x"}"#), None);
    }

    #[test]
    fn urls() {
        let gateway = HttpGateway::new(GatewayConfig::new("http://localhost:3000/")).unwrap();
        assert_eq!(gateway.table_url("sales"), "http://localhost:3000/tables/sales");
        assert_eq!(
            gateway.record_url("sales", "s1"),
            "http://localhost:3000/tables/sales/s1"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let config = GatewayConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_millis(500));
        let gateway = HttpGateway::new(config).unwrap();
        let err = gateway.select("groups").await.unwrap_err();
        assert!(err.is_transient());
    }
}
