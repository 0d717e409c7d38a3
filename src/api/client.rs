use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};

/// Environment variable overriding the configured base URL
pub const BASE_URL_ENV: &str = "CRAWL_API_URL";

/// Where the crawl service lives
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: 60,
        }
    }
}

/// HTTP adapter for the crawl service.
///
/// Every endpoint answers with an envelope `{code, message, data}`. The
/// client unwraps it and turns both non-2xx statuses and non-2xx envelope
/// codes into [`ClientError::Remote`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8000/api`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("bad base URL '{}': {}", base_url, e)))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build from settings; `CRAWL_API_URL` wins over the configured URL
    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        Self::with_override(settings, std::env::var(BASE_URL_ENV).ok())
    }

    fn with_override(settings: &ApiSettings, base_url: Option<String>) -> Result<Self> {
        let base_url = base_url.unwrap_or_else(|| settings.base_url.clone());
        Self::new(&base_url, Duration::from_secs(settings.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let endpoint = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, endpoint);
        self.client.request(method, endpoint)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.execute(self.request(Method::GET, path), path).await
    }

    pub(crate) async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.execute(self.request(Method::GET, path).query(query), path)
            .await
    }

    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(self.request(Method::POST, path).json(body), path)
            .await
    }

    pub(crate) async fn put<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(self.request(Method::PUT, path).json(body), path)
            .await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        self.execute::<Value>(self.request(Method::DELETE, path), path)
            .await
            .map(|_| ())
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<Option<T>> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|value| rejection_message(&value))
                .unwrap_or_else(|| reason(status));
            warn!("{} rejected with status {}: {}", path, status.as_u16(), message);
            return Err(ClientError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        decode_envelope(&body, path)
    }
}

/// Unwrap the `{code, message, data}` envelope, accepting bare payloads too
pub(crate) fn decode_envelope<T: DeserializeOwned>(body: &[u8], path: &str) -> Result<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(body)?;

    let data = match value {
        Value::Object(ref map) if is_envelope(map) => {
            if let Some(code) = map.get("code").and_then(Value::as_u64) {
                if !(200..300).contains(&code) {
                    let message = rejection_message(&value)
                        .unwrap_or_else(|| format!("request to {} was rejected", path));
                    warn!("{} rejected with envelope code {}: {}", path, code, message);
                    return Err(ClientError::Remote {
                        status: u16::try_from(code).unwrap_or(u16::MAX),
                        message,
                    });
                }
            }
            map.get("data").cloned().unwrap_or(Value::Null)
        }
        other => other,
    };

    if data.is_null() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_value(data)?))
}

fn is_envelope(map: &serde_json::Map<String, Value>) -> bool {
    map.contains_key("code") && (map.contains_key("data") || map.contains_key("message"))
}

/// Pick the most specific human-readable reason out of an error body
pub(crate) fn rejection_message(value: &Value) -> Option<String> {
    let candidates = [
        value.get("data").and_then(|d| d.get("error")),
        value.get("error"),
        value.get("detail"),
        value.get("message"),
    ];

    candidates.into_iter().flatten().find_map(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    })
}

fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Page, Task};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_envelope_data_is_unwrapped() {
        let body = bytes(json!({"code": 200, "message": "success", "data": {"total": 0, "items": []}}));
        let page: Option<Page<Task>> = decode_envelope(&body, "/crawl/tasks").unwrap();

        assert_eq!(page.unwrap().total, 0);
    }

    #[test]
    fn test_bare_payload_is_accepted() {
        let body = bytes(json!({"valid": true, "message": "ok"}));
        let value: Option<Value> = decode_envelope(&body, "/templates/validate").unwrap();

        assert_eq!(value.unwrap()["valid"], json!(true));
    }

    #[test]
    fn test_rejecting_envelope_code_is_an_error() {
        let body = bytes(json!({"code": 403, "message": "Cannot delete builtin template", "data": null}));
        let err = decode_envelope::<Value>(&body, "/templates/1").unwrap_err();

        assert!(err.is_forbidden());
        assert_eq!(err.to_string(), "Cannot delete builtin template (status 403)");
    }

    #[test]
    fn test_empty_body_has_no_data() {
        assert!(decode_envelope::<Value>(b"", "/crawl/tasks/1").unwrap().is_none());
        assert!(decode_envelope::<Value>(b"null", "/crawl/tasks/1").unwrap().is_none());
    }

    #[test]
    fn test_rejection_message_precedence() {
        let value = json!({"data": {"error": "from data"}, "detail": "from detail"});
        assert_eq!(rejection_message(&value).as_deref(), Some("from data"));

        let value = json!({"detail": "Template not found"});
        assert_eq!(rejection_message(&value).as_deref(), Some("Template not found"));

        assert_eq!(rejection_message(&json!({})), None);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = ApiClient::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_settings_and_override() {
        let settings = ApiSettings {
            base_url: "http://crawler.internal:9000/api/".to_string(),
            ..Default::default()
        };

        let client = ApiClient::with_override(&settings, None).unwrap();
        assert_eq!(client.base_url(), "http://crawler.internal:9000/api");

        let client = ApiClient::with_override(&settings, Some("http://localhost:1234/api".to_string())).unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234/api");
    }

    #[tokio::test]
    async fn test_http_error_carries_server_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/crawl/tasks/9"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Task not found"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(&format!("{}/api/", server.uri()), Duration::from_secs(5)).unwrap();
        let err = client
            .get::<Value>("/crawl/tasks/9")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("Task not found"));
    }

    #[tokio::test]
    async fn test_http_error_without_body_uses_reason() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/crawl/tasks/3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.delete("/crawl/tasks/3").await.unwrap_err();

        assert!(err.is_server_fault());
        assert_eq!(err.to_string(), "Internal Server Error (status 500)");
    }
}
