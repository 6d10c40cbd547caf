//! Thin `reqwest` client for provider REST endpoints.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, ETAG};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::request::MutatingRequest;
use super::retry::{is_retryable_error, is_retryable_status, RetryConfig};
use super::signer::{NoopSigner, RequestSigner};
use super::{RestError, RestResult, IF_MATCH, OPC_REQUEST_ID, OPC_RETRY_TOKEN, OPC_WORK_REQUEST_ID};
use crate::config::ClientConfig;

const DEFAULT_USER_AGENT: &str = concat!("composite-ops/", env!("CARGO_PKG_VERSION"));
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Error body returned by the provider on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Response of a mutating call.
#[derive(Debug, Clone)]
pub struct OperationResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Decoded JSON body; `None` for empty bodies (typical for 202/204).
    pub body: Option<serde_json::Value>,
}

impl OperationResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of `opc-work-request-id`.
    pub fn work_request_id(&self) -> Option<&str> {
        self.header(OPC_WORK_REQUEST_ID)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(OPC_REQUEST_ID)
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG).and_then(|v| v.to_str().ok())
    }

    /// The `id` field of the returned resource, if the body carries one.
    pub fn resource_id(&self) -> Option<&str> {
        self.body.as_ref()?.get("id")?.as_str()
    }
}

/// HTTP client bound to one service endpoint.
///
/// Cheap to clone; clones share the connection pool and signer.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    endpoint: Url,
    signer: Arc<dyn RequestSigner>,
    retry: RetryConfig,
}

impl RestClient {
    /// Client with default timeout, user agent and retry policy.
    pub fn new(endpoint: &str) -> RestResult<Self> {
        Self::from_config(&ClientConfig {
            endpoint: Some(endpoint.to_string()),
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: &ClientConfig) -> RestResult<Self> {
        let raw = config
            .endpoint
            .as_deref()
            .ok_or(RestError::MissingEndpoint)?;
        let endpoint = Url::parse(raw).map_err(|source| RestError::InvalidEndpoint {
            endpoint: raw.to_string(),
            source,
        })?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
            .timeout(
                config
                    .request_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            )
            .build()?;

        Ok(Self {
            http,
            endpoint,
            signer: Arc::new(NoopSigner),
            retry: config.retry.to_retry_config(),
        })
    }

    pub fn with_signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.signer = Arc::new(signer);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Send a mutating call.
    ///
    /// Sets `opc-retry-token` (generated when the request has none, and
    /// reused across transport retries) and `if-match` when present.
    pub async fn send(&self, request: &MutatingRequest) -> RestResult<OperationResponse> {
        let path = request.path()?;
        let url = self.url(&path, &request.query)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = request
            .retry_token
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        headers.insert(OPC_RETRY_TOKEN, header_value(OPC_RETRY_TOKEN, &token)?);
        if let Some(etag) = &request.if_match {
            headers.insert(IF_MATCH, header_value(IF_MATCH, etag)?);
        }

        let body = request
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|source| RestError::Json {
                what: "request body",
                source,
            })?;

        log::debug!("{} {}", request.method, url);
        let response = self
            .execute(request.method.clone(), url, headers, body)
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&bytes).map_err(|source| RestError::Json {
                    what: "response body",
                    source,
                })?,
            )
        };

        Ok(OperationResponse {
            status,
            headers,
            body,
        })
    }

    /// GET `path` and decode the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, what: &'static str) -> RestResult<T> {
        let url = self.url(path, &[])?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = self.execute(Method::GET, url, headers, None).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| RestError::Json { what, source })
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> RestResult<Url> {
        let joined = format!(
            "{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|source| RestError::InvalidEndpoint {
            endpoint: joined.clone(),
            source,
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Send one logical call, retrying transient failures.
    ///
    /// Returns the response only for 2xx statuses.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> RestResult<reqwest::Response> {
        let attempts = self.retry.attempts();
        let mut retry = 0;
        loop {
            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(body) = &body {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }
            let mut request = builder.build()?;
            self.signer.sign(&mut request)?;

            let last_attempt = retry + 1 >= attempts;
            match self.http.execute(request).await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if !last_attempt && is_retryable_status(response.status()) => {
                    let delay = self.retry.delay(retry, Some(response.headers()));
                    log::debug!(
                        "{method} {url} returned {}, retry {}/{} in {delay:?}",
                        response.status(),
                        retry + 1,
                        attempts - 1
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Err(service_error(response).await),
                Err(e) if !last_attempt && is_retryable_error(&e) => {
                    let delay = self.retry.delay(retry, None);
                    log::debug!(
                        "{method} {url} failed ({e}), retry {}/{} in {delay:?}",
                        retry + 1,
                        attempts - 1
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(RestError::Http(e)),
            }
            retry += 1;
        }
    }
}

fn header_value(name: &str, value: &str) -> RestResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| RestError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

async fn service_error(response: reqwest::Response) -> RestError {
    let status = response.status();
    let request_id = response
        .headers()
        .get(OPC_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = response.text().await.unwrap_or_default();
    let parsed: Option<ServiceErrorBody> = serde_json::from_str(&text).ok();
    let code = parsed.as_ref().and_then(|b| b.code.clone());
    let message = parsed
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text.clone()
            }
        });
    log::debug!("Service error {status}: {message}");
    RestError::Service {
        status: status.as_u16(),
        code,
        message,
        request_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_preserves_endpoint_base_path() {
        let client = RestClient::new("https://example.com/base/").expect("valid endpoint");
        let url = client
            .url("/20200407/deployments", &[("limit".into(), "10".into())])
            .expect("valid url");
        assert_eq!(
            url.as_str(),
            "https://example.com/base/20200407/deployments?limit=10"
        );
    }

    #[test]
    fn test_missing_and_invalid_endpoint() {
        assert!(matches!(
            RestClient::from_config(&ClientConfig::default()),
            Err(RestError::MissingEndpoint)
        ));
        assert!(matches!(
            RestClient::new("not a url"),
            Err(RestError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_operation_response_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert(OPC_WORK_REQUEST_ID, HeaderValue::from_static("wr-1"));
        headers.insert(ETAG, HeaderValue::from_static("etag-7"));
        let response = OperationResponse {
            status: 202,
            headers,
            body: Some(serde_json::json!({"id": "backup-1", "lifecycleState": "UPDATING"})),
        };
        assert_eq!(response.work_request_id(), Some("wr-1"));
        assert_eq!(response.etag(), Some("etag-7"));
        assert_eq!(response.resource_id(), Some("backup-1"));
        assert_eq!(response.request_id(), None);
    }
}
