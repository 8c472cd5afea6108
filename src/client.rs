use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ChatCompletion, ChatCompletionChunk, ChatRequest};

/// How long to wait for the TCP/TLS handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on a whole request, stream included.  Reasoning models can think for minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// A boxed stream of completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// A chat completion backend.
///
/// [`DeepSeek`] talks HTTP; tests substitute scripted implementations.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Send a request and wait for the whole response.
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion>;

    /// Send a request and return the response as a stream of chunks.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream>;
}

/// Client for DeepSeek and other OpenAI-compatible chat completion APIs.
#[derive(Clone)]
pub struct DeepSeek {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl std::fmt::Debug for DeepSeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepSeek")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl DeepSeek {
    /// Create a new client for `base_url` with default timeouts.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, base_url, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if HeaderValue::from_str(&format!("Bearer {api_key}")).is_err() {
            return Err(Error::config_invalid(
                "api_key",
                "contains characters not allowed in an HTTP header",
            ));
        }
        let base_url = base_url.into();
        url::Url::parse(&base_url)
            .map_err(|e| Error::url(format!("invalid base URL {base_url:?}: {e}"), Some(e)))?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(format!("Failed to build HTTP client: {e}"), Some(Box::new(e)))
            })?;

        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            logger: None,
        })
    }

    /// Record every request, response and chunk through `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The endpoint requests are posted to.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|e| {
            Error::config_invalid("api_key", format!("not a valid header value: {e}"))
        })?;
        headers.insert(header::AUTHORIZATION, auth);
        Ok(headers)
    }

    async fn post(&self, request: &ChatRequest, headers: HeaderMap) -> Result<Response> {
        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e));
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                return Err(err);
            }
        };
        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };
        error_from_status(status_code, retry_after, &error_body)
    }
}

/// Map a failed response onto the error taxonomy.
fn error_from_status(status_code: u16, retry_after: Option<u64>, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error);
    let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
    let param = detail.as_ref().and_then(|e| e.param.clone());
    let message = detail
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status_code {
        400 | 422 => Error::bad_request(message, param),
        401 => Error::authentication(message),
        402 => Error::insufficient_balance(message),
        408 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, error_type, message),
    }
}

#[async_trait]
impl ChatService for DeepSeek {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
        let request = request.with_stream(false);
        let response = self.post(&request, self.default_headers()?).await?;
        let completion = response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })?;
        if let Some(logger) = &self.logger {
            logger.log_response(&completion);
        }
        Ok(completion)
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        let request = request.with_stream(true);
        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let response = self.post(&request, headers).await?;

        let chunks = process_sse(response.bytes_stream());
        match self.logger.clone() {
            Some(logger) => Ok(Box::pin(chunks.inspect(move |chunk| {
                if let Ok(chunk) = chunk {
                    logger.log_stream_chunk(chunk);
                }
            }))),
            None => Ok(Box::pin(chunks)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = DeepSeek::new("test-key", "https://api.deepseek.com/").unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, "https://api.deepseek.com");
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(client.endpoint(), "https://api.deepseek.com/chat/completions");

        let client = DeepSeek::with_options(
            "test-key",
            "https://beta.api.deepseek.com/beta",
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "https://beta.api.deepseek.com/beta/chat/completions");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(DeepSeek::new("key\nwith newline", "https://api.deepseek.com").is_err());
        assert!(DeepSeek::new("key", "not a url").is_err());
    }

    #[test]
    fn default_headers_use_bearer_auth() {
        let client = DeepSeek::new("sk-abc", "https://api.deepseek.com").unwrap();
        let headers = client.default_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer sk-abc");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn status_codes_map_to_errors() {
        let body = r#"{"error":{"message":"bad key","type":"authentication_error"}}"#;
        let err = error_from_status(401, None, body);
        assert!(err.is_authentication());
        assert!(err.to_string().contains("bad key"));

        assert!(matches!(
            error_from_status(402, None, "{}"),
            Error::InsufficientBalance { .. }
        ));
        assert!(error_from_status(429, Some(3), "slow down").is_rate_limit());
        assert!(error_from_status(503, None, "").is_server_error());
        assert_eq!(error_from_status(418, None, "teapot").status_code(), Some(418));

        let err = error_from_status(
            422,
            None,
            r#"{"error":{"message":"bad temperature","param":"temperature"}}"#,
        );
        assert!(matches!(err, Error::BadRequest { param: Some(ref p), .. } if p == "temperature"));
    }
}
