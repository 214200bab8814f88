//! Request executor.
//!
//! Every call goes through [`Executor`], which:
//!
//! 1. resolves the endpoint path against the configured base URL,
//! 2. injects `Authorization: Bearer <credential>` (caller headers can add
//!    to the request but never replace this one),
//! 3. races the exchange against a deadline of `config.timeout` started
//!    when the call begins, and against the handle's cancellation token,
//! 4. normalizes failures into [`ClientError`],
//! 5. returns the decoded JSON body, or for streaming calls an
//!    [`EventStream`] over the still-open response body.
//!
//! The deadline future lives inside the call, so it is dropped the moment
//! the call completes and nothing outlives the request.

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::stream::EventStream;
use crate::upload::{into_form, FormPart};

/// Request body variants.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<FormPart>),
}

/// Description of one HTTP exchange.
///
/// The path is given as segments and each one is percent-encoded, so ids
/// containing `/` or `?` cannot escape their position.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::GET, segments)
    }

    pub fn post<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::POST, segments)
    }

    pub fn delete<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::DELETE, segments)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json(mut self, body: &impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            ClientError::invalid_request(format!("Failed to encode request body: {}", e))
        })?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// Shared HTTP machinery behind [`Client`](crate::client::Client).
#[derive(Clone)]
pub struct Executor {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("docrag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::invalid_request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Same connection pool and config, different cancellation token.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            http: self.http.clone(),
            config: Arc::clone(&self.config),
            cancel,
        }
    }

    /// Perform the exchange and return the JSON body untouched.
    ///
    /// An empty 2xx body decodes to `Value::Null`.
    pub async fn execute(&self, request: ApiRequest) -> Result<Value> {
        let deadline = Instant::now() + self.config.timeout;
        let response = self.send(request, deadline).await?;

        let bytes = self
            .race(deadline, async {
                response.bytes().await.map_err(ClientError::network)
            })
            .await?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(ClientError::unexpected_response)
    }

    /// Perform the exchange and decode the body into `T`.
    pub async fn execute_as<T: serde::de::DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let value = self.execute(request).await?;
        serde_json::from_value(value).map_err(ClientError::unexpected_response)
    }

    /// Open a streaming exchange. A non-2xx status fails here, before any
    /// body is consumed.
    pub async fn open_stream(&self, request: ApiRequest) -> Result<EventStream> {
        let deadline = Instant::now() + self.config.timeout;
        let response = self.send(request, deadline).await?;
        Ok(EventStream::new(
            response.bytes_stream().boxed(),
            deadline,
            self.config.timeout,
            self.cancel.clone(),
        ))
    }

    /// Send the request and wait for the response head. Non-2xx responses
    /// are read and turned into `Http` errors.
    async fn send(&self, request: ApiRequest, deadline: Instant) -> Result<reqwest::Response> {
        let method = request.method.clone();
        let path = request.path();
        let builder = self.build(request)?;

        tracing::debug!(%method, %path, "sending request");
        let started = std::time::Instant::now();

        let response = self
            .race(deadline, async {
                builder.send().await.map_err(ClientError::network)
            })
            .await?;

        let status = response.status();
        tracing::debug!(
            %method,
            %path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response received"
        );

        if status.is_success() {
            return Ok(response);
        }

        // The body is best-effort: an unreadable body still yields `HTTP <status>`.
        let body = self
            .race(deadline, async { Ok(response.bytes().await.unwrap_or_default()) })
            .await?;
        let err = ClientError::from_response(status.as_u16(), &body);
        tracing::warn!(
            %method,
            %path,
            status = status.as_u16(),
            code = err.code.as_deref().unwrap_or(""),
            "request failed: {}",
            err.message
        );
        Err(err)
    }

    fn build(&self, request: ApiRequest) -> Result<reqwest::RequestBuilder> {
        let url = self.url(&request)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| ClientError::invalid_request(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| ClientError::invalid_request(format!("invalid header value: {}", e)))?;
            headers.append(name, value);
        }
        let mut bearer = HeaderValue::try_from(format!("Bearer {}", self.config.api_key))
            .map_err(|_| ClientError::invalid_request("api key contains invalid header characters"))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let builder = self.http.request(request.method, url).headers(headers);
        Ok(match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(parts) => builder.multipart(into_form(parts)?),
        })
    }

    fn url(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = Url::parse(self.config.base())
            .map_err(|e| ClientError::invalid_request(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::invalid_request("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(&request.segments);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    async fn race<T>(&self, deadline: Instant, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!("request cancelled");
                Err(ClientError::cancelled())
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(timeout_ms = self.config.timeout.as_millis() as u64, "request timed out");
                Err(ClientError::timeout(self.config.timeout))
            }
            result = fut => result,
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
