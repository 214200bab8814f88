//! The service client.
//!
//! [`Client`] maps each endpoint to one method. Each call is one HTTP
//! exchange through the [`Executor`]; there is no retry and no shared
//! mutable state, so a `Client` can be cloned and used from many tasks at
//! once.
//!
//! | Method | HTTP | Path |
//! |--------|------|------|
//! | [`upload`](Client::upload) | `POST` multipart | `/v1/files/upload` |
//! | [`list_files`](Client::list_files) | `GET` | `/v1/files?datasetId=` |
//! | [`get_file`](Client::get_file) | `GET` | `/v1/files/{fileId}?datasetId=` |
//! | [`delete_file`](Client::delete_file) | `DELETE` | `/v1/files/{fileId}?datasetId=` |
//! | [`delete_dataset`](Client::delete_dataset) | `DELETE` | `/v1/datasets/{datasetId}/files` |
//! | [`delete_all`](Client::delete_all) | `DELETE` | `/v1/files` |
//! | [`search`](Client::search) | `POST` | `/v1/search` |
//! | [`query`](Client::query) | `POST` | `/v1/query` (`stream: false`) |
//! | [`query_stream`](Client::query_stream) | `POST` | `/v1/query` (`stream: true`) |
//! | [`create_token`](Client::create_token) | `POST` | `/v1/tokens/create` |
//!
//! # Example
//!
//! ```rust,no_run
//! use docrag::{Client, QuestionRequest, StreamEvent};
//!
//! # async fn example() -> docrag::Result<()> {
//! let client = Client::new("sk_live_...")?;
//!
//! let request = QuestionRequest::new("handbook", "How do I request leave?")
//!     .filter("department", "hr");
//! let mut events = client.query_stream(&request).await?;
//! while let Some(event) = events.next_event().await {
//!     match event? {
//!         StreamEvent::Delta(text) => print!("{}", text),
//!         StreamEvent::Done => break,
//!         StreamEvent::Error(message) => eprintln!("server error: {}", message),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::executor::{ApiRequest, Executor};
use crate::models::{
    DeleteResponse, FileList, FileMetadata, QueryBody, QueryResult, QuestionRequest,
    SearchResponse, TokenRequest, TokenResponse, UploadResponse, DEFAULT_TOKEN_TTL_SECS,
};
use crate::stream::EventStream;
use crate::upload::{build_parts, UploadFiles, UploadOptions};

/// Async client for the document ingestion and RAG service.
#[derive(Debug, Clone)]
pub struct Client {
    executor: Executor,
}

impl Client {
    /// Build a client from a credential or a full [`ClientConfig`].
    ///
    /// Fails with `InvalidRequest` when the config does not validate.
    pub fn new(config: impl Into<ClientConfig>) -> Result<Self> {
        let config = config.into();
        config
            .validate()
            .map_err(|e| ClientError::invalid_request(format!("invalid client config: {:#}", e)))?;
        Ok(Self {
            executor: Executor::new(config)?,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    /// A handle whose calls also fail with `Cancelled` once `token` fires.
    ///
    /// The handle shares this client's connection pool. Calls made through
    /// other handles are not affected by the token.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            executor: self.executor.with_cancellation(token),
        }
    }

    /// Send an arbitrary request and return the JSON body as received.
    pub async fn request(&self, request: ApiRequest) -> Result<Value> {
        self.executor.execute(request).await
    }

    /// Upload one or more files into a dataset.
    ///
    /// `files` takes a single [`UploadFile`](crate::upload::UploadFile) or
    /// a collection; either way every file goes out as a `file` part.
    pub async fn upload(
        &self,
        dataset_id: &str,
        files: impl Into<UploadFiles>,
        options: &UploadOptions,
    ) -> Result<UploadResponse> {
        let parts = build_parts(dataset_id, files.into(), options)?;
        let request = ApiRequest::post(["v1", "files", "upload"]).multipart(parts);
        self.executor.execute_as(request).await
    }

    pub async fn list_files(&self, dataset_id: &str) -> Result<FileList> {
        let request = ApiRequest::get(["v1", "files"]).query("datasetId", dataset_id);
        self.executor.execute_as(request).await
    }

    pub async fn get_file(&self, dataset_id: &str, file_id: &str) -> Result<FileMetadata> {
        let request = ApiRequest::get(["v1", "files", file_id]).query("datasetId", dataset_id);
        self.executor.execute_as(request).await
    }

    pub async fn delete_file(&self, dataset_id: &str, file_id: &str) -> Result<DeleteResponse> {
        let request = ApiRequest::delete(["v1", "files", file_id]).query("datasetId", dataset_id);
        self.execute_delete(request).await
    }

    /// Delete every file of one dataset.
    pub async fn delete_dataset(&self, dataset_id: &str) -> Result<DeleteResponse> {
        let request = ApiRequest::delete(["v1", "datasets", dataset_id, "files"]);
        self.execute_delete(request).await
    }

    /// Delete every file the credential can reach.
    pub async fn delete_all(&self) -> Result<DeleteResponse> {
        self.execute_delete(ApiRequest::delete(["v1", "files"])).await
    }

    /// Delete endpoints may answer with an empty body.
    async fn execute_delete(&self, request: ApiRequest) -> Result<DeleteResponse> {
        match self.executor.execute(request).await? {
            Value::Null => Ok(DeleteResponse::default()),
            value => serde_json::from_value(value).map_err(ClientError::unexpected_response),
        }
    }

    /// Semantic search without generation.
    pub async fn search(&self, request: &QuestionRequest) -> Result<SearchResponse> {
        let request = ApiRequest::post(["v1", "search"]).json(request)?;
        self.executor.execute_as(request).await
    }

    /// Retrieval plus generation, answered in one response.
    pub async fn query(&self, request: &QuestionRequest) -> Result<QueryResult> {
        let request = ApiRequest::post(["v1", "query"]).json(&QueryBody::new(request, false))?;
        self.executor.execute_as(request).await
    }

    /// Retrieval plus generation, answered as a stream of events.
    ///
    /// A non-2xx status fails here; failures after that surface as `Err`
    /// items of the returned stream.
    pub async fn query_stream(&self, request: &QuestionRequest) -> Result<EventStream> {
        let request = ApiRequest::post(["v1", "query"])
            .header("Accept", "text/event-stream")
            .json(&QueryBody::new(request, true))?;
        self.executor.open_stream(request).await
    }

    /// Streamed query collected into the full answer text.
    pub async fn query_text(&self, request: &QuestionRequest) -> Result<String> {
        self.query_stream(request).await?.collect_text().await
    }

    /// Issue a frontend token for one dataset, valid for `ttl_seconds`
    /// (default one hour).
    pub async fn create_token(
        &self,
        dataset_id: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<TokenResponse> {
        let body = TokenRequest {
            dataset_id,
            ttl_seconds: ttl_seconds.unwrap_or(DEFAULT_TOKEN_TTL_SECS),
        };
        let request = ApiRequest::post(["v1", "tokens", "create"]).json(&body)?;
        self.executor.execute_as(request).await
    }
}
