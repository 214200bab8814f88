//! Wire types exchanged with the service.
//!
//! Request bodies serialize to the camelCase JSON the service expects.
//! Response types keep any field they do not model in a flattened `extra`
//! map, so a server that adds optional fields never breaks the client and
//! nothing is silently dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default lifetime of a frontend token, in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Metadata of a previously uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub dataset_id: String,
    pub file_id: String,
    #[serde(default)]
    pub storage_path: Option<String>,
    pub original_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `POST /v1/files/upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub files: Vec<FileMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `GET /v1/files`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of the delete endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Exact-match constraint on a metadata key.
///
/// Serializes as `{"key": ..., "match": {"value": ...}}`. Multiple filters
/// on one request are combined with AND by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub key: String,
    #[serde(rename = "match")]
    pub matches: FilterMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterMatch {
    pub value: Value,
}

impl SearchFilter {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            matches: FilterMatch {
                value: value.into(),
            },
        }
    }
}

/// A question against one dataset, with optional metadata filters.
///
/// Sent as-is to `POST /v1/search`; `query`, `query_stream` and `query_text`
/// send it with the `stream` flag added.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub dataset_id: String,
    pub question: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<SearchFilter>,
}

impl QuestionRequest {
    pub fn new(dataset_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            question: question.into(),
            filters: Vec::new(),
        }
    }

    /// Append a filter. Order is preserved on the wire.
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(SearchFilter::new(key, value));
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = SearchFilter>) -> Self {
        self.filters.extend(filters);
        self
    }
}

/// Body of `POST /v1/query`.
///
/// The `stream` flag is set by the client method, not by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryBody<'a> {
    pub dataset_id: &'a str,
    pub question: &'a str,
    pub stream: bool,
    #[serde(skip_serializing_if = "no_filters")]
    pub filters: &'a [SearchFilter],
}

fn no_filters(filters: &&[SearchFilter]) -> bool {
    filters.is_empty()
}

impl<'a> QueryBody<'a> {
    pub(crate) fn new(request: &'a QuestionRequest, stream: bool) -> Self {
        Self {
            dataset_id: &request.dataset_id,
            question: &request.question,
            stream,
            filters: &request.filters,
        }
    }
}

/// One retrieved fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub score: f64,
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `POST /v1/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of a non-streaming `POST /v1/query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SearchResult>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /v1/tokens/create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenRequest<'a> {
    pub dataset_id: &'a str,
    pub ttl_seconds: u64,
}

/// A dataset-scoped frontend token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
