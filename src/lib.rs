//! # docrag
//!
//! **Async client for a remote document-ingestion and retrieval-augmented
//! generation service.**
//!
//! The service does the heavy lifting (chunking, embedding, vector search,
//! LLM orchestration). This crate wraps its REST endpoints in typed calls:
//! it injects the bearer credential, encodes JSON and multipart bodies,
//! bounds every call with a timeout, normalizes failures into one error
//! type and decodes the streaming query response into events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   HTTP   ┌─────────────┐
//! │  Client  │──▶│  Executor  │─────────▶│ RAG service │
//! │ (typed)  │   │ auth+timer │◀─────────│             │
//! └──────────┘   └─────┬──────┘          └─────────────┘
//!                      │ streaming body
//!                      ▼
//!               ┌──────────────┐
//!               │ FrameDecoder │──▶ EventStream (Delta, Done, Error)
//!               └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docrag::{Client, QuestionRequest, UploadFile, UploadOptions};
//!
//! # async fn example() -> docrag::Result<()> {
//! let client = Client::new("sk_live_...")?;
//!
//! let file = UploadFile::from_path("handbook.pdf").await?;
//! let uploaded = client
//!     .upload("handbook", file, &UploadOptions::default().chunk_size(800))
//!     .await?;
//! println!("uploaded {} file(s)", uploaded.files.len());
//!
//! let answer = client
//!     .query(&QuestionRequest::new("handbook", "What is the leave policy?"))
//!     .await?;
//! println!("{}", answer.answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Credential, base URL and timeout; TOML and environment loading |
//! | [`error`] | `ClientError` and the normalization of HTTP/transport failures |
//! | [`models`] | Request and response types |
//! | [`executor`] | Authenticated, deadline-bound HTTP exchange |
//! | [`stream`] | Incremental `data:` frame decoder and event stream |
//! | [`upload`] | Upload files and multipart body construction |
//! | [`client`] | One method per service endpoint |
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (request/response at `debug`,
//! timeouts and non-2xx responses at `warn`, skipped stream frames at
//! `debug`). It never installs a subscriber and never logs the credential.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod stream;
pub mod upload;

pub use client::Client;
pub use config::{load_config, ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use error::{ClientError, ErrorKind, Result};
pub use models::{
    DeleteResponse, FileList, FileMetadata, QueryResult, QuestionRequest, SearchFilter,
    SearchResponse, SearchResult, TokenResponse, UploadResponse,
};
pub use stream::{EventStream, FrameDecoder, StreamEvent};
pub use tokio_util::sync::CancellationToken;
pub use upload::{UploadFile, UploadFiles, UploadOptions};
