//! Streaming query decoder.
//!
//! The service answers `POST /v1/query` with `stream: true` as a chunked
//! body of newline-terminated frames:
//!
//! ```text
//! data: {"delta":"Hello"}
//! data: {"delta":" world"}
//! data: {"done":true}
//! ```
//!
//! Decoding is split in two layers:
//!
//! - [`FrameDecoder`] is a pure state machine: feed it raw byte chunks with
//!   [`push`](FrameDecoder::push) and it returns the events completed by
//!   that chunk. It owns no I/O and is reusable over any byte source.
//! - [`EventStream`] drives a `FrameDecoder` from an HTTP response body,
//!   racing every read against the request deadline and cancellation
//!   token. It implements [`futures::Stream`] and also exposes a pull-style
//!   [`next_event`](EventStream::next_event).
//!
//! # Framing rules
//!
//! 1. Bytes are decoded as UTF-8 statefully: a multi-byte character split
//!    across chunks is held back until its remaining bytes arrive.
//! 2. Only complete (newline-terminated) lines are frames; the trailing
//!    fragment waits for the next chunk.
//! 3. Lines without the `data: ` marker are ignored.
//! 4. Payloads that are not JSON, or JSON of an unknown shape, are skipped.
//!    They never end the stream.
//! 5. Events come out in the order their frames arrived.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

/// Prefix of an application data frame.
pub const FRAME_MARKER: &str = "data: ";

/// One decoded streaming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental fragment of generated text.
    Delta(String),
    /// Generation finished normally.
    Done,
    /// Generation failed on the server.
    Error(String),
}

impl StreamEvent {
    /// `Done` and `Error` end a well-formed stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    pub fn as_delta(&self) -> Option<&str> {
        match self {
            Self::Delta(text) => Some(text),
            _ => None,
        }
    }

    /// Map a frame payload onto an event. `error` wins over `done`, which
    /// wins over `delta`.
    fn from_payload(payload: &Value) -> Option<Self> {
        if let Some(message) = payload.get("error").and_then(Value::as_str) {
            return Some(Self::Error(message.to_string()));
        }
        if payload.get("done").and_then(Value::as_bool) == Some(true) {
            return Some(Self::Done);
        }
        payload
            .get("delta")
            .and_then(Value::as_str)
            .map(|delta| Self::Delta(delta.to_string()))
    }
}

/// Incremental `data:` frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk.
    pending: Vec<u8>,
    /// Text after the last newline.
    line: String,
    /// Bytes of `line` already searched for a newline.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the events whose frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.decode_utf8(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.line[self.scanned..].find('\n') {
            let end = self.scanned + offset;
            if let Some(event) = parse_frame(&self.line[start..end]) {
                events.push(event);
            }
            start = end + 1;
            self.scanned = start;
        }

        // Consumed frames are removed once per chunk; the tail is never rescanned.
        self.line.drain(..start);
        self.scanned = self.line.len();
        events
    }

    /// End of input. An unterminated trailing line is not a frame and is
    /// dropped; returns it for diagnostics.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.line.push(char::REPLACEMENT_CHARACTER);
            self.pending.clear();
        }
        self.scanned = 0;
        let rest = std::mem::take(&mut self.line);
        (!rest.is_empty()).then_some(rest)
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.line.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    // `valid` is checked by from_utf8 above.
                    self.line
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            self.line.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn parse_frame(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(FRAME_MARKER)?;
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            let event = StreamEvent::from_payload(&value);
            if event.is_none() {
                tracing::debug!(frame = payload, "skipping frame with unknown shape");
            }
            event
        }
        Err(err) => {
            tracing::debug!(frame = payload, error = %err, "skipping malformed frame");
            None
        }
    }
}

type ByteStream = BoxStream<'static, std::result::Result<Bytes, reqwest::Error>>;

struct StreamState {
    body: ByteStream,
    decoder: FrameDecoder,
    ready: std::collections::VecDeque<StreamEvent>,
    deadline: Instant,
    timeout: std::time::Duration,
    cancel: CancellationToken,
    finished: bool,
}

impl StreamState {
    async fn next(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                if event.is_terminal() {
                    self.finish();
                }
                tracing::trace!(?event, "stream event");
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }

            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(ClientError::cancelled()),
                _ = tokio::time::sleep_until(self.deadline) => {
                    tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "stream timed out");
                    Err(ClientError::timeout(self.timeout))
                }
                chunk = self.body.next() => Ok(chunk),
            };

            match chunk {
                Ok(Some(Ok(bytes))) => self.ready.extend(self.decoder.push(&bytes)),
                Ok(Some(Err(err))) => {
                    self.finish();
                    return Some(Err(ClientError::streaming(err)));
                }
                Ok(None) => {
                    if let Some(rest) = self.decoder.finish() {
                        tracing::debug!(rest = %rest, "discarding unterminated trailing line");
                    }
                    self.finished = true;
                }
                Err(err) => {
                    self.finish();
                    return Some(Err(err));
                }
            }
        }
    }

    /// Stop reading; anything still queued is discarded and the body is
    /// dropped, which closes the connection.
    fn finish(&mut self) {
        self.finished = true;
        self.ready.clear();
        self.body = futures::stream::empty().boxed();
    }
}

/// Lazily decoded events of one streaming query.
///
/// Yields `Ok(event)` per frame in arrival order. The sequence ends after a
/// `Done` or `Error` event, after the first `Err`, or when the server
/// closes the body.
pub struct EventStream {
    inner: BoxStream<'static, Result<StreamEvent>>,
}

impl EventStream {
    pub(crate) fn new(
        body: ByteStream,
        deadline: Instant,
        timeout: std::time::Duration,
        cancel: CancellationToken,
    ) -> Self {
        let state = StreamState {
            body,
            decoder: FrameDecoder::new(),
            ready: Default::default(),
            deadline,
            timeout,
            cancel,
            finished: false,
        };
        let inner = futures::stream::unfold(state, |mut state| async move {
            let item = state.next().await?;
            Some((item, state))
        })
        .boxed();
        Self { inner }
    }

    /// Build a stream over any byte source. Used for replaying captured
    /// responses; no deadline or cancellation applies beyond `timeout`.
    pub fn from_byte_stream<S>(body: S, timeout: std::time::Duration) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    {
        Self::new(
            body.boxed(),
            Instant::now() + timeout,
            timeout,
            CancellationToken::new(),
        )
    }

    /// Next event, `None` at end of stream.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        self.inner.next().await
    }

    /// Concatenate all deltas until the stream ends.
    ///
    /// An `Error` event becomes a `Streaming` error carrying the server's
    /// message.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(event) = self.next_event().await {
            match event? {
                StreamEvent::Delta(delta) => text.push_str(&delta),
                StreamEvent::Done => break,
                StreamEvent::Error(message) => return Err(ClientError::stream_message(message)),
            }
        }
        Ok(text)
    }
}

impl Stream for EventStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}
