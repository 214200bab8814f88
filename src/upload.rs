//! Multipart upload body.
//!
//! [`Client::upload`](crate::client::Client::upload) accepts either one
//! [`UploadFile`] or a collection of them; both normalize to
//! [`UploadFiles`] before the body is built, so a single file and a
//! one-element collection produce the same request.
//!
//! The body is first described as an ordered list of [`FormPart`]s and only
//! then converted into a `reqwest` multipart form.

use bytes::Bytes;
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{ClientError, Result};

/// Multipart field name shared by every file part.
pub const FILE_FIELD: &str = "file";

const DEFAULT_MIME: &str = "application/octet-stream";

/// One file to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl UploadFile {
    /// In-memory file. The MIME type is inferred from the file name.
    pub fn from_bytes(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_from_name(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            data: data.into(),
        }
    }

    /// Read a file from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            ClientError::invalid_request(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self::from_bytes(file_name, data))
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

/// Guess a MIME type from a file extension.
fn mime_from_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        Some("json") => "application/json",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("mp4") => "video/mp4",
        _ => DEFAULT_MIME,
    }
}

/// One or more files for a single upload call.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFiles(Vec<UploadFile>);

impl UploadFiles {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<UploadFile> for UploadFiles {
    fn from(file: UploadFile) -> Self {
        Self(vec![file])
    }
}

impl From<Vec<UploadFile>> for UploadFiles {
    fn from(files: Vec<UploadFile>) -> Self {
        Self(files)
    }
}

impl<const N: usize> From<[UploadFile; N]> for UploadFiles {
    fn from(files: [UploadFile; N]) -> Self {
        Self(files.into())
    }
}

impl FromIterator<UploadFile> for UploadFiles {
    fn from_iter<I: IntoIterator<Item = UploadFile>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Optional upload parameters, passed through to the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    pub metadata: Option<Map<String, Value>>,
    pub chunk_size: Option<u32>,
    pub chunk_overlap: Option<u32>,
}

impl UploadOptions {
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn chunk_overlap(mut self, overlap: u32) -> Self {
        self.chunk_overlap = Some(overlap);
        self
    }
}

/// One multipart field, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text { name: &'static str, value: String },
    File { name: &'static str, file: UploadFile },
}

/// Describe the multipart body: `datasetId`, every `file`, then the
/// optional `metadata` (JSON text), `chunkSize` and `chunkOverlap`.
pub fn build_parts(
    dataset_id: &str,
    files: UploadFiles,
    options: &UploadOptions,
) -> Result<Vec<FormPart>> {
    if files.is_empty() {
        return Err(ClientError::invalid_request(
            "upload requires at least one file",
        ));
    }

    let mut parts = vec![FormPart::Text {
        name: "datasetId",
        value: dataset_id.to_string(),
    }];
    parts.extend(files.0.into_iter().map(|file| FormPart::File {
        name: FILE_FIELD,
        file,
    }));

    if let Some(metadata) = &options.metadata {
        let value = serde_json::to_string(metadata)
            .map_err(|e| ClientError::invalid_request(format!("invalid metadata: {}", e)))?;
        parts.push(FormPart::Text {
            name: "metadata",
            value,
        });
    }
    if let Some(size) = options.chunk_size {
        parts.push(FormPart::Text {
            name: "chunkSize",
            value: size.to_string(),
        });
    }
    if let Some(overlap) = options.chunk_overlap {
        parts.push(FormPart::Text {
            name: "chunkOverlap",
            value: overlap.to_string(),
        });
    }
    Ok(parts)
}

/// Convert described parts into a `reqwest` form.
pub(crate) fn into_form(parts: Vec<FormPart>) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name, value),
            FormPart::File { name, file } => {
                let len = file.data.len() as u64;
                let body = reqwest::Body::from(file.data);
                let part = reqwest::multipart::Part::stream_with_length(body, len)
                    .file_name(file.file_name)
                    .mime_str(&file.mime_type)
                    .map_err(|e| {
                        ClientError::invalid_request(format!(
                            "invalid mime type '{}': {}",
                            file.mime_type, e
                        ))
                    })?;
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report() -> UploadFile {
        UploadFile::from_bytes("report.pdf", &b"%PDF-1.7"[..])
    }

    #[test]
    fn test_single_file_matches_one_element_collection() {
        let options = UploadOptions::default().chunk_size(512);
        let single = build_parts("ds1", report().into(), &options).unwrap();
        let listed = build_parts("ds1", vec![report()].into(), &options).unwrap();
        assert_eq!(single, listed);
    }

    #[test]
    fn test_part_order_and_names() {
        let files: UploadFiles = [report(), UploadFile::from_bytes("notes.txt", "hi")].into();
        let options = UploadOptions::default()
            .metadata("team", "ops")
            .chunk_size(800)
            .chunk_overlap(80);
        let parts = build_parts("ds1", files, &options).unwrap();

        let names: Vec<&str> = parts
            .iter()
            .map(|p| match p {
                FormPart::Text { name, .. } | FormPart::File { name, .. } => *name,
            })
            .collect();
        assert_eq!(
            names,
            vec!["datasetId", "file", "file", "metadata", "chunkSize", "chunkOverlap"]
        );

        match &parts[3] {
            FormPart::Text { value, .. } => {
                let parsed: Value = serde_json::from_str(value).unwrap();
                assert_eq!(parsed, json!({"team": "ops"}));
            }
            other => panic!("expected metadata text part, got {:?}", other),
        }
        assert_eq!(
            parts[4],
            FormPart::Text {
                name: "chunkSize",
                value: "800".into()
            }
        );
    }

    #[test]
    fn test_optional_fields_omitted() {
        let parts = build_parts("ds1", report().into(), &UploadOptions::default()).unwrap();
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_empty_upload_rejected() {
        let err = build_parts("ds1", Vec::<UploadFile>::new().into(), &UploadOptions::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_mime_inference() {
        assert_eq!(report().mime_type, "application/pdf");
        assert_eq!(UploadFile::from_bytes("A.MD", "").mime_type, "text/markdown");
        assert_eq!(UploadFile::from_bytes("blob", "").mime_type, DEFAULT_MIME);
        assert_eq!(
            UploadFile::from_bytes("x.bin", "")
                .with_mime_type("application/x-custom")
                .mime_type,
            "application/x-custom"
        );
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("guide.txt");
        std::fs::write(&path, "hello").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name, "guide.txt");
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(&file.data[..], b"hello");
    }

    #[tokio::test]
    async fn test_from_path_missing() {
        let err = UploadFile::from_path("/nonexistent/file.pdf")
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_into_form_rejects_bad_mime() {
        let file = report().with_mime_type("not a mime");
        let parts = build_parts("ds1", file.into(), &UploadOptions::default()).unwrap();
        assert!(into_form(parts).is_err());
    }
}
