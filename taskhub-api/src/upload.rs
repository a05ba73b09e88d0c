/// Attachment upload validation and storage
///
/// An upload is accepted only if:
///
/// 1. its extension is in `UPLOAD_ALLOWED_EXTENSIONS`
/// 2. it is non-empty and at most `UPLOAD_MAX_SIZE` bytes
/// 3. the declared MIME type (if any) belongs to the extension
/// 4. binary formats start with their file signature
///
/// Accepted files are written to `<UPLOAD_DIR>/<sha256[..2]>/<uuid>.<ext>`.

use axum::extract::Multipart;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use taskhub_shared::models::attachment::{shard_dir, Attachment};
use thiserror::Error;
use uuid::Uuid;

use crate::{config::UploadConfig, error::ApiError};

/// Multipart field carrying the file
pub const FILE_FIELD: &str = "file";

const MAX_ORIGINAL_NAME_LEN: usize = 255;

const GENERIC_MIME: &str = "application/octet-stream";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("No file was uploaded in the 'file' field")]
    Missing,

    #[error("File is empty")]
    Empty,

    #[error("File exceeds the maximum size of {max} bytes")]
    TooLarge { max: usize },

    #[error("File type .{0} is not allowed")]
    ExtensionNotAllowed(String),

    #[error("Declared content type {declared} does not match .{extension} files")]
    MimeMismatch { declared: String, extension: String },

    #[error("File content is not a valid .{0} file")]
    SignatureMismatch(String),
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            other => ApiError::field(FILE_FIELD, other.to_string()),
        }
    }
}

/// Canonical MIME types for each supported extension
///
/// The first entry is what gets stored when the client sends no usable type.
fn mime_types(extension: &str) -> &'static [&'static str] {
    match extension {
        "jpg" | "jpeg" => &["image/jpeg", "image/pjpeg"],
        "png" => &["image/png"],
        "gif" => &["image/gif"],
        "pdf" => &["application/pdf"],
        "doc" => &["application/msword"],
        "docx" => &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
        "xls" => &["application/vnd.ms-excel"],
        "xlsx" => &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
        "txt" => &["text/plain"],
        "zip" => &["application/zip", "application/x-zip-compressed"],
        _ => &[],
    }
}

/// Leading bytes every file of this type starts with
fn signatures(extension: &str) -> &'static [&'static [u8]] {
    match extension {
        "jpg" | "jpeg" => &[&[0xFF, 0xD8, 0xFF]],
        "png" => &[&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]],
        "gif" => &[b"GIF87a", b"GIF89a"],
        "pdf" => &[b"%PDF"],
        // OOXML documents are zip archives
        "zip" | "docx" | "xlsx" => &[b"PK\x03\x04", b"PK\x05\x06"],
        // OLE2 compound file
        "doc" | "xls" => &[&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]],
        _ => &[],
    }
}

/// A file that passed every check and is ready to store
#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub original_name: String,
    pub extension: String,
    pub mime_type: String,
    pub sha256: String,
    pub data: Bytes,
}

impl ValidatedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Strips any client-side directories and bounds the length
fn clean_original_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    base.chars().take(MAX_ORIGINAL_NAME_LEN).collect()
}

pub fn validate_upload(
    config: &UploadConfig,
    original_name: &str,
    declared_mime: Option<&str>,
    data: Bytes,
) -> Result<ValidatedFile, UploadError> {
    let original_name = clean_original_name(original_name);

    let extension = Path::new(&original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if extension.is_empty() || !config.allowed_extensions.contains(&extension) {
        return Err(UploadError::ExtensionNotAllowed(extension));
    }

    if data.is_empty() {
        return Err(UploadError::Empty);
    }
    if data.len() > config.max_size {
        return Err(UploadError::TooLarge { max: config.max_size });
    }

    let known = mime_types(&extension);
    let declared = declared_mime
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty() && m != GENERIC_MIME);

    let mime_type = match declared {
        Some(declared) if known.is_empty() || known.contains(&declared.as_str()) => declared,
        Some(declared) => return Err(UploadError::MimeMismatch { declared, extension }),
        None => known.first().copied().unwrap_or(GENERIC_MIME).to_string(),
    };

    let expected = signatures(&extension);
    if !expected.is_empty() && !expected.iter().any(|sig| data.starts_with(sig)) {
        return Err(UploadError::SignatureMismatch(extension));
    }
    if extension == "txt" && data.iter().take(8192).any(|b| *b == 0) {
        return Err(UploadError::SignatureMismatch(extension));
    }

    let sha256 = hex::encode(Sha256::digest(&data));

    Ok(ValidatedFile {
        original_name,
        extension,
        mime_type,
        sha256,
        data,
    })
}

/// Reads the `file` field of a multipart body
///
/// Returns the client file name, declared content type and bytes.
pub async fn read_file_field(
    multipart: &mut Multipart,
) -> Result<(String, Option<String>, Bytes), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        return Ok((file_name, content_type, data));
    }

    Err(UploadError::Missing.into())
}

/// Writes the file under the uploads directory and returns its stored name
pub async fn store(config: &UploadConfig, file: &ValidatedFile) -> std::io::Result<String> {
    let dir = config.dir.join(shard_dir(&file.sha256));
    tokio::fs::create_dir_all(&dir).await?;

    let stored_name = format!("{}.{}", Uuid::new_v4(), file.extension);
    tokio::fs::write(dir.join(&stored_name), &file.data).await?;

    tracing::debug!(stored_name = %stored_name, size = file.size(), "Stored upload");
    Ok(stored_name)
}

/// Absolute location of a stored file
pub fn stored_path(config: &UploadConfig, relative_path: &str) -> PathBuf {
    config.dir.join(relative_path)
}

/// Deletes a stored file; a missing file is not an error
pub async fn remove(config: &UploadConfig, relative_path: &str) {
    let path = stored_path(config, relative_path);

    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload"),
    }
}

/// Deletes the files of attachments whose rows are already gone
pub async fn remove_all(config: &UploadConfig, attachments: &[Attachment]) {
    for attachment in attachments {
        remove(config, &attachment.relative_path()).await;
    }
}
