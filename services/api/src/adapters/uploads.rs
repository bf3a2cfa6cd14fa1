//! services/api/src/adapters/uploads.rs
//!
//! Local-disk implementation of the `UploadStore` port. Images are written to a
//! temporary directory first and moved into `{upload_dir}/{question_id}/` once
//! complete, so a half-written file is never served.

use async_trait::async_trait;
use contest_board_core::ports::{PortError, PortResult, UploadStore};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;
use uuid::Uuid;

/// URL prefix the router serves `upload_dir` under.
pub const PUBLIC_UPLOAD_PREFIX: &str = "/images/uploads";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Gif,
    Png,
}

impl ImageKind {
    /// Identifies an image by its leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if data.starts_with(PNG) {
            Some(Self::Png)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Png => "png",
        }
    }
}

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

/// Reduces a client-supplied filename to a safe basename with the extension
/// matching the sniffed image kind.
pub fn sanitize_file_name(original: &str, kind: ImageKind) -> String {
    // Browsers on Windows may send the full path.
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    let cleaned = UNSAFE_CHARS_RE.replace_all(stem, "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c == '_');
    let stem = if cleaned.is_empty() { "image" } else { cleaned };
    format!("{}.{}", stem, kind.extension())
}

pub struct LocalUploadStore {
    upload_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl LocalUploadStore {
    pub fn new(upload_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            tmp_dir: tmp_dir.into(),
        }
    }
}

fn io_error(context: &str, e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("{}: {}", context, e))
}

#[async_trait]
impl UploadStore for LocalUploadStore {
    async fn store(
        &self,
        question_id: Uuid,
        original_name: &str,
        data: &[u8],
    ) -> PortResult<String> {
        let kind = ImageKind::sniff(data).ok_or_else(|| {
            PortError::Invalid("Only jpeg, gif and png images are accepted".to_string())
        })?;
        let file_name = sanitize_file_name(original_name, kind);

        tokio::fs::create_dir_all(&self.tmp_dir)
            .await
            .map_err(|e| io_error("Failed to create the temporary upload directory", e))?;
        let tmp_path = self.tmp_dir.join(format!("{}.part", Uuid::new_v4()));
        tokio::fs::write(&tmp_path, data)
            .await
            .map_err(|e| io_error("Failed to write the uploaded file", e))?;

        let target_dir = self.upload_dir.join(question_id.to_string());
        let target = target_dir.join(&file_name);
        let moved = async {
            tokio::fs::create_dir_all(&target_dir).await?;
            tokio::fs::rename(&tmp_path, &target).await
        }
        .await;

        if let Err(e) = moved {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_error("Failed to move the uploaded file into place", e));
        }

        debug!(question_id = %question_id, file = %target.display(), "Stored upload");
        Ok(format!("{}/{}/{}", PUBLIC_UPLOAD_PREFIX, question_id, file_name))
    }
}
