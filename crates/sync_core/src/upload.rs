use std::sync::Arc;

use futures::future::try_join_all;
use shared::{
    domain::{AttachmentKind, Cid},
    protocol::{Attachment, FileUpload},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{backend::MessagingBackend, notice::NoticeCategory};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{filename} is empty")]
    EmptyFile { filename: String },
    #[error("upload of {filename} failed: {reason}")]
    Rejected { filename: String, reason: String },
}

impl UploadError {
    pub fn category(&self) -> NoticeCategory {
        match self {
            UploadError::EmptyFile { .. } => NoticeCategory::Validation,
            UploadError::Rejected { .. } => NoticeCategory::Transport,
        }
    }
}

/// Result of a batch upload. A single failure fails the whole batch: the
/// attachment list is then empty and `error` is set.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub attachments: Vec<Attachment>,
    pub error: Option<UploadError>,
}

impl UploadOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub fn classify(file: &FileUpload) -> AttachmentKind {
    if let Some(kind) = sniff(&file.bytes) {
        return kind;
    }
    let declared = file
        .content_type
        .as_deref()
        .and_then(|raw| raw.split('/').next())
        .map(str::to_ascii_lowercase);
    let top_level = declared.or_else(|| {
        mime_guess::from_path(&file.filename)
            .first()
            .map(|mime| mime.type_().as_str().to_ascii_lowercase())
    });
    match top_level.as_deref() {
        Some("image") => AttachmentKind::Image,
        Some("video") => AttachmentKind::Video,
        _ => AttachmentKind::File,
    }
}

fn sniff(bytes: &[u8]) -> Option<AttachmentKind> {
    const IMAGE_SIGNATURES: &[&[u8]] = &[
        b"\x89PNG\r\n\x1a\n",
        b"\xff\xd8\xff",
        b"GIF87a",
        b"GIF89a",
        b"BM",
    ];
    if IMAGE_SIGNATURES.iter().any(|sig| bytes.starts_with(sig)) {
        return Some(AttachmentKind::Image);
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" {
        return match &bytes[8..12] {
            b"WEBP" => Some(AttachmentKind::Image),
            b"AVI " => Some(AttachmentKind::Video),
            _ => None,
        };
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(AttachmentKind::Video);
    }
    if bytes.starts_with(b"\x1a\x45\xdf\xa3") {
        return Some(AttachmentKind::Video);
    }
    None
}

#[derive(Clone)]
pub struct Uploader {
    backend: Arc<dyn MessagingBackend>,
}

impl Uploader {
    pub fn new(backend: Arc<dyn MessagingBackend>) -> Self {
        Self { backend }
    }

    pub async fn upload_files(&self, cid: &Cid, files: &[FileUpload]) -> UploadOutcome {
        if files.is_empty() {
            return UploadOutcome::default();
        }
        let uploads = files.iter().map(|file| self.upload_one(cid, file));
        match try_join_all(uploads).await {
            Ok(attachments) => {
                info!(%cid, count = attachments.len(), "upload: files uploaded");
                UploadOutcome {
                    attachments,
                    error: None,
                }
            }
            Err(err) => {
                warn!(%cid, error = %err, "upload: batch failed");
                UploadOutcome {
                    attachments: Vec::new(),
                    error: Some(err),
                }
            }
        }
    }

    async fn upload_one(&self, cid: &Cid, file: &FileUpload) -> Result<Attachment, UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::EmptyFile {
                filename: file.filename.clone(),
            });
        }
        let kind = classify(file);
        let response = match kind {
            AttachmentKind::Image => self.backend.send_image(cid, file).await,
            AttachmentKind::Video | AttachmentKind::File => self.backend.send_file(cid, file).await,
        }
        .map_err(|err| UploadError::Rejected {
            filename: file.filename.clone(),
            reason: format!("{err:#}"),
        })?;
        Ok(Attachment::uploaded(
            kind,
            response.file,
            &file.filename,
            file.size(),
        ))
    }

    pub async fn delete_remote(&self, cid: &Cid, attachment: &Attachment) {
        let result = if let Some(url) = attachment.image_url() {
            self.backend.delete_image(cid, url).await
        } else if let Some(url) = attachment.asset_url() {
            self.backend.delete_file(cid, url).await
        } else {
            return;
        };
        if let Err(err) = result {
            warn!(%cid, error = %err, "upload: failed to delete attachment");
        }
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
