//! Attachment ingest.
//!
//! When downloads are enabled, each attachment URL is fetched under the
//! configured byte cap and stored flat as `<attachment_id>-<sanitized
//! filename>`; the attachment's `local_path` is set for the bridge. A size
//! violation rejects the turn with `ATTACHMENT_REJECTED` and is never
//! retried. When downloads are disabled, only URL metadata travels onward.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, instrument};

use codial_core::attachments::TurnAttachment;

use crate::errors::RuntimeError;

/// Outcome of ingesting a turn's attachments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Human-readable summary for the `action` event.
    pub summary: String,
    /// How many files were downloaded.
    pub downloaded: usize,
}

/// Attachment downloader.
pub struct AttachmentIngestor {
    enabled: bool,
    max_bytes: u64,
    storage_dir: PathBuf,
    http: reqwest::Client,
}

impl AttachmentIngestor {
    /// Create an ingestor.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Internal`] when the HTTP client cannot be
    /// constructed.
    pub fn new(
        enabled: bool,
        max_bytes: u64,
        storage_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, RuntimeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RuntimeError::Internal(e.to_string()))?;

        Ok(Self {
            enabled,
            max_bytes,
            storage_dir: storage_dir.into(),
            http,
        })
    }

    /// Whether downloads are enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ingest a turn's attachments, setting `local_path` on each download.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::AttachmentRejected`] on a size violation (no retry)
    /// - [`RuntimeError::AttachmentFetch`] on download failure
    #[instrument(skip_all, fields(count = attachments.len()))]
    pub async fn ingest(
        &self,
        attachments: &mut [TurnAttachment],
    ) -> Result<IngestOutcome, RuntimeError> {
        if attachments.is_empty() {
            return Ok(IngestOutcome {
                summary: "no attachments on this turn".to_owned(),
                downloaded: 0,
            });
        }

        let image_count = attachments.iter().filter(|a| a.is_image()).count();
        let file_count = attachments.len() - image_count;
        let mut downloaded = 0usize;

        if self.enabled {
            for attachment in attachments.iter_mut() {
                self.download_one(attachment).await?;
                downloaded += 1;
            }
        }

        let mut summary = format!(
            "received {} attachment(s): {image_count} image(s), {file_count} other file(s)",
            attachments.len(),
        );
        if self.enabled {
            summary.push_str(&format!("; downloaded {downloaded}"));
        }

        Ok(IngestOutcome { summary, downloaded })
    }

    /// Fetch one attachment into local storage.
    async fn download_one(&self, attachment: &mut TurnAttachment) -> Result<(), RuntimeError> {
        if attachment.size > self.max_bytes {
            return Err(RuntimeError::AttachmentRejected(format!(
                "`{}` declares {} bytes, cap is {}",
                attachment.filename, attachment.size, self.max_bytes
            )));
        }

        let response = self
            .http
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| RuntimeError::AttachmentFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RuntimeError::AttachmentFetch(format!(
                "`{}` fetch returned {status}",
                attachment.filename
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RuntimeError::AttachmentFetch(e.to_string()))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(RuntimeError::AttachmentRejected(format!(
                "`{}` body is {} bytes, cap is {}",
                attachment.filename,
                bytes.len(),
                self.max_bytes
            )));
        }

        std::fs::create_dir_all(&self.storage_dir)
            .map_err(|e| RuntimeError::AttachmentFetch(e.to_string()))?;
        let target = self.storage_dir.join(format!(
            "{}-{}",
            attachment.attachment_id,
            sanitize_filename(&attachment.filename)
        ));
        std::fs::write(&target, &bytes).map_err(|e| RuntimeError::AttachmentFetch(e.to_string()))?;

        debug!(path = %target.display(), bytes = bytes.len(), "attachment stored");
        attachment.local_path = Some(target);
        Ok(())
    }
}

/// Strip path traversal and separators out of an uploaded filename.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .replace("..", "_")
        .replace(['/', '\\'], "_")
}

/// Convenience: the storage path an attachment would land at.
#[must_use]
pub fn storage_path(storage_dir: &Path, attachment: &TurnAttachment) -> PathBuf {
    storage_dir.join(format!(
        "{}-{}",
        attachment.attachment_id,
        sanitize_filename(&attachment.filename)
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
