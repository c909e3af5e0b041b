//! Attachment metadata.
//!
//! Attachments arrive from the gateway as URL references. The ingest step
//! may download one into local storage, in which case `local_path` is set;
//! otherwise only the URL metadata is handed to the provider bridge.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::AttachmentId;

/// One attachment on a turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAttachment {
    /// Unique attachment ID.
    pub attachment_id: AttachmentId,
    /// Original filename as uploaded.
    pub filename: String,
    /// MIME type, when the gateway knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Declared size in bytes.
    pub size: u64,
    /// Source URL.
    pub url: String,
    /// Local path, set once ingested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl TurnAttachment {
    /// Whether the attachment is an image by MIME type.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}
