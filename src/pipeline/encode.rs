//! Attachment encoding: `UploadedFile` → base64 payload for the model API.
//!
//! Model APIs accept file content inline in the JSON request body, base64
//! encoded and tagged with its media type. Encoding happens once per file;
//! the resulting [`Attachment`] is cloned cheaply into retries.

use crate::pipeline::input::UploadedFile;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// How an attachment is carried in a model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// `application/pdf`: sent as a base64 document.
    Pdf,
    /// `image/*` formats the vision endpoints accept.
    Image,
    /// Textual content (`text/*`, JSON, XML): decoded and sent as text.
    Text,
    /// Anything else (Office files, archives): skipped by the model clients.
    Other,
}

impl AttachmentKind {
    pub fn for_media_type(media_type: &str) -> Self {
        match media_type {
            "application/pdf" => AttachmentKind::Pdf,
            "image/png" | "image/jpeg" | "image/gif" | "image/webp" => AttachmentKind::Image,
            t if t.starts_with("text/")
                || t == "application/json"
                || t == "application/xml" =>
            {
                AttachmentKind::Text
            }
            _ => AttachmentKind::Other,
        }
    }
}

/// One encoded file ready for the request body.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub media_type: String,
    pub kind: AttachmentKind,
    /// Base64 (standard alphabet, padded) of the raw bytes.
    pub data: String,
}

impl Attachment {
    /// Decode the payload back to UTF-8 text, for [`AttachmentKind::Text`]
    /// attachments. Invalid UTF-8 is replaced rather than rejected.
    pub fn text(&self) -> Option<String> {
        STANDARD
            .decode(&self.data)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Convert to an edgequake-llm [`ImageData`] for provider-backed calls.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data.clone(), self.media_type.clone())
    }
}

/// Base64-encode one upload.
pub fn encode_upload(file: &UploadedFile) -> Attachment {
    let data = STANDARD.encode(&file.bytes);
    debug!(
        "Encoded {} ({}) → {} bytes base64",
        file.file_name,
        file.media_type,
        data.len()
    );
    Attachment {
        file_name: file.file_name.clone(),
        media_type: file.media_type.clone(),
        kind: AttachmentKind::for_media_type(&file.media_type),
        data,
    }
}

/// Encode a batch, preserving upload order.
pub fn encode_uploads(files: &[UploadedFile]) -> Vec<Attachment> {
    files.iter().map(encode_upload).collect()
}
