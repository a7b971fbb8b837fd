//! Input handling: uploaded files, local files, media types and ceilings.
//!
//! Files reach the pipeline two ways. The HTTP service decodes multipart
//! parts into [`UploadedFile`]s; the CLI reads paths from disk with
//! [`read_local_file`]. Both end up in the same shape and go through the
//! same [`validate_uploads`] check before anything is sent to the model.
//!
//! ## Media types
//!
//! Browsers frequently send `application/octet-stream` (or nothing) for
//! PDFs dragged out of email clients. The model API rejects attachments
//! whose declared type does not match their content, so a generic or
//! missing type is replaced by one sniffed from the magic bytes.

use crate::error::CmaError;
use std::path::Path;
use tracing::debug;

/// Media type used when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// One file as received from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Build an upload, filling in a name and media type when the caller
    /// omitted them. `index` is the 0-based position among the uploads.
    pub fn new(
        file_name: Option<&str>,
        declared_type: Option<&str>,
        bytes: Vec<u8>,
        index: usize,
    ) -> Self {
        let file_name = file_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload-{}", index + 1));
        let media_type = resolve_media_type(declared_type, &bytes);
        Self {
            file_name,
            media_type,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Identify common document/image formats from their leading bytes.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Pick the media type to declare for a file.
///
/// A specific declared type is trusted; a missing or generic one falls back
/// to sniffing, then to `application/octet-stream`.
pub fn resolve_media_type(declared: Option<&str>, bytes: &[u8]) -> String {
    let declared = declared
        .map(|d| d.split(';').next().unwrap_or(d).trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty() && d != OCTET_STREAM);

    match declared {
        Some(d) => d,
        None => sniff_media_type(bytes).unwrap_or(OCTET_STREAM).to_string(),
    }
}

/// Media type implied by a file extension, for local files.
fn media_type_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "txt" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "json" => Some("application/json"),
        _ => None,
    }
}

/// Reject a batch of uploads that must not reach the model.
///
/// Runs before any outbound call: an empty batch, too many files, or a file
/// over the per-file ceiling all fail here.
pub fn validate_uploads(
    files: &[UploadedFile],
    max_file_bytes: usize,
    max_files: usize,
) -> Result<(), CmaError> {
    if files.is_empty() {
        return Err(CmaError::NoFiles);
    }
    if files.len() > max_files {
        return Err(CmaError::TooManyFiles {
            count: files.len(),
            limit: max_files,
        });
    }
    if let Some(big) = files.iter().find(|f| f.len() > max_file_bytes) {
        return Err(CmaError::FileTooLarge {
            name: big.file_name.clone(),
            size: big.len(),
            limit: max_file_bytes,
        });
    }
    Ok(())
}

/// Read a file from disk into an [`UploadedFile`].
pub async fn read_local_file(path: &Path, index: usize) -> Result<UploadedFile, CmaError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CmaError::InputReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

    let name = path.file_name().and_then(|n| n.to_str());
    let declared = media_type_from_extension(path);
    let file = UploadedFile::new(name, declared, bytes, index);
    debug!(
        "Read local file {} ({} bytes, {})",
        path.display(),
        file.len(),
        file.media_type
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_known_formats() {
        assert_eq!(sniff_media_type(b"%PDF-1.7\n"), Some("application/pdf"));
        assert_eq!(
            sniff_media_type(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
            Some("image/png")
        );
        assert_eq!(sniff_media_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_media_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_media_type(b"hello"), None);
    }

    #[test]
    fn declared_type_wins_unless_generic() {
        assert_eq!(resolve_media_type(Some("text/csv"), b"%PDF"), "text/csv");
        assert_eq!(
            resolve_media_type(Some("application/octet-stream"), b"%PDF-1.4"),
            "application/pdf"
        );
        assert_eq!(resolve_media_type(None, b"%PDF-1.4"), "application/pdf");
        assert_eq!(resolve_media_type(None, b"plain"), OCTET_STREAM);
    }

    #[test]
    fn declared_type_parameters_are_dropped() {
        assert_eq!(
            resolve_media_type(Some("Text/Plain; charset=utf-8"), b"x"),
            "text/plain"
        );
    }

    #[test]
    fn missing_name_gets_positional_default() {
        let f = UploadedFile::new(None, Some("application/pdf"), b"%PDF".to_vec(), 2);
        assert_eq!(f.file_name, "upload-3");
        let f = UploadedFile::new(Some("  "), None, b"%PDF".to_vec(), 0);
        assert_eq!(f.file_name, "upload-1");
    }

    #[test]
    fn validate_rejects_empty_batch() {
        assert!(matches!(validate_uploads(&[], 10, 5), Err(CmaError::NoFiles)));
    }

    #[test]
    fn validate_rejects_oversized_file() {
        let files = vec![
            UploadedFile::new(Some("small.pdf"), None, vec![0; 4], 0),
            UploadedFile::new(Some("big.pdf"), None, vec![0; 11], 1),
        ];
        match validate_uploads(&files, 10, 5) {
            Err(CmaError::FileTooLarge { name, size, limit }) => {
                assert_eq!(name, "big.pdf");
                assert_eq!(size, 11);
                assert_eq!(limit, 10);
            }
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_too_many_files() {
        let files: Vec<_> = (0..3)
            .map(|i| UploadedFile::new(None, None, vec![1], i))
            .collect();
        assert!(matches!(
            validate_uploads(&files, 10, 2),
            Err(CmaError::TooManyFiles { count: 3, limit: 2 })
        ));
        assert!(validate_uploads(&files, 10, 3).is_ok());
    }

    #[tokio::test]
    async fn reads_local_file_with_extension_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "three bed, two bath").unwrap();

        let file = read_local_file(&path, 0).await.unwrap();
        assert_eq!(file.file_name, "notes.txt");
        assert_eq!(file.media_type, "text/plain");
        assert_eq!(file.bytes, b"three bed, two bath");
    }

    #[tokio::test]
    async fn missing_local_file_is_an_input_error() {
        let err = read_local_file(Path::new("/definitely/not/here.pdf"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CmaError::InputReadFailed { .. }));
    }
}
