//! Image attachments: file loading, MIME sniffing and base64 data URLs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

use crate::error::{ChatError, Result};

pub const DEFAULT_MIME: &str = "image/png";

/// An image ready to be inlined into a chat request.
///
/// `data` holds plain standard base64 without any `data:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime: String,
    pub data: String,
}

impl ImageAttachment {
    pub fn from_bytes(bytes: &[u8], mime: impl Into<String>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ChatError::InvalidImage("file is empty".to_string()));
        }
        Ok(ImageAttachment {
            mime: mime.into(),
            data: STANDARD.encode(bytes),
        })
    }

    /// Read `path`, refusing anything over `max_bytes`.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|e| {
            ChatError::InvalidImage(format!("{}: {}", path.display(), e))
        })?;
        if meta.len() > max_bytes {
            return Err(ChatError::InvalidImage(format!(
                "{} is {} bytes, limit is {}",
                path.display(),
                meta.len(),
                max_bytes
            )));
        }
        let bytes = std::fs::read(path)?;
        let mime = detect_mime(Some(path), &bytes);
        tracing::debug!(path = %path.display(), mime, size = bytes.len(), "loaded image attachment");
        Self::from_bytes(&bytes, mime)
    }

    /// Parse a `data:<mime>;base64,<payload>` URL as produced by a browser
    /// `FileReader.readAsDataURL`.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| ChatError::InvalidImage("not a data URL".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ChatError::InvalidImage("data URL has no payload".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| ChatError::InvalidImage("data URL is not base64".to_string()))?;
        if !mime.starts_with("image/") {
            return Err(ChatError::InvalidImage(format!("unsupported type {mime:?}")));
        }
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(ChatError::InvalidImage("file is empty".to_string()));
        }
        STANDARD
            .decode(payload)
            .map_err(|e| ChatError::InvalidImage(format!("bad base64: {e}")))?;
        Ok(ImageAttachment {
            mime: mime.to_string(),
            data: payload.to_string(),
        })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }

    /// Size of the decoded image in bytes.
    pub fn decoded_len(&self) -> usize {
        let pad = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        self.data.len() / 4 * 3 - pad
    }
}

/// Guess the MIME type from magic bytes, then the extension, then fall back
/// to PNG.
pub fn detect_mime(path: Option<&Path>, bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg";
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }

    let ext = path
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => DEFAULT_MIME,
    }
}
