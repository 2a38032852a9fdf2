//! Mime-driven encoding of document contents for the durable store.
//!
//! Text documents are stored as UTF-8 strings so the store stays readable;
//! everything else is base64. The choice depends only on the mime type, so
//! persisting and merging always agree.

use crate::error::PipelineError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

const TEXT_APPLICATION_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-yaml",
    "application/yaml",
    "application/toml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    Utf8,
    Base64,
}

impl ContentEncoding {
    pub fn for_mime(mime_type: &str) -> Self {
        if is_text_mime(mime_type) {
            ContentEncoding::Utf8
        } else {
            ContentEncoding::Base64
        }
    }
}

/// Whether documents of this mime type go through metadata extraction and
/// are stored as text.
pub fn is_text_mime(mime_type: &str) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence.starts_with("text/")
        || TEXT_APPLICATION_TYPES.contains(&essence.as_str())
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
}

pub fn encode(encoding: ContentEncoding, contents: &[u8]) -> Result<String, PipelineError> {
    match encoding {
        ContentEncoding::Utf8 => String::from_utf8(contents.to_vec())
            .map_err(|e| PipelineError::InvalidUtf8(e.utf8_error().to_string())),
        ContentEncoding::Base64 => Ok(STANDARD.encode(contents)),
    }
}

pub fn decode(encoding: ContentEncoding, stored: &str) -> Result<Bytes, PipelineError> {
    match encoding {
        ContentEncoding::Utf8 => Ok(Bytes::copy_from_slice(stored.as_bytes())),
        ContentEncoding::Base64 => STANDARD
            .decode(stored)
            .map(Bytes::from)
            .map_err(|e| PipelineError::Encoding(e.to_string())),
    }
}
