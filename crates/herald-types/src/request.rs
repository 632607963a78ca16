//! Validated announcement requests and their cache fingerprints.

use crate::Priority;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Longest accepted language tag, e.g. `zh-hant-tw`.
const MAX_LANGUAGE_LEN: usize = 16;

/// Rejections produced while building an [`AnnouncementRequest`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The text was empty or whitespace only.
    #[error("text cannot be empty")]
    EmptyText,
    /// The language tag is not a plausible BCP-47-ish code.
    #[error("invalid language code: {0:?}")]
    InvalidLanguage(String),
    /// The priority tier was outside `0..=3`.
    #[error("priority must be between 0 and 3, got {0}")]
    PriorityOutOfRange(i64),
}

/// A validated request to speak some text on the device.
///
/// Fields are normalised on construction (whitespace collapsed, language
/// lower-cased) so that requests that sound the same share a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AnnouncementRequest {
    text: String,
    language: String,
    slow: bool,
    priority: Priority,
}

impl AnnouncementRequest {
    /// Builds a request, normalising and validating every field.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyText`] if `text` has no visible
    /// characters and [`ValidationError::InvalidLanguage`] if `language`
    /// is not a short alphanumeric tag.
    pub fn new(
        text: &str,
        language: &str,
        slow: bool,
        priority: Priority,
    ) -> Result<Self, ValidationError> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let language = normalize_language(language)?;

        Ok(Self {
            text,
            language,
            slow,
            priority,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn slow(&self) -> bool {
        self.slow
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Derives the content-addressed fingerprint for this request.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_request(self)
    }
}

fn normalize_language(raw: &str) -> Result<String, ValidationError> {
    let language = raw.trim().replace('_', "-").to_ascii_lowercase();

    let valid_shape = (2..=MAX_LANGUAGE_LEN).contains(&language.len())
        && language
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()))
        && language
            .split('-')
            .next()
            .is_some_and(|primary| primary.chars().all(|c| c.is_ascii_alphabetic()));

    if valid_shape {
        Ok(language)
    } else {
        Err(ValidationError::InvalidLanguage(raw.to_string()))
    }
}

/// Deterministic fingerprint of a normalised [`AnnouncementRequest`].
///
/// Formula: `sha256(text 0x1f language 0x1f slow 0x1f priority)`, hex
/// encoded. The unit separator cannot appear in normalised text, so
/// distinct field tuples never collide by concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    fn for_request(request: &AnnouncementRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(request.text.as_bytes());
        hasher.update([0x1f]);
        hasher.update(request.language.as_bytes());
        hasher.update([0x1f]);
        hasher.update(if request.slow { b"1" } else { b"0" });
        hasher.update([0x1f]);
        hasher.update([b'0' + request.priority.as_u8()]);
        Self(hex_encode(&hasher.finalize()))
    }

    /// The lowercase hex digest, used as the cached file stem.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
