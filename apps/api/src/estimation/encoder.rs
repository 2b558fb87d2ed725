//! Document Encoder — raw upload bytes → self-describing data URI.
//!
//! Format: `data:<media type>;base64,<standard base64 with padding>`.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;

const DATA_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("transport string is not a data URI")]
    MissingScheme,

    #[error("data URI has no ';base64,' marker")]
    MissingBase64Marker,

    #[error("data URI has an empty media type")]
    EmptyMediaType,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("text document is not valid UTF-8")]
    NotUtf8,
}

/// A document in transport form. Carries its own media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDocument {
    transport: String,
}

/// Result of decoding an `EncodedDocument`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDocument {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Encodes `document` as a data URI. Total for validated input.
pub fn encode(document: &[u8], media_type: &str) -> EncodedDocument {
    let payload = BASE64_STANDARD.encode(document);
    let mut transport =
        String::with_capacity(DATA_PREFIX.len() + media_type.len() + BASE64_MARKER.len() + payload.len());
    transport.push_str(DATA_PREFIX);
    transport.push_str(media_type);
    transport.push_str(BASE64_MARKER);
    transport.push_str(&payload);
    EncodedDocument { transport }
}

impl EncodedDocument {
    /// Wraps an existing transport string. Nothing is checked until it is split or decoded.
    #[cfg(test)]
    pub fn from_transport(transport: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
        }
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.transport
    }

    /// Splits the transport string into `(media type, base64 payload)` without decoding.
    pub fn parts(&self) -> Result<(&str, &str), EncodingError> {
        let rest = self
            .transport
            .strip_prefix(DATA_PREFIX)
            .ok_or(EncodingError::MissingScheme)?;
        let (media_type, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or(EncodingError::MissingBase64Marker)?;
        if media_type.is_empty() {
            return Err(EncodingError::EmptyMediaType);
        }
        Ok((media_type, payload))
    }

    pub fn media_type(&self) -> Result<&str, EncodingError> {
        self.parts().map(|(media_type, _)| media_type)
    }

    pub fn decode(&self) -> Result<DecodedDocument, EncodingError> {
        let (media_type, payload) = self.parts()?;
        let bytes = BASE64_STANDARD.decode(payload)?;
        Ok(DecodedDocument {
            media_type: media_type.to_string(),
            bytes,
        })
    }

    /// Decodes a text document into a string.
    pub fn decode_text(&self) -> Result<String, EncodingError> {
        let decoded = self.decode()?;
        String::from_utf8(decoded.bytes).map_err(|_| EncodingError::NotUtf8)
    }
}
