//! Estimation input — the request handed over by the upload layer, and its
//! structural re-validation before anything is encoded or sent to the model.

use crate::errors::{EstimationFailure, FieldError};
use crate::estimation::schema::InputSchema;

/// Raw request as supplied by the caller. Owns the document bytes.
#[derive(Debug, Clone)]
pub struct EstimationRequest {
    pub document: Vec<u8>,
    pub media_type: String,
    pub location: String,
}

/// A request that passed validation. Media type is normalised; location is
/// kept as supplied and only measured trimmed.
#[derive(Debug)]
pub struct ValidatedRequest {
    pub document: Vec<u8>,
    pub media_type: String,
    pub location: String,
}

impl EstimationRequest {
    pub fn new(document: Vec<u8>, media_type: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            document,
            media_type: media_type.into(),
            location: location.into(),
        }
    }

    /// Checks every rule and reports all violations together.
    pub fn validate(self, schema: &InputSchema) -> Result<ValidatedRequest, EstimationFailure> {
        let mut errors = Vec::new();

        if self.document.is_empty() {
            errors.push(FieldError {
                field: "document",
                message: "CV is required.".to_string(),
            });
        } else if self.document.len() > schema.max_document_bytes {
            errors.push(FieldError {
                field: "document",
                message: format!(
                    "CV must be at most {}MB (got {} bytes).",
                    schema.max_document_bytes / (1024 * 1024),
                    self.document.len()
                ),
            });
        }

        let media_type = normalize_media_type(&self.media_type);
        if !schema.allowed_media_types.contains(&media_type.as_str()) {
            errors.push(FieldError {
                field: "media_type",
                message: format!(
                    "CV must be a PDF or TXT file (got '{}').",
                    self.media_type.trim()
                ),
            });
        }

        if media_type == "text/plain"
            && !self.document.is_empty()
            && std::str::from_utf8(&self.document).is_err()
        {
            errors.push(FieldError {
                field: "document",
                message: "CV text must be UTF-8 encoded.".to_string(),
            });
        }

        if self.location.trim().chars().count() < schema.min_location_chars {
            errors.push(FieldError {
                field: "location",
                message: format!(
                    "Location must be at least {} characters.",
                    schema.min_location_chars
                ),
            });
        }

        if !errors.is_empty() {
            return Err(EstimationFailure::InvalidInput { errors });
        }

        Ok(ValidatedRequest {
            location: self.location,
            document: self.document,
            media_type,
        })
    }
}

/// `"Text/Plain; charset=utf-8 "` → `"text/plain"`
fn normalize_media_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}
