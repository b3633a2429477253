use crate::core::errors::ApiError;

/// Extracts a required string field, trimming surrounding whitespace.
/// Whitespace-only values count as missing.
pub fn require_field(value: Option<&str>, name: &str) -> Result<String, ApiError> {
    match value.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed.to_string()),
        _ => Err(ApiError::BadRequest(format!("{name} is required"))),
    }
}
