use super::ApiError;

const MAX_NAME_LEN: usize = 255;

/// A single path segment: no separators, no parent references.
fn validate_segment<'a>(kind: &str, name: &'a str) -> Result<&'a str, ApiError> {
    if name.is_empty() {
        return Err(ApiError::validation(format!("{} cannot be empty", kind)));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "{} must be {} characters or less",
            kind, MAX_NAME_LEN
        )));
    }

    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(ApiError::validation(format!(
            "Invalid {}: {}",
            kind.to_lowercase(),
            name
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(ApiError::validation(format!(
            "{} cannot contain control characters",
            kind
        )));
    }

    Ok(name)
}

pub fn validate_file_name(name: &str) -> Result<&str, ApiError> {
    validate_segment("File name", name)
}

pub fn validate_stream_name(name: &str) -> Result<&str, ApiError> {
    validate_segment("Stream name", name)
}
