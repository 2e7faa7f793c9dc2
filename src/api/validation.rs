use thiserror::Error;

use super::models::{Category, DownloadRequest};

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("link must not be empty")]
    EmptyLink,
    #[error("file_name must not be empty")]
    EmptyFileName,
    #[error("file_name must be a bare file name")]
    FileNameWithPath,
    #[error("custom_path is required when category is 'custom'")]
    MissingCustomPath,
    #[error("session_id exceeds {MAX_SESSION_ID_LEN} characters")]
    SessionIdTooLong,
}

pub fn validate_request(request: &DownloadRequest) -> Result<(), RequestValidationError> {
    if request.link.trim().is_empty() {
        return Err(RequestValidationError::EmptyLink);
    }

    let file_name = request.file_name.as_str();
    if file_name.is_empty() {
        return Err(RequestValidationError::EmptyFileName);
    }
    if file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains('\0')
        || file_name == "."
        || file_name == ".."
    {
        return Err(RequestValidationError::FileNameWithPath);
    }

    if request.category == Category::Custom
        && request
            .custom_path
            .as_deref()
            .is_none_or(|path| path.trim().is_empty())
    {
        return Err(RequestValidationError::MissingCustomPath);
    }

    if let Some(session) = &request.session_id {
        if session.len() > MAX_SESSION_ID_LEN {
            return Err(RequestValidationError::SessionIdTooLong);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> DownloadRequest {
        serde_json::from_str(
            r#"{
                "link": "https://drive.google.com/file/d/abc123/view",
                "file_name": "model.safetensors",
                "category": "checkpoints"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_request() {
        assert!(validate_request(&sample_request()).is_ok());
    }

    #[test]
    fn rejects_empty_link() {
        let mut request = sample_request();
        request.link = "   ".to_string();

        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, RequestValidationError::EmptyLink));
    }

    #[test]
    fn rejects_path_traversal_file_names() {
        for bad in ["../evil.bin", "a/b.bin", "a\\b.bin", "..", "."] {
            let mut request = sample_request();
            request.file_name = bad.to_string();

            let err = validate_request(&request).unwrap_err();
            assert!(
                matches!(err, RequestValidationError::FileNameWithPath),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_custom_category_without_path() {
        let mut request = sample_request();
        request.category = Category::Custom;
        request.custom_path = None;

        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, RequestValidationError::MissingCustomPath));

        request.custom_path = Some("  ".to_string());
        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, RequestValidationError::MissingCustomPath));
    }

    #[test]
    fn rejects_oversized_session_id() {
        let mut request = sample_request();
        request.session_id = Some("s".repeat(MAX_SESSION_ID_LEN + 1));

        let err = validate_request(&request).unwrap_err();
        assert!(matches!(err, RequestValidationError::SessionIdTooLong));
    }
}
