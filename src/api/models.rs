//! API models for download submission and progress polling.
//!
//! External contract:
//! - `POST /downloads` accepts a [`DownloadRequest`] payload and answers
//!   with a [`DownloadResponse`] once the job reaches a terminal state
//! - `GET /downloads/progress/{session_id}` returns the current progress
//!   snapshot for an in-flight job, or `{"status": "not_found"}`
//!
//! A complete submission example (as JSON):
//!
//! ```json
//! {
//!   "link": "https://drive.google.com/file/d/1A2b3C4d5E6f7G8h/view",
//!   "file_name": "model.safetensors",
//!   "category": "checkpoints",
//!   "overwrite": false,
//!   "auto_extract": true,
//!   "session_id": "session_1714500000_ab12cd34e"
//! }
//! ```
//!
//! `session_id` is chosen by the caller and correlates the submission with
//! the progress polling endpoint; omitting it disables progress tracking
//! for that job.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::pipeline::JobOutcome;

/// Where a finished artifact lands relative to the models root. `custom`
/// bypasses the fixed tree and uses the caller-supplied directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Checkpoints,
    Vae,
    Loras,
    Controlnet,
    Embeddings,
    UpscaleModels,
    Custom,
}

impl Category {
    /// Directory name under the models root; `None` for `custom`.
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            Category::Checkpoints => Some("checkpoints"),
            Category::Vae => Some("vae"),
            Category::Loras => Some("loras"),
            Category::Controlnet => Some("controlnet"),
            Category::Embeddings => Some("embeddings"),
            Category::UpscaleModels => Some("upscale_models"),
            Category::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    pub link: String,
    pub file_name: String,
    pub category: Category,
    #[serde(default)]
    pub custom_path: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_auto_extract")]
    pub auto_extract: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_auto_extract() -> bool {
    true
}

/// Terminal result of a submission. Pipeline failures are reported in-band
/// (`success: false` with `error` set) because the RPC itself completed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResponse {
    pub fn completed(outcome: JobOutcome) -> Self {
        Self {
            success: true,
            file_path: Some(outcome.file_path.display().to_string()),
            message: Some(outcome.message),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            file_path: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_apply() {
        let request: DownloadRequest = serde_json::from_str(
            r#"{"link": "x", "file_name": "f.bin", "category": "loras"}"#,
        )
        .unwrap();

        assert!(!request.overwrite);
        assert!(request.auto_extract);
        assert!(request.custom_path.is_none());
        assert!(request.session_id.is_none());
        assert_eq!(request.category, Category::Loras);
    }

    #[test]
    fn category_directories() {
        assert_eq!(Category::UpscaleModels.dir_name(), Some("upscale_models"));
        assert_eq!(Category::Custom.dir_name(), None);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let result: Result<DownloadRequest, _> = serde_json::from_str(
            r#"{"link": "x", "file_name": "f.bin", "category": "textures"}"#,
        );
        assert!(result.is_err());
    }
}
