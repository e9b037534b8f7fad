use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Endpoint path the image is posted to, relative to the base URL.
pub const PREDICT_PATH: &str = "/predict";
/// Multipart field name carrying the image bytes.
pub const FILE_FIELD: &str = "file";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Advisory shown when the raw probability sits in the uncertain band.
pub const LOW_CONFIDENCE_ADVISORY: &str = "Low confidence prediction. Please verify manually.";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub auto_save: bool,
    pub history_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("pothole-detect-cli/{}", env!("CARGO_PKG_VERSION")),
            auto_save: true,
            history_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Map a file extension onto an accepted image kind (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// The image the user picked. Replaced wholesale on every new selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub path: Option<PathBuf>,
    pub kind: ImageKind,
    // Bytes so that handing the payload to a spawned request task is a refcount bump.
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, kind: ImageKind, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            path: None,
            kind,
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_pothole: bool,
    pub confidence: f64,
    pub raw_probability: f64,
}

impl ClassificationResult {
    /// True when the model's raw output is too close to the decision boundary to trust.
    pub fn is_low_confidence(&self) -> bool {
        self.raw_probability > 0.3 && self.raw_probability < 0.7
    }

    pub fn verdict(&self) -> &'static str {
        if self.is_pothole {
            "Pothole Detected!"
        } else {
            "No Pothole Detected"
        }
    }
}

/// Failure of a single classification request, already classified by cause.
/// `Display` is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RequestError {
    #[error("Request timed out. Please try again.")]
    Timeout,
    #[error("Server error: {0}")]
    Server(String),
    #[error("Could not connect to the server. Please make sure the backend is running.")]
    Unreachable,
    #[error("An error occurred. Please try again.")]
    Unknown,
}

impl RequestError {
    /// Build a server error from an optional server-supplied message.
    pub fn server(message: Option<String>) -> Self {
        match message {
            Some(m) if !m.is_empty() => RequestError::Server(m),
            _ => RequestError::Server("Unknown error".to_string()),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            RequestError::Timeout => "timeout",
            RequestError::Server(_) => "server",
            RequestError::Unreachable => "unreachable",
            RequestError::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Loading,
}

/// Everything the presentation layer can show. Exactly one variant holds at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewState {
    #[default]
    Empty,
    Selected {
        file: SelectedFile,
    },
    Loading {
        file: SelectedFile,
        generation: u64,
    },
    Result {
        file: SelectedFile,
        result: ClassificationResult,
    },
    Error {
        file: SelectedFile,
        error: RequestError,
    },
}

impl ViewState {
    pub fn file(&self) -> Option<&SelectedFile> {
        match self {
            ViewState::Empty => None,
            ViewState::Selected { file }
            | ViewState::Loading { file, .. }
            | ViewState::Result { file, .. }
            | ViewState::Error { file, .. } => Some(file),
        }
    }

    pub fn result(&self) -> Option<&ClassificationResult> {
        match self {
            ViewState::Result { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RequestError> {
        match self {
            ViewState::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn request_state(&self) -> RequestState {
        match self {
            ViewState::Loading { .. } => RequestState::Loading,
            _ => RequestState::Idle,
        }
    }

    /// Whether the "analyze" action should be offered.
    pub fn can_submit(&self) -> bool {
        matches!(self, ViewState::Selected { .. } | ViewState::Error { .. })
    }
}

/// Events emitted by the controller loop and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum ClassifyEvent {
    StateChanged(ViewState),
    Completed { record: Box<ClassificationRecord> },
    Health(Result<String, RequestError>),
    Info(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Classified { result: ClassificationResult },
    Failed { error: RequestError },
}

/// One finished request as persisted to history and exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub timestamp_utc: String,
    pub base_url: String,
    /// Per-request timeout the client ran with.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    pub file_name: String,
    pub file_size: u64,
    pub outcome: Outcome,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl ClassificationRecord {
    pub fn new(base_url: &str, timeout: Duration, file: &SelectedFile, outcome: Outcome) -> Self {
        Self {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            base_url: base_url.to_string(),
            timeout,
            file_name: file.name.clone(),
            file_size: file.size() as u64,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_band_is_exclusive() {
        let at = |p: f64| ClassificationResult {
            is_pothole: p > 0.7,
            confidence: p,
            raw_probability: p,
        };
        assert!(at(0.5).is_low_confidence());
        assert!(!at(0.9).is_low_confidence());
        assert!(!at(0.3).is_low_confidence());
        assert!(!at(0.7).is_low_confidence());
    }

    #[test]
    fn server_error_falls_back_to_unknown_message() {
        assert_eq!(
            RequestError::server(Some("bad image".into())).to_string(),
            "Server error: bad image"
        );
        assert_eq!(
            RequestError::server(None).to_string(),
            "Server error: Unknown error"
        );
    }

    #[test]
    fn image_kind_accepts_only_jpeg_and_png() {
        assert_eq!(ImageKind::from_extension("JPG"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_extension("jpeg"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_extension("png"), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_extension("gif"), None);
    }

    #[test]
    fn record_serializes_outcome_with_tag() {
        let file = SelectedFile::new("road.jpg", ImageKind::Jpeg, vec![1u8, 2, 3]);
        let rec = ClassificationRecord::new(
            "http://localhost:8000",
            Duration::from_millis(2500),
            &file,
            Outcome::Failed {
                error: RequestError::Timeout,
            },
        );
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["outcome"]["status"], "failed");
        assert_eq!(v["outcome"]["error"]["kind"], "timeout");
        assert_eq!(v["file_size"], 3);
        assert_eq!(v["timeout"], "2s 500ms");

        let back: ClassificationRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn record_without_timeout_loads_with_default() {
        let rec: ClassificationRecord = serde_json::from_value(serde_json::json!({
            "timestamp_utc": "2026-01-01T00:00:00Z",
            "base_url": "http://localhost:8000",
            "file_name": "road.png",
            "file_size": 1,
            "outcome": { "status": "failed", "error": { "kind": "unreachable" } }
        }))
        .unwrap();
        assert_eq!(rec.timeout, DEFAULT_TIMEOUT);
    }
}
