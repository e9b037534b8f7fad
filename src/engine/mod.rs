mod http;
pub mod selection;

pub use http::HttpTransport;

use crate::model::{ClassificationResult, RequestError, SelectedFile};
use async_trait::async_trait;
use std::time::Duration;

/// Request/response carrier between the controller and the classification service.
///
/// Implementations must map every failure onto the [`RequestError`] taxonomy; nothing
/// else escapes a classification attempt.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn classify(&self, file: &SelectedFile) -> Result<ClassificationResult, RequestError>;

    /// Check the service root. Returns the server's greeting message.
    async fn health(&self) -> Result<String, RequestError>;

    fn base_url(&self) -> &str;

    /// Per-request time limit applied to every call.
    fn timeout(&self) -> Duration;
}
