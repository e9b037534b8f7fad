//! Post-request processing: auto-save, export, and history refresh.

use crate::model::{ClassificationRecord, ClientConfig};
use crate::storage;
use std::path::{Path, PathBuf};

/// Result of post-request processing, ready for presentation layers.
pub(crate) struct ProcessedRecord {
    pub export_messages: Vec<String>,
    pub history: Vec<ClassificationRecord>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Process a finished request: auto-save, export, and reload history.
pub(crate) fn process_completion(
    cfg: &ClientConfig,
    export_path: Option<&Path>,
    history_load: usize,
    record: &ClassificationRecord,
) -> ProcessedRecord {
    let dir = storage::history_dir(cfg.history_dir.as_deref());

    let auto_saved_path = match (&dir, cfg.auto_save) {
        (Ok(dir), true) => match storage::save_record(dir, record) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "auto-save failed");
                None
            }
        },
        _ => None,
    };

    let mut export_messages = Vec::new();
    if let Some(path) = export_path {
        match storage::export_json(path, record) {
            Ok(()) => export_messages.push(format!("Exported JSON: {}", path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    let history = dir
        .ok()
        .and_then(|d| storage::load_recent(&d, history_load).ok())
        .unwrap_or_default();

    ProcessedRecord {
        export_messages,
        history,
        auto_saved_path,
    }
}
