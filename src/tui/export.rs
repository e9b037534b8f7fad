use crate::model::{ClassificationRecord, Outcome};
use anyhow::{Context, Result};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Default export file name for a record, safe on every platform.
pub fn export_file_name(r: &ClassificationRecord) -> String {
    let stem = std::path::Path::new(&r.file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    format!(
        "pothole-{}-{}.json",
        r.timestamp_utc.replace(':', "-").replace('T', "_"),
        stem
    )
}

/// Export a record as JSON into the current directory.
/// Returns the absolute path of the exported file.
pub fn export_record_json(r: &ClassificationRecord) -> Result<std::path::PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    let path = current_dir.join(export_file_name(r));
    crate::storage::export_json(&path, r)?;
    Ok(path)
}

/// Plain-text summary of a record for the clipboard.
pub fn record_summary_text(r: &ClassificationRecord) -> String {
    let mut lines = vec![format!("{} ({})", r.file_name, r.timestamp_utc)];
    match &r.outcome {
        Outcome::Classified { result } => lines.extend(crate::text_summary::result_lines(result)),
        Outcome::Failed { error } => lines.extend(crate::text_summary::error_lines(error)),
    }
    lines.join("\n")
}

/// Initialize the clipboard manager thread if not already initialized.
/// Each clipboard instance is kept alive briefly so clipboard managers on Linux can read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Copy text to clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestError;

    fn record() -> ClassificationRecord {
        ClassificationRecord {
            timestamp_utc: "2026-05-04T03:02:01Z".into(),
            base_url: "http://localhost:8000".into(),
            timeout: crate::model::DEFAULT_TIMEOUT,
            file_name: "main street.jpg".into(),
            file_size: 1,
            outcome: Outcome::Failed {
                error: RequestError::Unreachable,
            },
        }
    }

    #[test]
    fn export_name_has_no_colons() {
        assert_eq!(
            export_file_name(&record()),
            "pothole-2026-05-04_03-02-01Z-main street.json"
        );
    }

    #[test]
    fn summary_text_includes_error_message() {
        let text = record_summary_text(&record());
        assert!(text.starts_with("main street.jpg (2026-05-04T03:02:01Z)"));
        assert!(text.ends_with(
            "Could not connect to the server. Please make sure the backend is running."
        ));
    }
}
