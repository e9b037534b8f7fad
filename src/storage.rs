//! Classification history on disk.
//!
//! Each finished request is one pretty-printed JSON file under the history directory.

use crate::model::ClassificationRecord;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "pothole-detect-cli";

/// Base data directory for this app (history, logs).
pub fn app_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .context("could not determine a data directory")?;
    Ok(base.join(APP_DIR))
}

pub fn history_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    match override_dir {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(app_data_dir()?.join("history")),
    }
}

fn record_file_name(record: &ClassificationRecord) -> String {
    let stamp: String = record
        .timestamp_utc
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let stem: String = Path::new(&record.file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(40)
        .collect();
    format!("{stamp}-{stem}")
}

/// Persist a record into `dir`, creating it if needed. Returns the written path.
pub fn save_record(dir: &Path, record: &ClassificationRecord) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let base = record_file_name(record);
    let mut path = dir.join(format!("{base}.json"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{base}-{n}.json"));
        n += 1;
    }

    export_json(&path, record)?;
    Ok(path)
}

/// Load up to `limit` records, newest first. Unreadable files are skipped.
pub fn load_recent(dir: &Path, limit: usize) -> Result<Vec<ClassificationRecord>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let parsed = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<ClassificationRecord>(&s).ok());
        match parsed {
            Some(r) => records.push(r),
            None => tracing::debug!(path = %path.display(), "skipping unreadable history file"),
        }
    }
    // RFC 3339 UTC timestamps sort lexicographically.
    records.sort_by(|a, b| b.timestamp_utc.cmp(&a.timestamp_utc));
    records.truncate(limit);
    Ok(records)
}

pub fn export_json(path: &Path, record: &ClassificationRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassificationResult, Outcome, RequestError};

    fn record(ts: &str, name: &str, outcome: Outcome) -> ClassificationRecord {
        ClassificationRecord {
            timestamp_utc: ts.into(),
            base_url: "http://localhost:8000".into(),
            timeout: crate::model::DEFAULT_TIMEOUT,
            file_name: name.into(),
            file_size: 10,
            outcome,
        }
    }

    #[test]
    fn saves_and_loads_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let older = record(
            "2026-01-01T10:00:00Z",
            "a.jpg",
            Outcome::Failed {
                error: RequestError::Unreachable,
            },
        );
        let newer = record(
            "2026-01-02T10:00:00Z",
            "b.png",
            Outcome::Classified {
                result: ClassificationResult {
                    is_pothole: false,
                    confidence: 0.8,
                    raw_probability: 0.2,
                },
            },
        );
        save_record(dir.path(), &older).unwrap();
        save_record(dir.path(), &newer).unwrap();
        std::fs::write(dir.path().join("junk.json"), "{").unwrap();

        let loaded = load_recent(dir.path(), 10).unwrap();
        assert_eq!(loaded, vec![newer.clone(), older]);
        assert_eq!(load_recent(dir.path(), 1).unwrap(), vec![newer]);
    }

    #[test]
    fn same_second_saves_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let r = record(
            "2026-01-01T10:00:00Z",
            "road.jpg",
            Outcome::Failed {
                error: RequestError::Timeout,
            },
        );
        let p1 = save_record(dir.path(), &r).unwrap();
        let p2 = save_record(dir.path(), &r).unwrap();
        assert_ne!(p1, p2);
        assert_eq!(load_recent(dir.path(), 10).unwrap().len(), 2);
    }

    #[test]
    fn missing_dir_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_recent(&dir.path().join("nope"), 5).unwrap().is_empty());
    }
}
