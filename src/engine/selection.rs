//! Candidate-file intake.
//!
//! Terminals deliver a dragged file as pasted text (usually its path, sometimes quoted,
//! escaped, or as a `file://` URI). This module turns that text into candidate paths and
//! applies the drop-zone rules: one file at most, JPEG/PNG only, everything else dropped.

use crate::model::{ImageKind, SelectedFile};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Split pasted or dropped text into candidate paths. Backslash escapes are honored
/// outside Windows, where `\` is the path separator.
pub fn parse_dropped_paths(text: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.trim().chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, '\\') if !cfg!(windows) => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    out.push(to_path(&current));
                    current.clear();
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(to_path(&current));
    }
    out
}

fn to_path(raw: &str) -> PathBuf {
    let stripped = raw.strip_prefix("file://").unwrap_or(raw);
    PathBuf::from(percent_decode(stripped))
}

// file:// URIs percent-encode spaces and non-ASCII bytes.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Image kind for a path, judged by extension.
pub fn image_kind(path: &Path) -> Option<ImageKind> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(ImageKind::from_extension)
}

/// Apply the drop-zone rules: only the first candidate counts, and only if it is an
/// accepted image. Returns `None` when the drop is rejected.
pub fn accept_candidates(paths: &[PathBuf]) -> Option<(PathBuf, ImageKind)> {
    let first = paths.first()?;
    image_kind(first).map(|kind| (first.clone(), kind))
}

/// Read an accepted image from disk.
pub async fn load_selected_file(path: &Path, kind: ImageKind) -> Result<SelectedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read image {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| path.display().to_string());

    let mut file = SelectedFile::new(name, kind, bytes);
    file.path = Some(path.to_path_buf());
    Ok(file)
}

async fn select_first(candidates: &[PathBuf]) -> Result<Option<SelectedFile>> {
    match accept_candidates(candidates) {
        Some((path, kind)) => load_selected_file(&path, kind).await.map(Some),
        None => {
            tracing::debug!(candidates = candidates.len(), "selection rejected");
            Ok(None)
        }
    }
}

/// Parse, filter and load in one go. `Ok(None)` means the drop was silently rejected.
pub async fn select_from_text(text: &str) -> Result<Option<SelectedFile>> {
    select_first(&parse_dropped_paths(text)).await
}

/// Load a path typed at the prompt. The whole line is one path, spaces included.
pub async fn select_typed_path(text: &str) -> Result<Option<SelectedFile>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    select_first(&[PathBuf::from(text)]).await
}
