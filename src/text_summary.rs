//! Human-readable lines for a finished classification, shared by text mode and the TUI.

use crate::model::{ClassificationResult, RequestError, ViewState, LOW_CONFIDENCE_ADVISORY};

pub const TITLE: &str = "Pothole Detection System";

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn result_lines(result: &ClassificationResult) -> Vec<String> {
    let mut lines = vec![
        result.verdict().to_string(),
        format!("Confidence: {:.2}%", result.confidence * 100.0),
        format!("Raw Probability: {:.2}%", result.raw_probability * 100.0),
    ];
    if result.is_low_confidence() {
        lines.push(LOW_CONFIDENCE_ADVISORY.to_string());
    }
    lines
}

pub(crate) fn error_lines(error: &RequestError) -> Vec<String> {
    vec![error.to_string()]
}

/// Build the summary for whatever the view currently shows.
pub(crate) fn build_text_summary(view: &ViewState) -> TextSummary {
    let mut lines = Vec::new();
    if let Some(file) = view.file() {
        lines.push(format!("Selected file: {}", file.name));
    }
    match view {
        ViewState::Empty => lines.push("No image selected.".into()),
        ViewState::Selected { .. } => lines.push("Ready to analyze.".into()),
        ViewState::Loading { .. } => lines.push("Analyzing…".into()),
        ViewState::Result { result, .. } => {
            lines.push("Analysis Result".into());
            lines.extend(result_lines(result));
        }
        ViewState::Error { error, .. } => lines.extend(error_lines(error)),
    }
    TextSummary { lines }
}
