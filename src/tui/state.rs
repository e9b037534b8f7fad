use crate::model::{
    ClassificationRecord, ClassifyEvent, Outcome, RequestError, RequestState, ViewState,
};
use std::time::Instant;

const SPINNER: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

pub struct UiState {
    pub tab: usize,
    pub view: ViewState,
    pub info: String,
    pub base_url: String,
    pub health: Option<Result<String, RequestError>>,
    pub auto_save: bool,

    // Path prompt (alternative to drag and drop)
    pub input: String,
    pub input_editing: bool,

    pub loading_since: Option<Instant>,
    pub spinner_frame: usize,

    pub last_record: Option<ClassificationRecord>,
    pub history: Vec<ClassificationRecord>,
    pub history_selected: usize, // Index of selected history item (0 = most recent)
    pub history_load_size: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            view: ViewState::Empty,
            info: String::new(),
            base_url: String::new(),
            health: None,
            auto_save: true,
            input: String::new(),
            input_editing: false,
            loading_since: None,
            spinner_frame: 0,
            last_record: None,
            history: Vec::new(),
            history_selected: 0,
            history_load_size: 50,
        }
    }
}

impl UiState {
    /// Apply a controller event. Completion records are handled by the caller, which
    /// owns post-processing.
    pub fn apply_event(&mut self, ev: ClassifyEvent) {
        match ev {
            ClassifyEvent::StateChanged(view) => {
                if view.request_state() == RequestState::Loading {
                    self.loading_since = Some(Instant::now());
                    self.info = "Analyzing image…".into();
                } else {
                    self.loading_since = None;
                }
                if let ViewState::Selected { file } = &view {
                    self.last_record = None;
                    self.info = format!("Selected {}", file.name);
                }
                self.view = view;
            }
            ClassifyEvent::Health(status) => self.health = Some(status),
            ClassifyEvent::Info(msg) => self.info = msg,
            ClassifyEvent::Completed { record } => self.last_record = Some(*record),
        }
    }

    pub fn tick(&mut self) {
        if self.loading_since.is_some() {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER.len();
        }
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER[self.spinner_frame % SPINNER.len()]
    }

    pub fn health_label(&self) -> String {
        match &self.health {
            None => "checking…".into(),
            Some(Ok(msg)) => format!("online ({msg})"),
            Some(Err(RequestError::Unreachable)) => "offline".into(),
            Some(Err(e)) => e.to_string(),
        }
    }

    pub fn select_prev(&mut self) {
        self.history_selected = self.history_selected.saturating_sub(1);
    }

    pub fn select_next(&mut self) {
        if self.history_selected + 1 < self.history.len() {
            self.history_selected += 1;
        }
    }

    pub fn selected_history(&self) -> Option<&ClassificationRecord> {
        self.history.get(self.history_selected)
    }
}

/// One-line description of a history record.
pub fn history_line(record: &ClassificationRecord) -> String {
    let outcome = match &record.outcome {
        Outcome::Classified { result } => format!(
            "{} ({:.2}%)",
            result.verdict(),
            result.confidence * 100.0
        ),
        Outcome::Failed { error } => format!("failed: {}", error.kind_str()),
    };
    format!("{}  {}  {}", record.timestamp_utc, record.file_name, outcome)
}
