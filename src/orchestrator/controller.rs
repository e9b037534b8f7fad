//! Upload-and-classify controller.
//!
//! [`Controller`] drives the state machine directly (one-shot CLI modes and tests);
//! [`run_controller`] is the long-lived loop behind the TUI, fed by UI commands and
//! emitting [`ClassifyEvent`]s back to the presentation layer.

use super::core::{self, Effect, Event, State};
use crate::engine::{selection, Transport};
use crate::model::{
    ClassificationRecord, ClassificationResult, ClassifyEvent, Outcome, RequestError,
    SelectedFile, ViewState,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

pub struct Controller<T: Transport> {
    transport: Arc<T>,
    state: State,
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: core::init(),
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.state.view
    }

    fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        let (next, effects) = core::transition(std::mem::take(&mut self.state), event);
        self.state = next;
        effects
    }

    /// Replace the selected file. Clears any result or error.
    pub fn select_file(&mut self, file: SelectedFile) {
        // No request can be in flight here: `submit` holds `&mut self` until it resolves.
        let _ = self.dispatch(Event::FileSelected(file));
    }

    /// Classify the selected file. Returns `None` when no request was issued.
    pub async fn submit(&mut self) -> Option<Result<ClassificationResult, RequestError>> {
        let effects = self.dispatch(Event::SubmitRequested);
        let mut last = None;
        for effect in effects {
            if let Effect::Classify { generation, file } = effect {
                let outcome = self.transport.classify(&file).await;
                let _ = self.dispatch(Event::ClassifyDone {
                    generation,
                    outcome: outcome.clone(),
                });
                last = Some(outcome);
            }
        }
        last
    }

    /// Snapshot of the finished request, if the view holds one.
    pub fn record(&self) -> Option<ClassificationRecord> {
        completion_record(self.transport.as_ref(), &self.state.view)
    }
}

fn completion_record<T: Transport>(transport: &T, view: &ViewState) -> Option<ClassificationRecord> {
    match view {
        ViewState::Result { file, result } => Some(ClassificationRecord::new(
            transport.base_url(),
            transport.timeout(),
            file,
            Outcome::Classified { result: *result },
        )),
        ViewState::Error { file, error } => Some(ClassificationRecord::new(
            transport.base_url(),
            transport.timeout(),
            file,
            Outcome::Failed {
                error: error.clone(),
            },
        )),
        _ => None,
    }
}

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Raw dropped or pasted text naming candidate files.
    Select(String),
    /// A single path typed at the prompt.
    SelectPath(String),
    Submit,
    CheckHealth,
    Quit,
}

/// Internal handle for the one outstanding request.
struct InFlight {
    generation: u64,
    handle: JoinHandle<Result<ClassificationResult, RequestError>>,
}

/// Run the controller loop until the UI quits or drops its command sender.
pub(crate) async fn run_controller<T: Transport>(
    transport: Arc<T>,
    initial: Option<SelectedFile>,
    event_tx: UnboundedSender<ClassifyEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut state = core::init();
    let mut in_flight: Option<InFlight> = None;

    spawn_health_check(transport.clone(), event_tx.clone());

    if let Some(file) = initial {
        state = apply(
            state,
            Event::FileSelected(file),
            &transport,
            &mut in_flight,
            &event_tx,
        );
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Select(text)) => {
                        match selection::select_from_text(&text).await {
                            Ok(Some(file)) => {
                                state = apply(state, Event::FileSelected(file), &transport, &mut in_flight, &event_tx);
                            }
                            // Rejected drops are ignored, as the drop-zone does.
                            Ok(None) => {}
                            Err(e) => {
                                let _ = event_tx.send(ClassifyEvent::Info(format!("{e:#}")));
                            }
                        }
                    }
                    Some(UiCommand::SelectPath(text)) => {
                        match selection::select_typed_path(&text).await {
                            Ok(Some(file)) => {
                                state = apply(state, Event::FileSelected(file), &transport, &mut in_flight, &event_tx);
                            }
                            Ok(None) => {
                                let msg = format!("{} is not a JPEG or PNG image", text.trim());
                                let _ = event_tx.send(ClassifyEvent::Info(msg));
                            }
                            Err(e) => {
                                let _ = event_tx.send(ClassifyEvent::Info(format!("{e:#}")));
                            }
                        }
                    }
                    Some(UiCommand::Submit) => {
                        state = apply(state, Event::SubmitRequested, &transport, &mut in_flight, &event_tx);
                    }
                    Some(UiCommand::CheckHealth) => {
                        spawn_health_check(transport.clone(), event_tx.clone());
                    }
                    Some(UiCommand::Quit) | None => {
                        if let Some(f) = in_flight.take() {
                            f.handle.abort();
                        }
                        break;
                    }
                }
            }
            // Keep the handle in place until this branch wins so a losing poll cannot drop it.
            done = async {
                match in_flight.as_mut() {
                    Some(f) => (f.generation, (&mut f.handle).await),
                    None => futures::future::pending().await,
                }
            } => {
                in_flight = None;
                let (generation, joined) = done;
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(error = %e, "classification task failed");
                        Err(RequestError::Unknown)
                    }
                };
                let was_loading = matches!(state.view, ViewState::Loading { .. });
                state = apply(state, Event::ClassifyDone { generation, outcome }, &transport, &mut in_flight, &event_tx);
                if was_loading {
                    if let Some(record) = completion_record(transport.as_ref(), &state.view) {
                        let _ = event_tx.send(ClassifyEvent::Completed { record: Box::new(record) });
                    }
                }
            }
        }
    }

    Ok(())
}

/// Feed one event through the state machine, run its effects, and publish the new view.
fn apply<T: Transport>(
    state: State,
    event: Event,
    transport: &Arc<T>,
    in_flight: &mut Option<InFlight>,
    event_tx: &UnboundedSender<ClassifyEvent>,
) -> State {
    let before = state.view.clone();
    let (next, effects) = core::transition(state, event);

    for effect in effects {
        match effect {
            Effect::Classify { generation, file } => {
                let t = transport.clone();
                let handle = tokio::spawn(async move { t.classify(&file).await });
                *in_flight = Some(InFlight { generation, handle });
            }
            Effect::Abandon { generation } => {
                if let Some(f) = in_flight.take() {
                    tracing::info!(generation, "abandoning in-flight request");
                    f.handle.abort();
                }
            }
        }
    }

    if next.view != before {
        let _ = event_tx.send(ClassifyEvent::StateChanged(next.view.clone()));
    }
    next
}

fn spawn_health_check<T: Transport>(transport: Arc<T>, event_tx: UnboundedSender<ClassifyEvent>) {
    tokio::spawn(async move {
        let status = transport.health().await;
        let _ = event_tx.send(ClassifyEvent::Health(status));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeTransport;
    use crate::model::{ImageKind, RequestState};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn file(name: &str) -> SelectedFile {
        SelectedFile::new(name, ImageKind::Png, vec![1u8, 2, 3])
    }

    fn ok(p: f64) -> Result<ClassificationResult, RequestError> {
        Ok(ClassificationResult {
            is_pothole: p > 0.7,
            confidence: if p > 0.7 { p } else { 1.0 - p },
            raw_probability: p,
        })
    }

    #[tokio::test]
    async fn submit_without_file_issues_no_request() {
        let transport = Arc::new(FakeTransport::new(vec![ok(0.9)]));
        let mut c = Controller::new(transport.clone());

        assert!(c.submit().await.is_none());
        assert_eq!(transport.call_count(), 0);
        assert_eq!(c.view(), &ViewState::Empty);
    }

    #[tokio::test]
    async fn successful_submit_stores_result() {
        let transport = Arc::new(FakeTransport::new(vec![ok(0.92)]));
        let mut c = Controller::new(transport.clone());
        c.select_file(file("a.png"));

        let outcome = c.submit().await.unwrap();
        assert!(outcome.is_ok());
        assert_eq!(c.view().request_state(), RequestState::Idle);
        assert!(c.view().result().unwrap().is_pothole);
        assert!(c.view().error().is_none());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_submit_stores_error_and_allows_retry() {
        let transport = Arc::new(FakeTransport::new(vec![
            Err(RequestError::Timeout),
            ok(0.1),
        ]));
        let mut c = Controller::new(transport.clone());
        c.select_file(file("a.png"));

        c.submit().await;
        assert_eq!(
            c.view().error().map(|e| e.to_string()).as_deref(),
            Some("Request timed out. Please try again.")
        );
        assert_eq!(c.view().request_state(), RequestState::Idle);
        assert!(c.view().result().is_none());

        c.submit().await;
        assert!(!c.view().result().unwrap().is_pothole);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn record_reflects_finished_request() {
        let transport = Arc::new(FakeTransport::new(vec![Err(RequestError::server(Some(
            "bad image".into(),
        )))]));
        let mut c = Controller::new(transport);
        assert!(c.record().is_none());
        c.select_file(file("a.png"));
        c.submit().await;

        let record = c.record().unwrap();
        assert_eq!(record.file_name, "a.png");
        assert_eq!(record.base_url, "http://fake");
        assert_eq!(record.timeout, crate::model::DEFAULT_TIMEOUT);
        assert_eq!(
            record.outcome,
            Outcome::Failed {
                error: RequestError::Server("bad image".into())
            }
        );
    }

    async fn next_state(rx: &mut mpsc::UnboundedReceiver<ClassifyEvent>) -> ViewState {
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("controller event timeout")
                .expect("channel closed");
            if let ClassifyEvent::StateChanged(v) = ev {
                return v;
            }
        }
    }

    #[tokio::test]
    async fn loop_runs_request_and_reports_completion() {
        let transport = Arc::new(FakeTransport::new(vec![ok(0.92)]));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_controller(
            transport.clone(),
            Some(file("a.png")),
            event_tx,
            cmd_rx,
        ));

        assert!(matches!(next_state(&mut event_rx).await, ViewState::Selected { .. }));
        cmd_tx.send(UiCommand::Submit).unwrap();
        assert!(matches!(next_state(&mut event_rx).await, ViewState::Loading { .. }));
        assert!(matches!(next_state(&mut event_rx).await, ViewState::Result { .. }));

        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn loop_selects_typed_path_with_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let typed = dir.path().join("my road.png");
        std::fs::write(&typed, b"png").unwrap();

        let transport = Arc::new(FakeTransport::new(vec![]));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_controller(transport, None, event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::SelectPath(typed.display().to_string()))
            .unwrap();
        let view = next_state(&mut event_rx).await;
        assert!(matches!(view, ViewState::Selected { ref file } if file.name == "my road.png"));

        cmd_tx
            .send(UiCommand::SelectPath("notes.txt".into()))
            .unwrap();
        let info = loop {
            let ev = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
                .await
                .expect("controller event timeout")
                .expect("channel closed");
            match ev {
                ClassifyEvent::Info(msg) => break msg,
                ClassifyEvent::StateChanged(v) => panic!("unexpected view change: {v:?}"),
                _ => {}
            }
        };
        assert_eq!(info, "notes.txt is not a JPEG or PNG image");

        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn loop_ignores_response_for_abandoned_selection() {
        let dir = tempfile::tempdir().unwrap();
        let next = dir.path().join("next.png");
        std::fs::write(&next, b"png").unwrap();

        let transport = Arc::new(
            FakeTransport::new(vec![ok(0.95)]).with_delay(Duration::from_millis(300)),
        );
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_controller(
            transport.clone(),
            Some(file("first.png")),
            event_tx,
            cmd_rx,
        ));

        next_state(&mut event_rx).await;
        cmd_tx.send(UiCommand::Submit).unwrap();
        assert!(matches!(next_state(&mut event_rx).await, ViewState::Loading { .. }));

        cmd_tx
            .send(UiCommand::Select(next.display().to_string()))
            .unwrap();
        let view = next_state(&mut event_rx).await;
        assert!(matches!(view, ViewState::Selected { ref file } if file.name == "next.png"));

        // The abandoned request would have landed by now.
        tokio::time::sleep(Duration::from_millis(500)).await;
        while let Ok(ev) = event_rx.try_recv() {
            assert!(!matches!(ev, ClassifyEvent::StateChanged(_)));
            assert!(!matches!(ev, ClassifyEvent::Completed { .. }));
        }

        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
    }
}
