//! Pure upload-and-classify state machine.
//!
//! `transition` never performs I/O; it returns the effects the caller must run.

use crate::model::{ClassificationResult, RequestError, SelectedFile, ViewState};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct State {
    pub view: ViewState,
    /// Bumped on every selection and every submit; a completion carrying an older value is stale.
    pub generation: u64,
}

#[derive(Debug)]
pub enum Event {
    FileSelected(SelectedFile),
    SubmitRequested,
    ClassifyDone {
        generation: u64,
        outcome: Result<ClassificationResult, RequestError>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Classify { generation: u64, file: SelectedFile },
    /// The in-flight request for this generation is abandoned.
    Abandon { generation: u64 },
}

pub fn init() -> State {
    State::default()
}

pub fn transition(state: State, event: Event) -> (State, Vec<Effect>) {
    let State { view, generation } = state;

    match event {
        Event::FileSelected(file) => {
            let mut effects = Vec::new();
            if let ViewState::Loading { generation: g, .. } = &view {
                effects.push(Effect::Abandon { generation: *g });
            }
            (
                State {
                    view: ViewState::Selected { file },
                    generation: generation + 1,
                },
                effects,
            )
        }

        Event::SubmitRequested => match view {
            ViewState::Selected { file }
            | ViewState::Error { file, .. }
            | ViewState::Result { file, .. } => {
                let next = generation + 1;
                (
                    State {
                        view: ViewState::Loading {
                            file: file.clone(),
                            generation: next,
                        },
                        generation: next,
                    },
                    vec![Effect::Classify {
                        generation: next,
                        file,
                    }],
                )
            }
            // No file, or a request already outstanding.
            view @ (ViewState::Empty | ViewState::Loading { .. }) => {
                (State { view, generation }, vec![])
            }
        },

        Event::ClassifyDone {
            generation: done,
            outcome,
        } => match view {
            ViewState::Loading {
                file,
                generation: g,
            } if g == done => {
                let view = match outcome {
                    Ok(result) => ViewState::Result { file, result },
                    Err(error) => ViewState::Error { file, error },
                };
                (State { view, generation }, vec![])
            }
            view => {
                tracing::debug!(stale = done, current = generation, "ignoring stale completion");
                (State { view, generation }, vec![])
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageKind, RequestState};

    fn file(name: &str) -> SelectedFile {
        SelectedFile::new(name, ImageKind::Jpeg, vec![0xffu8, 0xd8])
    }

    fn pothole() -> ClassificationResult {
        ClassificationResult {
            is_pothole: true,
            confidence: 0.92,
            raw_probability: 0.92,
        }
    }

    fn selected(name: &str) -> State {
        transition(init(), Event::FileSelected(file(name))).0
    }

    fn submitted(name: &str) -> (State, u64) {
        let (state, effects) = transition(selected(name), Event::SubmitRequested);
        match effects.as_slice() {
            [Effect::Classify { generation, .. }] => (state, *generation),
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_init_is_empty_idle() {
        let state = init();
        assert_eq!(state.view, ViewState::Empty);
        assert_eq!(state.view.request_state(), RequestState::Idle);
    }

    #[test]
    fn test_select_sets_file_and_clears_outcome() {
        let state = selected("a.jpg");
        assert_eq!(state.view.file().map(|f| f.name.as_str()), Some("a.jpg"));
        assert!(state.view.result().is_none());
        assert!(state.view.error().is_none());
    }

    #[test]
    fn test_reselect_clears_result_and_error() {
        let (state, g) = submitted("a.jpg");
        let (with_result, _) = transition(
            state,
            Event::ClassifyDone {
                generation: g,
                outcome: Ok(pothole()),
            },
        );
        assert!(with_result.view.result().is_some());
        let (state, _) = transition(with_result, Event::FileSelected(file("b.jpg")));
        assert!(matches!(state.view, ViewState::Selected { ref file } if file.name == "b.jpg"));

        let (state, g) = submitted("c.jpg");
        let (with_error, _) = transition(
            state,
            Event::ClassifyDone {
                generation: g,
                outcome: Err(RequestError::Timeout),
            },
        );
        assert!(with_error.view.error().is_some());
        let (state, _) = transition(with_error, Event::FileSelected(file("d.jpg")));
        assert!(state.view.error().is_none());
        assert!(state.view.result().is_none());
    }

    #[test]
    fn test_submit_without_file_is_noop() {
        let (state, effects) = transition(init(), Event::SubmitRequested);
        assert_eq!(state, init());
        assert!(effects.is_empty());
    }

    #[test]
    fn test_submit_while_loading_is_noop() {
        let (loading, _) = submitted("a.jpg");
        let (state, effects) = transition(loading.clone(), Event::SubmitRequested);
        assert_eq!(state, loading);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_submit_emits_single_classify_and_loads() {
        let (state, effects) = transition(selected("a.jpg"), Event::SubmitRequested);
        assert_eq!(state.view.request_state(), RequestState::Loading);
        assert_eq!(effects.len(), 1);
        assert!(matches!(&effects[0], Effect::Classify { file, .. } if file.name == "a.jpg"));
    }

    #[test]
    fn test_failure_returns_to_idle_and_keeps_file_for_retry() {
        let (state, g) = submitted("a.jpg");
        let (state, _) = transition(
            state,
            Event::ClassifyDone {
                generation: g,
                outcome: Err(RequestError::Unreachable),
            },
        );
        assert_eq!(state.view.request_state(), RequestState::Idle);
        assert!(state.view.result().is_none());
        assert!(state.view.can_submit());

        let (state, effects) = transition(state, Event::SubmitRequested);
        assert_eq!(state.view.request_state(), RequestState::Loading);
        assert!(state.view.error().is_none());
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_stale_completion_after_reselect_is_ignored() {
        let (state, stale) = submitted("a.jpg");
        let (state, effects) = transition(state, Event::FileSelected(file("b.jpg")));
        assert_eq!(effects, vec![Effect::Abandon { generation: stale }]);

        let (state, _) = transition(
            state,
            Event::ClassifyDone {
                generation: stale,
                outcome: Ok(pothole()),
            },
        );
        assert!(matches!(state.view, ViewState::Selected { ref file } if file.name == "b.jpg"));
    }
}
