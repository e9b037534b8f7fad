mod export;
mod help;
mod state;

use crate::cli::{build_config, Cli};
use crate::engine::HttpTransport;
use crate::model::{ClassificationRecord, ClassifyEvent, ClientConfig, ViewState};
use crate::orchestrator::{self, UiCommand};
use crate::text_summary::{self, TITLE};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{history_line, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let transport = Arc::new(HttpTransport::new(&cfg)?);
    let initial = match args.image.as_deref() {
        Some(p) => Some(crate::cli::load_image_arg(p).await?),
        None => None,
    };

    // Unbounded channels avoid backpressure between the UI thread and the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ClassifyEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, cfg, event_rx, cmd_tx));

    let res = orchestrator::run_controller(transport, initial, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    args: Cli,
    cfg: ClientConfig,
    mut event_rx: UnboundedReceiver<ClassifyEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    // Terminals deliver a dragged file as a bracketed paste of its path.
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState {
        base_url: cfg.base_url.clone(),
        auto_save: cfg.auto_save,
        ..Default::default()
    };
    if let Ok(dir) = crate::storage::history_dir(cfg.history_dir.as_deref()) {
        state.history =
            crate::storage::load_recent(&dir, state.history_load_size).unwrap_or_default();
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                ClassifyEvent::Completed { record } => {
                    handle_completed(&args, &cfg, &mut state, *record);
                }
                other => state.apply_event(other),
            }
        }

        if last_tick.elapsed() >= tick_rate {
            state.tick();
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let k = match event::read() {
            Ok(Event::Paste(text)) => {
                if state.input_editing {
                    state.input.push_str(text.trim());
                } else {
                    let _ = cmd_tx.send(UiCommand::Select(text));
                    state.tab = 0;
                }
                continue;
            }
            Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => k,
            _ => continue,
        };

        if state.input_editing {
            match k.code {
                KeyCode::Enter => {
                    state.input_editing = false;
                    let text = std::mem::take(&mut state.input);
                    if !text.trim().is_empty() {
                        let _ = cmd_tx.send(UiCommand::SelectPath(text));
                    }
                }
                KeyCode::Esc => {
                    state.input_editing = false;
                    state.input.clear();
                }
                KeyCode::Backspace => {
                    state.input.pop();
                }
                KeyCode::Char(c) => state.input.push(c),
                _ => {}
            }
            continue;
        }

        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                let _ = cmd_tx.send(UiCommand::Quit);
                break Ok(());
            }
            (_, KeyCode::Char('o')) => {
                state.tab = 0;
                state.input_editing = true;
            }
            (_, KeyCode::Enter) | (_, KeyCode::Char('a')) => {
                // The action is only offered while idle with a file selected.
                if state.tab == 0 && state.view.can_submit() {
                    let _ = cmd_tx.send(UiCommand::Submit);
                }
            }
            (_, KeyCode::Char('h')) => {
                state.health = None;
                let _ = cmd_tx.send(UiCommand::CheckHealth);
            }
            (_, KeyCode::Char('s')) => {
                state.auto_save = !state.auto_save;
                state.info = format!(
                    "Auto-save {}",
                    if state.auto_save { "enabled" } else { "disabled" }
                );
            }
            (_, KeyCode::Char('e')) => match current_record(&state).cloned() {
                Some(r) => match export::export_record_json(&r) {
                    Ok(path) => state.info = format!("Exported JSON: {}", path.display()),
                    Err(e) => state.info = format!("Export JSON failed: {e:#}"),
                },
                None => state.info = "Nothing to export yet.".into(),
            },
            (_, KeyCode::Char('y')) => match current_record(&state) {
                Some(r) => {
                    let text = export::record_summary_text(r);
                    state.info = match export::copy_to_clipboard(&text) {
                        Ok(()) => "Copied result to clipboard".into(),
                        Err(e) => format!("Copy failed: {e:#}"),
                    };
                }
                None => state.info = "Nothing to copy yet.".into(),
            },
            (_, KeyCode::Tab) => {
                state.tab = (state.tab + 1) % 3;
            }
            (_, KeyCode::Char('?')) => {
                state.tab = 2;
            }
            (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                if state.tab == 1 {
                    state.select_prev();
                }
            }
            (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                if state.tab == 1 {
                    state.select_next();
                }
            }
            _ => {}
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen).ok();
    res
}

/// Record targeted by export/copy: the selected history entry on the history tab,
/// otherwise the latest finished request.
fn current_record(state: &UiState) -> Option<&ClassificationRecord> {
    if state.tab == 1 {
        state.selected_history()
    } else {
        state.last_record.as_ref()
    }
}

fn handle_completed(args: &Cli, cfg: &ClientConfig, state: &mut UiState, r: ClassificationRecord) {
    let cfg = ClientConfig {
        auto_save: state.auto_save,
        ..cfg.clone()
    };
    let processed = orchestrator::process_completion(
        &cfg,
        args.export_json.as_deref(),
        state.history_load_size,
        &r,
    );

    state.last_record = Some(r);
    if let Some(path) = processed.auto_saved_path.as_ref() {
        state.info = format!("Saved: {}", path.display());
    }
    if !processed.export_messages.is_empty() {
        state.info = processed.export_messages.join("; ");
    }
    if cfg.auto_save {
        state.history = processed.history;
        state.history_selected = 0;
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Classify"),
        Line::from("History"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title(TITLE))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_classify(chunks[1], f, state),
        1 => draw_history(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }

    draw_status(chunks[2], f, state);
}

fn draw_classify(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    // Drop zone
    let drop_lines = if state.input_editing {
        vec![
            Line::from("Type the image path and press Enter (Esc to cancel)"),
            Line::from(vec![
                Span::styled("Path: ", Style::default().fg(Color::Gray)),
                Span::raw(state.input.clone()),
                Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
            ]),
        ]
    } else {
        vec![
            Line::from("Drag and drop an image here, or press o to type a path"),
            Line::from(Span::styled(
                "Supported formats: JPEG, JPG, PNG",
                Style::default().fg(Color::Gray),
            )),
        ]
    };
    let drop = Paragraph::new(drop_lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue))
                .title("Image"),
        );
    f.render_widget(drop, chunks[0]);

    // Selected file
    let file_line = match state.view.file() {
        Some(file) => Line::from(vec![
            Span::styled("Selected file: ", Style::default().fg(Color::Gray)),
            Span::raw(
                file.path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| file.name.clone()),
            ),
            Span::styled(
                format!("  ({} bytes)", file.size()),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        None => Line::from(Span::styled(
            "No image selected",
            Style::default().fg(Color::DarkGray),
        )),
    };
    f.render_widget(
        Paragraph::new(file_line).block(Block::default().borders(Borders::ALL)),
        chunks[1],
    );

    f.render_widget(outcome_panel(state), chunks[2]);
}

fn outcome_panel(state: &UiState) -> Paragraph<'static> {
    let hint = |label: &'static str| {
        Line::from(vec![
            Span::raw("Press "),
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw(format!(" to {label}")),
        ])
    };

    let (title, lines) = match &state.view {
        ViewState::Empty => ("", vec![]),
        ViewState::Selected { .. } => ("", vec![hint("Analyze Image")]),
        ViewState::Loading { .. } => {
            let secs = state
                .loading_since
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            (
                "",
                vec![Line::from(format!("{} Analyzing… {:.1}s", state.spinner(), secs))],
            )
        }
        ViewState::Error { error, .. } => (
            "Error",
            vec![
                Line::from(Span::styled(
                    error.to_string(),
                    Style::default().fg(Color::Red),
                )),
                Line::from(""),
                hint("retry"),
            ],
        ),
        ViewState::Result { result, .. } => {
            let verdict_color = if result.is_pothole {
                Color::Red
            } else {
                Color::Green
            };
            let mut lines = Vec::new();
            for (i, text) in text_summary::result_lines(result).into_iter().enumerate() {
                let style = match i {
                    0 => Style::default()
                        .fg(verdict_color)
                        .add_modifier(Modifier::BOLD),
                    1 => Style::default(),
                    2 => Style::default().fg(Color::Gray),
                    _ => Style::default().fg(Color::Yellow),
                };
                lines.push(Line::from(Span::styled(text, style)));
            }
            ("Analysis Result", lines)
        }
    };

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(title))
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = Vec::new();

    // Subtract 2 for borders and 1 for the header line
    let max_items = (area.height as usize).saturating_sub(3).max(1);
    let total_count = state.history.len();
    let current_pos = if total_count > 0 {
        state.history_selected + 1
    } else {
        0
    };

    lines.push(Line::from(vec![
        Span::raw(format!("History ({current_pos}/{total_count}) - ")),
        Span::styled("↑/↓/j/k", Style::default().fg(Color::Magenta)),
        Span::raw(": navigate, "),
        Span::styled("e", Style::default().fg(Color::Magenta)),
        Span::raw(": export JSON, "),
        Span::styled("y", Style::default().fg(Color::Magenta)),
        Span::raw(": copy"),
    ]));

    if state.history.is_empty() {
        lines.push(Line::from(Span::styled(
            "No saved classifications yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    // Keep the selection visible.
    let offset = state.history_selected.saturating_sub(max_items.saturating_sub(1));
    for (i, r) in state.history.iter().enumerate().skip(offset).take(max_items) {
        let style = if i == state.history_selected {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(history_line(r), style)));
    }

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("History"));
    f.render_widget(p, area);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let health_color = match &state.health {
        Some(Ok(_)) => Color::Green,
        Some(Err(_)) => Color::Red,
        None => Color::Gray,
    };
    let line = Line::from(vec![
        Span::styled("Backend: ", Style::default().fg(Color::Gray)),
        Span::raw(format!("{} ", state.base_url)),
        Span::styled(state.health_label(), Style::default().fg(health_color)),
        Span::styled("  Auto-save: ", Style::default().fg(Color::Gray)),
        Span::raw(if state.auto_save { "on" } else { "off" }),
        Span::raw("  "),
        Span::raw(state.info.clone()),
    ]);
    let p = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title("q quit · o open · Enter/a analyze · ? help"),
    );
    f.render_widget(p, area);
}
