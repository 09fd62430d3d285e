//! Terminal UI: submission form plus the live update feed.
//!
//! The UI runs on a dedicated thread to keep blocking terminal I/O out of
//! the Tokio runtime; the controller task owns the session lifecycle and the
//! two sides talk over unbounded channels. A panic boundary around the UI
//! loop always restores the terminal and degrades to an error report instead
//! of a wedged screen.

mod feed;
mod form;
mod help;

use crate::backend::BackendClient;
use crate::cli::Cli;
use crate::config::AppConfig;
use crate::controller::{run_controller, UiCommand};
use crate::model::{ChannelStatus, FeedEvent, SessionId, UpdateMessage};
use crate::realtime::WebSocketTransport;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

struct UiState {
    tab: usize,
    form: form::FormState,
    messages: Vec<UpdateMessage>,
    channel: ChannelStatus,
    session: Option<SessionId>,
    info: String,
    init_error: Option<String>,
    feed_scroll: usize,
}

impl UiState {
    fn new(args: &Cli, init_error: Option<String>) -> Self {
        Self {
            tab: 0,
            form: form::FormState::from_args(args),
            messages: Vec::new(),
            channel: ChannelStatus::Idle,
            session: None,
            info: String::new(),
            init_error,
            feed_scroll: 0,
        }
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let (feed_tx, feed_rx) = mpsc::unbounded_channel::<FeedEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    match AppConfig::from_cli(&args) {
        Ok(cfg) => {
            let backend = BackendClient::new(&cfg)?;
            let transport = Arc::new(WebSocketTransport::new(cfg.realtime.clone()));

            let ui_args = args.clone();
            let ui_handle =
                std::thread::spawn(move || run_threaded(ui_args, None, feed_rx, cmd_tx));

            let res =
                run_controller(backend, transport, cfg.resubscribe_delay, feed_tx, cmd_rx).await;
            join_ui(ui_handle).await?;
            res
        }
        Err(e) if e.is_initialization() => {
            // Blocking error view: no controller is spawned and the
            // submission path is unreachable until the endpoint is set.
            drop(feed_tx);
            let message = e.to_string();
            let ui_handle =
                std::thread::spawn(move || run_threaded(args, Some(message), feed_rx, cmd_tx));
            join_ui(ui_handle).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn join_ui(handle: std::thread::JoinHandle<Result<()>>) -> Result<()> {
    let joined = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("joining UI thread")?;
    match joined {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!("UI thread panicked")),
    }
}

/// Run the UI loop on a dedicated thread, inside a panic boundary that
/// restores the terminal no matter how rendering fails.
fn run_threaded(
    args: Cli,
    init_error: Option<String>,
    mut feed_rx: UnboundedReceiver<FeedEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::new(&args, init_error);

    let res = catch_unwind(AssertUnwindSafe(|| {
        ui_loop(&mut terminal, &mut state, &mut feed_rx, &cmd_tx)
    }));

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();

    match res {
        Ok(r) => r,
        Err(panic) => {
            let _ = cmd_tx.send(UiCommand::Quit);
            if cfg!(debug_assertions) {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                Err(anyhow::anyhow!("render failure: {detail}"))
            } else {
                Err(anyhow::anyhow!("something went wrong rendering the view"))
            }
        }
    }
}

fn ui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut UiState,
    feed_rx: &mut UnboundedReceiver<FeedEvent>,
    cmd_tx: &UnboundedSender<UiCommand>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(ev) = feed_rx.try_recv() {
            apply_event(state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Esc) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        return Ok(());
                    }
                    _ if state.init_error.is_some() => {
                        // Blocking error state: every other key is inert.
                    }
                    (_, KeyCode::F(1)) => {
                        state.tab = 1 - state.tab;
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('s')) => submit(state, cmd_tx),
                    (_, KeyCode::Tab) => state.form.focus_next(),
                    (_, KeyCode::BackTab) => state.form.focus_prev(),
                    (_, KeyCode::PageUp) => {
                        state.feed_scroll = (state.feed_scroll + 5).min(state.messages.len());
                    }
                    (_, KeyCode::PageDown) => {
                        state.feed_scroll = state.feed_scroll.saturating_sub(5);
                    }
                    (_, KeyCode::Enter) => {
                        if !state.form.newline() {
                            submit(state, cmd_tx);
                        }
                    }
                    (_, KeyCode::Backspace) => state.form.backspace(),
                    (_, KeyCode::Char(c)) => state.form.insert_char(c),
                    _ => {}
                }
            }
        }
    }
}

fn submit(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>) {
    match state.form.validate() {
        Ok(request) => {
            state.info = "Submitting…".into();
            let _ = cmd_tx.send(UiCommand::Submit(request));
        }
        Err(msg) => state.info = msg,
    }
}

fn apply_event(state: &mut UiState, ev: FeedEvent) {
    match ev {
        FeedEvent::FeedCleared => {
            state.messages.clear();
            state.feed_scroll = 0;
            state.session = None;
        }
        FeedEvent::SessionStarted { session_id } => {
            state.info = format!("Processing started (session {session_id})");
            state.session = Some(session_id);
        }
        FeedEvent::Update(m) => state.messages.push(m),
        FeedEvent::Channel(status) => state.channel = status,
        FeedEvent::SubmissionFailed { reason } => {
            state.info = format!("Submission failed: {reason}");
        }
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Submit"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("ytproc-cli"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    if let Some(message) = &state.init_error {
        draw_init_error(chunks[1], f, message);
        return;
    }

    match state.tab {
        0 => draw_submit(chunks[1], f, state),
        _ => help::render(f, chunks[1]),
    }
}

fn draw_init_error(area: Rect, f: &mut ratatui::Frame, message: &str) {
    let lines = vec![
        Line::from(Span::styled(
            "Initialization failed",
            Style::default().fg(Color::Red),
        )),
        Line::from(""),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from("Set the realtime endpoint and restart. Press Esc to quit."),
    ];
    let block = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title("Error"),
    );
    f.render_widget(block, area);
}

fn draw_submit(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(9), // form: IDs textarea + numeric row
                Constraint::Min(5),    // feed
                Constraint::Length(4), // status
            ]
            .as_ref(),
        )
        .split(area);

    form::render(f, main[0], &state.form);
    feed::render(f, main[1], &state.messages, state.feed_scroll);

    let status_lines = vec![
        Line::from(vec![
            Span::styled("Session: ", Style::default().fg(Color::Gray)),
            Span::raw(
                state
                    .session
                    .as_ref()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
            Span::raw("   "),
            Span::styled("Channel: ", Style::default().fg(Color::Gray)),
            Span::raw(state.channel.label()),
        ]),
        Line::from(vec![
            Span::styled("Info: ", Style::default().fg(Color::Gray)),
            Span::raw(state.info.clone()),
        ]),
    ];
    let status =
        Paragraph::new(status_lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, main[2]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use clap::Parser;

    fn state() -> UiState {
        let args = Cli::parse_from(["ytproc-cli", "--realtime-url", "ws://localhost"]);
        UiState::new(&args, None)
    }

    #[test]
    fn feed_cleared_resets_messages_and_session() {
        let mut s = state();
        apply_event(&mut s, FeedEvent::SessionStarted { session_id: SessionId::new("a") });
        apply_event(&mut s, FeedEvent::Update(UpdateMessage::received_now("one")));
        apply_event(&mut s, FeedEvent::FeedCleared);
        assert!(s.messages.is_empty());
        assert!(s.session.is_none());
    }

    #[test]
    fn updates_append_in_arrival_order() {
        let mut s = state();
        apply_event(&mut s, FeedEvent::Update(UpdateMessage::received_now("Processing started")));
        apply_event(&mut s, FeedEvent::Update(UpdateMessage::received_now("Error: rate limited")));
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.messages[0].text, "Processing started");
        assert_eq!(s.messages[1].severity, Severity::Error);
    }

    #[test]
    fn channel_status_reaches_the_status_line() {
        let mut s = state();
        apply_event(&mut s, FeedEvent::Channel(ChannelStatus::Resubscribing));
        assert_eq!(s.channel, ChannelStatus::Resubscribing);
    }
}
