//! Interactive terminal UI: menus (File/Help), a status bar with F1 Config /
//! F5 Start / F6 Pause / F7 Stop / Ctrl-Q Quit, a configuration dialog, a
//! live metrics panel, and a progress bar. Renders state from the same
//! [`EngineController`] the headless runner drives; driving the engine is
//! the only thing this module is not -- it forwards key presses to
//! controller methods and nothing more.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use checkerbase_config::{default_settings_path, parse_proxy_file, AppSettings, SettingsCheckpointStore};
use checkerbase_core::{CheckpointManager, EngineController, EngineSettings, EngineState, MetricsSnapshot};
use checkerbase_discovery::DiscoveryService;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line as TuiLine, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Frame, Terminal,
};
use tracing::warn;

use crate::demo_checker::DemoChecker;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FATAL: i32 = 1;
const TICK: Duration = Duration::from_millis(150);

/// Source of input events, so the UI loop can be driven by a script in tests
/// instead of a real terminal.
trait EventSource {
    fn next(&mut self, timeout: Duration) -> io::Result<Option<Event>>;
}

struct CrosstermEventSource;

impl EventSource for CrosstermEventSource {
    fn next(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        if event::poll(timeout)? {
            Ok(Some(event::read()?))
        } else {
            Ok(None)
        }
    }
}

/// Replays key presses from a line-oriented script:
/// `f1|f5|f6|f7|ctrl-q|enter|esc|tab|type:<text>`. Used by tests only.
struct ScriptEventSource {
    events: Vec<Event>,
    cursor: usize,
}

impl ScriptEventSource {
    fn from_str(script: &str) -> Self {
        let mut events = Vec::new();
        let mut push = |code: KeyCode, modifiers: KeyModifiers| {
            events.push(Event::Key(KeyEvent::new(code, modifiers)));
        };
        for raw in script.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line {
                "f1" => push(KeyCode::F(1), KeyModifiers::NONE),
                "f5" => push(KeyCode::F(5), KeyModifiers::NONE),
                "f6" => push(KeyCode::F(6), KeyModifiers::NONE),
                "f7" => push(KeyCode::F(7), KeyModifiers::NONE),
                "ctrl-q" => push(KeyCode::Char('q'), KeyModifiers::CONTROL),
                "enter" => push(KeyCode::Enter, KeyModifiers::NONE),
                "esc" => push(KeyCode::Esc, KeyModifiers::NONE),
                "tab" => push(KeyCode::Tab, KeyModifiers::NONE),
                other => {
                    if let Some(text) = other.strip_prefix("type:") {
                        for ch in text.chars() {
                            push(KeyCode::Char(ch), KeyModifiers::NONE);
                        }
                    }
                }
            }
        }
        Self { events, cursor: 0 }
    }
}

impl EventSource for ScriptEventSource {
    fn next(&mut self, _timeout: Duration) -> io::Result<Option<Event>> {
        if self.cursor >= self.events.len() {
            return Ok(None);
        }
        let ev = self.events[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(ev))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigField {
    Parallelism,
    MaxRetries,
}

enum Mode {
    Navigate,
    Editing(ConfigField),
}

struct AppState {
    mode: Mode,
    show_config: bool,
    parallelism: String,
    max_retries: String,
    message: Option<String>,
    quit: bool,
}

impl AppState {
    fn new(settings: &AppSettings) -> Self {
        Self {
            mode: Mode::Navigate,
            show_config: false,
            parallelism: settings.parallelism.to_string(),
            max_retries: settings.max_retries.to_string(),
            message: None,
            quit: false,
        }
    }
}

pub async fn run(settings: AppSettings, discovery: Arc<DiscoveryService>, resume: bool) -> i32 {
    if !tokio::fs::try_exists(&settings.input_path).await.unwrap_or(false) {
        eprintln!("input file not found: {}", settings.input_path.display());
        return EXIT_FATAL;
    }

    let controller = match build_controller(&settings, discovery).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("initialization failed: {e}");
            return EXIT_FATAL;
        }
    };

    let resume_from_byte = if resume {
        controller_resume_byte(&settings).await
    } else {
        0
    };

    match run_terminal(settings, controller, resume_from_byte).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("tui error: {e}");
            EXIT_FATAL
        }
    }
}

async fn controller_resume_byte(settings: &AppSettings) -> u64 {
    let Ok(settings_path) = default_settings_path() else {
        return 0;
    };
    let checkpoint = CheckpointManager::new(Arc::new(SettingsCheckpointStore::new(settings_path)));
    checkpoint
        .resume_position(&settings.input_path)
        .await
        .ok()
        .flatten()
        .unwrap_or(0)
}

async fn build_controller(
    settings: &AppSettings,
    discovery: Arc<DiscoveryService>,
) -> Result<Arc<EngineController<DemoChecker>>> {
    let proxies = match &settings.proxy_path {
        Some(path) => {
            let contents = tokio::fs::read_to_string(path).await?;
            parse_proxy_file(&contents, settings.proxy_type)
                .proxies
                .iter()
                .map(|p| p.to_connect_string())
                .collect()
        }
        None => Vec::new(),
    };

    let settings_path = default_settings_path().context("resolving settings path")?;
    let checkpoint = Arc::new(CheckpointManager::new(Arc::new(SettingsCheckpointStore::new(settings_path))));

    let engine_settings = EngineSettings {
        input_path: settings.input_path.clone(),
        output_dir: settings.output_dir.clone(),
        write_success: true,
        write_failed: true,
        write_ignored: false,
        append_to_existing: false,
        parallelism: settings.parallelism,
        max_retries: settings.max_retries,
        proxies,
        input_channel_capacity: 1024,
        segment_size: 64 * 1024,
        max_batch_size: 200,
        flush_interval: Duration::from_millis(500),
    };

    let checker = DemoChecker::new(discovery);
    let controller = Arc::new(EngineController::new(checker, engine_settings, Some(checkpoint)));
    controller.initialize().await?;
    Ok(controller)
}

async fn run_terminal(
    settings: AppSettings,
    controller: Arc<EngineController<DemoChecker>>,
    resume_from_byte: u64,
) -> Result<()> {
    let scripted = std::env::var("CHECKERBASE_TUI_SCRIPT").is_ok();

    let mut stdout = io::stdout();
    if !scripted {
        enable_raw_mode()?;
        execute!(stdout, EnterAlternateScreen)?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut source: Box<dyn EventSource> = if let Ok(script) = std::env::var("CHECKERBASE_TUI_SCRIPT") {
        Box::new(ScriptEventSource::from_str(&script))
    } else {
        Box::new(CrosstermEventSource)
    };

    let mut app = AppState::new(&settings);
    let mut run_handle: Option<tokio::task::JoinHandle<checkerbase_core::Result<MetricsSnapshot>>> = None;

    let result = loop {
        terminal.draw(|f| render(f, &app, &controller.metrics_snapshot(), controller.state()))?;

        if let Some(event) = source.next(TICK)? {
            if let Event::Key(key) = event {
                handle_key(key, &mut app, &controller, &mut run_handle, resume_from_byte);
            }
        }

        if app.quit {
            if let Some(handle) = run_handle.take() {
                controller.cancel();
                let _ = handle.await;
            }
            break Ok(());
        }
    };

    if !scripted {
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    }

    result
}

fn handle_key(
    key: KeyEvent,
    app: &mut AppState,
    controller: &Arc<EngineController<DemoChecker>>,
    run_handle: &mut Option<tokio::task::JoinHandle<checkerbase_core::Result<MetricsSnapshot>>>,
    resume_from_byte: u64,
) {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit = true;
        return;
    }

    match &app.mode {
        Mode::Navigate => match key.code {
            KeyCode::F(1) => app.show_config = !app.show_config,
            KeyCode::F(5) => {
                if run_handle.is_none() && controller.state() != EngineState::Running {
                    let controller = Arc::clone(controller);
                    *run_handle = Some(tokio::spawn(async move { controller.start(resume_from_byte).await }));
                    app.message = Some("run started".to_string());
                } else {
                    app.message = Some("already running".to_string());
                }
            }
            KeyCode::F(6) => match controller.state() {
                EngineState::Running => {
                    controller.pause();
                    app.message = Some("paused".to_string());
                }
                EngineState::Paused => {
                    controller.resume();
                    app.message = Some("resumed".to_string());
                }
                _ => {}
            },
            KeyCode::F(7) => {
                controller.cancel();
                app.message = Some("stopping...".to_string());
            }
            KeyCode::Tab if app.show_config => {
                app.mode = Mode::Editing(ConfigField::Parallelism);
            }
            _ => {}
        },
        Mode::Editing(field) => {
            let field = *field;
            let buf = match field {
                ConfigField::Parallelism => &mut app.parallelism,
                ConfigField::MaxRetries => &mut app.max_retries,
            };
            match key.code {
                KeyCode::Enter => app.mode = Mode::Navigate,
                KeyCode::Esc => app.mode = Mode::Navigate,
                KeyCode::Tab => {
                    app.mode = Mode::Editing(match field {
                        ConfigField::Parallelism => ConfigField::MaxRetries,
                        ConfigField::MaxRetries => ConfigField::Parallelism,
                    });
                }
                KeyCode::Backspace => {
                    buf.pop();
                }
                KeyCode::Char(c) if c.is_ascii_digit() => buf.push(c),
                _ => {}
            }
        }
    }
}

fn render(f: &mut Frame, app: &AppState, snapshot: &MetricsSnapshot, state: EngineState) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.size());

    let menu = Paragraph::new(" File  Help").style(Style::default().fg(Color::Black).bg(Color::Gray));
    f.render_widget(menu, outer[0]);

    let body = outer[1];
    if app.show_config {
        render_config(f, app, body);
    } else {
        render_metrics(f, snapshot, state, body);
    }

    let ratio = (snapshot.progress_percent / 100.0).clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio);
    f.render_widget(gauge, outer[2]);

    let status_text = app
        .message
        .clone()
        .unwrap_or_else(|| "F1 Config  F5 Start  F6 Pause  F7 Stop  Ctrl+Q Quit".to_string());
    let status = Paragraph::new(status_text).style(Style::default().fg(Color::White).bg(Color::Blue));
    f.render_widget(status, outer[3]);
}

fn render_metrics(f: &mut Frame, snapshot: &MetricsSnapshot, state: EngineState, area: ratatui::layout::Rect) {
    let state_label = match state {
        EngineState::Idle => "idle",
        EngineState::Running => "running",
        EngineState::Paused => "paused",
        EngineState::Completed => "completed",
        EngineState::Cancelled => "cancelled",
        EngineState::Error => "error",
    };
    let items = vec![
        ListItem::new(TuiLine::from(vec![Span::raw(format!("state: {state_label}"))])),
        ListItem::new(TuiLine::from(vec![Span::raw(format!(
            "success {}  failed {}  ignored {}  retries {}",
            snapshot.success, snapshot.failed, snapshot.ignored, snapshot.retries
        ))])),
        ListItem::new(TuiLine::from(vec![Span::raw(format!(
            "{:.0} checks/min  {:.1} KB/s",
            snapshot.cpm,
            snapshot.bytes_per_sec / 1024.0
        ))])),
        ListItem::new(TuiLine::from(vec![Span::raw(format!(
            "eta: {}",
            snapshot.eta.map(|d| format!("{}s", d.as_secs())).unwrap_or_else(|| "--".into())
        ))])),
    ];
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Metrics"));
    f.render_widget(list, area);
}

fn render_config(f: &mut Frame, app: &AppState, area: ratatui::layout::Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let parallelism_style = if matches!(app.mode, Mode::Editing(ConfigField::Parallelism)) {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    let retries_style = if matches!(app.mode, Mode::Editing(ConfigField::MaxRetries)) {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    f.render_widget(
        Paragraph::new(format!("Parallelism: {}", app.parallelism)).style(parallelism_style),
        rows[0],
    );
    f.render_widget(
        Paragraph::new(format!("Max retries: {}", app.max_retries)).style(retries_style),
        rows[1],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_event_source_parses_function_keys_and_text() {
        let mut source = ScriptEventSource::from_str("f1\nf5\ntype:42\nenter\nctrl-q");
        let mut codes = Vec::new();
        while let Some(Event::Key(key)) = source.next(Duration::ZERO).unwrap() {
            codes.push(key.code);
        }
        assert_eq!(
            codes,
            vec![
                KeyCode::F(1),
                KeyCode::F(5),
                KeyCode::Char('4'),
                KeyCode::Char('2'),
                KeyCode::Enter,
                KeyCode::Char('q'),
            ]
        );
    }

    #[test]
    fn editing_parallelism_accepts_only_digits() {
        let settings = AppSettings::default();
        let mut app = AppState::new(&settings);
        app.mode = Mode::Editing(ConfigField::Parallelism);
        app.parallelism = String::new();

        for ch in ['8', 'x', '0'] {
            let key = KeyEvent::new(KeyCode::Char(ch), KeyModifiers::NONE);
            if let Mode::Editing(field) = app.mode {
                let buf = match field {
                    ConfigField::Parallelism => &mut app.parallelism,
                    ConfigField::MaxRetries => &mut app.max_retries,
                };
                if let KeyCode::Char(c) = key.code {
                    if c.is_ascii_digit() {
                        buf.push(c);
                    }
                }
            }
        }
        assert_eq!(app.parallelism, "80");
    }
}
