//! Terminal device list with a refresh control
//!
//! Run with: cargo run --example device_list_tui
//!
//! ## Keyboard Controls
//!
//! | Key | Action |
//! |-----|--------|
//! | `Up/Down` | Scroll the device list |
//! | `R` | Refresh (clear the list and restart the scan) |
//! | `S` | Start/stop scanning |
//! | `Q/Esc` | Quit |

use ble_device_scanner::{
    DeviceRecord, DiscoverySession, Result, SessionConfig, SessionEvent, SessionState,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::*, widgets::*};
use std::io::{self, stdout, Stdout};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

/// Main terminal type alias
type Terminal = ratatui::Terminal<CrosstermBackend<Stdout>>;

/// Application state
struct App {
    session: DiscoverySession,
    session_events: tokio::sync::broadcast::Receiver<SessionEvent>,
    devices: Vec<DeviceRecord>,
    list_state: ListState,
    status: String,
}

impl App {
    async fn new() -> Result<Self> {
        let session = DiscoverySession::with_bluetooth(SessionConfig::default()).await?;
        let session_events = session.subscribe();

        Ok(Self {
            session,
            session_events,
            devices: Vec::new(),
            list_state: ListState::default(),
            status: "Ready".to_string(),
        })
    }

    fn update(&mut self) {
        self.devices = self.session.snapshot();

        loop {
            match self.session_events.try_recv() {
                Ok(SessionEvent::ScanFailed(failure)) => {
                    self.status = format!("Scan failed: {} - press R to retry", failure);
                }
                Ok(SessionEvent::StateChanged(state)) => {
                    self.status = format!("{}", state);
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        match self.list_state.selected() {
            Some(i) if i >= self.devices.len() => {
                self.list_state
                    .select(self.devices.len().checked_sub(1));
            }
            None if !self.devices.is_empty() => self.list_state.select(Some(0)),
            _ => {}
        }
    }

    fn select_next(&mut self) {
        if !self.devices.is_empty() {
            let i = self.list_state.selected().map_or(0, |i| (i + 1) % self.devices.len());
            self.list_state.select(Some(i));
        }
    }

    fn select_prev(&mut self) {
        if !self.devices.is_empty() {
            let i = match self.list_state.selected() {
                Some(0) | None => self.devices.len() - 1,
                Some(i) => i - 1,
            };
            self.list_state.select(Some(i));
        }
    }

    async fn refresh(&mut self) {
        if let Err(e) = self.session.restart().await {
            self.status = format!("Refresh failed: {}", e);
        }
        self.list_state.select(None);
    }

    async fn toggle_scanning(&mut self) {
        let result = match self.session.state() {
            SessionState::Scanning => self.session.stop().await,
            SessionState::Idle => self.session.start().await,
        };
        if let Err(e) = result {
            self.status = format!("Error: {}", e);
        }
    }
}

fn setup_terminal() -> io::Result<Terminal> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(terminal: &mut Terminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

fn render_ui(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .split(frame.area());

    let button = Paragraph::new("Refresh Devices  [R]")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(button, chunks[0]);

    let items: Vec<ListItem> = app
        .devices
        .iter()
        .map(|device| ListItem::new(device.row()))
        .collect();

    let title = match app.session.state() {
        SessionState::Scanning => " Devices [Scanning] ",
        SessionState::Idle => " Devices [Stopped] ",
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_stateful_widget(list, chunks[1], &mut app.list_state);

    let status = Paragraph::new(format!(
        " {} | {} devices | R refresh  S start/stop  Q quit",
        app.status,
        app.devices.len()
    ))
    .style(Style::default().fg(Color::Cyan));
    frame.render_widget(status, chunks[2]);
}

async fn run_app(terminal: &mut Terminal, mut app: App) -> Result<()> {
    app.session.start().await?;

    loop {
        app.update();

        terminal
            .draw(|frame| render_ui(frame, &mut app))
            .map_err(|e| ble_device_scanner::Error::Internal(format!("Draw error: {}", e)))?;

        let has_event = event::poll(Duration::from_millis(100))
            .map_err(|e| ble_device_scanner::Error::Internal(format!("Poll error: {}", e)))?;

        if has_event {
            let event = event::read()
                .map_err(|e| ble_device_scanner::Error::Internal(format!("Read error: {}", e)))?;

            if let Event::Key(key) = event {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Up => app.select_prev(),
                        KeyCode::Down => app.select_next(),
                        KeyCode::Char('r') | KeyCode::Char('R') => app.refresh().await,
                        KeyCode::Char('s') | KeyCode::Char('S') => app.toggle_scanning().await,
                        _ => {}
                    }
                }
            }
        }
    }

    app.session.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut terminal = setup_terminal().map_err(|e| {
        ble_device_scanner::Error::Internal(format!("Failed to setup terminal: {}", e))
    })?;

    let result = match App::new().await {
        Ok(app) => run_app(&mut terminal, app).await,
        Err(e) => Err(e),
    };

    let _ = restore_terminal(&mut terminal);

    result
}
