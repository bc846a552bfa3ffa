mod client;
mod session;

use anyhow::Result;
use casus_shared::{ChatMessage, MessageRole};
use client::{BackendClient, ReplyEvent, ReplyKind};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use session::{ChatSession, LocalCommand};
use std::io;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct App {
    session: ChatSession,
    input: String,
    scroll: u16,
}

impl App {
    fn new() -> Self {
        Self {
            session: ChatSession::new(),
            input: String::new(),
            scroll: 0,
        }
    }

    /// Handles Enter: local commands stay here, anything else goes to the server.
    fn submit(&mut self, client: &BackendClient) {
        let content = self.input.trim().to_string();
        self.input.clear();
        if content.is_empty() {
            return;
        }
        if let Some(command) = LocalCommand::parse(&content) {
            info!("Local command: {:?}", command);
            self.session.apply(command);
            return;
        }
        if self.session.is_streaming() {
            warn!("Ignoring input while a reply is streaming");
            self.input = content;
            return;
        }
        self.session.add_user_message(content);
        let request = self.session.request();
        let generation = self.session.start_streaming();
        client.send(generation, request);
        self.scroll = 0;
    }

    fn on_reply(&mut self, event: ReplyEvent) {
        let generation = event.generation;
        if !self.session.is_current(generation) {
            debug!("Dropping event for abandoned reply {}", generation);
            return;
        }
        match event.kind {
            ReplyKind::Delta(delta) => self.session.append(generation, &delta),
            ReplyKind::Done => self.session.finish_streaming(generation),
            ReplyKind::Failed(reason) => {
                warn!("Reply failed: {}", reason);
                self.session.fail(generation);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Log to a file so the terminal UI stays clean.
    let log_file = std::fs::File::create("casus-cli.log").ok();
    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .init();
    }

    let server_url =
        std::env::var("CASUS_SERVER_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    info!("Using server {}", server_url);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    let (client, mut reply_rx) = BackendClient::new(&server_url);

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while let Ok(event) = event::read() {
            if ui_tx.send(event).is_err() {
                break;
            }
        }
    });

    let res = run_app(&mut terminal, &mut app, &client, &mut reply_rx, &mut ui_rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    client: &BackendClient,
    reply_rx: &mut mpsc::UnboundedReceiver<ReplyEvent>,
    ui_rx: &mut mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            Some(event) = ui_rx.recv() => {
                if let Event::Key(key) = event {
                    if key.kind == KeyEventKind::Press {
                        match key.code {
                            KeyCode::Char('q') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                                return Ok(())
                            }
                            KeyCode::Char(c) => app.input.push(c),
                            KeyCode::Backspace => {
                                app.input.pop();
                            }
                            KeyCode::Enter => app.submit(client),
                            KeyCode::Up => app.scroll = app.scroll.saturating_add(1),
                            KeyCode::Down => app.scroll = app.scroll.saturating_sub(1),
                            _ => {}
                        }
                    }
                }
            }
            Some(reply) = reply_rx.recv() => app.on_reply(reply),
        }
    }
}

fn profile_summary(app: &App) -> String {
    let profile = app.session.profile();
    let mut parts = vec!["Casus".to_string()];
    if let Some(mode) = profile.mode() {
        parts.push(format!("mode {}", mode.as_str()));
    }
    if let Some(univers) = profile.univers() {
        parts.push(format!("univers {univers}"));
    }
    if let Some(style) = profile.style() {
        parts.push(format!("style {style}"));
    }
    if let Some(notice) = app.session.notice() {
        parts.push(notice.to_string());
    }
    parts.join(" · ")
}

fn message_lines(msg: &ChatMessage) -> Vec<Line<'_>> {
    let (prefix, style) = match msg.role {
        MessageRole::System => ("Système", Style::default().fg(Color::Yellow)),
        MessageRole::User => ("Toi", Style::default().fg(Color::Cyan)),
        MessageRole::Assistant => ("Casus", Style::default().fg(Color::Green)),
    };
    let mut lines = vec![Line::from(Span::styled(
        format!("{prefix}:"),
        style.add_modifier(Modifier::BOLD),
    ))];
    for line in msg.content.lines() {
        lines.push(Line::from(Span::raw(line)));
    }
    lines.push(Line::from(""));
    lines
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(f.area());

    let header = Paragraph::new(profile_summary(app)).style(Style::default().fg(Color::Magenta));
    f.render_widget(header, chunks[0]);

    let streaming = app.session.streaming().map(|reply| {
        ChatMessage::assistant(if reply.is_empty() { "●●●" } else { reply })
    });
    let lines: Vec<Line> = app
        .session
        .messages()
        .iter()
        .chain(streaming.iter())
        .flat_map(message_lines)
        .collect();

    // Follow the tail unless the user scrolled up.
    let visible = chunks[1].height.saturating_sub(2);
    let bottom = (lines.len() as u16).saturating_sub(visible);
    let offset = bottom.saturating_sub(app.scroll);

    let chat = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Chat"))
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));
    f.render_widget(chat, chunks[1]);

    let input = Paragraph::new(app.input.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Message (/roll, /help, /mode, /univers, /style, /reset · Ctrl-Q pour quitter)"),
        )
        .wrap(Wrap { trim: true });
    f.render_widget(input, chunks[2]);
}
