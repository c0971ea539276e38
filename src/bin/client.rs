use std::io;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use kabootar::protocol::{decode_line, encode_line};
use kabootar::{ChatMessage, ClientPacket, JoinPayload, ServerPacket};

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "client", about = "Kabootar TUI client")]
struct Args {
    #[arg(long, default_value = "localhost:4000")]
    addr: String,

    /// Join immediately with this name instead of prompting
    #[arg(long)]
    name: Option<String>,
}

// ─── Screens ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Screen {
    Join,
    Chat,
}

// ─── Simple one-line text input ───────────────────────────────────────────────

#[derive(Default, Clone)]
struct Input {
    value: String,
    cursor: usize,
}

impl Input {
    fn insert(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn delete_back(&mut self) {
        if self.cursor == 0 {
            return;
        }
        // find previous char boundary
        let mut prev = self.cursor - 1;
        while prev > 0 && !self.value.is_char_boundary(prev) {
            prev -= 1;
        }
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
    }

    fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    fn as_str(&self) -> &str {
        &self.value
    }
}

// ─── App state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct ChatLine {
    username: String,
    text: String,
    timestamp: String,
    own: bool,
}

struct App {
    screen: Screen,
    name: String,
    name_input: Input,
    join_error: String,

    messages: Vec<ChatLine>,
    notifications: Vec<String>,
    active_users: Vec<String>,
    chat_input: Input,
    scroll: usize, // how many lines from the bottom we are scrolled
    viewport_height: u16,
    connected: bool,

    quit: bool,
}

impl App {
    fn new() -> Self {
        Self {
            screen: Screen::Join,
            name: String::new(),
            name_input: Input::default(),
            join_error: String::new(),

            messages: Vec::new(),
            notifications: Vec::new(),
            active_users: Vec::new(),
            chat_input: Input::default(),
            scroll: 0,
            viewport_height: 20,
            connected: true,

            quit: false,
        }
    }

    /// Validates the typed name and switches to the chat screen.
    /// Returns the packet to send, if any.
    fn submit_name(&mut self) -> Option<ClientPacket> {
        let name = self.name_input.as_str().trim().to_string();
        if name.is_empty() {
            self.join_error = "Name must not be blank".into();
            return None;
        }
        self.join_error.clear();
        self.name = name.clone();
        self.screen = Screen::Chat;
        Some(ClientPacket::Join(JoinPayload { username: name }))
    }

    fn submit_message(&mut self) -> Option<ClientPacket> {
        let text = self.chat_input.as_str().to_string();
        if text.trim().is_empty() {
            return None;
        }
        self.chat_input.clear();
        Some(ClientPacket::SendMessage(ChatMessage::new(self.name.clone(), text)))
    }

    fn apply(&mut self, pkt: ServerPacket) {
        match pkt {
            ServerPacket::JoinedPersonName(note) => self.notifications.push(note),
            ServerPacket::ActiveUsers(users) | ServerPacket::UpdateUserList(users) => {
                self.active_users = users;
            }
            ServerPacket::ReceiveMessage(msg) => {
                let own = msg.sender_name == self.name;
                self.messages.push(ChatLine {
                    username: msg.sender_name,
                    text: msg.text,
                    timestamp: Local::now().format("%H:%M:%S").to_string(),
                    own,
                });
            }
        }
    }

    fn active_input(&mut self) -> &mut Input {
        match self.screen {
            Screen::Join => &mut self.name_input,
            Screen::Chat => &mut self.chat_input,
        }
    }

    fn scroll_up(&mut self) {
        let max = self.messages.len().saturating_sub(self.viewport_height as usize);
        self.scroll = (self.scroll + 3).min(max);
    }

    fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(3);
    }
}

// ─── Network message types (from server → TUI) ───────────────────────────────

enum NetMsg {
    Packet(ServerPacket),
    Disconnected,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Connect to server
    let stream = TcpStream::connect(&args.addr).await?;
    let (reader, writer) = stream.into_split();

    // Channel: server → UI
    let (net_tx, mut net_rx) = mpsc::channel::<NetMsg>(128);
    // Channel: UI → server writer
    let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(64);

    // Spawn reader task
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Ok(pkt) = decode_line::<ServerPacket>(&line) {
                        if net_tx.send(NetMsg::Packet(pkt)).await.is_err() {
                            break;
                        }
                    }
                }
                _ => {
                    net_tx.send(NetMsg::Disconnected).await.ok();
                    break;
                }
            }
        }
    });

    // Spawn writer task
    tokio::spawn(async move {
        let mut w = writer;
        while let Some(data) = write_rx.recv().await {
            if w.write_all(&data).await.is_err() {
                break;
            }
        }
    });

    let mut app = App::new();
    if let Some(name) = args.name {
        app.name_input.value = name;
        app.name_input.cursor = app.name_input.value.len();
        if let Some(pkt) = app.submit_name() {
            send_packet(&write_tx, &pkt).await?;
        }
    }

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, &mut net_rx, &write_tx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    net_rx: &mut mpsc::Receiver<NetMsg>,
    write_tx: &mpsc::Sender<Vec<u8>>,
) -> Result<()> {
    loop {
        // Draw
        let size = terminal.size()?;
        app.viewport_height = size.height.saturating_sub(6);
        terminal.draw(|f| draw(f, app))?;

        // Poll keyboard (non-blocking, 20ms)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(key) = event::read()? {
                if let Some(pkt) = handle_key(app, key) {
                    send_packet(write_tx, &pkt).await?;
                }
            }
        }

        // Drain all pending network messages
        while let Ok(msg) = net_rx.try_recv() {
            match msg {
                NetMsg::Packet(pkt) => app.apply(pkt),
                NetMsg::Disconnected => {
                    app.connected = false;
                    app.notifications.push("Disconnected from server.".into());
                }
            }
        }

        if app.quit {
            break;
        }
    }
    Ok(())
}

// ─── Key handling ─────────────────────────────────────────────────────────────

fn handle_key(app: &mut App, key: KeyEvent) -> Option<ClientPacket> {
    if key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
    {
        app.quit = true;
        return None;
    }

    match key.code {
        KeyCode::Enter => match app.screen {
            Screen::Join => app.submit_name(),
            Screen::Chat => app.submit_message(),
        },
        KeyCode::Backspace => {
            app.active_input().delete_back();
            None
        }
        KeyCode::Char(c) => {
            app.active_input().insert(c);
            None
        }
        KeyCode::PageUp if app.screen == Screen::Chat => {
            app.scroll_up();
            None
        }
        KeyCode::PageDown if app.screen == Screen::Chat => {
            app.scroll_down();
            None
        }
        _ => None,
    }
}

// ─── Drawing ─────────────────────────────────────────────────────────────────

fn draw(f: &mut Frame, app: &App) {
    match app.screen {
        Screen::Join => draw_join(f, app),
        Screen::Chat => draw_chat(f, app),
    }
}

fn draw_join(f: &mut Frame, app: &App) {
    let area = f.area();

    let block = Block::default()
        .title(" Kabootar ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // title
            Constraint::Length(3), // name
            Constraint::Length(1), // hint
            Constraint::Length(1), // error
            Constraint::Min(0),
        ])
        .split(inner);

    let title = Paragraph::new("── Join ──")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(title, chunks[0]);

    let name_widget = Paragraph::new(app.name_input.as_str())
        .block(
            Block::default()
                .title(" Enter the name of your kabootar ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .style(Style::default().fg(Color::White));
    f.render_widget(name_widget, chunks[1]);

    let hint = Paragraph::new("Enter to join | Ctrl+Q to quit")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    f.render_widget(hint, chunks[2]);

    if !app.join_error.is_empty() {
        let err = Paragraph::new(app.join_error.as_str())
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Red));
        f.render_widget(err, chunks[3]);
    }

    f.set_cursor_position((
        chunks[1].x + 1 + app.name_input.cursor as u16,
        chunks[1].y + 1,
    ));
}

fn draw_chat(f: &mut Frame, app: &App) {
    let area = f.area();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(3),    // body
            Constraint::Length(3), // input
        ])
        .split(area);

    let status = if app.connected { "connected" } else { "offline" };
    let header = Paragraph::new(format!(
        " Kabootar  │  {}  │  {} active  │  {}  │  PgUp/PgDn scroll  │  Ctrl+Q quit ",
        app.name,
        app.active_users.len(),
        status
    ))
    .style(
        Style::default()
            .bg(Color::DarkGray)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );
    f.render_widget(header, rows[0]);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(rows[1]);
    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(cols[1]);

    // Messages viewport
    let msg_block = Block::default()
        .title(" Messages ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let msg_inner = msg_block.inner(cols[0]);
    f.render_widget(msg_block, cols[0]);

    let height = msg_inner.height as usize;
    let total = app.messages.len();
    let start = total.saturating_sub(height + app.scroll);
    let visible = &app.messages[start..total.saturating_sub(app.scroll)];

    let items: Vec<ListItem> = visible
        .iter()
        .map(|line| {
            let (who, color) = if line.own {
                ("You".to_string(), Color::Blue)
            } else {
                (line.username.clone(), Color::Cyan)
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", line.timestamp),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{}: ", who),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(line.text.clone()),
            ]))
        })
        .collect();
    f.render_widget(List::new(items), msg_inner);

    // Active users
    let users: Vec<ListItem> = app
        .active_users
        .iter()
        .map(|u| ListItem::new(u.as_str()))
        .collect();
    let users_list = List::new(users).block(
        Block::default()
            .title(" Active Kabootars ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(users_list, side[0]);

    // Notifications, newest at the bottom
    let notes_block = Block::default()
        .title(" Notifications ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let notes_height = notes_block.inner(side[1]).height as usize;
    let skip = app.notifications.len().saturating_sub(notes_height);
    let notes: Vec<ListItem> = app.notifications[skip..]
        .iter()
        .map(|n| {
            ListItem::new(Span::styled(
                format!("◆ {}", n),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            ))
        })
        .collect();
    f.render_widget(List::new(notes).block(notes_block), side[1]);

    // Input box
    let input_block = Block::default()
        .title(" Message (Enter to send) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let input_inner = input_block.inner(rows[2]);
    f.render_widget(input_block, rows[2]);

    let input_widget =
        Paragraph::new(app.chat_input.as_str()).style(Style::default().fg(Color::White));
    f.render_widget(input_widget, input_inner);

    f.set_cursor_position((
        input_inner.x + app.chat_input.cursor as u16,
        input_inner.y,
    ));
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn send_packet(write_tx: &mpsc::Sender<Vec<u8>>, pkt: &ClientPacket) -> Result<()> {
    let data = encode_line(pkt)?;
    write_tx.send(data).await.ok();
    Ok(())
}
