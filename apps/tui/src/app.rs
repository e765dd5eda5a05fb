//! Core TUI application state and event loop.

use std::io;
use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tracing::info;

use interior_core::{ConditionSchema, Session};
use interior_shared::AppConfig;

use crate::screens::{Ctx, ScreenId, Screens};
use crate::services::Services;
use crate::widgets::status_bar;

/// Application state.
pub(crate) struct App {
    /// Index into [`ScreenId::ALL`].
    pub active: usize,
    pub should_quit: bool,
    /// Status message shown in bottom bar.
    pub status: String,
    pub show_help: bool,
    pub session: Session,
    pub services: Services,
    pub screens: Screens,
}

impl App {
    pub(crate) fn new(config: AppConfig) -> Result<Self> {
        let session = Session::new(ConditionSchema::from_config(&config.catalog));
        let services = Services::new(config)?;
        let screens = Screens::new(&session, &services);

        Ok(Self {
            active: 0,
            should_quit: false,
            status: "Ready. Press ? for help".to_string(),
            show_help: false,
            session,
            services,
            screens,
        })
    }

    fn current(&self) -> ScreenId {
        ScreenId::ALL[self.active]
    }

    fn is_editing(&self) -> bool {
        self.screens.is_editing(self.current())
    }

    fn switch_to(&mut self, index: usize) {
        if index < ScreenId::ALL.len() {
            self.active = index;
            self.status = self.current().to_string();
        }
    }
}

/// Entry point: sets up terminal, runs event loop, restores terminal.
pub(crate) fn run(config: AppConfig) -> Result<()> {
    let mut app = App::new(config)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    info!("tui started");
    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;

        // Poll for events with 100ms timeout for responsive UI
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key.code, key.modifiers);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn handle_key(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    let editing = app.is_editing();
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);

    // Global keybindings
    match code {
        KeyCode::Char('q') | KeyCode::Char('c') if ctrl => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('q') if !editing => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('?') if !editing => {
            app.show_help = !app.show_help;
            return;
        }
        KeyCode::Esc if app.show_help => {
            app.show_help = false;
            return;
        }
        KeyCode::Char(c @ '1'..='9') if !editing => {
            app.switch_to((c as usize) - ('1' as usize));
            return;
        }
        KeyCode::Down if ctrl => {
            app.switch_to((app.active + 1) % ScreenId::ALL.len());
            return;
        }
        KeyCode::Up if ctrl => {
            let len = ScreenId::ALL.len();
            app.switch_to((app.active + len - 1) % len);
            return;
        }
        _ => {}
    }

    // If help is showing, consume any key to dismiss
    if app.show_help {
        app.show_help = false;
        return;
    }

    let id = app.current();
    let ctx = Ctx {
        session: &mut app.session,
        services: &app.services,
    };
    if let Some(status) = app.screens.handle_key(id, code, modifiers, ctx) {
        app.status = status;
    }
}

fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Sidebar + content
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(26), Constraint::Min(1)])
        .split(rows[0]);

    draw_sidebar(f, columns[0], app.active);
    app.screens
        .draw(app.current(), f, columns[1], &app.session);

    f.render_widget(status_bar(&app.status), rows[1]);

    if app.show_help {
        draw_help_overlay(f);
    }
}

/// Navigation list; group headings are not selectable.
fn draw_sidebar(f: &mut Frame, area: Rect, active: usize) {
    let mut items = Vec::new();
    let mut selected = 0;
    for (i, id) in ScreenId::ALL.iter().enumerate() {
        if let Some(group) = id.group() {
            items.push(ListItem::new(Line::from(group).style(
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )));
        }
        if i == active {
            selected = items.len();
        }
        let indent = if id.nested() { "  " } else { "" };
        items.push(ListItem::new(format!("{indent}{}. {id}", i + 1)));
    }

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Interior "))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");
    let mut state = ListState::default().with_selected(Some(selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_help_overlay(f: &mut Frame) {
    let area = centered_rect(60, 60, f.area());

    let help_text = vec![
        Line::from("Keybindings").style(Style::default().add_modifier(Modifier::BOLD)),
        Line::from(""),
        Line::from("  1-3          Switch to screen"),
        Line::from("  Ctrl-↑/↓     Previous/next screen"),
        Line::from("  ?            Toggle this help"),
        Line::from("  q / Ctrl-C   Quit"),
        Line::from(""),
        Line::from("Screen-specific:").style(Style::default().add_modifier(Modifier::BOLD)),
        Line::from("  Tab/S-Tab    Next/previous control"),
        Line::from("  ←/→          Move within chips and sliders"),
        Line::from("  Space        Toggle a chip, row or slider handle"),
        Line::from("  ↑/↓          Navigate tables and scroll results"),
        Line::from("  a            Check every URL row"),
        Line::from("  Enter        Press the focused button"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help (press any key to close) ")
                .style(Style::default().bg(Color::DarkGray)),
        )
        .style(Style::default().fg(Color::White).bg(Color::DarkGray));

    f.render_widget(ratatui::widgets::Clear, area);
    f.render_widget(help, area);
}

/// Create a centered rectangle with percentage width and height.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
