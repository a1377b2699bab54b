use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::time::Duration;
use tracing::warn;

use crate::app::App;
use crate::models::{parse_date, AddOutcome, CompanyEntry, FieldUpdate, Status, STAGES};
use crate::prompt::Answered;

const TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
enum InputKind {
    NewName,
    NewNote,
    NewDate,
    Rename(String),
    EditNote(String),
    EditDate(String),
}

impl InputKind {
    fn title(&self) -> &'static str {
        match self {
            InputKind::NewName => " New entry: company name ",
            InputKind::NewNote => " New entry: note (optional) ",
            InputKind::NewDate => " New entry: interview date YYYY-MM-DD (optional) ",
            InputKind::Rename(_) => " Company name ",
            InputKind::EditNote(_) => " Note ",
            InputKind::EditDate(_) => " Interview date (YYYY-MM-DD, empty to clear) ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Normal,
    Input { kind: InputKind, buffer: String },
    ConfirmDelete { id: String, name: String },
}

struct ViewState {
    rows: Vec<CompanyEntry>,
    selected: usize,
    mode: Mode,
    notice: Option<String>,
}

impl ViewState {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            selected: 0,
            mode: Mode::Normal,
            notice: None,
        }
    }

    fn current(&self) -> Option<&CompanyEntry> {
        self.rows.get(self.selected)
    }

    fn current_id(&self) -> Option<String> {
        self.current().map(|e| e.id.clone())
    }

    fn next(&mut self) {
        if !self.rows.is_empty() && self.selected < self.rows.len() - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Re-reads rows from the controller, keeping the cursor on the same
    /// entry when it still exists.
    fn reload(&mut self, app: &mut App) -> Result<()> {
        let keep = self.current_id();
        self.rows = app.rows()?;
        if let Some(id) = keep {
            if let Some(pos) = self.rows.iter().position(|e| e.id == id) {
                self.selected = pos;
            }
        }
        if self.selected >= self.rows.len() {
            self.selected = self.rows.len().saturating_sub(1);
        }
        Ok(())
    }

    fn start_input(&mut self, kind: InputKind, buffer: String) {
        self.notice = None;
        self.mode = Mode::Input { kind, buffer };
    }

    /// Turns a failed write into a footer notice so the session keeps going.
    fn settle<T>(&mut self, action: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("{} failed: {:#}", action, e);
                self.notice = Some(format!("{} failed: {:#}", action, e));
                None
            }
        }
    }
}

pub fn run_browse(app: &mut App) -> Result<()> {
    let mut state = ViewState::new();
    state.reload(app)?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, app);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut ViewState,
    app: &mut App,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        list_state.select(if state.rows.is_empty() { None } else { Some(state.selected) });
        terminal.draw(|frame| draw(frame, state, app, &mut list_state))?;

        if !event::poll(TICK)? {
            // Remote snapshots arrive between key presses.
            state.reload(app)?;
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let mode = std::mem::replace(&mut state.mode, Mode::Normal);
        match mode {
            Mode::Normal => {
                if !handle_normal(key.code, state, app) {
                    break;
                }
            }
            Mode::Input { kind, mut buffer } => match key.code {
                KeyCode::Esc => {
                    if matches!(kind, InputKind::NewName | InputKind::NewNote | InputKind::NewDate) {
                        app.draft = Default::default();
                    }
                }
                KeyCode::Enter => submit_input(kind, buffer, state, app),
                KeyCode::Backspace => {
                    buffer.pop();
                    state.mode = Mode::Input { kind, buffer };
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    state.mode = Mode::Input { kind, buffer };
                }
                _ => state.mode = Mode::Input { kind, buffer },
            },
            Mode::ConfirmDelete { id, name } => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => delete_entry(&id, &name, state, app),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {}
                _ => state.mode = Mode::ConfirmDelete { id, name },
            },
        }
        state.reload(app)?;
    }
    Ok(())
}

/// Returns `false` when the user asked to quit.
fn handle_normal(code: KeyCode, state: &mut ViewState, app: &mut App) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::Down | KeyCode::Char('j') => state.next(),
        KeyCode::Up | KeyCode::Char('k') => state.prev(),
        KeyCode::Char('s') => app.cycle_sort_key(),
        KeyCode::Char('o') => app.toggle_order(),
        KeyCode::Char('a') => {
            app.draft = Default::default();
            state.start_input(InputKind::NewName, String::new());
        }
        KeyCode::Char('>') | KeyCode::Right => step_status(state, app, Status::next),
        KeyCode::Char('<') | KeyCode::Left => step_status(state, app, Status::prev),
        KeyCode::Char('r') => {
            if let Some(entry) = state.current() {
                let (id, name) = (entry.id.clone(), entry.name.clone());
                state.start_input(InputKind::Rename(id), name);
            }
        }
        KeyCode::Char('e') => {
            if let Some(entry) = state.current() {
                let (id, note) = (entry.id.clone(), entry.note.clone());
                state.start_input(InputKind::EditNote(id), note);
            }
        }
        KeyCode::Char('d') => {
            if let Some(entry) = state.current() {
                let (id, date) = (entry.id.clone(), entry.interview_date.clone());
                state.start_input(InputKind::EditDate(id), date);
            }
        }
        KeyCode::Char('x') => {
            if let Some(entry) = state.current() {
                state.mode = Mode::ConfirmDelete {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                };
            }
        }
        _ => {}
    }
    true
}

fn step_status(state: &mut ViewState, app: &mut App, step: fn(&Status) -> Status) {
    let Some(entry) = state.current() else {
        return;
    };
    let next = step(&entry.status);
    if next == entry.status {
        return;
    }
    let id = entry.id.clone();
    let result = app.update_field(&id, FieldUpdate::Status(next));
    state.settle("Status change", result);
}

fn delete_entry(id: &str, name: &str, state: &mut ViewState, app: &mut App) {
    let result = app.delete(id, &mut Answered::yes());
    if state.settle("Delete", result) == Some(true) {
        state.notice = Some(format!("Deleted {}", name));
    }
}

fn submit_input(kind: InputKind, buffer: String, state: &mut ViewState, app: &mut App) {
    match kind {
        InputKind::NewName => {
            app.draft.name = buffer;
            state.mode = Mode::Input {
                kind: InputKind::NewNote,
                buffer: String::new(),
            };
        }
        InputKind::NewNote => {
            app.draft.note = buffer;
            state.mode = Mode::Input {
                kind: InputKind::NewDate,
                buffer: String::new(),
            };
        }
        InputKind::NewDate => match parse_date(&buffer) {
            Ok(date) => {
                app.draft.interview_date = date;
                let mut prompt = Answered::yes();
                let result = app.submit_draft(&mut prompt);
                match state.settle("Add", result) {
                    Some(AddOutcome::Added(_)) => state.notice = prompt.notices.pop(),
                    // Rejected adds are silent; drop the leftover draft.
                    Some(AddOutcome::Blank | AddOutcome::Duplicate) => {
                        app.draft = Default::default();
                        state.notice = None;
                    }
                    None => {}
                }
            }
            Err(e) => {
                state.notice = Some(e.to_string());
                state.mode = Mode::Input {
                    kind: InputKind::NewDate,
                    buffer,
                };
            }
        },
        InputKind::Rename(id) => {
            let result = app.update_field(&id, FieldUpdate::Name(buffer));
            state.settle("Rename", result);
        }
        InputKind::EditNote(id) => {
            let result = app.update_field(&id, FieldUpdate::Note(buffer));
            state.settle("Note change", result);
        }
        InputKind::EditDate(id) => match parse_date(&buffer) {
            Ok(date) => {
                let result = app.update_field(&id, FieldUpdate::InterviewDate(date));
                state.settle("Date change", result);
            }
            Err(e) => {
                state.notice = Some(e.to_string());
                state.mode = Mode::Input {
                    kind: InputKind::EditDate(id),
                    buffer,
                };
            }
        },
    }
}

fn status_icon(status: &Status) -> String {
    match status.position() {
        Some(i) => (i + 1).to_string(),
        None => "?".to_string(),
    }
}

fn status_color(status: &Status) -> Color {
    match status {
        Status::SubmissionInProgress => Color::DarkGray,
        Status::SubmissionComplete => Color::White,
        Status::FirstInterview => Color::Cyan,
        Status::SecondInterview => Color::Blue,
        Status::ThirdInterview => Color::Yellow,
        Status::FinalInterview => Color::Green,
        Status::Other(_) => Color::Red,
    }
}

fn draw(frame: &mut Frame, state: &ViewState, app: &App, list_state: &mut ListState) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(outer[0]);

    // Left panel: entry list
    let items: Vec<ListItem> = state
        .rows
        .iter()
        .map(|entry| {
            let date = if entry.interview_date.is_empty() {
                "          ".to_string()
            } else {
                entry.interview_date.clone()
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", status_icon(&entry.status)),
                    Style::default().fg(status_color(&entry.status)),
                ),
                Span::raw(format!("{} ", date)),
                Span::raw(entry.name.clone()),
            ]))
        })
        .collect();

    let order = if app.sorts_view() {
        format!("by {} {}", app.sort_key, app.sort_order)
    } else {
        "by creation time".to_string()
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Companies ({}) {} [{}] ",
            state.rows.len(),
            order,
            app.backend_name()
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: entry detail
    let detail = Paragraph::new(build_detail(state, chunks[1].width))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, chunks[1]);

    // Footer: notice or help
    let footer = match &state.notice {
        Some(notice) => Paragraph::new(format!(" {}", notice)).style(Style::default().fg(Color::Yellow)),
        None => Paragraph::new(
            " j/k:move  a:add  r:rename  e:note  d:date  </>:status  x:delete  s:sort  o:order  q:quit",
        )
        .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(footer, outer[1]);

    match &state.mode {
        Mode::Normal => {}
        Mode::Input { kind, buffer } => {
            let area = centered(frame.area(), 60, 3);
            frame.render_widget(Clear, area);
            let input = Paragraph::new(format!("{}_", buffer))
                .block(Block::default().borders(Borders::ALL).title(kind.title()));
            frame.render_widget(input, area);
        }
        Mode::ConfirmDelete { name, .. } => {
            let area = centered(frame.area(), 50, 3);
            frame.render_widget(Clear, area);
            let confirm = Paragraph::new(format!("Delete {}? (y/n)", name))
                .block(Block::default().borders(Borders::ALL).title(" Confirm "))
                .style(Style::default().fg(Color::Red));
            frame.render_widget(confirm, area);
        }
    }
}

fn build_detail(state: &ViewState, width: u16) -> Text<'_> {
    let Some(entry) = state.current() else {
        return Text::raw("No companies yet. Press 'a' to add one.");
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        entry.name.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        format!("Status: {}", entry.status),
        Style::default().fg(status_color(&entry.status)),
    )));
    for stage in STAGES.iter() {
        let marker = if *stage == entry.status { ">" } else { " " };
        lines.push(Line::from(Span::styled(
            format!("  {} {}", marker, stage.display_name()),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines.push(Line::from(""));

    if entry.interview_date.is_empty() {
        lines.push(Line::from("Interview: not scheduled"));
    } else {
        lines.push(Line::from(format!("Interview: {}", entry.interview_date)));
    }
    if let Some(created) = entry.created_at {
        lines.push(Line::from(format!(
            "Created: {}",
            created.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        )));
    }
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        "Note",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    if entry.note.is_empty() {
        lines.push(Line::from(Span::styled("  (none)", Style::default().fg(Color::DarkGray))));
    } else {
        let wrap_at = (width as usize).saturating_sub(6).max(20);
        for line in textwrap::fill(&entry.note, wrap_at).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    Text::from(lines)
}

fn centered(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = area.width * percent_x / 100;
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height: height.min(area.height),
    }
}
