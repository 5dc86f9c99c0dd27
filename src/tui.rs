use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
};
use std::io::stdout;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::client::ApiClient;
use crate::models::{JobApplication, Status};
use crate::session::{Saved, Session, SubmitError, with_timeout};
use crate::store::{EntityStore, StoreResult};
use crate::view::{SortColumn, SortDirection};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const FORM_FIELDS: [&str; 5] = ["Company", "Title", "Status", "Applied", "Notes"];
const STATUS_FIELD: usize = 2;

/// Answers from background store calls.
enum Outcome {
    Saved(StoreResult<Saved>),
    Deleted(i64, StoreResult<()>),
    Loaded(StoreResult<Vec<JobApplication>>),
}

/// Allows one automatic reload per stale spell. A reload that fails leaves
/// the session stale; retrying is then up to the `r` key.
#[derive(Debug, Default)]
struct AutoReload {
    spent: bool,
}

impl AutoReload {
    fn due(&mut self, stale: bool, busy: bool) -> bool {
        if !stale {
            self.spent = false;
            return false;
        }
        if self.spent || busy {
            return false;
        }
        self.spent = true;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Filter,
    Form,
}

struct BrowseApp {
    session: Session,
    client: ApiClient,
    handle: Handle,
    tx: Sender<Outcome>,
    rx: Receiver<Outcome>,
    mode: Mode,
    selected: usize,
    form_field: usize,
    notice: Option<String>,
    reloading: bool,
    auto_reload: AutoReload,
    quit: bool,
}

impl BrowseApp {
    fn new(session: Session, client: ApiClient, handle: Handle) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            session,
            client,
            handle,
            tx,
            rx,
            mode: Mode::Normal,
            selected: 0,
            form_field: 0,
            notice: None,
            reloading: false,
            auto_reload: AutoReload::default(),
            quit: false,
        }
    }

    fn selected_id(&self) -> Option<i64> {
        self.session
            .view()
            .page
            .get(self.selected)
            .and_then(|job| job.id)
    }

    fn clamp_selection(&mut self) {
        let rows = self.session.view().page.len();
        self.selected = self.selected.min(rows.saturating_sub(1));
    }

    fn spawn_reload(&mut self) {
        if self.reloading {
            return;
        }
        self.reloading = true;
        let client = self.client.clone();
        let tx = self.tx.clone();
        let timeout = self.session.timeout();
        self.handle.spawn(async move {
            let outcome = with_timeout(timeout, client.list()).await;
            let _ = tx.send(Outcome::Loaded(outcome));
        });
    }

    fn submit(&mut self) {
        match self.session.begin_submit() {
            Ok(submission) => {
                let client = self.client.clone();
                let tx = self.tx.clone();
                let timeout = self.session.timeout();
                self.handle.spawn(async move {
                    let outcome = submission.send(&client, timeout).await;
                    let _ = tx.send(Outcome::Saved(outcome));
                });
                self.notice = Some("Saving...".to_string());
            }
            Err(SubmitError::InFlight) => {
                self.notice = Some("Still saving the previous change".to_string());
            }
            // the session records validation failures itself
            Err(e) => debug!(error = %e, "submit refused"),
        }
    }

    fn delete_selected(&mut self) {
        let Some(id) = self.selected_id() else { return };
        match self.session.begin_delete(id) {
            Ok(id) => {
                let client = self.client.clone();
                let tx = self.tx.clone();
                let timeout = self.session.timeout();
                self.handle.spawn(async move {
                    let outcome = with_timeout(timeout, client.delete(id)).await;
                    let _ = tx.send(Outcome::Deleted(id, outcome));
                });
                self.notice = Some(format!("Deleting #{id}..."));
            }
            Err(_) => self.notice = Some("Still saving the previous change".to_string()),
        }
    }

    /// Folds finished background calls into the session.
    fn drain_outcomes(&mut self) {
        while let Ok(outcome) = self.rx.try_recv() {
            self.notice = None;
            match outcome {
                Outcome::Saved(result) => match self.session.finish_submit(result) {
                    Ok(job) => {
                        self.mode = Mode::Normal;
                        self.notice = Some(format!("Saved {}", job.company_name));
                    }
                    Err(e) => warn!(error = %e, "save failed"),
                },
                Outcome::Deleted(id, result) => match self.session.finish_delete(id, result) {
                    Ok(()) => self.notice = Some(format!("Deleted #{id}")),
                    Err(e) => warn!(error = %e, id, "delete failed"),
                },
                Outcome::Loaded(result) => {
                    self.reloading = false;
                    let _ = self.session.finish_reload(result);
                }
            }
            self.clamp_selection();
        }
        if self
            .auto_reload
            .due(self.session.is_stale(), self.session.is_busy())
        {
            self.spawn_reload();
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Filter => self.handle_filter_key(key),
            Mode::Form => self.handle_form_key(key),
        }
        self.clamp_selection();
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.quit = true,
            KeyCode::Esc => {
                self.session.dismiss_failure();
                self.notice = None;
            }
            KeyCode::Down | KeyCode::Char('j') => self.selected = self.selected.saturating_add(1),
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Right | KeyCode::Char('n') => {
                if self.session.next_page() {
                    self.selected = 0;
                }
            }
            KeyCode::Left | KeyCode::Char('p') => {
                if self.session.prev_page() {
                    self.selected = 0;
                }
            }
            KeyCode::Char('/') => self.mode = Mode::Filter,
            KeyCode::Char('s') => {
                let next = next_status_filter(self.session.view_state().filter_status());
                self.session.set_filter_status(next);
                self.selected = 0;
            }
            KeyCode::Char(c @ '1'..='4') => {
                let index = c as usize - '1' as usize;
                self.session.click_sort(SortColumn::ALL[index]);
                self.selected = 0;
            }
            KeyCode::Char('a') => {
                self.session.begin_create();
                self.form_field = 0;
                self.mode = Mode::Form;
            }
            KeyCode::Char('e') | KeyCode::Enter => {
                if let Some(id) = self.selected_id()
                    && self.session.begin_edit(id).is_ok()
                {
                    self.form_field = 0;
                    self.mode = Mode::Form;
                }
            }
            KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('r') => self.spawn_reload(),
            _ => {}
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) {
        let mut text = self.session.view_state().filter_text().to_string();
        match key.code {
            KeyCode::Enter | KeyCode::Esc => {
                self.mode = Mode::Normal;
                return;
            }
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Char(c) => text.push(c),
            _ => return,
        }
        self.session.set_filter_text(text);
        self.selected = 0;
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        if key.code != KeyCode::Esc && self.session.is_busy() {
            // locked until the pending save answers
            return;
        }
        match key.code {
            KeyCode::Esc => {
                self.session.cancel_edit();
                self.session.dismiss_failure();
                self.mode = Mode::Normal;
            }
            KeyCode::Enter => self.submit(),
            KeyCode::Tab | KeyCode::Down => {
                self.form_field = (self.form_field + 1) % FORM_FIELDS.len();
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.form_field = (self.form_field + FORM_FIELDS.len() - 1) % FORM_FIELDS.len();
            }
            KeyCode::Left if self.form_field == STATUS_FIELD => {
                let draft = self.session.draft_mut();
                draft.status = draft.status.prev();
            }
            KeyCode::Right | KeyCode::Char(' ') if self.form_field == STATUS_FIELD => {
                let draft = self.session.draft_mut();
                draft.status = draft.status.next();
            }
            KeyCode::Backspace => {
                if let Some(field) = self.form_text_mut() {
                    field.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(field) = self.form_text_mut() {
                    field.push(c);
                }
            }
            _ => {}
        }
    }

    fn form_text_mut(&mut self) -> Option<&mut String> {
        let draft = self.session.draft_mut();
        match self.form_field {
            0 => Some(&mut draft.company_name),
            1 => Some(&mut draft.job_title),
            3 => Some(&mut draft.applied_date),
            4 => Some(&mut draft.notes),
            _ => None,
        }
    }
}

/// All, then each enumerated status in order, then back to all.
fn next_status_filter(current: Option<&Status>) -> Option<Status> {
    match current {
        None => Some(Status::ALL[0].clone()),
        Some(status) => {
            let pos = Status::ALL.iter().position(|s| s == status)?;
            Status::ALL.get(pos + 1).cloned()
        }
    }
}

/// Runs the interactive browser. Blocks; call it from a blocking context
/// with a handle to the runtime that should run store calls.
pub fn run_browse(session: Session, client: ApiClient, handle: Handle) -> Result<()> {
    let mut app = BrowseApp::new(session, client, handle);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut BrowseApp,
) -> Result<()> {
    let mut table_state = TableState::default();

    while !app.quit {
        app.drain_outcomes();
        table_state.select(Some(app.selected));
        terminal.draw(|frame| draw(frame, app, &mut table_state))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            app.handle_key(key);
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, app: &BrowseApp, table_state: &mut TableState) {
    let form_height = if app.mode == Mode::Form { 7 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(form_height),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(filter_line(app), chunks[0]);
    draw_table(frame, app, table_state, chunks[1]);
    if app.mode == Mode::Form {
        frame.render_widget(form(app), chunks[2]);
    }
    frame.render_widget(status_line(app), chunks[3]);

    let help = match app.mode {
        Mode::Normal => {
            " j/k:move  n/p:page  /:filter  s:status  1-4:sort  a:add  e:edit  d:delete  r:reload  q:quit"
        }
        Mode::Filter => " type to filter  Enter/Esc:done",
        Mode::Form => " Tab:next field  Left/Right:status  Enter:save  Esc:cancel",
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        chunks[4],
    );
}

fn filter_line(app: &BrowseApp) -> Paragraph<'_> {
    let state = app.session.view_state();
    let status = state
        .filter_status()
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| "all".to_string());
    let cursor = if app.mode == Mode::Filter { "_" } else { "" };
    Paragraph::new(Line::from(vec![
        Span::styled(" Filter: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{}{}", state.filter_text(), cursor)),
        Span::styled("   Status: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(status),
    ]))
}

fn draw_table(frame: &mut Frame, app: &BrowseApp, table_state: &mut TableState, area: Rect) {
    let state = app.session.view_state();
    let view = app.session.view();

    let header = Row::new(
        std::iter::once(Cell::from("ID")).chain(SortColumn::ALL.iter().map(|&column| {
            let marker = match (state.sort_column(), state.sort_direction()) {
                (Some(c), SortDirection::Ascending) if c == column => " ^",
                (Some(c), SortDirection::Descending) if c == column => " v",
                _ => "",
            };
            Cell::from(format!("{}{}", column.label(), marker))
        })),
    )
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = view
        .page
        .iter()
        .map(|job| {
            Row::new(vec![
                Cell::from(job.id.map(|id| id.to_string()).unwrap_or_default()),
                Cell::from(job.company_name.clone()),
                Cell::from(job.job_title.clone()),
                Cell::from(job.status.as_str().to_string()).style(status_style(&job.status)),
                Cell::from(job.applied_date.format("%Y-%m-%d").to_string()),
            ])
        })
        .collect();

    let title = format!(
        " Applications ({}) page {}/{} ",
        view.total_count,
        state.current_page(),
        view.page_count.max(1)
    );
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
            Constraint::Length(14),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, table_state);
}

fn status_style(status: &Status) -> Style {
    match status {
        Status::Applied => Style::default().fg(Color::Cyan),
        Status::GotInterview => Style::default().fg(Color::Yellow),
        Status::Interviewed => Style::default().fg(Color::Magenta),
        Status::Rejected => Style::default().fg(Color::Red),
        Status::GotOffer => Style::default().fg(Color::Green),
        Status::Legacy(_) => Style::default().fg(Color::DarkGray),
    }
}

fn form(app: &BrowseApp) -> Paragraph<'_> {
    let draft = app.session.draft();
    let values = [
        draft.company_name.as_str(),
        draft.job_title.as_str(),
        draft.status.as_str(),
        draft.applied_date.as_str(),
        draft.notes.as_str(),
    ];
    let lines: Vec<Line> = FORM_FIELDS
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (label, value))| {
            let style = if i == app.form_field {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{label:>8}: "), style),
                Span::raw(value.to_string()),
            ])
        })
        .collect();

    let title = match draft.id {
        Some(id) => format!(" Edit #{id} "),
        None => " New application ".to_string(),
    };
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
}

fn status_line(app: &BrowseApp) -> Paragraph<'_> {
    if let Some(failure) = app.session.failure() {
        return Paragraph::new(format!(" {}", failure.message))
            .style(Style::default().fg(Color::Red));
    }
    if app.session.is_busy() {
        return Paragraph::new(" Saving...").style(Style::default().fg(Color::Yellow));
    }
    if app.reloading {
        return Paragraph::new(" Reloading...").style(Style::default().fg(Color::Yellow));
    }
    Paragraph::new(format!(" {}", app.notice.as_deref().unwrap_or("")))
        .style(Style::default().fg(Color::Green))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_cycles_through_all_and_back() {
        let mut current = None;
        let mut seen = Vec::new();
        for _ in 0..=Status::ALL.len() {
            current = next_status_filter(current.as_ref());
            seen.push(current.clone());
        }
        assert_eq!(seen.first(), Some(&Some(Status::Applied)));
        assert_eq!(seen.last(), Some(&None));
    }

    #[test]
    fn failed_auto_reload_is_not_retried_until_fresh() {
        let mut auto = AutoReload::default();
        assert!(!auto.due(false, false));
        assert!(!auto.due(true, true), "waits for the write to finish");
        assert!(auto.due(true, false));

        // the reload failed, so the session is still stale on every tick
        for _ in 0..50 {
            assert!(!auto.due(true, false));
        }

        // a manual reload succeeds, and the next stale spell gets its own try
        assert!(!auto.due(false, false));
        assert!(auto.due(true, false));
    }

    #[test]
    fn legacy_filter_resets_to_all() {
        let legacy = Status::Legacy("ghosted".into());
        assert_eq!(next_status_filter(Some(&legacy)), None);
    }
}
