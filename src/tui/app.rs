use std::io::stdout;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Table, TableState, Wrap};
use ratatui::Frame;

use super::to_color;
use super::widgets::{RowTarget, VisibleTable, detail_lines};
use crate::backend::CaptureBackend;
use crate::session::Session;
use crate::suggest::suggest;
use crate::tui::theme::flexoki;
use crate::view::DisplayMode;
use tracing::{debug, info, warn};


pub struct App<B: CaptureBackend> {
    session: Session<B>,
    table_state: TableState,
    filter_input: String,
    filter_mode: bool,
    filter_error: Option<String>,
    /// Highlighted entry of the suggestion list, if any.
    active_suggestion: Option<usize>,
    status: Option<String>,
    quit: bool,
}

impl<B: CaptureBackend> App<B> {
    pub fn new(session: Session<B>) -> Self {
        let filter_input = session.filter_expression().to_string();
        Self {
            session,
            table_state: TableState::default(),
            filter_input,
            filter_mode: false,
            filter_error: None,
            active_suggestion: None,
            status: None,
            quit: false,
        }
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Drains backend events into the session.
    pub fn tick(&mut self) {
        let summary = self.session.poll();
        if summary.finished {
            self.status = Some("Capture source exhausted".to_string());
        }
        if let Some(failure) = summary.failures.last() {
            self.status = Some(format!("Capture failed: {failure}"));
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        if self.filter_mode {
            self.handle_filter_key(code);
        } else {
            self.handle_normal_key(code);
        }
    }

    fn handle_filter_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.filter_mode = false;
                self.active_suggestion = None;
                self.filter_input = self.session.filter_expression().to_string();
                debug!("Exited filter mode");
            }
            KeyCode::Enter => {
                if self.active_suggestion.is_some() {
                    self.accept_suggestion();
                } else {
                    self.submit_filter();
                }
            }
            KeyCode::Tab => self.accept_suggestion(),
            KeyCode::Down => self.move_suggestion(1),
            KeyCode::Up => self.move_suggestion(-1),
            KeyCode::Backspace => {
                self.filter_input.pop();
                self.active_suggestion = None;
            }
            KeyCode::Char(c) => {
                self.filter_input.push(c);
                self.active_suggestion = None;
            }
            _ => {}
        }
    }

    /// Moving up past the first suggestion clears the highlight.
    fn move_suggestion(&mut self, delta: isize) {
        let len = suggest(&self.filter_input).len();
        if len == 0 {
            self.active_suggestion = None;
            return;
        }
        self.active_suggestion = match (self.active_suggestion, delta.signum()) {
            (None, 1) => Some(0),
            (None, _) => None,
            (Some(0), -1) => None,
            (Some(i), _) => Some(i.saturating_add_signed(delta).min(len - 1)),
        };
    }

    /// Completes with the highlighted suggestion, or the first one.
    fn accept_suggestion(&mut self) {
        let index = self.active_suggestion.take().unwrap_or(0);
        if let Some(chosen) = suggest(&self.filter_input).into_iter().nth(index) {
            debug!(keyword = chosen.keyword.keyword, "Accepted filter suggestion");
            self.filter_input = chosen.full_text;
        }
    }

    fn submit_filter(&mut self) {
        match self.session.apply_filter(&self.filter_input) {
            Ok(()) => {
                self.filter_mode = false;
                self.filter_error = None;
                self.table_state.select(None);
                info!(expression = %self.filter_input, "Applied filter from TUI");
            }
            Err(e) => {
                warn!(expression = %self.filter_input, error = %e, "Filter rejected");
                self.filter_error = Some(e.to_string());
            }
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                info!("TUI quit requested");
                self.quit = true;
            }
            KeyCode::Char('/') => {
                self.filter_mode = true;
                debug!("Entered filter mode");
            }
            KeyCode::Char('s') => {
                if let Err(e) = self.session.toggle_capture() {
                    warn!(error = %e, "Capture toggle failed");
                    self.status = Some(e.to_string());
                } else {
                    self.status = None;
                }
            }
            KeyCode::Char('g') => {
                let mode = self.session.switch_mode();
                self.table_state.select(None);
                debug!(?mode, "Switched mode from TUI");
            }
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Enter => self.activate_selected(),
            KeyCode::Backspace => {
                self.session.reset_drill();
                self.table_state.select(None);
            }
            _ => {}
        }
    }

    fn table(&self) -> VisibleTable {
        VisibleTable::build(&self.session.visible(), self.session.selected_packet())
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.table().len();
        if len == 0 {
            self.table_state.select(None);
            return;
        }
        let next = match self.table_state.selected() {
            Some(i) => i.saturating_add_signed(delta).min(len - 1),
            None => 0,
        };
        self.table_state.select(Some(next));
    }

    fn activate_selected(&mut self) {
        let Some(index) = self.table_state.selected() else {
            return;
        };
        let table = self.table();
        match table.targets.get(index) {
            Some(RowTarget::Group(key)) => {
                if self.session.drill_into(key) {
                    self.table_state.select(Some(0));
                }
            }
            Some(RowTarget::Packet(packet)) => {
                self.session.select_packet(packet);
            }
            None => {}
        }
    }

    fn draw(&mut self, f: &mut Frame) {
        let table = self.table();
        if self.table_state.selected().is_some_and(|i| i >= table.len()) {
            self.table_state.select(table.len().checked_sub(1));
        }

        let filter_height = if self.filter_mode || self.filter_error.is_some() { 4 } else { 3 };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(1),             // Header
                Constraint::Length(filter_height), // Filter
                Constraint::Min(0),                // Table + detail
                Constraint::Length(3),             // Footer
            ])
            .split(f.area());

        f.render_widget(self.header(), chunks[0]);
        f.render_widget(self.filter_widget(), chunks[1]);

        let body = match self.session.selected_packet() {
            Some(_) => Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
                .split(chunks[2]),
            None => Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(100)])
                .split(chunks[2]),
        };

        let title = match (self.session.mode(), self.session.drilled_group()) {
            (DisplayMode::Flat, _) => "Packets".to_string(),
            (DisplayMode::Grouped, None) => "Groups".to_string(),
            (DisplayMode::Grouped, Some(group)) => format!("Group {}", group.key),
        };
        let widget = Table::new(table.rows, table.widths)
            .header(table.header)
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol(">> ")
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_stateful_widget(widget, body[0], &mut self.table_state);

        if let Some(packet) = self.session.selected_packet() {
            let detail = Paragraph::new(detail_lines(packet))
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title("Packet"));
            f.render_widget(detail, body[1]);
        }

        self.render_footer(f, chunks[3]);
    }

    fn header(&self) -> Paragraph<'static> {
        let stats = self.session.stats();
        let (state, color) = if stats.capturing {
            ("CAPTURING", flexoki::GREEN_400)
        } else {
            ("STOPPED", flexoki::YELLOW_400)
        };
        let mode = match self.session.mode() {
            DisplayMode::Flat => "flat",
            DisplayMode::Grouped => "grouped",
        };
        let (packets, groups) = if stats.filter_active {
            (stats.filtered_packets, stats.filtered_groups)
        } else {
            (stats.unfiltered_packets, stats.unfiltered_groups)
        };
        Paragraph::new(Line::from(vec![
            Span::styled(
                "livecrab ",
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(state, Style::default().fg(to_color(color))),
            Span::raw(format!(" | mode: {mode} | packets: {packets} | groups: {groups}")),
        ]))
    }

    fn filter_widget(&self) -> Paragraph<'static> {
        let title = if self.filter_mode {
            "Filter (Enter: apply, Up/Down: pick, Tab: complete, ESC: cancel)"
        } else {
            "Filter"
        };
        let input = if self.filter_input.is_empty() && !self.filter_mode {
            "Type / to set a capture filter...".to_string()
        } else {
            self.filter_input.clone()
        };

        let mut lines = vec![Line::from(input)];
        if let Some(err) = &self.filter_error {
            lines.push(Line::from(Span::styled(
                err.clone(),
                Style::default().fg(to_color(flexoki::RED_400)),
            )));
        } else if self.filter_mode {
            let hint = Style::default().fg(to_color(flexoki::BASE_500));
            let mut spans = Vec::new();
            for (i, s) in suggest(&self.filter_input).iter().enumerate() {
                if i > 0 {
                    spans.push(Span::raw("  "));
                }
                let style = if self.active_suggestion == Some(i) {
                    hint.fg(to_color(flexoki::CYAN_400))
                        .add_modifier(Modifier::REVERSED)
                } else {
                    hint
                };
                spans.push(Span::styled(
                    format!("{} ({})", s.keyword.keyword, s.keyword.description),
                    style,
                ));
            }
            lines.push(Line::from(spans));
        }

        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title))
    }

    fn render_footer(&self, f: &mut Frame, area: Rect) {
        let text = match &self.status {
            Some(status) => status.clone(),
            None if self.filter_mode => "Type to edit the filter".to_string(),
            None => {
                "s: Start/Stop | g: Group | /: Filter | Enter: Drill/Select | Backspace: Back | q: Quit"
                    .to_string()
            }
        };
        let footer =
            Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Controls"));
        f.render_widget(footer, area);
    }
}

pub fn run_tui<B: CaptureBackend>(session: Session<B>) -> Result<()> {
    info!(
        mode = ?session.mode(),
        filter = session.filter_expression(),
        "Starting TUI application"
    );
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = stdout();
    execute!(stdout, terminal::EnterAlternateScreen)
        .context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let mut app = App::new(session);
    let result = event_loop(&mut terminal, &mut app);

    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), terminal::LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;

    if let Err(e) = app.session.stop_capture() {
        warn!(error = %e, "Failed to stop capture on exit");
    }
    info!(stats = ?app.session.stats(), "TUI application exited");
    result
}

fn event_loop<B: CaptureBackend>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App<B>,
) -> Result<()> {
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(100);

    while !app.should_quit() {
        app.tick();
        terminal.draw(|f| app.draw(f))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.handle_key(key.code);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
    Ok(())
}
