use anyhow::Result;
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use polarity_timeline::{
    effective_score, get_entity, layout_entities, list_entities, submit_vote, Entity,
    HoverTracker, PositionedEntity, StoreError, TerminalConfig, Viewport, VoteDraft,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;
use tracing::{info, warn};

const DETAIL_HEIGHT: u16 = 8;
const MIN_DETAIL_WIDTH: u16 = 16;

pub struct App {
    conn: Connection,
    config: TerminalConfig,
    pub entities: Vec<Entity>,
    /// Layout in entity-list order (hit testing)
    pub positioned: Vec<PositionedEntity>,
    /// Layout top to bottom (keyboard navigation)
    pub sorted: Vec<PositionedEntity>,
    pub hover: HoverTracker,
    pub draft: Option<VoteDraft>,
    pub status: Option<String>,
    /// Timeline area from the last draw; pointer events are relative to it
    pub canvas: Rect,
}

impl App {
    pub fn new(conn: Connection, config: TerminalConfig) -> Result<Self> {
        let mut app = Self {
            conn,
            config,
            entities: Vec::new(),
            positioned: Vec::new(),
            sorted: Vec::new(),
            hover: HoverTracker::new(config.hover),
            draft: None,
            status: None,
            canvas: Rect::default(),
        };
        app.refresh()?;
        Ok(app)
    }

    /// Reload the entity list and recompute the layout
    pub fn refresh(&mut self) -> Result<(), StoreError> {
        self.entities = list_entities(&self.conn)?;
        self.relayout();
        Ok(())
    }

    fn relayout(&mut self) {
        self.positioned = layout_entities(&self.entities, &self.config.layout);
        self.sorted = self.positioned.clone();
        self.sorted.sort_by(|a, b| a.offset_vh.total_cmp(&b.offset_vh));
        self.hover.retain(&self.positioned);
        if self.hover.active().is_none() {
            self.draft = None;
        }
    }

    pub fn total_votes(&self) -> i64 {
        self.entities.iter().map(|e| e.count).sum()
    }

    pub fn active_entity(&self) -> Option<&PositionedEntity> {
        let id = self.hover.active()?;
        self.positioned.iter().find(|p| p.id() == id)
    }

    fn viewport(&self) -> Viewport {
        Viewport::new(self.canvas.width as f64, self.canvas.height as f64)
    }

    fn axis_x(&self) -> u16 {
        self.canvas.x + self.canvas.width / 2
    }

    /// Screen row of a timeline offset, None when it falls outside the canvas
    fn row_of(&self, offset_vh: f64) -> Option<u16> {
        let y = self.viewport().vh_to_px(offset_vh).round();
        if y < 0.0 || y >= self.canvas.height as f64 {
            None
        } else {
            Some(self.canvas.y + y as u16)
        }
    }

    fn in_canvas(&self, column: u16, row: u16) -> bool {
        column >= self.canvas.x
            && column < self.canvas.right()
            && row >= self.canvas.y
            && row < self.canvas.bottom()
    }

    // ------------------------------------------------------------------------
    // Pointer
    // ------------------------------------------------------------------------

    pub fn on_pointer_move(&mut self, column: u16, row: u16) {
        if !self.in_canvas(column, row) {
            self.hover.pointer_left();
            return;
        }

        let viewport = self.viewport();
        let axis_x = self.axis_x() as f64;
        self.hover.pointer_moved(
            column as f64,
            (row - self.canvas.y) as f64,
            axis_x,
            &self.positioned,
            &viewport,
        );
    }

    pub fn on_pointer_leave(&mut self) {
        self.hover.pointer_left();
    }

    // ------------------------------------------------------------------------
    // Voting
    // ------------------------------------------------------------------------

    pub fn open_vote(&mut self) {
        match self.hover.open_modal() {
            Some(id) => self.draft = Some(VoteDraft::new(id)),
            None => self.status = Some("Hover or select someone first".to_string()),
        }
    }

    pub fn cancel_vote(&mut self) {
        self.draft = None;
        self.hover.close_modal();
    }

    /// Submit the modal. Invalid input never reaches the store; a failed vote
    /// is logged and leaves the running average untouched.
    pub fn confirm_vote(&mut self) {
        let Some(draft) = self.draft.as_mut() else {
            return;
        };

        let score = match draft.submit() {
            Ok(score) => score,
            Err(_) => return,
        };
        let id = draft.entity_id.clone();

        match submit_vote(&self.conn, &id, score) {
            Ok(outcome) => {
                info!(%id, score = outcome.score, count = outcome.count, "vote recorded");
                let name = get_entity(&self.conn, &id)
                    .map(|e| e.name)
                    .unwrap_or_else(|_| id.clone());
                self.status = Some(format!(
                    "Voted {:.0} on {} → score {:.2} ({} votes)",
                    score.as_percent(),
                    name,
                    outcome.score,
                    outcome.count
                ));
                self.cancel_vote();
                self.refresh_logged();
            }
            Err(err @ StoreError::NotFound { .. }) => {
                warn!(%id, "vote abandoned: {}", err);
                self.status = Some("That entry no longer exists".to_string());
                self.cancel_vote();
                self.refresh_logged();
            }
            Err(err) => {
                warn!(%id, "vote failed: {}", err);
                if let Some(draft) = self.draft.as_mut() {
                    draft.error = Some(format!("Vote failed: {}", err));
                }
            }
        }
    }

    fn refresh_logged(&mut self) {
        if let Err(err) = self.refresh() {
            warn!("refresh failed: {}", err);
            self.status = Some(format!("Refresh failed: {}", err));
        }
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    /// Returns true when the app should quit
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => return self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::FocusLost => self.on_pointer_leave(),
            _ => {}
        }
        false
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                self.on_pointer_move(mouse.column, mouse.row)
            }
            MouseEventKind::Down(MouseButton::Left) if self.draft.is_none() => {
                self.on_pointer_move(mouse.column, mouse.row);
                if self.hover.active().is_some() {
                    self.open_vote();
                }
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if let Some(draft) = self.draft.as_mut() {
            match key.code {
                KeyCode::Esc => self.cancel_vote(),
                KeyCode::Enter => self.confirm_vote(),
                KeyCode::Backspace => draft.backspace(),
                KeyCode::Char(c) => {
                    draft.push(c);
                }
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Down | KeyCode::Char('j') => self.hover.select_next(&self.sorted),
            KeyCode::Up | KeyCode::Char('k') => self.hover.select_previous(&self.sorted),
            KeyCode::Enter | KeyCode::Char('v') => self.open_vote(),
            KeyCode::Char('r') => {
                self.refresh_logged();
                if self.status.is_none() {
                    self.status = Some(format!("Reloaded {} entries", self.entities.len()));
                }
            }
            _ => {}
        }
        false
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if app.handle_event(event::read()?) {
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Timeline
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(" Timeline ");
    app.canvas = block.inner(chunks[1]);
    f.render_widget(block, chunks[1]);

    render_timeline(f, app);
    render_detail_panel(f, app);
    render_vote_modal(f, app);

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let spans = vec![
        Span::styled(
            "Polarity Timeline",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Entries: {}", app.entities.len()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Votes: {}", app.total_votes()),
            Style::default().fg(Color::Green),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn pin_color(entity: &Entity) -> Color {
    if effective_score(entity.score) <= 0.5 {
        Color::Cyan
    } else {
        Color::Red
    }
}

fn render_timeline(f: &mut Frame, app: &App) {
    let canvas = app.canvas;
    if canvas.width < 3 || canvas.height == 0 {
        return;
    }
    let axis_x = app.axis_x();
    let layout = &app.config.layout;

    let top = app.row_of(layout.top_margin).unwrap_or(canvas.y);
    let bottom = app
        .row_of(layout.page_height - layout.bottom_margin)
        .unwrap_or(canvas.bottom() - 1);

    let buf = f.buffer_mut();
    let axis_style = Style::default().fg(Color::DarkGray);
    for row in top..=bottom {
        buf.set_string(axis_x, row, "│", axis_style);
    }
    buf.set_string(canvas.x + 1, top, "▲ 0 saint", Style::default().fg(Color::Cyan));
    buf.set_string(canvas.x + 1, bottom, "▼ 100 sinner", Style::default().fg(Color::Red));

    let active = app.hover.active();
    for pin in &app.positioned {
        let Some(row) = app.row_of(pin.offset_vh) else {
            continue;
        };

        let column = (axis_x as f64 + pin.stagger_px.round())
            .clamp(canvas.x as f64, (canvas.right() - 1) as f64) as u16;

        let is_active = active == Some(pin.id());
        let (symbol, style) = if is_active {
            (
                "◉",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        } else {
            ("●", Style::default().fg(pin_color(&pin.entity)))
        };
        buf.set_string(column, row, symbol, style);

        // Name to the left of the pin; the right side belongs to the detail panel
        let room = column.saturating_sub(canvas.x + 1) as usize;
        if room > 1 {
            let label = truncate(&pin.entity.name, room - 1);
            let x = column - 1 - label.chars().count() as u16;
            buf.set_string(x, row, &label, style);
        }
    }
}

fn render_detail_panel(f: &mut Frame, app: &App) {
    let Some(pin) = app.active_entity() else {
        return;
    };
    let canvas = app.canvas;
    let left = app.axis_x() + app.config.hover.panel_band_px.max(0.0) as u16 + 1;
    if left >= canvas.right() || canvas.right() - left < MIN_DETAIL_WIDTH {
        return;
    }

    let height = DETAIL_HEIGHT.min(canvas.height);
    let pin_row = app.row_of(pin.offset_vh).unwrap_or(canvas.y);
    let top = pin_row
        .saturating_sub(height / 2)
        .clamp(canvas.y, canvas.bottom() - height);
    let area = Rect::new(left, top, canvas.right() - left, height);

    let entity = &pin.entity;
    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let content = vec![
        Line::from(entity.display_reason().to_string()),
        Line::from(""),
        Line::from(vec![
            Span::styled("Score: ", label),
            Span::styled(
                format!("{:.2}", effective_score(entity.score)),
                Style::default().fg(pin_color(entity)),
            ),
            Span::raw(format!("  ({} votes)", entity.count)),
        ]),
        Line::from(vec![
            Span::styled("Image: ", label),
            Span::raw(entity.display_image().to_string()),
        ]),
        Line::from(vec![
            Span::styled("v", Style::default().fg(Color::Yellow)),
            Span::raw(" vote"),
        ]),
    ];

    let panel = Paragraph::new(content)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(format!(" {} ", entity.name)),
        );

    f.render_widget(Clear, area);
    f.render_widget(panel, area);
}

fn render_vote_modal(f: &mut Frame, app: &App) {
    let Some(draft) = &app.draft else {
        return;
    };
    let name = app
        .entities
        .iter()
        .find(|e| e.id == draft.entity_id)
        .map(|e| e.name.as_str())
        .unwrap_or("?");

    let mut content = vec![
        Line::from("0 = saint, 100 = sinner"),
        Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{}_", draft.input)),
        ]),
    ];
    if let Some(error) = &draft.error {
        content.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    content.push(Line::from(vec![
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" submit | "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" cancel"),
    ]));

    let area = centered_rect(44, 7, f.size());
    let modal = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(format!(" Vote: {} ", name)),
    );

    f.render_widget(Clear, area);
    f.render_widget(modal, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if let Some(message) = &app.status {
        status_spans.push(Span::styled(
            format!(" {} ", message),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw(" | "));
    }

    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Select | "));
    status_spans.push(Span::styled("v", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Vote | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Reload | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Quit"));

    let status = Paragraph::new(Line::from(status_spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(status, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
