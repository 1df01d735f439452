use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState,
    Wrap,
};
use ratatui::Frame;
use sqlnav_core::session::{Session, State};
use sqlnav_core::widgets::{SelectList, TextInput};

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn highlight_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

fn state_title(state: State) -> &'static str {
    match state {
        State::Loading => "Starting",
        State::SelectUser => "Select user",
        State::SelectDatabase => "Select database",
        State::EnterPassword => "Password",
        State::Connecting => "Connecting",
        State::ListTables => "Tables",
        State::CreateTableName => "New table",
        State::CreateTableSchema => "New table schema",
        State::ViewTable => "Table data",
        State::AddRow => "Add row",
        State::Error => "Error",
    }
}

fn key_hints(state: State) -> &'static str {
    match state {
        State::Loading | State::Connecting => "q: quit",
        State::SelectUser | State::SelectDatabase => "↑/↓ j/k: move | Enter: select | q: quit",
        State::EnterPassword => "Enter: connect | Ctrl+C: quit",
        State::ListTables => "↑/↓ j/k: move | Enter: open | n: new table | q: quit",
        State::CreateTableName => "Enter: next | Esc: cancel | Ctrl+C: quit",
        State::CreateTableSchema => "Enter: create | Esc: cancel | Ctrl+C: quit",
        State::ViewTable => "↑/↓ j/k: scroll | a: add row | Esc: back | q: quit",
        State::AddRow => "Tab/Shift+Tab: field | Enter: next or save | Esc: cancel | Ctrl+C: quit",
        State::Error => "any key: continue",
    }
}

fn spinner(tick: usize) -> &'static str {
    SPINNER_FRAMES[tick % SPINNER_FRAMES.len()]
}

fn waiting(tick: usize, text: String) -> Paragraph<'static> {
    Paragraph::new(Line::from(vec![
        Span::styled(spinner(tick), Style::default().fg(Color::Cyan)),
        Span::raw(" "),
        Span::raw(text),
    ]))
}

pub(crate) fn render(frame: &mut Frame<'_>, session: &Session, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], session);
    render_body(frame, chunks[1], session, tick);
    render_footer(frame, chunks[2], session);

    if session.state() == State::Error {
        render_error_popup(frame, session);
    }
}

fn render_header(frame: &mut Frame<'_>, area: Rect, session: &Session) {
    let connection = if session.connection().is_some() {
        "authenticated"
    } else if session.bootstrap().is_some() {
        "bootstrap"
    } else {
        "offline"
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {} ", state_title(session.state())), highlight_style()),
        Span::raw(" | "),
        Span::raw(format!("User: {}", session.selected_user().unwrap_or("-"))),
        Span::raw(" | "),
        Span::raw(format!("DB: {}", session.selected_database().unwrap_or("-"))),
        Span::raw(" | "),
        Span::raw(format!("Connection: {connection}")),
    ]))
    .block(Block::default().borders(Borders::ALL).title("sqlnav"));
    frame.render_widget(header, area);
}

fn render_body(frame: &mut Frame<'_>, area: Rect, session: &Session, tick: usize) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(state_title(session.state()));

    match session.state() {
        State::Loading => {
            let body = waiting(tick, "Checking database server...".to_string()).block(block);
            frame.render_widget(body, area);
        }
        State::SelectUser => render_select_list(
            frame,
            area,
            block,
            session.users(),
            waiting(tick, "Loading users...".to_string()),
        ),
        State::SelectDatabase => render_select_list(
            frame,
            area,
            block,
            session.databases(),
            waiting(tick, "Loading databases...".to_string()),
        ),
        State::EnterPassword => {
            let body = Paragraph::new(vec![
                Line::from(format!("User: {}", session.selected_user().unwrap_or("-"))),
                Line::from(format!(
                    "Database: {}",
                    session.selected_database().unwrap_or("-")
                )),
                Line::from(""),
                input_line(session.password_input()),
            ])
            .block(block);
            frame.render_widget(body, area);
            place_cursor(frame, area, session.password_input(), 3, "");
        }
        State::Connecting => {
            let text = format!(
                "Connecting to {} as {}...",
                session.selected_database().unwrap_or("-"),
                session.selected_user().unwrap_or("-")
            );
            frame.render_widget(waiting(tick, text).block(block), area);
        }
        State::ListTables => render_select_list(
            frame,
            area,
            block,
            session.tables(),
            Paragraph::new("No tables yet. Press n to create one."),
        ),
        State::CreateTableName => {
            let body = Paragraph::new(vec![input_line(session.table_name_input())]).block(block);
            frame.render_widget(body, area);
            place_cursor(frame, area, session.table_name_input(), 0, "");
        }
        State::CreateTableSchema => {
            let body = Paragraph::new(vec![
                Line::from(format!(
                    "Table: {}",
                    session.new_table_name().unwrap_or("-")
                )),
                Line::from(""),
                input_line(session.table_schema_input()),
                Line::from(""),
                Line::styled(
                    "Comma-separated column definitions, passed to CREATE TABLE as written.",
                    Style::default().fg(Color::DarkGray),
                ),
            ])
            .block(block)
            .wrap(Wrap { trim: false });
            frame.render_widget(body, area);
            place_cursor(frame, area, session.table_schema_input(), 2, "");
        }
        State::ViewTable => render_table_view(frame, area, session, tick),
        State::AddRow => render_add_row(frame, area, session, tick, block),
        State::Error => frame.render_widget(block, area),
    }
}

fn render_select_list(
    frame: &mut Frame<'_>,
    area: Rect,
    block: Block<'_>,
    list: &SelectList,
    empty: Paragraph<'_>,
) {
    if list.is_empty() {
        frame.render_widget(empty.block(block), area);
        return;
    }

    let items = list
        .items()
        .iter()
        .map(|item| ListItem::new(item.as_str()))
        .collect::<Vec<_>>();
    let widget = List::new(items)
        .block(block)
        .highlight_style(highlight_style())
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(list.selected_index());
    frame.render_stateful_widget(widget, area, &mut state);
}

fn render_table_view(frame: &mut Frame<'_>, area: Rect, session: &Session, tick: usize) {
    let table_name = session.selected_table().unwrap_or("-");
    let grid = session.table_view();

    if !session.table_loaded() {
        let body = waiting(tick, format!("Loading {table_name}..."))
            .block(Block::default().borders(Borders::ALL).title(table_name.to_string()));
        frame.render_widget(body, area);
        return;
    }

    let title = format!("{table_name} ({} rows)", grid.rows().len());
    if grid.columns().is_empty() {
        let body = Paragraph::new("No data")
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(body, area);
        return;
    }

    let header = Row::new(grid.columns().iter().map(|column| {
        Cell::from(column.as_str()).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .bottom_margin(1);
    let rows = grid
        .rows()
        .iter()
        .map(|row| Row::new(row.iter().map(|value| Cell::from(value.as_str()))));
    let widths = vec![Constraint::Fill(1); grid.columns().len()];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(highlight_style())
        .highlight_symbol("> ");
    let mut state = TableState::default().with_selected(grid.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_add_row(
    frame: &mut Frame<'_>,
    area: Rect,
    session: &Session,
    tick: usize,
    block: Block<'_>,
) {
    let table_name = session.selected_table().unwrap_or("-");
    if session.is_saving_row() {
        let body = waiting(tick, format!("Saving row to {table_name}...")).block(block);
        frame.render_widget(body, area);
        return;
    }

    let mut lines = vec![Line::from(format!("New row for {table_name}")), Line::from("")];
    let mut focused = None;
    for (index, input) in session.add_row_inputs().iter().enumerate() {
        let marker = if index == session.focused_input() {
            focused = Some((input, lines.len()));
            "> "
        } else {
            "  "
        };
        let mut line = input_line(input);
        line.spans.insert(0, Span::raw(marker));
        lines.push(line);
    }
    frame.render_widget(Paragraph::new(lines).block(block), area);
    if let Some((input, row)) = focused {
        let row = u16::try_from(row).unwrap_or(u16::MAX);
        place_cursor(frame, area, input, row, "> ");
    }
}

fn input_line(input: &TextInput) -> Line<'static> {
    let mut spans = vec![Span::styled(
        input.prompt().to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    if input.value().is_empty() {
        spans.push(Span::styled(
            input.placeholder().to_string(),
            Style::default().fg(Color::DarkGray),
        ));
    } else {
        spans.push(Span::raw(input.display_value()));
    }
    Line::from(spans)
}

fn place_cursor(frame: &mut Frame<'_>, area: Rect, input: &TextInput, row: u16, marker: &str) {
    if !input.is_focused() {
        return;
    }
    let column = Span::raw(marker).width() + Span::raw(input.prompt()).width() + input.visual_cursor();
    let max_x = area.right().saturating_sub(2);
    let x = u16::try_from(column)
        .map_or(max_x, |column| area.x.saturating_add(1).saturating_add(column))
        .min(max_x);
    let y = area.y.saturating_add(1).saturating_add(row);
    frame.set_cursor_position(Position::new(x, y));
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, session: &Session) {
    let status = match session.error() {
        Some(error) if session.state() != State::Error => Line::styled(
            format!("Error: {error}"),
            Style::default().fg(Color::Red),
        ),
        _ => Line::from("Status: ready"),
    };
    let footer = Paragraph::new(vec![Line::from(key_hints(session.state())), status])
        .block(Block::default().borders(Borders::ALL).title("Keys"));
    frame.render_widget(footer, area);
}

fn render_error_popup(frame: &mut Frame<'_>, session: &Session) {
    let area = centered_rect(70, 50, frame.area());
    let message = session
        .error()
        .map_or_else(|| "Unknown error".to_string(), ToString::to_string);
    let next_step = if session.bootstrap().is_some() {
        "Press any key to continue."
    } else {
        "Press any key to exit."
    };
    frame.render_widget(Clear, area);
    let popup = Paragraph::new(vec![
        Line::styled(message, Style::default().fg(Color::Red)),
        Line::from(""),
        Line::from(next_step),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title("Error"));
    frame.render_widget(popup, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;
    use ratatui::layout::Position;
    use ratatui::Terminal;
    use sqlnav_core::data_access::{ConnectionHandle, Credentials, TableRow};
    use sqlnav_core::dispatcher::{ConnectionRole, Message};
    use sqlnav_core::error::SessionError;
    use sqlnav_core::keys::Key;
    use sqlnav_core::session::{advance, Event, Session};

    use super::render;

    fn screen(session: &Session) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).expect("test terminal");
        terminal
            .draw(|frame| render(frame, session, 0))
            .expect("draw should succeed");
        let buffer = terminal.backend().buffer();
        let width = usize::from(buffer.area.width);
        buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(ratatui::buffer::Cell::symbol).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cursor(session: &Session) -> Position {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).expect("test terminal");
        terminal
            .draw(|frame| render(frame, session, 0))
            .expect("draw should succeed");
        terminal.get_cursor_position().expect("cursor position")
    }

    fn feed(session: Session, events: Vec<Event>) -> Session {
        events
            .into_iter()
            .fold(session, |session, event| advance(session, event).0)
    }

    fn message(message: Message) -> Event {
        Event::Message(message)
    }

    fn typed(text: &str) -> Vec<Event> {
        text.chars().map(|ch| Event::Key(Key::Char(ch))).collect()
    }

    fn started() -> Session {
        let (session, _) = Session::init(Credentials::new("root", "", "mysql"));
        feed(
            session,
            vec![
                message(Message::ServiceAvailable),
                message(Message::Connected {
                    role: ConnectionRole::Bootstrap,
                    handle: ConnectionHandle::new(1),
                }),
                message(Message::Users(vec!["app".to_string()])),
                message(Message::Databases(vec!["shop".to_string()])),
            ],
        )
    }

    fn logged_in() -> Session {
        let session = feed(
            started(),
            vec![Event::Key(Key::Enter), Event::Key(Key::Enter)],
        );
        let session = feed(session, typed("pw"));
        feed(
            session,
            vec![
                Event::Key(Key::Enter),
                message(Message::Connected {
                    role: ConnectionRole::Session,
                    handle: ConnectionHandle::new(2),
                }),
                message(Message::Tables(vec!["people".to_string()])),
            ],
        )
    }

    #[test]
    fn loading_screen_shows_progress() {
        let (session, _) = Session::init(Credentials::new("root", "", "mysql"));
        let text = screen(&session);
        assert!(text.contains("Checking database server"));
        assert!(text.contains("q: quit"));
    }

    #[test]
    fn user_list_highlights_selection() {
        let text = screen(&started());
        assert!(text.contains("> app"));
        assert!(text.contains("Select user"));
    }

    #[test]
    fn password_is_masked() {
        let session = feed(
            started(),
            vec![Event::Key(Key::Enter), Event::Key(Key::Enter)],
        );
        let session = feed(session, typed("secret"));
        let text = screen(&session);
        assert!(text.contains("Password: ******"));
        assert!(!text.contains("secret"));
        assert_eq!(cursor(&session), Position::new(17, 7));
    }

    #[test]
    fn cursor_follows_edits_in_focused_field() {
        let session = feed(
            logged_in(),
            vec![
                Event::Key(Key::Enter),
                Event::Key(Key::Char('a')),
                message(Message::TableColumns {
                    table: "people".to_string(),
                    columns: vec!["name".to_string(), "age".to_string()],
                }),
            ],
        );
        let session = feed(session, typed("日本"));
        assert_eq!(cursor(&session), Position::new(13, 6));

        let session = feed(session, vec![Event::Key(Key::Left)]);
        assert_eq!(cursor(&session), Position::new(11, 6));
    }

    #[test]
    fn table_data_renders_as_grid() {
        let session = feed(
            logged_in(),
            vec![
                Event::Key(Key::Enter),
                message(Message::TableData {
                    table: "people".to_string(),
                    columns: vec!["name".to_string(), "age".to_string()],
                    rows: vec![[("name", "Ada"), ("age", "36")]
                        .into_iter()
                        .collect::<TableRow>()],
                }),
            ],
        );
        let text = screen(&session);
        assert!(text.contains("people (1 rows)"));
        assert!(text.contains("name"));
        assert!(text.contains("Ada"));
        assert!(text.contains("36"));
    }

    #[test]
    fn empty_table_without_columns_says_no_data() {
        let session = feed(
            logged_in(),
            vec![
                Event::Key(Key::Enter),
                message(Message::TableData {
                    table: "people".to_string(),
                    columns: Vec::new(),
                    rows: Vec::new(),
                }),
            ],
        );
        assert!(screen(&session).contains("No data"));
    }

    #[test]
    fn validation_errors_show_in_footer() {
        let session = feed(
            logged_in(),
            vec![Event::Key(Key::Char('n')), Event::Key(Key::Enter)],
        );
        assert!(screen(&session).contains("Error: Table name cannot be empty"));
    }

    #[test]
    fn failures_render_as_popup() {
        let session = feed(
            logged_in(),
            vec![message(Message::Failed(SessionError::Query(
                "boom".to_string(),
            )))],
        );
        let text = screen(&session);
        assert!(text.contains("query failed: boom"));
        assert!(text.contains("Press any key to continue."));
    }

    #[test]
    fn add_row_marks_focused_field() {
        let session = feed(
            logged_in(),
            vec![
                Event::Key(Key::Enter),
                Event::Key(Key::Char('a')),
                message(Message::TableColumns {
                    table: "people".to_string(),
                    columns: vec!["name".to_string(), "age".to_string()],
                }),
            ],
        );
        let session = feed(session, typed("Al"));
        let text = screen(&session);
        assert!(text.contains("> name: Al"));
        assert!(text.contains("  age: Enter age"));
    }
}
