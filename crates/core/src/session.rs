use tracing::{debug, info, warn};

use crate::data_access::{ConnectionHandle, Credentials, TableRow};
use crate::dispatcher::{Command, ConnectionRole, Message};
use crate::error::SessionError;
use crate::focus;
use crate::keys::Key;
use crate::widgets::{DataGrid, SelectList, TextInput};

const ADD_ROW_CHAR_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Loading,
    SelectUser,
    SelectDatabase,
    EnterPassword,
    Connecting,
    ListTables,
    CreateTableName,
    CreateTableSchema,
    ViewTable,
    AddRow,
    Error,
}

impl State {
    pub const ALL: [Self; 11] = [
        Self::Loading,
        Self::SelectUser,
        Self::SelectDatabase,
        Self::EnterPassword,
        Self::Connecting,
        Self::ListTables,
        Self::CreateTableName,
        Self::CreateTableSchema,
        Self::ViewTable,
        Self::AddRow,
        Self::Error,
    ];

    #[must_use]
    pub fn takes_text(self) -> bool {
        matches!(
            self,
            Self::EnterPassword | Self::CreateTableName | Self::CreateTableSchema | Self::AddRow
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Requested,
    StartupFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Key(Key),
    Message(Message),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: State,
    bootstrap_credentials: Credentials,
    bootstrap: Option<ConnectionHandle>,
    connection: Option<ConnectionHandle>,
    users: SelectList,
    databases: SelectList,
    tables: SelectList,
    selected_user: Option<String>,
    selected_database: Option<String>,
    password_input: TextInput,
    table_name_input: TextInput,
    table_schema_input: TextInput,
    new_table_name: Option<String>,
    selected_table: Option<String>,
    table_view: DataGrid,
    table_loaded: bool,
    add_row_columns: Vec<String>,
    add_row_inputs: Vec<TextInput>,
    focused_input: usize,
    error: Option<SessionError>,
    exit: Option<Exit>,
}

#[must_use]
pub fn advance(mut session: Session, event: Event) -> (Session, Vec<Command>) {
    let commands = match event {
        Event::Key(key) => session.on_key(key),
        Event::Message(message) => session.on_message(message),
    };
    (session, commands)
}

impl Session {
    #[must_use]
    pub fn new(bootstrap_credentials: Credentials) -> Self {
        Self {
            state: State::Loading,
            bootstrap_credentials,
            bootstrap: None,
            connection: None,
            users: SelectList::new(),
            databases: SelectList::new(),
            tables: SelectList::new(),
            selected_user: None,
            selected_database: None,
            password_input: password_input(),
            table_name_input: table_name_input(),
            table_schema_input: table_schema_input(),
            new_table_name: None,
            selected_table: None,
            table_view: DataGrid::new(),
            table_loaded: false,
            add_row_columns: Vec::new(),
            add_row_inputs: Vec::new(),
            focused_input: 0,
            error: None,
            exit: None,
        }
    }

    #[must_use]
    pub fn init(bootstrap_credentials: Credentials) -> (Self, Vec<Command>) {
        (Self::new(bootstrap_credentials), vec![Command::CheckAvailable])
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn bootstrap(&self) -> Option<ConnectionHandle> {
        self.bootstrap
    }

    #[must_use]
    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.connection
    }

    #[must_use]
    pub fn users(&self) -> &SelectList {
        &self.users
    }

    #[must_use]
    pub fn databases(&self) -> &SelectList {
        &self.databases
    }

    #[must_use]
    pub fn tables(&self) -> &SelectList {
        &self.tables
    }

    #[must_use]
    pub fn selected_user(&self) -> Option<&str> {
        self.selected_user.as_deref()
    }

    #[must_use]
    pub fn selected_database(&self) -> Option<&str> {
        self.selected_database.as_deref()
    }

    #[must_use]
    pub fn password_input(&self) -> &TextInput {
        &self.password_input
    }

    #[must_use]
    pub fn table_name_input(&self) -> &TextInput {
        &self.table_name_input
    }

    #[must_use]
    pub fn table_schema_input(&self) -> &TextInput {
        &self.table_schema_input
    }

    #[must_use]
    pub fn new_table_name(&self) -> Option<&str> {
        self.new_table_name.as_deref()
    }

    #[must_use]
    pub fn selected_table(&self) -> Option<&str> {
        self.selected_table.as_deref()
    }

    #[must_use]
    pub fn table_view(&self) -> &DataGrid {
        &self.table_view
    }

    #[must_use]
    pub fn table_loaded(&self) -> bool {
        self.table_loaded
    }

    #[must_use]
    pub fn add_row_columns(&self) -> &[String] {
        &self.add_row_columns
    }

    #[must_use]
    pub fn add_row_inputs(&self) -> &[TextInput] {
        &self.add_row_inputs
    }

    #[must_use]
    pub fn focused_input(&self) -> usize {
        self.focused_input
    }

    #[must_use]
    pub fn is_saving_row(&self) -> bool {
        self.state == State::AddRow && self.add_row_inputs.is_empty()
    }

    #[must_use]
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn exit(&self) -> Option<Exit> {
        self.exit
    }

    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.exit.is_some()
    }

    /// Hands over every open connection for teardown. A second call returns
    /// nothing, so each handle is closed at most once.
    pub fn take_connections(&mut self) -> Vec<ConnectionHandle> {
        self.bootstrap
            .take()
            .into_iter()
            .chain(self.connection.take())
            .collect()
    }

    fn on_key(&mut self, key: Key) -> Vec<Command> {
        if key.is_interrupt() || (key == Key::Char('q') && !self.state.takes_text()) {
            self.request_exit();
            return Vec::new();
        }

        self.forward_to_widget(key);

        match (self.state, key) {
            (State::SelectUser, Key::Enter) => self.choose_user(),
            (State::SelectDatabase, Key::Enter) => self.choose_database(),
            (State::EnterPassword, Key::Enter) => return self.submit_password(),
            (State::ListTables, Key::Char('n')) => self.begin_table_creation(),
            (State::ListTables, Key::Enter) => return self.open_selected_table(),
            (State::CreateTableName, Key::Enter) => self.submit_table_name(),
            (State::CreateTableSchema, Key::Enter) => return self.submit_table_schema(),
            (State::CreateTableName | State::CreateTableSchema, Key::Esc) => {
                self.reset_table_creation();
                self.transition(State::ListTables);
            }
            (State::ViewTable, Key::Char('a')) => return self.request_row_columns(),
            (State::ViewTable, Key::Esc) => self.transition(State::ListTables),
            (State::AddRow, Key::Enter) => return self.submit_row_field(),
            (State::AddRow, Key::Tab) => self.move_focus(focus::advance),
            (State::AddRow, Key::BackTab) => self.move_focus(focus::retreat),
            (State::AddRow, Key::Esc) => {
                self.clear_row_inputs();
                self.transition(State::ViewTable);
            }
            (State::Error, _) => self.dismiss_error(),
            _ => {}
        }
        Vec::new()
    }

    fn forward_to_widget(&mut self, key: Key) {
        match self.state {
            State::SelectUser => {
                self.users.handle_key(key);
            }
            State::SelectDatabase => {
                self.databases.handle_key(key);
            }
            State::EnterPassword => {
                self.password_input.handle_key(key);
            }
            State::ListTables => {
                self.tables.handle_key(key);
            }
            State::CreateTableName => {
                self.table_name_input.handle_key(key);
            }
            State::CreateTableSchema => {
                self.table_schema_input.handle_key(key);
            }
            State::ViewTable => {
                self.table_view.handle_key(key);
            }
            State::AddRow => {
                if let Some(input) = self.add_row_inputs.get_mut(self.focused_input) {
                    input.handle_key(key);
                }
            }
            State::Loading | State::Connecting | State::Error => {}
        }
    }

    fn on_message(&mut self, message: Message) -> Vec<Command> {
        match message {
            Message::Failed(error) => {
                self.fail(error);
                Vec::new()
            }
            Message::ServiceAvailable => {
                if self.state != State::Loading {
                    return Vec::new();
                }
                self.transition(State::SelectUser);
                vec![Command::Connect {
                    role: ConnectionRole::Bootstrap,
                    credentials: self.bootstrap_credentials.clone(),
                }]
            }
            Message::ServiceUnavailable => {
                if self.state == State::Loading {
                    self.fail(SessionError::Unavailable);
                }
                Vec::new()
            }
            Message::Connected { role, handle } => self.on_connected(role, handle),
            Message::Users(users) => {
                self.users.set_items(users);
                match (self.state, self.bootstrap) {
                    (State::SelectUser, Some(conn)) => vec![Command::ListDatabases(conn)],
                    _ => Vec::new(),
                }
            }
            Message::Databases(databases) => {
                self.databases.set_items(databases);
                Vec::new()
            }
            Message::Tables(tables) => {
                self.tables.set_items(tables);
                Vec::new()
            }
            Message::TableCreated(name) => {
                info!(table = %name, "table created");
                let refreshes = matches!(
                    self.state,
                    State::ListTables | State::CreateTableName | State::CreateTableSchema
                );
                match self.connection {
                    Some(conn) if refreshes => vec![Command::ListTables(conn)],
                    _ => Vec::new(),
                }
            }
            Message::TableData {
                table,
                columns,
                rows,
            } => {
                if matches!(self.state, State::ViewTable | State::AddRow)
                    && self.is_selected(&table)
                {
                    self.table_view.rebuild(columns, &rows);
                    self.table_loaded = true;
                }
                Vec::new()
            }
            Message::TableColumns { table, columns } => {
                if self.state == State::ViewTable && self.is_selected(&table) {
                    self.begin_row_entry(&table, columns);
                }
                Vec::new()
            }
            Message::RowInserted(table) => self.on_row_inserted(table),
        }
    }

    fn on_connected(&mut self, role: ConnectionRole, handle: ConnectionHandle) -> Vec<Command> {
        info!(?role, %handle, "connection established");
        match role {
            ConnectionRole::Bootstrap => {
                if let Some(previous) = self.bootstrap {
                    warn!(%previous, %handle, "ignoring duplicate bootstrap connection");
                    return Vec::new();
                }
                self.bootstrap = Some(handle);
                if self.state == State::SelectUser {
                    vec![Command::ListUsers(handle)]
                } else {
                    Vec::new()
                }
            }
            ConnectionRole::Session => {
                if self.state == State::Connecting {
                    self.connection = Some(handle);
                    self.transition(State::ListTables);
                    return vec![Command::ListTables(handle)];
                }
                if self.connection.is_none() {
                    self.connection = Some(handle);
                }
                Vec::new()
            }
        }
    }

    fn on_row_inserted(&mut self, table: String) -> Vec<Command> {
        if !self.is_selected(&table) {
            return Vec::new();
        }
        let Some(conn) = self.connection else {
            return Vec::new();
        };
        match self.state {
            State::AddRow => {
                if self.add_row_inputs.is_empty() {
                    self.transition(State::ViewTable);
                }
            }
            State::ViewTable => {}
            _ => return Vec::new(),
        }
        vec![Command::FetchTableData { conn, table }]
    }

    fn choose_user(&mut self) {
        if let Some(user) = self.users.selected_item() {
            self.selected_user = Some(user.to_string());
            self.transition(State::SelectDatabase);
        }
    }

    fn choose_database(&mut self) {
        if let Some(database) = self.databases.selected_item() {
            self.selected_database = Some(database.to_string());
            self.password_input.reset();
            self.password_input.focus();
            self.transition(State::EnterPassword);
        }
    }

    fn submit_password(&mut self) -> Vec<Command> {
        let (Some(user), Some(database)) =
            (self.selected_user.clone(), self.selected_database.clone())
        else {
            return Vec::new();
        };
        let password = self.password_input.value().to_string();
        self.password_input.reset();
        self.password_input.blur();
        self.transition(State::Connecting);
        vec![Command::Connect {
            role: ConnectionRole::Session,
            credentials: Credentials::new(user, password, database),
        }]
    }

    fn begin_table_creation(&mut self) {
        self.reset_table_creation();
        self.table_name_input.focus();
        self.transition(State::CreateTableName);
    }

    fn reset_table_creation(&mut self) {
        self.table_name_input = table_name_input();
        self.table_schema_input = table_schema_input();
        self.new_table_name = None;
    }

    fn submit_table_name(&mut self) {
        let name = self.table_name_input.value().to_string();
        if name.is_empty() {
            self.error = Some(SessionError::validation("Table name cannot be empty"));
            return;
        }
        self.new_table_name = Some(name);
        self.table_name_input.blur();
        self.table_schema_input.focus();
        self.transition(State::CreateTableSchema);
    }

    fn submit_table_schema(&mut self) -> Vec<Command> {
        let schema = self.table_schema_input.value().to_string();
        if schema.is_empty() {
            self.error = Some(SessionError::validation("Table schema cannot be empty"));
            return Vec::new();
        }
        let Some(conn) = self.require_connection() else {
            return Vec::new();
        };
        let Some(name) = self.new_table_name.clone() else {
            return Vec::new();
        };
        self.reset_table_creation();
        self.transition(State::ListTables);
        vec![Command::CreateTable { conn, name, schema }]
    }

    fn open_selected_table(&mut self) -> Vec<Command> {
        let Some(table) = self.tables.selected_item().map(str::to_string) else {
            return Vec::new();
        };
        let Some(conn) = self.require_connection() else {
            return Vec::new();
        };
        self.selected_table = Some(table.clone());
        self.table_view.clear();
        self.table_loaded = false;
        self.transition(State::ViewTable);
        vec![Command::FetchTableData { conn, table }]
    }

    fn request_row_columns(&mut self) -> Vec<Command> {
        let Some(table) = self.selected_table.clone() else {
            return Vec::new();
        };
        let Some(conn) = self.require_connection() else {
            return Vec::new();
        };
        vec![Command::GetColumns { conn, table }]
    }

    fn begin_row_entry(&mut self, table: &str, columns: Vec<String>) {
        if columns.is_empty() {
            self.error = Some(SessionError::validation(format!(
                "Table `{table}` has no columns"
            )));
            return;
        }
        self.add_row_inputs = columns
            .iter()
            .map(|column| {
                TextInput::new(format!("{column}: "), format!("Enter {column}"))
                    .with_char_limit(ADD_ROW_CHAR_LIMIT)
            })
            .collect();
        self.add_row_columns = columns;
        self.focused_input = 0;
        if let Some(first) = self.add_row_inputs.first_mut() {
            first.focus();
        }
        self.transition(State::AddRow);
    }

    fn submit_row_field(&mut self) -> Vec<Command> {
        let count = self.add_row_inputs.len();
        if count == 0 {
            return Vec::new();
        }
        if self.focused_input + 1 < count {
            self.move_focus(focus::advance);
            return Vec::new();
        }

        let Some(table) = self.selected_table.clone() else {
            return Vec::new();
        };
        let Some(conn) = self.require_connection() else {
            return Vec::new();
        };
        let row: TableRow = self
            .add_row_columns
            .iter()
            .zip(&self.add_row_inputs)
            .map(|(column, input)| (column.clone(), input.value().to_string()))
            .collect();
        self.clear_row_inputs();
        vec![Command::InsertRow { conn, table, row }]
    }

    fn move_focus(&mut self, step: fn(usize, usize) -> usize) {
        let count = self.add_row_inputs.len();
        if count == 0 {
            return;
        }
        if let Some(input) = self.add_row_inputs.get_mut(self.focused_input) {
            input.blur();
        }
        self.focused_input = step(self.focused_input, count);
        if let Some(input) = self.add_row_inputs.get_mut(self.focused_input) {
            input.focus();
        }
    }

    fn clear_row_inputs(&mut self) {
        self.add_row_inputs.clear();
        self.focused_input = 0;
    }

    fn dismiss_error(&mut self) {
        if self.bootstrap.is_none() {
            self.exit = Some(Exit::StartupFailure);
            return;
        }
        self.error = None;
        self.transition(State::ListTables);
    }

    fn request_exit(&mut self) {
        let exit = if self.state == State::Error && self.bootstrap.is_none() {
            Exit::StartupFailure
        } else {
            Exit::Requested
        };
        debug!(?exit, state = ?self.state, "exit requested");
        self.exit = Some(exit);
    }

    fn require_connection(&mut self) -> Option<ConnectionHandle> {
        if self.connection.is_none() {
            self.error = Some(SessionError::validation(
                "Not connected to a database; restart to log in again",
            ));
        }
        self.connection
    }

    fn is_selected(&self, table: &str) -> bool {
        self.selected_table.as_deref() == Some(table)
    }

    fn fail(&mut self, error: SessionError) {
        warn!(state = ?self.state, %error, "session error");
        self.clear_row_inputs();
        self.transition(State::Error);
        self.error = Some(error);
    }

    fn transition(&mut self, to: State) {
        if self.state != to {
            debug!(from = ?self.state, ?to, "session state transition");
        }
        self.state = to;
        if self.error.as_ref().is_some_and(SessionError::is_validation) {
            self.error = None;
        }
    }
}

fn password_input() -> TextInput {
    TextInput::new("Password: ", "Enter password").masked()
}

fn table_name_input() -> TextInput {
    TextInput::new("Table Name: ", "Enter table name")
}

fn table_schema_input() -> TextInput {
    TextInput::new("Table Schema: ", "id INT PRIMARY KEY, name TEXT")
}
