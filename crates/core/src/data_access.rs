use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAccessErrorKind {
    Auth,
    Connectivity,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DataAccessError {
    kind: DataAccessErrorKind,
    message: String,
}

impl DataAccessError {
    #[must_use]
    pub fn new(kind: DataAccessErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(DataAccessErrorKind::Auth, message)
    }

    #[must_use]
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(DataAccessErrorKind::Connectivity, message)
    }

    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DataAccessErrorKind::Query, message)
    }

    #[must_use]
    pub fn kind(&self) -> DataAccessErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Credentials {
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            database: database.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    cells: Vec<(String, String)>,
}

impl TableRow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        if let Some(cell) = self.cells.iter_mut().find(|(name, _)| *name == column) {
            cell.1 = value;
        } else {
            self.cells.push((column, value));
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<C, V> FromIterator<(C, V)> for TableRow
where
    C: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

#[async_trait]
pub trait DataAccess: Send + Sync {
    async fn check_available(&self) -> bool;
    async fn connect(&self, credentials: &Credentials)
        -> Result<ConnectionHandle, DataAccessError>;
    async fn list_users(&self, conn: ConnectionHandle) -> Result<Vec<String>, DataAccessError>;
    async fn list_databases(&self, conn: ConnectionHandle)
        -> Result<Vec<String>, DataAccessError>;
    async fn list_tables(&self, conn: ConnectionHandle) -> Result<Vec<String>, DataAccessError>;
    async fn create_table(
        &self,
        conn: ConnectionHandle,
        name: &str,
        column_definitions: &str,
    ) -> Result<(), DataAccessError>;
    async fn table_columns(
        &self,
        conn: ConnectionHandle,
        table: &str,
    ) -> Result<Vec<String>, DataAccessError>;
    async fn table_data(
        &self,
        conn: ConnectionHandle,
        table: &str,
    ) -> Result<Vec<TableRow>, DataAccessError>;
    async fn insert_row(
        &self,
        conn: ConnectionHandle,
        table: &str,
        row: &TableRow,
    ) -> Result<(), DataAccessError>;
    /// Releases the connection. Closing an unknown or already closed handle
    /// succeeds without effect.
    async fn close(&self, conn: ConnectionHandle) -> Result<(), DataAccessError>;
}
