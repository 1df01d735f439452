use tracing::{debug, warn};

use crate::data_access::{ConnectionHandle, Credentials, DataAccess, TableRow};
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Bootstrap,
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CheckAvailable,
    Connect {
        role: ConnectionRole,
        credentials: Credentials,
    },
    ListUsers(ConnectionHandle),
    ListDatabases(ConnectionHandle),
    ListTables(ConnectionHandle),
    CreateTable {
        conn: ConnectionHandle,
        name: String,
        schema: String,
    },
    FetchTableData {
        conn: ConnectionHandle,
        table: String,
    },
    GetColumns {
        conn: ConnectionHandle,
        table: String,
    },
    InsertRow {
        conn: ConnectionHandle,
        table: String,
        row: TableRow,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ServiceAvailable,
    ServiceUnavailable,
    Users(Vec<String>),
    Databases(Vec<String>),
    Connected {
        role: ConnectionRole,
        handle: ConnectionHandle,
    },
    Tables(Vec<String>),
    TableCreated(String),
    TableData {
        table: String,
        columns: Vec<String>,
        rows: Vec<TableRow>,
    },
    TableColumns {
        table: String,
        columns: Vec<String>,
    },
    RowInserted(String),
    Failed(SessionError),
}

impl Command {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckAvailable => "check_available",
            Self::Connect { .. } => "connect",
            Self::ListUsers(_) => "list_users",
            Self::ListDatabases(_) => "list_databases",
            Self::ListTables(_) => "list_tables",
            Self::CreateTable { .. } => "create_table",
            Self::FetchTableData { .. } => "fetch_table_data",
            Self::GetColumns { .. } => "get_columns",
            Self::InsertRow { .. } => "insert_row",
        }
    }

    pub async fn execute(self, access: &dyn DataAccess) -> Message {
        let name = self.name();
        debug!(command = name, "executing command");
        let message = match self.run(access).await {
            Ok(message) => message,
            Err(error) => {
                warn!(command = name, %error, "command failed");
                Message::Failed(error)
            }
        };
        debug!(command = name, "command finished");
        message
    }

    async fn run(self, access: &dyn DataAccess) -> Result<Message, SessionError> {
        match self {
            Self::CheckAvailable => Ok(if access.check_available().await {
                Message::ServiceAvailable
            } else {
                Message::ServiceUnavailable
            }),
            Self::Connect { role, credentials } => {
                let handle = access
                    .connect(&credentials)
                    .await
                    .map_err(SessionError::from_connect)?;
                Ok(Message::Connected { role, handle })
            }
            Self::ListUsers(conn) => access
                .list_users(conn)
                .await
                .map(Message::Users)
                .map_err(SessionError::from_query),
            Self::ListDatabases(conn) => access
                .list_databases(conn)
                .await
                .map(Message::Databases)
                .map_err(SessionError::from_query),
            Self::ListTables(conn) => access
                .list_tables(conn)
                .await
                .map(Message::Tables)
                .map_err(SessionError::from_query),
            Self::CreateTable { conn, name, schema } => {
                access
                    .create_table(conn, &name, &schema)
                    .await
                    .map_err(SessionError::from_query)?;
                Ok(Message::TableCreated(name))
            }
            Self::FetchTableData { conn, table } => {
                let rows = access
                    .table_data(conn, &table)
                    .await
                    .map_err(SessionError::from_query)?;
                let columns = match rows.first() {
                    Some(first) => first.columns().map(str::to_string).collect(),
                    None => access
                        .table_columns(conn, &table)
                        .await
                        .map_err(SessionError::from_query)?,
                };
                Ok(Message::TableData {
                    table,
                    columns,
                    rows,
                })
            }
            Self::GetColumns { conn, table } => {
                let columns = access
                    .table_columns(conn, &table)
                    .await
                    .map_err(SessionError::from_query)?;
                Ok(Message::TableColumns { table, columns })
            }
            Self::InsertRow { conn, table, row } => {
                access
                    .insert_row(conn, &table, &row)
                    .await
                    .map_err(SessionError::from_query)?;
                Ok(Message::RowInserted(table))
            }
        }
    }
}
