use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params, Pool, Row, SslOpts, Value};
use sqlnav_core::config::{BootstrapConfig, PasswordSource, ServerConfig, TlsMode};
use sqlnav_core::data_access::{
    ConnectionHandle, Credentials, DataAccess, DataAccessError, TableRow,
};
use sqlnav_core::sql_generator::{
    create_table_sql, insert_row_sql, select_rows_sql, SqlGenerationError, LIST_COLUMNS_SQL,
    LIST_DATABASES_SQL, LIST_TABLES_SQL, LIST_USERS_SQL,
};
use tracing::{debug, info, warn};

pub const BOOTSTRAP_PASSWORD_ENV: &str = "SQLNAV_BOOTSTRAP_PASSWORD";

const DEFAULT_KEYRING_SERVICE: &str = "sqlnav";

/// Server error codes that mean the login itself was refused.
const ACCESS_DENIED_CODES: [u16; 3] = [1044, 1045, 1698];

#[derive(Debug)]
pub struct MysqlDataAccess {
    server: ServerConfig,
    max_rows: usize,
    next_handle: AtomicU64,
    pools: Mutex<HashMap<ConnectionHandle, Pool>>,
}

impl MysqlDataAccess {
    #[must_use]
    pub fn new(server: ServerConfig, max_rows: u32) -> Self {
        Self {
            server,
            max_rows: usize::try_from(max_rows).unwrap_or(usize::MAX),
            next_handle: AtomicU64::new(1),
            pools: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<ConnectionHandle, Pool>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn conn(&self, handle: ConnectionHandle) -> Result<Conn, DataAccessError> {
        let pool = self
            .registry()
            .get(&handle)
            .cloned()
            .ok_or_else(|| DataAccessError::connectivity(format!("{handle} is not open")))?;
        pool.get_conn().await.map_err(to_connect_error)
    }
}

#[async_trait]
impl DataAccess for MysqlDataAccess {
    async fn check_available(&self) -> bool {
        match Conn::new(opts_from_server(&self.server)).await {
            Ok(conn) => {
                let _ = conn.disconnect().await;
                true
            }
            Err(mysql_async::Error::Server(error)) => {
                debug!(code = error.code, "availability check answered by server");
                true
            }
            Err(error) => {
                warn!(%error, host = %self.server.host, port = self.server.port, "server unreachable");
                false
            }
        }
    }

    async fn connect(&self, credentials: &Credentials) -> Result<ConnectionHandle, DataAccessError> {
        let pool = Pool::new(opts_for_credentials(&self.server, credentials));
        match pool.get_conn().await {
            Ok(conn) => drop(conn),
            Err(error) => {
                let _ = pool.disconnect().await;
                return Err(to_connect_error(error));
            }
        }

        let handle = ConnectionHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.registry().insert(handle, pool);
        info!(%handle, user = %credentials.user, database = %credentials.database, "opened connection");
        Ok(handle)
    }

    async fn list_users(&self, conn: ConnectionHandle) -> Result<Vec<String>, DataAccessError> {
        let mut conn = self.conn(conn).await?;
        conn.query_map(LIST_USERS_SQL, |user: String| user)
            .await
            .map_err(to_query_error)
    }

    async fn list_databases(&self, conn: ConnectionHandle) -> Result<Vec<String>, DataAccessError> {
        let mut conn = self.conn(conn).await?;
        conn.query_map(LIST_DATABASES_SQL, |database: String| database)
            .await
            .map_err(to_query_error)
    }

    async fn list_tables(&self, conn: ConnectionHandle) -> Result<Vec<String>, DataAccessError> {
        let mut conn = self.conn(conn).await?;
        conn.query_map(LIST_TABLES_SQL, |table: String| table)
            .await
            .map_err(to_query_error)
    }

    async fn create_table(
        &self,
        conn: ConnectionHandle,
        name: &str,
        column_definitions: &str,
    ) -> Result<(), DataAccessError> {
        let sql = create_table_sql(name, column_definitions).map_err(to_generation_error)?;
        let mut conn = self.conn(conn).await?;
        conn.query_drop(sql).await.map_err(to_query_error)
    }

    async fn table_columns(
        &self,
        conn: ConnectionHandle,
        table: &str,
    ) -> Result<Vec<String>, DataAccessError> {
        let mut conn = self.conn(conn).await?;
        conn.exec_map(LIST_COLUMNS_SQL, (table.to_string(),), |column: String| {
            column
        })
        .await
        .map_err(to_query_error)
    }

    async fn table_data(
        &self,
        conn: ConnectionHandle,
        table: &str,
    ) -> Result<Vec<TableRow>, DataAccessError> {
        let sql = select_rows_sql(table, self.max_rows).map_err(to_generation_error)?;
        let mut conn = self.conn(conn).await?;
        let rows: Vec<Row> = conn.query(sql).await.map_err(to_query_error)?;
        Ok(rows.into_iter().map(row_to_table_row).collect())
    }

    async fn insert_row(
        &self,
        conn: ConnectionHandle,
        table: &str,
        row: &TableRow,
    ) -> Result<(), DataAccessError> {
        let sql = insert_row_sql(table, row).map_err(to_generation_error)?;
        let values = row
            .iter()
            .map(|(_, value)| Value::from(value))
            .collect::<Vec<_>>();
        let mut conn = self.conn(conn).await?;
        conn.exec_drop(sql, Params::Positional(values))
            .await
            .map_err(to_query_error)
    }

    async fn close(&self, conn: ConnectionHandle) -> Result<(), DataAccessError> {
        let Some(pool) = self.registry().remove(&conn) else {
            return Ok(());
        };
        info!(handle = %conn, "closing connection");
        pool.disconnect().await.map_err(to_connect_error)
    }
}

#[must_use]
pub fn bootstrap_credentials(config: &BootstrapConfig) -> Credentials {
    Credentials::new(
        config.user.clone(),
        resolve_password(config).unwrap_or_default(),
        config.database.clone(),
    )
}

fn opts_from_server(server: &ServerConfig) -> OptsBuilder {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(server.host.clone())
        .tcp_port(server.port);

    if let Some(ssl_opts) = ssl_opts_from_server(server) {
        builder = builder.ssl_opts(ssl_opts);
    }

    if matches!(server.tls_mode, TlsMode::Disabled) {
        builder = builder.prefer_socket(false);
    }

    builder
}

fn opts_for_credentials(server: &ServerConfig, credentials: &Credentials) -> OptsBuilder {
    let mut builder = opts_from_server(server).user(Some(credentials.user.clone()));

    if !credentials.password.is_empty() {
        builder = builder.pass(Some(credentials.password.clone()));
    }

    if let Some(database) = non_empty(Some(credentials.database.as_str())) {
        builder = builder.db_name(Some(database.to_string()));
    }

    builder
}

fn resolve_password(config: &BootstrapConfig) -> Option<String> {
    let env_password = std::env::var(BOOTSTRAP_PASSWORD_ENV)
        .ok()
        .filter(|pw| !pw.is_empty());

    match config.password_source {
        PasswordSource::Inline => config.password.clone(),
        PasswordSource::EnvVar => env_password,
        PasswordSource::Keyring => {
            if let Some(password) = load_keyring_password(config) {
                return Some(password);
            }

            if let Some(password) = env_password {
                store_keyring_password(config, &password);
                return Some(password);
            }

            None
        }
    }
}

fn ssl_opts_from_server(server: &ServerConfig) -> Option<SslOpts> {
    if !server_requests_tls(server) {
        return None;
    }

    let mut ssl_opts = SslOpts::default();
    if let Some(ca_cert_path) = non_empty(server.tls_ca_cert_path.as_deref()) {
        ssl_opts = ssl_opts.with_root_certs(vec![PathBuf::from(ca_cert_path).into()]);
    }
    if matches!(server.tls_mode, TlsMode::Require) {
        ssl_opts = ssl_opts.with_danger_skip_domain_validation(true);
    }

    Some(ssl_opts)
}

fn server_requests_tls(server: &ServerConfig) -> bool {
    match server.tls_mode {
        TlsMode::Disabled => false,
        TlsMode::Prefer => non_empty(server.tls_ca_cert_path.as_deref()).is_some(),
        TlsMode::Require | TlsMode::VerifyIdentity => true,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn load_keyring_password(config: &BootstrapConfig) -> Option<String> {
    let entry = keyring_entry(config)?;
    entry.get_password().ok().filter(|pw| !pw.is_empty())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn load_keyring_password(_config: &BootstrapConfig) -> Option<String> {
    None
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn store_keyring_password(config: &BootstrapConfig, password: &str) {
    if password.is_empty() {
        return;
    }
    if let Some(entry) = keyring_entry(config) {
        if let Err(error) = entry.set_password(password) {
            warn!(%error, "failed to store bootstrap password in keyring");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn store_keyring_password(_config: &BootstrapConfig, _password: &str) {}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn keyring_entry(config: &BootstrapConfig) -> Option<keyring::Entry> {
    let service =
        non_empty(config.keyring_service.as_deref()).unwrap_or(DEFAULT_KEYRING_SERVICE);
    let account = non_empty(config.keyring_account.as_deref()).unwrap_or(config.user.as_str());
    keyring::Entry::new(service, account).ok()
}

fn row_to_table_row(row: Row) -> TableRow {
    let columns = row
        .columns_ref()
        .iter()
        .map(|column| column.name_str().into_owned())
        .collect::<Vec<_>>();
    columns
        .into_iter()
        .zip(row.unwrap().into_iter().map(mysql_value_to_string))
        .collect()
}

fn mysql_value_to_string(value: Value) -> String {
    match value {
        Value::NULL => "NULL".to_string(),
        Value::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Value::Int(value) => value.to_string(),
        Value::UInt(value) => value.to_string(),
        Value::Float(value) => value.to_string(),
        Value::Double(value) => value.to_string(),
        Value::Date(year, month, day, 0, 0, 0, 0) => format!("{year:04}-{month:02}-{day:02}"),
        Value::Date(year, month, day, hour, minute, second, 0) => {
            format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
        }
        Value::Date(year, month, day, hour, minute, second, micros) => format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
        ),
        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if is_negative { "-" } else { "" };
            let hours = u32::from(hours) + days * 24;
            if micros == 0 {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
            }
        }
    }
}

fn to_connect_error(error: mysql_async::Error) -> DataAccessError {
    match &error {
        mysql_async::Error::Server(server) if ACCESS_DENIED_CODES.contains(&server.code) => {
            DataAccessError::auth(server.message.clone())
        }
        mysql_async::Error::Server(server) => DataAccessError::query(server.message.clone()),
        _ => DataAccessError::connectivity(error.to_string()),
    }
}

fn to_query_error(error: mysql_async::Error) -> DataAccessError {
    match &error {
        mysql_async::Error::Server(server) => DataAccessError::query(server.message.clone()),
        _ => DataAccessError::connectivity(error.to_string()),
    }
}

fn to_generation_error(error: SqlGenerationError) -> DataAccessError {
    DataAccessError::query(error.to_string())
}

#[cfg(test)]
mod tests {
    use mysql_async::{Error, Opts, ServerError, Value};
    use sqlnav_core::config::{BootstrapConfig, PasswordSource, ServerConfig, TlsMode};
    use sqlnav_core::data_access::{
        ConnectionHandle, Credentials, DataAccess, DataAccessErrorKind,
    };

    use super::{
        bootstrap_credentials, mysql_value_to_string, opts_for_credentials,
        server_requests_tls, to_connect_error, to_query_error, MysqlDataAccess,
    };

    fn server_error(code: u16, message: &str) -> Error {
        Error::Server(ServerError {
            code,
            message: message.to_string(),
            state: "28000".to_string(),
        })
    }

    #[test]
    fn value_conversion_is_human_readable() {
        assert_eq!(mysql_value_to_string(Value::NULL), "NULL");
        assert_eq!(
            mysql_value_to_string(Value::Bytes(b"hello".to_vec())),
            "hello".to_string()
        );
        assert_eq!(mysql_value_to_string(Value::Int(-8)), "-8");
        assert_eq!(mysql_value_to_string(Value::UInt(8)), "8");
        assert_eq!(
            mysql_value_to_string(Value::Date(2024, 2, 29, 0, 0, 0, 0)),
            "2024-02-29"
        );
        assert_eq!(
            mysql_value_to_string(Value::Date(2024, 2, 29, 13, 5, 9, 0)),
            "2024-02-29 13:05:09"
        );
        assert_eq!(
            mysql_value_to_string(Value::Time(true, 1, 2, 3, 4, 0)),
            "-26:03:04"
        );
    }

    #[test]
    fn access_denied_on_connect_is_an_auth_error() {
        let error = to_connect_error(server_error(1045, "Access denied for user 'bob'"));
        assert_eq!(error.kind(), DataAccessErrorKind::Auth);
        assert_eq!(error.message(), "Access denied for user 'bob'");

        let error = to_connect_error(server_error(1049, "Unknown database 'nope'"));
        assert_eq!(error.kind(), DataAccessErrorKind::Query);
    }

    #[test]
    fn server_errors_during_queries_are_query_errors() {
        let error = to_query_error(server_error(1146, "Table 'shop.ghost' doesn't exist"));
        assert_eq!(error.kind(), DataAccessErrorKind::Query);
    }

    #[test]
    fn io_errors_are_connectivity_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = to_query_error(Error::Io(io.into()));
        assert_eq!(error.kind(), DataAccessErrorKind::Connectivity);
    }

    #[test]
    fn credentials_land_in_connection_opts() {
        let server = ServerConfig::default();
        let opts = Opts::from(opts_for_credentials(
            &server,
            &Credentials::new("app", "secret", "shop"),
        ));
        assert_eq!(opts.ip_or_hostname(), server.host);
        assert_eq!(opts.tcp_port(), server.port);
        assert_eq!(opts.user(), Some("app"));
        assert_eq!(opts.pass(), Some("secret"));
        assert_eq!(opts.db_name(), Some("shop"));

        let opts = Opts::from(opts_for_credentials(&server, &Credentials::new("app", "", "")));
        assert_eq!(opts.pass(), None);
        assert_eq!(opts.db_name(), None);
    }

    #[test]
    fn tls_mode_prefer_requires_a_ca_path() {
        let mut server = ServerConfig {
            tls_mode: TlsMode::Prefer,
            ..ServerConfig::default()
        };
        assert!(!server_requests_tls(&server));

        server.tls_ca_cert_path = Some("/tmp/ca.pem".to_string());
        assert!(server_requests_tls(&server));

        server.tls_mode = TlsMode::Disabled;
        assert!(!server_requests_tls(&server));
    }

    #[test]
    fn tls_mode_require_always_uses_tls() {
        let server = ServerConfig {
            tls_mode: TlsMode::Require,
            ..ServerConfig::default()
        };
        assert!(server_requests_tls(&server));
    }

    #[test]
    fn inline_bootstrap_password_is_used_verbatim() {
        let config = BootstrapConfig {
            user: "navigator".to_string(),
            database: "inventory".to_string(),
            password_source: PasswordSource::Inline,
            password: Some("hunter2".to_string()),
            ..BootstrapConfig::default()
        };
        assert_eq!(
            bootstrap_credentials(&config),
            Credentials::new("navigator", "hunter2", "inventory")
        );
    }

    #[tokio::test]
    async fn unknown_handles_close_quietly_and_fail_queries() {
        let access = MysqlDataAccess::new(ServerConfig::default(), 10);
        let ghost = ConnectionHandle::new(99);

        access.close(ghost).await.expect("closing an unknown handle");
        access.close(ghost).await.expect("closing twice");

        let error = access
            .list_tables(ghost)
            .await
            .expect_err("unknown handle should fail");
        assert_eq!(error.kind(), DataAccessErrorKind::Connectivity);
    }
}
