use sqlnav_adapters::mysql::MysqlDataAccess;
use sqlnav_core::config::ServerConfig;
use sqlnav_core::data_access::{Credentials, DataAccess, DataAccessErrorKind, TableRow};

fn mysql_integration_enabled() -> bool {
    matches!(
        std::env::var("SQLNAV_RUN_MYSQL_INTEGRATION").ok().as_deref(),
        Some("1")
    )
}

fn integration_server() -> ServerConfig {
    let host = std::env::var("SQLNAV_TEST_DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("SQLNAV_TEST_DB_PORT")
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(3306);
    ServerConfig {
        host,
        port,
        ..ServerConfig::default()
    }
}

fn integration_credentials(database: &str) -> Credentials {
    let user = std::env::var("SQLNAV_TEST_DB_USER").unwrap_or_else(|_| "root".to_string());
    let password = std::env::var("SQLNAV_TEST_DB_PASSWORD").unwrap_or_default();
    Credentials::new(user, password, database)
}

fn integration_database() -> String {
    std::env::var("SQLNAV_TEST_DB_NAME").unwrap_or_else(|_| "sqlnav_test".to_string())
}

#[tokio::test(flavor = "current_thread")]
async fn mysql_access_lists_creates_reads_and_inserts() {
    if !mysql_integration_enabled() {
        return;
    }

    let access = MysqlDataAccess::new(integration_server(), 100);
    assert!(access.check_available().await);

    let bootstrap = access
        .connect(&integration_credentials("mysql"))
        .await
        .expect("bootstrap connect should succeed");
    let users = access
        .list_users(bootstrap)
        .await
        .expect("user listing should succeed");
    assert!(!users.is_empty());
    let databases = access
        .list_databases(bootstrap)
        .await
        .expect("database listing should succeed");
    assert!(databases.iter().any(|database| database == "mysql"));

    let session = access
        .connect(&integration_credentials(&integration_database()))
        .await
        .expect("session connect should succeed");
    let table = "sqlnav_integration_people";
    let _ = access
        .create_table(session, table, "id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(64), age INT")
        .await;

    let tables = access
        .list_tables(session)
        .await
        .expect("table listing should succeed");
    assert!(tables.iter().any(|name| name == table));

    let columns = access
        .table_columns(session, table)
        .await
        .expect("column listing should succeed");
    assert_eq!(columns, vec!["id", "name", "age"]);

    let row: TableRow = [("name", "Alice"), ("age", "30")].into_iter().collect();
    access
        .insert_row(session, table, &row)
        .await
        .expect("insert should succeed");

    let rows = access
        .table_data(session, table)
        .await
        .expect("table data should load");
    let inserted = rows.last().expect("inserted row should be listed");
    assert_eq!(inserted.get("name"), Some("Alice"));
    assert_eq!(inserted.get("age"), Some("30"));

    let error = access
        .table_data(session, "sqlnav_missing_table")
        .await
        .expect_err("missing table should fail");
    assert_eq!(error.kind(), DataAccessErrorKind::Query);

    access.close(session).await.expect("close should succeed");
    access.close(session).await.expect("second close is a no-op");
    access
        .close(bootstrap)
        .await
        .expect("bootstrap close should succeed");
}

#[tokio::test(flavor = "current_thread")]
async fn mysql_access_reports_bad_password_as_auth_error() {
    if !mysql_integration_enabled() {
        return;
    }

    let access = MysqlDataAccess::new(integration_server(), 100);
    let mut credentials = integration_credentials("mysql");
    credentials.password = "definitely-not-the-password".to_string();

    let error = access
        .connect(&credentials)
        .await
        .expect_err("wrong password should be rejected");
    assert_eq!(error.kind(), DataAccessErrorKind::Auth);
}
