use thiserror::Error;

use crate::data_access::TableRow;

pub const LIST_USERS_SQL: &str = "SELECT DISTINCT User FROM mysql.user ORDER BY User";

pub const LIST_DATABASES_SQL: &str = "SHOW DATABASES";

pub const LIST_TABLES_SQL: &str = "SELECT TABLE_NAME \
     FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() \
     ORDER BY TABLE_NAME";

pub const LIST_COLUMNS_SQL: &str = "SELECT COLUMN_NAME \
     FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlGenerationError {
    #[error("table name cannot be empty")]
    EmptyTableName,
    #[error("column name cannot be empty")]
    EmptyColumnName,
    #[error("column definitions cannot be empty")]
    EmptyColumnDefinitions,
    #[error("row has no values to insert")]
    EmptyRow,
}

#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

fn checked_table(table: &str) -> Result<String, SqlGenerationError> {
    if table.is_empty() {
        return Err(SqlGenerationError::EmptyTableName);
    }
    Ok(quote_identifier(table))
}

pub fn create_table_sql(table: &str, column_definitions: &str) -> Result<String, SqlGenerationError> {
    let table = checked_table(table)?;
    if column_definitions.is_empty() {
        return Err(SqlGenerationError::EmptyColumnDefinitions);
    }
    Ok(format!("CREATE TABLE {table} ({column_definitions})"))
}

pub fn select_rows_sql(table: &str, limit: usize) -> Result<String, SqlGenerationError> {
    let table = checked_table(table)?;
    Ok(format!("SELECT * FROM {table} LIMIT {limit}"))
}

pub fn insert_row_sql(table: &str, row: &TableRow) -> Result<String, SqlGenerationError> {
    let table = checked_table(table)?;
    if row.is_empty() {
        return Err(SqlGenerationError::EmptyRow);
    }

    let mut columns = Vec::with_capacity(row.len());
    for column in row.columns() {
        if column.is_empty() {
            return Err(SqlGenerationError::EmptyColumnName);
        }
        columns.push(quote_identifier(column));
    }
    let placeholders = vec!["?"; columns.len()].join(", ");

    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::{
        create_table_sql, insert_row_sql, quote_identifier, select_rows_sql, SqlGenerationError,
    };
    use crate::data_access::TableRow;

    #[test]
    fn identifiers_escape_backticks() {
        assert_eq!(quote_identifier("users"), "`users`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn create_table_passes_definitions_through() {
        let sql = create_table_sql("people", " id INT PRIMARY KEY, name TEXT ")
            .expect("statement should build");
        assert_eq!(sql, "CREATE TABLE `people` ( id INT PRIMARY KEY, name TEXT )");
    }

    #[test]
    fn create_table_rejects_empty_inputs() {
        assert_eq!(
            create_table_sql("", "id INT"),
            Err(SqlGenerationError::EmptyTableName)
        );
        assert_eq!(
            create_table_sql("people", ""),
            Err(SqlGenerationError::EmptyColumnDefinitions)
        );
    }

    #[test]
    fn select_rows_is_bounded() {
        let sql = select_rows_sql("events", 2000).expect("statement should build");
        assert_eq!(sql, "SELECT * FROM `events` LIMIT 2000");
    }

    #[test]
    fn insert_uses_placeholders_in_row_order() {
        let row: TableRow = [("name", "Alice"), ("age", "30")].into_iter().collect();
        let sql = insert_row_sql("people", &row).expect("statement should build");
        assert_eq!(sql, "INSERT INTO `people` (`name`, `age`) VALUES (?, ?)");

        assert_eq!(
            insert_row_sql("people", &TableRow::new()),
            Err(SqlGenerationError::EmptyRow)
        );
    }
}
