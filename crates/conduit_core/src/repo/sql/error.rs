//! Translation of SQLite failures into `AppError`.

use crate::error::AppError;
use rusqlite::ErrorCode;

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
            _ => None,
        };
        if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
            return AppError::not_found("record not found").with_source(err);
        }
        match code {
            Some(ErrorCode::ConstraintViolation) => constraint_error(err),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                AppError::validation("conflicting concurrent write; retry the operation")
                    .with_source(err)
            }
            _ => AppError::internal("storage failure").with_source(err),
        }
    }
}

fn constraint_error(err: rusqlite::Error) -> AppError {
    let detail = match &err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.clone(),
        _ => String::new(),
    };
    let mut app_err = AppError::validation("constraint violation");
    if let Some(columns) = detail.strip_prefix("UNIQUE constraint failed: ") {
        app_err = app_err.with_field(&unique_field(columns), "has already been taken");
    } else if detail.starts_with("FOREIGN KEY constraint failed") {
        app_err = app_err.with_field("reference", "refers to a missing record");
    } else if detail.starts_with("CHECK constraint failed") {
        app_err = app_err.with_field("record", "violates a domain rule");
    }
    app_err.with_source(err)
}

/// `users.email` -> `email`; compound keys map to their table name.
fn unique_field(columns: &str) -> String {
    let parts: Vec<&str> = columns.split(',').map(str::trim).collect();
    let first = parts.first().copied().unwrap_or_default();
    let (table, column) = first.split_once('.').unwrap_or(("", first));
    if parts.len() == 1 {
        column.to_string()
    } else {
        table.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::unique_field;
    use crate::error::{AppError, ErrorKind};
    use rusqlite::Connection;

    #[test]
    fn unique_field_uses_column_or_table() {
        assert_eq!(unique_field("users.email"), "email");
        assert_eq!(
            unique_field("article_tags.article_id, article_tags.tag_id"),
            "article_tags"
        );
    }

    #[test]
    fn unique_violation_becomes_validation_with_field() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: AppError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.fields().contains_key("name"));
    }

    #[test]
    fn missing_row_becomes_not_found() {
        let conn = Connection::open_in_memory().unwrap();
        let err: AppError = conn
            .query_row("SELECT 1 WHERE 0 = 1", [], |row| row.get::<_, i64>(0))
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
