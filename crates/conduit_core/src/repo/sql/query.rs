//! Dynamic WHERE-clause assembly and column codecs.

use crate::model::id::Id;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::Row;

impl ToSql for Id {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Id {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::Text(id.to_string())
    }
}

/// Stored form of a timestamp: microseconds since the Unix epoch.
pub(super) fn to_micros(at: &DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(super) fn timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(column)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {micros}").into(),
        )
    })
}

/// Conjunction of `column IN (...)` predicates with positional binds.
#[derive(Debug, Default)]
pub(super) struct Conditions {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Adds `column IN (values)`; `None` adds nothing, an empty list
    /// matches no row.
    pub(super) fn any_of<T>(&mut self, column: &str, values: Option<&[T]>) -> &mut Self
    where
        T: Clone + Into<Value>,
    {
        let Some(values) = values else {
            return self;
        };
        if values.is_empty() {
            self.clauses.push("0 = 1".to_string());
            return self;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{column} IN ({placeholders})"));
        self.params.extend(values.iter().cloned().map(Into::into));
        self
    }

    /// Whether some predicate can never match.
    pub(super) fn is_unsatisfiable(&self) -> bool {
        self.clauses.iter().any(|clause| clause == "0 = 1")
    }

    /// `" WHERE ..."`, or an empty string without predicates.
    pub(super) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(super) fn push_param(&mut self, value: Value) {
        self.params.push(value);
    }

    pub(super) fn into_params(self) -> Vec<Value> {
        self.params
    }
}

/// `(?, ?), (?, ?)` for a multi-row insert of `rows` rows.
pub(super) fn values_placeholders(rows: usize, columns: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}

#[cfg(test)]
mod tests {
    use super::{values_placeholders, Conditions};
    use crate::model::id::Id;

    #[test]
    fn conditions_render_membership_and_empty_sets() {
        let mut conditions = Conditions::new();
        let ids = vec![Id::new(), Id::new()];
        let none: Vec<String> = Vec::new();
        conditions
            .any_of("id", Some(ids.as_slice()))
            .any_of::<String>("email", None)
            .any_of("username", Some(none.as_slice()));
        assert_eq!(conditions.where_sql(), " WHERE id IN (?, ?) AND 0 = 1");
        assert!(conditions.is_unsatisfiable());
        assert_eq!(conditions.into_params().len(), 2);
    }

    #[test]
    fn no_conditions_render_nothing() {
        assert_eq!(Conditions::new().where_sql(), "");
    }

    #[test]
    fn multi_row_placeholders() {
        assert_eq!(values_placeholders(2, 3), "(?, ?, ?), (?, ?, ?)");
    }
}
