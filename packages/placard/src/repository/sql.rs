//! Shared SQL fragments: criteria compilation and positional binds.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use placard_core::{Criteria, Entity, QueryError, SortValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Bind {
    Text(String),
    Int(i64),
}

impl From<&SortValue> for Bind {
    fn from(value: &SortValue) -> Self {
        match value {
            SortValue::Int(n) => Self::Int(*n),
            SortValue::Text(s) => Self::Text(s.clone()),
        }
    }
}

/// A `WHERE` body and the values for its placeholders, in order.
#[derive(Debug, Default)]
pub(crate) struct Clause {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl Clause {
    pub fn push(&mut self, sql: &str, binds: impl IntoIterator<Item = Bind>) {
        self.sql.push_str(" AND ");
        self.sql.push_str(sql);
        self.binds.extend(binds);
    }
}

/// Compile `criteria` against the table aliased as `t`.
///
/// Field names are checked against the entity's allow-list; the JSON path is
/// still bound as a parameter.
pub(crate) fn criteria_clause<E: Entity>(criteria: &Criteria) -> Result<Clause, QueryError> {
    criteria.validate::<E>()?;

    let mut clause = Clause {
        sql: "1=1".to_string(),
        binds: Vec::new(),
    };
    if !criteria.include_deleted {
        clause.push("t.deleted = 0", []);
    }
    for condition in &criteria.conditions {
        clause.push(
            "json_extract(t.doc, ?) = ?",
            [
                Bind::Text(format!("$.{}", condition.field)),
                Bind::Text(condition.value.clone()),
            ],
        );
    }
    Ok(clause)
}

pub(crate) fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    binds: &[Bind],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s.clone()),
            Bind::Int(n) => query.bind(*n),
        };
    }
    query
}

pub(crate) fn decode_doc<E: Entity>(doc: &str) -> Result<E, QueryError> {
    serde_json::from_str(doc).map_err(QueryError::backend)
}
