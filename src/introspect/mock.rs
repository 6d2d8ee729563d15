//! In-memory [`SchemaConnection`] for unit tests.

use std::collections::HashMap;

use futures::future::{BoxFuture, FutureExt};

use super::{IndexOrigin, IndexRow, SchemaConnection};
use crate::dialect::Dialect;

pub(crate) fn row(
    index_name: &str,
    position: i64,
    column: Option<&str>,
    expression: Option<&str>,
    unique: bool,
) -> IndexRow {
    IndexRow {
        index_name: index_name.to_string(),
        position,
        column_name: column.map(str::to_string),
        expression: expression.map(str::to_string),
        unique,
        index_type: None,
        origin: IndexOrigin::Explicit,
    }
}

pub(crate) struct MockConnection {
    dialect: Dialect,
    tables: HashMap<String, Vec<IndexRow>>,
    fail_fetches: bool,
    fail_on: Option<String>,
    pub fetches: usize,
    pub executed: Vec<String>,
}

impl MockConnection {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: HashMap::new(),
            fail_fetches: false,
            fail_on: None,
            fetches: 0,
            executed: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: &str, rows: Vec<IndexRow>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }

    pub fn failing_fetches(mut self) -> Self {
        self.fail_fetches = true;
        self
    }

    /// Reject any statement containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }
}

impl SchemaConnection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn fetch_index_rows<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<IndexRow>, sqlx::Error>> {
        async move {
            self.fetches += 1;
            if self.fail_fetches {
                return Err(sqlx::Error::Protocol("connection reset".to_string()));
            }
            Ok(self.tables.get(table).cloned().unwrap_or_default())
        }
        .boxed()
    }

    fn table_exists<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<bool, sqlx::Error>> {
        async move { Ok(self.tables.contains_key(table)) }.boxed()
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<u64, sqlx::Error>> {
        async move {
            if let Some(needle) = &self.fail_on {
                if sql.contains(needle.as_str()) {
                    return Err(sqlx::Error::Protocol(format!("rejected: {}", sql)));
                }
            }
            self.executed.push(sql.to_string());
            Ok(0)
        }
        .boxed()
    }
}
