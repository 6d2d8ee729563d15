//! MySQL / MariaDB catalog access through `information_schema.STATISTICS`.

use futures::future::{BoxFuture, FutureExt};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Executor, Row};
use tracing::Instrument;

use super::{IndexOrigin, IndexRow, SchemaConnection};
use crate::dialect::Dialect;

const TABLE_EXISTS_SQL: &str = r#"
    SELECT COUNT(*) FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
"#;

/// `EXPRESSION` only exists from MySQL 8.0.13 on.
fn index_rows_sql(with_expressions: bool) -> String {
    let expression = if with_expressions {
        "CAST(EXPRESSION AS CHAR)"
    } else {
        "CAST(NULL AS CHAR)"
    };
    format!(
        r#"
    SELECT
        CAST(INDEX_NAME AS CHAR) AS index_name,
        CAST(SEQ_IN_INDEX AS SIGNED) AS position,
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        {} AS expression,
        CAST(NON_UNIQUE AS SIGNED) AS non_unique,
        CAST(INDEX_TYPE AS CHAR) AS index_type
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#,
        expression
    )
}

fn index_row(row: &MySqlRow) -> Result<IndexRow, sqlx::Error> {
    let index_name: String = row.try_get("index_name")?;
    let origin = if index_name == "PRIMARY" {
        IndexOrigin::PrimaryKey
    } else {
        IndexOrigin::Explicit
    };
    Ok(IndexRow {
        position: row.try_get("position")?,
        column_name: row.try_get("column_name")?,
        expression: row.try_get("expression")?,
        unique: row.try_get::<i64, _>("non_unique")? == 0,
        index_type: row.try_get("index_type")?,
        origin,
        index_name,
    })
}

/// [`SchemaConnection`] over a borrowed MySQL or MariaDB connection.
pub struct MySqlSchemaConnection<'c> {
    conn: &'c mut MySqlConnection,
    dialect: Dialect,
}

impl<'c> MySqlSchemaConnection<'c> {
    /// Assumes a MySQL 8 server.
    pub fn new(conn: &'c mut MySqlConnection) -> Self {
        Self::with_dialect(conn, Dialect::MySql8)
    }

    /// For MySQL 5 or MariaDB servers.
    pub fn with_dialect(conn: &'c mut MySqlConnection, dialect: Dialect) -> Self {
        Self { conn, dialect }
    }
}

impl SchemaConnection for MySqlSchemaConnection<'_> {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn fetch_index_rows<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<IndexRow>, sqlx::Error>> {
        async move {
            let sql = index_rows_sql(self.dialect.capabilities().supports_functional_index());
            let span = tracing::debug_span!("mysql.index_rows", table, rows = tracing::field::Empty);
            let rows = sqlx::query(&sql)
                .bind(table)
                .fetch_all(&mut *self.conn)
                .instrument(span.clone())
                .await?;
            span.record("rows", rows.len());

            rows.iter().map(index_row).collect()
        }
        .boxed()
    }

    fn table_exists<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<bool, sqlx::Error>> {
        async move {
            let count = sqlx::query_scalar::<_, i64>(TABLE_EXISTS_SQL)
                .bind(table)
                .fetch_one(&mut *self.conn)
                .await?;
            Ok(count > 0)
        }
        .boxed()
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<u64, sqlx::Error>> {
        async move {
            let span = tracing::debug_span!("mysql.execute", sql = %sql, affected = tracing::field::Empty);
            let result = Executor::execute(&mut *self.conn, sql)
                .instrument(span.clone())
                .await?;
            span.record("affected", result.rows_affected());
            Ok(result.rows_affected())
        }
        .boxed()
    }
}
