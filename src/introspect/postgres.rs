//! PostgreSQL catalog access.

use futures::future::{BoxFuture, FutureExt};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Executor, Row};
use tracing::Instrument;

use super::{IndexOrigin, IndexRow, SchemaConnection};
use crate::dialect::Dialect;

// One row per key part. Expression key parts have attnum 0 and are rendered
// by pg_get_indexdef; INCLUDE columns are cut off by indnkeyatts.
const INDEX_ROWS_SQL: &str = r#"
    SELECT
        i.relname::text AS index_name,
        k.ord AS position,
        a.attname::text AS column_name,
        CASE WHEN k.attnum = 0
            THEN pg_get_indexdef(ix.indexrelid, k.ord::int, true)
        END AS expression,
        ix.indisunique AS is_unique,
        ix.indisprimary AS is_primary,
        EXISTS (
            SELECT 1 FROM pg_constraint c
            WHERE c.conindid = ix.indexrelid AND c.contype IN ('u', 'x')
        ) AS is_constraint,
        am.amname::text AS index_type
    FROM pg_class t
    JOIN pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_index ix ON ix.indrelid = t.oid
    JOIN pg_class i ON i.oid = ix.indexrelid
    JOIN pg_am am ON am.oid = i.relam
    CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
    LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum AND k.attnum > 0
    WHERE n.nspname = current_schema()
      AND t.relname = $1
      AND k.ord <= ix.indnkeyatts
    ORDER BY i.relname, k.ord
"#;

const TABLE_EXISTS_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM information_schema.tables
        WHERE table_schema = current_schema() AND table_name = $1
    )
"#;

fn index_row(row: &PgRow) -> Result<IndexRow, sqlx::Error> {
    let origin = if row.try_get::<bool, _>("is_primary")? {
        IndexOrigin::PrimaryKey
    } else if row.try_get::<bool, _>("is_constraint")? {
        IndexOrigin::Constraint
    } else {
        IndexOrigin::Explicit
    };
    Ok(IndexRow {
        index_name: row.try_get("index_name")?,
        position: row.try_get("position")?,
        column_name: row.try_get("column_name")?,
        expression: row.try_get("expression")?,
        unique: row.try_get("is_unique")?,
        index_type: row.try_get("index_type")?,
        origin,
    })
}

/// [`SchemaConnection`] over a borrowed PostgreSQL connection.
///
/// Borrowing lets the same type wrap a pooled connection or an open
/// transaction (`&mut *tx`).
pub struct PgSchemaConnection<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgSchemaConnection<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

impl SchemaConnection for PgSchemaConnection<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    fn fetch_index_rows<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<IndexRow>, sqlx::Error>> {
        async move {
            let span = tracing::debug_span!("pg.index_rows", table, rows = tracing::field::Empty);
            let rows = sqlx::query(INDEX_ROWS_SQL)
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
            sqlx::query_scalar::<_, bool>(TABLE_EXISTS_SQL)
                .bind(table)
                .fetch_one(&mut *self.conn)
                .await
        }
        .boxed()
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<u64, sqlx::Error>> {
        async move {
            let span = tracing::debug_span!("pg.execute", sql = %sql, affected = tracing::field::Empty);
            let result = Executor::execute(&mut *self.conn, sql)
                .instrument(span.clone())
                .await?;
            span.record("affected", result.rows_affected());
            Ok(result.rows_affected())
        }
        .boxed()
    }
}
