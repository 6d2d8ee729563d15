//! A connection paired with its introspection cache.

use crate::dialect::Dialect;
use crate::error::{MigrationError, Result};
use crate::introspect::{IntrospectedIndex, SchemaConnection, SchemaIntrospector};
use crate::migration::MigrationStatement;

/// One connection (or transaction) scope and the index cache that belongs
/// to it.
///
/// Statements run through [`SchemaSession::execute`] or
/// [`SchemaSession::execute_all`] invalidate the cache for their table.
/// DDL issued any other way must be followed by [`SchemaSession::reset_caches`].
pub struct SchemaSession<C> {
    conn: C,
    introspector: SchemaIntrospector,
}

impl<C: SchemaConnection> SchemaSession<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            introspector: SchemaIntrospector::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }

    /// Direct access to the connection. Bypasses cache invalidation.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    /// Current non-primary-key indices of `table`.
    pub async fn existing_indices(&mut self, table: &str) -> Result<Vec<IntrospectedIndex>> {
        self.introspector.list_indices(&mut self.conn, table).await
    }

    pub async fn table_exists(&mut self, table: &str) -> Result<bool> {
        self.introspector.table_exists(&mut self.conn, table).await
    }

    pub fn reset_caches(&mut self) {
        self.introspector.reset_caches();
    }

    /// Run a single raw statement and forget everything cached.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let result = self.conn.execute(sql).await;
        self.introspector.reset_caches();
        result.map_err(|source| MigrationError::ExecutionFailure {
            position: 1,
            sql: sql.to_string(),
            source,
        })
    }

    /// Run statements in order, stopping at the first rejection.
    ///
    /// Nothing is retried or rolled back; wrap the session's connection in a
    /// transaction if the backend supports transactional DDL.
    pub async fn execute_all(&mut self, statements: &[MigrationStatement]) -> Result<()> {
        for (i, statement) in statements.iter().enumerate() {
            let result = self.conn.execute(&statement.sql).await;
            self.introspector.invalidate(&statement.table);

            if let Err(source) = result {
                tracing::warn!(position = i + 1, sql = %statement.sql, error = %source, "statement rejected");
                return Err(MigrationError::ExecutionFailure {
                    position: i + 1,
                    sql: statement.sql.clone(),
                    source,
                });
            }
        }
        tracing::info!(count = statements.len(), "executed migration statements");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::mock::{row, MockConnection};
    use crate::migration::StatementKind;

    fn statement(sql: &str) -> MigrationStatement {
        MigrationStatement {
            sql: sql.to_string(),
            kind: StatementKind::CreateIndex,
            table: "test_table".to_string(),
            index: None,
        }
    }

    #[test]
    fn test_execute_all_stops_at_first_failure() {
        let conn = MockConnection::new(Dialect::Sqlite).failing_on("bad");
        let mut session = SchemaSession::new(conn);
        let statements = vec![statement("CREATE INDEX a ON t (x)"), statement("bad"), statement("CREATE INDEX c ON t (z)")];

        let err = tokio_test::block_on(session.execute_all(&statements)).unwrap_err();
        match err {
            MigrationError::ExecutionFailure { position, sql, .. } => {
                assert_eq!(position, 2);
                assert_eq!(sql, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.into_inner().executed, vec!["CREATE INDEX a ON t (x)".to_string()]);
    }

    #[test]
    fn test_execute_all_invalidates_cache() {
        let conn = MockConnection::new(Dialect::Sqlite)
            .with_table("test_table", vec![row("test_table_by_name", 0, Some("name"), None, false)]);
        let mut session = SchemaSession::new(conn);

        tokio_test::block_on(async {
            session.existing_indices("test_table").await.unwrap();
            assert!(session.introspector().is_cached("test_table"));

            session
                .execute_all(&[statement("DROP INDEX IF EXISTS test_table_by_name")])
                .await
                .unwrap();
            assert!(!session.introspector().is_cached("test_table"));
        });
    }
}
