//! Create-then-drop scenarios for each kind of index.
//!
//! SQLite runs in memory. The PostgreSQL variants need a server at
//! `DATABASE_URL` (default postgres://postgres:@127.0.0.1/test-sqlx-tokio)
//! and are ignored unless requested with `--ignored`.

mod common;

use serial_test::serial;
use sqlx_index_planner::{
    IndexType, MigrationPlanner, PgSchemaConnection, SchemaConnection, SchemaSession,
    SqliteSchemaConnection, StatementKind, TableDef,
};

use common::{by_name_table, functional_table, matching_indices};

/// Migrate, check the index is there, drop it, check it is gone.
async fn create_then_drop<C: SchemaConnection>(session: &mut SchemaSession<C>, table: &TableDef) {
    let planner = MigrationPlanner::new();
    let dialect = session.dialect();

    let creation = planner
        .statements_required_for_database_migration(session, [table])
        .await
        .expect("Failed to plan migration");
    session.execute_all(&creation).await.expect("Failed to run migration");

    session.reset_caches();
    assert!(session.table_exists(&table.name).await.unwrap());

    let index = match table.indices.as_slice() {
        [index] => index,
        other => panic!("expected a single index, got {}", other.len()),
    };
    assert_eq!(matching_indices(session, table, index).await, 1);

    let drop = planner.drop_statements(dialect, table, index);
    assert_eq!(drop.len(), 1);
    session.execute_all(&drop).await.expect("Failed to drop index");
    assert_eq!(matching_indices(session, table, index).await, 0);

    session
        .execute_all(&[planner.drop_table_statement(dialect, &table.name)])
        .await
        .expect("Failed to drop table");
}

#[tokio::test]
async fn test_drop_standard_index_sqlite() {
    let mut conn = common::sqlite().await;
    let mut session = SchemaSession::new(SqliteSchemaConnection::new(&mut conn));
    create_then_drop(&mut session, &by_name_table(false, None)).await;
}

#[tokio::test]
async fn test_drop_unique_index_sqlite() {
    let mut conn = common::sqlite().await;
    let mut session = SchemaSession::new(SqliteSchemaConnection::new(&mut conn));
    create_then_drop(&mut session, &by_name_table(true, None)).await;
}

#[tokio::test]
async fn test_drop_functional_index_sqlite() {
    let mut conn = common::sqlite().await;
    let mut session = SchemaSession::new(SqliteSchemaConnection::new(&mut conn));
    create_then_drop(&mut session, &functional_table()).await;
}

#[tokio::test]
async fn test_hash_index_is_skipped_on_sqlite() {
    let mut conn = common::sqlite().await;
    let mut session = SchemaSession::new(SqliteSchemaConnection::new(&mut conn));
    let table = by_name_table(false, Some(IndexType::Hash));

    let statements = MigrationPlanner::new()
        .statements_required_for_database_migration(&mut session, [&table])
        .await
        .unwrap();
    assert!(statements.iter().all(|s| s.kind != StatementKind::CreateIndex));

    session.execute_all(&statements).await.unwrap();
    assert_eq!(matching_indices(&mut session, &table, &table.indices[0]).await, 0);
}

async fn postgres_scenario(table: TableDef) {
    let mut conn = common::postgres().await;
    let mut session = SchemaSession::new(PgSchemaConnection::new(&mut conn));
    session.execute("DROP TABLE IF EXISTS test_table").await.unwrap();
    create_then_drop(&mut session, &table).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_drop_standard_index_postgres() {
    postgres_scenario(by_name_table(false, None)).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_drop_hash_index_postgres() {
    postgres_scenario(by_name_table(false, Some(IndexType::Hash))).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_drop_unique_index_postgres() {
    postgres_scenario(by_name_table(true, None)).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_drop_functional_index_postgres() {
    postgres_scenario(functional_table()).await;
}
