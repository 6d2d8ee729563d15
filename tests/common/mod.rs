//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use sqlx::{Connection, PgConnection, SqliteConnection};
use sqlx_index_planner::{
    Column, IndexComparator, IndexDecl, IndexExpr, IndexSpec, IndexType, SchemaConnection,
    SchemaSession, TableDef,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn sqlite() -> SqliteConnection {
    init_tracing();
    SqliteConnection::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite database")
}

pub async fn postgres() -> PgConnection {
    init_tracing();
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres:@127.0.0.1/test-sqlx-tokio".to_string());
    PgConnection::connect(&database_url)
        .await
        .expect("Failed to connect to database")
}

/// `test_table(id int primary key, name varchar(42))` with one index on `name`.
pub fn by_name_table(unique: bool, index_type: Option<IndexType>) -> TableDef {
    let mut decl = IndexDecl::on(["name"]).named("test_table_by_name");
    if unique {
        decl = decl.unique();
    }
    if let Some(index_type) = index_type {
        decl = decl.using(index_type);
    }
    TableDef::new("test_table")
        .column(Column::integer("id"))
        .column(Column::varchar("name", 42))
        .primary_key(["id"])
        .declare(decl)
}

/// Unique index over `price` and `coalesce(item, '*')`.
pub fn functional_table() -> TableDef {
    TableDef::new("test_table")
        .column(Column::integer("id").auto_increment())
        .column(Column::integer("price"))
        .column(Column::varchar("item", 32).nullable())
        .primary_key(["id"])
        .declare(
            IndexDecl::on(["price"])
                .unique()
                .function(IndexExpr::coalesce(IndexExpr::column("item"), IndexExpr::string("*"))),
        )
}

/// Fresh introspection of `table`, counting indices that are `spec` by name
/// or by structure.
pub async fn matching_indices<C: SchemaConnection>(
    session: &mut SchemaSession<C>,
    table: &TableDef,
    spec: &IndexSpec,
) -> usize {
    session.reset_caches();
    let comparator = IndexComparator::new(session.dialect());
    session
        .existing_indices(&table.name)
        .await
        .expect("Failed to read indices")
        .iter()
        .filter(|actual| comparator.names_match(spec, actual) || comparator.only_name_differs(spec, actual))
        .count()
}
