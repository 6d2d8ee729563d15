//! Index migration planning for sqlx-backed databases.
//!
//! Declare tables and their indices with [`TableDef`], open a
//! [`SchemaSession`] over a connection, and ask a [`MigrationPlanner`] for
//! the statements that make the database match:
//!
//! ```ignore
//! use sqlx::Connection;
//! use sqlx_index_planner::{Column, MigrationPlanner, SchemaSession, SqliteSchemaConnection, TableDef};
//!
//! let mut conn = sqlx::SqliteConnection::connect("sqlite::memory:").await?;
//! let mut session = SchemaSession::new(SqliteSchemaConnection::new(&mut conn));
//!
//! let table = TableDef::new("test_table")
//!     .column(Column::integer("id"))
//!     .column(Column::varchar("name", 42))
//!     .primary_key(["id"])
//!     .index(Some("test_table_by_name"), false, ["name"]);
//!
//! let planner = MigrationPlanner::new();
//! let statements = planner
//!     .statements_required_for_database_migration(&mut session, [&table])
//!     .await?;
//! session.execute_all(&statements).await?;
//! ```
//!
//! The dialect always travels with the connection; nothing here consults a
//! process-wide setting.

pub mod compare;
pub mod dialect;
pub mod error;
pub mod introspect;
pub mod migration;
pub mod render;
pub mod schema;
pub mod session;

pub use compare::{IndexComparator, Mismatch, MismatchKind};
pub use dialect::{Capabilities, Dialect};
pub use error::{Feature, MigrationError, Result};
pub use introspect::{
    IndexElement, IndexOrigin, IndexRow, IntrospectedIndex, SchemaConnection, SchemaIntrospector,
};
pub use migration::{
    MigrationOptions, MigrationPlanner, MigrationStatement, MismatchPolicy, StatementKind,
    UnsupportedPolicy,
};
pub use render::{Intent, StatementRenderer};
pub use schema::{Column, ColumnType, IndexDecl, IndexExpr, IndexSpec, IndexType, Literal, TableDef};
pub use session::SchemaSession;

#[cfg(feature = "mysql")]
pub use introspect::mysql::MySqlSchemaConnection;
#[cfg(feature = "postgres")]
pub use introspect::postgres::PgSchemaConnection;
#[cfg(feature = "sqlite")]
pub use introspect::sqlite::SqliteSchemaConnection;
