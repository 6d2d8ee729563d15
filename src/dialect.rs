//! Dialect capability tables.
//!
//! Every backend is described by a static [`Capabilities`] table. Nothing in
//! the crate consults an ambient "current dialect": callers pass a
//! [`Dialect`] (usually through their connection) and every operation reads
//! the table for that dialect.

use std::collections::HashSet;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::MigrationError;
use crate::render::StatementRenderer;
use crate::schema::{derive_index_name, IndexExpr, IndexSpec, IndexType};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    PostgreSql,
    MySql8,
    /// MySQL before 8.0.13 (no functional key parts).
    MySql5,
    MariaDb,
    Sqlite,
    H2,
    SqlServer,
    Oracle,
}

/// How a dialect folds unquoted identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierCase {
    Lower,
    Upper,
    Preserve,
}

/// Shape of a `DROP INDEX` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropIndexStyle {
    /// `DROP INDEX name`
    Standalone,
    /// `DROP INDEX name ON table`
    OnTable,
}

/// How indices that back a constraint are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintDrop {
    /// `ALTER TABLE t DROP CONSTRAINT name`
    AlterTable,
    /// The constraint is just an index; drop it like one.
    AsIndex,
    /// The backend cannot remove it without rebuilding the table.
    Unsupported,
}

/// How an auto-increment column is spelled in `CREATE TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoIncrementStyle {
    /// A dedicated column type (`SERIAL`, `BIGSERIAL`).
    SerialType,
    /// A keyword appended after the column type.
    Suffix(&'static str),
    /// `INTEGER PRIMARY KEY AUTOINCREMENT` on the column itself.
    InlinePrimaryKey,
}

/// Static description of what a dialect can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub dialect: Dialect,
    pub hash_index: bool,
    /// Hash indices may be `UNIQUE`.
    pub hash_unique: bool,
    /// Hash indices may span more than one key part.
    pub hash_multicolumn: bool,
    pub functional_index: bool,
    /// Access methods other than btree/hash (gin, gist, brin...).
    pub custom_index_types: bool,
    /// `None` when identifiers are effectively unbounded.
    pub max_identifier_length: Option<usize>,
    pub quote_open: char,
    pub quote_close: char,
    pub identifier_case: IdentifierCase,
    /// Whether the catalog reports the access method that was requested.
    /// InnoDB, for one, silently turns `USING HASH` into a btree.
    pub reports_index_type: bool,
    pub drop_index_if_exists: bool,
    pub drop_index_style: DropIndexStyle,
    pub constraint_drop: ConstraintDrop,
    /// Functional key parts must be wrapped in their own parentheses.
    pub wrap_expressions: bool,
    /// String literals treat `\` as an escape character.
    pub backslash_escapes: bool,
    pub create_table_if_not_exists: bool,
    pub auto_increment: AutoIncrementStyle,
}

const POSTGRESQL: Capabilities = Capabilities {
    dialect: Dialect::PostgreSql,
    hash_index: true,
    hash_unique: false,
    hash_multicolumn: false,
    functional_index: true,
    custom_index_types: true,
    max_identifier_length: Some(63),
    quote_open: '"',
    quote_close: '"',
    identifier_case: IdentifierCase::Lower,
    reports_index_type: true,
    drop_index_if_exists: true,
    drop_index_style: DropIndexStyle::Standalone,
    constraint_drop: ConstraintDrop::AlterTable,
    wrap_expressions: false,
    backslash_escapes: false,
    create_table_if_not_exists: true,
    auto_increment: AutoIncrementStyle::SerialType,
};

const MYSQL_8: Capabilities = Capabilities {
    dialect: Dialect::MySql8,
    hash_index: true,
    hash_unique: true,
    hash_multicolumn: true,
    functional_index: true,
    custom_index_types: false,
    max_identifier_length: Some(64),
    quote_open: '`',
    quote_close: '`',
    identifier_case: IdentifierCase::Preserve,
    reports_index_type: false,
    drop_index_if_exists: false,
    drop_index_style: DropIndexStyle::OnTable,
    constraint_drop: ConstraintDrop::AsIndex,
    wrap_expressions: true,
    backslash_escapes: true,
    create_table_if_not_exists: true,
    auto_increment: AutoIncrementStyle::Suffix("AUTO_INCREMENT"),
};

const MYSQL_5: Capabilities = Capabilities {
    dialect: Dialect::MySql5,
    functional_index: false,
    wrap_expressions: false,
    ..MYSQL_8
};

const MARIADB: Capabilities = Capabilities {
    dialect: Dialect::MariaDb,
    functional_index: false,
    wrap_expressions: false,
    drop_index_if_exists: true,
    ..MYSQL_8
};

const SQLITE: Capabilities = Capabilities {
    dialect: Dialect::Sqlite,
    hash_index: false,
    hash_unique: false,
    hash_multicolumn: false,
    functional_index: true,
    custom_index_types: false,
    max_identifier_length: None,
    quote_open: '"',
    quote_close: '"',
    identifier_case: IdentifierCase::Preserve,
    reports_index_type: false,
    drop_index_if_exists: true,
    drop_index_style: DropIndexStyle::Standalone,
    constraint_drop: ConstraintDrop::Unsupported,
    wrap_expressions: false,
    backslash_escapes: false,
    create_table_if_not_exists: true,
    auto_increment: AutoIncrementStyle::InlinePrimaryKey,
};

const H2: Capabilities = Capabilities {
    dialect: Dialect::H2,
    hash_index: false,
    hash_unique: false,
    hash_multicolumn: false,
    functional_index: false,
    custom_index_types: false,
    max_identifier_length: Some(256),
    quote_open: '"',
    quote_close: '"',
    identifier_case: IdentifierCase::Upper,
    reports_index_type: false,
    drop_index_if_exists: true,
    drop_index_style: DropIndexStyle::Standalone,
    constraint_drop: ConstraintDrop::AlterTable,
    wrap_expressions: false,
    backslash_escapes: false,
    create_table_if_not_exists: true,
    auto_increment: AutoIncrementStyle::Suffix("GENERATED BY DEFAULT AS IDENTITY"),
};

const SQL_SERVER: Capabilities = Capabilities {
    dialect: Dialect::SqlServer,
    hash_index: false,
    hash_unique: false,
    hash_multicolumn: false,
    functional_index: false,
    custom_index_types: false,
    max_identifier_length: Some(128),
    quote_open: '[',
    quote_close: ']',
    identifier_case: IdentifierCase::Preserve,
    reports_index_type: false,
    drop_index_if_exists: true,
    drop_index_style: DropIndexStyle::OnTable,
    constraint_drop: ConstraintDrop::AlterTable,
    wrap_expressions: false,
    backslash_escapes: false,
    create_table_if_not_exists: false,
    auto_increment: AutoIncrementStyle::Suffix("IDENTITY(1,1)"),
};

const ORACLE: Capabilities = Capabilities {
    dialect: Dialect::Oracle,
    hash_index: false,
    hash_unique: false,
    hash_multicolumn: false,
    functional_index: true,
    custom_index_types: false,
    max_identifier_length: Some(128),
    quote_open: '"',
    quote_close: '"',
    identifier_case: IdentifierCase::Upper,
    reports_index_type: false,
    drop_index_if_exists: false,
    drop_index_style: DropIndexStyle::Standalone,
    constraint_drop: ConstraintDrop::AlterTable,
    wrap_expressions: false,
    backslash_escapes: false,
    create_table_if_not_exists: false,
    auto_increment: AutoIncrementStyle::Suffix("GENERATED BY DEFAULT AS IDENTITY"),
};

// Words that must be quoted when used as identifiers on at least one backend.
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "and", "as", "asc", "between", "by", "case", "check", "column", "constraint",
        "create", "default", "delete", "desc", "distinct", "drop", "else", "exists", "from",
        "group", "having", "in", "index", "insert", "into", "is", "join", "key", "like", "limit",
        "not", "null", "on", "or", "order", "primary", "references", "select", "set", "table",
        "then", "to", "union", "unique", "update", "user", "using", "values", "when", "where",
    ]
    .into_iter()
    .collect()
});

/// Whether `name` can appear unquoted: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Dialect {
    /// All dialects, in a stable order.
    pub const ALL: [Dialect; 8] = [
        Dialect::PostgreSql,
        Dialect::MySql8,
        Dialect::MySql5,
        Dialect::MariaDb,
        Dialect::Sqlite,
        Dialect::H2,
        Dialect::SqlServer,
        Dialect::Oracle,
    ];

    /// The capability table for this dialect.
    pub fn capabilities(self) -> &'static Capabilities {
        match self {
            Dialect::PostgreSql => &POSTGRESQL,
            Dialect::MySql8 => &MYSQL_8,
            Dialect::MySql5 => &MYSQL_5,
            Dialect::MariaDb => &MARIADB,
            Dialect::Sqlite => &SQLITE,
            Dialect::H2 => &H2,
            Dialect::SqlServer => &SQL_SERVER,
            Dialect::Oracle => &ORACLE,
        }
    }

    /// Pick a dialect from a connection URL such as `DATABASE_URL`.
    ///
    /// MySQL URLs map to [`Dialect::MySql8`]; use [`Dialect::from_str`] to
    /// select an older server explicitly.
    pub fn from_url(url: &str) -> Result<Self, MigrationError> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or(url)
            .to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Dialect::PostgreSql),
            "mysql" => Ok(Dialect::MySql8),
            "mariadb" => Ok(Dialect::MariaDb),
            "sqlite" => Ok(Dialect::Sqlite),
            "h2" => Ok(Dialect::H2),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            "oracle" => Ok(Dialect::Oracle),
            _ => Err(MigrationError::UnknownDialect(url.to_string())),
        }
    }

    /// `CREATE INDEX` for `spec` in this dialect.
    pub fn render_create_index(self, table: &str, spec: &IndexSpec) -> Result<String, MigrationError> {
        StatementRenderer::new(self).create_index_sql(table, spec)
    }

    pub fn render_drop_index(self, name: &str, table: &str) -> String {
        StatementRenderer::new(self).drop_index_sql(table, name)
    }
}

impl FromStr for Dialect {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::PostgreSql),
            "mysql" | "mysql8" => Ok(Dialect::MySql8),
            "mysql5" => Ok(Dialect::MySql5),
            "mariadb" => Ok(Dialect::MariaDb),
            "sqlite" => Ok(Dialect::Sqlite),
            "h2" => Ok(Dialect::H2),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            "oracle" => Ok(Dialect::Oracle),
            _ => Err(MigrationError::UnknownDialect(s.to_string())),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dialect::PostgreSql => "PostgreSQL",
            Dialect::MySql8 => "MySQL 8",
            Dialect::MySql5 => "MySQL 5",
            Dialect::MariaDb => "MariaDB",
            Dialect::Sqlite => "SQLite",
            Dialect::H2 => "H2",
            Dialect::SqlServer => "SQL Server",
            Dialect::Oracle => "Oracle",
        };
        f.write_str(name)
    }
}

impl Capabilities {
    pub fn supports_index_type(&self, index_type: &IndexType) -> bool {
        match index_type {
            IndexType::BTree => true,
            IndexType::Hash => self.hash_index,
            IndexType::Other(_) => self.custom_index_types,
        }
    }

    pub fn supports_functional_index(&self) -> bool {
        self.functional_index
    }

    /// Cut an identifier to the dialect's length limit.
    pub fn truncate_identifier<'a>(&self, name: &'a str) -> &'a str {
        match self.max_identifier_length {
            Some(max) if name.len() > max => {
                let mut end = max;
                while !name.is_char_boundary(end) {
                    end -= 1;
                }
                &name[..end]
            }
            _ => name,
        }
    }

    /// The name an index ends up with in the database.
    ///
    /// Derives one from the table and elements when `requested` is `None`,
    /// then applies the length limit.
    pub fn render_index_name(
        &self,
        requested: Option<&str>,
        table: &str,
        elements: &[IndexExpr],
        unique: bool,
    ) -> String {
        let name = match requested {
            Some(name) => name.to_string(),
            None => derive_index_name(table, elements, unique),
        };
        self.truncate_identifier(&name).to_string()
    }

    pub fn needs_quoting(&self, name: &str) -> bool {
        !is_plain_identifier(name) || RESERVED_WORDS.contains(name.to_ascii_lowercase().as_str())
    }

    /// Quote an identifier only when it would not survive unquoted.
    pub fn quote_identifier(&self, name: &str) -> String {
        if !self.needs_quoting(name) {
            return name.to_string();
        }
        self.quote_always(name)
    }

    /// Quote a name exactly as the catalog reports it.
    ///
    /// Unlike [`Capabilities::quote_identifier`], a name that folding would
    /// change (`LegacyIdx` on PostgreSQL, `legacy_idx` on Oracle) is quoted.
    pub fn quote_catalog_identifier(&self, name: &str) -> String {
        let folds = match self.identifier_case {
            IdentifierCase::Lower => name.chars().any(|c| c.is_ascii_uppercase()),
            IdentifierCase::Upper => name.chars().any(|c| c.is_ascii_lowercase()),
            IdentifierCase::Preserve => false,
        };
        if folds || self.needs_quoting(name) {
            self.quote_always(name)
        } else {
            name.to_string()
        }
    }

    fn quote_always(&self, name: &str) -> String {
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push(self.quote_open);
        for c in name.chars() {
            if c == self.quote_close {
                quoted.push(c);
            }
            quoted.push(c);
        }
        quoted.push(self.quote_close);
        quoted
    }

    /// Bring a catalog-reported identifier back to the case it was declared in.
    ///
    /// Upper-folding backends report `TEST_TABLE_BY_NAME` for an unquoted
    /// `test_table_by_name`.
    pub fn normalize_identifier(&self, name: &str) -> String {
        match self.identifier_case {
            IdentifierCase::Upper
                if is_plain_identifier(name) && !name.chars().any(|c| c.is_ascii_lowercase()) =>
            {
                name.to_ascii_lowercase()
            }
            _ => name.to_string(),
        }
    }
}
