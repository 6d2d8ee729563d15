//! Reading index metadata back from a live database.
//!
//! Each backend implements [`SchemaConnection`] and returns raw catalog rows.
//! [`normalize_rows`] turns those rows into [`IntrospectedIndex`] values with a
//! dialect-neutral shape, and [`SchemaIntrospector`] memoizes the result per
//! table until the caller invalidates it.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::dialect::Dialect;
use crate::error::{MigrationError, Result};
use crate::schema::IndexType;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Catalog rows
// ============================================================================

/// Why an index exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Created with `CREATE INDEX`.
    Explicit,
    /// Backs a `UNIQUE` (or similar) constraint.
    Constraint,
    /// Backs the primary key. Never reported by the introspector.
    PrimaryKey,
}

/// One key part of one index, as a backend reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub index_name: String,
    /// Ordinal of the key part inside the index.
    pub position: i64,
    /// Set for plain column key parts.
    pub column_name: Option<String>,
    /// Raw expression text for computed key parts, when the backend has it.
    pub expression: Option<String>,
    pub unique: bool,
    /// Access method tag, when the backend reports one.
    pub index_type: Option<String>,
    pub origin: IndexOrigin,
}

/// A normalized index element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexElement {
    /// Lowercased column name.
    Column(String),
    /// Canonical expression text, comparable with [`crate::IndexExpr::canonical`].
    Expression(String),
    /// A computed key part whose text the backend did not expose.
    Unknown,
}

impl IndexElement {
    /// Canonical text, or `None` when it is unknown.
    pub fn canonical(&self) -> Option<&str> {
        match self {
            IndexElement::Column(name) | IndexElement::Expression(name) => Some(name),
            IndexElement::Unknown => None,
        }
    }

    pub fn is_column(&self) -> bool {
        matches!(self, IndexElement::Column(_))
    }
}

/// An index as it exists in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectedIndex {
    /// Name in declared case, for comparison.
    pub name: String,
    /// Name exactly as the catalog reported it, for DROP statements.
    pub catalog_name: String,
    pub elements: Vec<IndexElement>,
    pub unique: bool,
    pub index_type: Option<IndexType>,
    pub origin: IndexOrigin,
}

impl IntrospectedIndex {
    pub fn has_unknown_elements(&self) -> bool {
        self.elements.iter().any(|e| *e == IndexElement::Unknown)
    }
}

// ============================================================================
// Connection abstraction
// ============================================================================

/// The few primitives the planner needs from a database connection.
///
/// Implementations exist for sqlx connections behind the `postgres`,
/// `mysql` and `sqlite` features. Other backends can be driven by
/// implementing this trait directly.
pub trait SchemaConnection: Send {
    fn dialect(&self) -> Dialect;

    /// Raw index rows for `table`, in any order.
    fn fetch_index_rows<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Vec<IndexRow>, sqlx::Error>>;

    fn table_exists<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, std::result::Result<bool, sqlx::Error>>;

    /// Run one statement, returning the number of affected rows.
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, std::result::Result<u64, sqlx::Error>>;
}

impl<C: SchemaConnection + ?Sized> SchemaConnection for &mut C {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn fetch_index_rows<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Vec<IndexRow>, sqlx::Error>> {
        (**self).fetch_index_rows(table)
    }

    fn table_exists<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, std::result::Result<bool, sqlx::Error>> {
        (**self).table_exists(table)
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, std::result::Result<u64, sqlx::Error>> {
        (**self).execute(sql)
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Group catalog rows into indices.
///
/// Primary-key indices are dropped, key parts are ordered by position, names
/// are brought back to their declared case and type tags mapped onto
/// [`IndexType`]. The result is sorted by name.
pub fn normalize_rows(dialect: Dialect, rows: Vec<IndexRow>) -> Vec<IntrospectedIndex> {
    let caps = dialect.capabilities();

    let mut groups: HashMap<String, Vec<IndexRow>> = HashMap::new();
    for row in rows {
        if row.origin == IndexOrigin::PrimaryKey {
            continue;
        }
        groups.entry(row.index_name.clone()).or_default().push(row);
    }

    let mut indices: Vec<IntrospectedIndex> = groups
        .into_iter()
        .map(|(name, mut parts)| {
            parts.sort_by_key(|p| p.position);

            let elements = parts
                .iter()
                .map(|part| match (&part.expression, &part.column_name) {
                    (Some(expression), _) => {
                        IndexElement::Expression(canonical_expression(dialect, expression))
                    }
                    (None, Some(column)) => IndexElement::Column(column.to_lowercase()),
                    (None, None) => IndexElement::Unknown,
                })
                .collect();

            // Every row of an index carries the same flags.
            let first = &parts[0];
            IntrospectedIndex {
                name: caps.normalize_identifier(&name),
                catalog_name: name,
                elements,
                unique: first.unique,
                index_type: first.index_type.as_deref().map(IndexType::parse),
                origin: first.origin,
            }
        })
        .collect();

    indices.sort_by(|a, b| a.name.cmp(&b.name));
    indices
}

/// Canonical form of a catalog-reported expression.
///
/// Lowercases everything outside string literals, drops identifier quotes,
/// whitespace, `::type` casts and charset introducers (`_utf8mb4'...'`), and
/// removes redundant parentheses. `coalesce(item, '*'::character varying)`
/// and ``coalesce(`item`,_utf8mb4\'*\')`` both become `coalesce(item,'*')`.
///
/// Backslash-escaped quotes are only unescaped for dialects whose catalog
/// writes them that way; elsewhere a backslash is an ordinary character.
pub fn canonical_expression(dialect: Dialect, raw: &str) -> String {
    let text = if dialect.capabilities().backslash_escapes {
        raw.replace("\\'", "'")
    } else {
        raw.to_string()
    };
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut in_literal = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_literal {
            out.push(c);
            if c == '\'' {
                in_literal = false;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' => {
                in_literal = true;
                out.push(c);
                i += 1;
            }
            '"' | '`' | '[' | ']' => i += 1,
            c if c.is_whitespace() => i += 1,
            ':' if chars.get(i + 1) == Some(&':') => {
                i += 2;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | ' ' | '[' | ']' | '"'))
                {
                    i += 1;
                }
            }
            '_' if !out.ends_with(|p: char| p.is_alphanumeric() || p == '_') => {
                // A charset introducer is `_name` glued to a literal.
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                if chars.get(j) == Some(&'\'') {
                    i = j;
                } else {
                    out.push('_');
                    i += 1;
                }
            }
            c => {
                out.extend(c.to_lowercase());
                i += 1;
            }
        }
    }

    strip_redundant_parens(out)
}

/// Remove parentheses around the whole text and around single atoms
/// (`lower((name))` becomes `lower(name)`).
fn strip_redundant_parens(mut text: String) -> String {
    loop {
        let chars: Vec<char> = text.chars().collect();
        let mut changed = false;

        if chars.first() == Some(&'(') && closing_paren(&chars, 0) == Some(chars.len() - 1) {
            text = chars[1..chars.len() - 1].iter().collect();
            continue;
        }

        for open in 0..chars.len() {
            if chars[open] != '(' {
                continue;
            }
            let is_call = open > 0 && (chars[open - 1].is_alphanumeric() || chars[open - 1] == '_');
            if is_call {
                continue;
            }
            let Some(close) = closing_paren(&chars, open) else {
                continue;
            };
            let inner = &chars[open + 1..close];
            let atom = !inner.is_empty()
                && inner
                    .iter()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '\'' | '*'));
            if atom {
                let mut rebuilt: String = chars[..open].iter().collect();
                rebuilt.extend(inner.iter());
                rebuilt.extend(chars[close + 1..].iter());
                text = rebuilt;
                changed = true;
                break;
            }
        }

        if !changed {
            return text;
        }
    }
}

/// Index of the parenthesis closing the one at `open`, skipping literals.
fn closing_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_literal = false;
    for (i, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// Introspector
// ============================================================================

/// Memoizing index reader.
///
/// The cache belongs to whoever owns the introspector, normally a
/// [`crate::SchemaSession`]. It is never shared between connections.
#[derive(Debug, Default)]
pub struct SchemaIntrospector {
    indices: HashMap<String, Vec<IntrospectedIndex>>,
    tables: HashMap<String, bool>,
}

impl SchemaIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-primary-key indices of `table`, served from cache when possible.
    pub async fn list_indices<C>(&mut self, conn: &mut C, table: &str) -> Result<Vec<IntrospectedIndex>>
    where
        C: SchemaConnection + ?Sized,
    {
        if let Some(cached) = self.indices.get(table) {
            tracing::debug!(table, count = cached.len(), "index cache hit");
            return Ok(cached.clone());
        }

        let rows = conn
            .fetch_index_rows(table)
            .await
            .map_err(|source| MigrationError::IntrospectionFailure {
                table: table.to_string(),
                source,
            })?;
        let indices = normalize_rows(conn.dialect(), rows);
        tracing::debug!(table, count = indices.len(), "introspected indices");

        self.indices.insert(table.to_string(), indices.clone());
        Ok(indices)
    }

    pub async fn table_exists<C>(&mut self, conn: &mut C, table: &str) -> Result<bool>
    where
        C: SchemaConnection + ?Sized,
    {
        if let Some(&exists) = self.tables.get(table) {
            return Ok(exists);
        }
        let exists = conn
            .table_exists(table)
            .await
            .map_err(|source| MigrationError::IntrospectionFailure {
                table: table.to_string(),
                source,
            })?;
        self.tables.insert(table.to_string(), exists);
        Ok(exists)
    }

    /// Forget everything. Required after DDL run outside the session.
    pub fn reset_caches(&mut self) {
        self.indices.clear();
        self.tables.clear();
    }

    pub fn invalidate(&mut self, table: &str) {
        self.indices.remove(table);
        self.tables.remove(table);
    }

    pub fn is_cached(&self, table: &str) -> bool {
        self.indices.contains_key(table)
    }
}
