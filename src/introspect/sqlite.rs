//! SQLite catalog access through the `pragma_index_*` table functions.

use futures::future::{BoxFuture, FutureExt};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Executor, Row};
use tracing::Instrument;

use super::{IndexOrigin, IndexRow, SchemaConnection};
use crate::dialect::Dialect;

// Expression key parts come back from pragma_index_info with a NULL name;
// their text is only available in the CREATE INDEX statement itself.
const INDEX_ROWS_SQL: &str = r#"
    SELECT
        il.name AS index_name,
        ii.seqno AS position,
        ii.name AS column_name,
        il."unique" AS is_unique,
        il.origin AS origin,
        m.sql AS index_sql
    FROM pragma_index_list(?1) AS il
    JOIN pragma_index_info(il.name) AS ii
    LEFT JOIN sqlite_master AS m ON m.type = 'index' AND m.name = il.name
    ORDER BY il.name, ii.seqno
"#;

const TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1";

/// Characters of `sql` that sit outside quoted identifiers and literals,
/// with their byte offsets.
fn unquoted(sql: &str) -> Vec<(usize, char)> {
    let mut quote: Option<char> = None;
    sql.char_indices()
        .filter(|&(_, c)| {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                return false;
            }
            match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    false
                }
                '[' => {
                    quote = Some(']');
                    false
                }
                _ => true,
            }
        })
        .collect()
}

/// Byte offset just past the `ON` keyword that introduces the table.
fn on_keyword_end(sql: &str, chars: &[(usize, char)]) -> Option<usize> {
    let bytes = sql.as_bytes();
    let boundary = |at: Option<usize>, quotes: &[u8]| {
        at.and_then(|i| bytes.get(i))
            .map_or(false, |&b| b.is_ascii_whitespace() || quotes.contains(&b))
    };
    chars.windows(2).find_map(|pair| {
        let [(o_at, o), (n_at, n)] = [pair[0], pair[1]];
        let keyword = o.eq_ignore_ascii_case(&'o') && n.eq_ignore_ascii_case(&'n') && n_at == o_at + 1;
        let bounded = boundary(o_at.checked_sub(1), &b"\"`]"[..]) && boundary(Some(n_at + 1), &b"\"`["[..]);
        (keyword && bounded).then_some(n_at + 1)
    })
}

/// Top-level elements of the column list in a `CREATE INDEX` statement.
///
/// Sort order keywords are dropped; a trailing `WHERE` clause is ignored.
/// Quoted names may contain ` on ` or parentheses without confusing the
/// search for the column list.
pub(crate) fn index_sql_elements(sql: &str) -> Vec<String> {
    let chars = unquoted(sql);
    let Some(on_end) = on_keyword_end(sql, &chars) else {
        return Vec::new();
    };
    let Some(open) = chars.iter().find(|&&(at, c)| at >= on_end && c == '(').map(|&(at, _)| at) else {
        return Vec::new();
    };

    let mut elements = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in sql[open + 1..].chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '[' => {
                quote = Some(']');
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' if depth == 0 => {
                elements.push(current);
                return elements.into_iter().map(|e| strip_sort_order(&e)).collect();
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => elements.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    Vec::new()
}

fn strip_sort_order(element: &str) -> String {
    let trimmed = element.trim();
    let upper = trimmed.to_ascii_uppercase();
    for suffix in [" ASC", " DESC"] {
        if upper.ends_with(suffix) {
            return trimmed[..trimmed.len() - suffix.len()].trim_end().to_string();
        }
    }
    trimmed.to_string()
}

fn index_row(row: &SqliteRow) -> Result<IndexRow, sqlx::Error> {
    let origin = match row.try_get::<String, _>("origin")?.as_str() {
        "pk" => IndexOrigin::PrimaryKey,
        "u" => IndexOrigin::Constraint,
        _ => IndexOrigin::Explicit,
    };
    let position: i64 = row.try_get("position")?;
    let column_name: Option<String> = row.try_get("column_name")?;

    let expression = match column_name {
        Some(_) => None,
        None => row
            .try_get::<Option<String>, _>("index_sql")?
            .and_then(|sql| index_sql_elements(&sql).into_iter().nth(position as usize)),
    };

    Ok(IndexRow {
        index_name: row.try_get("index_name")?,
        position,
        column_name,
        expression,
        unique: row.try_get::<i64, _>("is_unique")? != 0,
        index_type: None,
        origin,
    })
}

/// [`SchemaConnection`] over a borrowed SQLite connection.
pub struct SqliteSchemaConnection<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqliteSchemaConnection<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }
}

impl SchemaConnection for SqliteSchemaConnection<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn fetch_index_rows<'a>(
        &'a mut self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Vec<IndexRow>, sqlx::Error>> {
        async move {
            let span = tracing::debug_span!("sqlite.index_rows", table, rows = tracing::field::Empty);
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
            let span = tracing::debug_span!("sqlite.execute", sql = %sql, affected = tracing::field::Empty);
            let result = Executor::execute(&mut *self.conn, sql)
                .instrument(span.clone())
                .await?;
            span.record("affected", result.rows_affected());
            Ok(result.rows_affected())
        }
        .boxed()
    }
}
