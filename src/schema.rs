//! Declarative table definitions.
//!
//! These types describe what the schema *should* look like. The planner only
//! reads them.
//!
//! ```ignore
//! let table = TableDef::new("test_table")
//!     .column(Column::integer("id"))
//!     .column(Column::varchar("name", 42))
//!     .primary_key(["id"])
//!     .index(Some("test_table_by_name"), false, ["name"]);
//! ```

use std::collections::HashSet;

use crate::error::{MigrationError, Result};

/// Declared SQL type of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInt,
    Varchar(u32),
    Text,
    Boolean,
    Decimal { precision: u32, scale: u32 },
    /// Passed through verbatim on every dialect.
    Custom(String),
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub auto_increment: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            auto_increment: false,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn big_integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::BigInt)
    }

    pub fn varchar(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, ColumnType::Varchar(length))
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn decimal(name: impl Into<String>, precision: u32, scale: u32) -> Self {
        Self::new(name, ColumnType::Decimal { precision, scale })
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// Literal value inside an index expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Null,
}

/// One element of an index: a column or a computed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexExpr {
    Column(String),
    Literal(Literal),
    Function { name: String, args: Vec<IndexExpr> },
}

impl IndexExpr {
    pub fn column(name: impl Into<String>) -> Self {
        IndexExpr::Column(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        IndexExpr::Literal(Literal::String(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        IndexExpr::Literal(Literal::Integer(value))
    }

    pub fn null() -> Self {
        IndexExpr::Literal(Literal::Null)
    }

    pub fn function(name: impl Into<String>, args: Vec<IndexExpr>) -> Self {
        IndexExpr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn coalesce(value: IndexExpr, fallback: IndexExpr) -> Self {
        Self::function("COALESCE", vec![value, fallback])
    }

    pub fn lower(value: IndexExpr) -> Self {
        Self::function("LOWER", vec![value])
    }

    pub fn upper(value: IndexExpr) -> Self {
        Self::function("UPPER", vec![value])
    }

    pub fn as_column(&self) -> Option<&str> {
        match self {
            IndexExpr::Column(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_column(&self) -> bool {
        matches!(self, IndexExpr::Column(_))
    }

    /// Columns referenced anywhere in the expression tree.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            IndexExpr::Column(name) => out.push(name),
            IndexExpr::Literal(_) => {}
            IndexExpr::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// Dialect-neutral form used for structural comparison:
    /// lowercase, unquoted, no whitespace.
    pub fn canonical(&self) -> String {
        match self {
            IndexExpr::Column(name) => name.to_lowercase(),
            IndexExpr::Literal(Literal::String(value)) => {
                format!("'{}'", value.replace('\'', "''"))
            }
            IndexExpr::Literal(Literal::Integer(value)) => value.to_string(),
            IndexExpr::Literal(Literal::Null) => "null".to_string(),
            IndexExpr::Function { name, args } => {
                let args: Vec<String> = args.iter().map(IndexExpr::canonical).collect();
                format!("{}({})", name.to_lowercase(), args.join(","))
            }
        }
    }
}

impl From<&str> for IndexExpr {
    fn from(name: &str) -> Self {
        IndexExpr::Column(name.to_string())
    }
}

impl From<String> for IndexExpr {
    fn from(name: String) -> Self {
        IndexExpr::Column(name)
    }
}

/// Index access method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexType {
    BTree,
    Hash,
    /// Any other method, stored uppercase (`GIN`, `GIST`, ...).
    Other(String),
}

impl IndexType {
    /// Map a catalog or user supplied tag onto the canonical vocabulary.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "btree" | "b-tree" | "" => IndexType::BTree,
            "hash" => IndexType::Hash,
            other => IndexType::Other(other.to_ascii_uppercase()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            IndexType::BTree => "BTREE",
            IndexType::Hash => "HASH",
            IndexType::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// An index declaration before it is attached to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDecl {
    name: Option<String>,
    elements: Vec<IndexExpr>,
    unique: bool,
    index_type: Option<IndexType>,
}

impl IndexDecl {
    /// Index over plain columns.
    pub fn on<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            elements: columns.into_iter().map(|c| IndexExpr::Column(c.into())).collect(),
            unique: false,
            index_type: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn using(mut self, index_type: IndexType) -> Self {
        self.index_type = Some(index_type);
        self
    }

    /// Append a computed element after the columns.
    pub fn function(mut self, expr: IndexExpr) -> Self {
        self.elements.push(expr);
        self
    }
}

/// Index definition, attached to a table and named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Declared or derived name, before any dialect length cap.
    pub name: String,
    pub elements: Vec<IndexExpr>,
    pub unique: bool,
    pub index_type: Option<IndexType>,
}

impl IndexSpec {
    pub fn has_functions(&self) -> bool {
        self.elements.iter().any(|e| !e.is_column())
    }

    /// The declared type, or btree when none was given.
    pub fn effective_type(&self) -> IndexType {
        self.index_type.clone().unwrap_or(IndexType::BTree)
    }

    pub fn canonical_elements(&self) -> Vec<String> {
        self.elements.iter().map(IndexExpr::canonical).collect()
    }
}

/// Deterministic index name: `{table}_{elements}[_unique]`.
///
/// Columns contribute their name, functions their lowercased function name.
pub fn derive_index_name(table: &str, elements: &[IndexExpr], unique: bool) -> String {
    let mut parts = Vec::new();
    for element in elements {
        match element {
            IndexExpr::Column(name) => parts.push(name.clone()),
            IndexExpr::Function { name, .. } => parts.push(name.to_lowercase()),
            IndexExpr::Literal(_) => {}
        }
    }
    let mut name = format!("{}_{}", table, parts.join("_"));
    if unique {
        name.push_str("_unique");
    }
    name
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<Vec<String>>,
    pub indices: Vec<IndexSpec>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            indices: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Declare a plain index. `name` falls back to the derived name.
    pub fn index<I, S>(self, name: Option<&str>, unique: bool, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut decl = IndexDecl::on(columns);
        if let Some(name) = name {
            decl = decl.named(name);
        }
        if unique {
            decl = decl.unique();
        }
        self.declare(decl)
    }

    /// Declare a unique index with a derived name.
    pub fn unique_index<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declare(IndexDecl::on(columns).unique())
    }

    /// Attach a full declaration, resolving its name.
    pub fn declare(mut self, decl: IndexDecl) -> Self {
        let name = decl
            .name
            .unwrap_or_else(|| derive_index_name(&self.name, &decl.elements, decl.unique));
        self.indices.push(IndexSpec {
            name,
            elements: decl.elements,
            unique: decl.unique,
            index_type: decl.index_type,
        });
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check that primary key and indices only reference declared columns.
    ///
    /// Duplicate index names are not detected.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.to_lowercase()) {
                return Err(MigrationError::invalid(
                    &self.name,
                    format!("column `{}` is declared twice", column.name),
                ));
            }
        }

        if let Some(pk) = &self.primary_key {
            if pk.is_empty() {
                return Err(MigrationError::invalid(&self.name, "empty primary key"));
            }
            if let Some(missing) = pk.iter().find(|c| self.find_column(c).is_none()) {
                return Err(MigrationError::invalid(
                    &self.name,
                    format!("primary key references unknown column `{}`", missing),
                ));
            }
        }

        for index in &self.indices {
            if index.elements.is_empty() {
                return Err(MigrationError::invalid(
                    &self.name,
                    format!("index `{}` has no elements", index.name),
                ));
            }
            for element in &index.elements {
                if let Some(missing) = element
                    .referenced_columns()
                    .into_iter()
                    .find(|c| self.find_column(c).is_none())
                {
                    return Err(MigrationError::invalid(
                        &self.name,
                        format!("index `{}` references unknown column `{}`", index.name, missing),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_table() -> TableDef {
        TableDef::new("test_table")
            .column(Column::integer("id"))
            .column(Column::varchar("name", 42))
            .primary_key(["id"])
    }

    #[test]
    fn test_explicit_index_name() {
        let table = test_table().index(Some("test_table_by_name"), false, ["name"]);
        let index = &table.indices[0];
        assert_eq!(index.name, "test_table_by_name");
        assert_eq!(index.elements, vec![IndexExpr::column("name")]);
        assert!(!index.unique);
        assert_eq!(index.effective_type(), IndexType::BTree);
    }

    #[test]
    fn test_derived_index_names() {
        let table = test_table().index(None, false, ["id", "name"]).unique_index(["name"]);
        assert_eq!(table.indices[0].name, "test_table_id_name");
        assert_eq!(table.indices[1].name, "test_table_name_unique");
    }

    #[test]
    fn test_functional_declaration() {
        let table = TableDef::new("test_table")
            .column(Column::integer("id").auto_increment())
            .column(Column::integer("price"))
            .column(Column::varchar("item", 32).nullable())
            .primary_key(["id"])
            .declare(
                IndexDecl::on(["price"])
                    .unique()
                    .function(IndexExpr::coalesce(IndexExpr::column("item"), IndexExpr::string("*"))),
            );
        let index = &table.indices[0];
        assert_eq!(index.name, "test_table_price_coalesce_unique");
        assert!(index.has_functions());
        assert_eq!(index.canonical_elements(), vec!["price", "coalesce(item,'*')"]);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_canonical_escapes_quotes() {
        let expr = IndexExpr::coalesce(IndexExpr::column("Item"), IndexExpr::string("it's"));
        assert_eq!(expr.canonical(), "coalesce(item,'it''s')");
    }

    #[test]
    fn test_validate_rejects_unknown_columns() {
        let table = test_table().index(None, false, ["missing"]);
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("unknown column `missing`"));

        let table = test_table().declare(
            IndexDecl::on(Vec::<String>::new()).function(IndexExpr::lower(IndexExpr::column("nope"))),
        );
        assert!(table.validate().is_err());

        let table = TableDef::new("t").column(Column::integer("id")).primary_key(["other"]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_index_type_parse() {
        assert_eq!(IndexType::parse("btree"), IndexType::BTree);
        assert_eq!(IndexType::parse("HASH"), IndexType::Hash);
        assert_eq!(IndexType::parse("gin"), IndexType::Other("GIN".to_string()));
    }
}
