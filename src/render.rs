//! Statement rendering.
//!
//! Turns an abstract [`Intent`] into SQL text for one dialect. Pure: no I/O,
//! no state besides the dialect.

use crate::dialect::{
    AutoIncrementStyle, Capabilities, ConstraintDrop, Dialect, DropIndexStyle,
};
use crate::error::{Feature, MigrationError, Result};
use crate::schema::{Column, ColumnType, IndexExpr, IndexSpec, IndexType, Literal, TableDef};

/// Something the planner wants the database to do.
#[derive(Debug, Clone, Copy)]
pub enum Intent<'a> {
    CreateIndex { table: &'a str, index: &'a IndexSpec },
    DropIndex { table: &'a str, name: &'a str },
    /// Drop the constraint that owns an index.
    DropConstraint { table: &'a str, name: &'a str },
    CreateTable(&'a TableDef),
    DropTable(&'a str),
}

/// Renders intents for a single dialect.
#[derive(Debug, Clone, Copy)]
pub struct StatementRenderer {
    dialect: Dialect,
}

impl StatementRenderer {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn caps(&self) -> &'static Capabilities {
        self.dialect.capabilities()
    }

    pub fn render(&self, intent: &Intent<'_>) -> Result<String> {
        match *intent {
            Intent::CreateIndex { table, index } => self.create_index_sql(table, index),
            Intent::DropIndex { table, name } => Ok(self.drop_index_sql(table, name)),
            Intent::DropConstraint { table, name } => {
                self.drop_constraint_sql(table, name).ok_or_else(|| {
                    MigrationError::invalid(
                        table,
                        format!("{} cannot drop constraint `{}` in place", self.dialect, name),
                    )
                })
            }
            Intent::CreateTable(table) => self.create_table_sql(table),
            Intent::DropTable(table) => Ok(self.drop_table_sql(table)),
        }
    }

    /// Fail when the dialect cannot express `index`.
    pub fn check_supported(&self, table: &str, index: &IndexSpec) -> Result<()> {
        let caps = self.caps();
        let unsupported = |feature| MigrationError::UnsupportedFeature {
            dialect: self.dialect,
            feature,
            table: table.to_string(),
            index: index.name.clone(),
        };

        if index.has_functions() && !caps.supports_functional_index() {
            return Err(unsupported(Feature::FunctionalIndex));
        }
        if let Some(index_type) = &index.index_type {
            let tag = index_type.tag().to_string();
            if !caps.supports_index_type(index_type) {
                return Err(unsupported(Feature::IndexType(tag)));
            }
            if *index_type == IndexType::Hash {
                if index.unique && !caps.hash_unique {
                    return Err(unsupported(Feature::UniqueIndexType(tag)));
                }
                if index.elements.len() > 1 && !caps.hash_multicolumn {
                    return Err(unsupported(Feature::MultiColumnIndexType(tag)));
                }
            }
        }
        Ok(())
    }

    /// Generate CREATE INDEX SQL
    pub fn create_index_sql(&self, table: &str, index: &IndexSpec) -> Result<String> {
        self.check_supported(table, index)?;
        let caps = self.caps();

        let unique = if index.unique { "UNIQUE " } else { "" };
        let name = caps.quote_identifier(caps.truncate_identifier(&index.name));
        let table_sql = caps.quote_identifier(table);
        let elements: Vec<String> = index.elements.iter().map(|e| self.element_sql(e)).collect();
        let elements = elements.join(", ");

        // btree is everyone's default; only spell out the others.
        let method = index
            .index_type
            .as_ref()
            .filter(|t| **t != IndexType::BTree);

        let sql = match (self.dialect, method) {
            (Dialect::PostgreSql, Some(method)) => format!(
                "CREATE {}INDEX {} ON {} USING {} ({})",
                unique, name, table_sql, method.tag(), elements
            ),
            (Dialect::MySql8 | Dialect::MySql5 | Dialect::MariaDb, Some(method)) => format!(
                "CREATE {}INDEX {} USING {} ON {} ({})",
                unique, name, method.tag(), table_sql, elements
            ),
            _ => format!("CREATE {}INDEX {} ON {} ({})", unique, name, table_sql, elements),
        };
        Ok(sql)
    }

    /// Generate DROP INDEX SQL for a declared index name
    pub fn drop_index_sql(&self, table: &str, name: &str) -> String {
        let caps = self.caps();
        self.drop_quoted_index_sql(table, caps.quote_identifier(caps.truncate_identifier(name)))
    }

    /// DROP INDEX for a name as the catalog reported it.
    ///
    /// The name is quoted whenever the backend would fold it, so
    /// `"LegacyIdx"` on PostgreSQL is not turned into `legacyidx`.
    pub fn drop_catalog_index_sql(&self, table: &str, catalog_name: &str) -> String {
        let caps = self.caps();
        self.drop_quoted_index_sql(table, caps.quote_catalog_identifier(catalog_name))
    }

    fn drop_quoted_index_sql(&self, table: &str, name: String) -> String {
        let caps = self.caps();
        let if_exists = if caps.drop_index_if_exists { "IF EXISTS " } else { "" };
        match caps.drop_index_style {
            DropIndexStyle::Standalone => format!("DROP INDEX {}{}", if_exists, name),
            DropIndexStyle::OnTable => format!(
                "DROP INDEX {}{} ON {}",
                if_exists,
                name,
                caps.quote_identifier(table)
            ),
        }
    }

    /// SQL removing a constraint-backed index, if the dialect has any.
    ///
    /// Constraint names only ever come from the catalog, so `name` is quoted
    /// exactly as given.
    pub fn drop_constraint_sql(&self, table: &str, name: &str) -> Option<String> {
        let caps = self.caps();
        match caps.constraint_drop {
            ConstraintDrop::AlterTable => Some(format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                caps.quote_identifier(table),
                caps.quote_catalog_identifier(name)
            )),
            ConstraintDrop::AsIndex => Some(self.drop_catalog_index_sql(table, name)),
            ConstraintDrop::Unsupported => None,
        }
    }

    /// Generate CREATE TABLE SQL
    pub fn create_table_sql(&self, table: &TableDef) -> Result<String> {
        table.validate()?;
        let caps = self.caps();

        let pk: &[String] = table.primary_key.as_deref().unwrap_or(&[]);
        let inline_pk = match caps.auto_increment {
            AutoIncrementStyle::InlinePrimaryKey => table
                .columns
                .iter()
                .find(|c| c.auto_increment && pk.len() == 1 && c.name.eq_ignore_ascii_case(&pk[0])),
            _ => None,
        };

        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|column| self.column_definition(column, inline_pk.is_some_and(|c| c == column)))
            .collect();

        if !pk.is_empty() && inline_pk.is_none() {
            let cols: Vec<String> = pk.iter().map(|c| caps.quote_identifier(c)).collect();
            let constraint = format!("pk_{}", table.name);
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                caps.quote_identifier(caps.truncate_identifier(&constraint)),
                cols.join(", ")
            ));
        }

        let if_not_exists = if caps.create_table_if_not_exists { "IF NOT EXISTS " } else { "" };
        Ok(format!(
            "CREATE TABLE {}{} ({})",
            if_not_exists,
            caps.quote_identifier(&table.name),
            parts.join(", ")
        ))
    }

    /// Generate DROP TABLE SQL
    pub fn drop_table_sql(&self, table: &str) -> String {
        let caps = self.caps();
        match self.dialect {
            Dialect::Oracle | Dialect::SqlServer => {
                format!("DROP TABLE {}", caps.quote_identifier(table))
            }
            _ => format!("DROP TABLE IF EXISTS {}", caps.quote_identifier(table)),
        }
    }

    fn column_definition(&self, column: &Column, inline_pk: bool) -> String {
        let caps = self.caps();
        let name = caps.quote_identifier(&column.name);

        if inline_pk {
            return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name);
        }

        let mut def = match (caps.auto_increment, column.auto_increment, &column.column_type) {
            (AutoIncrementStyle::SerialType, true, ColumnType::BigInt) => {
                format!("{} BIGSERIAL", name)
            }
            (AutoIncrementStyle::SerialType, true, _) => format!("{} SERIAL", name),
            (AutoIncrementStyle::Suffix(suffix), true, ty) => {
                format!("{} {} {}", name, self.column_type_sql(ty), suffix)
            }
            (_, _, ty) => format!("{} {}", name, self.column_type_sql(ty)),
        };

        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        def
    }

    /// Column type in this dialect's vocabulary.
    pub fn column_type_sql(&self, column_type: &ColumnType) -> String {
        let d = self.dialect;
        match column_type {
            ColumnType::Integer => match d {
                Dialect::Oracle => "NUMBER(10)".to_string(),
                Dialect::PostgreSql | Dialect::Sqlite => "INTEGER".to_string(),
                _ => "INT".to_string(),
            },
            ColumnType::BigInt => match d {
                Dialect::Oracle => "NUMBER(19)".to_string(),
                _ => "BIGINT".to_string(),
            },
            ColumnType::Varchar(length) => match d {
                Dialect::Oracle => format!("VARCHAR2({} CHAR)", length),
                _ => format!("VARCHAR({})", length),
            },
            ColumnType::Text => match d {
                Dialect::Oracle | Dialect::H2 => "CLOB".to_string(),
                Dialect::SqlServer => "NVARCHAR(MAX)".to_string(),
                _ => "TEXT".to_string(),
            },
            ColumnType::Boolean => match d {
                Dialect::Oracle => "NUMBER(1)".to_string(),
                Dialect::SqlServer => "BIT".to_string(),
                _ => "BOOLEAN".to_string(),
            },
            ColumnType::Decimal { precision, scale } => match d {
                Dialect::Oracle => format!("NUMBER({}, {})", precision, scale),
                _ => format!("DECIMAL({}, {})", precision, scale),
            },
            ColumnType::Custom(sql) => sql.clone(),
        }
    }

    /// A top-level index element. Computed key parts get wrapped where the
    /// dialect insists on it.
    fn element_sql(&self, element: &IndexExpr) -> String {
        let sql = self.expression_sql(element);
        if !element.is_column() && self.caps().wrap_expressions {
            format!("({})", sql)
        } else {
            sql
        }
    }

    /// Render an expression tree.
    pub fn expression_sql(&self, expr: &IndexExpr) -> String {
        let caps = self.caps();
        match expr {
            IndexExpr::Column(name) => caps.quote_identifier(name),
            IndexExpr::Literal(Literal::String(value)) => {
                let mut escaped = value.replace('\'', "''");
                if caps.backslash_escapes {
                    escaped = escaped.replace('\\', "\\\\");
                }
                format!("'{}'", escaped)
            }
            IndexExpr::Literal(Literal::Integer(value)) => value.to_string(),
            IndexExpr::Literal(Literal::Null) => "NULL".to_string(),
            IndexExpr::Function { name, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expression_sql(a)).collect();
                format!("{}({})", name.to_uppercase(), args.join(", "))
            }
        }
    }
}
