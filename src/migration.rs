//! Migration planning.
//!
//! Compares declared tables with what the database reports and produces the
//! ordered DDL needed to bring the indices in line. Planning never touches
//! the schema; run the result through [`SchemaSession::execute_all`].

use crate::compare::IndexComparator;
use crate::dialect::Dialect;
use crate::error::{MigrationError, Result};
use crate::introspect::{IndexOrigin, IntrospectedIndex, SchemaConnection};
use crate::render::StatementRenderer;
use crate::schema::{IndexSpec, TableDef};
use crate::session::SchemaSession;

// ============================================================================
// Core Types
// ============================================================================

/// What a statement does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable,
    DropTable,
    CreateIndex,
    DropIndex,
    /// Drop of a constraint that owns an index.
    DropConstraint,
}

/// One rendered DDL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatement {
    pub sql: String,
    pub kind: StatementKind,
    pub table: String,
    /// The index the statement concerns, if any.
    pub index: Option<String>,
}

impl std::fmt::Display for MigrationStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

/// What to do with a declared index the dialect cannot express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsupportedPolicy {
    /// Leave it out and log a warning.
    #[default]
    Skip,
    /// Abort planning with [`MigrationError::UnsupportedFeature`].
    Fail,
}

/// What to do when an index with the declared name exists but differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Keep the existing index.
    Ignore,
    /// Drop and recreate when at least one difference is confirmed by the
    /// catalog.
    #[default]
    RecreateConfirmed,
    /// Drop and recreate on any reported difference.
    RecreateAll,
}

/// Planner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOptions {
    pub drop_undeclared: bool,
    pub on_unsupported: UnsupportedPolicy,
    pub mismatch: MismatchPolicy,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            drop_undeclared: true,
            on_unsupported: UnsupportedPolicy::Skip,
            mismatch: MismatchPolicy::RecreateConfirmed,
        }
    }
}

impl MigrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop indices present in the database but not declared.
    pub fn drop_undeclared(mut self, enabled: bool) -> Self {
        self.drop_undeclared = enabled;
        self
    }

    pub fn on_unsupported(mut self, policy: UnsupportedPolicy) -> Self {
        self.on_unsupported = policy;
        self
    }

    pub fn mismatch(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch = policy;
        self
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Generates the statements that reconcile declared and actual indices
#[derive(Debug, Clone, Default)]
pub struct MigrationPlanner {
    options: MigrationOptions,
}

impl MigrationPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MigrationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Statements needed to bring `tables` in line with the database behind
    /// `session`, in caller order.
    ///
    /// Running the result and planning again yields nothing.
    pub async fn statements_required_for_database_migration<'t, C, I>(
        &self,
        session: &mut SchemaSession<C>,
        tables: I,
    ) -> Result<Vec<MigrationStatement>>
    where
        C: SchemaConnection,
        I: IntoIterator<Item = &'t TableDef>,
    {
        let dialect = session.dialect();
        let mut statements = Vec::new();

        for table in tables {
            table.validate()?;
            let exists = session.table_exists(&table.name).await?;
            let actual = if exists {
                session.existing_indices(&table.name).await?
            } else {
                Vec::new()
            };
            statements.extend(self.plan_table(dialect, table, exists, &actual)?);
        }

        tracing::info!(%dialect, count = statements.len(), "planned migration statements");
        Ok(statements)
    }

    /// Plan one table against already introspected indices.
    pub fn plan_table(
        &self,
        dialect: Dialect,
        table: &TableDef,
        exists: bool,
        actual: &[IntrospectedIndex],
    ) -> Result<Vec<MigrationStatement>> {
        if !exists {
            tracing::debug!(table = %table.name, "table missing, creating");
            return self.create_table_statements(dialect, table);
        }

        let renderer = StatementRenderer::new(dialect);
        let comparator = IndexComparator::new(dialect);
        let declared = self.supported_indices(&renderer, table)?;

        let mut claimed = vec![false; actual.len()];
        let mut paired: Vec<Option<usize>> = vec![None; declared.len()];

        // Names win over structure.
        for (i, spec) in declared.iter().enumerate() {
            let found = (0..actual.len()).find(|&j| !claimed[j] && comparator.names_match(spec, &actual[j]));
            if let Some(j) = found {
                claimed[j] = true;
                paired[i] = Some(j);
            }
        }

        let mut drops = Vec::new();
        let mut creates = Vec::new();

        for (i, spec) in declared.iter().enumerate() {
            match paired[i] {
                Some(j) => {
                    let existing = &actual[j];
                    let diffs = comparator.differences(spec, existing);
                    let recreate = match self.options.mismatch {
                        MismatchPolicy::Ignore => false,
                        MismatchPolicy::RecreateConfirmed => diffs.iter().any(|d| d.confirmed),
                        MismatchPolicy::RecreateAll => !diffs.is_empty(),
                    };
                    if recreate {
                        tracing::info!(table = %table.name, index = %spec.name, ?diffs, "recreating index");
                        match self.drop_existing(&renderer, &table.name, existing) {
                            Some(drop) => {
                                drops.push(drop);
                                creates.push(self.create_statement(&renderer, &table.name, spec)?);
                            }
                            None => tracing::warn!(
                                table = %table.name,
                                index = %existing.name,
                                "cannot drop constraint index, keeping it"
                            ),
                        }
                    } else if !diffs.is_empty() {
                        tracing::debug!(table = %table.name, index = %spec.name, ?diffs, "keeping index");
                    }
                }
                None => {
                    let found = (0..actual.len())
                        .find(|&j| !claimed[j] && comparator.structurally_equal(spec, &actual[j]));
                    match found {
                        Some(j) => {
                            claimed[j] = true;
                            tracing::debug!(
                                table = %table.name,
                                declared = %spec.name,
                                actual = %actual[j].name,
                                "index exists under another name"
                            );
                        }
                        None => creates.push(self.create_statement(&renderer, &table.name, spec)?),
                    }
                }
            }
        }

        if self.options.drop_undeclared {
            for (j, existing) in actual.iter().enumerate() {
                if claimed[j] {
                    continue;
                }
                match self.drop_existing(&renderer, &table.name, existing) {
                    Some(drop) => drops.push(drop),
                    None => tracing::warn!(
                        table = %table.name,
                        index = %existing.name,
                        "undeclared constraint index cannot be dropped"
                    ),
                }
            }
        }

        tracing::debug!(table = %table.name, drops = drops.len(), creates = creates.len(), "planned table");
        drops.extend(creates);
        Ok(drops)
    }

    /// `CREATE TABLE` followed by every supported declared index.
    pub fn create_table_statements(&self, dialect: Dialect, table: &TableDef) -> Result<Vec<MigrationStatement>> {
        let renderer = StatementRenderer::new(dialect);
        let mut statements = vec![MigrationStatement {
            sql: renderer.create_table_sql(table)?,
            kind: StatementKind::CreateTable,
            table: table.name.clone(),
            index: None,
        }];
        for spec in self.supported_indices(&renderer, table)? {
            statements.push(self.create_statement(&renderer, &table.name, spec)?);
        }
        Ok(statements)
    }

    pub fn drop_table_statement(&self, dialect: Dialect, table: &str) -> MigrationStatement {
        MigrationStatement {
            sql: StatementRenderer::new(dialect).drop_table_sql(table),
            kind: StatementKind::DropTable,
            table: table.to_string(),
            index: None,
        }
    }

    /// Statements creating one declared index; empty when it is skipped as
    /// unsupported.
    pub fn create_statements(
        &self,
        dialect: Dialect,
        table: &TableDef,
        spec: &IndexSpec,
    ) -> Result<Vec<MigrationStatement>> {
        let renderer = StatementRenderer::new(dialect);
        if !self.is_supported(&renderer, &table.name, spec)? {
            return Ok(Vec::new());
        }
        Ok(vec![self.create_statement(&renderer, &table.name, spec)?])
    }

    /// Statements dropping one declared index.
    pub fn drop_statements(&self, dialect: Dialect, table: &TableDef, spec: &IndexSpec) -> Vec<MigrationStatement> {
        let renderer = StatementRenderer::new(dialect);
        vec![MigrationStatement {
            sql: renderer.drop_index_sql(&table.name, &spec.name),
            kind: StatementKind::DropIndex,
            table: table.name.clone(),
            index: Some(spec.name.clone()),
        }]
    }

    fn supported_indices<'t>(&self, renderer: &StatementRenderer, table: &'t TableDef) -> Result<Vec<&'t IndexSpec>> {
        let mut out = Vec::with_capacity(table.indices.len());
        for spec in &table.indices {
            if self.is_supported(renderer, &table.name, spec)? {
                out.push(spec);
            }
        }
        Ok(out)
    }

    fn is_supported(&self, renderer: &StatementRenderer, table: &str, spec: &IndexSpec) -> Result<bool> {
        match renderer.check_supported(table, spec) {
            Ok(()) => Ok(true),
            Err(err @ MigrationError::UnsupportedFeature { .. })
                if self.options.on_unsupported == UnsupportedPolicy::Skip =>
            {
                tracing::warn!(error = %err, "skipping index");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn create_statement(&self, renderer: &StatementRenderer, table: &str, spec: &IndexSpec) -> Result<MigrationStatement> {
        Ok(MigrationStatement {
            sql: renderer.create_index_sql(table, spec)?,
            kind: StatementKind::CreateIndex,
            table: table.to_string(),
            index: Some(spec.name.clone()),
        })
    }

    fn drop_existing(
        &self,
        renderer: &StatementRenderer,
        table: &str,
        existing: &IntrospectedIndex,
    ) -> Option<MigrationStatement> {
        let (sql, kind) = match existing.origin {
            IndexOrigin::Constraint => (
                renderer.drop_constraint_sql(table, &existing.catalog_name)?,
                StatementKind::DropConstraint,
            ),
            IndexOrigin::Explicit | IndexOrigin::PrimaryKey => (
                renderer.drop_catalog_index_sql(table, &existing.catalog_name),
                StatementKind::DropIndex,
            ),
        };
        Some(MigrationStatement {
            sql,
            kind,
            table: table.to_string(),
            index: Some(existing.name.clone()),
        })
    }
}
