//! Declared-versus-actual index matching.

use crate::dialect::{is_plain_identifier, Capabilities, Dialect};
use crate::introspect::{IndexElement, IntrospectedIndex};
use crate::schema::{IndexSpec, IndexType};

/// Which attribute differs between a declared and an actual index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchKind {
    Uniqueness { declared: bool, actual: bool },
    IndexType { declared: IndexType, actual: IndexType },
    Elements { declared: Vec<String>, actual: Vec<Option<String>> },
}

/// A difference, and whether the dialect's catalog lets us trust it.
///
/// Unconfirmed differences come from lossy metadata: a type the catalog
/// rewrites, or expression text the backend does not expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub kind: MismatchKind,
    pub confirmed: bool,
}

/// Compares declared indices with introspected ones
#[derive(Debug, Clone, Copy)]
pub struct IndexComparator {
    dialect: Dialect,
}

impl IndexComparator {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    fn caps(&self) -> &'static Capabilities {
        self.dialect.capabilities()
    }

    /// Name equality, ignoring case for names the dialect folds.
    ///
    /// The declared name is first cut to the dialect's identifier limit.
    pub fn names_match(&self, declared: &IndexSpec, actual: &IntrospectedIndex) -> bool {
        let declared_name = self.caps().truncate_identifier(&declared.name);
        if is_plain_identifier(declared_name) && is_plain_identifier(&actual.name) {
            declared_name.eq_ignore_ascii_case(&actual.name)
        } else {
            declared_name == actual.name
        }
    }

    /// Same elements in the same order, same uniqueness, same type.
    pub fn structurally_equal(&self, declared: &IndexSpec, actual: &IntrospectedIndex) -> bool {
        declared.unique == actual.unique
            && self.elements_equal(declared, actual)
            && self.types_equal(declared, actual)
    }

    /// Structurally equal, but under another name.
    pub fn only_name_differs(&self, declared: &IndexSpec, actual: &IntrospectedIndex) -> bool {
        !self.names_match(declared, actual) && self.structurally_equal(declared, actual)
    }

    pub fn matches(&self, declared: &IndexSpec, actual: &IntrospectedIndex) -> bool {
        self.names_match(declared, actual) || self.structurally_equal(declared, actual)
    }

    /// Attribute differences between `declared` and `actual`.
    pub fn differences(&self, declared: &IndexSpec, actual: &IntrospectedIndex) -> Vec<Mismatch> {
        let mut out = Vec::new();

        if declared.unique != actual.unique {
            out.push(Mismatch {
                kind: MismatchKind::Uniqueness {
                    declared: declared.unique,
                    actual: actual.unique,
                },
                confirmed: true,
            });
        }

        if let Some(actual_type) = &actual.index_type {
            let declared_type = declared.effective_type();
            if declared_type != *actual_type {
                out.push(Mismatch {
                    kind: MismatchKind::IndexType {
                        declared: declared_type,
                        actual: actual_type.clone(),
                    },
                    confirmed: self.caps().reports_index_type,
                });
            }
        }

        if !self.elements_equal(declared, actual) {
            let plain = !declared.has_functions() && actual.elements.iter().all(IndexElement::is_column);
            out.push(Mismatch {
                kind: MismatchKind::Elements {
                    declared: declared.canonical_elements(),
                    actual: actual
                        .elements
                        .iter()
                        .map(|e| e.canonical().map(str::to_string))
                        .collect(),
                },
                confirmed: plain,
            });
        }

        out
    }

    fn elements_equal(&self, declared: &IndexSpec, actual: &IntrospectedIndex) -> bool {
        declared.elements.len() == actual.elements.len()
            && declared
                .elements
                .iter()
                .zip(&actual.elements)
                .all(|(d, a)| a.canonical() == Some(d.canonical().as_str()))
    }

    // Catalogs that rewrite the access method cannot contradict the declaration.
    fn types_equal(&self, declared: &IndexSpec, actual: &IntrospectedIndex) -> bool {
        if !self.caps().reports_index_type {
            return true;
        }
        match &actual.index_type {
            Some(actual_type) => declared.effective_type() == *actual_type,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::IndexOrigin;
    use crate::schema::{Column, IndexDecl, IndexExpr, TableDef};

    fn actual(name: &str, elements: Vec<IndexElement>, unique: bool, index_type: Option<IndexType>) -> IntrospectedIndex {
        IntrospectedIndex {
            name: name.to_string(),
            catalog_name: name.to_string(),
            elements,
            unique,
            index_type,
            origin: IndexOrigin::Explicit,
        }
    }

    fn col(name: &str) -> IndexElement {
        IndexElement::Column(name.to_string())
    }

    fn table() -> TableDef {
        TableDef::new("test_table")
            .column(Column::integer("id"))
            .column(Column::varchar("name", 42))
            .column(Column::integer("price"))
            .column(Column::varchar("item", 32).nullable())
    }

    #[test]
    fn test_idx_by_name_matches_by_name() {
        let table = table().index(Some("idx_by_name"), false, ["name"]);
        let declared = &table.indices[0];
        let cmp = IndexComparator::new(Dialect::H2);

        let reported = actual("IDX_BY_NAME", vec![col("name")], false, None);
        assert!(cmp.names_match(declared, &reported));
        assert!(cmp.matches(declared, &reported));
        assert!(!cmp.only_name_differs(declared, &reported));
    }

    #[test]
    fn test_quoted_names_compare_exactly() {
        let table = table().index(Some("Idx By Name"), false, ["name"]);
        let cmp = IndexComparator::new(Dialect::PostgreSql);
        let reported = actual("idx by name", vec![col("name")], false, Some(IndexType::BTree));
        assert!(!cmp.names_match(&table.indices[0], &reported));
        assert!(cmp.only_name_differs(&table.indices[0], &reported));
    }

    #[test]
    fn test_structural_match_under_other_name() {
        let table = table().index(Some("test_table_by_name"), true, ["name"]);
        let cmp = IndexComparator::new(Dialect::PostgreSql);
        let reported = actual("test_table_name_key", vec![col("name")], true, Some(IndexType::BTree));
        assert!(cmp.only_name_differs(&table.indices[0], &reported));
        assert!(cmp.matches(&table.indices[0], &reported));
    }

    #[test]
    fn test_functional_structural_match() {
        let table = table().declare(
            IndexDecl::on(["price"])
                .unique()
                .function(IndexExpr::coalesce(IndexExpr::column("item"), IndexExpr::string("*"))),
        );
        let cmp = IndexComparator::new(Dialect::PostgreSql);
        let reported = actual(
            "some_other_name",
            vec![col("price"), IndexElement::Expression("coalesce(item,'*')".to_string())],
            true,
            Some(IndexType::BTree),
        );
        assert!(cmp.only_name_differs(&table.indices[0], &reported));
    }

    #[test]
    fn test_truncated_name_matches() {
        let long = format!("idx_{}", "n".repeat(70));
        let table = table().index(Some(&long), false, ["name"]);
        let reported = actual(&long[..63], vec![col("name")], false, Some(IndexType::BTree));
        assert!(IndexComparator::new(Dialect::PostgreSql).names_match(&table.indices[0], &reported));
    }

    #[test]
    fn test_hash_type_on_faithful_and_lossy_catalogs() {
        let table = table().declare(IndexDecl::on(["name"]).named("test_table_by_name").using(IndexType::Hash));
        let declared = &table.indices[0];

        let pg = IndexComparator::new(Dialect::PostgreSql);
        let btree = actual("test_table_by_name", vec![col("name")], false, Some(IndexType::BTree));
        assert!(!pg.structurally_equal(declared, &btree));
        let diffs = pg.differences(declared, &btree);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].confirmed);

        // InnoDB reports BTREE for a HASH request.
        let mysql = IndexComparator::new(Dialect::MySql8);
        assert!(mysql.structurally_equal(declared, &btree));
        let diffs = mysql.differences(declared, &btree);
        assert_eq!(diffs.len(), 1);
        assert!(!diffs[0].confirmed);
    }

    #[test]
    fn test_differences() {
        let table = table().index(Some("test_table_by_name"), true, ["name"]);
        let declared = &table.indices[0];
        let cmp = IndexComparator::new(Dialect::Sqlite);

        let same = actual("test_table_by_name", vec![col("name")], true, None);
        assert!(cmp.differences(declared, &same).is_empty());

        let other = actual("test_table_by_name", vec![col("name"), col("id")], false, None);
        let diffs = cmp.differences(declared, &other);
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(|d| d.confirmed));

        let unknown = actual("test_table_by_name", vec![IndexElement::Unknown], true, None);
        let diffs = cmp.differences(declared, &unknown);
        assert_eq!(diffs.len(), 1);
        assert!(!diffs[0].confirmed);
        assert!(!cmp.structurally_equal(declared, &unknown));
    }
}
