//! Relations visible to a clause.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ValidationError;
use crate::schema::NormalizedSchema;

/// How WHERE-style clauses look columns up.
///
/// `Schema` accepts a column that exists in any table of the connected
/// database, regardless of the statement's FROM list. `Statement` requires it
/// to exist in a relation the clause can actually see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhereScope {
    #[default]
    Schema,
    Statement,
}

/// An extracted column identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnReference {
    pub name: String,
    /// Owning table name or alias, as written.
    pub qualifier: Option<String>,
}

impl ColumnReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    pub fn is_star(&self) -> bool {
        self.name == "*"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// A table that exists in the schema.
    Table,
    /// A named relation whose columns we don't track (CTE, derived table,
    /// or a table already reported missing).
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRelation {
    pub name: String,
    pub alias: Option<String>,
    pub kind: RelationKind,
}

impl ScopeRelation {
    fn answers_to(&self, qualifier: &str) -> bool {
        self.name.eq_ignore_ascii_case(qualifier)
            || self
                .alias
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(qualifier))
    }
}

/// The FROM list of one query level, chained to its enclosing query.
#[derive(Debug, Default)]
pub struct Scope<'p> {
    relations: Vec<ScopeRelation>,
    ctes: HashSet<String>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(parent: &'p Scope<'p>) -> Self {
        Self {
            relations: Vec::new(),
            ctes: HashSet::new(),
            parent: Some(parent),
        }
    }

    pub fn add_cte(&mut self, name: &str) {
        self.ctes.insert(name.to_lowercase());
    }

    /// True if `name` is a CTE defined here or in an enclosing query.
    pub fn is_cte(&self, name: &str) -> bool {
        self.ctes.contains(&name.to_lowercase()) || self.parent.is_some_and(|p| p.is_cte(name))
    }

    /// Register a relation, reporting it if it is neither a CTE nor a schema table.
    pub fn add_table(
        &mut self,
        name: &str,
        alias: Option<&str>,
        schema: &NormalizedSchema,
    ) -> Option<ValidationError> {
        let (kind, error) = if self.is_cte(name) {
            (RelationKind::Opaque, None)
        } else if schema.has_table(name) {
            (RelationKind::Table, None)
        } else {
            (RelationKind::Opaque, Some(ValidationError::table_not_found(name)))
        };
        self.relations.push(ScopeRelation {
            name: name.to_string(),
            alias: alias.map(str::to_string),
            kind,
        });
        error
    }

    /// Register a relation with unknown columns (derived table).
    pub fn add_opaque(&mut self, alias: &str) {
        self.relations.push(ScopeRelation {
            name: alias.to_string(),
            alias: None,
            kind: RelationKind::Opaque,
        });
    }

    pub fn relations(&self) -> &[ScopeRelation] {
        &self.relations
    }

    /// Add an already-checked relation.
    pub fn push(&mut self, relation: ScopeRelation) {
        self.relations.push(relation);
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// True when neither this level nor any enclosing one has a relation.
    pub fn chain_is_empty(&self) -> bool {
        self.is_empty() && self.parent.is_none_or(|p| p.chain_is_empty())
    }

    /// Relation names for error messages: this level's, or the nearest
    /// enclosing level's when this one has none.
    pub fn table_names(&self) -> Vec<String> {
        match self.parent {
            Some(parent) if self.is_empty() => parent.table_names(),
            _ => self.relations.iter().map(|r| r.name.clone()).collect(),
        }
    }

    /// Drop a qualifier that names a relation of this level (`u.id` → `id`).
    ///
    /// Unknown qualifiers stay attached to the name (`x.id`), so the lookup fails.
    pub fn strip_qualifier(&self, column: &ColumnReference) -> String {
        match column.qualifier.as_deref() {
            Some(q) if self.relations.iter().any(|r| r.answers_to(q)) => column.name.clone(),
            Some(q) => format!("{q}.{}", column.name),
            None => column.name.clone(),
        }
    }

    /// Whether a column reference resolves here or in an enclosing query.
    ///
    /// A qualified reference binds to the nearest level with a relation of
    /// that name or alias and must exist there. Opaque relations accept any
    /// column, but an enclosing query's opaque relations only answer
    /// references qualified with their name.
    pub fn resolves(&self, column: &ColumnReference, schema: &NormalizedSchema) -> bool {
        let has = |r: &ScopeRelation| match r.kind {
            RelationKind::Opaque => true,
            RelationKind::Table => schema.table_has_column(&r.name, &column.name),
        };

        let mut level = Some(self);
        let mut own = true;
        while let Some(scope) = level {
            match column.qualifier.as_deref() {
                Some(q) => {
                    let mut named = scope.relations.iter().filter(|r| r.answers_to(q)).peekable();
                    if named.peek().is_some() {
                        return named.any(has);
                    }
                }
                None => {
                    if scope
                        .relations
                        .iter()
                        .filter(|r| own || r.kind == RelationKind::Table)
                        .any(has)
                    {
                        return true;
                    }
                }
            }
            own = false;
            level = scope.parent;
        }
        false
    }

    /// Check a WHERE-style column reference under `policy`.
    pub fn check_reference(
        &self,
        column: &ColumnReference,
        schema: &NormalizedSchema,
        policy: WhereScope,
    ) -> Option<ValidationError> {
        if column.is_star() {
            return None;
        }
        match policy {
            WhereScope::Statement if self.chain_is_empty() => {
                let name = self.strip_qualifier(column);
                (!schema.any_table_has_column(&name))
                    .then(|| ValidationError::column_not_found_in_schema(name))
            }
            WhereScope::Schema => (!schema.any_table_has_column(&column.name))
                .then(|| ValidationError::column_not_found_in_schema(&column.name)),
            WhereScope::Statement => (!self.resolves(column, schema)).then(|| {
                ValidationError::column_not_found_in_tables(
                    self.strip_qualifier(column),
                    self.table_names(),
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn schema() -> NormalizedSchema {
        NormalizedSchema::new(
            &Schema::new()
                .with_table("users", ["id", "name"])
                .with_table("orders", ["id", "user_id", "total"]),
        )
    }

    #[test]
    fn missing_table_is_reported_and_opaque() {
        let schema = schema();
        let mut scope = Scope::root();
        assert!(scope.add_table("users", Some("u"), &schema).is_none());
        let err = scope.add_table("accounts", None, &schema);
        assert_eq!(err, Some(ValidationError::table_not_found("accounts")));
        assert_eq!(scope.relations()[1].kind, RelationKind::Opaque);
    }

    #[test]
    fn ctes_are_relations() {
        let schema = schema();
        let mut outer = Scope::root();
        outer.add_cte("recent");
        let mut inner = Scope::child(&outer);
        assert!(inner.add_table("RECENT", None, &schema).is_none());
    }

    #[test]
    fn qualifiers_strip_by_name_or_alias() {
        let schema = schema();
        let mut scope = Scope::root();
        scope.add_table("users", Some("u"), &schema);
        assert_eq!(scope.strip_qualifier(&ColumnReference::qualified("u", "id")), "id");
        assert_eq!(scope.strip_qualifier(&ColumnReference::qualified("USERS", "id")), "id");
        assert_eq!(scope.strip_qualifier(&ColumnReference::qualified("x", "id")), "x.id");
    }

    #[test]
    fn statement_policy_walks_enclosing_scopes() {
        let schema = schema();
        let mut outer = Scope::root();
        outer.add_table("users", Some("u"), &schema);
        let mut inner = Scope::child(&outer);
        inner.add_table("orders", None, &schema);

        let correlated = ColumnReference::qualified("u", "name");
        assert!(inner.check_reference(&correlated, &schema, WhereScope::Statement).is_none());

        let bad = ColumnReference::new("email");
        assert_eq!(
            inner.check_reference(&bad, &schema, WhereScope::Statement),
            Some(ValidationError::column_not_found_in_tables(
                "email",
                vec!["orders".to_string()]
            ))
        );
    }

    #[test]
    fn enclosing_opaque_relations_need_a_qualifier() {
        let schema = schema();
        let mut outer = Scope::root();
        outer.add_cte("recent");
        assert!(outer.add_table("recent", Some("r"), &schema).is_none());
        assert!(outer.add_table("accounts", None, &schema).is_some());
        let mut inner = Scope::child(&outer);
        inner.add_table("orders", None, &schema);

        // Own level: opaque relations accept anything.
        assert!(outer.resolves(&ColumnReference::new("whatever"), &schema));
        // Nested level: only a qualified reference reaches them.
        assert!(!inner.resolves(&ColumnReference::new("nope"), &schema));
        assert!(inner.resolves(&ColumnReference::qualified("r", "anything"), &schema));
        assert!(inner.resolves(&ColumnReference::qualified("accounts", "anything"), &schema));
        assert!(inner.resolves(&ColumnReference::new("total"), &schema));
    }

    #[test]
    fn schema_policy_is_coarse() {
        let schema = schema();
        let mut scope = Scope::root();
        scope.add_table("users", None, &schema);
        // `total` lives on orders, which isn't in scope; the coarse policy accepts it.
        let total = ColumnReference::new("total");
        assert!(scope.check_reference(&total, &schema, WhereScope::Schema).is_none());
        assert!(scope.check_reference(&total, &schema, WhereScope::Statement).is_some());
    }
}
