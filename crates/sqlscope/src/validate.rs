//! Statement validators.
//!
//! The Postgres family is checked on libpg_query's parse tree; every other
//! dialect goes through the token-stream survey. Both paths aggregate: a
//! statement reports every problem found, in source order, and nested
//! queries append their findings to their parent's.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::dialect::Dialect;
use crate::error::ValidationError;
use crate::report::ValidationReport;
use crate::resolve::{TextTargets, resolve_output_columns};
use crate::schema::{NormalizedSchema, Schema};
use crate::scope::{Scope, WhereScope};
use crate::survey::{IdentifierSet, SurveyedQuery, survey};

/// Type of SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateOptions {
    #[serde(default)]
    pub where_scope: WhereScope,
}

impl ValidateOptions {
    pub fn with_where_scope(mut self, where_scope: WhereScope) -> Self {
        self.where_scope = where_scope;
        self
    }
}

/// Validate `sql` against `schema` with default options.
///
/// # Example
/// ```
/// use sqlscope::{Dialect, Schema, validate};
///
/// let schema = Schema::new().with_table("users", ["id", "name"]);
/// assert!(validate("SELECT id FROM users", &schema, Dialect::PlPgSql).is_valid());
/// assert!(!validate("SELECT age FROM users", &schema, Dialect::MySql).is_valid());
/// ```
pub fn validate(sql: &str, schema: &Schema, dialect: Dialect) -> ValidationReport {
    validate_with(sql, schema, dialect, &ValidateOptions::default())
}

pub fn validate_with(
    sql: &str,
    schema: &Schema,
    dialect: Dialect,
    options: &ValidateOptions,
) -> ValidationReport {
    validate_normalized(sql, &NormalizedSchema::new(schema), dialect, options)
}

/// Like [`validate_with`], for callers that check many statements against
/// one schema and normalize it once.
pub fn validate_normalized(
    sql: &str,
    schema: &NormalizedSchema,
    dialect: Dialect,
    options: &ValidateOptions,
) -> ValidationReport {
    let started = Instant::now();
    let outcome = Validator::new(schema, options).run(sql, dialect);

    tracing::debug!(
        target: "sqlscope.validate",
        dialect = %dialect,
        statements = outcome.statements,
        errors = outcome.errors.len(),
        elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        "validation finished"
    );

    ValidationReport::new(outcome.errors)
}

#[derive(Debug, Default)]
struct Outcome {
    errors: Vec<ValidationError>,
    statements: usize,
}

impl Outcome {
    fn failed(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
            statements: 0,
        }
    }

    /// The parser found no statement. A bare line comment is fine; anything
    /// else is not a query.
    fn empty(sql: &str, dialect: Dialect) -> Self {
        if dialect.starts_with_line_comment(sql) {
            Self::default()
        } else {
            Self::failed(ValidationError::InvalidQuery)
        }
    }
}

struct Validator<'s> {
    schema: &'s NormalizedSchema,
    policy: WhereScope,
}

impl<'s> Validator<'s> {
    fn new(schema: &'s NormalizedSchema, options: &ValidateOptions) -> Self {
        Self {
            schema,
            policy: options.where_scope,
        }
    }

    #[cfg(feature = "postgres")]
    fn run(&self, sql: &str, dialect: Dialect) -> Outcome {
        if dialect.uses_ast() {
            self.run_ast(sql, dialect)
        } else {
            self.run_survey(sql, dialect)
        }
    }

    #[cfg(not(feature = "postgres"))]
    fn run(&self, sql: &str, dialect: Dialect) -> Outcome {
        self.run_survey(sql, dialect)
    }

    fn run_survey(&self, sql: &str, dialect: Dialect) -> Outcome {
        let surveyed = match survey(sql, dialect) {
            Ok(s) => s,
            Err(e) => return Outcome::failed(e),
        };
        if surveyed.queries.is_empty() {
            return Outcome::empty(sql, dialect);
        }

        let root = Scope::root();
        let mut errors = Vec::new();
        for query in &surveyed.queries {
            self.surveyed(query, &surveyed.identifiers, &root, &mut errors);
        }
        Outcome {
            errors,
            statements: surveyed.queries.len(),
        }
    }

    /// Tables, output columns and referenced columns of one surveyed query,
    /// then its children: sources under the CTE level, sub-selects under
    /// the full scope.
    fn surveyed(
        &self,
        query: &SurveyedQuery,
        identifiers: &IdentifierSet,
        parent: &Scope<'_>,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut with = Scope::child(parent);
        for cte in &query.ctes {
            with.add_cte(cte);
        }
        let mut scope = Scope::child(&with);
        for table in &query.referenced_tables {
            if table.derived {
                scope.add_opaque(&table.name);
            } else if let Some(e) =
                scope.add_table(&table.name, table.alias.as_deref(), self.schema)
            {
                errors.push(e);
            }
        }

        let targets = TextTargets::new(&query.output_columns, identifiers);
        errors.extend(resolve_output_columns(&targets, &scope, self.schema).errors);

        for column in &query.referenced_columns {
            errors.extend(scope.check_reference(column, self.schema, self.policy));
        }

        for source in &query.sources {
            self.surveyed(source, identifiers, &with, errors);
        }
        for sub in &query.subqueries {
            self.surveyed(sub, identifiers, &scope, errors);
        }
    }
}

#[cfg(feature = "postgres")]
mod ast {
    use pg_query::NodeEnum;
    use pg_query::protobuf::{DeleteStmt, InsertStmt, Node, SelectStmt, UpdateStmt};
    use std::collections::HashSet;

    use super::{Outcome, Validator};
    use crate::dialect::Dialect;
    use crate::error::ValidationError;
    use crate::expr::{collect_refs, validate_boolean_scope};
    use crate::extract::{ParsedStatement, column_ref, table_alias};
    use crate::resolve::{AstTargets, resolve_output_columns};
    use crate::scope::Scope;

    fn ctes(with_clause: Option<&[Node]>) -> &[Node] {
        with_clause.unwrap_or_default()
    }

    impl Validator<'_> {
        pub(super) fn run_ast(&self, sql: &str, dialect: Dialect) -> Outcome {
            let parsed = match pg_query::parse(sql) {
                Ok(p) => p,
                Err(e) => return Outcome::failed(ValidationError::parser_failure(e.to_string())),
            };
            let statements: Vec<&Node> = parsed
                .protobuf
                .stmts
                .iter()
                .filter_map(|s| s.stmt.as_deref())
                .collect();
            if statements.is_empty() {
                return Outcome::empty(sql, dialect);
            }

            let root = Scope::root();
            let mut errors = Vec::new();
            for stmt in &statements {
                self.statement(stmt, &root, &mut errors);
            }
            Outcome {
                errors,
                statements: statements.len(),
            }
        }

        fn statement(&self, node: &Node, parent: &Scope<'_>, errors: &mut Vec<ValidationError>) {
            match ParsedStatement::from_node(node) {
                ParsedStatement::Select(s) => self.select(s, parent, errors),
                ParsedStatement::Insert(s) => self.insert(s, parent, errors),
                ParsedStatement::Update(s) => self.update(s, parent, errors),
                ParsedStatement::Delete(s) => self.delete(s, parent, errors),
                ParsedStatement::Other => {}
            }
        }

        /// Register CTE names, then validate each body with all of them visible.
        fn with_clause(
            &self,
            ctes: &[Node],
            scope: &mut Scope<'_>,
            errors: &mut Vec<ValidationError>,
        ) {
            let bodies: Vec<&Node> = ctes
                .iter()
                .filter_map(|n| match n.node.as_ref() {
                    Some(NodeEnum::CommonTableExpr(c)) => {
                        scope.add_cte(&c.ctename);
                        c.ctequery.as_deref()
                    }
                    _ => None,
                })
                .collect();
            for body in bodies {
                self.statement(body, scope, errors);
            }
        }

        /// Add one FROM item to `scope`. JOIN conditions are collected so
        /// they can be checked once every relation is known. Derived tables
        /// are validated against `outer`, unless LATERAL.
        fn from_item<'a>(
            &self,
            item: &'a Node,
            outer: &Scope<'_>,
            scope: &mut Scope<'_>,
            errors: &mut Vec<ValidationError>,
            conditions: &mut Vec<&'a Node>,
        ) {
            match item.node.as_ref() {
                Some(NodeEnum::RangeVar(v)) => {
                    errors.extend(scope.add_table(&v.relname, table_alias(v), self.schema));
                }
                Some(NodeEnum::JoinExpr(j)) => {
                    for side in [j.larg.as_deref(), j.rarg.as_deref()].into_iter().flatten() {
                        self.from_item(side, outer, scope, errors, conditions);
                    }
                    conditions.extend(j.quals.as_deref());
                }
                Some(NodeEnum::RangeSubselect(r)) => {
                    if let Some(subquery) = r.subquery.as_deref() {
                        if r.lateral {
                            self.statement(subquery, scope, errors);
                        } else {
                            self.statement(subquery, outer, errors);
                        }
                    }
                    let alias = r.alias.as_ref().map(|a| a.aliasname.as_str());
                    scope.add_opaque(alias.unwrap_or("subquery"));
                }
                Some(NodeEnum::RangeFunction(f)) => {
                    let alias = f.alias.as_ref().map(|a| a.aliasname.as_str());
                    scope.add_opaque(alias.unwrap_or("function"));
                }
                _ => {}
            }
        }

        fn condition(&self, expr: &Node, scope: &Scope<'_>, errors: &mut Vec<ValidationError>) {
            let findings = validate_boolean_scope(expr, scope, self.schema, self.policy);
            errors.extend(findings.errors);
            for sub in findings.subqueries {
                self.statement(sub, scope, errors);
            }
        }

        fn select(&self, select: &SelectStmt, parent: &Scope<'_>, errors: &mut Vec<ValidationError>) {
            let mut with = Scope::child(parent);
            self.with_clause(
                ctes(select.with_clause.as_ref().map(|w| w.ctes.as_slice())),
                &mut with,
                errors,
            );

            if let (Some(left), Some(right)) = (select.larg.as_deref(), select.rarg.as_deref()) {
                self.select(left, &with, errors);
                self.select(right, &with, errors);
                return;
            }

            let mut scope = Scope::child(&with);
            let mut conditions: Vec<&Node> = Vec::new();
            for item in &select.from_clause {
                self.from_item(item, &with, &mut scope, errors, &mut conditions);
            }

            for row in &select.values_lists {
                for sub in collect_refs(row).subqueries {
                    self.statement(sub, &scope, errors);
                }
            }

            let targets = AstTargets::projection(&select.target_list);
            errors.extend(resolve_output_columns(&targets, &scope, self.schema).errors);
            for sub in targets.subqueries() {
                self.statement(sub, &scope, errors);
            }

            conditions.extend(select.where_clause.as_deref());

            // GROUP BY may name an output alias.
            let aliases: HashSet<String> = select
                .target_list
                .iter()
                .filter_map(|t| match t.node.as_ref() {
                    Some(NodeEnum::ResTarget(rt)) if !rt.name.is_empty() => {
                        Some(rt.name.to_lowercase())
                    }
                    _ => None,
                })
                .collect();
            conditions.extend(select.group_clause.iter().filter(|g| {
                !column_ref(g)
                    .is_some_and(|c| c.qualifier.is_none() && aliases.contains(&c.name.to_lowercase()))
            }));

            conditions.extend(select.having_clause.as_deref());

            for condition in conditions {
                self.condition(condition, &scope, errors);
            }
        }

        fn insert(&self, insert: &InsertStmt, parent: &Scope<'_>, errors: &mut Vec<ValidationError>) {
            let mut with = Scope::child(parent);
            self.with_clause(
                ctes(insert.with_clause.as_ref().map(|w| w.ctes.as_slice())),
                &mut with,
                errors,
            );

            let mut target = Scope::child(&with);
            if let Some(relation) = insert.relation.as_ref() {
                errors.extend(target.add_table(
                    &relation.relname,
                    table_alias(relation),
                    self.schema,
                ));
            }

            let columns = AstTargets::assignment(&insert.cols);
            errors.extend(resolve_output_columns(&columns, &target, self.schema).errors);

            if let Some(clause) = insert.on_conflict_clause.as_deref() {
                if let Some(infer) = clause.infer.as_deref() {
                    let inference = AstTargets::inference(infer);
                    errors.extend(resolve_output_columns(&inference, &target, self.schema).errors);
                }

                let updates = AstTargets::assignment(&clause.target_list);
                errors.extend(resolve_output_columns(&updates, &target, self.schema).errors);

                for t in &clause.target_list {
                    for sub in collect_refs(t).subqueries {
                        self.statement(sub, &target, errors);
                    }
                }
            }

            if let Some(source) = insert.select_stmt.as_deref() {
                self.statement(source, &with, errors);
            }
        }

        fn update(&self, update: &UpdateStmt, parent: &Scope<'_>, errors: &mut Vec<ValidationError>) {
            let mut with = Scope::child(parent);
            self.with_clause(
                ctes(update.with_clause.as_ref().map(|w| w.ctes.as_slice())),
                &mut with,
                errors,
            );

            let mut target = Scope::child(&with);
            if let Some(relation) = update.relation.as_ref() {
                errors.extend(target.add_table(
                    &relation.relname,
                    table_alias(relation),
                    self.schema,
                ));
            }

            let assignments = AstTargets::assignment(&update.target_list);
            errors.extend(resolve_output_columns(&assignments, &target, self.schema).errors);

            let mut scope = Scope::child(&with);
            for relation in target.relations() {
                scope.push(relation.clone());
            }

            let mut conditions: Vec<&Node> = Vec::new();
            for item in &update.from_clause {
                self.from_item(item, &with, &mut scope, errors, &mut conditions);
            }
            // SET values are read in the same scope as WHERE.
            conditions.extend(update.target_list.iter().filter_map(|t| match t.node.as_ref() {
                Some(NodeEnum::ResTarget(rt)) => rt.val.as_deref(),
                _ => None,
            }));
            conditions.extend(update.where_clause.as_deref());

            for condition in conditions {
                self.condition(condition, &scope, errors);
            }
        }

        fn delete(&self, delete: &DeleteStmt, parent: &Scope<'_>, errors: &mut Vec<ValidationError>) {
            let mut with = Scope::child(parent);
            self.with_clause(
                ctes(delete.with_clause.as_ref().map(|w| w.ctes.as_slice())),
                &mut with,
                errors,
            );

            let mut scope = Scope::child(&with);
            if let Some(relation) = delete.relation.as_ref() {
                errors.extend(scope.add_table(
                    &relation.relname,
                    table_alias(relation),
                    self.schema,
                ));
            }

            let mut conditions: Vec<&Node> = Vec::new();
            for item in &delete.using_clause {
                self.from_item(item, &with, &mut scope, errors, &mut conditions);
            }
            conditions.extend(delete.where_clause.as_deref());

            for condition in conditions {
                self.condition(condition, &scope, errors);
            }
        }
    }
}
