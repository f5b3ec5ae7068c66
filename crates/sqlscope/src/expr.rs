//! Column references inside boolean and scalar expressions.

use pg_query::NodeEnum;
use pg_query::protobuf::Node;

use crate::error::ValidationError;
use crate::extract::{bool_expr, column_ref, comparison_expr};
use crate::schema::NormalizedSchema;
use crate::scope::{ColumnReference, Scope, WhereScope};

/// Result of checking one expression tree.
#[derive(Debug, Default)]
pub struct ExprFindings<'a> {
    pub errors: Vec<ValidationError>,
    /// Sub-selects found under sub-links, to be validated as statements.
    pub subqueries: Vec<&'a Node>,
}

/// Column references and sub-selects of an expression, in source order.
#[derive(Debug, Default)]
pub(crate) struct ExprRefs<'a> {
    pub columns: Vec<ColumnReference>,
    pub subqueries: Vec<&'a Node>,
}

fn push_rev<'a, I>(stack: &mut Vec<&'a Node>, children: I)
where
    I: IntoIterator<Item = &'a Node>,
    I::IntoIter: DoubleEndedIterator,
{
    stack.extend(children.into_iter().rev());
}

/// Walk `root` without recursion. Sub-selects are collected, not entered.
pub(crate) fn collect_refs(root: &Node) -> ExprRefs<'_> {
    let mut out = ExprRefs::default();
    let mut stack: Vec<&Node> = vec![root];

    while let Some(node) = stack.pop() {
        if let Some(c) = column_ref(node) {
            out.columns.push(c);
            continue;
        }
        if let Some(e) = comparison_expr(node) {
            push_rev(&mut stack, [e.lexpr.as_deref(), e.rexpr.as_deref()].into_iter().flatten());
            continue;
        }
        if let Some(b) = bool_expr(node) {
            push_rev(&mut stack, &b.args);
            continue;
        }

        let Some(inner) = node.node.as_ref() else {
            continue;
        };
        match inner {
            NodeEnum::NullTest(t) => stack.extend(t.arg.as_deref()),
            NodeEnum::BooleanTest(t) => stack.extend(t.arg.as_deref()),
            NodeEnum::TypeCast(t) => stack.extend(t.arg.as_deref()),
            NodeEnum::CollateClause(c) => stack.extend(c.arg.as_deref()),
            NodeEnum::FuncCall(f) => push_rev(&mut stack, &f.args),
            NodeEnum::CoalesceExpr(c) => push_rev(&mut stack, &c.args),
            NodeEnum::MinMaxExpr(m) => push_rev(&mut stack, &m.args),
            NodeEnum::RowExpr(r) => push_rev(&mut stack, &r.args),
            NodeEnum::List(l) => push_rev(&mut stack, &l.items),
            NodeEnum::ResTarget(r) => stack.extend(r.val.as_deref()),
            NodeEnum::CaseExpr(c) => {
                stack.extend(c.defresult.as_deref());
                push_rev(&mut stack, &c.args);
                stack.extend(c.arg.as_deref());
            }
            NodeEnum::CaseWhen(w) => {
                push_rev(&mut stack, [w.expr.as_deref(), w.result.as_deref()].into_iter().flatten());
            }
            NodeEnum::SubLink(s) => {
                out.subqueries.extend(s.subselect.as_deref());
                stack.extend(s.testexpr.as_deref());
            }
            _ => {}
        }
    }

    out
}

/// Check every column referenced by a WHERE-style expression.
///
/// Under [`WhereScope::Schema`] a column passes when any table of the schema
/// has it; under [`WhereScope::Statement`] it has to resolve through `scope`.
pub fn validate_boolean_scope<'a>(
    expr: &'a Node,
    scope: &Scope<'_>,
    schema: &NormalizedSchema,
    policy: WhereScope,
) -> ExprFindings<'a> {
    let refs = collect_refs(expr);
    let errors = refs
        .columns
        .iter()
        .filter_map(|c| scope.check_reference(c, schema, policy))
        .collect();

    ExprFindings {
        errors,
        subqueries: refs.subqueries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::statement;
    use crate::schema::Schema;
    use pg_query::protobuf::SelectStmt;

    fn where_clause(sql: &str) -> Node {
        let parsed = pg_query::parse(sql).expect("parse");
        let stmt = parsed.protobuf.stmts[0].stmt.as_deref().expect("stmt");
        let select = statement::<SelectStmt>(stmt).expect("select");
        select.where_clause.as_deref().expect("where").clone()
    }

    fn names(refs: &ExprRefs<'_>) -> Vec<String> {
        refs.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn schema() -> NormalizedSchema {
        NormalizedSchema::new(
            &Schema::new()
                .with_table("users", ["id", "name"])
                .with_table("orders", ["id", "user_id"]),
        )
    }

    #[test]
    fn collects_in_source_order() {
        let w = where_clause(
            "SELECT 1 FROM t WHERE a = 1 AND (b > c OR NOT d IS NULL) AND lower(e) = f::text",
        );
        assert_eq!(names(&collect_refs(&w)), vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn sublinks_are_handed_back() {
        let w = where_clause(
            "SELECT 1 FROM t WHERE id IN (SELECT user_id FROM orders) OR EXISTS (SELECT 1 FROM x)",
        );
        let refs = collect_refs(&w);
        assert_eq!(names(&refs), vec!["id"]);
        assert_eq!(refs.subqueries.len(), 2);
    }

    #[test]
    fn case_and_in_lists() {
        let w = where_clause(
            "SELECT 1 FROM t WHERE CASE WHEN a THEN b ELSE c END IN (d, 1) AND coalesce(e, g) BETWEEN 1 AND h",
        );
        assert_eq!(names(&collect_refs(&w)), vec!["a", "b", "c", "d", "e", "g", "h"]);
    }

    #[test]
    fn deep_trees_do_not_recurse() {
        let predicate = (0..2_000)
            .map(|i| format!("id = {i}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let w = where_clause(&format!("SELECT 1 FROM users WHERE {predicate}"));
        assert_eq!(collect_refs(&w).columns.len(), 2_000);
    }

    #[test]
    fn schema_policy_flags_unknown_columns() {
        let schema = schema();
        let w = where_clause("SELECT 1 FROM users WHERE id = 1 AND email = 'x' AND user_id = 2");
        let scope = Scope::root();
        let findings = validate_boolean_scope(&w, &scope, &schema, WhereScope::Schema);
        assert_eq!(
            findings.errors,
            vec![ValidationError::column_not_found_in_schema("email")]
        );
    }

    #[test]
    fn statement_policy_uses_the_scope() {
        let schema = schema();
        let w = where_clause("SELECT 1 FROM users WHERE id = 1 AND user_id = 2");
        let mut scope = Scope::root();
        scope.add_table("users", None, &schema);
        let findings = validate_boolean_scope(&w, &scope, &schema, WhereScope::Statement);
        assert_eq!(
            findings.errors,
            vec![ValidationError::column_not_found_in_tables(
                "user_id",
                vec!["users".to_string()]
            )]
        );
    }
}
