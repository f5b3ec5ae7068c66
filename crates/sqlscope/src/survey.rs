//! Token-stream front end for MySQL, SQL Server and Oracle.
//!
//! `sqlparser` turns the input into statements; each one is flattened into a
//! [`SurveyedQuery`] record listing what it references. Nested queries are
//! kept as child records: `sources` (CTE bodies, derived tables, set
//! operation arms, INSERT sources) see only the enclosing CTEs, while
//! `subqueries` (sub-selects inside expressions) also see the relations.

use sqlparser::ast::{
    Assignment, AssignmentTarget, ConflictTarget, Expr, FromTable, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Ident, JoinConstraint, JoinOperator, ObjectName, OnConflict,
    OnConflictAction, OnInsert, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins,
};
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::collections::HashSet;

use crate::dialect::Dialect;
use crate::error::ValidationError;
use crate::scope::ColumnReference;
use crate::validate::StatementKind;

/// Every identifier the statement text contains, lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet {
    words: HashSet<String>,
}

impl IdentifierSet {
    pub fn insert(&mut self, word: &str) {
        self.words.insert(word.to_lowercase());
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// One produced or assigned column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    /// Declared column name (INSERT column list, SET target).
    pub name: Option<String>,
    /// Expression text as rendered by the parser.
    pub expr: String,
    /// Columns the expression reads.
    pub columns: Vec<ColumnReference>,
}

impl OutputColumn {
    fn declared(name: String) -> Self {
        Self {
            expr: name.clone(),
            name: Some(name),
            columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyedTable {
    pub name: String,
    pub alias: Option<String>,
    /// A derived table; its columns are not tracked.
    pub derived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyedQuery {
    pub kind: StatementKind,
    pub ctes: Vec<String>,
    pub referenced_tables: Vec<SurveyedTable>,
    pub output_columns: Vec<OutputColumn>,
    pub referenced_columns: Vec<ColumnReference>,
    /// Queries that see this query's CTEs but not its relations.
    pub sources: Vec<SurveyedQuery>,
    /// Sub-selects inside expressions.
    pub subqueries: Vec<SurveyedQuery>,
}

impl SurveyedQuery {
    fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            ctes: Vec::new(),
            referenced_tables: Vec::new(),
            output_columns: Vec::new(),
            referenced_columns: Vec::new(),
            sources: Vec::new(),
            subqueries: Vec::new(),
        }
    }

    /// Number of records in this tree, including `self`.
    pub fn depth_first_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(q) = stack.pop() {
            count += 1;
            stack.extend(&q.sources);
            stack.extend(&q.subqueries);
        }
        count
    }
}

#[derive(Debug, Clone, Default)]
pub struct Survey {
    pub queries: Vec<SurveyedQuery>,
    pub identifiers: IdentifierSet,
}

/// Parse `sql` with the dialect's grammar and survey every statement.
///
/// A parser error comes back as [`ValidationError::ParserFailure`] with the
/// parser's own message.
pub fn survey(sql: &str, dialect: Dialect) -> Result<Survey, ValidationError> {
    let grammar = dialect.sqlparser_dialect();
    let statements = Parser::parse_sql(grammar.as_ref(), sql)
        .map_err(|e| ValidationError::parser_failure(e.to_string()))?;

    let mut surveyor = Surveyor::default();
    if let Ok(tokens) = Tokenizer::new(grammar.as_ref(), sql).tokenize() {
        for token in tokens {
            match token {
                Token::Word(w) if w.keyword == Keyword::NoKeyword || w.quote_style.is_some() => {
                    surveyor.identifiers.insert(&w.value);
                }
                _ => {}
            }
        }
    }

    let queries = statements.iter().map(|s| surveyor.statement(s)).collect();
    Ok(Survey {
        queries,
        identifiers: surveyor.identifiers,
    })
}

#[derive(Default)]
struct Surveyor {
    identifiers: IdentifierSet,
}

impl Surveyor {
    fn ident(&mut self, ident: &Ident) -> String {
        self.identifiers.insert(&ident.value);
        ident.value.clone()
    }

    fn object_name(&mut self, name: &ObjectName) -> String {
        let mut last = String::new();
        for part in &name.0 {
            last = self.ident(part);
        }
        last
    }

    fn statement(&mut self, stmt: &Statement) -> SurveyedQuery {
        match stmt {
            Statement::Query(q) => self.query(q),
            Statement::Insert(insert) => {
                let mut out = SurveyedQuery::new(StatementKind::Insert);
                let name = self.object_name(&insert.table_name);
                let alias = insert.table_alias.as_ref().map(|a| self.ident(a));
                out.referenced_tables.push(SurveyedTable {
                    name,
                    alias,
                    derived: false,
                });
                for column in &insert.columns {
                    let name = self.ident(column);
                    out.output_columns.push(OutputColumn::declared(name));
                }
                match &insert.on {
                    Some(OnInsert::DuplicateKeyUpdate(assignments)) => {
                        for a in assignments {
                            self.assignment(a, &mut out);
                        }
                    }
                    Some(OnInsert::OnConflict(conflict)) => self.on_conflict(conflict, &mut out),
                    _ => {}
                }
                if let Some(source) = &insert.source {
                    let sub = self.query(source);
                    out.sources.push(sub);
                }
                out
            }
            Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => {
                let mut out = SurveyedQuery::new(StatementKind::Update);
                self.table_with_joins(table, &mut out);
                for a in assignments {
                    self.assignment(a, &mut out);
                }
                if let Some(selection) = selection {
                    self.referenced(selection, &mut out);
                }
                out
            }
            Statement::Delete(delete) => {
                let mut out = SurveyedQuery::new(StatementKind::Delete);
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
                };
                for t in tables {
                    self.table_with_joins(t, &mut out);
                }
                for t in delete.using.iter().flatten() {
                    self.table_with_joins(t, &mut out);
                }
                if let Some(selection) = &delete.selection {
                    self.referenced(selection, &mut out);
                }
                out
            }
            _ => SurveyedQuery::new(StatementKind::Other),
        }
    }

    fn assignment_targets(&mut self, target: &AssignmentTarget, out: &mut SurveyedQuery) {
        let names: Vec<&ObjectName> = match target {
            AssignmentTarget::ColumnName(name) => vec![name],
            AssignmentTarget::Tuple(names) => names.iter().collect(),
        };
        for name in names {
            let parts: Vec<String> = name.0.iter().map(|i| self.ident(i)).collect();
            out.output_columns.push(OutputColumn::declared(parts.join(".")));
        }
    }

    fn assignment(&mut self, a: &Assignment, out: &mut SurveyedQuery) {
        self.assignment_targets(&a.target, out);
        self.referenced(&a.value, out);
    }

    /// `ON CONFLICT (cols) DO UPDATE SET ...`: the conflict columns and SET
    /// targets belong to the target table. Values may read `EXCLUDED`;
    /// only their sub-selects are surveyed.
    fn on_conflict(&mut self, conflict: &OnConflict, out: &mut SurveyedQuery) {
        if let Some(ConflictTarget::Columns(columns)) = &conflict.conflict_target {
            for column in columns {
                let name = self.ident(column);
                out.output_columns.push(OutputColumn::declared(name));
            }
        }
        if let OnConflictAction::DoUpdate(update) = &conflict.action {
            let mut subqueries = Vec::new();
            for a in &update.assignments {
                self.assignment_targets(&a.target, out);
                self.walk(&a.value, None, &mut subqueries);
            }
            if let Some(selection) = &update.selection {
                self.walk(selection, None, &mut subqueries);
            }
            out.subqueries.extend(subqueries);
        }
    }

    fn query(&mut self, q: &Query) -> SurveyedQuery {
        let mut out = SurveyedQuery::new(StatementKind::Select);
        if let Some(with) = &q.with {
            for cte in &with.cte_tables {
                let name = self.ident(&cte.alias.name);
                out.ctes.push(name);
                let body = self.query(&cte.query);
                out.sources.push(body);
            }
        }
        self.set_expr(&q.body, &mut out);
        out
    }

    fn set_expr(&mut self, body: &SetExpr, out: &mut SurveyedQuery) {
        match body {
            SetExpr::Select(select) => self.select(select, out),
            SetExpr::Query(q) => {
                let sub = self.query(q);
                out.sources.push(sub);
            }
            SetExpr::SetOperation { left, right, .. } => {
                for arm in [left, right] {
                    let mut sub = SurveyedQuery::new(StatementKind::Select);
                    self.set_expr(arm, &mut sub);
                    out.sources.push(sub);
                }
            }
            SetExpr::Values(values) => {
                let mut subqueries = Vec::new();
                for expr in values.rows.iter().flatten() {
                    self.walk(expr, None, &mut subqueries);
                }
                out.subqueries.extend(subqueries);
            }
            _ => {}
        }
    }

    fn select(&mut self, select: &Select, out: &mut SurveyedQuery) {
        for t in &select.from {
            self.table_with_joins(t, out);
        }

        let mut aliases: HashSet<String> = HashSet::new();
        for item in &select.projection {
            let expr = match item {
                SelectItem::UnnamedExpr(expr) => expr,
                SelectItem::ExprWithAlias { expr, alias } => {
                    aliases.insert(self.ident(alias).to_lowercase());
                    expr
                }
                _ => continue,
            };
            let mut columns = Vec::new();
            let mut subqueries = Vec::new();
            self.walk(expr, Some(&mut columns), &mut subqueries);
            out.output_columns.push(OutputColumn {
                name: None,
                expr: expr.to_string(),
                columns,
            });
            out.subqueries.extend(subqueries);
        }

        if let Some(selection) = &select.selection {
            self.referenced(selection, out);
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for e in exprs {
                let is_alias = matches!(e, Expr::Identifier(i) if aliases.contains(&i.value.to_lowercase()));
                if !is_alias {
                    self.referenced(e, out);
                }
            }
        }
        if let Some(having) = &select.having {
            self.referenced(having, out);
        }
    }

    fn table_with_joins(&mut self, t: &TableWithJoins, out: &mut SurveyedQuery) {
        self.table_factor(&t.relation, out);
        for join in &t.joins {
            self.table_factor(&join.relation, out);
            let constraint = match &join.join_operator {
                JoinOperator::Inner(c)
                | JoinOperator::LeftOuter(c)
                | JoinOperator::RightOuter(c)
                | JoinOperator::FullOuter(c) => Some(c),
                _ => None,
            };
            if let Some(JoinConstraint::On(on)) = constraint {
                self.referenced(on, out);
            }
        }
    }

    fn table_factor(&mut self, factor: &TableFactor, out: &mut SurveyedQuery) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let name = self.object_name(name);
                let alias = alias.as_ref().map(|a| self.ident(&a.name));
                out.referenced_tables.push(SurveyedTable {
                    name,
                    alias,
                    derived: false,
                });
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
                ..
            } => {
                let sub = self.query(subquery);
                if *lateral {
                    out.subqueries.push(sub);
                } else {
                    out.sources.push(sub);
                }
                let name = alias
                    .as_ref()
                    .map(|a| self.ident(&a.name))
                    .unwrap_or_else(|| "subquery".to_string());
                out.referenced_tables.push(SurveyedTable {
                    name,
                    alias: None,
                    derived: true,
                });
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins, out),
            _ => {}
        }
    }

    /// Record the columns `expr` reads as referenced columns of `out`.
    fn referenced(&mut self, expr: &Expr, out: &mut SurveyedQuery) {
        let mut subqueries = Vec::new();
        self.walk(expr, Some(&mut out.referenced_columns), &mut subqueries);
        out.subqueries.extend(subqueries);
    }

    fn walk(
        &mut self,
        root: &Expr,
        mut columns: Option<&mut Vec<ColumnReference>>,
        subqueries: &mut Vec<SurveyedQuery>,
    ) {
        let mut stack: Vec<&Expr> = vec![root];

        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Identifier(ident) => {
                    let name = self.ident(ident);
                    if let Some(columns) = columns.as_deref_mut() {
                        columns.push(ColumnReference::new(name));
                    }
                }
                Expr::CompoundIdentifier(parts) => {
                    let names: Vec<String> = parts.iter().map(|p| self.ident(p)).collect();
                    if let (Some(columns), [.., qualifier, name]) =
                        (columns.as_deref_mut(), names.as_slice())
                    {
                        columns.push(ColumnReference::qualified(qualifier, name));
                    }
                }
                Expr::BinaryOp { left, right, .. }
                | Expr::AnyOp { left, right, .. }
                | Expr::AllOp { left, right, .. }
                | Expr::IsDistinctFrom(left, right)
                | Expr::IsNotDistinctFrom(left, right) => {
                    stack.push(right);
                    stack.push(left);
                }
                Expr::UnaryOp { expr, .. }
                | Expr::Nested(expr)
                | Expr::IsNull(expr)
                | Expr::IsNotNull(expr)
                | Expr::IsTrue(expr)
                | Expr::IsNotTrue(expr)
                | Expr::IsFalse(expr)
                | Expr::IsNotFalse(expr)
                | Expr::IsUnknown(expr)
                | Expr::IsNotUnknown(expr)
                | Expr::Cast { expr, .. }
                | Expr::Collate { expr, .. }
                | Expr::Extract { expr, .. }
                | Expr::Ceil { expr, .. }
                | Expr::Floor { expr, .. } => stack.push(expr),
                Expr::Tuple(items) => stack.extend(items.iter().rev()),
                Expr::Substring {
                    expr,
                    substring_from,
                    substring_for,
                    ..
                } => {
                    stack.extend(substring_for.as_deref());
                    stack.extend(substring_from.as_deref());
                    stack.push(expr);
                }
                Expr::Trim {
                    expr,
                    trim_what,
                    trim_characters,
                    ..
                } => {
                    stack.extend(trim_characters.iter().flatten().rev());
                    stack.extend(trim_what.as_deref());
                    stack.push(expr);
                }
                Expr::Position { expr, r#in } => {
                    stack.push(r#in);
                    stack.push(expr);
                }
                Expr::InList { expr, list, .. } => {
                    stack.extend(list.iter().rev());
                    stack.push(expr);
                }
                Expr::InSubquery { expr, subquery, .. } => {
                    subqueries.push(self.query(subquery));
                    stack.push(expr);
                }
                Expr::Between {
                    expr, low, high, ..
                } => {
                    stack.push(high);
                    stack.push(low);
                    stack.push(expr);
                }
                Expr::Like { expr, pattern, .. }
                | Expr::ILike { expr, pattern, .. }
                | Expr::SimilarTo { expr, pattern, .. }
                | Expr::RLike { expr, pattern, .. } => {
                    stack.push(pattern);
                    stack.push(expr);
                }
                Expr::Subquery(q) | Expr::Exists { subquery: q, .. } => {
                    subqueries.push(self.query(q));
                }
                Expr::Function(f) => match &f.args {
                    FunctionArguments::List(list) => {
                        for arg in list.args.iter().rev() {
                            match arg {
                                FunctionArg::Unnamed(FunctionArgExpr::Expr(e))
                                | FunctionArg::Named {
                                    arg: FunctionArgExpr::Expr(e),
                                    ..
                                } => stack.push(e),
                                _ => {}
                            }
                        }
                    }
                    FunctionArguments::Subquery(q) => subqueries.push(self.query(q)),
                    FunctionArguments::None => {}
                },
                Expr::Case {
                    operand,
                    conditions,
                    results,
                    else_result,
                } => {
                    stack.extend(else_result.as_deref());
                    stack.extend(results.iter().rev());
                    stack.extend(conditions.iter().rev());
                    stack.extend(operand.as_deref());
                }
                _ => {}
            }
        }
    }
}
