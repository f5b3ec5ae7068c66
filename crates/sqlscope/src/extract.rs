//! Narrowing helpers over `pg_query` nodes.
//!
//! Every function here is total: a node of the wrong shape yields `None`.

use pg_query::NodeEnum;
use pg_query::protobuf::{AExpr, BoolExpr, DeleteStmt, InsertStmt, Node, RangeVar, SelectStmt, UpdateStmt};

use crate::scope::ColumnReference;
use crate::validate::StatementKind;

pub fn range_var(node: &Node) -> Option<&RangeVar> {
    match node.node.as_ref()? {
        NodeEnum::RangeVar(v) => Some(v),
        _ => None,
    }
}

/// Relation name of a `RangeVar`, without schema qualification.
pub fn table_name(node: &Node) -> Option<&str> {
    range_var(node).map(|v| v.relname.as_str())
}

pub fn table_alias(v: &RangeVar) -> Option<&str> {
    v.alias
        .as_ref()
        .map(|a| a.aliasname.as_str())
        .filter(|a| !a.is_empty())
}

/// A `ColumnRef` whose fields are all plain names.
///
/// `tbl.*` and `*` yield `None`.
pub fn column_ref(node: &Node) -> Option<ColumnReference> {
    let NodeEnum::ColumnRef(c) = node.node.as_ref()? else {
        return None;
    };

    let mut parts: Vec<&str> = Vec::with_capacity(c.fields.len());
    for f in &c.fields {
        match f.node.as_ref()? {
            NodeEnum::String(s) => parts.push(s.sval.as_str()),
            _ => return None,
        }
    }

    match parts.as_slice() {
        [] => None,
        [name] => Some(ColumnReference::new(*name)),
        [.., qualifier, name] => Some(ColumnReference::qualified(*qualifier, *name)),
    }
}

pub fn column_name(node: &Node) -> Option<String> {
    column_ref(node).map(|c| c.name)
}

pub fn comparison_expr(node: &Node) -> Option<&AExpr> {
    match node.node.as_ref()? {
        NodeEnum::AExpr(e) => Some(e),
        _ => None,
    }
}

pub fn bool_expr(node: &Node) -> Option<&BoolExpr> {
    match node.node.as_ref()? {
        NodeEnum::BoolExpr(e) => Some(e),
        _ => None,
    }
}

/// Statement node types that can be pulled out of a generic [`Node`].
pub trait StatementNode {
    const KIND: StatementKind;

    fn downcast(node: &NodeEnum) -> Option<&Self>;
}

impl StatementNode for SelectStmt {
    const KIND: StatementKind = StatementKind::Select;

    fn downcast(node: &NodeEnum) -> Option<&Self> {
        match node {
            NodeEnum::SelectStmt(s) => Some(s),
            _ => None,
        }
    }
}

impl StatementNode for InsertStmt {
    const KIND: StatementKind = StatementKind::Insert;

    fn downcast(node: &NodeEnum) -> Option<&Self> {
        match node {
            NodeEnum::InsertStmt(s) => Some(s),
            _ => None,
        }
    }
}

impl StatementNode for UpdateStmt {
    const KIND: StatementKind = StatementKind::Update;

    fn downcast(node: &NodeEnum) -> Option<&Self> {
        match node {
            NodeEnum::UpdateStmt(s) => Some(s),
            _ => None,
        }
    }
}

impl StatementNode for DeleteStmt {
    const KIND: StatementKind = StatementKind::Delete;

    fn downcast(node: &NodeEnum) -> Option<&Self> {
        match node {
            NodeEnum::DeleteStmt(s) => Some(s),
            _ => None,
        }
    }
}

/// `statement::<SelectStmt>(node)` and friends.
pub fn statement<S: StatementNode>(node: &Node) -> Option<&S> {
    S::downcast(node.node.as_ref()?)
}

/// A parsed statement, borrowed from the parse tree.
#[derive(Debug, Clone, Copy)]
pub enum ParsedStatement<'a> {
    Select(&'a SelectStmt),
    Insert(&'a InsertStmt),
    Update(&'a UpdateStmt),
    Delete(&'a DeleteStmt),
    Other,
}

impl<'a> ParsedStatement<'a> {
    pub fn from_node(node: &'a Node) -> Self {
        if let Some(s) = statement::<SelectStmt>(node) {
            ParsedStatement::Select(s)
        } else if let Some(s) = statement::<InsertStmt>(node) {
            ParsedStatement::Insert(s)
        } else if let Some(s) = statement::<UpdateStmt>(node) {
            ParsedStatement::Update(s)
        } else if let Some(s) = statement::<DeleteStmt>(node) {
            ParsedStatement::Delete(s)
        } else {
            ParsedStatement::Other
        }
    }

    pub fn kind(&self) -> StatementKind {
        match self {
            ParsedStatement::Select(_) => SelectStmt::KIND,
            ParsedStatement::Insert(_) => InsertStmt::KIND,
            ParsedStatement::Update(_) => UpdateStmt::KIND,
            ParsedStatement::Delete(_) => DeleteStmt::KIND,
            ParsedStatement::Other => StatementKind::Other,
        }
    }
}
