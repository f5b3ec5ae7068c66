//! Output-column resolution.
//!
//! A statement's target list is turned into column candidates by a
//! per-dialect [`OutputColumnSource`]; [`resolve_output_columns`] then strips
//! qualifiers and checks every candidate against the scope.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ValidationError;
use crate::schema::NormalizedSchema;
use crate::scope::{ColumnReference, Scope};
use crate::survey::{IdentifierSet, OutputColumn};

/// Produces the columns a target list selects or assigns.
pub trait OutputColumnSource {
    fn candidates(&self) -> Vec<ColumnReference>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedColumns {
    /// Accepted column names, qualifiers stripped.
    pub columns: Vec<String>,
    pub errors: Vec<ValidationError>,
}

/// Resolve and check every candidate of `source` against `scope`.
///
/// Without any relation in the scope chain (`SELECT id`), the whole schema is
/// consulted instead.
pub fn resolve_output_columns(
    source: &dyn OutputColumnSource,
    scope: &Scope<'_>,
    schema: &NormalizedSchema,
) -> ResolvedColumns {
    let mut out = ResolvedColumns::default();

    for candidate in source.candidates() {
        if candidate.is_star() {
            continue;
        }
        let name = scope.strip_qualifier(&candidate);

        if scope.chain_is_empty() {
            if schema.any_table_has_column(&name) {
                out.columns.push(name);
            } else {
                out.errors.push(ValidationError::column_not_found_in_schema(name));
            }
            continue;
        }

        if scope.resolves(&candidate, schema) {
            out.columns.push(name);
        } else {
            out.errors.push(ValidationError::column_not_found_in_tables(
                name,
                scope.table_names(),
            ));
        }
    }

    out
}

/// Text strategy for the token-stream dialects.
///
/// Each entry's declared name wins; otherwise its expression text is
/// unwrapped through function calls and filtered against the statement's
/// identifier set. Operator and keyword forms (`id + x`, `CAST(x AS INT)`)
/// leave no candidate that way and fall back to the columns the parser saw.
pub struct TextTargets<'a> {
    entries: &'a [OutputColumn],
    identifiers: &'a IdentifierSet,
}

impl<'a> TextTargets<'a> {
    pub fn new(entries: &'a [OutputColumn], identifiers: &'a IdentifierSet) -> Self {
        Self {
            entries,
            identifiers,
        }
    }
}

impl OutputColumnSource for TextTargets<'_> {
    fn candidates(&self) -> Vec<ColumnReference> {
        let mut out = Vec::new();
        for entry in self.entries {
            if let Some(name) = entry.name.as_deref() {
                out.extend(reference_from_segments(&segments(name)));
                continue;
            }
            let found = out.len();
            for text in unwrap_calls(&entry.expr) {
                let parts = segments(text);
                if parts.iter().all(|p| self.identifiers.contains(p)) {
                    out.extend(reference_from_segments(&parts));
                }
            }
            if out.len() == found {
                out.extend(entry.columns.iter().cloned());
            }
        }
        out
    }
}

fn call_re() -> &'static Regex {
    static CALL_RE: OnceLock<Regex> = OnceLock::new();
    CALL_RE.get_or_init(|| Regex::new(r"^\s*\w+\s*\(").expect("invalid built-in call regex"))
}

/// Whether `text` looks like a function call (`name(`).
pub fn looks_like_call(text: &str) -> bool {
    call_re().is_match(text.trim())
}

/// Leaf argument texts of `text`, descending through nested calls.
///
/// Text that is not a call is returned as the only leaf.
pub fn unwrap_calls(text: &str) -> Vec<&str> {
    let mut leaves = Vec::new();
    let mut pending = vec![text.trim()];

    while let Some(current) = pending.pop() {
        let Some(args) = call_arguments(current) else {
            leaves.push(current);
            continue;
        };
        pending.extend(args.into_iter().rev());
    }

    leaves
}

/// Top-level arguments of a call, or `None` when `text` is not one.
fn call_arguments(text: &str) -> Option<Vec<&str>> {
    let m = call_re().find(text)?;
    let open = m.end() - 1;
    let close = matching_paren(text, open)?;
    Some(
        split_top_level(&text[open + 1..close])
            .into_iter()
            .map(strip_set_quantifier)
            .filter(|a| !a.is_empty())
            .collect(),
    )
}

/// `COUNT(DISTINCT x)` has argument `x`.
fn strip_set_quantifier(arg: &str) -> &str {
    for quantifier in ["DISTINCT ", "ALL "] {
        let matches = arg
            .get(..quantifier.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(quantifier));
        if matches {
            return arg[quantifier.len()..].trim_start();
        }
    }
    arg
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, ch) in text[open..].char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas outside parentheses, brackets and quotes.
pub fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Dot-separated segments with identifier quoting removed.
fn segments(text: &str) -> Vec<&str> {
    text.split('.').map(|s| unquote(s.trim())).collect()
}

pub(crate) fn unquote(s: &str) -> &str {
    let stripped = s
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| s.strip_prefix('`').and_then(|r| r.strip_suffix('`')))
        .or_else(|| s.strip_prefix('[').and_then(|r| r.strip_suffix(']')));
    stripped.unwrap_or(s)
}

fn reference_from_segments(parts: &[&str]) -> Option<ColumnReference> {
    match parts {
        [] => None,
        [name] if name.is_empty() => None,
        [name] => Some(ColumnReference::new(*name)),
        [.., qualifier, name] => Some(ColumnReference::qualified(*qualifier, *name)),
    }
}

#[cfg(feature = "postgres")]
pub use ast::AstTargets;

#[cfg(feature = "postgres")]
mod ast {
    use pg_query::NodeEnum;
    use pg_query::protobuf::{InferClause, Node};

    use super::OutputColumnSource;
    use crate::expr::collect_refs;
    use crate::scope::ColumnReference;

    /// AST strategy for the Postgres family.
    #[derive(Debug, Default)]
    pub struct AstTargets<'a> {
        candidates: Vec<ColumnReference>,
        subqueries: Vec<&'a Node>,
    }

    impl<'a> AstTargets<'a> {
        /// SELECT target list: every column the value expressions read.
        pub fn projection(targets: &'a [Node]) -> Self {
            let mut out = Self::default();
            for target in targets {
                let Some(NodeEnum::ResTarget(rt)) = target.node.as_ref() else {
                    continue;
                };
                let Some(val) = rt.val.as_deref() else {
                    continue;
                };
                let refs = collect_refs(val);
                out.candidates.extend(refs.columns);
                out.subqueries.extend(refs.subqueries);
            }
            out
        }

        /// INSERT column list or UPDATE SET targets: the declared names.
        pub fn assignment(targets: &[Node]) -> Self {
            let candidates = targets
                .iter()
                .filter_map(|t| match t.node.as_ref() {
                    Some(NodeEnum::ResTarget(rt)) if !rt.name.is_empty() => {
                        Some(ColumnReference::new(rt.name.as_str()))
                    }
                    _ => None,
                })
                .collect();
            Self {
                candidates,
                subqueries: Vec::new(),
            }
        }

        /// `ON CONFLICT (a, b)` inference columns; expressions are skipped.
        pub fn inference(infer: &InferClause) -> Self {
            let candidates = infer
                .index_elems
                .iter()
                .filter_map(|n| match n.node.as_ref() {
                    Some(NodeEnum::IndexElem(e)) if !e.name.is_empty() && e.expr.is_none() => {
                        Some(ColumnReference::new(e.name.as_str()))
                    }
                    _ => None,
                })
                .collect();
            Self {
                candidates,
                subqueries: Vec::new(),
            }
        }

        pub fn subqueries(&self) -> &[&'a Node] {
            &self.subqueries
        }
    }

    impl OutputColumnSource for AstTargets<'_> {
        fn candidates(&self) -> Vec<ColumnReference> {
            self.candidates.clone()
        }
    }
}
