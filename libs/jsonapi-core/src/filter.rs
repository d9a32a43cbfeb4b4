//! Filter AST built from `filter[FIELD][OP]=VALUE` query parameters.
//!
//! The engine validates fields and operators against resource metadata and
//! hands the AST to the data layer untouched; scalar values keep their raw
//! query-string form, coercion is the data layer's concern.

use serde_json::Number;

/// A filter expression. Multiple `filter[...]` parameters conjoin.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Condition(Condition),
}

impl Expr {
    /// Conjoins a list of expressions, unwrapping the single-element case.
    pub fn conjoin(mut exprs: Vec<Expr>) -> Option<Expr> {
        match exprs.len() {
            0 => None,
            1 => Some(exprs.remove(0)),
            _ => Some(Expr::And(exprs)),
        }
    }

    /// Every condition in the expression, depth-first.
    pub fn conditions(&self) -> Vec<&Condition> {
        match self {
            Expr::Condition(c) => vec![c],
            Expr::And(parts) => parts.iter().flat_map(|e| e.conditions()).collect(),
        }
    }
}

/// One `FIELD op VALUE` comparison. `field` may be a dotted path.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// The recognized operator set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    Nin,
    Null,
    NotNull,
}

impl FilterOp {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "like" => Self::Like,
            "in" => Self::In,
            "nin" => Self::Nin,
            "null" => Self::Null,
            "nnull" => Self::NotNull,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Null => "null",
            Self::NotNull => "nnull",
        }
    }

    /// Whether this operator takes a list value (comma-separated on the wire).
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }

    /// Whether this operator ignores its value (`null` / `nnull`).
    pub fn is_nullary(&self) -> bool {
        matches!(self, Self::Null | Self::NotNull)
    }
}

/// A filter comparison value.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    pub fn string(s: impl Into<String>) -> Self {
        FilterValue::String(s.into())
    }
}
