//! Comparison and logical operators.
//!
//! This module defines the operators that can appear in a WHERE clause. It
//! recognizes their spellings in saved query files, maps them to SQL, and
//! defines the precedences used for displaying them with minimal
//! parenthesization.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Operator precedence (higher binds tighter).
pub type Precedence = u32;

/// A binary comparison between a field and a criteria value.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum Comparison {
    /// No comparison chosen; the row carries no predicate.
    #[default]
    None,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
}

/// A logical connective joining the children of an operator node.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum Logic {
    /// Conjunction.
    #[default]
    And,
    /// Disjunction.
    Or,
}

/// Error for operator names that are not recognized.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("unknown operator `{0}`")]
pub struct UnknownOperator(pub String);

/// Spellings accepted for each comparison, canonical name first.
const COMPARISON_LIST: [(Comparison, &[&str]); 5] = [
    (Comparison::None, &["NONE", ""]),
    (Comparison::Eq, &["EQ", "="]),
    (Comparison::Ne, &["NE", "!=", "<>"]),
    (Comparison::Gt, &["GT", ">"]),
    (Comparison::Lt, &["LT", "<"]),
];

lazy_static! {
    /// A mapping from accepted spellings to comparisons.
    static ref COMPARISON_MAP: HashMap<&'static str, Comparison> = {
        let mut map = HashMap::new();
        for &(cmp, names) in COMPARISON_LIST.iter() {
            for &name in names {
                map.insert(name, cmp);
            }
        }
        map
    };
}

impl Comparison {
    /// Returns the canonical name written to query files.
    pub fn name(self) -> &'static str {
        match self {
            Comparison::None => "NONE",
            Comparison::Eq => "EQ",
            Comparison::Ne => "NE",
            Comparison::Gt => "GT",
            Comparison::Lt => "LT",
        }
    }

    /// Returns the SQL symbol, padded with spaces, or None for `None`.
    pub fn symbol(self) -> Option<&'static str> {
        match self {
            Comparison::None => None,
            Comparison::Eq => Some(" = "),
            Comparison::Ne => Some(" != "),
            Comparison::Gt => Some(" > "),
            Comparison::Lt => Some(" < "),
        }
    }

    /// Returns true if the comparison actually constrains anything.
    pub fn is_some(self) -> bool {
        self != Comparison::None
    }
}

impl FromStr for Comparison {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Comparison, UnknownOperator> {
        let s = s.trim();
        COMPARISON_MAP
            .get(s)
            .or_else(|| COMPARISON_MAP.get(s.to_ascii_uppercase().as_str()))
            .cloned()
            .ok_or_else(|| UnknownOperator(s.to_string()))
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Logic {
    /// Returns the name used both as XML element and SQL keyword.
    pub fn name(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }

    /// Returns the precedence of the connective in SQL.
    pub fn precedence(self) -> Precedence {
        match self {
            Logic::Or => 1,
            Logic::And => 2,
        }
    }
}

/// Precedence of a comparison predicate; binds tighter than any connective.
pub const COMPARISON_PRECEDENCE: Precedence = 3;

impl FromStr for Logic {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Logic, UnknownOperator> {
        match s {
            "AND" | "and" => Ok(Logic::And),
            "OR" | "or" => Ok(Logic::Or),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An expression that may need to be parenthesized.
pub trait Parenthesize {
    /// Returns the precedence of the expression.
    fn precedence(&self) -> Precedence;
}

/// Formats an n-ary logical operation.
///
/// Writes `args` to `f` separated by the connective `op`. An argument is
/// parenthesized only when it binds looser than `op`, so `a OR b` inside an
/// AND gets parentheses but `a AND b` inside an OR does not.
pub fn write_operation<T>(f: &mut fmt::Formatter, op: Logic, args: &[T]) -> fmt::Result
where
    T: fmt::Display + Parenthesize,
{
    let prec = op.precedence();
    for (i, arg) in args.iter().enumerate() {
        if i != 0 {
            write!(f, " {} ", op)?;
        }
        if prec > arg.precedence() {
            write!(f, "({})", arg)?;
        } else {
            write!(f, "{}", arg)?;
        }
    }
    Ok(())
}
