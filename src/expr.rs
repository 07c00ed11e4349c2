//! WHERE expressions.
//!
//! A WHERE clause is a tree whose leaves are [`Condition`]s comparing a field
//! to a criteria value and whose internal nodes are [`Operator`]s joining
//! their children with AND or OR. The tree has no parent pointers; views
//! that need a flat, indentable listing derive one with
//! [`WhereExpr::outline`].
//!
//! An operator is *well-formed* when at least two of its children qualify,
//! where a child qualifies if it is a condition or a well-formed operator.
//! Emitters drop operators that are not well-formed and skip children that
//! do not qualify.

use std::fmt;

use crate::ops::{Comparison, Logic};

/// A node of a WHERE expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhereExpr {
    /// A leaf predicate.
    Condition(Condition),
    /// An internal node.
    Operator(Operator),
}

/// A leaf predicate comparing a field to a criteria value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Condition {
    pub table_name: String,
    pub field_name: String,
    pub data_type: String,
    pub operator: Comparison,
    pub criteria: String,
}

/// An internal node joining its children with one connective.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Operator {
    pub kind: Logic,
    pub children: Vec<WhereExpr>,
}

/// Structural complexity of a WHERE expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    /// Every operator uses the same connective, which is given unless the
    /// expression has no operator at all.
    Simple(Option<Logic>),
    /// Operators with different connectives are mixed.
    TooComplex,
}

/// One entry of a flattened expression listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutlineEntry<'a> {
    pub node: &'a WhereExpr,
    pub depth: usize,
    /// True for the entry closing an operator's scope.
    pub closing: bool,
}

impl Condition {
    /// Creates a condition with no data type.
    pub fn new(table_name: &str, field_name: &str, operator: Comparison, criteria: &str) -> Condition {
        Condition {
            table_name: table_name.to_string(),
            field_name: field_name.to_string(),
            data_type: String::new(),
            operator,
            criteria: criteria.to_string(),
        }
    }
}

impl Operator {
    /// Returns the children that qualify.
    pub fn qualifying_children(&self) -> impl Iterator<Item = &WhereExpr> {
        self.children.iter().filter(|c| c.qualifies())
    }

    /// Returns true if at least two children qualify.
    pub fn is_well_formed(&self) -> bool {
        self.qualifying_children().nth(1).is_some()
    }
}

impl From<Condition> for WhereExpr {
    fn from(cond: Condition) -> WhereExpr {
        WhereExpr::Condition(cond)
    }
}

impl From<Operator> for WhereExpr {
    fn from(op: Operator) -> WhereExpr {
        WhereExpr::Operator(op)
    }
}

impl WhereExpr {
    /// Creates an operator node.
    pub fn operator(kind: Logic, children: Vec<WhereExpr>) -> WhereExpr {
        WhereExpr::Operator(Operator { kind, children })
    }

    /// Returns true if the node is a condition or a well-formed operator.
    pub fn qualifies(&self) -> bool {
        match self {
            WhereExpr::Condition(_) => true,
            WhereExpr::Operator(op) => op.is_well_formed(),
        }
    }

    /// Classifies the structural complexity of an optional expression.
    ///
    /// Operators that are not well-formed are skipped along with everything
    /// below them, since no emitter would ever write them out.
    pub fn classify(expr: Option<&WhereExpr>) -> Complexity {
        match expr {
            None | Some(WhereExpr::Condition(_)) => Complexity::Simple(None),
            Some(WhereExpr::Operator(root)) => {
                if uniform(root, root.kind) {
                    Complexity::Simple(Some(root.kind))
                } else {
                    Complexity::TooComplex
                }
            }
        }
    }

    /// Returns the qualifying conditions in pre-order.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut conds = vec![];
        self.conditions_helper(&mut conds);
        conds
    }

    /// Helper function for `conditions`.
    fn conditions_helper<'a>(&'a self, conds: &mut Vec<&'a Condition>) {
        match self {
            WhereExpr::Condition(cond) => conds.push(cond),
            WhereExpr::Operator(op) => {
                for child in op.qualifying_children() {
                    child.conditions_helper(conds);
                }
            }
        }
    }

    /// Returns a copy with malformed operators removed, or None if nothing
    /// qualifying remains.
    pub fn pruned(&self) -> Option<WhereExpr> {
        match self {
            WhereExpr::Condition(_) => Some(self.clone()),
            WhereExpr::Operator(op) if op.is_well_formed() => Some(WhereExpr::operator(
                op.kind,
                op.qualifying_children().filter_map(WhereExpr::pruned).collect(),
            )),
            WhereExpr::Operator(_) => None,
        }
    }

    /// Returns a pre-order listing of the whole tree.
    ///
    /// Each operator is followed by its children one level deeper and then by
    /// a closing entry at its own depth.
    pub fn outline(&self) -> Outline<'_> {
        Outline {
            stack: vec![(self, 0, false)],
        }
    }
}

/// Returns true if every qualifying operator below `op` uses `kind`.
fn uniform(op: &Operator, kind: Logic) -> bool {
    op.kind == kind
        && op.qualifying_children().all(|child| match child {
            WhereExpr::Condition(_) => true,
            WhereExpr::Operator(inner) => uniform(inner, kind),
        })
}

/// Iterator returned by [`WhereExpr::outline`].
#[derive(Debug)]
pub struct Outline<'a> {
    stack: Vec<(&'a WhereExpr, usize, bool)>,
}

impl<'a> Iterator for Outline<'a> {
    type Item = OutlineEntry<'a>;

    fn next(&mut self) -> Option<OutlineEntry<'a>> {
        let (node, depth, closing) = self.stack.pop()?;
        if let (WhereExpr::Operator(op), false) = (node, closing) {
            self.stack.push((node, depth, true));
            for child in op.children.iter().rev() {
                self.stack.push((child, depth + 1, false));
            }
        }
        Some(OutlineEntry {
            node,
            depth,
            closing,
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{} {} '{}'",
            self.table_name, self.field_name, self.operator, self.criteria
        )
    }
}

impl fmt::Display for WhereExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WhereExpr::Condition(cond) => cond.fmt(f),
            WhereExpr::Operator(op) => {
                write!(f, "{}(", op.kind)?;
                for (i, child) in op.children.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    child.fmt(f)?;
                }
                write!(f, ")")
            }
        }
    }
}
