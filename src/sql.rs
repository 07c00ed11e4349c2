//! Structured Query Language (SQL).
//!
//! This module defines data structures for the limited form of SQL a query
//! definition can express, and implements conversion to it from a
//! [`QueryDefinition`]. Conversion only succeeds if at least one field is
//! displayed; otherwise there is nothing to select.
//!
//! [`QueryDefinition`]: ../query/struct.QueryDefinition.html

use std::fmt;

use tracing::debug;

use crate::expr::{Condition, WhereExpr};
use crate::map::OrderMap;
use crate::ops::{self, Comparison, Logic, Parenthesize};
use crate::query::QueryDefinition;
use crate::schema::{self, Field, Schema, ALL_FIELDS};
use crate::util::{split_qualified, CommaSep, Ident};

/// A top-level SQL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// The columns to select.
    columns: Vec<Column>,
    /// The tables to select from.
    tables: Vec<String>,
    /// The "WHERE" clause, if any.
    cond: Option<Formula>,
    /// Output options.
    style: Style,
}

/// A column, qualified by its table when more than one table is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Column {
    table: Option<String>,
    field: String,
}

/// An operand of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expression {
    /// A column from a table.
    Column(Column),
    /// A string constant, written in single quotes.
    Text(String),
    /// A constant written exactly as given.
    Verbatim(String),
}

/// A formula in the WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Formula {
    /// A comparison of two expressions.
    Pred(Comparison, Expression, Expression),
    /// Two or more formulas joined by a logical connective.
    Logic(Logic, Vec<Formula>),
}

/// Style options for conversion to SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    /// Use SELECT DISTINCT instead of SELECT.
    pub distinct: bool,
    /// Put each clause on its own line instead of all on one line.
    pub pretty: bool,
}

/// Renders a query definition as SQL with the default style.
///
/// Returns None if no field is displayed.
pub fn to_sql(schema: &Schema, def: &QueryDefinition) -> Option<String> {
    to_sql_with(schema, def, Style::default())
}

/// Renders a query definition as SQL.
///
/// Returns None if no field is displayed.
pub fn to_sql_with(schema: &Schema, def: &QueryDefinition, style: Style) -> Option<String> {
    Query::new(schema, def, style).map(|query| query.to_string())
}

/// Collects the tables a query touches, in first-encounter order.
#[derive(Default)]
struct TableSet(OrderMap<String, ()>);

impl TableSet {
    fn add(&mut self, name: &str) {
        let name = name.to_string();
        if !self.0.contains(&name) {
            self.0.insert(name, ());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

impl Query {
    /// Converts a query definition, or returns None if no field is displayed.
    pub fn new(schema: &Schema, def: &QueryDefinition, style: Style) -> Option<Query> {
        let mut selected: OrderMap<String, Vec<String>> = OrderMap::new();
        for item in def.selects.iter().filter(|s| s.displayed) {
            let table = def.table_name(item.table_id, &item.table_name);
            let fields = selected.get_or_insert_with(table.to_string(), Vec::new);
            if !fields.contains(&item.field_name) {
                fields.push(item.field_name.clone());
            }
        }
        if selected.is_empty() {
            debug!("no displayed fields, no SQL");
            return None;
        }

        let mut tables = TableSet::default();
        let mut columns = vec![];
        for (table, fields) in selected.iter() {
            tables.add(table);
            for field in fields {
                columns.push(Column::new(table, field));
            }
        }

        let mut conjuncts = vec![];
        for join in &def.joins {
            let left = def.field_table_name(&join.left);
            let right = def.field_table_name(&join.right);
            tables.add(left);
            tables.add(right);
            conjuncts.push(Formula::Pred(
                Comparison::Eq,
                Expression::Column(Column::new(left, &join.left.field_name)),
                Expression::Column(Column::new(right, &join.right.field_name)),
            ));
        }
        let filter = def.filter.as_ref().and_then(WhereExpr::pruned);
        if let Some(formula) = filter.and_then(|f| formula(schema, &f, &mut tables)) {
            conjuncts.push(formula);
        }
        let mut cond = match conjuncts.len() {
            0 => None,
            1 => conjuncts.pop(),
            _ => Some(Formula::Logic(Logic::And, conjuncts)),
        };

        let tables = tables.into_vec();
        if tables.len() <= 1 {
            for column in &mut columns {
                column.table = None;
            }
            if let Some(cond) = &mut cond {
                cond.unqualify();
            }
        }
        debug!(columns = columns.len(), tables = tables.len(), "built SQL query");

        Some(Query {
            columns,
            tables,
            cond,
            style,
        })
    }
}

/// Converts a pruned WHERE tree, adding the tables it mentions.
///
/// Conditions without a comparison or criteria constrain nothing and are
/// left out; operators left with a single argument collapse into it.
fn formula(schema: &Schema, expr: &WhereExpr, tables: &mut TableSet) -> Option<Formula> {
    match expr {
        WhereExpr::Condition(cond) => predicate(schema, cond, tables),
        WhereExpr::Operator(op) => {
            let mut args: Vec<Formula> = op
                .children
                .iter()
                .filter_map(|child| formula(schema, child, tables))
                .collect();
            match args.len() {
                0 => None,
                1 => args.pop(),
                _ => Some(Formula::Logic(op.kind, args)),
            }
        }
    }
}

/// Converts one condition.
///
/// An equality whose criteria names another field of the schema is an
/// implicit join and compares the two columns.
fn predicate(schema: &Schema, cond: &Condition, tables: &mut TableSet) -> Option<Formula> {
    if !cond.operator.is_some() || cond.criteria.trim().is_empty() {
        return None;
    }
    tables.add(&cond.table_name);
    let lhs = Expression::Column(Column::new(&cond.table_name, &cond.field_name));
    if cond.operator == Comparison::Eq {
        if let Some((table, field)) = split_qualified(&cond.criteria) {
            if let Some(field) = schema.resolve_field(table, field) {
                tables.add(table);
                let rhs = Expression::Column(Column::new(table, &field.name));
                return Some(Formula::Pred(Comparison::Eq, lhs, rhs));
            }
        }
    }
    let textual = if cond.data_type.is_empty() {
        schema
            .resolve_field(&cond.table_name, &cond.field_name)
            .map_or(false, Field::is_textual)
    } else {
        schema::is_textual(&cond.data_type)
    };
    let rhs = if textual {
        Expression::Text(cond.criteria.clone())
    } else {
        Expression::Verbatim(cond.criteria.trim().to_string())
    };
    Some(Formula::Pred(cond.operator, lhs, rhs))
}

impl Column {
    fn new(table: &str, field: &str) -> Column {
        Column {
            table: Some(table.to_string()),
            field: field.to_string(),
        }
    }
}

impl Formula {
    /// Drops the table qualifier of every column.
    fn unqualify(&mut self) {
        match self {
            Formula::Pred(_, lhs, rhs) => {
                for expr in [lhs, rhs] {
                    if let Expression::Column(column) = expr {
                        column.table = None;
                    }
                }
            }
            Formula::Logic(_, args) => {
                for arg in args {
                    arg.unqualify();
                }
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sep = if self.style.pretty { "\n" } else { " " };
        write!(f, "SELECT ")?;
        if self.style.distinct {
            write!(f, "DISTINCT ")?;
        }
        let tables: Vec<_> = self.tables.iter().map(|t| Ident(t)).collect();
        write!(f, "{}{}FROM {}", CommaSep(&self.columns), sep, CommaSep(&tables))?;
        if let Some(cond) = &self.cond {
            write!(f, "{}WHERE {}", sep, cond)?;
        }
        Ok(())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(table) = &self.table {
            write!(f, "{}.", Ident(table))?;
        }
        if self.field == ALL_FIELDS {
            f.write_str(ALL_FIELDS)
        } else {
            Ident(&self.field).fmt(f)
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Column(column) => column.fmt(f),
            Expression::Text(text) => write!(f, "'{}'", text.replace('\'', "''")),
            Expression::Verbatim(text) => f.write_str(text),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Formula::Pred(op, lhs, rhs) => {
                write!(f, "{}{}{}", lhs, op.symbol().unwrap_or(" = "), rhs)
            }
            Formula::Logic(op, args) => ops::write_operation(f, *op, args),
        }
    }
}

impl Parenthesize for Formula {
    fn precedence(&self) -> ops::Precedence {
        match self {
            Formula::Pred(..) => ops::COMPARISON_PRECEDENCE,
            Formula::Logic(op, _) => op.precedence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::query::{FieldRef, Join, SelectItem, TableRef};
    use crate::schema::tests::employees;

    fn item(table: &str, field: &str) -> SelectItem {
        let schema = employees();
        SelectItem::displayed(table, schema.resolve_field(table, field).unwrap())
    }

    fn cond(table: &str, field: &str, op: Comparison, criteria: &str) -> WhereExpr {
        WhereExpr::Condition(Condition {
            data_type: employees().data_type(table, field).to_string(),
            ..Condition::new(table, field, op, criteria)
        })
    }

    fn def(selects: Vec<SelectItem>, filter: Option<WhereExpr>) -> QueryDefinition {
        QueryDefinition {
            selects,
            filter,
            ..QueryDefinition::default()
        }
    }

    #[test]
    fn nothing_displayed() {
        let schema = employees();
        assert_eq!(to_sql(&schema, &QueryDefinition::default()), None);
        let hidden = SelectItem {
            displayed: false,
            ..item("Employees", "EmpNo")
        };
        assert_eq!(to_sql(&schema, &def(vec![hidden], None)), None);
    }

    #[test]
    fn single_table_is_unqualified() {
        let query = def(
            vec![item("Employees", "EmpNo"), item("Employees", "Name"), item("Employees", "EmpNo")],
            Some(cond("Employees", "Name", Comparison::Eq, "Smith")),
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT EmpNo, Name FROM Employees WHERE Name = 'Smith'"
        );
    }

    #[test]
    fn explicit_joins_then_criteria() {
        let mut query = def(
            vec![item("Employees", "Name"), item("EmpDept", "DeptNo")],
            Some(WhereExpr::operator(
                Logic::Or,
                vec![
                    cond("EmpDept", "DeptNo", Comparison::Gt, "10"),
                    cond("Employees", "Name", Comparison::Ne, "O'Neil"),
                ],
            )),
        );
        query.joins.push(Join::new(
            FieldRef::new("Employees", "EmpNo"),
            FieldRef::new("EmpDept", "EmpNo"),
        ));
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT Employees.Name, EmpDept.DeptNo FROM Employees, EmpDept \
             WHERE Employees.EmpNo = EmpDept.EmpNo AND \
             (EmpDept.DeptNo > 10 OR Employees.Name != 'O''Neil')"
        );
    }

    #[test]
    fn join_tables_resolve_by_id() {
        let mut query = def(
            vec![SelectItem {
                table_id: Some(1),
                ..item("Employees", "Name")
            }],
            None,
        );
        query.tables = vec![
            TableRef {
                id: Some(1),
                ..TableRef::named("Employees")
            },
            TableRef {
                id: Some(2),
                ..TableRef::named("EmpDept")
            },
        ];
        query.joins.push(Join::new(
            FieldRef {
                table_id: Some(2),
                ..FieldRef::new("Employees", "EmpNo")
            },
            FieldRef {
                table_id: Some(1),
                ..FieldRef::new("EmpDept", "EmpNo")
            },
        ));
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT Employees.Name FROM Employees, EmpDept \
             WHERE EmpDept.EmpNo = Employees.EmpNo"
        );
    }

    #[test]
    fn untyped_condition_takes_schema_type() {
        let query = def(
            vec![item("Employees", "Name")],
            Some(Condition::new("Employees", "Name", Comparison::Eq, "Smith").into()),
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT Name FROM Employees WHERE Name = 'Smith'"
        );
    }

    #[test]
    fn implicit_join_adds_table() {
        let query = def(
            vec![item("Employees", "Name")],
            Some(cond("Employees", "EmpNo", Comparison::Eq, "EmpDept.EmpNo")),
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT Employees.Name FROM Employees, EmpDept \
             WHERE Employees.EmpNo = EmpDept.EmpNo"
        );
    }

    #[test]
    fn brackets_names_with_spaces() {
        let query = def(
            vec![item("Dept Names", "Dept Name"), item("EmpDept", "EmpNo")],
            Some(cond("Dept Names", "Dept Name", Comparison::Lt, "M")),
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT [Dept Names].[Dept Name], EmpDept.EmpNo FROM [Dept Names], EmpDept \
             WHERE [Dept Names].[Dept Name] < 'M'"
        );
    }

    #[test]
    fn criteria_table_joins_from_list() {
        let query = def(
            vec![item("Employees", "Name")],
            Some(cond("EmpDept", "DeptNo", Comparison::Eq, "4")),
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT Employees.Name FROM Employees, EmpDept WHERE EmpDept.DeptNo = 4"
        );
    }

    #[test]
    fn rows_without_comparison_are_skipped() {
        let query = def(
            vec![item("Employees", "Name")],
            Some(WhereExpr::operator(
                Logic::And,
                vec![
                    cond("Employees", "Name", Comparison::None, "x"),
                    cond("Employees", "EmpNo", Comparison::Gt, "3"),
                ],
            )),
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT Name FROM Employees WHERE EmpNo > 3"
        );
    }

    #[test]
    fn no_where_without_predicates() {
        let query = def(
            vec![item("Employees", "Name")],
            Some(WhereExpr::operator(
                Logic::And,
                vec![cond("Employees", "EmpNo", Comparison::Gt, "3")],
            )),
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT Name FROM Employees"
        );
    }

    #[test]
    fn nested_tree_parenthesization() {
        let query = def(
            vec![item("Employees", "Name")],
            Some(WhereExpr::operator(
                Logic::Or,
                vec![
                    WhereExpr::operator(
                        Logic::And,
                        vec![
                            cond("Employees", "EmpNo", Comparison::Gt, "1"),
                            cond("Employees", "EmpNo", Comparison::Lt, "5"),
                        ],
                    ),
                    WhereExpr::operator(
                        Logic::And,
                        vec![
                            cond("Employees", "Name", Comparison::Eq, "Ann"),
                            WhereExpr::operator(
                                Logic::Or,
                                vec![
                                    cond("Employees", "EmpNo", Comparison::Eq, "7"),
                                    cond("Employees", "EmpNo", Comparison::Eq, "8"),
                                ],
                            ),
                        ],
                    ),
                ],
            )),
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT Name FROM Employees WHERE EmpNo > 1 AND EmpNo < 5 OR \
             Name = 'Ann' AND (EmpNo = 7 OR EmpNo = 8)"
        );
    }

    #[test]
    fn style_options() {
        let query = def(
            vec![item("Employees", "Name")],
            Some(cond("Employees", "EmpNo", Comparison::Gt, "3")),
        );
        let style = Style {
            distinct: true,
            pretty: true,
        };
        assert_eq!(
            to_sql_with(&employees(), &query, style).unwrap(),
            "SELECT DISTINCT Name\nFROM Employees\nWHERE EmpNo > 3"
        );
    }

    #[test]
    fn wildcard_column() {
        let query = def(
            vec![SelectItem {
                field_name: ALL_FIELDS.to_string(),
                ..item("Employees", "Name")
            }],
            None,
        );
        assert_eq!(
            to_sql(&employees(), &query).unwrap(),
            "SELECT * FROM Employees"
        );
    }
}
