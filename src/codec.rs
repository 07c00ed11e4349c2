//! Query definition XML.
//!
//! This module reads and writes the `<query>` document format:
//!
//! ```xml
//! <query advanced="false">
//!   <select>
//!     <field tableId="0" tableName="Employees" fieldName="EmpNo"/>
//!   </select>
//!   <tables>
//!     <table name="Employees" id="0" x="40" y="12"/>
//!   </tables>
//!   <joins>
//!     <join>
//!       <left tableName="Employees" fieldName="EmpNo"/>
//!       <right tableName="EmpDept" fieldName="EmpNo"/>
//!     </join>
//!   </joins>
//!   <where>
//!     <AND>
//!       <field tableName="Employees" fieldName="Name" oper="EQ" criteria="Smith"/>
//!       ...
//!     </AND>
//!   </where>
//! </query>
//! ```
//!
//! Parsing resolves every table and field name against a [`Schema`] and
//! stops at the first one that does not resolve. Writing never fails; WHERE
//! operators that are not well-formed are left out.
//!
//! [`Schema`]: ../schema/struct.Schema.html

use std::borrow::Cow;

use tracing::{debug, trace, warn};

use crate::expr::{Condition, WhereExpr};
use crate::ops::{Comparison, Logic, UnknownOperator};
use crate::query::{FieldRef, Join, QueryDefinition, SelectItem, TableRef};
use crate::schema::{Field, Schema, Table, ALL_FIELDS};
use crate::xml::{self, Element, XmlError};

/// Error type for parsing a query document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The document has no `<query>` element.
    #[error("no <query> element")]
    NoQueryNode,
    /// A table name is not in the schema.
    #[error("unknown table `{0}`")]
    BadTableName(String),
    /// A field name is not in its table.
    #[error("unknown field `{table}.{field}`")]
    BadFieldName { table: String, field: String },
    /// The text is not valid XML, or an element or attribute is invalid.
    #[error("malformed query: {0}")]
    Malformed(String),
}

impl From<UnknownOperator> for ParseError {
    fn from(err: UnknownOperator) -> ParseError {
        ParseError::Malformed(err.to_string())
    }
}

impl From<XmlError> for ParseError {
    fn from(err: XmlError) -> ParseError {
        ParseError::Malformed(err.to_string())
    }
}

/// Parses a `<query>` document against `schema`.
pub fn parse(schema: &Schema, text: &str) -> Result<QueryDefinition, ParseError> {
    let root = xml::parse(text)?;
    let node = root.find("query").ok_or(ParseError::NoQueryNode)?;
    let parser = Parser { schema };
    let def = parser.query(node);
    match &def {
        Ok(def) => debug!(
            selects = def.selects.len(),
            tables = def.tables.len(),
            joins = def.joins.len(),
            "parsed query"
        ),
        Err(err) => debug!(%err, "query parse failed"),
    }
    def
}

/// Resolves names against a schema while walking a query element tree.
struct Parser<'a> {
    schema: &'a Schema,
}

impl<'a> Parser<'a> {
    fn query(&self, node: &Element) -> Result<QueryDefinition, ParseError> {
        let mut def = QueryDefinition {
            is_advanced: parse_bool(node, "advanced")?,
            ..QueryDefinition::default()
        };
        if let Some(select) = node.child("select") {
            for field in select.children_named("field") {
                self.select(field, &mut def.selects)?;
            }
        }
        if let Some(tables) = node.child("tables") {
            for table in tables.children_named("table") {
                def.tables.push(self.table_ref(table)?);
            }
        }
        for item in &def.selects {
            self.check_placed(&def, item.table_id, &item.field_name)?;
        }
        if let Some(joins) = node.child("joins") {
            for join in joins.children_named("join") {
                let join = self.join(join)?;
                for side in [&join.left, &join.right] {
                    self.check_placed(&def, side.table_id, &side.field_name)?;
                }
                def.joins.push(join);
            }
        }
        if let Some(filter) = node.child("where") {
            def.filter = match filter.children.as_slice() {
                [] => None,
                [expr] => Some(self.expr(expr)?),
                _ => {
                    return Err(ParseError::Malformed(
                        "<where> has more than one root".to_string(),
                    ))
                }
            };
        }
        Ok(def)
    }

    fn table(&self, name: &str) -> Result<&'a Table, ParseError> {
        self.schema
            .table(name)
            .ok_or_else(|| ParseError::BadTableName(name.to_string()))
    }

    fn field(&self, table: &'a Table, name: &str) -> Result<&'a Field, ParseError> {
        table.field(name).ok_or_else(|| ParseError::BadFieldName {
            table: table.name.clone(),
            field: name.to_string(),
        })
    }

    /// Appends the items for one `<select><field>`, expanding `*`.
    fn select(&self, node: &Element, selects: &mut Vec<SelectItem>) -> Result<(), ParseError> {
        let table = self.table(required(node, "tableName")?)?;
        let table_id = parse_id(node, "tableId")?;
        let field_name = required(node, "fieldName")?;
        if field_name == ALL_FIELDS {
            trace!(table = %table.name, "expanding wildcard");
            for field in &table.fields {
                selects.push(SelectItem {
                    table_id,
                    ..SelectItem::displayed(&table.name, field)
                });
            }
            return Ok(());
        }
        let field = self.field(table, field_name)?;
        selects.push(SelectItem {
            table_id,
            ..SelectItem::displayed(&table.name, field)
        });
        Ok(())
    }

    fn table_ref(&self, node: &Element) -> Result<TableRef, ParseError> {
        let table = self.table(required(node, "name")?)?;
        Ok(TableRef {
            id: parse_id(node, "id")?,
            name: table.name.clone(),
            x: parse_id(node, "x")?,
            y: parse_id(node, "y")?,
        })
    }

    fn field_ref(&self, node: &Element) -> Result<FieldRef, ParseError> {
        let table = self.table(required(node, "tableName")?)?;
        let field = self.field(table, required(node, "fieldName")?)?;
        Ok(FieldRef {
            table_id: parse_id(node, "tableId")?,
            table_name: table.name.clone(),
            field_name: field.name.clone(),
        })
    }

    /// Checks that a set table id names a placed table that has the field.
    fn check_placed(
        &self,
        def: &QueryDefinition,
        table_id: Option<i32>,
        field_name: &str,
    ) -> Result<(), ParseError> {
        let id = match table_id {
            Some(id) => id,
            None => return Ok(()),
        };
        let placed = def
            .resolve_table(table_id, "")
            .ok_or_else(|| ParseError::Malformed(format!("tableId {} matches no placed table", id)))?;
        self.field(self.table(&placed.name)?, field_name).map(|_| ())
    }

    fn join(&self, node: &Element) -> Result<Join, ParseError> {
        let side = |name: &str| {
            node.child(name)
                .ok_or_else(|| ParseError::Malformed(format!("<join> is missing <{}>", name)))
                .and_then(|side| self.field_ref(side))
        };
        Ok(Join::new(side("left")?, side("right")?))
    }

    fn expr(&self, node: &Element) -> Result<WhereExpr, ParseError> {
        match node.name.as_str() {
            "field" => self.condition(node).map(WhereExpr::Condition),
            "AND" | "OR" => {
                let kind = node.name.parse::<Logic>()?;
                let children = node
                    .children
                    .iter()
                    .map(|child| self.expr(child))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(WhereExpr::operator(kind, children))
            }
            other => Err(ParseError::Malformed(format!(
                "unexpected <{}> in <where>",
                other
            ))),
        }
    }

    fn condition(&self, node: &Element) -> Result<Condition, ParseError> {
        let table = self.table(required(node, "tableName")?)?;
        let field = self.field(table, required(node, "fieldName")?)?;
        let operator = node.attr("oper").unwrap_or("").parse::<Comparison>()?;
        Ok(Condition {
            table_name: table.name.clone(),
            field_name: field.name.clone(),
            data_type: field.data_type.clone(),
            operator,
            criteria: node.attr("criteria").unwrap_or("").to_string(),
        })
    }
}

fn required<'e>(node: &'e Element, key: &str) -> Result<&'e str, ParseError> {
    node.attr(key)
        .ok_or_else(|| ParseError::Malformed(format!("<{}> is missing `{}`", node.name, key)))
}

/// Parses an optional integer attribute; negative values mean unset.
fn parse_id(node: &Element, key: &str) -> Result<Option<i32>, ParseError> {
    match node.attr(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<i32>()
            .map(|v| if v >= 0 { Some(v) } else { None })
            .map_err(|_| {
                ParseError::Malformed(format!("`{}` of <{}> is not an integer: {}", key, node.name, text))
            }),
    }
}

fn parse_bool(node: &Element, key: &str) -> Result<bool, ParseError> {
    match node.attr(key).map(str::trim) {
        None | Some("") => Ok(false),
        Some(text) if text.eq_ignore_ascii_case("true") => Ok(true),
        Some(text) if text.eq_ignore_ascii_case("false") => Ok(false),
        Some(text) => Err(ParseError::Malformed(format!(
            "`{}` is not a boolean: {}",
            key, text
        ))),
    }
}

/// Writes a query definition as a `<query>` document.
///
/// Returns the empty string if the definition selects and places nothing.
pub fn emit(def: &QueryDefinition) -> String {
    if def.is_empty() {
        return String::new();
    }
    let mut w = xml::Writer::new();
    let advanced = if def.is_advanced { "true" } else { "false" };
    w.open("query", &[("advanced", Cow::Borrowed(advanced))]);

    w.open("select", &[]);
    for item in &def.selects {
        let mut attrs = vec![];
        push_id(&mut attrs, "tableId", item.table_id);
        attrs.push(("tableName", Cow::Borrowed(item.table_name.as_str())));
        attrs.push(("fieldName", Cow::Borrowed(item.field_name.as_str())));
        w.empty("field", &attrs);
    }
    w.close("select");

    w.open("tables", &[]);
    for table in &def.tables {
        let mut attrs = vec![("name", Cow::Borrowed(table.name.as_str()))];
        push_id(&mut attrs, "id", table.id);
        push_id(&mut attrs, "x", table.x);
        push_id(&mut attrs, "y", table.y);
        w.empty("table", &attrs);
    }
    w.close("tables");

    if !def.joins.is_empty() {
        w.open("joins", &[]);
        for join in &def.joins {
            w.open("join", &[]);
            w.empty("left", &field_ref_attrs(&join.left));
            w.empty("right", &field_ref_attrs(&join.right));
            w.close("join");
        }
        w.close("joins");
    }

    if let Some(filter) = &def.filter {
        match filter.pruned() {
            Some(filter) => {
                w.open("where", &[]);
                emit_expr(&mut w, &filter);
                w.close("where");
            }
            None => warn!(%filter, "WHERE expression has no well-formed content, omitted"),
        }
    }

    w.close("query");
    w.finish()
}

/// Writes a WHERE node, leaving out children that do not qualify.
fn emit_expr(w: &mut xml::Writer, expr: &WhereExpr) {
    match expr {
        WhereExpr::Condition(cond) => {
            w.empty(
                "field",
                &[
                    ("tableName", Cow::Borrowed(cond.table_name.as_str())),
                    ("fieldName", Cow::Borrowed(cond.field_name.as_str())),
                    ("oper", Cow::Borrowed(cond.operator.name())),
                    ("criteria", Cow::Borrowed(cond.criteria.as_str())),
                ],
            );
        }
        WhereExpr::Operator(op) => {
            w.open(op.kind.name(), &[]);
            for child in op.qualifying_children() {
                emit_expr(w, child);
            }
            w.close(op.kind.name());
        }
    }
}

fn push_id<'a>(attrs: &mut Vec<(&'static str, Cow<'a, str>)>, key: &'static str, value: Option<i32>) {
    if let Some(value) = value.filter(|&v| v >= 0) {
        attrs.push((key, Cow::Owned(value.to_string())));
    }
}

fn field_ref_attrs(field: &FieldRef) -> Vec<(&'static str, Cow<'_, str>)> {
    let mut attrs = vec![];
    push_id(&mut attrs, "tableId", field.table_id);
    attrs.push(("tableName", Cow::Borrowed(field.table_name.as_str())));
    attrs.push(("fieldName", Cow::Borrowed(field.field_name.as_str())));
    attrs
}
