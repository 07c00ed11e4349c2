//! Query definitions.
//!
//! A [`QueryDefinition`] is what every builder tier edits, what the XML codec
//! reads and writes, and what the SQL emitter renders. It only refers to
//! tables and fields by name (and optionally by table instance id); it does
//! not borrow from a [`Schema`].
//!
//! [`Schema`]: ../schema/struct.Schema.html

use crate::expr::WhereExpr;
use crate::ops::Comparison;
use crate::schema::Field;

/// A complete query as edited by one builder tier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryDefinition {
    /// Whether the query was last edited with the advanced builder.
    pub is_advanced: bool,
    /// The selected fields.
    pub selects: Vec<SelectItem>,
    /// The tables placed in the query.
    pub tables: Vec<TableRef>,
    /// Explicit join equalities.
    pub joins: Vec<Join>,
    /// The WHERE clause.
    pub filter: Option<WhereExpr>,
}

/// A selected field, also used as a row of the flat builder tiers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectItem {
    pub table_name: String,
    pub field_name: String,
    pub data_type: String,
    /// Whether the field appears in the SELECT list.
    pub displayed: bool,
    /// The value the field is compared against, empty if none.
    pub criteria: String,
    pub operator: Comparison,
    /// Instance id of the table, None if unset.
    pub table_id: Option<i32>,
    pub missing_value_codes: Vec<String>,
}

/// A table placed in the query, with opaque layout hints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableRef {
    pub id: Option<i32>,
    pub name: String,
    pub x: Option<i32>,
    pub y: Option<i32>,
}

/// A reference to a field of a placed table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldRef {
    pub table_id: Option<i32>,
    pub table_name: String,
    pub field_name: String,
}

/// An explicit join equality between two fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Join {
    pub left: FieldRef,
    pub right: FieldRef,
}

impl SelectItem {
    /// Creates a displayed item for a schema field.
    pub fn displayed(table_name: &str, field: &Field) -> SelectItem {
        SelectItem {
            table_name: table_name.to_string(),
            field_name: field.name.clone(),
            data_type: field.data_type.clone(),
            displayed: true,
            missing_value_codes: field.missing_value_codes.clone(),
            ..SelectItem::default()
        }
    }

    /// Returns true if the item carries a criteria value.
    pub fn has_criteria(&self) -> bool {
        !self.criteria.trim().is_empty()
    }

    /// Returns the `(table, field)` key identifying the item.
    pub fn key(&self) -> (String, String) {
        (self.table_name.clone(), self.field_name.clone())
    }

    /// Returns a reference to the item's field.
    pub fn field_ref(&self) -> FieldRef {
        FieldRef {
            table_id: self.table_id,
            table_name: self.table_name.clone(),
            field_name: self.field_name.clone(),
        }
    }

    /// Returns true if the item is a new-entry placeholder with no field.
    pub fn is_blank(&self) -> bool {
        self.table_name.is_empty() && self.field_name.is_empty()
    }
}

impl TableRef {
    /// Creates a reference with no id or position.
    pub fn named(name: &str) -> TableRef {
        TableRef {
            name: name.to_string(),
            ..TableRef::default()
        }
    }
}

impl FieldRef {
    /// Creates a reference with no table id.
    pub fn new(table_name: &str, field_name: &str) -> FieldRef {
        FieldRef {
            table_id: None,
            table_name: table_name.to_string(),
            field_name: field_name.to_string(),
        }
    }
}

impl Join {
    /// Creates a join between `left` and `right`.
    pub fn new(left: FieldRef, right: FieldRef) -> Join {
        Join { left, right }
    }
}

impl QueryDefinition {
    /// Returns true if nothing has been selected or placed.
    pub fn is_empty(&self) -> bool {
        self.selects.is_empty() && self.tables.is_empty()
    }

    /// Resolves a table reference by id when set, otherwise by name.
    pub fn resolve_table(&self, id: Option<i32>, name: &str) -> Option<&TableRef> {
        match id.filter(|&id| id >= 0) {
            Some(id) => self.tables.iter().find(|t| t.id == Some(id)),
            None => self.tables.iter().find(|t| t.name == name),
        }
    }

    /// Resolves the table a field reference belongs to.
    pub fn resolve_field_table(&self, field: &FieldRef) -> Option<&TableRef> {
        self.resolve_table(field.table_id, &field.table_name)
    }

    /// Returns the name of the table `(id, name)` resolves to, or `name`
    /// itself if no placed table matches.
    pub fn table_name<'a>(&'a self, id: Option<i32>, name: &'a str) -> &'a str {
        self.resolve_table(id, name).map_or(name, |t| t.name.as_str())
    }

    /// Returns the name of the table a field reference resolves to.
    pub fn field_table_name<'a>(&'a self, field: &'a FieldRef) -> &'a str {
        self.resolve_field_table(field)
            .map_or(field.table_name.as_str(), |t| t.name.as_str())
    }

    /// Adds a table by name unless one with that name is already placed.
    pub fn ensure_table(&mut self, name: &str) {
        if !self.tables.iter().any(|t| t.name == name) {
            self.tables.push(TableRef::named(name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed() -> QueryDefinition {
        QueryDefinition {
            tables: vec![
                TableRef {
                    id: Some(3),
                    name: "Employees".to_string(),
                    x: Some(10),
                    y: Some(20),
                },
                TableRef {
                    id: Some(7),
                    name: "Employees".to_string(),
                    x: None,
                    y: None,
                },
                TableRef::named("EmpDept"),
            ],
            ..QueryDefinition::default()
        }
    }

    #[test]
    fn resolve_by_id_first() {
        let def = placed();
        assert_eq!(def.resolve_table(Some(7), "Employees").unwrap().id, Some(7));
        assert!(def.resolve_table(Some(9), "Employees").is_none());
    }

    #[test]
    fn resolve_by_name_when_unset() {
        let def = placed();
        assert_eq!(def.resolve_table(None, "Employees").unwrap().id, Some(3));
        assert_eq!(def.resolve_table(Some(-1), "EmpDept").unwrap().name, "EmpDept");
        let field = FieldRef::new("EmpDept", "EmpNo");
        assert_eq!(def.resolve_field_table(&field).unwrap().name, "EmpDept");
    }

    #[test]
    fn table_names_follow_ids() {
        let mut def = placed();
        def.tables[2].id = Some(9);
        assert_eq!(def.table_name(Some(9), "Employees"), "EmpDept");
        assert_eq!(def.table_name(Some(4), "Employees"), "Employees");
        let field = FieldRef {
            table_id: Some(9),
            ..FieldRef::new("Employees", "EmpNo")
        };
        assert_eq!(def.field_table_name(&field), "EmpDept");
    }

    #[test]
    fn ensure_table_is_idempotent() {
        let mut def = placed();
        def.ensure_table("EmpDept");
        def.ensure_table("Depts");
        let names: Vec<_> = def.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Employees", "Employees", "EmpDept", "Depts"]);
    }

    #[test]
    fn empty_definition() {
        assert!(QueryDefinition::default().is_empty());
        assert!(!placed().is_empty());
    }
}
