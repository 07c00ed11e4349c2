//! Table and field descriptions.
//!
//! A [`Schema`] lists the tables a query can draw from. It is built once,
//! usually by parsing a `<schema>` document, and only read afterwards. This
//! module also implements the schema half of the XML codec:
//!
//! ```xml
//! <schema>
//!   <table name="Employees">
//!     <field name="EmpNo" dataType="int" keyType="PRIMARYKEY">
//!       <missingValueCodeList>
//!         <missingValueCode>-9</missingValueCode>
//!       </missingValueCodeList>
//!     </field>
//!   </table>
//! </schema>
//! ```

use std::borrow::Cow;
use std::str::FromStr;

use tracing::debug;

use crate::xml::{self, Element, XmlError};

/// The reserved pseudo-field meaning "all fields of the table".
pub const ALL_FIELDS: &str = "*";

/// A database schema: an ordered list of tables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// The tables, in document order.
    pub tables: Vec<Table>,
}

/// A table and its fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    /// The table name.
    pub name: String,
    /// The fields, in document order. Names are unique.
    pub fields: Vec<Field>,
}

/// A field of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    /// The field name.
    pub name: String,
    /// The declared data type, such as `int` or `string`.
    pub data_type: String,
    /// Whether the field is part of a key.
    pub key: KeyKind,
    /// Values that stand for "missing" in this field's data.
    pub missing_value_codes: Vec<String>,
}

/// The key role of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyKind {
    #[default]
    None,
    Primary,
    Secondary,
}

/// Error type for parsing a schema document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The text is not well-formed XML.
    #[error(transparent)]
    Xml(#[from] XmlError),
    /// The document has no `<schema>` element.
    #[error("no <schema> element")]
    NoSchemaNode,
    /// A required attribute is missing or an attribute value is invalid.
    #[error("malformed schema: {0}")]
    Malformed(String),
    /// Two fields of one table share a name.
    #[error("duplicate field `{field}` in table `{table}`")]
    DuplicateField { table: String, field: String },
    /// Two tables share a name.
    #[error("duplicate table `{0}`")]
    DuplicateTable(String),
}

impl KeyKind {
    /// Returns the `keyType` attribute value.
    pub fn name(self) -> &'static str {
        match self {
            KeyKind::None => "",
            KeyKind::Primary => "PRIMARYKEY",
            KeyKind::Secondary => "SECONDARYKEY",
        }
    }
}

impl FromStr for KeyKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<KeyKind, SchemaError> {
        match s.trim() {
            "" => Ok(KeyKind::None),
            "PRIMARYKEY" => Ok(KeyKind::Primary),
            "SECONDARYKEY" => Ok(KeyKind::Secondary),
            other => Err(SchemaError::Malformed(format!("unknown keyType `{}`", other))),
        }
    }
}

impl Schema {
    /// Returns the table named `name`.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns the field `field` of the table `table`.
    pub fn resolve_field(&self, table: &str, field: &str) -> Option<&Field> {
        self.table(table)?.field(field)
    }

    /// Returns the data type of `table.field`, or the empty string.
    pub fn data_type(&self, table: &str, field: &str) -> &str {
        self.resolve_field(table, field)
            .map_or("", |f| f.data_type.as_str())
    }
}

impl Table {
    /// Returns the field named `name`.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the first primary key field, if any.
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == KeyKind::Primary)
    }
}

impl Field {
    /// Returns true if values of this type are written as quoted text in SQL.
    pub fn is_textual(&self) -> bool {
        is_textual(&self.data_type)
    }
}

/// Returns true if `data_type` names a string-like type.
pub fn is_textual(data_type: &str) -> bool {
    let lower = data_type.trim().to_ascii_lowercase();
    let base = lower.split('(').next().unwrap_or("").trim();
    matches!(
        base,
        "string" | "str" | "text" | "char" | "character" | "varchar" | "nvarchar" | "nchar"
    )
}

/// Parses a `<schema>` document.
pub fn parse(text: &str) -> Result<Schema, SchemaError> {
    let root = xml::parse(text)?;
    let node = root.find("schema").ok_or(SchemaError::NoSchemaNode)?;
    let mut schema = Schema::default();
    for table_node in node.children_named("table") {
        let table = parse_table(table_node)?;
        if schema.table(&table.name).is_some() {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        schema.tables.push(table);
    }
    debug!(tables = schema.tables.len(), "parsed schema");
    Ok(schema)
}

fn parse_table(node: &Element) -> Result<Table, SchemaError> {
    let name = required(node, "name")?;
    let mut table = Table {
        name: name.to_string(),
        fields: vec![],
    };
    for field_node in node.children_named("field") {
        let field = parse_field(field_node)?;
        if field.name == ALL_FIELDS {
            return Err(SchemaError::Malformed(format!(
                "table `{}` declares the reserved field `*`",
                table.name
            )));
        }
        if table.field(&field.name).is_some() {
            return Err(SchemaError::DuplicateField {
                table: table.name,
                field: field.name,
            });
        }
        table.fields.push(field);
    }
    Ok(table)
}

fn parse_field(node: &Element) -> Result<Field, SchemaError> {
    let name = required(node, "name")?;
    let data_type = node.attr_ignore_case("dataType").unwrap_or("");
    let key = node.attr("keyType").unwrap_or("").parse()?;
    let missing_value_codes = node
        .child("missingValueCodeList")
        .map(|list| {
            list.children_named("missingValueCode")
                .map(|code| code.text.clone())
                .collect()
        })
        .unwrap_or_default();
    Ok(Field {
        name: name.to_string(),
        data_type: data_type.to_string(),
        key,
        missing_value_codes,
    })
}

fn required<'a>(node: &'a Element, key: &str) -> Result<&'a str, SchemaError> {
    node.attr(key).ok_or_else(|| {
        SchemaError::Malformed(format!("<{}> is missing `{}`", node.name, key))
    })
}

/// Writes a schema as a `<schema>` document.
pub fn emit(schema: &Schema) -> String {
    let mut w = xml::Writer::new();
    w.open("schema", &[]);
    for table in &schema.tables {
        w.open("table", &[("name", Cow::Borrowed(table.name.as_str()))]);
        for field in &table.fields {
            let mut attrs = vec![
                ("name", Cow::Borrowed(field.name.as_str())),
                ("dataType", Cow::Borrowed(field.data_type.as_str())),
            ];
            if field.key != KeyKind::None {
                attrs.push(("keyType", Cow::Borrowed(field.key.name())));
            }
            if field.missing_value_codes.is_empty() {
                w.empty("field", &attrs);
                continue;
            }
            w.open("field", &attrs);
            w.open("missingValueCodeList", &[]);
            for code in &field.missing_value_codes {
                w.text("missingValueCode", code);
            }
            w.close("missingValueCodeList");
            w.close("field");
        }
        w.close("table");
    }
    w.close("schema");
    w.finish()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    /// The schema shared by tests across the crate.
    pub(crate) const EMPLOYEES: &str = r#"
        <schema>
          <table name="Employees">
            <field name="EmpNo" dataType="int" keyType="PRIMARYKEY"/>
            <field name="Name" dataType="string"/>
          </table>
          <table name="EmpDept">
            <field name="EmpNo" dataType="int" keyType="SECONDARYKEY"/>
            <field name="DeptNo" dataType="int">
              <missingValueCodeList>
                <missingValueCode>-9</missingValueCode>
                <missingValueCode>-8</missingValueCode>
              </missingValueCodeList>
            </field>
          </table>
          <table name="Dept Names">
            <field name="DeptNo" dataType="int" keyType="PRIMARYKEY"/>
            <field name="Dept Name" dataType="varchar(40)"/>
          </table>
        </schema>"#;

    pub(crate) fn employees() -> Schema {
        parse(EMPLOYEES).unwrap()
    }

    #[test]
    fn parse_tables_and_fields() {
        let schema = employees();
        let names: Vec<_> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Employees", "EmpDept", "Dept Names"]);
        let dept_no = schema.resolve_field("EmpDept", "DeptNo").unwrap();
        assert_eq!(dept_no.data_type, "int");
        assert_eq!(dept_no.key, KeyKind::None);
        assert_eq!(dept_no.missing_value_codes, vec!["-9", "-8"]);
    }

    #[test]
    fn primary_keys() {
        let schema = employees();
        let key = schema.table("Employees").unwrap().primary_key().unwrap();
        assert_eq!(key.name, "EmpNo");
        assert!(schema.table("EmpDept").unwrap().primary_key().is_none());
    }

    #[test]
    fn lowercase_datatype_attribute() {
        let schema = parse(r#"<schema><table name="T"><field name="a" datatype="text"/></table></schema>"#)
            .unwrap();
        assert_eq!(schema.data_type("T", "a"), "text");
    }

    #[test]
    fn textual_types() {
        assert!(is_textual("string"));
        assert!(is_textual("VARCHAR(40)"));
        assert!(!is_textual("int"));
        assert!(!is_textual(""));
    }

    #[test]
    fn missing_schema_node() {
        assert_eq!(parse("<query/>"), Err(SchemaError::NoSchemaNode));
    }

    #[test]
    fn duplicate_field() {
        let text = r#"<schema><table name="T"><field name="a"/><field name="a"/></table></schema>"#;
        assert_eq!(
            parse(text),
            Err(SchemaError::DuplicateField {
                table: "T".to_string(),
                field: "a".to_string(),
            })
        );
    }

    #[test]
    fn reserved_field() {
        let text = r#"<schema><table name="T"><field name="*"/></table></schema>"#;
        assert!(matches!(parse(text), Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn bad_key_type() {
        let text = r#"<schema><table name="T"><field name="a" keyType="FOREIGN"/></table></schema>"#;
        assert!(matches!(parse(text), Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn emit_parses_back() {
        let schema = employees();
        let text = emit(&schema);
        assert_eq!(parse(&text).unwrap(), schema);
        assert_eq!(emit(&parse(&text).unwrap()), text);
    }

    #[test]
    fn emit_layout() {
        let schema = Schema {
            tables: vec![Table {
                name: "T".to_string(),
                fields: vec![Field {
                    name: "a".to_string(),
                    data_type: "int".to_string(),
                    key: KeyKind::Primary,
                    missing_value_codes: vec!["0".to_string()],
                }],
            }],
        };
        assert_eq!(
            emit(&schema),
            "<schema>\n  <table name=\"T\">\n    \
             <field name=\"a\" dataType=\"int\" keyType=\"PRIMARYKEY\">\n      \
             <missingValueCodeList>\n        \
             <missingValueCode>0</missingValueCode>\n      \
             </missingValueCodeList>\n    </field>\n  </table>\n</schema>\n"
        );
    }
}
