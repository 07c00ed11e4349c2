//! Builder tiers.
//!
//! Queries are edited at one of three tiers of increasing expressiveness:
//!
//! * **Standard**: a flat list of rows, one connective (AND or OR) applied to
//!   every row with criteria, and no explicit joins. A row comparing a field
//!   for equality with another qualified `table.field` name is an implicit
//!   join rather than a filter.
//! * **Intermediate**: the same flat rows plus an explicit join graph.
//! * **Advanced**: an arbitrary WHERE tree, explicit joins and free table
//!   placement, i.e. a plain [`QueryDefinition`].
//!
//! Switching tiers goes through a [`QueryDefinition`]: the current state is
//! filled into a definition, which is then built into the target tier. A
//! state is moved into [`TierState::switch`] and handed back unchanged if
//! the target tier cannot hold it.
//!
//! [`QueryDefinition`]: ../query/struct.QueryDefinition.html

use std::fmt;

use tracing::{debug, trace};

use crate::expr::{Complexity, Condition, WhereExpr};
use crate::map::OrderMap;
use crate::ops::{Comparison, Logic};
use crate::query::{FieldRef, Join, QueryDefinition, SelectItem, TableRef};
use crate::schema::Schema;
use crate::util::{split_qualified, Qualified};

/// A builder tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Standard,
    Intermediate,
    Advanced,
}

/// The rows of a Standard or Intermediate builder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlatQuery {
    /// One row per field; rows may repeat a field.
    pub rows: Vec<SelectItem>,
    /// The connective applied to every row with criteria.
    pub logic: Logic,
    /// Explicit joins; always empty at the Standard tier.
    pub joins: Vec<Join>,
    /// Placed tables, carried through unchanged.
    pub tables: Vec<TableRef>,
}

/// The state held by whichever builder is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierState {
    Standard(FlatQuery),
    Intermediate(FlatQuery),
    Advanced(QueryDefinition),
}

/// Reasons a definition cannot be built at a tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The definition refers to something the schema does not have.
    #[error("invalid query definition: {0}")]
    Invalid(String),
    /// The WHERE tree mixes connectives.
    #[error("WHERE clause is too complex for a single connective")]
    TooComplexWhere,
    /// Explicit joins cannot be flattened into OR-connected rows.
    #[error("joins cannot be combined with OR criteria")]
    TooComplexJoins,
}

/// A failed tier switch, returning the state that was moved in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot switch to the {target} tier: {reason}")]
pub struct Rejected {
    pub state: TierState,
    pub target: Tier,
    pub reason: BuildError,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Tier::Standard => "standard",
            Tier::Intermediate => "intermediate",
            Tier::Advanced => "advanced",
        })
    }
}

/// Returns why a definition edited at `from` cannot move to `to`, if it
/// cannot.
fn conversion_blocker(from: Tier, to: Tier, def: &QueryDefinition) -> Option<BuildError> {
    let complex = || WhereExpr::classify(def.filter.as_ref()) == Complexity::TooComplex;
    match (from, to) {
        (_, _) if from == to => None,
        (Tier::Standard, _) | (Tier::Intermediate, Tier::Advanced) => None,
        (Tier::Intermediate, Tier::Standard) if !def.joins.is_empty() => {
            Some(BuildError::TooComplexJoins)
        }
        (Tier::Intermediate, _) => None,
        (Tier::Advanced, _) if complex() => Some(BuildError::TooComplexWhere),
        (Tier::Advanced, Tier::Standard) if !def.joins.is_empty() => {
            Some(BuildError::TooComplexJoins)
        }
        (Tier::Advanced, _) => None,
    }
}

/// Returns true if a definition edited at `from` can be shown at `to`.
pub fn can_convert(from: Tier, to: Tier, def: &QueryDefinition) -> bool {
    conversion_blocker(from, to, def).is_none()
}

/// Builds the state of the `target` tier from a definition.
pub fn build(schema: &Schema, def: &QueryDefinition, target: Tier) -> Result<TierState, BuildError> {
    debug!(%target, selects = def.selects.len(), joins = def.joins.len(), "building tier state");
    match target {
        Tier::Advanced => Ok(TierState::Advanced(QueryDefinition {
            is_advanced: true,
            ..def.clone()
        })),
        Tier::Intermediate => build_flat(schema, def, true).map(TierState::Intermediate),
        Tier::Standard => build_flat(schema, def, false).map(TierState::Standard),
    }
}

/// Flattens a definition into rows.
///
/// With `keep_joins` the joins stay explicit; otherwise each becomes a row
/// comparing its left field for equality with its right field's name.
fn build_flat(schema: &Schema, def: &QueryDefinition, keep_joins: bool) -> Result<FlatQuery, BuildError> {
    let mut logic = match WhereExpr::classify(def.filter.as_ref()) {
        Complexity::TooComplex => return Err(BuildError::TooComplexWhere),
        Complexity::Simple(kind) => kind.unwrap_or_default(),
    };

    let mut index: OrderMap<(String, String), SelectItem> = OrderMap::new();
    for item in &def.selects {
        if !index.contains(&item.key()) {
            index.insert(item.key(), item.clone());
        }
    }

    let mut rows = vec![];
    if let Some(filter) = def.filter.as_ref().and_then(WhereExpr::pruned) {
        for cond in filter.conditions() {
            let key = (cond.table_name.clone(), cond.field_name.clone());
            let row = match index.remove(&key) {
                Some(item) => {
                    trace!(table = %cond.table_name, field = %cond.field_name, "criteria covers a selected field");
                    SelectItem {
                        criteria: cond.criteria.clone(),
                        operator: cond.operator,
                        ..item
                    }
                }
                None => criteria_row(schema, def, cond)?,
            };
            rows.push(row);
        }
    }
    rows.extend(index.into_values());

    let mut joins = vec![];
    if keep_joins {
        joins = def.joins.clone();
    } else if !def.joins.is_empty() {
        let criteria_rows = rows.iter().filter(|r| r.has_criteria()).count();
        if logic == Logic::Or && criteria_rows > 1 {
            return Err(BuildError::TooComplexJoins);
        }
        logic = Logic::And;
        for join in &def.joins {
            rows.push(join_row(schema, def, join)?);
        }
    }

    Ok(FlatQuery {
        rows,
        logic,
        joins,
        tables: def.tables.clone(),
    })
}

/// Makes a row for a condition on a field that is not selected.
fn criteria_row(schema: &Schema, def: &QueryDefinition, cond: &Condition) -> Result<SelectItem, BuildError> {
    let field = schema
        .resolve_field(&cond.table_name, &cond.field_name)
        .ok_or_else(|| unknown_field(&cond.table_name, &cond.field_name))?;
    let data_type = if cond.data_type.is_empty() {
        field.data_type.clone()
    } else {
        cond.data_type.clone()
    };
    Ok(SelectItem {
        table_name: cond.table_name.clone(),
        field_name: cond.field_name.clone(),
        data_type,
        displayed: false,
        criteria: cond.criteria.clone(),
        operator: cond.operator,
        table_id: def.resolve_table(None, &cond.table_name).and_then(|t| t.id),
        missing_value_codes: field.missing_value_codes.clone(),
    })
}

/// Makes the implicit join row standing for an explicit join.
///
/// Both sides name the table their id resolves to, if set.
fn join_row(schema: &Schema, def: &QueryDefinition, join: &Join) -> Result<SelectItem, BuildError> {
    let left = &join.left;
    let right = &join.right;
    let left_table = def.field_table_name(left);
    let right_table = def.field_table_name(right);
    let field = schema
        .resolve_field(left_table, &left.field_name)
        .ok_or_else(|| unknown_field(left_table, &left.field_name))?;
    if schema.resolve_field(right_table, &right.field_name).is_none() {
        return Err(unknown_field(right_table, &right.field_name));
    }
    Ok(SelectItem {
        table_name: left_table.to_string(),
        field_name: left.field_name.clone(),
        data_type: field.data_type.clone(),
        displayed: false,
        criteria: Qualified(right_table, &right.field_name).to_string(),
        operator: Comparison::Eq,
        table_id: left.table_id,
        missing_value_codes: field.missing_value_codes.clone(),
    })
}

fn unknown_field(table: &str, field: &str) -> BuildError {
    BuildError::Invalid(format!("unknown field {}", Qualified(table, field)))
}

/// Returns the field a row is joined to, if the row is an implicit join.
fn implicit_join(schema: &Schema, tables: &[TableRef], row: &SelectItem) -> Option<FieldRef> {
    if row.operator != Comparison::Eq {
        return None;
    }
    let (table, field) = split_qualified(&row.criteria)?;
    let field = schema.resolve_field(table, field)?;
    let table_id = tables.iter().find(|t| t.name == table).and_then(|t| t.id);
    Some(FieldRef {
        table_id,
        table_name: table.to_string(),
        field_name: field.name.clone(),
    })
}

impl FlatQuery {
    /// Collects the rows back into a definition.
    fn fill(&self, schema: &Schema) -> QueryDefinition {
        let mut def = QueryDefinition {
            is_advanced: false,
            tables: self.tables.clone(),
            joins: self.joins.clone(),
            ..QueryDefinition::default()
        };
        let mut conds = vec![];
        for row in self.rows.iter().filter(|r| !r.is_blank()) {
            def.ensure_table(&row.table_name);
            if row.displayed {
                def.selects.push(SelectItem {
                    criteria: String::new(),
                    operator: Comparison::None,
                    ..row.clone()
                });
            }
            if !row.has_criteria() {
                continue;
            }
            match implicit_join(schema, &self.tables, row) {
                Some(right) => {
                    trace!(table = %row.table_name, field = %row.field_name, criteria = %row.criteria, "implicit join");
                    def.ensure_table(&right.table_name);
                    def.joins.push(Join::new(row.field_ref(), right));
                }
                None => conds.push(WhereExpr::Condition(Condition {
                    table_name: row.table_name.clone(),
                    field_name: row.field_name.clone(),
                    data_type: row.data_type.clone(),
                    operator: row.operator,
                    criteria: row.criteria.clone(),
                })),
            }
        }
        def.filter = match conds.len() {
            0 => None,
            1 => conds.pop(),
            _ => Some(WhereExpr::operator(self.logic, conds)),
        };
        def
    }
}

impl TierState {
    /// Returns the tier this state belongs to.
    pub fn tier(&self) -> Tier {
        match self {
            TierState::Standard(_) => Tier::Standard,
            TierState::Intermediate(_) => Tier::Intermediate,
            TierState::Advanced(_) => Tier::Advanced,
        }
    }

    /// Returns why this state cannot move to `to`, if it cannot.
    fn blocker(&self, to: Tier) -> Option<BuildError> {
        match self {
            TierState::Standard(_) => None,
            TierState::Intermediate(flat) if to == Tier::Standard && !flat.joins.is_empty() => {
                Some(BuildError::TooComplexJoins)
            }
            TierState::Intermediate(_) => None,
            TierState::Advanced(def) => conversion_blocker(Tier::Advanced, to, def),
        }
    }

    /// Returns true if this state can be shown at the tier `to`.
    pub fn can_convert_to(&self, to: Tier) -> bool {
        self.blocker(to).is_none()
    }

    /// Collects the state into a query definition.
    pub fn fill(&self, schema: &Schema) -> QueryDefinition {
        let def = match self {
            TierState::Standard(flat) | TierState::Intermediate(flat) => flat.fill(schema),
            TierState::Advanced(def) => def.clone(),
        };
        debug!(tier = %self.tier(), selects = def.selects.len(), joins = def.joins.len(), "filled query definition");
        def
    }

    /// Moves the state to the tier `to`.
    ///
    /// On failure the state is handed back inside the error.
    pub fn switch(self, schema: &Schema, to: Tier) -> Result<TierState, Rejected> {
        if self.tier() == to {
            return Ok(self);
        }
        let reject = |state, reason| Rejected {
            state,
            target: to,
            reason,
        };
        if let Some(reason) = self.blocker(to) {
            debug!(from = %self.tier(), %to, %reason, "tier switch refused");
            return Err(reject(self, reason));
        }
        let def = self.fill(schema);
        match build(schema, &def, to) {
            Ok(state) => Ok(state),
            Err(reason) => Err(reject(self, reason)),
        }
    }
}
