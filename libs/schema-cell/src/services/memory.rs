use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult, ValidationError};
use crate::models::Entity;
use crate::schema::{ReferentialAction, Row, Schema, TableDef, CLINIC_SCHEMA, PRIMARY_KEY};
use crate::services::store::{EntityStore, Filter};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i32, Row>,
    last_id: i32,
}

impl Table {
    fn find_by(&self, column: &str, value: &Value) -> impl Iterator<Item = i32> + '_ {
        let value = value.clone();
        let column = column.to_string();
        self.rows
            .iter()
            .filter(move |(_, row)| row.get(&column) == Some(&value))
            .map(|(id, _)| *id)
    }
}

/// In-process relational store.
///
/// Each write validates, checks unique and foreign-key constraints and
/// applies its changes under one write lock, so concurrent writers racing on
/// a unique value are arbitrated the way a database constraint would.
pub struct MemoryStore {
    schema: &'static Schema,
    tables: RwLock<HashMap<&'static str, Table>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_schema(&CLINIC_SCHEMA)
    }

    pub fn with_schema(schema: &'static Schema) -> Self {
        let tables = schema
            .tables
            .iter()
            .map(|t| (t.name, Table::default()))
            .collect();

        Self {
            schema,
            tables: RwLock::new(tables),
        }
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    fn registered(&self, table: &'static TableDef) -> StoreResult<()> {
        if self.schema.table(table.name).is_some() {
            Ok(())
        } else {
            Err(StoreError::Backend(format!("table '{}' is not part of this store's schema", table.name)))
        }
    }

    fn decode<E: Entity>(row: &Row) -> StoreResult<E> {
        Ok(serde_json::from_value(Value::Object(row.clone()))?)
    }
}

/// Plain text for strings, JSON form for everything else.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn check_unique(
    tables: &HashMap<&'static str, Table>,
    table: &'static TableDef,
    row: &Row,
    own_id: Option<i32>,
) -> StoreResult<()> {
    let Some(existing) = tables.get(table.name) else { return Ok(()) };

    for column in table.unique_columns() {
        let value = match row.get(column.name) {
            Some(Value::Null) | None => continue,
            Some(value) => value,
        };
        if existing.find_by(column.name, value).any(|id| Some(id) != own_id) {
            warn!("Unique constraint violated on {}.{}", table.name, column.name);
            return Err(StoreError::UniqueViolation {
                table: table.name,
                column: column.name.to_string(),
                value: display_value(value),
            });
        }
    }

    Ok(())
}

fn check_foreign_keys(
    tables: &HashMap<&'static str, Table>,
    table: &'static TableDef,
    row: &Row,
) -> StoreResult<()> {
    for fk in table.foreign_keys {
        let value = match row.get(fk.column) {
            Some(Value::Null) | None => continue,
            Some(value) => value,
        };
        let exists = value
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .and_then(|id| tables.get(fk.references).map(|t| t.rows.contains_key(&id)))
            .unwrap_or(false);

        if !exists {
            warn!(
                "Foreign key violated: {}.{} -> {} ({})",
                table.name, fk.column, fk.references, value
            );
            return Err(StoreError::ForeignKeyViolation {
                table: table.name,
                column: fk.column.to_string(),
                referenced_table: fk.references.to_string(),
                value: display_value(value),
            });
        }
    }

    Ok(())
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert_json<E: Entity>(&self, payload: Value) -> StoreResult<E> {
        let table = E::table();
        self.registered(table)?;
        debug!("Inserting into {}", table.name);

        let Value::Object(row) = payload else {
            return Err(ValidationError::NotAnObject { table: table.name }.into());
        };
        let mut row = table.validate_insert(row)?;

        let mut tables = self.tables.write().await;
        check_unique(&tables, table, &row, None)?;
        check_foreign_keys(&tables, table, &row)?;

        let entry = tables.entry(table.name).or_default();
        let id = entry
            .last_id
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend(format!("ids exhausted for table '{}'", table.name)))?;
        row.insert(PRIMARY_KEY.to_string(), Value::from(id));
        let entity = Self::decode::<E>(&row)?;
        entry.last_id = id;
        entry.rows.insert(id, row);

        debug!("Inserted {} row {}", table.name, id);
        Ok(entity)
    }

    async fn get<E: Entity>(&self, id: i32) -> StoreResult<Option<E>> {
        let table = E::table();
        self.registered(table)?;

        let tables = self.tables.read().await;
        tables
            .get(table.name)
            .and_then(|t| t.rows.get(&id))
            .map(Self::decode::<E>)
            .transpose()
    }

    async fn list<E: Entity>(&self, filter: &Filter) -> StoreResult<Vec<E>> {
        let table = E::table();
        self.registered(table)?;
        filter.validate(table)?;

        let tables = self.tables.read().await;
        let Some(rows) = tables.get(table.name).map(|t| &t.rows) else {
            return Ok(Vec::new());
        };
        rows.values()
            .filter(|row| filter.matches(row))
            .map(Self::decode::<E>)
            .collect()
    }

    async fn update<E: Entity>(&self, id: i32, changes: &E::Update) -> StoreResult<E> {
        let table = E::table();
        self.registered(table)?;
        debug!("Updating {} row {}", table.name, id);

        let Value::Object(patch) = serde_json::to_value(changes)? else {
            return Err(ValidationError::NotAnObject { table: table.name }.into());
        };
        table.validate_update(&patch)?;

        let mut tables = self.tables.write().await;
        let mut merged = tables
            .get(table.name)
            .and_then(|t| t.rows.get(&id))
            .cloned()
            .ok_or(StoreError::NotFound { table: table.name, id })?;
        merged.extend(patch);

        check_unique(&tables, table, &merged, Some(id))?;
        check_foreign_keys(&tables, table, &merged)?;

        let entity = Self::decode::<E>(&merged)?;
        if let Some(t) = tables.get_mut(table.name) {
            t.rows.insert(id, merged);
        }
        Ok(entity)
    }

    async fn delete<E: Entity>(&self, id: i32) -> StoreResult<bool> {
        let table = E::table();
        self.registered(table)?;

        let mut tables = self.tables.write().await;
        if !tables.get(table.name).is_some_and(|t| t.rows.contains_key(&id)) {
            return Ok(false);
        }

        // Collect the full cascade before touching anything so a restricted
        // reference anywhere in the tree leaves every table unchanged.
        let mut doomed: BTreeSet<(&'static str, i32)> = BTreeSet::new();
        let mut pending = vec![(table.name, id)];
        let mut nulled: Vec<(&'static str, i32, &'static str)> = Vec::new();
        let mut restricted: Vec<(&'static str, i32, &'static str)> = Vec::new();
        doomed.insert((table.name, id));

        while let Some((parent, parent_id)) = pending.pop() {
            for (child, fk) in self.schema.referencing(parent) {
                let Some(rows) = tables.get(child.name) else { continue };
                for child_id in rows.find_by(fk.column, &Value::from(parent_id)) {
                    match fk.on_delete {
                        ReferentialAction::Cascade => {
                            if doomed.insert((child.name, child_id)) {
                                pending.push((child.name, child_id));
                            }
                        }
                        ReferentialAction::SetNull => nulled.push((child.name, child_id, fk.column)),
                        ReferentialAction::Restrict => restricted.push((child.name, child_id, fk.column)),
                    }
                }
            }
        }

        if let Some((child, _, column)) = restricted
            .iter()
            .find(|(child, child_id, _)| !doomed.contains(&(*child, *child_id)))
        {
            warn!("Delete of {} row {} restricted by {}.{}", table.name, id, child, column);
            return Err(StoreError::DeleteRestricted {
                table: table.name,
                referenced_by: format!("{}.{}", child, column),
            });
        }

        for (child, child_id, column) in nulled {
            if doomed.contains(&(child, child_id)) {
                continue;
            }
            if let Some(row) = tables.get_mut(child).and_then(|t| t.rows.get_mut(&child_id)) {
                row.insert(column.to_string(), Value::Null);
            }
        }

        for (name, row_id) in &doomed {
            if let Some(t) = tables.get_mut(name) {
                t.rows.remove(row_id);
            }
        }

        debug!(
            "Deleted {} row {} ({} rows including cascades)",
            table.name,
            id,
            doomed.len()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateDoctorRequest, Doctor};
    use assert_matches::assert_matches;

    fn doctor(email: &str) -> CreateDoctorRequest {
        CreateDoctorRequest {
            name: "Dr. Ward".to_string(),
            email: email.to_string(),
            phone: email.to_string(),
            specialization: "Cardiology".to_string(),
        }
    }

    #[tokio::test]
    async fn test_exhausted_ids_fail_without_storing() {
        let store = MemoryStore::new();
        store
            .tables
            .write()
            .await
            .entry("doctor")
            .or_default()
            .last_id = i32::MAX;

        let result = store.create::<Doctor>(&doctor("max@clinic.test")).await;
        assert_matches!(result, Err(StoreError::Backend(msg)) if msg.contains("doctor"));
        assert_eq!(store.row_count("doctor").await, 0);
    }

    #[test]
    fn test_display_value_unquotes_strings() {
        assert_eq!(display_value(&Value::from("a@b.c")), "a@b.c");
        assert_eq!(display_value(&Value::from(7)), "7");
    }
}
