use async_trait::async_trait;
use serde_json::Value;

use shared_config::{AppConfig, StoreBackend};

use crate::error::{StoreResult, ValidationError};
use crate::models::Entity;
use crate::schema::{Row, TableDef};
use crate::services::{MemoryStore, SupabaseStore};

/// Equality conditions on columns, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn validate(&self, table: &TableDef) -> Result<(), ValidationError> {
        for (column, _) in &self.conditions {
            if !table.has_column(column) {
                return Err(ValidationError::UnknownColumn {
                    table: table.name,
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, expected)| row.get(column).unwrap_or(&Value::Null) == expected)
    }

    /// PostgREST query-string form, e.g. `patient_id=eq.3&doctor_id=is.null`.
    pub fn to_query(&self) -> String {
        self.conditions
            .iter()
            .map(|(column, value)| match value {
                Value::Null => format!("{}=is.null", column),
                Value::String(text) => format!("{}=eq.{}", column, urlencoding::encode(text)),
                other => format!("{}=eq.{}", column, other),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Create/read/update/delete over the clinic entities.
///
/// Implementations enforce the table constraints declared in
/// [`crate::schema`] and report failures unchanged; nothing is retried.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Inserts an untyped payload, e.g. a client body forwarded as-is.
    async fn insert_json<E: Entity>(&self, payload: Value) -> StoreResult<E>;

    async fn create<E: Entity>(&self, request: &E::Create) -> StoreResult<E> {
        let payload = serde_json::to_value(request)?;
        self.insert_json::<E>(payload).await
    }

    async fn get<E: Entity>(&self, id: i32) -> StoreResult<Option<E>>;

    /// Rows matching `filter`, ordered by id.
    async fn list<E: Entity>(&self, filter: &Filter) -> StoreResult<Vec<E>>;

    async fn update<E: Entity>(&self, id: i32, changes: &E::Update) -> StoreResult<E>;

    /// Deletes the row and everything cascading from it. Returns false when
    /// no such row existed.
    async fn delete<E: Entity>(&self, id: i32) -> StoreResult<bool>;
}

/// The store selected by configuration.
pub enum ClinicStore {
    Memory(MemoryStore),
    Supabase(SupabaseStore),
}

impl ClinicStore {
    pub fn from_config(config: &AppConfig) -> Self {
        match config.store_backend {
            StoreBackend::Memory => ClinicStore::Memory(MemoryStore::new()),
            StoreBackend::Supabase => ClinicStore::Supabase(SupabaseStore::new(config)),
        }
    }

    pub fn backend(&self) -> StoreBackend {
        match self {
            ClinicStore::Memory(_) => StoreBackend::Memory,
            ClinicStore::Supabase(_) => StoreBackend::Supabase,
        }
    }
}

#[async_trait]
impl EntityStore for ClinicStore {
    async fn insert_json<E: Entity>(&self, payload: Value) -> StoreResult<E> {
        match self {
            ClinicStore::Memory(store) => store.insert_json::<E>(payload).await,
            ClinicStore::Supabase(store) => store.insert_json::<E>(payload).await,
        }
    }

    async fn get<E: Entity>(&self, id: i32) -> StoreResult<Option<E>> {
        match self {
            ClinicStore::Memory(store) => store.get::<E>(id).await,
            ClinicStore::Supabase(store) => store.get::<E>(id).await,
        }
    }

    async fn list<E: Entity>(&self, filter: &Filter) -> StoreResult<Vec<E>> {
        match self {
            ClinicStore::Memory(store) => store.list::<E>(filter).await,
            ClinicStore::Supabase(store) => store.list::<E>(filter).await,
        }
    }

    async fn update<E: Entity>(&self, id: i32, changes: &E::Update) -> StoreResult<E> {
        match self {
            ClinicStore::Memory(store) => store.update::<E>(id, changes).await,
            ClinicStore::Supabase(store) => store.update::<E>(id, changes).await,
        }
    }

    async fn delete<E: Entity>(&self, id: i32) -> StoreResult<bool> {
        match self {
            ClinicStore::Memory(store) => store.delete::<E>(id).await,
            ClinicStore::Supabase(store) => store.delete::<E>(id).await,
        }
    }
}
