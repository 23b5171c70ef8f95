use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::{DatabaseError, SupabaseClient};

use crate::error::{StoreError, StoreResult, ValidationError};
use crate::models::Entity;
use crate::schema::{TableDef, PRIMARY_KEY};
use crate::services::store::{EntityStore, Filter};

/// Store backed by Postgres through the Supabase REST gateway.
///
/// Rows are validated locally before they are sent; uniqueness and foreign
/// keys are enforced by the database using the generated DDL.
pub struct SupabaseStore {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: config.supabase_service_key.clone(),
        }
    }

    fn table_path(table: &TableDef) -> String {
        format!("/rest/v1/{}", table.name)
    }

    fn row_path(table: &TableDef, id: i32) -> String {
        format!("/rest/v1/{}?{}=eq.{}", table.name, PRIMARY_KEY, id)
    }

    async fn send(
        &self,
        table: &'static TableDef,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> StoreResult<Vec<Value>> {
        self.supabase
            .request_with_headers(
                method,
                path,
                self.auth_token.as_deref(),
                body,
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(|e| map_database_error(table, e))
    }

    fn decode_first<E: Entity>(rows: Vec<Value>) -> StoreResult<Option<E>> {
        rows.into_iter()
            .next()
            .map(serde_json::from_value::<E>)
            .transpose()
            .map_err(StoreError::from)
    }
}

/// Text between `open` and the next `close` following it.
fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(&text[start..end])
}

/// Translates a Postgres failure into the store's error taxonomy.
///
/// Details look like `Key (email)=(a@b.c) already exists.` or
/// `Key (slot_id)=(9) is not present in table "slot".`
pub(crate) fn map_database_error(table: &'static TableDef, err: DatabaseError) -> StoreError {
    let (Some(code), DatabaseError::Api { body, .. }) = (err.sql_state(), &err) else {
        return StoreError::Backend(err.to_string());
    };
    let code = code.to_string();
    let message = body.message.clone();
    let details = body.details.clone().unwrap_or_default();

    let key_column = between(&details, "Key (", ")=(").unwrap_or("unknown").to_string();
    let key_value = between(&details, ")=(", ")").unwrap_or_default().to_string();

    let mapped = match code.as_str() {
        "23505" => StoreError::UniqueViolation {
            table: table.name,
            column: key_column,
            value: key_value,
        },
        "23503" if details.contains("is still referenced from table") => StoreError::DeleteRestricted {
            table: table.name,
            referenced_by: between(&details, "from table \"", "\"").unwrap_or("unknown").to_string(),
        },
        "23503" => StoreError::ForeignKeyViolation {
            table: table.name,
            column: key_column,
            referenced_table: between(&details, "in table \"", "\"").unwrap_or("unknown").to_string(),
            value: key_value,
        },
        "23502" => ValidationError::MissingField {
            table: table.name,
            column: between(&message, "column \"", "\"").unwrap_or("unknown").to_string(),
        }
        .into(),
        "23514" | "22001" | "22P02" | "22007" | "22008" => ValidationError::Rejected {
            table: table.name,
            message,
        }
        .into(),
        _ => StoreError::Backend(err.to_string()),
    };

    warn!("Database rejected write to {}: {}", table.name, mapped);
    mapped
}

#[async_trait]
impl EntityStore for SupabaseStore {
    async fn insert_json<E: Entity>(&self, payload: Value) -> StoreResult<E> {
        let table = E::table();
        debug!("Inserting into {} via Supabase", table.name);

        let Value::Object(row) = payload else {
            return Err(ValidationError::NotAnObject { table: table.name }.into());
        };
        let row = table.validate_insert(row)?;

        let rows = self
            .send(table, Method::POST, &Self::table_path(table), Some(Value::Object(row)))
            .await?;

        Self::decode_first::<E>(rows)?
            .ok_or_else(|| StoreError::Backend(format!("insert into {} returned no row", table.name)))
    }

    async fn get<E: Entity>(&self, id: i32) -> StoreResult<Option<E>> {
        let table = E::table();
        debug!("Fetching {} row {}", table.name, id);

        let rows = self
            .send(table, Method::GET, &Self::row_path(table, id), None)
            .await?;
        Self::decode_first::<E>(rows)
    }

    async fn list<E: Entity>(&self, filter: &Filter) -> StoreResult<Vec<E>> {
        let table = E::table();
        filter.validate(table)?;

        let query = filter.to_query();
        let path = if query.is_empty() {
            format!("{}?order={}.asc", Self::table_path(table), PRIMARY_KEY)
        } else {
            format!("{}?{}&order={}.asc", Self::table_path(table), query, PRIMARY_KEY)
        };
        debug!("Listing {} with {}", table.name, path);

        let rows = self.send(table, Method::GET, &path, None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    async fn update<E: Entity>(&self, id: i32, changes: &E::Update) -> StoreResult<E> {
        let table = E::table();
        debug!("Updating {} row {}", table.name, id);

        let Value::Object(patch) = serde_json::to_value(changes)? else {
            return Err(ValidationError::NotAnObject { table: table.name }.into());
        };
        table.validate_update(&patch)?;

        if patch.is_empty() {
            return self
                .get::<E>(id)
                .await?
                .ok_or(StoreError::NotFound { table: table.name, id });
        }

        let rows = self
            .send(table, Method::PATCH, &Self::row_path(table, id), Some(Value::Object(patch)))
            .await?;
        Self::decode_first::<E>(rows)?.ok_or(StoreError::NotFound { table: table.name, id })
    }

    async fn delete<E: Entity>(&self, id: i32) -> StoreResult<bool> {
        let table = E::table();
        debug!("Deleting {} row {}", table.name, id);

        let rows = self
            .send(table, Method::DELETE, &Self::row_path(table, id), None)
            .await?;
        Ok(!rows.is_empty())
    }
}
