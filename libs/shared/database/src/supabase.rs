use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Error body returned by PostgREST when Postgres rejects a statement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostgrestError {
    /// SQLSTATE code, e.g. `23505` for a unique violation.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),

    #[error("API error ({status}): {}", .body.message)]
    Api { status: StatusCode, body: PostgrestError },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DatabaseError {
    /// SQLSTATE of the failed statement, when the gateway reported one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            DatabaseError::Api { body, .. } => body.code.as_deref(),
            _ => None,
        }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, DatabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).map_err(|_| DatabaseError::InvalidHeader("apikey"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| DatabaseError::InvalidHeader("authorization"))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, DatabaseError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T, DatabaseError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            let body = serde_json::from_str::<PostgrestError>(&error_text)
                .unwrap_or_else(|_| PostgrestError {
                    message: error_text,
                    ..PostgrestError::default()
                });
            return Err(DatabaseError::Api { status, body });
        }

        let bytes = response.bytes().await?;
        let data = if bytes.is_empty() {
            serde_json::from_value(Value::Null)?
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(data)
    }

    /// Headers asking PostgREST to echo the affected rows back.
    pub fn return_representation() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }
}
