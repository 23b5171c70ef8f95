use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Which storage engine backs the entity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// In-process engine, used for tests and local development.
    #[default]
    Memory,
    /// Postgres behind the Supabase REST gateway.
    Supabase,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Supabase => write!(f, "supabase"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "supabase" => Ok(StoreBackend::Supabase),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: Option<String>,
    pub store_backend: StoreBackend,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            store_backend: env::var("CLINIC_STORE")
                .ok()
                .and_then(|value| {
                    value.parse().map_err(|e: String| {
                        warn!("{}, falling back to memory", e);
                    }).ok()
                })
                .unwrap_or_default(),
        };

        if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
            warn!("Supabase store selected but not fully configured - missing environment variables");
        }

        config
    }

    /// Config for the in-process store; no external services involved.
    pub fn in_memory() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: None,
            store_backend: StoreBackend::Memory,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}
