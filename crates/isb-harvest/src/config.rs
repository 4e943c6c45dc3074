//! Configuration management
//!
//! Settings come from `ISB_*` environment variables (a `.env` file is loaded
//! first when present), falling back to the defaults below. Command-line
//! flags override individual values after loading.

use thiserror::Error;

use crate::cursor::geome::GEOME_API;
use crate::cursor::oai_pmh::SESAR_OAI_URL;
use crate::cursor::opencontext::OPENCONTEXT_SEARCH_URL;
use crate::export::{DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use crate::fetch::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POOL_SIZE};
use crate::http::{HttpConfig, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::providers::sesar::SESAR_API;
use crate::store::StoreConfig;

// ============================================================================
// Defaults
// ============================================================================

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://isb.db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 8;

/// Default SQLite busy timeout in seconds.
pub const DEFAULT_DATABASE_BUSY_TIMEOUT_SECS: u64 = 30;

/// Default Solr collection URL for exports.
pub const DEFAULT_SOLR_URL: &str = "http://localhost:8983/solr/isb_core_records/";

/// Default base URL for published thing links.
pub const DEFAULT_THING_BASE_URL: &str = "http://localhost:8000/thing";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be greater than 0")]
    Zero { name: &'static str },

    #[error("{name} cannot be empty")]
    Empty { name: &'static str },
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub sesar_oai_url: String,
    pub sesar_api_url: String,
    pub geome_api_url: String,
    pub opencontext_search_url: String,
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub pool_size: usize,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub solr_url: String,
    pub batch_size: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub providers: ProviderConfig,
    pub harvest: HarvestSettings,
    pub export: ExportSettings,
    pub thing_base_url: String,
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl HarvestConfig {
    /// Load from `.env` and the process environment, then validate
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = HarvestConfig {
            store: StoreConfig {
                url: env_string("ISB_DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_parse(
                    "ISB_DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                busy_timeout_secs: env_parse(
                    "ISB_DATABASE_BUSY_TIMEOUT",
                    DEFAULT_DATABASE_BUSY_TIMEOUT_SECS,
                ),
            },
            http: HttpConfig {
                timeout_secs: env_parse("ISB_HTTP_TIMEOUT", DEFAULT_HTTP_TIMEOUT_SECS),
                user_agent: env_string("ISB_USER_AGENT", DEFAULT_USER_AGENT),
            },
            providers: ProviderConfig {
                sesar_oai_url: env_string("ISB_SESAR_OAI_URL", SESAR_OAI_URL),
                sesar_api_url: env_string("ISB_SESAR_API_URL", SESAR_API),
                geome_api_url: env_string("ISB_GEOME_API_URL", GEOME_API),
                opencontext_search_url: env_string(
                    "ISB_OPENCONTEXT_SEARCH_URL",
                    OPENCONTEXT_SEARCH_URL,
                ),
            },
            harvest: HarvestSettings {
                pool_size: env_parse("ISB_POOL_SIZE", DEFAULT_POOL_SIZE),
                max_attempts: env_parse("ISB_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            },
            export: ExportSettings {
                solr_url: env_string("ISB_SOLR_URL", DEFAULT_SOLR_URL),
                batch_size: env_parse("ISB_EXPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
                page_size: env_parse("ISB_EXPORT_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            },
            thing_base_url: env_string("ISB_THING_BASE_URL", DEFAULT_THING_BASE_URL),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.url.trim().is_empty() {
            return Err(ConfigError::Empty {
                name: "database URL",
            });
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Zero {
                name: "database max connections",
            });
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Zero {
                name: "HTTP timeout",
            });
        }
        if self.harvest.pool_size == 0 {
            return Err(ConfigError::Zero { name: "pool size" });
        }
        if self.harvest.max_attempts == 0 {
            return Err(ConfigError::Zero {
                name: "max attempts",
            });
        }
        if self.export.batch_size == 0 {
            return Err(ConfigError::Zero {
                name: "export batch size",
            });
        }
        if self.export.page_size == 0 {
            return Err(ConfigError::Zero {
                name: "export page size",
            });
        }
        Ok(())
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                busy_timeout_secs: DEFAULT_DATABASE_BUSY_TIMEOUT_SECS,
            },
            http: HttpConfig::default(),
            providers: ProviderConfig {
                sesar_oai_url: SESAR_OAI_URL.to_string(),
                sesar_api_url: SESAR_API.to_string(),
                geome_api_url: GEOME_API.to_string(),
                opencontext_search_url: OPENCONTEXT_SEARCH_URL.to_string(),
            },
            harvest: HarvestSettings {
                pool_size: DEFAULT_POOL_SIZE,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
            },
            export: ExportSettings {
                solr_url: DEFAULT_SOLR_URL.to_string(),
                batch_size: DEFAULT_BATCH_SIZE,
                page_size: DEFAULT_PAGE_SIZE,
            },
            thing_base_url: DEFAULT_THING_BASE_URL.to_string(),
        }
    }
}
