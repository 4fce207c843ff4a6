use config::{Config, ConfigError, Environment};
use serde::Deserialize;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";

/// Runtime settings, read from `BMS_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Postgres URL. Without one the service keeps its data in memory.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Include diagnostic lines in the `error` array of 500 responses.
    #[serde(default)]
    pub debug: bool,

    /// Report an empty list as a 400 "No data found" instead of a 200.
    #[serde(default = "default_empty_list_as_error")]
    pub empty_list_as_error: bool,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_migrations_dir() -> String {
    DEFAULT_MIGRATIONS_DIR.to_string()
}

fn default_empty_list_as_error() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_url: None,
            max_connections: default_max_connections(),
            migrations_dir: default_migrations_dir(),
            debug: false,
            empty_list_as_error: default_empty_list_as_error(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix("BMS").try_parsing(true))
    }

    fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()
    }
}
