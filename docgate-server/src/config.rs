use docgate::{collection::CollectionOptions, document::validate_field_name, update::UpdateMode};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Behaviour shared by every dynamically bound collection
    #[serde(default)]
    pub collections: CollectionsConfig,
    /// Signed-token gate for mutating requests
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.host.trim().is_empty() {
            return Err("server.host must not be empty".into());
        }
        // Storage validation
        if self.storage.backend == StorageBackendKind::Mongodb {
            if self.storage.uri.as_deref().unwrap_or("").is_empty() {
                return Err("storage.backend=mongodb requires storage.uri".into());
            }
            if self.storage.database.is_empty() {
                return Err("storage.database must not be empty".into());
            }
        }
        // Collections validation
        if let Some(key) = &self.collections.upsert_key {
            validate_field_name(key).map_err(|e| format!("collections.upsert_key: {e}"))?;
            if key == "_id" {
                return Err("collections.upsert_key cannot be _id".into());
            }
        }
        // Gate validation
        if self.gate.enabled && self.gate.secret.as_deref().unwrap_or("").is_empty() {
            return Err("gate.enabled=true requires gate.secret".into());
        }
        if self.gate.token_ttl_secs == 0 {
            return Err("gate.token_ttl_secs must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Resolves `server.host` (an IP literal or a host name) to the first
    /// matching socket address.
    pub async fn resolve_addr(&self) -> Result<SocketAddr, String> {
        let host = self.server.host.trim();
        tokio::net::lookup_host((host, self.server.port))
            .await
            .map_err(|e| format!("cannot resolve server.host {host:?}: {e}"))?
            .next()
            .ok_or_else(|| format!("server.host {host:?} resolved to no addresses"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Include backend error text in 500 responses
    #[serde(default = "default_expose_error_details")]
    pub expose_error_details: bool,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_expose_error_details() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            expose_error_details: default_expose_error_details(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    /// Connection string, e.g. mongodb://localhost:27017
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "docgate".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            uri: None,
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectionsConfig {
    /// Reject list requests that carry no filter
    #[serde(default)]
    pub filter_required: bool,
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default)]
    pub timestamps: bool,
    /// Field that turns creates into atomic upserts when present in the body
    #[serde(default)]
    pub upsert_key: Option<String>,
}

impl CollectionsConfig {
    pub fn options(&self) -> CollectionOptions {
        CollectionOptions {
            timestamps: self.timestamps,
            update_mode: self.update_mode,
            upsert_key: self.upsert_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub enabled: bool,
    /// HMAC key used to sign and verify owner tokens.
    /// For security, prefer the DOCGATE__GATE__SECRET env var
    #[serde(default)]
    pub secret: Option<String>,
    /// Also require a token for GET requests on collections
    #[serde(default)]
    pub protect_reads: bool,
    /// Lifetime of tokens minted by `issue-token`
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_token_ttl_secs() -> u64 {
    3600
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: None,
            protect_reads: false,
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
    use std::path::PathBuf;

    /// Loads configuration from, lowest precedence first: the legacy variables
    /// (`PORT`, `MONGO_URI`, `OWNER_KEY`), the TOML file, then `DOCGATE__*` variables.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let builder = legacy_defaults(Config::builder(), |key| std::env::var(key).ok())?;
        let mut builder = with_file(builder, path)?;
        // Environment variable overrides, e.g., DOCGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("DOCGATE")
                .try_parsing(true)
                .separator("__"),
        );
        finish(builder)
    }

    /// Adds the TOML file at `path`, or `./docgate.toml` when present.
    pub(crate) fn with_file(
        builder: ConfigBuilder<DefaultState>,
        path: Option<&str>,
    ) -> Result<ConfigBuilder<DefaultState>, String> {
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    Ok(builder.add_source(File::from(pathbuf)))
                } else {
                    Err(format!("config file {p} does not exist"))
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("docgate.toml");
                if default_path.exists() {
                    Ok(builder.add_source(File::from(default_path)))
                } else {
                    Ok(builder)
                }
            }
        }
    }

    /// Maps the legacy deployment variables onto configuration defaults.
    pub(crate) fn legacy_defaults(
        mut builder: ConfigBuilder<DefaultState>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ConfigBuilder<DefaultState>, String> {
        let err = |e: config::ConfigError| format!("config build error: {e}");

        if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| format!("PORT must be a valid port number, got {port:?}"))?;
            builder = builder.set_default("server.port", i64::from(port)).map_err(err)?;
        }
        if let Some(uri) = lookup("MONGO_URI").filter(|v| !v.is_empty()) {
            builder = builder
                .set_default("storage.backend", "mongodb")
                .map_err(err)?
                .set_default("storage.uri", uri)
                .map_err(err)?;
        }
        if let Some(secret) = lookup("OWNER_KEY").filter(|v| !v.is_empty()) {
            builder = builder
                .set_default("gate.enabled", true)
                .map_err(err)?
                .set_default("gate.secret", secret)
                .map_err(err)?;
        }

        Ok(builder)
    }

    pub(crate) fn finish(builder: ConfigBuilder<DefaultState>) -> Result<AppConfig, String> {
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}
