//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/cladesync/cladesync.toml`
//! 3. Explicit config file (`--config <file>`)
//! 4. Environment variables: `CLADESYNC_*` prefix, `__` between sections
//!    (e.g. `CLADESYNC_PARTITION__TARGET=300`)

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::{ApplicationError, RetryPolicy};
use crate::domain::Thresholds;

pub const ENV_PREFIX: &str = "CLADESYNC";

/// Upstream tree service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TreeSourceSettings {
    pub api_url: String,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for TreeSourceSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.opentreeoflife.org/v3".into(),
            timeout_secs: 120,
            retry: RetryPolicy::default(),
        }
    }
}

/// Common-name lookup (Wikidata SPARQL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub enabled: bool,
    pub sparql_url: String,
    /// Wikidata asks for a descriptive agent with contact info
    pub user_agent: String,
    pub batch_size: usize,
    pub delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sparql_url: "https://query.wikidata.org/sparql".into(),
            user_agent: concat!(
                "cladesync/",
                env!("CARGO_PKG_VERSION"),
                " (phylogeny sync; https://github.com/sysid/cladesync)"
            )
            .into(),
            batch_size: 200,
            delay_ms: 1500,
            timeout_secs: 60,
        }
    }
}

/// Record store (ATProto repository).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    /// Fixed PDS; when unset the account's PDS is resolved from its handle
    pub pds_url: Option<String>,
    pub public_api_url: String,
    pub plc_directory_url: String,
    pub collection: String,
    pub source_tag: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub rate_delay_ms: u64,
    pub page_limit: u32,
    pub max_record_bytes: usize,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            pds_url: None,
            public_api_url: "https://public.api.bsky.app".into(),
            plc_directory_url: "https://plc.directory".into(),
            collection: "com.minomobi.phylo.clade".into(),
            source_tag: "otol-synthesis".into(),
            batch_size: 10,
            batch_delay_ms: 3000,
            rate_delay_ms: 2200,
            page_limit: 100,
            max_record_bytes: 1_000_000,
            timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}

/// Names of the environment variables holding an account's credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    pub handle_env: String,
    pub password_env: String,
}

/// Resolved account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"***")
            .finish()
    }
}

pub const DEFAULT_ACCOUNT: &str = "main";

/// Unified configuration for cladesync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub partition: Thresholds,
    pub tree_source: TreeSourceSettings,
    pub enrichment: EnrichmentSettings,
    pub store: StoreSettings,
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut accounts = BTreeMap::new();
        accounts.insert(
            DEFAULT_ACCOUNT.to_string(),
            AccountConfig {
                handle_env: "BLUESKY_HANDLE".into(),
                password_env: "BLUESKY_APP_PASSWORD".into(),
            },
        );
        Self {
            partition: Thresholds::default(),
            tree_source: TreeSourceSettings::default(),
            enrichment: EnrichmentSettings::default(),
            store: StoreSettings::default(),
            accounts,
        }
    }
}

/// Get the XDG config directory for cladesync.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "cladesync").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("cladesync.toml"))
}

impl Settings {
    /// Load settings with layered precedence from the real environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_from(global_config_path().as_deref(), config_file, None)
    }

    /// Load with every layer given explicitly.
    ///
    /// `env` replaces the process environment when set.
    pub fn load_from(
        global: Option<&Path>,
        config_file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ApplicationError> {
        // 1. Defaults
        let mut builder =
            Config::builder().add_source(Config::try_from(&Settings::default()).map_err(config_err)?);

        // 2. Global config, optional
        if let Some(global_path) = global {
            builder = builder.add_source(File::from(global_path).required(false));
        }

        // 3. Explicit config file, must exist
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        // 4. Environment overrides
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings: Self = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_err)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Consistency checks that deserialization cannot express.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        self.partition.validate()?;
        if self.store.batch_size == 0 {
            return Err(ApplicationError::Config {
                message: "store.batch_size must be at least 1".into(),
            });
        }
        if self.enrichment.batch_size == 0 {
            return Err(ApplicationError::Config {
                message: "enrichment.batch_size must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Resolve an account's credentials from the process environment.
    pub fn credentials(&self, account: &str) -> Result<Credentials, ApplicationError> {
        self.credentials_with(account, |name| std::env::var(name).ok())
    }

    /// Resolve an account's credentials through `lookup` (variable name -> value).
    pub fn credentials_with(
        &self,
        account: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials, ApplicationError> {
        let config = self
            .accounts
            .get(account)
            .ok_or_else(|| ApplicationError::Config {
                message: format!(
                    "unknown account '{account}' (configured: {})",
                    self.accounts.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            })?;
        let read = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ApplicationError::Config {
                    message: format!("missing credentials for account '{account}': set ${name}"),
                })
        };
        Ok(Credentials {
            identity: read(&config.handle_env)?,
            secret: read(&config.password_env)?,
        })
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# cladesync configuration
#
# Locations (by precedence, lowest to highest):
#   Global:   ~/.config/cladesync/cladesync.toml
#   Explicit: cladesync --config <file>
#   Env:      CLADESYNC_* variables, "__" between sections
#             (CLADESYNC_PARTITION__TARGET=300)

[partition]
# Soft clade size in nodes
# target = 250
# Smallest subtree split into its own clade
# floor = 20
# Clade size past which only leaves are inlined
# hard_max = 500

[tree_source]
# api_url = "https://api.opentreeoflife.org/v3"
# timeout_secs = 120

# Throttled or failed subtree downloads are retried with backoff
[tree_source.retry]
# max_attempts = 5
# initial_delay_ms = 2000
# max_delay_ms = 60000
# multiplier = 2.0

[enrichment]
# enabled = true
# sparql_url = "https://query.wikidata.org/sparql"
# batch_size = 200
# delay_ms = 1500

[store]
# Fixed PDS; leave unset to resolve it from the account handle
# pds_url = "https://bsky.social"
# collection = "com.minomobi.phylo.clade"
# source_tag = "otol-synthesis"
# batch_size = 10
# batch_delay_ms = 3000
# rate_delay_ms = 2200
# max_record_bytes = 1000000

[store.retry]
# max_attempts = 5
# initial_delay_ms = 2000
# max_delay_ms = 60000
# multiplier = 2.0

# Accounts name the env vars holding handle and app password
[accounts.main]
handle_env = "BLUESKY_HANDLE"
password_env = "BLUESKY_APP_PASSWORD"

# [accounts.modulo]
# handle_env = "MODULO_HANDLE"
# password_env = "MODULO_APP_PASSWORD"
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_config_when_loading_then_uses_defaults() {
        let settings = Settings::load_from(None, None, Some(HashMap::new())).expect("load defaults");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.partition.target, 250);
        assert_eq!(settings.store.batch_size, 10);
        assert!(settings.accounts.contains_key(DEFAULT_ACCOUNT));
    }

    #[test]
    fn given_template_when_parsing_then_is_valid_toml() {
        let parsed: Result<toml::Value, _> = toml::from_str(&Settings::template());
        assert!(parsed.is_ok(), "template must parse: {parsed:?}");
    }

    #[test]
    fn given_credentials_debug_when_formatting_then_hides_secret() {
        let creds = Credentials {
            identity: "alice.bsky.social".into(),
            secret: "hunter2".into(),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("alice.bsky.social"));
        assert!(!shown.contains("hunter2"));
    }
}
