use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use placard_core::PaginationLimits;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [pagination]
//                    max_page_size = 50
//
//   env var:         PLACARD_PAGINATION__MAX_PAGE_SIZE=50   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub database: DatabaseFileConfig,
    #[serde(default)]
    pub pagination: PaginationFileConfig,
    #[serde(default)]
    pub auth: AuthFileConfig,
}

/// Lives under `[database]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseFileConfig {
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseFileConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            max_connections: default_max_connections(),
        }
    }
}

/// Lives under `[pagination]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationFileConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for PaginationFileConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl PaginationFileConfig {
    /// Reject limits under which a request without `--first`/`--last` could never succeed.
    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 {
            bail!("pagination.max_page_size must be at least 1");
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            bail!(
                "pagination.default_page_size ({}) must be between 1 and max_page_size ({})",
                self.default_page_size,
                self.max_page_size
            );
        }
        Ok(())
    }

    pub fn limits(&self) -> PaginationLimits {
        PaginationLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

/// Lives under `[auth]` in config.toml.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthFileConfig {
    /// Acting principal when `--as` is not given. Unset means every
    /// command is rejected as unauthorized.
    #[serde(default)]
    pub principal: Option<String>,
}

fn default_file_name() -> String {
    "placard.db".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_page_size() -> u32 {
    PaginationLimits::default().default_page_size
}
fn default_max_page_size() -> u32 {
    PaginationLimits::default().max_page_size
}

/// Build a figment that layers: defaults → config.toml → PLACARD_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `PLACARD_DATABASE__MAX_CONNECTIONS=10`  →  `database.max_connections = 10`
///   `PLACARD_AUTH__PRINCIPAL=ops`  →  `auth.principal = "ops"`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("PLACARD_").split("__"))
}

// =============================================================================
// Directory layout (derived from --data-dir) plus the resolved file config
// =============================================================================

#[derive(Clone, Debug)]
pub struct PlacardConfig {
    pub data_dir: PathBuf,
    pub file: FileConfig,
}

impl PlacardConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".placard"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let file: FileConfig = load_config(&data_dir)
            .extract()
            .with_context(|| format!("Invalid configuration in {}", data_dir.display()))?;
        file.pagination
            .validate()
            .with_context(|| format!("Invalid configuration in {}", data_dir.display()))?;

        let config = Self { data_dir, file };
        info!("Data directory: {}", config.data_dir.display());
        debug!("Config file: {}", config.config_toml_path().display());
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.file.database.file_name)
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path().display())
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn pagination_limits(&self) -> PaginationLimits {
        self.file.pagination.limits()
    }
}
