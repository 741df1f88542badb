//! Installer configuration.
//!
//! Read from `--config <path>` or `<config_dir>/swarmstack/config.toml`.
//! Every field has a default, so a missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main installer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Repository holding the compose templates
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
    /// Overlay network shared by all stacks
    #[serde(default = "default_network")]
    pub network: String,
    /// Refuse to run unless the effective user is root
    #[serde(default = "default_true")]
    pub require_root: bool,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            repo_url: default_repo_url(),
            network: default_network(),
            require_root: true,
            paths: PathsConfig::default(),
            images: ImagesConfig::default(),
            deploy: DeployConfig::default(),
            prompts: PromptConfig::default(),
        }
    }
}

fn default_repo_url() -> String {
    "https://github.com/triskeldes-cyber/stackschat".to_string()
}

fn default_network() -> String {
    "TriskelNET".to_string()
}

fn default_true() -> bool {
    true
}

/// Filesystem locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Checkout of the configuration repository
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    /// Backups are created as `backup_swarm_<timestamp>` under this directory
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            state_file: default_state_file(),
            credentials_file: default_credentials_file(),
            backup_root: default_backup_root(),
        }
    }
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("/opt/docker-config")
}

fn default_state_file() -> PathBuf {
    default_install_dir().join(".installation_state.json")
}

fn default_credentials_file() -> PathBuf {
    default_install_dir().join("CREDENTIALS.txt")
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("/root")
}

/// Image versions recorded in component metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_traefik_image")]
    pub traefik: String,
    #[serde(default = "default_portainer_image")]
    pub portainer: String,
    #[serde(default = "default_postgres_image")]
    pub postgres: String,
    #[serde(default = "default_evolution_image")]
    pub evolution: String,
    #[serde(default = "default_chatwoot_image")]
    pub chatwoot: String,
    #[serde(default = "default_redis_image")]
    pub redis: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            traefik: default_traefik_image(),
            portainer: default_portainer_image(),
            postgres: default_postgres_image(),
            evolution: default_evolution_image(),
            chatwoot: default_chatwoot_image(),
            redis: default_redis_image(),
        }
    }
}

fn default_traefik_image() -> String {
    "traefik:v3.4.0".to_string()
}

fn default_portainer_image() -> String {
    "portainer/portainer-ce:latest".to_string()
}

fn default_postgres_image() -> String {
    "pgvector/pgvector:pg16".to_string()
}

fn default_evolution_image() -> String {
    "evoapicloud/evolution-api:v2.3.6".to_string()
}

fn default_chatwoot_image() -> String {
    "ghcr.io/fazer-ai/chatwoot:latest".to_string()
}

fn default_redis_image() -> String {
    "redis:latest".to_string()
}

/// How stacks are deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeployMethod {
    /// `docker stack deploy`
    #[default]
    Cli,
    /// Portainer REST API (traefik and portainer still use the CLI)
    Api,
}

/// Deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub method: DeployMethod,
    /// Portainer base URL for API deploys; defaults to the installed portainer URL
    #[serde(default)]
    pub portainer_url: Option<String>,
    #[serde(default = "default_portainer_user")]
    pub portainer_user: String,
    /// Seconds between `docker stack ps` polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Override every component's readiness timeout (seconds)
    #[serde(default)]
    pub ready_timeout_secs: Option<u64>,
    /// Seconds to wait before running Chatwoot migrations
    #[serde(default = "default_migration_warmup")]
    pub migration_warmup_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            method: DeployMethod::Cli,
            portainer_url: None,
            portainer_user: default_portainer_user(),
            poll_interval_secs: default_poll_interval(),
            ready_timeout_secs: None,
            migration_warmup_secs: default_migration_warmup(),
        }
    }
}

fn default_portainer_user() -> String {
    "admin".to_string()
}

fn default_poll_interval() -> u64 {
    1
}

fn default_migration_warmup() -> u64 {
    90
}

/// Interactive prompt behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Attempts before falling back to the default (or giving up)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

impl InstallerConfig {
    /// Default config location: `<config_dir>/swarmstack/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("swarmstack").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }

    /// Directory holding the compose template of `stack`.
    pub fn stack_dir(&self, stack: &str) -> PathBuf {
        self.paths.install_dir.join(stack)
    }
}
