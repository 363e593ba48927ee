// ⚙️ Client Configuration - who we audit for
// Loaded once at startup and passed explicitly to the classifier

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable holding the path of the client config file
pub const CONFIG_ENV_VAR: &str = "AUDITOR_CONFIG";

// ============================================================================
// CLIENT CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Party on whose behalf impact is assessed
    pub client_name: String,

    /// Opponents of the client (sign of the impact is flipped for them)
    #[serde(default)]
    pub rival_names: BTreeSet<String>,

    /// When set, favorable inconsistencies are sent to recount instead of logged
    #[serde(default)]
    pub strict_ethics: bool,
}

/// How a party relates to the configured client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
    Client,
    Rival,
}

impl ClientConfig {
    pub fn new<I, S>(client_name: impl Into<String>, rivals: I, strict_ethics: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClientConfig {
            client_name: client_name.into(),
            rival_names: rivals.into_iter().map(Into::into).collect(),
            strict_ethics,
        }
    }

    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read client config: {:?}", path.as_ref()))?;

        let config: ClientConfig = serde_json::from_str(&content)
            .context("Failed to parse client config JSON")?;

        info!(
            client = %config.client_name,
            rivals = config.rival_names.len(),
            strict_ethics = config.strict_ethics,
            "Loaded client config"
        );
        Ok(config)
    }

    /// Load config following the resolution order:
    /// 1. Explicit path (command-line argument)
    /// 2. `AUDITOR_CONFIG` environment variable
    /// 3. Built-in default
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);

        match resolve_config_path(cli_path, env_path) {
            Some(path) => Self::from_file(path),
            None => {
                debug!("No client config given, using built-in default");
                Ok(Self::default())
            }
        }
    }

    /// Role of `party` relative to the client, if it is tracked at all
    pub fn role_of(&self, party: &str) -> Option<PartyRole> {
        if party == self.client_name {
            Some(PartyRole::Client)
        } else if self.rival_names.contains(party) {
            Some(PartyRole::Rival)
        } else {
            None
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::new("Partido A", ["Partido B", "Partido C"], false)
    }
}

/// Pick the config file path: command line first, then environment
pub fn resolve_config_path(cli_path: Option<&Path>, env_path: Option<PathBuf>) -> Option<PathBuf> {
    cli_path
        .map(Path::to_path_buf)
        .or_else(|| env_path.filter(|p| !p.as_os_str().is_empty()))
}

// ============================================================================
// TESTS
// ============================================================================
