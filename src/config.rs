//! Configuration: global cache policy and handler files
//!
//! Global policy comes from defaults overridden by environment variables.
//! Handlers can be described in a JSON file so the binary can be pointed at
//! a set of key classes without recompiling.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StashError};
use crate::handler::{HandlerDefinition, Matcher};
use crate::refresh::CommandRefresher;
use crate::registry::Registry;

/// Default expiry window: 2 days
pub const DEFAULT_EXPIRY_SECONDS: u64 = 60 * 60 * 24 * 2;

/// Environment variable overriding the default expiry window
pub const ENV_DEFAULT_EXPIRY: &str = "STASH_DEFAULT_EXPIRY";

/// Environment variable enabling force-pull
pub const ENV_FORCE_PULL: &str = "STASH_FORCE_PULL";

/// Global cache policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashConfig {
    /// Expiry window for handlers that do not set their own; `0` means never expires
    pub default_expiry_seconds: u64,
    /// Treat every refreshable value as stale
    pub force_pull: bool,
}

impl Default for StashConfig {
    fn default() -> Self {
        Self {
            default_expiry_seconds: DEFAULT_EXPIRY_SECONDS,
            force_pull: false,
        }
    }
}

impl StashConfig {
    /// Loads configuration from the environment on top of the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DEFAULT_EXPIRY) {
            config.default_expiry_seconds = raw.trim().parse::<u64>().map_err(|_| {
                StashError::Config(format!(
                    "{ENV_DEFAULT_EXPIRY} must be a whole number of seconds, got '{raw}'"
                ))
            })?;
        }

        if let Some(raw) = lookup(ENV_FORCE_PULL) {
            config.force_pull = parse_flag(&raw).ok_or_else(|| {
                StashError::Config(format!("{ENV_FORCE_PULL} must be a boolean, got '{raw}'"))
            })?;
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// One handler as written in a handler file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerEntry {
    pub name: String,
    /// Regular expression over keys
    #[serde(default)]
    pub pattern: Option<String>,
    /// Codec family tag, e.g. `json` or `text`
    #[serde(default, rename = "type")]
    pub codec: Option<String>,
    #[serde(default)]
    pub expiry_seconds: Option<u64>,
    #[serde(default)]
    pub expiry_field: Option<String>,
    #[serde(default)]
    pub allow_undefined: bool,
    /// Shell command producing a fresh value, see [`CommandRefresher`]
    #[serde(default)]
    pub refresh_command: Option<String>,
    #[serde(default)]
    pub refresh_timeout_seconds: Option<u64>,
}

impl HandlerEntry {
    /// Builds the handler definition this entry describes
    pub fn to_definition(&self) -> Result<HandlerDefinition> {
        let mut definition = HandlerDefinition::new().allow_undefined(self.allow_undefined);

        if let Some(pattern) = &self.pattern {
            definition = definition.matching(Matcher::pattern(pattern)?);
        }
        if let Some(tag) = &self.codec {
            definition = definition.type_tag(tag.clone());
        }
        if let Some(seconds) = self.expiry_seconds {
            definition = definition.expires_in(seconds);
        }
        if let Some(field) = &self.expiry_field {
            definition = definition.expiry_field(field.clone());
        }
        if let Some(command) = &self.refresh_command {
            let mut refresher = CommandRefresher::new(command.clone());
            if let Some(secs) = self.refresh_timeout_seconds {
                refresher = refresher.with_timeout(Duration::from_secs(secs));
            }
            definition = definition.refresh(refresher);
        }

        Ok(definition)
    }
}

/// A JSON file listing handlers in match order
///
/// ```json
/// { "handlers": [
///     { "name": "user", "pattern": "^user:", "type": "json",
///       "expiry_seconds": 100, "refresh_command": "./fetch-user \"$1\"" }
/// ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFile {
    #[serde(default)]
    pub handlers: Vec<HandlerEntry>,
}

impl HandlerFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Registers every entry, in file order
    ///
    /// All entries are validated before any is registered, so a bad pattern
    /// leaves the registry untouched.
    pub fn apply(&self, registry: &mut Registry) -> Result<()> {
        let definitions = self
            .handlers
            .iter()
            .map(|entry| -> Result<(String, HandlerDefinition)> {
                Ok((entry.name.clone(), entry.to_definition()?))
            })
            .collect::<Result<Vec<_>>>()?;

        for (name, definition) in definitions {
            registry.register(name, definition);
        }
        Ok(())
    }
}
