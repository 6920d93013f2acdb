//! Command-line interface parsing for the stash binary
//!
//! The binary wires a directory-backed store, an optional handler file and
//! the global policy flags to one cache operation per invocation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::StashConfig;
use crate::error::Result;
use crate::value::Value;

/// Read-through key/value cache with pluggable refresh
#[derive(Parser, Debug)]
#[command(name = "stash")]
#[command(about = "Read-through key/value cache with pluggable refresh")]
#[command(version)]
pub struct Cli {
    /// Directory holding cache entries (defaults to the XDG cache directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// JSON file describing handlers, in match order
    #[arg(long, value_name = "FILE", global = true)]
    pub handlers: Option<PathBuf>,

    /// Treat every refreshable value as stale
    #[arg(long, global = true)]
    pub force: bool,

    /// Expiry window for handlers without their own, in seconds (0 = never)
    #[arg(long, value_name = "SECONDS", global = true)]
    pub default_expiry: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the value for a key, refreshing it if needed
    Get { key: String },
    /// Store a value; JSON is stored as structured data, anything else as text
    Set { key: String, value: String },
    /// Print the name of the handler a key routes to
    Resolve { key: String },
    /// List registered handlers in match order
    Handlers,
}

impl Cli {
    /// Global policy: environment first, then command-line overrides
    pub fn stash_config(&self) -> Result<StashConfig> {
        let mut config = StashConfig::from_env()?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut StashConfig) {
        if let Some(seconds) = self.default_expiry {
            config.default_expiry_seconds = seconds;
        }
        if self.force {
            config.force_pull = true;
        }
    }
}

/// Formats a delivered value for stdout: strings raw, everything else as JSON
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_get() {
        let cli = Cli::try_parse_from(["stash", "get", "user:1"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Get {
                key: "user:1".to_string()
            }
        );
        assert!(!cli.force);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stash", "get", "k", "--force", "--default-expiry", "30", "--dir", "/tmp/x",
        ])
        .unwrap();
        assert!(cli.force);
        assert_eq!(cli.default_expiry, Some(30));
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_overrides_win_over_base_config() {
        let cli = Cli::try_parse_from(["stash", "--force", "--default-expiry", "0", "handlers"]).unwrap();
        let mut config = StashConfig::default();
        cli.apply_overrides(&mut config);
        assert!(config.force_pull);
        assert_eq!(config.default_expiry_seconds, 0);
    }

    #[test]
    fn test_set_requires_value() {
        assert!(Cli::try_parse_from(["stash", "set", "k"]).is_err());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!("plain")), "plain");
        assert_eq!(format_value(&json!(3)), "3");
        assert_eq!(format_value(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    }
}
