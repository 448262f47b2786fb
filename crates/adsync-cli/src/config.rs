use std::fmt;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser)]
#[command(name = "adsync")]
#[command(
    author,
    version,
    about = "Mirror of Megaphone advertisers and campaigns with a local HTTP API"
)]
#[command(after_help = "Examples:
  adsync serve
  adsync serve --bind 0.0.0.0:8080
  adsync sync campaigns
  adsync migrate
  adsync stats")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Megaphone API token
    #[arg(long, env = "MEGAPHONE_API_TOKEN", hide_env_values = true)]
    pub megaphone_api_token: String,

    /// Megaphone API base URL, e.g. https://cms.megaphone.fm/api
    #[arg(long, env = "MEGAPHONE_BASE_URL")]
    pub megaphone_base_url: String,

    /// Megaphone organization whose advertisers and campaigns are mirrored
    #[arg(long, env = "MEGAPHONE_ORG_ID")]
    pub megaphone_org_id: String,

    /// Custom path to the settings file (default: <config_dir>/adsync/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("megaphone_api_token", &"<redacted>")
            .field("megaphone_base_url", &self.megaphone_base_url)
            .field("megaphone_org_id", &self.megaphone_org_id)
            .field("config", &self.config)
            .field("command", &self.command)
            .finish()
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run migrations, then serve the HTTP API with the background scheduler
    #[command(after_help = "Examples:
  adsync serve                     # Bind to [server] bind_addr (default 127.0.0.1:8000)
  adsync serve --bind 0.0.0.0:8080 # Override the bind address")]
    Serve {
        /// Address to listen on
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Run one reconciliation pass and print the outcome report as JSON
    #[command(after_help = "Examples:
  adsync sync              # Advertisers, then campaigns
  adsync sync advertisers
  adsync sync campaigns")]
    Sync {
        /// Which resource to reconcile
        #[arg(value_enum, default_value = "all")]
        target: SyncTarget,
    },
    /// Apply pending database migrations
    Migrate,
    /// Show mirror statistics
    Stats,
}

/// Resources a manual sync can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncTarget {
    /// Advertisers (and their agencies)
    Advertisers,
    /// Campaigns (and their nested advertisers)
    Campaigns,
    /// Advertisers first, then campaigns
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "adsync",
        "--database-url",
        "postgres://localhost/adsync",
        "--megaphone-api-token",
        "tok-123",
        "--megaphone-base-url",
        "https://cms.megaphone.fm/api",
        "--megaphone-org-id",
        "org-1",
    ];

    fn parse(extra: &[&str]) -> Config {
        Config::try_parse_from(REQUIRED.iter().chain(extra)).unwrap()
    }

    #[test]
    fn test_sync_defaults_to_all() {
        let config = parse(&["sync"]);
        assert_eq!(
            config.command,
            Command::Sync {
                target: SyncTarget::All
            }
        );
    }

    #[test]
    fn test_sync_target() {
        let config = parse(&["sync", "campaigns"]);
        assert_eq!(
            config.command,
            Command::Sync {
                target: SyncTarget::Campaigns
            }
        );
        assert!(Config::try_parse_from(REQUIRED.iter().chain(&["sync", "agencies"])).is_err());
    }

    #[test]
    fn test_serve_bind_and_global_config() {
        let config = parse(&["serve", "--bind", "0.0.0.0:9000", "--config", "/tmp/adsync.toml"]);
        assert_eq!(
            config.command,
            Command::Serve {
                bind: Some("0.0.0.0:9000".to_string())
            }
        );
        assert_eq!(config.config, Some(PathBuf::from("/tmp/adsync.toml")));
    }

    #[test]
    fn test_debug_hides_token() {
        let config = parse(&["stats"]);
        let printed = format!("{:?}", config);
        assert!(!printed.contains("tok-123"));
        assert!(printed.contains("<redacted>"));
    }
}
