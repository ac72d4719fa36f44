use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE_DIR: &str = "database";
pub const DEFAULT_IDENTITY_HEADER: &str = "x-account-id";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Command line of the dashboard server. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "tabdeck", version, about = "Upload, browse and search tabular files")]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "TABDECK_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Directory holding the JSON document store
    #[arg(long, env = "TABDECK_DATABASE_DIR", default_value = DEFAULT_DATABASE_DIR)]
    pub database_dir: PathBuf,

    /// Request header carrying the account id set by the identity provider
    #[arg(long, env = "TABDECK_IDENTITY_HEADER", default_value = DEFAULT_IDENTITY_HEADER)]
    pub identity_header: String,

    /// Largest accepted upload request body, in bytes
    #[arg(long, env = "TABDECK_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Keep documents in memory only (nothing survives a restart)
    #[arg(long, env = "TABDECK_IN_MEMORY")]
    pub in_memory: bool,
}

/// Settings the web layer runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub database_dir: PathBuf,
    pub identity_header: String,
    pub max_upload_bytes: usize,
    pub in_memory: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_dir: PathBuf::from(DEFAULT_DATABASE_DIR),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            in_memory: false,
        }
    }
}

impl From<ServerArgs> for AppConfig {
    fn from(args: ServerArgs) -> Self {
        AppConfig {
            bind: args.bind,
            database_dir: args.database_dir,
            identity_header: args.identity_header.to_ascii_lowercase(),
            max_upload_bytes: args.max_upload_bytes,
            in_memory: args.in_memory,
        }
    }
}

/// Command line of the local inspector: decode files and print their cards.
#[derive(Debug, Clone, Parser)]
#[command(name = "tabdeck-cli", version, about = "Decode tabular files and preview their cards")]
pub struct CliArgs {
    /// CSV, TSV or spreadsheet files to decode
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Only show records containing this text (case-insensitive)
    #[arg(short, long)]
    pub search: Option<String>,

    /// Print records with the detail-view rules instead of the card rules
    #[arg(long)]
    pub detail: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults_match_app_config_defaults() {
        let args = ServerArgs::try_parse_from(["tabdeck"]).unwrap();
        assert_eq!(AppConfig::from(args), AppConfig::default());
    }

    #[test]
    fn server_flags_override_defaults() {
        let args = ServerArgs::try_parse_from([
            "tabdeck",
            "--bind",
            "0.0.0.0:8080",
            "--identity-header",
            "X-User",
            "--in-memory",
        ])
        .unwrap();
        let config = AppConfig::from(args);
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.identity_header, "x-user");
        assert!(config.in_memory);
    }

    #[test]
    fn cli_requires_a_file() {
        assert!(CliArgs::try_parse_from(["tabdeck-cli"]).is_err());
        let args = CliArgs::try_parse_from(["tabdeck-cli", "a.csv", "-s", "alice"]).unwrap();
        assert_eq!(args.search.as_deref(), Some("alice"));
    }
}
