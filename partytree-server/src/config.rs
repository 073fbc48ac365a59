//! Server configuration.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "partytree-server", about = "Degree-limited party invitations")]
pub struct ServerConfig {
    /// HTTP listen address.
    #[arg(long, env = "PARTYTREE_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen_addr: String,

    /// SQLite database path (`:memory:` for a throwaway store).
    #[arg(long, env = "PARTYTREE_DB", default_value = "partytree.db")]
    pub db_path: String,

    /// Country calling code assumed for numbers written without `+`.
    #[arg(long, env = "PARTYTREE_COUNTRY_CODE", default_value_t = 1)]
    pub default_country_code: u16,

    /// Allowed CORS origin (repeatable). Empty means permissive.
    #[arg(long = "cors-origin", env = "PARTYTREE_CORS_ORIGIN", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: "127.0.0.1:8000".to_string(),
            db_path: ":memory:".to_string(),
            default_country_code: 1,
            cors_origins: Vec::new(),
        }
    }
}
