// Application configuration, loaded from environment variables and CLI flags.

use crate::draft::{validate_pool, DEFAULT_TITLE_POOL};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Titles every new draft starts with.
    pub map_pool: Vec<String>,
    /// Usernames that are registered with the admin role.
    pub admin_usernames: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite:tourney.db?mode=rwc".to_string(),
            port: 5000,
            map_pool: DEFAULT_TITLE_POOL.iter().map(|t| t.to_string()).collect(),
            admin_usernames: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:tourney.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 5000)
    /// - `MAP_POOL` - Comma-separated titles for new drafts
    /// - `ADMIN_USERNAMES` - Comma-separated usernames granted the admin role on signup
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--database-url <URL>` - Override the database URL
    pub fn load() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let defaults = Config::default();

        let database_url = Self::parse_cli_value(&args, "--database-url")
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or(defaults.database_url);

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(defaults.port);

        let map_pool = std::env::var("MAP_POOL")
            .ok()
            .map(|v| split_list(&v))
            .unwrap_or(defaults.map_pool);
        validate_pool(&map_pool).map_err(|e| format!("MAP_POOL: {e}"))?;

        let admin_usernames = std::env::var("ADMIN_USERNAMES")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        Ok(Config {
            database_url,
            port,
            map_pool,
            admin_usernames,
        })
    }

    pub fn is_admin_username(&self, username: &str) -> bool {
        self.admin_usernames.iter().any(|u| u == username)
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
