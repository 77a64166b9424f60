//! Configuration management for the server.

use std::env;

/// Tables served when `TABLES` is not set.
pub const DEFAULT_TABLES: [&str; 5] = ["subscribers", "groups", "group_items", "products", "sales"];

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Bearer token clients must present, if set
    pub auth_secret: Option<String>,
    /// Tables exposed under `/tables`
    pub tables: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let auth_secret = env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty());

        let tables = match env::var("TABLES") {
            Ok(raw) => parse_tables(&raw)?,
            Err(_) => DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
        };

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            tables,
        })
    }
}

/// Split a comma-separated table list. Names must be plain identifiers since
/// they appear in URLs.
fn parse_tables(raw: &str) -> Result<Vec<String>, ConfigError> {
    let tables: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    if tables.is_empty() {
        return Err(ConfigError::NoTables);
    }
    if let Some(bad) = tables
        .iter()
        .find(|t| !t.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
    {
        return Err(ConfigError::InvalidTableName(bad.clone()));
    }
    Ok(tables)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("TABLES must name at least one table")]
    NoTables,

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_list() {
        assert_eq!(
            parse_tables(" subscribers,sales ,").unwrap(),
            vec!["subscribers", "sales"]
        );
    }

    #[test]
    fn rejects_bad_table_lists() {
        assert!(matches!(parse_tables(" , "), Err(ConfigError::NoTables)));
        assert!(matches!(
            parse_tables("sales,drop table"),
            Err(ConfigError::InvalidTableName(name)) if name == "drop table"
        ));
    }
}
