use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `MESSUP_*` environment variables (a `.env`
/// file is loaded first if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub media_dir: PathBuf,
    pub public_url: String,
    pub token_ttl_days: i64,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let port = var_or("MESSUP_PORT", "3000");
        let ttl = var_or("MESSUP_TOKEN_TTL_DAYS", "30");

        Ok(Config {
            jwt_secret: var_or("MESSUP_JWT_SECRET", DEFAULT_JWT_SECRET),
            db_path: var_or("MESSUP_DB_PATH", "messup.db").into(),
            host: var_or("MESSUP_HOST", "0.0.0.0"),
            port: port
                .parse()
                .with_context(|| format!("invalid MESSUP_PORT: {}", port))?,
            media_dir: var_or("MESSUP_MEDIA_DIR", "./media").into(),
            public_url: var_or("MESSUP_PUBLIC_URL", "http://localhost:3000"),
            token_ttl_days: ttl
                .parse()
                .with_context(|| format!("invalid MESSUP_TOKEN_TTL_DAYS: {}", ttl))?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
