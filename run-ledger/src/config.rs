use shared_types::{DEFAULT_RUN_KEY, DEFAULT_WINDOW_SIZE};

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the ledger listens on
    pub port: u16,
    /// Path to the ledger SQLite database
    pub database_url: String,
    /// Thread window fed to a run when the request omits `windowSize`
    pub default_window_size: usize,
    /// Run key used when the request omits `runKey`
    pub default_run_key: String,
    /// Origins allowed to call the API from a browser
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let default_run_key = env_str("RUN_LEDGER_DEFAULT_RUN_KEY", DEFAULT_RUN_KEY);
        if default_run_key.trim().is_empty() {
            anyhow::bail!("RUN_LEDGER_DEFAULT_RUN_KEY must not be empty");
        }

        Ok(Self {
            port: env_parse("RUN_LEDGER_PORT", 9191)?,
            database_url: env_str("RUN_LEDGER_DATABASE_URL", "sqlite:./data/run-ledger.db"),
            default_window_size: env_parse("RUN_LEDGER_WINDOW_SIZE", DEFAULT_WINDOW_SIZE)?,
            default_run_key,
            cors_origins: env_csv("RUN_LEDGER_CORS_ORIGINS", &["http://localhost:3000"]),
        })
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}
