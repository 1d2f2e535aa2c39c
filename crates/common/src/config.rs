/// All configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Database (defaults to a local SQLite file)
    pub database_url: String,

    // Simulation defaults
    pub starting_equity: f64,
    pub warmup_candles: usize,

    // Lifecycle store
    pub signal_retention_days: i64,

    // Confluence layer config file path
    pub layers_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Config {
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://confluxbot.db?mode=rwc".to_string()),
            starting_equity: optional_env("STARTING_EQUITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000.0),
            warmup_candles: optional_env("WARMUP_CANDLES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            signal_retention_days: optional_env("SIGNAL_RETENTION_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            layers_config_path: optional_env("LAYERS_CONFIG_PATH")
                .unwrap_or_else(|| "config/layers.toml".to_string()),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
