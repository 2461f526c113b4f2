use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    /// Hard cap on any account balance, in minor currency units.
    pub balance_ceiling: i64,
    /// How many queued claims one worker tick may drain.
    pub issuance_batch_size: usize,
    /// Worker tick period in milliseconds.
    pub issuance_interval_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let balance_ceiling = env::var("BALANCE_CEILING")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(100_000_000);
        let issuance_batch_size = env::var("ISSUANCE_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(100);
        let issuance_interval_ms = env::var("ISSUANCE_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1000);
        Ok(Self {
            database_url,
            redis_url,
            host,
            port,
            balance_ceiling,
            issuance_batch_size,
            issuance_interval_ms,
        })
    }
}
