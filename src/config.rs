// Configuration module for refdiff
// Reads from environment variables with sensible defaults

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection pool size (REFDIFF_POOL_SIZE)
    pub pool_size: u32,

    /// Database connection pool minimum idle connections (REFDIFF_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// SQLite busy timeout in seconds (REFDIFF_BUSY_TIMEOUT_SECS)
    pub busy_timeout_secs: u64,

    /// Branch whose last analysis is compared against (REFDIFF_REFERENCE_BRANCH)
    pub reference_branch: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_min_idle: 2,
            busy_timeout_secs: 30,
            reference_branch: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        parse_var("REFDIFF_POOL_SIZE", &mut config.pool_size);
        parse_var("REFDIFF_POOL_MIN_IDLE", &mut config.pool_min_idle);
        parse_var("REFDIFF_BUSY_TIMEOUT_SECS", &mut config.busy_timeout_secs);

        if let Ok(val) = env::var("REFDIFF_REFERENCE_BRANCH") {
            let trimmed = val.trim();
            if !trimmed.is_empty() {
                config.reference_branch = Some(trimmed.to_string());
            }
        }

        if config.pool_min_idle > config.pool_size {
            warn!(
                pool_size = config.pool_size,
                pool_min_idle = config.pool_min_idle,
                "REFDIFF_POOL_MIN_IDLE exceeds pool size, clamping"
            );
            config.pool_min_idle = config.pool_size;
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

fn parse_var<T>(name: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    if let Ok(val) = env::var(name) {
        apply_var(name, &val, slot);
    }
}

fn apply_var<T>(name: &str, val: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    match val.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!("Invalid {} value: {}, using default: {}", name, val, slot),
    }
}
