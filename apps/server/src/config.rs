use std::{collections::HashSet, net::SocketAddr, time::Duration};

use anyhow::Context;
use chainforge_core::group_goals::PointsScheme;

/// Background sweep settings.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
    pub concurrency: usize,
    pub timeout: Duration,
}

pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    /// Raw HS256 secret. Authenticated routes are unavailable without it.
    pub jwt_secret: Option<String>,
    pub sweep: SweepConfig,
    pub points: PointsScheme,
    /// `None` means every authenticated user is entitled.
    pub entitled_users: Option<HashSet<String>>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparsable values fall
    /// back to their defaults. A malformed listen address or a points scheme
    /// with a zero step is an error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let raw_addr = lookup("CF_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let listen_addr: SocketAddr = raw_addr
            .parse()
            .with_context(|| format!("Invalid CF_LISTEN_ADDR '{}'", raw_addr))?;
        let db_path = lookup("CF_DB_PATH").unwrap_or_else(|| "./db/chainforge.db".into());
        let cors_allow = split_list(&lookup("CF_CORS_ALLOW_ORIGINS").unwrap_or_else(|| "*".into()));
        let jwt_secret = lookup("CF_JWT_SECRET").filter(|s| !s.trim().is_empty());

        let sweep = SweepConfig {
            interval: Duration::from_secs(number("CF_SWEEP_INTERVAL_SECS", 3600).max(1)),
            initial_delay: Duration::from_secs(number("CF_SWEEP_INITIAL_DELAY_SECS", 5)),
            concurrency: number("CF_SWEEP_CONCURRENCY", 4).max(1) as usize,
            timeout: Duration::from_secs(number("CF_SWEEP_TIMEOUT_SECS", 300)),
        };

        let defaults = PointsScheme::default();
        let points = PointsScheme {
            first_place: number("CF_POINTS_FIRST", defaults.first_place as u64) as u32,
            step: number("CF_POINTS_STEP", defaults.step as u64) as u32,
            minimum: number("CF_POINTS_MIN", defaults.minimum as u64) as u32,
        };
        points.validate().context("Invalid leaderboard points scheme")?;

        let entitled_users = lookup("CF_ENTITLED_USERS")
            .map(|raw| split_list(&raw))
            .filter(|users| !users.is_empty())
            .map(|users| users.into_iter().collect());

        Ok(Self {
            listen_addr,
            db_path,
            cors_allow,
            request_timeout: Duration::from_millis(number("CF_REQUEST_TIMEOUT_MS", 30000)),
            jwt_secret,
            sweep,
            points,
            entitled_users,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
