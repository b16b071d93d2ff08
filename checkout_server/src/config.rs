use std::{env, time::Duration as StdDuration};

use checkout_common::parse_boolean_flag;
use chrono::Duration;
use log::*;

const DEFAULT_CKO_HOST: &str = "127.0.0.1";
const DEFAULT_CKO_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/checkout.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_RESERVATION_TTL: Duration = Duration::minutes(15);
const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The maximum number of connections in the database pool
    pub max_connections: u32,
    /// If true, pending schema migrations are applied when the server starts.
    pub run_migrations: bool,
    /// How long stock is held for an order placed at checkout before the expiry worker may reclaim it.
    pub reservation_ttl: Duration,
    /// The time between runs of the expiry worker. Always greater than zero.
    pub sweep_interval: StdDuration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CKO_HOST.to_string(),
            port: DEFAULT_CKO_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            run_migrations: true,
            reservation_ttl: DEFAULT_RESERVATION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CKO_HOST").ok().unwrap_or_else(|| DEFAULT_CKO_HOST.into());
        let port = env::var("CKO_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for CKO_PORT. {e} Using the default, {DEFAULT_CKO_PORT}, instead."
                    );
                    DEFAULT_CKO_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CKO_PORT);
        let database_url = env::var("CKO_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ CKO_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = parse_max_connections(env::var("CKO_DB_MAX_CONNECTIONS").ok());
        let run_migrations = parse_boolean_flag(env::var("CKO_RUN_MIGRATIONS").ok(), true);
        let reservation_ttl = parse_reservation_ttl(env::var("CKO_RESERVATION_TTL").ok());
        let sweep_interval = parse_sweep_interval(env::var("CKO_SWEEP_INTERVAL").ok());
        Self { host, port, database_url, max_connections, run_migrations, reservation_ttl, sweep_interval }
    }
}

/// Reads the reservation TTL, in minutes.
fn parse_reservation_ttl(value: Option<String>) -> Duration {
    let Some(s) = value else {
        let mins = DEFAULT_RESERVATION_TTL.num_minutes();
        info!("🪛️ CKO_RESERVATION_TTL is not set. Stock is held for {mins} minutes");
        return DEFAULT_RESERVATION_TTL;
    };
    match s.trim().parse::<i64>() {
        Ok(mins) if mins > 0 => Duration::minutes(mins),
        _ => {
            error!(
                "🪛️ {s} is not a valid number of minutes for CKO_RESERVATION_TTL. Using the default, {} minutes, \
                 instead.",
                DEFAULT_RESERVATION_TTL.num_minutes()
            );
            DEFAULT_RESERVATION_TTL
        },
    }
}

/// Reads the expiry worker interval, in seconds.
fn parse_sweep_interval(value: Option<String>) -> StdDuration {
    let Some(s) = value else {
        info!("🪛️ CKO_SWEEP_INTERVAL is not set. Expired reservations are swept every {DEFAULT_SWEEP_INTERVAL:?}");
        return DEFAULT_SWEEP_INTERVAL;
    };
    match s.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => StdDuration::from_secs(secs),
        _ => {
            error!(
                "🪛️ {s} is not a valid number of seconds for CKO_SWEEP_INTERVAL. Using the default, \
                 {DEFAULT_SWEEP_INTERVAL:?}, instead."
            );
            DEFAULT_SWEEP_INTERVAL
        },
    }
}

fn parse_max_connections(value: Option<String>) -> u32 {
    value
        .map(|s| {
            s.trim().parse::<u32>().ok().filter(|n| *n > 0).unwrap_or_else(|| {
                error!(
                    "🪛️ {s} is not a valid value for CKO_DB_MAX_CONNECTIONS. Using the default, \
                     {DEFAULT_MAX_CONNECTIONS}, instead."
                );
                DEFAULT_MAX_CONNECTIONS
            })
        })
        .unwrap_or(DEFAULT_MAX_CONNECTIONS)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reservation_ttl() {
        assert_eq!(parse_reservation_ttl(None), Duration::minutes(15));
        assert_eq!(parse_reservation_ttl(Some("30".into())), Duration::minutes(30));
        assert_eq!(parse_reservation_ttl(Some("0".into())), Duration::minutes(15));
        assert_eq!(parse_reservation_ttl(Some("quarter hour".into())), Duration::minutes(15));
    }

    #[test]
    fn sweep_interval_is_never_zero() {
        assert_eq!(parse_sweep_interval(None), StdDuration::from_secs(60));
        assert_eq!(parse_sweep_interval(Some(" 5 ".into())), StdDuration::from_secs(5));
        assert_eq!(parse_sweep_interval(Some("0".into())), StdDuration::from_secs(60));
        assert_eq!(parse_sweep_interval(Some("-1".into())), StdDuration::from_secs(60));
    }

    #[test]
    fn max_connections() {
        assert_eq!(parse_max_connections(None), 25);
        assert_eq!(parse_max_connections(Some("4".into())), 4);
        assert_eq!(parse_max_connections(Some("0".into())), 25);
        assert_eq!(parse_max_connections(Some("lots".into())), 25);
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::new("0.0.0.0", 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url, "sqlite://data/checkout.db");
        assert!(config.run_migrations);
    }
}
