//! Process configuration
//!
//! Bind address, worker pool sizing and metrics port. The per-endpoint
//! capacities and delays are fixed in [`crate::endpoint`] and are not part of
//! this file.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const PORT_ENV: &str = "PERMITGATE_PORT";
pub const MAX_WORKERS_ENV: &str = "PERMITGATE_MAX_WORKERS";
pub const QUEUE_CAPACITY_ENV: &str = "PERMITGATE_QUEUE_CAPACITY";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    /// Metrics listener port (0 disables it)
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pool: PoolConfig::default(),
            metrics_port: 9090,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Runtime worker threads
    pub core_workers: usize,
    /// Requests allowed in flight at once
    pub max_workers: usize,
    /// Requests allowed to wait for a worker before shedding
    pub queue_capacity: usize,
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_workers: 50,
            max_workers: 200,
            queue_capacity: 1000,
            thread_name_prefix: "LoadTest-".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Applies `PERMITGATE_*` overrides. Unparsable values are logged and
    /// ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_value::<u16>(PORT_ENV) {
            self.server.port = port;
        }
        if let Some(max_workers) = env_value::<usize>(MAX_WORKERS_ENV) {
            self.pool.max_workers = max_workers;
        }
        if let Some(queue_capacity) = env_value::<usize>(QUEUE_CAPACITY_ENV) {
            self.pool.queue_capacity = queue_capacity;
        }
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(value = %raw, "invalid {name} value; keeping configured value");
                None
            }
        },
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(?err, "failed to read {name}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_pool_sizing() {
        let config = Config::default();
        assert_eq!(config.pool.core_workers, 50);
        assert_eq!(config.pool.max_workers, 200);
        assert_eq!(config.pool.queue_capacity, 1000);
        assert_eq!(config.pool.thread_name_prefix, "LoadTest-");
        assert_eq!(config.server.socket_addr().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("server:\n  port: 9000\npool:\n  max_workers: 16\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.pool.max_workers, 16);
        assert_eq!(config.pool.queue_capacity, 1000);
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    #[serial]
    fn env_overrides_apply_and_ignore_garbage() {
        env::set_var(PORT_ENV, "7001");
        env::set_var(MAX_WORKERS_ENV, "not-a-number");
        env::set_var(QUEUE_CAPACITY_ENV, " 12 ");

        let mut config = Config::default();
        config.apply_env_overrides();

        env::remove_var(PORT_ENV);
        env::remove_var(MAX_WORKERS_ENV);
        env::remove_var(QUEUE_CAPACITY_ENV);

        assert_eq!(config.server.port, 7001);
        assert_eq!(config.pool.max_workers, 200);
        assert_eq!(config.pool.queue_capacity, 12);
    }
}
