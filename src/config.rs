// =============================================================================
// OVERLAY COORDINATOR — config.rs
// Конфигурация из переменных окружения
// =============================================================================

use crate::constants::{
    DEFAULT_CONTAMINATION, DEFAULT_COORDINATOR_PORT, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_SHUTDOWN_GRACE_SECS,
};
use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_LISTEN: &str = "COORDINATOR_LISTEN";
pub const ENV_API: &str = "COORDINATOR_API";
pub const ENV_IDLE_TIMEOUT: &str = "COORDINATOR_IDLE_TIMEOUT_SECS";
pub const ENV_MAX_FRAME: &str = "COORDINATOR_MAX_FRAME_BYTES";
pub const ENV_SHUTDOWN_GRACE: &str = "COORDINATOR_SHUTDOWN_GRACE_SECS";
pub const ENV_CONTAMINATION: &str = "COORDINATOR_CONTAMINATION";
pub const ENV_BASELINE: &str = "COORDINATOR_BASELINE";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub listen_addr: SocketAddr,
    /// Status API; disabled when `None`.
    pub api_addr: Option<SocketAddr>,
    pub idle_timeout: Duration,
    pub max_frame_len: usize,
    pub shutdown_grace: Duration,
    pub contamination: f64,
    /// JSON `[[size, frequency], ...]`; without it the classifier stays unfitted.
    pub baseline_path: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_COORDINATOR_PORT)),
            api_addr: None,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_frame_len: DEFAULT_MAX_FRAME_BYTES,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            contamination: DEFAULT_CONTAMINATION,
            baseline_path: None,
        }
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={:?}: {}", name, raw, e)))
}

impl CoordinatorConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        CoordinatorConfig { listen_addr, ..Self::default() }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_LISTEN) {
            cfg.listen_addr = parse(ENV_LISTEN, &raw)?;
        }
        if let Some(raw) = lookup(ENV_API) {
            cfg.api_addr = Some(parse(ENV_API, &raw)?);
        }
        if let Some(raw) = lookup(ENV_IDLE_TIMEOUT) {
            cfg.idle_timeout = Duration::from_secs(parse(ENV_IDLE_TIMEOUT, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_FRAME) {
            cfg.max_frame_len = parse(ENV_MAX_FRAME, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SHUTDOWN_GRACE) {
            cfg.shutdown_grace = Duration::from_secs(parse(ENV_SHUTDOWN_GRACE, &raw)?);
        }
        if let Some(raw) = lookup(ENV_CONTAMINATION) {
            cfg.contamination = parse(ENV_CONTAMINATION, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BASELINE) {
            cfg.baseline_path = Some(PathBuf::from(raw));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(Error::Config("idle timeout must be positive".into()));
        }
        if self.max_frame_len < 64 {
            return Err(Error::Config(format!("max frame length {} is too small", self.max_frame_len)));
        }
        if !(0.0..0.5).contains(&self.contamination) {
            return Err(Error::Config(format!("contamination {} must be in [0, 0.5)", self.contamination)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = CoordinatorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.listen_addr, CoordinatorConfig::default().listen_addr);
        assert_eq!(cfg.listen_addr, "0.0.0.0:5000".parse().unwrap());
        assert!(cfg.api_addr.is_none());
        assert_eq!(cfg.idle_timeout, Duration::from_secs(300));
        assert_eq!(cfg.contamination, 0.05);
    }

    #[test]
    fn test_overrides() {
        let cfg = CoordinatorConfig::from_lookup(lookup(&[
            (ENV_LISTEN, "127.0.0.1:6000"),
            (ENV_API, "127.0.0.1:8080"),
            (ENV_IDLE_TIMEOUT, "30"),
            (ENV_MAX_FRAME, "4096"),
            (ENV_BASELINE, "/tmp/baseline.json"),
        ]))
        .unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(cfg.api_addr, Some("127.0.0.1:8080".parse().unwrap()));
        assert_eq!(cfg.idle_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_frame_len, 4096);
        assert_eq!(cfg.baseline_path, Some(PathBuf::from("/tmp/baseline.json")));
    }

    #[test]
    fn test_invalid_values() {
        assert!(CoordinatorConfig::from_lookup(lookup(&[(ENV_LISTEN, "nowhere")])).is_err());
        assert!(CoordinatorConfig::from_lookup(lookup(&[(ENV_IDLE_TIMEOUT, "0")])).is_err());
        assert!(CoordinatorConfig::from_lookup(lookup(&[(ENV_CONTAMINATION, "0.9")])).is_err());
        assert!(CoordinatorConfig::from_lookup(lookup(&[(ENV_MAX_FRAME, "-1")])).is_err());
    }
}
