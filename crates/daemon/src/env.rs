// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access (spec §6 "Environment
//! (recognized options)"). The daemon reads these once at startup and
//! builds one [`wco_engine::EngineConfig`]; nothing below this module
//! knows about env vars.

use std::time::Duration;
use wco_adapters::backend::BackendKind;
use wco_engine::EngineConfig;

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn var_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|s| s.parse().ok())
}

pub fn container_backend() -> Result<BackendKind, String> {
    var("CONTAINER_BACKEND").unwrap_or_else(|| "local".to_string()).parse()
}

pub fn bind_addr() -> String {
    var("WCO_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string())
}

pub fn redis_url() -> String {
    var("WCO_REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string())
}

pub fn catalog_db_path() -> std::path::PathBuf {
    var("WCO_CATALOG_DB").map(std::path::PathBuf::from).unwrap_or_else(|| std::path::PathBuf::from("wco-catalog.sqlite3"))
}

pub fn object_store_bucket() -> String {
    var("WCO_OBJECT_STORE_BUCKET").unwrap_or_else(|| "wco-workspaces".to_string())
}

pub fn object_store_prefix() -> String {
    var("WCO_OBJECT_STORE_PREFIX").unwrap_or_else(|| "workspaces".to_string())
}

/// Fallback model identifier used when a request's tenant configuration
/// (owned by the out-of-scope CRUD layer) does not accompany the
/// request.
pub fn default_model() -> String {
    var("WCO_DEFAULT_MODEL").unwrap_or_else(|| "claude-sonnet-4-5".to_string())
}

pub fn title_command() -> (String, Vec<String>) {
    match var("WCO_TITLE_COMMAND") {
        Some(cmd) => {
            let mut parts = cmd.split_whitespace().map(str::to_string);
            let program = parts.next().unwrap_or_else(|| "true".to_string());
            (program, parts.collect())
        }
        None => ("true".to_string(), Vec::new()),
    }
}

fn extended_reasoning_models() -> std::collections::HashSet<String> {
    match var("WCO_EXTENDED_REASONING_MODELS") {
        Some(list) => list.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect(),
        None => EngineConfig::default().extended_reasoning_models,
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        container_ttl_secs: var_parsed("CONTAINER_TTL_SECONDS").unwrap_or(3600),
        warm_pool_min: var_parsed("WARM_POOL_MIN_SIZE").unwrap_or(1),
        warm_pool_max: var_parsed("WARM_POOL_MAX_SIZE").unwrap_or(5),
        warm_pool_replenish_secs: var_parsed("WARM_POOL_REPLENISH_SECONDS").unwrap_or(15),
        gc_period_secs: var_parsed("GC_PERIOD_SECONDS").unwrap_or(60),
        gc_orphan_cycle_k: var_parsed("GC_ORPHAN_CYCLE_K").unwrap_or(5),
        heartbeat_interval_secs: var_parsed("HEARTBEAT_INTERVAL_SECONDS").unwrap_or(10),
        event_timeout_secs: var_parsed("EVENT_TIMEOUT_SECONDS").unwrap_or(300),
        lock_ttl_secs: var_parsed("LOCK_TTL_SECONDS").unwrap_or(600),
        extended_reasoning_models: extended_reasoning_models(),
    }
}

/// Graceful-shutdown drain timeout (spec §5 "Graceful shutdown cancels
/// the warm pool first ... then drains active containers").
pub fn drain_timeout() -> Duration {
    var_parsed::<u64>("WCO_DRAIN_TIMEOUT_MS").map(Duration::from_millis).unwrap_or(Duration::from_secs(30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // `#[serial]` because every case here mutates process-global env vars;
    // run concurrently they'd stomp on each other.

    #[test]
    #[serial]
    fn bind_addr_defaults_when_unset() {
        std::env::remove_var("WCO_BIND_ADDR");
        assert_eq!(bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    #[serial]
    fn bind_addr_honors_override() {
        std::env::set_var("WCO_BIND_ADDR", "127.0.0.1:9000");
        assert_eq!(bind_addr(), "127.0.0.1:9000");
        std::env::remove_var("WCO_BIND_ADDR");
    }

    #[test]
    #[serial]
    fn var_treats_empty_string_as_unset() {
        std::env::set_var("WCO_BIND_ADDR", "");
        assert_eq!(bind_addr(), "0.0.0.0:8080");
        std::env::remove_var("WCO_BIND_ADDR");
    }

    #[test]
    #[serial]
    fn container_backend_rejects_unknown_kind() {
        std::env::set_var("CONTAINER_BACKEND", "made-up");
        assert!(container_backend().is_err());
        std::env::remove_var("CONTAINER_BACKEND");
    }

    #[test]
    #[serial]
    fn title_command_splits_on_whitespace() {
        std::env::set_var("WCO_TITLE_COMMAND", "python3 /opt/wco/title.py --fast");
        let (program, args) = title_command();
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["/opt/wco/title.py", "--fast"]);
        std::env::remove_var("WCO_TITLE_COMMAND");
    }

    #[test]
    #[serial]
    fn title_command_defaults_to_noop() {
        std::env::remove_var("WCO_TITLE_COMMAND");
        let (program, args) = title_command();
        assert_eq!(program, "true");
        assert!(args.is_empty());
    }

    #[test]
    #[serial]
    fn engine_config_uses_documented_defaults() {
        for key in [
            "CONTAINER_TTL_SECONDS",
            "WARM_POOL_MIN_SIZE",
            "WARM_POOL_MAX_SIZE",
            "WARM_POOL_REPLENISH_SECONDS",
            "GC_PERIOD_SECONDS",
            "GC_ORPHAN_CYCLE_K",
            "HEARTBEAT_INTERVAL_SECONDS",
            "EVENT_TIMEOUT_SECONDS",
            "LOCK_TTL_SECONDS",
        ] {
            std::env::remove_var(key);
        }
        let config = engine_config();
        assert_eq!(config.container_ttl_secs, 3600);
        assert_eq!(config.warm_pool_min, 1);
        assert_eq!(config.warm_pool_max, 5);
        assert_eq!(config.gc_period_secs, 60);
    }

    #[test]
    #[serial]
    fn drain_timeout_parses_milliseconds_override() {
        std::env::set_var("WCO_DRAIN_TIMEOUT_MS", "500");
        assert_eq!(drain_timeout(), Duration::from_millis(500));
        std::env::remove_var("WCO_DRAIN_TIMEOUT_MS");
    }
}
