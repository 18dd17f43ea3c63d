//! Process-level settings (spec §6.2, §6.3), split into the `cache`
//! group the engine itself validates and the `net` group that governs
//! how this binary listens for connections — mirroring the two-group
//! shape of the reference server's own settings struct.

use std::env;
use std::net::SocketAddr;

use slabcache_common::EngineConfig;

/// Network-facing options: out of the core's scope (spec §1), owned
/// entirely by this crate.
#[derive(Debug, Clone)]
pub struct NetSettings {
    pub listen_addr: SocketAddr,
}

impl Default for NetSettings {
    fn default() -> Self {
        NetSettings {
            listen_addr: "127.0.0.1:11211".parse().expect("valid default address"),
        }
    }
}

/// Full process configuration: the engine's own [`EngineConfig`] plus
/// this binary's networking options.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache: EngineConfig,
    pub net: NetSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cache: EngineConfig::default(),
            net: NetSettings::default(),
        }
    }
}

impl Settings {
    /// Builds settings from environment variables, falling back to
    /// defaults for anything unset. Kept deliberately free of a CLI
    /// parsing crate: this binary exposes few enough knobs that
    /// `env::var` plus documented names carries its own weight.
    ///
    /// Recognized variables: `SLABCACHE_LISTEN_ADDR`,
    /// `SLABCACHE_MEMORY_LIMIT`, `SLABCACHE_PAGE_SIZE`,
    /// `SLABCACHE_INITIAL_DICT_SIZE`, `SLABCACHE_ENABLE_EVICTIONS`.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();

        if let Some(addr) = env_var("SLABCACHE_LISTEN_ADDR") {
            match addr.parse() {
                Ok(parsed) => settings.net.listen_addr = parsed,
                Err(_) => tracing::warn!(%addr, "invalid SLABCACHE_LISTEN_ADDR, keeping default"),
            }
        }
        if let Some(v) = env_parse::<u64>("SLABCACHE_MEMORY_LIMIT") {
            settings.cache.memory_limit = v;
        }
        if let Some(v) = env_parse::<u32>("SLABCACHE_PAGE_SIZE") {
            settings.cache.page_size = v;
        }
        if let Some(v) = env_parse::<usize>("SLABCACHE_INITIAL_DICT_SIZE") {
            settings.cache.initial_dict_size = v;
        }
        if let Some(v) = env_parse::<bool>("SLABCACHE_ENABLE_EVICTIONS") {
            settings.cache.enable_evictions = v;
        }

        settings
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    match env_var(name) {
        Some(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(%name, %raw, "could not parse environment variable, keeping default");
                None
            }
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_against_the_engine() {
        assert!(Settings::default().cache.validate().is_ok());
    }

    #[test]
    fn default_listen_addr_is_the_memcached_port() {
        assert_eq!(Settings::default().net.listen_addr.port(), 11211);
    }
}
