use std::sync::{Arc, OnceLock, RwLock};

use crate::foundation::core::Position;
use crate::foundation::error::{EngineError, EngineResult};
use crate::foundation::profile::Profile;
use crate::service::cache;

/// Environment variable overriding [`EngineConfig::default_producer_length`].
pub const PRODUCER_LENGTH_ENV: &str = "REELGRAPH_DEFAULT_PRODUCER_LENGTH";

pub const DEFAULT_PRODUCER_LENGTH: Position = 15000;
pub const DEFAULT_CACHE_SIZE: usize = 10;
pub const MAX_CACHE_SIZE: usize = 200;

/// Process-wide engine settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length given to producers that do not know their own duration.
    pub default_producer_length: Position,
    /// Items per named frame cache.
    pub cache_size: usize,
    /// Profile used by services without an explicit one.
    pub profile: Profile,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_producer_length: DEFAULT_PRODUCER_LENGTH,
            cache_size: DEFAULT_CACHE_SIZE,
            profile: Profile::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> EngineResult<Self> {
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var(PRODUCER_LENGTH_ENV) {
            cfg.default_producer_length = raw.trim().parse().map_err(|_| {
                EngineError::config(format!("{PRODUCER_LENGTH_ENV} is not an integer: {raw:?}"))
            })?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.default_producer_length < 1 {
            return Err(EngineError::config("default producer length must be positive"));
        }
        if self.cache_size == 0 || self.cache_size > MAX_CACHE_SIZE {
            return Err(EngineError::config(format!(
                "cache size must be within 1..={MAX_CACHE_SIZE}"
            )));
        }
        self.profile.validate()
    }
}

struct EngineState {
    config: EngineConfig,
    profile: Arc<Profile>,
}

fn state() -> &'static RwLock<EngineState> {
    static STATE: OnceLock<RwLock<EngineState>> = OnceLock::new();
    STATE.get_or_init(|| {
        let config = EngineConfig::default();
        let profile = Arc::new(config.profile.clone());
        RwLock::new(EngineState { config, profile })
    })
}

/// Install the process-wide configuration.
pub fn init(config: EngineConfig) -> EngineResult<()> {
    config.validate()?;
    let profile = Arc::new(config.profile.clone());
    let mut guard = state().write().unwrap_or_else(|e| e.into_inner());
    tracing::debug!(
        default_producer_length = config.default_producer_length,
        cache_size = config.cache_size,
        "engine initialised"
    );
    *guard = EngineState { config, profile };
    Ok(())
}

/// Snapshot of the active configuration.
pub fn config() -> EngineConfig {
    state()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .config
        .clone()
}

pub fn default_profile() -> Arc<Profile> {
    Arc::clone(&state().read().unwrap_or_else(|e| e.into_inner()).profile)
}

pub(crate) fn default_producer_length() -> Position {
    state()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .config
        .default_producer_length
}

pub(crate) fn default_cache_size() -> usize {
    state()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .config
        .cache_size
}

/// Release process-wide state: every named cache is dropped.
pub fn close() {
    cache::clear_all();
    tracing::debug!("engine closed");
}

#[cfg(test)]
#[path = "../tests/unit/engine.rs"]
mod tests;
