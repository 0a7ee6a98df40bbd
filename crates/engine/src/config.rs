//! Engine tuning knobs.

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Nodes a run may visit, counted across re-entrant event chains,
    /// before it fails with the loop guard.
    pub max_hops: u32,
    /// How often the resume scheduler looks for due suspended runs.
    pub resume_poll_interval: Duration,
    /// Maximum suspended runs resumed per scheduler tick.
    pub resume_batch_size: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hops: 50,
            resume_poll_interval: Duration::from_secs(30),
            resume_batch_size: 100,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `AUTOMATION_MAX_HOPS`,
    /// `AUTOMATION_RESUME_POLL_SECS` and `AUTOMATION_RESUME_BATCH`.
    /// Zero or unparseable values keep the default.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_hops: positive(&lookup, "AUTOMATION_MAX_HOPS").unwrap_or(defaults.max_hops),
            resume_poll_interval: positive(&lookup, "AUTOMATION_RESUME_POLL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.resume_poll_interval),
            resume_batch_size: positive(&lookup, "AUTOMATION_RESUME_BATCH")
                .unwrap_or(defaults.resume_batch_size),
        }
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    lookup(name)
        .and_then(|v| v.trim().parse().ok())
        .filter(|v: &T| *v > T::default())
}
