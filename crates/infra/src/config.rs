//! Engine configuration.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Parse { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime knobs for reconciliation, scheduling and dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Period of the reconciliation + cadence tick.
    pub tick_interval: Duration,
    /// Deadline for each external capability call.
    pub capability_timeout: Duration,
    /// Minimum spacing between instant alerts for one item.
    pub instant_dedup_window: Duration,
    /// Half-width of the daily/weekly send window.
    pub schedule_tolerance: Duration,
    pub max_concurrent_shops: usize,
    /// Retries of a single-key write after a concurrent-write conflict.
    pub conflict_retries: u32,
    /// Capacity of the inbound event queue.
    pub event_buffer: usize,
    /// Inbound events handled at the same time; each may run a shop sweep.
    pub max_concurrent_events: usize,
    /// Base delay before retrying a tick that failed as a whole.
    pub failure_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(120),
            capability_timeout: Duration::from_secs(15),
            instant_dedup_window: Duration::from_secs(60 * 60),
            schedule_tolerance: Duration::from_secs(5 * 60),
            max_concurrent_shops: 4,
            conflict_retries: 3,
            event_buffer: 1024,
            max_concurrent_events: 16,
            failure_backoff: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `STOCKPULSE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = parse::<u64>(&lookup, "STOCKPULSE_TICK_INTERVAL_SECS")? {
            cfg.tick_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse::<u64>(&lookup, "STOCKPULSE_CAPABILITY_TIMEOUT_SECS")? {
            cfg.capability_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse::<u64>(&lookup, "STOCKPULSE_INSTANT_DEDUP_SECS")? {
            cfg.instant_dedup_window = Duration::from_secs(v);
        }
        if let Some(v) = parse::<u64>(&lookup, "STOCKPULSE_SCHEDULE_TOLERANCE_SECS")? {
            cfg.schedule_tolerance = Duration::from_secs(v);
        }
        if let Some(v) = parse::<usize>(&lookup, "STOCKPULSE_MAX_CONCURRENT_SHOPS")? {
            cfg.max_concurrent_shops = v;
        }
        if let Some(v) = parse::<u32>(&lookup, "STOCKPULSE_CONFLICT_RETRIES")? {
            cfg.conflict_retries = v;
        }
        if let Some(v) = parse::<usize>(&lookup, "STOCKPULSE_EVENT_BUFFER")? {
            cfg.event_buffer = v;
        }
        if let Some(v) = parse::<usize>(&lookup, "STOCKPULSE_MAX_CONCURRENT_EVENTS")? {
            cfg.max_concurrent_events = v;
        }
        if let Some(v) = parse::<u64>(&lookup, "STOCKPULSE_FAILURE_BACKOFF_MS")? {
            cfg.failure_backoff = Duration::from_millis(v);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid("tick_interval must be > 0".into()));
        }
        if self.capability_timeout.is_zero() {
            return Err(ConfigError::Invalid("capability_timeout must be > 0".into()));
        }
        if self.capability_timeout >= self.tick_interval {
            return Err(ConfigError::Invalid(
                "capability_timeout must be shorter than tick_interval".into(),
            ));
        }
        if self.instant_dedup_window.is_zero() {
            return Err(ConfigError::Invalid("instant_dedup_window must be > 0".into()));
        }
        if self.schedule_tolerance.is_zero() {
            return Err(ConfigError::Invalid("schedule_tolerance must be > 0".into()));
        }
        if self.max_concurrent_shops == 0 {
            return Err(ConfigError::Invalid("max_concurrent_shops must be > 0".into()));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be > 0".into()));
        }
        if self.max_concurrent_events == 0 {
            return Err(ConfigError::Invalid("max_concurrent_events must be > 0".into()));
        }
        if self.failure_backoff.is_zero() {
            return Err(ConfigError::Invalid("failure_backoff must be > 0".into()));
        }
        Ok(())
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }

    pub fn with_instant_dedup_window(mut self, window: Duration) -> Self {
        self.instant_dedup_window = window;
        self
    }

    pub fn with_schedule_tolerance(mut self, tolerance: Duration) -> Self {
        self.schedule_tolerance = tolerance;
        self
    }

    pub fn with_max_concurrent_shops(mut self, max: usize) -> Self {
        self.max_concurrent_shops = max;
        self
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn with_max_concurrent_events(mut self, max: usize) -> Self {
        self.max_concurrent_events = max;
        self
    }

    pub fn with_failure_backoff(mut self, base: Duration) -> Self {
        self.failure_backoff = base;
        self
    }

    pub(crate) fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.instant_dedup_window).unwrap_or(chrono::Duration::hours(1))
    }

    pub(crate) fn tolerance(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.schedule_tolerance).unwrap_or(chrono::Duration::minutes(5))
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Parse { var, value: raw }),
    }
}
