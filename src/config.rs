//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the centralized settings of the supervision runtime.
//!
//! Config is used in two ways:
//! 1. **Supervisor creation**: `Supervisor::builder(config, state)`
//! 2. **From settings**: `SupervisorConfig::from_settings(&settings)` reads the `system` subtree
//!
//! ## Sentinel values
//! - `max_thread_restarts = 0` in settings → unlimited restarts
//! - `health_threshold` is clamped to a minimum of 1
//! - `escalation` accepts only `log` or `shutdown`; anything else is a [`ConfigError::Invalid`]

use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, RestartPolicy};
use crate::settings::Settings;

/// Global configuration for the supervision runtime.
///
/// ## Field semantics
/// - `health_threshold`: consecutive errors that mark a service as sick (default 3)
/// - `grace`: shared deadline for all services to stop on shutdown
/// - `restart_join_timeout`: bounded wait for a sick instance to exit before its replacement starts
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `restart`: restart cap and backoff
/// - `escalation`: built-in hook used when the restart cap is exceeded
/// - `escalation_reset`: uptime after which a replaced instance re-arms escalation
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Consecutive `report_error()` calls that raise a restart signal.
    pub health_threshold: u32,

    /// Maximum time to wait for all services to stop on shutdown.
    ///
    /// Services still running after `grace` are reported in
    /// [`RuntimeError::GraceExceeded`](crate::RuntimeError::GraceExceeded).
    pub grace: Duration,

    /// Maximum time to wait for a sick instance to exit during a restart.
    ///
    /// An instance that does not exit in time is logged as leaked and the
    /// replacement is started anyway.
    pub restart_join_timeout: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Restart cap and backoff applied to every service.
    pub restart: RestartPolicy,

    /// Built-in escalation hook; overridden by `SupervisorBuilder::with_escalation`.
    pub escalation: EscalationMode,

    /// A slot escalates at most once until one of its instances stays up this long.
    ///
    /// Keeps a permanently broken service from writing the persisted counters on
    /// every restart.
    pub escalation_reset: Duration,
}

/// Built-in escalation hooks selectable from settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EscalationMode {
    /// Log at `error` and keep restarting.
    #[default]
    Log,
    /// Request a graceful shutdown of the supervisor.
    Shutdown,
}

impl std::str::FromStr for EscalationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(EscalationMode::Log),
            "shutdown" => Ok(EscalationMode::Shutdown),
            other => Err(ConfigError::Invalid {
                path: "system.escalation".to_string(),
                reason: format!("expected 'log' or 'shutdown', got '{other}'"),
            }),
        }
    }
}

impl SupervisorConfig {
    /// Threshold clamped to a minimum of 1.
    #[inline]
    pub fn threshold(&self) -> u32 {
        self.health_threshold.max(1)
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Reads the `system` subtree of the settings, keeping defaults for missing keys.
    ///
    /// ```yaml
    /// system:
    ///   health_threshold: 3
    ///   max_thread_restarts: 0        # 0 = unlimited
    ///   grace_secs: 10
    ///   restart_join_timeout_ms: 2000
    ///   restart_backoff_ms: 0
    ///   restart_backoff_max_ms: 0
    ///   bus_capacity: 1024
    ///   escalation: log               # log | shutdown
    ///   escalation_reset_secs: 60
    /// ```
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let sys = settings.subtree("system");
        let mut cfg = Self::default();

        if let Some(n) = sys.get::<u32>("health_threshold")? {
            cfg.health_threshold = n;
        }
        if let Some(secs) = sys.get::<u64>("grace_secs")? {
            cfg.grace = Duration::from_secs(secs);
        }
        if let Some(ms) = sys.get::<u64>("restart_join_timeout_ms")? {
            cfg.restart_join_timeout = Duration::from_millis(ms);
        }
        if let Some(cap) = sys.get::<usize>("bus_capacity")? {
            cfg.bus_capacity = cap;
        }
        if let Some(max) = sys.get::<u32>("max_thread_restarts")? {
            cfg.restart.max_restarts = (max > 0).then_some(max);
        }
        if let Some(first) = sys.get::<u64>("restart_backoff_ms")? {
            let max = sys.get_or::<u64>("restart_backoff_max_ms", first)?;
            cfg.restart.backoff = BackoffPolicy::exponential(
                Duration::from_millis(first),
                Duration::from_millis(max.max(first)),
            );
        }
        if let Some(mode) = sys.get::<String>("escalation")? {
            cfg.escalation = mode.parse()?;
        }
        if let Some(secs) = sys.get::<u64>("escalation_reset_secs")? {
            cfg.escalation_reset = Duration::from_secs(secs);
        }
        Ok(cfg)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `health_threshold = 3`
    /// - `grace = 10s`
    /// - `restart_join_timeout = 2s`
    /// - `bus_capacity = 1024`
    /// - `restart = RestartPolicy::unlimited()` (no cap, no backoff)
    /// - `escalation = Log`, `escalation_reset = 60s`
    fn default() -> Self {
        Self {
            health_threshold: 3,
            grace: Duration::from_secs(10),
            restart_join_timeout: Duration::from_secs(2),
            bus_capacity: 1024,
            restart: RestartPolicy::unlimited(),
            escalation: EscalationMode::Log,
            escalation_reset: Duration::from_secs(60),
        }
    }
}
