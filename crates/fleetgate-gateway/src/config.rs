//! Environment-driven configuration with hardcoded fallback defaults —
//! there is no config file format in scope here, only the handful of knobs
//! the orchestrator itself needs.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use tracing::debug;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub idle_timeout: Duration,
    pub suspend_timeout: Duration,
    pub health_check_interval: Duration,
    pub checkpoint_path: Option<PathBuf>,
    /// If set, `node.register` frames must carry this token. `None` accepts
    /// any token (useful for local/test deployments).
    pub register_token: Option<String>,
    /// Scopes conversation-binding fingerprints to this fleet so two bots
    /// fronting the same peer never collide.
    pub bot_id: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7700".parse().unwrap_or_else(|_| unreachable_default_addr()),
            idle_timeout: Duration::from_secs(5 * 60),
            suspend_timeout: Duration::from_secs(2 * 60),
            health_check_interval: Duration::from_secs(30),
            checkpoint_path: None,
            register_token: None,
            bot_id: "default".to_string(),
        }
    }
}

fn unreachable_default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7700))
}

impl GatewayConfig {
    /// Start from defaults, then overlay whichever `FLEETGATE_*` variables
    /// are set. Malformed values are logged and skipped rather than
    /// rejected outright, matching the non-fatal posture of config loading
    /// elsewhere in the stack.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("FLEETGATE_BIND_ADDR") {
            match raw.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => debug!(error = %e, raw, "ignoring invalid FLEETGATE_BIND_ADDR"),
            }
        }
        if let Some(ms) = env_duration_ms("FLEETGATE_IDLE_TIMEOUT_MS") {
            config.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_duration_ms("FLEETGATE_SUSPEND_TIMEOUT_MS") {
            config.suspend_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_duration_ms("FLEETGATE_HEALTH_CHECK_INTERVAL_MS") {
            config.health_check_interval = Duration::from_millis(ms);
        }
        if let Ok(raw) = std::env::var("FLEETGATE_CHECKPOINT_PATH") {
            config.checkpoint_path = Some(PathBuf::from(raw));
        }
        if let Ok(raw) = std::env::var("FLEETGATE_REGISTER_TOKEN") {
            config.register_token = Some(raw);
        }
        if let Ok(raw) = std::env::var("FLEETGATE_BOT_ID") {
            config.bot_id = raw;
        }

        config
    }
}

fn env_duration_ms(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(ms),
        Err(e) => {
            debug!(error = %e, raw, var, "ignoring invalid duration env var");
            None
        },
    }
}
