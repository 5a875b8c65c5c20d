use std::time::Duration;

use zl_core::settings::LinkSettings;

/// Lifecycle tunables, floored so a bad settings file can never produce
/// a zero-length timer or a spin-polling loop.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Per-request timeout for provider calls
    pub request_timeout: Duration,

    /// Interval between status checks
    pub poll_interval: Duration,

    /// Pairing code lifetime (seconds)
    pub qr_lifetime_secs: u64,

    /// Consecutive failed status checks before the poller gives up
    pub max_poll_retries: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::from_settings(&LinkSettings::default())
    }
}

impl LinkConfig {
    pub fn from_settings(settings: &LinkSettings) -> Self {
        Self {
            request_timeout: settings.request_timeout.max(Duration::from_secs(1)),
            poll_interval: settings.poll_interval.max(Duration::from_secs(1)),
            qr_lifetime_secs: settings.qr_lifetime.as_secs().max(1),
            max_poll_retries: settings.max_poll_retries.max(1),
        }
    }

    /// Environment overrides on top of defaults, for deployments that
    /// configure through the process environment.
    pub fn from_env() -> Self {
        let defaults = LinkSettings::default();
        let settings = LinkSettings {
            request_timeout: env_secs("ZAPLINK_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout),
            poll_interval: env_secs("ZAPLINK_POLL_INTERVAL_SECS").unwrap_or(defaults.poll_interval),
            qr_lifetime: env_secs("ZAPLINK_QR_LIFETIME_SECS").unwrap_or(defaults.qr_lifetime),
            max_poll_retries: std::env::var("ZAPLINK_MAX_POLL_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_poll_retries),
        };
        Self::from_settings(&settings)
    }

    pub fn qr_lifetime(&self) -> Duration {
        Duration::from_secs(self.qr_lifetime_secs)
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
