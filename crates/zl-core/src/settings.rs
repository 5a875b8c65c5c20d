use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the channel-pairing lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Per-request timeout for provider HTTP calls
    pub request_timeout: Duration,

    /// Interval between status checks while a QR is pending
    pub poll_interval: Duration,

    /// Fixed lifetime of an issued pairing code
    pub qr_lifetime: Duration,

    /// Consecutive failed status checks tolerated before giving up
    pub max_poll_retries: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_secs(3),
            qr_lifetime: Duration::from_secs(60),
            max_poll_retries: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let settings = LinkSettings::default();
        assert_eq!(settings.request_timeout, Duration::from_secs(15));
        assert_eq!(settings.poll_interval, Duration::from_secs(3));
        assert_eq!(settings.qr_lifetime, Duration::from_secs(60));
        assert_eq!(settings.max_poll_retries, 10);
    }
}
