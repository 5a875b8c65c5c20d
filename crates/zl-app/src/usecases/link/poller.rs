//! Recurring status polling
//!
//! One poller per pairing cycle, owned by the orchestrator session. A
//! single recurring schedule fires an immediate first check and then
//! one check per interval; each check runs inside its own cancellation
//! scope (request timeout + the poller's cancellation token), so a new
//! tick never starts while the previous call is still in flight and a
//! stopped poller leaves no call running.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use zl_core::connection::model::ChannelProfile;
use zl_core::ids::InstanceName;
use zl_core::ports::pairing_provider::PairingProviderPort;

#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

/// How a polling cycle settled. Cancellation never reaches the
/// callback; a cancelled cycle simply goes quiet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A status check matched the connected predicate
    Connected(ChannelProfile),

    /// The retry budget ran out before any check connected
    Exhausted,
}

pub struct StatusPoller {
    cancel: CancellationToken,
}

impl StatusPoller {
    /// Spawns the polling schedule. `on_settled` runs at most once,
    /// and only for a cycle that was not stopped first.
    pub fn start<F, Fut>(
        provider: Arc<dyn PairingProviderPort>,
        name: InstanceName,
        policy: PollPolicy,
        on_settled: F,
    ) -> Self
    where
        F: FnOnce(PollOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            if let Some(outcome) = poll_until_settled(provider, &name, &policy, &token).await {
                on_settled(outcome).await;
            }
        });

        Self { cancel }
    }

    /// Idempotent; safe from any state, including after the schedule
    /// already stopped itself. The schedule checks the token at every
    /// await, so cancellation alone stops it without an abort that
    /// could tear down a callback mid-write.
    pub fn stop(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Returns `None` when cancelled.
async fn poll_until_settled(
    provider: Arc<dyn PairingProviderPort>,
    name: &InstanceName,
    policy: &PollPolicy,
    token: &CancellationToken,
) -> Option<PollOutcome> {
    let mut interval = tokio::time::interval(policy.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut retries: u32 = 0;

    loop {
        tokio::select! {
            _ = token.cancelled() => return None,
            _ = interval.tick() => {}
        }

        let check = tokio::time::timeout(policy.request_timeout, provider.check_status(name));
        let result = tokio::select! {
            _ = token.cancelled() => return None,
            result = check => result,
        };

        match result {
            Ok(Ok(payload)) if payload.connected => {
                tracing::debug!(instance = %name, "status check connected");
                return Some(PollOutcome::Connected(payload.profile.unwrap_or_default()));
            }
            Ok(Ok(payload)) => {
                tracing::trace!(instance = %name, state = ?payload.state, "not yet connected");
            }
            Ok(Err(err)) if err.is_transient() => {
                retries += 1;
                tracing::warn!(instance = %name, retries, error = %err, "status check failed");
            }
            Ok(Err(err)) => {
                // Unusable payload counts as "not yet ready", not as a
                // failed check; polling continues.
                tracing::warn!(instance = %name, error = %err, "unusable status payload");
            }
            Err(_) => {
                retries += 1;
                tracing::warn!(instance = %name, retries, "status check timed out");
            }
        }

        if retries >= policy.max_retries {
            tracing::warn!(instance = %name, retries, "status polling exhausted");
            return Some(PollOutcome::Exhausted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::advance;
    use zl_core::connection::model::StatusPayload;
    use zl_core::ports::errors::ProviderError;
    use zl_core::ports::pairing_provider::{InstanceCreated, PairingOutcome};

    fn policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(15),
            max_retries: 10,
        }
    }

    enum Step {
        Ok(StatusPayload),
        Err(ProviderError),
        Hang,
    }

    /// Scripted provider: pops one step per status check, repeats a
    /// "not connected" payload once the script runs out.
    struct ScriptedProvider {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PairingProviderPort for ScriptedProvider {
        async fn create_instance(
            &self,
            _name: &InstanceName,
        ) -> Result<InstanceCreated, ProviderError> {
            unimplemented!("not used by poller tests")
        }

        async fn fetch_pairing(
            &self,
            _name: &InstanceName,
        ) -> Result<PairingOutcome, ProviderError> {
            unimplemented!("not used by poller tests")
        }

        async fn check_status(&self, _name: &InstanceName) -> Result<StatusPayload, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Ok(payload)) => Ok(payload),
                Some(Step::Err(err)) => Err(err),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(StatusPayload::default())
                }
                None => Ok(StatusPayload::default()),
            }
        }

        async fn disconnect(&self, _name: &InstanceName) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn delete_instance(&self, _name: &InstanceName) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn connected_payload() -> StatusPayload {
        StatusPayload {
            connected: true,
            state: Some("open".to_string()),
            profile: None,
        }
    }

    fn name() -> InstanceName {
        InstanceName::parse("sales-01").unwrap()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn first_check_fires_immediately() {
        tokio::time::pause();
        let provider = ScriptedProvider::new(vec![Step::Ok(connected_payload())]);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        let _poller = StatusPoller::start(provider.clone(), name(), policy(), move |outcome| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(outcome).await;
            }
        });

        settle().await;
        assert_eq!(provider.calls(), 1);
        assert!(matches!(rx.try_recv(), Ok(PollOutcome::Connected(_))));
    }

    #[tokio::test]
    async fn connects_on_tenth_check_after_nine_errors() {
        tokio::time::pause();
        let mut steps: Vec<Step> = (0..9)
            .map(|i| Step::Err(ProviderError::Network(format!("attempt {i}"))))
            .collect();
        steps.push(Step::Ok(connected_payload()));
        let provider = ScriptedProvider::new(steps);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        let _poller = StatusPoller::start(provider.clone(), name(), policy(), move |outcome| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(outcome).await;
            }
        });

        for _ in 0..10 {
            settle().await;
            advance(Duration::from_secs(3)).await;
        }
        settle().await;

        assert_eq!(provider.calls(), 10);
        assert!(matches!(rx.try_recv(), Ok(PollOutcome::Connected(_))));
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        tokio::time::pause();
        let steps: Vec<Step> = (0..10)
            .map(|_| Step::Err(ProviderError::Http { status: 502, message: "bad gateway".into() }))
            .collect();
        let provider = ScriptedProvider::new(steps);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        let _poller = StatusPoller::start(provider.clone(), name(), policy(), move |outcome| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(outcome).await;
            }
        });

        for _ in 0..10 {
            settle().await;
            advance(Duration::from_secs(3)).await;
        }
        settle().await;

        assert_eq!(provider.calls(), 10);
        assert_eq!(rx.try_recv(), Ok(PollOutcome::Exhausted));
    }

    #[tokio::test]
    async fn malformed_payloads_keep_polling_without_burning_retries() {
        tokio::time::pause();
        let mut steps: Vec<Step> = (0..20)
            .map(|_| Step::Err(ProviderError::Malformed("no fields".into())))
            .collect();
        steps.push(Step::Ok(connected_payload()));
        let provider = ScriptedProvider::new(steps);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        let _poller = StatusPoller::start(provider.clone(), name(), policy(), move |outcome| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(outcome).await;
            }
        });

        // 21 checks, well past max_retries = 10.
        for _ in 0..21 {
            settle().await;
            advance(Duration::from_secs(3)).await;
        }
        settle().await;

        assert!(matches!(rx.try_recv(), Ok(PollOutcome::Connected(_))));
    }

    #[tokio::test]
    async fn stop_cancels_an_in_flight_check() {
        tokio::time::pause();
        let provider = ScriptedProvider::new(vec![Step::Hang]);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        let mut poller = StatusPoller::start(provider.clone(), name(), policy(), move |outcome| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(outcome).await;
            }
        });

        settle().await;
        assert_eq!(provider.calls(), 1);

        poller.stop();
        poller.stop();

        advance(Duration::from_secs(7200)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn per_call_timeout_counts_as_a_retry() {
        tokio::time::pause();
        let mut steps = vec![Step::Hang];
        steps.push(Step::Ok(connected_payload()));
        let provider = ScriptedProvider::new(steps);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        let _poller = StatusPoller::start(provider.clone(), name(), policy(), move |outcome| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(outcome).await;
            }
        });

        settle().await;
        // First call hangs; the 15s request timeout reaps it.
        advance(Duration::from_secs(15)).await;
        settle().await;
        // Next tick connects.
        advance(Duration::from_secs(3)).await;
        settle().await;

        assert_eq!(provider.calls(), 2);
        assert!(matches!(rx.try_recv(), Ok(PollOutcome::Connected(_))));
    }
}
