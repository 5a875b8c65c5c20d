//! Connection lifecycle orchestrator
//!
//! Converts user requests, timer expiries and poll results into
//! `LinkEvent`s, runs them through the pure transition table in
//! `zl_core::connection::state`, and executes the returned decision
//! against the provider, the store, the per-connection timer/poller
//! pair and the event subscribers.
//!
//! # Architecture
//!
//! ```text
//! User/Timer/Poller observations
//!   ↓
//! LinkOrchestrator (converts observations)
//!   ↓
//! state::apply (pure transitions)
//!   ↓
//! LinkDecision (executed by orchestrator)
//!   ↓
//! Provider/Store/Timer side effects + LinkDomainEvents
//! ```
//!
//! Every pairing cycle carries an epoch drawn from a process-wide
//! counter. Timer and poller callbacks capture the epoch they were
//! armed under and re-check it under the sessions lock before acting,
//! so a callback from a cancelled or superseded cycle is a no-op even
//! if it was already in flight when the cycle was torn down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info_span, Instrument};

use zl_core::connection::model::{
    ConnectionInstance, ConnectionStatus, NewConnection, PairingCode,
};
use zl_core::connection::state::{apply, LinkDecision, LinkEvent};
use zl_core::ids::{InstanceId, InstanceName};
use zl_core::ports::connection_store::ConnectionStorePort;
use zl_core::ports::errors::{ConnectionStoreError, ProviderError};
use zl_core::ports::pairing_provider::{PairingOutcome, PairingProviderPort};

use super::error::LinkError;
use super::events::{LinkDomainEvent, LinkEventPort};
use super::expiration::ExpirationTimer;
use super::poller::{PollOutcome, PollPolicy, StatusPoller};
use crate::config::LinkConfig;

type Sessions = Arc<RwLock<HashMap<InstanceId, PairingSession>>>;
type EventSenders = Arc<Mutex<Vec<mpsc::Sender<LinkDomainEvent>>>>;

/// How a start or regenerate request resolved.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// A pairing code is on screen; the expiry timer and status poller
    /// are running.
    QrIssued {
        instance: ConnectionInstance,
        code: PairingCode,
    },

    /// The device was already paired; no code was issued.
    Connected { instance: ConnectionInstance },
}

/// Result of a disconnect. The local reset always happened; a provider
/// logout failure rides along so callers can tell the user the remote
/// session may still be live.
#[derive(Debug, Clone)]
pub struct DisconnectOutcome {
    pub instance: ConnectionInstance,
    pub provider_error: Option<ProviderError>,
}

/// Live resources for one pairing cycle.
struct PairingSession {
    epoch: u64,
    code: Option<PairingCode>,
    timer: ExpirationTimer,
    poller: Option<StatusPoller>,
}

/// Manages every connection's lifecycle over the provider and store
/// ports. One instance serves the whole process; per-connection
/// concurrency is isolated through the sessions map.
#[derive(Clone)]
pub struct LinkOrchestrator {
    config: LinkConfig,
    provider: Arc<dyn PairingProviderPort>,
    store: Arc<dyn ConnectionStorePort>,
    sessions: Sessions,
    next_epoch: Arc<AtomicU64>,
    event_senders: EventSenders,
}

impl LinkOrchestrator {
    pub fn new(
        config: LinkConfig,
        provider: Arc<dyn PairingProviderPort>,
        store: Arc<dyn ConnectionStorePort>,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_epoch: Arc::new(AtomicU64::new(0)),
            event_senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates (or reuses a disconnected) record for `raw_name`, sets up
    /// the provider instance and either puts a pairing code on screen or
    /// reports an already-paired device. Name validation and the
    /// duplicate check run before any provider call; a provider failure
    /// rolls the record back to `disconnected`.
    pub async fn start_pairing(&self, raw_name: &str) -> Result<StartOutcome, LinkError> {
        let name = InstanceName::parse(raw_name)?;
        let span = info_span!("link.start_pairing", name = %name);
        async {
            let record = match self.store.get_by_name(&name).await? {
                Some(record) if record.status.can_start() => {
                    self.store
                        .set_status(&record.id, ConnectionStatus::Connecting)
                        .await?;
                    record
                }
                Some(record) => {
                    return Err(LinkError::DuplicateName(record.name.as_str().to_owned()))
                }
                None => self
                    .store
                    .create(NewConnection {
                        name: name.clone(),
                        status: ConnectionStatus::Connecting,
                    })
                    .await
                    .map_err(|err| match err {
                        ConnectionStoreError::DuplicateName(taken) => {
                            LinkError::DuplicateName(taken)
                        }
                        other => LinkError::Store(other),
                    })?,
            };
            let id = record.id.clone();

            let created = match self.provider.create_instance(&name).await {
                Ok(created) => created,
                Err(err) => {
                    self.roll_back_setup(&id, None, &err.to_string()).await;
                    return Err(err.into());
                }
            };
            // From here on the provider-side instance exists; a store
            // write failure gets the same rollback as a provider failure
            // so the record never sits in `connecting` with nothing
            // running behind it.
            if let Some(external) = created.external_instance_id {
                if let Err(err) = self.store.set_external_instance_id(&id, external).await {
                    self.roll_back_setup(&id, Some(&name), &err.to_string()).await;
                    return Err(err.into());
                }
            }

            match self.provider.fetch_pairing(&name).await {
                Ok(PairingOutcome::Code(code)) => {
                    if let Err(err) = self
                        .store
                        .set_status(&id, ConnectionStatus::QrPending)
                        .await
                    {
                        self.roll_back_setup(&id, Some(&name), &err.to_string()).await;
                        return Err(err.into());
                    }
                    self.arm_session(&id, &name, code.clone()).await;
                    Self::emit(
                        &self.event_senders,
                        LinkDomainEvent::QrIssued {
                            id: id.clone(),
                            code: code.clone(),
                        },
                    )
                    .await;
                    let instance = self.store.get(&id).await?.ok_or(LinkError::NotFound)?;
                    Ok(StartOutcome::QrIssued { instance, code })
                }
                Ok(PairingOutcome::AlreadyConnected(profile)) => {
                    if let Err(err) = self.store.mark_connected(&id, profile.clone()).await {
                        self.roll_back_setup(&id, Some(&name), &err.to_string()).await;
                        return Err(err.into());
                    }
                    Self::emit(
                        &self.event_senders,
                        LinkDomainEvent::Connected {
                            id: id.clone(),
                            profile,
                        },
                    )
                    .await;
                    let instance = self.store.get(&id).await?.ok_or(LinkError::NotFound)?;
                    Ok(StartOutcome::Connected { instance })
                }
                Err(err) => {
                    // Remove the provider-side instance so a retry does
                    // not collide with an orphan.
                    self.roll_back_setup(&id, Some(&name), &err.to_string()).await;
                    Err(err.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Issues a fresh pairing code for an expired connection.
    pub async fn regenerate(&self, id: &InstanceId) -> Result<StartOutcome, LinkError> {
        let span = info_span!("link.regenerate", id = %id);
        async {
            let record = self.store.get(id).await?.ok_or(LinkError::NotFound)?;
            if apply(record.status, LinkEvent::RegenerateRequested) != LinkDecision::RestartPairing
            {
                return Err(LinkError::InvalidState {
                    status: record.status,
                });
            }

            self.teardown_session(id).await;

            match self.provider.fetch_pairing(&record.name).await {
                Ok(PairingOutcome::Code(code)) => {
                    self.store
                        .set_status(id, ConnectionStatus::QrPending)
                        .await?;
                    self.arm_session(id, &record.name, code.clone()).await;
                    Self::emit(
                        &self.event_senders,
                        LinkDomainEvent::QrIssued {
                            id: id.clone(),
                            code: code.clone(),
                        },
                    )
                    .await;
                    let instance = self.store.get(id).await?.ok_or(LinkError::NotFound)?;
                    Ok(StartOutcome::QrIssued { instance, code })
                }
                Ok(PairingOutcome::AlreadyConnected(profile)) => {
                    self.store.mark_connected(id, profile.clone()).await?;
                    Self::emit(
                        &self.event_senders,
                        LinkDomainEvent::Connected {
                            id: id.clone(),
                            profile,
                        },
                    )
                    .await;
                    let instance = self.store.get(id).await?.ok_or(LinkError::NotFound)?;
                    Ok(StartOutcome::Connected { instance })
                }
                // The record stays expired; the user can retry.
                Err(err) => Err(err.into()),
            }
        }
        .instrument(span)
        .await
    }

    /// Tears a pairing cycle down before it completes. Idempotent for
    /// records that are already disconnected.
    pub async fn cancel(&self, id: &InstanceId) -> Result<(), LinkError> {
        let span = info_span!("link.cancel", id = %id);
        async {
            let record = self.store.get(id).await?.ok_or(LinkError::NotFound)?;
            match apply(record.status, LinkEvent::CancelRequested) {
                LinkDecision::ResetToDisconnected => {
                    self.teardown_session(id).await;
                    // The provisional provider instance is useless once
                    // pairing is abandoned; failures here only leave an
                    // orphan on the provider side.
                    if let Err(err) = self.provider.delete_instance(&record.name).await {
                        tracing::warn!(id = %id, error = %err, "provider cleanup after cancel failed");
                    }
                    self.store
                        .set_status(id, ConnectionStatus::Disconnected)
                        .await?;
                    Self::emit(
                        &self.event_senders,
                        LinkDomainEvent::Disconnected { id: id.clone() },
                    )
                    .await;
                    Ok(())
                }
                _ if record.status == ConnectionStatus::Disconnected => Ok(()),
                _ => Err(LinkError::InvalidState {
                    status: record.status,
                }),
            }
        }
        .instrument(span)
        .await
    }

    /// Unlinks a connected channel. A provider logout failure never
    /// blocks the local reset; it is carried in the outcome so the
    /// caller can warn that the remote session may still be live.
    pub async fn disconnect(&self, id: &InstanceId) -> Result<DisconnectOutcome, LinkError> {
        let span = info_span!("link.disconnect", id = %id);
        async {
            let record = self.store.get(id).await?.ok_or(LinkError::NotFound)?;
            if apply(record.status, LinkEvent::DisconnectRequested)
                != LinkDecision::ResetToDisconnected
            {
                return Err(LinkError::InvalidState {
                    status: record.status,
                });
            }

            self.teardown_session(id).await;
            let provider_error = match self.provider.disconnect(&record.name).await {
                Ok(()) => None,
                Err(err) => {
                    tracing::warn!(id = %id, error = %err, "provider logout failed");
                    Some(err)
                }
            };
            self.store
                .set_status(id, ConnectionStatus::Disconnected)
                .await?;
            Self::emit(
                &self.event_senders,
                LinkDomainEvent::Disconnected { id: id.clone() },
            )
            .await;
            let instance = self.store.get(id).await?.ok_or(LinkError::NotFound)?;
            Ok(DisconnectOutcome {
                instance,
                provider_error,
            })
        }
        .instrument(span)
        .await
    }

    /// Removes the record and its provider instance. Without `force` a
    /// provider delete failure keeps the record (reset to disconnected)
    /// so the delete can be retried; with `force` the local record is
    /// removed regardless. A provider 404 counts as already deleted.
    pub async fn delete(&self, id: &InstanceId, force: bool) -> Result<(), LinkError> {
        let span = info_span!("link.delete", id = %id, force);
        async {
            let record = self.store.get(id).await?.ok_or(LinkError::NotFound)?;
            self.teardown_session(id).await;

            if record.status.is_connected() {
                if let Err(err) = self.provider.disconnect(&record.name).await {
                    tracing::warn!(id = %id, error = %err, "provider logout before delete failed");
                }
            }

            match self.provider.delete_instance(&record.name).await {
                Ok(()) => {}
                Err(ProviderError::Http { status: 404, .. }) => {
                    tracing::debug!(id = %id, "provider instance already gone");
                }
                Err(err) if force => {
                    tracing::warn!(id = %id, error = %err, "forcing local delete");
                }
                Err(err) => {
                    // Leave the record retryable rather than stuck in a
                    // pairing status with no live resources.
                    if record.status != ConnectionStatus::Disconnected {
                        self.store
                            .set_status(id, ConnectionStatus::Disconnected)
                            .await?;
                    }
                    return Err(err.into());
                }
            }

            self.store.delete(id).await?;
            Self::emit(
                &self.event_senders,
                LinkDomainEvent::Deleted { id: id.clone() },
            )
            .await;
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub async fn get(&self, id: &InstanceId) -> Result<ConnectionInstance, LinkError> {
        self.store.get(id).await?.ok_or(LinkError::NotFound)
    }

    pub async fn list(&self) -> Result<Vec<ConnectionInstance>, LinkError> {
        Ok(self.store.list_all().await?)
    }

    /// The pairing code currently on screen, if the cycle still has one.
    pub async fn current_code(&self, id: &InstanceId) -> Option<PairingCode> {
        self.sessions
            .read()
            .await
            .get(id)
            .and_then(|session| session.code.clone())
    }

    /// Seconds left on the current code's countdown, for UI display.
    pub async fn code_expires_in(&self, id: &InstanceId) -> Option<u64> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(id)?;
        session.code.as_ref()?;
        Some(session.timer.remaining_secs())
    }

    /// Arms the expiry timer and status poller for a fresh cycle. The
    /// sessions write lock is held until the entry is inserted, so
    /// neither callback can observe a half-armed cycle.
    async fn arm_session(&self, id: &InstanceId, name: &InstanceName, code: PairingCode) {
        let mut sessions = self.sessions.write().await;
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);

        let mut timer = ExpirationTimer::new(self.config.qr_lifetime());
        {
            let sessions = self.sessions.clone();
            let store = self.store.clone();
            let event_senders = self.event_senders.clone();
            let id = id.clone();
            timer.start(move || Self::handle_expiry(sessions, store, event_senders, id, epoch));
        }

        let policy = PollPolicy {
            interval: self.config.poll_interval,
            request_timeout: self.config.request_timeout,
            max_retries: self.config.max_poll_retries,
        };
        let poller = {
            let sessions = self.sessions.clone();
            let store = self.store.clone();
            let event_senders = self.event_senders.clone();
            let id = id.clone();
            StatusPoller::start(
                self.provider.clone(),
                name.clone(),
                policy,
                move |outcome| {
                    Self::handle_poll_settled(sessions, store, event_senders, id, epoch, outcome)
                },
            )
        };

        sessions.insert(
            id.clone(),
            PairingSession {
                epoch,
                code: Some(code),
                timer,
                poller: Some(poller),
            },
        );
    }

    /// Drops the live cycle for `id`, stopping its timer and poller.
    async fn teardown_session(&self, id: &InstanceId) {
        let mut sessions = self.sessions.write().await;
        if let Some(mut session) = sessions.remove(id) {
            session.timer.stop();
            if let Some(mut poller) = session.poller.take() {
                poller.stop();
            }
        }
    }

    /// Expiry timer callback. Runs on the timer's task; a stale epoch or
    /// a record that already left `qr_pending` makes this a no-op.
    async fn handle_expiry(
        sessions: Sessions,
        store: Arc<dyn ConnectionStorePort>,
        event_senders: EventSenders,
        id: InstanceId,
        epoch: u64,
    ) {
        let span = info_span!("link.handle_expiry", id = %id);
        async {
            {
                let mut sessions = sessions.write().await;
                let Some(session) = sessions.get_mut(&id) else {
                    return;
                };
                if session.epoch != epoch {
                    return;
                }

                let status = match store.get(&id).await {
                    Ok(Some(record)) => record.status,
                    Ok(None) => return,
                    Err(err) => {
                        tracing::warn!(id = %id, error = %err, "status lookup on expiry failed");
                        return;
                    }
                };
                if apply(status, LinkEvent::QrExpired) != LinkDecision::MarkExpired {
                    return;
                }

                session.code = None;
                if let Some(mut poller) = session.poller.take() {
                    poller.stop();
                }
                if let Err(err) = store.set_status(&id, ConnectionStatus::Expired).await {
                    tracing::warn!(id = %id, error = %err, "failed to persist expiry");
                    return;
                }
            }

            Self::emit(&event_senders, LinkDomainEvent::QrExpired { id: id.clone() }).await;
        }
        .instrument(span)
        .await
    }

    /// Poller settled callback. Runs on the poller's task.
    async fn handle_poll_settled(
        sessions: Sessions,
        store: Arc<dyn ConnectionStorePort>,
        event_senders: EventSenders,
        id: InstanceId,
        epoch: u64,
        outcome: PollOutcome,
    ) {
        let span = info_span!("link.handle_poll_settled", id = %id, outcome = ?outcome);
        async {
            match outcome {
                PollOutcome::Connected(profile) => {
                    {
                        let mut sessions = sessions.write().await;
                        let Some(session) = sessions.get_mut(&id) else {
                            return;
                        };
                        if session.epoch != epoch {
                            return;
                        }

                        let status = match store.get(&id).await {
                            Ok(Some(record)) => record.status,
                            Ok(None) => return,
                            Err(err) => {
                                tracing::warn!(id = %id, error = %err, "status lookup on connect failed");
                                return;
                            }
                        };
                        if apply(status, LinkEvent::StatusConnected)
                            != LinkDecision::CompleteConnection
                        {
                            return;
                        }

                        // Dropping the session aborts the expiry timer,
                        // so a late expiry can never demote the record.
                        sessions.remove(&id);
                        if let Err(err) = store.mark_connected(&id, profile.clone()).await {
                            tracing::warn!(id = %id, error = %err, "failed to persist connection");
                            return;
                        }
                    }

                    Self::emit(
                        &event_senders,
                        LinkDomainEvent::Connected {
                            id: id.clone(),
                            profile,
                        },
                    )
                    .await;
                }
                PollOutcome::Exhausted => {
                    {
                        let mut sessions = sessions.write().await;
                        let Some(session) = sessions.get_mut(&id) else {
                            return;
                        };
                        if session.epoch != epoch {
                            return;
                        }
                        // The code stays on screen until its own expiry;
                        // only the polling resources are released.
                        session.poller = None;
                    }

                    Self::emit(&event_senders, LinkDomainEvent::PollExhausted { id: id.clone() })
                        .await;
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Rolls a failed setup back to `disconnected`, optionally removing
    /// the provider-side instance first. Covers provider failures and
    /// store-write failures alike; a record must never be left in
    /// `connecting` with no live setup behind it.
    async fn roll_back_setup(&self, id: &InstanceId, cleanup: Option<&InstanceName>, reason: &str) {
        if let Some(name) = cleanup {
            if let Err(err) = self.provider.delete_instance(name).await {
                tracing::warn!(id = %id, error = %err, "provider cleanup after failed setup");
            }
        }
        if let Err(err) = self
            .store
            .set_status(id, ConnectionStatus::Disconnected)
            .await
        {
            tracing::warn!(id = %id, error = %err, "failed to roll back record");
        }
        Self::emit(
            &self.event_senders,
            LinkDomainEvent::PairingFailed {
                id: id.clone(),
                reason: reason.to_string(),
            },
        )
        .await;
    }

    /// Fans an event out to every live subscriber. The sender list is
    /// cloned so nothing runs under the lock, and delivery never waits:
    /// a subscriber whose buffer is full loses the event instead of
    /// stalling every lifecycle behind it. Closed receivers are pruned.
    async fn emit(event_senders: &EventSenders, event: LinkDomainEvent) {
        let senders = { event_senders.lock().await.clone() };

        let mut pruned = false;
        for tx in &senders {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(event = ?event, "subscriber buffer full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => pruned = true,
            }
        }

        if pruned {
            event_senders.lock().await.retain(|tx| !tx.is_closed());
        }
    }
}

#[async_trait::async_trait]
impl LinkEventPort for LinkOrchestrator {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<LinkDomainEvent>> {
        let (event_tx, event_rx) = mpsc::channel(100);
        let mut senders = self.event_senders.lock().await;
        senders.push(event_tx);
        Ok(event_rx)
    }
}
