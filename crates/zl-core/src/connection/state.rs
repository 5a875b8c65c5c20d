//! Connection lifecycle transition rules
//!
//! Design principle: this is a pure transition table with no side
//! effects. Runtime behaviors (timers, polling, persistence, provider
//! calls) live in the application layer, which feeds observations in as
//! `LinkEvent`s and executes the returned `LinkDecision`.

use crate::connection::model::ConnectionStatus;

/// Observations that drive a connection's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// User submitted a name; setup calls about to begin
    StartRequested,

    /// Provider issued a pairing code
    PairingIssued,

    /// `fetch_pairing` reported an already-paired device (no QR)
    ConnectedImmediately,

    /// A status check matched the connected predicate
    StatusConnected,

    /// The pairing code's fixed lifetime lapsed
    QrExpired,

    /// User asked for a fresh code after expiry
    RegenerateRequested,

    /// User tore the pairing down (cancel / navigate away)
    CancelRequested,

    /// User asked to unlink a connected channel
    DisconnectRequested,

    /// A provider call during setup failed
    SetupFailed,
}

/// What the application layer must do in response to an event.
///
/// Illegal or stale combinations collapse to `Ignore`; the caller may
/// log them but must not mutate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDecision {
    /// Persist `connecting` and run create + fetch-pairing
    BeginSetup,

    /// Persist `qr_pending`, arm the expiry timer, start the poller
    ShowQr,

    /// Stop timer and poller, persist `connected` with the profile
    CompleteConnection,

    /// Stop the poller, clear the code, persist `expired`
    MarkExpired,

    /// Re-run fetch-pairing after guaranteeing old timer/poller stopped
    RestartPairing,

    /// Stop any timer/poller, clear profile, persist `disconnected`
    ResetToDisconnected,

    /// No-op
    Ignore,
}

/// Pure transition function: `(status, event) -> decision`.
pub fn apply(status: ConnectionStatus, event: LinkEvent) -> LinkDecision {
    use ConnectionStatus::*;
    use LinkEvent::*;

    match (status, event) {
        (Disconnected, StartRequested) => LinkDecision::BeginSetup,

        (Connecting, PairingIssued) => LinkDecision::ShowQr,
        (Connecting, ConnectedImmediately) => LinkDecision::CompleteConnection,

        // A connect observed by the live pairing cycle completes even
        // when the countdown lapsed first; callbacks from dead cycles
        // are filtered out before this table is consulted.
        (QrPending | Expired, StatusConnected) => LinkDecision::CompleteConnection,
        (QrPending, QrExpired) => LinkDecision::MarkExpired,

        (Expired, RegenerateRequested) => LinkDecision::RestartPairing,

        // Setup failure rolls the provisional record back instead of
        // leaving it stuck in `connecting`/`qr_pending`.
        (Connecting | QrPending, SetupFailed) => LinkDecision::ResetToDisconnected,

        (Connecting | QrPending | Expired, CancelRequested) => LinkDecision::ResetToDisconnected,
        (Connected, DisconnectRequested) => LinkDecision::ResetToDisconnected,

        // Late expiry after a successful connection, duplicate status
        // hits, out-of-order callbacks: all no-ops.
        _ => LinkDecision::Ignore,
    }
}
