//! # zl-app
//!
//! Application layer for zaplink: orchestrates the channel-pairing
//! lifecycle over the ports defined in `zl-core`.

pub mod config;
pub mod usecases;

pub use config::LinkConfig;
pub use usecases::link::{
    DisconnectOutcome, LinkDomainEvent, LinkError, LinkEventPort, LinkOrchestrator, StartOutcome,
    StatusPoller,
};
