//! # zl-core
//!
//! Core domain models and business logic for zaplink.
//!
//! This crate contains pure business logic without any infrastructure dependencies.

// Public module exports
pub mod connection;
pub mod ids;
pub mod ports;
pub mod settings;

// Re-export commonly used types at the crate root
pub use connection::model::{
    ChannelProfile, ConnectionInstance, ConnectionStatus, NewConnection, PairingCode,
    StatusPayload,
};
pub use connection::state::{LinkDecision, LinkEvent};
pub use ids::{InstanceId, InstanceName, InstanceNameError};
pub use settings::LinkSettings;
