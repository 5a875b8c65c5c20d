pub mod connection_store;
pub mod errors;
pub mod pairing_provider;

pub use connection_store::ConnectionStorePort;
pub use errors::{ConnectionStoreError, ProviderError};
pub use pairing_provider::{InstanceCreated, PairingOutcome, PairingProviderPort};
