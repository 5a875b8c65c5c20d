//! # zl-infra
//!
//! Infrastructure adapters for zaplink: the HTTP client behind the
//! pairing-provider port and the in-memory connection store.

pub mod provider;
pub mod store;

pub use provider::{HttpPairingProvider, HttpProviderConfig};
pub use store::MemoryConnectionStore;
