pub mod http;

pub use http::{HttpPairingProvider, HttpProviderConfig};
