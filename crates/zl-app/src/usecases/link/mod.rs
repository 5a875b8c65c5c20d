pub mod error;
pub mod events;
pub mod expiration;
pub mod orchestrator;
pub mod poller;

pub use error::LinkError;
pub use events::{LinkDomainEvent, LinkEventPort};
pub use expiration::ExpirationTimer;
pub use orchestrator::{DisconnectOutcome, LinkOrchestrator, StartOutcome};
pub use poller::{PollOutcome, PollPolicy, StatusPoller};
