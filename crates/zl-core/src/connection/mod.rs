pub mod model;
pub mod normalize;
pub mod state;

pub use model::{
    ChannelProfile, ConnectionInstance, ConnectionStatus, NewConnection, PairingCode,
    StatusPayload,
};
pub use state::{apply, LinkDecision, LinkEvent};
