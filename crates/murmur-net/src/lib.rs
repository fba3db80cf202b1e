// Mix-network transmission capability and an in-process loopback transport.

pub mod error;
pub mod loopback;
pub mod network;

pub use error::NetError;
pub use loopback::LoopbackNet;
pub use network::{
    HealthCallback, HealthCallbackId, MessageAssembler, MessageProcessor, MixNetwork, Round,
    RoundEvent, RoundEventCallback, RoundOutcome, SendParams, TargetedMessage,
};
