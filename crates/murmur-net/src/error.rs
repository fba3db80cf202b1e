use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    /// The caller's assembler refused to build the frames for the chosen round.
    #[error("Message assembly failed: {0}")]
    Assembly(anyhow::Error),

    #[error("Frame contents of {len} bytes exceed the {max}-byte limit")]
    MessageTooLong { len: usize, max: usize },

    #[error("Network is not healthy")]
    Unhealthy,

    #[error("Network state lock poisoned")]
    LockPoisoned,
}
