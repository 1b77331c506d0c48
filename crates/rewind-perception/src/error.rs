use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("platform hook error ({source_name}): {reason}")]
    Hook {
        source_name: &'static str,
        reason: String,
    },

    #[error("screen grab failed: {0}")]
    Grab(String),

    #[error("channel closed")]
    ChannelClosed,
}
