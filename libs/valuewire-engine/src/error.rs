use valuewire_api::StreamError;

/// Engine-level wrapper around `StreamError`, adding the context a session
/// has but a bare protocol fault does not (which side raised it, how far
/// the parser had gotten).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
