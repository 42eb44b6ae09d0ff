use thiserror::Error;


#[derive(Error, Debug)]
pub enum SplatError {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("unsupported storage encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("source matches no known splat kind")]
    UnknownSplatKind,

    #[error("unknown quality tier: {0}")]
    UnknownQuality(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("payload truncated: needed {needed} bytes, {available} available")]
    Truncated {
        needed: usize,
        available: usize,
    },

    #[error("sort engine disconnected")]
    EngineDisconnected,

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SplatError>;
