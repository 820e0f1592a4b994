use std::result::Result as StdResult;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Peer closed the connection, or shutdown arrived while idling.
    /// Sessions exit cleanly on this; it is never logged as a failure.
    #[error("normal close")]
    NormalClose,

    #[error("client read timeout")]
    ClientReadTimeout,

    /// EOF in the middle of a frame, document, or c-string.
    #[error("truncated message")]
    Truncated,

    /// EOF at a clean boundary, before any byte was consumed.
    #[error("end of stream")]
    EndOfStream,

    #[error("incorrect number of bytes written")]
    ShortWrite,

    #[error("invalid message length {0}")]
    InvalidMessageLength(i32),

    #[error("could not connect to {0}")]
    UpstreamUnavailable(String),

    #[error("invalid bson document: {0}")]
    BsonDecode(#[from] bson::de::Error),

    #[error("could not encode bson document: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    #[error("{0}")]
    Config(String),
}

pub type Result<T> = StdResult<T, Error>;
