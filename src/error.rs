use thiserror::Error;

/// Failures from the reliable datagram transport (`crate::rdt`).
#[derive(Error, Debug)]
pub enum RdtError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("receive queue empty")]
    EmptyQueue,
    #[error("transport closed")]
    Closed,
}

/// Failures parsing or encoding application messages (`crate::codec`).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("message has no header line")]
    MissingHeader,
    #[error("header line has {0} token(s), expected at least {1}")]
    ShortHeader(usize, usize),
    #[error("unknown method {0:?}")]
    UnknownMethod(String),
    #[error("unknown status code {0:?}")]
    UnknownStatus(String),
    #[error("body line {0:?} has no size field")]
    MissingSize(String),
    #[error("size field {0:?} is not a non-negative integer")]
    BadSize(String),
    #[error("query body has no lines")]
    MissingQueryLine,
}

/// Failures from the directory server dispatch loop (`crate::server`).
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Rdt(#[from] RdtError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Failures from the client session (`crate::client`).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Rdt(#[from] RdtError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("not connected to a directory server")]
    NotConnected,
    #[error("send failed: peer did not acknowledge the message")]
    SendFailed,
    #[error("bad response: expected {expected}, got {got:?}")]
    BadResponse { expected: &'static str, got: String },
    #[error("no query result at index {0}")]
    NoSuchQueryResult(usize),
}

/// Failures from the peer file exchange (`crate::fileshare`).
#[derive(Error, Debug)]
pub enum FileShareError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed GET request line: {0:?}")]
    MalformedRequest(String),
    #[error("short transfer: expected {expected} bytes, got {got}")]
    ShortTransfer { expected: u64, got: u64 },
}
