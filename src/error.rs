use thiserror::Error;

/// Errors produced by the upload engine.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid upload session: {0}")]
    InvalidSession(String),

    #[error("invalid upload stream: {0}")]
    InvalidStream(String),

    #[error("invalid range: begin {begin} is past end {end}")]
    InvalidRange { begin: u64, end: u64 },

    #[error("cannot seek backwards: requested byte {requested}, already delivered through {position}")]
    BackwardSeek { requested: u64, position: u64 },

    #[error("malformed range string: {0:?}")]
    RangeParse(String),

    #[error("slice upload failed after {tries} attempts")]
    MaxRetriesExceeded { tries: u32 },

    #[error("all slices uploaded without a terminal response from the server")]
    UploadIncomplete,

    #[error("session request failed")]
    SessionRequest(#[source] Box<UploadError>),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
