//! Client engine for uploading large payloads to resumable upload sessions
//! in bounded byte-range slices.
//!
//! The server declares which byte ranges it still expects; the engine
//! partitions them into slices, PUTs each slice in ascending order through a
//! forward-only reader over a one-shot byte stream, and classifies every
//! reply as a continuation session, a terminal item, or a terminal redirect.

pub mod adapter;
pub mod error;
pub mod reader;
pub mod session;
pub mod slice;
pub mod task;

pub use adapter::{HttpAdapter, RequestAdapter, UploadRequest, UploadResponse};
pub use error::UploadError;
pub use reader::SectionReader;
pub use session::{ByteRange, UploadSession};
pub use slice::{SliceOutcome, UploadSlice};
pub use task::{FailurePolicy, LargeFileUploadTask, UploadResult, UploadTaskOptions};

/// Default upper bound on the bytes carried by a single slice PUT: 320 KiB.
pub const DEFAULT_SLICE_SIZE: u64 = 320 * 1024;
