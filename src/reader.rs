use std::io;

use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::error::UploadError;

/// Forward-only byte-range reader over a one-shot chunk stream.
///
/// The underlying stream can be consumed exactly once, in order. Sections
/// must therefore be requested with non-decreasing start offsets; asking for
/// bytes before the last delivered position fails with
/// [`UploadError::BackwardSeek`]. A read that ends inside a chunk keeps the
/// remainder buffered for the next call, so at most one partially consumed
/// chunk is held at a time.
pub struct SectionReader<S> {
    stream: S,
    cached: Option<Bytes>,
    position: u64,
}

impl<S> SectionReader<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            cached: None,
            position: 0,
        }
    }

    /// Absolute offset of the next undelivered byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads the inclusive section `[begin, end]`.
    ///
    /// Bytes between the current position and `begin` are consumed and
    /// discarded. If the stream ends early the result is short; callers must
    /// check the returned length.
    pub async fn read_section(&mut self, begin: u64, end: u64) -> Result<Bytes, UploadError> {
        if end < begin {
            return Err(UploadError::InvalidRange { begin, end });
        }
        if begin < self.position {
            return Err(UploadError::BackwardSeek {
                requested: begin,
                position: self.position,
            });
        }

        let mut collected = BytesMut::with_capacity((end - begin + 1) as usize);
        while self.position <= end {
            let mut chunk = match self.cached.take() {
                Some(chunk) => chunk,
                None => match self.stream.next().await {
                    Some(chunk) => chunk?,
                    None => break,
                },
            };
            if chunk.is_empty() {
                continue;
            }

            // Discard bytes that fall before the requested section.
            if self.position < begin {
                let skip = (begin - self.position).min(chunk.len() as u64) as usize;
                chunk.advance(skip);
                self.position += skip as u64;
                if chunk.is_empty() {
                    continue;
                }
            }

            let wanted = end - self.position + 1;
            let take = (chunk.len() as u64).min(wanted) as usize;
            collected.extend_from_slice(&chunk[..take]);
            chunk.advance(take);
            self.position += take as u64;

            if !chunk.is_empty() {
                self.cached = Some(chunk);
            }
        }

        Ok(collected.freeze())
    }

    /// Releases the current stream and starts over at position zero against
    /// `stream`, e.g. after an interruption invalidated the previous source.
    pub fn reset(&mut self, stream: S) {
        self.stream = stream;
        self.cached = None;
        self.position = 0;
    }
}
