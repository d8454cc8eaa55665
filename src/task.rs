use std::io;
use std::marker::PhantomData;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::DEFAULT_SLICE_SIZE;
use crate::adapter::{RequestAdapter, UploadRequest};
use crate::error::UploadError;
use crate::reader::SectionReader;
use crate::session::{ByteRange, UploadSession, partition_slices, ranges_remaining};
use crate::slice::{SliceOutcome, UploadSlice};

/// What to do when a single slice exhausts its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Surface [`UploadError::MaxRetriesExceeded`] immediately.
    #[default]
    FailFast,
    /// Log the failure, skip the slice, and let a later `resume` fill the
    /// hole the server reports.
    BestEffort,
}

#[derive(Debug, Clone)]
pub struct UploadTaskOptions {
    /// Upper bound on the bytes carried by one PUT. Zero selects
    /// [`DEFAULT_SLICE_SIZE`].
    pub max_slice_size: u64,
    pub max_tries: u32,
    /// Backoff between attempts grows linearly: `base_delay * (attempt + 1)`.
    pub base_delay: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for UploadTaskOptions {
    fn default() -> Self {
        Self {
            max_slice_size: DEFAULT_SLICE_SIZE,
            max_tries: 3,
            base_delay: Duration::from_secs(2),
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

/// Terminal outcome of an upload: exactly one of the two shapes the server
/// uses to say "done".
#[derive(Debug)]
pub enum UploadResult<T> {
    Item(T),
    Redirect(String),
}

/// Drives a resumable large-file upload: partitions the session's remaining
/// ranges into bounded slices, PUTs them strictly in order through a shared
/// forward-only reader, and follows continuation sessions until the server
/// replies with a terminal item or redirect.
pub struct LargeFileUploadTask<T, A, S> {
    adapter: A,
    session: UploadSession,
    upload_url: Url,
    reader: SectionReader<S>,
    total_length: u64,
    ranges: Vec<ByteRange>,
    options: UploadTaskOptions,
    _item: PhantomData<fn() -> T>,
}

impl<T, A, S> LargeFileUploadTask<T, A, S>
where
    T: DeserializeOwned,
    A: RequestAdapter,
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    /// Validates the initial session and stream.
    ///
    /// Fails with [`UploadError::InvalidSession`] when `uploadUrl` or
    /// `nextExpectedRanges` is missing or empty, and with
    /// [`UploadError::InvalidStream`] when the reader has already been
    /// consumed or the source is empty.
    pub fn new(
        adapter: A,
        session: UploadSession,
        reader: SectionReader<S>,
        total_length: u64,
        options: UploadTaskOptions,
    ) -> Result<Self, UploadError> {
        let url = session
            .upload_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| UploadError::InvalidSession("missing uploadUrl".into()))?;
        let upload_url = Url::parse(url)
            .map_err(|err| UploadError::InvalidSession(format!("bad uploadUrl: {err}")))?;
        let range_strings = session
            .next_expected_ranges
            .as_deref()
            .filter(|ranges| !ranges.is_empty())
            .ok_or_else(|| UploadError::InvalidSession("missing nextExpectedRanges".into()))?;
        if reader.position() != 0 {
            return Err(UploadError::InvalidStream(format!(
                "stream already consumed through byte {}",
                reader.position()
            )));
        }
        if total_length == 0 {
            return Err(UploadError::InvalidStream("empty upload source".into()));
        }

        let ranges = ranges_remaining(range_strings, total_length)?;
        let options = UploadTaskOptions {
            max_slice_size: if options.max_slice_size == 0 {
                DEFAULT_SLICE_SIZE
            } else {
                options.max_slice_size
            },
            ..options
        };

        Ok(Self {
            adapter,
            session,
            upload_url,
            reader,
            total_length,
            ranges,
            options,
            _item: PhantomData,
        })
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    /// Byte ranges the server has not yet acknowledged, ascending.
    pub fn ranges_remaining(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Swaps in a freshly opened source stream, e.g. before retrying after
    /// an interruption consumed the previous one.
    pub fn reset_stream(&mut self, stream: S) {
        self.reader.reset(stream);
    }

    /// Uploads all remaining ranges and returns the terminal result.
    pub async fn upload(&mut self) -> Result<UploadResult<T>, UploadError> {
        self.upload_with_progress(|_| {}).await
    }

    /// Like [`upload`](Self::upload), reporting the inclusive end offset of
    /// each slice as it completes.
    pub async fn upload_with_progress(
        &mut self,
        mut progress: impl FnMut(u64),
    ) -> Result<UploadResult<T>, UploadError> {
        'session: loop {
            let slices = partition_slices(&self.ranges, self.options.max_slice_size);
            if slices.is_empty() {
                return Err(UploadError::UploadIncomplete);
            }

            for (index, range) in slices.iter().enumerate() {
                let slice = UploadSlice {
                    session_url: self.upload_url.clone(),
                    range_begin: range.begin,
                    range_end: range.end,
                    total_length: self.total_length,
                };
                // Read once; retries re-send the same buffer, which keeps
                // the forward-only reader out of the retry path.
                let data = self.reader.read_section(range.begin, range.end).await?;
                if data.len() as u64 != range.len() {
                    // A short read means the source is smaller than the
                    // declared total; sending it would stamp a Content-Length
                    // larger than the body.
                    return Err(UploadError::InvalidStream(format!(
                        "source ended after {} of {} bytes for range {}-{}",
                        data.len(),
                        range.len(),
                        range.begin,
                        range.end
                    )));
                }
                debug!(
                    begin = range.begin,
                    end = range.end,
                    bytes = data.len(),
                    "uploading slice"
                );

                let outcome = match self.upload_with_retry(&slice, data).await {
                    Ok(outcome) => outcome,
                    Err(err @ UploadError::MaxRetriesExceeded { .. })
                        if self.options.failure_policy == FailurePolicy::BestEffort =>
                    {
                        warn!(
                            begin = range.begin,
                            end = range.end,
                            "skipping slice after retry exhaustion: {err}"
                        );
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                progress(range.end);

                match outcome {
                    SliceOutcome::Item(item) => return Ok(UploadResult::Item(item)),
                    SliceOutcome::Redirect(location) => {
                        return Ok(UploadResult::Redirect(location));
                    }
                    SliceOutcome::Continuation(session) => {
                        let advanced = self.adopt_session(session, range.end)?;
                        if advanced {
                            // Recompute the partition from the server's view;
                            // it may differ from our precomputed slices.
                            continue 'session;
                        }
                        // The server acknowledged nothing new. Re-partitioning
                        // would re-send bytes the reader no longer has, so
                        // keep walking the precomputed slices instead.
                        if index + 1 == slices.len() {
                            return Err(UploadError::UploadIncomplete);
                        }
                    }
                }
            }

            return Err(UploadError::UploadIncomplete);
        }
    }

    /// Refreshes the session with a GET, then uploads what remains. The
    /// refresh is mandatory: the server may have acknowledged more ranges
    /// since the interruption, and re-sending those bytes would corrupt
    /// nothing but waste the whole transfer window.
    pub async fn resume(&mut self) -> Result<UploadResult<T>, UploadError> {
        self.resume_with_progress(|_| {}).await
    }

    pub async fn resume_with_progress(
        &mut self,
        progress: impl FnMut(u64),
    ) -> Result<UploadResult<T>, UploadError> {
        self.update_session().await?;
        self.upload_with_progress(progress).await
    }

    /// GETs the session URL and merges the server's view: expiration and
    /// remaining ranges always, the upload URL only when the reply carries
    /// one.
    pub async fn update_session(&mut self) -> Result<&UploadSession, UploadError> {
        let request = UploadRequest::new(Method::GET, self.upload_url.clone());
        let response = self
            .adapter
            .send(request)
            .await
            .map_err(|err| UploadError::SessionRequest(Box::new(err)))?;

        if let Some(body) = response.body {
            let refreshed: UploadSession = serde_json::from_value(body)?;
            debug!(ranges = ?refreshed.next_expected_ranges, "session refreshed");
            self.session.expiration_date_time = refreshed.expiration_date_time;
            self.session.next_expected_ranges = refreshed.next_expected_ranges;
            if let Some(url) = refreshed.upload_url {
                self.upload_url = Url::parse(&url)
                    .map_err(|err| UploadError::InvalidSession(format!("bad uploadUrl: {err}")))?;
                self.session.upload_url = Some(url);
            }
            self.ranges = match self.session.next_expected_ranges.as_deref() {
                Some(ranges) => ranges_remaining(ranges, self.total_length)?,
                None => Vec::new(),
            };
        }
        Ok(&self.session)
    }

    /// Cancels the upload server-side with a single DELETE. No body is
    /// expected back.
    pub async fn delete_session(&self) -> Result<(), UploadError> {
        let request = UploadRequest::new(Method::DELETE, self.upload_url.clone());
        self.adapter
            .send_no_content(request)
            .await
            .map_err(|err| UploadError::SessionRequest(Box::new(err)))
    }

    async fn upload_with_retry(
        &self,
        slice: &UploadSlice,
        data: Bytes,
    ) -> Result<SliceOutcome<T>, UploadError> {
        let max_tries = self.options.max_tries.max(1);
        for attempt in 0..max_tries {
            if attempt > 0 {
                let delay = self.options.base_delay * (attempt + 1);
                debug!(attempt, ?delay, "retrying slice after backoff");
                tokio::time::sleep(delay).await;
            }
            match slice.upload(&self.adapter, data.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => warn!(
                    begin = slice.range_begin,
                    end = slice.range_end,
                    attempt,
                    "slice upload attempt failed: {err}"
                ),
            }
        }
        Err(UploadError::MaxRetriesExceeded { tries: max_tries })
    }

    /// Merges a continuation session and recomputes the remaining ranges.
    /// Returns whether the server acknowledged bytes past `acked_through`.
    fn adopt_session(
        &mut self,
        session: UploadSession,
        acked_through: u64,
    ) -> Result<bool, UploadError> {
        if let Some(url) = session.upload_url {
            self.upload_url = Url::parse(&url)
                .map_err(|err| UploadError::InvalidSession(format!("bad uploadUrl: {err}")))?;
            self.session.upload_url = Some(url);
        }
        self.session.expiration_date_time = session.expiration_date_time;
        self.session.next_expected_ranges = session.next_expected_ranges;
        self.ranges = match self.session.next_expected_ranges.as_deref() {
            Some(ranges) => ranges_remaining(ranges, self.total_length)?,
            None => Vec::new(),
        };
        Ok(self
            .ranges
            .first()
            .is_some_and(|range| range.begin > acked_through))
    }
}
