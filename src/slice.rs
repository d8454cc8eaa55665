use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::adapter::{RequestAdapter, UploadRequest, UploadResponse};
use crate::error::UploadError;
use crate::session::UploadSession;

/// Classified reply to a slice PUT, decided once at the response boundary.
///
/// The server signals "more data expected" through the body shape rather
/// than the status code: a body carrying non-empty `nextExpectedRanges` is a
/// continuation even though the request succeeded. Only the other two
/// variants end the upload.
#[derive(Debug)]
pub enum SliceOutcome<T> {
    /// The session advanced; more slices are expected.
    Continuation(UploadSession),
    /// The upload finished and the body is the created resource.
    Item(T),
    /// The upload finished; the resource lives at the given location.
    Redirect(String),
}

/// One range-bounded PUT against the session URL. Bounds are inclusive.
#[derive(Debug, Clone)]
pub struct UploadSlice {
    pub session_url: Url,
    pub range_begin: u64,
    pub range_end: u64,
    pub total_length: u64,
}

impl UploadSlice {
    pub fn len(&self) -> u64 {
        self.range_end - self.range_begin + 1
    }

    pub fn content_range(&self) -> String {
        format!(
            "bytes {}-{}/{}",
            self.range_begin, self.range_end, self.total_length
        )
    }

    /// Sends the slice bytes and classifies the reply.
    ///
    /// `data` must hold the bytes of `[range_begin, range_end]`; the caller
    /// reads them out of the stream exactly once so that transport retries
    /// can re-send the same buffer.
    pub async fn upload<T, A>(&self, adapter: &A, data: Bytes) -> Result<SliceOutcome<T>, UploadError>
    where
        T: DeserializeOwned,
        A: RequestAdapter + ?Sized,
    {
        let request = UploadRequest::new(Method::PUT, self.session_url.clone())
            .header("Content-Range", self.content_range())
            .header("Content-Length", self.len().to_string())
            .body(data);
        let response = adapter.send(request).await?;
        self.classify(response)
    }

    fn classify<T: DeserializeOwned>(
        &self,
        response: UploadResponse,
    ) -> Result<SliceOutcome<T>, UploadError> {
        let continuation = response
            .body
            .as_ref()
            .and_then(|body| body.get("nextExpectedRanges"))
            .and_then(|ranges| ranges.as_array())
            .is_some_and(|ranges| !ranges.is_empty());

        if continuation {
            let body = response.body.unwrap_or_default();
            let mut session: UploadSession = serde_json::from_value(body)?;
            if session.upload_url.is_none() {
                session.upload_url = Some(self.session_url.to_string());
            }
            return Ok(SliceOutcome::Continuation(session));
        }

        if let Some(location) = response.location {
            return Ok(SliceOutcome::Redirect(location));
        }

        let body = response.body.unwrap_or(serde_json::Value::Null);
        Ok(SliceOutcome::Item(serde_json::from_value(body)?))
    }
}
