use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, header};
use url::Url;

use crate::error::UploadError;

pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// A single outgoing request. A body, when present, is sent as
/// `application/octet-stream`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl UploadRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }
}

/// A parsed reply: the JSON body (if any) plus the `Location` header, which
/// the engine needs to recognize terminal redirects.
#[derive(Debug, Clone, Default)]
pub struct UploadResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// Narrow transport interface consumed by the upload engine. Timeouts and
/// connection-level retry belong to the implementation, not the engine.
#[async_trait]
pub trait RequestAdapter: Send + Sync {
    async fn send(&self, request: UploadRequest) -> Result<UploadResponse, UploadError>;

    /// Sends a request whose reply carries no body of interest.
    async fn send_no_content(&self, request: UploadRequest) -> Result<(), UploadError>;
}

#[async_trait]
impl<A: RequestAdapter + ?Sized> RequestAdapter for Arc<A> {
    async fn send(&self, request: UploadRequest) -> Result<UploadResponse, UploadError> {
        (**self).send(request).await
    }

    async fn send_no_content(&self, request: UploadRequest) -> Result<(), UploadError> {
        (**self).send_no_content(request).await
    }
}

/// Production adapter over a shared [`reqwest::Client`]. Upload-session URLs
/// are usually pre-authenticated, so the bearer token is optional.
#[derive(Debug, Clone, Default)]
pub struct HttpAdapter {
    client: Client,
    bearer_token: Option<String>,
}

impl HttpAdapter {
    pub fn new(bearer_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            bearer_token,
        }
    }

    fn build(&self, request: UploadRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(request.method, request.url);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(header::CONTENT_TYPE, BINARY_CONTENT_TYPE)
                .body(body);
        }
        builder
    }

    async fn status_error(response: reqwest::Response) -> UploadError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        UploadError::Status { status, message }
    }
}

#[async_trait]
impl RequestAdapter for HttpAdapter {
    async fn send(&self, request: UploadRequest) -> Result<UploadResponse, UploadError> {
        let response = self.build(request).send().await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text)?)
        };

        Ok(UploadResponse {
            status,
            location,
            body,
        })
    }

    async fn send_no_content(&self, request: UploadRequest) -> Result<(), UploadError> {
        let response = self.build(request).send().await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        Ok(())
    }
}
