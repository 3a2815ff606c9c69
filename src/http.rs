// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::TransportError;

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Default time a request may go without receiving any data
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for establishing a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("podsync/", env!("CARGO_PKG_VERSION"));

/// A fully buffered response, used for feeds and episode pages
pub struct HttpDocument {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
}

/// HTTP response with status, content length, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// Check for a 2xx status code
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the entire response body
    async fn get_document(&self, url: &str) -> Result<HttpDocument, TransportError>;

    /// Get a streaming response for large downloads
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with the default read timeout
    pub fn new() -> Result<Self, TransportError> {
        Self::with_read_timeout(DEFAULT_READ_TIMEOUT)
    }

    /// Create a new ReqwestClient that gives up on a request once the
    /// server sends nothing for `read_timeout`.
    ///
    /// A slow but steady download is never cut off, however long it takes.
    pub fn with_read_timeout(read_timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: client_builder(read_timeout).build()?,
        })
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn client_builder(read_timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT.min(read_timeout))
        .read_timeout(read_timeout)
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_document(&self, url: &str) -> Result<HttpDocument, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpDocument { status, body })
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, TransportError> {
        use futures::StreamExt;

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|result| result.map_err(TransportError::from)),
        );

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}
