//! Byte sources for downloads.
//!
//! The fetcher only needs "open this URL as a stream of bytes". HTTP(S) goes
//! through reqwest; `file://` URLs and bare paths are read from disk, which
//! keeps local feeds and tests off the network.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::io::ReaderStream;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),
}

/// An opened download.
pub struct TransportResponse {
    /// Length announced by the source, if any.
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn open(&self, url: &str) -> Result<TransportResponse, TransportError> {
        (**self).open(url).await
    }
}

/// reqwest-backed transport that also understands local files.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<TransportResponse, TransportError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self.client.get(url).send().await?.error_for_status()?;
            let content_length = response.content_length();
            let body = response.bytes_stream().map_err(TransportError::from).boxed();
            return Ok(TransportResponse {
                content_length,
                body,
            });
        }

        let path = match url.strip_prefix("file://") {
            Some(path) => PathBuf::from(path),
            None if !url.contains("://") => PathBuf::from(url),
            None => return Err(TransportError::UnsupportedUrl(url.to_string())),
        };
        let file = tokio::fs::File::open(&path).await?;
        let content_length = Some(file.metadata().await?.len());
        let body = ReaderStream::new(file).map_err(TransportError::from).boxed();
        Ok(TransportResponse {
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    async fn collect(response: TransportResponse) -> Vec<u8> {
        let chunks: Vec<Bytes> = response.body.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn http_download() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/app.tar.gz")
            .match_header("user-agent", crate::USER_AGENT)
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let response = transport
            .open(&format!("{}/app.tar.gz", server.url()))
            .await
            .unwrap();
        assert_eq!(response.content_length, Some(7));
        assert_eq!(collect(response).await, b"payload");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .open(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }

    #[tokio::test]
    async fn local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"local").unwrap();
        let transport = HttpTransport::new().unwrap();

        let plain = transport.open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(collect(plain).await, b"local");

        let url = format!("file://{}", path.display());
        let response = transport.open(&url).await.unwrap();
        assert_eq!(response.content_length, Some(5));

        assert!(matches!(
            transport.open("ftp://example.org/x").await,
            Err(TransportError::UnsupportedUrl(_))
        ));
    }
}
