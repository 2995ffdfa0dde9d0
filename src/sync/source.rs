//! Source of truth for an editable document.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::document::ConfigDocument;
use crate::sync::rejection::SaveFailure;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("save rejected: {0}")]
    Rejected(SaveFailure),
}

/// Reads and writes whole documents.
///
/// Futures are `'static` so the controller can run them on spawned tasks.
pub trait ConfigSource: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'static, Result<ConfigDocument, SyncError>>;

    fn store(&self, document: ConfigDocument) -> BoxFuture<'static, Result<(), SyncError>>;
}

/// GET and PUT against one REST resource.
#[derive(Debug, Clone)]
pub struct HttpConfigSource {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpConfigSource {
    pub fn new(client: reqwest::Client, url: Url, timeout: Duration) -> Self {
        Self { client, url, timeout }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl ConfigSource for HttpConfigSource {
    fn fetch(&self) -> BoxFuture<'static, Result<ConfigDocument, SyncError>> {
        let request = self.client.get(self.url.clone()).timeout(self.timeout);
        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Status { status, body });
            }
            Ok(response.json::<ConfigDocument>().await?)
        })
    }

    fn store(&self, document: ConfigDocument) -> BoxFuture<'static, Result<(), SyncError>> {
        let request = self
            .client
            .put(self.url.clone())
            .timeout(self.timeout)
            .json(&document);
        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = %status, body = %body, "Save rejected");
            Err(SyncError::Rejected(SaveFailure::from_response(status, &body)))
        })
    }
}
