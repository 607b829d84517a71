//! Detection backend client
//!
//! [`Backend`] is the seam between the controller and the network. Every
//! call returns a `'static` boxed future so the controller can spawn it and
//! keep ticking while it is in flight.

use crate::error::TransportError;
use crate::media::Snapshot;
use crate::state::{Configuration, DetectionResult, SessionStats};
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

pub type TransportResult<T> = Result<T, TransportError>;

pub trait Backend: Send + Sync {
    /// `POST /api/process-frame` with the snapshot as multipart field `file`.
    fn process_frame(&self, snapshot: Snapshot) -> BoxFuture<'static, TransportResult<DetectionResult>>;

    /// `GET /api/health`. Any 2xx JSON body means connected.
    fn health(&self) -> BoxFuture<'static, TransportResult<serde_json::Value>>;

    /// `GET /api/config`.
    fn config(&self) -> BoxFuture<'static, TransportResult<Configuration>>;

    /// `POST /api/config` followed by a fresh `GET /api/config`.
    fn update_config(&self, patch: serde_json::Value) -> BoxFuture<'static, TransportResult<Configuration>>;

    /// `GET /api/stats`.
    fn stats(&self) -> BoxFuture<'static, TransportResult<SessionStats>>;

    /// `POST /api/reset`.
    fn reset(&self) -> BoxFuture<'static, TransportResult<()>>;
}

const PROCESS_FRAME: &str = "/api/process-frame";
const HEALTH: &str = "/api/health";
const CONFIG: &str = "/api/config";
const STATS: &str = "/api/stats";
const RESET: &str = "/api/reset";

/// [`Backend`] over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Backend for HttpBackend {
    fn process_frame(&self, snapshot: Snapshot) -> BoxFuture<'static, TransportResult<DetectionResult>> {
        let request = self.client.post(self.url(PROCESS_FRAME));
        async move {
            let bytes = snapshot.jpeg.len();
            let mime = snapshot.mime_type();
            let part = Part::bytes(snapshot.jpeg)
                .file_name("frame.jpg")
                .mime_str(mime)
                .map_err(|source| TransportError::Request {
                    endpoint: PROCESS_FRAME,
                    source,
                })?;
            debug!("Sending frame ({} KB)", bytes / 1024);
            let form = Form::new().part("file", part);
            send_json(PROCESS_FRAME, request.multipart(form)).await
        }
        .boxed()
    }

    fn health(&self) -> BoxFuture<'static, TransportResult<serde_json::Value>> {
        let request = self.client.get(self.url(HEALTH));
        send_json(HEALTH, request).boxed()
    }

    fn config(&self) -> BoxFuture<'static, TransportResult<Configuration>> {
        let request = self.client.get(self.url(CONFIG));
        send_json(CONFIG, request).boxed()
    }

    fn update_config(&self, patch: serde_json::Value) -> BoxFuture<'static, TransportResult<Configuration>> {
        let update = self.client.post(self.url(CONFIG)).json(&patch);
        let refetch = self.client.get(self.url(CONFIG));
        async move {
            let ack: serde_json::Value = send_json(CONFIG, update).await?;
            debug!("Config update acknowledged: {}", ack);
            send_json(CONFIG, refetch).await
        }
        .boxed()
    }

    fn stats(&self) -> BoxFuture<'static, TransportResult<SessionStats>> {
        let request = self.client.get(self.url(STATS));
        send_json(STATS, request).boxed()
    }

    fn reset(&self) -> BoxFuture<'static, TransportResult<()>> {
        let request = self.client.post(self.url(RESET));
        async move {
            let _: serde_json::Value = send_json(RESET, request).await?;
            Ok(())
        }
        .boxed()
    }
}

async fn send_json<T: DeserializeOwned + Send + 'static>(
    endpoint: &'static str,
    request: reqwest::RequestBuilder,
) -> TransportResult<T> {
    let response = request
        .send()
        .await
        .map_err(|source| TransportError::Request { endpoint, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| TransportError::Request { endpoint, source })?;
    serde_json::from_slice(&body).map_err(|source| TransportError::Decode { endpoint, source })
}
