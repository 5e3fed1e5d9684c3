/// Upstream transport clients: the telemetry stream and the command channel
use futures_util::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use url::Url;

use crate::domain::{CreateBundleRequest, CreateBundleResponse, DtnBundle, StreamFrame};
use crate::errors::{ApiError, ApiResult};
use crate::services::TelemetryEngine;

/// Owns the one live telemetry stream. Reconnects after a fixed delay,
/// indefinitely; the intended deployment is a long-lived local session,
/// so there is no backoff growth and no attempt cap.
pub struct ConnectionManager {
    url: Url,
    reconnect_delay: Duration,
    engine: Arc<TelemetryEngine>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionManager {
    pub fn new(
        url: Url,
        reconnect_delay: Duration,
        engine: Arc<TelemetryEngine>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            url,
            reconnect_delay,
            engine,
            shutdown,
        }
    }

    /// Connect-read-reconnect loop. Returns only on shutdown; the socket
    /// is closed exactly once per connection and pending reconnect
    /// sleeps are cancelled.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        loop {
            if *shutdown.borrow() {
                return;
            }

            match connect_async(self.url.as_str()).await {
                Ok((mut ws, _)) => {
                    info!(url = %self.url, "telemetry stream connected");
                    self.engine.set_connected(true);

                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                let _ = ws.close(None).await;
                                return;
                            }
                            message = ws.next() => match message {
                                Some(Ok(Message::Text(text))) => self.handle_text(&text),
                                Some(Ok(_)) => {}
                                Some(Err(err)) => {
                                    self.engine.set_error(format!("stream error: {err}"));
                                    warn!(%err, "telemetry stream error");
                                    break;
                                }
                                None => break,
                            }
                        }
                    }
                    let _ = ws.close(None).await;
                    self.engine.set_connected(false);
                    warn!("telemetry stream closed; reconnecting");
                }
                Err(err) => {
                    self.engine.set_connected(false);
                    self.engine.set_error(format!("connect failed: {err}"));
                    warn!(%err, "telemetry stream connect failed");
                }
            }

            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    /// A malformed payload is dropped with a diagnostic; it never tears
    /// down the connection or reaches the store.
    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<StreamFrame>(text) {
            Ok(frame) => self.engine.merge_frame(frame),
            Err(err) => warn!(%err, "malformed frame dropped"),
        }
    }
}

/// HTTP client wrapper with common configuration
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("groundlink/1.0")
            .build()?;
        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

/// Request/response command channel to the upstream simulation
pub struct CommandClient {
    http_client: HttpClient,
    base_url: String,
}

impl CommandClient {
    pub fn new(base_url: String) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new()?,
            base_url,
        })
    }

    /// Submit a create-bundle command. A rejection from the upstream is
    /// a command fault, distinct from a transport fault.
    pub async fn create_bundle(&self, request: &CreateBundleRequest) -> ApiResult<DtnBundle> {
        let url = format!("{}/bundles", self.base_url.trim_end_matches('/'));
        let response: CreateBundleResponse = self
            .http_client
            .get_client()
            .post(&url)
            .json(request)
            .send()
            .await?
            .json()
            .await?;

        if response.success {
            response
                .bundle
                .ok_or_else(|| ApiError::Command("upstream accepted but returned no bundle".into()))
        } else {
            Err(ApiError::Command(
                response
                    .error
                    .unwrap_or_else(|| "bundle creation rejected".to_string()),
            ))
        }
    }
}
