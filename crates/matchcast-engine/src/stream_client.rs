//! Stream client — reconnecting push-channel consumer with restart-safe
//! catch-up.
//!
//! The connect/health-check/backoff shape follows `manager.rs`'s
//! `wait_for_health` polling loop; connection status is published the way
//! `tts.rs` publishes `TtsStatus`, over a `tokio::sync::watch` channel.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use matchcast_core::{Config, Event};

use crate::error::StreamError;
use crate::queue::EventQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Connected,
    Reconnecting,
    Closed,
}

pub struct StreamClient {
    config: Config,
    queue: Arc<EventQueue>,
    status_tx: watch::Sender<ConnectionStatus>,
    rng_state: std::sync::atomic::AtomicU64,
}

impl StreamClient {
    pub fn new(config: Config, queue: Arc<EventQueue>) -> (Self, watch::Receiver<ConnectionStatus>) {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Reconnecting);
        let seed = std::time::Instant::now().elapsed().as_nanos() as u64 | 1;
        (
            Self {
                config,
                queue,
                status_tx,
                rng_state: std::sync::atomic::AtomicU64::new(seed),
            },
            status_rx,
        )
    }

    /// Run the connect/catch-up/reconnect lifecycle until `shutdown` fires.
    pub async fn run(&self, shutdown: tokio_util::sync::CancellationToken) {
        let mut backoff_ms = self.config.reconnect_initial_ms;

        loop {
            if shutdown.is_cancelled() {
                let _ = self.status_tx.send(ConnectionStatus::Closed);
                return;
            }

            if let Err(e) = self.catch_up().await {
                warn!("stream: catch-up failed: {e}");
            }

            let _ = self.status_tx.send(ConnectionStatus::Connected);
            match self.open_and_consume(&shutdown).await {
                Ok(()) => {
                    // Clean close (e.g. shutdown requested mid-stream).
                    if shutdown.is_cancelled() {
                        let _ = self.status_tx.send(ConnectionStatus::Closed);
                        return;
                    }
                    backoff_ms = self.config.reconnect_initial_ms;
                }
                Err(e) => {
                    warn!("stream: connection lost: {e}");
                }
            }

            let _ = self.status_tx.send(ConnectionStatus::Reconnecting);
            let wait = Duration::from_millis(jittered(backoff_ms, &self.rng_state));
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => {
                    let _ = self.status_tx.send(ConnectionStatus::Closed);
                    return;
                }
            }
            backoff_ms = (backoff_ms * 2).min(self.config.reconnect_max_ms);
        }
    }

    /// Fetch events missed since the checkpoint and admit them in order.
    /// A 404 or empty array is not an error.
    async fn catch_up(&self) -> Result<(), StreamError> {
        let after_id = self.queue.checkpoint_async().await;
        let match_id = match &self.config.match_id {
            Some(id) => id,
            None => return Ok(()),
        };

        let mut url = format!(
            "{}/commentary/missed-events?match_id={match_id}",
            self.config.api_base_url
        );
        if let Some(after_id) = after_id {
            url.push_str(&format!("&after_id={after_id}"));
        }

        let client = reqwest::Client::new();
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(|e| StreamError::CatchUp(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(StreamError::CatchUp(format!(
                "missed-events returned {}",
                resp.status()
            )));
        }

        let events: Vec<Event> = resp
            .json()
            .await
            .map_err(|e| StreamError::CatchUp(e.to_string()))?;

        debug!("stream: catch-up replaying {} events", events.len());
        for event in events {
            self.queue.admit(event).await;
        }
        Ok(())
    }

    async fn open_and_consume(
        &self,
        shutdown: &tokio_util::sync::CancellationToken,
    ) -> Result<(), StreamError> {
        let match_id = self
            .config
            .match_id
            .as_deref()
            .ok_or_else(|| StreamError::Transient("no match_id configured".into()))?;

        let mut url = format!(
            "{}/ws/live-commentary/{match_id}",
            self.config.api_base_url.replacen("http", "ws", 1)
        );
        if let Some(token) = &self.config.ws_auth_token {
            url.push_str(&format!("?token={token}"));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| StreamError::Transient(e.to_string()))?;
        info!("stream: connected to {url}");

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_frame(text.as_bytes()).await,
                        Some(Ok(Message::Binary(bytes))) => self.handle_frame(&bytes).await,
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(StreamError::Transient(e.to_string())),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, bytes: &[u8]) {
        match serde_json::from_slice::<Event>(bytes) {
            Ok(event) => {
                self.queue.admit(event).await;
            }
            Err(e) => {
                let err = StreamError::MalformedPayload(e.to_string());
                warn!("stream: dropping malformed frame: {err}");
            }
        }
    }
}

/// Small xorshift64 PRNG seeded from the monotonic clock, used only to draw
/// the ±20% backoff jitter — no external `rand` dependency needed for this.
fn jittered(base_ms: u64, state: &std::sync::atomic::AtomicU64) -> u64 {
    let mut x = state.load(std::sync::atomic::Ordering::Relaxed);
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    state.store(x, std::sync::atomic::Ordering::Relaxed);

    // Map to [-20%, +20%] of base_ms.
    let unit = (x % 2001) as i64 - 1000; // [-1000, 1000]
    let jitter_pct = unit as f64 / 1000.0 * 0.2;
    let jittered = base_ms as f64 * (1.0 + jitter_pct);
    jittered.max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let state = std::sync::atomic::AtomicU64::new(0xdead_beef);
        for _ in 0..1000 {
            let j = jittered(1000, &state);
            assert!(j >= 800 && j <= 1200, "jitter out of range: {j}");
        }
    }

    #[test]
    fn jitter_is_deterministic_given_seed() {
        let s1 = std::sync::atomic::AtomicU64::new(42);
        let s2 = std::sync::atomic::AtomicU64::new(42);
        assert_eq!(jittered(1000, &s1), jittered(1000, &s2));
    }
}
