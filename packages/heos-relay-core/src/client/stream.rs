//! Streaming endpoint consumer.
//!
//! Decoding, reconciliation and the position ticker share one task, so the
//! player collection only ever has one writer.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::heos::EventEnvelope;
use crate::protocol_constants::STREAM_PATH;

use super::event::KnownEvent;
use super::reconciler::Reconciler;
use super::sse_codec::SseDecoder;
use super::{parse_base_url, ClientError, ClientResult};

/// What woke the consumer.
#[derive(Debug, Clone, Copy)]
pub enum StreamUpdate<'a> {
    /// A recognized envelope was applied.
    Event(&'a KnownEvent),
    /// Positions were advanced.
    Tick,
}

pub struct StreamClient {
    http: Client,
    stream_url: Url,
}

impl StreamClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> ClientResult<Self> {
        let stream_url = parse_base_url(base_url)?
            .join(STREAM_PATH.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(Self { http, stream_url })
    }

    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    /// Attaches to the stream and folds it into `reconciler` until the
    /// stream ends, fails, or `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation only; an ended stream is an error so
    /// callers can decide whether to reattach.
    pub async fn run<F>(
        &self,
        reconciler: &mut Reconciler,
        tick: Duration,
        cancel: &CancellationToken,
        on_update: F,
    ) -> ClientResult<()>
    where
        F: FnMut(&Reconciler, StreamUpdate<'_>),
    {
        let response = self
            .http
            .get(self.stream_url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpStatus(status.as_u16(), body));
        }
        log::info!("[Stream] Attached to {}", self.stream_url);

        consume(response.bytes_stream(), reconciler, tick, cancel, on_update).await
    }
}

/// Drives `reconciler` from a byte stream in `text/event-stream` framing.
pub async fn consume<S, E, F>(
    stream: S,
    reconciler: &mut Reconciler,
    tick: Duration,
    cancel: &CancellationToken,
    mut on_update: F,
) -> ClientResult<()>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<ClientError>,
    F: FnMut(&Reconciler, StreamUpdate<'_>),
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                log::debug!("[Stream] Cancelled");
                return Ok(());
            }

            chunk = stream.next() => {
                let bytes = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(ClientError::Stream("stream ended".to_string())),
                };
                for message in decoder.feed(&bytes) {
                    let envelope: EventEnvelope = match serde_json::from_str(&message.data) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            log::warn!("[Stream] Skipping undecodable event: {}", e);
                            continue;
                        }
                    };
                    if let Some(event) = reconciler.apply(&envelope, Instant::now().into_std()) {
                        on_update(reconciler, StreamUpdate::Event(&event));
                    }
                }
            }

            _ = ticker.tick() => {
                reconciler.tick(Instant::now().into_std());
                on_update(reconciler, StreamUpdate::Tick);
            }
        }
    }
}
