//! Typed helpers for the relay's command endpoints.
//!
//! A successful call only means the relay accepted the command. Its effect
//! shows up later on the event stream.

use reqwest::{Client, Url};

use crate::protocol_constants::ADD_TO_QUEUE_PLAY_NOW;
use crate::services::CommandRequest;

use super::{parse_base_url, ClientError, ClientResult};

#[derive(Clone)]
pub struct RelayClient {
    http: Client,
    base: Url,
}

impl RelayClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            http,
            base: parse_base_url(base_url)?,
        })
    }

    /// Sends a request to its endpoint.
    pub async fn send(&self, request: &CommandRequest) -> ClientResult<()> {
        let mut url = self
            .base
            .join(request.path().trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let query = request.query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        log::debug!("[RelayClient] GET {}", url);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpStatus(status.as_u16(), body));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Player
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn next(&self, pid: &str) -> ClientResult<()> {
        self.send(&CommandRequest::PlayNext {
            pid: Some(pid.to_string()),
        })
        .await
    }

    pub async fn previous(&self, pid: &str) -> ClientResult<()> {
        self.send(&CommandRequest::PlayPrevious {
            pid: Some(pid.to_string()),
        })
        .await
    }

    pub async fn play(&self, pid: &str) -> ClientResult<()> {
        self.send(&CommandRequest::Play {
            pid: Some(pid.to_string()),
        })
        .await
    }

    pub async fn pause(&self, pid: &str) -> ClientResult<()> {
        self.send(&CommandRequest::Pause {
            pid: Some(pid.to_string()),
        })
        .await
    }

    /// Sets the volume, clamped to 0..=100.
    pub async fn set_volume(&self, pid: &str, level: u8) -> ClientResult<()> {
        self.send(&CommandRequest::SetVolume {
            pid: Some(pid.to_string()),
            level: Some(level.min(100).to_string()),
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Browse
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn music_sources(&self) -> ClientResult<()> {
        self.send(&CommandRequest::GetMusicSources).await
    }

    pub async fn source_info(&self, sid: &str) -> ClientResult<()> {
        self.send(&CommandRequest::GetSourceInfo {
            sid: Some(sid.to_string()),
        })
        .await
    }

    /// Top level of a music source.
    pub async fn browse_source(&self, sid: &str) -> ClientResult<()> {
        self.send(&CommandRequest::Browse {
            sid: Some(sid.to_string()),
            cid: None,
            start_item: None,
        })
        .await
    }

    /// One page of a container, starting at `start_item`.
    pub async fn browse_container(
        &self,
        sid: &str,
        cid: &str,
        start_item: Option<u32>,
    ) -> ClientResult<()> {
        self.send(&CommandRequest::Browse {
            sid: Some(sid.to_string()),
            cid: Some(cid.to_string()),
            start_item: start_item.map(|n| n.to_string()),
        })
        .await
    }

    /// Queues a media item with an explicit add criteria (`aid`).
    pub async fn add_to_queue(
        &self,
        pid: &str,
        sid: &str,
        cid: &str,
        mid: Option<&str>,
        aid: u8,
    ) -> ClientResult<()> {
        self.send(&CommandRequest::AddToQueue {
            pid: Some(pid.to_string()),
            sid: Some(sid.to_string()),
            cid: Some(cid.to_string()),
            mid: mid.map(str::to_string),
            aid: Some(aid.to_string()),
        })
        .await
    }

    /// Plays a media item now.
    pub async fn play_item(&self, pid: &str, sid: &str, cid: &str, mid: Option<&str>) -> ClientResult<()> {
        self.add_to_queue(pid, sid, cid, mid, ADD_TO_QUEUE_PLAY_NOW)
            .await
    }
}
