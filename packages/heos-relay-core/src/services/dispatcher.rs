//! Command Dispatcher: inbound command requests to upstream writes.
//!
//! Dispatch is fire-and-forget. The outcome of an action reaches clients
//! later through the event stream, never through the dispatch call. Missing
//! parameters are not validated here; they are simply left off the command
//! and any resulting upstream error arrives as an envelope.

use std::sync::Arc;

use crate::error::RelayResult;
use crate::heos::{CommandSink, HeosCommand};
use crate::protocol_constants::BROWSE_PAGE_SIZE;

/// Commands accepted from clients, one per endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    PlayNext {
        pid: Option<String>,
    },
    PlayPrevious {
        pid: Option<String>,
    },
    Play {
        pid: Option<String>,
    },
    Pause {
        pid: Option<String>,
    },
    SetVolume {
        pid: Option<String>,
        level: Option<String>,
    },
    GetMusicSources,
    GetSourceInfo {
        sid: Option<String>,
    },
    /// Browse a source or container. `start_item` selects the page.
    Browse {
        sid: Option<String>,
        cid: Option<String>,
        start_item: Option<String>,
    },
    AddToQueue {
        pid: Option<String>,
        sid: Option<String>,
        cid: Option<String>,
        mid: Option<String>,
        aid: Option<String>,
    },
}

impl CommandRequest {
    /// Relay endpoint path for this request, relative to the server root.
    pub fn path(&self) -> &'static str {
        match self {
            Self::PlayNext { .. } => "/next",
            Self::PlayPrevious { .. } => "/previous",
            Self::Play { .. } => "/play",
            Self::Pause { .. } => "/pause",
            Self::SetVolume { .. } => "/set_volume",
            Self::GetMusicSources => "/browse/get_music_sources",
            Self::GetSourceInfo { .. } => "/browse/get_source_info",
            Self::Browse { .. } => "/browse/browse",
            Self::AddToQueue { .. } => "/browse/add_to_queue",
        }
    }

    /// Query parameters as the relay endpoint expects them.
    pub fn query(&self) -> Vec<(&'static str, &str)> {
        let pairs: Vec<(&'static str, &Option<String>)> = match self {
            Self::PlayNext { pid }
            | Self::PlayPrevious { pid }
            | Self::Play { pid }
            | Self::Pause { pid } => vec![("pid", pid)],
            Self::SetVolume { pid, level } => vec![("pid", pid), ("level", level)],
            Self::GetMusicSources => Vec::new(),
            Self::GetSourceInfo { sid } => vec![("sid", sid)],
            Self::Browse {
                sid,
                cid,
                start_item,
            } => vec![("sid", sid), ("cid", cid), ("startItem", start_item)],
            Self::AddToQueue {
                pid,
                sid,
                cid,
                mid,
                aid,
            } => vec![
                ("pid", pid),
                ("sid", sid),
                ("cid", cid),
                ("mid", mid),
                ("aid", aid),
            ],
        };
        pairs
            .into_iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
            .collect()
    }

    /// Builds the upstream command.
    pub fn into_command(self) -> HeosCommand {
        match self {
            Self::PlayNext { pid } => HeosCommand::new("player", "play_next").param_opt("pid", pid),
            Self::PlayPrevious { pid } => {
                HeosCommand::new("player", "play_previous").param_opt("pid", pid)
            }
            Self::Play { pid } => HeosCommand::new("player", "set_play_state")
                .param_opt("pid", pid)
                .param("state", "play"),
            Self::Pause { pid } => HeosCommand::new("player", "set_play_state")
                .param_opt("pid", pid)
                .param("state", "pause"),
            Self::SetVolume { pid, level } => HeosCommand::new("player", "set_volume")
                .param_opt("pid", pid)
                .param_opt("level", level),
            Self::GetMusicSources => HeosCommand::new("browse", "get_music_sources"),
            Self::GetSourceInfo { sid } => {
                HeosCommand::new("browse", "get_source_info").param_opt("sid", sid)
            }
            Self::Browse {
                sid,
                cid,
                start_item,
            } => HeosCommand::new("browse", "browse")
                .param_opt("sid", sid)
                .param_opt("cid", cid)
                .param_opt(
                    "range",
                    start_item.map(|start| format!("{},{}", start, BROWSE_PAGE_SIZE)),
                ),
            Self::AddToQueue {
                pid,
                sid,
                cid,
                mid,
                aid,
            } => HeosCommand::new("browse", "add_to_queue")
                .param_opt("pid", pid)
                .param_opt("sid", sid)
                .param_opt("cid", cid)
                .param_opt("mid", mid)
                .param_opt("aid", aid),
        }
    }
}

/// Forwards command requests to the upstream write path.
#[derive(Clone)]
pub struct CommandDispatcher {
    sink: Arc<dyn CommandSink>,
}

impl CommandDispatcher {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }

    /// Dispatches a typed request.
    pub fn dispatch_request(&self, request: CommandRequest) -> RelayResult<()> {
        self.send(request.into_command())
    }

    /// Asks upstream for the player list. The answer reaches every session.
    pub fn refresh_roster(&self) -> RelayResult<()> {
        self.send(HeosCommand::new("player", "get_players"))
    }

    /// Dispatches an arbitrary `group/action` with the given parameters.
    pub fn dispatch<I, K, V>(&self, group: &str, action: &str, params: I) -> RelayResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let command = params
            .into_iter()
            .fold(HeosCommand::new(group, action), |cmd, (k, v)| cmd.param(k, v));
        self.send(command)
    }

    fn send(&self, command: HeosCommand) -> RelayResult<()> {
        log::debug!("[Dispatcher] {}", command);
        self.sink.write(command)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heos::traits::test_support::RecordingSink;

    fn dispatcher() -> (CommandDispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (CommandDispatcher::new(sink.clone()), sink)
    }

    #[test]
    fn browse_start_item_becomes_page_range() {
        let (dispatcher, sink) = dispatcher();
        dispatcher
            .dispatch_request(CommandRequest::Browse {
                sid: Some("S".into()),
                cid: Some("C".into()),
                start_item: Some("200".into()),
            })
            .unwrap();

        let sent = sink.commands();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].group(), "browse");
        assert_eq!(sent[0].action(), "browse");
        assert_eq!(sent[0].get("sid"), Some("S"));
        assert_eq!(sent[0].get("cid"), Some("C"));
        assert_eq!(sent[0].get("range"), Some("200,100"));
        assert_eq!(sent[0].params().len(), 3);
    }

    #[test]
    fn browse_without_container_omits_cid() {
        let (dispatcher, sink) = dispatcher();
        dispatcher
            .dispatch_request(CommandRequest::Browse {
                sid: Some("1".into()),
                cid: None,
                start_item: None,
            })
            .unwrap();
        assert_eq!(sink.lines(), vec!["browse/browse?sid=1"]);
    }

    #[test]
    fn play_and_pause_set_play_state() {
        let (dispatcher, sink) = dispatcher();
        dispatcher
            .dispatch_request(CommandRequest::Play {
                pid: Some("5".into()),
            })
            .unwrap();
        dispatcher
            .dispatch_request(CommandRequest::Pause {
                pid: Some("5".into()),
            })
            .unwrap();
        assert_eq!(
            sink.lines(),
            vec![
                "player/set_play_state?pid=5&state=play",
                "player/set_play_state?pid=5&state=pause"
            ]
        );
    }

    #[test]
    fn missing_pid_is_forwarded_without_it() {
        let (dispatcher, sink) = dispatcher();
        dispatcher
            .dispatch_request(CommandRequest::PlayNext { pid: None })
            .unwrap();
        assert_eq!(sink.lines(), vec!["player/play_next"]);
    }

    #[test]
    fn generic_dispatch_keeps_parameter_order() {
        let (dispatcher, sink) = dispatcher();
        dispatcher
            .dispatch("player", "set_volume", [("pid", "5"), ("level", "30")])
            .unwrap();
        assert_eq!(sink.lines(), vec!["player/set_volume?pid=5&level=30"]);
    }

    #[test]
    fn query_skips_absent_parameters() {
        let request = CommandRequest::AddToQueue {
            pid: Some("5".into()),
            sid: Some("1028".into()),
            cid: None,
            mid: Some("m1".into()),
            aid: Some("1".into()),
        };
        assert_eq!(request.path(), "/browse/add_to_queue");
        assert_eq!(
            request.query(),
            vec![("pid", "5"), ("sid", "1028"), ("mid", "m1"), ("aid", "1")]
        );
    }
}
