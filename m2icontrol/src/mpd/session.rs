use std::collections::VecDeque;
use std::mem;

use tracing::{debug, info, trace, warn};

use super::protocol::{
    CMD_CLOSE, CMD_IDLE, CMD_NOIDLE, CMD_STATUS_BATCH, CMD_STATUS_ONLY, ProtocolVersion,
    ReplyBuffer, Response, parse_ack, parse_greeting,
};
use crate::errors::BridgeError;
use crate::events::PlayerEvent;
use crate::model::{LinkState, PlayerStatus, TrackInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Disconnected,
    Connecting,
    AwaitingGreeting,
    /// Greeting accepted, the session is subscribed to change notifications.
    Idle,
}

impl PlayerState {
    pub fn link_state(&self) -> LinkState {
        match self {
            PlayerState::Disconnected => LinkState::Disconnected,
            PlayerState::Connecting => LinkState::Connecting,
            PlayerState::AwaitingGreeting => LinkState::Handshaking,
            PlayerState::Idle => LinkState::Ready,
        }
    }
}

#[derive(Debug)]
pub enum PlayerOutput {
    Send(String),
    Event(PlayerEvent),
}

/// Replies the server still owes us, in request order.
#[derive(Debug, PartialEq, Eq)]
enum Pending {
    Password,
    Status { with_song: bool },
    Idle,
    Command(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
enum Refresh {
    #[default]
    Nothing,
    Status,
    StatusAndSong,
}

/// Client side of the MPD protocol.
///
/// The session never touches a socket: it consumes lines and pushes the
/// lines to write and the events to raise into an output buffer.
#[derive(Debug)]
pub struct PlayerSession {
    password: Option<String>,
    min_version: ProtocolVersion,
    state: PlayerState,
    server_version: Option<ProtocolVersion>,

    pending: VecDeque<Pending>,
    idling: bool,
    noidle_sent: bool,
    deferred: Vec<String>,
    refresh: Refresh,
    reply: ReplyBuffer,

    // Committed state, kept across reconnects
    track: TrackInfo,
    status: PlayerStatus,
}

impl PlayerSession {
    pub fn new(password: Option<String>, min_version: ProtocolVersion) -> Self {
        Self {
            password,
            min_version,
            state: PlayerState::Disconnected,
            server_version: None,
            pending: VecDeque::new(),
            idling: false,
            noidle_sent: false,
            deferred: Vec::new(),
            refresh: Refresh::Nothing,
            reply: ReplyBuffer::default(),
            track: TrackInfo::default(),
            status: PlayerStatus::default(),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == PlayerState::Idle
    }

    pub fn track(&self) -> &TrackInfo {
        &self.track
    }

    pub fn status(&self) -> &PlayerStatus {
        &self.status
    }

    pub fn server_version(&self) -> Option<ProtocolVersion> {
        self.server_version
    }

    pub fn on_connecting(&mut self) {
        self.reset(PlayerState::Connecting);
    }

    pub fn on_connected(&mut self) {
        self.reset(PlayerState::AwaitingGreeting);
    }

    pub fn on_disconnected(&mut self) {
        self.reset(PlayerState::Disconnected);
    }

    fn reset(&mut self, state: PlayerState) {
        self.state = state;
        self.server_version = None;
        self.pending.clear();
        self.idling = false;
        self.noidle_sent = false;
        if !self.deferred.is_empty() {
            debug!(dropped = self.deferred.len(), "Discarding queued MPD commands");
            self.deferred.clear();
        }
        self.refresh = Refresh::Nothing;
        self.reply = ReplyBuffer::default();
    }

    /// Line to send before closing, only once the session is established.
    pub fn close_command(&self) -> Option<&'static str> {
        self.is_ready().then_some(CMD_CLOSE)
    }

    /// Queues a playback command.
    ///
    /// Returns `false` (and drops the command) when the session is not ready.
    pub fn request(&mut self, command: impl Into<String>, out: &mut Vec<PlayerOutput>) -> bool {
        let command = command.into();
        if !self.is_ready() {
            warn!(%command, state = ?self.state, "MPD not ready, dropping command");
            return false;
        }

        if self.idling {
            self.deferred.push(command);
            if !self.noidle_sent {
                out.push(PlayerOutput::Send(CMD_NOIDLE.to_string()));
                self.noidle_sent = true;
            }
        } else {
            self.send(out, command.clone(), Pending::Command(command));
        }
        true
    }

    pub fn handle_line(&mut self, line: &str, out: &mut Vec<PlayerOutput>) -> Result<(), BridgeError> {
        match self.state {
            PlayerState::Disconnected | PlayerState::Connecting => {
                debug!(%line, "Ignoring MPD line while not connected");
                Ok(())
            }
            PlayerState::AwaitingGreeting => self.handle_greeting(line, out),
            PlayerState::Idle => self.handle_reply(line, out),
        }
    }

    fn handle_greeting(&mut self, line: &str, out: &mut Vec<PlayerOutput>) -> Result<(), BridgeError> {
        if let Some(ack) = parse_ack(line) {
            return Err(BridgeError::PlayerAck {
                code: ack.code,
                command: ack.command,
                message: ack.message,
            });
        }
        let Some((name, version)) = parse_greeting(line) else {
            warn!(%line, "Unexpected line while waiting for the MPD greeting");
            return Ok(());
        };
        if version < self.min_version {
            return Err(BridgeError::PlayerTooOld {
                found: version,
                required: self.min_version,
            });
        }

        info!(server = name, %version, "🎵 Connected to MPD");
        self.server_version = Some(version);

        if let Some(password) = self.password.clone() {
            self.send(out, format!("password {}", password), Pending::Password);
        }
        self.request_status(true, out);
        self.subscribe(out);
        self.state = PlayerState::Idle;
        out.push(PlayerOutput::Event(PlayerEvent::Ready));
        Ok(())
    }

    fn handle_reply(&mut self, line: &str, out: &mut Vec<PlayerOutput>) -> Result<(), BridgeError> {
        match Response::parse(line) {
            Response::Ok => self.complete(out),
            Response::Ack(ack) => {
                return Err(match self.pending.pop_front() {
                    Some(Pending::Password) => BridgeError::PlayerAuth(ack.message),
                    _ => BridgeError::PlayerAck {
                        code: ack.code,
                        command: ack.command,
                        message: ack.message,
                    },
                });
            }
            Response::Field { key, value } => match self.pending.front() {
                Some(Pending::Status { .. }) => self.reply.absorb(key, value),
                Some(Pending::Idle) if key == "changed" => self.note_change(value),
                _ => trace!(%line, "Ignoring MPD field"),
            },
            Response::Other => debug!(%line, "Ignoring unexpected MPD line"),
        }
        Ok(())
    }

    fn note_change(&mut self, subsystem: &str) {
        let wanted = match subsystem.trim() {
            "player" => Refresh::StatusAndSong,
            "options" => Refresh::Status,
            other => {
                debug!(subsystem = other, "Ignoring MPD change");
                return;
            }
        };
        self.refresh = self.refresh.max(wanted);
    }

    fn complete(&mut self, out: &mut Vec<PlayerOutput>) {
        match self.pending.pop_front() {
            Some(Pending::Password) => debug!("MPD password accepted"),
            Some(Pending::Status { with_song }) => self.commit(with_song, out),
            Some(Pending::Idle) => self.resubscribe(out),
            Some(Pending::Command(command)) => debug!(%command, "MPD command done"),
            None => warn!("Unexpected OK from MPD"),
        }
    }

    /// Commits a whole status reply at once.
    fn commit(&mut self, with_song: bool, out: &mut Vec<PlayerOutput>) {
        let reply = mem::take(&mut self.reply);

        if with_song {
            let track = reply.track();
            let changed = !track.same_track(&self.track);
            self.track = track;
            if changed {
                debug!(file = self.track.file_id(), "Track changed");
                out.push(PlayerOutput::Event(PlayerEvent::TrackChanged(self.track.clone())));
            }
        }

        let status = reply.status();
        if status != self.status {
            self.status = status;
            out.push(PlayerOutput::Event(PlayerEvent::StatusChanged(self.status.clone())));
        }
    }

    /// An idle reply is complete: flush what waited for it, then subscribe again.
    fn resubscribe(&mut self, out: &mut Vec<PlayerOutput>) {
        self.idling = false;
        self.noidle_sent = false;

        for command in mem::take(&mut self.deferred) {
            self.send(out, command.clone(), Pending::Command(command));
        }
        match mem::take(&mut self.refresh) {
            Refresh::Nothing => {}
            Refresh::Status => self.request_status(false, out),
            Refresh::StatusAndSong => self.request_status(true, out),
        }
        self.subscribe(out);
    }

    fn request_status(&mut self, with_song: bool, out: &mut Vec<PlayerOutput>) {
        if with_song {
            out.extend(CMD_STATUS_BATCH.iter().map(|c| PlayerOutput::Send(c.to_string())));
        } else {
            out.extend(CMD_STATUS_ONLY.iter().map(|c| PlayerOutput::Send(c.to_string())));
        }
        self.pending.push_back(Pending::Status { with_song });
    }

    fn subscribe(&mut self, out: &mut Vec<PlayerOutput>) {
        self.send(out, CMD_IDLE.to_string(), Pending::Idle);
        self.idling = true;
    }

    fn send(&mut self, out: &mut Vec<PlayerOutput>, line: String, expect: Pending) {
        out.push(PlayerOutput::Send(line));
        self.pending.push_back(expect);
    }
}
