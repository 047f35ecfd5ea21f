//! Routing between the two sessions.
//!
//! The gateway owns both protocol sessions and the announce flag. It is fed
//! link events and answers with [`Effect`]s; the event loop in
//! [`crate::bridge`] performs them. Nothing in here does I/O.

use tracing::{debug, info};

use crate::dispatcher::{ChatCommand, dispatch};
use crate::errors::BridgeError;
use crate::events::{ChatEvent, PlayerEvent};
use crate::irc::{ChatOutput, ChatSession, ChatState};
use crate::model::{Remote, TrackInfo};
use crate::mpd::{PlayerOutput, PlayerSession};
use crate::preferences::Preferences;

pub const DIE_QUIT_REASON: &str = "Exiting";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Send(Remote, String),
    ArmReconnect(Remote),
    CancelReconnect(Remote),
    /// Drop the current connection of the remote.
    CloseLink(Remote),
    Shutdown { reason: String },
}

#[derive(Debug)]
pub struct Gateway {
    player: PlayerSession,
    chat: ChatSession,
    announce: bool,
}

impl Gateway {
    pub fn new(prefs: &Preferences) -> Self {
        Self {
            player: PlayerSession::new(prefs.player.password.clone(), prefs.player.min_version),
            chat: ChatSession::new(
                prefs.chat.clone(),
                prefs.command_prefix.clone(),
                prefs.die_password.clone(),
            ),
            announce: prefs.announce,
        }
    }

    pub fn player(&self) -> &PlayerSession {
        &self.player
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn announce_enabled(&self) -> bool {
        self.announce
    }

    pub fn connecting(&mut self, remote: Remote) {
        match remote {
            Remote::Player => self.player.on_connecting(),
            Remote::Chat => self.chat.on_connecting(),
        }
    }

    pub fn connected(&mut self, remote: Remote) -> Vec<Effect> {
        let mut effects = Vec::new();
        match remote {
            // MPD parle en premier
            Remote::Player => self.player.on_connected(),
            Remote::Chat => {
                let mut out = Vec::new();
                self.chat.on_connected(&mut out);
                self.route_chat(out, &mut effects);
            }
        }
        effects
    }

    /// The connection is gone: the session forgets it and a retry is armed.
    pub fn disconnected(&mut self, remote: Remote) -> Vec<Effect> {
        match remote {
            Remote::Player => self.player.on_disconnected(),
            Remote::Chat => self.chat.on_disconnected(),
        }
        vec![Effect::ArmReconnect(remote)]
    }

    pub fn line(&mut self, remote: Remote, line: &str) -> Result<Vec<Effect>, BridgeError> {
        let mut effects = Vec::new();
        match remote {
            Remote::Player => {
                let mut out = Vec::new();
                self.player.handle_line(line, &mut out)?;
                self.route_player(out, &mut effects);
            }
            Remote::Chat => {
                let mut out = Vec::new();
                self.chat.handle_line(line, &mut out)?;
                self.route_chat(out, &mut effects);
            }
        }
        Ok(effects)
    }

    /// Last line to write to `remote` before closing it, if it expects one.
    pub fn farewell(&self, remote: Remote, reason: &str) -> Option<String> {
        match remote {
            Remote::Player => self.player.close_command().map(str::to_string),
            Remote::Chat => match self.chat.state() {
                ChatState::Registering | ChatState::Joined => Some(ChatSession::quit_line(reason)),
                ChatState::Disconnected | ChatState::Connecting => None,
            },
        }
    }

    fn route_player(&mut self, out: Vec<PlayerOutput>, effects: &mut Vec<Effect>) {
        for output in out {
            match output {
                PlayerOutput::Send(line) => effects.push(Effect::Send(Remote::Player, line)),
                PlayerOutput::Event(PlayerEvent::Ready) => {
                    effects.push(Effect::CancelReconnect(Remote::Player));
                }
                PlayerOutput::Event(PlayerEvent::TrackChanged(track)) => {
                    info!(file = track.file_id(), "🎶 Now playing {}", track.describe());
                    self.announce_track(&track, effects);
                }
                PlayerOutput::Event(PlayerEvent::StatusChanged(status)) => {
                    debug!(%status, "MPD status changed");
                }
            }
        }
    }

    fn route_chat(&mut self, out: Vec<ChatOutput>, effects: &mut Vec<Effect>) {
        for output in out {
            match output {
                ChatOutput::Send(line) => effects.push(Effect::Send(Remote::Chat, line)),
                ChatOutput::Event(ChatEvent::Joined) => {
                    effects.push(Effect::CancelReconnect(Remote::Chat));
                }
                ChatOutput::Event(ChatEvent::Command { sender, text }) => {
                    self.run_command(&sender, &text, effects);
                }
                ChatOutput::Event(ChatEvent::Die { sender }) => {
                    info!(%sender, "Shutdown requested");
                    effects.push(Effect::Shutdown {
                        reason: DIE_QUIT_REASON.to_string(),
                    });
                }
                ChatOutput::Event(ChatEvent::ServerClosed(_)) => {
                    effects.push(Effect::CloseLink(Remote::Chat));
                    effects.extend(self.disconnected(Remote::Chat));
                }
            }
        }
    }

    fn run_command(&mut self, sender: &str, text: &str, effects: &mut Vec<Effect>) {
        let Some(command) = ChatCommand::parse(text) else {
            debug!(%sender, %text, "Ignoring unknown command");
            return;
        };
        info!(%sender, command = command.name(), "IRC command");

        let result = dispatch(
            command,
            self.player.status(),
            self.player.track(),
            &mut self.announce,
        );

        if let Some(request) = result.player {
            let mut out = Vec::new();
            if self.player.request(request, &mut out) {
                self.route_player(out, effects);
            }
        }
        if let Some(reply) = result.reply {
            if let Some(line) = self.chat.say(&reply) {
                effects.push(Effect::Send(Remote::Chat, line));
            }
        }
    }

    /// Posts `New song: …` for a committed track change.
    ///
    /// The player session only reports a change when the file differs, so
    /// each distinct track reaches this point once.
    fn announce_track(&self, track: &TrackInfo, effects: &mut Vec<Effect>) {
        let file = track.file_id();
        if file.is_empty() || !self.announce {
            return;
        }
        let Some(line) = self.chat.say(&format!("New song: {}", track.describe())) else {
            debug!(%file, "Not on the channel, announcement skipped");
            return;
        };
        effects.push(Effect::Send(Remote::Chat, line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::ServerClosePolicy;

    fn prefs() -> Preferences {
        let mut prefs = Preferences::default();
        prefs.server.host = "irc.local".into();
        prefs.chat.channel = "#chan".into();
        prefs.die_password = Some("pw".into());
        prefs
    }

    fn lines(effects: &[Effect], remote: Remote) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(r, line) if *r == remote => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    fn feed(gateway: &mut Gateway, remote: Remote, input: &[&str]) -> Vec<Effect> {
        let mut effects = Vec::new();
        for line in input {
            effects.extend(gateway.line(remote, line).unwrap());
        }
        effects
    }

    /// Both sessions up: player greeted, chat joined.
    fn ready(prefs: &Preferences) -> Gateway {
        let mut gateway = Gateway::new(prefs);
        for remote in Remote::ALL {
            gateway.connecting(remote);
            gateway.connected(remote);
        }
        feed(&mut gateway, Remote::Chat, &[":irc.local 001 mpd2irc :Welcome"]);
        feed(&mut gateway, Remote::Player, &["OK MPD 0.21.0", "state: play", "OK"]);
        gateway
    }

    #[test]
    fn ready_cancels_the_reconnect_timer() {
        let mut gateway = Gateway::new(&prefs());
        gateway.connecting(Remote::Player);
        gateway.connected(Remote::Player);
        let effects = feed(&mut gateway, Remote::Player, &["OK MPD 0.21.0"]);
        assert!(effects.contains(&Effect::CancelReconnect(Remote::Player)));

        gateway.connecting(Remote::Chat);
        let effects = gateway.connected(Remote::Chat);
        assert_eq!(lines(&effects, Remote::Chat)[0], "NICK mpd2irc");
        let effects = feed(&mut gateway, Remote::Chat, &[":irc.local 001 mpd2irc :Welcome"]);
        assert!(effects.contains(&Effect::CancelReconnect(Remote::Chat)));
        assert_eq!(lines(&effects, Remote::Chat), vec!["JOIN #chan"]);
    }

    #[test]
    fn disconnection_arms_a_reconnect() {
        let mut gateway = ready(&prefs());
        assert_eq!(
            gateway.disconnected(Remote::Player),
            vec![Effect::ArmReconnect(Remote::Player)]
        );
        assert!(!gateway.player().is_ready());
        assert_eq!(gateway.farewell(Remote::Player, "bye"), None);
    }

    #[test]
    fn new_track_is_announced_once() {
        let mut gateway = ready(&prefs());
        feed(&mut gateway, Remote::Player, &["changed: player", "OK"]);
        let batch = ["file: a.mp3", "Artist: X", "Title: Y", "OK"];

        let effects = feed(&mut gateway, Remote::Player, &batch);
        let announced = lines(&effects, Remote::Chat);
        assert_eq!(announced, vec!["PRIVMSG #chan :New song: X - Y"]);

        feed(&mut gateway, Remote::Player, &["changed: player", "OK"]);
        let effects = feed(&mut gateway, Remote::Player, &batch);
        assert!(lines(&effects, Remote::Chat).is_empty());
    }

    #[test]
    fn announcements_follow_the_flag() {
        let mut gateway = ready(&prefs());
        let effects = feed(&mut gateway, Remote::Chat, &[":bob!b@h PRIVMSG #chan :!announce"]);
        assert_eq!(lines(&effects, Remote::Chat), vec!["PRIVMSG #chan :Announcements disabled."]);
        assert!(!gateway.announce_enabled());

        feed(&mut gateway, Remote::Player, &["changed: player", "OK"]);
        let effects = feed(&mut gateway, Remote::Player, &["file: b.mp3", "Title: B", "OK"]);
        assert!(lines(&effects, Remote::Chat).is_empty());
    }

    #[test]
    fn track_is_announced_again_after_toggling_back() {
        let mut gateway = ready(&prefs());
        feed(&mut gateway, Remote::Player, &["changed: player", "OK"]);
        let effects = feed(&mut gateway, Remote::Player, &["file: a.mp3", "Title: A", "OK"]);
        assert_eq!(lines(&effects, Remote::Chat), vec!["PRIVMSG #chan :New song: Unknown artist - A"]);

        feed(&mut gateway, Remote::Chat, &[":bob!b@h PRIVMSG #chan :!announce"]);
        feed(&mut gateway, Remote::Player, &["changed: player", "OK"]);
        feed(&mut gateway, Remote::Player, &["file: b.mp3", "OK"]);
        feed(&mut gateway, Remote::Chat, &[":bob!b@h PRIVMSG #chan :!announce"]);
        assert!(gateway.announce_enabled());

        // a.mp3 revient: c'est un nouveau changement de morceau
        feed(&mut gateway, Remote::Player, &["changed: player", "OK"]);
        let effects = feed(&mut gateway, Remote::Player, &["file: a.mp3", "Title: A", "OK"]);
        assert_eq!(lines(&effects, Remote::Chat), vec!["PRIVMSG #chan :New song: Unknown artist - A"]);
    }

    #[test]
    fn cleared_playlist_is_not_announced() {
        let mut gateway = ready(&prefs());
        feed(&mut gateway, Remote::Player, &["changed: player", "OK"]);
        feed(&mut gateway, Remote::Player, &["file: a.mp3", "OK"]);
        feed(&mut gateway, Remote::Player, &["changed: player", "OK"]);
        let effects = feed(&mut gateway, Remote::Player, &["state: stop", "OK"]);
        assert!(lines(&effects, Remote::Chat).is_empty());
        assert_eq!(gateway.player().track().file_id(), "");
    }

    #[test]
    fn no_announcement_before_joining() {
        let prefs = prefs();
        let mut gateway = Gateway::new(&prefs);
        gateway.connecting(Remote::Player);
        gateway.connected(Remote::Player);
        let effects = feed(&mut gateway, Remote::Player, &["OK MPD 0.21.0", "file: a.mp3", "OK"]);
        assert!(lines(&effects, Remote::Chat).is_empty());
    }

    #[test]
    fn pause_uses_the_committed_state() {
        let mut gateway = ready(&prefs());
        let effects = feed(&mut gateway, Remote::Chat, &[":bob!b@h PRIVMSG #chan :!pause"]);
        assert_eq!(lines(&effects, Remote::Player), vec!["noidle"]);

        let effects = feed(&mut gateway, Remote::Player, &["OK"]);
        assert_eq!(lines(&effects, Remote::Player), vec!["pause 1", "idle player options"]);
    }

    #[test]
    fn read_only_commands_do_not_touch_the_player() {
        let mut gateway = ready(&prefs());
        for command in ["!status", "!np", "!version"] {
            let line = format!(":bob!b@h PRIVMSG #chan :{}", command);
            let effects = feed(&mut gateway, Remote::Chat, &[line.as_str()]);
            assert!(lines(&effects, Remote::Player).is_empty());
            assert_eq!(lines(&effects, Remote::Chat).len(), 1);
        }
        let effects = feed(&mut gateway, Remote::Chat, &[":bob!b@h PRIVMSG #chan :!status"]);
        assert_eq!(
            lines(&effects, Remote::Chat),
            vec!["PRIVMSG #chan :Repeat: off, Random: off, Crossfade: 0 sec, State: play"]
        );
    }

    #[test]
    fn unknown_command_produces_nothing() {
        let mut gateway = ready(&prefs());
        let effects = feed(&mut gateway, Remote::Chat, &["PRIVMSG #chan :!randomXYZ"]);
        assert!(effects.is_empty());
    }

    #[test]
    fn toggle_reply_is_sent_even_when_mpd_is_down() {
        let mut gateway = ready(&prefs());
        gateway.disconnected(Remote::Player);
        let effects = feed(&mut gateway, Remote::Chat, &[":bob!b@h PRIVMSG #chan :!random"]);
        assert!(lines(&effects, Remote::Player).is_empty());
        assert_eq!(lines(&effects, Remote::Chat), vec!["PRIVMSG #chan :Enabled random"]);
    }

    #[test]
    fn die_requests_shutdown() {
        let mut gateway = ready(&prefs());
        let effects = feed(&mut gateway, Remote::Chat, &[":op!o@h PRIVMSG mpd2irc :die pw"]);
        assert_eq!(
            effects,
            vec![Effect::Shutdown {
                reason: "Exiting".into()
            }]
        );
        assert_eq!(gateway.farewell(Remote::Chat, "Exiting").as_deref(), Some("QUIT :Exiting"));
        assert_eq!(gateway.farewell(Remote::Player, "Exiting").as_deref(), Some("close"));
    }

    #[test]
    fn server_close_can_reconnect() {
        let mut prefs = prefs();
        prefs.chat.on_server_close = ServerClosePolicy::Reconnect;
        let mut gateway = ready(&prefs);
        let effects = feed(&mut gateway, Remote::Chat, &["ERROR :Closing Link: (Ping timeout)"]);
        assert_eq!(
            effects,
            vec![Effect::CloseLink(Remote::Chat), Effect::ArmReconnect(Remote::Chat)]
        );
        assert_eq!(gateway.chat().state(), ChatState::Disconnected);
    }

    #[test]
    fn fatal_errors_are_propagated() {
        let mut gateway = ready(&prefs());
        assert!(gateway.line(Remote::Chat, "ERROR :Closing Link: banned").is_err());

        let mut gateway = Gateway::new(&prefs());
        gateway.connecting(Remote::Player);
        gateway.connected(Remote::Player);
        let err = gateway.line(Remote::Player, "OK MPD 0.10.0").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(gateway.farewell(Remote::Player, "Exiting"), None);
    }
}
