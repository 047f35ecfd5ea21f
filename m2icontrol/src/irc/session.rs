use tracing::{debug, info, warn};

use super::message::IrcMessage;
use crate::errors::BridgeError;
use crate::events::ChatEvent;
use crate::model::LinkState;
use crate::preferences::{ChatPreferences, ServerClosePolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatState {
    Disconnected,
    Connecting,
    Registering,
    Joined,
}

impl ChatState {
    pub fn link_state(&self) -> LinkState {
        match self {
            ChatState::Disconnected => LinkState::Disconnected,
            ChatState::Connecting => LinkState::Connecting,
            ChatState::Registering => LinkState::Handshaking,
            ChatState::Joined => LinkState::Ready,
        }
    }
}

#[derive(Debug)]
pub enum ChatOutput {
    Send(String),
    Event(ChatEvent),
}

/// Client side of the IRC protocol: registration, join, keepalive and
/// extraction of channel commands.
#[derive(Debug)]
pub struct ChatSession {
    prefs: ChatPreferences,
    command_prefix: String,
    die_password: Option<String>,
    state: ChatState,
    nick: String,
}

impl ChatSession {
    pub fn new(prefs: ChatPreferences, command_prefix: String, die_password: Option<String>) -> Self {
        let nick = prefs.nick.clone();
        Self {
            prefs,
            command_prefix,
            die_password,
            state: ChatState::Disconnected,
            nick,
        }
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        self.state == ChatState::Joined
    }

    /// Nickname in use, may differ from the configured one after a collision.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn channel(&self) -> &str {
        &self.prefs.channel
    }

    pub fn on_connecting(&mut self) {
        self.state = ChatState::Connecting;
    }

    /// Transport is up: register.
    pub fn on_connected(&mut self, out: &mut Vec<ChatOutput>) {
        self.state = ChatState::Registering;
        self.nick = self.prefs.nick.clone();

        if let Some(password) = &self.prefs.password {
            out.push(ChatOutput::Send(format!("PASS {}", password)));
        }
        out.push(ChatOutput::Send(format!("NICK {}", self.nick)));
        out.push(ChatOutput::Send(
            IrcMessage::new(
                "USER",
                vec![
                    self.prefs.username.clone(),
                    "0".into(),
                    "*".into(),
                    self.prefs.realname.clone(),
                ],
            )
            .to_string(),
        ));
    }

    pub fn on_disconnected(&mut self) {
        self.state = ChatState::Disconnected;
    }

    /// `PRIVMSG` to the channel, only once joined.
    pub fn say(&self, text: &str) -> Option<String> {
        self.is_joined()
            .then(|| format!("PRIVMSG {} :{}", self.prefs.channel, text))
    }

    pub fn quit_line(reason: &str) -> String {
        format!("QUIT :{}", reason)
    }

    pub fn handle_line(&mut self, line: &str, out: &mut Vec<ChatOutput>) -> Result<(), BridgeError> {
        let Some(msg) = IrcMessage::parse(line) else {
            debug!(%line, "Ignoring malformed IRC line");
            return Ok(());
        };

        match msg.command.as_str() {
            // Répondre au PING quel que soit l'état
            "PING" => {
                let token = msg.trailing().unwrap_or("");
                out.push(ChatOutput::Send(format!("PONG :{}", token)));
            }
            "ERROR" => {
                let reason = msg.trailing().unwrap_or("connection closed").to_string();
                match self.prefs.on_server_close {
                    ServerClosePolicy::Fatal => return Err(BridgeError::ChatClosed(reason)),
                    ServerClosePolicy::Reconnect => {
                        warn!(%reason, "IRC server closed the link");
                        out.push(ChatOutput::Event(ChatEvent::ServerClosed(reason)));
                    }
                }
            }
            "433" if self.state == ChatState::Registering => {
                self.nick.push('_');
                info!(nick = %self.nick, "Nickname in use, retrying");
                out.push(ChatOutput::Send(format!("NICK {}", self.nick)));
            }
            "001" => self.handle_welcome(&msg, out),
            "PRIVMSG" => self.handle_privmsg(&msg, out),
            _ => {}
        }
        Ok(())
    }

    fn handle_welcome(&mut self, msg: &IrcMessage, out: &mut Vec<ChatOutput>) {
        if self.state != ChatState::Registering {
            debug!(state = ?self.state, "Ignoring welcome");
            return;
        }
        let addressed = msg
            .param(0)
            .is_some_and(|target| target.eq_ignore_ascii_case(&self.nick));
        if !addressed {
            debug!(target = ?msg.param(0), nick = %self.nick, "Welcome for another nickname");
            return;
        }

        self.state = ChatState::Joined;
        info!(nick = %self.nick, channel = %self.prefs.channel, "💬 Registered on IRC, joining");

        if let Some(auth) = &self.prefs.auth {
            out.push(ChatOutput::Send(format!(
                "PRIVMSG {} :{}",
                auth.service, auth.message
            )));
        }
        out.push(ChatOutput::Send(format!("JOIN {}", self.prefs.channel)));
        out.push(ChatOutput::Event(ChatEvent::Joined));
    }

    fn handle_privmsg(&mut self, msg: &IrcMessage, out: &mut Vec<ChatOutput>) {
        let (Some(target), Some(text)) = (msg.param(0), msg.param(1)) else {
            return;
        };
        let sender = msg.source_nick().unwrap_or("").to_string();

        if target.eq_ignore_ascii_case(&self.prefs.channel) {
            if let Some(command) = text.strip_prefix(self.command_prefix.as_str()) {
                let command = command.trim_end_matches(|c: char| c.is_whitespace() || c == '\u{1}');
                if !command.is_empty() {
                    out.push(ChatOutput::Event(ChatEvent::Command {
                        sender,
                        text: command.to_string(),
                    }));
                }
            }
        } else if target.eq_ignore_ascii_case(&self.nick) && self.is_die_request(text) {
            warn!(%sender, "Shutdown requested over IRC");
            out.push(ChatOutput::Event(ChatEvent::Die { sender }));
        }
    }

    fn is_die_request(&self, text: &str) -> bool {
        let Some(expected) = self.die_password.as_deref() else {
            return false;
        };
        match text.trim_end().split_once(' ') {
            Some(("die", password)) => password == expected,
            _ => false,
        }
    }
}
