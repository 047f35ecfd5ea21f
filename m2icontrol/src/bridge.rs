//! Event loop of the bridge.
//!
//! A single task owns the [`Gateway`], the reconnect timers and the two
//! [`LineChannel`]s. Connection tasks report back through one event queue;
//! events from a connection that has since been replaced are discarded by
//! comparing [`LinkId`]s.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::codec::Terminator;
use crate::errors::BridgeError;
use crate::events::{LinkEvent, LinkEventKind};
use crate::gateway::{DIE_QUIT_REASON, Effect, Gateway};
use crate::line_channel::LineChannel;
use crate::model::{LinkId, Remote};
use crate::preferences::Preferences;
use crate::reconnect::ReconnectScheduler;
use crate::transport::Endpoint;

/// How long each connection gets to flush its last lines at shutdown.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Asks a running bridge to stop.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl ShutdownHandle {
    /// `reason` becomes the IRC quit message.
    pub fn shutdown(&self, reason: impl Into<String>) {
        if self.tx.send(reason.into()).is_err() {
            debug!("Bridge already stopped");
        }
    }
}

pub struct Bridge {
    prefs: Preferences,
    gateway: Gateway,
    scheduler: ReconnectScheduler,
    links: HashMap<Remote, LineChannel>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: mpsc::UnboundedReceiver<LinkEvent>,
    shutdown_tx: mpsc::UnboundedSender<String>,
    shutdown_rx: mpsc::UnboundedReceiver<String>,
    stop: Option<String>,
}

impl Bridge {
    pub fn new(prefs: Preferences) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        Self {
            gateway: Gateway::new(&prefs),
            scheduler: ReconnectScheduler::new(prefs.reconnect.clone()),
            prefs,
            links: HashMap::new(),
            generation: 0,
            events_tx,
            events_rx,
            shutdown_tx,
            shutdown_rx,
            stop: None,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Runs until a shutdown request, a `die` command or a fatal error.
    ///
    /// The connections are closed politely in every case; a fatal error is
    /// returned once that is done.
    pub async fn run(mut self) -> Result<(), BridgeError> {
        info!(
            mpd = %self.endpoint(Remote::Player),
            irc = %self.endpoint(Remote::Chat),
            channel = %self.prefs.chat.channel,
            "🚀 Starting bridge"
        );
        for remote in Remote::ALL {
            self.connect(remote);
        }

        let outcome = loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    if let Err(err) = self.handle_event(event) {
                        break Err(err);
                    }
                    if let Some(reason) = self.stop.take() {
                        break Ok(reason);
                    }
                }
                remote = self.scheduler.expired() => self.on_retry(remote),
                Some(reason) = self.shutdown_rx.recv() => break Ok(reason),
            }
        };

        match outcome {
            Ok(reason) => {
                info!(%reason, "Shutting down");
                self.close_all(&reason).await;
                Ok(())
            }
            Err(err) => {
                error!(fatal = err.is_fatal(), "Stopping after error: {}", err);
                // Le message d'erreur reste dans les logs, pas sur le canal
                self.close_all(DIE_QUIT_REASON).await;
                Err(err)
            }
        }
    }

    fn endpoint(&self, remote: Remote) -> Endpoint {
        match remote {
            Remote::Player => self.prefs.player.endpoint(),
            Remote::Chat => self.prefs.server.endpoint(),
        }
    }

    fn connect(&mut self, remote: Remote) {
        self.generation += 1;
        let link = LinkId {
            remote,
            generation: self.generation,
        };
        let terminator = match remote {
            Remote::Player => Terminator::Lf,
            Remote::Chat => Terminator::CrLf,
        };
        let endpoint = self.endpoint(remote);
        info!(%link, %endpoint, "🔌 Connecting");

        self.gateway.connecting(remote);
        let channel = LineChannel::open(
            link,
            endpoint,
            terminator,
            self.prefs.connect_timeout,
            self.events_tx.clone(),
        );
        // L'ancienne connexion, s'il y en a une, est abandonnée ici
        self.links.insert(remote, channel);
    }

    fn on_retry(&mut self, remote: Remote) {
        if self.links.contains_key(&remote) {
            debug!(%remote, "Connection attempt still in progress");
            return;
        }
        self.connect(remote);
    }

    fn is_current(&self, link: LinkId) -> bool {
        self.links.get(&link.remote).is_some_and(|c| c.link() == link)
    }

    fn handle_event(&mut self, event: LinkEvent) -> Result<(), BridgeError> {
        let LinkEvent { link, kind } = event;
        if !self.is_current(link) {
            trace!(%link, "Dropping event from a stale connection");
            return Ok(());
        }
        let remote = link.remote;

        let effects = match kind {
            LinkEventKind::Connected => {
                debug!(%link, "Transport established");
                self.gateway.connected(remote)
            }
            LinkEventKind::Line(line) => self.gateway.line(remote, &line)?,
            LinkEventKind::Closed(reason) => {
                match reason {
                    Some(err) => warn!(%link, "⚠️ Connection lost: {}", err),
                    None => warn!(%link, "⚠️ Connection closed by peer"),
                }
                self.links.remove(&remote);
                self.gateway.disconnected(remote)
            }
        };
        self.apply(effects);
        Ok(())
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(remote, line) => {
                    let sent = self.links.get(&remote).is_some_and(|c| c.send(line));
                    if !sent {
                        debug!(%remote, "No connection, line dropped");
                    }
                }
                Effect::ArmReconnect(remote) => {
                    if self.scheduler.arm(remote) {
                        info!(%remote, delay = ?self.prefs.reconnect.delay, "🔁 Reconnection scheduled");
                    }
                }
                Effect::CancelReconnect(remote) => {
                    if self.scheduler.cancel(remote) {
                        debug!(%remote, "Reconnection timer cancelled");
                    }
                }
                Effect::CloseLink(remote) => {
                    self.links.remove(&remote);
                }
                Effect::Shutdown { reason } => self.stop = Some(reason),
            }
        }
    }

    /// Sends the farewell lines and waits a bounded time for them to leave.
    async fn close_all(&mut self, reason: &str) {
        self.scheduler.cancel_all();

        // IRC d'abord, puis MPD
        for remote in [Remote::Chat, Remote::Player] {
            let farewell = self.gateway.farewell(remote, reason);
            if let Some(channel) = self.links.remove(&remote) {
                channel.close(farewell, CLOSE_TIMEOUT).await;
            }
        }
        info!("👋 Bridge stopped");
    }
}
