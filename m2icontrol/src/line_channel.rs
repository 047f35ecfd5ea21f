//! One connection to a remote, driven by its own task.
//!
//! The task connects, then multiplexes inbound lines (forwarded to the
//! bridge as [`LinkEvent`]s) and outbound lines queued with
//! [`LineChannel::send`]. Any read or write failure ends the task with a
//! `Closed` event; the pending buffer dies with it.

use std::borrow::Cow;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::codec::{LineCodec, Terminator};
use crate::errors::BridgeError;
use crate::events::{LinkEvent, LinkEventKind};
use crate::model::LinkId;
use crate::transport::{self, Endpoint};

pub type EventSender = mpsc::UnboundedSender<LinkEvent>;

#[derive(Debug)]
enum ChannelCommand {
    Send(String),
    Close(Option<String>),
}

#[derive(Debug)]
pub struct LineChannel {
    link: LinkId,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    task: JoinHandle<()>,
}

impl LineChannel {
    /// Starts connecting to `endpoint` in the background.
    ///
    /// Success is reported with `Connected`, failure with `Closed(Some(err))`.
    pub fn open(
        link: LinkId,
        endpoint: Endpoint,
        terminator: Terminator,
        connect_timeout: Duration,
        events: EventSender,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            debug!(%link, %endpoint, "Connecting");
            match transport::connect(&endpoint, connect_timeout).await {
                Ok(stream) => {
                    if events.send(LinkEvent::new(link, LinkEventKind::Connected)).is_ok() {
                        run_io(link, stream, terminator, rx, events).await;
                    }
                }
                Err(err) => {
                    let _ = events.send(LinkEvent::new(link, LinkEventKind::Closed(Some(err))));
                }
            }
        });
        Self {
            link,
            commands,
            task,
        }
    }

    /// Runs a channel over an already established stream.
    pub fn attach<S>(link: LinkId, stream: S, terminator: Terminator, events: EventSender) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            if events.send(LinkEvent::new(link, LinkEventKind::Connected)).is_ok() {
                run_io(link, stream, terminator, rx, events).await;
            }
        });
        Self {
            link,
            commands,
            task,
        }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Queues a line; returns `false` once the connection task is gone.
    pub fn send(&self, line: impl Into<String>) -> bool {
        self.commands.send(ChannelCommand::Send(line.into())).is_ok()
    }

    /// Writes the queued lines and `final_line`, then shuts the stream down.
    ///
    /// Waits at most `wait` for the task to finish.
    pub async fn close(mut self, final_line: Option<String>, wait: Duration) {
        if self.commands.send(ChannelCommand::Close(final_line)).is_ok()
            && tokio::time::timeout(wait, &mut self.task).await.is_err()
        {
            debug!(link = %self.link, "Channel did not close in time");
        }
    }
}

impl Drop for LineChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_io<S>(
    link: LinkId,
    stream: S,
    terminator: Terminator,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
    events: EventSender,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LineCodec::new(terminator));

    let closed = loop {
        tokio::select! {
            inbound = framed.next() => match inbound {
                Some(Ok(line)) => {
                    trace!(%link, "<< {}", line);
                    if events.send(LinkEvent::new(link, LinkEventKind::Line(line))).is_err() {
                        return;
                    }
                }
                Some(Err(err)) => break Some(BridgeError::from(err)),
                None => break None,
            },
            command = commands.recv() => match command {
                Some(ChannelCommand::Send(line)) => {
                    trace!(%link, ">> {}", redact(&line));
                    if let Err(err) = framed.send(line).await {
                        break Some(BridgeError::from(err));
                    }
                }
                Some(ChannelCommand::Close(final_line)) => {
                    if let Some(line) = final_line {
                        trace!(%link, ">> {}", redact(&line));
                        if let Err(err) = framed.feed(line).await {
                            debug!(%link, "Cannot write the last line: {}", err);
                        }
                    }
                    if let Err(err) = framed.close().await {
                        debug!(%link, "Error while closing: {}", err);
                    }
                    return;
                }
                None => return,
            },
        }
    };

    debug!(%link, error = ?closed, "Connection closed");
    let _ = events.send(LinkEvent::new(link, LinkEventKind::Closed(closed)));
}

/// Hides secrets from the traffic log.
pub fn redact(line: &str) -> Cow<'_, str> {
    let mut words = line.splitn(3, ' ');
    let verb = words.next().unwrap_or("");
    let target = words.next().unwrap_or("");

    if verb.eq_ignore_ascii_case("password") || verb.eq_ignore_ascii_case("PASS") {
        return Cow::Owned(format!("{} ********", verb));
    }
    // Les messages privés servent à l'identification auprès des services
    if verb.eq_ignore_ascii_case("PRIVMSG") && !target.starts_with(['#', '&']) {
        return Cow::Owned(format!("{} {} :********", verb, target));
    }
    Cow::Borrowed(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Remote;
    use tokio_test::io::Builder;

    fn link() -> LinkId {
        LinkId {
            remote: Remote::Chat,
            generation: 1,
        }
    }

    async fn next_kind(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEventKind {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.link, link());
        event.kind
    }

    #[tokio::test]
    async fn forwards_lines_and_writes_replies() {
        let mock = Builder::new()
            .read(b"PING :abc\r\n")
            .write(b"PONG :abc\r\n")
            .build();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = LineChannel::attach(link(), mock, Terminator::CrLf, tx);

        assert!(matches!(next_kind(&mut rx).await, LinkEventKind::Connected));
        match next_kind(&mut rx).await {
            LinkEventKind::Line(line) => assert_eq!(line, "PING :abc"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(channel.send("PONG :abc"));
        assert!(matches!(next_kind(&mut rx).await, LinkEventKind::Closed(None)));
    }

    #[tokio::test]
    async fn read_error_closes_the_link() {
        let mock = Builder::new()
            .read(b"OK MPD 0.21.0\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _channel = LineChannel::attach(link(), mock, Terminator::Lf, tx);

        assert!(matches!(next_kind(&mut rx).await, LinkEventKind::Connected));
        assert!(matches!(next_kind(&mut rx).await, LinkEventKind::Line(_)));
        match next_kind(&mut rx).await {
            LinkEventKind::Closed(Some(err)) => assert!(!err.is_fatal()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn close_flushes_the_final_line() {
        let (client, server) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = LineChannel::attach(link(), client, Terminator::CrLf, tx);
        assert!(matches!(next_kind(&mut rx).await, LinkEventKind::Connected));

        channel.send("PRIVMSG #chan :bye");
        channel
            .close(Some("QUIT :Exiting".into()), Duration::from_secs(1))
            .await;

        let mut peer = Framed::new(server, LineCodec::new(Terminator::CrLf));
        assert_eq!(peer.next().await.unwrap().unwrap(), "PRIVMSG #chan :bye");
        assert_eq!(peer.next().await.unwrap().unwrap(), "QUIT :Exiting");
        assert!(peer.next().await.is_none());
    }

    #[tokio::test]
    async fn close_survives_a_failed_final_write() {
        let mock = Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = LineChannel::attach(link(), mock, Terminator::CrLf, tx);
        assert!(matches!(next_kind(&mut rx).await, LinkEventKind::Connected));

        channel
            .close(Some("QUIT :Exiting".into()), Duration::from_secs(1))
            .await;
        // Pas d'événement Closed: la fermeture vient de nous
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn secrets_are_redacted() {
        assert_eq!(redact("password hunter2"), "password ********");
        assert_eq!(redact("PASS hunter2"), "PASS ********");
        assert_eq!(
            redact("PRIVMSG NickServ :IDENTIFY hunter2"),
            "PRIVMSG NickServ :********"
        );
        assert_eq!(redact("PRIVMSG #chan :New song"), "PRIVMSG #chan :New song");
        assert_eq!(redact("status"), "status");
    }
}
