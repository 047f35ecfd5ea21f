//! Bridge running against scripted MPD and IRC servers on the loopback.

use std::time::Duration;

use anyhow::{Context, Result};
use m2icontrol::{Bridge, BridgeError, Preferences, ProtocolVersion, ShutdownHandle};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const STEP: Duration = Duration::from_secs(5);

/// One accepted connection, read and written line by line.
struct Peer {
    lines: Lines<BufReader<TcpStream>>,
    eol: &'static str,
}

impl Peer {
    async fn accept(listener: &TcpListener, eol: &'static str) -> Result<Self> {
        let (stream, _) = timeout(STEP, listener.accept()).await.context("no connection")??;
        Ok(Self {
            lines: BufReader::new(stream).lines(),
            eol,
        })
    }

    async fn expect(&mut self, expected: &str) -> Result<()> {
        let line = self.next().await?;
        assert_eq!(line.as_deref(), Some(expected));
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<String>> {
        Ok(timeout(STEP, self.lines.next_line()).await.context("peer stalled")??)
    }

    async fn say(&mut self, line: &str) -> Result<()> {
        let data = format!("{}{}", line, self.eol);
        self.lines.get_mut().write_all(data.as_bytes()).await?;
        Ok(())
    }
}

struct Harness {
    mpd: TcpListener,
    irc: TcpListener,
    handle: ShutdownHandle,
    task: JoinHandle<Result<(), BridgeError>>,
}

impl Harness {
    async fn start() -> Result<Self> {
        let mpd = TcpListener::bind("127.0.0.1:0").await?;
        let irc = TcpListener::bind("127.0.0.1:0").await?;

        let mut prefs = Preferences::default();
        prefs.player.host = "127.0.0.1".into();
        prefs.player.port = mpd.local_addr()?.port();
        prefs.server.host = "127.0.0.1".into();
        prefs.server.port = irc.local_addr()?.port();
        prefs.chat.channel = "#chan".into();
        prefs.die_password = Some("pw".into());
        prefs.validate()?;

        let bridge = Bridge::new(prefs);
        let handle = bridge.shutdown_handle();
        let task = tokio::spawn(bridge.run());
        Ok(Self {
            mpd,
            irc,
            handle,
            task,
        })
    }

    /// Registers and joins the channel.
    async fn join(&self) -> Result<Peer> {
        let mut irc = Peer::accept(&self.irc, "\r\n").await?;
        irc.expect("NICK mpd2irc").await?;
        let user = irc.next().await?.unwrap_or_default();
        assert!(user.starts_with("USER mpd2irc 0 * :mpd2irc "), "{}", user);
        irc.say(":irc.local 001 mpd2irc :Welcome").await?;
        irc.expect("JOIN #chan").await?;
        Ok(irc)
    }

    /// Greets the bridge and answers its first status batch.
    async fn greet(&self, reply: &[&str]) -> Result<Peer> {
        let mut mpd = Peer::accept(&self.mpd, "\n").await?;
        mpd.say("OK MPD 0.21.0").await?;
        for line in [
            "command_list_begin",
            "status",
            "currentsong",
            "command_list_end",
            "idle player options",
        ] {
            mpd.expect(line).await?;
        }
        for line in reply {
            mpd.say(line).await?;
        }
        Ok(mpd)
    }

    async fn finish(self) -> Result<Result<(), BridgeError>> {
        Ok(timeout(STEP, self.task).await??)
    }
}

#[tokio::test]
async fn new_track_is_announced_and_commands_reach_mpd() -> Result<()> {
    let harness = Harness::start().await?;
    let mut irc = harness.join().await?;
    let mut mpd = harness
        .greet(&["state: play", "file: a.mp3", "Artist: X", "Title: Y", "OK"])
        .await?;

    irc.expect("PRIVMSG #chan :New song: X - Y").await?;

    irc.say(":bob!b@host PRIVMSG #chan :!np").await?;
    irc.expect("PRIVMSG #chan :Now Playing: X - Y").await?;

    irc.say(":bob!b@host PRIVMSG #chan :!next").await?;
    mpd.expect("noidle").await?;
    mpd.say("OK").await?;
    mpd.expect("next").await?;
    mpd.expect("idle player options").await?;

    harness.handle.shutdown("Caught signal: 15, exiting.");
    irc.expect("QUIT :Caught signal: 15, exiting.").await?;
    mpd.expect("close").await?;
    assert!(harness.finish().await?.is_ok());
    Ok(())
}

#[tokio::test]
async fn old_mpd_stops_the_bridge_without_writing_to_it() -> Result<()> {
    let harness = Harness::start().await?;
    let mut mpd = Peer::accept(&harness.mpd, "\n").await?;
    mpd.say("OK MPD 0.10.0").await?;

    // Aucune ligne avant la fermeture
    assert_eq!(mpd.next().await?, None);

    match harness.finish().await? {
        Err(BridgeError::PlayerTooOld { found, required }) => {
            assert_eq!(found, ProtocolVersion::new(0, 10));
            assert_eq!(required, ProtocolVersion::new(0, 14));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn unknown_command_produces_no_traffic() -> Result<()> {
    let harness = Harness::start().await?;
    let mut irc = harness.join().await?;
    let _mpd = harness.greet(&["state: stop", "OK"]).await?;

    irc.say(":bob!b@host PRIVMSG #chan :!randomXYZ").await?;
    irc.say("PING :probe").await?;
    // La première réponse est le PONG
    irc.expect("PONG :probe").await?;

    harness.handle.shutdown("bye");
    irc.expect("QUIT :bye").await?;
    assert!(harness.finish().await?.is_ok());
    Ok(())
}

#[tokio::test]
async fn die_command_closes_both_sides() -> Result<()> {
    let harness = Harness::start().await?;
    let mut irc = harness.join().await?;
    let mut mpd = harness.greet(&["state: stop", "OK"]).await?;

    irc.say(":op!o@host PRIVMSG mpd2irc :die wrong").await?;
    irc.say("PING :probe").await?;
    irc.expect("PONG :probe").await?;

    irc.say(":op!o@host PRIVMSG mpd2irc :die pw").await?;
    irc.expect("QUIT :Exiting").await?;
    mpd.expect("close").await?;
    assert_eq!(mpd.next().await?, None);
    assert!(harness.finish().await?.is_ok());
    Ok(())
}
