//! Line framing shared by both protocols.
//!
//! Inbound lines end with `\n`, an optional `\r` before it is dropped.
//! Outbound lines get the terminator of their protocol: `\n` for MPD,
//! `\r\n` for IRC.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

pub const MAX_LINE_LENGTH: usize = 8 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminator {
    Lf,
    CrLf,
}

impl Terminator {
    fn as_bytes(&self) -> &'static [u8] {
        match self {
            Terminator::Lf => b"\n",
            Terminator::CrLf => b"\r\n",
        }
    }
}

#[derive(Debug)]
pub struct LineCodec {
    terminator: Terminator,
    max_length: usize,
    // Position déjà examinée sans trouver de fin de ligne
    next_index: usize,
    discarding: bool,
}

impl LineCodec {
    pub fn new(terminator: Terminator) -> Self {
        Self::with_max_length(terminator, MAX_LINE_LENGTH)
    }

    pub fn with_max_length(terminator: Terminator, max_length: usize) -> Self {
        Self {
            terminator,
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            match newline {
                Some(end) if self.discarding => {
                    buf.advance(end + 1);
                    self.next_index = 0;
                    self.discarding = false;
                }
                Some(end) => {
                    self.next_index = 0;
                    let raw = buf.split_to(end + 1);
                    let line = &raw[..end];
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    if line.len() > self.max_length {
                        warn!(length = line.len(), "Dropping over-long line");
                        continue;
                    }
                    return Ok(Some(String::from_utf8_lossy(line).into_owned()));
                }
                None if self.discarding => {
                    buf.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                None if buf.len() > self.max_length => {
                    warn!(length = buf.len(), "Line exceeds {} bytes, discarding it", self.max_length);
                    self.discarding = true;
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None => {
                // Un fragment sans fin de ligne ne survit pas à la connexion
                buf.clear();
                self.next_index = 0;
                self.discarding = false;
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), io::Error> {
        let terminator = self.terminator.as_bytes();
        buf.reserve(line.len() + terminator.len());
        // A line must never smuggle a second command
        for byte in line.bytes() {
            buf.put_u8(if byte == b'\r' || byte == b'\n' { b' ' } else { byte });
        }
        buf.put_slice(terminator);
        Ok(())
    }
}
