//! Newline-delimited framing.
//!
//! Unlike `LinesCodec`, a bad line (too long, not UTF-8) is reported as a
//! [`Frame::Invalid`] item rather than a decoder error, so the connection
//! keeps going after it.

use super::error::ProtocolError;
use super::response::{Response, FAREWELL};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// One inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A line with surrounding whitespace removed. May be empty.
    Line(String),
    Invalid(ProtocolError),
}

/// Anything the server writes to a client.
#[derive(Debug, Clone)]
pub enum Outbound {
    Response(Response),
    Farewell,
}

impl From<Response> for Outbound {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

#[derive(Debug)]
pub struct CommandCodec {
    max_length: usize,
    /// Bytes of `buf` already scanned for a newline.
    next_index: usize,
    /// Skipping the tail of an over-long line.
    discarding: bool,
}

impl CommandCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

fn to_frame(raw: &[u8]) -> Frame {
    match std::str::from_utf8(raw) {
        Ok(line) => Frame::Line(line.trim().to_owned()),
        Err(_) => Frame::Invalid(ProtocolError::Unparseable),
    }
}

impl Decoder for CommandCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            let read_to = self.max_length.saturating_add(1).min(buf.len());
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = buf.split_to(end + 1);
                    return Ok(Some(to_frame(&line[..end])));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.discarding = true;
                    return Ok(Some(Frame::Invalid(ProtocolError::LineTooLong {
                        limit: self.max_length,
                    })));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if buf.is_empty() || self.discarding {
            buf.clear();
            self.discarding = false;
            self.next_index = 0;
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        self.next_index = 0;
        Ok(Some(to_frame(&line)))
    }
}

impl Encoder<Outbound> for CommandCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), io::Error> {
        match item {
            Outbound::Response(response) => {
                let json = serde_json::to_vec(&response).map_err(io::Error::from)?;
                dst.reserve(json.len() + 1);
                dst.put_slice(&json);
            }
            Outbound::Farewell => dst.put_slice(FAREWELL.as_bytes()),
        }
        dst.put_u8(b'\n');
        Ok(())
    }
}
