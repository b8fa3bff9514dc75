//! Capture ingestion for the Ruida protocol analyzer.
//!
//! Reads framed packet records produced by tshark, one record per line:
//!
//! ```text
//! delta_time \t to_port,from_port \t udp_length \t payload_hex
//! ```
//!
//! captured with:
//!
//! ```text
//! tshark -Y "(ip.addr == <ruida_ip> && udp.payload)" -T fields \
//!        -e frame.time_delta -e udp.port -e udp.length -e data.data
//! ```
//!
//! The crate turns records into deswizzled packets and exposes them as a
//! linear byte stream ([`PacketStream`]) for the protocol decoder.

mod error;
mod stream;
pub mod swizzle;
pub mod util;

pub use crate::error::ReaderError;
pub use crate::stream::{LoadedPacket, PacketStream, StreamStats};

use std::io::{BufRead, Cursor};
use std::path::Path;

use crate::error::ReaderResult;

/// Ports the controller listens on. Traffic sent to these ports is swizzled.
pub const CONTROLLER_LISTEN_PORTS: [u16; 2] = [40200, 50200];

/// Ports the controller sends replies from
pub const CONTROLLER_REPLY_PORTS: [u16; 2] = [40200, 40207];

/// The udp.length capture field includes the UDP header
const UDP_HEADER_LEN: usize = 8;

/// Text encoding of the capture input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputEncoding {
    /// UTF-8 (tshark's native output)
    #[default]
    Utf8,
    /// UTF-16, as produced by Windows shell redirection
    Utf16,
}

fn decode_text(bytes: &[u8], encoding: InputEncoding) -> ReaderResult<String> {
    match encoding {
        InputEncoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|_| ReaderError::Encoding {
                suggestion: "utf-16",
            }),
        InputEncoding::Utf16 => {
            // Strip the BOM if present; default to little endian without one.
            let (bytes, big_endian) = match bytes {
                [0xFF, 0xFE, rest @ ..] => (rest, false),
                [0xFE, 0xFF, rest @ ..] => (rest, true),
                _ => (bytes, false),
            };
            if bytes.len() % 2 != 0 {
                return Err(ReaderError::Encoding {
                    suggestion: "utf-8",
                });
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| {
                    if big_endian {
                        u16::from_be_bytes([pair[0], pair[1]])
                    } else {
                        u16::from_le_bytes([pair[0], pair[1]])
                    }
                })
                .collect();
            String::from_utf16(&units).map_err(|_| ReaderError::Encoding {
                suggestion: "utf-8",
            })
        }
    }
}

/// Source of capture lines: a recorded dump file or a live capture process
pub enum CaptureInput {
    /// A capture decoded into memory up front. Rewindable.
    Replay(Cursor<String>),
    /// Output of a live capture process. Not rewindable.
    Stream(Box<dyn BufRead + Send>),
}

impl CaptureInput {
    /// Open and decode a capture file
    pub fn open_file(path: &Path, encoding: InputEncoding) -> ReaderResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::Replay(Cursor::new(decode_text(&bytes, encoding)?)))
    }

    /// Build a replayable input from capture text already in memory
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::Replay(Cursor::new(text.into()))
    }

    /// Wrap the output of a live capture process
    #[must_use]
    pub fn from_stream(reader: impl BufRead + Send + 'static) -> Self {
        Self::Stream(Box::new(reader))
    }

    fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let n = match self {
            Self::Replay(cursor) => cursor.read_line(&mut line)?,
            Self::Stream(reader) => reader.read_line(&mut line)?,
        };
        if n == 0 { Ok(None) } else { Ok(Some(line)) }
    }

    /// Rewind to the start of the capture. Returns false for live streams.
    fn rewind(&mut self) -> bool {
        match self {
            Self::Replay(cursor) => {
                cursor.set_position(0);
                true
            }
            Self::Stream(_) => false,
        }
    }
}

/// One framed packet record from the capture
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    /// Seconds since the previous captured frame
    pub delta_time: f64,
    /// UDP destination port
    pub to_port: u16,
    /// UDP source port. Replies come from the controller's ports.
    pub from_port: u16,
    /// Raw payload bytes, still swizzled and checksum-prefixed
    pub payload: Vec<u8>,
    /// The capture line the record was parsed from
    pub line: String,
}

impl CaptureRecord {
    fn parse(line: &str, number: u64) -> ReaderResult<Self> {
        let malformed = |reason: String| ReaderError::MalformedRecord {
            line: number,
            reason,
        };

        let trimmed = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = trimmed.split('\t').collect();
        let [delta_time, ports, udp_length, payload_hex] = fields.as_slice() else {
            return Err(malformed(format!(
                "expected 4 tab-separated fields, found {}",
                fields.len()
            )));
        };

        let delta_time: f64 = delta_time
            .trim()
            .parse()
            .map_err(|_| malformed(format!("bad time delta {delta_time:?}")))?;

        let (to_port, from_port) = ports
            .split_once(',')
            .and_then(|(to, from)| Some((to.trim().parse().ok()?, from.trim().parse().ok()?)))
            .ok_or_else(|| malformed(format!("bad port pair {ports:?}")))?;

        let udp_length: usize = udp_length
            .trim()
            .parse()
            .map_err(|_| malformed(format!("bad UDP length {udp_length:?}")))?;
        let expected = udp_length
            .checked_sub(UDP_HEADER_LEN)
            .ok_or_else(|| malformed(format!("UDP length {udp_length} shorter than its header")))?;

        let payload = util::from_hex(payload_hex.trim())
            .ok_or_else(|| malformed(format!("payload is not hex: {payload_hex:?}")))?;
        if payload.len() != expected {
            return Err(ReaderError::LengthMismatch {
                line: number,
                udp: expected,
                payload: payload.len(),
            });
        }

        Ok(Self {
            delta_time,
            to_port,
            from_port,
            payload,
            line: trimmed.to_string(),
        })
    }

    /// True when the packet came from the controller
    #[must_use]
    pub fn is_reply(&self) -> bool {
        CONTROLLER_REPLY_PORTS.contains(&self.from_port)
    }

    /// True when the payload is swizzled (sent to a controller listen port)
    #[must_use]
    pub fn is_swizzled(&self) -> bool {
        CONTROLLER_LISTEN_PORTS.contains(&self.to_port)
    }
}

/// Reads and parses capture records one line at a time
pub struct DumpReader {
    input: CaptureInput,
    line_number: u64,
}

impl DumpReader {
    /// Create a reader over a capture input
    #[must_use]
    pub fn new(input: CaptureInput) -> Self {
        Self {
            input,
            line_number: 0,
        }
    }

    /// Number of the last record read (1-based)
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Read the next record. `None` at end of the capture.
    ///
    /// Blank lines are skipped. A malformed line is an error, not a skip:
    /// the capture format guarantees line atomicity, so anything unparseable
    /// means the input is not a tshark dump of a Ruida UDP session.
    pub fn next_record(&mut self) -> ReaderResult<Option<CaptureRecord>> {
        loop {
            let Some(line) = self.input.next_line()? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            self.line_number += 1;
            return CaptureRecord::parse(&line, self.line_number).map(Some);
        }
    }

    /// Rewind to the start of the capture.
    ///
    /// Returns false (and leaves the position unchanged) for live streams.
    pub fn rewind(&mut self) -> bool {
        if self.input.rewind() {
            self.line_number = 0;
            true
        } else {
            false
        }
    }
}
