//! Decode loop for Ruida UDP captures.
//!
//! Pulls deswizzled bytes from a [`PacketStream`], reports each packet
//! (interval, raw dumps, checksum, handshake accounting) and feeds
//! non-handshake bytes to the [`Decoder`]. Decoded lines go to the
//! [`Emit`] sink; command observers receive their callbacks from the
//! decoder directly.
//!
//! The loop is single threaded and cooperative: one producer (the packet
//! stream), one consumer (the decoder), both advanced here, in record
//! order.

mod error;
mod handshake;

pub use crate::error::AnalyzerError;
pub use crate::handshake::{HandshakeKind, HandshakeTracker};

use rpa_capture_reader::{PacketStream, StreamStats};
use rpa_decoder::Decoder;
use rpa_decoder::command_handler::HandleCommand;
use rpa_decoder::emit::{Direction, Emit};

/// Totals for one decoded capture
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    /// Per-direction packet and byte counts
    pub stats: StreamStats,
    /// Commands decoded
    pub commands: u64,
    /// Acknowledgements still outstanding at end of stream. Non-zero means
    /// the capture ended mid-conversation.
    pub acks_outstanding: u64,
}

/// Drives one capture through the decoder
pub struct Analyzer<'a, E: Emit, H: HandleCommand> {
    stream: PacketStream,
    parser: Decoder,
    tracker: HandshakeTracker,
    out: &'a mut E,
    handler: &'a mut H,
}

impl<'a, E: Emit, H: HandleCommand> Analyzer<'a, E, H> {
    /// Create an analyzer over a packet stream.
    ///
    /// The stream's magic should already be pinned or discovered via
    /// [`PacketStream::init_magic`]; otherwise discovery happens on the
    /// first byte.
    pub fn new(stream: PacketStream, out: &'a mut E, handler: &'a mut H) -> Self {
        Self {
            stream,
            parser: Decoder::new(),
            tracker: HandshakeTracker::new(),
            out,
            handler,
        }
    }

    /// Report a freshly loaded packet: numbering, interval, dumps, checksum
    /// and the acknowledgement handshake.
    fn report_packet(&mut self) -> Result<(), AnalyzerError<H>> {
        let Some(packet) = self.stream.packet() else {
            return Ok(());
        };
        self.out.set_packet(packet.number);
        self.out.set_direction(if packet.reply {
            Direction::FromController
        } else {
            Direction::ToController
        });
        self.out
            .reader(&format!("Interval:{:.6}S", packet.delta_time));
        self.out.raw(&packet.raw_line)?;
        self.out.unswizzled(&packet.payload_hex());
        if !packet.checksum_ok {
            self.out.error("Checksum mismatch")?;
        }

        // The ack/nak handshake. All packets from the host require an
        // ack/nak from the controller; the host should wait for it before
        // sending another packet but is not required to.
        let message = if packet.reply {
            if packet.handshake {
                let byte = packet.data.first().copied().unwrap_or_default();
                let (kind, unexpected_ack) = self.tracker.on_handshake(byte);
                if let HandshakeKind::Unknown(byte) = kind {
                    self.out
                        .error(&format!("Unexpected reply byte {byte:#04X}"))?;
                }
                if unexpected_ack {
                    self.out.warn("ACK received when none were outstanding");
                }
                kind.to_string()
            } else {
                "Reply data".to_string()
            }
        } else {
            if self.tracker.on_host_packet() {
                self.out.warn(&format!(
                    "host is {} packets ahead of acknowledgements",
                    self.tracker.acks_expected()
                ));
            }
            "Expecting ACK".to_string()
        };
        self.out.reader(&format!(
            "SHK:{:03}:{message}",
            self.tracker.acks_expected()
        ));
        Ok(())
    }

    /// Step through each byte of the input stream and decode each packet.
    ///
    /// Returns the session totals at end of stream. Handshake bytes are
    /// accounted but never reach the command parser.
    pub fn run(&mut self) -> Result<Summary, AnalyzerError<H>> {
        loop {
            let Some(byte) = self.stream.next_byte()? else {
                break;
            };
            if self.stream.new_packet() {
                self.report_packet()?;
            }
            let Some(packet) = self.stream.packet() else {
                continue;
            };
            if packet.handshake {
                continue;
            }
            let is_reply = packet.reply;
            let remaining = self.stream.remaining();
            if let Some(line) =
                self.parser
                    .step(byte, is_reply, remaining, &mut *self.out, &mut *self.handler)?
            {
                self.out.set_command(self.parser.cmd_id());
                self.out.parser(&line)?;
            }
        }

        let stats = self.stream.stats();
        let acks_outstanding = self.tracker.acks_expected();
        if acks_outstanding != 0 {
            self.out.warn(&format!(
                "{acks_outstanding} acknowledgements still outstanding at end of capture"
            ));
        }
        self.out.set_direction(Direction::Internal);
        self.out.info(&format!(
            "host: {} packets / {} bytes, controller: {} packets / {} bytes, {} commands",
            stats.host_packets,
            stats.host_bytes,
            stats.reply_packets,
            stats.reply_bytes,
            self.parser.cmd_id()
        ));
        Ok(Summary {
            stats,
            commands: self.parser.cmd_id(),
            acks_outstanding,
        })
    }
}
