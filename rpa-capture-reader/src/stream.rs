//! Linear byte stream over deswizzled packets.
//!
//! The decoder only needs [`PacketStream::next_byte`]; packet boundaries,
//! checksum stripping and deswizzling are handled internally. The caller
//! checks [`PacketStream::new_packet`] and the loaded packet's flags to
//! classify handshakes and replies.

use crate::error::ReaderResult;
use crate::{DumpReader, ReaderError, swizzle, util};

/// How many non-matching single-byte replies to tolerate while scanning for
/// the magic before giving up
const MAGIC_SCAN_TRIES: u32 = 4;

/// One packet with transport framing removed and payload deswizzled
#[derive(Debug, Clone)]
pub struct LoadedPacket {
    /// Packet number (capture record number, 1-based)
    pub number: u64,
    /// Seconds since the previous captured frame
    pub delta_time: f64,
    /// True when the packet came from the controller
    pub reply: bool,
    /// True when the payload was swizzled on the wire
    pub swizzled: bool,
    /// True for a single-byte reply (ACK/NAK/ENQ/ERR)
    pub handshake: bool,
    /// Checksum verification result. Replies carry no checksum and are
    /// always considered valid.
    pub checksum_ok: bool,
    /// Deswizzled payload, checksum stripped
    pub data: Vec<u8>,
    /// The capture line the packet came from
    pub raw_line: String,
}

impl LoadedPacket {
    /// Deswizzled payload as lowercase hex
    #[must_use]
    pub fn payload_hex(&self) -> String {
        util::to_hex(&self.data)
    }
}

/// Per-direction traffic totals
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamStats {
    /// Packets sent from the host to the controller
    pub host_packets: u64,
    /// Payload bytes sent from the host to the controller
    pub host_bytes: u64,
    /// Reply packets from the controller
    pub reply_packets: u64,
    /// Payload bytes received from the controller
    pub reply_bytes: u64,
}

/// Byte stream over the capture's deswizzled packets
pub struct PacketStream {
    reader: DumpReader,
    magic: Option<u8>,
    packet: Option<LoadedPacket>,
    take: usize,
    new_packet: bool,
    stats: StreamStats,
}

impl PacketStream {
    /// Create a stream over the given record reader
    #[must_use]
    pub fn new(reader: DumpReader) -> Self {
        Self {
            reader,
            magic: None,
            packet: None,
            take: 0,
            new_packet: false,
            stats: StreamStats::default(),
        }
    }

    /// The swizzle magic in use, once pinned or discovered
    #[must_use]
    pub fn magic(&self) -> Option<u8> {
        self.magic
    }

    /// Traffic totals so far
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// The packet the stream is currently reading from
    #[must_use]
    pub fn packet(&self) -> Option<&LoadedPacket> {
        self.packet.as_ref()
    }

    /// True when the byte just returned was the first of a new packet
    #[must_use]
    pub fn new_packet(&self) -> bool {
        self.new_packet
    }

    /// Unread bytes left in the current packet
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.packet
            .as_ref()
            .map_or(0, |packet| packet.data.len() - self.take)
    }

    /// Pin the magic, or discover it by scanning the capture for a known raw
    /// acknowledgement byte.
    ///
    /// Discovery rewinds the capture first and replays it from the start
    /// afterwards. A live stream cannot rewind; the packets consumed during
    /// discovery are skipped there.
    pub fn init_magic(&mut self, pinned: Option<u8>) -> ReaderResult<()> {
        if let Some(magic) = pinned {
            log::debug!("using magic: {magic:#04x}");
            self.magic = Some(magic);
            return Ok(());
        }

        self.reader.rewind();
        let mut tries = MAGIC_SCAN_TRIES;
        let magic = loop {
            let Some(record) = self.reader.next_record()? else {
                return Err(ReaderError::MagicNotFound);
            };
            // Only the controller's own handshake bytes identify the family.
            if record.from_port != 40200 || record.payload.len() != 1 {
                continue;
            }
            if let Some(magic) = swizzle::magic_for_raw_ack(record.payload[0]) {
                break magic;
            }
            if tries == 0 {
                return Err(ReaderError::MagicNotFound);
            }
            tries -= 1;
        };
        if !self.reader.rewind() {
            log::info!("input stream cannot rewind; packets read during magic discovery are lost");
        }
        log::debug!("detected magic: {magic:#04x}");
        self.magic = Some(magic);
        Ok(())
    }

    fn load_packet(&mut self, magic: u8) -> ReaderResult<bool> {
        let Some(record) = self.reader.next_record()? else {
            return Ok(false);
        };

        let reply = record.is_reply();
        let swizzled = record.is_swizzled();

        // Host payloads are prefixed with a big-endian 16-bit checksum over
        // the rest of the payload. The checksum bytes are never swizzled.
        // Replies carry no checksum.
        let (data, checksum_ok) = if reply {
            (record.payload.clone(), true)
        } else if let [hi, lo, data @ ..] = record.payload.as_slice() {
            let declared = u16::from_be_bytes([*hi, *lo]);
            (data.to_vec(), declared == swizzle::checksum(data))
        } else {
            // Shorter than the checksum prefix; nothing left to verify.
            (Vec::new(), true)
        };

        // Reply payloads are plain, with one exception: the controller
        // swizzles its single-byte handshake (the wire ACK 0xC6 is the
        // swizzled form of 0xCC under magic 0x88, which is also what makes
        // magic discovery work). Deswizzle it so the handshake dispatch sees
        // the plain ACK/NAK/ENQ/ERR values.
        let data = if swizzled || (reply && data.len() == 1) {
            data.iter()
                .map(|byte| swizzle::deswizzle_byte(*byte, magic))
                .collect()
        } else {
            data
        };

        let handshake = reply && data.len() == 1;
        if reply {
            self.stats.reply_packets += 1;
            self.stats.reply_bytes += data.len() as u64;
        } else {
            self.stats.host_packets += 1;
            self.stats.host_bytes += data.len() as u64;
        }

        self.packet = Some(LoadedPacket {
            number: self.reader.line_number(),
            delta_time: record.delta_time,
            reply,
            swizzled,
            handshake,
            checksum_ok,
            data,
            raw_line: record.line,
        });
        self.take = 0;
        Ok(true)
    }

    /// Return the next deswizzled payload byte, pulling packets as needed.
    ///
    /// `None` at the end of the capture. Discovers the magic on first use if
    /// it has not been pinned.
    pub fn next_byte(&mut self) -> ReaderResult<Option<u8>> {
        if self.magic.is_none() {
            self.init_magic(None)?;
        }
        let Some(magic) = self.magic else {
            return Err(ReaderError::MagicNotFound);
        };

        self.new_packet = false;
        loop {
            if let Some(packet) = &self.packet {
                if self.take < packet.data.len() {
                    let byte = packet.data[self.take];
                    self.take += 1;
                    return Ok(Some(byte));
                }
            }
            if !self.load_packet(magic)? {
                return Ok(None);
            }
            self.new_packet = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureInput;

    const MAGIC: u8 = 0x88;

    fn host_line(payload: &[u8]) -> String {
        let swizzled: Vec<u8> = payload
            .iter()
            .map(|byte| swizzle::swizzle_byte(*byte, MAGIC))
            .collect();
        let mut framed = swizzle::checksum(&swizzled).to_be_bytes().to_vec();
        framed.extend_from_slice(&swizzled);
        format!(
            "0.000100\t50200,52413\t{}\t{}",
            framed.len() + 8,
            util::to_hex(&framed)
        )
    }

    fn reply_line(payload: &[u8]) -> String {
        format!(
            "0.000100\t52413,40200\t{}\t{}",
            payload.len() + 8,
            util::to_hex(payload)
        )
    }

    fn stream_over(lines: &[String]) -> PacketStream {
        PacketStream::new(DumpReader::new(CaptureInput::from_text(lines.join("\n"))))
    }

    #[test]
    fn discovers_magic_and_replays_from_start() {
        let mut stream = stream_over(&[host_line(&[0xD7]), reply_line(&[0xC6])]);
        stream.init_magic(None).unwrap();
        assert_eq!(stream.magic(), Some(0x88));
        // The first byte must come from the first packet again.
        assert_eq!(stream.next_byte().unwrap(), Some(0xD7));
    }

    #[test]
    fn magic_discovery_fails_on_unknown_candidates() {
        let lines: Vec<String> = (0..6).map(|_| reply_line(&[0x55])).collect();
        let mut stream = stream_over(&lines);
        assert!(matches!(
            stream.init_magic(None),
            Err(ReaderError::MagicNotFound)
        ));
    }

    #[test]
    fn magic_discovery_fails_at_eof() {
        let mut stream = stream_over(&[host_line(&[0xD7])]);
        assert!(matches!(
            stream.init_magic(None),
            Err(ReaderError::MagicNotFound)
        ));
    }

    #[test]
    fn streams_bytes_across_packets_with_boundaries() {
        // Wire ACK is the swizzled 0xCC.
        let wire_ack = swizzle::swizzle_byte(0xCC, MAGIC);
        assert_eq!(wire_ack, 0xC6);
        let mut stream = stream_over(&[host_line(&[0x88, 0x01, 0x02]), reply_line(&[wire_ack])]);
        stream.init_magic(Some(MAGIC)).unwrap();

        assert_eq!(stream.next_byte().unwrap(), Some(0x88));
        assert!(stream.new_packet());
        assert_eq!(stream.remaining(), 2);

        assert_eq!(stream.next_byte().unwrap(), Some(0x01));
        assert!(!stream.new_packet());
        assert_eq!(stream.next_byte().unwrap(), Some(0x02));
        assert_eq!(stream.remaining(), 0);

        // The handshake byte surfaces deswizzled.
        assert_eq!(stream.next_byte().unwrap(), Some(0xCC));
        assert!(stream.new_packet());
        let packet = stream.packet().unwrap();
        assert!(packet.reply);
        assert!(packet.handshake);

        assert_eq!(stream.next_byte().unwrap(), None);
        let stats = stream.stats();
        assert_eq!(stats.host_packets, 1);
        assert_eq!(stats.host_bytes, 3);
        assert_eq!(stats.reply_packets, 1);
        assert_eq!(stats.reply_bytes, 1);
    }

    #[test]
    fn checksum_mismatch_is_flagged_not_fatal() {
        let mut line = host_line(&[0xD7]);
        // Corrupt the checksum prefix (first payload hex byte).
        let tab = line.rfind('\t').unwrap();
        line.replace_range(tab + 1..tab + 3, "ee");
        let mut stream = stream_over(&[line]);
        stream.init_magic(Some(MAGIC)).unwrap();

        assert_eq!(stream.next_byte().unwrap(), Some(0xD7));
        assert!(!stream.packet().unwrap().checksum_ok);
    }

    #[test]
    fn short_host_payload_has_no_checksum_to_verify() {
        let line = format!("0.0\t50200,52413\t9\t{}", util::to_hex(&[0x42]));
        let mut stream = stream_over(&[line]);
        stream.init_magic(Some(MAGIC)).unwrap();

        assert_eq!(stream.next_byte().unwrap(), None);
        // The packet was still consumed and counted.
        assert_eq!(stream.stats().host_packets, 1);
        assert_eq!(stream.stats().host_bytes, 0);
    }

    #[test]
    fn replies_are_not_deswizzled() {
        let mut stream = stream_over(&[reply_line(&[0xDA, 0x01, 0x00, 0x26])]);
        stream.init_magic(Some(MAGIC)).unwrap();
        assert_eq!(stream.next_byte().unwrap(), Some(0xDA));
        assert_eq!(stream.next_byte().unwrap(), Some(0x01));
        assert!(!stream.packet().unwrap().swizzled);
    }
}
