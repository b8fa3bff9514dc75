//! Host/controller acknowledgement tracking.
//!
//! The transport is UDP with no sequence numbers. Every host packet expects
//! a single-byte acknowledgement, but the host may pipeline packets ahead of
//! them. The tracker counts outstanding acknowledgements so sustained
//! pipelining (a common source of hard-to-diagnose timing trouble) can be
//! surfaced without treating it as fatal.

use derive_more::Display;

use rpa_decoder::protocol::{ACK, ENQ, ERR, NAK};

/// Outstanding-acknowledgement depth above which pipelining draws a warning
const PIPELINE_WARN_THRESHOLD: u64 = 4;

/// Classification of a single-byte reply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum HandshakeKind {
    /// Positive acknowledgement
    #[display("ACK")]
    Ack,
    /// Negative acknowledgement; the host will resend
    #[display("NAK")]
    Nak,
    /// Keepalive enquiry
    #[display("ENQ")]
    Enq,
    /// Controller-side error
    #[display("ERR")]
    Err,
    /// Anything else is a protocol anomaly
    #[display("0x{_0:02X}")]
    Unknown(u8),
}

impl HandshakeKind {
    /// Classify a handshake byte
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            ACK => Self::Ack,
            NAK => Self::Nak,
            ENQ => Self::Enq,
            ERR => Self::Err,
            other => Self::Unknown(other),
        }
    }
}

/// Counts acknowledgements the controller still owes the host
#[derive(Debug, Default)]
pub struct HandshakeTracker {
    acks_expected: u64,
    pipeline_warned: bool,
}

impl HandshakeTracker {
    /// Create a tracker with nothing outstanding
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledgements currently outstanding
    #[must_use]
    pub fn acks_expected(&self) -> u64 {
        self.acks_expected
    }

    /// Account one host packet. Returns true when the pipelining depth just
    /// crossed the warning threshold; the warning latches until the
    /// controller catches up.
    pub fn on_host_packet(&mut self) -> bool {
        self.acks_expected += 1;
        if self.acks_expected > PIPELINE_WARN_THRESHOLD && !self.pipeline_warned {
            self.pipeline_warned = true;
            return true;
        }
        false
    }

    /// Account one single-byte reply.
    ///
    /// Returns the classification and whether an ACK arrived with none
    /// outstanding. The counter never goes negative; NAK/ENQ/ERR leave it
    /// unchanged (a NAK means the host will resend).
    pub fn on_handshake(&mut self, byte: u8) -> (HandshakeKind, bool) {
        let kind = HandshakeKind::from_byte(byte);
        let mut unexpected_ack = false;
        if kind == HandshakeKind::Ack {
            if self.acks_expected == 0 {
                unexpected_ack = true;
            } else {
                self.acks_expected -= 1;
                if self.acks_expected == 0 {
                    self.pipeline_warned = false;
                }
            }
        }
        (kind, unexpected_ack)
    }
}
