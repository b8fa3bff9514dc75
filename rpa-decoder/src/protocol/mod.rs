//! Static description of the Ruida command set.
//!
//! The protocol is a hierarchical opcode dictionary: a command byte (bit 7
//! set) selects a node which is either a bare label, a sub-opcode table one
//! level deep, or a parameter list. The tables themselves live in
//! [`tables`]; this module defines the node and parameter model they are
//! built from.

pub mod tables;

use derive_more::Display;

/// Set on the first byte of a command; never set on parameter or data bytes
pub const CMD_MASK: u8 = 0x80;

/// Positive acknowledgement handshake byte
pub const ACK: u8 = 0xCC;
/// Error handshake byte
pub const ERR: u8 = 0xCD;
/// Keepalive enquiry handshake byte
pub const ENQ: u8 = 0xCE;
/// Negative acknowledgement handshake byte
pub const NAK: u8 = 0xCF;

/// Bit of the rapid-move option byte that selects the current head position
/// as the movement origin instead of the stored origin
pub const ORIGIN_HOME: u8 = 0x02;

/// One node of an opcode table
#[derive(Clone, Copy)]
pub enum Node {
    /// Terminal opcode with no parameters; emits just the label
    Label(&'static str),
    /// Sub-opcode dictionary, indexed by the next byte
    Table(&'static [(u8, Node)]),
    /// Opcode with an ordered parameter list
    Spec(&'static CommandSpec),
}

/// A labeled command and its parameter list
pub struct CommandSpec {
    /// Line prefix for the decoded output
    pub label: &'static str,
    /// Ordered parameter positions
    pub params: &'static [Param],
}

/// One position of a parameter list
pub enum Param {
    /// A value decoded from the byte stream
    Prim(PrimSpec),
    /// Action marker: the specs that follow decode from reply packets
    Reply,
}

/// How one parameter is captured and rendered
#[derive(Clone, Copy, Debug)]
pub struct PrimSpec {
    /// Name used as the output prefix
    pub name: &'static str,
    /// Value transform and render style
    pub kind: DecoderKind,
    /// Wire representation
    pub ty: PrimType,
}

/// Wire representation of a parameter.
///
/// All data bytes are 7 bit. Multi-byte integers concatenate 7 bits per
/// byte, most significant first; the signed forms use bit 6 of the first
/// byte as the sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimType {
    /// One byte, zero/non-zero
    Bool7,
    /// One byte, signed
    Int7,
    /// One byte, unsigned
    Uint7,
    /// Two bytes, signed
    Int14,
    /// Two bytes, unsigned
    Uint14,
    /// Five bytes, signed
    Int35,
    /// Five bytes, unsigned
    Uint35,
    /// 7-bit characters up to a 0x00 terminator
    CString,
    /// Two bytes naming a controller memory address; decoding one arms the
    /// memory-reply chain
    MtAddr,
    /// Unknown shape: capture to the end of the current packet
    Tbd,
}

impl PrimType {
    /// Fixed byte count, or `None` for terminator/packet-delimited types
    #[must_use]
    pub fn bytes(self) -> Option<usize> {
        match self {
            Self::Bool7 | Self::Int7 | Self::Uint7 => Some(1),
            Self::Int14 | Self::Uint14 | Self::MtAddr => Some(2),
            Self::Int35 | Self::Uint35 => Some(5),
            Self::CString | Self::Tbd => None,
        }
    }
}

/// Transform applied to the captured bytes before rendering
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderKind {
    /// Zero/non-zero flag
    Bool,
    /// Plain signed integer
    Int,
    /// Plain unsigned integer
    Uint,
    /// Distance in micrometers
    Um,
    /// Laser power: 14-bit field scaled to percent
    Power,
    /// Speed in mm/s (value is thousandths)
    Speed,
    /// Frequency in kHz (value is thousandths)
    Frequency,
    /// Time in ms (value is thousandths)
    TimeMs,
    /// Rapid-move origin/light option
    RapidOption,
    /// ON/OFF switch
    OnOff,
    /// NUL-terminated text
    CString,
    /// Controller memory address
    MtAddr,
    /// Unknown: raw hex dump
    Tbd,
}

/// Origin and light options of the rapid move commands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum RapidOption {
    /// Move relative to the stored origin
    #[display("ORIGIN")]
    Origin,
    /// Stored origin, light on
    #[display("LIGHT_ORIGIN")]
    LightOrigin,
    /// Move relative to the current head position
    #[display("NONE")]
    None,
    /// Current head position, light on
    #[display("LIGHT")]
    Light,
}

impl RapidOption {
    /// Decode the option byte; values above 3 are a protocol error
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Origin),
            1 => Some(Self::LightOrigin),
            2 => Some(Self::None),
            3 => Some(Self::Light),
            _ => None,
        }
    }
}

/// A controller memory address with a known label and reply shape
pub struct MemoryEntry {
    /// Human name of the setting
    pub label: &'static str,
    /// How the reply value decodes
    pub reply: PrimSpec,
}

/// Look up a byte in an opcode table. Tables are sorted by key.
#[must_use]
pub fn lookup(table: &'static [(u8, Node)], key: u8) -> Option<&'static Node> {
    table
        .binary_search_by_key(&key, |(k, _)| *k)
        .ok()
        .map(|index| &table[index].1)
}

/// Resolve a memory address to its reply shape.
///
/// Unknown addresses fall back to the generic hex-dump entry so data
/// discovery still shows the bytes.
#[must_use]
pub fn memory_entry(msb: u8, lsb: u8) -> &'static MemoryEntry {
    tables::MT
        .binary_search_by_key(&msb, |(k, _)| *k)
        .ok()
        .and_then(|index| {
            let inner = tables::MT[index].1;
            inner
                .binary_search_by_key(&lsb, |(k, _)| *k)
                .ok()
                .map(|inner_index| &inner[inner_index].1)
        })
        .unwrap_or(&tables::UNKNOWN_ADDRESS)
}
