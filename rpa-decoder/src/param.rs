//! Parameter and reply sub-decoder.
//!
//! A single-state machine run below the command parser: prime it with a
//! [`PrimSpec`], feed it one byte at a time, and it returns the formatted
//! value once the declared byte count (or terminator, or packet end) has
//! been reached.

use thiserror::Error;

use crate::protocol::{CMD_MASK, DecoderKind, PrimSpec, PrimType, RapidOption};

/// Scale between the 14-bit power field and percent
const POWER_SCALE: f64 = 0x4000 as f64 / 100.0;

/// Scale between raw speed/frequency/time fields and their display units
const MILLI_SCALE: f64 = 1000.0;

/// Encode bytes as lowercase hex
pub(crate) fn to_hex(data: &[u8]) -> String {
    use core::fmt::Write;

    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// A decoded parameter value, kept for command observers
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer (micrometers for distances)
    Int(i64),
    /// Unsigned integer (also rapid options and memory addresses)
    Uint(u64),
    /// Scaled value (percent, mm/s, kHz, ms)
    Float(f64),
    /// Decoded text
    Text(String),
    /// Undecoded bytes
    Raw(Vec<u8>),
}

impl DecodedValue {
    /// Numeric view of the value, if it has one
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Uint(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) | Self::Raw(_) => None,
        }
    }

    /// Unsigned view of the value, if it has one
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

/// One decoded parameter: display text plus the raw value
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Formatted `Name=value` text for the decode line
    pub text: String,
    /// The value itself
    pub value: DecodedValue,
}

/// Error in the incoming parameter data
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    /// Command byte arrived where data was expected
    #[error("datum {0:#04X} should not have bit 7 set")]
    CommandByte(u8),
    /// Rapid-move option outside the defined range
    #[error("rapid-move option {0:#04X} out of range")]
    InvalidOption(u8),
    /// The decoder was stepped without being primed. Indicates a parser
    /// state bug, not bad input.
    #[error("parameter decoder stepped while not primed")]
    NotPrimed,
}

fn to_uint(data: &[u8]) -> u64 {
    data.iter()
        .fold(0u64, |value, byte| (value << 7) | u64::from(*byte))
}

fn to_int(data: &[u8]) -> i64 {
    let Some((first, rest)) = data.split_first() else {
        return 0;
    };
    let negative = first & 0x40 != 0;
    let magnitude = rest
        .iter()
        .fold(u64::from(first & 0x3F), |value, byte| {
            (value << 7) | u64::from(*byte)
        });
    let magnitude = magnitude as i64;
    if negative { -magnitude } else { magnitude }
}

fn decode(spec: &PrimSpec, data: &[u8]) -> Result<Decoded, ParamError> {
    let name = spec.name;
    let first = data.first().copied().unwrap_or(0);
    let decoded = match spec.kind {
        DecoderKind::Bool => {
            let value = first != 0;
            Decoded {
                text: format!("{name}={value}"),
                value: DecodedValue::Bool(value),
            }
        }
        DecoderKind::Uint => {
            let value = to_uint(data);
            Decoded {
                text: format!("{name}={value}"),
                value: DecodedValue::Uint(value),
            }
        }
        DecoderKind::Int => {
            let value = to_int(data);
            Decoded {
                text: format!("{name}={value}"),
                value: DecodedValue::Int(value),
            }
        }
        DecoderKind::Um => {
            let value = to_int(data);
            Decoded {
                text: format!("{name}={value}um"),
                value: DecodedValue::Int(value),
            }
        }
        DecoderKind::Power => {
            let value = to_uint(data) as f64 / POWER_SCALE;
            Decoded {
                text: format!("{name}:{value:.6}%"),
                value: DecodedValue::Float(value),
            }
        }
        DecoderKind::Speed => {
            let value = to_int(data) as f64 / MILLI_SCALE;
            Decoded {
                text: format!("{name}:{value:.3}mm/S"),
                value: DecodedValue::Float(value),
            }
        }
        DecoderKind::Frequency => {
            let value = to_int(data) as f64 / MILLI_SCALE;
            Decoded {
                text: format!("{name}:{value:.3}kHz"),
                value: DecodedValue::Float(value),
            }
        }
        DecoderKind::TimeMs => {
            let value = to_int(data) as f64 / MILLI_SCALE;
            Decoded {
                text: format!("{name}:{value:.3}mS"),
                value: DecodedValue::Float(value),
            }
        }
        DecoderKind::RapidOption => {
            let option =
                RapidOption::from_byte(first).ok_or(ParamError::InvalidOption(first))?;
            Decoded {
                text: format!("{name}:{option}"),
                value: DecodedValue::Uint(u64::from(first)),
            }
        }
        DecoderKind::OnOff => {
            let on = first != 0;
            Decoded {
                text: format!("{name}:{}", if on { " ON" } else { "OFF" }),
                value: DecodedValue::Bool(on),
            }
        }
        DecoderKind::CString => {
            let text: String = data
                .iter()
                .take_while(|byte| **byte != 0)
                .map(|byte| char::from(*byte))
                .collect();
            Decoded {
                text: format!("{name}='{text}'"),
                value: DecodedValue::Text(text),
            }
        }
        DecoderKind::MtAddr => {
            let address =
                (u64::from(first) << 8) | u64::from(data.get(1).copied().unwrap_or(0));
            Decoded {
                text: format!("{name}:{address:04X}"),
                value: DecodedValue::Uint(address),
            }
        }
        DecoderKind::Tbd => Decoded {
            text: format!("{name}:{}", to_hex(data)),
            value: DecodedValue::Raw(data.to_vec()),
        },
    };
    Ok(decoded)
}

/// Accumulates one parameter's bytes per its [`PrimSpec`]
#[derive(Debug, Default)]
pub struct ParamDecoder {
    spec: Option<&'static PrimSpec>,
    data: Vec<u8>,
    whole_packet: bool,
}

impl ParamDecoder {
    /// Prime for the next parameter.
    ///
    /// With `whole_packet` the capture ends with the current packet instead
    /// of at the type's own length; `Tbd`-typed specs always capture that
    /// way.
    pub fn prime(&mut self, spec: &'static PrimSpec, whole_packet: bool) {
        log::trace!("priming {:?}", spec);
        self.spec = Some(spec);
        self.data.clear();
        self.whole_packet = whole_packet || spec.ty == PrimType::Tbd;
    }

    /// Forget any partial accumulation
    pub fn reset(&mut self) {
        self.spec = None;
        self.data.clear();
        self.whole_packet = false;
    }

    /// True when no parameter is primed or partially accumulated
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.spec.is_none() && self.data.is_empty()
    }

    /// Accumulate one byte. `remaining` is the number of unread bytes left
    /// in the current packet after this one.
    ///
    /// Returns the decoded parameter once capture completes, `None` while
    /// still accumulating.
    pub fn step(&mut self, datum: u8, remaining: usize) -> Result<Option<Decoded>, ParamError> {
        let Some(spec) = self.spec else {
            return Err(ParamError::NotPrimed);
        };
        if datum & CMD_MASK != 0 {
            return Err(ParamError::CommandByte(datum));
        }
        self.data.push(datum);

        let complete = if self.whole_packet {
            remaining == 0
        } else {
            match spec.ty.bytes() {
                Some(count) => self.data.len() >= count,
                // CString runs to its terminator
                None => datum == 0,
            }
        };
        if !complete {
            return Ok(None);
        }

        let decoded = decode(spec, &self.data)?;
        self.reset();
        Ok(Some(decoded))
    }
}
