//! Output sink contract for the decode stream.
//!
//! Every line of the decode stream carries a
//! `pkt:cmd:msg:channel:dir:payload` prefix. Emitters own the numbering
//! state; [`MessageHeader`] does the formatting so console, file and buffer
//! emitters produce identical lines.
//!
//! Emitter calls that can legitimately end the decode (operator pause
//! answered with `quit`, strict-mode errors, fatal conditions) surface an
//! [`EmitSignal`] instead of raising; everything else returns unit and the
//! decode continues.

use derive_more::Display;
use thiserror::Error;

/// Direction tag of emitted lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum Direction {
    /// Host to controller
    #[display("-->")]
    ToController,
    /// Controller to host
    #[display("<--")]
    FromController,
    /// Not tied to a packet direction
    #[default]
    #[display("---")]
    Internal,
}

/// Signal raised by an emitter to unwind the decode loop
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitSignal {
    /// The operator asked to quit. Not an error; exits with status 0.
    #[error("exiting at user request")]
    Interrupted,
    /// Decode must stop (fatal condition, or any error in strict mode)
    #[error("stopping: {0}")]
    Stopped(String),
}

/// Output channel of a decode-stream line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// Packet information from the reader (`PRT:RDR`)
    Reader,
    /// Decoded protocol messages (`PRT:PRS`)
    Parser,
    /// Errors in the incoming stream (`PRT:ERR`)
    Error,
    /// Uncorrectable stream errors (`PRT:FTL`)
    Fatal,
    /// Raw or unswizzled data dumps (`PRT:raw`)
    Raw,
    /// Verbose chatter (`vrb`)
    Verbose,
    /// Analyzer information (`INT:INF`)
    Info,
    /// Correctable anomalies (`INT:WRN`)
    Warn,
    /// Errors the decode survives (`INT:CRT`)
    Critical,
    /// Protocol table malformation (`INT:FTL`)
    TableFatal,
}

impl Channel {
    fn tag(self, direction: Direction) -> String {
        match self {
            Self::Reader => format!("PRT:RDR:{direction}"),
            Self::Parser => format!("PRT:PRS:{direction}"),
            Self::Error => format!("PRT:ERR:{direction}"),
            Self::Fatal => format!("PRT:FTL:{direction}"),
            Self::Raw => format!("PRT:raw:{direction}"),
            Self::Verbose => "vrb".to_string(),
            Self::Info => "INT:INF".to_string(),
            Self::Warn => "INT:WRN".to_string(),
            Self::Critical => "INT:CRT".to_string(),
            Self::TableFatal => "INT:FTL".to_string(),
        }
    }
}

/// Line numbering shared by emitter implementations.
///
/// `msg` restarts at 1 with every new command.
#[derive(Debug, Default)]
pub struct MessageHeader {
    pkt_n: u64,
    cmd_n: u64,
    msg_n: u64,
    direction: Direction,
}

impl MessageHeader {
    /// Format one line with the current numbering, advancing the message
    /// counter
    pub fn line(&mut self, channel: Channel, message: &str) -> String {
        let line = format!(
            "{:04}:{:06}:{:03}:{}:{}",
            self.pkt_n,
            self.cmd_n,
            self.msg_n,
            channel.tag(self.direction),
            message
        );
        self.msg_n += 1;
        line
    }

    /// Set the packet number for subsequent lines
    pub fn set_packet(&mut self, number: u64) {
        self.pkt_n = number;
    }

    /// Set the command number for subsequent lines and restart the message
    /// counter
    pub fn set_command(&mut self, number: u64) {
        self.cmd_n = number;
        self.msg_n = 1;
    }

    /// Set the direction tag for subsequent lines
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }
}

/// Sink for the decode stream
pub trait Emit {
    /// Write one fully formatted line
    fn write(&mut self, line: &str);

    /// Verbose chatter; dropped unless verbose output is enabled
    fn verbose(&mut self, message: &str);

    /// Packet information from the reader
    fn reader(&mut self, message: &str);

    /// A decoded protocol message. May pause in step-decode mode.
    fn parser(&mut self, message: &str) -> Result<(), EmitSignal>;

    /// Raw capture or unswizzled payload dump. May pause in step-packet
    /// mode; dropped unless raw output is enabled.
    fn raw(&mut self, message: &str) -> Result<(), EmitSignal>;

    /// Deswizzled payload dump; dropped unless unswizzled output is enabled
    fn unswizzled(&mut self, message: &str);

    /// An error in the incoming stream. Stops the decode in strict mode.
    fn error(&mut self, message: &str) -> Result<(), EmitSignal>;

    /// A correctable anomaly
    fn warn(&mut self, message: &str);

    /// Analyzer information
    fn info(&mut self, message: &str);

    /// An error the decode survives by resynchronizing. Stops the decode in
    /// strict mode.
    fn critical(&mut self, message: &str) -> Result<(), EmitSignal>;

    /// Report a protocol-table malformation. The caller raises the
    /// accompanying fatal error itself; this only writes the line.
    fn table_error(&mut self, message: &str);

    /// An uncorrectable stream error. Returns the signal to unwind with.
    fn fatal(&mut self, message: &str) -> EmitSignal;

    /// Prompt the operator and read one line. `quit` surfaces as
    /// [`EmitSignal::Interrupted`].
    fn pause(&mut self, prompt: &str) -> Result<String, EmitSignal>;

    /// Set the packet number for subsequent lines
    fn set_packet(&mut self, number: u64);

    /// Set the command number for subsequent lines
    fn set_command(&mut self, number: u64);

    /// Set the direction tag for subsequent lines
    fn set_direction(&mut self, direction: Direction);
}

/// Emitter that drops everything. Used by fuzzing and by embedders that
/// only want the command-handler callbacks.
#[derive(Debug, Default)]
pub struct NullEmitter;

impl Emit for NullEmitter {
    fn write(&mut self, _line: &str) {}
    fn verbose(&mut self, _message: &str) {}
    fn reader(&mut self, _message: &str) {}
    fn parser(&mut self, _message: &str) -> Result<(), EmitSignal> {
        Ok(())
    }
    fn raw(&mut self, _message: &str) -> Result<(), EmitSignal> {
        Ok(())
    }
    fn unswizzled(&mut self, _message: &str) {}
    fn error(&mut self, _message: &str) -> Result<(), EmitSignal> {
        Ok(())
    }
    fn warn(&mut self, _message: &str) {}
    fn info(&mut self, _message: &str) {}
    fn critical(&mut self, _message: &str) -> Result<(), EmitSignal> {
        Ok(())
    }
    fn table_error(&mut self, _message: &str) {}
    fn fatal(&mut self, message: &str) -> EmitSignal {
        EmitSignal::Stopped(message.to_string())
    }
    fn pause(&mut self, _prompt: &str) -> Result<String, EmitSignal> {
        Ok(String::new())
    }
    fn set_packet(&mut self, _number: u64) {}
    fn set_command(&mut self, _number: u64) {}
    fn set_direction(&mut self, _direction: Direction) {}
}

/// Emitter that collects formatted lines in memory.
///
/// Used by the integration tests and by embedders that post-process the
/// decode stream instead of printing it.
#[derive(Debug, Default)]
pub struct BufferEmitter {
    /// Every line emitted so far, in order
    pub lines: Vec<String>,
    header: MessageHeader,
    /// Keep verbose chatter (off by default, like a quiet console)
    pub keep_verbose: bool,
    /// Escalate errors to [`EmitSignal::Stopped`]
    pub strict: bool,
}

impl BufferEmitter {
    /// Strict-mode collector
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// True when any collected line contains `needle`
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    fn push(&mut self, channel: Channel, message: &str) {
        let line = self.header.line(channel, message);
        self.write(&line);
    }
}

impl Emit for BufferEmitter {
    fn write(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
    fn verbose(&mut self, message: &str) {
        if self.keep_verbose {
            self.push(Channel::Verbose, message);
        }
    }
    fn reader(&mut self, message: &str) {
        self.push(Channel::Reader, message);
    }
    fn parser(&mut self, message: &str) -> Result<(), EmitSignal> {
        self.push(Channel::Parser, message);
        Ok(())
    }
    fn raw(&mut self, message: &str) -> Result<(), EmitSignal> {
        self.push(Channel::Raw, message);
        Ok(())
    }
    fn unswizzled(&mut self, message: &str) {
        self.push(Channel::Raw, message);
    }
    fn error(&mut self, message: &str) -> Result<(), EmitSignal> {
        self.push(Channel::Error, message);
        if self.strict {
            Err(EmitSignal::Stopped(message.to_string()))
        } else {
            Ok(())
        }
    }
    fn warn(&mut self, message: &str) {
        self.push(Channel::Warn, message);
    }
    fn info(&mut self, message: &str) {
        self.push(Channel::Info, message);
    }
    fn critical(&mut self, message: &str) -> Result<(), EmitSignal> {
        self.push(Channel::Critical, message);
        if self.strict {
            Err(EmitSignal::Stopped(message.to_string()))
        } else {
            Ok(())
        }
    }
    fn table_error(&mut self, message: &str) {
        self.push(Channel::TableFatal, message);
    }
    fn fatal(&mut self, message: &str) -> EmitSignal {
        self.push(Channel::Fatal, message);
        EmitSignal::Stopped(message.to_string())
    }
    fn pause(&mut self, _prompt: &str) -> Result<String, EmitSignal> {
        Ok(String::new())
    }
    fn set_packet(&mut self, number: u64) {
        self.header.set_packet(number);
    }
    fn set_command(&mut self, number: u64) {
        self.header.set_command(number);
    }
    fn set_direction(&mut self, direction: Direction) {
        self.header.set_direction(direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_numbers_and_channels_lines() {
        let mut header = MessageHeader::default();
        header.set_packet(3);
        header.set_command(12);
        header.set_direction(Direction::ToController);
        assert_eq!(
            header.line(Channel::Parser, "EOF"),
            "0003:000012:001:PRT:PRS:-->:EOF"
        );
        assert_eq!(
            header.line(Channel::Error, "oops"),
            "0003:000012:002:PRT:ERR:-->:oops"
        );
        header.set_command(13);
        assert_eq!(
            header.line(Channel::Verbose, "x"),
            "0003:000013:001:vrb:x"
        );
    }

    #[test]
    fn strict_buffer_escalates_errors() {
        let mut out = BufferEmitter::strict();
        assert!(out.error("bad checksum").is_err());
        assert!(out.contains("PRT:ERR"));

        let mut out = BufferEmitter::default();
        assert!(out.error("bad checksum").is_ok());
        assert!(out.critical("unknown opcode").is_ok());
    }
}
