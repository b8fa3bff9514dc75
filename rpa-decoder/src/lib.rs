//! Byte-fed command decoder for the Ruida laser-cutter protocol.
//!
//! The decoder is a state machine driven by repeatedly calling
//! [`Decoder::step`] with one deswizzled byte and whether that byte came
//! from a controller reply. When a command completes, `step` returns the
//! decoded line; along the way the decoder reports to an [`Emit`] sink and
//! notifies a [`HandleCommand`] observer.
//!
//! Command tables were constructed using the information provided by
//! tatarize here: <https://edutechwiki.unige.ch/en/Ruida>
//!
//! NOTE: This does not verify the host/controller packet handshake; the
//! analyzer layer does that before bytes reach the decoder.

pub mod command_handler;
pub mod emit;
mod error;
pub mod param;
pub mod protocol;

pub use crate::error::ParserError;

use crate::command_handler::HandleCommand;
use crate::emit::Emit;
use crate::error::ParserResult;
use crate::param::{ParamDecoder, ParamError, to_hex};
use crate::protocol::{
    CMD_MASK, CommandSpec, MemoryEntry, Node, Param, PrimType, lookup, memory_entry, tables,
};

/// Parser states. Each corresponds to one arm of [`Decoder::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Scan for a known command byte to synchronize with the input
    Sync,
    /// The next host byte must be a root-table command
    ExpectCommand,
    /// The next host byte must be a sub-opcode of the selected table
    ExpectSubCommand,
    /// Feeding host bytes to the parameter decoder
    DecodeParameters,
    /// Feeding reply bytes to the parameter decoder
    ExpectReply,
    /// Memory read: the reply must echo the memory command
    MtCommand,
    /// Memory read: the reply's sub-opcode
    MtSubCommand,
    /// Memory read: address MSB from the reply
    MtAddressMsb,
    /// Memory read: address LSB from the reply
    MtAddressLsb,
    /// Memory read: decode the reply value per the memory table
    MtDecodeReply,
}

fn is_command(datum: u8) -> bool {
    datum & CMD_MASK != 0
}

/// State machine for parsing and decoding a Ruida protocol byte stream
pub struct Decoder {
    state: State,
    /// Dispatch table for the current state (root, sub or reply table)
    table: &'static [(u8, Node)],
    command: Option<u8>,
    sub_command: Option<u8>,
    spec: Option<&'static CommandSpec>,
    which_param: usize,
    /// Set once a reply marker has been crossed; later specs read replies
    in_reply_params: bool,
    values: Vec<param::DecodedValue>,
    param_decoder: ParamDecoder,
    decoded: String,
    cmd_id: u64,
    /// Memory address requested by the host, (msb, lsb)
    host_addr: Option<(u8, u8)>,
    /// Resolved address of the in-flight memory reply
    addr_msb: Option<u8>,
    addr_lsb: Option<u8>,
    memory: Option<&'static MemoryEntry>,
    host_bytes: Vec<u8>,
    controller_bytes: Vec<u8>,
    is_reply: bool,
    remaining: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create a decoder in its sync state
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Sync,
            table: tables::CT,
            command: None,
            sub_command: None,
            spec: None,
            which_param: 0,
            in_reply_params: false,
            values: Vec::new(),
            param_decoder: ParamDecoder::default(),
            decoded: String::new(),
            cmd_id: 0,
            host_addr: None,
            addr_msb: None,
            addr_lsb: None,
            memory: None,
            host_bytes: Vec::new(),
            controller_bytes: Vec::new(),
            is_reply: false,
            remaining: 0,
        }
    }

    /// The id of the most recently completed command
    #[must_use]
    pub fn cmd_id(&self) -> u64 {
        self.cmd_id
    }

    /// True between commands: no partial decode state is held.
    ///
    /// Holds after every completed command and after every resync.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        matches!(self.state, State::Sync | State::ExpectCommand)
            && self.decoded.is_empty()
            && self.values.is_empty()
            && self.param_decoder.is_idle()
    }

    /// Step the state machine with one byte.
    ///
    /// `remaining` is the number of unread bytes left in the current packet
    /// after this one; packet-remainder captures complete on it.
    ///
    /// Returns the decoded message once a command or reply completes.
    pub fn step<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        is_reply: bool,
        remaining: usize,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        self.is_reply = is_reply;
        self.remaining = remaining;
        if is_reply {
            self.controller_bytes.push(datum);
        } else {
            self.host_bytes.push(datum);
        }

        let result = self.dispatch(datum, out, handler)?;
        if result.is_some() {
            out.verbose(&format!("-->:{}", to_hex(&self.host_bytes)));
            out.verbose(&format!("<--:{}", to_hex(&self.controller_bytes)));
            self.host_bytes.clear();
            self.controller_bytes.clear();
        }
        Ok(result)
    }

    fn dispatch<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        match self.state {
            State::Sync => self.st_sync(datum, out, handler),
            State::ExpectCommand => self.st_expect_command(datum, out, handler),
            State::ExpectSubCommand => self.st_expect_sub_command(datum, out, handler),
            State::DecodeParameters => self.st_decode_parameters(datum, out, handler),
            State::ExpectReply => self.st_expect_reply(datum, out, handler),
            State::MtCommand => self.st_mt_command(datum, out, handler),
            State::MtSubCommand => self.st_mt_sub_command(datum, out, handler),
            State::MtAddressMsb => self.st_mt_address_msb(datum, out, handler),
            State::MtAddressLsb => self.st_mt_address_lsb(datum, out, handler),
            State::MtDecodeReply => self.st_mt_decode_reply(datum, out, handler),
        }
    }

    fn enter(&mut self, state: State) {
        log::trace!("state {:?} -> {:?}", self.state, state);
        self.state = state;
        if matches!(state, State::Sync | State::ExpectCommand) {
            self.prepare_for_command();
        }
    }

    /// Clear all per-command state. No residual parameter accumulation may
    /// leak into the next command.
    fn prepare_for_command(&mut self) {
        self.table = tables::CT;
        self.command = None;
        self.sub_command = None;
        self.spec = None;
        self.which_param = 0;
        self.in_reply_params = false;
        self.values.clear();
        self.param_decoder.reset();
        self.decoded.clear();
        self.host_addr = None;
        self.addr_msb = None;
        self.addr_lsb = None;
        self.memory = None;
    }

    /// Re-enter sync and let it see the current datum immediately
    fn resync<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        self.enter(State::Sync);
        self.st_sync(datum, out, handler)
    }

    /// Finish the in-flight command: notify the observer, hand out the
    /// decoded line and return to expecting the next command.
    fn finish_command<H: HandleCommand>(
        &mut self,
        label: &'static str,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        self.cmd_id += 1;
        let command = self.command.ok_or_else(|| {
            ParserError::Table("command completed without an opcode".to_string())
        })?;
        handler
            .on_command(self.cmd_id, label, command, self.sub_command, &self.values)
            .map_err(ParserError::Handler)?;
        let line = core::mem::take(&mut self.decoded);
        self.enter(State::ExpectCommand);
        Ok(Some(line))
    }

    /// Dispatch a known opcode against the current table node
    fn dispatch_command<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        node: &'static Node,
        handler: &mut H,
        out: &mut E,
    ) -> ParserResult<Option<String>, H> {
        match *node {
            Node::Label(label) => {
                self.command = Some(datum);
                self.decoded.push_str(label);
                self.finish_command(label, handler)
            }
            Node::Table(sub) => {
                self.command = Some(datum);
                self.table = sub;
                self.enter(State::ExpectSubCommand);
                Ok(None)
            }
            Node::Spec(spec) => {
                self.command = Some(datum);
                self.begin_params(spec, out)?;
                Ok(None)
            }
        }
    }

    /// Prepare to decode a parameter list
    fn begin_params<E: Emit, H: HandleCommand>(
        &mut self,
        spec: &'static CommandSpec,
        out: &mut E,
    ) -> ParserResult<(), H> {
        self.spec = Some(spec);
        self.decoded.push_str(spec.label);
        self.which_param = 0;
        self.enter(State::DecodeParameters);
        self.setup_param(out)
    }

    /// Prime the decoder for the parameter at the cursor, crossing a reply
    /// marker if one is next
    fn setup_param<E: Emit, H: HandleCommand>(&mut self, out: &mut E) -> ParserResult<(), H> {
        let Some(spec) = self.spec else {
            return Err(ParserError::Table(
                "no active parameter list".to_string(),
            ));
        };
        match spec.params.get(self.which_param) {
            Some(Param::Prim(prim)) => {
                out.verbose(&format!(
                    "decoding parameter {} ({})",
                    self.which_param, prim.name
                ));
                self.param_decoder.prime(prim, self.in_reply_params);
                if self.in_reply_params {
                    self.enter(State::ExpectReply);
                }
                Ok(())
            }
            Some(Param::Reply) => {
                self.in_reply_params = true;
                self.which_param += 1;
                let Some(Param::Prim(prim)) = spec.params.get(self.which_param) else {
                    let message =
                        format!("{}: no reply type following reply marker", spec.label);
                    out.table_error(&message);
                    return Err(ParserError::Table(message));
                };
                out.verbose(&format!(
                    "decoding reply parameter {} ({})",
                    self.which_param, prim.name
                ));
                self.param_decoder.prime(prim, true);
                self.enter(State::ExpectReply);
                Ok(())
            }
            None => {
                let message = format!("{}: empty parameter list", spec.label);
                out.table_error(&message);
                Err(ParserError::Table(message))
            }
        }
    }

    /// Scan for a command byte to synchronize the parser with the input
    /// data. The initial state, and the recovery state after protocol
    /// errors.
    fn st_sync<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if self.is_reply {
            // Replies cannot start a command; keep scanning host bytes.
            return Ok(None);
        }
        if !is_command(datum) {
            out.verbose(&format!("sync: discarding datum {datum:#04X}"));
            return Ok(None);
        }
        let Some(node) = lookup(self.table, datum) else {
            out.critical(&format!("Datum {datum:#04X} is not a known command"))?;
            return Ok(None);
        };
        self.dispatch_command(datum, node, handler, out)
    }

    /// Expect the incoming byte to be a known root-table command byte
    fn st_expect_command<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if self.is_reply {
            out.error("Reply packet when expecting a command")?;
            self.enter(State::Sync);
            return Ok(None);
        }
        if !is_command(datum) {
            out.error(&format!("Datum {datum:#04X} is not a command byte"))?;
            self.enter(State::Sync);
            return Ok(None);
        }
        let Some(node) = lookup(self.table, datum) else {
            out.critical(&format!("Datum {datum:#04X} is not a known command"))?;
            self.enter(State::Sync);
            return Ok(None);
        };
        self.dispatch_command(datum, node, handler, out)
    }

    /// A command with a sub-command table has been received; dispatch the
    /// sub-opcode
    fn st_expect_sub_command<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if self.is_reply {
            out.error("Reply packet when expecting a sub-command")?;
            self.enter(State::Sync);
            return Ok(None);
        }
        if is_command(datum) {
            out.error(&format!(
                "Datum {datum:#04X} is a command when a sub-command was expected"
            ))?;
            return self.resync(datum, out, handler);
        }
        let Some(node) = lookup(self.table, datum) else {
            out.critical(&format!("Datum {datum:#04X} is not a known sub-command"))?;
            self.enter(State::Sync);
            return Ok(None);
        };
        match *node {
            Node::Label(label) => {
                self.sub_command = Some(datum);
                self.decoded.push_str(label);
                self.finish_command(label, handler)
            }
            Node::Table(_) => {
                let command = self.command.unwrap_or(0);
                let message =
                    format!("too many sub-levels below command {command:#04X}");
                out.table_error(&message);
                Err(ParserError::Table(message))
            }
            Node::Spec(spec) => {
                self.sub_command = Some(datum);
                self.begin_params(spec, out)?;
                Ok(None)
            }
        }
    }

    /// Feed host bytes to the parameter decoder per the active spec list
    fn st_decode_parameters<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if self.is_reply {
            out.error("Reply packet when expecting parameters")?;
            self.enter(State::Sync);
            return Ok(None);
        }
        if is_command(datum) {
            // Either a problem with the incoming data or with the spec in
            // the protocol table.
            out.error(&format!("Datum {datum:#04X} is a command -- expected data"))?;
            return self.resync(datum, out, handler);
        }
        match self.param_decoder.step(datum, self.remaining) {
            Err(err) => {
                self.report_param_error(&err, out)?;
                self.enter(State::Sync);
                Ok(None)
            }
            Ok(None) => Ok(None),
            Ok(Some(decoded)) => {
                out.verbose(&format!(
                    "decoded parameter {}={}",
                    self.which_param, decoded.text
                ));
                self.decoded.push(' ');
                self.decoded.push_str(&decoded.text);

                let is_memory_trigger = self.spec.is_some_and(|spec| {
                    matches!(
                        spec.params.get(self.which_param),
                        Some(Param::Prim(prim)) if prim.ty == PrimType::MtAddr
                    )
                });
                if is_memory_trigger {
                    // A controller memory reference: the host line is done
                    // and the controller's reply decodes next.
                    if let param::DecodedValue::Uint(address) = &decoded.value {
                        self.host_addr =
                            Some(((address >> 8) as u8 & 0x7F, *address as u8 & 0x7F));
                    }
                    self.values.push(decoded.value);
                    let spec = self.spec.ok_or_else(|| {
                        ParserError::Table("memory trigger without a spec".to_string())
                    })?;
                    self.cmd_id += 1;
                    let command = self.command.ok_or_else(|| {
                        ParserError::Table("command completed without an opcode".to_string())
                    })?;
                    handler
                        .on_command(
                            self.cmd_id,
                            spec.label,
                            command,
                            self.sub_command,
                            &self.values,
                        )
                        .map_err(ParserError::Handler)?;
                    let line = core::mem::take(&mut self.decoded);
                    self.values.clear();
                    self.enter(State::MtCommand);
                    return Ok(Some(line));
                }

                self.values.push(decoded.value);
                self.advance_param(out, handler)
            }
        }
    }

    /// Expect and decode reply data from the controller.
    ///
    /// Reply packets are atomic responses: one command, one reply.
    fn st_expect_reply<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if !self.is_reply {
            out.error("Packet from host when expecting a reply")?;
            return self.resync(datum, out, handler);
        }
        if is_command(datum) {
            out.error(&format!(
                "Datum {datum:#04X} is a command -- expected reply data"
            ))?;
            self.enter(State::Sync);
            return Ok(None);
        }
        match self.param_decoder.step(datum, self.remaining) {
            Err(err) => {
                self.report_param_error(&err, out)?;
                self.enter(State::Sync);
                Ok(None)
            }
            Ok(None) => Ok(None),
            Ok(Some(decoded)) => {
                out.verbose(&format!("decoded reply {}", decoded.text));
                self.decoded.push(' ');
                self.decoded.push_str(&decoded.text);
                self.values.push(decoded.value);
                self.advance_param(out, handler)
            }
        }
    }

    /// Move the parameter cursor forward, finishing the command when the
    /// list is exhausted
    fn advance_param<E: Emit, H: HandleCommand>(
        &mut self,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        let Some(spec) = self.spec else {
            return Err(ParserError::Table(
                "no active parameter list".to_string(),
            ));
        };
        self.which_param += 1;
        if self.which_param >= spec.params.len() {
            out.verbose("parameters decoded");
            self.finish_command(spec.label, handler)
        } else {
            self.setup_param(out)?;
            Ok(None)
        }
    }

    /// The reply to a memory read must echo the memory command byte
    fn st_mt_command<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if !self.is_reply {
            out.error("Packet from host when expecting a memory reply")?;
            return self.resync(datum, out, handler);
        }
        if !is_command(datum) {
            out.error(&format!("Datum {datum:#04X} is not a reply command byte"))?;
            self.enter(State::Sync);
            return Ok(None);
        }
        match lookup(tables::RT, datum).copied() {
            Some(Node::Table(sub)) => {
                self.table = sub;
                self.enter(State::MtSubCommand);
                Ok(None)
            }
            Some(_) => {
                let message =
                    format!("reply command {datum:#04X} must dispatch a sub-command table");
                out.table_error(&message);
                Err(ParserError::Table(message))
            }
            None => {
                out.error(&format!("Datum {datum:#04X} is not a known reply command"))?;
                self.enter(State::Sync);
                Ok(None)
            }
        }
    }

    /// A reply to a memory access always has a sub-command
    fn st_mt_sub_command<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if !self.is_reply {
            out.error("Packet from host when expecting a reply sub-command")?;
            return self.resync(datum, out, handler);
        }
        match lookup(self.table, datum).copied() {
            Some(Node::Spec(spec)) => {
                self.decoded.clear();
                self.decoded.push_str(spec.label);
                self.enter(State::MtAddressMsb);
                Ok(None)
            }
            Some(_) => {
                let message = format!(
                    "memory reply entry {datum:#04X} must be a parameter spec"
                );
                out.table_error(&message);
                Err(ParserError::Table(message))
            }
            None => {
                out.error(&format!(
                    "Datum {datum:#04X} is not a known reply sub-command"
                ))?;
                self.enter(State::Sync);
                Ok(None)
            }
        }
    }

    /// Address MSB of the memory reply. Must match the host's request; on
    /// mismatch warn and keep the host-observed address.
    fn st_mt_address_msb<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if !self.is_reply {
            out.error("Packet from host when expecting the reply memory address")?;
            return self.resync(datum, out, handler);
        }
        let msb = match self.host_addr {
            Some((host_msb, _)) if host_msb != datum => {
                out.warn(&format!(
                    "reply address MSB {datum:02X} does not match requested {host_msb:02X}"
                ));
                host_msb
            }
            Some((host_msb, _)) => host_msb,
            None => datum,
        };
        self.addr_msb = Some(msb);
        self.decoded.push_str(&format!(" Addr:{msb:02X}"));
        self.enter(State::MtAddressLsb);
        Ok(None)
    }

    /// Address LSB of the memory reply; resolves the memory table entry
    fn st_mt_address_lsb<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if !self.is_reply {
            out.error("Packet from host when expecting the reply memory address")?;
            return self.resync(datum, out, handler);
        }
        let lsb = match self.host_addr {
            Some((_, host_lsb)) if host_lsb != datum => {
                out.warn(&format!(
                    "reply address LSB {datum:02X} does not match requested {host_lsb:02X}"
                ));
                host_lsb
            }
            Some((_, host_lsb)) => host_lsb,
            None => datum,
        };
        let msb = self.addr_msb.unwrap_or(0);
        self.addr_lsb = Some(lsb);
        self.decoded.push_str(&format!("{lsb:02X}"));

        let entry = memory_entry(msb, lsb);
        out.verbose(&format!("memory reference {msb:02X}{lsb:02X}: {}", entry.label));
        self.decoded.push(':');
        self.decoded.push_str(entry.label);
        self.memory = Some(entry);
        self.values.clear();
        self.param_decoder.prime(&entry.reply, false);
        self.enter(State::MtDecodeReply);
        Ok(None)
    }

    /// Decode the memory reply value per the resolved table entry
    fn st_mt_decode_reply<E: Emit, H: HandleCommand>(
        &mut self,
        datum: u8,
        out: &mut E,
        handler: &mut H,
    ) -> ParserResult<Option<String>, H> {
        if !self.is_reply {
            out.error("Packet from host when decoding reply data")?;
            return self.resync(datum, out, handler);
        }
        match self.param_decoder.step(datum, self.remaining) {
            Err(err) => {
                self.report_param_error(&err, out)?;
                self.enter(State::Sync);
                Ok(None)
            }
            Ok(None) => Ok(None),
            Ok(Some(decoded)) => {
                out.verbose(&format!("decoded memory reply {}", decoded.text));
                self.decoded.push(':');
                self.decoded.push_str(&decoded.text);
                self.values.push(decoded.value);

                let entry = self.memory.ok_or_else(|| {
                    ParserError::Table("memory reply without a table entry".to_string())
                })?;
                let (msb, lsb) = (self.addr_msb.unwrap_or(0), self.addr_lsb.unwrap_or(0));
                self.cmd_id += 1;
                handler
                    .on_memory(msb, lsb, entry.label, &self.values)
                    .map_err(ParserError::Handler)?;
                let line = core::mem::take(&mut self.decoded);
                self.enter(State::ExpectCommand);
                Ok(Some(line))
            }
        }
    }

    fn report_param_error<E: Emit, H: HandleCommand>(
        &mut self,
        err: &ParamError,
        out: &mut E,
    ) -> ParserResult<(), H> {
        match err {
            // A state bug on our side, not bad input
            ParamError::NotPrimed => {
                let message = err.to_string();
                out.table_error(&message);
                Err(ParserError::Table(message))
            }
            ParamError::CommandByte(_) | ParamError::InvalidOption(_) => {
                out.critical(&err.to_string())?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_handler::NullCommandHandler;
    use crate::command_handler::counter::CommandCounter;
    use crate::emit::BufferEmitter;
    use crate::param::DecodedValue;

    /// Observer that records every callback
    #[derive(Default)]
    struct Recorder {
        commands: Vec<(u64, String, u8, Option<u8>, Vec<DecodedValue>)>,
        memory: Vec<(u8, u8, String, Vec<DecodedValue>)>,
    }

    impl HandleCommand for Recorder {
        type Error = core::convert::Infallible;

        fn on_command(
            &mut self,
            cmd_id: u64,
            label: &str,
            command: u8,
            sub_command: Option<u8>,
            values: &[DecodedValue],
        ) -> Result<(), Self::Error> {
            self.commands
                .push((cmd_id, label.to_string(), command, sub_command, values.to_vec()));
            Ok(())
        }

        fn on_memory(
            &mut self,
            address_msb: u8,
            address_lsb: u8,
            label: &str,
            values: &[DecodedValue],
        ) -> Result<(), Self::Error> {
            self.memory
                .push((address_msb, address_lsb, label.to_string(), values.to_vec()));
            Ok(())
        }
    }

    fn feed<H: HandleCommand>(
        decoder: &mut Decoder,
        out: &mut BufferEmitter,
        handler: &mut H,
        bytes: &[u8],
        is_reply: bool,
    ) -> Vec<String>
    where
        H::Error: core::fmt::Debug,
    {
        let mut lines = Vec::new();
        for (index, byte) in bytes.iter().enumerate() {
            let remaining = bytes.len() - 1 - index;
            if let Some(line) = decoder
                .step(*byte, is_reply, remaining, out, handler)
                .unwrap()
            {
                lines.push(line);
            }
        }
        lines
    }

    #[test]
    fn minimal_command_decodes_to_its_label() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();
        let lines = feed(&mut decoder, &mut out, &mut handler, &[0xD7], false);
        assert_eq!(lines, vec!["EOF".to_string()]);
        assert_eq!(decoder.cmd_id(), 1);
        assert!(decoder.is_quiescent());
        assert_eq!(handler.commands.len(), 1);
        assert_eq!(handler.commands[0].1, "EOF");
        assert_eq!(handler.commands[0].2, 0xD7);
        assert_eq!(handler.commands[0].3, None);
    }

    #[test]
    fn move_abs_decodes_both_coordinates() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();
        // X = 1000um, Y = 2000um
        let bytes = [
            0x88, 0x00, 0x00, 0x00, 0x07, 0x68, 0x00, 0x00, 0x00, 0x0F, 0x50,
        ];
        let lines = feed(&mut decoder, &mut out, &mut handler, &bytes, false);
        assert_eq!(lines, vec!["MOVE_ABS_XY X=1000um Y=2000um".to_string()]);
        assert_eq!(
            handler.commands[0].4,
            vec![DecodedValue::Int(1000), DecodedValue::Int(2000)]
        );
        assert!(decoder.is_quiescent());
    }

    #[test]
    fn sub_opcode_dispatch_decodes_power() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();
        let lines = feed(
            &mut decoder,
            &mut out,
            &mut handler,
            &[0xC6, 0x01, 0x40, 0x00],
            false,
        );
        assert_eq!(lines, vec!["MIN_POWER_1 Power:50.000000%".to_string()]);
        assert_eq!(handler.commands[0].2, 0xC6);
        assert_eq!(handler.commands[0].3, Some(0x01));
    }

    #[test]
    fn sub_opcode_label_completes_without_parameters() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = NullCommandHandler;
        let lines = feed(&mut decoder, &mut out, &mut handler, &[0xD8, 0x00], false);
        assert_eq!(lines, vec!["START_PROCESS".to_string()]);
    }

    #[test]
    fn rapid_move_decodes_option_and_axes() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();
        // RAPID_MOVE_XY, option LIGHT, X = 1000um, Y = -1000um
        let bytes = [
            0xD9, 0x10, 0x03, 0x00, 0x00, 0x00, 0x07, 0x68, 0x40, 0x00, 0x00, 0x07, 0x68,
        ];
        let lines = feed(&mut decoder, &mut out, &mut handler, &bytes, false);
        assert_eq!(
            lines,
            vec!["RAPID_MOVE_XY Option:LIGHT X=1000um Y=-1000um".to_string()]
        );
        assert_eq!(handler.commands[0].4[0], DecodedValue::Uint(3));
    }

    #[test]
    fn unknown_opcode_is_critical_and_resyncs() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();
        let lines = feed(&mut decoder, &mut out, &mut handler, &[0xFE, 0x00, 0xD7], false);
        assert_eq!(lines, vec!["EOF".to_string()]);
        assert!(out.contains("INT:CRT"));
        assert!(out.contains("0xFE"));
        assert_eq!(decoder.cmd_id(), 1);
    }

    #[test]
    fn opcode_during_parameters_recovers_through_sync() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();
        // MOVE_ABS_XY starts, then EOF arrives mid-parameter. The EOF must
        // not be lost.
        let lines = feed(&mut decoder, &mut out, &mut handler, &[0x88, 0x00, 0xD7], false);
        assert_eq!(lines, vec!["EOF".to_string()]);
        assert!(out.contains("PRT:ERR"));
        assert!(decoder.is_quiescent());
    }

    #[test]
    fn cstring_parameter_reads_to_terminator() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();
        let mut bytes = vec![0xE7, 0x01];
        bytes.extend_from_slice(b"part.rd\0");
        let lines = feed(&mut decoder, &mut out, &mut handler, &bytes, false);
        assert_eq!(lines, vec!["SET_FILENAME Name='part.rd'".to_string()]);
    }

    #[test]
    fn memory_read_round_trip() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();

        let lines = feed(
            &mut decoder,
            &mut out,
            &mut handler,
            &[0xDA, 0x00, 0x00, 0x26],
            false,
        );
        assert_eq!(lines, vec!["GET_SETTING Addr:0026".to_string()]);
        assert_eq!(handler.commands.len(), 1);
        assert_eq!(handler.commands[0].4, vec![DecodedValue::Uint(0x0026)]);

        // Reply echoes the command, sub-opcode and address, then the value:
        // 1_200_000um.
        let reply = [0xDA, 0x00, 0x00, 0x26, 0x00, 0x00, 0x49, 0x1F, 0x00];
        let lines = feed(&mut decoder, &mut out, &mut handler, &reply, true);
        assert_eq!(
            lines,
            vec!["MEM_RESULT Addr:0026:Axis Range 1:Reply=1200000um".to_string()]
        );
        assert_eq!(handler.memory.len(), 1);
        assert_eq!(handler.memory[0].0, 0x00);
        assert_eq!(handler.memory[0].1, 0x26);
        assert_eq!(handler.memory[0].2, "Axis Range 1");
        assert_eq!(handler.memory[0].3, vec![DecodedValue::Int(1_200_000)]);
        assert_eq!(decoder.cmd_id(), 2);
        assert!(decoder.is_quiescent());
    }

    #[test]
    fn memory_reply_address_mismatch_warns_and_keeps_host_address() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();

        feed(&mut decoder, &mut out, &mut handler, &[0xDA, 0x00, 0x00, 0x26], false);
        let reply = [0xDA, 0x00, 0x00, 0x36, 0x00, 0x00, 0x49, 0x1F, 0x00];
        let lines = feed(&mut decoder, &mut out, &mut handler, &reply, true);
        assert!(out.contains("INT:WRN"));
        // Host asked for 0026; the lookup must stay on Axis Range 1.
        assert_eq!(
            lines,
            vec!["MEM_RESULT Addr:0026:Axis Range 1:Reply=1200000um".to_string()]
        );
    }

    #[test]
    fn unknown_memory_address_dumps_hex() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();

        feed(&mut decoder, &mut out, &mut handler, &[0xDA, 0x00, 0x33, 0x71], false);
        let reply = [0xDA, 0x00, 0x33, 0x71, 0x01, 0x02, 0x03];
        let lines = feed(&mut decoder, &mut out, &mut handler, &reply, true);
        assert_eq!(
            lines,
            vec!["MEM_RESULT Addr:3371:Unknown Address:Reply:010203".to_string()]
        );
        assert_eq!(
            handler.memory[0].3,
            vec![DecodedValue::Raw(vec![1, 2, 3])]
        );
    }

    #[test]
    fn reply_marker_weaves_reply_bytes_into_the_command() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = Recorder::default();

        let none = feed(&mut decoder, &mut out, &mut handler, &[0xE8, 0x01, 0x00, 0x2A], false);
        assert!(none.is_empty());

        let lines = feed(&mut decoder, &mut out, &mut handler, &[0x01, 0x02], true);
        assert_eq!(lines, vec!["E8_01 Number=42 Reply:0102".to_string()]);
        assert_eq!(
            handler.commands[0].4,
            vec![DecodedValue::Uint(42), DecodedValue::Raw(vec![1, 2])]
        );
    }

    #[test]
    fn cmd_ids_increase_by_one_per_decoded_line() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut counter = CommandCounter::new();
        feed(&mut decoder, &mut out, &mut counter, &[0xD7], false);
        feed(&mut decoder, &mut out, &mut counter, &[0xD8, 0x01], false);
        feed(&mut decoder, &mut out, &mut counter, &[0xEB], false);
        assert_eq!(counter.command_count(), 3);
        assert_eq!(counter.last_cmd_id(), 3);
        assert_eq!(decoder.cmd_id(), 3);
    }

    #[test]
    fn strict_emitter_signal_unwinds_the_step() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::strict();
        let mut handler = NullCommandHandler;
        let result = decoder.step(0xFE, false, 0, &mut out, &mut handler);
        assert!(matches!(result, Err(ParserError::Signal(_))));
    }

    #[test]
    fn reply_packet_while_expecting_command_is_an_error() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = NullCommandHandler;
        feed(&mut decoder, &mut out, &mut handler, &[0xD7], false);
        let lines = feed(&mut decoder, &mut out, &mut handler, &[0x11, 0x22], true);
        assert!(lines.is_empty());
        assert!(out.contains("PRT:ERR"));
        // Recovery: the next host command still decodes.
        let lines = feed(&mut decoder, &mut out, &mut handler, &[0xD7], false);
        assert_eq!(lines, vec!["EOF".to_string()]);
    }

    #[test]
    fn invalid_rapid_option_resyncs() {
        let mut decoder = Decoder::new();
        let mut out = BufferEmitter::default();
        let mut handler = NullCommandHandler;
        let lines = feed(
            &mut decoder,
            &mut out,
            &mut handler,
            &[0xD9, 0x10, 0x07, 0xD7],
            false,
        );
        assert!(out.contains("INT:CRT"));
        assert_eq!(lines, vec!["EOF".to_string()]);
    }
}
