//! Observer contract for decoded commands.
//!
//! The parser reports every completed command and memory reply to a
//! [`HandleCommand`] implementation. Observers are optional: all methods
//! default to nops, and [`NullCommandHandler`] is the no-observer choice.
//! A movement visualizer is the typical real implementor.

pub mod combined;
pub mod counter;
pub mod log;

use crate::param::DecodedValue;

/// Command observer trait
///
/// The default implementations of all callbacks are nops.
pub trait HandleCommand {
    /// Custom error type
    type Error: core::error::Error;

    /// Handle one fully decoded command.
    ///
    /// `cmd_id` is the monotonic command number, `label` the decoded name,
    /// `command` the opcode byte and `sub_command` the sub-opcode if the
    /// command had one. `values` holds the decoded parameters in spec order,
    /// including reply-side values.
    #[allow(unused)]
    fn on_command(
        &mut self,
        cmd_id: u64,
        label: &str,
        command: u8,
        sub_command: Option<u8>,
        values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a decoded controller memory reply.
    ///
    /// The address is the one requested by the host; `label` is the memory
    /// table's name for it.
    #[allow(unused)]
    fn on_memory(
        &mut self,
        address_msb: u8,
        address_lsb: u8,
        label: &str,
        values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullCommandHandler;

impl HandleCommand for NullCommandHandler {
    // Ignoring cannot fail
    type Error = core::convert::Infallible;
}
