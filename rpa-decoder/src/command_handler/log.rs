//! Handler for logging each decoded command
//!
//! The handler provided in this module is [`CommandLogger`], it logs every
//! decoded command with its values. Useful when debugging your own command
//! handler; combine them with
//! [`CombinedCommandHandler`][super::combined::CombinedCommandHandler].

use core::convert::Infallible;

use crate::command_handler::HandleCommand;
use crate::param::DecodedValue;

/// Handler for logging each decoded command
#[derive(Debug, Default)]
pub struct CommandLogger;

impl HandleCommand for CommandLogger {
    // This logger will never error
    type Error = Infallible;

    fn on_command(
        &mut self,
        cmd_id: u64,
        label: &str,
        command: u8,
        sub_command: Option<u8>,
        values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        match sub_command {
            Some(sub) => log::trace!(
                "[command {cmd_id}]\t{label}\topcode: {command:#04X} {sub:#04X}\tvalues: {values:?}"
            ),
            None => log::trace!(
                "[command {cmd_id}]\t{label}\topcode: {command:#04X}\tvalues: {values:?}"
            ),
        }
        Ok(())
    }

    fn on_memory(
        &mut self,
        address_msb: u8,
        address_lsb: u8,
        label: &str,
        values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        log::trace!(
            "[memory]\t{label}\taddress: {address_msb:02X}{address_lsb:02X}\tvalues: {values:?}"
        );
        Ok(())
    }
}
