//! Handler for counting decoded commands

use crate::command_handler::HandleCommand;
use crate::param::DecodedValue;

/// A [`HandleCommand`] instance that counts commands and memory replies
#[derive(Debug, Default)]
pub struct CommandCounter {
    command_count: u64,
    memory_reply_count: u64,
    last_cmd_id: u64,
}

impl CommandCounter {
    /// Create a new [`CommandCounter`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total commands seen
    #[must_use]
    pub fn command_count(&self) -> u64 {
        self.command_count
    }

    /// Total memory replies seen
    #[must_use]
    pub fn memory_reply_count(&self) -> u64 {
        self.memory_reply_count
    }

    /// The most recent command id
    #[must_use]
    pub fn last_cmd_id(&self) -> u64 {
        self.last_cmd_id
    }
}

impl HandleCommand for CommandCounter {
    // Will never fail
    type Error = core::convert::Infallible;

    fn on_command(
        &mut self,
        cmd_id: u64,
        _label: &str,
        _command: u8,
        _sub_command: Option<u8>,
        _values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        self.command_count += 1;
        self.last_cmd_id = cmd_id;

        Ok(())
    }

    fn on_memory(
        &mut self,
        _address_msb: u8,
        _address_lsb: u8,
        _label: &str,
        _values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        self.memory_reply_count += 1;

        Ok(())
    }
}
