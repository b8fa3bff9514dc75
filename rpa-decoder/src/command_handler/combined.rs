//! Handler for combining two sub handlers.

use perfect_derive::perfect_derive;
use thiserror::Error;

use crate::command_handler::HandleCommand;
use crate::param::DecodedValue;

/// A [`HandleCommand`] instance for combining two sub handlers
///
/// Static generic dispatch for using two observers at once, e.g. a logger
/// next to a movement collector.
///
/// Note that in all callbacks, the first handler is executed before the
/// second handler, and if the first handler returns an error, the whole
/// callback returns without executing the second handler.
pub struct CombinedCommandHandler<H1, H2>
where
    H1: HandleCommand,
    H2: HandleCommand,
{
    handler1: H1,
    handler2: H2,
}

impl<H1, H2> CombinedCommandHandler<H1, H2>
where
    H1: HandleCommand,
    H2: HandleCommand,
{
    /// Create a new [`CombinedCommandHandler`]
    #[must_use]
    pub fn new(handler1: H1, handler2: H2) -> Self {
        Self { handler1, handler2 }
    }

    /// Consume the handler and get the original two handlers
    pub fn into_inner(self) -> (H1, H2) {
        (self.handler1, self.handler2)
    }

    /// Get shared reference to handler1
    pub fn handler1(&self) -> &H1 {
        &self.handler1
    }

    /// Get unique reference to handler1
    pub fn handler1_mut(&mut self) -> &mut H1 {
        &mut self.handler1
    }

    /// Get shared reference to handler2
    pub fn handler2(&self) -> &H2 {
        &self.handler2
    }

    /// Get unique reference to handler2
    pub fn handler2_mut(&mut self) -> &mut H2 {
        &mut self.handler2
    }
}

/// Error for [`CombinedCommandHandler`]
#[derive(Error)]
#[perfect_derive(Debug)]
pub enum CombinedError<H1, H2>
where
    H1: HandleCommand,
    H2: HandleCommand,
{
    /// Error of the first handler
    #[error(transparent)]
    H1Error(H1::Error),
    /// Error of the second handler
    #[error(transparent)]
    H2Error(H2::Error),
}

impl<H1, H2> HandleCommand for CombinedCommandHandler<H1, H2>
where
    H1: HandleCommand,
    H2: HandleCommand,
    CombinedError<H1, H2>: core::error::Error,
{
    type Error = CombinedError<H1, H2>;

    fn on_command(
        &mut self,
        cmd_id: u64,
        label: &str,
        command: u8,
        sub_command: Option<u8>,
        values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        self.handler1
            .on_command(cmd_id, label, command, sub_command, values)
            .map_err(CombinedError::H1Error)?;
        self.handler2
            .on_command(cmd_id, label, command, sub_command, values)
            .map_err(CombinedError::H2Error)?;

        Ok(())
    }

    fn on_memory(
        &mut self,
        address_msb: u8,
        address_lsb: u8,
        label: &str,
        values: &[DecodedValue],
    ) -> Result<(), Self::Error> {
        self.handler1
            .on_memory(address_msb, address_lsb, label, values)
            .map_err(CombinedError::H1Error)?;
        self.handler2
            .on_memory(address_msb, address_lsb, label, values)
            .map_err(CombinedError::H2Error)?;

        Ok(())
    }
}
