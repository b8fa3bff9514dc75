//! This module contains definition of errors made when parsing

use perfect_derive::perfect_derive;
use thiserror::Error;

use crate::command_handler::HandleCommand;
use crate::emit::EmitSignal;

/// Error for the command parsing
#[derive(Error)]
#[perfect_derive(Debug)]
#[non_exhaustive]
pub enum ParserError<H: HandleCommand> {
    /// Command handler error
    #[error("command handler error")]
    Handler(#[source] H::Error),
    /// The static protocol tables are malformed.
    ///
    /// This indicates a problem with the protocol definition, not with the
    /// incoming data, and is always fatal.
    #[error("protocol table error: {0}")]
    Table(String),
    /// The emitter stopped the decode (strict mode or operator request)
    #[error(transparent)]
    Signal(#[from] EmitSignal),
}

pub(crate) type ParserResult<T, H> = core::result::Result<T, ParserError<H>>;
