//! This module contains definition of errors made when analyzing a capture

use perfect_derive::perfect_derive;
use thiserror::Error;

use rpa_capture_reader::ReaderError;
use rpa_decoder::ParserError;
use rpa_decoder::command_handler::HandleCommand;
use rpa_decoder::emit::EmitSignal;

/// Error for the decode loop
#[derive(Error)]
#[perfect_derive(Debug)]
#[non_exhaustive]
pub enum AnalyzerError<H: HandleCommand> {
    /// Parser error
    #[error("parser error")]
    Parser(#[from] ParserError<H>),
    /// Capture reader error
    #[error("capture reader error")]
    Reader(#[from] ReaderError),
    /// The emitter stopped the decode
    #[error(transparent)]
    Signal(#[from] EmitSignal),
}

impl<H: HandleCommand> AnalyzerError<H> {
    /// True for the operator-interrupt unwind: flush and exit with status 0
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Signal(EmitSignal::Interrupted))
            || matches!(
                self,
                Self::Parser(ParserError::Signal(EmitSignal::Interrupted))
            )
    }
}
