use thiserror::Error;

/// Error for capture ingestion
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReaderError {
    /// The capture text could not be decoded with the selected encoding.
    ///
    /// Windows tshark redirections are commonly utf-16.
    #[error("input encoding error -- try: --input-encoding={suggestion}")]
    Encoding {
        /// The encoding the operator should try instead
        suggestion: &'static str,
    },
    /// A capture line did not have the expected shape
    #[error("malformed capture record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number in the capture
        line: u64,
        /// What was wrong with it
        reason: String,
    },
    /// The UDP length field and the payload byte count disagree
    #[error("length MISMATCH at line {line}: UDP=({udp}) payload=({payload})")]
    LengthMismatch {
        /// 1-based line number in the capture
        line: u64,
        /// Payload length derived from the UDP length field
        udp: usize,
        /// Actual payload byte count
        payload: usize,
    },
    /// The swizzle magic could not be discovered from the capture
    #[error("magic number not discovered")]
    MagicNotFound,
    /// Underlying I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) type ReaderResult<T> = core::result::Result<T, ReaderError>;
