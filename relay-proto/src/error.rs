use std::io;

/// Errors that can occur while decoding a value from the wire.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("tagged object encoding longer than one character")]
    BadTag,

    #[error("utf-8 string was not valid utf-8")]
    BadUtf8,

    #[error("unknown parameter/array encoding char {0:?}")]
    UnknownEncoding(char),

    #[error("frame declared length {declared} exceeds the configured maximum {max}")]
    FrameTooLarge { declared: u32, max: u32 },

    #[error("expected a concrete object but found the null sentinel")]
    UnexpectedNull,
}

/// Errors that can occur while encoding a value to the wire.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
