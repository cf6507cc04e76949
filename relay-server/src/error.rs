use std::io;

/// Errors surfaced while servicing a single connection. None of these are
/// fatal to the process; the acceptor's job is to map each variant to a
/// disconnect and move on.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("connection closed by peer")]
    Eof,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] relay_proto::DecodeError),

    #[error(transparent)]
    Encode(#[from] relay_proto::EncodeError),
}

impl SessionError {
    /// Whether this is an ordinary, expected way for a session to end
    /// (peer closed, idle timeout) versus a genuine protocol/transport
    /// fault worth logging louder.
    pub fn is_expected_disconnect(&self) -> bool {
        match self {
            SessionError::Eof => true,
            SessionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
