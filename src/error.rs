//! The crate-wide error type.

use std::fmt::{self, Display};

/// The subcategory of a `RemoteError`, decoded from the character that
/// follows the leading `E` in an `E` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// `E10` — the outgoing packet itself was malformed.
    MalformedPacket,
    /// `E1n` — the packet was malformed starting at field `n`.
    MalformedField(u8),
    /// `E2xx` — a target-side trace API error, carrying the raw `xx` code.
    TraceApi(u8),
    /// Anything else GDB's wire format allows: an opaque error string.
    Opaque(String),
}

/// Every way a tracepoint operation can fail.
///
/// Grouped by how a caller should react: user-facing mistakes
/// (`InvalidArgument`, `BadAction`),
/// bookkeeping misses (`UnknownTracepoint`, `NotFound`), and protocol-level
/// failures (`TooComplex`, `ProtocolError`, `RemoteError`, `Unsupported`,
/// `NotRemote`), plus interactive cancellation (`UserQuit`).
#[derive(Debug)]
pub enum Error {
    /// User-supplied text could not be parsed (e.g. a malformed tracepoint
    /// number or convenience-variable reference).
    InvalidArgument(String),
    /// A tracepoint number did not resolve to any known tracepoint. Callers
    /// that receive this should warn and treat the result as absent, per the
    /// the `TracepointStore::lookup_by_number` contract.
    UnknownTracepoint(String),
    /// An action line failed grammar or symbol validation. The offending
    /// line was dropped; this is always locally recoverable.
    BadAction(String),
    /// The assembled `QTDP` packet for a tracepoint would exceed the
    /// transport's size limit.
    TooComplex {
        /// The tracepoint whose packet overflowed.
        tracepoint: u32,
    },
    /// A reply packet's leading character was not one this crate's protocol
    /// state machines know how to interpret.
    ProtocolError(String),
    /// The target reported an `E` packet.
    RemoteError(RemoteErrorKind),
    /// An empty reply — the target doesn't implement the command sent.
    Unsupported,
    /// The active target is not a remote stub capable of tracing.
    NotRemote,
    /// `tfind` could not locate a matching frame.
    NotFound,
    /// The user aborted an interactive multi-line read (e.g. `actions`).
    UserQuit,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Error::*;
        match self {
            InvalidArgument(s) => write!(f, "invalid argument: {}", s),
            UnknownTracepoint(s) => write!(f, "no tracepoint {}", s),
            BadAction(s) => write!(f, "bad action line: {}", s),
            TooComplex { tracepoint } => {
                write!(f, "tracepoint {} is too complex, try a simpler action list", tracepoint)
            }
            ProtocolError(s) => write!(f, "protocol error: {}", s),
            RemoteError(kind) => match kind {
                RemoteErrorKind::MalformedPacket => write!(f, "target reports malformed packet"),
                RemoteErrorKind::MalformedField(n) => {
                    write!(f, "target reports malformed field {}", n)
                }
                RemoteErrorKind::TraceApi(code) => {
                    write!(f, "target trace API error {:02x}", code)
                }
                RemoteErrorKind::Opaque(s) => write!(f, "target error: {}", s),
            },
            Unsupported => write!(f, "remote target does not support this command"),
            NotRemote => write!(f, "the current target is not a remote debugging stub"),
            NotFound => write!(f, "target failed to find a requested trace frame"),
            UserQuit => write!(f, "quit"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
