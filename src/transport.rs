//! The wire itself is an external collaborator: whatever owns the socket or
//! pipe to the remote stub, framing and checksumming packets
//! (`putpkt`/`getpkt` in GDB's own vocabulary). This crate only needs to
//! send a packet body and receive one back.

use crate::error::Error;

/// Sends and receives already-unframed packet bodies.
///
/// Implementations own checksumming, retransmission and run-length decoding;
/// this crate only ever sees the payload between the framing bytes.
pub trait Transport {
    fn send(&mut self, packet: &str) -> Result<(), Error>;

    /// Block for the next packet body. An empty string means the target
    /// sent a reply with no content (the `$#00`-style empty reply GDB's
    /// protocol uses to mean "command not recognised").
    fn recv(&mut self) -> Result<String, Error>;
}
