//! Wire-format concerns: hex encoding, packet construction, and the
//! noisy-reply consumption loop.

pub mod hex;
pub mod reply;
pub mod serializer;

pub use reply::{ConsoleSink, RegisterSink, ReplyReader};
pub use serializer::Serializer;
