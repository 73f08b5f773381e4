//! Drives the noisy-reply loop: a reply exchange may be prefixed with any
//! number of asynchronous console-output or register-update packets before
//! the terminal reply arrives.

use crate::error::{Error, RemoteErrorKind};
use crate::protocol::hex;
use crate::transport::Transport;

/// Receives decoded console output emitted by the target mid-reply.
pub trait ConsoleSink {
    fn console_output(&mut self, text: &[u8]);
}

impl ConsoleSink for () {
    fn console_output(&mut self, _text: &[u8]) {}
}

/// Receives register updates carried by an `R` packet mid-reply.
///
/// `raw_hex` is passed through undecoded — the caller's register cache
/// already knows how wide each register is and how to interpret its bytes.
pub trait RegisterSink {
    fn update_register(&mut self, regno: u32, raw_hex: &str);
}

impl RegisterSink for () {
    fn update_register(&mut self, _regno: u32, _raw_hex: &str) {}
}

/// Consumes packets from a [`Transport`] until the terminal reply, per the
/// unconditional contract: the caller of [`ReplyReader::read_reply`] never
/// sees a packet starting with `O`, `R` or `E`.
pub struct ReplyReader;

impl ReplyReader {
    /// Read one logical reply, flushing any interleaved `O`/`R` packets to
    /// `console`/`registers` in arrival order.
    pub fn read_reply(
        transport: &mut dyn Transport,
        console: &mut dyn ConsoleSink,
        registers: &mut dyn RegisterSink,
    ) -> Result<String, Error> {
        loop {
            let packet = transport.recv()?;
            if packet.is_empty() {
                return Err(Error::Unsupported);
            }
            let mut chars = packet.char_indices();
            let (_, first) = chars.next().unwrap();
            match first {
                'E' => return Err(decode_remote_error(&packet[1..])),
                'R' => {
                    parse_register_dump(&packet[1..], registers)?;
                }
                'O' if packet != "OK" => {
                    let bytes = hex::decode(&packet[1..])?;
                    console.console_output(&bytes);
                }
                _ => return Ok(packet),
            }
        }
    }
}

fn parse_register_dump(body: &str, registers: &mut dyn RegisterSink) -> Result<(), Error> {
    for entry in body.split(';') {
        if entry.is_empty() {
            continue;
        }
        let (regno_str, hex_bytes) = entry
            .split_once(':')
            .ok_or_else(|| Error::ProtocolError(format!("malformed register entry: {}", entry)))?;
        let regno = u32::from_str_radix(regno_str, 16)
            .map_err(|_| Error::ProtocolError(format!("malformed register number: {}", regno_str)))?;
        registers.update_register(regno, hex_bytes);
    }
    Ok(())
}

fn decode_remote_error(rest: &str) -> Error {
    if rest == "10" {
        return Error::RemoteError(RemoteErrorKind::MalformedPacket);
    }
    if rest.len() == 2 && rest.starts_with('1') {
        if let Some(n) = rest[1..].chars().next().and_then(|c| c.to_digit(16)) {
            return Error::RemoteError(RemoteErrorKind::MalformedField(n as u8));
        }
    }
    if let Some(code) = rest.strip_prefix('2') {
        if let Ok(code) = u8::from_str_radix(code, 16) {
            return Error::RemoteError(RemoteErrorKind::TraceApi(code));
        }
    }
    Error::RemoteError(RemoteErrorKind::Opaque(rest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeTransport {
        incoming: VecDeque<String>,
    }

    impl Transport for FakeTransport {
        fn send(&mut self, _packet: &str) -> Result<(), Error> {
            Ok(())
        }
        fn recv(&mut self) -> Result<String, Error> {
            Ok(self.incoming.pop_front().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingConsole {
        chunks: Vec<Vec<u8>>,
    }
    impl ConsoleSink for RecordingConsole {
        fn console_output(&mut self, text: &[u8]) {
            self.chunks.push(text.to_vec());
        }
    }

    #[derive(Default)]
    struct RecordingRegisters {
        updates: Vec<(u32, String)>,
    }
    impl RegisterSink for RecordingRegisters {
        fn update_register(&mut self, regno: u32, raw_hex: &str) {
            self.updates.push((regno, raw_hex.to_string()));
        }
    }

    #[test]
    fn s5_noisy_reply() {
        let mut transport = FakeTransport {
            incoming: VecDeque::from(vec![
                "O48656c6c6f".to_string(),
                "R0a:deadbeef;".to_string(),
                "OK".to_string(),
            ]),
        };
        let mut console = RecordingConsole::default();
        let mut registers = RecordingRegisters::default();
        let reply = ReplyReader::read_reply(&mut transport, &mut console, &mut registers).unwrap();
        assert_eq!(reply, "OK");
        assert_eq!(console.chunks, vec![b"Hello".to_vec()]);
        assert_eq!(registers.updates, vec![(0x0a, "deadbeef".to_string())]);
    }

    #[test]
    fn property_6_never_returns_o_r_e() {
        let mut transport = FakeTransport {
            incoming: VecDeque::from(vec!["Oxyz".to_string(), "F3".to_string()]),
        };
        let mut console = ();
        let mut registers = ();
        let reply = ReplyReader::read_reply(&mut transport, &mut console, &mut registers);
        // "Oxyz" isn't valid hex, so this exercises the error path rather
        // than masking a protocol bug as a silent pass-through.
        assert!(reply.is_err());
    }

    #[test]
    fn returns_first_non_noisy_payload() {
        let mut transport = FakeTransport { incoming: VecDeque::from(vec!["F3".to_string()]) };
        let mut console = ();
        let mut registers = ();
        let reply = ReplyReader::read_reply(&mut transport, &mut console, &mut registers).unwrap();
        assert_eq!(reply, "F3");
    }

    #[test]
    fn empty_reply_is_unsupported() {
        let mut transport = FakeTransport { incoming: VecDeque::from(vec![String::new()]) };
        let mut console = ();
        let mut registers = ();
        let err = ReplyReader::read_reply(&mut transport, &mut console, &mut registers).unwrap_err();
        assert!(matches!(err, Error::Unsupported));
    }

    #[test]
    fn e10_is_malformed_packet() {
        let mut transport = FakeTransport { incoming: VecDeque::from(vec!["E10".to_string()]) };
        let mut console = ();
        let mut registers = ();
        let err = ReplyReader::read_reply(&mut transport, &mut console, &mut registers).unwrap_err();
        assert!(matches!(err, Error::RemoteError(RemoteErrorKind::MalformedPacket)));
    }

    #[test]
    fn e2xx_is_trace_api_error() {
        let mut transport = FakeTransport { incoming: VecDeque::from(vec!["E2ab".to_string()]) };
        let mut console = ();
        let mut registers = ();
        let err = ReplyReader::read_reply(&mut transport, &mut console, &mut registers).unwrap_err();
        assert!(matches!(err, Error::RemoteError(RemoteErrorKind::TraceApi(0xab))));
    }
}
