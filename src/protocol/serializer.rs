//! Renders a tracepoint's compiled program and session-control requests as
//! wire packets.

use crate::compile::CompiledProgram;
use crate::error::Error;
use crate::memrange::CollectionList;
use crate::tracepoint::Tracepoint;

/// Packets with no payload of their own beyond the literal command name.
pub const QTINIT: &str = "QTinit";
pub const QTSTART: &str = "QTStart";
pub const QTSTOP: &str = "QTStop";
pub const QTSTATUS: &str = "qTStatus";

/// Default transport packet-size ceiling. Chosen well above the 2 KiB floor
/// most transports guarantee.
const DEFAULT_MAX_PACKET_SIZE: usize = 2048;

/// Builds `QTDP` and `QTFrame` request strings.
pub struct Serializer {
    max_packet_size: usize,
}

impl Serializer {
    pub fn new() -> Self {
        Serializer { max_packet_size: DEFAULT_MAX_PACKET_SIZE }
    }

    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Serializer { max_packet_size }
    }

    /// Render the `QTDP` packet defining `tp` with its compiled program.
    pub fn define_tracepoint(&self, tp: &Tracepoint, program: &CompiledProgram) -> Result<String, Error> {
        let mut out = format!(
            "QTDP:{:x}:{:x}:{}:{}:{:x}",
            tp.number,
            tp.address,
            if tp.enabled { 'E' } else { 'D' },
            hex_step_count(program.step_count),
            tp.pass_count,
        );

        push_collection(&mut out, &program.trap);
        if !program.stepping.is_empty() {
            out.push('S');
            push_collection(&mut out, &program.stepping);
        }

        if out.len() > self.max_packet_size {
            return Err(Error::TooComplex { tracepoint: tp.number });
        }
        Ok(out)
    }

    pub fn frame_number(&self, n: i64) -> String {
        format!("QTFrame:{}", hex_signed(n))
    }

    pub fn frame_pc(&self, pc: u64) -> String {
        format!("QTFrame:pc:{:x}", pc)
    }

    pub fn frame_tracepoint(&self, tpnum: u32) -> String {
        format!("QTFrame:tdp:{:x}", tpnum)
    }

    pub fn frame_range(&self, start: u64, end: u64) -> String {
        format!("QTFrame:range:{:x}:{:x}", start, end)
    }

    pub fn frame_outside(&self, start: u64, end: u64) -> String {
        format!("QTFrame:outside:{:x}:{:x}", start, end)
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

fn push_collection(out: &mut String, list: &CollectionList) {
    if let Some(hex) = list.registers.to_be_hex() {
        out.push('R');
        out.push_str(&hex);
    }
    for m in &list.memranges {
        let (start, len) = if m.is_absolute() {
            (m.start_unsigned(), m.end_unsigned() - m.start_unsigned())
        } else {
            (m.start as u64, (m.end - m.start) as u64)
        };
        out.push('M');
        out.push_str(&format!("{:x},{:x},{:x}", m.reg_type, start, len));
    }
}

/// `while-stepping`'s `-1` ("unbounded") is rendered as the two's-complement
/// 32-bit hex value, matching the rest of the wire format's hex-only
/// convention (no sign characters).
fn hex_step_count(n: i64) -> String {
    hex_signed(n)
}

fn hex_signed(n: i64) -> String {
    format!("{:x}", n as i32 as u32)
}
