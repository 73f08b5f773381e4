//! Orchestrates session-level commands: starting and stopping a trace
//! experiment, reading back its status, and moving the replay cursor.

use crate::arch::TargetInfo;
use crate::compile::ActionCompiler;
use crate::error::Error;
use crate::protocol::reply::{ConsoleSink, RegisterSink, ReplyReader};
use crate::protocol::serializer::{Serializer, QTINIT, QTSTART, QTSTOP, QTSTATUS};
use crate::symbol::SymbolTable;
use crate::tracepoint::TracepointStore;
use crate::transport::Transport;

/// Debugger-side replay position: which captured frame is "current", and
/// which tracepoint produced it. `(-1, -1)` means "not replaying".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayCursor {
    pub frame: i64,
    pub tracepoint: i64,
}

impl Default for ReplayCursor {
    fn default() -> Self {
        ReplayCursor { frame: -1, tracepoint: -1 }
    }
}

/// Pushes replay-cursor state out to the expression evaluator as named
/// convenience variables. The evaluator itself lives outside this crate.
pub trait ConvenienceSink {
    fn set_tpnum(&mut self, number: u32);
    fn set_trace_frame(&mut self, frame: i64);
    fn set_tracepoint(&mut self, tracepoint: i64);
    fn set_trace_line(&mut self, line: i64);
    fn set_trace_func(&mut self, func: &str);
    fn set_trace_file(&mut self, file: &str);
}

impl ConvenienceSink for () {
    fn set_tpnum(&mut self, _number: u32) {}
    fn set_trace_frame(&mut self, _frame: i64) {}
    fn set_tracepoint(&mut self, _tracepoint: i64) {}
    fn set_trace_line(&mut self, _line: i64) {}
    fn set_trace_func(&mut self, _func: &str) {}
    fn set_trace_file(&mut self, _file: &str) {}
}

/// A convenience-variable reflection a caller can keep around instead of
/// (or alongside) a real expression evaluator, e.g. for a headless
/// integration that just wants to inspect the cursor after a find.
#[derive(Debug, Clone, Default)]
pub struct ConvenienceVariables {
    pub tpnum: u32,
    pub trace_frame: i64,
    pub tracepoint: i64,
    pub trace_line: i64,
    pub trace_func: String,
    pub trace_file: String,
}

impl ConvenienceSink for ConvenienceVariables {
    fn set_tpnum(&mut self, number: u32) {
        self.tpnum = number;
    }
    fn set_trace_frame(&mut self, frame: i64) {
        self.trace_frame = frame;
    }
    fn set_tracepoint(&mut self, tracepoint: i64) {
        self.tracepoint = tracepoint;
    }
    fn set_trace_line(&mut self, line: i64) {
        self.trace_line = line;
    }
    fn set_trace_func(&mut self, func: &str) {
        self.trace_func = func.to_string();
    }
    fn set_trace_file(&mut self, file: &str) {
        self.trace_file = file.to_string();
    }
}

/// What a resolved source line tells us about a PC.
#[derive(Debug, Clone)]
pub struct LineInfo {
    pub file: String,
    pub line: u32,
    pub func: String,
}

/// Resolves PCs to source lines and line specifiers to PC ranges. An
/// external collaborator — this crate has no line table of its own.
pub trait PcResolver {
    fn line_info(&self, pc: u64) -> Option<LineInfo>;
    /// `[start, end)` covered by `loc`. `start == end` means the line has no
    /// code of its own.
    fn resolve_line(&self, loc: &str) -> Option<(u64, u64)>;
    /// The specifier for the line textually following `loc`, used to walk
    /// forward past lines with no code.
    fn next_line(&self, loc: &str) -> Option<String>;
}

/// Synchronises the debugger's notion of "the current frame" with the
/// target after a tracepoint operation. An external collaborator.
pub trait FrameContext {
    /// The PC of the frame currently selected, before any tracing request.
    fn current_pc(&self) -> u64;
    /// Force a re-read of registers and reselect the current frame,
    /// returning its (possibly changed) PC.
    fn resync(&mut self) -> u64;
}

/// A request to move the replay cursor, corresponding to one `tfind` form.
#[derive(Debug, Clone, Copy)]
pub enum FindRequest {
    /// `tfind` with no argument: the next frame after the current one.
    Next,
    /// `tfind -`: the frame before the current one.
    Previous,
    /// `tfind start`: the first frame.
    Start,
    /// `tfind end` / `tfind none`: leave replay.
    None,
    /// `tfind <n>`.
    Frame(i64),
    /// `tfind pc [A]`.
    Pc(u64),
    /// `tfind tracepoint [N]`.
    Tracepoint(u32),
    /// `tfind range A,B`.
    Range(u64, u64),
    /// `tfind outside A,B`.
    Outside(u64, u64),
}

fn parse_hex_signed(field: &str) -> Result<i64, Error> {
    if let Some(rest) = field.strip_prefix('-') {
        let v = i64::from_str_radix(rest, 16)
            .map_err(|_| Error::ProtocolError(format!("malformed frame field: -{}", rest)))?;
        Ok(-v)
    } else {
        let v = i64::from_str_radix(field, 16)
            .map_err(|_| Error::ProtocolError(format!("malformed frame field: {}", field)))?;
        Ok(v)
    }
}

fn parse_hex_u32(field: &str) -> Result<u32, Error> {
    u32::from_str_radix(field, 16)
        .map_err(|_| Error::ProtocolError(format!("malformed tracepoint field: {}", field)))
}

/// Parses a `QTFrame` reply body into its `F`/`T` fields, or recognises the
/// bare `OK` degenerate form.
fn parse_frame_reply(reply: &str) -> Result<(Option<i64>, Option<u32>), Error> {
    if reply == "OK" {
        return Ok((None, None));
    }
    let mut frame = None;
    let mut tp = None;
    let mut rest = reply;
    while !rest.is_empty() {
        let tag = rest.as_bytes()[0] as char;
        rest = &rest[1..];
        let end = rest.find(['F', 'T']).unwrap_or(rest.len());
        let (field, remainder) = rest.split_at(end);
        rest = remainder;
        match tag {
            'F' => frame = Some(parse_hex_signed(field)?),
            'T' => tp = Some(parse_hex_u32(field)?),
            other => return Err(Error::ProtocolError(format!("unexpected frame reply tag '{}'", other))),
        }
    }
    Ok((frame, tp))
}

/// Orchestrates one trace experiment: the tracepoint catalogue, the replay
/// cursor, and the protocol exchanges that drive both.
pub struct TraceSession {
    store: TracepointStore,
    cursor: ReplayCursor,
}

impl TraceSession {
    pub fn new() -> Self {
        TraceSession { store: TracepointStore::new(), cursor: ReplayCursor::default() }
    }

    pub fn store(&self) -> &TracepointStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TracepointStore {
        &mut self.store
    }

    pub fn cursor(&self) -> ReplayCursor {
        self.cursor
    }

    /// `QTinit`, then one `QTDP` per enabled tracepoint, then `QTStart`.
    /// Resets the replay cursor on success. Leaves the store and cursor
    /// untouched on any failure, since `QTStart` is sent only after every
    /// `QTDP` has been individually acknowledged.
    pub fn start<T: TargetInfo>(
        &mut self,
        target: &T,
        symtab: &dyn SymbolTable,
        transport: &mut dyn Transport,
        console: &mut dyn ConsoleSink,
        registers: &mut dyn RegisterSink,
    ) -> Result<(), Error> {
        transport.send(QTINIT)?;
        Self::expect_ok(transport, console, registers)?;

        let numbers: Vec<u32> =
            self.store.iter().filter(|tp| tp.enabled).map(|tp| tp.number).collect();
        let serializer = Serializer::new();
        for number in numbers {
            let compiled = {
                let tp = self.store.get(number).expect("tracepoint vanished mid-start");
                ActionCompiler::new(target, symtab).compile(tp)?
            };
            if let Some(tp) = self.store.get_mut(number) {
                tp.step_count = compiled.step_count;
            }
            let tp = self.store.get(number).expect("tracepoint vanished mid-start");
            let packet = serializer.define_tracepoint(tp, &compiled)?;
            transport.send(&packet)?;
            Self::expect_ok(transport, console, registers)?;
        }

        transport.send(QTSTART)?;
        Self::expect_ok(transport, console, registers)?;
        self.cursor = ReplayCursor::default();
        Ok(())
    }

    pub fn stop(
        &mut self,
        transport: &mut dyn Transport,
        console: &mut dyn ConsoleSink,
        registers: &mut dyn RegisterSink,
    ) -> Result<(), Error> {
        transport.send(QTSTOP)?;
        Self::expect_ok(transport, console, registers)
    }

    pub fn status(
        &mut self,
        transport: &mut dyn Transport,
        console: &mut dyn ConsoleSink,
        registers: &mut dyn RegisterSink,
    ) -> Result<(), Error> {
        transport.send(QTSTATUS)?;
        Self::expect_ok(transport, console, registers)
    }

    fn expect_ok(
        transport: &mut dyn Transport,
        console: &mut dyn ConsoleSink,
        registers: &mut dyn RegisterSink,
    ) -> Result<(), Error> {
        let reply = ReplyReader::read_reply(transport, console, registers)?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(Error::ProtocolError(format!("expected OK, got {}", reply)))
        }
    }

    /// Move the replay cursor per `request`.
    #[allow(clippy::too_many_arguments)]
    pub fn find(
        &mut self,
        request: FindRequest,
        transport: &mut dyn Transport,
        console: &mut dyn ConsoleSink,
        registers: &mut dyn RegisterSink,
        convenience: &mut dyn ConvenienceSink,
        pc_resolver: &dyn PcResolver,
        frame_ctx: &mut dyn FrameContext,
    ) -> Result<(), Error> {
        let serializer = Serializer::new();
        let is_termination = matches!(request, FindRequest::None);
        let packet = match request {
            FindRequest::Next => serializer.frame_number(self.cursor.frame + 1),
            FindRequest::Previous => serializer.frame_number(self.cursor.frame - 1),
            FindRequest::Start => serializer.frame_number(0),
            FindRequest::None => serializer.frame_number(-1),
            FindRequest::Frame(n) => serializer.frame_number(n),
            FindRequest::Pc(pc) => serializer.frame_pc(pc),
            FindRequest::Tracepoint(n) => serializer.frame_tracepoint(n),
            FindRequest::Range(start, end) => serializer.frame_range(start, end),
            FindRequest::Outside(start, end) => serializer.frame_outside(start, end),
        };
        transport.send(&packet)?;
        let reply = ReplyReader::read_reply(transport, console, registers)?;
        self.apply_frame_reply(&reply, is_termination, convenience, pc_resolver, frame_ctx)
    }

    /// `tfind line [LOC]`. With no `loc`, requests a frame outside the
    /// current PC's line range; with one, requests a frame inside the
    /// resolved range. A resolved line with no code of its own (`start ==
    /// end`) is walked forward until one with code is found.
    #[allow(clippy::too_many_arguments)]
    pub fn find_line(
        &mut self,
        loc: Option<&str>,
        transport: &mut dyn Transport,
        console: &mut dyn ConsoleSink,
        registers: &mut dyn RegisterSink,
        convenience: &mut dyn ConvenienceSink,
        pc_resolver: &dyn PcResolver,
        frame_ctx: &mut dyn FrameContext,
    ) -> Result<(), Error> {
        let outside = loc.is_none();
        let (mut start, mut end) = match loc {
            Some(l) => resolve_nonempty_line(pc_resolver, l)?,
            None => {
                let pc = frame_ctx.current_pc();
                let info = pc_resolver
                    .line_info(pc)
                    .ok_or_else(|| Error::NotFound)?;
                resolve_nonempty_line(pc_resolver, &format!("{}:{}", info.file, info.line))?
            }
        };
        // resolve_nonempty_line already walked forward past empty lines.
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }

        let serializer = Serializer::new();
        let packet = if outside {
            serializer.frame_outside(start, end)
        } else {
            serializer.frame_range(start, end)
        };
        transport.send(&packet)?;
        let reply = ReplyReader::read_reply(transport, console, registers)?;
        self.apply_frame_reply(&reply, false, convenience, pc_resolver, frame_ctx)
    }

    fn apply_frame_reply(
        &mut self,
        reply: &str,
        is_termination_request: bool,
        convenience: &mut dyn ConvenienceSink,
        pc_resolver: &dyn PcResolver,
        frame_ctx: &mut dyn FrameContext,
    ) -> Result<(), Error> {
        let (frame, tp) = parse_frame_reply(reply)?;
        let frame = match frame {
            Some(f) => f,
            None => return Ok(()), // bare "OK": no cursor change
        };

        if frame == -1 {
            if is_termination_request {
                self.cursor = ReplayCursor::default();
                convenience.set_trace_frame(-1);
                convenience.set_tracepoint(-1);
                convenience.set_tpnum(0);
                convenience.set_trace_line(-1);
                convenience.set_trace_func("");
                convenience.set_trace_file("");
                return Ok(());
            }
            return Err(Error::NotFound);
        }

        let tracepoint = tp.map(|n| n as i64).unwrap_or(self.cursor.tracepoint);
        self.cursor = ReplayCursor { frame, tracepoint };
        convenience.set_trace_frame(frame);
        convenience.set_tracepoint(tracepoint);
        if let Some(n) = tp {
            convenience.set_tpnum(n);
        }

        let pc = frame_ctx.resync();
        match pc_resolver.line_info(pc) {
            Some(info) => {
                convenience.set_trace_line(info.line as i64);
                convenience.set_trace_func(&info.func);
                convenience.set_trace_file(&info.file);
            }
            None => {
                convenience.set_trace_line(-1);
                convenience.set_trace_func("");
                convenience.set_trace_file("");
            }
        }
        Ok(())
    }
}

impl Default for TraceSession {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_nonempty_line(resolver: &dyn PcResolver, loc: &str) -> Result<(u64, u64), Error> {
    let mut loc = loc.to_string();
    loop {
        let (start, end) = resolver
            .resolve_line(&loc)
            .ok_or_else(|| Error::InvalidArgument(format!("no code at {}", loc)))?;
        if start != end {
            return Ok((start, end));
        }
        loc = resolver
            .next_line(&loc)
            .ok_or_else(|| Error::InvalidArgument(format!("no line with code after {}", loc)))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeTransport {
        incoming: VecDeque<String>,
        sent: Vec<String>,
    }

    impl Transport for FakeTransport {
        fn send(&mut self, packet: &str) -> Result<(), Error> {
            self.sent.push(packet.to_string());
            Ok(())
        }
        fn recv(&mut self) -> Result<String, Error> {
            Ok(self.incoming.pop_front().unwrap_or_default())
        }
    }

    struct FakeResolver;
    impl PcResolver for FakeResolver {
        fn line_info(&self, pc: u64) -> Option<LineInfo> {
            Some(LineInfo { file: "main.c".into(), line: (pc / 4) as u32, func: "main".into() })
        }
        fn resolve_line(&self, _loc: &str) -> Option<(u64, u64)> {
            Some((0x1000, 0x1010))
        }
        fn next_line(&self, _loc: &str) -> Option<String> {
            None
        }
    }

    struct FakeFrameContext {
        pc: u64,
    }
    impl FrameContext for FakeFrameContext {
        fn current_pc(&self) -> u64 {
            self.pc
        }
        fn resync(&mut self) -> u64 {
            self.pc
        }
    }

    #[test]
    fn stop_and_status_expect_ok() {
        let mut session = TraceSession::new();
        let mut transport =
            FakeTransport { incoming: VecDeque::from(vec!["OK".to_string()]), sent: Vec::new() };
        let mut console = ();
        let mut registers = ();
        session.stop(&mut transport, &mut console, &mut registers).unwrap();
        assert_eq!(transport.sent, vec![QTSTOP]);
    }

    #[test]
    fn property_7_tfind_success_updates_cursor_and_convenience() {
        let mut session = TraceSession::new();
        let mut transport =
            FakeTransport { incoming: VecDeque::from(vec!["F3T2".to_string()]), sent: Vec::new() };
        let mut console = ();
        let mut registers = ();
        let mut convenience = ConvenienceVariables::default();
        let resolver = FakeResolver;
        let mut frame_ctx = FakeFrameContext { pc: 0x1000 };

        session
            .find(
                FindRequest::Frame(3),
                &mut transport,
                &mut console,
                &mut registers,
                &mut convenience,
                &resolver,
                &mut frame_ctx,
            )
            .unwrap();

        assert_eq!(session.cursor(), ReplayCursor { frame: 3, tracepoint: 2 });
        assert_eq!(convenience.trace_frame, 3);
        assert_eq!(convenience.tracepoint, 2);
        assert_eq!(convenience.tpnum, 2);
    }

    #[test]
    fn s6_tfind_none_resets_cursor() {
        let mut session = TraceSession::new();
        session.cursor = ReplayCursor { frame: 5, tracepoint: 1 };
        let mut transport =
            FakeTransport { incoming: VecDeque::from(vec!["F-1".to_string()]), sent: Vec::new() };
        let mut console = ();
        let mut registers = ();
        let mut convenience = ConvenienceVariables::default();
        let resolver = FakeResolver;
        let mut frame_ctx = FakeFrameContext { pc: 0x1000 };

        session
            .find(
                FindRequest::None,
                &mut transport,
                &mut console,
                &mut registers,
                &mut convenience,
                &resolver,
                &mut frame_ctx,
            )
            .unwrap();

        assert_eq!(session.cursor(), ReplayCursor::default());
        assert_eq!(convenience.trace_line, -1);
        assert_eq!(convenience.trace_func, "");
        assert_eq!(convenience.trace_file, "");
    }

    #[test]
    fn tfind_not_found_leaves_cursor_untouched() {
        let mut session = TraceSession::new();
        session.cursor = ReplayCursor { frame: 5, tracepoint: 1 };
        let mut transport =
            FakeTransport { incoming: VecDeque::from(vec!["F-1".to_string()]), sent: Vec::new() };
        let mut console = ();
        let mut registers = ();
        let mut convenience = ConvenienceVariables::default();
        let resolver = FakeResolver;
        let mut frame_ctx = FakeFrameContext { pc: 0x1000 };

        let err = session
            .find(
                FindRequest::Frame(9),
                &mut transport,
                &mut console,
                &mut registers,
                &mut convenience,
                &resolver,
                &mut frame_ctx,
            )
            .unwrap_err();

        assert!(matches!(err, Error::NotFound));
        assert_eq!(session.cursor(), ReplayCursor { frame: 5, tracepoint: 1 });
    }
}
