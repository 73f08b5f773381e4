//! The catalogue of tracepoints: numbering, lifecycle, and the interactive
//! multi-line action editor.

use crate::action::{reject_unresolvable_variables, ActionKind, ActionLine, ActionParser};
use crate::error::Error;
use crate::symbol::SymbolTable;

/// Where a tracepoint's address came from, kept around so it can be
/// re-resolved (e.g. after the symbol table reloads) and so
/// `save-tracepoints` can emit a source-level locator rather than a bare
/// address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    pub file: String,
    pub line: u32,
    /// The canonical `*0x...`-style address string GDB itself would print
    /// for this location.
    pub canonical_address: String,
}

/// One user-defined trace location and its action program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracepoint {
    pub number: u32,
    pub address: u64,
    pub source: Option<SourceLocator>,
    /// The source language active when this tracepoint was defined, so its
    /// action expressions can be re-parsed in the right lexical context.
    pub language: String,
    pub input_radix: u32,
    pub enabled: bool,
    /// 0 means unlimited.
    pub pass_count: u64,
    /// How many instructions to single-step after a hit. 0 means none; -1
    /// means unbounded (set by a bare `while-stepping` with no operand).
    pub step_count: i64,
    pub condition: Option<String>,
    pub actions: Vec<ActionLine>,
}

impl Tracepoint {
    pub fn new(number: u32, address: u64) -> Self {
        Tracepoint {
            number,
            address,
            source: None,
            language: String::new(),
            input_radix: 10,
            enabled: true,
            pass_count: 0,
            step_count: 0,
            condition: None,
            actions: Vec::new(),
        }
    }
}

/// Notified of tracepoint lifecycle events. The concrete implementation
/// (driving a CLI listing, a TUI panel, …) lives outside this crate.
pub trait UiHook {
    fn tracepoint_created(&mut self, _tp: &Tracepoint) {}
    fn tracepoint_deleted(&mut self, _number: u32) {}
}

/// No-op [`UiHook`] for callers that don't need one.
impl UiHook for () {}

pub use crate::session::ConvenienceSink;

/// Evaluates a convenience-variable reference (`$foo`) to an integer, for
/// `lookup_by_number`'s "number or convenience variable" argument form.
pub trait ExpressionEvaluator {
    fn eval_to_integer(&self, expr: &str) -> Result<i64, Error>;
}

/// An in-progress multi-line `actions` edit.
///
/// Lines accumulate here rather than directly on the [`Tracepoint`] so that
/// a user-abort (a quit signal during the interactive read) discards exactly
/// the partial list and nothing else. The discard is automatic: drop the
/// editor without calling [`ActionEditor::commit`] and the accumulated lines
/// simply go away with it.
pub struct ActionEditor<'a> {
    lines: Vec<ActionLine>,
    depth: u32,
    committed: bool,
    /// The tracepoint's PC and a live symbol table, when the caller has
    /// both available. When present, a `collect` line naming a variable
    /// that resolves to an optimized-out or constant storage class is
    /// rejected at entry time with a warning, the same outcome as an
    /// unrecognised item; when absent (e.g.
    /// [`TracepointStore::load_script`], which has no symbol table of its
    /// own), that check is deferred to compile time, where
    /// [`crate::symbol::SymbolCollector::collect`] still catches it —
    /// weaker only in that the line survives into the action list rather
    /// than being dropped up front.
    context: Option<(u64, &'a dyn SymbolTable)>,
}

/// What happened after feeding one line to an [`ActionEditor`].
pub enum EditorProgress {
    /// Keep reading lines.
    Continue,
    /// The outer `end` was seen; the action list is complete.
    Complete,
}

impl<'a> ActionEditor<'a> {
    /// An editor with no symbol-table context: `collect` lines are
    /// validated against grammar only, the same as
    /// [`TracepointStore::load_script`] replaying a saved script.
    pub fn new() -> Self {
        ActionEditor { lines: Vec::new(), depth: 0, committed: false, context: None }
    }

    /// An editor that eagerly rejects `collect` lines naming an
    /// optimized-out or constant variable, resolving names against
    /// `symtab` at `pc` (the tracepoint's address). This is the form an
    /// embedding debugger's `actions` command should use, since it has a
    /// live symbol table to ask.
    pub fn with_symbols(pc: u64, symtab: &'a dyn SymbolTable) -> Self {
        ActionEditor { lines: Vec::new(), depth: 0, committed: false, context: Some((pc, symtab)) }
    }

    /// Feed one raw line from the user. Grammar-invalid lines, and (with
    /// symbol-table context) lines naming an unresolvable variable, are
    /// dropped and do not end the edit.
    pub fn feed_line(&mut self, raw: &str) -> EditorProgress {
        let parsed = ActionParser::parse_line(raw);
        let parsed = match self.context {
            Some((pc, symtab)) => reject_unresolvable_variables(parsed, pc, symtab),
            None => parsed,
        };
        match &parsed.kind {
            ActionKind::Invalid => EditorProgress::Continue,
            ActionKind::WhileStepping(_) => {
                self.depth += 1;
                self.lines.push(parsed);
                EditorProgress::Continue
            }
            ActionKind::End => {
                if self.depth > 0 {
                    self.depth -= 1;
                    self.lines.push(parsed);
                    EditorProgress::Continue
                } else {
                    EditorProgress::Complete
                }
            }
            ActionKind::Collect(_) => {
                self.lines.push(parsed);
                EditorProgress::Continue
            }
        }
    }

    /// Finish the edit, handing back the accumulated lines.
    pub fn commit(mut self) -> Vec<ActionLine> {
        self.committed = true;
        std::mem::take(&mut self.lines)
    }
}

impl<'a> Default for ActionEditor<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Drop for ActionEditor<'a> {
    fn drop(&mut self) {
        if !self.committed && !self.lines.is_empty() {
            log::debug!("discarding {} partially-entered action line(s)", self.lines.len());
        }
    }
}

/// Either a single tracepoint number or "all of them", for bulk commands.
#[derive(Debug, Clone, Copy)]
pub enum TracepointTarget {
    Number(u32),
    All,
}

/// The catalogue of tracepoints for one debugging session.
///
/// Owns every [`Tracepoint`] exclusively — no other component keeps a
/// durable reference to one.
#[derive(Default)]
pub struct TracepointStore {
    tracepoints: Vec<Tracepoint>,
    count: u32,
}

impl TracepointStore {
    pub fn new() -> Self {
        TracepointStore { tracepoints: Vec::new(), count: 0 }
    }

    /// Create a new tracepoint at `address`. Any error-producing validation
    /// (resolving `address`, checking the source locator) must happen
    /// before calling this — once called, creation cannot fail partway
    /// through.
    pub fn create(
        &mut self,
        address: u64,
        source: Option<SourceLocator>,
        language: String,
        input_radix: u32,
        convenience: &mut dyn ConvenienceSink,
        hooks: &mut dyn UiHook,
    ) -> u32 {
        self.count += 1;
        let number = self.count;
        let mut tp = Tracepoint::new(number, address);
        tp.source = source;
        tp.language = language;
        tp.input_radix = input_radix;
        self.tracepoints.push(tp);
        convenience.set_tpnum(number);
        hooks.tracepoint_created(self.tracepoints.last().unwrap());
        number
    }

    /// Resolve a tracepoint-number argument: empty string means "the last
    /// one created"; a decimal number is looked up directly; anything
    /// starting with `$` is evaluated as a convenience variable.
    ///
    /// An unknown tracepoint number warns and returns `Ok(None)` rather than
    /// failing the command outright. Anything else that fails to parse is
    /// `Err(InvalidArgument)`.
    pub fn lookup_by_number(
        &self,
        text: &str,
        eval: &dyn ExpressionEvaluator,
    ) -> Result<Option<&Tracepoint>, Error> {
        let text = text.trim();
        let number = if text.is_empty() {
            return Ok(self.tracepoints.last());
        } else if let Some(expr) = text.strip_prefix('$') {
            eval.eval_to_integer(expr)?
        } else {
            text.parse::<i64>()
                .map_err(|_| Error::InvalidArgument(format!("bad tracepoint number: {}", text)))?
        };

        if number < 0 {
            return Err(Error::InvalidArgument(format!("bad tracepoint number: {}", number)));
        }
        let number = number as u32;
        match self.tracepoints.iter().find(|tp| tp.number == number) {
            Some(tp) => Ok(Some(tp)),
            None => {
                log::warn!("no tracepoint number {}", number);
                Ok(None)
            }
        }
    }

    fn numbers(&self, target: &[u32]) -> Vec<u32> {
        if target.is_empty() {
            self.tracepoints.iter().map(|tp| tp.number).collect()
        } else {
            target.to_vec()
        }
    }

    /// Enable every tracepoint named in `numbers` (all of them, if empty).
    /// Idempotent. Returns one warning per number that did not exist.
    pub fn enable(&mut self, numbers: &[u32]) -> Vec<Error> {
        self.set_enabled(numbers, true)
    }

    /// Disable every tracepoint named in `numbers` (all of them, if empty).
    pub fn disable(&mut self, numbers: &[u32]) -> Vec<Error> {
        self.set_enabled(numbers, false)
    }

    fn set_enabled(&mut self, numbers: &[u32], enabled: bool) -> Vec<Error> {
        let mut problems = Vec::new();
        for n in self.numbers(numbers) {
            match self.tracepoints.iter_mut().find(|tp| tp.number == n) {
                Some(tp) => tp.enabled = enabled,
                None => problems.push(Error::UnknownTracepoint(n.to_string())),
            }
        }
        problems
    }

    /// Delete the tracepoints named in `numbers` (all of them, if empty).
    /// Deleting "all" requires the caller to have already obtained
    /// interactive confirmation (`confirmed`); this crate has no UI of its
    /// own to ask with.
    pub fn delete(&mut self, numbers: &[u32], confirmed: bool, hooks: &mut dyn UiHook) -> Vec<Error> {
        if numbers.is_empty() && !confirmed {
            return Vec::new();
        }
        let mut problems = Vec::new();
        for n in self.numbers(numbers) {
            match self.tracepoints.iter().position(|tp| tp.number == n) {
                Some(idx) => {
                    self.tracepoints.remove(idx);
                    hooks.tracepoint_deleted(n);
                }
                None => problems.push(Error::UnknownTracepoint(n.to_string())),
            }
        }
        problems
    }

    /// Set the pass count on one tracepoint, or every tracepoint.
    pub fn set_pass_count(&mut self, target: TracepointTarget, count: u64) -> Result<(), Error> {
        match target {
            TracepointTarget::All => {
                for tp in self.tracepoints.iter_mut() {
                    tp.pass_count = count;
                }
                Ok(())
            }
            TracepointTarget::Number(n) => {
                match self.tracepoints.iter_mut().find(|tp| tp.number == n) {
                    Some(tp) => {
                        tp.pass_count = count;
                        Ok(())
                    }
                    None => {
                        log::warn!("no tracepoint number {}", n);
                        Ok(())
                    }
                }
            }
        }
    }

    pub fn get(&self, number: u32) -> Option<&Tracepoint> {
        self.tracepoints.iter().find(|tp| tp.number == number)
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut Tracepoint> {
        self.tracepoints.iter_mut().find(|tp| tp.number == number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tracepoint> {
        self.tracepoints.iter()
    }

    pub fn iter_filtered<'a>(&'a self, numbers: &'a [u32]) -> impl Iterator<Item = &'a Tracepoint> + 'a {
        self.tracepoints.iter().filter(move |tp| numbers.is_empty() || numbers.contains(&tp.number))
    }

    pub fn len(&self) -> usize {
        self.tracepoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracepoints.is_empty()
    }

    /// Render the catalogue as a `save-tracepoints` script. Re-sourcing it
    /// via [`TracepointStore::load_script`] against a fresh store
    /// reconstructs an equivalent one (modulo numbering).
    pub fn save(&self) -> String {
        let mut out = String::new();
        for tp in &self.tracepoints {
            out.push_str(&format!("trace *0x{:x}\n", tp.address));
            if let Some(cond) = &tp.condition {
                out.push_str(&format!("  cond {}\n", cond));
            }
            if tp.pass_count != 0 {
                out.push_str(&format!("  passcount {}\n", tp.pass_count));
            }
            if !tp.actions.is_empty() {
                out.push_str("  actions\n");
                let mut indent = 2;
                for line in &tp.actions {
                    out.push_str(&"  ".repeat(indent));
                    out.push_str(&line.raw);
                    out.push('\n');
                    if matches!(line.kind, ActionKind::WhileStepping(_)) {
                        indent += 1;
                    } else if matches!(line.kind, ActionKind::End) && indent > 2 {
                        indent -= 1;
                    }
                }
                out.push_str("  end\n");
            }
        }
        out
    }

    /// Replay a `save-tracepoints` script, one line at a time, reconstructing
    /// tracepoints in a fresh or existing store.
    ///
    /// Only the `*0x...`/bare-hex address form of `trace` is understood —
    /// re-resolving a source-level linespec is the symbol table's job, not
    /// this crate's. Addresses produced by [`TracepointStore::save`] are
    /// always in this form, so the round trip holds.
    pub fn load_script(
        &mut self,
        script: &str,
        convenience: &mut dyn ConvenienceSink,
        hooks: &mut dyn UiHook,
    ) -> Result<Vec<u32>, Error> {
        enum State {
            TopLevel,
            InActions,
        }
        let mut state = State::TopLevel;
        let mut created = Vec::new();
        let mut editor: Option<ActionEditor<'_>> = None;
        let mut current: Option<u32> = None;

        for raw_line in script.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            match state {
                State::TopLevel => {
                    if let Some(rest) = line.strip_prefix("trace ") {
                        let addr = parse_address(rest.trim())?;
                        let n = self.create(addr, None, String::new(), 10, convenience, hooks);
                        created.push(n);
                        current = Some(n);
                    } else if let Some(rest) = line.strip_prefix("passcount ") {
                        let count: u64 = rest
                            .trim()
                            .parse()
                            .map_err(|_| Error::InvalidArgument(format!("bad passcount: {}", rest)))?;
                        if let Some(n) = current {
                            self.set_pass_count(TracepointTarget::Number(n), count)?;
                        }
                    } else if let Some(rest) = line.strip_prefix("cond ") {
                        if let Some(n) = current.and_then(|n| self.get_mut(n)) {
                            n.condition = Some(rest.trim().to_string());
                        }
                    } else if line == "actions" {
                        editor = Some(ActionEditor::new());
                        state = State::InActions;
                    } else {
                        return Err(Error::InvalidArgument(format!("unexpected line: {}", line)));
                    }
                }
                State::InActions => {
                    if line == "end" && editor.as_ref().map(|e| e.depth) == Some(0) {
                        if let (Some(n), Some(e)) = (current, editor.take()) {
                            if let Some(tp) = self.get_mut(n) {
                                tp.actions = e.commit();
                            }
                        }
                        state = State::TopLevel;
                    } else if let Some(e) = editor.as_mut() {
                        e.feed_line(line);
                    }
                }
            }
        }
        Ok(created)
    }
}

fn parse_address(text: &str) -> Result<u64, Error> {
    let text = text.strip_prefix('*').unwrap_or(text);
    let text = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    u64::from_str_radix(text, 16).map_err(|_| Error::InvalidArgument(format!("bad address: {}", text)))
}

/// Parses the `NS…` argument of `enable`/`disable`/`delete tracepoints` and
/// `passcount`: a space- and/or comma-separated list of decimal tracepoint
/// numbers. An empty or all-whitespace `text` yields an empty list, meaning
/// "every tracepoint" to the operations that accept it.
pub fn parse_number_list(text: &str) -> Result<Vec<u32>, Error> {
    text.split([' ', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().map_err(|_| Error::InvalidArgument(format!("bad tracepoint number: {}", s))))
        .collect()
}
