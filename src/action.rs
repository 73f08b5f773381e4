//! Grammar and classification for one line of a tracepoint's action
//! program: `collect …`, `while-stepping N`, `end`.
//!
//! This is a hand-rolled recursive-descent-free parser in the same spirit as
//! `gdbstub`'s packet parsing (`protocol/commands/*.rs`) — the grammar is
//! small and line-oriented, so a state machine or parser-combinator crate
//! would be more machinery than the problem needs.

use crate::symbol::{StorageClass, SymbolTable};

/// One item of a `collect` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectItem {
    /// `$reg` — every register visible at this PC.
    AllRegisters,
    /// `$arg` — every argument visible at this PC.
    AllArguments,
    /// `$loc` — every local visible at this PC.
    AllLocals,
    /// `$(...)` — a literal memrange, optionally based on a named register.
    LiteralMemrange {
        register: Option<String>,
        offset: i64,
        len: u32,
    },
    /// A bare `$name` register reference.
    Register(String),
    /// A bare variable name, resolved against the symbol table at compile
    /// time.
    Variable(String),
}

/// The classified kind of one action line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Collect(Vec<CollectItem>),
    WhileStepping(i64),
    End,
    /// Grammar violation, or an empty line. Never stored in a tracepoint's
    /// action list — the interactive editor drops it after warning (see
    /// [`crate::tracepoint::ActionEditor`]).
    Invalid,
}

/// A raw source line plus its classified kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLine {
    pub raw: String,
    pub kind: ActionKind,
}

fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut depth = 0i32;
    let mut start = 0;
    let mut out = Vec::new();
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

fn split_keyword(trimmed: &str) -> (&str, &str) {
    match trimmed.find(char::is_whitespace) {
        Some(idx) => (&trimmed[..idx], trimmed[idx..].trim_start()),
        None => (trimmed, ""),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_signed(s: &str) -> Option<i64> {
    let s = s.trim();
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    let val: i64 = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        rest.parse().ok()?
    };
    Some(if neg { -val } else { val })
}

fn parse_positive(s: &str) -> Option<u32> {
    match parse_signed(s)? {
        n if n > 0 => Some(n as u32),
        _ => None,
    }
}

fn parse_literal_memrange(body: &str) -> Result<CollectItem, String> {
    let parts = split_top_level_commas(body);
    let (register, offset_str, len_str) = match parts.as_slice() {
        [reg, offset, len] => {
            let reg = reg
                .trim()
                .strip_prefix('$')
                .ok_or_else(|| "memrange base register must start with $".to_string())?;
            (Some(reg.to_string()), *offset, *len)
        }
        [offset, len] => (None, *offset, *len),
        _ => {
            return Err("literal memrange must be ($reg,offset,len) or (offset,len)".to_string())
        }
    };
    let offset = parse_signed(offset_str).ok_or_else(|| "malformed memrange offset".to_string())?;
    let len = parse_positive(len_str).ok_or_else(|| "memrange length must be positive".to_string())?;
    Ok(CollectItem::LiteralMemrange { register, offset, len })
}

fn parse_collect_item(item: &str) -> Result<CollectItem, String> {
    let item = item.trim();
    if item.is_empty() {
        return Err("empty collect item".to_string());
    }
    if item.eq_ignore_ascii_case("$reg") {
        return Ok(CollectItem::AllRegisters);
    }
    if item.eq_ignore_ascii_case("$arg") {
        return Ok(CollectItem::AllArguments);
    }
    if item.eq_ignore_ascii_case("$loc") {
        return Ok(CollectItem::AllLocals);
    }
    if let Some(body) = item.strip_prefix("$(").and_then(|s| s.strip_suffix(')')) {
        return parse_literal_memrange(body);
    }
    if let Some(regname) = item.strip_prefix('$') {
        if is_identifier(regname) {
            return Ok(CollectItem::Register(regname.to_string()));
        }
        return Err("enter variable name or register".to_string());
    }
    if is_identifier(item) {
        return Ok(CollectItem::Variable(item.to_string()));
    }
    Err("enter variable name or register".to_string())
}

/// Validates one action line against the grammar and classifies its kind.
///
/// Never fails outright: a grammar violation becomes
/// [`ActionKind::Invalid`], with the reason logged as a warning. It is the
/// caller's job (typically the tracepoint's interactive action editor) to
/// drop `Invalid` lines rather than append them.
pub struct ActionParser;

impl ActionParser {
    pub fn parse_line(raw: &str) -> ActionLine {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ActionLine { raw: raw.to_string(), kind: ActionKind::Invalid };
        }

        let (keyword, rest) = split_keyword(trimmed);

        let kind = if keyword.eq_ignore_ascii_case("end") {
            if rest.is_empty() {
                ActionKind::End
            } else {
                log::warn!("unexpected text after 'end': {}", rest);
                ActionKind::Invalid
            }
        } else if keyword.eq_ignore_ascii_case("while-stepping") {
            if rest.is_empty() {
                ActionKind::WhileStepping(-1)
            } else {
                match parse_signed(rest) {
                    Some(n) if n > 0 => ActionKind::WhileStepping(n),
                    _ => {
                        log::warn!("while-stepping count must be a positive integer");
                        ActionKind::Invalid
                    }
                }
            }
        } else if keyword.eq_ignore_ascii_case("collect") {
            if rest.is_empty() {
                log::warn!("collect requires at least one item");
                ActionKind::Invalid
            } else {
                let mut items = Vec::new();
                let mut bad = false;
                for part in split_top_level_commas(rest) {
                    match parse_collect_item(part) {
                        Ok(item) => items.push(item),
                        Err(msg) => {
                            log::warn!("{}", msg);
                            bad = true;
                        }
                    }
                }
                if bad {
                    ActionKind::Invalid
                } else {
                    ActionKind::Collect(items)
                }
            }
        } else {
            log::warn!("unrecognized action line: {}", trimmed);
            ActionKind::Invalid
        };

        ActionLine { raw: raw.to_string(), kind }
    }
}

/// Re-checks an already-parsed `collect` line against symbol-table context,
/// applying the grammar's one rule [`ActionParser::parse_line`] cannot check
/// on its own: "a resolved variable whose storage class is optimized-out or
/// constant is also rejected with a warning" — the whole line becomes
/// [`ActionKind::Invalid`], exactly as an unrecognised item like `collect
/// 42` does.
///
/// `line` must already be grammar-valid; anything other than
/// [`ActionKind::Collect`] is returned unchanged. `pc` is the tracepoint's
/// address — the PC at which its actions' variables resolve.
pub fn reject_unresolvable_variables(
    line: ActionLine,
    pc: u64,
    symtab: &dyn SymbolTable,
) -> ActionLine {
    let items = match &line.kind {
        ActionKind::Collect(items) => items,
        _ => return line,
    };
    for item in items {
        if let CollectItem::Variable(name) = item {
            if let Some(sym) = symtab.lookup(pc, name) {
                if matches!(sym.class, StorageClass::Const | StorageClass::OptimizedOut) {
                    log::warn!("{}: optimized out or a constant, enter a different variable", name);
                    return ActionLine { raw: line.raw, kind: ActionKind::Invalid };
                }
            }
        }
    }
    line
}
