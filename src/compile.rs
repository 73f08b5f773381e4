//! Walks a tracepoint's action list and emits the canonical trap and
//! stepping collection programs.

use crate::action::{ActionKind, CollectItem};
use crate::arch::TargetInfo;
use crate::error::Error;
use crate::memrange::{CollectionList, MemrangeSet};
use crate::symbol::SymbolCollector;
use crate::symbol::SymbolTable;
use crate::tracepoint::Tracepoint;

/// The two collection programs produced by compiling one tracepoint.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// Collected when the tracepoint itself is hit.
    pub trap: CollectionList,
    /// Collected on each single-step after the hit. Non-empty only if the
    /// action list contained a `while-stepping` block.
    pub stepping: CollectionList,
    /// How many instructions to single-step after the hit. `-1` means
    /// "unbounded, target decides"; `0` means no stepping at all.
    pub step_count: i64,
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Active {
    Trap,
    Stepping,
}

/// Compiles a [`Tracepoint`]'s action list into a [`CompiledProgram`].
pub struct ActionCompiler<'t, T> {
    target: &'t T,
    symtab: &'t dyn SymbolTable,
}

impl<'t, T: TargetInfo> ActionCompiler<'t, T> {
    pub fn new(target: &'t T, symtab: &'t dyn SymbolTable) -> Self {
        ActionCompiler { target, symtab }
    }

    pub fn compile(&self, tp: &Tracepoint) -> Result<CompiledProgram, Error> {
        let collector = SymbolCollector::new(self.target);
        let register_count = self.target.register_count();
        let mut trap = MemrangeSet::new(register_count);
        let mut stepping = MemrangeSet::new(register_count);
        let mut active = Active::Trap;
        let mut step_count: i64 = 0;

        for line in &tp.actions {
            match &line.kind {
                ActionKind::Collect(items) => {
                    let set = match active {
                        Active::Trap => &mut trap,
                        Active::Stepping => &mut stepping,
                    };
                    for item in items {
                        self.compile_item(item, tp.address, &collector, set)?;
                    }
                }
                ActionKind::WhileStepping(n) => {
                    step_count = *n;
                    active = Active::Stepping;
                }
                ActionKind::End => match active {
                    Active::Stepping => active = Active::Trap,
                    Active::Trap => break,
                },
                ActionKind::Invalid => {
                    log::warn!("skipping invalid action line: {}", line.raw);
                }
            }
        }

        let max_gap = self.target.max_register_virtual_size();
        Ok(CompiledProgram {
            trap: trap.finalize(max_gap),
            stepping: stepping.finalize(max_gap),
            step_count,
        })
    }

    fn compile_item(
        &self,
        item: &CollectItem,
        pc: u64,
        collector: &SymbolCollector<'_, T>,
        set: &mut MemrangeSet,
    ) -> Result<(), Error> {
        match item {
            CollectItem::AllRegisters => collector.collect_all_registers(set),
            CollectItem::AllArguments => collector.collect_all_arguments(self.symtab, pc, set),
            CollectItem::AllLocals => collector.collect_all_locals(self.symtab, pc, set),
            CollectItem::LiteralMemrange { register, offset, len } => {
                let reg_type = match register {
                    Some(name) => match self.target.register_by_name(name) {
                        Some(r) => r,
                        None => {
                            log::warn!("{}: no such register", name);
                            return Ok(());
                        }
                    },
                    None => 0,
                };
                set.add_memrange(reg_type, *offset, *len)
            }
            CollectItem::Register(name) => match self.target.register_by_name(name) {
                Some(r) => set.add_register(r),
                None => {
                    log::warn!("{}: no such register", name);
                    Ok(())
                }
            },
            CollectItem::Variable(name) => match self.symtab.lookup(pc, name) {
                Some(sym) => collector.collect(&sym, set),
                None => {
                    log::warn!("{}: no symbol in context", name);
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionParser;
    use crate::arch::test_double::FakeTarget;
    use crate::symbol::{BlockId, ResolvedSymbol, StorageClass};
    use std::collections::HashMap;

    struct FlatSymtab {
        syms: HashMap<String, ResolvedSymbol>,
    }

    impl SymbolTable for FlatSymtab {
        fn lookup(&self, _pc: u64, name: &str) -> Option<ResolvedSymbol> {
            self.syms.get(name).cloned()
        }
        fn innermost_block(&self, _pc: u64) -> Option<BlockId> {
            None
        }
        fn parent_block(&self, _block: BlockId) -> Option<BlockId> {
            None
        }
        fn is_function_boundary(&self, _block: BlockId) -> bool {
            true
        }
        fn symbols_in_block(&self, _block: BlockId) -> Vec<ResolvedSymbol> {
            Vec::new()
        }
    }

    fn make_tracepoint(lines: &[&str]) -> Tracepoint {
        let mut tp = Tracepoint::new(1, 0x4000);
        for l in lines {
            let parsed = ActionParser::parse_line(l);
            if parsed.kind != crate::action::ActionKind::Invalid {
                tp.actions.push(parsed);
            }
        }
        tp
    }

    #[test]
    fn stepping_program_requires_while_stepping_keyword() {
        let target = FakeTarget::default();
        let symtab = FlatSymtab { syms: HashMap::new() };
        let tp = make_tracepoint(&["collect $reg"]);
        let compiled = ActionCompiler::new(&target, &symtab).compile(&tp).unwrap();
        assert!(compiled.stepping.is_empty());
    }

    #[test]
    fn while_stepping_splits_trap_and_stepping_programs() {
        let mut target = FakeTarget::default();
        target.types.insert(4, 4);
        let symtab = FlatSymtab {
            syms: [(
                "counter".to_string(),
                ResolvedSymbol {
                    name: "counter".into(),
                    class: StorageClass::Static,
                    value: 0x8000,
                    base_reg: None,
                    ty: crate::arch::TypeId(4),
                },
            )]
            .into_iter()
            .collect(),
        };
        let tp = make_tracepoint(&[
            "collect $(r7,0,4)",
            "while-stepping 5",
            "collect counter",
            "end",
        ]);
        let compiled = ActionCompiler::new(&target, &symtab).compile(&tp).unwrap();
        assert_eq!(compiled.step_count, 5);
        assert_eq!(compiled.trap.memranges.len(), 1);
        assert_eq!(compiled.stepping.memranges.len(), 1);
        assert_eq!(compiled.stepping.memranges[0].start, 0x8000);
    }

    #[test]
    fn s3_minimal_program_is_empty() {
        let target = FakeTarget::default();
        let symtab = FlatSymtab { syms: HashMap::new() };
        let tp = Tracepoint::new(2, 0x4000);
        let compiled = ActionCompiler::new(&target, &symtab).compile(&tp).unwrap();
        assert!(compiled.trap.is_empty());
        assert!(compiled.stepping.is_empty());
        assert_eq!(compiled.step_count, 0);
    }

    #[test]
    fn unresolved_variable_is_skipped_not_fatal() {
        let target = FakeTarget::default();
        let symtab = FlatSymtab { syms: HashMap::new() };
        let tp = make_tracepoint(&["collect ghost"]);
        let compiled = ActionCompiler::new(&target, &symtab).compile(&tp).unwrap();
        assert!(compiled.trap.is_empty());
    }
}
