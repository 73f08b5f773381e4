//! Storage-class-driven mapping from a source-level symbol to the
//! register/memrange entries that collect it.
//!
//! The symbol table itself — name resolution, lexical scoping, line tables —
//! is an external collaborator (see the crate-level docs): this module only
//! asks it the narrow set of questions needed to turn a [`ResolvedSymbol`]
//! into collection descriptors, the same way `gdbstub`'s `target/ext`
//! modules ask a `Target` impl for just the facts a given RSP extension
//! needs rather than modeling the whole target.

use crate::arch::{TargetInfo, TypeId};
use crate::error::Error;
use crate::memrange::MemrangeSet;

/// The storage class of a resolved symbol, as reported by the symbol table.
///
/// Classes not handled by [`SymbolCollector::collect`] (`Const`,
/// `OptimizedOut`, `Unresolved`, `Arg`, `RefArg`) produce a diagnostic and no
/// emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// A global/static with a fixed address.
    Static,
    /// Lives entirely in a register.
    Register,
    /// A register-resident parameter.
    RegParm,
    /// A parameter whose address is in a register (not the value itself).
    RegParmAddr,
    /// A local variable, frame-pointer relative.
    Local,
    /// An argument, frame-pointer relative.
    LocalArg,
    /// A local variable relative to some other base register.
    BaseReg,
    /// An argument relative to some other base register.
    BaseRegArg,
    /// Optimized away entirely; nothing to collect.
    OptimizedOut,
    /// A compile-time constant; nothing in memory or a register to collect.
    Const,
    /// The symbol table could not resolve this name at this PC.
    Unresolved,
    /// An argument passed in a way this crate does not model (e.g.
    /// aggregate-by-value on architectures that split it across registers
    /// and memory).
    Arg,
    /// An argument passed by reference where only the reference, not the
    /// referent, is resolvable without evaluating an expression.
    RefArg,
}

/// A symbol as resolved by the external symbol table, at a specific PC.
#[derive(Debug, Clone)]
pub struct ResolvedSymbol {
    pub name: String,
    pub class: StorageClass,
    /// Meaning depends on `class`: a register number for `Register`,
    /// `RegParm`, `RegParmAddr`; a frame/base-relative signed offset for
    /// `Local`, `LocalArg`, `BaseReg`, `BaseRegArg`; an absolute address for
    /// `Static`. Unused for the non-emitting classes.
    pub value: i64,
    /// The base register for `BaseReg`/`BaseRegArg`. `None` for every other
    /// class.
    pub base_reg: Option<u32>,
    /// The symbol's resolved type, used to look up its length.
    pub ty: TypeId,
}

/// Opaque identifier for a lexical block, as produced by the symbol table.
pub type BlockId = u64;

/// The external symbol table's scoping surface: just enough for
/// [`SymbolCollector`] to resolve a name and to walk "all locals"/"all
/// arguments" outward from a PC.
pub trait SymbolTable {
    /// Resolve `name` as visible at `pc`.
    fn lookup(&self, pc: u64, name: &str) -> Option<ResolvedSymbol>;

    /// The innermost lexical block enclosing `pc`, if any.
    fn innermost_block(&self, pc: u64) -> Option<BlockId>;

    /// The next block out from `block`, or `None` if `block` is outermost.
    fn parent_block(&self, block: BlockId) -> Option<BlockId>;

    /// Whether `block` is a function's outermost block. Traversal for "all
    /// locals"/"all arguments" stops at the first such block (inclusive).
    fn is_function_boundary(&self, block: BlockId) -> bool;

    /// Every symbol declared directly in `block`.
    fn symbols_in_block(&self, block: BlockId) -> Vec<ResolvedSymbol>;
}

/// Maps resolved symbols to collection entries according to their storage
/// class.
pub struct SymbolCollector<'t, T> {
    target: &'t T,
}

impl<'t, T: TargetInfo> SymbolCollector<'t, T> {
    pub fn new(target: &'t T) -> Self {
        SymbolCollector { target }
    }

    /// Emit collection entries for a single resolved symbol into `set`.
    ///
    /// Returns `Ok(())` for both a successful emission and a class that is
    /// diagnostic-only (`Const`, `OptimizedOut`, `Unresolved`, `Arg`,
    /// `RefArg`) — those log a warning and emit nothing, they are not a hard
    /// failure of the surrounding `collect` line.
    pub fn collect(&self, sym: &ResolvedSymbol, set: &mut MemrangeSet) -> Result<(), Error> {
        use StorageClass::*;
        match sym.class {
            Static => {
                let len = self.type_len(sym)?;
                set.add_memrange(0, sym.value, len)
            }
            Register | RegParm => set.add_register(sym.value as u32),
            RegParmAddr => {
                let len = self.type_len(sym)?;
                set.add_memrange(sym.value as u32, 0, len)
            }
            Local | LocalArg => {
                let len = self.type_len(sym)?;
                set.add_memrange(self.target.fp_regnum(), sym.value, len)
            }
            BaseReg | BaseRegArg => {
                let base = sym.base_reg.ok_or_else(|| {
                    Error::BadAction(format!("{}: basereg symbol missing a base register", sym.name))
                })?;
                let len = self.type_len(sym)?;
                set.add_memrange(base, sym.value, len)
            }
            Const | OptimizedOut | Unresolved => {
                log::warn!("{}: optimized out, a constant, or unresolved; not collected", sym.name);
                Ok(())
            }
            Arg | RefArg => {
                log::warn!("{}: unsupported argument-passing convention; not collected", sym.name);
                Ok(())
            }
        }
    }

    fn type_len(&self, sym: &ResolvedSymbol) -> Result<u32, Error> {
        self.target
            .type_length(sym.ty)
            .ok_or_else(|| Error::BadAction(format!("{}: unknown type length", sym.name)))
    }

    /// Collect every register on the target (`$reg`).
    pub fn collect_all_registers(&self, set: &mut MemrangeSet) -> Result<(), Error> {
        for r in 0..self.target.register_count() as u32 {
            set.add_register(r)?;
        }
        Ok(())
    }

    /// Collect every local/static/register/basereg symbol visible at `pc`
    /// (`$loc`), walking outward from the innermost lexical block and
    /// stopping at the first function-boundary block (inclusive).
    pub fn collect_all_locals(
        &self,
        symtab: &dyn SymbolTable,
        pc: u64,
        set: &mut MemrangeSet,
    ) -> Result<(), Error> {
        self.collect_all_in_scope(symtab, pc, set, Self::is_local_class)
    }

    /// Collect every argument/regparm symbol visible at `pc` (`$arg`), same
    /// traversal as [`SymbolCollector::collect_all_locals`].
    pub fn collect_all_arguments(
        &self,
        symtab: &dyn SymbolTable,
        pc: u64,
        set: &mut MemrangeSet,
    ) -> Result<(), Error> {
        self.collect_all_in_scope(symtab, pc, set, Self::is_arg_class)
    }

    fn is_local_class(class: StorageClass) -> bool {
        matches!(
            class,
            StorageClass::Local | StorageClass::Static | StorageClass::Register | StorageClass::BaseReg
        )
    }

    fn is_arg_class(class: StorageClass) -> bool {
        matches!(
            class,
            StorageClass::Arg
                | StorageClass::LocalArg
                | StorageClass::RefArg
                | StorageClass::RegParm
                | StorageClass::RegParmAddr
                | StorageClass::BaseRegArg
        )
    }

    fn collect_all_in_scope(
        &self,
        symtab: &dyn SymbolTable,
        pc: u64,
        set: &mut MemrangeSet,
        wanted: fn(StorageClass) -> bool,
    ) -> Result<(), Error> {
        let mut block = symtab.innermost_block(pc);
        while let Some(b) = block {
            for sym in symtab.symbols_in_block(b) {
                if wanted(sym.class) {
                    self.collect(&sym, set)?;
                }
            }
            if symtab.is_function_boundary(b) {
                break;
            }
            block = symtab.parent_block(b);
        }
        Ok(())
    }
}

/// Every symbol visible at `pc`, with its storage class, for the `scope`
/// diagnostic command. Uses the same outward lexical-block walk as
/// [`SymbolCollector::collect_all_locals`]/[`SymbolCollector::collect_all_arguments`],
/// but reports every symbol rather than collecting a subset of them — this
/// is a read-only query, nothing is emitted into a [`MemrangeSet`].
pub fn scope(symtab: &dyn SymbolTable, pc: u64) -> Vec<(String, StorageClass)> {
    let mut out = Vec::new();
    let mut block = symtab.innermost_block(pc);
    while let Some(b) = block {
        for sym in symtab.symbols_in_block(b) {
            out.push((sym.name, sym.class));
        }
        if symtab.is_function_boundary(b) {
            break;
        }
        block = symtab.parent_block(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::test_double::FakeTarget;
    use std::collections::HashMap;

    struct FakeSymtab {
        blocks: HashMap<BlockId, (Option<BlockId>, bool, Vec<ResolvedSymbol>)>,
        innermost: BlockId,
    }

    impl SymbolTable for FakeSymtab {
        fn lookup(&self, _pc: u64, name: &str) -> Option<ResolvedSymbol> {
            self.blocks
                .values()
                .flat_map(|(_, _, syms)| syms.iter())
                .find(|s| s.name == name)
                .cloned()
        }

        fn innermost_block(&self, _pc: u64) -> Option<BlockId> {
            Some(self.innermost)
        }

        fn parent_block(&self, block: BlockId) -> Option<BlockId> {
            self.blocks.get(&block).and_then(|(p, _, _)| *p)
        }

        fn is_function_boundary(&self, block: BlockId) -> bool {
            self.blocks.get(&block).map(|(_, f, _)| *f).unwrap_or(true)
        }

        fn symbols_in_block(&self, block: BlockId) -> Vec<ResolvedSymbol> {
            self.blocks.get(&block).map(|(_, _, s)| s.clone()).unwrap_or_default()
        }
    }

    fn sym(name: &str, class: StorageClass, value: i64) -> ResolvedSymbol {
        ResolvedSymbol { name: name.into(), class, value, base_reg: None, ty: TypeId(4) }
    }

    #[test]
    fn static_symbol_emits_absolute_memrange() {
        let target = FakeTarget { types: [(4, 4)].into_iter().collect(), ..Default::default() };
        let collector = SymbolCollector::new(&target);
        let mut set = MemrangeSet::new(256);
        collector.collect(&sym("g_counter", StorageClass::Static, 0x2000), &mut set).unwrap();
        let list = set.finalize(8);
        assert_eq!(list.memranges[0].reg_type, 0);
        assert_eq!(list.memranges[0].start, 0x2000);
        assert_eq!(list.memranges[0].end, 0x2004);
    }

    #[test]
    fn register_symbol_sets_bit_with_no_memrange() {
        let target = FakeTarget::default();
        let collector = SymbolCollector::new(&target);
        let mut set = MemrangeSet::new(256);
        collector.collect(&sym("i", StorageClass::Register, 4), &mut set).unwrap();
        let list = set.finalize(8);
        assert!(list.memranges.is_empty());
        assert!(list.registers.get(4));
    }

    #[test]
    fn optimized_out_emits_nothing_but_does_not_error() {
        let target = FakeTarget::default();
        let collector = SymbolCollector::new(&target);
        let mut set = MemrangeSet::new(256);
        collector.collect(&sym("x", StorageClass::OptimizedOut, 0), &mut set).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn all_locals_stops_at_function_boundary() {
        let target = FakeTarget { types: [(4, 4)].into_iter().collect(), ..Default::default() };
        let collector = SymbolCollector::new(&target);
        let mut blocks = HashMap::new();
        blocks.insert(2, (Some(1), false, vec![sym("inner_loc", StorageClass::Local, 8)]));
        blocks.insert(1, (Some(0), true, vec![sym("outer_loc", StorageClass::Local, 16)]));
        blocks.insert(0, (None, true, vec![sym("file_scope", StorageClass::Local, 24)]));
        let symtab = FakeSymtab { blocks, innermost: 2 };

        let mut set = MemrangeSet::new(256);
        collector.collect_all_locals(&symtab, 0x1000, &mut set).unwrap();
        let list = set.finalize(8);
        assert_eq!(list.memranges.len(), 2);
        assert!(list.memranges.iter().any(|m| m.start == 8));
        assert!(list.memranges.iter().any(|m| m.start == 16));
        assert!(!list.memranges.iter().any(|m| m.start == 24));
    }

    #[test]
    fn arg_class_is_visited_by_all_arguments_traversal() {
        // `Arg` emits nothing either way (diagnostic-only, like `RefArg`), so
        // the only observable difference between "visited" and "silently
        // skipped" is whether the traversal's class filter accepts it at
        // all — check that directly rather than through a side effect that
        // doesn't show up in a `CollectionList`.
        assert!(SymbolCollector::<FakeTarget>::is_arg_class(StorageClass::Arg));
        assert!(SymbolCollector::<FakeTarget>::is_arg_class(StorageClass::RefArg));
    }

    #[test]
    fn scope_lists_every_symbol_not_just_collectible_ones() {
        let mut blocks = HashMap::new();
        blocks.insert(
            1,
            (
                Some(0),
                true,
                vec![sym("local_i", StorageClass::Local, 8), sym("arg_a", StorageClass::LocalArg, 4)],
            ),
        );
        blocks.insert(0, (None, true, vec![sym("g", StorageClass::Static, 0x2000)]));
        let symtab = FakeSymtab { blocks, innermost: 1 };

        let entries = scope(&symtab, 0x1000);
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&("local_i".to_string(), StorageClass::Local)));
        assert!(entries.contains(&("arg_a".to_string(), StorageClass::LocalArg)));
    }
}
