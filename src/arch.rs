//! Traits that encode the per-target facts the tracepoint compiler needs but
//! cannot know on its own.
//!
//! A real debugger already has this information — it is what its symbol
//! table, register-info tables and type system exist to provide. This crate
//! asks only for the small slice of it that [`crate::symbol::SymbolCollector`]
//! and [`crate::memrange::MemrangeSet`] need, the same way `gdbstub`'s
//! `Target`/`Arch` traits ask a target implementation for only the bits the
//! protocol layer needs (register order, pointer width) rather than modeling
//! an entire CPU.

/// Per-target facts needed to compile and finalize tracepoint actions.
///
/// An embedding debugger implements this once per target architecture. None
/// of these methods may change their answer for a fixed `Self` over the
/// lifetime of a [`crate::session::TraceSession`] — `MemrangeSet` relies on
/// `max_register_virtual_size` being stable to keep its coalescing invariant.
pub trait TargetInfo {
    /// Width, in bits, of the register bitmap. At least 256; the debugger's
    /// concrete register count for wide architectures (e.g. vector
    /// registers) may be larger.
    fn register_count(&self) -> usize;

    /// Raw on-the-wire size, in bytes, of register `r`.
    ///
    /// Returns `None` if `r` is out of range.
    fn reg_raw_size(&self, r: u32) -> Option<usize>;

    /// The largest value `reg_raw_size` can return for any register on this
    /// target. Used as the coalescing gap threshold in
    /// [`crate::memrange::MemrangeSet::finalize`].
    fn max_register_virtual_size(&self) -> u32;

    /// The register number GDB treats as the architecture's frame pointer,
    /// used to resolve `local`/`local-arg` storage classes into
    /// frame-pointer-relative memranges.
    fn fp_regnum(&self) -> u32;

    /// Size, in bytes, of a resolved type after typedef resolution. Returns
    /// `None` if the type is incomplete or unknown.
    fn type_length(&self, ty: TypeId) -> Option<u32>;

    /// Look up a register by the name used in a `$regname` action-line
    /// reference (e.g. the `r0` in `$(r0,4,4)` or a bare `$pc`).
    fn register_by_name(&self, name: &str) -> Option<u32>;
}

/// Opaque handle to a resolved type, as produced by the external symbol
/// table / expression parser. This crate never inspects a `TypeId`'s
/// contents — only `TargetInfo::type_length` does, on the debugger's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u64);
