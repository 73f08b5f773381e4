//! Tracepoint compiler and trace-replay session core for a source-level
//! remote debugger.
//!
//! This crate owns the parts of a tracepoint subsystem that are hard to get
//! right: turning a small action-program DSL into canonical collection
//! descriptors, coalescing those descriptors to minimise wire volume, and
//! driving the noisy-reply protocol loop that a tracing target speaks back.
//! It deliberately does not own the symbol table, the expression parser,
//! line-table lookup, the packet transport, or any user interface — those
//! are external collaborators, expressed here as small traits
//! ([`symbol::SymbolTable`], [`arch::TargetInfo`], [`transport::Transport`],
//! [`session::PcResolver`], [`session::FrameContext`],
//! [`session::ConvenienceSink`]) that an embedding debugger implements once.
//!
//! See [`session::TraceSession`] for the orchestration entry point and
//! [`compile::ActionCompiler`] for the compiler pipeline.

pub mod action;
pub mod arch;
pub mod compile;
pub mod error;
pub mod memrange;
pub mod protocol;
pub mod session;
pub mod symbol;
pub mod tracepoint;
pub mod transport;

pub use error::{Error, Result};
