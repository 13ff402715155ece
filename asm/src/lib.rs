//! Scans, parses, and encodes x86 assembly into object sections.
//!
//! Mirrors the teacher crate's own split (`vasm` for the language, `vexfile`/`vex` for the
//! output container, now `objfmt`): this crate owns everything from source text to a stream of
//! [`objfmt`]-sink calls, and nothing about the container format itself.

pub mod diag;
pub mod driver;
pub mod ea;
pub mod encode;
pub mod error;
pub mod eval;
pub mod expr;
pub mod instruction;
pub mod labels;
pub mod matcher;
pub mod operand;
pub mod parser;
pub mod scanner;
pub mod sourcemap;
pub mod token;
pub mod warn;

pub use diag::Diagnostic;
pub use driver::{assemble, AssembleOutput};
pub use error::{AssembleError, Error, ParseError, Result, Severity};
pub use instruction::Instruction;
pub use labels::{LabelKind, LabelStore, Location, SymbolTable};
pub use operand::Operand;
