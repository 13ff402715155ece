//! In-memory representation of the x86 instruction template database.
//!
//! This crate does not know how to parse assembly or how to emit bytes; it only describes,
//! for a given mnemonic, the list of candidate [`Template`]s a matcher can choose between and
//! the bytecode language (see [`bytecode`]) an encoder walks to turn a chosen template plus a
//! concrete set of operands into machine code. The on-disk format the real table is generated
//! from (and the generator itself) are outside the scope of this crate: [`table::TEMPLATES`] is
//! a small, hand-written, representative slice of the real instruction set, not an exhaustive
//! encoding of the x86 ISA.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate num_derive;

pub mod bytecode;
pub mod cpu;
pub mod flags;
pub mod opcode;
pub mod register;
pub mod table;
pub mod template;

pub use bytecode::Op as BytecodeOp;
pub use cpu::CpuLevel;
pub use flags::{DecoratorMask, OperandFlags, TemplateFlags};
pub use opcode::{Condition, Opcode};
pub use register::{Register, RegisterClass};
pub use template::{OperandTemplate, Template};
