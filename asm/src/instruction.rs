//! The "Instruction" record of §3: what one parsed logical line turns into before the template
//! matcher and encoder see it.

use crate::operand::Operand;
use xasm_isa::{Condition, Opcode, Register, Template};

pub const MAX_OPERANDS: usize = 5;

/// Which prefix slot a given prefix keyword occupies; at most one prefix per category may be
/// present (two in the same slot is an error, §4.4).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PrefixSlot {
    Wait,
    SegmentOverride,
    Lock,
    Rep,
    OSize,
    ASize,
    VexClass,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RepKind {
    Rep,
    Repe,
    Repne,
    Bnd,
    Nobnd,
    /// HLE prefixes; share the `F2`/`F3` slot with `Repne`/`Rep` at encode time (§4.4).
    Xacquire,
    Xrelease,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VexClass {
    Vex2,
    Vex3,
    Evex,
}

/// One extra (non-evaluated, or string/float) operand for `DB`-family/`INCBIN` instructions.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtOperand {
    Number(i64),
    Raw(Vec<u8>),
    Float(f64),
}

/// Staging bytes the encoder's two walks accumulate into before emission (§3's "decoded
/// REX/VEX/EVEX staging bytes").
#[derive(Clone, Copy, Default, Debug)]
pub struct RexVexStaging {
    pub rex: u8,
    pub vexreg: u8,
    pub vex_cm: u8,
    pub vex_wlp: u8,
    pub evex_tuple: u8,
    pub evex_p: [u8; 3],
    pub evex_brerop: u8,
    pub evex_rm: u8,
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub condition: Option<Condition>,
    pub operands: Vec<Operand>,
    pub wait_prefix: bool,
    pub segment_override: Option<Register>,
    pub lock: bool,
    pub rep: Option<RepKind>,
    pub osize_prefix: Option<u8>,
    pub asize: Option<u8>,
    pub vex_class: Option<VexClass>,
    /// `TIMES n`; the driver invokes the encoder once per iteration (§4.8).
    pub times: i64,
    pub ext_operands: Vec<ExtOperand>,
    pub forward_ref: bool,
    pub staging: RexVexStaging,
    pub address_size: u8,
    pub bits: u8,
    pub label: Option<String>,
    /// Element width in bytes for `DB`/`RESB`-family declarations, normalized from the
    /// `DW`/`DD`/.../`RESQ`/... spelling the parser saw (§4.4); 1 for every other opcode.
    pub element_width: u8,
}

impl Instruction {
    pub fn new(bits: u8) -> Self {
        Instruction {
            opcode: Opcode::NONE,
            condition: None,
            operands: Vec::new(),
            wait_prefix: false,
            segment_override: None,
            lock: false,
            rep: None,
            osize_prefix: None,
            asize: None,
            vex_class: None,
            times: 1,
            ext_operands: Vec::new(),
            forward_ref: false,
            staging: RexVexStaging::default(),
            address_size: bits,
            bits,
            label: None,
            element_width: 1,
        }
    }

    /// Zero-byte placeholder for a line whose parse or match failed fatally (§7): "the erroneous
    /// instruction is replaced by `I_none` and produces zero bytes".
    pub fn none(bits: u8) -> Self {
        Instruction::new(bits)
    }

    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }
}

/// Candidate templates for this instruction's opcode (component G's input universe).
pub fn candidates(insn: &Instruction) -> &'static [Template] {
    xasm_isa::table::templates_for(insn.opcode)
}
