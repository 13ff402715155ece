use num::ToPrimitive as _;
use num_derive::{FromPrimitive, ToPrimitive};
use util::{EnumFromStr, InteropGetName};
use util_derive::{EnumFromStr, InteropGetName};

/// A mnemonic. Each variant indexes into [`crate::table::TEMPLATES`] to find its (possibly
/// empty, for unimplemented mnemonics) list of candidate encodings.
///
/// This is a representative slice of the real x86 mnemonic space, not an exhaustive one; see
/// the crate-level docs.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, ToPrimitive, FromPrimitive, InteropGetName, EnumFromStr,
)]
pub enum Opcode {
    NOP,
    MOV,
    LEA,
    PUSH,
    POP,
    ADD,
    SUB,
    ADC,
    SBB,
    AND,
    OR,
    XOR,
    CMP,
    TEST,
    INC,
    DEC,
    NEG,
    NOT,
    IMUL,
    MUL,
    IDIV,
    DIV,
    SHL,
    SHR,
    SAR,
    MOVZX,
    MOVSX,
    MOVSXD,
    JMP,
    JCC,
    CALL,
    RET,
    INT3,
    INT,
    SYSCALL,
    CPUID,
    XCHG,
    LOCK_XADD,
    VADDPS,
    VMOVAPS,
    VPBROADCASTD,
    /// Synthesized for a bare `TIMES`/label line with no mnemonic, and for a fully dropped
    /// instruction whose parse or match failed fatally; emits zero bytes.
    NONE,
    /// `DB`/`DW`/`DD`/`DQ`/`DT`/`DO`/`DY`/`DZ` are normalized to this before assembly.
    DB,
    RESB,
    INCBIN,
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::NONE
    }
}

/// Condition codes for the `Jcc`/`SETcc`/`CMOVcc` families. The low nibble is the condition's
/// position in the opcode byte (`0x0F 0x80+cc` for `Jcc rel32`, `0x70+cc` for `Jcc rel8`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, ToPrimitive, FromPrimitive, EnumFromStr)]
pub enum Condition {
    O,
    NO,
    B,
    NB,
    Z,
    NZ,
    BE,
    NBE,
    S,
    NS,
    P,
    NP,
    L,
    NL,
    LE,
    NLE,
}

impl Condition {
    pub fn cc(self) -> u8 {
        self.to_u8().unwrap()
    }
}
