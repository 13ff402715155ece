//! The "Operand" record of §3: what one parsed operand looks like once the evaluator and the
//! effective-address decomposition (`xasm::ea`) have finished with it.

use xasm_isa::{DecoratorMask, OperandFlags, Register};

bitflags::bitflags! {
    /// Effective-address hint flags (`eaflags`), set while decomposing a `[...]` expression.
    #[derive(Default)]
    pub struct EaFlags: u16 {
        const BYTE_OFFS = 0x0001;
        const WORD_OFFS = 0x0002;
        const REL        = 0x0004;
        const ABS        = 0x0008;
        /// `NOSPLIT`: forbids the ESP/RSP base-swap and the `reg*3/5/9` rewrite at EA resolution.
        const NOSPLIT    = 0x0010;
        const MIB         = 0x0020;
        const FSGS        = 0x0040;
        /// Set when the `REL` flag came from a literal `rip` base register (`[rip+0x20]`)
        /// rather than the `rel` keyword (`[rel symbol]`): the displacement is the literal
        /// value written verbatim, not `target - next_insn`.
        const RIP_LITERAL = 0x0080;
    }
}

/// Addressing hint attached to a register term while decomposing an EA expression, used to
/// decide base/index ordering (§4.4's "addressing hints").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HintType {
    None,
    /// This register is forced to be the base (e.g. it appeared bare, unscaled, first).
    MakeBase,
    /// This register is forced *not* to be the base (e.g. downgraded by a scalar multiply).
    NotBase,
    /// Two register terms of the same kind were summed (`reg+reg`); order is not yet decided.
    Summed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Hint {
    pub register: Option<Register>,
    pub kind: HintType,
}

impl Default for Hint {
    fn default() -> Self {
        Hint { register: None, kind: HintType::None }
    }
}

/// EVEX/AVX decorator state the parser attaches to one operand (§3's "decorator flags").
#[derive(Clone, Copy, Default, Debug)]
pub struct Decorators {
    pub mask: DecoratorMask,
    pub opmask: Option<u8>,
    pub zeroing: bool,
    pub broadcast: Option<u8>,
    pub rounding: Option<Rounding>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Rounding {
    Nearest,
    Down,
    Up,
    Zero,
    Sae,
}

/// One operand of a parsed `Instruction` (§3 "Operand").
#[derive(Clone, Debug, Default)]
pub struct Operand {
    pub flags: OperandFlags,
    /// Size, in bytes, of the displacement field once an EA is resolved (0 if none/unknown yet).
    pub disp_size: u8,
    pub eaflags: EaFlags,
    pub decorators: Decorators,
    pub base: Option<Register>,
    pub index: Option<Register>,
    pub scale: u8,
    /// 64-bit offset/immediate value (the `Simple` component of the operand's expression).
    pub offset: i64,
    pub segment: Option<u16>,
    pub wrt: Option<u16>,
    pub hint: Hint,
    /// Set when the operand's expression contained an `Unknown` term (forward reference).
    pub unknown: bool,
}

impl Operand {
    pub fn new() -> Self {
        Operand { scale: 1, ..Default::default() }
    }

    pub fn is_register(&self) -> bool {
        self.flags.contains(OperandFlags::REGISTER)
    }

    pub fn is_memory(&self) -> bool {
        self.flags.contains(OperandFlags::MEMORY)
    }

    pub fn is_immediate(&self) -> bool {
        self.flags.contains(OperandFlags::IMMEDIATE)
    }

    /// The register this operand names, for register-class operands (`base` doubles as the sole
    /// register slot in that case; `index`/`scale` are meaningless).
    pub fn register(&self) -> Option<Register> {
        if self.is_register() {
            self.base
        } else {
            None
        }
    }
}
