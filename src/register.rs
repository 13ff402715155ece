use num_derive::{FromPrimitive, ToPrimitive};
use util::{EnumFromStr, InteropGetName};
use util_derive::{EnumFromStr, InteropGetName};

/// Coarse register family, used by the effective-address resolver to check that a base and an
/// index agree in width and by the evaluator to tell a scaled-index multiply from a plain
/// integer one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterClass {
    Gpr8Lo,
    Gpr8Hi,
    Gpr16,
    Gpr32,
    Gpr64,
    Segment,
    Xmm,
    Ymm,
    Zmm,
    Opmask,
    Rip,
}

impl RegisterClass {
    /// Operand width in bits, or `None` for classes (segment, opmask, rip) that do not
    /// participate in the `BITS8..BITS512` size ladder.
    pub fn bits(self) -> Option<u32> {
        match self {
            RegisterClass::Gpr8Lo | RegisterClass::Gpr8Hi => Some(8),
            RegisterClass::Gpr16 => Some(16),
            RegisterClass::Gpr32 => Some(32),
            RegisterClass::Gpr64 => Some(64),
            RegisterClass::Xmm => Some(128),
            RegisterClass::Ymm => Some(256),
            RegisterClass::Zmm => Some(512),
            RegisterClass::Segment | RegisterClass::Opmask | RegisterClass::Rip => None,
        }
    }
}

/// A concrete machine register.
///
/// The numeric value assigned by `#[derive(ToPrimitive)]` is the term `type` code an expression
/// vector uses to tag a register coefficient (see `xasm::expr`); it does not need to match any
/// hardware encoding, that translation happens in the effective-address resolver and in the
/// per-template bytecode (`\10..\13` etc. bias the *register field* value, not this id).
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, ToPrimitive, FromPrimitive, InteropGetName, EnumFromStr,
)]
#[allow(non_camel_case_types)]
pub enum Register {
    AL, CL, DL, BL, AH, CH, DH, BH,
    SPL, BPL, SIL, DIL,
    R8B, R9B, R10B, R11B, R12B, R13B, R14B, R15B,

    AX, CX, DX, BX, SP, BP, SI, DI,
    R8W, R9W, R10W, R11W, R12W, R13W, R14W, R15W,

    EAX, ECX, EDX, EBX, ESP, EBP, ESI, EDI,
    R8D, R9D, R10D, R11D, R12D, R13D, R14D, R15D,

    RAX, RCX, RDX, RBX, RSP, RBP, RSI, RDI,
    R8, R9, R10, R11, R12, R13, R14, R15,

    ES, CS, SS, DS, FS, GS,

    XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7,
    XMM8, XMM9, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15,

    YMM0, YMM1, YMM2, YMM3, YMM4, YMM5, YMM6, YMM7,
    YMM8, YMM9, YMM10, YMM11, YMM12, YMM13, YMM14, YMM15,

    ZMM0, ZMM1, ZMM2, ZMM3, ZMM4, ZMM5, ZMM6, ZMM7,
    ZMM8, ZMM9, ZMM10, ZMM11, ZMM12, ZMM13, ZMM14, ZMM15,

    K0, K1, K2, K3, K4, K5, K6, K7,

    /// Pseudo-register used only inside `[rip + disp]`; never has a ModRM encoding of its own.
    RIP,
}

impl Register {
    pub fn class(self) -> RegisterClass {
        use Register::*;
        match self {
            AL | CL | DL | BL | SPL | BPL | SIL | DIL | R8B | R9B | R10B | R11B | R12B | R13B
            | R14B | R15B => RegisterClass::Gpr8Lo,
            AH | CH | DH | BH => RegisterClass::Gpr8Hi,
            AX | CX | DX | BX | SP | BP | SI | DI | R8W | R9W | R10W | R11W | R12W | R13W
            | R14W | R15W => RegisterClass::Gpr16,
            EAX | ECX | EDX | EBX | ESP | EBP | ESI | EDI | R8D | R9D | R10D | R11D | R12D
            | R13D | R14D | R15D => RegisterClass::Gpr32,
            RAX | RCX | RDX | RBX | RSP | RBP | RSI | RDI | R8 | R9 | R10 | R11 | R12 | R13
            | R14 | R15 => RegisterClass::Gpr64,
            ES | CS | SS | DS | FS | GS => RegisterClass::Segment,
            XMM0 | XMM1 | XMM2 | XMM3 | XMM4 | XMM5 | XMM6 | XMM7 | XMM8 | XMM9 | XMM10
            | XMM11 | XMM12 | XMM13 | XMM14 | XMM15 => RegisterClass::Xmm,
            YMM0 | YMM1 | YMM2 | YMM3 | YMM4 | YMM5 | YMM6 | YMM7 | YMM8 | YMM9 | YMM10
            | YMM11 | YMM12 | YMM13 | YMM14 | YMM15 => RegisterClass::Ymm,
            ZMM0 | ZMM1 | ZMM2 | ZMM3 | ZMM4 | ZMM5 | ZMM6 | ZMM7 | ZMM8 | ZMM9 | ZMM10
            | ZMM11 | ZMM12 | ZMM13 | ZMM14 | ZMM15 => RegisterClass::Zmm,
            K0 | K1 | K2 | K3 | K4 | K5 | K6 | K7 => RegisterClass::Opmask,
            RIP => RegisterClass::Rip,
        }
    }

    /// Low 3 bits of the hardware encoding (the part that goes in ModRM/SIB/opcode+rd); bit 3
    /// (the REX.R/X/B extension bit) is `self.is_extended()`.
    pub fn low_bits(self) -> u8 {
        use Register::*;
        (match self {
            AL | AX | EAX | RAX | ES | XMM0 | YMM0 | ZMM0 | K0 => 0,
            CL | CX | ECX | RCX | CS | XMM1 | YMM1 | ZMM1 | K1 => 1,
            DL | DX | EDX | RDX | SS | XMM2 | YMM2 | ZMM2 | K2 => 2,
            BL | BX | EBX | RBX | DS | XMM3 | YMM3 | ZMM3 | K3 => 3,
            AH | SPL | SP | ESP | RSP | FS | XMM4 | YMM4 | ZMM4 | K4 => 4,
            CH | BPL | BP | EBP | RBP | GS | XMM5 | YMM5 | ZMM5 | K5 => 5,
            DH | SIL | SI | ESI | RSI | XMM6 | YMM6 | ZMM6 | K6 => 6,
            BH | DIL | DI | EDI | RDI | XMM7 | YMM7 | ZMM7 | K7 => 7,
            R8B | R8W | R8D | R8 | XMM8 | YMM8 | ZMM8 => 0,
            R9B | R9W | R9D | R9 | XMM9 | YMM9 | ZMM9 => 1,
            R10B | R10W | R10D | R10 | XMM10 | YMM10 | ZMM10 => 2,
            R11B | R11W | R11D | R11 | XMM11 | YMM11 | ZMM11 => 3,
            R12B | R12W | R12D | R12 | XMM12 | YMM12 | ZMM12 => 4,
            R13B | R13W | R13D | R13 | XMM13 | YMM13 | ZMM13 => 5,
            R14B | R14W | R14D | R14 | XMM14 | YMM14 | ZMM14 => 6,
            R15B | R15W | R15D | R15 | XMM15 | YMM15 | ZMM15 => 7,
            RIP => 5,
        }) as u8
    }

    /// Whether this register needs REX.R/X/B (or the EVEX equivalents) set to be addressed.
    pub fn is_extended(self) -> bool {
        use Register::*;
        matches!(
            self,
            R8B | R9B
                | R10B
                | R11B
                | R12B
                | R13B
                | R14B
                | R15B
                | R8W
                | R9W
                | R10W
                | R11W
                | R12W
                | R13W
                | R14W
                | R15W
                | R8D
                | R9D
                | R10D
                | R11D
                | R12D
                | R13D
                | R14D
                | R15D
                | R8
                | R9
                | R10
                | R11
                | R12
                | R13
                | R14
                | R15
                | XMM8
                | XMM9
                | XMM10
                | XMM11
                | XMM12
                | XMM13
                | XMM14
                | XMM15
                | YMM8
                | YMM9
                | YMM10
                | YMM11
                | YMM12
                | YMM13
                | YMM14
                | YMM15
                | ZMM8
                | ZMM9
                | ZMM10
                | ZMM11
                | ZMM12
                | ZMM13
                | ZMM14
                | ZMM15
        )
    }

    /// `true` for `AH`/`BH`/`CH`/`DH`; these cannot be addressed together with a REX prefix.
    pub fn is_high_byte(self) -> bool {
        matches!(self, Register::AH | Register::BH | Register::CH | Register::DH)
    }

    pub fn is_esp_or_rsp(self) -> bool {
        matches!(self, Register::ESP | Register::RSP)
    }

    pub fn is_ebp_or_rbp(self) -> bool {
        matches!(self, Register::EBP | Register::RBP)
    }
}
