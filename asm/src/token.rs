use xasm_isa::{Condition, Opcode, Register};

/// A prefix keyword recognized by the scanner's keyword table (mirrors the category a
/// [`crate::instruction::Instruction`] slots it into).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Prefix {
    Lock,
    Rep,
    Repe,
    Repne,
    Bnd,
    Nobnd,
    Wait,
    Xacquire,
    Xrelease,
    A16,
    A32,
    A64,
    O16,
    O32,
    O64,
    Vex2,
    Vex3,
    Evex,
    SegmentOverride(Register),
}

/// A keyword other than a mnemonic/register/prefix: syntactic markers that change how the
/// operand currently being parsed is classified rather than contributing bytes themselves.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Special {
    Far,
    Near,
    Short,
    Strict,
    To,
    Times,
    Seg,
    Wrt,
    NoSplit,
    Rel,
    Abs,
    Byte,
    Word,
    Dword,
    Qword,
    Tword,
    Oword,
    Yword,
    Zword,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    PercentPercent,
    Shl,
    Shr,
    Sar,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    AmpAmp,
    PipePipe,
    CaretCaret,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dollar,
    DollarDollar,
}

#[derive(Clone, PartialEq, Debug)]
pub enum TokenKind {
    Ident(String),
    /// A `$`-prefixed identifier: a forced symbol, exempt from keyword lookup.
    ForcedIdent(String),
    Number(i64),
    Float(f64),
    Str(Vec<u8>),
    Register(Register),
    /// An opmask register `k0..k7`, kept distinct from general registers since it only ever
    /// appears inside a decorator brace or as a mask operand.
    OpmaskRegister(u8),
    Opcode(Opcode),
    Condition(Condition),
    /// A full `Jcc`-family mnemonic recognized atomically (`JZ`, `JNB`, ...): the plain mnemonic
    /// table has no single entry for the cross product of `J` plus every condition spelling, so
    /// the scanner's keyword table maps these directly to `(Opcode::JCC, Condition)` instead of
    /// making the parser re-split an `Ident` at tokenize time.
    Jcc(Condition),
    Prefix(Prefix),
    Special(Special),
    /// `DB`/`DW`/`DD`/`DQ`/`DT`/`DO`/`DY`/`DZ`, carrying the element width in bytes; the parser
    /// normalizes all of these to `Opcode::DB` plus `Instruction::element_width` (§4.4).
    DataDecl(u8),
    /// `RESB`/`RESW`/`RESD`/`RESQ`/`REST`/`RESO`/`RESY`/`RESZ`, carrying the element width in
    /// bytes; the parser normalizes these to `Opcode::RESB` by multiplying the operand (§4.4).
    ResDecl(u8),
    Decorator(Decorator),
    Operator(Operator),
    Eol,
    Error(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Decorator {
    Opmask(u8),
    Zeroing,
    Broadcast(u8),
    RoundNearest,
    RoundDown,
    RoundUp,
    RoundZero,
    Sae,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

impl Token {
    pub fn new(kind: TokenKind, pos: usize) -> Self {
        Token { kind, pos }
    }
}
