//! Tokenizes one logical source line into a stream of [`Token`]s.
//!
//! The scanner owns a byte cursor into the line and nothing else; it does not know about
//! expressions, operands, or instructions (see `xasm::eval`/`xasm::parser` for those). Keyword
//! recognition (mnemonics, registers, prefixes, size words) happens here because it changes how
//! a bare identifier tokenizes, not how it is later interpreted.

use crate::error::ScanError;
use crate::token::{Decorator, Operator, Prefix, Special, Token, TokenKind};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::str::FromStr;
use xasm_isa::{Condition, Opcode, Register};

/// Case-insensitive keyword lookup result for a scanned identifier.
enum Keyword {
    Opcode(Opcode),
    Condition(Condition),
    Register(Register),
    Prefix(Prefix),
    Special(Special),
    /// A full `Jcc` mnemonic (`JZ`, `JNB`, ...), see `TokenKind::Jcc`.
    Jcc(Condition),
    /// `DB`/`DW`/.../`DZ`, carrying the element width in bytes.
    DataDecl(u8),
    /// `RESB`/`RESW`/.../`RESZ`, carrying the element width in bytes.
    ResDecl(u8),
}

fn keyword_table() -> &'static HashMap<&'static str, Keyword> {
    static TABLE: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(build_keyword_table);
    &TABLE
}

fn build_keyword_table() -> HashMap<&'static str, Keyword> {
    let mut m: HashMap<&'static str, Keyword> = HashMap::new();

    macro_rules! opcodes {
        ($($name:expr),* $(,)?) => {
            $( if let Ok(op) = Opcode::from_str($name) { m.insert($name, Keyword::Opcode(op)); } )*
        };
    }
    opcodes!(
        "NOP", "MOV", "LEA", "PUSH", "POP", "ADD", "SUB", "ADC", "SBB", "AND", "OR", "XOR", "CMP",
        "TEST", "INC", "DEC", "NEG", "NOT", "IMUL", "MUL", "IDIV", "DIV", "SHL", "SHR", "SAR",
        "MOVZX", "MOVSX", "MOVSXD", "JMP", "CALL", "RET", "INT3", "INT", "SYSCALL", "CPUID",
        "XCHG", "VADDPS", "VMOVAPS", "VPBROADCASTD", "INCBIN",
    );
    // `XADD` has no same-named `Opcode` variant (the variant is `LOCK_XADD`, reflecting that the
    // only template for it carries `TemplateFlags::LOCK`), so it needs an explicit entry rather
    // than the generic macro's exact-name match.
    m.insert("XADD", Keyword::Opcode(Opcode::LOCK_XADD));
    // Bare condition codes (used by SETcc/CMOVcc operand suffixes once those mnemonics are
    // tokenized as `Ident` + condition, not by `Jcc` itself: see the `Jcc` table below for the
    // atomic `J`+condition mnemonics).
    macro_rules! conditions {
        ($($name:expr),* $(,)?) => {
            $( if let Ok(c) = Condition::from_str($name) { m.insert($name, Keyword::Condition(c)); } )*
        };
    }
    conditions!(
        "O", "NO", "B", "NB", "Z", "NZ", "BE", "NBE", "S", "NS", "P", "NP", "L", "NL", "LE", "NLE",
    );

    // Full `Jcc` mnemonics: every NASM-accepted spelling of `J` plus a condition, including the
    // synonym aliases (`JE`/`JZ`, `JNAE`/`JC`/`JB`, ...) that the bare condition table above
    // cannot express as a single suffix.
    let jcc: &[(&str, Condition)] = &[
        ("JO", Condition::O),
        ("JNO", Condition::NO),
        ("JB", Condition::B),
        ("JC", Condition::B),
        ("JNAE", Condition::B),
        ("JNB", Condition::NB),
        ("JNC", Condition::NB),
        ("JAE", Condition::NB),
        ("JZ", Condition::Z),
        ("JE", Condition::Z),
        ("JNZ", Condition::NZ),
        ("JNE", Condition::NZ),
        ("JBE", Condition::BE),
        ("JNA", Condition::BE),
        ("JA", Condition::NBE),
        ("JNBE", Condition::NBE),
        ("JS", Condition::S),
        ("JNS", Condition::NS),
        ("JP", Condition::P),
        ("JPE", Condition::P),
        ("JNP", Condition::NP),
        ("JPO", Condition::NP),
        ("JL", Condition::L),
        ("JNGE", Condition::L),
        ("JGE", Condition::NL),
        ("JNL", Condition::NL),
        ("JLE", Condition::LE),
        ("JNG", Condition::LE),
        ("JG", Condition::NLE),
        ("JNLE", Condition::NLE),
    ];
    for (name, c) in jcc {
        m.insert(name, Keyword::Jcc(*c));
    }

    let data_decls: &[(&str, u8)] = &[
        ("DB", 1),
        ("DW", 2),
        ("DD", 4),
        ("DQ", 8),
        ("DT", 10),
        ("DO", 16),
        ("DY", 32),
        ("DZ", 64),
    ];
    for (name, width) in data_decls {
        m.insert(name, Keyword::DataDecl(*width));
    }
    let res_decls: &[(&str, u8)] = &[
        ("RESB", 1),
        ("RESW", 2),
        ("RESD", 4),
        ("RESQ", 8),
        ("REST", 10),
        ("RESO", 16),
        ("RESY", 32),
        ("RESZ", 64),
    ];
    for (name, width) in res_decls {
        m.insert(name, Keyword::ResDecl(*width));
    }

    macro_rules! registers {
        ($($name:expr),* $(,)?) => {
            $( if let Ok(r) = Register::from_str($name) { m.insert($name, Keyword::Register(r)); } )*
        };
    }
    registers!(
        "AL", "CL", "DL", "BL", "AH", "CH", "DH", "BH", "SPL", "BPL", "SIL", "DIL", "R8B", "R9B",
        "R10B", "R11B", "R12B", "R13B", "R14B", "R15B", "AX", "CX", "DX", "BX", "SP", "BP", "SI",
        "DI", "R8W", "R9W", "R10W", "R11W", "R12W", "R13W", "R14W", "R15W", "EAX", "ECX", "EDX",
        "EBX", "ESP", "EBP", "ESI", "EDI", "R8D", "R9D", "R10D", "R11D", "R12D", "R13D", "R14D",
        "R15D", "RAX", "RCX", "RDX", "RBX", "RSP", "RBP", "RSI", "RDI", "R8", "R9", "R10", "R11",
        "R12", "R13", "R14", "R15", "ES", "CS", "SS", "DS", "FS", "GS", "XMM0", "XMM1", "XMM2",
        "XMM3", "XMM4", "XMM5", "XMM6", "XMM7", "XMM8", "XMM9", "XMM10", "XMM11", "XMM12", "XMM13",
        "XMM14", "XMM15", "YMM0", "YMM1", "YMM2", "YMM3", "YMM4", "YMM5", "YMM6", "YMM7", "YMM8",
        "YMM9", "YMM10", "YMM11", "YMM12", "YMM13", "YMM14", "YMM15", "ZMM0", "ZMM1", "ZMM2",
        "ZMM3", "ZMM4", "ZMM5", "ZMM6", "ZMM7", "ZMM8", "ZMM9", "ZMM10", "ZMM11", "ZMM12", "ZMM13",
        "ZMM14", "ZMM15", "RIP",
    );
    // K0..K7 tokenize as opmask registers, not plain registers (see `TokenKind::OpmaskRegister`);
    // handled specially in `scan_identifier`, not inserted here.

    let prefixes: &[(&str, Prefix)] = &[
        ("LOCK", Prefix::Lock),
        ("REP", Prefix::Rep),
        ("REPE", Prefix::Repe),
        ("REPZ", Prefix::Repe),
        ("REPNE", Prefix::Repne),
        ("REPNZ", Prefix::Repne),
        ("BND", Prefix::Bnd),
        ("NOBND", Prefix::Nobnd),
        ("WAIT", Prefix::Wait),
        ("XACQUIRE", Prefix::Xacquire),
        ("XRELEASE", Prefix::Xrelease),
        ("A16", Prefix::A16),
        ("A32", Prefix::A32),
        ("A64", Prefix::A64),
        ("O16", Prefix::O16),
        ("O32", Prefix::O32),
        ("O64", Prefix::O64),
        ("VEX2", Prefix::Vex2),
        ("VEX3", Prefix::Vex3),
        ("EVEX", Prefix::Evex),
    ];
    for (name, p) in prefixes {
        m.insert(name, Keyword::Prefix(*p));
    }
    // Segment-override prefixes (`es mov ...` legacy syntax) piggyback on the register table at
    // parse time via `Register::class() == Segment`, not here.

    let specials: &[(&str, Special)] = &[
        ("FAR", Special::Far),
        ("NEAR", Special::Near),
        ("SHORT", Special::Short),
        ("STRICT", Special::Strict),
        ("TO", Special::To),
        ("TIMES", Special::Times),
        ("SEG", Special::Seg),
        ("WRT", Special::Wrt),
        ("NOSPLIT", Special::NoSplit),
        ("REL", Special::Rel),
        ("ABS", Special::Abs),
        ("BYTE", Special::Byte),
        ("WORD", Special::Word),
        ("DWORD", Special::Dword),
        ("QWORD", Special::Qword),
        ("TWORD", Special::Tword),
        ("OWORD", Special::Oword),
        ("YWORD", Special::Yword),
        ("ZWORD", Special::Zword),
    ];
    for (name, s) in specials {
        m.insert(name, Keyword::Special(*s));
    }

    m
}

pub struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

fn is_id_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || matches!(c, b'_' | b'.' | b'?' | b'@' | b'$')
}

fn is_id_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'_' | b'$' | b'#' | b'@' | b'~' | b'?' | b'.')
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Scanner { src: src.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == b' ' || c == b'\t' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.pos;
        let c = match self.peek() {
            None => return Token::new(TokenKind::Eol, start),
            Some(c) => c,
        };
        if c == b';' {
            self.pos = self.src.len();
            return Token::new(TokenKind::Eol, start);
        }
        if c == b'\'' || c == b'"' || c == b'`' {
            return self.scan_string(start);
        }
        if c == b'{' {
            return self.scan_decorator(start);
        }
        if c.is_ascii_digit() {
            return self.scan_number(start);
        }
        if c == b'$' && self.peek_at(1).map(|n| n.is_ascii_digit()).unwrap_or(false) {
            // `$`-prefixed hex number (e.g. `$ff`), distinct from `$`-forced identifiers and the
            // bare `$`/`$$` current-location operators: disambiguated by what follows.
            self.bump();
            let digits_start = self.pos;
            while self.peek().map(|d| d.is_ascii_hexdigit()).unwrap_or(false) {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.src[digits_start..self.pos]).unwrap();
            return match i64::from_str_radix(text, 16) {
                Ok(v) => Token::new(TokenKind::Number(v), start),
                Err(_) => Token::new(
                    TokenKind::Error(ScanError::MalformedNumber(text.to_string()).to_string()),
                    start,
                ),
            };
        }
        if is_id_start(c) {
            return self.scan_identifier(start);
        }
        self.scan_operator(start)
    }

    fn scan_identifier(&mut self, start: usize) -> Token {
        let forced = self.peek() == Some(b'$') && self.peek_at(1).map(is_id_start).unwrap_or(false);
        if forced {
            self.bump();
        }
        let id_start = self.pos;
        while let Some(c) = self.peek() {
            if is_id_char(c) {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.src[id_start..self.pos]).unwrap().to_string();
        if forced {
            return Token::new(TokenKind::ForcedIdent(text), start);
        }
        let upper = text.to_ascii_uppercase();
        if upper.len() >= 2 && upper.len() <= 3 && upper.starts_with('K') {
            if let Ok(n) = upper[1..].parse::<u8>() {
                if n <= 7 {
                    return Token::new(TokenKind::OpmaskRegister(n), start);
                }
            }
        }
        match keyword_table().get(upper.as_str()) {
            Some(Keyword::Opcode(op)) => Token::new(TokenKind::Opcode(*op), start),
            Some(Keyword::Condition(c)) => Token::new(TokenKind::Condition(*c), start),
            Some(Keyword::Register(r)) => Token::new(TokenKind::Register(*r), start),
            Some(Keyword::Prefix(p)) => Token::new(TokenKind::Prefix(*p), start),
            Some(Keyword::Special(s)) => Token::new(TokenKind::Special(*s), start),
            Some(Keyword::Jcc(c)) => Token::new(TokenKind::Jcc(*c), start),
            Some(Keyword::DataDecl(w)) => Token::new(TokenKind::DataDecl(*w), start),
            Some(Keyword::ResDecl(w)) => Token::new(TokenKind::ResDecl(*w), start),
            None => Token::new(TokenKind::Ident(text), start),
        }
    }

    /// Accepts the superset of characters any numeric literal can use, then delegates to
    /// `parse_numeric`. A leading `$` form (`$ff`) is handled by the caller recognizing
    /// `Dollar` followed immediately by a hex digit run; this function handles the
    /// digit-initial forms (`0x`, plain decimal, suffixed).
    fn scan_number(&mut self, start: usize) -> Token {
        let num_start = self.pos;
        // A leading `.` belonging to a float is not reached here (digit-initial only); embedded
        // `.`/`e`/`p` exponents are still consumed as part of the run so float detection below
        // can see them.
        while let Some(c) = self.peek() {
            let ok = c.is_ascii_alphanumeric() || c == b'.';
            if !ok {
                break;
            }
            // `e`/`p` exponent may be followed by a sign; absorb it only then.
            if matches!(c, b'+' | b'-') {
                break;
            }
            self.pos += 1;
            if matches!(c, b'e' | b'E' | b'p' | b'P') {
                if let Some(sign) = self.peek() {
                    if matches!(sign, b'+' | b'-') && !is_hex_suffixed(&self.src[num_start..self.pos]) {
                        self.pos += 1;
                    }
                }
            }
        }
        let text = std::str::from_utf8(&self.src[num_start..self.pos]).unwrap();
        if is_float_literal(text) {
            return Token::new(TokenKind::Float(parse_float_literal(text)), start);
        }
        match parse_integer_literal(text) {
            Ok(v) => Token::new(TokenKind::Number(v), start),
            Err(e) => Token::new(TokenKind::Error(e.to_string()), start),
        }
    }

    fn scan_string(&mut self, start: usize) -> Token {
        let quote = self.bump().unwrap();
        let raw_no_escape = quote != b'`';
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => return Token::new(TokenKind::Error(ScanError::UnterminatedString.to_string()), start),
                Some(c) if c == quote => break,
                Some(b'\\') if !raw_no_escape => match self.scan_escape() {
                    Ok(mut v) => bytes.append(&mut v),
                    Err(e) => return Token::new(TokenKind::Error(e.to_string()), start),
                },
                Some(c) => bytes.push(c),
            }
        }
        Token::new(TokenKind::Str(bytes), start)
    }

    fn scan_escape(&mut self) -> Result<Vec<u8>, ScanError> {
        let c = self.bump().ok_or(ScanError::UnterminatedString)?;
        Ok(match c {
            b'a' => vec![0x07],
            b'b' => vec![0x08],
            b'e' => vec![0x1b],
            b'f' => vec![0x0c],
            b'n' => vec![b'\n'],
            b'r' => vec![b'\r'],
            b't' => vec![b'\t'],
            b'v' => vec![0x0b],
            b'\\' => vec![b'\\'],
            b'`' => vec![b'`'],
            b'x' => {
                let mut n = 0u32;
                let mut count = 0;
                while count < 2 {
                    match self.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            n = n * 16 + (h as char).to_digit(16).unwrap();
                            self.pos += 1;
                            count += 1;
                        }
                        _ => break,
                    }
                }
                vec![n as u8]
            }
            b'u' => {
                let cp = self.read_hex_digits(4)?;
                char::from_u32(cp).map(|ch| ch.to_string().into_bytes()).unwrap_or_default()
            }
            b'U' => {
                let cp = self.read_hex_digits(8)?;
                char::from_u32(cp).map(|ch| ch.to_string().into_bytes()).unwrap_or_default()
            }
            d @ b'0'..=b'7' => {
                let mut n = (d - b'0') as u32;
                let mut count = 1;
                while count < 3 {
                    match self.peek() {
                        Some(o @ b'0'..=b'7') => {
                            n = n * 8 + (o - b'0') as u32;
                            self.pos += 1;
                            count += 1;
                        }
                        _ => break,
                    }
                }
                vec![n as u8]
            }
            other => return Err(ScanError::BadEscape(other as char)),
        })
    }

    fn read_hex_digits(&mut self, n: usize) -> Result<u32, ScanError> {
        let mut v = 0u32;
        for _ in 0..n {
            let h = self.bump().ok_or(ScanError::UnterminatedString)?;
            let d = (h as char).to_digit(16).ok_or(ScanError::BadEscape(h as char))?;
            v = v * 16 + d;
        }
        Ok(v)
    }

    fn scan_decorator(&mut self, start: usize) -> Token {
        self.bump(); // '{'
        let inner_start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'}' {
                break;
            }
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[inner_start..self.pos]).unwrap().to_ascii_lowercase();
        if self.peek() == Some(b'}') {
            self.bump();
        }
        let deco = parse_decorator(&text);
        match deco {
            Some(d) => Token::new(TokenKind::Decorator(d), start),
            None => Token::new(TokenKind::Error(format!("unrecognized decorator {{{}}}", text)), start),
        }
    }

    fn scan_operator(&mut self, start: usize) -> Token {
        let c = self.bump().unwrap();
        let two = |s: &mut Self, expect: u8, op2: Operator, op1: Operator| -> Token {
            if s.peek() == Some(expect) {
                s.pos += 1;
                Token::new(TokenKind::Operator(op2), start)
            } else {
                Token::new(TokenKind::Operator(op1), start)
            }
        };
        match c {
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.pos += 1;
                    Token::new(TokenKind::Operator(Operator::Shl), start)
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Token::new(TokenKind::Operator(Operator::Le), start)
                } else if self.peek() == Some(b'>') {
                    self.pos += 1;
                    Token::new(TokenKind::Operator(Operator::Ne), start)
                } else {
                    Token::new(TokenKind::Operator(Operator::Lt), start)
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.pos += 1;
                    if self.peek() == Some(b'>') {
                        self.pos += 1;
                        Token::new(TokenKind::Operator(Operator::Sar), start)
                    } else {
                        Token::new(TokenKind::Operator(Operator::Shr), start)
                    }
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Token::new(TokenKind::Operator(Operator::Ge), start)
                } else {
                    Token::new(TokenKind::Operator(Operator::Gt), start)
                }
            }
            b'/' => two(self, b'/', Operator::SlashSlash, Operator::Slash),
            b'%' => two(self, b'%', Operator::PercentPercent, Operator::Percent),
            b'=' => two(self, b'=', Operator::Eq, Operator::Eq),
            b'!' => two(self, b'=', Operator::Ne, Operator::Bang),
            b'&' => two(self, b'&', Operator::AmpAmp, Operator::Amp),
            b'|' => two(self, b'|', Operator::PipePipe, Operator::Pipe),
            b'^' => two(self, b'^', Operator::CaretCaret, Operator::Caret),
            b'+' => Token::new(TokenKind::Operator(Operator::Plus), start),
            b'-' => Token::new(TokenKind::Operator(Operator::Minus), start),
            b'*' => Token::new(TokenKind::Operator(Operator::Star), start),
            b'~' => Token::new(TokenKind::Operator(Operator::Tilde), start),
            b'(' => Token::new(TokenKind::Operator(Operator::LParen), start),
            b')' => Token::new(TokenKind::Operator(Operator::RParen), start),
            b'[' => Token::new(TokenKind::Operator(Operator::LBracket), start),
            b']' => Token::new(TokenKind::Operator(Operator::RBracket), start),
            b',' => Token::new(TokenKind::Operator(Operator::Comma), start),
            b':' => Token::new(TokenKind::Operator(Operator::Colon), start),
            b'$' => {
                if self.peek() == Some(b'$') {
                    self.pos += 1;
                    Token::new(TokenKind::Operator(Operator::DollarDollar), start)
                } else {
                    Token::new(TokenKind::Operator(Operator::Dollar), start)
                }
            }
            other => Token::new(TokenKind::Error(format!("unexpected character '{}'", other as char)), start),
        }
    }
}

fn parse_decorator(text: &str) -> Option<Decorator> {
    if let Some(rest) = text.strip_prefix('k') {
        if let Ok(n) = rest.parse::<u8>() {
            if n <= 7 {
                return Some(Decorator::Opmask(n));
            }
        }
    }
    match text {
        "z" => Some(Decorator::Zeroing),
        "1to2" => Some(Decorator::Broadcast(2)),
        "1to4" => Some(Decorator::Broadcast(4)),
        "1to8" => Some(Decorator::Broadcast(8)),
        "1to16" => Some(Decorator::Broadcast(16)),
        "rn-sae" => Some(Decorator::RoundNearest),
        "rd-sae" => Some(Decorator::RoundDown),
        "ru-sae" => Some(Decorator::RoundUp),
        "rz-sae" => Some(Decorator::RoundZero),
        "sae" => Some(Decorator::Sae),
        _ => None,
    }
}

fn is_hex_suffixed(run: &[u8]) -> bool {
    run.last().map(|c| matches!(c, b'h' | b'H')).unwrap_or(false)
}

fn is_float_literal(text: &str) -> bool {
    if text.contains('.') {
        return true;
    }
    // exponent forms e/p are only floats when the mantissa isn't itself a hex-suffixed integer
    // (`0eh` is a hex literal, not `0` with an `e` exponent).
    (text.contains('e') || text.contains('E') || text.contains('p') || text.contains('P'))
        && !is_hex_suffixed(text.as_bytes())
}

/// Floating-point literal conversion is explicitly out of scope (§1); this stub stands in for
/// the external routine a full backend would supply.
pub fn parse_float_literal(text: &str) -> f64 {
    text.parse::<f64>().unwrap_or(0.0)
}

/// Parses the full superset-scanned run of an integer literal, dispatching on NASM's family of
/// radix prefixes/suffixes (§4.1).
pub fn parse_integer_literal(text: &str) -> Result<i64, ScanError> {
    let lower = text.to_ascii_lowercase();
    let bad = || ScanError::MalformedNumber(text.to_string());

    if let Some(rest) = lower.strip_prefix("0x").or_else(|| lower.strip_prefix('$')) {
        return i64::from_str_radix(rest, 16).map_err(|_| bad());
    }
    if let Some(rest) = lower.strip_prefix("0o") {
        return i64::from_str_radix(rest, 8).map_err(|_| bad());
    }
    if let Some(rest) = lower.strip_prefix("0b") {
        return i64::from_str_radix(rest, 2).map_err(|_| bad());
    }
    if let Some(rest) = lower.strip_prefix("0d") {
        return rest.parse::<i64>().map_err(|_| bad());
    }
    if let Some(rest) = lower.strip_suffix('h') {
        return i64::from_str_radix(rest, 16).map_err(|_| bad());
    }
    if let Some(rest) = lower.strip_suffix('x') {
        return i64::from_str_radix(rest, 16).map_err(|_| bad());
    }
    if let Some(rest) = lower.strip_suffix('q').or_else(|| lower.strip_suffix('o')) {
        return i64::from_str_radix(rest, 8).map_err(|_| bad());
    }
    if let Some(rest) = lower.strip_suffix('y') {
        return i64::from_str_radix(rest, 2).map_err(|_| bad());
    }
    if let Some(rest) = lower.strip_suffix('t') {
        return rest.parse::<i64>().map_err(|_| bad());
    }
    lower.parse::<i64>().map_err(|_| bad())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut s = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let t = s.next_token();
            let done = t.kind == TokenKind::Eol;
            out.push(t.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_mnemonic_and_registers() {
        let toks = kinds("mov eax, 1");
        assert_eq!(
            toks,
            vec![
                TokenKind::Opcode(Opcode::MOV),
                TokenKind::Register(Register::EAX),
                TokenKind::Operator(Operator::Comma),
                TokenKind::Number(1),
                TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn scans_hex_forms() {
        assert_eq!(parse_integer_literal("0x20").unwrap(), 0x20);
        assert_eq!(parse_integer_literal("20h").unwrap(), 0x20);
        assert_eq!(parse_integer_literal("0b101").unwrap(), 0b101);
        assert_eq!(parse_integer_literal("0o17").unwrap(), 0o17);
        assert_eq!(parse_integer_literal("17q").unwrap(), 0o17);
    }

    #[test]
    fn scans_backtick_string_with_escapes() {
        let toks = kinds(r"`A\x42\n`");
        match &toks[0] {
            TokenKind::Str(bytes) => assert_eq!(bytes, &vec![b'A', 0x42, b'\n']),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn quote_strings_take_no_escapes() {
        let toks = kinds(r#""A\n""#);
        match &toks[0] {
            TokenKind::Str(bytes) => assert_eq!(bytes, b"A\\n"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn scans_decorator_braces() {
        let toks = kinds("{k1}{z}");
        assert_eq!(
            toks[..2],
            [
                TokenKind::Decorator(Decorator::Opmask(1)),
                TokenKind::Decorator(Decorator::Zeroing),
            ]
        );
    }

    #[test]
    fn forced_identifier_skips_keyword_lookup() {
        let toks = kinds("$mov");
        assert_eq!(toks[0], TokenKind::ForcedIdent("mov".to_string()));
    }

    #[test]
    fn opmask_register_is_distinct_from_general_register() {
        let toks = kinds("k3");
        assert_eq!(toks[0], TokenKind::OpmaskRegister(3));
    }

    #[test]
    fn jcc_aliases_share_a_condition() {
        assert_eq!(kinds("JE")[0], TokenKind::Jcc(Condition::Z));
        assert_eq!(kinds("JZ")[0], TokenKind::Jcc(Condition::Z));
        assert_eq!(kinds("JNAE")[0], TokenKind::Jcc(Condition::B));
        assert_eq!(kinds("JC")[0], TokenKind::Jcc(Condition::B));
    }

    #[test]
    fn data_and_res_declarations_carry_element_width() {
        assert_eq!(kinds("DQ")[0], TokenKind::DataDecl(8));
        assert_eq!(kinds("RESD")[0], TokenKind::ResDecl(4));
    }
}
