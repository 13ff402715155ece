//! Turns one source line into an [`Instruction`] record (§4.4): tokenize once, peel the optional
//! label and prefix run, locate the mnemonic, then split whatever tokens remain into operands.
//!
//! This module never calls back into `xasm::ea` -- it only records *syntax* (which tokens named
//! a base register, an index, a displacement expression) into an [`Operand`]; effective-address
//! resolution proper happens later, once the matcher has picked a template and the encoder knows
//! the instruction's final operand sizes.

use crate::error::{ConfigError, EaError, ParseError};
use crate::eval::{Criticality, EvalEnv, Evaluator};
use crate::expr::Expr;
use crate::instruction::{ExtOperand, Instruction, RepKind, VexClass};
use crate::operand::{Decorators, EaFlags, Operand, Rounding};
use crate::scanner::Scanner;
use crate::token::{Decorator, Operator, Prefix, Special, Token, TokenKind};
use xasm_isa::{DecoratorMask, Opcode, OperandFlags, Register, RegisterClass};

/// Parses one logical source line, starting from a blank [`Instruction`] for `bits`-bit mode.
/// `env` supplies the symbol table and `$`/`$$` location the line's expressions are evaluated
/// against; the caller (the driver, across both assembly passes) owns advancing
/// `env.current_offset` between lines.
pub fn parse_line(src: &str, env: &EvalEnv, bits: u8) -> Result<Instruction, ParseError> {
    let tokens = tokenize(src);
    let mut pos = 0;
    let mut insn = Instruction::new(bits);

    if tokens.len() >= 2 {
        if let TokenKind::Ident(name) = &tokens[0].kind {
            if tokens[1].kind == TokenKind::Operator(Operator::Colon) {
                insn.label = Some(name.clone());
                pos = 2;
            }
        }
    }

    loop {
        let advance = match &tokens[pos].kind {
            TokenKind::Prefix(Prefix::Lock) => {
                if insn.lock {
                    return Err(ParseError::Config(ConfigError::ConflictingPrefix));
                }
                insn.lock = true;
                true
            }
            TokenKind::Prefix(Prefix::Wait) => {
                if insn.wait_prefix {
                    return Err(ParseError::Config(ConfigError::ConflictingPrefix));
                }
                insn.wait_prefix = true;
                true
            }
            TokenKind::Prefix(Prefix::Rep) => {
                set_rep(&mut insn, RepKind::Rep)?;
                true
            }
            TokenKind::Prefix(Prefix::Repe) => {
                set_rep(&mut insn, RepKind::Repe)?;
                true
            }
            TokenKind::Prefix(Prefix::Repne) => {
                set_rep(&mut insn, RepKind::Repne)?;
                true
            }
            TokenKind::Prefix(Prefix::Bnd) => {
                set_rep(&mut insn, RepKind::Bnd)?;
                true
            }
            TokenKind::Prefix(Prefix::Nobnd) => {
                set_rep(&mut insn, RepKind::Nobnd)?;
                true
            }
            TokenKind::Prefix(Prefix::Xacquire) => {
                set_rep(&mut insn, RepKind::Xacquire)?;
                true
            }
            TokenKind::Prefix(Prefix::Xrelease) => {
                set_rep(&mut insn, RepKind::Xrelease)?;
                true
            }
            TokenKind::Prefix(Prefix::A16) => {
                set_asize(&mut insn, 16)?;
                true
            }
            TokenKind::Prefix(Prefix::A32) => {
                set_asize(&mut insn, 32)?;
                true
            }
            TokenKind::Prefix(Prefix::A64) => {
                set_asize(&mut insn, 64)?;
                true
            }
            TokenKind::Prefix(Prefix::O16) => {
                set_osize(&mut insn, 16)?;
                true
            }
            TokenKind::Prefix(Prefix::O32) => {
                set_osize(&mut insn, 32)?;
                true
            }
            TokenKind::Prefix(Prefix::O64) => {
                set_osize(&mut insn, 64)?;
                true
            }
            TokenKind::Prefix(Prefix::Vex2) => {
                set_vex(&mut insn, VexClass::Vex2)?;
                true
            }
            TokenKind::Prefix(Prefix::Vex3) => {
                set_vex(&mut insn, VexClass::Vex3)?;
                true
            }
            TokenKind::Prefix(Prefix::Evex) => {
                set_vex(&mut insn, VexClass::Evex)?;
                true
            }
            TokenKind::Prefix(Prefix::SegmentOverride(_)) => true,
            TokenKind::Special(Special::Times) => {
                pos += 1;
                let mut count_tokens = Vec::new();
                while !is_mnemonic_start(&tokens[pos].kind) && tokens[pos].kind != TokenKind::Eol {
                    count_tokens.push(tokens[pos].clone());
                    pos += 1;
                }
                count_tokens.push(Token::new(TokenKind::Eol, 0));
                let mut ev = Evaluator::from_tokens(count_tokens, env, Criticality::Fatal, false);
                let count = ev.evaluate()?;
                if !count.is_really_simple() {
                    return Err(ParseError::ExpectedToken("a constant TIMES count"));
                }
                insn.times = count.reloc_value();
                continue;
            }
            _ => break,
        };
        if advance {
            pos += 1;
        }
    }

    match tokens[pos].kind.clone() {
        TokenKind::Opcode(op) => {
            insn.opcode = op;
            pos += 1;
        }
        TokenKind::Jcc(condition) => {
            insn.opcode = Opcode::JCC;
            insn.condition = Some(condition);
            pos += 1;
        }
        TokenKind::DataDecl(width) => {
            insn.opcode = Opcode::DB;
            insn.element_width = width;
            pos += 1;
        }
        TokenKind::ResDecl(width) => {
            insn.opcode = Opcode::RESB;
            insn.element_width = width;
            pos += 1;
        }
        TokenKind::Eol => return Ok(insn),
        _ => return Err(ParseError::ExpectedToken("a mnemonic")),
    }

    let mut seg_override: Option<Register> = None;
    match insn.opcode {
        Opcode::DB => parse_data_operands(&tokens[pos..], env, &mut insn)?,
        Opcode::RESB => parse_res_operand(&tokens[pos..], env, &mut insn)?,
        Opcode::INCBIN => parse_incbin_operands(&tokens[pos..], env, &mut insn)?,
        _ => {
            for group in split_operands(&tokens[pos..]) {
                let (operand, seg) = parse_operand(group, env, Criticality::Warn)?;
                if let Some(s) = seg {
                    match seg_override {
                        Some(existing) if existing != s => {
                            return Err(ParseError::Ea(EaError::ConflictingSegOverride));
                        }
                        _ => seg_override = Some(s),
                    }
                }
                insn.forward_ref |= operand.unknown;
                insn.operands.push(operand);
            }
        }
    }
    insn.segment_override = seg_override;
    Ok(insn)
}

fn tokenize(src: &str) -> Vec<Token> {
    let mut scanner = Scanner::new(src);
    let mut tokens = Vec::new();
    loop {
        let t = scanner.next_token();
        let done = t.kind == TokenKind::Eol;
        tokens.push(t);
        if done {
            break;
        }
    }
    tokens
}

fn is_mnemonic_start(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Opcode(_) | TokenKind::Jcc(_) | TokenKind::DataDecl(_) | TokenKind::ResDecl(_)
    )
}

fn set_rep(insn: &mut Instruction, kind: RepKind) -> Result<(), ParseError> {
    if insn.rep.is_some() {
        return Err(ParseError::Config(ConfigError::ConflictingPrefix));
    }
    insn.rep = Some(kind);
    Ok(())
}

fn set_asize(insn: &mut Instruction, size: u8) -> Result<(), ParseError> {
    if insn.asize.is_some() {
        return Err(ParseError::Config(ConfigError::ConflictingPrefix));
    }
    insn.asize = Some(size);
    Ok(())
}

fn set_osize(insn: &mut Instruction, size: u8) -> Result<(), ParseError> {
    if insn.osize_prefix.is_some() {
        return Err(ParseError::Config(ConfigError::ConflictingPrefix));
    }
    insn.osize_prefix = Some(size);
    Ok(())
}

fn set_vex(insn: &mut Instruction, class: VexClass) -> Result<(), ParseError> {
    if insn.vex_class.is_some() {
        return Err(ParseError::Config(ConfigError::ConflictingPrefix));
    }
    insn.vex_class = Some(class);
    Ok(())
}

/// Splits the tokens up to (not including) the trailing `Eol` at top-level commas, respecting
/// `(...)`/`[...]` nesting. Each returned group carries its own trailing `Eol` so it can be fed
/// straight to [`Evaluator::from_tokens`]. An operand-less mnemonic (`RET`, `NOP`) yields no
/// groups at all, not one empty one.
fn split_operands(tokens: &[Token]) -> Vec<Vec<Token>> {
    let mut body = Vec::new();
    for t in tokens {
        if t.kind == TokenKind::Eol {
            break;
        }
        body.push(t.clone());
    }
    if body.is_empty() {
        return Vec::new();
    }
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0i32;
    for t in body {
        match &t.kind {
            TokenKind::Operator(Operator::LParen) | TokenKind::Operator(Operator::LBracket) => {
                depth += 1;
                current.push(t);
            }
            TokenKind::Operator(Operator::RParen) | TokenKind::Operator(Operator::RBracket) => {
                depth -= 1;
                current.push(t);
            }
            TokenKind::Operator(Operator::Comma) if depth == 0 => {
                groups.push(std::mem::take(&mut current));
            }
            _ => current.push(t),
        }
    }
    groups.push(current);
    for g in &mut groups {
        g.push(Token::new(TokenKind::Eol, 0));
    }
    groups
}

/// Index of a top-level comma (depth tracked over `(...)` only -- `[...]` cannot nest inside a
/// single EA operand's interior), used to split a MIB operand's `base, index` pair.
fn find_top_level_comma(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0i32;
    for (i, t) in tokens.iter().enumerate() {
        match t.kind {
            TokenKind::Operator(Operator::LParen) => depth += 1,
            TokenKind::Operator(Operator::RParen) => depth -= 1,
            TokenKind::Operator(Operator::Comma) if depth == 0 => return Some(i),
            TokenKind::Eol => return None,
            _ => {}
        }
    }
    None
}

fn find_matching_bracket(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0i32;
    for (i, t) in tokens.iter().enumerate() {
        match t.kind {
            TokenKind::Operator(Operator::LBracket) => depth += 1,
            TokenKind::Operator(Operator::RBracket) => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn peel_leading_size(tokens: &mut Vec<Token>) -> OperandFlags {
    let mut flags = OperandFlags::empty();
    loop {
        let matched = match tokens.first().map(|t| &t.kind) {
            Some(TokenKind::Special(Special::Far)) => Some(OperandFlags::FAR),
            Some(TokenKind::Special(Special::Near)) => Some(OperandFlags::NEAR),
            Some(TokenKind::Special(Special::Short)) => Some(OperandFlags::SHORT),
            Some(TokenKind::Special(Special::Strict)) => Some(OperandFlags::STRICT),
            Some(TokenKind::Special(Special::To)) => Some(OperandFlags::TO),
            Some(TokenKind::Special(Special::Byte)) => Some(OperandFlags::BITS8),
            Some(TokenKind::Special(Special::Word)) => Some(OperandFlags::BITS16),
            Some(TokenKind::Special(Special::Dword)) => Some(OperandFlags::BITS32),
            Some(TokenKind::Special(Special::Qword)) => Some(OperandFlags::BITS64),
            Some(TokenKind::Special(Special::Tword)) => Some(OperandFlags::BITS80),
            Some(TokenKind::Special(Special::Oword)) => Some(OperandFlags::BITS128),
            Some(TokenKind::Special(Special::Yword)) => Some(OperandFlags::BITS256),
            Some(TokenKind::Special(Special::Zword)) => Some(OperandFlags::BITS512),
            _ => None,
        };
        match matched {
            Some(f) => {
                flags |= f;
                tokens.remove(0);
            }
            None => break,
        }
    }
    flags
}

fn peel_inner_specials(tokens: &mut Vec<Token>) -> EaFlags {
    let mut flags = EaFlags::empty();
    loop {
        let matched = match tokens.first().map(|t| &t.kind) {
            Some(TokenKind::Special(Special::Rel)) => Some(EaFlags::REL),
            Some(TokenKind::Special(Special::Abs)) => Some(EaFlags::ABS),
            Some(TokenKind::Special(Special::NoSplit)) => Some(EaFlags::NOSPLIT),
            _ => None,
        };
        match matched {
            Some(f) => {
                flags |= f;
                tokens.remove(0);
            }
            None => break,
        }
    }
    flags
}

fn peel_trailing_decorators(tokens: &mut Vec<Token>) -> Decorators {
    let mut deco = Decorators::default();
    let eol = tokens.pop();
    while let Some(TokenKind::Decorator(d)) = tokens.last().map(|t| t.kind) {
        match d {
            Decorator::Opmask(n) => {
                deco.opmask = Some(n);
                deco.mask |= DecoratorMask::OPMASK;
            }
            Decorator::Zeroing => {
                deco.zeroing = true;
                deco.mask |= DecoratorMask::ZEROING;
            }
            Decorator::Broadcast(n) => {
                deco.broadcast = Some(n);
                deco.mask |= DecoratorMask::BROADCAST;
            }
            Decorator::RoundNearest => {
                deco.rounding = Some(Rounding::Nearest);
                deco.mask |= DecoratorMask::STATIC_ROUNDING;
            }
            Decorator::RoundDown => {
                deco.rounding = Some(Rounding::Down);
                deco.mask |= DecoratorMask::STATIC_ROUNDING;
            }
            Decorator::RoundUp => {
                deco.rounding = Some(Rounding::Up);
                deco.mask |= DecoratorMask::STATIC_ROUNDING;
            }
            Decorator::RoundZero => {
                deco.rounding = Some(Rounding::Zero);
                deco.mask |= DecoratorMask::STATIC_ROUNDING;
            }
            Decorator::Sae => {
                deco.rounding = Some(Rounding::Sae);
                deco.mask |= DecoratorMask::SAE;
            }
        }
        tokens.pop();
    }
    if let Some(e) = eol {
        tokens.push(e);
    }
    deco
}

fn size_flags_for_register(r: Register) -> OperandFlags {
    match r.class().bits() {
        Some(8) => OperandFlags::BITS8,
        Some(16) => OperandFlags::BITS16,
        Some(32) => OperandFlags::BITS32,
        Some(64) => OperandFlags::BITS64,
        Some(128) => OperandFlags::BITS128,
        Some(256) => OperandFlags::BITS256,
        Some(512) => OperandFlags::BITS512,
        _ => OperandFlags::empty(),
    }
}

fn opmask_register(n: u8) -> Register {
    match n {
        0 => Register::K0,
        1 => Register::K1,
        2 => Register::K2,
        3 => Register::K3,
        4 => Register::K4,
        5 => Register::K5,
        6 => Register::K6,
        _ => Register::K7,
    }
}

fn parse_operand(mut tokens: Vec<Token>, env: &EvalEnv, criticality: Criticality) -> Result<(Operand, Option<Register>), ParseError> {
    let pre_flags = peel_leading_size(&mut tokens);
    let deco = peel_trailing_decorators(&mut tokens);
    let (mut op, seg) = match tokens.first().map(|t| t.kind.clone()) {
        Some(TokenKind::Operator(Operator::LBracket)) => {
            let close = find_matching_bracket(&tokens).ok_or(ParseError::ExpectedToken("a closing `]`"))?;
            let mut inner: Vec<Token> = tokens[1..close].to_vec();
            inner.push(Token::new(TokenKind::Eol, 0));
            let eaflags = peel_inner_specials(&mut inner);
            parse_bracket_operand(inner, env, eaflags)?
        }
        _ => (parse_plain_operand(tokens, env, criticality)?, None),
    };
    op.flags |= pre_flags;
    op.decorators = deco;
    Ok((op, seg))
}

fn parse_plain_operand(tokens: Vec<Token>, env: &EvalEnv, criticality: Criticality) -> Result<Operand, ParseError> {
    let mut op = Operand::new();
    if tokens.len() == 2 {
        match tokens[0].kind {
            TokenKind::Register(r) => {
                op.flags |= OperandFlags::REGISTER | size_flags_for_register(r);
                op.base = Some(r);
                return Ok(op);
            }
            TokenKind::OpmaskRegister(n) => {
                op.flags |= OperandFlags::REGISTER;
                op.base = Some(opmask_register(n));
                return Ok(op);
            }
            _ => {}
        }
    }
    let mut ev = Evaluator::from_tokens(tokens, env, criticality, false);
    let expr = ev.evaluate()?;
    if expr.is_unknown() {
        op.flags |= OperandFlags::IMMEDIATE | OperandFlags::UNKNOWN;
        op.unknown = true;
        return Ok(op);
    }
    op.flags |= OperandFlags::IMMEDIATE;
    op.offset = expr.reloc_value();
    op.segment = expr.reloc_seg();
    op.wrt = expr.reloc_wrt();
    Ok(op)
}

/// Decomposes a fully evaluated EA expression into base/index/scale/offset terms (§4.4): at most
/// one register with coefficient 1 becomes the base, any other register term becomes the index
/// with its coefficient as the scale.
///
/// `rip` is not a real addressable base register (§4.5/register.rs): it only ever appears as a
/// literal `[rip+disp]` offset, so a `Register::RIP` term never becomes `base`/`index`. Instead
/// it marks the operand `REL`+`RIP_LITERAL`, which routes it through the EA resolver's
/// pure-offset path with the literal displacement written verbatim, rather than the computed
/// `target - next_insn` form `[rel symbol]` uses.
fn apply_ea_terms(op: &mut Operand, expr: &Expr) {
    if expr.is_unknown() {
        op.unknown = true;
    }
    for (reg, coeff) in expr.register_terms() {
        if reg == Register::RIP {
            op.eaflags |= EaFlags::REL | EaFlags::RIP_LITERAL;
            continue;
        }
        if coeff == 1 && op.base.is_none() {
            op.base = Some(reg);
        } else {
            op.index = Some(reg);
            op.scale = coeff.unsigned_abs() as u8;
        }
    }
    op.offset = expr.reloc_value();
    op.wrt = expr.reloc_wrt();
}

fn parse_bracket_operand(mut inner: Vec<Token>, env: &EvalEnv, eaflags: EaFlags) -> Result<(Operand, Option<Register>), ParseError> {
    let mut seg_override = None;
    if inner.len() >= 2 {
        if let TokenKind::Register(r) = inner[0].kind {
            if r.class() == RegisterClass::Segment && inner[1].kind == TokenKind::Operator(Operator::Colon) {
                seg_override = Some(r);
                inner.drain(0..2);
            }
        }
    }

    let mut op = Operand::new();
    op.flags |= OperandFlags::MEMORY;
    op.eaflags |= eaflags;

    if let Some(idx) = find_top_level_comma(&inner) {
        op.eaflags |= EaFlags::MIB;
        let index_tokens = inner.split_off(idx + 1);
        inner.pop(); // the comma itself
        inner.push(Token::new(TokenKind::Eol, 0));

        let mut base_ev = Evaluator::from_tokens(inner, env, Criticality::Warn, true);
        let base_expr = base_ev.evaluate()?;
        let mut index_ev = Evaluator::from_tokens(index_tokens, env, Criticality::Warn, true);
        let index_expr = index_ev.evaluate()?;

        op.base = base_expr.single_register().map(|(r, _)| r);
        op.index = index_expr.single_register().map(|(r, _)| r);
        op.offset = base_expr.reloc_value() + index_expr.reloc_value();
        op.unknown = base_expr.is_unknown() || index_expr.is_unknown();
    } else {
        let mut ev = Evaluator::from_tokens(inner, env, Criticality::Warn, true);
        let expr = ev.evaluate()?;
        apply_ea_terms(&mut op, &expr);
    }
    Ok((op, seg_override))
}

/// `DB`/`DW`/.../`DZ`: a comma-separated list of byte/string/float literals, each producing one
/// [`ExtOperand`] (§4.4). Unlike every other opcode these bypass the matcher entirely.
fn parse_data_operands(tokens: &[Token], env: &EvalEnv, insn: &mut Instruction) -> Result<(), ParseError> {
    let groups = split_operands(tokens);
    if groups.is_empty() {
        return Err(ParseError::UnexpectedEol);
    }
    for g in groups {
        if g.len() == 2 {
            match &g[0].kind {
                TokenKind::Str(bytes) => {
                    insn.ext_operands.push(ExtOperand::Raw(bytes.clone()));
                    continue;
                }
                TokenKind::Float(f) => {
                    insn.ext_operands.push(ExtOperand::Float(*f));
                    continue;
                }
                _ => {}
            }
        }
        let mut ev = Evaluator::from_tokens(g, env, Criticality::Warn, false);
        let expr = ev.evaluate()?;
        insn.forward_ref |= expr.is_unknown();
        insn.ext_operands.push(ExtOperand::Number(expr.reloc_value()));
    }
    Ok(())
}

/// `RESB`/.../`RESZ`: exactly one constant count, normalized into bytes via `element_width` and
/// stashed as the sole operand's offset (the `\340 Resb` bytecode op reads it from there).
fn parse_res_operand(tokens: &[Token], env: &EvalEnv, insn: &mut Instruction) -> Result<(), ParseError> {
    let mut groups = split_operands(tokens);
    let count_tokens = match groups.len() {
        0 => vec![Token::new(TokenKind::Number(1), 0), Token::new(TokenKind::Eol, 0)],
        1 => groups.remove(0),
        _ => return Err(ParseError::ExpectedToken("a single RESx count")),
    };
    let mut ev = Evaluator::from_tokens(count_tokens, env, Criticality::Fatal, false);
    let expr = ev.evaluate()?;
    if !expr.is_really_simple() {
        return Err(ParseError::ExpectedToken("a constant RESx count"));
    }
    let mut op = Operand::new();
    op.flags |= OperandFlags::IMMEDIATE;
    op.offset = expr.reloc_value() * insn.element_width as i64;
    insn.operands.push(op);
    Ok(())
}

/// `INCBIN "file"[, skip[, length]]`: the filename must be a string literal, the optional
/// skip/length arguments must be constants (§4.8).
fn parse_incbin_operands(tokens: &[Token], env: &EvalEnv, insn: &mut Instruction) -> Result<(), ParseError> {
    let mut groups = split_operands(tokens);
    if groups.is_empty() || groups.len() > 3 {
        return Err(ParseError::Config(ConfigError::TooManyIncbinArgs));
    }
    let filename = groups.remove(0);
    match &filename[0].kind {
        TokenKind::Str(bytes) => insn.ext_operands.push(ExtOperand::Raw(bytes.clone())),
        _ => return Err(ParseError::ExpectedToken("an INCBIN filename string")),
    }
    for g in groups {
        let mut ev = Evaluator::from_tokens(g, env, Criticality::Fatal, false);
        let expr = ev.evaluate()?;
        if !expr.is_really_simple() {
            return Err(ParseError::ExpectedToken("a constant INCBIN offset/length"));
        }
        insn.ext_operands.push(ExtOperand::Number(expr.reloc_value()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{Location, SymbolTable};

    fn env(labels: &SymbolTable) -> EvalEnv {
        EvalEnv {
            labels,
            current_seg: 0,
            current_offset: 0,
            in_absolute_block: false,
            max_depth: 64,
        }
    }

    #[test]
    fn parses_register_and_immediate_operands() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("mov eax, 1", &e, 32).unwrap();
        assert_eq!(insn.opcode, Opcode::MOV);
        assert_eq!(insn.operands.len(), 2);
        assert!(insn.operands[0].is_register());
        assert_eq!(insn.operands[0].base, Some(Register::EAX));
        assert!(insn.operands[1].is_immediate());
        assert_eq!(insn.operands[1].offset, 1);
    }

    #[test]
    fn recognizes_label_prefix() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("top: inc ecx", &e, 32).unwrap();
        assert_eq!(insn.label.as_deref(), Some("top"));
        assert_eq!(insn.opcode, Opcode::INC);
    }

    #[test]
    fn decomposes_base_plus_displacement_memory_operand() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("mov eax, [ebx+4]", &e, 32).unwrap();
        let mem = &insn.operands[1];
        assert!(mem.is_memory());
        assert_eq!(mem.base, Some(Register::EBX));
        assert_eq!(mem.offset, 4);
    }

    #[test]
    fn decomposes_scaled_index_memory_operand() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("mov eax, [ecx*4+edx]", &e, 32).unwrap();
        let mem = &insn.operands[1];
        assert_eq!(mem.base, Some(Register::EDX));
        assert_eq!(mem.index, Some(Register::ECX));
        assert_eq!(mem.scale, 4);
    }

    #[test]
    fn jcc_mnemonic_carries_its_condition() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("jnz .loop", &e, 32).unwrap();
        assert_eq!(insn.opcode, Opcode::JCC);
        assert_eq!(insn.condition, Some(xasm_isa::Condition::NZ));
    }

    #[test]
    fn times_sets_the_repeat_count() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("times 3 nop", &e, 32).unwrap();
        assert_eq!(insn.times, 3);
        assert_eq!(insn.opcode, Opcode::NOP);
    }

    #[test]
    fn resd_normalizes_to_resb_with_element_width() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("resd 2", &e, 32).unwrap();
        assert_eq!(insn.opcode, Opcode::RESB);
        assert_eq!(insn.operands[0].offset, 8);
    }

    #[test]
    fn db_accepts_mixed_string_and_numeric_operands() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line(r#"db "AB", 0"#, &e, 32).unwrap();
        assert_eq!(insn.opcode, Opcode::DB);
        assert_eq!(insn.ext_operands.len(), 2);
        match &insn.ext_operands[0] {
            ExtOperand::Raw(bytes) => assert_eq!(bytes, b"AB"),
            other => panic!("expected raw bytes, got {:?}", other),
        }
    }

    #[test]
    fn label_reference_resolves_to_relocatable_immediate() {
        let mut labels = SymbolTable::new();
        labels.define("target", Location { segment: 0, offset: 0x40 }, true);
        let e = env(&labels);
        let insn = parse_line("call target", &e, 32).unwrap();
        assert_eq!(insn.operands[0].offset, 0x40);
        assert_eq!(insn.operands[0].segment, Some(0));
    }

    #[test]
    fn segment_override_inside_brackets_is_recorded() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("mov eax, [es:ebx]", &e, 32).unwrap();
        assert_eq!(insn.segment_override, Some(Register::ES));
        assert_eq!(insn.operands[1].base, Some(Register::EBX));
    }

    #[test]
    fn rep_and_lock_occupy_independent_prefix_slots() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let insn = parse_line("lock xadd [eax], ecx", &e, 32).unwrap();
        assert!(insn.lock);
    }

    #[test]
    fn duplicate_prefix_in_the_same_slot_is_rejected() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let err = parse_line("lock lock add eax, 1", &e, 32);
        assert!(matches!(err, Err(ParseError::Config(ConfigError::ConflictingPrefix))));
    }
}
