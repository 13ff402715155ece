//! Recursive-descent evaluator folding a token stream into an [`Expr`] (§4.3).
//!
//! Two grammars share the same precedence climb, switched by [`Criticality`]'s sibling flag
//! `critical_relative`: the default grammar omits the top four relational/boolean levels
//! (`rexp0..rexp3`) since most places an expression appears (an immediate, a displacement)
//! never need `a == b` to mean anything. `WRT`'s right-hand side and `[...]` EA expressions set
//! it so `1 == 2` inside a conditional-assembly context still means something, mirroring NASM's
//! own split.

use crate::error::EvalError;
use crate::expr::{add_vectors, scalar_mult, segment_part, Expr, Term, TermKind};
use crate::labels::LabelStore;
use crate::scanner::Scanner;
use crate::token::{Operator, Special, Token, TokenKind};
use xasm_isa::Register;

/// How hard a forward/undefined symbol reference should fail (§4.3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Criticality {
    /// Forward references are fine; returns an `Unknown` term and sets `forward_ref`.
    Free = 0,
    /// Forward references are fine on pass 1 but get a `NotDefinedBeforeUse` diagnostic.
    Warn = 1,
    /// Forward/undefined references are fatal (`UndefinedSymbol`) -- pass 2 and INCBIN args.
    Fatal = 2,
}

/// Ambient state the evaluator consults for `$`/`$$`/`SEG`/symbol lookups. The driver owns the
/// real instance; this is the minimal slice the evaluator needs (§5's "current segment/offset").
pub struct EvalEnv<'a> {
    pub labels: &'a dyn LabelStore,
    pub current_seg: u16,
    pub current_offset: i64,
    pub in_absolute_block: bool,
    /// Maximum recursion depth before `ExpressionTooLong` (§4.3).
    pub max_depth: u32,
}

pub struct Evaluator<'a> {
    tokens: Vec<Token>,
    pos: usize,
    env: &'a EvalEnv<'a>,
    criticality: Criticality,
    critical_relative: bool,
    depth: u32,
    pub forward_ref: bool,
}

impl<'a> Evaluator<'a> {
    /// Tokenizes `src` eagerly (the evaluator owns the whole expression's tokens, matching the
    /// teacher's habit of collecting a `Pair`'s children up front rather than re-invoking a pull
    /// scanner per level; §6 still documents the scanner as a pull-source for the language as a
    /// whole, which `xasm::parser` uses directly).
    pub fn new(src: &str, env: &'a EvalEnv<'a>, criticality: Criticality, critical_relative: bool) -> Self {
        let mut scanner = Scanner::new(src);
        let mut tokens = Vec::new();
        loop {
            let t = scanner.next_token();
            let is_eol = t.kind == TokenKind::Eol;
            tokens.push(t);
            if is_eol {
                break;
            }
        }
        Evaluator {
            tokens,
            pos: 0,
            env,
            criticality,
            critical_relative,
            depth: 0,
            forward_ref: false,
        }
    }

    /// Builds an evaluator directly from an already-split token slice: `xasm::parser` tokenizes
    /// a whole line once, then slices it into per-operand runs at top-level commas, and hands
    /// each run here instead of re-rendering it to text and re-scanning. `tokens` must end with
    /// an `Eol` token, matching what `Scanner` itself produces.
    pub fn from_tokens(tokens: Vec<Token>, env: &'a EvalEnv<'a>, criticality: Criticality, critical_relative: bool) -> Self {
        Evaluator {
            tokens,
            pos: 0,
            env,
            criticality,
            critical_relative,
            depth: 0,
            forward_ref: false,
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn bump(&mut self) -> TokenKind {
        let t = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat_op(&mut self, op: Operator) -> bool {
        if *self.peek() == TokenKind::Operator(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > self.env.max_depth {
            return Err(EvalError::ExpressionTooLong);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Entry point: parse one full expression and finalize (§4.3's "the evaluator does not
    /// retain it after `finalize`" -- here that is simply `self` being dropped by the caller).
    pub fn evaluate(&mut self) -> Result<Expr, EvalError> {
        self.expr()
    }

    // expr : bexpr [ WRT expr6 ]
    fn expr(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let lhs = self.bexpr()?;
        let result = if *self.peek() == TokenKind::Special(Special::Wrt) {
            self.bump();
            let rhs = self.expr6()?;
            self.apply_wrt(lhs, rhs)?
        } else {
            lhs
        };
        self.leave();
        Ok(result)
    }

    /// The right-hand side of `WRT` must name a segment: either a relocatable symbol (its
    /// segment id is the WRT target) or a plain number (an explicit segment id, e.g. `WRT 0`).
    fn apply_wrt(&mut self, lhs: Expr, rhs: Expr) -> Result<Expr, EvalError> {
        if rhs.is_unknown() {
            return Ok(Expr::unknown());
        }
        let wrt_id = match rhs.reloc_seg() {
            Some(seg) => seg,
            None if rhs.is_really_simple() => rhs.reloc_value() as u16,
            None => return Err(EvalError::InvalidWrt),
        };
        let mut out = lhs;
        out.push(Term::new(TermKind::Wrt, wrt_id as i64));
        Ok(out)
    }

    fn bexpr(&mut self) -> Result<Expr, EvalError> {
        if self.critical_relative {
            self.rexp0()
        } else {
            self.expr0()
        }
    }

    fn rexp0(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.rexp1()?;
        while self.eat_op(Operator::PipePipe) {
            let rhs = self.rexp1()?;
            lhs = self.bool_op(lhs, rhs, |a, b| (a != 0 || b != 0) as i64)?;
        }
        Ok(lhs)
    }

    fn rexp1(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.rexp2()?;
        while self.eat_op(Operator::CaretCaret) {
            let rhs = self.rexp2()?;
            lhs = self.bool_op(lhs, rhs, |a, b| ((a != 0) != (b != 0)) as i64)?;
        }
        Ok(lhs)
    }

    fn rexp2(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.rexp3()?;
        while self.eat_op(Operator::AmpAmp) {
            let rhs = self.rexp3()?;
            lhs = self.bool_op(lhs, rhs, |a, b| (a != 0 && b != 0) as i64)?;
        }
        Ok(lhs)
    }

    fn bool_op(&self, a: Expr, b: Expr, f: impl Fn(i64, i64) -> i64) -> Result<Expr, EvalError> {
        if a.is_unknown() || b.is_unknown() {
            return Ok(Expr::unknown());
        }
        if !a.is_simple() || !b.is_simple() {
            return Err(EvalError::NonScalarOp);
        }
        Ok(Expr::simple(f(a.reloc_value(), b.reloc_value())))
    }

    fn rexp3(&mut self) -> Result<Expr, EvalError> {
        let lhs = self.expr0()?;
        let op = match self.peek() {
            TokenKind::Operator(op @ (Operator::Eq | Operator::Ne | Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge)) => Some(*op),
            _ => None,
        };
        let op = match op {
            Some(op) => op,
            None => return Ok(lhs),
        };
        self.bump();
        let rhs = self.expr0()?;
        let diff = add_vectors(&lhs, &scalar_mult(&rhs, -1));
        if diff.is_unknown() {
            return Ok(Expr::unknown());
        }
        if !diff.is_really_simple() {
            return Err(EvalError::NonScalarCompare);
        }
        let v = diff.reloc_value();
        let result = match op {
            Operator::Eq => v == 0,
            Operator::Ne => v != 0,
            Operator::Lt => v < 0,
            Operator::Gt => v > 0,
            Operator::Le => v <= 0,
            Operator::Ge => v >= 0,
            _ => unreachable!(),
        };
        Ok(Expr::simple(result as i64))
    }

    fn expr0(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.expr1()?;
        while self.eat_op(Operator::Pipe) {
            let rhs = self.expr1()?;
            lhs = self.bitwise(lhs, rhs, |a, b| a | b)?;
        }
        Ok(lhs)
    }

    fn expr1(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.expr2()?;
        while self.eat_op(Operator::Caret) {
            let rhs = self.expr2()?;
            lhs = self.bitwise(lhs, rhs, |a, b| a ^ b)?;
        }
        Ok(lhs)
    }

    fn expr2(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.expr3()?;
        while self.eat_op(Operator::Amp) {
            let rhs = self.expr3()?;
            lhs = self.bitwise(lhs, rhs, |a, b| a & b)?;
        }
        Ok(lhs)
    }

    fn bitwise(&self, a: Expr, b: Expr, f: impl Fn(i64, i64) -> i64) -> Result<Expr, EvalError> {
        if a.is_unknown() || b.is_unknown() {
            return Ok(Expr::unknown());
        }
        if !a.is_simple() || !b.is_simple() {
            return Err(EvalError::NonScalarOp);
        }
        Ok(Expr::simple(f(a.reloc_value(), b.reloc_value())))
    }

    fn expr3(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.expr4()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(op @ (Operator::Shl | Operator::Shr | Operator::Sar)) => Some(*op),
                _ => None,
            };
            let op = match op {
                Some(op) => op,
                None => break,
            };
            self.bump();
            let rhs = self.expr4()?;
            lhs = self.bitwise(lhs, rhs, |a, b| match op {
                Operator::Shl => a.wrapping_shl(b as u32 & 63),
                Operator::Shr => ((a as u64) >> (b as u32 & 63)) as i64,
                Operator::Sar => a.wrapping_shr(b as u32 & 63),
                _ => unreachable!(),
            })?;
        }
        Ok(lhs)
    }

    // expr4 : +|-  -- add_vectors-based, does not require scalar operands.
    fn expr4(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.expr5()?;
        loop {
            if self.eat_op(Operator::Plus) {
                let rhs = self.expr5()?;
                lhs = add_vectors(&lhs, &rhs);
            } else if self.eat_op(Operator::Minus) {
                let rhs = self.expr5()?;
                lhs = add_vectors(&lhs, &scalar_mult(&rhs, -1));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    // expr5 : *|/|%|//|%%
    fn expr5(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.expr6()?;
        loop {
            let op = match self.peek() {
                TokenKind::Operator(op @ (Operator::Star | Operator::Slash | Operator::Percent | Operator::SlashSlash | Operator::PercentPercent)) => Some(*op),
                _ => None,
            };
            let op = match op {
                Some(op) => op,
                None => break,
            };
            self.bump();
            let rhs = self.expr6()?;
            lhs = self.mul_div(lhs, rhs, op)?;
        }
        Ok(lhs)
    }

    fn mul_div(&self, a: Expr, b: Expr, op: Operator) -> Result<Expr, EvalError> {
        if a.is_unknown() || b.is_unknown() {
            return Ok(Expr::unknown());
        }
        if op == Operator::Star {
            // At least one side must be simple; multiplying a register term by a simple scalar
            // is how indexed memory is expressed (`affect_hints = true` here, §4.2/§4.3).
            if a.is_simple() {
                let k = a.reloc_value();
                return Ok(scalar_mult(&b, k));
            }
            if b.is_simple() {
                let k = b.reloc_value();
                return Ok(scalar_mult(&a, k));
            }
            return Err(EvalError::NonScalarMul);
        }
        if !a.is_simple() || !b.is_simple() {
            return Err(EvalError::NonScalarOp);
        }
        let x = a.reloc_value();
        let y = b.reloc_value();
        if y == 0 {
            return Err(EvalError::DivByZero);
        }
        let v = match op {
            Operator::Slash => ((x as u64) / (y as u64)) as i64,
            Operator::Percent => ((x as u64) % (y as u64)) as i64,
            Operator::SlashSlash => x.wrapping_div(y),
            Operator::PercentPercent => x.wrapping_rem(y),
            _ => unreachable!(),
        };
        Ok(Expr::simple(v))
    }

    // expr6 : unary | (bexpr) | symbol | $ | $$ | number | string | register | decorator
    fn expr6(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let result = self.expr6_inner();
        self.leave();
        result
    }

    fn expr6_inner(&mut self) -> Result<Expr, EvalError> {
        match self.peek().clone() {
            TokenKind::Operator(Operator::Plus) => {
                self.bump();
                self.expr6()
            }
            TokenKind::Operator(Operator::Minus) => {
                self.bump();
                let v = self.expr6()?;
                Ok(scalar_mult(&v, -1))
            }
            TokenKind::Operator(Operator::Tilde) => {
                self.bump();
                let v = self.expr6()?;
                if v.is_unknown() {
                    return Ok(Expr::unknown());
                }
                if !v.is_simple() {
                    return Err(EvalError::NonScalarOp);
                }
                Ok(Expr::simple(!v.reloc_value()))
            }
            TokenKind::Operator(Operator::Bang) => {
                self.bump();
                let v = self.expr6()?;
                if v.is_unknown() {
                    return Ok(Expr::unknown());
                }
                if !v.is_simple() {
                    return Err(EvalError::NonScalarOp);
                }
                Ok(Expr::simple((v.reloc_value() == 0) as i64))
            }
            TokenKind::Special(Special::Seg) => {
                self.bump();
                let v = self.expr6()?;
                let seg = segment_part(&v, self.env.current_seg)?;
                if seg.is_unknown() && self.criticality == Criticality::Fatal {
                    return Err(EvalError::CannotResolveSegment);
                }
                Ok(seg)
            }
            TokenKind::Operator(Operator::LParen) => {
                self.bump();
                let v = self.bexpr()?;
                if !self.eat_op(Operator::RParen) {
                    return Err(EvalError::UnexpectedToken);
                }
                Ok(v)
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(Expr::simple(n))
            }
            TokenKind::Register(r) => {
                self.bump();
                Ok(Expr::register(r, 1))
            }
            TokenKind::Operator(Operator::Dollar) => {
                self.bump();
                Ok(self.here())
            }
            TokenKind::Operator(Operator::DollarDollar) => {
                self.bump();
                Ok(Expr::seg_base(self.env.current_seg, 1))
            }
            TokenKind::Ident(name) => {
                self.bump();
                self.symbol(&name)
            }
            TokenKind::ForcedIdent(name) => {
                self.bump();
                self.symbol(&name)
            }
            _ => Err(EvalError::UnexpectedToken),
        }
    }

    fn here(&self) -> Expr {
        let mut e = Expr::seg_base(self.env.current_seg, 1);
        if self.env.current_offset != 0 {
            e.push(Term::new(TermKind::Simple, self.env.current_offset));
        }
        e
    }

    fn symbol(&mut self, name: &str) -> Result<Expr, EvalError> {
        match self.env.labels.lookup(name) {
            Some(loc) => {
                let mut e = Expr::seg_base(loc.segment, 1);
                if loc.offset != 0 {
                    e.push(Term::new(TermKind::Simple, loc.offset));
                }
                Ok(e)
            }
            None => match self.criticality {
                Criticality::Fatal => Err(EvalError::UndefinedSymbol(name.to_string())),
                Criticality::Warn => {
                    // Still resolvable in a later pass; the caller surfaces the warning.
                    self.forward_ref = true;
                    Ok(Expr::unknown())
                }
                Criticality::Free => {
                    self.forward_ref = true;
                    Ok(Expr::unknown())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{Location, SymbolTable};

    fn env(labels: &SymbolTable) -> EvalEnv {
        EvalEnv {
            labels,
            current_seg: 0,
            current_offset: 0x100,
            in_absolute_block: false,
            max_depth: 64,
        }
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let mut ev = Evaluator::new("1 + 2*3", &e, Criticality::Fatal, false);
        let v = ev.evaluate().unwrap();
        assert!(v.is_really_simple());
        assert_eq!(v.reloc_value(), 7);
    }

    #[test]
    fn multiply_by_register_produces_scaled_index() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let mut ev = Evaluator::new("1 + 2*eax", &e, Criticality::Fatal, false);
        let v = ev.evaluate().unwrap();
        assert_eq!(v.single_register(), Some((Register::EAX, 2)));
        assert_eq!(v.reloc_value(), 1);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let mut ev = Evaluator::new("1/0", &e, Criticality::Fatal, false);
        assert_eq!(ev.evaluate(), Err(EvalError::DivByZero));
    }

    #[test]
    fn undefined_symbol_is_fatal_under_criticality_two() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let mut ev = Evaluator::new("undefined_sym", &e, Criticality::Fatal, false);
        assert!(matches!(ev.evaluate(), Err(EvalError::UndefinedSymbol(_))));
    }

    #[test]
    fn undefined_symbol_under_criticality_zero_is_unknown() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let mut ev = Evaluator::new("undefined_sym", &e, Criticality::Free, false);
        let v = ev.evaluate().unwrap();
        assert!(v.is_unknown());
        assert!(ev.forward_ref);
    }

    #[test]
    fn dollar_evaluates_to_current_location() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let mut ev = Evaluator::new("$", &e, Criticality::Fatal, false);
        let v = ev.evaluate().unwrap();
        assert_eq!(v.reloc_seg(), Some(0));
        assert_eq!(v.reloc_value(), 0x100);
    }

    #[test]
    fn dollardollar_evaluates_to_segment_start() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let mut ev = Evaluator::new("$$", &e, Criticality::Fatal, false);
        let v = ev.evaluate().unwrap();
        assert_eq!(v.reloc_value(), 0);
    }

    #[test]
    fn relational_comparison_requires_critical_relative_grammar() {
        let labels = SymbolTable::new();
        let e = env(&labels);
        let mut ev = Evaluator::new("1 == 1", &e, Criticality::Fatal, true);
        let v = ev.evaluate().unwrap();
        assert_eq!(v.reloc_value(), 1);
    }

    #[test]
    fn label_lookup_resolves_to_relocatable_expression() {
        let mut labels = SymbolTable::new();
        labels.define("foo", Location { segment: 2, offset: 0x40 }, true);
        let e = env(&labels);
        let mut ev = Evaluator::new("foo + 4", &e, Criticality::Fatal, false);
        let v = ev.evaluate().unwrap();
        assert_eq!(v.reloc_seg(), Some(2));
        assert_eq!(v.reloc_value(), 0x44);
    }
}
