//! Canonical symbolic value representation: a sparse, terminated sequence of terms.
//!
//! An [`Expr`] is the assembler's universal value type. A plain integer, a label reference, a
//! register coefficient inside `[...]`, and an unresolved forward reference are all the same
//! type, distinguished only by which [`Term`] variants are present. [`add_vectors`] and
//! [`scalar_mult`] are the only two operations that ever combine or scale one, which keeps the
//! "is this really just a number" questions answerable by the predicates below rather than by
//! re-deriving them at every call site.

use crate::error::EvalError;
use xasm_isa::Register;

pub const SEG_ABS: u16 = 0xFFFF;

/// One term of an expression. `Zero` terms are semantically absent (callers should skip them)
/// but are allowed to remain in a vector rather than forcing a compaction pass after every op.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TermKind {
    Zero,
    Simple,
    Unknown,
    Wrt,
    Register(Register),
    SegBase(u16),
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Term {
    pub kind: TermKind,
    pub value: i64,
}

impl Term {
    pub fn new(kind: TermKind, value: i64) -> Self {
        if value == 0 && kind != TermKind::Unknown {
            Term { kind: TermKind::Zero, value: 0 }
        } else {
            Term { kind, value }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.kind == TermKind::Zero
    }
}

/// A symbolic value: a small ordered list of non-colliding terms, sorted by `TermKind` so that
/// [`add_vectors`] can merge two expressions with a single linear scan.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Expr {
    terms: Vec<Term>,
}

fn term_rank(kind: TermKind) -> u32 {
    match kind {
        TermKind::Zero => 0,
        TermKind::Simple => 1,
        TermKind::Unknown => 2,
        TermKind::Wrt => 3,
        TermKind::Register(r) => 10 + r as u32,
        TermKind::SegBase(id) => 10_000 + id as u32,
    }
}

impl Expr {
    pub fn new() -> Self {
        Expr { terms: Vec::new() }
    }

    pub fn simple(value: i64) -> Self {
        let mut e = Expr::new();
        e.push(Term::new(TermKind::Simple, value));
        e
    }

    pub fn unknown() -> Self {
        let mut e = Expr::new();
        e.push(Term { kind: TermKind::Unknown, value: 1 });
        e
    }

    pub fn register(reg: Register, coeff: i64) -> Self {
        let mut e = Expr::new();
        e.push(Term::new(TermKind::Register(reg), coeff));
        e
    }

    pub fn seg_base(seg: u16, coeff: i64) -> Self {
        let mut e = Expr::new();
        e.push(Term::new(TermKind::SegBase(seg), coeff));
        e
    }

    pub fn push(&mut self, term: Term) {
        if term.is_zero() {
            return;
        }
        let rank = term_rank(term.kind);
        let pos = self.terms.iter().position(|t| term_rank(t.kind) >= rank);
        match pos {
            Some(i) if term_rank(self.terms[i].kind) == rank => self.terms[i].value += term.value,
            Some(i) => self.terms.insert(i, term),
            None => self.terms.push(term),
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter().filter(|t| !t.is_zero())
    }

    // --- predicates ------------------------------------------------------------------------

    pub fn is_unknown(&self) -> bool {
        self.terms().any(|t| t.kind == TermKind::Unknown)
    }

    /// All non-zero terms are `Simple` or far-absolute (`SegBase(SEG_ABS)`); at most one
    /// `Simple` term.
    pub fn is_simple(&self) -> bool {
        if self.is_unknown() {
            return false;
        }
        let mut simple_count = 0;
        for t in self.terms() {
            match t.kind {
                TermKind::Simple => simple_count += 1,
                TermKind::SegBase(SEG_ABS) => {}
                _ => return false,
            }
        }
        simple_count <= 1
    }

    /// As [`Expr::is_simple`], but disallows the far-absolute segment term too.
    pub fn is_really_simple(&self) -> bool {
        self.is_simple() && !self.terms().any(|t| t.kind == TermKind::SegBase(SEG_ABS))
    }

    /// At most one `SegBase(s)` with coefficient +1 (the segment), optionally one
    /// `SegBase(current)` with coefficient -1 (self-relative), optionally one `Wrt` term, plus
    /// an optional `Simple` offset.
    pub fn is_reloc(&self, current_seg: u16) -> bool {
        if self.is_unknown() {
            return false;
        }
        let mut segs = 0;
        let mut self_rel = 0;
        let mut wrts = 0;
        let mut simples = 0;
        for t in self.terms() {
            match t.kind {
                TermKind::Simple => simples += 1,
                TermKind::Wrt => wrts += 1,
                TermKind::SegBase(s) if t.value == 1 => {
                    segs += 1;
                    let _ = s;
                }
                TermKind::SegBase(s) if s == current_seg && t.value == -1 => self_rel += 1,
                _ => return false,
            }
        }
        segs <= 1 && self_rel <= 1 && wrts <= 1 && simples <= 1
    }

    pub fn is_self_relative(&self, current_seg: u16) -> bool {
        self.is_reloc(current_seg)
            && self
                .terms()
                .any(|t| t.kind == TermKind::SegBase(current_seg) && t.value == -1)
    }

    /// Offset component of a *really simple* or *reloc* expression.
    pub fn reloc_value(&self) -> i64 {
        self.terms()
            .find(|t| t.kind == TermKind::Simple)
            .map(|t| t.value)
            .unwrap_or(0)
    }

    /// The relocation segment of a *reloc* expression, or `None` if it carries no segment term.
    pub fn reloc_seg(&self) -> Option<u16> {
        self.terms().find_map(|t| match t.kind {
            TermKind::SegBase(s) if t.value == 1 && s != SEG_ABS => Some(s),
            _ => None,
        })
    }

    pub fn reloc_wrt(&self) -> Option<u16> {
        self.terms().find_map(|t| match t.kind {
            TermKind::Wrt => Some(t.value as u16),
            _ => None,
        })
    }

    /// The sole register coefficient, if this expression has exactly one.
    pub fn single_register(&self) -> Option<(Register, i64)> {
        let mut found = None;
        for t in self.terms() {
            if let TermKind::Register(r) = t.kind {
                if found.is_some() {
                    return None;
                }
                found = Some((r, t.value));
            }
        }
        found
    }

    pub fn register_terms(&self) -> Vec<(Register, i64)> {
        self.terms()
            .filter_map(|t| match t.kind {
                TermKind::Register(r) => Some((r, t.value)),
                _ => None,
            })
            .collect()
    }
}

/// Merge two sorted-by-type expressions. If either side is *really simple*, far-absolute
/// segment components of the other side are preserved; otherwise they are dropped. Terms
/// sharing a type have their coefficients summed; a sum surviving as non-zero for a register
/// term is the caller's cue to set the EA "summed" hint.
pub fn add_vectors(p: &Expr, q: &Expr) -> Expr {
    if p.is_unknown() || q.is_unknown() {
        return Expr::unknown();
    }
    let p_keeps_far_abs = p.is_really_simple();
    let q_keeps_far_abs = q.is_really_simple();
    let mut out = Expr::new();
    for t in p.terms() {
        if t.kind == TermKind::SegBase(SEG_ABS) && !q_keeps_far_abs {
            continue;
        }
        out.push(*t);
    }
    for t in q.terms() {
        if t.kind == TermKind::SegBase(SEG_ABS) && !p_keeps_far_abs {
            continue;
        }
        out.push(*t);
    }
    out
}

/// Multiply every non-segment coefficient by `k`; far-absolute segment terms are dropped
/// rather than scaled, since a segment base scaled by anything but 1 is meaningless. When
/// `affect_hints` is set and this multiplies a register term, the caller uses that to downgrade
/// a `MakeBase` hint to `NotBase` (see [`crate::operand::Hint`]).
pub fn scalar_mult(e: &Expr, k: i64) -> Expr {
    let mut out = Expr::new();
    for t in e.terms() {
        if matches!(t.kind, TermKind::SegBase(s) if s == SEG_ABS) {
            continue;
        }
        out.push(Term::new(t.kind, t.value.wrapping_mul(k)));
    }
    out
}

/// Extract the segment base of a relocatable expression as a scalar-value expression.
pub fn segment_part(e: &Expr, current_seg: u16) -> Result<Expr, EvalError> {
    if e.is_unknown() {
        return Ok(Expr::unknown());
    }
    if !e.is_reloc(current_seg) {
        return Err(EvalError::NonRelocatable);
    }
    match e.reloc_seg() {
        Some(seg) => Ok(Expr::simple(seg as i64)),
        None => Ok(Expr::simple(SEG_ABS as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_addition_sums_offsets() {
        let a = Expr::simple(5);
        let b = Expr::simple(7);
        let sum = add_vectors(&a, &b);
        assert!(sum.is_really_simple());
        assert_eq!(sum.reloc_value(), 12);
    }

    #[test]
    fn unknown_propagates_through_addition() {
        let a = Expr::unknown();
        let b = Expr::simple(1);
        assert!(add_vectors(&a, &b).is_unknown());
    }

    #[test]
    fn scalar_mult_scales_register_coefficient() {
        let reg = Register::EAX;
        let e = Expr::register(reg, 1);
        let scaled = scalar_mult(&e, 4);
        assert_eq!(scaled.single_register(), Some((reg, 4)));
    }

    #[test]
    fn reloc_expression_reports_its_segment() {
        let mut e = Expr::simple(0x10);
        e.push(Term::new(TermKind::SegBase(3), 1));
        assert!(e.is_reloc(0));
        assert_eq!(e.reloc_seg(), Some(3));
        assert_eq!(e.reloc_value(), 0x10);
    }

    #[test]
    fn self_relative_expression_is_detected() {
        let mut e = Expr::simple(4);
        e.push(Term::new(TermKind::SegBase(2), -1));
        assert!(e.is_self_relative(2));
    }
}
