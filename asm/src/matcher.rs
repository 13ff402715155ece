//! Template matcher (§4.6): given a parsed [`Instruction`], pick the best [`Template`] among
//! its opcode's candidates under the current CPU mode and decorator constraints.
//!
//! The eleven-step procedure of §4.6 is folded into [`try_match`] (per-template) plus
//! [`check_operand`] (per-operand); [`select_template`] drives the whole candidate list, keeping
//! the highest-[`MatchError::rank`] failure seen and handling the "fuzzy" operand-size retry
//! (step 6's "forgiven, then retried with the template's size applied").

use crate::instruction::{Instruction, RepKind, VexClass};
use crate::error::MatchError;
use xasm_isa::bytecode::{Op, Ops};
use xasm_isa::{CpuLevel, DecoratorMask, OperandFlags, Template, TemplateFlags};

/// What the matcher settled on for one `Instruction`.
pub enum Selected {
    /// An ordinary match: walk `template`'s bytecode once (calcsize) then again (gencode).
    Direct(&'static Template),
    /// A short-jump candidate (`\370`/`\371`): the caller must call [`jmp_match`] once the
    /// target displacement is knowable to decide between `short` and `long`.
    ShortJump { short: &'static Template, long: &'static Template },
}

enum OpVerdict {
    Ok,
    /// The operand's size was unset (forgiven); retrying with this size would make it match.
    Fuzzy(OperandFlags),
    Fail(MatchError),
}

enum Verdict {
    Ok,
    OkFuzzy(Vec<(usize, OperandFlags)>),
    Fail(MatchError),
}

const MODIFIER_MASK: OperandFlags = OperandFlags::from_bits_truncate(
    OperandFlags::FAR.bits() | OperandFlags::NEAR.bits() | OperandFlags::SHORT.bits()
        | OperandFlags::COLON.bits() | OperandFlags::TO.bits(),
);

fn check_operand(ot: &xasm_isa::OperandTemplate, op: &crate::operand::Operand) -> OpVerdict {
    if (ot.flags & MODIFIER_MASK) != (op.flags & MODIFIER_MASK) {
        return OpVerdict::Fail(MatchError::InvalOp);
    }

    let class_ok = (op.is_register() && ot.flags.contains(OperandFlags::REGISTER))
        || (op.is_memory() && ot.flags.contains(OperandFlags::MEMORY))
        || (op.is_immediate() && ot.flags.contains(OperandFlags::IMMEDIATE));
    if !class_ok {
        return OpVerdict::Fail(MatchError::InvalOp);
    }

    let extra_deco = op.decorators.mask & !ot.decorators;
    if extra_deco.contains(DecoratorMask::OPMASK) {
        return OpVerdict::Fail(MatchError::MaskNotHere);
    }
    if extra_deco.contains(DecoratorMask::BROADCAST) {
        return OpVerdict::Fail(MatchError::BrNotHere);
    }
    if extra_deco.intersects(DecoratorMask::STATIC_ROUNDING | DecoratorMask::SAE) {
        return OpVerdict::Fail(MatchError::DecoNotHere);
    }
    if extra_deco.contains(DecoratorMask::ZEROING) {
        return OpVerdict::Fail(MatchError::DecoNotHere);
    }
    if op.decorators.broadcast.is_some() && !ot.decorators.contains(DecoratorMask::BROADCAST) {
        return OpVerdict::Fail(MatchError::BrNotHere);
    }
    // A broadcast ratio must be one a vector of this width could plausibly hold (§4.6's
    // "broadcast element counting"); full tuple-type-aware validation lives with the EA
    // resolver's `TupleBytes`, this is just the coarse "is this ratio absurd" gate.
    if let Some(n) = op.decorators.broadcast {
        if !matches!(n, 2 | 4 | 8 | 16) {
            return OpVerdict::Fail(MatchError::BrNumMismatch);
        }
    }

    let template_size = ot.flags & OperandFlags::SIZE_MASK;
    let op_size = op.flags & OperandFlags::SIZE_MASK;
    if template_size.is_empty() {
        return OpVerdict::Ok;
    }
    if op_size.is_empty() {
        if op.is_register() {
            // A register operand always carries a concrete size; an empty size here means the
            // operand was never classified (an internal inconsistency, not a fuzzy one).
            return OpVerdict::Fail(MatchError::OpSizeMissing);
        }
        return OpVerdict::Fuzzy(template_size);
    }
    if template_size.intersects(op_size) {
        OpVerdict::Ok
    } else {
        OpVerdict::Fail(MatchError::OpSizeMismatch)
    }
}

fn vex_class_ok(vc: VexClass, flags: TemplateFlags) -> bool {
    match vc {
        VexClass::Evex => flags.contains(TemplateFlags::EVEX),
        VexClass::Vex2 | VexClass::Vex3 => {
            flags.contains(TemplateFlags::VEX) && !flags.contains(TemplateFlags::EVEX)
        }
    }
}

fn try_match(t: &'static Template, insn: &Instruction, bits: u8, cpu: CpuLevel, optimizing: bool) -> Verdict {
    if t.operand_count() != insn.operand_count() {
        return Verdict::Fail(MatchError::InvalOp);
    }
    if t.flags.contains(TemplateFlags::OPT) && !optimizing {
        return Verdict::Fail(MatchError::InvalOp);
    }
    if let Some(vc) = insn.vex_class {
        if !vex_class_ok(vc, t.flags) {
            return Verdict::Fail(MatchError::EncMismatch);
        }
    }
    if !t.cpu.satisfied_by(cpu) {
        return Verdict::Fail(MatchError::BadCpu);
    }
    if t.flags.contains(TemplateFlags::LONG) && bits != 64 {
        return Verdict::Fail(MatchError::BadMode);
    }
    if t.flags.contains(TemplateFlags::NOLONG) && bits == 64 {
        return Verdict::Fail(MatchError::BadMode);
    }
    if insn.lock && !t.flags.contains(TemplateFlags::LOCK) {
        return Verdict::Fail(MatchError::InvalOp);
    }
    if matches!(insn.rep, Some(RepKind::Xacquire) | Some(RepKind::Xrelease))
        && t.flags.contains(TemplateFlags::NOHLE)
    {
        return Verdict::Fail(MatchError::BadHle);
    }
    if matches!(insn.rep, Some(RepKind::Bnd) | Some(RepKind::Nobnd)) && !t.flags.contains(TemplateFlags::BND) {
        return Verdict::Fail(MatchError::BadBnd);
    }
    if matches!(insn.rep, Some(RepKind::Repne)) && t.flags.contains(TemplateFlags::BND) {
        return Verdict::Fail(MatchError::BadRepne);
    }

    // An operand whose own size is concrete (a register, or a memory/immediate operand with an
    // explicit size keyword) anchors the instruction's operand size; a fuzzy sibling narrows its
    // candidate set against that anchor before falling back to the template's raw (possibly
    // multi-width) size mask.
    let anchor = insn
        .operands
        .iter()
        .map(|op| op.flags & OperandFlags::SIZE_MASK)
        .find(|f| !f.is_empty() && single_bit(*f));

    let mut fuzzy = Vec::new();
    for (i, ot) in t.operands.iter().enumerate() {
        match check_operand(ot, &insn.operands[i]) {
            OpVerdict::Ok => {}
            OpVerdict::Fuzzy(template_size) => {
                let narrowed = anchor
                    .map(|a| template_size & a)
                    .filter(|f| !f.is_empty())
                    .unwrap_or(template_size);
                fuzzy.push((i, narrowed));
            }
            OpVerdict::Fail(e) => return Verdict::Fail(e),
        }
    }
    if fuzzy.is_empty() {
        Verdict::Ok
    } else {
        Verdict::OkFuzzy(fuzzy)
    }
}

fn single_bit(flags: OperandFlags) -> bool {
    flags.bits().count_ones() == 1
}

/// When a fuzzy resolution still carries more than one candidate width (an all-immediate
/// instruction with no sized peer), pick one deterministically rather than leave the operand
/// ambiguous for the encoder; 32 is the closest thing x86 has to a "default" operand size.
fn pick_one(flags: OperandFlags) -> OperandFlags {
    if single_bit(flags) || flags.is_empty() {
        return flags;
    }
    for candidate in [
        OperandFlags::BITS32,
        OperandFlags::BITS64,
        OperandFlags::BITS16,
        OperandFlags::BITS8,
        OperandFlags::BITS128,
        OperandFlags::BITS256,
        OperandFlags::BITS512,
        OperandFlags::BITS80,
    ] {
        if flags.contains(candidate) {
            return candidate;
        }
    }
    flags
}

fn apply_sizes(insn: &mut Instruction, resolved: &[(usize, OperandFlags)]) {
    for (i, flags) in resolved {
        insn.operands[*i].flags |= pick_one(*flags);
    }
}

/// Union (per operand index) the size each still-viable fuzzy candidate would assign; usable
/// only when that union collapses to a single concrete width (§4.6's "when unique").
fn unify(fuzzy: &[(usize, Vec<(usize, OperandFlags)>)]) -> Option<Vec<(usize, OperandFlags)>> {
    let mut by_index: Vec<(usize, OperandFlags)> = Vec::new();
    for (_, reqs) in fuzzy {
        for (idx, flags) in reqs {
            match by_index.iter_mut().find(|(i, _)| i == idx) {
                Some((_, acc)) => *acc |= *flags,
                None => by_index.push((*idx, *flags)),
            }
        }
    }
    if by_index.iter().all(|(_, f)| single_bit(*f)) {
        Some(by_index)
    } else {
        None
    }
}

fn is_short_jump_candidate(t: &'static Template) -> bool {
    matches!(Ops::new(t.bytecode).next(), Some(Op::ShortJump { .. }))
}

fn finalize(candidates: &'static [Template], idx: usize) -> Selected {
    let t = &candidates[idx];
    if is_short_jump_candidate(t) {
        // By convention (and by every template pair in `table::TEMPLATES`) the long form
        // immediately follows its short-jump candidate in the opcode's template list.
        let long = candidates.get(idx + 1).unwrap_or(t);
        Selected::ShortJump { short: t, long }
    } else {
        Selected::Direct(t)
    }
}

/// Select the best-matching template for `insn`, mutating any fuzzy-resolved operand's size
/// flags in place so the encoder sees a fully concrete operand list (§4.6).
pub fn select_template(
    insn: &mut Instruction,
    bits: u8,
    cpu: CpuLevel,
    optimizing: bool,
) -> Result<Selected, MatchError> {
    let candidates = crate::instruction::candidates(insn);
    if candidates.is_empty() {
        return Err(MatchError::InvalOp);
    }

    let mut best_err = MatchError::InvalOp;
    let mut fuzzy_candidates: Vec<(usize, Vec<(usize, OperandFlags)>)> = Vec::new();
    for (i, t) in candidates.iter().enumerate() {
        match try_match(t, insn, bits, cpu, optimizing) {
            Verdict::Ok => return Ok(finalize(candidates, i)),
            Verdict::OkFuzzy(reqs) => fuzzy_candidates.push((i, reqs)),
            Verdict::Fail(e) => {
                if e.rank() > best_err.rank() {
                    best_err = e;
                }
            }
        }
    }

    if fuzzy_candidates.len() == 1 {
        let (i, reqs) = fuzzy_candidates.into_iter().next().unwrap();
        apply_sizes(insn, &reqs);
        return Ok(finalize(candidates, i));
    }
    if !fuzzy_candidates.is_empty() {
        if let Some(resolved) = unify(&fuzzy_candidates) {
            apply_sizes(insn, &resolved);
            for (i, t) in candidates.iter().enumerate() {
                if let Verdict::Ok = try_match(t, insn, bits, cpu, optimizing) {
                    return Ok(finalize(candidates, i));
                }
            }
        }
        return Err(MatchError::OpSizeMissing);
    }

    Err(best_err)
}

/// Resolve a short-jump candidate's reach (§4.6 step 10, §8 S7): a known, in-range target takes
/// the short form; an out-of-range, forward-unresolved, or explicitly `NEAR`/`STRICT` target
/// takes the long one. `current_offset` is the address of the jump instruction itself.
pub fn jmp_match(
    short: &'static Template,
    long: &'static Template,
    insn: &Instruction,
    current_offset: i64,
) -> &'static Template {
    let op = match insn.operands.first() {
        Some(op) => op,
        None => return long,
    };
    if op.flags.intersects(OperandFlags::NEAR | OperandFlags::STRICT) {
        return long;
    }
    if op.unknown {
        return long;
    }
    const SHORT_LEN: i64 = 2;
    let disp = op.offset - (current_offset + SHORT_LEN);
    if (-128..=127).contains(&disp) {
        short
    } else {
        long
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Operand;
    use xasm_isa::{Opcode, Register};

    fn reg_op(flags: OperandFlags, reg: Register) -> Operand {
        let mut op = Operand::new();
        op.flags = flags | OperandFlags::REGISTER;
        op.base = Some(reg);
        op
    }

    fn imm_op(value: i64) -> Operand {
        let mut op = Operand::new();
        op.flags = OperandFlags::IMMEDIATE;
        op.offset = value;
        op
    }

    #[test]
    fn mov_reg_imm_resolves_fuzzy_immediate_size() {
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::MOV;
        insn.operands = vec![reg_op(OperandFlags::BITS32, Register::EAX), imm_op(1)];
        let selected = select_template(&mut insn, 32, CpuLevel::Optimizing, true).unwrap();
        assert!(matches!(selected, Selected::Direct(_)));
        assert!(insn.operands[1].flags.contains(OperandFlags::BITS32));
    }

    #[test]
    fn add_reg_imm_narrows_to_the_registers_width() {
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::ADD;
        insn.operands = vec![reg_op(OperandFlags::BITS32, Register::EAX), imm_op(5)];
        select_template(&mut insn, 32, CpuLevel::Optimizing, true).unwrap();
        assert!(insn.operands[1].flags.contains(OperandFlags::BITS32));
        assert!(!insn.operands[1].flags.contains(OperandFlags::BITS16));
    }

    #[test]
    fn jmp_immediate_is_a_short_jump_candidate() {
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::JMP;
        insn.operands = vec![imm_op(10)];
        let selected = select_template(&mut insn, 32, CpuLevel::Optimizing, true).unwrap();
        assert!(matches!(selected, Selected::ShortJump { .. }));
    }

    #[test]
    fn strict_near_jmp_skips_the_short_candidate() {
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::JMP;
        let mut target = imm_op(10);
        target.flags |= OperandFlags::NEAR;
        insn.operands = vec![target];
        let selected = select_template(&mut insn, 32, CpuLevel::Optimizing, true).unwrap();
        assert!(matches!(selected, Selected::Direct(_)));
    }

    #[test]
    fn wrong_operand_count_is_invalop() {
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::RET;
        insn.operands = vec![imm_op(1)];
        let err = select_template(&mut insn, 32, CpuLevel::Optimizing, true).unwrap_err();
        assert_eq!(err, MatchError::InvalOp);
    }

    #[test]
    fn nolong_template_rejected_in_64_bit_mode() {
        let mut insn = Instruction::new(64);
        insn.opcode = Opcode::MOVSXD;
        insn.operands = vec![reg_op(OperandFlags::BITS64, Register::RAX), reg_op(OperandFlags::BITS32, Register::EBX)];
        let err = select_template(&mut insn, 64, CpuLevel::Optimizing, true).unwrap_err();
        assert_eq!(err, MatchError::BadMode);
    }

    #[test]
    fn jmp_match_picks_short_form_within_reach() {
        let insn_short = {
            let mut insn = Instruction::new(32);
            insn.opcode = Opcode::JMP;
            insn.operands = vec![imm_op(10)];
            insn
        };
        let (short, long) = match select_template(&mut { insn_short.clone() }, 32, CpuLevel::Optimizing, true).unwrap()
        {
            Selected::ShortJump { short, long } => (short, long),
            _ => unreachable!(),
        };
        let chosen = jmp_match(short, long, &insn_short, 0);
        assert_eq!(chosen as *const _, short as *const _);
    }

    #[test]
    fn jmp_match_falls_back_to_long_out_of_range() {
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::JMP;
        insn.operands = vec![imm_op(1000)];
        let (short, long) = match select_template(&mut insn, 32, CpuLevel::Optimizing, true).unwrap() {
            Selected::ShortJump { short, long } => (short, long),
            _ => unreachable!(),
        };
        let chosen = jmp_match(short, long, &insn, 0);
        assert_eq!(chosen as *const _, long as *const _);
    }
}
