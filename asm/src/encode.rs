//! The two-pass bytecode interpreter (component H): `calcsize` and `gencode` are the same walk
//! of a template's bytecode program, fed a different [`Sink`] -- a [`objfmt::SizeCounter`] that
//! only tallies lengths, or a real sink that lays down bytes -- so the two can never disagree
//! with each other. Grounded on the teacher's encoder, which walks one bytecode program against
//! two different `Program` writers; generalized here to any `objfmt::Sink`.
//!
//! Which operand supplies ModRM.reg, versus a literal `/digit` extension, is not recorded in the
//! bytecode itself (see [`xasm_isa::bytecode::Op::ModRm`]): it is derived here, once per
//! template, from the template's own per-operand flags (a REGISTER-without-MEMORY operand
//! supplies the register; otherwise the decoded value is a literal digit). The EA operand is
//! found the same way, by scanning for the operand carrying the `MEMORY` flag.

use crate::ea::{self, Ea};
use crate::error::EncodeError;
use crate::instruction::{Instruction, RepKind, RexVexStaging};
use crate::operand::Operand;
use objfmt::{Record, RecordType, Sink};
use xasm_isa::bytecode::{self, AddrSizeCtl, Op, OpSizeCtl};
use xasm_isa::{OperandFlags, Register, Template, TemplateFlags};

const REX_B: u8 = 0x1;
const REX_X: u8 = 0x2;
const REX_R: u8 = 0x4;
const REX_W: u8 = 0x8;

/// Which operand (if any) a decoded ModRM field value names, resolved once per template from its
/// static operand flags rather than per instance.
#[derive(Clone, Copy, Debug, PartialEq)]
enum RegSource {
    Digit(u8),
    Operand(usize),
}

fn find_ea_operand(template: &Template) -> Option<usize> {
    template.operands.iter().position(|o| o.flags.contains(OperandFlags::MEMORY))
}

fn classify_reg_field(template: &Template, ea_idx: Option<usize>, selector: u8) -> RegSource {
    let idx = selector as usize;
    if Some(idx) != ea_idx {
        if let Some(ot) = template.operands.get(idx) {
            if ot.flags.contains(OperandFlags::REGISTER) && !ot.flags.contains(OperandFlags::MEMORY) {
                return RegSource::Operand(idx);
            }
        }
    }
    RegSource::Digit(selector)
}

/// The VEX/EVEX `.vvvv` operand of a 3-register-operand form: whichever operand is neither the
/// EA operand nor the ModRM.reg operand, and is itself a bare register.
fn find_vvvv_operand(template: &Template, ea_idx: Option<usize>, reg_idx: Option<usize>) -> Option<usize> {
    template.operands.iter().enumerate().position(|(i, o)| {
        Some(i) != ea_idx
            && Some(i) != reg_idx
            && o.flags.contains(OperandFlags::REGISTER)
            && !o.flags.contains(OperandFlags::MEMORY)
    })
}

fn reg_field_value(insn: &Instruction, source: RegSource) -> Result<u8, EncodeError> {
    match source {
        RegSource::Digit(d) => Ok(d & 0x7),
        RegSource::Operand(idx) => {
            let reg = insn
                .operands
                .get(idx)
                .and_then(Operand::register)
                .ok_or(EncodeError::OperandClassViolation)?;
            Ok(reg.low_bits() | ((reg.is_extended() as u8) << 3))
        }
    }
}

fn vvvv_value(insn: &Instruction, opnum: Option<usize>) -> u8 {
    match opnum.and_then(|i| insn.operands.get(i)).and_then(Operand::register) {
        Some(reg) => reg.low_bits() | ((reg.is_extended() as u8) << 3),
        None => 0b1111,
    }
}

fn segment_override_byte(reg: Register) -> u8 {
    match reg {
        Register::ES => 0x26,
        Register::CS => 0x2E,
        Register::SS => 0x36,
        Register::DS => 0x3E,
        Register::FS => 0x64,
        Register::GS => 0x65,
        _ => 0,
    }
}

fn truncate_le(value: i64, size: u8) -> Vec<u8> {
    value.to_le_bytes()[..size as usize].to_vec()
}

/// A running cursor over one instruction's output bytes, relative to `segment:base_offset`.
/// Every byte group is handed to the `Sink` as soon as it is known; nothing is buffered past the
/// point its final value is computed.
struct Writer<'a, S: Sink> {
    sink: &'a mut S,
    segment: u16,
    base_offset: i64,
    pos: i64,
}

impl<'a, S: Sink> Writer<'a, S> {
    fn here(&self) -> i64 {
        self.base_offset + self.pos
    }

    fn raw(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.sink.output(Record::raw(self.segment, self.here(), bytes));
        }
        self.pos += bytes.len() as i64;
    }

    fn reserve(&mut self, mut n: i64) {
        while n > 0 {
            let chunk = n.min(u8::MAX as i64) as u8;
            self.sink.output(Record::reserve(self.segment, self.here(), chunk));
            self.pos += chunk as i64;
            n -= chunk as i64;
        }
    }

    fn rel(&mut self, target_offset: i64, size: u8, rel_base: Option<i64>) {
        self.sink.output(Record {
            kind: RecordType::RelAddr,
            segment: self.segment,
            offset: self.here(),
            size,
            data: None,
            target_segment: Some(self.segment),
            target_offset: Some(target_offset),
            target_wrt: None,
            sign: objfmt::Sign::Signed,
            rel_base,
        });
        self.pos += size as i64;
    }

    fn seg16(&mut self, target_segment: u16) {
        self.sink.output(Record {
            kind: RecordType::Segment,
            segment: self.segment,
            offset: self.here(),
            size: 2,
            data: None,
            target_segment: Some(target_segment),
            target_offset: None,
            target_wrt: None,
            sign: objfmt::Sign::Unsigned,
            rel_base: None,
        });
        self.pos += 2;
    }
}

/// Facts about a template's bytecode program collected by one read-only walk, before anything is
/// emitted: which operand (if any) supplies ModRM.reg, whether REX.W/VEX/EVEX are in play, and
/// the legacy-prefix decisions the per-template bytecode forces.
#[derive(Default)]
struct Staged {
    modrm_selector: Option<u8>,
    plus_reg_opnum: Option<usize>,
    force_rexw: bool,
    no_high_byte: bool,
    vex: Option<(u8, u8)>,
    evex: Option<(u8, u8, u8)>,
    opsize_ctl: Option<OpSizeCtl>,
    rep_extension: Option<u8>,
    force_rep: Option<bool>,
    is_short_jump: bool,
}

fn prescan(program: &[u8]) -> Result<Staged, EncodeError> {
    let mut staged = Staged::default();
    let mut pos = 0;
    let mut bias: i64 = 0;
    loop {
        let (op, next) = bytecode::decode(program, pos).ok_or(EncodeError::BytecodeCorrupt)?;
        pos = next;
        match op {
            Op::End => break,
            Op::Bias { a, b } => {
                bias += if a { 4 } else { 0 } + if b { 4 } else { 0 };
                continue;
            }
            Op::ModRm { ea_opnum, reg } => {
                staged.modrm_selector = Some(((reg << 3) | ea_opnum as u8) + bias as u8);
            }
            Op::LiteralPlusReg { opnum, .. } => {
                staged.plus_reg_opnum = Some(opnum + bias as usize);
            }
            Op::ForceRexW => staged.force_rexw = true,
            Op::NoHighByte => staged.no_high_byte = true,
            Op::Vex { cm, wlp } => staged.vex = Some((cm, wlp)),
            Op::Evex { cm, wlp, tuple } => staged.evex = Some((cm, wlp, tuple)),
            Op::OpSize(ctl) => staged.opsize_ctl = Some(ctl),
            Op::RepExtension(byte) => staged.rep_extension = Some(byte),
            Op::ForceRep(on) => staged.force_rep = Some(on),
            Op::ShortJump { .. } => staged.is_short_jump = true,
            _ => {}
        }
        bias = 0;
    }
    Ok(staged)
}

/// Resolve the EVEX/VEX `.vvvv`, opmask, zeroing, broadcast/rounding decorators off whichever
/// instruction operand actually carries them (the matcher has already confirmed at most one
/// operand can).
fn decorator_bits(insn: &Instruction) -> (u8, bool, bool) {
    for op in &insn.operands {
        if op.decorators.opmask.is_some() || op.decorators.zeroing {
            return (op.decorators.opmask.unwrap_or(0), op.decorators.zeroing, false);
        }
        if op.decorators.broadcast.is_some() || op.decorators.rounding.is_some() {
            return (0, false, true);
        }
    }
    (0, false, false)
}

fn vex_evex_prefix(insn: &Instruction, staging: &RexVexStaging, cm: u8, wlp: u8, evex: Option<u8>, vvvv: u8) -> Vec<u8> {
    let w = wlp & 0x1;
    let l = (wlp >> 1) & 0x3;
    let pp = (wlp >> 3) & 0x3;
    let inv_r = 1 - ((staging.rex >> 2) & 1);
    let inv_x = 1 - ((staging.rex >> 1) & 1);
    let inv_b = 1 - (staging.rex & 1);
    let inv_vvvv = (!vvvv) & 0xF;

    if let Some(tuple) = evex {
        let _ = tuple;
        let (aaa, z, rounding) = decorator_bits(insn);
        let b0 = 0x62;
        let b1 = (inv_r << 7) | (inv_x << 6) | (inv_b << 5) | (1 << 4) | (cm & 0x3);
        let b2 = (w << 7) | (inv_vvvv << 3) | (1 << 2) | pp;
        let b3 = ((z as u8) << 7) | (l << 5) | ((rounding as u8) << 4) | (1 << 3) | (aaa & 0x7);
        vec![b0, b1, b2, b3]
    } else if insn.vex_class == Some(crate::instruction::VexClass::Vex2) && cm == 1 && inv_x == 1 && inv_b == 1 && w == 0 {
        let b0 = 0xC5;
        let b1 = (inv_r << 7) | (inv_vvvv << 3) | (l << 2) | pp;
        vec![b0, b1]
    } else {
        let b0 = 0xC4;
        let b1 = (inv_r << 7) | (inv_x << 6) | (inv_b << 5) | (cm & 0x1F);
        let b2 = (w << 7) | (inv_vvvv << 3) | (l << 2) | pp;
        vec![b0, b1, b2]
    }
}

fn resolved_operand_size(insn: &Instruction, template: &Template) -> u8 {
    fn size_of(flags: OperandFlags) -> Option<u8> {
        let table = [
            (OperandFlags::BITS512, 512),
            (OperandFlags::BITS256, 256),
            (OperandFlags::BITS128, 128),
            (OperandFlags::BITS80, 80),
            (OperandFlags::BITS64, 64),
            (OperandFlags::BITS32, 32),
            (OperandFlags::BITS16, 16),
            (OperandFlags::BITS8, 8),
        ];
        table.iter().find(|(bit, _)| flags.contains(*bit)).map(|(_, bits)| *bits)
    }

    for (i, ot) in template.operands.iter().enumerate() {
        if !ot.flags.intersects(OperandFlags::REGISTER | OperandFlags::MEMORY) {
            continue;
        }
        let mask = ot.flags & OperandFlags::SIZE_MASK;
        if mask.bits().count_ones() == 1 {
            if let Some(bits) = size_of(mask) {
                return bits;
            }
        }
        if let Some(op) = insn.operands.get(i) {
            if let Some(bits) = size_of(op.flags & OperandFlags::SIZE_MASK) {
                return bits;
            }
        }
    }
    32
}

/// Whether this instruction's resolved EA (if any) is RIP-relative *and* needs the whole
/// instruction's length known up front so its displacement (`target - next_insn`) can be
/// computed. A literal `[rip+disp]` operand (`RIP_LITERAL`) writes its displacement verbatim
/// instead, so it never needs this pre-pass.
fn uses_rip_relative(insn: &Instruction, ea_idx: Option<usize>) -> bool {
    ea_idx
        .and_then(|i| insn.operands.get(i))
        .map(|op| {
            op.eaflags.contains(crate::operand::EaFlags::REL)
                && !op.eaflags.contains(crate::operand::EaFlags::RIP_LITERAL)
                && insn.bits == 64
                && op.base.is_none()
                && op.index.is_none()
        })
        .unwrap_or(false)
}

/// Run one template's bytecode program against `sink`, starting at `segment:offset`. Returns the
/// total length in bytes. The same call, fed a [`objfmt::SizeCounter`] or a real sink, always
/// agrees on both the length and on whether the instruction encodes at all.
pub fn encode<S: Sink>(
    insn: &Instruction,
    template: &Template,
    segment: u16,
    offset: i64,
    sink: &mut S,
) -> Result<i64, EncodeError> {
    let ea_idx = find_ea_operand(template);
    let rip_base = if uses_rip_relative(insn, ea_idx) {
        let mut counter = objfmt::SizeCounter::default();
        encode_body(insn, template, segment, offset, &mut counter, None)?;
        Some(offset + counter.total)
    } else {
        None
    };
    encode_body(insn, template, segment, offset, sink, rip_base)
}

fn encode_body<S: Sink>(
    insn: &Instruction,
    template: &Template,
    segment: u16,
    offset: i64,
    sink: &mut S,
    rip_base: Option<i64>,
) -> Result<i64, EncodeError> {
    let staged = prescan(template.bytecode)?;
    let ea_idx = find_ea_operand(template);
    let is_vex_evex = template.flags.intersects(TemplateFlags::VEX | TemplateFlags::EVEX);

    let reg_source = match staged.modrm_selector {
        Some(selector) => Some(classify_reg_field(template, ea_idx, selector)),
        None => None,
    };
    let reg_operand_idx = match reg_source {
        Some(RegSource::Operand(i)) => Some(i),
        _ => None,
    };
    let vvvv_idx = if is_vex_evex && template.operand_count() >= 3 {
        find_vvvv_operand(template, ea_idx, reg_operand_idx)
    } else {
        None
    };

    let mut staging = RexVexStaging::default();
    let reg_field = match reg_source {
        Some(src) => reg_field_value(insn, src)?,
        None => 0,
    };

    let ea: Option<Ea> = match ea_idx {
        Some(i) => {
            let op = insn.operands.get(i).ok_or(EncodeError::OperandClassViolation)?;
            Some(ea::resolve(op, insn.bits, reg_field, &mut staging).map_err(|_| EncodeError::OperandClassViolation)?)
        }
        None => {
            if let Some(RegSource::Operand(i)) = reg_source {
                // A pure-register reg-field operand with no EA slot at all (rare, but the reg
                // operand can still be extended and need REX.R).
                if let Some(reg) = insn.operands.get(i).and_then(Operand::register) {
                    if reg.is_extended() {
                        staging.rex |= REX_R;
                    }
                }
            }
            None
        }
    };

    if let Some(opnum) = staged.plus_reg_opnum {
        let reg = insn.operands.get(opnum).and_then(Operand::register).ok_or(EncodeError::OperandClassViolation)?;
        if reg.is_extended() {
            staging.rex |= REX_B;
        }
    }

    if staged.no_high_byte || staging.rex != 0 || staged.force_rexw {
        if insn.operands.iter().any(|o| o.register().map(Register::is_high_byte).unwrap_or(false)) {
            return Err(EncodeError::OperandClassViolation);
        }
    }
    if insn
        .operands
        .iter()
        .any(|o| matches!(o.register(), Some(Register::SPL | Register::BPL | Register::SIL | Register::DIL)))
    {
        staging.rex |= 0; // forces REX below via the needs_rex_no_ext check
    }
    let needs_rex_no_ext = insn
        .operands
        .iter()
        .any(|o| matches!(o.register(), Some(Register::SPL | Register::BPL | Register::SIL | Register::DIL)));

    let mut op_size = resolved_operand_size(insn, template);
    if staged.opsize_ctl == Some(OpSizeCtl::ForceDword) {
        op_size = 32;
    }
    let default_size = if insn.bits == 16 { 16 } else { 32 };
    let need_66 = !is_vex_evex
        && staged.opsize_ctl != Some(OpSizeCtl::Forbid66)
        && matches!(op_size, 16 | 32)
        && op_size != default_size;
    let force_rexw = staged.force_rexw || (op_size == 64 && staged.opsize_ctl != Some(OpSizeCtl::NoRexW));
    if !is_vex_evex && force_rexw {
        staging.rex |= REX_W;
    }
    let need_67 = insn.address_size != insn.bits;
    let rex_needed = !is_vex_evex && (staging.rex != 0 || needs_rex_no_ext);

    let mut writer = Writer { sink, segment, base_offset: offset, pos: 0 };

    if insn.wait_prefix {
        writer.raw(&[0x9B]);
    }
    if insn.lock {
        writer.raw(&[0xF0]);
    }
    let rep_byte = staged
        .rep_extension
        .or_else(|| match staged.force_rep {
            Some(true) => Some(0xF3),
            Some(false) => None,
            None => match insn.rep {
                Some(RepKind::Rep) | Some(RepKind::Repe) | Some(RepKind::Xrelease) => Some(0xF3),
                Some(RepKind::Repne) | Some(RepKind::Xacquire) | Some(RepKind::Bnd) => Some(0xF2),
                Some(RepKind::Nobnd) | None => None,
            },
        });
    if let Some(b) = rep_byte {
        writer.raw(&[b]);
    }
    if let Some(seg) = insn.segment_override {
        let b = segment_override_byte(seg);
        if b != 0 {
            writer.raw(&[b]);
        }
    }
    if need_66 {
        writer.raw(&[0x66]);
    }
    if need_67 {
        writer.raw(&[0x67]);
    }

    if is_vex_evex {
        let vvvv = vvvv_value(insn, vvvv_idx);
        let bytes = if let Some((cm, wlp, tuple)) = staged.evex {
            vex_evex_prefix(insn, &staging, cm, wlp, Some(tuple), vvvv)
        } else if let Some((cm, wlp)) = staged.vex {
            vex_evex_prefix(insn, &staging, cm, wlp, None, vvvv)
        } else {
            return Err(EncodeError::BytecodeCorrupt);
        };
        writer.raw(&bytes);
    } else if rex_needed {
        writer.raw(&[0x40 | (staging.rex & 0xF)]);
    }

    let mut pos = 0usize;
    let mut bias: i64 = 0;
    loop {
        let (op, next) = bytecode::decode(template.bytecode, pos).ok_or(EncodeError::BytecodeCorrupt)?;
        pos = next;
        let opnum = |n: usize| -> usize { (n as i64 + bias) as usize };
        let mut consumed_bias = true;
        match op {
            Op::End => break,
            Op::Bias { a, b } => {
                bias += if a { 4 } else { 0 } + if b { 4 } else { 0 };
                consumed_bias = false;
            }
            Op::Literal(bytes) => writer.raw(&bytes),
            Op::LiteralPlusReg { opnum: n, base } => {
                let reg = insn
                    .operands
                    .get(opnum(n))
                    .and_then(Operand::register)
                    .ok_or(EncodeError::OperandClassViolation)?;
                writer.raw(&[base | (reg.low_bits() & 0x7)]);
            }
            Op::MibIndex { .. } => {}
            Op::Imm8 { opnum: n, .. } => {
                let v = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                writer.raw(&truncate_le(v, 1));
            }
            Op::Imm16 { opnum: n } => {
                let v = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                writer.raw(&truncate_le(v, 2));
            }
            Op::ImmAuto { opnum: n } => {
                let v = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                let size = if op_size == 16 { 2 } else { 4 };
                writer.raw(&truncate_le(v, size));
            }
            Op::Imm32 { opnum: n } | Op::Imm32Sx64 { opnum: n } => {
                let v = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                writer.raw(&truncate_le(v, 4));
            }
            Op::ImmAddrSize { opnum: n } => {
                let v = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                writer.raw(&truncate_le(v, insn.address_size / 8));
            }
            Op::Imm64 { opnum: n } => {
                let v = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                writer.raw(&truncate_le(v, 8));
            }
            Op::ImmSx { opnum: n } => {
                let v = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                writer.raw(&truncate_le(v, 1));
            }
            Op::Rel8 { opnum: n } => {
                let target = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                let disp = target - (writer.here() + 1);
                if staged.is_short_jump && !(-128..=127).contains(&disp) {
                    return Err(EncodeError::ShortJumpOutOfRange);
                }
                writer.rel(target, 1, None);
            }
            Op::RelAuto { opnum: n } => {
                let target = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                let size = if op_size == 16 { 2 } else { 4 };
                writer.rel(target, size, None);
            }
            Op::Rel32 { opnum: n } => {
                let target = insn.operands.get(opnum(n)).map(|o| o.offset).ok_or(EncodeError::OperandClassViolation)?;
                writer.rel(target, 4, None);
            }
            Op::Seg16 { opnum: n } => {
                let seg = insn.operands.get(opnum(n)).and_then(|o| o.segment).unwrap_or(0);
                writer.seg16(seg);
            }
            Op::ModRm { .. } => {
                let ea = ea.as_ref().ok_or(EncodeError::BytecodeCorrupt)?;
                writer.raw(&[ea.modrm]);
                if ea.sib_present {
                    writer.raw(&[ea.sib]);
                }
                if ea.rip_relative && ea.rip_literal {
                    writer.raw(&truncate_le(ea.disp, ea.disp_bytes));
                } else if ea.rip_relative {
                    writer.rel(ea.disp, ea.disp_bytes, rip_base);
                } else if let Some(d8) = ea.disp8_compressed {
                    writer.raw(&truncate_le(d8 as i64, 1));
                } else if ea.disp_bytes > 0 {
                    writer.raw(&truncate_le(ea.disp, ea.disp_bytes));
                }
            }
            Op::Is4 { opnum: n, imm_opnum } => {
                let reg = insn.operands.get(opnum(n)).and_then(Operand::register).ok_or(EncodeError::OperandClassViolation)?;
                let upper = reg.low_bits() | ((reg.is_extended() as u8) << 3);
                let lower = match imm_opnum {
                    Some(i) => insn.operands.get(i).map(|o| o.offset as u8 & 0xF).unwrap_or(0),
                    None => 0,
                };
                writer.raw(&[(upper << 4) | lower]);
            }
            Op::Hle(_) | Op::DisasmOnly | Op::AddrSize(_) | Op::OpSize(_) | Op::ForceRexW | Op::NoHighByte
            | Op::Vex { .. } | Op::Evex { .. } | Op::RepExtension(_) | Op::LockAsRexR | Op::ForceRep(_)
            | Op::WaitPrefix | Op::ShortJump { .. } => {}
            Op::SseQuirk(n) => match n {
                1 => writer.raw(&[0x66]),
                2 => writer.raw(&[0xF2]),
                3 => writer.raw(&[0xF3]),
                _ => {}
            },
            Op::Resb => {
                let count = insn.operands.first().map(|o| o.offset).unwrap_or(0);
                writer.reserve(count);
            }
            Op::OverJumpLength => {
                writer.raw(&[if insn.bits == 16 { 3 } else { 5 }]);
            }
            Op::VsibWidth { width, .. } => {
                if let Some(ea) = &ea {
                    let ok = matches!(
                        (width, ea.kind),
                        (bytecode::VsibWidth::Xmm, crate::ea::EaKind::XmmVsib)
                            | (bytecode::VsibWidth::Ymm, crate::ea::EaKind::YmmVsib)
                            | (bytecode::VsibWidth::Zmm, crate::ea::EaKind::ZmmVsib)
                    );
                    if !ok {
                        return Err(EncodeError::OperandClassViolation);
                    }
                }
            }
        }
        if consumed_bias {
            bias = 0;
        }
    }

    let _ = AddrSizeCtl::Force16; // silence unused-import warnings on targets that don't hit AddrSize
    Ok(writer.pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Operand;
    use objfmt::SizeCounter;
    use xasm_isa::table::templates_for;
    use xasm_isa::{Opcode, Register};

    fn reg_operand(flags: OperandFlags, reg: Register) -> Operand {
        let mut op = Operand::new();
        op.flags = flags;
        op.base = Some(reg);
        op
    }

    fn imm_operand(flags: OperandFlags, value: i64) -> Operand {
        let mut op = Operand::new();
        op.flags = flags;
        op.offset = value;
        op
    }

    fn gencode(insn: &Instruction, template: &Template) -> Vec<u8> {
        let mut writer = objfmt::FlatWriter::new(insn.bits);
        let size = encode(insn, template, 0, 0, &mut writer).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len() as i64, size);
        bytes
    }

    fn calcsize(insn: &Instruction, template: &Template) -> i64 {
        let mut counter = SizeCounter::default();
        encode(insn, template, 0, 0, &mut counter).unwrap();
        counter.total
    }

    #[test]
    fn mov_r32_imm32_matches_calcsize_and_gencode() {
        let template = &templates_for(Opcode::MOV)[4];
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::MOV;
        insn.operands = vec![
            reg_operand(OperandFlags::REGISTER | OperandFlags::BITS32, Register::ECX),
            imm_operand(OperandFlags::IMMEDIATE | OperandFlags::BITS32, 0x11223344),
        ];
        let bytes = gencode(&insn, template);
        assert_eq!(bytes, vec![0xB9, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(calcsize(&insn, template), 5);
    }

    #[test]
    fn mov_r64_imm64_forces_rex_w() {
        let template = &templates_for(Opcode::MOV)[6];
        let mut insn = Instruction::new(64);
        insn.opcode = Opcode::MOV;
        insn.operands = vec![
            reg_operand(OperandFlags::REGISTER | OperandFlags::BITS64, Register::R8),
            imm_operand(OperandFlags::IMMEDIATE | OperandFlags::BITS64, 1),
        ];
        let bytes = gencode(&insn, template);
        assert_eq!(&bytes[..2], &[0x49, 0xB8]);
        assert_eq!(bytes.len(), 10);
    }

    #[test]
    fn add_r32_rm32_emits_modrm_register_form() {
        let template = &templates_for(Opcode::ADD)[3];
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::ADD;
        insn.operands = vec![
            reg_operand(OperandFlags::REGISTER | OperandFlags::BITS32, Register::EAX),
            reg_operand(OperandFlags::REGMEM | OperandFlags::BITS32, Register::EBX),
        ];
        let bytes = gencode(&insn, template);
        assert_eq!(bytes, vec![0x03, 0xC3]);
    }

    #[test]
    fn inc_rm32_memory_uses_digit_extension() {
        let template = &templates_for(Opcode::INC)[0];
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::INC;
        let mut mem = Operand::new();
        mem.flags = OperandFlags::REGMEM | OperandFlags::BITS32;
        mem.base = Some(Register::EBX);
        insn.operands = vec![mem];
        let bytes = gencode(&insn, template);
        assert_eq!(bytes, vec![0xFF, 0x03]);
    }

    #[test]
    fn lea_emits_modrm_with_register_destination() {
        let template = &templates_for(Opcode::LEA)[0];
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::LEA;
        let mut mem = Operand::new();
        mem.flags = OperandFlags::MEMORY;
        mem.base = Some(Register::EBX);
        mem.offset = 4;
        insn.operands = vec![reg_operand(OperandFlags::REGISTER | OperandFlags::BITS32, Register::EAX), mem];
        let bytes = gencode(&insn, template);
        assert_eq!(bytes, vec![0x8D, 0x43, 0x04]);
    }

    #[test]
    fn short_jcc_computes_positive_rel8() {
        let template = &templates_for(Opcode::JCC)[0];
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::JCC;
        insn.condition = Some(xasm_isa::Condition::Z);
        insn.operands = vec![imm_operand(OperandFlags::IMMEDIATE, 10)];
        let mut writer = objfmt::FlatWriter::new(32);
        encode(&insn, template, 0, 0, &mut writer).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0x70 ^ xasm_isa::Condition::Z.cc());
        assert_eq!(bytes[1] as i8, 8);
    }

    #[test]
    fn short_jcc_out_of_range_is_rejected() {
        let template = &templates_for(Opcode::JCC)[0];
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::JCC;
        insn.condition = Some(xasm_isa::Condition::Z);
        insn.operands = vec![imm_operand(OperandFlags::IMMEDIATE, 1000)];
        let mut writer = objfmt::FlatWriter::new(32);
        assert_eq!(encode(&insn, template, 0, 0, &mut writer), Err(EncodeError::ShortJumpOutOfRange));
    }

    #[test]
    fn near_jcc_emits_two_opcode_bytes_and_rel32() {
        let template = &templates_for(Opcode::JCC)[1];
        let mut insn = Instruction::new(32);
        insn.opcode = Opcode::JCC;
        insn.condition = Some(xasm_isa::Condition::NZ);
        insn.operands = vec![imm_operand(OperandFlags::IMMEDIATE | OperandFlags::NEAR, 6)];
        let bytes = gencode(&insn, template);
        assert_eq!(&bytes[..2], &[0x0F, 0x80 ^ xasm_isa::Condition::NZ.cc()]);
        assert_eq!(bytes.len(), 6);
    }

    #[test]
    fn extended_register_sets_rex_b() {
        let template = &templates_for(Opcode::ADD)[3];
        let mut insn = Instruction::new(64);
        insn.opcode = Opcode::ADD;
        insn.operands = vec![
            reg_operand(OperandFlags::REGISTER | OperandFlags::BITS64, Register::RAX),
            reg_operand(OperandFlags::REGMEM | OperandFlags::BITS64, Register::R9),
        ];
        let bytes = gencode(&insn, template);
        // REX.W (8) | REX.B (1) = 0x49
        assert_eq!(&bytes[..1], &[0x49]);
    }

    #[test]
    fn calcsize_and_gencode_agree_on_length_for_every_representative_template() {
        for opcode in [Opcode::MOV, Opcode::ADD, Opcode::XCHG, Opcode::LOCK_XADD, Opcode::INC, Opcode::LEA] {
            for template in templates_for(opcode) {
                let mut insn = Instruction::new(32);
                insn.opcode = opcode;
                insn.operands = template
                    .operands
                    .iter()
                    .map(|ot| {
                        if ot.flags.contains(OperandFlags::REGISTER) {
                            reg_operand(ot.flags, Register::EAX)
                        } else if ot.flags.contains(OperandFlags::IMMEDIATE) {
                            imm_operand(ot.flags, 1)
                        } else {
                            let mut mem = Operand::new();
                            mem.flags = ot.flags;
                            mem.base = Some(Register::EBX);
                            mem
                        }
                    })
                    .collect();
                if let Ok(size) = calcsize(&insn, template).try_into() {
                    let _: i64 = size;
                    let bytes = gencode(&insn, template);
                    assert_eq!(bytes.len() as i64, calcsize(&insn, template));
                }
            }
        }
    }
}
