//! Effective-address resolution (§4.5): operand + mode + reg-field + REX/EVEX staging goes in,
//! a ModRM/SIB/displacement record comes out.

use crate::error::EaError;
use crate::instruction::RexVexStaging;
use crate::operand::{EaFlags, Operand};
use xasm_isa::{Register, RegisterClass};

/// Which flavor of memory operand this resolved to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EaKind {
    /// A register operand (`mod=3`), not really "effective address" but matched here too.
    Register,
    Scalar,
    XmmVsib,
    YmmVsib,
    ZmmVsib,
}

#[derive(Clone, Copy, Debug)]
pub struct Ea {
    pub kind: EaKind,
    pub sib_present: bool,
    pub disp_bytes: u8,
    pub modrm: u8,
    pub sib: u8,
    /// REX bits this EA contributes: bit0 = B, bit1 = X, bit2 = R.
    pub rex: u8,
    pub rip_relative: bool,
    /// `true` for a literal `[rip+disp]` operand: `disp` is written verbatim, not computed as
    /// `target - next_insn` the way `[rel symbol]`'s `rip_relative` form is.
    pub rip_literal: bool,
    pub disp8_compressed: Option<i8>,
    pub disp: i64,
}

const REX_B: u8 = 0x1;
const REX_X: u8 = 0x2;
const REX_R: u8 = 0x4;

fn fits_i8(v: i64) -> bool {
    (-128..=127).contains(&v)
}

/// EVEX compressed-disp8 divisor for a given tuple-type staging byte. The full tuple-type table
/// (which depends on the template's vector length and element width) lives in the external
/// instruction database; this crate's representative `table::TEMPLATES` only ever stages a
/// handful of tuple codes, so this maps exactly those rather than the complete AVX-512 set.
fn tuple_bytes(evex_tuple: u8) -> Option<i64> {
    match evex_tuple {
        0 => None,
        n => Some(n as i64),
    }
}

/// Resolve a single operand that is a register or a `[...]` memory reference into a ModRM/SIB
/// record. `reg_field` is the opcode-extension or other-operand register number (0..=15, REX.R
/// taken from bit 3); `staging` accumulates REX/EVEX contribution for the whole instruction.
pub fn resolve(op: &Operand, bits: u8, reg_field: u8, staging: &mut RexVexStaging) -> Result<Ea, EaError> {
    if op.is_register() {
        return resolve_register(op, reg_field, staging);
    }
    resolve_memory(op, bits, reg_field, staging)
}

fn resolve_register(op: &Operand, reg_field: u8, staging: &mut RexVexStaging) -> Result<Ea, EaError> {
    if op.decorators.broadcast.is_some() {
        return Err(EaError::BroadcastOnReg);
    }
    let reg = op.base.ok_or(EaError::InvalidRegisterCombination)?;
    let rm = reg.low_bits();
    if reg.is_extended() {
        staging.rex |= REX_B;
    }
    let reg_low = reg_field & 0x7;
    if reg_field & 0x8 != 0 {
        staging.rex |= REX_R;
    }
    Ok(Ea {
        kind: EaKind::Register,
        sib_present: false,
        disp_bytes: 0,
        modrm: (0b11 << 6) | (reg_low << 3) | rm,
        sib: 0,
        rex: if reg.is_extended() { REX_B } else { 0 },
        rip_relative: false,
        rip_literal: false,
        disp8_compressed: None,
        disp: 0,
    })
}

fn resolve_memory(op: &Operand, bits: u8, reg_field: u8, staging: &mut RexVexStaging) -> Result<Ea, EaError> {
    let reg_low = reg_field & 0x7;
    if reg_field & 0x8 != 0 {
        staging.rex |= REX_R;
    }

    // Pure offset: no base, no index.
    if op.base.is_none() && op.index.is_none() {
        if op.eaflags.contains(EaFlags::REL) && bits == 64 {
            if op.eaflags.contains(EaFlags::MIB) {
                return Err(EaError::RipRelativeWithMib);
            }
            return Ok(Ea {
                kind: EaKind::Scalar,
                sib_present: false,
                disp_bytes: 4,
                modrm: (0b00 << 6) | (reg_low << 3) | 0b101,
                sib: 0,
                rex: 0,
                rip_relative: true,
                rip_literal: op.eaflags.contains(EaFlags::RIP_LITERAL),
                disp8_compressed: None,
                disp: op.offset,
            });
        }
        // moffs / absolute disp32 form: mod=0, rm=101 (disp32 follows, no base in 32-bit mode;
        // in 64-bit mode this form needs a SIB with no base/index, rm=100, base=101).
        if bits == 64 {
            return Ok(Ea {
                kind: EaKind::Scalar,
                sib_present: true,
                disp_bytes: 4,
                modrm: (0b00 << 6) | (reg_low << 3) | 0b100,
                sib: (0b00 << 6) | (0b100 << 3) | 0b101,
                rex: 0,
                rip_relative: false,
                rip_literal: false,
                disp8_compressed: None,
                disp: op.offset,
            });
        }
        return Ok(Ea {
            kind: EaKind::Scalar,
            sib_present: false,
            disp_bytes: 4,
            modrm: (0b00 << 6) | (reg_low << 3) | 0b101,
            sib: 0,
            rex: 0,
            rip_relative: false,
            rip_literal: false,
            disp8_compressed: None,
            disp: op.offset,
        });
    }

    if let Some(index) = op.index {
        if matches!(index.class(), RegisterClass::Xmm | RegisterClass::Ymm | RegisterClass::Zmm) {
            return resolve_vsib(op, index, reg_low, staging);
        }
    }

    if bits == 16 {
        resolve_16bit(op, reg_low)
    } else {
        resolve_32_64bit(op, bits, reg_low, staging)
    }
}

fn resolve_vsib(op: &Operand, index: Register, reg_low: u8, staging: &mut RexVexStaging) -> Result<Ea, EaError> {
    let base = op.base;
    if let Some(b) = base {
        if !matches!(b.class(), RegisterClass::Gpr32 | RegisterClass::Gpr64) {
            return Err(EaError::InvalidRegisterCombination);
        }
        if b.is_extended() {
            staging.rex |= REX_B;
        }
    }
    let scale = if op.scale == 0 { 1 } else { op.scale };
    if !matches!(scale, 1 | 2 | 4 | 8) {
        return Err(EaError::BadScale);
    }
    if index.is_extended() {
        staging.rex |= REX_X;
    }
    let scale_bits = match scale {
        1 => 0b00,
        2 => 0b01,
        4 => 0b10,
        8 => 0b11,
        _ => unreachable!(),
    };
    let base_low = base.map(|b| b.low_bits()).unwrap_or(0b101);
    let sib = (scale_bits << 6) | (index.low_bits() << 3) | base_low;
    let (disp_bytes, modrm_mod, disp8) = select_mod(op, base);
    let kind = match index.class() {
        RegisterClass::Xmm => EaKind::XmmVsib,
        RegisterClass::Ymm => EaKind::YmmVsib,
        RegisterClass::Zmm => EaKind::ZmmVsib,
        _ => unreachable!(),
    };
    Ok(Ea {
        kind,
        sib_present: true,
        disp_bytes,
        modrm: (modrm_mod << 6) | (reg_low << 3) | 0b100,
        sib,
        rex: 0,
        rip_relative: false,
        rip_literal: false,
        disp8_compressed: disp8,
        disp: op.offset,
    })
}

/// `mod` field selection shared by the SIB and no-SIB 32/64-bit paths (§4.5).
fn select_mod(op: &Operand, base: Option<Register>) -> (u8, u8, Option<i8>) {
    let base_needs_disp = matches!(base, Some(r) if r.is_ebp_or_rbp() || r.low_bits() == 5 && r.is_extended());
    if op.offset == 0 && !op.unknown && !base_needs_disp && base.is_some() {
        return (0, 0b00, None);
    }
    if base.is_none() {
        // No base at all (pure vector-SIB or disp32-only SIB form): always a 4-byte displacement.
        return (4, 0b00, None);
    }
    if fits_i8(op.offset) {
        return (1, 0b01, Some(op.offset as i8));
    }
    (4, 0b10, None)
}

fn resolve_32_64bit(op: &Operand, _bits: u8, reg_low: u8, staging: &mut RexVexStaging) -> Result<Ea, EaError> {
    let mut base = op.base;
    let mut index = op.index;
    let mut scale = if op.scale == 0 { 1 } else { op.scale };

    if let (Some(b), Some(i)) = (base, index) {
        if b.class() != i.class() {
            return Err(EaError::IncompatibleSize);
        }
    }
    for r in [base, index].into_iter().flatten() {
        if !matches!(r.class(), RegisterClass::Gpr32 | RegisterClass::Gpr64) {
            return Err(EaError::InvalidRegisterCombination);
        }
    }

    // `reg*3/5/9` is really `reg + reg*{2,4,8}`: only possible when there is no separate base.
    if base.is_none() && matches!(scale, 3 | 5 | 9) && !op.eaflags.contains(EaFlags::NOSPLIT) {
        base = index;
        scale -= 1;
    }
    if !matches!(scale, 1 | 2 | 4 | 8) {
        return Err(EaError::BadScale);
    }

    // ESP/RSP can only be the base, never the index; swap if the parser put it in `index`.
    if let Some(i) = index {
        if i.is_esp_or_rsp() {
            if base.is_none() {
                base = index;
                index = None;
            } else {
                return Err(EaError::InvalidRegisterCombination);
            }
        }
    }

    if let Some(b) = base {
        if b.is_extended() {
            staging.rex |= REX_B;
        }
    }
    if let Some(i) = index {
        if i.is_extended() {
            staging.rex |= REX_X;
        }
    }

    let needs_sib = index.is_some() || matches!(base, Some(b) if b.is_esp_or_rsp()) || (base.is_none() && index.is_none());

    if !needs_sib {
        let b = base.unwrap();
        let (disp_bytes, modrm_mod, disp8) = select_mod(op, base);
        return Ok(Ea {
            kind: EaKind::Scalar,
            sib_present: false,
            disp_bytes,
            modrm: (modrm_mod << 6) | (reg_low << 3) | b.low_bits(),
            sib: 0,
            rex: 0,
            rip_relative: false,
            rip_literal: false,
            disp8_compressed: disp8,
            disp: op.offset,
        });
    }

    let scale_bits = match scale {
        1 => 0b00,
        2 => 0b01,
        4 => 0b10,
        8 => 0b11,
        _ => unreachable!(),
    };
    let index_low = index.map(|i| i.low_bits()).unwrap_or(0b100);
    let base_low = base.map(|b| b.low_bits()).unwrap_or(0b101);
    let sib = (scale_bits << 6) | (index_low << 3) | base_low;
    let (disp_bytes, modrm_mod, disp8) = select_mod(op, base);
    Ok(Ea {
        kind: EaKind::Scalar,
        sib_present: true,
        disp_bytes,
        modrm: (modrm_mod << 6) | (reg_low << 3) | 0b100,
        sib,
        rex: 0,
        rip_relative: false,
        rip_literal: false,
        disp8_compressed: disp8,
        disp: op.offset,
    })
}

/// 16-bit `[BX+SI]`-family addressing: only eight base/index combinations are legal, and they
/// map onto `modrm.rm` through a fixed lookup table rather than a general SIB byte.
fn resolve_16bit(op: &Operand, reg_low: u8) -> Result<Ea, EaError> {
    use Register::*;
    let rm = match (op.base, op.index) {
        (Some(BX), Some(SI)) | (Some(SI), Some(BX)) => 0,
        (Some(BX), Some(DI)) | (Some(DI), Some(BX)) => 1,
        (Some(BP), Some(SI)) | (Some(SI), Some(BP)) => 2,
        (Some(BP), Some(DI)) | (Some(DI), Some(BP)) => 3,
        (Some(SI), None) => 4,
        (Some(DI), None) => 5,
        (Some(BP), None) => 6,
        (Some(BX), None) => 7,
        (None, None) => {
            return Ok(Ea {
                kind: EaKind::Scalar,
                sib_present: false,
                disp_bytes: 2,
                modrm: (0b00 << 6) | (reg_low << 3) | 0b110,
                sib: 0,
                rex: 0,
                rip_relative: false,
                rip_literal: false,
                disp8_compressed: None,
                disp: op.offset,
            })
        }
        _ => return Err(EaError::Bad16BitAddressing),
    };
    let is_bp_only = matches!(op.base, Some(BP)) && op.index.is_none();
    let (disp_bytes, modrm_mod) = if op.offset == 0 && !op.unknown && !is_bp_only {
        (0, 0b00)
    } else if fits_i8(op.offset) {
        (1, 0b01)
    } else {
        (2, 0b10)
    };
    Ok(Ea {
        kind: EaKind::Scalar,
        sib_present: false,
        disp_bytes,
        modrm: (modrm_mod << 6) | (reg_low << 3) | rm,
        sib: 0,
        rex: 0,
        rip_relative: false,
        rip_literal: false,
        disp8_compressed: None,
        disp: op.offset,
    })
}

/// EVEX compressed-disp8: only legal when the division by the tuple's byte width is exact and
/// the quotient fits a signed byte; otherwise the caller must fall back to a 4-byte displacement.
pub fn compress_evex_disp8(offset: i64, evex_tuple: u8) -> Option<i8> {
    let width = tuple_bytes(evex_tuple)?;
    if width == 0 || offset % width != 0 {
        return None;
    }
    let q = offset / width;
    if fits_i8(q) {
        Some(q as i8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Operand;

    fn base_index(base: Option<Register>, index: Option<Register>, scale: u8, offset: i64) -> Operand {
        let mut op = Operand::new();
        op.base = base;
        op.index = index;
        op.scale = scale;
        op.offset = offset;
        op
    }

    #[test]
    fn register_operand_sets_mod_three() {
        let mut op = Operand::new();
        op.flags = xasm_isa::OperandFlags::REGISTER;
        op.base = Some(Register::EAX);
        let mut staging = RexVexStaging::default();
        let ea = resolve(&op, 32, 0, &mut staging).unwrap();
        assert_eq!(ea.modrm >> 6, 0b11);
    }

    #[test]
    fn esp_base_forces_sib_byte() {
        let op = base_index(Some(Register::ESP), None, 1, 0);
        let mut staging = RexVexStaging::default();
        let ea = resolve(&op, 32, 0, &mut staging).unwrap();
        assert!(ea.sib_present);
        assert_eq!(ea.modrm & 0x7, 0b100);
    }

    #[test]
    fn ebp_base_with_zero_offset_forces_disp8() {
        let op = base_index(Some(Register::EBP), None, 1, 0);
        let mut staging = RexVexStaging::default();
        let ea = resolve(&op, 32, 0, &mut staging).unwrap();
        assert_eq!(ea.disp_bytes, 1);
    }

    #[test]
    fn mismatched_base_index_size_is_an_error() {
        let op = base_index(Some(Register::EAX), Some(Register::RBX), 1, 0);
        let mut staging = RexVexStaging::default();
        assert_eq!(resolve(&op, 64, 0, &mut staging), Err(EaError::IncompatibleSize));
    }

    #[test]
    fn sixteen_bit_bx_si_selects_rm_zero() {
        let op = base_index(Some(Register::BX), Some(Register::SI), 1, 0);
        let mut staging = RexVexStaging::default();
        let ea = resolve(&op, 16, 0, &mut staging).unwrap();
        assert_eq!(ea.modrm & 0x7, 0);
    }

    #[test]
    fn bp_alone_at_zero_offset_still_needs_disp8() {
        let op = base_index(Some(Register::BP), None, 1, 0);
        let mut staging = RexVexStaging::default();
        let ea = resolve(&op, 16, 0, &mut staging).unwrap();
        assert_eq!(ea.disp_bytes, 1);
    }

    #[test]
    fn reg_scale_three_rewrites_to_base_plus_scaled_index() {
        let op = base_index(None, Some(Register::RAX), 3, 0);
        let mut staging = RexVexStaging::default();
        let ea = resolve(&op, 64, 0, &mut staging).unwrap();
        assert!(ea.sib_present);
        assert_eq!(ea.sib >> 6, 0b01); // scale 2
    }

    #[test]
    fn vector_sib_requires_legal_scale() {
        let op = base_index(None, Some(Register::XMM1), 3, 0);
        let mut staging = RexVexStaging::default();
        assert_eq!(resolve(&op, 64, 0, &mut staging), Err(EaError::BadScale));
    }

    #[test]
    fn compressed_disp8_falls_back_when_not_exact() {
        assert_eq!(compress_evex_disp8(3, 4), None);
        assert_eq!(compress_evex_disp8(8, 4), Some(2));
    }
}
