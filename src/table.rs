//! A small, hand-written, representative slice of the x86 instruction template database.
//!
//! Real assemblers generate this table from a machine-readable opcode specification (out of
//! scope here, see the crate docs); this module plays that generator's role for a handful of
//! mnemonics, enough to exercise every stage of the matcher and encoder, not the whole ISA.

use crate::cpu::CpuLevel;
use crate::flags::{DecoratorMask, OperandFlags, TemplateFlags};
use crate::opcode::Opcode;
use crate::template::{OperandTemplate, Template};
use once_cell::sync::Lazy;
use std::collections::HashMap;

type OF = OperandFlags;
type TF = TemplateFlags;

fn ot(flags: OF) -> OperandTemplate {
    OperandTemplate::new(flags)
}

fn ot_deco(flags: OF, deco: DecoratorMask) -> OperandTemplate {
    OperandTemplate::with_decorators(flags, deco)
}

/// The eight ModRM-group-1 arithmetic mnemonics share one encoding shape, varying only in the
/// `/digit` extension and the `00h`-aligned opcode base; generate their templates instead of
/// transcribing the same seven lines eight times.
fn arith_group(opcode: Opcode, digit: u8, base: u8, leak: &mut Vec<Template>) {
    // r/m8, r8  (MR)
    leak.push(Template {
        opcode,
        operands: leak_ops(&[ot(OF::REGMEM | OF::BITS8), ot(OF::REGISTER | OF::BITS8)]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, base, 0o100 | 1, 0o0]),
    });
    // r/m, r  (MR), 16/32/64
    leak.push(Template {
        opcode,
        operands: leak_ops(&[
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, base + 1, 0o100 | 1, 0o0]),
    });
    // r8, r/m8  (RM)
    leak.push(Template {
        opcode,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS8), ot(OF::REGMEM | OF::BITS8)]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, base + 2, 0o100, 0o0]),
    });
    // r, r/m  (RM), 16/32/64
    leak.push(Template {
        opcode,
        operands: leak_ops(&[
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, base + 3, 0o100, 0o0]),
    });
    // r/m8, imm8  (MI)
    leak.push(Template {
        opcode,
        operands: leak_ops(&[ot(OF::REGMEM | OF::BITS8), ot(OF::IMMEDIATE | OF::BITS8)]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x80, 0o100 | digit, 0o20, 0o0]),
    });
    // r/m, imm32  (MI), sign extended to operand size by the interpreter
    leak.push(Template {
        opcode,
        operands: leak_ops(&[
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::IMMEDIATE | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x81, 0o100 | digit, 0o34, 0o0]),
    });
    // r/m, imm8 sign-extended  (MI)
    leak.push(Template {
        opcode,
        operands: leak_ops(&[
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::IMMEDIATE | OF::BITS8),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x83, 0o100 | digit, 0o274, 0o0]),
    });
}

fn leak_ops(ops: &[OperandTemplate]) -> &'static [OperandTemplate] {
    Box::leak(ops.to_vec().into_boxed_slice())
}

fn leak_bytes(bytes: &[u8]) -> &'static [u8] {
    Box::leak(bytes.to_vec().into_boxed_slice())
}

fn build_table() -> HashMap<Opcode, Vec<Template>> {
    let mut all = Vec::new();

    // --- data movement -----------------------------------------------------------------
    all.push(Template {
        opcode: Opcode::MOV,
        operands: leak_ops(&[ot(OF::REGMEM | OF::BITS8), ot(OF::REGISTER | OF::BITS8)]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x88, 0o100 | 1, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::MOV,
        operands: leak_ops(&[
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x89, 0o100 | 1, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::MOV,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS8), ot(OF::REGMEM | OF::BITS8)]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x8A, 0o100, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::MOV,
        operands: leak_ops(&[
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x8B, 0o100, 0o0]),
    });
    all.push(Template {
        // mov r32, imm32
        opcode: Opcode::MOV,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS32), ot(OF::IMMEDIATE | OF::BITS32)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o10, 0xB8, 0o40, 0o0]),
    });
    all.push(Template {
        // mov r16, imm16
        opcode: Opcode::MOV,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS16), ot(OF::IMMEDIATE | OF::BITS16)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o10, 0xB8, 0o30, 0o0]),
    });
    all.push(Template {
        // mov r64, imm64
        opcode: Opcode::MOV,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS64), ot(OF::IMMEDIATE | OF::BITS64)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o324, 0o10, 0xB8, 0o54, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::LEA,
        operands: leak_ops(&[
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::MEMORY),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o1, 0x8D, 0o100, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::PUSH,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS16 | OF::BITS64)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o10, 0x50, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::POP,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS16 | OF::BITS64)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o10, 0x58, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::XCHG,
        operands: leak_ops(&[
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM | TF::LOCK,
        bytecode: leak_bytes(&[0o1, 0x87, 0o100 | 1, 0o0]),
    });

    all.push(Template {
        opcode: Opcode::LOCK_XADD,
        operands: leak_ops(&[ot(OF::REGMEM | OF::BITS8), ot(OF::REGISTER | OF::BITS8)]),
        cpu: CpuLevel::Level486,
        flags: TF::SM | TF::LOCK,
        bytecode: leak_bytes(&[0o2, 0x0F, 0xC0, 0o100 | 1, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::LOCK_XADD,
        operands: leak_ops(&[
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Level486,
        flags: TF::SM | TF::LOCK,
        bytecode: leak_bytes(&[0o2, 0x0F, 0xC1, 0o100 | 1, 0o0]),
    });

    // --- arithmetic / logic group ------------------------------------------------------
    arith_group(Opcode::ADD, 0, 0x00, &mut all);
    arith_group(Opcode::OR, 1, 0x08, &mut all);
    arith_group(Opcode::ADC, 2, 0x10, &mut all);
    arith_group(Opcode::SBB, 3, 0x18, &mut all);
    arith_group(Opcode::AND, 4, 0x20, &mut all);
    arith_group(Opcode::SUB, 5, 0x28, &mut all);
    arith_group(Opcode::XOR, 6, 0x30, &mut all);
    arith_group(Opcode::CMP, 7, 0x38, &mut all);

    all.push(Template {
        opcode: Opcode::TEST,
        operands: leak_ops(&[ot(OF::REGMEM | OF::BITS8), ot(OF::REGISTER | OF::BITS8)]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x84, 0o100 | 1, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::TEST,
        operands: leak_ops(&[
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0x85, 0o100 | 1, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::TEST,
        operands: leak_ops(&[
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::IMMEDIATE | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o1, 0xF7, 0o100 | 0, 0o34, 0o0]),
    });

    for (opcode, digit) in [(Opcode::INC, 0u8), (Opcode::DEC, 1u8)] {
        all.push(Template {
            opcode,
            operands: leak_ops(&[ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64)]),
            cpu: CpuLevel::Any8086,
            flags: TF::empty(),
            bytecode: leak_bytes(&[0o1, 0xFF, 0o100 | digit, 0o0]),
        });
    }
    for (opcode, digit) in [(Opcode::NEG, 3u8), (Opcode::NOT, 2u8), (Opcode::MUL, 4u8), (Opcode::DIV, 6u8), (Opcode::IDIV, 7u8)] {
        all.push(Template {
            opcode,
            operands: leak_ops(&[ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64)]),
            cpu: CpuLevel::Any8086,
            flags: TF::empty(),
            bytecode: leak_bytes(&[0o1, 0xF7, 0o100 | digit, 0o0]),
        });
    }
    all.push(Template {
        opcode: Opcode::IMUL,
        operands: leak_ops(&[
            ot(OF::REGISTER | OF::BITS16 | OF::BITS32 | OF::BITS64),
            ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
        ]),
        cpu: CpuLevel::Any8086,
        flags: TF::SM,
        bytecode: leak_bytes(&[0o2, 0x0F, 0xAF, 0o100, 0o0]),
    });
    for (opcode, digit) in [(Opcode::SHL, 4u8), (Opcode::SHR, 5u8), (Opcode::SAR, 7u8)] {
        all.push(Template {
            opcode,
            operands: leak_ops(&[
                ot(OF::REGMEM | OF::BITS16 | OF::BITS32 | OF::BITS64),
                ot(OF::IMMEDIATE | OF::BITS8),
            ]),
            cpu: CpuLevel::Any8086,
            flags: TF::empty(),
            bytecode: leak_bytes(&[0o1, 0xC1, 0o100 | digit, 0o20, 0o0]),
        });
    }

    all.push(Template {
        opcode: Opcode::MOVZX,
        operands: leak_ops(&[
            ot(OF::REGISTER | OF::BITS32 | OF::BITS64),
            ot(OF::REGMEM | OF::BITS8),
        ]),
        cpu: CpuLevel::P6,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o2, 0x0F, 0xB6, 0o100, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::MOVSX,
        operands: leak_ops(&[
            ot(OF::REGISTER | OF::BITS32 | OF::BITS64),
            ot(OF::REGMEM | OF::BITS8),
        ]),
        cpu: CpuLevel::P6,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o2, 0x0F, 0xBE, 0o100, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::MOVSXD,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS64), ot(OF::REGMEM | OF::BITS32)]),
        cpu: CpuLevel::Any8086,
        flags: TF::NOLONG,
        bytecode: leak_bytes(&[0o324, 0o1, 0x63, 0o100, 0o0]),
    });

    // --- control flow -------------------------------------------------------------------
    all.push(Template {
        opcode: Opcode::JMP,
        operands: leak_ops(&[ot(OF::IMMEDIATE)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o371, 0xEB, 0o50, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::JMP,
        operands: leak_ops(&[ot(OF::IMMEDIATE | OF::NEAR)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o1, 0xE9, 0o70, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::JCC,
        operands: leak_ops(&[ot(OF::IMMEDIATE)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o370, 0o330, 0x70, 0o50, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::JCC,
        operands: leak_ops(&[ot(OF::IMMEDIATE | OF::NEAR)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o1, 0x0F, 0o330, 0x80, 0o70, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::CALL,
        operands: leak_ops(&[ot(OF::IMMEDIATE | OF::NEAR)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o1, 0xE8, 0o70, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::RET,
        operands: leak_ops(&[]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o1, 0xC3, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::NOP,
        operands: leak_ops(&[]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o1, 0x90, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::INT3,
        operands: leak_ops(&[]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o1, 0xCC, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::INT,
        operands: leak_ops(&[ot(OF::IMMEDIATE | OF::BITS8)]),
        cpu: CpuLevel::Any8086,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o1, 0xCD, 0o20, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::SYSCALL,
        operands: leak_ops(&[]),
        cpu: CpuLevel::Pentium,
        flags: TF::LONG,
        bytecode: leak_bytes(&[0o2, 0x0F, 0x05, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::CPUID,
        operands: leak_ops(&[]),
        cpu: CpuLevel::Pentium,
        flags: TF::empty(),
        bytecode: leak_bytes(&[0o2, 0x0F, 0xA2, 0o0]),
    });

    // --- AVX-512 example, to exercise the EVEX path ------------------------------------
    all.push(Template {
        // vaddps zmm1{k1}{z}, zmm2, zmm3/m512/b32
        opcode: Opcode::VADDPS,
        operands: leak_ops(&[
            ot_deco(
                OF::REGISTER | OF::BITS512,
                DecoratorMask::OPMASK | DecoratorMask::ZEROING,
            ),
            ot(OF::REGISTER | OF::BITS512),
            ot_deco(OF::REGMEM | OF::BITS512, DecoratorMask::BROADCAST | DecoratorMask::STATIC_ROUNDING),
        ]),
        cpu: CpuLevel::Avx512f,
        flags: TF::EVEX,
        bytecode: leak_bytes(&[0o250, 0x01, 0x40, 4, 0o1, 0x58, 0o100, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::VMOVAPS,
        operands: leak_ops(&[ot(OF::REGISTER | OF::BITS512), ot(OF::REGMEM | OF::BITS512)]),
        cpu: CpuLevel::Avx512f,
        flags: TF::EVEX,
        bytecode: leak_bytes(&[0o250, 0x01, 0x40, 4, 0o1, 0x28, 0o100, 0o0]),
    });
    all.push(Template {
        opcode: Opcode::VPBROADCASTD,
        operands: leak_ops(&[
            ot(OF::REGISTER | OF::BITS512),
            ot_deco(OF::REGMEM | OF::BITS32, DecoratorMask::BROADCAST),
        ]),
        cpu: CpuLevel::Avx512f,
        flags: TF::EVEX,
        bytecode: leak_bytes(&[0o250, 0x02, 0x40, 4, 0o1, 0x58, 0o100, 0o0]),
    });

    let mut map: HashMap<Opcode, Vec<Template>> = HashMap::new();
    for template in all {
        map.entry(template.opcode).or_default().push(template);
    }
    map
}

pub static TEMPLATES: Lazy<HashMap<Opcode, Vec<Template>>> = Lazy::new(build_table);

pub fn templates_for(opcode: Opcode) -> &'static [Template] {
    TEMPLATES
        .get(&opcode)
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}
