//! The `xasm` CLI's assembly driver: a single-file, two-pass assembler loop tying the scanner,
//! parser, template matcher, and encoder together (§1's "multi-pass assembler driver" is out of
//! scope as a *component*, but a runnable crate needs the minimal loop that exercises forward
//! references across one forward pass and one backward pass, per `SPEC_FULL.md`).
//!
//! This is deliberately the least interesting module in the crate: everything it calls is fully
//! specified elsewhere. It owns only the bookkeeping a real multi-pass driver would otherwise
//! hide -- running offset, label table, warning-state stack, and the `[WARNING ...]` directive
//! that neither the scanner nor the parser knows about.

use crate::diag::Diagnostic;
use crate::encode::{self};
use crate::error::{EncodeError, MatchError, Severity};
use crate::eval::EvalEnv;
use crate::instruction::{ExtOperand, Instruction};
use crate::labels::{LabelStore, Location, SymbolTable};
use crate::matcher::{self, Selected};
use crate::parser;
use crate::sourcemap::{SourceMap, SourceMapItem};
use crate::warn::{self, WarnAction, WarningState};
use objfmt::{FlatWriter, Sink, SizeCounter};
use std::fs;
use std::path::Path;
use xasm_isa::CpuLevel;

/// Everything the CLI driver produces from one source file.
pub struct AssembleOutput {
    pub bytes: Vec<u8>,
    pub source_map: SourceMap,
    pub diagnostics: Vec<Diagnostic>,
}

/// Assembles `source` for `bits`-bit mode (16/32/64). `base_dir` resolves `INCBIN` filenames
/// relative to the source file's own directory, matching the teacher's file-relative `INCBIN`
/// behavior. `initial_warnings` applies CLI `-w`/`-Werror` flags before the file's own
/// `[WARNING ...]` directives are processed (§4.9, §6).
pub fn assemble(source: &str, bits: u8, base_dir: &Path, initial_warnings: &[WarnAction]) -> AssembleOutput {
    let lines: Vec<&str> = source.lines().collect();
    let cpu = CpuLevel::Optimizing;
    let optimizing = true;

    let labels = first_pass(&lines, bits, cpu, optimizing, initial_warnings, base_dir);
    second_pass(&lines, bits, cpu, optimizing, initial_warnings, base_dir, labels)
}

fn warning_directive(line: &str) -> Option<Vec<String>> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let mut parts = inner.split_whitespace();
    let head = parts.next()?;
    if !head.eq_ignore_ascii_case("warning") {
        return None;
    }
    Some(parts.map(|s| s.to_string()).collect())
}

fn apply_warning_line(ops: &[String], warnings: &mut WarningState, diagnostics: &mut Vec<Diagnostic>, line_no: u32) {
    for op in ops {
        match warn::parse_directive_arg(op).and_then(|action| warnings.apply(action)) {
            Ok(()) => {}
            Err(e) => diagnostics.push(Diagnostic::new(Severity::Warning, line_no, e.to_string())),
        }
    }
}

fn incbin_span(insn: &Instruction) -> Option<(String, i64, Option<i64>)> {
    if insn.ext_operands.is_empty() {
        return None;
    }
    let name = match &insn.ext_operands[0] {
        ExtOperand::Raw(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        _ => return None,
    };
    let skip = match insn.ext_operands.get(1) {
        Some(ExtOperand::Number(n)) => *n,
        _ => 0,
    };
    let len = match insn.ext_operands.get(2) {
        Some(ExtOperand::Number(n)) => Some(*n),
        _ => None,
    };
    Some((name, skip, len))
}

/// Reads the requested slice of an `INCBIN` target, reporting the §4.8 non-fatal I/O failure
/// modes as diagnostics rather than aborting the whole assembly.
fn read_incbin(base_dir: &Path, name: &str, skip: i64, len: Option<i64>, line_no: u32, diagnostics: &mut Vec<Diagnostic>) -> Vec<u8> {
    let path = base_dir.join(name);
    let bytes = match fs::read(&path) {
        Ok(b) => b,
        Err(_) => {
            diagnostics.push(Diagnostic::new(Severity::Nonfatal, line_no, format!("INCBIN: could not open `{}`", name)));
            return Vec::new();
        }
    };
    let total = bytes.len() as i64;
    if skip > total {
        diagnostics.push(Diagnostic::new(Severity::Nonfatal, line_no, format!("INCBIN: skip past end of `{}`", name)));
        return Vec::new();
    }
    let avail = total - skip;
    let take = len.map(|l| l.min(avail)).unwrap_or(avail);
    if take < 0 {
        diagnostics.push(Diagnostic::new(Severity::Nonfatal, line_no, format!("INCBIN: length past end of `{}`", name)));
        return Vec::new();
    }
    bytes[skip as usize..(skip + take) as usize].to_vec()
}

fn encode_float(value: f64, width: u8) -> Vec<u8> {
    match width {
        4 => (value as f32).to_le_bytes().to_vec(),
        _ => {
            let mut bytes = value.to_le_bytes().to_vec();
            bytes.resize(width as usize, 0);
            bytes
        }
    }
}

/// Byte length of one `DB`-family extended-operand list, honoring `element_width` the way NASM
/// packs a string literal into wider-than-byte declarations (`dw "AB"` is two words, not two
/// bytes).
fn ext_operands_size(insn: &Instruction) -> i64 {
    let w = insn.element_width as i64;
    insn.ext_operands
        .iter()
        .map(|op| match op {
            ExtOperand::Number(_) | ExtOperand::Float(_) => w,
            ExtOperand::Raw(bytes) => bytes.len() as i64 * w,
        })
        .sum()
}

fn emit_ext_operands<S: Sink>(insn: &Instruction, segment: u16, offset: i64, sink: &mut S) {
    let w = insn.element_width as usize;
    let mut pos = offset;
    for op in &insn.ext_operands {
        match op {
            ExtOperand::Number(n) => {
                let mut bytes = n.to_le_bytes().to_vec();
                bytes.resize(w, 0);
                sink.output(objfmt::Record::raw(segment, pos, &bytes));
                pos += w as i64;
            }
            ExtOperand::Float(f) => {
                let bytes = encode_float(*f, w as u8);
                sink.output(objfmt::Record::raw(segment, pos, &bytes));
                pos += w as i64;
            }
            ExtOperand::Raw(raw) => {
                for &b in raw {
                    let mut bytes = vec![b];
                    bytes.resize(w, 0);
                    sink.output(objfmt::Record::raw(segment, pos, &bytes));
                    pos += w as i64;
                }
            }
        }
    }
}

/// Selects and (if necessary) resolves a short-jump candidate, returning the template an
/// ordinary `calcsize`/`gencode` walk should use at `offset`.
fn resolve_template(selected: Selected, insn: &Instruction, offset: i64) -> &'static xasm_isa::Template {
    match selected {
        Selected::Direct(t) => t,
        Selected::ShortJump { short, long } => matcher::jmp_match(short, long, insn, offset),
    }
}

fn emit_reserve<S: Sink>(sink: &mut S, offset: i64, mut count: i64) {
    let mut at = offset;
    while count > 0 {
        let chunk = count.min(u8::MAX as i64);
        sink.output(objfmt::Record::reserve(0, at, chunk as u8));
        at += chunk;
        count -= chunk;
    }
}

/// Runs the matcher plus a `calcsize` walk (a real `encode::encode` call against a byte-
/// discarding [`SizeCounter`]) for one ordinary (non-pseudo) instruction, returning its length or
/// `None` if it was dropped (§7: the caller replaces it with zero bytes and keeps going).
fn size_of_real_instruction(
    insn: &mut Instruction,
    bits: u8,
    cpu: CpuLevel,
    optimizing: bool,
    offset: i64,
    line_no: u32,
    diagnostics: &mut Vec<Diagnostic>,
) -> i64 {
    let selected = match matcher::select_template(insn, bits, cpu, optimizing) {
        Ok(s) => s,
        Err(e) => {
            diagnostics.push(Diagnostic::new(Severity::Fatal, line_no, match_error_message(e)));
            return 0;
        }
    };
    let template = resolve_template(selected, insn, offset);
    let mut counter = SizeCounter::default();
    match encode::encode(insn, template, 0, offset, &mut counter) {
        Ok(len) => len,
        Err(e) => {
            diagnostics.push(Diagnostic::new(Severity::Fatal, line_no, encode_error_message(e)));
            0
        }
    }
}

fn match_error_message(e: MatchError) -> String {
    format!("no matching encoding: {}", e)
}

fn encode_error_message(e: EncodeError) -> String {
    format!("encode failed: {}", e)
}

/// One line's contribution to the file's total length, also defining its label (if any) at the
/// running offset before evaluating the rest of the line -- a label is visible to its own line's
/// trailing expressions (`here: dd here`), matching NASM's own ordering.
fn line_size(
    insn: &mut Instruction,
    bits: u8,
    cpu: CpuLevel,
    optimizing: bool,
    offset: i64,
    line_no: u32,
    base_dir: &Path,
    diagnostics: &mut Vec<Diagnostic>,
) -> i64 {
    let per_iter = match insn.opcode {
        xasm_isa::Opcode::NONE => 0,
        xasm_isa::Opcode::DB => ext_operands_size(insn),
        xasm_isa::Opcode::RESB => insn.operands.first().map(|o| o.offset).unwrap_or(0),
        xasm_isa::Opcode::INCBIN => match incbin_span(insn) {
            Some((name, skip, len)) => read_incbin(base_dir, &name, skip, len, line_no, diagnostics).len() as i64,
            None => 0,
        },
        _ => size_of_real_instruction(insn, bits, cpu, optimizing, offset, line_no, diagnostics),
    };
    per_iter * insn.times.max(0)
}

fn first_pass(
    lines: &[&str],
    bits: u8,
    cpu: CpuLevel,
    optimizing: bool,
    initial_warnings: &[WarnAction],
    base_dir: &Path,
) -> SymbolTable {
    let mut labels = SymbolTable::new();
    let mut warnings = WarningState::new();
    for action in initial_warnings {
        let _ = warnings.apply(action.clone());
    }
    warnings.seal_floor();

    let mut offset: i64 = 0;
    let mut scratch_diagnostics = Vec::new();

    for (i, raw) in lines.iter().enumerate() {
        let line_no = (i + 1) as u32;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(ops) = warning_directive(trimmed) {
            apply_warning_line(&ops, &mut warnings, &mut scratch_diagnostics, line_no);
            continue;
        }

        let env = EvalEnv { labels: &labels, current_seg: 0, current_offset: offset, in_absolute_block: false, max_depth: 64 };
        if let Ok(mut insn) = parser::parse_line(trimmed, &env, bits) {
            if let Some(label) = insn.label.clone() {
                labels.define(&label, Location { segment: 0, offset }, true);
            }
            offset += line_size(&mut insn, bits, cpu, optimizing, offset, line_no, base_dir, &mut scratch_diagnostics);
        }
    }

    labels
}

fn second_pass(
    lines: &[&str],
    bits: u8,
    cpu: CpuLevel,
    optimizing: bool,
    initial_warnings: &[WarnAction],
    base_dir: &Path,
    mut labels: SymbolTable,
) -> AssembleOutput {
    let mut warnings = WarningState::new();
    for action in initial_warnings {
        let _ = warnings.apply(action.clone());
    }
    warnings.seal_floor();

    let maxbits = if bits == 16 { 16 } else { bits };
    let mut writer = FlatWriter::new(maxbits);
    let mut diagnostics = Vec::new();
    let mut source_map = Vec::new();
    let mut offset: i64 = 0;

    for (i, raw) in lines.iter().enumerate() {
        let line_no = (i + 1) as u32;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(ops) = warning_directive(trimmed) {
            apply_warning_line(&ops, &mut warnings, &mut diagnostics, line_no);
            continue;
        }

        // Labels were already defined against their pass-1 offsets; re-defining here (same
        // offset, same name) is idempotent and keeps `labels` usable for this pass's own
        // lookups without threading pass 1's table through by reference.
        let env = EvalEnv { labels: &labels, current_seg: 0, current_offset: offset, in_absolute_block: false, max_depth: 64 };
        let mut insn = match parser::parse_line(trimmed, &env, bits) {
            Ok(insn) => insn,
            Err(e) => {
                diagnostics.push(Diagnostic::new(Severity::Fatal, line_no, e.to_string()));
                source_map.push(SourceMapItem { start_line: line_no, line_count: 0 });
                continue;
            }
        };
        if let Some(label) = insn.label.clone() {
            labels.define(&label, Location { segment: 0, offset }, true);
        }

        let start_offset = offset;
        let times = insn.times.max(0);
        match insn.opcode {
            xasm_isa::Opcode::NONE => {}
            xasm_isa::Opcode::DB => {
                for _ in 0..times {
                    emit_ext_operands(&insn, 0, offset, &mut writer);
                    offset += ext_operands_size(&insn);
                }
            }
            xasm_isa::Opcode::RESB => {
                let count = insn.operands.first().map(|o| o.offset).unwrap_or(0);
                for _ in 0..times {
                    emit_reserve(&mut writer, offset, count);
                    offset += count;
                }
            }
            xasm_isa::Opcode::INCBIN => {
                if let Some((name, skip, len)) = incbin_span(&insn) {
                    let bytes = read_incbin(base_dir, &name, skip, len, line_no, &mut diagnostics);
                    for _ in 0..times {
                        if !bytes.is_empty() {
                            writer.output(objfmt::Record::raw(0, offset, &bytes));
                        }
                        offset += bytes.len() as i64;
                    }
                }
            }
            _ => {
                let selected = match matcher::select_template(&mut insn, bits, cpu, optimizing) {
                    Ok(s) => s,
                    Err(e) => {
                        diagnostics.push(Diagnostic::new(Severity::Fatal, line_no, match_error_message(e)));
                        source_map.push(SourceMapItem { start_line: line_no, line_count: (offset - start_offset) as u32 });
                        continue;
                    }
                };
                for _ in 0..times {
                    let template = resolve_template(selected_clone(&selected), &insn, offset);
                    match encode::encode(&insn, template, 0, offset, &mut writer) {
                        Ok(len) => offset += len,
                        Err(e) => {
                            diagnostics.push(Diagnostic::new(Severity::Fatal, line_no, encode_error_message(e)));
                            break;
                        }
                    }
                }
            }
        }
        source_map.push(SourceMapItem { start_line: line_no, line_count: (offset - start_offset) as u32 });
    }

    AssembleOutput { bytes: writer.into_bytes(), source_map, diagnostics }
}

/// [`Selected`] borrows `'static` template references so re-deriving it per `TIMES` iteration is
/// just a copy, not a re-match.
fn selected_clone(selected: &Selected) -> Selected {
    match selected {
        Selected::Direct(t) => Selected::Direct(t),
        Selected::ShortJump { short, long } => Selected::ShortJump { short, long },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn here() -> PathBuf {
        PathBuf::from(".")
    }

    #[test]
    fn assembles_a_simple_mov() {
        let out = assemble("mov eax, 1\n", 32, &here(), &[]);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.bytes, vec![0xB8, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn rip_relative_mov_writes_the_literal_displacement() {
        let out = assemble("mov rax, [rip+0x20]\n", 64, &here(), &[]);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.bytes, vec![0x48, 0x8B, 0x05, 0x20, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn times_replicates_db_bytes() {
        let out = assemble("times 3 db 0x41, 0x42\n", 32, &here(), &[]);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.bytes, vec![0x41, 0x42, 0x41, 0x42, 0x41, 0x42]);
    }

    #[test]
    fn resb_reserves_zeroed_space() {
        let out = assemble("resb 4\n", 32, &here(), &[]);
        assert_eq!(out.bytes, vec![0, 0, 0, 0]);
    }

    #[test]
    fn forward_label_reference_resolves_in_the_second_pass() {
        let src = "jmp short .l\nnop\n.l: nop\n";
        let out = assemble(src, 32, &here(), &[]);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        // `EB 01` (jmp +1) then one NOP then the target NOP.
        assert_eq!(out.bytes, vec![0xEB, 0x01, 0x90, 0x90]);
    }

    #[test]
    fn warning_directive_push_pop_round_trips() {
        let src = "[WARNING push]\n[WARNING -all]\n[WARNING pop]\nnop\n";
        let out = assemble(src, 32, &here(), &[]);
        assert_eq!(out.bytes, vec![0x90]);
    }

    #[test]
    fn source_map_has_one_entry_per_source_line() {
        let out = assemble("nop\nnop\n", 32, &here(), &[]);
        assert_eq!(out.source_map.len(), 2);
        assert_eq!(out.source_map[0].start_line, 1);
        assert_eq!(out.source_map[1].start_line, 2);
    }
}
