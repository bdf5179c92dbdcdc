// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Engine-level assembler tests: full source in, artifact (or diagnostics)
//! out, with execution checks through the CPU where the property demands it.

use super::{AssembleConfig, Assembler, AsmOutput};
use crate::codec::CodecKind;
use crate::core::error::AsmErrorKind;
use crate::vm::cpu::Cpu;
use crate::vm::memory::Memory;

fn assemble_with(source: &str, codec: CodecKind, base_offset: u32) -> AsmOutput {
    let mut assembler = Assembler::new(AssembleConfig { codec, base_offset });
    match assembler.assemble(source) {
        Ok(output) => output,
        Err(err) => panic!(
            "assembly failed: {err} (diagnostics: {:?})",
            assembler.diagnostics()
        ),
    }
}

fn assemble(source: &str) -> AsmOutput {
    assemble_with(source, CodecKind::Fixed, 0)
}

fn boot(output: &AsmOutput, codec: CodecKind) -> Cpu {
    let mut cpu = Cpu::new(Memory::new(65536), codec);
    cpu.load_program(&output.code, output.base_offset, &output.regions)
        .expect("load");
    cpu
}

#[test]
fn end_to_end_mvi_and_halt_under_both_codecs() {
    let source = ".data\n.text\n.global start:\nstart:\nmvi r5 20\nhalt\n";
    for codec in [CodecKind::Fixed, CodecKind::Variable] {
        let output = assemble_with(source, codec, 0);
        let mut cpu = boot(&output, codec);
        let steps = cpu.run(100).expect("run should halt");
        assert!(steps <= 4, "halted via HALT, not a step cap");
        assert_eq!(cpu.registers.get(5), 20, "codec {codec:?}");
    }
}

#[test]
fn trampoline_jumps_to_the_entry_label() {
    // Code before the entry label must be skipped by the bootstrap.
    let source = "\
.text
.global start:
decoy:
mvi r4 9
start:
mvi r4 1
halt
";
    for codec in [CodecKind::Fixed, CodecKind::Variable] {
        let output = assemble_with(source, codec, 0);
        let mut cpu = boot(&output, codec);
        cpu.run(100).expect("run");
        assert_eq!(cpu.registers.get(4), 1);
    }
}

#[test]
fn longest_prefix_labels_resolve_distinctly() {
    let source = "\
.text
.global start:
start:
jmp oneoneoneone
one:
mvi r1 1
halt
oneone:
mvi r2 2
halt
oneoneone:
mvi r3 3
halt
oneoneoneone:
mvi r4 4
halt
";
    for codec in [CodecKind::Fixed, CodecKind::Variable] {
        let output = assemble_with(source, codec, 0);
        let labels = &output.labels;
        let offsets: Vec<u32> = ["one", "oneone", "oneoneone", "oneoneoneone"]
            .iter()
            .map(|name| labels[&name.to_string()])
            .collect();
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 4, "all four labels have distinct offsets");

        let mut cpu = boot(&output, codec);
        cpu.run(100).expect("run");
        assert_eq!(cpu.registers.get(4), 4);
        assert_eq!(cpu.registers.get(1), 0);
        assert_eq!(cpu.registers.get(3), 0);
    }
}

#[test]
fn base_offset_shifts_label_addresses() {
    let source = ".text\n.global start:\nstart:\nmvi r5 20\nhalt\n";
    let output = assemble_with(source, CodecKind::Variable, 4096);
    let mut cpu = boot(&output, CodecKind::Variable);
    cpu.run(100).expect("run");
    assert_eq!(cpu.registers.get(5), 20);
    assert_eq!(output.regions[0].start, 4096);
}

#[test]
fn data_labels_follow_the_text_section() {
    let source = "\
.data
.greeting 'Hi'
.counter long 7
.text
.global start:
start:
ldr r2 .counter
halt
";
    let output = assemble_with(source, CodecKind::Variable, 0);
    assert_eq!(output.data_labels.len(), 2);
    assert_eq!(output.data_labels[0].address, output.text_len);
    assert_eq!(
        output.data_labels[1].address,
        output.text_len + output.data_labels[0].size
    );

    let mut cpu = boot(&output, CodecKind::Variable);
    cpu.run(100).expect("run");
    assert_eq!(cpu.registers.get(2), 7);
}

#[test]
fn repeated_data_references_on_one_line_both_resolve() {
    let source = "\
.data
.v long 3
.text
.global start:
start:
mvi r1 .v+.v
halt
";
    let output = assemble_with(source, CodecKind::Variable, 0);
    let addr = output.data_labels[0].address as i64;
    let mut cpu = boot(&output, CodecKind::Variable);
    cpu.run(100).expect("run");
    assert_eq!(cpu.registers.get(1), addr * 2);
}

#[test]
fn store_and_reload_through_a_data_buffer() {
    let source = "\
.data
.scratch size 8
.text
.global start:
start:
mvi r1 77
str r1 .scratch
ldr r2 .scratch
halt
";
    for codec in [CodecKind::Fixed, CodecKind::Variable] {
        let output = assemble_with(source, codec, 0);
        let mut cpu = boot(&output, codec);
        cpu.run(100).expect("run");
        assert_eq!(cpu.registers.get(2), 77, "codec {codec:?}");
    }
}

#[test]
fn push_pop_round_trip_through_the_stack() {
    let source = "\
.text
.global start:
start:
mvi r1 123
push r1
pop r2
halt
";
    let output = assemble_with(source, CodecKind::Variable, 0);
    let mut cpu = boot(&output, CodecKind::Variable);
    let sp_before = cpu.registers.sp();
    cpu.run(100).expect("run");
    assert_eq!(cpu.registers.get(2), 123);
    assert_eq!(cpu.registers.sp(), sp_before);
}

#[test]
fn code_region_is_read_only_after_load() {
    let source = "\
.text
.global start:
start:
mvi r1 5
str r1 4
halt
";
    let output = assemble_with(source, CodecKind::Variable, 0);
    assert_eq!(output.regions.len(), 1);
    let mut cpu = boot(&output, CodecKind::Variable);
    let err = cpu.run(100).unwrap_err();
    assert!(err.message.contains("read-only"));
}

#[test]
fn missing_text_section_is_rejected_before_assembly() {
    let mut assembler = Assembler::new(AssembleConfig::default());
    let err = assembler.assemble(".data\n.x byte 1\n").unwrap_err();
    assert_eq!(err.kind(), AsmErrorKind::Section);
    assert!(err.message().contains(".text"));
}

#[test]
fn global_before_text_is_rejected() {
    let mut assembler = Assembler::new(AssembleConfig::default());
    let err = assembler
        .assemble(".global start:\n.text\nstart:\nhalt\n")
        .unwrap_err();
    assert!(err.message().contains(".global"));
}

#[test]
fn bad_lines_collect_diagnostics_and_parsing_resynchronizes() {
    let source = "\
.text
.global start:
start:
frob r1
mvi r5 @
mvi r1 1
jmp nowhere
halt
";
    let mut assembler = Assembler::new(AssembleConfig::default());
    assert!(assembler.assemble(source).is_err());
    let diagnostics = assembler.take_diagnostics();
    assert_eq!(diagnostics.len(), 3);
    // The lex error surfaces while parsing, before the pass-1 mnemonic
    // check and the pass-2 resolution check.
    assert!(diagnostics[0]
        .error
        .message()
        .contains("Unrecognized character"));
    assert_eq!(diagnostics[0].line, 5);
    assert!(diagnostics[1].error.message().contains("Unknown mnemonic"));
    assert_eq!(diagnostics[1].line, 4);
    assert!(diagnostics[2].error.message().contains("Unresolved label"));
    assert_eq!(diagnostics[2].line, 7);
}

#[test]
fn wrong_operand_count_is_a_diagnostic() {
    let source = ".text\n.global start:\nstart:\nmvi r5\nhalt\n";
    let mut assembler = Assembler::new(AssembleConfig::default());
    assert!(assembler.assemble(source).is_err());
    let diagnostics = assembler.take_diagnostics();
    assert!(diagnostics[0].error.message().contains("expects 2"));
}

#[test]
fn wrong_operand_kind_is_a_diagnostic() {
    let source = ".text\n.global start:\nstart:\njmp r5\nhalt\n";
    let mut assembler = Assembler::new(AssembleConfig::default());
    assert!(assembler.assemble(source).is_err());
    let diagnostics = assembler.take_diagnostics();
    assert!(diagnostics[0].error.message().contains("Operand not allowed"));
}

#[test]
fn comments_and_blank_lines_disappear() {
    let source = "\
; program header
.text
.global start:   ; entry
start:
mvi r5 20 ; load

halt
";
    let output = assemble(source);
    let mut cpu = boot(&output, CodecKind::Fixed);
    cpu.run(100).expect("run");
    assert_eq!(cpu.registers.get(5), 20);
}

#[test]
fn folded_constants_reach_the_encoder() {
    let source = ".text\n.global start:\nstart:\nmvi r5 1+19\nhalt\n";
    let output = assemble(source);
    let mut cpu = boot(&output, CodecKind::Fixed);
    cpu.run(100).expect("run");
    assert_eq!(cpu.registers.get(5), 20);
}

#[test]
fn loop_counts_down_to_zero() {
    let source = "\
.text
.global start:
start:
mvi r3 4
body:
inc r2
loop r3 body
halt
";
    let output = assemble_with(source, CodecKind::Variable, 0);
    let mut cpu = boot(&output, CodecKind::Variable);
    cpu.run(100).expect("run");
    assert_eq!(cpu.registers.get(2), 4);
    assert_eq!(cpu.registers.get(3), 0);
}

#[test]
fn call_and_ret_with_labels() {
    let source = "\
.text
.global start:
start:
call helper
halt
helper:
mvi r6 3
ret
";
    for codec in [CodecKind::Fixed, CodecKind::Variable] {
        let output = assemble_with(source, codec, 0);
        let mut cpu = boot(&output, codec);
        cpu.run(100).expect("run");
        assert_eq!(cpu.registers.get(6), 3, "codec {codec:?}");
    }
}

#[test]
fn conditional_branches_follow_the_flags() {
    let source = "\
.text
.global start:
start:
mvi r1 5
mvi r2 5
cmp r1 r2
jeq equal
mvi r4 0
halt
equal:
mvi r4 1
halt
";
    let output = assemble_with(source, CodecKind::Variable, 0);
    let mut cpu = boot(&output, CodecKind::Variable);
    cpu.run(100).expect("run");
    assert_eq!(cpu.registers.get(4), 1);
}

#[test]
fn buffer_between_text_and_scalar_keeps_addresses_sequential() {
    let source = "\
.data
.a byte 1
.gap size 5
.b word 300
.text
.global start:
start:
halt
";
    let output = assemble(source);
    let a = &output.data_labels[0];
    let gap = &output.data_labels[1];
    let b = &output.data_labels[2];
    assert_eq!(gap.address, a.address + 1);
    assert_eq!(b.address, gap.address + 5);
    let total: u32 = output.data_labels.iter().map(|l| l.size).sum();
    assert_eq!(output.code.len() as u32, output.text_len + total);
}
