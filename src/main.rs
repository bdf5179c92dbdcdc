// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for opVM.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use serde_json::json;

use opvm::assembler::{AsmOutput, AssembleConfig, Assembler};
use opvm::codec::CodecKind;
use opvm::core::error::{Diagnostic, Severity};
use opvm::vm::cpu::Cpu;
use opvm::vm::memory::Memory;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Assembler and virtual CPU toolchain.

Assembles a line-oriented assembly source (.data/.text/.global sections,
labels, data declarations) into one contiguous machine-code buffer under the
selected instruction codec, and optionally executes it to HALT on the
emulated register machine. The same codec must be used to assemble and run
a buffer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CodecChoice {
    Fixed,
    Variable,
}

impl CodecChoice {
    fn kind(self) -> CodecKind {
        match self {
            CodecChoice::Fixed => CodecKind::Fixed,
            CodecChoice::Variable => CodecKind::Variable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "opVM",
    version = VERSION,
    about = "Assembler and register-machine emulator with swappable instruction codecs",
    long_about = LONG_ABOUT
)]
struct Cli {
    /// Assembly source file.
    input: PathBuf,
    #[arg(
        long = "codec",
        value_enum,
        default_value_t = CodecChoice::Fixed,
        long_help = "Instruction codec: fixed 4-byte words or the variable-length encoding. Must match between assembling and running a buffer."
    )]
    codec: CodecChoice,
    #[arg(
        long = "base",
        value_name = "ADDR",
        default_value_t = 0,
        long_help = "Base memory offset the buffer is loaded at. Label and data addresses are relative to it."
    )]
    base: u32,
    #[arg(
        long = "memory",
        value_name = "BYTES",
        default_value_t = 65536,
        long_help = "Memory capacity for execution. The stack grows down from the top."
    )]
    memory: usize,
    #[arg(
        short = 'o',
        long = "outfile",
        value_name = "FILE",
        long_help = "Write the machine-code buffer (text section followed by data section) to FILE."
    )]
    outfile: Option<PathBuf>,
    #[arg(
        long = "run",
        action = ArgAction::SetTrue,
        long_help = "Execute the assembled buffer until HALT and report the registers."
    )]
    run: bool,
    #[arg(
        long = "max-steps",
        value_name = "N",
        default_value_t = 1_000_000,
        long_help = "Step limit for --run. Exceeding it is reported as a fault; the core itself never imposes one."
    )]
    max_steps: u64,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select CLI output format. text is default; json enables machine-readable output."
    )]
    format: OutputFormat,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress success output. Errors are still reported."
    )]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    let config = AssembleConfig {
        codec: cli.codec.kind(),
        base_offset: cli.base,
    };
    let mut assembler = Assembler::new(config);
    let output = match assembler.assemble(&source) {
        Ok(output) => output,
        Err(err) => {
            emit_diagnostics(&assembler.take_diagnostics(), cli.format);
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &cli.outfile {
        if let Err(err) = fs::write(path, &output.code) {
            eprintln!("error: cannot write {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
        if !cli.quiet {
            println!("wrote {} bytes to {}", output.code.len(), path.display());
        }
    }

    if !cli.quiet && cli.format == OutputFormat::Text {
        println!(
            "assembled {} bytes ({} text, {} data)",
            output.code.len(),
            output.text_len,
            output.code.len() as u32 - output.text_len
        );
    }

    if cli.run {
        return run_program(&cli, &output);
    }

    if cli.format == OutputFormat::Json && !cli.quiet {
        println!(
            "{}",
            json!({
                "schema": "opvm-assemble-v1",
                "bytes": output.code.len(),
                "text_len": output.text_len,
                "base_offset": output.base_offset,
            })
        );
    }
    ExitCode::SUCCESS
}

fn run_program(cli: &Cli, output: &AsmOutput) -> ExitCode {
    if cli.memory < output.code.len() + output.base_offset as usize {
        eprintln!("error: program does not fit in {} bytes of memory", cli.memory);
        return ExitCode::FAILURE;
    }
    let mut cpu = Cpu::new(Memory::new(cli.memory), cli.codec.kind());
    if let Err(err) = cpu.load_program(&output.code, output.base_offset, &output.regions) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    match cpu.run(cli.max_steps) {
        Ok(steps) => {
            if !cli.quiet {
                report_registers(&cpu, steps, cli.format);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn report_registers(cpu: &Cpu, steps: u64, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!("halted after {steps} step(s)");
            for index in 0..7 {
                print!("R{index}={} ", cpu.registers.get(index));
            }
            println!("SP={} IP={}", cpu.registers.sp(), cpu.registers.ip());
        }
        OutputFormat::Json => {
            let regs: Vec<i64> = (0..7).map(|index| cpu.registers.get(index)).collect();
            println!(
                "{}",
                json!({
                    "schema": "opvm-run-v1",
                    "steps": steps,
                    "registers": regs,
                    "sp": cpu.registers.sp(),
                    "ip": cpu.registers.ip(),
                })
            );
        }
    }
}

fn emit_diagnostics(diagnostics: &[Diagnostic], format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            for diag in diagnostics {
                eprintln!("{diag}");
            }
        }
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = diagnostics
                .iter()
                .map(|diag| {
                    json!({
                        "line": diag.line,
                        "column": diag.column,
                        "severity": match diag.severity {
                            Severity::Warning => "warning",
                            Severity::Error => "error",
                        },
                        "message": diag.error.message(),
                    })
                })
                .collect();
            eprintln!("{}", json!({ "schema": "opvm-diagnostics-v1", "diagnostics": entries }));
        }
    }
}
