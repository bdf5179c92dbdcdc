// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Preprocessing passes over raw source lines.
//!
//! Each pass is a pure `Vec<SourceLine> -> Vec<SourceLine>` transform;
//! the engine runs them in order (trim, strip comments, drop blank lines,
//! fold constants, inject the entry trampoline) but any composition works.

use crate::core::tokenizer::{TokenKind, Tokenizer};

/// One source line with its original (1-based) line number. Passes that
/// remove or expand lines keep the original numbers for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    pub number: u32,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, number: u32) -> Self {
        Self {
            text: text.into(),
            number,
        }
    }
}

/// A line-list rewriting pass.
pub type Pass = fn(Vec<SourceLine>) -> Vec<SourceLine>;

/// The default pass order.
pub fn default_passes() -> Vec<Pass> {
    vec![
        trim,
        strip_comments,
        drop_blank_lines,
        fold_constants,
        inject_entry_point,
    ]
}

/// Split raw text into numbered lines.
pub fn source_lines(text: &str) -> Vec<SourceLine> {
    text.lines()
        .enumerate()
        .map(|(ix, line)| SourceLine::new(line, ix as u32 + 1))
        .collect()
}

pub fn run_passes(mut lines: Vec<SourceLine>, passes: &[Pass]) -> Vec<SourceLine> {
    for pass in passes {
        lines = pass(lines);
    }
    lines
}

pub fn trim(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    lines
        .into_iter()
        .map(|line| SourceLine::new(line.text.trim().to_string(), line.number))
        .collect()
}

/// A line starting with `;` becomes empty; otherwise the first `;` outside
/// a quoted string truncates the line, inclusive.
pub fn strip_comments(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    lines
        .into_iter()
        .map(|line| {
            if line.text.starts_with(';') {
                return SourceLine::new(String::new(), line.number);
            }
            let mut quote: Option<char> = None;
            for (ix, ch) in line.text.char_indices() {
                match quote {
                    Some(q) if ch == q => quote = None,
                    Some(_) => {}
                    None if ch == '\'' || ch == '"' => quote = Some(ch),
                    None if ch == ';' => {
                        return SourceLine::new(line.text[..ix].trim_end(), line.number);
                    }
                    None => {}
                }
            }
            line
        })
        .collect()
}

pub fn drop_blank_lines(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    lines
        .into_iter()
        .filter(|line| !line.text.trim().is_empty())
        .collect()
}

/// Fold every `NUMBER + NUMBER` token triple into its literal sum,
/// re-lexing to a fixpoint per line. Subtraction is intentionally not
/// folded.
pub fn fold_constants(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    lines
        .into_iter()
        .map(|line| {
            let mut text = line.text;
            while let Some(folded) = fold_once(&text) {
                text = folded;
            }
            SourceLine::new(text, line.number)
        })
        .collect()
}

fn fold_once(text: &str) -> Option<String> {
    let tokens = Tokenizer::new(text, 1).tokenize().ok()?;
    for window in tokens.windows(3) {
        if window[0].kind == TokenKind::Number
            && window[1].kind == TokenKind::Plus
            && window[2].kind == TokenKind::Number
        {
            let sum = window[0].value.checked_add(window[2].value)?;
            let start = window[0].span.col_start - 1;
            let end = window[2].span.col_end - 1;
            let mut folded = String::with_capacity(text.len());
            folded.push_str(&text[..start]);
            folded.push_str(&sum.to_string());
            folded.push_str(&text[end..]);
            return Some(folded);
        }
    }
    None
}

/// Replace the `.global <label>:` line with the two-line hardware bootstrap
/// trampoline: `MVI R0 <label>:` then `JMR R0`, both carrying the original
/// line number. Execution always begins by loading the entry address into
/// R0 and jumping through it.
pub fn inject_entry_point(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    let mut out = Vec::with_capacity(lines.len() + 1);
    let mut injected = false;
    for line in lines {
        if !injected && line.text.starts_with(".global") {
            let target = line
                .text
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string();
            out.push(SourceLine::new(format!("MVI R0 {target}"), line.number));
            out.push(SourceLine::new("JMR R0", line.number));
            injected = true;
            continue;
        }
        out.push(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        default_passes, drop_blank_lines, fold_constants, inject_entry_point, run_passes,
        source_lines, strip_comments, trim, SourceLine,
    };

    fn lines(texts: &[&str]) -> Vec<SourceLine> {
        texts
            .iter()
            .enumerate()
            .map(|(ix, text)| SourceLine::new(*text, ix as u32 + 1))
            .collect()
    }

    #[test]
    fn trim_strips_surrounding_whitespace() {
        let out = trim(lines(&["  mvi r0 1  "]));
        assert_eq!(out[0].text, "mvi r0 1");
    }

    #[test]
    fn comment_only_lines_become_empty() {
        let out = strip_comments(lines(&["; whole line", "halt ; trailing", "mvi r0 1"]));
        assert_eq!(out[0].text, "");
        assert_eq!(out[1].text, "halt");
        assert_eq!(out[2].text, "mvi r0 1");
    }

    #[test]
    fn semicolons_inside_strings_survive() {
        let out = strip_comments(lines(&[".msg 'a;b' ; comment"]));
        assert_eq!(out[0].text, ".msg 'a;b'");
    }

    #[test]
    fn blank_lines_are_dropped_with_numbers_kept() {
        let out = drop_blank_lines(lines(&["mvi r0 1", "", "halt"]));
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].number, 3);
    }

    #[test]
    fn folds_additive_constants() {
        let out = fold_constants(lines(&["MOV R1, 1+1"]));
        assert_eq!(out[0].text, "MOV R1, 2");
    }

    #[test]
    fn folding_reaches_a_fixpoint() {
        let out = fold_constants(lines(&["MOV R1, 1+2+3"]));
        assert_eq!(out[0].text, "MOV R1, 6");
        let again = fold_constants(out.clone());
        assert_eq!(again, out);
    }

    #[test]
    fn folds_inside_dereferences() {
        let out = fold_constants(lines(&["mov r1, [2+3]"]));
        assert_eq!(out[0].text, "mov r1, [5]");
    }

    #[test]
    fn subtraction_is_not_folded() {
        let out = fold_constants(lines(&["MOV R1, 5-2"]));
        assert_eq!(out[0].text, "MOV R1, 5-2");
    }

    #[test]
    fn trampoline_replaces_the_global_line() {
        let input = lines(&[".text", ".global entry:", "entry:", "mvi R6 3"]);
        let out = inject_entry_point(input);
        let texts: Vec<&str> = out.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec![".text", "MVI R0 entry:", "JMR R0", "entry:", "mvi R6 3"]);
        assert_eq!(out[1].number, 2);
        assert_eq!(out[2].number, 2);
    }

    #[test]
    fn default_chain_runs_in_order() {
        let src = "  .text \n; comment\n\n.global start:\nstart:\nmvi r5 1+19\nhalt";
        let out = run_passes(source_lines(src), &default_passes());
        let texts: Vec<&str> = out.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                ".text",
                "MVI R0 start:",
                "JMR R0",
                "start:",
                "mvi r5 20",
                "halt"
            ]
        );
    }
}
