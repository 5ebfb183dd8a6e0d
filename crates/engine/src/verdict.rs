// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit verdict extraction.
//!
//! The auditor is instructed to emit a JSON verdict, but its output is free
//! text around it: preamble, markdown fences, trailing commentary. The first
//! balanced `{…}` object in the output is authoritative. Anything that fails
//! to yield a verdict degrades to a failing one, so a garbled auditor can
//! never wave work through.

use serde::Deserialize;

/// Gap recorded when the auditor's output yields no verdict.
pub const UNPARSABLE_VERDICT_GAP: &str = "audit output could not be parsed";

/// The auditor's judgement of one worker attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuditVerdict {
    #[serde(default)]
    pub pass: bool,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default, alias = "testResults")]
    pub test_results: Option<String>,
    #[serde(default, alias = "prUrl")]
    pub pr_url: Option<String>,
}

impl AuditVerdict {
    fn unparsable() -> Self {
        Self {
            pass: false,
            criteria: Vec::new(),
            gaps: vec![UNPARSABLE_VERDICT_GAP.to_string()],
            test_results: None,
            pr_url: None,
        }
    }
}

/// Parse an auditor's raw output into a verdict. Infallible by design.
pub fn parse_verdict(output: &str) -> AuditVerdict {
    extract_first_object(output)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(AuditVerdict::unparsable)
}

/// Slice out the first balanced top-level JSON object, respecting string
/// literals and escapes.
fn extract_first_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in s.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
#[path = "verdict_tests.rs"]
mod tests;
