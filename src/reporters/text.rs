//! Text (terminal) reporter with colors and formatting

use crate::models::{Label, Outcome, RunReport};
use anyhow::Result;

/// Label colors (ANSI escape codes)
fn label_color(label: Label) -> &'static str {
    match label {
        Label::UnsafeEcb => "\x1b[31m",     // Red
        Label::UnsafeOther => "\x1b[91m",   // Light red
        Label::Indeterminate => "\x1b[33m", // Yellow
        Label::Safe => "\x1b[32m",          // Green
    }
}

fn outcome_color(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::ConfirmedExploitable => "\x1b[31m", // Red
        Outcome::Inconclusive => "\x1b[33m",         // Yellow
        Outcome::NotExploitable => "\x1b[32m",       // Green
    }
}

/// Reset ANSI color
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

/// Render report as formatted terminal output
pub fn render(report: &RunReport) -> Result<String> {
    let mut out = String::new();

    out.push_str(&format!("\n{BOLD}ecbscan report{RESET}\n"));
    out.push_str(&format!(
        "{DIM}──────────────────────────────────────{RESET}\n"
    ));
    out.push_str(&format!(
        "Run: {}  Projects: {}  Unsafe-ECB: {}  Confirmed exploitable: {}\n\n",
        report.run_id,
        report.projects.len(),
        report.unsafe_ecb_total(),
        report.confirmed_total()
    ));

    for project in &report.projects {
        let s = &project.summary;
        out.push_str(&format!("{BOLD}{}{RESET}\n", project.project));
        out.push_str(&format!(
            "  fragments: {}  call sites: {}  safe: {}  unsafe-ECB: {}  unsafe-other: {}  indeterminate: {}\n",
            s.fragments, s.call_sites, s.safe, s.unsafe_ecb, s.unsafe_other, s.indeterminate
        ));

        for classification in &project.classifications {
            let site = &classification.call_site;
            let color = label_color(classification.label);
            out.push_str(&format!(
                "  {color}{}{RESET} {}:{} {} {} {DIM}[{}] confidence: {}{RESET}\n",
                classification.label,
                site.fragment.file.display(),
                site.line,
                site.algorithm,
                site.mode
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                classification.rules.join(","),
                classification.confidence,
            ));
        }

        for attempt in &project.attempts {
            let color = outcome_color(attempt.outcome);
            out.push_str(&format!(
                "    probe {} -> {color}{}{RESET}",
                attempt.strategy, attempt.outcome
            ));
            if !attempt.evidence.repeated_blocks.is_empty() {
                let pairs: Vec<String> = attempt
                    .evidence
                    .repeated_blocks
                    .iter()
                    .map(|p| format!("{}={}", p.left, p.right))
                    .collect();
                out.push_str(&format!(" {DIM}blocks {}{RESET}", pairs.join(" ")));
            }
            if attempt.evidence.timed_out {
                out.push_str(&format!(" {DIM}(timed out){RESET}"));
            }
            out.push('\n');
        }

        if project.external.available {
            out.push_str(&format!(
                "  external scanner: {} finding(s)\n",
                project.external.findings.len()
            ));
            for finding in &project.external.findings {
                out.push_str(&format!(
                    "    {} {}:{} severity: {}\n",
                    finding.rule_id,
                    finding.file.display(),
                    finding.line,
                    finding.severity
                ));
            }
        } else {
            out.push_str(&format!("  {DIM}external scanner: not available{RESET}\n"));
        }
        out.push('\n');
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_report;

    #[test]
    fn test_text_render_contains_verdicts() {
        let rendered = render(&test_report()).expect("render text");
        assert!(rendered.contains("acme/widgets"));
        assert!(rendered.contains("unsafe-ECB"));
        assert!(rendered.contains("confirmed-exploitable"));
        assert!(rendered.contains("not available"));
    }
}
