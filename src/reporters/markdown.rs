//! Markdown reporter
//!
//! GitHub-flavored Markdown for pasting into issues and PR comments.

use crate::models::RunReport;
use anyhow::Result;

/// Render report as Markdown
pub fn render(report: &RunReport) -> Result<String> {
    let mut out = String::new();

    out.push_str("# ecbscan report\n\n");
    out.push_str(&format!(
        "Run `{}` - {} project(s), {} unsafe-ECB call site(s), {} confirmed exploitable\n\n",
        report.run_id,
        report.projects.len(),
        report.unsafe_ecb_total(),
        report.confirmed_total()
    ));

    for project in &report.projects {
        out.push_str(&format!("## {}\n\n", project.project));

        if project.classifications.is_empty() {
            out.push_str("No cipher call sites found.\n\n");
            continue;
        }

        out.push_str("| Location | Cipher | Mode | Label | Confidence | Rules |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for classification in &project.classifications {
            let site = &classification.call_site;
            out.push_str(&format!(
                "| `{}:{}` | {} | {} | {} | {} | {} |\n",
                site.fragment.file.display(),
                site.line,
                site.algorithm,
                site.mode
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "unresolved".to_string()),
                classification.label,
                classification.confidence,
                classification.rules.join(", "),
            ));
        }
        out.push('\n');

        if !project.attempts.is_empty() {
            out.push_str("### Exploit attempts\n\n");
            for attempt in &project.attempts {
                out.push_str(&format!("- **{}**: {}", attempt.strategy, attempt.outcome));
                if !attempt.evidence.repeated_blocks.is_empty() {
                    let pairs: Vec<String> = attempt
                        .evidence
                        .repeated_blocks
                        .iter()
                        .map(|p| format!("{}={}", p.left, p.right))
                        .collect();
                    out.push_str(&format!(" (matching block offsets: {})", pairs.join(", ")));
                }
                for note in &attempt.evidence.notes {
                    out.push_str(&format!(" - {}", note));
                }
                out.push('\n');
            }
            out.push('\n');
        }

        if project.external.available && !project.external.findings.is_empty() {
            out.push_str("### External scanner findings\n\n");
            for finding in &project.external.findings {
                out.push_str(&format!(
                    "- `{}` at `{}:{}` ({})\n",
                    finding.rule_id,
                    finding.file.display(),
                    finding.line,
                    finding.severity
                ));
            }
            out.push('\n');
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_report;

    #[test]
    fn test_markdown_render_structure() {
        let rendered = render(&test_report()).expect("render markdown");
        assert!(rendered.starts_with("# ecbscan report"));
        assert!(rendered.contains("## acme/widgets"));
        assert!(rendered.contains("| `src/crypto.py:12` |"));
        assert!(rendered.contains("matching block offsets: 0=1"));
    }
}
