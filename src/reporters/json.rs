//! JSON reporter
//!
//! Outputs the full RunReport as pretty-printed JSON. This is the stable,
//! machine-parsable schema regression tests diff against.

use crate::models::RunReport;
use anyhow::Result;

/// Render report as JSON
pub fn render(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Render report as compact JSON (single line)
pub fn render_compact(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_report;

    #[test]
    fn test_json_render_valid() {
        let report = test_report();
        let json_str = render(&report).expect("render JSON");
        let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("parse JSON");
        assert_eq!(parsed["run_id"], "test-run");
        assert_eq!(
            parsed["projects"][0]["classifications"][0]["label"],
            "unsafe-ecb"
        );
        assert_eq!(
            parsed["projects"][0]["attempts"][0]["outcome"],
            "confirmed-exploitable"
        );
    }

    #[test]
    fn test_json_round_trips() {
        let report = test_report();
        let json_str = render_compact(&report).expect("render compact JSON");
        assert!(!json_str.contains('\n'));
        let back: RunReport = serde_json::from_str(&json_str).expect("deserialize");
        assert_eq!(back.projects.len(), report.projects.len());
        assert_eq!(back.confirmed_total(), 1);
    }

    #[test]
    fn test_json_empty_external_section() {
        let report = test_report();
        let json_str = render(&report).expect("render JSON");
        let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("parse JSON");
        assert_eq!(parsed["projects"][0]["external"]["available"], false);
        assert!(parsed["projects"][0]["external"]["findings"]
            .as_array()
            .unwrap()
            .is_empty());
    }
}
