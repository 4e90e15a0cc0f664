use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use super::{LEVEL_ERROR, LEVEL_NOTE, LEVEL_WARNING, Report};

/// Counts over a SARIF report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) total_findings: usize,
    pub(crate) total_rules_executed: usize,
    pub(crate) total_rules_triggered: usize,
    pub(crate) findings_by_level: BTreeMap<String, usize>,
}

impl Summary {
    pub(crate) fn count(&self, level: &str) -> usize {
        self.findings_by_level.get(level).copied().unwrap_or(0)
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            "=== Scan Results Summary ===".to_string(),
            format!("Total findings: {}", self.total_findings),
            format!("Total rules run: {}", self.total_rules_executed),
            format!("Total rules triggered: {}", self.total_rules_triggered),
        ];
        if !self.findings_by_level.is_empty() {
            lines.push("Findings by severity:".to_string());
            for level in [LEVEL_ERROR, LEVEL_WARNING, LEVEL_NOTE] {
                lines.push(format!("  {level}: {}", self.count(level)));
            }
        }
        lines
    }
}

/// Summarize findings, filling in `note` for results that carry no level.
pub(crate) fn generate_summary(report: &mut Report) -> Summary {
    let mut summary = Summary::default();
    let mut rules_executed = BTreeSet::new();
    let mut rules_triggered = BTreeSet::new();

    for run in &mut report.runs {
        for rule in run.tool.driver.rules.iter().flatten() {
            rules_executed.insert(rule.id.clone());
        }
        for result in run.results.iter_mut().flatten() {
            match result.rule_id.as_ref() {
                Some(rule_id) => {
                    rules_triggered.insert(rule_id.clone());
                }
                None => warn!("finding has no ruleId"),
            }
            let level = result.level.get_or_insert_default();
            if level.is_empty() {
                *level = LEVEL_NOTE.to_string();
            }
            *summary.findings_by_level.entry(level.clone()).or_default() += 1;
            summary.total_findings += 1;
        }
    }

    summary.total_rules_executed = rules_executed.len();
    summary.total_rules_triggered = rules_triggered.len();
    summary
}
