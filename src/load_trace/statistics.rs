use std::path::{Path, PathBuf};

use clap::ValueEnum;

use super::collect::{ErrorCategory, RuleLoadErrorsResult};
use crate::sarif::Summary;
use crate::tree::Tree;

const ISSUE_TRACKER_URL: &str = "https://github.com/seqra/seqra/issues";

/// How much detail summary views include.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum Verbosity {
    #[default]
    Info,
    Debug,
}

impl Verbosity {
    pub(crate) fn filter_directive(self) -> &'static str {
        match self {
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// Builder for the "Rule Statistics" outline.
pub(crate) struct RuleStatistics<'a> {
    load_errors: Option<&'a RuleLoadErrorsResult>,
    summary: Summary,
    trace_path: Option<PathBuf>,
    verbosity: Verbosity,
}

impl<'a> RuleStatistics<'a> {
    pub(crate) fn new() -> Self {
        Self {
            load_errors: None,
            summary: Summary::default(),
            trace_path: None,
            verbosity: Verbosity::default(),
        }
    }

    pub(crate) fn with_load_errors(mut self, load_errors: Option<&'a RuleLoadErrorsResult>) -> Self {
        self.load_errors = load_errors;
        self
    }

    pub(crate) fn with_summary(mut self, summary: &Summary) -> Self {
        self.summary = summary.clone();
        self
    }

    pub(crate) fn with_trace_path(mut self, path: &Path) -> Self {
        self.trace_path = Some(path.to_path_buf());
        self
    }

    pub(crate) fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub(crate) fn build(&self) -> Tree {
        let mut tree = Tree::new();
        self.add_rule_parsing_issues(&mut tree);
        tree.add("Rule Execution")
            .add_at(
                format!("Rules executed: {}", self.summary.total_rules_executed),
                1,
            )
            .add_at(
                format!("Rules triggered: {}", self.summary.total_rules_triggered),
                1,
            );
        tree
    }

    fn add_rule_parsing_issues(&self, tree: &mut Tree) {
        tree.add("Rule Parsing Issues");
        let summary = match self.load_errors {
            None => {
                tree.add_at("No rule parsing data available", 1);
                return;
            }
            Some(Err(err)) => {
                tree.add_at("Unable to retrieve rule load failures info", 1)
                    .add_at(format!("Error: {err}"), 2);
                return;
            }
            Some(Ok(summary)) => summary,
        };
        let is_debug = self.verbosity == Verbosity::Debug;
        if !is_debug && !summary.has_issues() {
            tree.add_at("No issues found", 1);
            return;
        }

        tree.add_at("File-level", 1)
            .add_at(
                format!(
                    "Files with syntax errors: {}",
                    summary.files_with(ErrorCategory::SyntaxError)
                ),
                2,
            )
            .add_at(
                format!(
                    "Files with unsupported constructs: {}",
                    summary.files_with(ErrorCategory::Unsupported)
                ),
                2,
            )
            .add_at(
                format!("Total affected files: {}", summary.total_affected_files),
                2,
            );
        tree.add_at("Rule-level", 1)
            .add_at(
                format!(
                    "Rules with syntax errors: {}",
                    summary.rules_with(ErrorCategory::SyntaxError)
                ),
                2,
            )
            .add_at(
                format!(
                    "Rules with unsupported constructs: {}",
                    summary.rules_with(ErrorCategory::Unsupported)
                ),
                2,
            )
            .add_at(
                format!("Total affected rules: {}", summary.total_affected_rules),
                2,
            );

        tree.add_at("More details", 1);
        if let Some(path) = &self.trace_path {
            tree.add_at(format!("See Rule load trace: {}", path.display()), 2);
        }
        let has_unsupported = summary.files_with(ErrorCategory::Unsupported) > 0
            || summary.rules_with(ErrorCategory::Unsupported) > 0;
        if is_debug || has_unsupported {
            tree.add_at(format!("Report issues here: {ISSUE_TRACKER_URL}"), 2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_trace::collect::RuleLoadErrorsAggregatedSummary;

    fn texts(tree: &Tree) -> Vec<(usize, &str)> {
        tree.nodes()
            .iter()
            .map(|node| (node.level, node.text.as_str()))
            .collect()
    }

    fn summary_with(files: usize, rules: usize) -> RuleLoadErrorsResult {
        let mut summary = RuleLoadErrorsAggregatedSummary::default();
        summary
            .file_error_types
            .insert(ErrorCategory::SyntaxError, files);
        summary
            .rule_error_types
            .insert(ErrorCategory::Unsupported, rules);
        summary.total_affected_files = files;
        summary.total_affected_rules = rules;
        Ok(summary)
    }

    #[test]
    fn missing_trace_data_is_reported() {
        let tree = RuleStatistics::new().build();

        assert_eq!(
            texts(&tree)[..2],
            [(0, "Rule Parsing Issues"), (1, "No rule parsing data available")]
        );
    }

    #[test]
    fn load_failure_shows_error_message() {
        let failed: RuleLoadErrorsResult = Err("trace file not found".to_string());

        let tree = RuleStatistics::new().with_load_errors(Some(&failed)).build();

        assert!(texts(&tree).contains(&(2, "Error: trace file not found")));
    }

    #[test]
    fn clean_trace_reports_no_issues_unless_debugging() {
        let clean = summary_with(0, 0);

        let info = RuleStatistics::new().with_load_errors(Some(&clean)).build();
        let debug = RuleStatistics::new()
            .with_load_errors(Some(&clean))
            .verbosity(Verbosity::Debug)
            .build();

        assert!(texts(&info).contains(&(1, "No issues found")));
        assert!(!texts(&debug).contains(&(1, "No issues found")));
        assert!(texts(&debug).contains(&(2, "Total affected files: 0")));
        assert!(texts(&debug).contains(&(2, format!("Report issues here: {ISSUE_TRACKER_URL}").as_str())));
    }

    #[test]
    fn issues_include_counts_trace_path_and_tracker_link() {
        let result = summary_with(2, 3);
        let mut summary = Summary::default();
        summary.total_rules_executed = 10;
        summary.total_rules_triggered = 4;

        let tree = RuleStatistics::new()
            .with_load_errors(Some(&result))
            .with_summary(&summary)
            .with_trace_path(Path::new("/tmp/trace.json"))
            .build();

        let nodes = texts(&tree);
        assert!(nodes.contains(&(2, "Files with syntax errors: 2")));
        assert!(nodes.contains(&(2, "Rules with unsupported constructs: 3")));
        assert!(nodes.contains(&(2, "See Rule load trace: /tmp/trace.json")));
        assert!(nodes.contains(&(2, format!("Report issues here: {ISSUE_TRACKER_URL}").as_str())));
        assert_eq!(
            nodes[nodes.len() - 3..],
            [
                (0, "Rule Execution"),
                (1, "Rules executed: 10"),
                (1, "Rules triggered: 4")
            ]
        );
    }

    #[test]
    fn syntax_only_issues_skip_tracker_link() {
        let result = summary_with(1, 0);

        let tree = RuleStatistics::new().with_load_errors(Some(&result)).build();

        assert!(
            !texts(&tree)
                .iter()
                .any(|(_, text)| text.starts_with("Report issues here"))
        );
    }
}
