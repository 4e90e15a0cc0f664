use super::collect::{ErrorCategory, FileSummary, RuleSummary, TraceSummary};
use crate::tree::Tree;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RuleSyntaxErrors {
    pub(crate) rule_id: String,
    pub(crate) errors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FileSyntaxErrors {
    pub(crate) path: String,
    pub(crate) errors: Vec<String>,
    pub(crate) rules: Vec<RuleSyntaxErrors>,
}

fn rule_syntax_errors(rule: &RuleSummary) -> Option<RuleSyntaxErrors> {
    let errors: Vec<String> = rule
        .errors
        .messages_of(ErrorCategory::SyntaxError)
        .chain(
            rule.steps
                .iter()
                .flat_map(|step| step.errors.messages_of(ErrorCategory::SyntaxError)),
        )
        .map(str::to_string)
        .collect();
    if errors.is_empty() {
        return None;
    }
    Some(RuleSyntaxErrors {
        rule_id: rule.rule_id.clone(),
        errors,
    })
}

fn file_syntax_errors(file: &FileSummary) -> Option<FileSyntaxErrors> {
    let errors: Vec<String> = file
        .errors
        .messages_of(ErrorCategory::SyntaxError)
        .map(str::to_string)
        .collect();
    let rules: Vec<RuleSyntaxErrors> = file.rules.iter().filter_map(rule_syntax_errors).collect();
    if errors.is_empty() && rules.is_empty() {
        return None;
    }
    Some(FileSyntaxErrors {
        path: file.path.clone(),
        errors,
        rules,
    })
}

/// Files with at least one syntax error, keeping only the syntax errors.
pub(crate) fn syntax_error_report(summary: &TraceSummary) -> Vec<FileSyntaxErrors> {
    summary.files.iter().filter_map(file_syntax_errors).collect()
}

/// Text for the syntax error report; empty when there is nothing to show.
pub(crate) fn render_syntax_error_report(report: &[FileSyntaxErrors]) -> String {
    if report.is_empty() {
        return String::new();
    }
    let mut out = String::from("=== Rule Syntax Errors ===\n");
    for file in report {
        out.push_str(&format!("File: {}\n", file.path));
        let mut tree = Tree::new();
        for error in &file.errors {
            tree.add(format!("Error {error}"));
        }
        for rule in &file.rules {
            tree.add(format!("Rule: {}", rule.rule_id));
            for error in &rule.errors {
                tree.add_at(format!("Error {error}"), 1);
            }
        }
        out.push_str(&tree.render());
        out.push('\n');
    }
    out
}
