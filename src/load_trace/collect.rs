use std::collections::{BTreeMap, BTreeSet};

use super::{LoadTrace, Reason, Step, TraceEntry};

/// Kind of problem found while loading a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum ErrorCategory {
    /// The user-authored rule is malformed.
    SyntaxError,
    /// The rule uses something the analyzer does not implement, or the
    /// analyzer failed internally.
    Unsupported,
}

impl ErrorCategory {
    pub(crate) const ALL: [ErrorCategory; 2] = [ErrorCategory::SyntaxError, ErrorCategory::Unsupported];
}

/// Category of an error entry. Non-error entries have none.
pub(crate) fn classify(entry: &TraceEntry) -> Option<ErrorCategory> {
    if !entry.is_error() {
        return None;
    }
    if entry.reason == Some(Reason::NotImplemented) {
        return Some(ErrorCategory::Unsupported);
    }
    if entry.step.is_some_and(Step::is_user_syntax_step) {
        return Some(ErrorCategory::SyntaxError);
    }
    Some(ErrorCategory::Unsupported)
}

/// A classified error entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ErrorEntry {
    pub(crate) message: String,
    pub(crate) category: ErrorCategory,
}

/// Classified errors of one scope plus the set of categories present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ScopeErrors {
    pub(crate) errors: Vec<ErrorEntry>,
    pub(crate) categories: BTreeSet<ErrorCategory>,
}

impl ScopeErrors {
    fn collect(entries: &[TraceEntry]) -> Self {
        let mut scope = Self::default();
        for entry in entries {
            let Some(category) = classify(entry) else {
                continue;
            };
            scope.errors.push(ErrorEntry {
                message: entry.message.clone(),
                category,
            });
            scope.categories.insert(category);
        }
        scope
    }

    pub(crate) fn messages_of(&self, category: ErrorCategory) -> impl Iterator<Item = &str> {
        self.errors
            .iter()
            .filter(move |error| error.category == category)
            .map(|error| error.message.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StepSummary {
    pub(crate) step: Step,
    pub(crate) errors: ScopeErrors,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RuleSummary {
    pub(crate) rule_id: String,
    pub(crate) errors: ScopeErrors,
    pub(crate) steps: Vec<StepSummary>,
}

impl RuleSummary {
    /// Categories of the rule's own entries and all of its steps.
    pub(crate) fn categories(&self) -> BTreeSet<ErrorCategory> {
        let mut categories = self.errors.categories.clone();
        for step in &self.steps {
            categories.extend(step.errors.categories.iter().copied());
        }
        categories
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FileSummary {
    pub(crate) path: String,
    pub(crate) errors: ScopeErrors,
    pub(crate) rules: Vec<RuleSummary>,
}

/// Classified view of a rule load trace, file by file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct TraceSummary {
    pub(crate) files: Vec<FileSummary>,
}

pub(crate) fn collect_trace_summary(trace: &LoadTrace) -> TraceSummary {
    let files = trace
        .file_traces
        .iter()
        .map(|file| FileSummary {
            path: file.path.clone(),
            errors: ScopeErrors::collect(&file.entries),
            rules: file
                .rule_traces
                .iter()
                .map(|rule| RuleSummary {
                    rule_id: rule.rule_id.clone(),
                    errors: ScopeErrors::collect(&rule.entries),
                    steps: rule
                        .steps
                        .iter()
                        .map(|step| StepSummary {
                            step: step.step,
                            errors: ScopeErrors::collect(&step.entries),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();
    TraceSummary { files }
}

/// Files and rules affected by each error category.
///
/// Counts presence, not frequency: a file or rule with many errors of one
/// category adds one to that category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RuleLoadErrorsAggregatedSummary {
    pub(crate) file_error_types: BTreeMap<ErrorCategory, usize>,
    pub(crate) rule_error_types: BTreeMap<ErrorCategory, usize>,
    pub(crate) total_affected_files: usize,
    pub(crate) total_affected_rules: usize,
}

impl Default for RuleLoadErrorsAggregatedSummary {
    fn default() -> Self {
        let zeroed: BTreeMap<ErrorCategory, usize> =
            ErrorCategory::ALL.iter().map(|category| (*category, 0)).collect();
        Self {
            file_error_types: zeroed.clone(),
            rule_error_types: zeroed,
            total_affected_files: 0,
            total_affected_rules: 0,
        }
    }
}

impl RuleLoadErrorsAggregatedSummary {
    pub(crate) fn files_with(&self, category: ErrorCategory) -> usize {
        self.file_error_types.get(&category).copied().unwrap_or(0)
    }

    pub(crate) fn rules_with(&self, category: ErrorCategory) -> usize {
        self.rule_error_types.get(&category).copied().unwrap_or(0)
    }

    pub(crate) fn has_issues(&self) -> bool {
        self.total_affected_files > 0 || self.total_affected_rules > 0
    }
}

/// Outcome of reading the trace: a summary, or why none is available.
pub(crate) type RuleLoadErrorsResult = Result<RuleLoadErrorsAggregatedSummary, String>;

/// Fold a trace summary into per-category file and rule counts.
///
/// A file is affected only through its own entries. Errors inside its rules
/// count toward the rule totals and never mark the file.
pub(crate) fn aggregate(summary: &TraceSummary) -> RuleLoadErrorsAggregatedSummary {
    let mut out = RuleLoadErrorsAggregatedSummary::default();
    for file in &summary.files {
        for category in &file.errors.categories {
            *out.file_error_types.entry(*category).or_default() += 1;
        }
        if !file.errors.categories.is_empty() {
            out.total_affected_files += 1;
        }

        for rule in &file.rules {
            let categories = rule.categories();
            if !categories.is_empty() {
                out.total_affected_rules += 1;
            }
            for category in categories {
                *out.rule_error_types.entry(category).or_default() += 1;
            }
        }
    }
    out
}
