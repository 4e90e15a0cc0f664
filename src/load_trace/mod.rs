mod collect;
mod path;
mod statistics;
mod syntax_errors;

use std::fs;
use std::path::Path as FsPath;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize};

pub(crate) use collect::{RuleLoadErrorsResult, TraceSummary, aggregate, collect_trace_summary};
pub(crate) use path::TracePathBuilder;
pub(crate) use statistics::{RuleStatistics, Verbosity};
pub(crate) use syntax_errors::{render_syntax_error_report, syntax_error_report};

/// Pipeline step at which the analyzer compiles a rule.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum Step {
    LoadRuleset,
    BuildConvertToRawRule,
    BuildParseSemgrepRule,
    BuildMetaVarResolving,
    BuildActionListConversion,
    BuildTransformToAutomata,
    AutomataToTaintRule,
    #[default]
    #[serde(other)]
    Other,
}

impl Step {
    /// Steps where a malformed user rule surfaces.
    pub(crate) fn is_user_syntax_step(self) -> bool {
        matches!(
            self,
            Step::LoadRuleset | Step::BuildConvertToRawRule | Step::BuildParseSemgrepRule
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum Reason {
    Error,
    Warning,
    NotImplemented,
    #[serde(other)]
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum EntryType {
    Info,
    Error,
    #[serde(other)]
    Other,
}

/// Trace of rule loading for a whole ruleset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoadTrace {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) file_traces: Vec<FileTrace>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileTrace {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) rule_traces: Vec<RuleTrace>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) entries: Vec<TraceEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RuleTrace {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) rule_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) rule_id_in_file: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) steps: Vec<StepTrace>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) entries: Vec<TraceEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct StepTrace {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) step: Step,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) entries: Vec<TraceEntry>,
}

/// Info or error record. Errors carry the step and reason they were raised with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct TraceEntry {
    #[serde(rename = "type")]
    pub(crate) entry_type: EntryType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) step: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) reason: Option<Reason>,
}

impl TraceEntry {
    #[cfg(test)]
    pub(crate) fn info(message: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Info,
            message: message.into(),
            step: None,
            reason: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn error(step: Step, reason: Reason, message: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Error,
            message: message.into(),
            step: Some(step),
            reason: Some(reason),
        }
    }

    pub(crate) fn is_error(&self) -> bool {
        self.entry_type == EntryType::Error
    }

    pub(crate) fn is_info(&self) -> bool {
        self.entry_type == EntryType::Info
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.is_error() || self.is_info() {
            return Ok(());
        }
        bail!("unknown trace entry type in entry '{}'", self.message)
    }
}

/// `null` reads as the type's default, like an absent member.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn parse(data: &[u8]) -> Result<LoadTrace> {
    let mut deserializer = serde_json::Deserializer::from_slice(data);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        anyhow::anyhow!(
            "failed to parse rule load trace at {}: {}",
            err.path(),
            err.inner()
        )
    })
}

pub(crate) fn load(path: &FsPath) -> Result<LoadTrace> {
    let data = fs::read(path)
        .with_context(|| format!("failed to read rule load trace {}", path.display()))?;
    parse(&data).with_context(|| format!("invalid rule load trace {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TRACE: &str = r#"{
  "fileTraces": [
    {
      "path": "rules/java/sql.yml",
      "entries": [{"type": "Info", "message": "loaded"}],
      "ruleTraces": [
        {
          "ruleId": "java.sql.sqli",
          "ruleIdInFile": "sqli",
          "entries": null,
          "steps": [
            {
              "step": "BUILD_PARSE_SEMGREP_RULE",
              "entries": [{"type": "Error", "message": "bad pattern", "step": "BUILD_PARSE_SEMGREP_RULE", "reason": "ERROR"}]
            },
            {"step": "SOMETHING_NEW", "entries": []}
          ]
        }
      ]
    },
    {"path": "rules/empty.yml", "ruleTraces": null, "entries": null}
  ]
}"#;

    #[test]
    fn parse_reads_nested_traces() {
        let trace = parse(TRACE.as_bytes()).expect("parse trace");

        assert_eq!(trace.file_traces.len(), 2);
        let file = &trace.file_traces[0];
        assert_eq!(file.path, "rules/java/sql.yml");
        assert!(file.entries[0].is_info());
        let rule = &file.rule_traces[0];
        assert_eq!(rule.rule_id_in_file, "sqli");
        assert!(rule.entries.is_empty());
        assert_eq!(rule.steps[0].step, Step::BuildParseSemgrepRule);
        assert_eq!(rule.steps[1].step, Step::Other);
        assert_eq!(
            rule.steps[0].entries[0],
            TraceEntry::error(Step::BuildParseSemgrepRule, Reason::Error, "bad pattern")
        );
        assert!(trace.file_traces[1].rule_traces.is_empty());
    }

    #[test]
    fn parse_tolerates_missing_file_traces() {
        assert!(parse(b"{}").expect("empty").file_traces.is_empty());
        assert!(parse(br#"{"fileTraces": null}"#).expect("null").file_traces.is_empty());
    }

    #[test]
    fn parse_tolerates_null_message_and_missing_step() {
        let trace = parse(
            br#"{"fileTraces": [{"path": null, "ruleTraces": [{"ruleId": "r", "steps": [
                {"entries": [{"type": "Error", "message": null, "reason": "ERROR"}]},
                {"step": null, "entries": []}
            ]}]}]}"#,
        )
        .expect("parse trace");

        let file = &trace.file_traces[0];
        assert_eq!(file.path, "");
        let steps = &file.rule_traces[0].steps;
        assert_eq!(steps[0].step, Step::Other);
        assert_eq!(steps[0].entries[0].message, "");
        assert!(steps[0].entries[0].is_error());
        assert_eq!(steps[1].step, Step::Other);
    }

    #[test]
    fn unknown_reason_and_type_deserialize_as_other() {
        let entry: TraceEntry =
            serde_json::from_str(r#"{"type": "Debug", "message": "m", "reason": "TIMEOUT"}"#)
                .expect("entry");

        assert_eq!(entry.entry_type, EntryType::Other);
        assert_eq!(entry.reason, Some(Reason::Other));
        assert!(entry.validate().is_err());
        assert!(TraceEntry::info("ok").validate().is_ok());
    }

    #[test]
    fn info_entry_serializes_without_step_and_reason() {
        let encoded = serde_json::to_string(&TraceEntry::info("loaded")).expect("serialize");

        assert_eq!(encoded, r#"{"type":"Info","message":"loaded"}"#);
    }

    #[test]
    fn user_syntax_steps() {
        assert!(Step::LoadRuleset.is_user_syntax_step());
        assert!(Step::BuildConvertToRawRule.is_user_syntax_step());
        assert!(Step::BuildParseSemgrepRule.is_user_syntax_step());
        assert!(!Step::BuildMetaVarResolving.is_user_syntax_step());
        assert!(!Step::AutomataToTaintRule.is_user_syntax_step());
        assert!(!Step::Other.is_user_syntax_step());
    }

    #[test]
    fn load_rejects_malformed_trace_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("trace.json");
        fs::write(&path, "{\"fileTraces\": [").expect("write trace");

        let err = load(&path).expect_err("must fail");

        assert!(format!("{err:#}").contains("trace.json"));
    }
}
