mod findings;
mod sanitize;
mod summary;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

pub(crate) use findings::render_findings;
pub(crate) use sanitize::ToolVersion;
pub(crate) use summary::{Summary, generate_summary};

/// Symbolic base id used for source-root relative locations.
pub(crate) const SRCROOT: &str = "%SRCROOT%";

pub(crate) const LEVEL_ERROR: &str = "error";
pub(crate) const LEVEL_WARNING: &str = "warning";
pub(crate) const LEVEL_NOTE: &str = "note";

/// Members the model does not name explicitly, kept verbatim for rewrites.
type Extra = BTreeMap<String, Value>;

/// SARIF log as emitted by the analyzer.
///
/// Only the members the front end reads or rewrites are typed. Everything
/// else lands in `extra` and is written back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Report {
    #[serde(default, rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub(crate) schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) version: Option<String>,
    #[serde(default)]
    pub(crate) runs: Vec<Run>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Run {
    #[serde(default)]
    pub(crate) tool: Tool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) results: Option<Vec<SarifResult>>,
    #[serde(
        default,
        rename = "originalUriBaseIds",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) original_uri_base_ids: Option<BTreeMap<String, ArtifactLocation>>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Tool {
    #[serde(default)]
    pub(crate) driver: ToolComponent,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolComponent {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) semantic_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) rules: Option<Vec<ReportingDescriptor>>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

/// Rule definition listed by the tool driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ReportingDescriptor {
    #[serde(default)]
    pub(crate) id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

/// A single finding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SarifResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) rule_id: Option<String>,
    #[serde(default)]
    pub(crate) message: Message,
    /// Free-form: the analyzer is allowed to emit an empty level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) locations: Option<Vec<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) code_flows: Option<Vec<CodeFlow>>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) physical_location: Option<PhysicalLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) logical_locations: Option<Vec<LogicalLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<Message>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PhysicalLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) artifact_location: Option<ArtifactLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) region: Option<Region>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ArtifactLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) uri: Option<String>,
    #[serde(
        default,
        rename = "uriBaseId",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) uri_base_id: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Region {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) start_line: Option<i64>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogicalLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) fully_qualified_name: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CodeFlow {
    #[serde(default)]
    pub(crate) thread_flows: Vec<ThreadFlow>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

/// One execution path from taint source to sink.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ThreadFlow {
    #[serde(default)]
    pub(crate) locations: Vec<ThreadFlowLocation>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThreadFlowLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) location: Option<Location>,
    /// Ordering key of the step within the flow; array order is not authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) execution_order: Option<i64>,
    #[serde(flatten)]
    pub(crate) extra: Extra,
}

impl Report {
    #[cfg(test)]
    pub(crate) fn results(&self) -> impl Iterator<Item = &SarifResult> {
        self.runs
            .iter()
            .flat_map(|run| run.results.as_deref().unwrap_or_default())
    }

    pub(crate) fn results_mut(&mut self) -> impl Iterator<Item = &mut SarifResult> {
        self.runs
            .iter_mut()
            .flat_map(|run| run.results.as_deref_mut().unwrap_or_default())
    }
}

impl Location {
    /// URI of the artifact this location points at, if any.
    pub(crate) fn uri(&self) -> Option<&str> {
        self.physical_location
            .as_ref()
            .and_then(|physical| physical.artifact_location.as_ref())
            .and_then(|artifact| artifact.uri.as_deref())
    }

    pub(crate) fn start_line(&self) -> Option<i64> {
        self.physical_location
            .as_ref()
            .and_then(|physical| physical.region.as_ref())
            .and_then(|region| region.start_line)
    }
}

/// Parse a SARIF document, reporting the JSON path of the first bad member.
pub(crate) fn parse(data: &[u8]) -> Result<Report> {
    let mut deserializer = serde_json::Deserializer::from_slice(data);
    let report: Report = serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|err| anyhow::anyhow!("failed to parse SARIF at {}: {}", err.path(), err.inner()))?;
    Ok(report)
}

pub(crate) fn load(path: &Path) -> Result<Report> {
    let data = fs::read(path)
        .with_context(|| format!("failed to read SARIF report {}", path.display()))?;
    parse(&data).with_context(|| format!("invalid SARIF report {}", path.display()))
}

/// Temporary file in `dir` carrying the mode `target` will end up with: the
/// existing target's mode, or `0o666` minus the umask for a new file.
fn staging_file(dir: &Path, target: &Path) -> Result<NamedTempFile> {
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let file = builder
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    if let Ok(metadata) = fs::metadata(target) {
        file.as_file()
            .set_permissions(metadata.permissions())
            .with_context(|| format!("failed to copy permissions of {}", target.display()))?;
    }
    Ok(file)
}

/// Write the report as indented JSON.
///
/// The content goes to a temporary file next to `path` first and is renamed
/// over the target once fully written, so a failed write leaves any existing
/// report intact.
pub(crate) fn write_file(report: &Report, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;
    let mut file = staging_file(dir, path)?;
    serde_json::to_writer_pretty(&mut file, report).context("failed to encode SARIF")?;
    file.write_all(b"\n").context("failed to write SARIF")?;
    file.flush().context("failed to flush SARIF")?;
    file.persist(path)
        .with_context(|| format!("failed to write SARIF report {}", path.display()))?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
  "$schema": "https://json.schemastore.org/sarif-2.1.0.json",
  "version": "2.1.0",
  "runs": [
    {
      "tool": {
        "driver": {
          "name": "analyzer",
          "rules": [{"id": "java/sql.yml:sqli", "name": "java/sql.yml:sqli", "shortDescription": {"text": "SQL"}}]
        }
      },
      "results": [
        {
          "ruleId": "java/sql.yml:sqli",
          "level": "",
          "message": {"text": "tainted query"},
          "locations": [
            {
              "physicalLocation": {
                "artifactLocation": {"uri": "src/Main.java"},
                "region": {"startLine": 12, "startColumn": 3}
              },
              "logicalLocations": [{"fullyQualifiedName": "Main#run"}]
            }
          ],
          "codeFlows": [
            {"threadFlows": [{"locations": [{"executionOrder": 1, "location": {"message": {"text": "source"}}}]}]}
          ]
        }
      ]
    }
  ]
}"#;

    #[test]
    fn parse_reads_typed_members_and_keeps_the_rest() {
        let report = parse(SAMPLE.as_bytes()).expect("parse sample");

        assert_eq!(report.version.as_deref(), Some("2.1.0"));
        assert_eq!(
            report.schema.as_deref(),
            Some("https://json.schemastore.org/sarif-2.1.0.json")
        );
        assert!(report.extra.is_empty());
        let result = report.results().next().expect("one result");
        assert_eq!(result.rule_id.as_deref(), Some("java/sql.yml:sqli"));
        assert_eq!(result.level.as_deref(), Some(""));
        let location = &result.locations.as_ref().expect("locations")[0];
        assert_eq!(location.uri(), Some("src/Main.java"));
        assert_eq!(location.start_line(), Some(12));
        let region = location
            .physical_location
            .as_ref()
            .and_then(|physical| physical.region.as_ref())
            .expect("region");
        assert_eq!(region.extra.get("startColumn"), Some(&json!(3)));
    }

    #[test]
    fn parse_accepts_null_arrays() {
        let report = parse(br#"{"runs":[{"tool":{"driver":{"name":"x"}},"results":null}]}"#)
            .expect("parse");

        assert_eq!(report.results().count(), 0);
    }

    #[test]
    fn parse_reports_path_of_malformed_member() {
        let err = parse(br#"{"runs":[{"results":[{"ruleId":7}]}]}"#).expect_err("must fail");

        let message = err.to_string();
        assert!(message.starts_with("failed to parse SARIF at"), "{message}");
        assert!(message.contains("expected a string"), "{message}");
    }

    #[test]
    fn parse_rejects_truncated_json() {
        assert!(parse(br#"{"runs":[{"tool":"#).is_err());
    }

    #[test]
    fn serialized_report_parses_back_equal() {
        let report = parse(SAMPLE.as_bytes()).expect("parse sample");

        let encoded = serde_json::to_vec(&report).expect("serialize");
        let decoded = parse(&encoded).expect("parse again");

        assert_eq!(report, decoded);
    }

    #[test]
    fn write_file_uses_two_space_indent_without_html_escaping() {
        let mut result = result("a.yml:x", Some("note"), vec![location("A.java", 1)]);
        result.message.text = Some("<script> & friends".to_string());
        let report = report(vec![result], &["a.yml:x"]);
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.sarif");

        write_file(&report, &path).expect("write report");

        let written = fs::read_to_string(&path).expect("read back");
        assert!(written.starts_with("{\n  \"runs\""), "{written}");
        assert!(written.contains("<script> & friends"));
        assert!(written.ends_with("}\n"));
        assert_eq!(load(&path).expect("load"), report);
    }

    #[test]
    fn write_file_replaces_existing_report() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("report.sarif");
        fs::write(&path, SAMPLE).expect("seed report");
        let mut report = load(&path).expect("load");
        report.runs[0].tool.driver.name = "Seqra".to_string();

        write_file(&report, &path).expect("rewrite");

        assert_eq!(load(&path).expect("reload").runs[0].tool.driver.name, "Seqra");
        let leftovers = fs::read_dir(dir.path()).expect("list").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn write_file_keeps_header_members_ahead_of_runs() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("report.sarif");
        let report = parse(SAMPLE.as_bytes()).expect("parse sample");

        write_file(&report, &path).expect("write report");

        let written = fs::read_to_string(&path).expect("read back");
        let schema = written.find("\"$schema\"").expect("schema written");
        let version = written.find("\"version\"").expect("version written");
        let runs = written.find("\"runs\"").expect("runs written");
        assert!(schema < version && version < runs, "{written}");
    }

    #[cfg(unix)]
    #[test]
    fn write_file_keeps_mode_of_existing_report() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("report.sarif");
        fs::write(&path, SAMPLE).expect("seed report");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");
        let report = load(&path).expect("load");

        write_file(&report, &path).expect("rewrite");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn write_file_creates_new_report_like_a_plain_create() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("temp dir");
        let reference = dir.path().join("reference");
        fs::File::create(&reference).expect("create reference");
        let path = dir.path().join("new.sarif");

        write_file(&Report::default(), &path).expect("write report");

        let mode_of = |path: &Path| {
            fs::metadata(path).expect("metadata").permissions().mode() & 0o777
        };
        assert_eq!(mode_of(&path), mode_of(&reference));
    }

    #[test]
    fn load_missing_file_mentions_path() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("missing.sarif");

        let err = load(&path).expect_err("must fail");

        assert!(format!("{err:#}").contains("missing.sarif"));
    }
}
