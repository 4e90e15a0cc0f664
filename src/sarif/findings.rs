use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, warn};

use super::{Location, Report, SRCROOT, SarifResult, ThreadFlowLocation};
use crate::tree::Tree;

/// Display data extracted from a SARIF location.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct NodeLoc {
    pub(crate) rel_file_path: String,
    pub(crate) file_name: String,
    pub(crate) method: String,
    pub(crate) line: i64,
}

impl NodeLoc {
    pub(crate) fn from_location(location: &Location) -> Self {
        let Some(uri) = location.uri() else {
            warn!("location has no physical artifact URI");
            return Self::default();
        };
        let rel_file_path = uri.replace('\\', "/");
        let file_name = rel_file_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let line = location.start_line().unwrap_or_else(|| {
            warn!("location has no region start line");
            -1
        });
        let method = match location
            .logical_locations
            .as_deref()
            .and_then(|logical| logical.first())
        {
            Some(logical) => logical
                .fully_qualified_name
                .as_deref()
                .map(|name| format!(" {name}"))
                .unwrap_or_default(),
            None => {
                warn!("location has no logical locations, unable to extract method name");
                String::new()
            }
        };
        Self {
            rel_file_path,
            file_name,
            method,
            line,
        }
    }

    pub(crate) fn display(&self) -> String {
        format!("{}:{}", self.rel_file_path, self.line)
    }
}

impl Report {
    /// Absolute source root of a run, as recorded under `%SRCROOT%`.
    pub(crate) fn project_path(&self, run_index: usize) -> Result<&str> {
        let run = self
            .runs
            .get(run_index)
            .ok_or_else(|| anyhow!("report has no run #{run_index}"))?;
        let base = run
            .original_uri_base_ids
            .as_ref()
            .and_then(|ids| ids.get(SRCROOT))
            .ok_or_else(|| anyhow!("{SRCROOT} not found in originalUriBaseIds"))?;
        base.uri
            .as_deref()
            .ok_or_else(|| anyhow!("{SRCROOT} base has no URI"))
    }
}

/// Steps of the first thread flow ordered source to sink by execution order.
pub(crate) fn taint_flow(result: &SarifResult) -> Result<Vec<&ThreadFlowLocation>> {
    let Some(code_flow) = result.code_flows.as_deref().and_then(|flows| flows.first()) else {
        bail!("result has no codeFlows");
    };
    let Some(thread_flow) = code_flow.thread_flows.first() else {
        bail!("result has codeFlows but no threadFlows");
    };
    if thread_flow.locations.is_empty() {
        bail!("threadFlow has no locations");
    }
    let mut steps: Vec<&ThreadFlowLocation> = thread_flow.locations.iter().collect();
    steps.sort_by_key(|step| {
        step.execution_order.unwrap_or_else(|| {
            warn!("missing executionOrder in taint step; treating as 0");
            0
        })
    });
    Ok(steps)
}

pub(crate) fn level_indicator(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "error" => "[ERROR]",
        "warning" => "[WARNING]",
        "note" => "[NOTE]",
        _ => "[UNKNOWN]",
    }
}

/// Renders source lines around a finding.
#[derive(Clone, Debug)]
pub(crate) struct SnippetLoader {
    radius: i64,
    marker: String,
}

impl Default for SnippetLoader {
    fn default() -> Self {
        Self {
            radius: 3,
            marker: ">>".to_string(),
        }
    }
}

impl SnippetLoader {
    #[cfg(test)]
    pub(crate) fn radius(mut self, radius: i64) -> Self {
        self.radius = radius;
        self
    }

    pub(crate) fn load(&self, path: &Path, center_line: i64) -> Result<String> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let lines: Vec<&str> = content.split('\n').collect();
        let start = center_line.saturating_sub(self.radius).saturating_sub(1).max(0);
        let end = center_line
            .saturating_add(self.radius)
            .saturating_sub(1)
            .min(lines.len() as i64 - 1);
        let mut out = String::new();
        for index in start..=end {
            let number = index + 1;
            let marker = if number == center_line {
                self.marker.as_str()
            } else {
                "  "
            };
            out.push_str(&format!(
                "| {marker:>2} {number:>4} {}\n",
                lines[index as usize]
            ));
        }
        Ok(out)
    }
}

fn snippet_for(location: &Location, project_path: &str, loader: &SnippetLoader) -> Option<String> {
    let uri = location.uri()?;
    let path = Path::new(project_path).join(uri);
    let line = NodeLoc::from_location(location).line;
    match loader.load(&path, line) {
        Ok(snippet) if !snippet.is_empty() => Some(snippet),
        Ok(_) => None,
        Err(err) => {
            warn!("failed to load code snippet: {err:#}");
            None
        }
    }
}

fn step_message(step: &ThreadFlowLocation) -> String {
    match step
        .location
        .as_ref()
        .and_then(|location| location.message.as_ref())
        .and_then(|message| message.text.as_deref())
    {
        Some(text) => text.to_string(),
        None => {
            warn!("threadFlowLocation has no message text");
            String::new()
        }
    }
}

/// Tree for one finding, or `None` when it cannot be shown.
pub(crate) fn render_finding(
    report: &Report,
    run_index: usize,
    result: &SarifResult,
    show_snippets: bool,
) -> Option<Tree> {
    let project_path = match report.project_path(run_index) {
        Ok(path) => path,
        Err(err) => {
            error!("project path lookup failed: {err}");
            return None;
        }
    };
    let Some(primary) = result
        .locations
        .as_deref()
        .and_then(|locations| locations.first())
        .filter(|location| location.physical_location.is_some())
    else {
        warn!("no primary location for finding");
        return None;
    };

    let level = result.level.as_deref().unwrap_or_else(|| {
        warn!("finding has no level; defaulting to 'unknown'");
        "unknown"
    });
    let rule = result.rule_id.as_deref().unwrap_or_else(|| {
        warn!("finding has no ruleId");
        "<unknown>"
    });
    let message = result.message.text.as_deref().unwrap_or_else(|| {
        warn!("finding has no message text");
        ""
    });

    let loader = SnippetLoader::default();
    let mut tree = Tree::new();
    tree.add(level_indicator(level))
        .add_at(format!("Rule: {rule}"), 1)
        .add_at(format!("Message: {message}"), 1)
        .add_at(
            format!("Location: {}", NodeLoc::from_location(primary).display()),
            1,
        );

    let steps = match taint_flow(result) {
        Ok(steps) => steps,
        Err(err) => {
            debug!("no source/sink: {err}");
            if show_snippets {
                if let Some(snippet) = snippet_for(primary, project_path, &loader) {
                    tree.add_at(snippet, 2);
                }
            }
            return Some(tree);
        }
    };

    tree.add_at("Code Flow", 1);
    let last = steps.len() - 1;
    for (index, step) in steps.iter().enumerate() {
        let loc = step
            .location
            .as_ref()
            .map(NodeLoc::from_location)
            .unwrap_or_default();
        tree.add_at(format!("{}{}", step_message(step), loc.method), 2)
            .add_at(loc.display(), 3);
        let is_endpoint = index == 0 || index == last;
        if is_endpoint && show_snippets {
            if let Some(snippet) = step
                .location
                .as_ref()
                .and_then(|location| snippet_for(location, project_path, &loader))
            {
                tree.add_at(snippet, 3);
            }
        }
    }
    Some(tree)
}

/// Render every finding that has a primary location.
pub(crate) fn render_findings(report: &Report, show_snippets: bool) -> String {
    let mut blocks = Vec::new();
    for (run_index, run) in report.runs.iter().enumerate() {
        for result in run.results.iter().flatten() {
            if let Some(tree) = render_finding(report, run_index, result, show_snippets) {
                blocks.push(tree.render());
            }
        }
    }
    blocks.join("\n")
}
