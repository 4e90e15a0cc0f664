use std::path::Path;

use tracing::debug;

use super::{ArtifactLocation, Location, Report, SRCROOT};

const DRIVER_NAME: &str = "Seqra";
const SOURCE_EXTENSIONS: [&str; 2] = ["java", "kt"];

/// Version metadata stamped onto the tool driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ToolVersion {
    pub(crate) analyzer_version: String,
    pub(crate) semantic_version: String,
}

impl ToolVersion {
    pub(crate) fn new(analyzer_version: impl Into<String>) -> Self {
        Self {
            analyzer_version: analyzer_version.into(),
            semantic_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn is_source_location(location: &Location) -> bool {
    location
        .uri()
        .and_then(|uri| Path::new(uri).extension())
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn point_at_srcroot(location: &mut Location) {
    match location
        .physical_location
        .as_mut()
        .and_then(|physical| physical.artifact_location.as_mut())
    {
        Some(artifact) => artifact.uri_base_id = Some(SRCROOT.to_string()),
        None => debug!("location has no physical artifact location"),
    }
}

impl Report {
    /// Drop every result and thread-flow location outside Java/Kotlin sources.
    pub(crate) fn keep_only_file_locations(&mut self) {
        for result in self.results_mut() {
            if let Some(locations) = result.locations.as_mut() {
                locations.retain(is_source_location);
            }
            for code_flow in result.code_flows.iter_mut().flatten() {
                for thread_flow in &mut code_flow.thread_flows {
                    thread_flow.locations.retain(|step| {
                        step.location.as_ref().is_some_and(is_source_location)
                    });
                }
            }
        }
    }

    pub(crate) fn keep_only_one_code_flow_element(&mut self) {
        for result in self.results_mut() {
            for code_flow in result.code_flows.iter_mut().flatten() {
                code_flow.thread_flows.truncate(1);
            }
        }
    }

    /// Anchor every location at `%SRCROOT%`, which resolves to `abs_source_root`.
    ///
    /// `abs_source_root` is expected to end with a path separator.
    pub(crate) fn update_uri_info(&mut self, abs_source_root: &str) {
        for run in &mut self.runs {
            run.original_uri_base_ids.get_or_insert_default().insert(
                SRCROOT.to_string(),
                ArtifactLocation {
                    uri: Some(abs_source_root.to_string()),
                    ..ArtifactLocation::default()
                },
            );
            for result in run.results.iter_mut().flatten() {
                for location in result.locations.iter_mut().flatten() {
                    point_at_srcroot(location);
                }
                for code_flow in result.code_flows.iter_mut().flatten() {
                    for thread_flow in &mut code_flow.thread_flows {
                        for step in &mut thread_flow.locations {
                            if let Some(location) = step.location.as_mut() {
                                point_at_srcroot(location);
                            }
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn set_tool_driver(&mut self, version: &ToolVersion) {
        for run in &mut self.runs {
            let driver = &mut run.tool.driver;
            driver.name = DRIVER_NAME.to_string();
            driver.version = Some(version.analyzer_version.clone());
            driver.semantic_version = Some(version.semantic_version.clone());
        }
    }
}
