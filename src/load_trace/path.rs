use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::macros::format_description;

/// Where the analyzer writes its rule load trace.
#[derive(Clone, Debug)]
pub(crate) struct TracePathBuilder {
    base_dir: PathBuf,
    sub_dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl Default for TracePathBuilder {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir(),
            sub_dir: Path::new("seqra").join("rule_load_trace"),
            prefix: String::new(),
            suffix: ".json".to_string(),
        }
    }
}

impl TracePathBuilder {
    pub(crate) fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub(crate) fn sub_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sub_dir = dir.into();
        self
    }

    pub(crate) fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub(crate) fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Create the trace directory and return a timestamped file path in it.
    pub(crate) fn build(&self) -> Result<PathBuf> {
        self.build_at(OffsetDateTime::now_utc())
    }

    fn build_at(&self, now: OffsetDateTime) -> Result<PathBuf> {
        let dir = self.base_dir.join(&self.sub_dir);
        let stamp = now
            .format(format_description!(
                "[year]-[month]-[day]_[hour]-[minute]-[second]"
            ))
            .context("failed to format trace timestamp")?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create trace directory {}", dir.display()))?;
        Ok(dir.join(format!("{}{stamp}{}", self.prefix, self.suffix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[test]
    fn build_creates_directory_and_names_file_by_time() {
        let dir = tempdir().expect("temp dir");
        let builder = TracePathBuilder::default()
            .base_dir(dir.path())
            .sub_dir("traces")
            .prefix("scan-")
            .suffix(".trace.json");

        let path = builder
            .build_at(datetime!(2025-03-07 09:05:01 UTC))
            .expect("build path");

        assert_eq!(
            path,
            dir.path().join("traces").join("scan-2025-03-07_09-05-01.trace.json")
        );
        assert!(dir.path().join("traces").is_dir());
    }

    #[test]
    fn default_layout_lives_under_temp_dir() {
        let dir = tempdir().expect("temp dir");

        let path = TracePathBuilder::default()
            .base_dir(dir.path())
            .build()
            .expect("build path");

        assert!(path.starts_with(dir.path().join("seqra").join("rule_load_trace")));
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("json"));
    }
}
