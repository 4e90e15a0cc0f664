use std::path::{MAIN_SEPARATOR, Path};

use tracing::{debug, error};

use crate::sarif::Report;

/// Working-directory relative start of the user supplied ruleset argument.
pub(crate) fn rule_id_path_start(user_ruleset_arg: &str, work_dir: &str) -> String {
    if user_ruleset_arg.is_empty() {
        return String::new();
    }
    let start = user_ruleset_arg
        .strip_prefix(work_dir)
        .unwrap_or(user_ruleset_arg);
    start
        .strip_suffix(MAIN_SEPARATOR)
        .unwrap_or(start)
        .to_string()
}

pub(crate) fn rule_id_path_start_from_cwd(user_ruleset_arg: &str) -> String {
    let work_dir = match std::env::current_dir() {
        Ok(dir) => dir.to_string_lossy().into_owned(),
        Err(err) => {
            error!("failed to resolve working directory: {err}");
            String::new()
        }
    };
    rule_id_path_start(user_ruleset_arg, &work_dir)
}

/// Convert `dir/sub/file.yml:rule` into the dotted id `dir.sub.rule`.
///
/// Runs once per id: the output has no `:` left, so feeding it back in is
/// reported as an error and returns the input unchanged.
pub(crate) fn semgrep_rule_id(internal_id: &str) -> String {
    let Some((rule_path, bare_id)) = internal_id.rsplit_once(':') else {
        error!("can't convert to semgrep rule id format: '{internal_id}' doesn't contain ':'");
        return internal_id.to_string();
    };
    let cleaned: String = rule_path
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let mut dirs: Vec<&str> = cleaned.split(MAIN_SEPARATOR).collect();
    dirs.pop();
    let joined = format!("{}.{bare_id}", dirs.join("."));
    joined.trim_start_matches('.').to_string()
}

impl Report {
    /// Rewrite every result rule id and rule definition into semgrep form.
    pub(crate) fn update_rule_ids(&mut self, abs_ruleset_root: &Path, user_ruleset_arg: &str) {
        let rule_start = rule_id_path_start_from_cwd(user_ruleset_arg);
        debug!(
            ruleset_root = %abs_ruleset_root.display(),
            rule_start = %rule_start,
            "remapping rule ids"
        );
        for run in &mut self.runs {
            for result in run.results.iter_mut().flatten() {
                if let Some(rule_id) = result.rule_id.as_mut() {
                    *rule_id = semgrep_rule_id(rule_id);
                }
            }
            for rule in run.tool.driver.rules.iter_mut().flatten() {
                rule.id = semgrep_rule_id(&rule.id);
                if let Some(name) = rule.name.as_mut() {
                    *name = semgrep_rule_id(name);
                }
            }
        }
    }
}
