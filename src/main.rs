mod load_trace;
mod sarif;
mod semgrep;
mod telemetry;
mod tree;

use std::io::{self, Write};
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use opentelemetry::KeyValue;
use tracing::{error, info, warn};

use crate::load_trace::{
    RuleLoadErrorsResult, RuleStatistics, TracePathBuilder, TraceSummary, Verbosity, aggregate,
    collect_trace_summary, render_syntax_error_report, syntax_error_report,
};
use crate::sarif::{Report, Summary, ToolVersion, generate_summary, render_findings};
use crate::telemetry::{Telemetry, current_trace_id, init_logging, with_span};

/// CLI arguments for seqra execution.
#[derive(Parser, Debug)]
#[command(
    name = "seqra",
    about = "Post-process Seqra analyzer output: SARIF rewriting, summaries and rule load diagnostics.",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "OTLP HTTP collector URL (recommended: http://localhost:4318/)."
    )]
    otel: Option<String>,
    #[arg(long, global = true, value_enum, default_value_t = Verbosity::Info)]
    verbosity: Verbosity,
    #[command(subcommand)]
    command: Command,
}

/// Subcommands supported by the CLI.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print a summary of a SARIF file.
    Summary(SummaryArgs),
    /// Rewrite an analyzer SARIF report and report rule load problems.
    Process(ProcessArgs),
    /// Print a fresh path for the analyzer's rule load trace.
    TracePath(TracePathArgs),
}

#[derive(Args, Debug, Clone)]
struct SummaryArgs {
    #[arg(value_name = "SARIF")]
    sarif: PathBuf,
    #[arg(long, help = "Show all findings from the SARIF file.")]
    show_findings: bool,
    #[arg(long, hide = true, help = "Show code snippets for findings.")]
    show_code_snippets: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct TracePathArgs {
    #[arg(long, value_name = "DIR", help = "Base directory. Defaults to the system temp dir.")]
    base_dir: Option<PathBuf>,
    #[arg(
        long,
        value_name = "DIR",
        help = "Directory under the base. Defaults to seqra/rule_load_trace."
    )]
    sub_dir: Option<PathBuf>,
    #[arg(long, value_name = "TEXT", help = "Text placed before the timestamp.")]
    prefix: Option<String>,
    #[arg(long, value_name = "TEXT", help = "Text placed after the timestamp. Defaults to .json.")]
    suffix: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct ProcessArgs {
    #[arg(long, value_name = "PATH", help = "SARIF report produced by the analyzer.")]
    sarif: PathBuf,
    #[arg(
        long,
        value_name = "DIR",
        help = "Source root the report locations are relative to."
    )]
    project: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        default_value = "",
        help = "Ruleset argument as given to the scan. Used for semgrep rule ids."
    )]
    ruleset: String,
    #[arg(
        long,
        value_name = "DIR",
        help = "Absolute ruleset root. Defaults to --ruleset resolved against the working directory."
    )]
    ruleset_root: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Rule load trace written by the analyzer.")]
    load_trace: Option<PathBuf>,
    #[arg(long, help = "Rewrite rule ids into semgrep dotted form.")]
    semgrep_compatibility: bool,
    #[arg(
        long,
        value_name = "VERSION",
        default_value = "unknown",
        help = "Analyzer version stamped onto the SARIF tool driver."
    )]
    analyzer_version: String,
    #[arg(
        long,
        value_name = "PATH",
        help = "Where to write the rewritten report. Defaults to rewriting --sarif in place."
    )]
    output: Option<PathBuf>,
    #[arg(long, help = "Show all findings after processing.")]
    show_findings: bool,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            std::process::ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbosity);
    let telemetry = match &cli.otel {
        Some(url) => Some(Telemetry::new(url)?),
        None => None,
    };
    let result = with_span(
        telemetry.as_ref(),
        "execution",
        &[KeyValue::new("seqra.command", command_name(&cli.command))],
        || {
            if let Some(trace_id) = current_trace_id() {
                eprintln!("trace-id={trace_id}");
            }
            match &cli.command {
                Command::Summary(args) => run_summary(args),
                Command::Process(args) => run_process(args, cli.verbosity, telemetry.as_ref()),
                Command::TracePath(args) => run_trace_path(args),
            }
        },
    );

    if let Some(telemetry) = telemetry {
        if let Err(err) = telemetry.shutdown() {
            error!("telemetry shutdown failed: {err}");
        }
    }

    result
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Summary(_) => "summary",
        Command::Process(_) => "process",
        Command::TracePath(_) => "trace-path",
    }
}

fn run_summary(args: &SummaryArgs) -> Result<()> {
    let mut report = sarif::load(&args.sarif)?;
    let mut out = io::stdout().lock();
    if args.show_findings {
        writeln!(out, "{}", render_findings(&report, args.show_code_snippets))
            .context("failed to write findings")?;
    }
    let summary = generate_summary(&mut report);
    write_summary(&mut out, &summary)
}

fn run_process(
    args: &ProcessArgs,
    verbosity: Verbosity,
    telemetry: Option<&Telemetry>,
) -> Result<()> {
    let trace_summary = args.load_trace.as_deref().map(|path| {
        with_span(
            telemetry,
            "load_trace",
            &[KeyValue::new("seqra.phase", "load_trace")],
            || load_trace_summary(path),
        )
    });
    let load_errors: Option<RuleLoadErrorsResult> = trace_summary.as_ref().map(|loaded| {
        loaded
            .as_ref()
            .map(aggregate)
            .map_err(|err| format!("{err:#}"))
    });

    let mut report = sarif::load(&args.sarif)?;
    with_span(
        telemetry,
        "sarif.rewrite",
        &[KeyValue::new("seqra.phase", "rewrite")],
        || rewrite_report(&mut report, args),
    )?;
    let output = args.output.as_deref().unwrap_or(&args.sarif);
    with_span(
        telemetry,
        "sarif.write",
        &[KeyValue::new("seqra.phase", "write")],
        || sarif::write_file(&report, output),
    )?;
    info!("wrote processed report to {}", output.display());

    let summary = generate_summary(&mut report);
    let mut statistics = RuleStatistics::new()
        .with_load_errors(load_errors.as_ref())
        .with_summary(&summary)
        .verbosity(verbosity);
    if let Some(path) = &args.load_trace {
        statistics = statistics.with_trace_path(path);
    }

    let mut out = io::stdout().lock();
    writeln!(out, "=== Rule Statistics ===").context("failed to write statistics")?;
    write!(out, "{}", statistics.build().render()).context("failed to write statistics")?;
    writeln!(out).context("failed to write statistics")?;
    if let Some(Ok(trace_summary)) = &trace_summary {
        write!(
            out,
            "{}",
            render_syntax_error_report(&syntax_error_report(trace_summary))
        )
        .context("failed to write syntax errors")?;
    }
    if args.show_findings {
        writeln!(out, "{}", render_findings(&report, false)).context("failed to write findings")?;
    }
    write_summary(&mut out, &summary)
}

fn load_trace_summary(path: &Path) -> Result<TraceSummary> {
    let trace = load_trace::load(path)?;
    for file in &trace.file_traces {
        for entry in &file.entries {
            if let Err(err) = entry.validate() {
                warn!("{}: {err}", file.path);
            }
        }
    }
    Ok(collect_trace_summary(&trace))
}

fn rewrite_report(report: &mut Report, args: &ProcessArgs) -> Result<()> {
    report.keep_only_file_locations();
    report.keep_only_one_code_flow_element();
    report.set_tool_driver(&ToolVersion::new(args.analyzer_version.as_str()));
    report.update_uri_info(&source_root_uri(&args.project)?);
    if args.semgrep_compatibility {
        let ruleset_root = match &args.ruleset_root {
            Some(root) => root.clone(),
            None if args.ruleset.is_empty() => PathBuf::new(),
            None => std::path::absolute(&args.ruleset)
                .with_context(|| format!("failed to resolve ruleset {}", args.ruleset))?,
        };
        report.update_rule_ids(&ruleset_root, &args.ruleset);
    }
    Ok(())
}

/// Drop `.` and resolve `..` textually, without touching the filesystem.
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => cleaned.push(component),
            },
            _ => cleaned.push(component),
        }
    }
    cleaned
}

/// Absolute project root with a trailing separator, as `%SRCROOT%` expects.
fn source_root_uri(project: &Path) -> Result<String> {
    let absolute = std::path::absolute(project)
        .with_context(|| format!("failed to resolve project {}", project.display()))?;
    let mut uri = clean_path(&absolute).to_string_lossy().into_owned();
    if !uri.ends_with(MAIN_SEPARATOR) {
        uri.push(MAIN_SEPARATOR);
    }
    Ok(uri)
}

fn write_summary(out: &mut impl Write, summary: &Summary) -> Result<()> {
    for line in summary.lines() {
        writeln!(out, "{line}").context("failed to write summary")?;
    }
    Ok(())
}

fn trace_path_builder(args: &TracePathArgs) -> TracePathBuilder {
    let mut builder = TracePathBuilder::default();
    if let Some(dir) = &args.base_dir {
        builder = builder.base_dir(dir);
    }
    if let Some(dir) = &args.sub_dir {
        builder = builder.sub_dir(dir);
    }
    if let Some(prefix) = &args.prefix {
        builder = builder.prefix(prefix);
    }
    if let Some(suffix) = &args.suffix {
        builder = builder.suffix(suffix);
    }
    builder
}

fn run_trace_path(args: &TracePathArgs) -> Result<()> {
    let path = trace_path_builder(args).build()?;
    println!("{}", path.display());
    Ok(())
}
