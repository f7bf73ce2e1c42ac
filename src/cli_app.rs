//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use identity_scenario_harness::core::config::{Backend, Config, split_allow_list};
use identity_scenario_harness::core::errors::IshError;
use identity_scenario_harness::core::paths::display_relative;
use identity_scenario_harness::harness::context::HarnessContext;
use identity_scenario_harness::harness::discovery::{SuiteKind, discover};
use identity_scenario_harness::harness::report::{Report, Verdict};
use identity_scenario_harness::harness::suite::run_suites;
use identity_scenario_harness::logger::sqlite::{SqliteLogger, VerdictRow};
use identity_scenario_harness::model::scenario::Scenario;

/// Identity Scenario Harness: checks an identity-resolution service against
/// declarative JSON scenarios.
#[derive(Debug, Parser)]
#[command(
    name = "ish",
    author,
    version,
    about = "Identity Scenario Harness - scenario-driven checks for identity services",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Print every verdict as it is recorded.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors and the final summary only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run scenario suites against the configured service.
    Run(RunArgs),
    /// List scenario files in execution order.
    List(SelectArgs),
    /// Parse and validate scenario files without running them.
    Validate(SelectArgs),
    /// Show recently recorded verdicts.
    History(HistoryArgs),
    /// Show the effective configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Suite selection; `all` skips suites whose directory is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
enum SuiteArg {
    Search,
    SearchRules,
    Duplicates,
    #[default]
    All,
}

impl SuiteArg {
    fn kinds(self) -> Vec<SuiteKind> {
        match self {
            Self::Search => vec![SuiteKind::Search],
            Self::SearchRules => vec![SuiteKind::SearchRules],
            Self::Duplicates => vec![SuiteKind::Duplicates],
            Self::All => SuiteKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Args, Default)]
struct SelectArgs {
    /// Suite to select.
    #[arg(long, value_enum, default_value_t = SuiteArg::All)]
    suite: SuiteArg,
    /// Scenario data root (contains search/, searchRules/, duplicates/).
    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,
    /// Comma-separated allow-list of scenario file names.
    #[arg(long, value_name = "FILES")]
    inputs: Option<String>,
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    #[command(flatten)]
    select: SelectArgs,
    /// Delay between input creation and the operation.
    #[arg(long, value_name = "MILLISECONDS")]
    settle_ms: Option<u64>,
    /// Service backend (memory or http).
    #[arg(long, value_name = "BACKEND")]
    backend: Option<String>,
    /// Base URL of the http backend.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
    /// Do not write the activity log.
    #[arg(long)]
    no_log: bool,
}

#[derive(Debug, Clone, Args)]
struct HistoryArgs {
    /// Maximum number of verdicts to show.
    #[arg(long, default_value_t = 20, value_name = "N")]
    limit: u32,
    /// Only verdicts of this scenario.
    #[arg(long, value_name = "NAME")]
    scenario: Option<String>,
    /// Delete events and verdicts older than this many days before listing.
    #[arg(long, value_name = "DAYS")]
    prune_days: Option<u32>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration (default).
    Show,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// At least one scenario failed or was invalid.
    #[error("{0}")]
    Failed(String),
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Harness or environment failure.
    #[error("{0}")]
    Runtime(#[from] IshError),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Failed(_) => 1,
            Self::User(_) | Self::Runtime(_) | Self::Json(_) | Self::Io(_) => 2,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_harness(cli, args),
        Command::List(args) => run_list(cli, args),
        Command::Validate(args) => run_validate(cli, args),
        Command::History(args) => run_history(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── config resolution ────────────────────

fn load_config(cli: &Cli, select: &SelectArgs) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = &select.data_root {
        config.harness.data_root.clone_from(root);
    }
    if let Some(raw) = &select.inputs {
        config.harness.inputs = split_allow_list(raw);
    }
    Ok(config)
}

fn load_run_config(cli: &Cli, args: &RunArgs) -> Result<Config, CliError> {
    let mut config = load_config(cli, &args.select)?;
    if let Some(ms) = args.settle_ms {
        config.harness.settle_interval_ms = ms;
    }
    if let Some(raw) = &args.backend {
        config.sut.backend = Backend::parse(raw).map_err(|e| CliError::User(e.to_string()))?;
    }
    if let Some(url) = &args.base_url {
        config.sut.base_url = Some(url.clone());
    }
    config.validate().map_err(|e| CliError::User(e.to_string()))?;
    Ok(config)
}

// ──────────────────── run ────────────────────

fn run_harness(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let config = load_run_config(cli, args)?;
    let mode = output_mode(cli);
    let suites = args.select.suite.kinds();
    let skip_missing = args.select.suite == SuiteArg::All;

    let mut ctx = HarnessContext::from_config(config)?;
    if !args.no_log {
        if let Err(e) = ctx.start_logging() {
            warn(cli, &format!("activity log disabled: {e}"));
        }
    }

    let progress = mode == OutputMode::Human && cli.verbose;
    let result = run_suites(&ctx, &suites, skip_missing, |verdict| {
        if progress {
            println!("  {} {}", status_badge(verdict), verdict.scenario);
        }
    });
    ctx.release();
    let run = result?;

    for suite in &run.skipped {
        warn(cli, &format!("no scenario directory for suite {suite}; skipped"));
    }
    for name in &run.replaced {
        warn(
            cli,
            &format!("scenario name {name:?} is used more than once; the later verdict was kept"),
        );
    }

    match mode {
        OutputMode::Human => print_report(cli, &run.report),
        OutputMode::Json => {
            let payload = json!({
                "command": "run",
                "report": serde_json::to_value(run.report.summary())?,
                "skipped": run.skipped.iter().map(|s| s.label()).collect::<Vec<_>>(),
                "replaced": run.replaced,
            });
            write_json_line(&payload)?;
        }
    }

    if run.passed() {
        Ok(())
    } else {
        Err(CliError::Failed(format!(
            "{} of {} scenarios failed",
            run.report.failed_count(),
            run.report.len()
        )))
    }
}

fn print_report(cli: &Cli, report: &Report) {
    if !cli.quiet {
        for verdict in report.ordered() {
            println!("{} :: {}", verdict.scenario.bold(), status_badge(verdict));
            println!("{}", verdict.message);
            println!();
        }
    }
    let failed = report.failed_count();
    let line = format!(
        "{} scenarios, {} passed, {failed} failed",
        report.len(),
        report.len() - failed
    );
    if failed == 0 {
        println!("{}", line.green());
    } else {
        println!("{}", line.red().bold());
    }
}

fn status_badge(verdict: &Verdict) -> colored::ColoredString {
    if verdict.passed {
        verdict.status_label().green()
    } else {
        verdict.status_label().red().bold()
    }
}

// ──────────────────── list / validate ────────────────────

fn selected_files(
    cli: &Cli,
    config: &Config,
    suite: SuiteArg,
) -> Result<Vec<(SuiteKind, PathBuf, String)>, CliError> {
    let mut out = Vec::new();
    for kind in suite.kinds() {
        match discover(&config.harness.data_root, kind, &config.harness.inputs) {
            Ok(files) => out.extend(files.into_iter().map(|f| (kind, f.path, f.digest))),
            Err(IshError::MissingScenarioDir { path }) if suite == SuiteArg::All => {
                if cli.verbose {
                    warn(cli, &format!("no scenario directory at {}", path.display()));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

fn run_list(cli: &Cli, args: &SelectArgs) -> Result<(), CliError> {
    let config = load_config(cli, args)?;
    let root = config.harness.data_root.clone();
    let files = selected_files(cli, &config, args.suite)?;

    match output_mode(cli) {
        OutputMode::Human => {
            for (kind, path, digest) in &files {
                println!(
                    "{:<13} {}  {}",
                    kind.label(),
                    digest.get(..12).unwrap_or(digest.as_str()).dimmed(),
                    display_relative(&root, path)
                );
            }
            if !cli.quiet {
                println!("{} scenario files", files.len());
            }
        }
        OutputMode::Json => {
            let entries: Vec<Value> = files
                .iter()
                .map(|(kind, path, digest)| {
                    json!({
                        "suite": kind.label(),
                        "path": path.to_string_lossy(),
                        "digest": digest,
                    })
                })
                .collect();
            write_json_line(&json!({ "command": "list", "files": entries }))?;
        }
    }
    Ok(())
}

fn run_validate(cli: &Cli, args: &SelectArgs) -> Result<(), CliError> {
    let config = load_config(cli, args)?;
    let root = config.harness.data_root.clone();
    let files = selected_files(cli, &config, args.suite)?;

    let results: Vec<(&Path, Result<Scenario, IshError>)> = files
        .iter()
        .map(|(_, path, _)| (path.as_path(), Scenario::load(path)))
        .collect();
    let invalid = results.iter().filter(|(_, r)| r.is_err()).count();

    match output_mode(cli) {
        OutputMode::Human => {
            for (path, result) in &results {
                let shown = display_relative(&root, path);
                match result {
                    Ok(scenario) => {
                        if !cli.quiet {
                            println!(
                                "{} {shown} ({}, {} inputs)",
                                "ok".green(),
                                scenario.operation.kind().label(),
                                scenario.inputs.len()
                            );
                        }
                    }
                    Err(e) => println!("{} {shown}: {e}", "invalid".red().bold()),
                }
            }
        }
        OutputMode::Json => {
            let entries: Vec<Value> = results
                .iter()
                .map(|(path, result)| match result {
                    Ok(scenario) => json!({
                        "path": path.to_string_lossy(),
                        "valid": true,
                        "name": scenario.name,
                        "operation": scenario.operation.kind().label(),
                        "inputs": scenario.inputs.len(),
                    }),
                    Err(e) => json!({
                        "path": path.to_string_lossy(),
                        "valid": false,
                        "error_code": e.code(),
                        "error": e.to_string(),
                    }),
                })
                .collect();
            write_json_line(&json!({
                "command": "validate",
                "valid": invalid == 0,
                "files": entries,
            }))?;
        }
    }

    if invalid == 0 {
        Ok(())
    } else {
        Err(CliError::Failed(format!(
            "{invalid} of {} scenario files are invalid",
            results.len()
        )))
    }
}

// ──────────────────── history ────────────────────

fn run_history(cli: &Cli, args: &HistoryArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let db_path = &config.paths.sqlite_db;
    if !db_path.exists() {
        return Err(CliError::User(format!(
            "no activity database at {}; run `ish run` first",
            db_path.display()
        )));
    }
    let db = SqliteLogger::open_existing(db_path)?;
    let pruned = match args.prune_days {
        Some(days) => Some(db.prune(days)?),
        None => None,
    };
    let rows = match &args.scenario {
        Some(name) => db.verdicts_for(name, args.limit)?,
        None => db.recent_verdicts(args.limit)?,
    };

    match output_mode(cli) {
        OutputMode::Human => {
            if let Some(count) = pruned.filter(|_| !cli.quiet) {
                println!("Pruned {count} rows.");
            }
            if rows.is_empty() && !cli.quiet {
                println!("No verdicts recorded.");
            }
            for row in &rows {
                print_history_row(row);
            }
        }
        OutputMode::Json => {
            let entries: Vec<Value> = rows
                .iter()
                .map(|row| {
                    json!({
                        "recorded_at": row.recorded_at,
                        "suite": row.suite,
                        "scenario": row.scenario,
                        "passed": row.passed,
                        "source": row.source,
                        "digest": row.digest,
                        "duration_ms": row.duration_ms,
                        "message": row.message,
                    })
                })
                .collect();
            write_json_line(&json!({
                "command": "history",
                "pruned": pruned,
                "verdicts": entries,
            }))?;
        }
    }
    Ok(())
}

fn print_history_row(row: &VerdictRow) {
    let badge = if row.passed {
        "OK".green()
    } else {
        "KO".red().bold()
    };
    println!(
        "{}  {badge}  {:<13} {} ({} ms)",
        row.recorded_at.dimmed(),
        row.suite.as_deref().unwrap_or("-"),
        row.scenario,
        row.duration_ms
    );
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    }))?;
                }
            }
            Ok(())
        }
        None | Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;
            let hash = config.stable_hash()?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::User(format!("serialize config: {e}")))?;
                    println!("# hash: {hash}");
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config show",
                        "hash": hash,
                        "config": serde_json::to_value(&config)?,
                    }))?;
                }
            }
            Ok(())
        }
    }
}

// ──────────────────── output helpers ────────────────────

fn warn(cli: &Cli, message: &str) {
    if !cli.quiet {
        eprintln!("{} {message}", "warning:".yellow().bold());
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("ISH_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
