//! Triage CLI - evaluate diagnostic rules against a system snapshot

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use log::{debug, error};
use walkdir::WalkDir;

use triage::{
    BugChecker, ConfigChecker, DefLoader, EvalError, IssueSink, Report, RunContext, ScenarioRunner,
};

const RULE_GROUPS: &[&str] = &["scenarios", "events", "bugs", "config-checks"];

#[derive(Parser)]
#[command(
    name = "triage",
    version,
    about = "Rule-driven diagnostics for live hosts and support bundles",
    long_about = "Evaluates declarative YAML rules (scenarios, events, known bugs, \
                  config checks) against a system snapshot directory, or against / \
                  on a live host."
)]
struct Cli {
    /// Snapshot directory to inspect (use / for the live host)
    #[arg(long, default_value = "/")]
    data_root: PathBuf,

    /// Definitions directory
    #[arg(long, default_value = "defs")]
    defs: PathBuf,

    /// Only run the named rule domains (default: all discovered)
    #[arg(long = "domain")]
    domains: Vec<String>,

    /// Report output format
    #[arg(short, long, value_enum, default_value = "yaml")]
    format: Format,

    /// Also search rotated copies of log files
    #[arg(long)]
    all_logs: bool,

    /// Scratch directory for collector output (default: per-run temp dir)
    #[arg(long)]
    scratch: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut ctx = RunContext::new(&cli.data_root)
        .with_defs_root(&cli.defs)
        .with_all_logs(cli.all_logs);
    if let Some(scratch) = &cli.scratch {
        ctx = ctx.with_scratch_dir(scratch);
    }

    let domains = if cli.domains.is_empty() {
        discover_domains(&cli.defs)
    } else {
        cli.domains.clone()
    };
    if domains.is_empty() {
        eprintln!(
            "{}: no rule domains found under {}",
            "error".red().bold(),
            cli.defs.display()
        );
        std::process::exit(2);
    }

    let mut report = Report::new();
    let mut broken_domains = 0;
    for domain in &domains {
        debug!("running domain '{domain}'");
        match run_domain(&ctx, domain) {
            Ok((sink, skipped_events)) => {
                if skipped_events > 0 {
                    eprintln!(
                        "{}",
                        format!(
                            "domain '{domain}': {skipped_events} event definition(s) skipped \
                             (no callbacks registered)"
                        )
                        .yellow()
                    );
                }
                report.add_findings(domain, &sink.findings());
            }
            // a broken rule file aborts only its own domain
            Err(e) => {
                error!("domain '{domain}' failed: {e}");
                eprintln!("{}: domain '{}': {}", "error".red().bold(), domain, e);
                broken_domains += 1;
            }
        }
    }

    match render(&report, cli.format) {
        Ok(rendered) => {
            if !rendered.trim().is_empty() {
                println!("{}", rendered.trim_end());
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(2);
        }
    }
    summarize(&report, &domains, broken_domains);

    if broken_domains > 0 {
        std::process::exit(2);
    }
    if report.finding_count() > 0 {
        std::process::exit(1);
    }
}

/// Run every rule group of one domain into a fresh sink. Event
/// definitions need callbacks, which only library embedders register;
/// the CLI counts them so the skip can be reported instead of silently
/// producing an empty domain.
fn run_domain(ctx: &RunContext, domain: &str) -> Result<(IssueSink, usize), EvalError> {
    let loader = DefLoader::new(ctx);
    let sink = IssueSink::new();

    if let Some(tree) = loader.load(&format!("scenarios/{domain}"))? {
        let raised = ScenarioRunner::new(ctx).run(&tree, &sink)?;
        debug!("domain '{domain}': {raised} scenario findings");
    }
    let skipped_events = match loader.load(&format!("events/{domain}"))? {
        Some(tree) => tree.leaf_sections().len(),
        None => 0,
    };
    if let Some(tree) = loader.load(&format!("bugs/{domain}"))? {
        let raised = BugChecker::new(ctx).run(&tree, &sink)?;
        debug!("domain '{domain}': {raised} bug findings");
    }
    if let Some(tree) = loader.load(&format!("config-checks/{domain}"))? {
        let raised = ConfigChecker::new(ctx).run(&tree, &sink)?;
        debug!("domain '{domain}': {raised} config findings");
    }

    Ok((sink, skipped_events))
}

/// Every domain name any rule group defines: subdirectory names in the
/// directory layout, top-level keys in the flat single-document layout.
fn discover_domains(defs_root: &Path) -> Vec<String> {
    let mut domains = BTreeSet::new();
    for group in RULE_GROUPS {
        let dir = defs_root.join(group);
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).into_iter().flatten() {
            if entry.file_type().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    domains.insert(name.to_string());
                }
            }
        }
        for ext in ["yaml", "yml"] {
            let flat = defs_root.join(format!("{group}.{ext}"));
            let Ok(raw) = fs::read_to_string(&flat) else {
                continue;
            };
            let Ok(serde_yaml::Value::Mapping(m)) = serde_yaml::from_str(&raw) else {
                continue;
            };
            for key in m.keys() {
                if let Some(name) = key.as_str() {
                    domains.insert(name.to_string());
                }
            }
        }
    }
    domains.into_iter().collect()
}

fn render(report: &Report, format: Format) -> anyhow::Result<String> {
    match format {
        Format::Yaml => report.to_yaml().context("rendering YAML report"),
        Format::Json => report.to_json().context("rendering JSON report"),
    }
}

fn summarize(report: &Report, domains: &[String], broken_domains: usize) {
    let count = report.finding_count();
    let summary = format!(
        "{} finding{} across {} domain{}",
        count,
        if count == 1 { "" } else { "s" },
        domains.len(),
        if domains.len() == 1 { "" } else { "s" }
    );
    if count > 0 {
        eprintln!("{}", summary.yellow().bold());
    } else {
        eprintln!("{}", summary.green());
    }
    if broken_domains > 0 {
        eprintln!(
            "{}",
            format!("{broken_domains} domain(s) aborted on definition errors").red()
        );
    }
}
