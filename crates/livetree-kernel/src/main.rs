//! `livetree` command line: run a task tree, reload it, inspect it

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use livetree_kernel::prelude::*;
use livetree_kernel::{ReconcileReport, TreeSnapshot};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    let json = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON");

    Command::new("livetree")
        .version(livetree_kernel::VERSION)
        .about("Run a task tree and reload it without stopping")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("reconcile")
                .about("Start the active tree, reconcile it against a candidate, print the result")
                .arg(
                    Arg::new("active")
                        .long("active")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Spec of the running tree (yaml, json or toml)"),
                )
                .arg(
                    Arg::new("candidate")
                        .long("candidate")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Edited spec"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Reconciliation settings (toml)"),
                )
                .arg(json.clone()),
        )
        .subcommand(
            Command::new("snapshot")
                .about("Start a tree and print its state")
                .arg(
                    Arg::new("tree")
                        .long("tree")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Tree spec (yaml, json or toml)"),
                )
                .arg(json),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("reconcile", args)) => reconcile(args).await,
        Some(("snapshot", args)) => snapshot(args).await,
        _ => bail!("unknown command"),
    }
}

fn path_arg<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("missing --{name}"))
}

fn load_spec(path: &Path) -> Result<TreeSpec> {
    TreeSpec::from_path(path).with_context(|| format!("loading {}", path.display()))
}

async fn start(tree: &Arc<TaskTree>, timeout: Duration) -> Result<Arc<TokioRunner>> {
    let runner = Arc::new(TokioRunner::new(Handle::current(), tree));
    let ack = runner.start_all()?;
    let ready = tokio::task::spawn_blocking(move || ack.wait(timeout)).await?;
    if !ready {
        bail!("tree did not report its first results within {}ms", timeout.as_millis());
    }
    Ok(runner)
}

#[derive(Serialize)]
struct ReconcileOutput<'a> {
    report: &'a ReconcileReport,
    tree: &'a TreeSnapshot,
}

async fn reconcile(args: &ArgMatches) -> Result<()> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => ReconcileConfig::from_path(path).with_context(|| format!("loading {}", path.display()))?,
        None => ReconcileConfig::default(),
    };
    let active = load_spec(path_arg(args, "active")?)?;
    let candidate = load_spec(path_arg(args, "candidate")?)?;

    let tree = Arc::new(TaskTree::from_spec(&active)?);
    let runner = start(&tree, config.start_timeout()).await?;
    let staged = tree.stage(&candidate)?;

    let reconciler = Reconciler::new(config, runner.clone());
    let worker = Arc::clone(&tree);
    let report = tokio::task::spawn_blocking(move || reconciler.reconcile(&worker, staged)).await??;
    let snapshot = tree.snapshot();

    if args.get_flag("json") {
        let output = ReconcileOutput {
            report: &report,
            tree: &snapshot,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Reconciliation Report:");
        println!("  Spliced: {}", join(&report.spliced));
        println!("  Relocated: {}", join(&report.relocated));
        println!("  Reloaded Leaves: {}", join(&report.reloaded_leaves));
        println!("  Disposed: {}", report.disposed);
        println!("  Discarded: {}", report.discarded);
        println!("  Registry Changes: {}", report.registry_changes);
        println!("  Repaired Entries: {}", report.repaired_entries);
        println!("  Nodes: {} -> {}", report.nodes_before, report.nodes_after);
        if report.root_mismatch {
            println!("  Root changed: restart required to apply it");
        }
        println!();
        print!("{}", snapshot.root.outline());
    }
    runner.shutdown();
    Ok(())
}

async fn snapshot(args: &ArgMatches) -> Result<()> {
    let spec = load_spec(path_arg(args, "tree")?)?;
    let tree = Arc::new(TaskTree::from_spec(&spec)?);
    let runner = start(&tree, ReconcileConfig::default().start_timeout()).await?;
    let snapshot = tree.snapshot();

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", snapshot.root.outline());
    }
    runner.shutdown();
    Ok(())
}

fn join(paths: &[TreePath]) -> String {
    if paths.is_empty() {
        return "-".into();
    }
    paths.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
