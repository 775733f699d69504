mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use colored::Colorize;
use snapsync::{
    format_bytes, Cancellation, CommandRunner, Config, LocalRunner, SyncError, Synchronizer,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn synchronizer(config: &Config, dry_run: bool) -> Result<Synchronizer> {
    let runner: Arc<dyn CommandRunner> = Arc::new(LocalRunner::new());
    let source = config
        .source_node(runner.clone())
        .context("Invalid source node")?;
    let destination = config
        .destination_node(runner)
        .context("Invalid destination node")?;
    Ok(Synchronizer::new(
        source,
        destination,
        config.transfer_options(dry_run),
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    match &cli.command {
        Command::List(_) => {}
        Command::Plan(args) => args.apply(&mut config),
        Command::Sync(args) => args.apply(&mut config),
    }
    config.validate()?;

    match &cli.command {
        Command::List(args) => {
            let runner: Arc<dyn CommandRunner> = Arc::new(LocalRunner::new());
            let node = config.node(&args.node, &args.snapshot_dir, runner)?;
            let snapshots = node.list_snapshots().await?;
            for snapshot in &snapshots {
                println!("{}", snapshot);
            }
        }
        Command::Plan(_) => {
            let sync = synchronizer(&config, true)?;
            let tasks = sync.plan().await?;
            if tasks.is_empty() {
                println!("{}", "Destination is up to date".green());
            }
            for task in &tasks {
                println!("{}", task);
            }
        }
        Command::Sync(args) => {
            let cancel = Cancellation::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupted, stopping transfer");
                        cancel.cancel();
                    }
                }
            });

            let sync = synchronizer(&config, args.dry_run)?.with_cancellation(cancel);
            let report = sync.run().await?;

            let verb = if report.dry_run {
                "Would transfer"
            } else {
                "Transferred"
            };
            println!(
                "{} {} snapshot(s), {}",
                verb.green().bold(),
                report.transferred.len(),
                format_bytes(report.bytes_transmitted())
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        let cancelled = e
            .downcast_ref::<SyncError>()
            .map_or(false, SyncError::is_cancellation);
        std::process::exit(if cancelled { 130 } else { 1 });
    }
}
