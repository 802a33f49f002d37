use anyhow::Context;
use clap::{Parser, Subcommand};
use fp_chains::{GlobalController, ReloadHub, TableAggregate};
use fp_core::{BatchReport, Executor, FirewallConfig, MemoryExecutor};
use fp_ipt::{ChainStatusCollector, IptablesExecutor};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fencepost")]
#[command(version, about = "Private iptables chains with safe install and teardown", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every directive the configuration would issue, without touching the host
    Plan {
        #[arg(short, long, default_value = "fencepost.yaml")]
        file: String,
        #[arg(long)]
        json: bool,
    },
    /// Install chains and rules, keep them in place until interrupted.
    /// Send SIGHUP after an external firewall reload to replay them.
    Up {
        #[arg(short, long, default_value = "fencepost.yaml")]
        file: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value = "iptables")]
        program: String,
    },
    /// List application chains currently present on the host
    Status {
        #[arg(long)]
        json: bool,
        #[arg(long, default_value = "iptables")]
        program: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { file, json } => show_plan(&file, json)?,
        Commands::Up {
            file,
            dry_run,
            program,
        } => {
            tokio::runtime::Runtime::new()?.block_on(async {
                run_up(&file, dry_run, &program).await
            })?;
        }
        Commands::Status { json, program } => {
            tokio::runtime::Runtime::new()?.block_on(async {
                show_status(json, &program).await
            })?;
        }
    }

    Ok(())
}

fn build_consumers(
    config: &FirewallConfig,
    executor: &Arc<dyn Executor>,
) -> anyhow::Result<Vec<TableAggregate>> {
    config
        .consumers
        .iter()
        .map(|consumer| {
            TableAggregate::from_config(consumer, executor.clone())
                .with_context(|| format!("Invalid rules for consumer {}", consumer.name))
        })
        .collect()
}

fn show_plan(file: &str, json: bool) -> anyhow::Result<()> {
    let config = FirewallConfig::from_file(Path::new(file))?;

    let host = Arc::new(MemoryExecutor::new());
    let executor: Arc<dyn Executor> = host.clone();
    let controller = GlobalController::from_config(&config, executor.clone(), Arc::new(ReloadHub::new()));

    controller.initialize();
    let mut report = controller.start();
    for consumer in build_consumers(&config, &executor)?.iter_mut() {
        report.merge(consumer.start());
    }

    let directives = host.journal();
    if json {
        let rendered: Vec<String> = directives.iter().map(|d| d.to_string()).collect();
        let doc = json!({
            "state": controller.state(),
            "directives": rendered,
            "chains": host.custom_chains(),
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!(
        "Plan ({} directives, firewall {:?}):",
        directives.len(),
        controller.state()
    );
    for (i, directive) in directives.iter().enumerate() {
        println!("  {}. iptables {}", i + 1, directive);
    }
    println!();
    report.display();

    Ok(())
}

async fn run_up(file: &str, dry_run: bool, program: &str) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let config = FirewallConfig::from_file(Path::new(file))?;
    let executor: Arc<dyn Executor> =
        Arc::new(IptablesExecutor::new(dry_run).with_program(program));
    let hub = Arc::new(ReloadHub::new());

    let controller = GlobalController::from_config(&config, executor.clone(), hub.clone());
    let mut consumers = build_consumers(&config, &executor)?;

    controller.initialize();
    let mut report = controller.start();
    for consumer in consumers.iter_mut() {
        report.merge(consumer.start());
    }
    report.display();

    let mut sighup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl-C")?;
                tracing::info!("interrupt received, tearing down");
                break;
            }
            _ = sighup.recv() => {
                tracing::info!("SIGHUP received, replaying firewall");
                let hub = hub.clone();
                tokio::task::spawn_blocking(move || hub.notify()).await?;
            }
        }
    }

    let mut report = BatchReport::new();
    for consumer in consumers.iter_mut().rev() {
        report.merge(consumer.stop());
    }
    report.merge(controller.stop());
    report.display();

    Ok(())
}

async fn show_status(json: bool, program: &str) -> anyhow::Result<()> {
    let collector = ChainStatusCollector::with_program(program);
    let chains = collector.collect().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chains)?);
        return Ok(());
    }

    println!("🔥 fencepost chains ({}):", chains.len());
    if chains.is_empty() {
        println!("  (none)");
    }
    for chain in &chains {
        println!("  • {} ({}) - {} rules", chain.name, chain.table, chain.rules);
    }

    Ok(())
}
