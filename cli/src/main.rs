// linkstate: link-state routing node CLI
//
// Runs one routing node: loads its neighbor config, starts the engine, prints
// routing updates as they happen and takes operator commands on stdin.

mod display;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use linkstate_core::{
    CommandProcessor, NeighborConfig, NeighborTable, NodeContext, NodeEvent, NodeId,
    NodeSettings, RouterNode, TcpLinkSender,
};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "linkstate")]
#[command(about = "Link-state routing node", long_about = None)]
#[command(version)]
struct Cli {
    /// Identifier of this node
    node_id: NodeId,
    /// Port to listen on for neighbor traffic
    port: u16,
    /// Neighbor config file (count line, then `<id> <cost> <port>` lines)
    config: PathBuf,
    /// Address to bind the listener to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,
    /// JSON file overriding timing and transport settings
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Log filter, e.g. `info` or `linkstate_core=debug` (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let guard = init_tracing(cli.log_level.as_deref(), cli.log_file.as_deref())?;

    run(cli).await?;

    // The stdin reader sits on a blocking thread the runtime would wait for
    drop(guard);
    std::process::exit(0);
}

fn init_tracing(level: Option<&str>, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    match log_file {
        Some(path) => {
            let file_name = path.file_name().context("Log file path has no file name")?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = NeighborConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    config
        .validate_for(&cli.node_id)
        .context("Invalid neighbor config")?;

    let settings = match &cli.settings {
        Some(path) => NodeSettings::load(path)
            .with_context(|| format!("Failed to load settings {}", path.display()))?,
        None => NodeSettings::default(),
    };

    let bind_addr = SocketAddr::new(cli.bind, cli.port);
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to listen on {}", bind_addr))?;

    let neighbors = NeighborTable::from_config(&config, settings.neighbor_host);
    let sender = Arc::new(TcpLinkSender::new(
        settings.connect_timeout(),
        settings.io_timeout(),
    ));
    let (event_tx, event_rx) = mpsc::channel(256);
    let ctx = NodeContext::new(cli.node_id.clone(), neighbors, settings, event_tx)
        .with_config_path(&cli.config);
    let handle = RouterNode::new(Arc::new(ctx))
        .start(listener, sender)
        .context("Failed to start node")?;
    info!("Config loaded from {}", cli.config.display());

    println!("{}", format!("Node {}: starting...", cli.node_id).bold());
    println!();
    println!("{} Listening on {}", "✓".green(), handle.local_addr());
    println!("{} {} neighbor(s) from {}", "✓".green(), config.entries().len(), cli.config.display());
    println!();
    print_help();

    let local = cli.node_id.clone();
    let event_task = tokio::spawn(print_events(local.clone(), event_rx));
    let stdin_task = tokio::spawn(read_commands(local, handle.commands()));

    tokio::select! {
        _ = handle.stopped() => {}
        _ = tokio::signal::ctrl_c() => {
            println!();
            handle.shutdown();
        }
    }

    println!("Shutting down...");
    stdin_task.abort();
    handle.join().await;
    event_task.abort();
    Ok(())
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  {}                   show neighbors", "config".bright_green());
    println!("  {}            show shortest paths", "routing table".bright_green());
    println!("  {}                    show the link-state table", "table".bright_green());
    println!("  {}   change a link cost", "change <A> <B> <cost>".bright_green());
    println!("  {} / {}         leave / rejoin the network", "disable".bright_green(), "enable".bright_green());
    println!("  {}   stop, now or later", "shutdown [-n <secs>]".bright_green());
    println!();
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn print_events(local: NodeId, mut events: mpsc::Receiver<NodeEvent>) {
    while let Some(event) = events.recv().await {
        let Some(text) = display::render_event(&event) else {
            continue;
        };
        let marker = match event {
            NodeEvent::NeighborDown(_) => "✗".red(),
            NodeEvent::RoutesComputed(_) => "↻".bright_blue(),
            _ => "•".bright_green(),
        };
        println!("\n{} [{}] {}", marker, local.as_str().bright_cyan(), text.trim_end());
        prompt();
    }
}

async fn read_commands(local: NodeId, commands: CommandProcessor) {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    prompt();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            prompt();
            continue;
        }
        if line == "help" {
            print_help();
            prompt();
            continue;
        }

        match commands.execute_line(line).await {
            Ok(outcome) => print!("{}", display::render_outcome(&local, &outcome)),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
        prompt();
    }
}
