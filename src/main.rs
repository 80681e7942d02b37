use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::runtime::Handle;

use freeze_guard::actions::demo;
use freeze_guard::collector::{self, EventStore};
use freeze_guard::monitor::{EventLoop, IntervalScheduler, Scheduler, ThreadScheduler};
use freeze_guard::telemetry::wire;
use freeze_guard::{logging, EventSender, FreezeGuard, GuardConfig, HostKind, ResidentMemoryGauge};

#[derive(Debug, Parser)]
#[command(name = "freeze-guard", version, about = "UI-thread stall detection and action telemetry")]
struct Cli {
    /// TOML config file; defaults apply when omitted
    #[arg(long, global = true, env = "FREEZEGUARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the reference collector
    Collector {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },
    /// Check whether the collector is reachable (-1 when it is not)
    Ping {
        /// Collector base URL, overriding the config
        #[arg(long)]
        url: Option<String>,
    },
    /// Run the stock instrumented actions against an in-process event loop
    Demo {
        #[arg(long)]
        host: Option<HostKind>,

        /// How long the blocking action holds the primary context
        #[arg(long, default_value_t = 1200)]
        block_ms: u64,

        #[arg(long, value_enum, default_value_t = SchedulerKind::Thread)]
        scheduler: SchedulerKind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchedulerKind {
    /// Dedicated scheduled-queue thread
    Thread,
    /// Tokio interval timer
    Interval,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GuardConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let mut config = GuardConfig::default();
            config.apply_env();
            config
        }
    };
    logging::init_logging(&config.log)?;

    match cli.command {
        Command::Collector { bind } => run_collector(bind).await,
        Command::Ping { url } => {
            if let Some(url) = url {
                config.sender.base_url = url;
            }
            config.validate()?;
            let sender = EventSender::from_current(config.sender)?;
            println!("{}", sender.ping().await);
            Ok(())
        }
        Command::Demo {
            host,
            block_ms,
            scheduler,
        } => {
            if let Some(host) = host {
                config.sender.host = host;
            }
            config.validate()?;
            run_demo(&config, Duration::from_millis(block_ms), scheduler).await
        }
    }
}

async fn run_collector(bind: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}, is it already in use?"))?;

    println!();
    println!("Collector listening on http://{bind}");
    println!("Ingest          → POST http://{bind}/ingest  ({})", wire::CONTENT_TYPE);
    println!("Metrics         → http://{bind}/metrics");
    println!("Report          → http://{bind}/report");
    println!("Debug JSON      → http://{bind}/debug");
    println!();

    let store = EventStore::new().context("registering collector metrics")?;
    collector::serve(listener, Arc::new(store)).await?;
    Ok(())
}

async fn run_demo(
    config: &GuardConfig,
    block: Duration,
    scheduler: SchedulerKind,
) -> anyhow::Result<()> {
    let event_loop = EventLoop::spawn("freeze-guard-primary")?;
    let primary = event_loop.handle();

    let scheduler: Arc<dyn Scheduler> = match scheduler {
        SchedulerKind::Thread => Arc::new(ThreadScheduler::default()),
        SchedulerKind::Interval => Arc::new(IntervalScheduler::current()?),
    };

    let guard = FreezeGuard::new(config, scheduler, Arc::new(primary.clone()), Handle::current())?;
    guard.attach_window();

    let status = guard.ping().await;
    if status < 0 {
        println!("collector at {} is unreachable; events will be dropped", config.sender.base_url);
    } else {
        println!("collector at {} answered {status}", config.sender.base_url);
    }

    // Let the prober warm up, then start from a clean slate.
    tokio::time::sleep(config.monitor.period() * 4).await;
    guard.snapshot_and_reset();

    let runner = guard.runner(primary, Arc::new(ResidentMemoryGauge));
    let events = [
        demo::measure(&runner).await?,
        demo::bad_blocking(&runner, block).await?,
        demo::background_fix(&runner, block).await?,
    ];

    println!();
    for event in &events {
        let stalls = event.stalls();
        println!(
            "  {:<32} {:<6} {:9.1} ms  stalls={:<3} longest={:7.1} ms  heapΔ={}",
            event.action(),
            config.sender.host.thread_label(event.thread()),
            event.duration_ms(),
            stalls.count,
            stalls.longest_ms,
            event.heap_delta_bytes(),
        );
    }
    println!();

    // Deliveries are fire-and-forget; give them their full budget.
    tokio::time::sleep(config.sender.total_timeout()).await;

    guard.shutdown();
    event_loop.shutdown();
    Ok(())
}
