//! IPFIX Flow Collector Daemon
//!
//! Main entry point for flowcollectord. Wires the ingestion workers, the
//! annotation stage and the flow sink together, serves metrics and waits for
//! SIGINT/SIGTERM.

use anyhow::Context;
use clap::Parser;
use sonic_flowcollectord::augment::{Augmenter, BirdAugmenter};
use sonic_flowcollectord::config::DEFAULT_CONFIG_PATH;
use sonic_flowcollectord::handoff::{self, POLL_INTERVAL};
use sonic_flowcollectord::metrics::MetricsCollector;
use sonic_flowcollectord::metrics_server::{start_metrics_server, MetricsServerState};
use sonic_flowcollectord::sink::{open_sink, spawn_sink_worker};
use sonic_flowcollectord::{
    Annotation, Annotator, CollectorConfig, CollectorError, GlobalStats, IpfixServer,
    PacketProcessor, Shutdown, StatsSnapshot, TemplateCache,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "flowcollectord", version, about = "IPFIX flow collector")]
struct Cli {
    /// Config file (defaults apply if the default path is missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP address to listen on for IPFIX
    #[arg(long)]
    listen: Option<String>,

    /// Number of ingestion workers
    #[arg(long)]
    readers: Option<usize>,

    /// Number of annotation workers
    #[arg(long)]
    annotators: Option<usize>,

    /// Aggregation interval in seconds
    #[arg(long)]
    aggregation: Option<u64>,

    /// Look up AS numbers and prefixes in BIRD
    #[arg(long)]
    bgp_augment: bool,

    /// BIRD control socket (IPv4)
    #[arg(long)]
    bird_socket: Option<PathBuf>,

    /// BIRD control socket (IPv6)
    #[arg(long)]
    bird6_socket: Option<PathBuf>,

    /// Diagnostic verbosity
    #[arg(short, long)]
    debug: Option<u8>,

    /// Flow output: stdout, null or a file path
    #[arg(long)]
    sink: Option<String>,

    /// Address for the Prometheus endpoint
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,
}

impl Cli {
    fn load_config(&self) -> sonic_flowcollectord::Result<CollectorConfig> {
        let mut config = match &self.config {
            Some(path) => CollectorConfig::load(path)?,
            None => CollectorConfig::load_or_default(DEFAULT_CONFIG_PATH)?,
        };

        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(readers) = self.readers {
            config.readers = readers;
        }
        if let Some(annotators) = self.annotators {
            config.annotators = annotators;
        }
        if let Some(aggregation) = self.aggregation {
            config.aggregation_secs = aggregation;
        }
        if self.bgp_augment {
            config.bgp_augment = true;
        }
        if let Some(path) = &self.bird_socket {
            config.bird_socket = path.clone();
        }
        if let Some(path) = &self.bird6_socket {
            config.bird6_socket = path.clone();
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if let Some(sink) = &self.sink {
            config.sink = sink.parse()?;
        }
        if self.metrics_listen.is_some() {
            config.metrics_listen = self.metrics_listen;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("flowcollectord: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(config.debug) {
        eprintln!("flowcollectord: {}", e);
        return ExitCode::FAILURE;
    }

    info!("flowcollectord: Starting IPFIX flow collector");

    match run(config).await {
        Ok(()) => {
            info!("flowcollectord: Exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "flowcollectord: Exiting with error");
            ExitCode::FAILURE
        }
    }
}

/// Initialize structured logging on stderr (stdout may carry flows)
///
/// `RUST_LOG` wins; otherwise verbosity 0 logs at info and anything higher
/// at debug.
fn init_logging(debug: u8) -> sonic_flowcollectord::Result<()> {
    let default_level = if debug == 0 { "info" } else { "debug" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| CollectorError::Config(format!("Failed to set logger: {}", e)))
}

async fn run(config: CollectorConfig) -> anyhow::Result<()> {
    let shutdown = setup_signal_handlers();
    let stats = Arc::new(GlobalStats::new());
    let cache = Arc::new(TemplateCache::new());

    let sink = open_sink(&config.sink).context("opening flow sink")?;

    let (ingest_tx, ingest_rx) = handoff::channel();
    let (annotated_tx, annotated_rx) = handoff::channel();

    // Bind first: a socket failure aborts before any other thread starts
    let processor = Arc::new(PacketProcessor::new(
        Arc::clone(&cache),
        Arc::clone(&stats),
        config.bgp_augment,
        config.debug,
    ));
    let server = IpfixServer::start(
        &config.listen,
        config.readers,
        processor,
        ingest_tx,
        shutdown.clone(),
    )
    .context("starting IPFIX listener")?;

    let augmenter = config.bgp_augment.then(|| {
        info!(
            bird = %config.bird_socket.display(),
            bird6 = %config.bird6_socket.display(),
            "BGP augmentation enabled"
        );
        Arc::new(BirdAugmenter::new(
            config.bird_socket.clone(),
            config.bird6_socket.clone(),
            config.debug,
        )) as Arc<dyn Augmenter>
    });
    let annotation = Arc::new(
        Annotation::new(config.aggregation_interval(), augmenter, Arc::clone(&stats))
            .context("configuring annotation")?,
    );
    let annotator = Annotator::start(
        vec![ingest_rx],
        annotated_tx,
        config.annotators,
        annotation,
        shutdown.clone(),
    )
    .context("starting annotators")?;

    let sink_worker =
        spawn_sink_worker(annotated_rx, sink, shutdown.clone()).context("starting flow sink")?;
    info!(sink = %config.sink, "Writing flows");

    if let Some(addr) = config.metrics_listen {
        let state = MetricsServerState {
            collector: MetricsCollector::new().context("creating metrics registry")?,
            stats: Arc::clone(&stats),
            cache: Arc::clone(&cache),
        };
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(addr, state, shutdown).await {
                error!(error = %e, addr = %addr, "Metrics server failed");
            }
        });
    }

    let stats_interval = config.stats_interval();
    let mut last_report = Instant::now();
    while !shutdown.is_triggered() {
        tokio::time::sleep(POLL_INTERVAL).await;
        if stats_interval.is_some_and(|interval| last_report.elapsed() >= interval) {
            log_stats(&stats.snapshot(), cache.len());
            last_report = Instant::now();
        }
    }

    info!("flowcollectord: Stopping pipeline");
    tokio::task::spawn_blocking(move || {
        server.join();
        annotator.join();
        if sink_worker.join().is_err() {
            error!("Flow sink thread panicked");
        }
    })
    .await
    .context("joining pipeline threads")?;

    log_stats(&stats.snapshot(), cache.len());
    Ok(())
}

fn log_stats(snap: &StatsSnapshot, templates: usize) {
    info!(
        ipfix_packets = snap.ipfix_packets,
        ipfix_bytes = snap.ipfix_bytes,
        flows4 = snap.flows4,
        flows6 = snap.flows6,
        flow_bytes = snap.flow_bytes,
        flow_packets = snap.flow_packets,
        decode_errors = snap.decode_errors,
        unknown_templates = snap.unknown_templates,
        templates,
        "Collector stats"
    );
}

/// Raise the shutdown flag on SIGINT or SIGTERM
fn setup_signal_handlers() -> Shutdown {
    let shutdown = Shutdown::new();
    let flag = shutdown.clone();

    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => Some(sigterm),
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    None
                }
            };

        let terminate = async {
            match sigterm.as_mut() {
                Some(sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("flowcollectord: Received SIGINT"),
            _ = terminate => info!("flowcollectord: Received SIGTERM"),
        }
        flag.trigger();
    });

    shutdown
}
