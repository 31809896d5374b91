#[macro_use]
extern crate log;
#[macro_use]
extern crate crossbeam_channel;

use std::error::Error;
use std::io::Write;
use std::thread;
use std::time::Duration;

use chrono::prelude::{DateTime, Local};
use clap::Parser;
use crossbeam_channel::Receiver;

use election_modules::{LoggingWorkload, MemoryStore, RandomizedRetryTimer};
use lease_election::{
    CoordinationStore, ElectionConfiguration, ElectionEvent, ElectionTimings, LeaseLossPolicy,
    DEFAULT_ELECTION_KEY, DEFAULT_STORE_ENDPOINT,
};

#[derive(Parser, Debug)]
#[command(name = "election-node")]
#[command(about = "Runs one leader election participant")]
struct Cli {
    /// Participant identity written to the election key (defaults to $HOSTNAME)
    identity: Option<String>,

    /// Store endpoint, repeat for a cluster
    #[arg(long = "endpoint", default_value = DEFAULT_STORE_ENDPOINT)]
    endpoints: Vec<String>,

    /// Election key
    #[arg(long, default_value = DEFAULT_ELECTION_KEY)]
    key: String,

    /// Lease time-to-live in seconds
    #[arg(long, default_value_t = 5)]
    ttl_secs: u64,

    /// Keep-alive interval in milliseconds
    #[arg(long, default_value_t = 2000)]
    keep_alive_ms: u64,

    /// Leader workload interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    workload_ms: u64,

    /// Step down after this many workload ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Exit instead of contending again after losing the lease
    #[arg(long)]
    terminate_on_loss: bool,

    /// Use an in-process store instead of etcd
    #[arg(long)]
    in_memory: bool,

    /// Store request timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    request_timeout_ms: u64,
}

fn init_logger() {
    env_logger::builder()
        .format(|buf, record| {
            let now: DateTime<Local> = Local::now();
            writeln!(buf, "{:5}: {} - {}", record.level(), now.format("%H:%M:%S.%3f"), record.args())
        })
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logger();
    let cli = Cli::parse();

    if cli.in_memory {
        info!("Using in-process store");
        return run_participant(cli, MemoryStore::new().client());
    }

    run_with_store(cli)
}

#[cfg(feature = "etcd")]
fn run_with_store(cli: Cli) -> Result<(), Box<dyn Error>> {
    let store = election_modules::EtcdStore::connect(
        cli.endpoints.clone(),
        Duration::from_millis(cli.request_timeout_ms),
    )?;

    run_participant(cli, store)
}

#[cfg(not(feature = "etcd"))]
fn run_with_store(cli: Cli) -> Result<(), Box<dyn Error>> {
    warn!(
        "Built without the etcd feature, endpoints {:?} ignored. Using in-process store",
        cli.endpoints
    );

    run_participant(cli, MemoryStore::new().client())
}

fn run_participant<S: CoordinationStore>(cli: Cli, store: S) -> Result<(), Box<dyn Error>> {
    let identity = cli
        .identity
        .clone()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "participant".to_string());

    let mut timings = ElectionTimings::with_lease_ttl(Duration::from_secs(cli.ttl_secs));
    timings.keep_alive_interval = Duration::from_millis(cli.keep_alive_ms);
    timings.workload_interval = Duration::from_millis(cli.workload_ms);

    let mut workload = LoggingWorkload::new(identity.clone());
    if let Some(max_ticks) = cli.max_ticks {
        workload = workload.with_max_ticks(max_ticks);
    }

    let lease_loss_policy = if cli.terminate_on_loss {
        LeaseLossPolicy::Terminate
    } else {
        LeaseLossPolicy::Recontend
    };

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let config = ElectionConfiguration {
        identity: identity.clone(),
        election_key: cli.key,
        store,
        retry_timer: RandomizedRetryTimer::new(500, 5000),
        workload,
        timings,
        lease_loss_policy,
        events_tx: Some(events_tx),
    };

    info!("Server {} started", identity);
    let worker = lease_election::start_participant(config)?;

    let ctrl_c_rx = ctrl_c_channel()?;
    wait_for_exit(&events_rx, &ctrl_c_rx);

    worker.terminate();
    worker.join();

    info!("Server {} stopped", identity);
    Ok(())
}

/// Blocks until Ctrl-C or until the participant terminates on its own.
fn wait_for_exit(events_rx: &Receiver<ElectionEvent>, ctrl_c_rx: &Receiver<()>) {
    let mut ctrl_c_rx = Some(ctrl_c_rx);
    loop {
        let never = crossbeam_channel::never();
        let signal_rx = ctrl_c_rx.unwrap_or(&never);

        select!(
            recv(signal_rx) -> signal => {
                if signal.is_ok() {
                    info!("Ctrl-C received, shutting down");
                    return;
                }
                ctrl_c_rx = None;
            },
            recv(events_rx) -> event => match event {
                Ok(ElectionEvent::Terminated { .. }) | Err(_) => return,
                Ok(event) => debug!("{:?}", event),
            },
        );
    }
}

fn ctrl_c_channel() -> Result<Receiver<()>, Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (ctrl_c_tx, ctrl_c_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
        Ok(()) => {
            let _ = ctrl_c_tx.send(());
        }
        Err(err) => error!("Cannot listen for Ctrl-C: {}", err),
    });

    Ok(ctrl_c_rx)
}
