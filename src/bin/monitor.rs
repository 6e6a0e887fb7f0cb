use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use slot_drift_monitor::{
    HttpSlotProber, ScanOrchestrator, ScanResult,
    alerts::AlertManager,
    config::read_config_file,
    util::get_scheduler_url,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Abort the scan after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Print the scan result as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("slot_drift_monitor", level),
        ("slot_monitor", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Config or startup failure, kept apart from the scan verdicts 0, 1 and 2
const STARTUP_FAILURE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(STARTUP_FAILURE)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = read_config_file(&args.file)?;
    if let Some(url) = get_scheduler_url() {
        debug!("scheduler url overridden from environment: {url}");
        config.scheduler_url = url;
    }
    let config = config.resolve()?;

    let prober = HttpSlotProber::new(config.scheduler_url.clone(), config.timeout)?;
    let orchestrator = ScanOrchestrator::new(Arc::new(prober), config.policy.clone())
        .with_concurrency(config.concurrency);
    let alert_manager = AlertManager::from_config(&config.alerts, config.timeout)?;

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, args.deadline);

    info!(
        "scanning {} processes against {}",
        config.processes.len(),
        config.scheduler_url
    );
    let result = orchestrator
        .scan_with_cancel(&config.processes, &cancel)
        .await;

    let failures = alert_manager.dispatch(&result).await;
    if failures > 0 {
        warn!("{failures} alert deliveries failed");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    Ok(exit_code(&result))
}

fn spawn_cancel_triggers(cancel: &CancellationToken, deadline: Option<u64>) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling scan");
            on_signal.cancel();
        }
    });

    if let Some(secs) = deadline {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("deadline of {secs}s reached, cancelling scan");
            on_deadline.cancel();
        });
    }
}

fn print_summary(result: &ScanResult) {
    for alert in &result.alerts {
        println!("ALERT {}", alert.message);
    }
    println!(
        "{} pairs evaluated, {} alerts, {} cancelled, {} failed",
        result.pairs_evaluated,
        result.alerts.len(),
        result.pairs_cancelled,
        result.pairs_failed
    );
}

fn exit_code(result: &ScanResult) -> ExitCode {
    if result.has_alerts() {
        ExitCode::from(1)
    } else if !result.is_complete() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
