use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use std::process;
use std::sync::Arc;

use reconmap::cancel::CancelHandle;
use reconmap::cli::Args;
use reconmap::config::{self, load_config};
use reconmap::engine::ReconEngine;
use reconmap::output::OutputManager;
use reconmap::progress::{LogReporter, ProgressReporter, Reporter};
use reconmap::sources;
use reconmap::types::ReconOutcome;

const BANNER: &str = r#"
    ____                          __  ___
   / __ \___  _________  ____    /  |/  /___ _____
  / /_/ / _ \/ ___/ __ \/ __ \  / /|_/ / __ `/ __ \
 / _, _/  __/ /__/ /_/ / / / / / /  / / /_/ / /_/ /
/_/ |_|\___/\___/\____/_/ /_/ /_/  /_/\__,_/ .___/
                                          /_/
        Passive External Attack-Surface Mapper
"#;

const EXIT_EMPTY: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(args.log_level())
        .init();

    if !args.silent {
        eprintln!("{}", BANNER);
    }

    if args.list_sources {
        list_sources();
        return Ok(());
    }

    let Some(target) = args.target.clone() else {
        error!("No target provided. Use -t <domain>");
        process::exit(EXIT_EMPTY);
    };

    let mut config = load_config(args.config_path.as_deref())?;
    apply_args(&mut config, &args)?;

    let reporter: Arc<dyn Reporter> = if args.use_progress() {
        Arc::new(ProgressReporter::new())
    } else {
        Arc::new(LogReporter)
    };

    let engine = ReconEngine::new(&config, reporter)?;
    let output = OutputManager::new(config.output.clone());

    let handle = CancelHandle::new();
    let signal = handle.signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing with partial results");
            handle.cancel();
        }
    });

    let outcome = engine
        .run(&target, &signal)
        .await
        .map_err(|e| anyhow::anyhow!("Reconnaissance failed: {}", e))?;

    match outcome {
        ReconOutcome::Cancelled => {
            warn!("Interrupted before any host was resolved, nothing to report");
            process::exit(EXIT_CANCELLED);
        }
        ReconOutcome::Empty(reason) => {
            warn!("Nothing to report for {}: {}", target, reason);
            process::exit(EXIT_EMPTY);
        }
        ReconOutcome::Report(report) => {
            output.write_report(&report)?;

            info!(
                "Mapped {} live hosts on {} addresses from {} candidates in {:.2}s",
                report.stats.alive,
                report.stats.unique_addresses,
                report.stats.candidates,
                report.stats.duration.as_secs_f64()
            );

            if report.partial {
                warn!("Run was interrupted, report is partial");
                process::exit(EXIT_CANCELLED);
            }
        }
    }

    Ok(())
}

fn apply_args(config: &mut reconmap::Config, args: &Args) -> Result<()> {
    if let Some(threads) = args.threads {
        config.resolver.concurrency = threads;
    }
    if let Some(timeout) = args.timeout {
        config.resolver.timeout = config::seconds(timeout, "--timeout")?;
    }
    args.apply_output(&mut config.output);

    config::validate_config(config)?;
    Ok(())
}

fn list_sources() {
    println!("Available sources (queried in fallback order):\n");

    for (position, source) in sources::get_all_sources().iter().enumerate() {
        let info = source.info();
        println!("  {}. {:<14} {}", position + 1, info.name, info.description);
    }

    println!("\nTo change the order or thresholds, edit the [enumeration] section of the config file.");
}
