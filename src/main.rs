use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use clap::Parser;
use log::{debug, error, info};
use sail_routing::config::RunConfig;
use sail_routing::engine::error::RoutingError;
use sail_routing::engine::models::ProgressEvent;
use sail_routing::engine::report::RouteReport;
use sail_routing::engine::router::IsochroneRouter;

#[derive(Parser)]
#[command(author, version, about = "Isochrone sailing route planner")]
struct Cli {
    /// Run configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Write the route report as JSON to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Expansion worker threads (overrides the config file)
    #[arg(long)]
    threads: Option<usize>,

    /// Log every iteration
    #[arg(long, short)]
    verbose: bool,
}

fn log_progress(events: mpsc::Receiver<ProgressEvent>) {
    for event in events {
        debug!(
            "leg {} iteration {}: hour {:.2}, frontier {}, cloud {}",
            event.leg, event.iteration, event.simulated_hour, event.frontier_size, event.cloud_size
        );
        if event.iteration > 0 && event.iteration % 50 == 0 {
            info!("leg {}: {} iterations, simulated hour {:.1}", event.leg, event.iteration, event.simulated_hour);
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut config = RunConfig::load(&cli.config)?;
    if let Some(threads) = cli.threads {
        config.router.worker_threads = Some(threads);
    }

    let polar = config.polar.load()?;
    let wind = config.wind.build()?;
    let land_mask = config.load_land_mask()?;

    let (tx, rx) = mpsc::channel();
    let logger = thread::spawn(move || log_progress(rx));

    let mut router = IsochroneRouter::new(&config.router, &polar, wind.as_ref())?.with_progress(tx);
    if let Some(mask) = &land_mask {
        router = router.with_water_mask(mask);
    }
    info!(
        "Routing {} waypoints on {} worker threads",
        config.waypoints.len(),
        router.worker_threads()
    );

    let result = router.route(&config.waypoints);
    // Closes the progress channel
    drop(router);
    let _ = logger.join();
    let route = result?;

    let report = RouteReport::build(&route, &polar, wind.as_ref(), config.departure)?;
    print!("{}", report.to_text());

    if let Some(path) = &cli.output {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!("Report written to {:?}", path);
    }
    Ok(())
}

fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::builder().filter_level(level).parse_default_env().init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let exhausted = err.downcast_ref::<RoutingError>().is_some_and(RoutingError::is_exhausted);
            error!("{}", error_chain(err.as_ref()));
            if exhausted {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
