use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::info;

use vision_service::cli::CliArgs;
use vision_service::service::{registry::StreamRegistry, server, telemetry};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    telemetry::init_logging();
    telemetry::init_metrics_recorder();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        handler_shutdown.store(true, Ordering::SeqCst);
    })
    .context("failed to install signal handler")?;

    let registry = Arc::new(StreamRegistry::new());
    let server = server::spawn_rpc_server(&args.host, args.port, Arc::clone(&registry))?;

    info!(
        "vision service v{} listening on {}:{}",
        env!("CARGO_PKG_VERSION"),
        args.host,
        args.port
    );

    let start = Instant::now();
    let mut last_report = 0;
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_secs(1));

        let uptime = start.elapsed().as_secs();
        if uptime > 0 && uptime % 30 == 0 && uptime != last_report {
            last_report = uptime;
            info!(
                uptime_seconds = uptime,
                active_streams = registry.active_streams(),
                "service heartbeat"
            );
        }
    }

    info!("shutting down");
    registry.shutdown();
    server.stop();
    info!("vision service stopped");
    Ok(())
}
