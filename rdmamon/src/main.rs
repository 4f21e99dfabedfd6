mod app;
mod config;
mod data;
mod ebpf;
mod report;
mod verbs;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser)]
#[command(name = "rdmamon", about = "eBPF-based RDMA control-path monitor")]
struct Cli {
    /// Threshold configuration file
    #[arg(short, long, default_value = "rdmamon.conf")]
    config: PathBuf,

    /// Sampling interval in seconds
    #[arg(short, long, default_value_t = 1)]
    interval: u64,

    /// Compiled instrumentation BPF object
    #[arg(long, default_value = "rdma_monitor.bpf.o")]
    bpf_object: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    // Missing or malformed config degrades to all-disabled ceilings; the
    // monitor still runs.
    let config = config::InterceptionConfig::load(&cli.config);

    // The only fatal condition: without the counter maps and event ring
    // there is nothing to observe.
    let mut probes = ebpf::loader::Probes::load(&cli.bpf_object)
        .context("establishing instrumentation layer")?;

    if let Err(e) = probes.push_config(&config) {
        log::warn!("threshold push-down failed: {e:#}; continuing observe-only");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .context("installing termination handler")?;

    let interval = Duration::from_secs(cli.interval.max(1));
    let mut app = app::App::new(probes, config, interval, shutdown);
    app.run()
}
