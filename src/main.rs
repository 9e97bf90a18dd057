use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Builder;

use dv_netsim::{Simulation, SimulationConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Deterministic rounds on the current thread
    Step,
    /// One task per router, host and link
    Tasks,
}

#[derive(Parser)]
#[command(name = "dv-netsim", about = "Distance-vector router network simulator")]
struct Cli {
    /// Network description (JSON)
    #[arg(long, short)]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = Mode::Step)]
    mode: Mode,

    /// Round limit per settling phase in step mode
    #[arg(long, default_value_t = 100)]
    rounds: usize,

    /// Wall-clock run time in tasks mode
    #[arg(long, default_value_t = 2000)]
    duration_ms: u64,

    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = SimulationConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let mut sim = Simulation::from_config(&config).context("building network")?;
    info!(
        "network: {} routers, {} hosts, {} links",
        sim.routers().len(),
        sim.hosts().len(),
        sim.links().len()
    );

    sim.start();
    let sim = match cli.mode {
        Mode::Step => {
            let rounds = sim.settle(cli.rounds)?;
            info!("routing settled in {} rounds", rounds);
            let sent = sim.send_scheduled();
            let rounds = sim.settle(cli.rounds)?;
            info!("{} packets delivered in {} rounds", sent, rounds);
            sim
        }
        Mode::Tasks => {
            let rt = Builder::new_multi_thread().enable_all().build()?;
            rt.block_on(sim.run_for(Duration::from_millis(cli.duration_ms)))?
        }
    };

    print_summary(&sim);
    Ok(())
}

fn print_summary(sim: &Simulation) {
    for router in sim.routers() {
        println!("{}", router.table().report());
        let stats = router.stats();
        println!(
            "  forwarded {} dropped {} adverts sent {} updates {} malformed {}\n",
            stats.forwarded,
            stats.dropped,
            stats.advertisements_sent,
            stats.updates_received,
            stats.malformed_updates
        );
    }
    for link in sim.links() {
        println!("{}: delivered {} dropped {}", link.label(), link.delivered(), link.dropped());
    }
    for host in sim.hosts() {
        println!("{} received {} packets", host.address(), host.received_total());
        for packet in host.received() {
            println!("  {}", packet);
        }
    }
}
