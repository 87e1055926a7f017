use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Args;
use cursebot_core::simulation::build_scheduler;
use cursebot_core::timefmt::format_remaining;
use cursebot_core::{Clock, Config, SimClock, SimulationScenario, SystemClock, WaitOptimizer};

#[derive(Args)]
pub struct SimulateArgs {
    /// Stations to register
    #[arg(long, default_value_t = 3)]
    pub stations: u32,
    /// Stop after this many dispatched tasks
    #[arg(long, default_value_t = 12)]
    pub dispatches: u64,
    /// Seed for the scripted device
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Probability that any single device action silently fails
    #[arg(long, default_value_t = 0.0)]
    pub flake: f64,
    /// Run on the real wall clock instead of virtual time
    #[arg(long)]
    pub realtime: bool,
    /// Persist learned wait profiles at exit
    #[arg(long)]
    pub save: bool,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    config.testing = true;

    let scenario = SimulationScenario {
        seed: args.seed,
        stations: args.stations,
        max_dispatches: args.dispatches,
        flake_rate: args.flake,
        ..Default::default()
    };

    let stop = Arc::new(AtomicBool::new(false));
    spawn_signal_watcher(stop.clone());

    let save_path = if args.save {
        Some(config.waits_save_path()?)
    } else {
        None
    };

    if args.realtime {
        drive(config, &scenario, SystemClock, &stop, save_path.as_deref())
    } else {
        drive(
            config,
            &scenario,
            SimClock::new(scenario.start_time),
            &stop,
            save_path.as_deref(),
        )
    }
}

fn drive<C: Clock>(
    config: Config,
    scenario: &SimulationScenario,
    clock: C,
    stop: &AtomicBool,
    save_to: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut waits = WaitOptimizer::new(config.waits.enabled, config.waits.max_retries);
    if let Some(path) = save_to {
        // Carry the timing model across runs.
        waits.load_saved(path);
    }
    let started = clock.now();
    let mut scheduler = build_scheduler(config, scenario, clock, waits)?;

    while !stop.load(Ordering::Relaxed)
        && scheduler.dispatches() < scenario.max_dispatches
        && !scheduler.queue_is_empty()
    {
        scheduler.step(stop)?;
    }

    let elapsed = scheduler.clock().now() - started;
    println!("dispatches: {}", scheduler.dispatches());
    println!("expedited:  {}", scheduler.expedited());
    println!("queued:     {}", scheduler.queue_len());
    println!("elapsed:    {}", format_remaining(elapsed));
    println!();
    print!("{}", scheduler.waits().report());

    if let Some(path) = save_to {
        scheduler.waits().persist(path)?;
        println!("saved wait profiles to {}", path.display());
    }
    Ok(())
}

/// Raise the stop flag on Ctrl-C so the loop winds down cleanly and the
/// wait-profile save still runs.
fn spawn_signal_watcher(stop: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_io().build() else {
            return;
        };
        rt.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; finishing current step");
                stop.store(true, Ordering::SeqCst);
            }
        });
    });
}
