//! Deterministic simulation harness for the scheduler.
//!
//! Provides a scripted device backend and a seeded RNG so the whole
//! curse/uncurse protocol can run end-to-end in virtual time: same seed,
//! same schedule, same report. Used by the CLI `simulate` command and the
//! integration tests.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

use serde::Serialize;

use crate::clock::{Clock, SimClock};
use crate::config::Config;
use crate::device::{Actuation, Frame, Navigation, Perception, Point, Region, TemplateMatch};
use crate::error::CoreError;
use crate::scheduler::Scheduler;
use crate::waits::WaitOptimizer;

/// Deterministic random number generator (Xorshift64*).
#[derive(Debug, Clone, Copy)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Random value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Random bool that is true with the given probability.
    pub fn next_bool(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }
}

/// Worker names the scripted OCR hands back for roster slots.
const SIM_ROSTER_TEXTS: [&str; 3] = ["Texas", "Lappland", "Exusiai"];

/// Scripted implementation of all three capability traits.
///
/// Template matches, taps and OCR reads succeed unless the seeded flake
/// roll says otherwise; order-timer reads cycle through a fixed script.
#[derive(Debug)]
pub struct SimDevice {
    rng: DeterministicRng,
    /// Probability that any single action silently fails.
    pub flake_rate: f64,
    /// Whether the interior-view predicate reports true.
    pub inside_interior: bool,
    /// Force every action to fail, flake roll aside.
    pub fail_all_actions: bool,
    timer_script: Vec<f64>,
    timer_index: usize,
    roster_index: usize,
    next_frame: u64,
    pub taps: u32,
    pub swipes: u32,
    pub captures: u32,
    template_clicks: HashMap<String, u32>,
}

impl SimDevice {
    pub fn new(seed: u64, timer_script: Vec<f64>) -> Self {
        Self::with_flake(seed, timer_script, 0.0)
    }

    pub fn with_flake(seed: u64, timer_script: Vec<f64>, flake_rate: f64) -> Self {
        Self {
            rng: DeterministicRng::new(seed),
            flake_rate,
            inside_interior: true,
            fail_all_actions: false,
            timer_script,
            timer_index: 0,
            roster_index: 0,
            next_frame: 0,
            taps: 0,
            swipes: 0,
            captures: 0,
            template_clicks: HashMap::new(),
        }
    }

    /// How many times a template was successfully matched.
    pub fn template_clicks(&self, name: &str) -> u32 {
        self.template_clicks.get(name).copied().unwrap_or(0)
    }

    fn acts(&mut self) -> bool {
        !self.fail_all_actions && !self.rng.next_bool(self.flake_rate)
    }
}

impl Actuation for SimDevice {
    fn tap(&mut self, _x: i32, _y: i32) -> bool {
        self.taps += 1;
        self.acts()
    }

    fn swipe(&mut self, _from: Point, _to: Point, _duration_ms: u32) -> bool {
        self.swipes += 1;
        self.acts()
    }
}

impl Perception for SimDevice {
    fn capture_screen(&mut self) -> Option<Frame> {
        self.captures += 1;
        if self.fail_all_actions {
            return None;
        }
        self.next_frame += 1;
        Some(Frame(self.next_frame))
    }

    fn match_template(&mut self, _frame: &Frame, name: &str, _threshold: f32) -> Vec<TemplateMatch> {
        if !self.acts() {
            return Vec::new();
        }
        *self.template_clicks.entry(name.to_string()).or_insert(0) += 1;
        vec![TemplateMatch {
            x: 640,
            y: 360,
            confidence: 0.95,
        }]
    }

    fn read_region_text(&mut self, _frame: &Frame, _region: Region) -> Option<String> {
        if !self.acts() {
            return None;
        }
        let name = SIM_ROSTER_TEXTS[self.roster_index % SIM_ROSTER_TEXTS.len()];
        self.roster_index += 1;
        Some(name.to_string())
    }

    fn read_region_timer(&mut self, _frame: &Frame, _region: Region) -> Option<f64> {
        if self.timer_script.is_empty() || !self.acts() {
            return None;
        }
        let value = self.timer_script[self.timer_index % self.timer_script.len()];
        self.timer_index += 1;
        Some(value)
    }

    fn find_text(&mut self, _frame: &Frame, _text: &str) -> Option<Point> {
        if !self.acts() {
            return None;
        }
        Some(Point::new(640, 360))
    }
}

impl Navigation for SimDevice {
    fn at_base(&mut self) -> bool {
        true
    }

    fn at_station_interior(&mut self) -> bool {
        self.inside_interior
    }

    fn reach_base_left(&mut self) -> bool {
        true
    }
}

/// One reproducible end-to-end run.
#[derive(Debug, Clone)]
pub struct SimulationScenario {
    pub seed: u64,
    pub stations: u32,
    /// Stop after this many dispatched obligations.
    pub max_dispatches: u64,
    /// Probability that any single device action silently fails.
    pub flake_rate: f64,
    /// Order-timer readings, cycled.
    pub timer_script: Vec<f64>,
    /// Virtual epoch at scenario start.
    pub start_time: f64,
    /// Safety cap on virtual elapsed time.
    pub max_virtual_secs: f64,
}

impl Default for SimulationScenario {
    fn default() -> Self {
        Self {
            seed: 42,
            stations: 3,
            max_dispatches: 12,
            flake_rate: 0.0,
            timer_script: vec![600.0, 40.0, 612.0, 38.0, 594.0, 41.0],
            start_time: 1_700_000_000.0,
            max_virtual_secs: 7.0 * 86_400.0,
        }
    }
}

/// Outcome of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub dispatches: u64,
    pub expedited: u64,
    pub queue_len: usize,
    pub virtual_elapsed: f64,
    pub wait_report: String,
}

/// Build a scheduler wired to the scripted device, stations registered
/// and bootstrapped. The wait controller is injected so callers can
/// merge previously saved profiles before the first action runs.
pub fn build_scheduler<C: Clock>(
    config: Config,
    scenario: &SimulationScenario,
    clock: C,
    waits: WaitOptimizer,
) -> Result<Scheduler<SimDevice, C>, CoreError> {
    let config = config.effective();
    let device = SimDevice::with_flake(scenario.seed, scenario.timer_script.clone(), scenario.flake_rate);
    let mut scheduler = Scheduler::new(config, device, clock, waits)?;
    for i in 0..scenario.stations {
        scheduler.add_station(Point::new(200 + i as i32 * 160, 420));
    }
    scheduler.bootstrap();
    Ok(scheduler)
}

/// Run a scenario to completion in virtual time with a fresh wait
/// controller.
pub fn run_scenario(
    config: Config,
    scenario: &SimulationScenario,
) -> Result<SimulationReport, CoreError> {
    let waits = WaitOptimizer::new(config.waits.enabled, config.waits.max_retries);
    let mut scheduler =
        build_scheduler(config, scenario, SimClock::new(scenario.start_time), waits)?;
    let stop = AtomicBool::new(false);
    let started = scenario.start_time;

    while scheduler.dispatches() < scenario.max_dispatches
        && !scheduler.queue_is_empty()
        && scheduler.clock().now() - started < scenario.max_virtual_secs
    {
        scheduler.step(&stop)?;
    }

    Ok(SimulationReport {
        dispatches: scheduler.dispatches(),
        expedited: scheduler.expedited(),
        queue_len: scheduler.queue_len(),
        virtual_elapsed: scheduler.clock().now() - started,
        wait_report: scheduler.waits().report(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_is_deterministic() {
        let mut a = DeterministicRng::new(42);
        let mut b = DeterministicRng::new(42);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn rng_f64_in_unit_interval() {
        let mut rng = DeterministicRng::new(7);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn single_station_cycles_curse_and_uncurse() {
        let mut config = Config::default();
        config.testing = true;
        let scenario = SimulationScenario {
            stations: 1,
            max_dispatches: 4,
            timer_script: vec![600.0, 40.0],
            ..Default::default()
        };
        let report = run_scenario(config, &scenario).unwrap();
        assert_eq!(report.dispatches, 4);
        assert_eq!(report.expedited, 0);
        // The schedule stays live: there is always a follow-up queued.
        assert!(report.queue_len >= 1);
        assert!(report.virtual_elapsed > 0.0);
    }

    #[test]
    fn close_windows_trigger_the_drone_path() {
        let mut config = Config::default();
        config.testing = true;
        let scenario = SimulationScenario {
            stations: 2,
            max_dispatches: 2,
            // First reads put the two curses ~100s apart, inside the
            // default 240s conflict threshold.
            timer_script: vec![600.0, 700.0],
            ..Default::default()
        };
        let report = run_scenario(config, &scenario).unwrap();
        assert!(report.expedited >= 1, "report = {report:?}");
    }

    #[test]
    fn waits_learn_down_over_a_run() {
        let mut config = Config::default();
        config.testing = true;
        let scenario = SimulationScenario {
            stations: 2,
            max_dispatches: 8,
            ..Default::default()
        };
        let waits = WaitOptimizer::new(true, config.waits.max_retries);
        let mut scheduler =
            build_scheduler(config, &scenario, SimClock::new(scenario.start_time), waits)
                .unwrap();
        let stop = AtomicBool::new(false);
        while scheduler.dispatches() < scenario.max_dispatches && !scheduler.queue_is_empty() {
            scheduler.step(&stop).unwrap();
        }
        // Every template click landed first try, so the estimate decayed
        // below its seed.
        let estimate = scheduler.waits().estimate("template_click").unwrap();
        assert!(estimate < 0.5, "estimate = {estimate}");
    }

    #[test]
    fn flaky_channel_still_makes_progress() {
        let mut config = Config::default();
        config.testing = true;
        let scenario = SimulationScenario {
            stations: 2,
            max_dispatches: 4,
            flake_rate: 0.2,
            ..Default::default()
        };
        let report = run_scenario(config, &scenario).unwrap();
        assert!(report.dispatches >= 1);
    }

    #[test]
    fn same_seed_same_schedule() {
        let scenario = SimulationScenario {
            stations: 2,
            max_dispatches: 6,
            flake_rate: 0.1,
            ..Default::default()
        };
        let mut config_a = Config::default();
        config_a.testing = true;
        let mut config_b = Config::default();
        config_b.testing = true;
        let a = run_scenario(config_a, &scenario).unwrap();
        let b = run_scenario(config_b, &scenario).unwrap();
        assert_eq!(a.dispatches, b.dispatches);
        assert_eq!(a.expedited, b.expedited);
    }
}
