//! Station entity and its curse/uncurse state machine.
//!
//! A station is one production unit with a timed order. `curse()` swaps
//! the roster for the fixed high-output trio shortly before the order
//! completes; `uncurse()` restores the remembered roster shortly after.
//! Each transition re-measures the order timer and schedules exactly one
//! follow-up task -- curse schedules the paired uncurse, uncurse schedules
//! the next curse. A failed transition schedules nothing: the station
//! stalls out of the live schedule until manual intervention.

use tracing::{debug, error, info, info_span, warn};

use crate::config::Config;
use crate::device::{Point, Region};
use crate::retry::{ClickOpts, Interactor};
use crate::scheduler::{TaskKind, TaskQueue};
use crate::timefmt;

pub mod roster;

pub use roster::{lookup, WorkerInfo, CURSE_ROSTER, UNKNOWN_WORKER};

pub type StationId = u32;

/// Where to find one worker in the list.
enum SearchTarget<'a> {
    Template(&'a str),
    Text(&'a str),
}

/// One stateful production unit.
#[derive(Debug, Clone)]
pub struct Station {
    id: StationId,
    position: Point,
    is_cursed: bool,
    saved_roster: Vec<String>,
    /// Best current estimate of when the running order completes
    /// (epoch seconds). Zero until the first successful timer read.
    execution_time: f64,
}

impl Station {
    pub fn new(id: StationId, position: Point) -> Self {
        Self {
            id,
            position,
            is_cursed: false,
            saved_roster: Vec::new(),
            execution_time: 0.0,
        }
    }

    pub fn id(&self) -> StationId {
        self.id
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn is_cursed(&self) -> bool {
        self.is_cursed
    }

    pub fn saved_roster(&self) -> &[String] {
        &self.saved_roster
    }

    pub fn execution_time(&self) -> f64 {
        self.execution_time
    }

    /// First contact after discovery: measure the order timer and queue
    /// the initial curse.
    pub fn initialize(&mut self, ix: &mut Interactor, cfg: &Config, queue: &mut TaskQueue) -> bool {
        let _span = info_span!("station", id = self.id).entered();
        debug!("initializing");
        if self.refresh_execution_time(ix, cfg) {
            self.schedule_curse(queue, cfg.station.prelay);
            true
        } else {
            false
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Swap in the curse roster. With `use_drones` the order is finished
    /// instantly and the uncurse runs straight after instead of being
    /// scheduled.
    pub fn curse(
        &mut self,
        ix: &mut Interactor,
        cfg: &Config,
        queue: &mut TaskQueue,
        use_drones: bool,
    ) -> bool {
        let _span = info_span!("station", id = self.id).entered();
        let started = ix.clock.now();
        info!("executing curse");

        if !self.ensure_inside(ix, cfg) {
            return false;
        }
        self.open_worker_panel(ix, cfg);
        self.save_roster(ix, cfg);

        ix.click_template("workers-deselect-all", ClickOpts::default());
        ix.wait("worker_deselect_all");

        let curse_roster: Vec<String> = CURSE_ROSTER.iter().map(|s| s.to_string()).collect();
        self.select_workers(ix, cfg, &curse_roster);

        if !self.confirm_roster(ix) {
            return false;
        }
        self.is_cursed = true;

        if use_drones {
            self.use_drones(ix);
            self.collect_order(ix);
            info!(
                elapsed = %format!("{:.2}s", ix.clock.now() - started),
                "curse with drones complete"
            );
            return self.uncurse(ix, cfg, queue);
        }

        if self.refresh_execution_time(ix, cfg) {
            self.schedule_uncurse(queue, cfg.station.post_delay);
            info!(
                elapsed = %format!("{:.2}s", ix.clock.now() - started),
                "curse complete"
            );
            return true;
        }
        false
    }

    /// Restore the remembered roster and queue the next curse.
    pub fn uncurse(&mut self, ix: &mut Interactor, cfg: &Config, queue: &mut TaskQueue) -> bool {
        let _span = info_span!("station", id = self.id).entered();
        let started = ix.clock.now();
        info!("executing uncurse");

        if !self.ensure_inside(ix, cfg) {
            return false;
        }
        self.open_worker_panel(ix, cfg);

        ix.click_template("workers-deselect-all", ClickOpts::default());
        ix.wait("worker_deselect_all");

        if self.saved_roster.is_empty() {
            warn!("no saved roster to restore");
        }
        let roster = std::mem::take(&mut self.saved_roster);
        self.select_workers(ix, cfg, &roster);

        if !self.confirm_roster(ix) {
            return false;
        }
        self.is_cursed = false;

        if self.refresh_execution_time(ix, cfg) {
            self.schedule_curse(queue, cfg.station.prelay);
            info!(
                elapsed = %format!("{:.2}s", ix.clock.now() - started),
                "uncurse complete"
            );
            return true;
        }
        false
    }

    // ── Navigation ───────────────────────────────────────────────────

    /// Precondition for every transition: be inside this station's
    /// interior view, entering it if needed. Bounded attempts.
    fn ensure_inside(&mut self, ix: &mut Interactor, cfg: &Config) -> bool {
        for _ in 0..cfg.station.enter_attempts {
            if ix.io.at_station_interior() {
                return true;
            }
            if self.enter_station(ix).0 {
                ix.wait("station_interior_load");
                return true;
            }
        }
        error!("failed to confirm entry");
        false
    }

    fn enter_station(&mut self, ix: &mut Interactor) -> (bool, u32) {
        ix.click_region(Region::around(self.position, 10), None, false);
        ix.wait("station_entry_dialog");
        let (success, retries) = ix.click_template(
            "station-entry-arrow",
            ClickOpts {
                max_retries: Some(0),
                ..Default::default()
            },
        );
        if success {
            return (true, retries);
        }

        // A just-collected order swallows the first tap's dialog.
        debug!("entry arrow missing; assuming order collected, tapping again");
        ix.clock.sleep(0.5);
        ix.click_region(Region::around(self.position, 10), Some(1), false);
        ix.wait("station_entry_dialog");
        ix.click_template("station-entry-arrow", ClickOpts::default())
    }

    fn open_worker_panel(&mut self, ix: &mut Interactor, cfg: &Config) -> bool {
        ix.wait("pre_workers_click");
        let button = cfg.screen.workers_entry_button;
        let (success, _) = ix.click_region(Region::around(button, 5), None, true);
        if success {
            ix.wait("workers_panel_load");
        }
        success
    }

    // ── Scanning ─────────────────────────────────────────────────────

    /// Re-measure the order timer; bounded OCR attempts.
    pub fn refresh_execution_time(&mut self, ix: &mut Interactor, cfg: &Config) -> bool {
        if !self.ensure_inside(ix, cfg) {
            return false;
        }
        for _ in 0..cfg.station.timer_read_attempts {
            ix.wait("timer_read_delay");
            let Some(frame) = ix.io.capture_screen() else {
                continue;
            };
            if let Some(remaining) = ix.io.read_region_timer(&frame, cfg.screen.order_timer_region)
            {
                let now = ix.clock.now();
                self.execution_time = now + remaining;
                info!(
                    eta = %timefmt::format_eta(now, self.execution_time),
                    "next execution"
                );
                return true;
            }
        }
        false
    }

    /// Record the three currently assigned worker names before cursing.
    fn save_roster(&mut self, ix: &mut Interactor, cfg: &Config) -> bool {
        let Some(frame) = ix.io.capture_screen() else {
            return false;
        };
        self.saved_roster.clear();
        for region in cfg.screen.roster_slots {
            let name = ix
                .io
                .read_region_text(&frame, region)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN_WORKER.to_string());
            self.saved_roster.push(name);
        }
        info!(roster = ?self.saved_roster, "saved roster");
        true
    }

    // ── Worker selection ─────────────────────────────────────────────

    fn sort_worker_list(&mut self, ix: &mut Interactor) {
        ix.click_template("worker-list-sort-by-trust", ClickOpts::default());
        ix.wait("worker_list_ready");
        ix.click_template("worker-list-sort-by-skill", ClickOpts::default());
        ix.wait("worker_list_ready");
    }

    fn select_workers(&mut self, ix: &mut Interactor, cfg: &Config, names: &[String]) {
        self.sort_worker_list(ix);

        let mut current_filter: Option<String> = None;
        for name in names {
            match roster::lookup(name) {
                Some(info) => {
                    let icon = format!("worker-category-{}-icon", info.category);
                    if current_filter.as_deref() != Some(icon.as_str())
                        && ix.click_template(&icon, ClickOpts::default()).0
                    {
                        current_filter = Some(icon);
                        ix.wait("category_filter_switch");
                    }
                    if !self.find_and_select(ix, cfg, &SearchTarget::Template(info.template)) {
                        warn!(worker = %name, "failed to find worker");
                    }
                }
                None => {
                    ix.click_template("worker-category-all-icon", ClickOpts::default());
                    current_filter = None;
                    if !self.find_and_select(ix, cfg, &SearchTarget::Text(name)) {
                        warn!(worker = %name, "failed to find worker by text");
                    }
                }
            }
        }
    }

    /// Swipe through the list until the target is visible and selected.
    fn find_and_select(&mut self, ix: &mut Interactor, cfg: &Config, target: &SearchTarget) -> bool {
        for _ in 0..cfg.station.max_search_swipes {
            let found = match target {
                SearchTarget::Template(template) => {
                    ix.click_template(
                        template,
                        ClickOpts {
                            max_retries: Some(1),
                            ..Default::default()
                        },
                    )
                    .0
                }
                SearchTarget::Text(text) => match ix.io.capture_screen() {
                    Some(frame) => match ix.io.find_text(&frame, text) {
                        Some(p) => ix.io.tap(p.x, p.y),
                        None => false,
                    },
                    None => false,
                },
            };
            if found {
                ix.wait("worker_selection_feedback");
                return true;
            }
            ix.slow_swipe(cfg.screen.worker_list_swipe);
        }
        false
    }

    fn confirm_roster(&mut self, ix: &mut Interactor) -> bool {
        let (success, _) = ix.click_template("workers-confirm", ClickOpts::default());
        if !success {
            return false;
        }
        ix.wait("worker_confirmation_dialog");
        ix.click_template(
            "workers-shift-confirm-prompt",
            ClickOpts {
                max_retries: Some(0),
                ..Default::default()
            },
        );
        ix.wait("worker_change_animation");
        true
    }

    // ── Drones & orders ──────────────────────────────────────────────

    fn use_drones(&mut self, ix: &mut Interactor) {
        if ix.click_template("drones-icon", ClickOpts::default()).0 {
            ix.wait("drone_interface_load");
            ix.click_template("drones-max-icon", ClickOpts::default());
            ix.wait("drone_interface_load");
            ix.click_template("drones-confirm", ClickOpts::default());
            ix.wait("drone_animation");
        }
    }

    fn collect_order(&mut self, ix: &mut Interactor) {
        ix.wait("order_check");
        if ix
            .click_template(
                "order-ready-to-deliver",
                ClickOpts {
                    max_retries: Some(0),
                    ..Default::default()
                },
            )
            .0
        {
            ix.wait("order_collection_animation");
        }
    }

    // ── Scheduling ───────────────────────────────────────────────────

    fn schedule_curse(&self, queue: &mut TaskQueue, prelay: f64) {
        if self.execution_time <= 0.0 {
            return;
        }
        let curse_time = self.execution_time - prelay;
        queue.schedule(curse_time, self.id, TaskKind::Curse);
        debug!(time = curse_time, "scheduled curse");
    }

    fn schedule_uncurse(&self, queue: &mut TaskQueue, post_delay: f64) {
        if self.execution_time <= 0.0 {
            return;
        }
        let uncurse_time = self.execution_time + post_delay;
        queue.schedule(uncurse_time, self.id, TaskKind::Uncurse);
        debug!(time = uncurse_time, "scheduled uncurse");
    }
}
