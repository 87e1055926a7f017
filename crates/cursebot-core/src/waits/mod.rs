//! Adaptive wait timing.
//!
//! Every discrete UI action has a named wait (animation, screen load,
//! dialog) whose duration nobody knows up front. The optimizer starts from
//! pessimistic seeds, shrinks an estimate a little every time the action
//! succeeds on the first try, and blends it upward when the action needed
//! retries. Failures expand the wait temporarily for the current retry
//! chain only -- a hard failure is no evidence the timing is wrong.
//!
//! Estimates never leave `[floor, ceiling]` regardless of how extreme a
//! learning delta would be.

use std::collections::{HashMap, VecDeque};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod store;

pub use store::WaitProfileSnapshot;

/// Bounded history length per operation.
const HISTORY_CAP: usize = 100;

/// Learning-rule constants.
#[derive(Debug, Clone, Copy)]
pub struct WaitTuning {
    /// Multiplicative decay applied on clean first-attempt success.
    pub success_delta: f64,
    /// Multiplier for the temporary wait after a failed attempt.
    pub retry_expansion: f64,
    /// Margin applied to the observed wait when learning upward.
    pub safety_margin: f64,
    /// Weight kept on the stored estimate when blending in a slow sample.
    pub blend_retained: f64,
    /// Lower clamp for stored estimates (seconds).
    pub floor: f64,
    /// Upper clamp for stored estimates (seconds).
    pub ceiling: f64,
    /// Absolute cap on the temporary retry wait (seconds).
    pub retry_ceiling: f64,
    /// Smallest wait ever handed out (seconds).
    pub min_wait: f64,
    /// Relative jitter applied to handed-out waits.
    pub jitter: f64,
    /// Consecutive in-margin updates before an estimate reads as stable.
    pub stability_threshold: u32,
    /// Relative margin for the convergence check.
    pub convergence_margin: f64,
    /// Seed estimate for operations with no compiled-in default.
    pub default_seed: f64,
}

impl Default for WaitTuning {
    fn default() -> Self {
        Self {
            success_delta: 0.97,
            retry_expansion: 1.35,
            safety_margin: 1.05,
            blend_retained: 0.7,
            floor: 0.1,
            ceiling: 10.0,
            retry_ceiling: 15.0,
            min_wait: 0.05,
            jitter: 0.01,
            stability_threshold: 5,
            convergence_margin: 0.1,
            default_seed: 0.5,
        }
    }
}

/// One recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitSample {
    pub wait_used: f64,
    pub success: bool,
    pub retries: u32,
}

/// Rolling convergence signal for one operation. Reporting only -- never
/// feeds back into control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    pub baseline: f64,
    pub stable_count: u32,
}

/// What the retry executor should do after an outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryDecision {
    pub should_retry: bool,
    /// Total wait for the next attempt. Temporary on failure; the updated
    /// stored estimate on success.
    pub next_wait: f64,
}

/// Self-tuning wait-time controller.
///
/// A process-wide single instance in practice, owned by the scheduler and
/// passed down -- never a global.
pub struct WaitOptimizer {
    enabled: bool,
    max_retries: u32,
    tuning: WaitTuning,
    estimates: HashMap<String, f64>,
    history: HashMap<String, VecDeque<WaitSample>>,
    convergence: HashMap<String, ConvergenceState>,
}

impl WaitOptimizer {
    pub fn new(enabled: bool, max_retries: u32) -> Self {
        Self::with_tuning(enabled, max_retries, WaitTuning::default())
    }

    pub fn with_tuning(enabled: bool, max_retries: u32, tuning: WaitTuning) -> Self {
        Self {
            enabled,
            max_retries,
            tuning,
            estimates: seed_defaults(),
            history: HashMap::new(),
            convergence: HashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Retry budget shared by every discrete UI action.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Stored estimate for an operation, if any update or seed exists.
    pub fn estimate(&self, op: &str) -> Option<f64> {
        self.estimates.get(op).copied()
    }

    /// Current wait for an operation: the stored estimate with a small
    /// random jitter, floored at the minimum wait.
    ///
    /// The jitter keeps many stations from hammering the channel with
    /// exactly repeating timings.
    pub fn get_wait(&self, op: &str) -> f64 {
        self.get_wait_min(op, self.tuning.min_wait)
    }

    pub fn get_wait_min(&self, op: &str, min_wait: f64) -> f64 {
        let base = self
            .estimates
            .get(op)
            .copied()
            .unwrap_or(self.tuning.default_seed);
        if !self.enabled {
            return base.max(min_wait);
        }
        let j = self.tuning.jitter;
        let variance = 1.0 + rand::thread_rng().gen_range(-j..=j);
        (base * variance).max(min_wait)
    }

    /// Feed back one observed outcome and get the retry decision.
    pub fn record_outcome(
        &mut self,
        op: &str,
        wait_used: f64,
        success: bool,
        retries: u32,
    ) -> RetryDecision {
        if !self.enabled {
            return RetryDecision {
                should_retry: false,
                next_wait: wait_used,
            };
        }

        let hist = self.history.entry(op.to_string()).or_default();
        if hist.len() == HISTORY_CAP {
            hist.pop_front();
        }
        hist.push_back(WaitSample {
            wait_used,
            success,
            retries,
        });

        let current = self
            .estimates
            .get(op)
            .copied()
            .unwrap_or(self.tuning.default_seed);

        if success {
            let next = if retries == 0 {
                // The action landed without waiting extra: the estimate is
                // too generous, shrink it.
                current * self.tuning.success_delta
            } else {
                // The true required wait is closer to what was actually
                // consumed; blend, majority weight on history.
                let target = wait_used * self.tuning.safety_margin;
                let blended =
                    current * self.tuning.blend_retained + target * (1.0 - self.tuning.blend_retained);
                info!(
                    op = op,
                    from = current,
                    to = blended,
                    actual = wait_used,
                    "wait adapted up"
                );
                blended
            };
            let stored = self.update_estimate(op, next);
            RetryDecision {
                should_retry: false,
                next_wait: stored,
            }
        } else if retries < self.max_retries {
            // Expand only the current call chain; the stored estimate is
            // untouched.
            let next = (wait_used * self.tuning.retry_expansion).min(self.tuning.retry_ceiling);
            RetryDecision {
                should_retry: true,
                next_wait: next,
            }
        } else {
            debug!(op = op, "failed at max retries; timing unchanged");
            RetryDecision {
                should_retry: false,
                next_wait: current,
            }
        }
    }

    /// Clamp and store a new estimate, then roll the convergence state.
    fn update_estimate(&mut self, op: &str, value: f64) -> f64 {
        let clamped = value.clamp(self.tuning.floor, self.tuning.ceiling);
        self.estimates.insert(op.to_string(), clamped);

        let state = self
            .convergence
            .entry(op.to_string())
            .or_insert(ConvergenceState {
                baseline: clamped,
                stable_count: 0,
            });
        if ((clamped - state.baseline) / state.baseline).abs() < self.tuning.convergence_margin {
            state.stable_count += 1;
        } else {
            state.baseline = clamped;
            state.stable_count = 0;
        }
        clamped
    }

    /// Whether an operation's estimate has stopped moving.
    pub fn is_stable(&self, op: &str) -> bool {
        self.convergence
            .get(op)
            .is_some_and(|s| s.stable_count >= self.tuning.stability_threshold)
    }

    /// Export the full state for persistence.
    pub fn snapshot(&self) -> WaitProfileSnapshot {
        WaitProfileSnapshot {
            estimates: self.estimates.clone(),
            history: self.history.clone(),
            convergence: self.convergence.clone(),
        }
    }

    /// Merge a loaded snapshot over the compiled-in defaults. Unknown
    /// operation keys are accepted, not rejected.
    pub fn apply_snapshot(&mut self, snapshot: WaitProfileSnapshot) {
        for (op, value) in snapshot.estimates {
            if !self.estimates.contains_key(&op) {
                debug!(op = %op, value, "loaded wait key with no compiled-in default");
            }
            self.estimates.insert(op, value);
        }
        self.history = snapshot.history;
        self.convergence = snapshot.convergence;
    }

    /// Render the wait-optimization table.
    pub fn report(&self) -> String {
        let header = format!(
            "{:<32} | {:<8} | {:<10} | {:<7} | {:<9}",
            "OPERATION", "WAIT", "STATUS", "SAMPLES", "SUCCESS %"
        );
        let sep = "-".repeat(header.len());
        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');
        out.push_str(&sep);
        out.push('\n');

        let mut ops: Vec<&String> = self.estimates.keys().collect();
        ops.sort();
        for op in ops {
            let value = self.estimates[op];
            let hist = self.history.get(op);
            let count = hist.map_or(0, VecDeque::len);

            let status = if self.is_stable(op) {
                "STABLE"
            } else if self.convergence.contains_key(op) {
                "ADAPTING"
            } else if count > 0 {
                "LEARNING"
            } else {
                "NEW"
            };

            let success_pct = match hist {
                Some(h) if !h.is_empty() => {
                    let successes = h.iter().filter(|s| s.success).count();
                    format!("{:.0}%", successes as f64 / h.len() as f64 * 100.0)
                }
                _ => "N/A".to_string(),
            };

            out.push_str(&format!(
                "{op:<32} | {value:5.2}s  | {status:<10} | {count:<7} | {success_pct:>9}\n"
            ));
        }
        out
    }
}

/// Initial pessimistic wait times per named operation.
fn seed_defaults() -> HashMap<String, f64> {
    let seeds: &[(&str, f64)] = &[
        // Navigation & base
        ("base_transition", 5.0),
        ("base_overview_load", 0.5),
        ("base_left_position", 0.5),
        // Station interactions
        ("station_tap", 0.5),
        ("station_entry_dialog", 1.0),
        ("station_interior_load", 0.5),
        ("workers_panel_load", 1.0),
        ("pre_workers_click", 0.5),
        // Worker management
        ("worker_list_ready", 0.15),
        ("category_filter_switch", 0.15),
        ("worker_selection_feedback", 0.3),
        ("worker_deselect_all", 0.5),
        ("worker_confirmation_dialog", 1.0),
        ("worker_change_animation", 1.0),
        // Drones & orders
        ("drone_interface_load", 0.5),
        ("drone_animation", 1.5),
        ("order_collection_animation", 1.5),
        ("order_check", 0.5),
        // Low-level operations
        ("swipe_completion", 0.2),
        ("slow_swipe_completion", 0.2),
        ("template_check_interval", 0.5),
        ("template_click", 0.5),
        ("region_click", 0.5),
        ("screen_transition", 0.5),
        // Post-action delays
        ("post_click_wait", 0.3),
        ("post_region_click", 0.3),
        ("post_navigation", 0.5),
        // OCR / vision
        ("text_find", 0.5),
        ("timer_read_delay", 1.0),
    ];
    seeds.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
