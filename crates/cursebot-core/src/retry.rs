//! Bounded retry execution with adaptive waits.
//!
//! Every discrete UI step (tap a building, click a template, confirm a
//! dialog) goes through [`execute`]: wait the learned duration, run the
//! action, feed the outcome back, and on failure sleep only the extra
//! delta the controller asks for before trying again. This is the single
//! place where actions and timing interact.

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::device::{Device, Region, Swipe};
use crate::waits::WaitOptimizer;

/// Run a boolean action under the wait/backoff policy.
///
/// Returns the success flag and the number of retries consumed (0 means
/// the first attempt landed).
pub fn execute<F>(
    waits: &mut WaitOptimizer,
    clock: &dyn Clock,
    op: &str,
    max_retries: u32,
    mut action: F,
) -> (bool, u32)
where
    F: FnMut() -> bool,
{
    for retries in 0..=max_retries {
        let wait = waits.get_wait(op);
        clock.sleep(wait);

        let success = action();
        let decision = waits.record_outcome(op, wait, success, retries);

        if success {
            return (true, retries);
        }
        if !decision.should_retry || retries >= max_retries {
            debug!(op = op, attempts = retries + 1, "action failed");
            break;
        }
        // The controller returns the total wait for the next attempt; the
        // base portion was already consumed above.
        let extra = decision.next_wait - wait;
        if extra > 0.0 {
            clock.sleep(extra);
        }
    }
    (false, max_retries)
}

/// Options for template clicks.
#[derive(Debug, Clone, Copy)]
pub struct ClickOpts {
    pub threshold: f32,
    /// Override of the optimizer's retry budget.
    pub max_retries: Option<u32>,
    pub wait_after: bool,
}

impl Default for ClickOpts {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            max_retries: None,
            wait_after: true,
        }
    }
}

/// Bundles the device, the wait controller and the clock for one chain of
/// UI interactions. Station transitions receive one of these per
/// dispatch.
pub struct Interactor<'a> {
    pub io: &'a mut dyn Device,
    pub waits: &'a mut WaitOptimizer,
    pub clock: &'a dyn Clock,
}

impl<'a> Interactor<'a> {
    pub fn new(io: &'a mut dyn Device, waits: &'a mut WaitOptimizer, clock: &'a dyn Clock) -> Self {
        Self { io, waits, clock }
    }

    /// Blind sleep using the optimized timing for `op`. Returns the wait
    /// actually used.
    pub fn wait(&mut self, op: &str) -> f64 {
        let t = self.waits.get_wait(op);
        self.clock.sleep(t);
        t
    }

    /// Run an arbitrary device action through the retry executor.
    pub fn execute<F>(&mut self, op: &str, max_retries: Option<u32>, mut action: F) -> (bool, u32)
    where
        F: FnMut(&mut dyn Device) -> bool,
    {
        let budget = max_retries.unwrap_or_else(|| self.waits.max_retries());
        let io = &mut *self.io;
        execute(&mut *self.waits, self.clock, op, budget, || action(&mut *io))
    }

    /// Find a named template on a fresh capture and tap its best match.
    pub fn click_template(&mut self, name: &str, opts: ClickOpts) -> (bool, u32) {
        let threshold = opts.threshold;
        let (success, retries) = self.execute("template_click", opts.max_retries, |io| {
            let Some(frame) = io.capture_screen() else {
                return false;
            };
            let matches = io.match_template(&frame, name, threshold);
            match matches.first() {
                Some(m) => {
                    debug!(template = name, x = m.x, y = m.y, "clicking template");
                    io.tap(m.x, m.y)
                }
                None => false,
            }
        });
        if success && opts.wait_after {
            self.wait("post_click_wait");
        }
        (success, retries)
    }

    /// Tap the center of a region.
    pub fn click_region(
        &mut self,
        region: Region,
        max_retries: Option<u32>,
        wait_after: bool,
    ) -> (bool, u32) {
        let center = region.center();
        let (success, retries) =
            self.execute("region_click", max_retries, |io| io.tap(center.x, center.y));
        if success && wait_after {
            self.wait("post_region_click");
        }
        (success, retries)
    }

    /// Poll until a template appears and click it, or give up after
    /// `timeout` seconds. The perception-timeout surface: exhaustion is a
    /// boolean failure, not an error.
    pub fn wait_and_click(&mut self, name: &str, timeout: f64, threshold: f32) -> bool {
        let start = self.clock.now();
        while self.clock.now() - start < timeout {
            let (success, _) = self.click_template(
                name,
                ClickOpts {
                    threshold,
                    max_retries: Some(0),
                    ..Default::default()
                },
            );
            if success {
                return true;
            }
            let interval = self.waits.get_wait("template_check_interval");
            self.clock.sleep(interval);
        }
        warn!(template = name, timeout, "timed out waiting for template");
        false
    }

    /// Page the worker list with the configured slow swipe.
    pub fn slow_swipe(&mut self, gesture: Swipe) -> bool {
        let ok = self.io.swipe(gesture.from, gesture.to, gesture.duration_ms);
        self.wait("slow_swipe_completion");
        ok
    }
}
