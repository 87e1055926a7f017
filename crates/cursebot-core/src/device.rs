//! Capability traits for the device-facing collaborators.
//!
//! Input injection, screen capture, template matching, OCR and screen
//! navigation are external to the core -- the scheduler and station logic
//! only ever talk to these traits. The simulation harness provides a
//! scripted implementation; real backends live outside this crate.

use serde::{Deserialize, Serialize};

/// A screen coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned screen rectangle, `(x1, y1)` top-left inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Square region of half-width `r` around a point.
    pub fn around(p: Point, r: i32) -> Self {
        Self::new(p.x - r, p.y - r, p.x + r, p.y + r)
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }
}

/// A swipe gesture between two points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swipe {
    pub from: Point,
    pub to: Point,
    pub duration_ms: u32,
}

/// Opaque handle to a captured screen. The backend owns the pixels; the
/// core only passes the handle back into perception calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame(pub u64);

/// One template-match hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub x: i32,
    pub y: i32,
    pub confidence: f32,
}

/// Raw input injection. Both primitives report whether the injection was
/// accepted by the channel -- not whether it had the intended on-screen
/// effect.
pub trait Actuation {
    fn tap(&mut self, x: i32, y: i32) -> bool;
    fn swipe(&mut self, from: Point, to: Point, duration_ms: u32) -> bool;
}

/// Screen capture, template matching and OCR.
pub trait Perception {
    /// Capture the current screen. `None` means the channel produced no
    /// usable image this time.
    fn capture_screen(&mut self) -> Option<Frame>;

    /// All matches of a named template at or above `threshold`, best
    /// first.
    fn match_template(&mut self, frame: &Frame, name: &str, threshold: f32) -> Vec<TemplateMatch>;

    /// OCR the given region.
    fn read_region_text(&mut self, frame: &Frame, region: Region) -> Option<String>;

    /// Read a countdown timer from the given region, in seconds.
    fn read_region_timer(&mut self, frame: &Frame, region: Region) -> Option<f64>;

    /// Locate a text string anywhere on screen.
    fn find_text(&mut self, frame: &Frame, text: &str) -> Option<Point>;
}

/// Screen-location predicates and drive-to actions.
pub trait Navigation {
    /// At the base overview.
    fn at_base(&mut self) -> bool;

    /// Inside a station's interior view.
    fn at_station_interior(&mut self) -> bool;

    /// Drive to the base, positioned on the left side where the stations
    /// sit. Bounded internally; `false` means navigation gave up.
    fn reach_base_left(&mut self) -> bool;
}

/// Everything the station transitions need, as one object-safe bound.
pub trait Device: Actuation + Perception + Navigation {}

impl<T: Actuation + Perception + Navigation> Device for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_center() {
        let r = Region::new(10, 10, 20, 30);
        assert_eq!(r.center(), Point::new(15, 20));
    }

    #[test]
    fn region_around_point() {
        let r = Region::around(Point::new(100, 50), 10);
        assert_eq!(r, Region::new(90, 40, 110, 60));
        assert_eq!(r.center(), Point::new(100, 50));
    }
}
