//! # Cursebot Core Library
//!
//! Core engine for automating the recurring curse/uncurse maintenance
//! cycle across a set of in-game trading stations. Each station runs a
//! timed production order; shortly before the order completes its roster
//! is swapped for a fixed high-output trio, and shortly after completion
//! the original roster is restored.
//!
//! ## Architecture
//!
//! - **Scheduler**: a single min-priority queue of `(time, station,
//!   kind)` obligations and the blocking control loop that pops, sleeps,
//!   executes and re-schedules
//! - **Stations**: the curse/uncurse state machine driving every roster
//!   swap, timer read and drone bulk-completion
//! - **Adaptive waits**: a self-tuning timing model that learns how long
//!   each UI action actually needs from live success/failure feedback
//! - **Retry executor**: the one place actions and timing interact
//! - **Capability traits**: actuation, perception and navigation stay
//!   behind object-safe traits; real device backends live elsewhere
//!
//! ## Key Components
//!
//! - [`Scheduler`]: the system's main driver
//! - [`Station`]: one stateful production unit
//! - [`WaitOptimizer`]: learned per-operation wait estimates
//! - [`Config`]: TOML configuration with validated window invariants

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod retry;
pub mod scheduler;
pub mod simulation;
pub mod station;
pub mod timefmt;
pub mod waits;

pub use clock::{Clock, SimClock, SystemClock};
pub use config::Config;
pub use device::{Actuation, Device, Navigation, Perception, Point, Region};
pub use error::{ConfigError, CoreError, StoreError};
pub use retry::{ClickOpts, Interactor};
pub use scheduler::{should_expedite, ScheduledTask, Scheduler, TaskKind, TaskQueue};
pub use simulation::{SimDevice, SimulationReport, SimulationScenario};
pub use station::{Station, StationId};
pub use waits::{WaitOptimizer, WaitProfileSnapshot};
