//! TOML-based application configuration.
//!
//! Stores the scheduler window constants, station timing offsets, adaptive
//! wait settings and the screen layout coordinates.
//!
//! Configuration is stored at `~/.config/cursebot/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::device::{Point, Region, Swipe};
use crate::error::ConfigError;

/// Scheduler loop configuration. All values are seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Window before a task's due time within which it is treated as due.
    #[serde(default = "default_execution_buffer")]
    pub execution_buffer: f64,
    /// Maximum gap between two curse tasks that triggers the drone path.
    #[serde(default = "default_conflict_threshold")]
    pub conflict_threshold: f64,
    /// Distance from the due time at which the loop switches from one
    /// long sleep to short polling.
    #[serde(default = "default_early_wakeup")]
    pub early_wakeup: f64,
    /// Maximum single sleep while polling near a due time.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    /// Sleep between checks while the queue is empty.
    #[serde(default = "default_idle_sleep")]
    pub idle_sleep: f64,
}

/// Station transition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Lead time before order completion to start the curse (seconds).
    #[serde(default = "default_prelay")]
    pub prelay: f64,
    /// Lag time after order completion before the uncurse (seconds).
    #[serde(default = "default_post_delay")]
    pub post_delay: f64,
    /// Attempts to confirm entry into a station interior.
    #[serde(default = "default_enter_attempts")]
    pub enter_attempts: u32,
    /// Attempts to read the order timer.
    #[serde(default = "default_timer_read_attempts")]
    pub timer_read_attempts: u32,
    /// Swipes through the worker list before giving up on one worker.
    #[serde(default = "default_max_search_swipes")]
    pub max_search_swipes: u32,
}

/// Adaptive wait settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Retries per discrete UI action.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Wait-profile snapshot path. Relative paths resolve against the
    /// data directory.
    #[serde(default = "default_save_file")]
    pub save_file: PathBuf,
}

/// Fixed screen layout. Coordinates assume the 1280x720 render the
/// backends capture at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Button opening a station's worker panel.
    #[serde(default = "default_workers_entry_button")]
    pub workers_entry_button: Point,
    /// Region showing the running order's countdown timer.
    #[serde(default = "default_order_timer_region")]
    pub order_timer_region: Region,
    /// Name regions of the three assigned worker slots.
    #[serde(default = "default_roster_slot_regions")]
    pub roster_slots: [Region; 3],
    /// Slow leftward swipe used to page through the worker list.
    #[serde(default = "default_worker_list_swipe")]
    pub worker_list_swipe: Swipe,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/cursebot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub waits: WaitsConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    /// Substitute drastically shortened windows for deterministic test
    /// runs.
    #[serde(default)]
    pub testing: bool,
}

// Default functions
fn default_execution_buffer() -> f64 {
    45.0
}
fn default_conflict_threshold() -> f64 {
    240.0
}
fn default_early_wakeup() -> f64 {
    120.0
}
fn default_poll_interval() -> f64 {
    5.0
}
fn default_idle_sleep() -> f64 {
    60.0
}
fn default_prelay() -> f64 {
    40.0
}
fn default_post_delay() -> f64 {
    10.0
}
fn default_enter_attempts() -> u32 {
    3
}
fn default_timer_read_attempts() -> u32 {
    3
}
fn default_max_search_swipes() -> u32 {
    15
}
fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    4
}
fn default_save_file() -> PathBuf {
    PathBuf::from("adaptive_waits.json")
}
fn default_workers_entry_button() -> Point {
    Point::new(1150, 670)
}
fn default_order_timer_region() -> Region {
    Region::new(960, 120, 1180, 160)
}
fn default_roster_slot_regions() -> [Region; 3] {
    [
        Region::new(80, 560, 260, 590),
        Region::new(300, 560, 480, 590),
        Region::new(520, 560, 700, 590),
    ]
}
fn default_worker_list_swipe() -> Swipe {
    Swipe {
        from: Point::new(1000, 400),
        to: Point::new(300, 400),
        duration_ms: 900,
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            execution_buffer: default_execution_buffer(),
            conflict_threshold: default_conflict_threshold(),
            early_wakeup: default_early_wakeup(),
            poll_interval: default_poll_interval(),
            idle_sleep: default_idle_sleep(),
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            prelay: default_prelay(),
            post_delay: default_post_delay(),
            enter_attempts: default_enter_attempts(),
            timer_read_attempts: default_timer_read_attempts(),
            max_search_swipes: default_max_search_swipes(),
        }
    }
}

impl Default for WaitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            save_file: default_save_file(),
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            workers_entry_button: default_workers_entry_button(),
            order_timer_region: default_order_timer_region(),
            roster_slots: default_roster_slot_regions(),
            worker_list_swipe: default_worker_list_swipe(),
        }
    }
}

/// Execution buffer substituted when `testing` is set.
const TESTING_EXECUTION_BUFFER: f64 = 2.0;

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Default config file path (`data_dir()/config.toml`).
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Apply the testing-mode substitutions and return the result.
    pub fn effective(mut self) -> Self {
        if self.testing {
            self.scheduler.execution_buffer = TESTING_EXECUTION_BUFFER;
            self.scheduler.poll_interval = self
                .scheduler
                .poll_interval
                .min(TESTING_EXECUTION_BUFFER);
        }
        self
    }

    /// Check the numeric invariants the scheduler loop depends on.
    ///
    /// Violations allow the loop to oversleep past its buffer window or
    /// busy-poll, so they refuse to start the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if s.execution_buffer <= 0.0 {
            return Err(invalid("scheduler.execution_buffer", "must be > 0"));
        }
        if s.poll_interval <= 0.0 {
            return Err(invalid("scheduler.poll_interval", "must be > 0"));
        }
        if s.early_wakeup < s.execution_buffer {
            return Err(invalid(
                "scheduler.early_wakeup",
                "must be >= scheduler.execution_buffer",
            ));
        }
        if s.poll_interval > s.execution_buffer {
            return Err(invalid(
                "scheduler.poll_interval",
                "must be <= scheduler.execution_buffer",
            ));
        }
        if s.conflict_threshold < 0.0 {
            return Err(invalid("scheduler.conflict_threshold", "must be >= 0"));
        }
        if self.station.prelay < 0.0 {
            return Err(invalid("station.prelay", "must be >= 0"));
        }
        if self.station.post_delay < 0.0 {
            return Err(invalid("station.post_delay", "must be >= 0"));
        }
        Ok(())
    }

    /// Absolute wait-profile snapshot path.
    pub fn waits_save_path(&self) -> Result<PathBuf, ConfigError> {
        if self.waits.save_file.is_absolute() {
            Ok(self.waits.save_file.clone())
        } else {
            Ok(data_dir()?.join(&self.waits.save_file))
        }
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Returns `~/.config/cursebot[-dev]/` based on CURSEBOT_ENV.
///
/// Set CURSEBOT_ENV=dev to use a development data directory.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("CURSEBOT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("cursebot-dev")
    } else {
        base_dir.join("cursebot")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_early_wakeup_below_buffer() {
        let mut config = Config::default();
        config.scheduler.early_wakeup = 10.0;
        config.scheduler.execution_buffer = 45.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. }
            if key == "scheduler.early_wakeup"));
    }

    #[test]
    fn rejects_poll_interval_above_buffer() {
        let mut config = Config::default();
        config.scheduler.poll_interval = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_buffer() {
        let mut config = Config::default();
        config.scheduler.execution_buffer = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_conflict_threshold() {
        let mut config = Config::default();
        config.scheduler.conflict_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn testing_mode_shrinks_buffer() {
        let mut config = Config::default();
        config.testing = true;
        let effective = config.effective();
        assert!((effective.scheduler.execution_buffer - 2.0).abs() < f64::EPSILON);
        // The shrunken buffer must still satisfy the poll invariant.
        assert!(effective.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            testing = true

            [scheduler]
            execution_buffer = 30.0
            "#,
        )
        .unwrap();
        assert!((config.scheduler.execution_buffer - 30.0).abs() < f64::EPSILON);
        // Unspecified sections fall back to defaults.
        assert!((config.station.prelay - 40.0).abs() < f64::EPSILON);
        assert!(config.waits.enabled);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert!((back.scheduler.conflict_threshold - 240.0).abs() < f64::EPSILON);
        assert_eq!(back.screen.roster_slots.len(), 3);
    }
}
