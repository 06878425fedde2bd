use std::path::Path;

use chrono::{NaiveDate, Weekday};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Shape of the simulated resource: homogeneous nodes of equal PE count.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub nodes: usize,
    pub pes_per_node: usize,
    /// Processing rate of one PE, in work units per second.
    pub rating: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 48,
            pes_per_node: 12,
            rating: 100.0,
        }
    }
}

/// Tunables of the allocation engine itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Uniform per-PE processing rate used for progress and forecasts.
    pub pe_rating: f64,
    /// Cap on the medium pool; the pool is the first `min(cap, nodes)` nodes.
    pub medium_pool_nodes: usize,
    /// Interval of the coarse completion backstop timer, in seconds.
    pub backstop_interval_secs: f64,
    /// Minimum spacing between two utilization samples, in seconds.
    pub sample_interval_secs: f64,
    /// Use the rating of the job's first node instead of `pe_rating`.
    pub honor_node_rating: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pe_rating: 100.0,
            medium_pool_nodes: 24,
            backstop_interval_secs: 3600.0,
            sample_interval_secs: 60.0,
            honor_node_rating: false,
        }
    }
}

impl SchedulerConfig {
    pub fn with_pe_rating(mut self, rating: f64) -> Self {
        self.pe_rating = rating;
        self
    }

    pub fn with_medium_pool(mut self, nodes: usize) -> Self {
        self.medium_pool_nodes = nodes;
        self
    }

    pub fn with_backstop_interval(mut self, secs: f64) -> Self {
        self.backstop_interval_secs = secs;
        self
    }

    pub fn with_sample_interval(mut self, secs: f64) -> Self {
        self.sample_interval_secs = secs;
        self
    }

    pub fn with_node_rating(mut self, honor: bool) -> Self {
        self.honor_node_rating = honor;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pe_rating.is_finite() && self.pe_rating > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pe_rating must be positive, got {}",
                self.pe_rating
            )));
        }
        if !(self.backstop_interval_secs.is_finite() && self.backstop_interval_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "backstop_interval_secs must be positive, got {}",
                self.backstop_interval_secs
            )));
        }
        if !(self.sample_interval_secs.is_finite() && self.sample_interval_secs >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sample_interval_secs must be non-negative, got {}",
                self.sample_interval_secs
            )));
        }
        Ok(())
    }
}

/// Background load profile of the resource.
///
/// Loads are fractions of capacity taken by work the scheduler does not
/// control. Weekends and holidays use `holiday_load`; weekdays use
/// `peak_load` between `peak_start_hour` and `peak_end_hour` local time and
/// `off_peak_load` otherwise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Offset from UTC in hours.
    pub time_zone_hours: f64,
    pub peak_load: f64,
    pub off_peak_load: f64,
    pub holiday_load: f64,
    pub peak_start_hour: u32,
    pub peak_end_hour: u32,
    pub weekends: Vec<Weekday>,
    pub holidays: Vec<NaiveDate>,
    /// Maximum absolute random perturbation added to the load.
    pub load_jitter: f64,
    pub seed: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            time_zone_hours: 0.0,
            peak_load: 0.0,
            off_peak_load: 0.0,
            holiday_load: 0.0,
            peak_start_hour: 9,
            peak_end_hour: 17,
            weekends: vec![Weekday::Sat, Weekday::Sun],
            holidays: Vec::new(),
            load_jitter: 0.0,
            seed: 11 * 13 * 17 * 19 * 23 + 1,
        }
    }
}

impl CalendarConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, load) in [
            ("peak_load", self.peak_load),
            ("off_peak_load", self.off_peak_load),
            ("holiday_load", self.holiday_load),
        ] {
            if !(load.is_finite() && (0.0..1.0).contains(&load)) {
                return Err(ConfigError::Invalid(format!(
                    "{} must lie within [0, 1), got {}",
                    name, load
                )));
            }
        }
        if !(self.load_jitter.is_finite() && self.load_jitter >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "load_jitter must be non-negative, got {}",
                self.load_jitter
            )));
        }
        if !self.time_zone_hours.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "time_zone_hours must be finite, got {}",
                self.time_zone_hours
            )));
        }
        if self.peak_start_hour > 24 || self.peak_end_hour > 24 {
            return Err(ConfigError::Invalid(
                "peak hours must lie within 0..=24".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Owner assigned to every job read from a workload trace.
    pub user_id: u64,
    /// Period of the reconciliation tick, in seconds. Zero disables it.
    pub tick_interval_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            user_id: 1,
            tick_interval_secs: 300.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub scheduler: SchedulerConfig,
    pub calendar: CalendarConfig,
    pub simulation: SimulationConfig,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.nodes == 0 || self.cluster.pes_per_node == 0 {
            return Err(ConfigError::Invalid(
                "cluster needs at least one node with one PE".to_string(),
            ));
        }
        if !(self.cluster.rating.is_finite() && self.cluster.rating > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "cluster rating must be positive, got {}",
                self.cluster.rating
            )));
        }
        if !(self.simulation.tick_interval_secs.is_finite()
            && self.simulation.tick_interval_secs >= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "tick_interval_secs must be non-negative, got {}",
                self.simulation.tick_interval_secs
            )));
        }
        self.calendar.validate()?;
        self.scheduler.validate()
    }
}
