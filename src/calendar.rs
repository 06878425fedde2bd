//! Background load calendar.
//!
//! Simulated time is counted in seconds from an epoch origin (the first
//! submission of a workload). The calendar maps each instant to the local
//! day and hour of the resource and returns the configured load for it.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::CalendarConfig;

#[derive(Debug, Clone)]
pub struct LoadCalendar {
    config: CalendarConfig,
    /// Unix time, in seconds, of simulated time zero.
    origin: i64,
}

impl LoadCalendar {
    pub fn new(config: CalendarConfig, origin: i64) -> Self {
        Self { config, origin }
    }

    /// Calendar with zero load at all times.
    pub fn idle() -> Self {
        Self::new(CalendarConfig::default(), 0)
    }

    pub fn origin(&self) -> i64 {
        self.origin
    }

    /// Local wall-clock time of the resource at simulated second `time`.
    pub fn local_time(&self, time: f64) -> Option<NaiveDateTime> {
        let secs = self.origin.checked_add(time.floor() as i64)?;
        let utc = DateTime::from_timestamp(secs, 0)?;
        let offset = Duration::seconds((self.config.time_zone_hours * 3600.0) as i64);
        Some(utc.naive_utc() + offset)
    }

    fn is_holiday(&self, local: &NaiveDateTime) -> bool {
        self.config.weekends.contains(&local.weekday())
            || self.config.holidays.contains(&local.date())
    }

    fn is_peak(&self, local: &NaiveDateTime) -> bool {
        let hour = local.hour();
        let (start, end) = (self.config.peak_start_hour, self.config.peak_end_hour);
        if start <= end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    /// Background load fraction at simulated second `time`, in `[0, 1)`.
    pub fn load_at(&self, time: f64) -> f64 {
        let Some(local) = self.local_time(time) else {
            return 0.0;
        };
        let base = if self.is_holiday(&local) {
            self.config.holiday_load
        } else if self.is_peak(&local) {
            self.config.peak_load
        } else {
            self.config.off_peak_load
        };

        let jitter = if self.config.load_jitter > 0.0 {
            // One draw per simulated hour keeps the value stable within it.
            let hour = (time / 3600.0).floor() as u64;
            let mut rng = StdRng::seed_from_u64(self.config.seed ^ hour);
            rng.gen_range(-self.config.load_jitter..=self.config.load_jitter)
        } else {
            0.0
        };

        (base + jitter).clamp(0.0, 0.99)
    }
}
