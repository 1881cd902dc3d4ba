//! Daily weekday timer.
//!
//! Fires a job once a day at a fixed local wall-clock time, skipping Saturday
//! and Sunday, until a shutdown future completes.

use std::future::Future;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;
use tracing::{debug, info};

use crate::data::ObservationDate;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid time of day {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },
}

/// Monday = 0 ... Friday = 4.
pub fn is_weekday(date: NaiveDate) -> bool {
    date.weekday().num_days_from_monday() < 5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(|at| Self { at })
            .ok_or(ScheduleError::InvalidTime { hour, minute })
    }

    pub fn at_hour(hour: u32) -> Result<Self, ScheduleError> {
        Self::new(hour, 0)
    }

    /// First firing strictly after `now`.
    pub fn next_fire_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.at);
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }

    /// Run `job` every weekday at the scheduled local time until `shutdown`
    /// completes. Shutdown during a job drops the job where it stands.
    pub async fn run<J, Fut, S>(&self, job: J, shutdown: S)
    where
        J: FnMut(ObservationDate) -> Fut,
        Fut: Future<Output = ()>,
        S: Future<Output = ()>,
    {
        self.run_with_clock(|| Local::now().naive_local(), job, shutdown)
            .await
    }

    /// As [`run`](Self::run), reading wall-clock time from `clock`.
    pub async fn run_with_clock<C, J, Fut, S>(&self, clock: C, mut job: J, shutdown: S)
    where
        C: Fn() -> NaiveDateTime,
        J: FnMut(ObservationDate) -> Fut,
        Fut: Future<Output = ()>,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let now = clock();
            let next = self.next_fire_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(next = %next, "Waiting for next scheduled run");

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let date = clock().date();
            if is_weekday(date) {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!(date = %date, "Scheduler stopped during run");
                        return;
                    }
                    _ = job(ObservationDate::new(date)) => {}
                }
            } else {
                debug!(date = %date, "Weekend, skipping scheduled run");
            }
            info!("Done.");
        }
    }
}
