/// Time-tracking state machine
///
/// ```text
/// {idle} --start--> {running} --pause--> {paused} --resume--> {running}
/// {running | paused} --stop--> {stopped}
/// ```
///
/// The functions here are pure: they take the current row and an explicit
/// `now` and return the column values to write. Persistence (row locking,
/// the single-active-timer index) lives in `models::time_entry`.
///
/// Durations exclude paused intervals, including a pause still in progress
/// at stop time, and never go negative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::time_entry::TimeEntry;

/// Where an entry sits in the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Running,
    Paused,
    Stopped,
}

/// Transition requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Pause,
    Resume,
    Stop,
}

/// Rejected timer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("A timer is already running")]
    AlreadyActive,

    #[error("Timer is already paused")]
    AlreadyPaused,

    #[error("Timer is not paused")]
    NotPaused,

    #[error("Time entry is already stopped")]
    AlreadyStopped,

    #[error("No active timer")]
    NoActiveTimer,

    #[error("Time entry not found")]
    EntryNotFound,

    #[error("Time entry belongs to another user")]
    NotOwner,

    #[error("Running time entries cannot be edited; stop the timer first")]
    EntryRunning,
}

/// Column values produced by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerUpdate {
    pub end_time: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_seconds: i32,
    pub duration_seconds: Option<i32>,
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().max(0)
}

fn to_i32(seconds: i64) -> i32 {
    i32::try_from(seconds.max(0)).unwrap_or(i32::MAX)
}

impl TimeEntry {
    pub fn timer_state(&self) -> TimerState {
        if self.end_time.is_some() {
            TimerState::Stopped
        } else if self.paused_at.is_some() {
            TimerState::Paused
        } else {
            TimerState::Running
        }
    }

    /// Seconds of tracked (non-paused) time as of `now`
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        if let (Some(_), Some(duration)) = (self.end_time, self.duration_seconds) {
            return i64::from(duration);
        }

        let until = self.end_time.unwrap_or(now);
        let current_pause = self
            .paused_at
            .map(|paused_at| seconds_between(paused_at, until))
            .unwrap_or(0);

        (seconds_between(self.start_time, until) - i64::from(self.paused_seconds) - current_pause).max(0)
    }

    /// Computes the columns `action` would write at `now`
    ///
    /// # Errors
    ///
    /// - `AlreadyPaused` when pausing a paused timer
    /// - `NotPaused` when resuming a running timer
    /// - `AlreadyStopped` for any action on a closed entry
    pub fn apply(&self, action: TimerAction, now: DateTime<Utc>) -> Result<TimerUpdate, TimerError> {
        let state = self.timer_state();

        match (action, state) {
            (_, TimerState::Stopped) => Err(TimerError::AlreadyStopped),

            (TimerAction::Pause, TimerState::Paused) => Err(TimerError::AlreadyPaused),
            (TimerAction::Pause, TimerState::Running) => Ok(TimerUpdate {
                end_time: None,
                paused_at: Some(now),
                paused_seconds: self.paused_seconds,
                duration_seconds: None,
            }),

            (TimerAction::Resume, TimerState::Running) => Err(TimerError::NotPaused),
            (TimerAction::Resume, TimerState::Paused) => Ok(TimerUpdate {
                end_time: None,
                paused_at: None,
                paused_seconds: self.paused_seconds_at(now),
                duration_seconds: None,
            }),

            (TimerAction::Stop, _) => {
                let end = now.max(self.start_time);
                let paused_seconds = self.paused_seconds_at(end);
                let duration = seconds_between(self.start_time, end) - i64::from(paused_seconds);

                Ok(TimerUpdate {
                    end_time: Some(end),
                    paused_at: None,
                    paused_seconds,
                    duration_seconds: Some(to_i32(duration)),
                })
            }
        }
    }

    fn paused_seconds_at(&self, now: DateTime<Utc>) -> i32 {
        let current_pause = self
            .paused_at
            .map(|paused_at| seconds_between(paused_at, now))
            .unwrap_or(0);

        to_i32(i64::from(self.paused_seconds) + current_pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
    }

    fn running_entry() -> TimeEntry {
        TimeEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            project_id: None,
            description: None,
            start_time: t0(),
            end_time: None,
            paused_at: None,
            paused_seconds: 0,
            duration_seconds: None,
            is_manual: false,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    fn write(entry: &mut TimeEntry, update: TimerUpdate) {
        entry.end_time = update.end_time;
        entry.paused_at = update.paused_at;
        entry.paused_seconds = update.paused_seconds;
        entry.duration_seconds = update.duration_seconds;
    }

    #[test]
    fn test_stop_running_timer() {
        let entry = running_entry();
        let update = entry.apply(TimerAction::Stop, t0() + Duration::minutes(90)).unwrap();

        assert_eq!(update.end_time, Some(t0() + Duration::minutes(90)));
        assert_eq!(update.duration_seconds, Some(5400));
        assert_eq!(update.paused_at, None);
    }

    #[test]
    fn test_pause_resume_excludes_paused_interval() {
        let mut entry = running_entry();

        let paused = entry.apply(TimerAction::Pause, t0() + Duration::minutes(10)).unwrap();
        write(&mut entry, paused);
        assert_eq!(entry.timer_state(), TimerState::Paused);
        assert_eq!(entry.elapsed_seconds(t0() + Duration::minutes(25)), 600);

        let resumed = entry.apply(TimerAction::Resume, t0() + Duration::minutes(30)).unwrap();
        write(&mut entry, resumed);
        assert_eq!(entry.timer_state(), TimerState::Running);
        assert_eq!(entry.paused_seconds, 1200);

        let stopped = entry.apply(TimerAction::Stop, t0() + Duration::minutes(60)).unwrap();
        assert_eq!(stopped.duration_seconds, Some(2400));
    }

    #[test]
    fn test_stop_while_paused_counts_current_pause() {
        let mut entry = running_entry();
        let paused = entry.apply(TimerAction::Pause, t0() + Duration::minutes(20)).unwrap();
        write(&mut entry, paused);

        let stopped = entry.apply(TimerAction::Stop, t0() + Duration::minutes(50)).unwrap();
        assert_eq!(stopped.paused_seconds, 1800);
        assert_eq!(stopped.duration_seconds, Some(1200));
        assert_eq!(stopped.paused_at, None);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut entry = running_entry();
        assert_eq!(
            entry.apply(TimerAction::Resume, t0()),
            Err(TimerError::NotPaused)
        );

        let paused = entry.apply(TimerAction::Pause, t0() + Duration::minutes(1)).unwrap();
        write(&mut entry, paused);
        assert_eq!(
            entry.apply(TimerAction::Pause, t0() + Duration::minutes(2)),
            Err(TimerError::AlreadyPaused)
        );

        let stopped = entry.apply(TimerAction::Stop, t0() + Duration::minutes(3)).unwrap();
        write(&mut entry, stopped);
        for action in [TimerAction::Pause, TimerAction::Resume, TimerAction::Stop] {
            assert_eq!(
                entry.apply(action, t0() + Duration::minutes(4)),
                Err(TimerError::AlreadyStopped)
            );
        }
    }

    #[test]
    fn test_duration_never_negative() {
        let entry = running_entry();
        let update = entry.apply(TimerAction::Stop, t0() - Duration::minutes(5)).unwrap();

        assert_eq!(update.end_time, Some(t0()));
        assert_eq!(update.duration_seconds, Some(0));
        assert_eq!(entry.elapsed_seconds(t0() - Duration::hours(1)), 0);
    }

    #[test]
    fn test_elapsed_of_closed_entry_is_duration() {
        let mut entry = running_entry();
        entry.end_time = Some(t0() + Duration::hours(2));
        entry.duration_seconds = Some(3600);

        assert_eq!(entry.timer_state(), TimerState::Stopped);
        assert_eq!(entry.elapsed_seconds(t0() + Duration::days(3)), 3600);
    }
}
