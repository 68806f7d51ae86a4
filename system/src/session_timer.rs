use crate::message::{CommandError, TimerView};
use crate::types::{SessionId, TimerId, TimerMethod};
use std::time::{Duration, Instant};

/// Authoritative timer state for one session.
///
/// Remaining time is never accumulated tick-by-tick. While running it is
/// derived on demand from `duration - elapsed(started_at)`, so delayed
/// ticks cannot slow the timer down. `started_at` doubles as the running
/// flag: it is `Some` exactly while the timer runs.
#[derive(Debug, Clone)]
pub struct SessionTimer {
    timer_id: TimerId,
    method: TimerMethod,
    duration_seconds: u64,
    time_left_seconds: u64,
    started_at: Option<Instant>,
}

/// Result of one periodic recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer is still counting down; remaining seconds attached.
    Running(u64),
    /// Remaining time reached zero on this tick. The timer has stopped
    /// itself; the caller must cancel the schedule and notify once.
    Completed,
    /// The timer was not running. A tick that raced a cancellation lands
    /// here and must be ignored.
    Stale,
}

impl SessionTimer {
    pub fn new(method: TimerMethod, duration_minutes: u64) -> Self {
        let duration_seconds = duration_minutes * 60;
        Self {
            timer_id: TimerId::new_v4(),
            method,
            duration_seconds,
            time_left_seconds: duration_seconds,
            started_at: None,
        }
    }

    pub fn timer_id(&self) -> TimerId {
        self.timer_id
    }

    pub fn method(&self) -> TimerMethod {
        self.method
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Remaining seconds at `now`. Authoritative while paused; derived
    /// from the start instant while running.
    pub fn remaining_at(&self, now: Instant) -> u64 {
        match self.started_at {
            Some(started_at) => {
                let elapsed = now.saturating_duration_since(started_at).as_secs();
                self.duration_seconds.saturating_sub(elapsed)
            }
            None => self.time_left_seconds,
        }
    }

    /// Transitions to running. The start instant is backdated by the part
    /// of the duration already consumed, so `duration - elapsed` stays the
    /// correct remaining time across pause/resume cycles.
    pub fn start(&mut self, now: Instant) -> Result<(), CommandError> {
        if self.started_at.is_some() {
            return Err(CommandError::TimerAlreadyRunning);
        }
        let consumed = self.duration_seconds - self.time_left_seconds;
        self.started_at = Some(
            now.checked_sub(Duration::from_secs(consumed))
                .unwrap_or(now),
        );
        Ok(())
    }

    /// Stops the countdown, folding the elapsed time into
    /// `time_left_seconds` one final time.
    pub fn pause(&mut self, now: Instant) -> Result<(), CommandError> {
        if self.started_at.is_none() {
            return Err(CommandError::TimerNotRunning);
        }
        self.time_left_seconds = self.remaining_at(now);
        self.started_at = None;
        Ok(())
    }

    /// Stops any countdown and restores the full duration. A supplied new
    /// duration replaces the configured one first; zero is accepted as-is
    /// and leaves the timer immediately completed ("finish now").
    pub fn reset(&mut self, duration_minutes: Option<u64>) {
        if let Some(minutes) = duration_minutes {
            self.duration_seconds = minutes * 60;
        }
        self.time_left_seconds = self.duration_seconds;
        self.started_at = None;
        self.timer_id = TimerId::new_v4();
    }

    /// Same cancellation semantics as `reset`, additionally replacing the
    /// method. The fresh timer id tells clients this is a new logical
    /// timer, not a continuation.
    pub fn switch_method(&mut self, method: TimerMethod, duration_minutes: u64) {
        self.method = method;
        self.duration_seconds = duration_minutes * 60;
        self.time_left_seconds = self.duration_seconds;
        self.started_at = None;
        self.timer_id = TimerId::new_v4();
    }

    /// One periodic recomputation of the remaining time.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.started_at.is_none() {
            return TickOutcome::Stale;
        }
        let remaining = self.remaining_at(now);
        self.time_left_seconds = remaining;
        if remaining == 0 {
            self.started_at = None;
            TickOutcome::Completed
        } else {
            TickOutcome::Running(remaining)
        }
    }

    pub fn view_at(&self, session_id: SessionId, now: Instant) -> TimerView {
        let remaining = self.remaining_at(now);
        TimerView {
            session_id,
            timer_id: self.timer_id,
            method: self.method,
            minutes: remaining / 60,
            seconds: remaining % 60,
            is_running: self.is_running(),
            progress: progress_percent(self.duration_seconds, remaining),
        }
    }
}

/// Share of the configured duration already consumed, as a percentage
/// clamped to `[0, 100]`. A zero-duration timer counts as fully complete.
pub fn progress_percent(duration_seconds: u64, time_left_seconds: u64) -> f32 {
    if duration_seconds == 0 {
        return 100.0;
    }
    let consumed = duration_seconds.saturating_sub(time_left_seconds);
    let percent = consumed as f32 / duration_seconds as f32 * 100.0;
    percent.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pomodoro() -> SessionTimer {
        SessionTimer::new(TimerMethod::Pomodoro, 25)
    }

    #[test]
    fn it_derives_remaining_time_from_wall_clock_not_tick_count() {
        let t0 = Instant::now();
        let mut timer = pomodoro();
        timer.start(t0).unwrap();

        // Only two ticks arrive, both late. Remaining time must still
        // reflect the full ten elapsed seconds.
        assert_eq!(timer.tick(t0 + Duration::from_secs(4)), TickOutcome::Running(1496));
        assert_eq!(timer.tick(t0 + Duration::from_secs(10)), TickOutcome::Running(1490));
    }

    #[test]
    fn it_preserves_elapsed_time_across_pause_and_resume() {
        let t0 = Instant::now();
        let mut timer = pomodoro();
        timer.start(t0).unwrap();
        timer.pause(t0 + Duration::from_secs(100)).unwrap();
        assert_eq!(timer.remaining_at(t0 + Duration::from_secs(500)), 1400);

        // Resume 500s later; the pause gap must not count as elapsed.
        let t1 = t0 + Duration::from_secs(600);
        timer.start(t1).unwrap();
        assert_eq!(timer.remaining_at(t1 + Duration::from_secs(50)), 1350);
    }

    #[test]
    fn it_rejects_starting_a_running_timer() {
        let t0 = Instant::now();
        let mut timer = pomodoro();
        timer.start(t0).unwrap();
        let before = timer.remaining_at(t0 + Duration::from_secs(5));
        assert_eq!(
            timer.start(t0 + Duration::from_secs(5)),
            Err(CommandError::TimerAlreadyRunning)
        );
        // The original start instant is untouched.
        assert_eq!(timer.remaining_at(t0 + Duration::from_secs(5)), before);
    }

    #[test]
    fn it_rejects_pausing_an_idle_timer() {
        let mut timer = pomodoro();
        assert_eq!(
            timer.pause(Instant::now()),
            Err(CommandError::TimerNotRunning)
        );
    }

    #[test]
    fn it_completes_exactly_when_the_duration_elapses() {
        let t0 = Instant::now();
        let mut timer = pomodoro();
        timer.start(t0).unwrap();
        assert_eq!(
            timer.tick(t0 + Duration::from_secs(1499)),
            TickOutcome::Running(1)
        );
        assert_eq!(timer.tick(t0 + Duration::from_secs(1500)), TickOutcome::Completed);
        assert!(!timer.is_running());
        assert_eq!(timer.remaining_at(t0 + Duration::from_secs(1500)), 0);
        // A tick that raced the cancellation is ignored.
        assert_eq!(timer.tick(t0 + Duration::from_secs(1501)), TickOutcome::Stale);
    }

    #[test]
    fn it_force_completes_on_reset_to_zero() {
        let t0 = Instant::now();
        let mut timer = pomodoro();
        timer.start(t0).unwrap();
        timer.reset(Some(0));

        let session_id = SessionId::new_v4();
        let view = timer.view_at(session_id, t0 + Duration::from_secs(3));
        assert_eq!(view.minutes, 0);
        assert_eq!(view.seconds, 0);
        assert!(!view.is_running);
        assert_eq!(view.progress, 100.0);
    }

    #[test]
    fn it_mints_a_new_timer_id_on_reset_and_switch() {
        let mut timer = pomodoro();
        let original = timer.timer_id();
        timer.reset(None);
        let after_reset = timer.timer_id();
        assert_ne!(original, after_reset);

        timer.switch_method(TimerMethod::ShortBreak, 5);
        assert_ne!(after_reset, timer.timer_id());
        assert_eq!(timer.method(), TimerMethod::ShortBreak);
        assert_eq!(timer.duration_seconds(), 300);
    }

    #[test]
    fn it_keeps_remaining_time_within_duration_bounds() {
        let t0 = Instant::now();
        let mut timer = pomodoro();
        timer.start(t0).unwrap();
        // Long past the deadline: clamped at zero, never negative.
        assert_eq!(timer.remaining_at(t0 + Duration::from_secs(9999)), 0);
        // Clock going backwards relative to the start: clamped at the top.
        assert_eq!(timer.remaining_at(t0), 1500);
    }

    #[test]
    fn it_decomposes_the_view_into_minutes_and_seconds() {
        let t0 = Instant::now();
        let mut timer = pomodoro();
        timer.start(t0).unwrap();
        let view = timer.view_at(SessionId::new_v4(), t0 + Duration::from_secs(61));
        assert_eq!(view.minutes, 23);
        assert_eq!(view.seconds, 59);
        assert!(view.is_running);
        assert!(view.progress > 0.0 && view.progress < 100.0);
    }

    #[test]
    fn progress_is_clamped_and_total_for_zero_duration() {
        assert_eq!(progress_percent(1500, 1500), 0.0);
        assert_eq!(progress_percent(1500, 0), 100.0);
        assert_eq!(progress_percent(0, 0), 100.0);
        // Remaining larger than duration (stale caller data) stays in range.
        assert_eq!(progress_percent(100, 200), 0.0);
    }
}
