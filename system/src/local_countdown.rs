use crate::session_timer::progress_percent;
use crate::types::TimerMethod;

/// Disconnected fallback timer. Runs entirely on the client against a
/// host-driven one-second tick; no wall-clock derivation is needed because
/// nothing else competes for the state.
#[derive(Debug, Clone)]
pub struct LocalCountdown {
    method: TimerMethod,
    duration_seconds: u64,
    time_left_seconds: u64,
    running: bool,
}

impl LocalCountdown {
    pub fn new(method: TimerMethod) -> Self {
        let duration_seconds = method.default_duration_seconds();
        Self {
            method,
            duration_seconds,
            time_left_seconds: duration_seconds,
            running: false,
        }
    }

    pub fn method(&self) -> TimerMethod {
        self.method
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn minutes(&self) -> u64 {
        self.time_left_seconds / 60
    }

    pub fn seconds(&self) -> u64 {
        self.time_left_seconds % 60
    }

    pub fn progress(&self) -> f32 {
        progress_percent(self.duration_seconds, self.time_left_seconds)
    }

    pub fn start(&mut self) {
        if self.time_left_seconds > 0 {
            self.running = true;
        }
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Restores the full duration for the current method, stopped.
    pub fn reset(&mut self) {
        self.time_left_seconds = self.duration_seconds;
        self.running = false;
    }

    /// Zeroes the countdown without going through a tick ("finish now").
    pub fn finish(&mut self) {
        self.time_left_seconds = 0;
        self.running = false;
    }

    pub fn switch_method(&mut self, method: TimerMethod) {
        self.method = method;
        self.duration_seconds = method.default_duration_seconds();
        self.time_left_seconds = self.duration_seconds;
        self.running = false;
    }

    /// Advances the countdown by one second. Returns true exactly once,
    /// on the tick that reaches zero.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.time_left_seconds -= 1;
        if self.time_left_seconds == 0 {
            self.running = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decrements_one_second_per_tick() {
        let mut countdown = LocalCountdown::new(TimerMethod::ShortBreak);
        countdown.start();
        assert_eq!((countdown.minutes(), countdown.seconds()), (5, 0));
        assert!(!countdown.tick());
        assert_eq!((countdown.minutes(), countdown.seconds()), (4, 59));
    }

    #[test]
    fn it_completes_once_and_stops() {
        let mut countdown = LocalCountdown::new(TimerMethod::ShortBreak);
        countdown.start();
        for _ in 0..299 {
            assert!(!countdown.tick());
        }
        assert!(countdown.tick());
        assert!(!countdown.is_running());
        // Further ticks are inert; no phantom decrements.
        assert!(!countdown.tick());
        assert_eq!((countdown.minutes(), countdown.seconds()), (0, 0));
    }

    #[test]
    fn it_does_not_tick_while_paused() {
        let mut countdown = LocalCountdown::new(TimerMethod::Pomodoro);
        countdown.start();
        countdown.tick();
        countdown.pause();
        assert!(!countdown.tick());
        assert_eq!((countdown.minutes(), countdown.seconds()), (24, 59));
    }

    #[test]
    fn it_resets_to_the_method_duration() {
        let mut countdown = LocalCountdown::new(TimerMethod::Pomodoro);
        countdown.start();
        countdown.tick();
        countdown.reset();
        assert_eq!((countdown.minutes(), countdown.seconds()), (25, 0));
        assert!(!countdown.is_running());
        assert_eq!(countdown.progress(), 0.0);
    }

    #[test]
    fn it_refuses_to_restart_a_finished_countdown() {
        let mut countdown = LocalCountdown::new(TimerMethod::ShortBreak);
        countdown.finish();
        countdown.start();
        assert!(!countdown.is_running());
    }

    #[test]
    fn it_switches_method_with_fresh_duration() {
        let mut countdown = LocalCountdown::new(TimerMethod::Pomodoro);
        countdown.start();
        countdown.tick();
        countdown.switch_method(TimerMethod::LongBreak);
        assert_eq!((countdown.minutes(), countdown.seconds()), (15, 0));
        assert!(!countdown.is_running());
    }
}
