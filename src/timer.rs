//! Typed timer handles for T200 (retransmission) and T203 (idle supervision).
//!
//! Per the design note in spec.md §9: rather than registering callback functions with userdata
//! pointers (as the original C does), a timer here is a handle that is armed/disarmed by the FSM
//! and delivers a typed [`TimerKind`] event back into [`crate::datalink::Datalink::handle_event`]
//! when the host's clock observes it has expired. The host owns the actual clock and is
//! responsible for noticing expiry — via [`Timer::has_expired`], or by comparing deadlines some
//! other way — and routing the expired kind back in as an `Event::TimerExpired`.
//!
//! Timers are logically single-shot: starting a running timer is a no-op, and [`Timer::restart`]
//! always means stop-then-start, needed when rearming after the deadline it already passed
//! (the `deadline` field doesn't clear itself on expiry; the FSM tells the timer via `restart`).

use embedded_time::duration::Milliseconds;
use embedded_time::{Clock, Instant};

/// Which of the two per-datalink timers fired.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Retransmission supervision timer.
    T200,
    /// Idle-link ("keep-alive") supervision timer, MF_EST only.
    T203,
}

/// A single-shot deadline timer armed against a caller-supplied clock `C`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct Timer<C: Clock> {
    deadline: Option<Instant<C>>,
}

impl<C: Clock> Default for Timer<C> {
    fn default() -> Self {
        Timer { deadline: None }
    }
}

impl<C: Clock> Timer<C> {
    pub const fn new() -> Self {
        Timer { deadline: None }
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arms the timer for `duration` from `now`, unless it is already running (start on a
    /// running timer is a no-op per spec.md §4.4).
    pub fn start(&mut self, now: Instant<C>, duration: Milliseconds<u64>) {
        if self.deadline.is_none() {
            self.deadline = now.checked_add(duration);
        }
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// Stop-then-start, unconditionally rearming for `duration` from `now`.
    pub fn restart(&mut self, now: Instant<C>, duration: Milliseconds<u64>) {
        self.stop();
        self.deadline = now.checked_add(duration);
    }

    /// Returns `true` exactly once `now` has reached or passed the armed deadline. Does not
    /// disarm the timer; the FSM is responsible for calling `stop`/`restart` on expiry per the
    /// state table in spec.md §4.2.
    pub fn has_expired(&self, now: Instant<C>) -> bool {
        match self.deadline {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

/// Millisecond duration derived from the classic `sec`/`usec` pair configuration style used by
/// the original C core (`t200_sec`, `t200_usec`, ...).
pub const fn from_sec_usec(sec: u32, usec: u32) -> Milliseconds<u64> {
    Milliseconds((sec as u64) * 1000 + (usec as u64) / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_time::clock::Error as ClockError;
    use embedded_time::fraction::Fraction;

    #[derive(Debug)]
    struct TestClock;

    impl Clock for TestClock {
        type T = u64;
        const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);

        fn try_now(&self) -> Result<Instant<Self>, ClockError> {
            Ok(Instant::new(0))
        }
    }

    fn tick(ms: u64) -> Instant<TestClock> {
        Instant::new(ms)
    }

    #[test]
    fn has_expired_tracks_the_armed_deadline() {
        let mut t: Timer<TestClock> = Timer::new();
        assert!(!t.has_expired(tick(1000)), "never armed");
        t.start(tick(0), Milliseconds(100));
        assert!(!t.has_expired(tick(50)));
        assert!(t.has_expired(tick(100)));
        assert!(t.has_expired(tick(200)), "stays expired until stopped/restarted");
    }

    #[test]
    fn restart_rearms_even_past_the_old_deadline() {
        let mut t: Timer<TestClock> = Timer::new();
        t.start(tick(0), Milliseconds(100));
        assert!(t.has_expired(tick(150)));
        // A plain `start` would be a no-op here since the timer is still "running" with a past
        // deadline; `restart` must rearm unconditionally.
        t.restart(tick(150), Milliseconds(100));
        assert!(!t.has_expired(tick(200)));
        assert!(t.has_expired(tick(250)));
    }
}
