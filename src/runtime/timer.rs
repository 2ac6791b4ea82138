// src/runtime/timer.rs

use crate::reactor::ReactorTimer;

use std::time::{Duration, Instant};

/// Smallest delay ever handed to the reactor timer.
///
/// A zero-delay request means "there is ready work, come back on the next
/// loop iteration", so it is coerced to this instead of being dropped.
pub const MIN_TIMER_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
  Disarmed,
  Armed { deadline: Instant },
}

/// What a deadline request did to the reactor timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
  Armed(Duration),
  Disarmed,
  Unchanged,
}

/// Translates "next deadline in N" requests into the engine's single
/// reactor-owned timer.
///
/// Holds no transfer state. Each re-arm replaces the previous deadline. Only
/// a request for the exact absolute instant already armed is not forwarded,
/// so the same relative delay asked for later still moves the timer.
#[derive(Debug)]
pub struct TimerBridge {
  state: TimerState,
  arm_calls: u64,
}

impl TimerBridge {
  pub fn new() -> Self {
    Self {
      state: TimerState::Disarmed,
      arm_calls: 0,
    }
  }

  /// `None` disarms; `Some(d)` fires `d` after `now`, replacing any earlier deadline.
  pub fn request_deadline<T: ReactorTimer + ?Sized>(
    &mut self,
    timer: &mut T,
    after: Option<Duration>,
    now: Instant,
  ) -> TimerAction {
    match after {
      None => {
        if self.state == TimerState::Disarmed {
          return TimerAction::Unchanged;
        }
        timer.disarm();
        self.state = TimerState::Disarmed;
        tracing::debug!("Timer disarmed");
        TimerAction::Disarmed
      }
      Some(requested) => {
        let after = requested.max(MIN_TIMER_DELAY);
        let deadline = now + after;
        if self.state == (TimerState::Armed { deadline }) {
          tracing::trace!(?after, "Timer already armed for this deadline");
          return TimerAction::Unchanged;
        }
        timer.arm(after);
        self.arm_calls += 1;
        self.state = TimerState::Armed { deadline };
        tracing::debug!(?after, ?requested, "Timer armed");
        TimerAction::Armed(after)
      }
    }
  }

  /// Records that the reactor fired the timer; a fired timer is no longer armed.
  pub fn on_fire(&mut self) {
    self.state = TimerState::Disarmed;
  }

  pub fn is_armed(&self) -> bool {
    matches!(self.state, TimerState::Armed { .. })
  }

  /// Absolute instant the timer is armed for.
  pub fn deadline(&self) -> Option<Instant> {
    match self.state {
      TimerState::Armed { deadline } => Some(deadline),
      TimerState::Disarmed => None,
    }
  }

  /// Number of `arm` calls forwarded to the reactor so far.
  pub fn arm_calls(&self) -> u64 {
    self.arm_calls
  }
}

impl Default for TimerBridge {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct CountingTimer {
    arms: Vec<Duration>,
    disarms: usize,
  }

  impl ReactorTimer for CountingTimer {
    fn arm(&mut self, after: Duration) {
      self.arms.push(after);
    }
    fn disarm(&mut self) {
      self.disarms += 1;
    }
  }

  #[test]
  fn same_deadline_twice_arms_once() {
    let mut timer = CountingTimer::default();
    let mut bridge = TimerBridge::new();
    let now = Instant::now();
    let d = Duration::from_millis(250);
    assert_eq!(bridge.request_deadline(&mut timer, Some(d), now), TimerAction::Armed(d));
    assert_eq!(bridge.request_deadline(&mut timer, Some(d), now), TimerAction::Unchanged);
    assert_eq!(timer.arms, vec![d]);
    assert_eq!(bridge.arm_calls(), 1);
    assert_eq!(bridge.deadline(), Some(now + d));
  }

  #[test]
  fn same_delay_later_moves_the_deadline() {
    let mut timer = CountingTimer::default();
    let mut bridge = TimerBridge::new();
    let now = Instant::now();
    let d = Duration::from_millis(100);
    bridge.request_deadline(&mut timer, Some(d), now);
    let later = now + Duration::from_millis(60);
    assert_eq!(bridge.request_deadline(&mut timer, Some(d), later), TimerAction::Armed(d));
    assert_eq!(timer.arms, vec![d, d]);
    assert_eq!(bridge.deadline(), Some(later + d));
  }

  #[test]
  fn rearm_replaces_previous_deadline() {
    let mut timer = CountingTimer::default();
    let mut bridge = TimerBridge::new();
    let now = Instant::now();
    bridge.request_deadline(&mut timer, Some(Duration::from_millis(100)), now);
    bridge.request_deadline(&mut timer, Some(Duration::from_millis(40)), now);
    assert_eq!(timer.arms, vec![Duration::from_millis(100), Duration::from_millis(40)]);
    assert_eq!(timer.disarms, 0);
    assert_eq!(bridge.deadline(), Some(now + Duration::from_millis(40)));
  }

  #[test]
  fn zero_delay_is_coerced_to_minimum() {
    let mut timer = CountingTimer::default();
    let mut bridge = TimerBridge::new();
    assert_eq!(
      bridge.request_deadline(&mut timer, Some(Duration::ZERO), Instant::now()),
      TimerAction::Armed(MIN_TIMER_DELAY)
    );
    assert_eq!(timer.arms, vec![MIN_TIMER_DELAY]);
  }

  #[test]
  fn disarm_only_when_armed() {
    let mut timer = CountingTimer::default();
    let mut bridge = TimerBridge::new();
    let now = Instant::now();
    assert_eq!(bridge.request_deadline(&mut timer, None, now), TimerAction::Unchanged);
    bridge.request_deadline(&mut timer, Some(Duration::from_millis(5)), now);
    assert_eq!(bridge.request_deadline(&mut timer, None, now), TimerAction::Disarmed);
    assert_eq!(timer.disarms, 1);
  }

  #[test]
  fn fire_allows_rearming_same_deadline() {
    let mut timer = CountingTimer::default();
    let mut bridge = TimerBridge::new();
    let now = Instant::now();
    let d = Duration::from_millis(10);
    bridge.request_deadline(&mut timer, Some(d), now);
    bridge.on_fire();
    assert!(!bridge.is_armed());
    assert_eq!(bridge.request_deadline(&mut timer, Some(d), now), TimerAction::Armed(d));
    assert_eq!(timer.arms.len(), 2);
  }
}
