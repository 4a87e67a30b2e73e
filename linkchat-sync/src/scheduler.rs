//! Poll scheduling with a single-flight gate.
//!
//! Every cycle gets a monotonically increasing tick number when it is issued.
//! Only one cycle may be outstanding; a tick that finds the gate held is a
//! no-op. The gate is released when the cycle finishes, whether it succeeded or
//! not, and a result carrying anything but the in-flight tick is stale.

use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Identifies one issued poll cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollTick(u64);

impl PollTick {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct PollGate {
    issued: u64,
    in_flight: Option<PollTick>,
    rerun_requested: bool,
}

impl PollGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new tick, or `None` while another cycle is outstanding.
    pub fn try_begin(&mut self) -> Option<PollTick> {
        if self.in_flight.is_some() {
            return None;
        }
        self.issued += 1;
        let tick = PollTick(self.issued);
        self.in_flight = Some(tick);
        Some(tick)
    }

    /// True if `tick` is the outstanding cycle.
    pub fn is_current(&self, tick: PollTick) -> bool {
        self.in_flight == Some(tick)
    }

    /// Releases the gate if `tick` holds it. Returns false for a stale tick.
    pub fn finish(&mut self, tick: PollTick) -> bool {
        if self.is_current(tick) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Remembers an on-demand refresh that arrived while the gate was held.
    pub fn request_rerun(&mut self) {
        self.rerun_requested = true;
    }

    pub fn take_rerun(&mut self) -> bool {
        std::mem::take(&mut self.rerun_requested)
    }

    /// Drops the outstanding cycle, e.g. when its fetch task was aborted.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.rerun_requested = false;
    }
}

/// Fixed-cadence timer. The first tick fires immediately; ticks missed while
/// the engine was busy are skipped rather than bunched up.
pub fn poll_timer(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_refused_while_in_flight() {
        let mut gate = PollGate::new();
        let first = gate.try_begin().unwrap();
        assert!(gate.try_begin().is_none());
        assert!(gate.finish(first));
        let second = gate.try_begin().unwrap();
        assert!(second > first);
    }

    #[test]
    fn stale_tick_does_not_release() {
        let mut gate = PollGate::new();
        let first = gate.try_begin().unwrap();
        gate.reset();
        let second = gate.try_begin().unwrap();
        assert!(!gate.finish(first));
        assert!(gate.is_in_flight());
        assert!(gate.finish(second));
    }

    #[test]
    fn rerun_flag_is_taken_once() {
        let mut gate = PollGate::new();
        gate.request_rerun();
        assert!(gate.take_rerun());
        assert!(!gate.take_rerun());
    }
}
