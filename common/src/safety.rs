//! Runtime budget and allowed-hours interlock.
//!
//! The supervisor gates every open request before the actuator sees it, and
//! keeps an exact ledger of the time the valve was actually driven open:
//!
//! 1. [`authorize`] only answers whether opening is allowed; it never touches
//!    the ledger.
//! 2. An open interval starts when an opening pulse really starts
//!    ([`record_opened`]) and is folded into `cumulative_open_ms` exactly once,
//!    when a closing pulse really starts ([`record_closed`]). A close that
//!    cannot be driven leaves the interval running.
//! 3. Once the ledger reaches the budget, the limit latches and every open
//!    request is denied.
//! 4. The ledger and the limit clear only after the clock has stayed outside
//!    the allowed window for `reset_threshold_ms` without interruption, with
//!    the valve closed.
//!
//! Counters live in RAM and restart from zero on reboot.
//!
//! [`authorize`]: SafetySupervisor::authorize
//! [`record_opened`]: SafetySupervisor::record_opened
//! [`record_closed`]: SafetySupervisor::record_closed

use tracing::{debug, info, warn};

use crate::{config::SafetyConfig, ports::ClockReading, types::SafetySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Veto {
    OutsideSchedule,
    RuntimeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyVerdict {
    Clear,
    ForceClose(Veto),
}

#[derive(Debug, Clone)]
pub struct SafetySupervisor {
    config: SafetyConfig,
    cumulative_open_ms: u64,
    last_opened_at_ms: Option<u64>,
    limit_active: bool,
    inhibit_started_at_ms: Option<u64>,
    last_veto: Option<Veto>,
}

impl SafetySupervisor {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            cumulative_open_ms: 0,
            last_opened_at_ms: None,
            limit_active: false,
            inhibit_started_at_ms: None,
            last_veto: None,
        }
    }

    /// Close requests are always allowed.
    pub fn authorize(&mut self, open_requested: bool, now: ClockReading) -> bool {
        if !open_requested {
            self.last_veto = None;
            return true;
        }

        self.last_veto = self.veto_for(now);
        self.last_veto.is_none()
    }

    /// An opening pulse has started. Repeated calls keep the first start time.
    pub fn record_opened(&mut self, now_ms: u64) {
        if self.last_opened_at_ms.is_none() {
            debug!(now_ms, "open interval started");
            self.last_opened_at_ms = Some(now_ms);
        }
    }

    /// A closing pulse has started; fold the running interval, if any.
    pub fn record_closed(&mut self, now_ms: u64) {
        let Some(opened) = self.last_opened_at_ms.take() else {
            return;
        };

        let elapsed = now_ms.saturating_sub(opened);
        self.cumulative_open_ms = self.cumulative_open_ms.saturating_add(elapsed);
        debug!(
            elapsed,
            cumulative_open_ms = self.cumulative_open_ms,
            "open interval folded"
        );
        self.latch_if_exhausted(self.cumulative_open_ms);
    }

    /// Periodic housekeeping. `valve_open` is whether the valve is open or
    /// opening; while it is and opening is no longer allowed, every tick asks
    /// for a close until one is driven.
    pub fn tick(&mut self, now: ClockReading, valve_open: bool) -> SafetyVerdict {
        let now_ms = now.monotonic_ms;
        let in_window = self.in_window(now);
        let mut verdict = SafetyVerdict::Clear;

        self.latch_if_exhausted(self.total_open_ms(now_ms));

        if valve_open {
            if !in_window {
                warn!("valve open outside allowed hours; forcing close");
                verdict = SafetyVerdict::ForceClose(Veto::OutsideSchedule);
            } else if self.limit_active {
                warn!("valve open with runtime budget exhausted; forcing close");
                verdict = SafetyVerdict::ForceClose(Veto::RuntimeLimit);
            }
        }

        if in_window {
            if self.inhibit_started_at_ms.take().is_some() {
                debug!("allowed window reopened; reset timer cleared");
            }
        } else {
            let started = *self.inhibit_started_at_ms.get_or_insert(now_ms);
            let inhibited_ms = now_ms.saturating_sub(started);
            if inhibited_ms >= self.config.reset_threshold_ms
                && self.last_opened_at_ms.is_none()
                && (self.limit_active || self.cumulative_open_ms > 0)
            {
                info!(
                    cumulative_open_ms = self.cumulative_open_ms,
                    inhibited_ms, "runtime budget reset after sustained inhibition"
                );
                self.cumulative_open_ms = 0;
                self.limit_active = false;
            }
        }

        if let SafetyVerdict::ForceClose(veto) = verdict {
            self.last_veto = Some(veto);
        }
        verdict
    }

    pub fn in_window(&self, now: ClockReading) -> bool {
        now.local_time
            .map(|time| self.config.window.contains(time))
            .unwrap_or(false)
    }

    pub fn is_limit_active(&self) -> bool {
        self.limit_active
    }

    pub fn is_open_interval_running(&self) -> bool {
        self.last_opened_at_ms.is_some()
    }

    /// Folded open time only; excludes a running interval.
    pub fn cumulative_open_ms(&self) -> u64 {
        self.cumulative_open_ms
    }

    /// Folded open time plus the running interval, if any.
    pub fn total_open_ms(&self, now_ms: u64) -> u64 {
        let running = self
            .last_opened_at_ms
            .map(|opened| now_ms.saturating_sub(opened))
            .unwrap_or(0);
        self.cumulative_open_ms.saturating_add(running)
    }

    pub fn last_veto(&self) -> Option<Veto> {
        self.last_veto
    }

    pub fn snapshot(&self, now: ClockReading) -> SafetySnapshot {
        let total = self.total_open_ms(now.monotonic_ms);
        SafetySnapshot {
            cumulative_open_ms: total,
            remaining_budget_ms: self.config.max_open_budget_ms.saturating_sub(total),
            limit_active: self.limit_active,
            in_window: self.in_window(now),
            inhibited_ms: self
                .inhibit_started_at_ms
                .map(|started| now.monotonic_ms.saturating_sub(started))
                .unwrap_or(0),
        }
    }

    fn veto_for(&self, now: ClockReading) -> Option<Veto> {
        if !self.in_window(now) {
            return Some(Veto::OutsideSchedule);
        }
        let exhausted = self.total_open_ms(now.monotonic_ms) >= self.config.max_open_budget_ms;
        if self.limit_active || exhausted {
            return Some(Veto::RuntimeLimit);
        }
        None
    }

    fn latch_if_exhausted(&mut self, total_ms: u64) {
        if !self.limit_active && total_ms >= self.config.max_open_budget_ms {
            warn!(total_ms, "runtime budget exhausted; opening inhibited");
            self.limit_active = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::schedule::ScheduleWindow;

    fn at(monotonic_ms: u64, hour: u32, minute: u32) -> ClockReading {
        ClockReading::new(monotonic_ms, NaiveTime::from_hms_opt(hour, minute, 0))
    }

    fn supervisor(budget_ms: u64, reset_ms: u64) -> SafetySupervisor {
        SafetySupervisor::new(SafetyConfig {
            max_open_budget_ms: budget_ms,
            reset_threshold_ms: reset_ms,
            window: ScheduleWindow::default(),
        })
    }

    #[test]
    fn folds_each_interval_once() {
        let mut safety = supervisor(1_000_000, 1_000);

        safety.record_opened(0);
        safety.record_opened(500);
        safety.record_closed(1_000);
        safety.record_closed(1_800);
        assert_eq!(safety.cumulative_open_ms(), 1_000);

        safety.record_opened(2_000);
        assert_eq!(safety.total_open_ms(2_300), 1_300);
        safety.record_closed(2_500);
        assert_eq!(safety.cumulative_open_ms(), 1_500);
    }

    #[test]
    fn authorization_leaves_ledger_alone() {
        let mut safety = supervisor(1_000_000, 1_000);

        assert!(safety.authorize(true, at(0, 12, 0)));
        assert!(safety.authorize(true, at(5_000, 12, 0)));
        assert!(safety.authorize(false, at(9_000, 12, 0)));

        assert!(!safety.is_open_interval_running());
        assert_eq!(safety.total_open_ms(10_000), 0);
    }

    #[test]
    fn denies_opening_outside_window() {
        let mut safety = supervisor(1_000_000, 1_000);

        assert!(!safety.authorize(true, at(0, 5, 59)));
        assert!(!safety.authorize(true, at(0, 23, 0)));
        assert_eq!(safety.last_veto(), Some(Veto::OutsideSchedule));
        assert!(safety.authorize(false, at(0, 23, 0)));
        assert_eq!(safety.last_veto(), None);
    }

    #[test]
    fn unsynced_clock_counts_as_outside_window() {
        let mut safety = supervisor(1_000_000, 1_000);

        assert!(!safety.authorize(true, ClockReading::new(0, None)));
        assert!(safety.authorize(false, ClockReading::new(0, None)));
    }

    #[test]
    fn window_end_forces_close_until_one_is_driven() {
        let mut safety = supervisor(1_000_000, 1_000_000);
        safety.record_opened(0);
        assert_eq!(safety.tick(at(30_000, 22, 59), true), SafetyVerdict::Clear);

        let verdict = safety.tick(at(60_000, 23, 0), true);
        assert_eq!(verdict, SafetyVerdict::ForceClose(Veto::OutsideSchedule));
        assert!(safety.is_open_interval_running());

        // Close could not be driven: still open, still counting.
        let verdict = safety.tick(at(65_000, 23, 0), true);
        assert_eq!(verdict, SafetyVerdict::ForceClose(Veto::OutsideSchedule));
        assert_eq!(safety.total_open_ms(65_000), 65_000);

        safety.record_closed(70_000);
        assert_eq!(safety.tick(at(71_000, 23, 0), false), SafetyVerdict::Clear);
        assert_eq!(safety.cumulative_open_ms(), 70_000);
    }

    #[test]
    fn budget_exhaustion_latches_limit() {
        let mut safety = supervisor(10_000, 1_000_000);
        safety.record_opened(0);
        assert_eq!(safety.tick(at(9_999, 12, 0), true), SafetyVerdict::Clear);
        assert!(safety.authorize(true, at(9_999, 12, 0)));

        let verdict = safety.tick(at(10_000, 12, 0), true);

        assert_eq!(verdict, SafetyVerdict::ForceClose(Veto::RuntimeLimit));
        assert!(safety.is_limit_active());
        safety.record_closed(10_000);
        assert_eq!(safety.cumulative_open_ms(), 10_000);
        assert!(!safety.authorize(true, at(20_000, 12, 0)));
        assert_eq!(safety.last_veto(), Some(Veto::RuntimeLimit));
    }

    #[test]
    fn close_that_reaches_budget_latches_limit() {
        let mut safety = supervisor(10_000, 1_000_000);
        safety.record_opened(0);
        safety.record_closed(12_000);

        assert!(safety.is_limit_active());
        assert!(!safety.authorize(true, at(13_000, 12, 0)));
    }

    #[test]
    fn reset_requires_sustained_inhibition() {
        let mut safety = supervisor(10_000, 5_000);
        safety.record_opened(0);
        safety.record_closed(10_000);
        assert!(safety.is_limit_active());

        safety.tick(at(20_000, 23, 0), false);
        safety.tick(at(23_000, 23, 0), false);
        assert!(safety.is_limit_active());

        // Window reopens before the threshold: timer restarts.
        safety.tick(at(23_500, 6, 0), false);
        assert!(safety.is_limit_active());
        assert_eq!(safety.snapshot(at(23_500, 6, 0)).inhibited_ms, 0);

        safety.tick(at(24_000, 23, 30), false);
        safety.tick(at(28_999, 23, 30), false);
        assert!(safety.is_limit_active());

        safety.tick(at(29_000, 23, 30), false);
        assert!(!safety.is_limit_active());
        assert_eq!(safety.cumulative_open_ms(), 0);
        assert!(safety.authorize(true, at(30_000, 6, 0)));
    }

    #[test]
    fn no_reset_while_valve_stuck_open() {
        let mut safety = supervisor(10_000, 5_000);
        safety.record_opened(0);
        safety.tick(at(12_000, 12, 0), true);
        assert!(safety.is_limit_active());

        safety.tick(at(20_000, 23, 0), true);
        safety.tick(at(40_000, 23, 0), true);

        assert!(safety.is_limit_active());
        assert_eq!(safety.total_open_ms(40_000), 40_000);
    }

    #[test]
    fn snapshot_includes_running_interval() {
        let mut safety = supervisor(10_000, 5_000);
        safety.record_opened(1_000);

        let snapshot = safety.snapshot(at(4_000, 12, 0));

        assert_eq!(snapshot.cumulative_open_ms, 3_000);
        assert_eq!(snapshot.remaining_budget_ms, 7_000);
        assert!(snapshot.in_window);
        assert!(!snapshot.limit_active);
    }
}
