//! Periodic measurement timers.
//!
//! One repeating timer per measurement channel.  The main loop polls the
//! scheduler with the monotonic clock; an expired timer only submits its
//! channel's work item to the [`WorkQueue`].  No I/O happens here.
//!
//! ```text
//!                 arm()            expiry / submit()
//!  Uninitialized ───────▶ Armed ─────────────────────▶ Firing
//!                          ▲                             │
//!                          │ finish_measuring()          │ begin_measuring()
//!                          │                             ▼
//!                          └──────────────────────── Measuring
//! ```
//!
//! Missed periods are skipped, not replayed: after a long stall the next
//! deadline is the first period boundary after `now`.

use log::{debug, info, warn};

use crate::events::{CHANNEL_COUNT, ChannelId, Submit, WorkQueue};

/// Lifecycle of one channel's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Never armed (channel disabled or not yet initialised).
    Uninitialized,
    /// Waiting for the next deadline.
    Armed,
    /// Expired; work item sits in the queue.
    Firing,
    /// Work handler is running.
    Measuring,
}

#[derive(Debug, Clone, Copy)]
struct PeriodicTimer {
    state: TimerState,
    next_due_ms: u64,
    period_ms: u64,
}

impl PeriodicTimer {
    const IDLE: Self = Self {
        state: TimerState::Uninitialized,
        next_due_ms: 0,
        period_ms: 0,
    };

    /// Advance the deadline past `now_ms`, skipping missed periods.
    fn advance(&mut self, now_ms: u64) {
        let late = now_ms - self.next_due_ms;
        let skipped = late / self.period_ms;
        self.next_due_ms += (skipped + 1) * self.period_ms;
    }
}

/// The scheduler engine.
pub struct Scheduler {
    timers: [PeriodicTimer; CHANNEL_COUNT],
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            timers: [PeriodicTimer::IDLE; CHANNEL_COUNT],
        }
    }

    /// Arm `id` to first expire `initial_delay_ms` after `now_ms`, then
    /// every `period_ms`.
    pub fn arm(&mut self, id: ChannelId, initial_delay_ms: u64, period_ms: u64, now_ms: u64) {
        let period_ms = if period_ms == 0 {
            warn!("Scheduler: '{}' armed with zero period, using 1 s", id.name());
            1_000
        } else {
            period_ms
        };
        self.timers[id.index()] = PeriodicTimer {
            state: TimerState::Armed,
            next_due_ms: now_ms + initial_delay_ms,
            period_ms,
        };
        info!(
            "Scheduler: '{}' armed (first in {} ms, every {} ms)",
            id.name(),
            initial_delay_ms,
            period_ms
        );
    }

    /// Submit work for every expired timer.  Returns the number of items
    /// newly queued.
    pub fn poll(&mut self, now_ms: u64, queue: &WorkQueue) -> usize {
        let mut queued = 0;
        for id in ChannelId::ALL {
            let timer = &mut self.timers[id.index()];
            if timer.state == TimerState::Uninitialized || now_ms < timer.next_due_ms {
                continue;
            }
            timer.advance(now_ms);
            match queue.submit(id) {
                Submit::Queued => {
                    timer.state = TimerState::Firing;
                    queued += 1;
                }
                Submit::AlreadyPending => {
                    debug!("Scheduler: '{}' still pending, coalesced", id.name());
                }
                Submit::Dropped => {
                    if timer.state == TimerState::Firing {
                        timer.state = TimerState::Armed;
                    }
                }
            }
        }
        queued
    }

    /// Mark the channel's work handler as running.
    pub fn begin_measuring(&mut self, id: ChannelId) {
        let timer = &mut self.timers[id.index()];
        if timer.state != TimerState::Uninitialized {
            timer.state = TimerState::Measuring;
        }
    }

    /// Mark the channel's work handler as finished.
    pub fn finish_measuring(&mut self, id: ChannelId) {
        let timer = &mut self.timers[id.index()];
        if timer.state == TimerState::Measuring {
            timer.state = TimerState::Armed;
        }
    }

    pub fn state(&self, id: ChannelId) -> TimerState {
        self.timers[id.index()].state
    }

    /// Configured period, or `None` if the timer was never armed.
    pub fn period_ms(&self, id: ChannelId) -> Option<u64> {
        let timer = &self.timers[id.index()];
        (timer.state != TimerState::Uninitialized).then_some(timer.period_ms)
    }

    /// Earliest upcoming deadline across all armed timers.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.timers
            .iter()
            .filter(|t| t.state != TimerState::Uninitialized)
            .map(|t| t.next_due_ms)
            .min()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_timer_never_fires() {
        let mut s = Scheduler::new();
        let q = WorkQueue::new();
        assert_eq!(s.poll(1_000_000, &q), 0);
        assert_eq!(s.state(ChannelId::Pressure), TimerState::Uninitialized);
        assert_eq!(s.period_ms(ChannelId::Pressure), None);
        assert_eq!(s.next_deadline_ms(), None);
    }

    #[test]
    fn fires_after_initial_delay_then_every_period() {
        let mut s = Scheduler::new();
        let q = WorkQueue::new();
        s.arm(ChannelId::AmbientLight, 1_000, 60_000, 0);

        assert_eq!(s.poll(999, &q), 0);
        assert_eq!(s.poll(1_000, &q), 1);
        assert_eq!(s.state(ChannelId::AmbientLight), TimerState::Firing);
        assert_eq!(s.next_deadline_ms(), Some(61_000));

        assert_eq!(q.pop(), Some(ChannelId::AmbientLight));
        s.begin_measuring(ChannelId::AmbientLight);
        assert_eq!(s.state(ChannelId::AmbientLight), TimerState::Measuring);
        s.finish_measuring(ChannelId::AmbientLight);
        assert_eq!(s.state(ChannelId::AmbientLight), TimerState::Armed);

        assert_eq!(s.poll(60_999, &q), 0);
        assert_eq!(s.poll(61_000, &q), 1);
    }

    #[test]
    fn expiry_while_pending_is_coalesced() {
        let mut s = Scheduler::new();
        let q = WorkQueue::new();
        s.arm(ChannelId::FuelGauge, 0, 10, 0);
        assert_eq!(s.poll(0, &q), 1);
        assert_eq!(s.poll(10, &q), 0);
        assert_eq!(s.poll(20, &q), 0);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn missed_periods_are_skipped() {
        let mut s = Scheduler::new();
        let q = WorkQueue::new();
        s.arm(ChannelId::Pressure, 1_000, 60_000, 0);
        // Stall for several periods.
        assert_eq!(s.poll(250_000, &q), 1);
        assert_eq!(s.next_deadline_ms(), Some(301_000));
    }

    #[test]
    fn zero_period_is_replaced() {
        let mut s = Scheduler::new();
        s.arm(ChannelId::Pressure, 0, 0, 0);
        assert_eq!(s.period_ms(ChannelId::Pressure), Some(1_000));
    }

    #[test]
    fn next_deadline_is_earliest_timer() {
        let mut s = Scheduler::new();
        s.arm(ChannelId::TempHumidity, 5_000, 60_000, 0);
        s.arm(ChannelId::AmbientLight, 1_000, 60_000, 0);
        assert_eq!(s.next_deadline_ms(), Some(1_000));
    }
}
