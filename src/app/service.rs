//! Node service: owns the measurement channels and their timers.
//!
//! ```text
//!  Clock ──▶ poll_timers ──▶ Scheduler ──submit──▶ WorkQueue
//!                                                     │
//!  MeasurementSink ◀── channel.measure() ◀── run_pending
//! ```
//!
//! Timers never do I/O; they only queue work.  `run_pending` drains the
//! queue in FIFO order and runs each channel's handler to completion
//! before the next.  A channel whose driver failed to bind is never
//! registered; the others run normally.

use log::{error, info, warn};

use crate::config::SensorConfig;
use crate::error::Error;
use crate::events::{CHANNEL_COUNT, ChannelId, WorkQueue};
use crate::scheduler::{Scheduler, TimerState};

use super::channels::MeasurementChannel;
use super::events::Quantity;
use super::ports::MeasurementSink;

type BoxedChannel<'a> = Box<dyn MeasurementChannel + 'a>;

pub struct NodeService<'a> {
    queue: &'a WorkQueue,
    scheduler: Scheduler,
    channels: [Option<BoxedChannel<'a>>; CHANNEL_COUNT],
}

impl<'a> NodeService<'a> {
    pub fn new(queue: &'a WorkQueue) -> Self {
        Self {
            queue,
            scheduler: Scheduler::new(),
            channels: [None, None, None, None],
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Take ownership of an initialised channel and arm its timer.
    pub fn register(&mut self, channel: impl MeasurementChannel + 'a, now_ms: u64) {
        let id = channel.id();
        self.scheduler
            .arm(id, channel.initial_delay_ms(), channel.period_ms(), now_ms);
        if self.channels[id.index()].replace(Box::new(channel)).is_some() {
            warn!("NodeService: '{}' registered twice, replaced", id.name());
        }
    }

    /// Register the outcome of a channel's `init`.  A binding failure is
    /// logged and leaves that channel disabled.  Returns whether the channel
    /// was registered.
    pub fn register_result<C>(&mut self, init: Result<C, Error>, now_ms: u64) -> bool
    where
        C: MeasurementChannel + 'a,
    {
        match init {
            Ok(channel) => {
                self.register(channel, now_ms);
                true
            }
            Err(e) => {
                error!("NodeService: channel disabled ({})", e);
                false
            }
        }
    }

    // ── Per-iteration work ────────────────────────────────────

    /// Queue work for every expired timer.
    pub fn poll_timers(&mut self, now_ms: u64) -> usize {
        self.scheduler.poll(now_ms, self.queue)
    }

    /// Run every queued work item.  Returns the number of handlers run.
    pub fn run_pending(&mut self, sink: &mut dyn MeasurementSink) -> usize {
        let queue = self.queue;
        let mut ran = 0;
        queue.drain(|id| {
            let Some(channel) = self.channels[id.index()].as_mut() else {
                warn!("NodeService: work for unregistered '{}' ignored", id.name());
                return;
            };
            self.scheduler.begin_measuring(id);
            channel.measure(sink);
            self.scheduler.finish_measuring(id);
            ran += 1;
        });
        ran
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn is_enabled(&self, id: ChannelId) -> bool {
        self.channels[id.index()].is_some()
    }

    pub fn timer_state(&self, id: ChannelId) -> TimerState {
        self.scheduler.state(id)
    }

    pub fn period_ms(&self, id: ChannelId) -> Option<u64> {
        self.scheduler.period_ms(id)
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.scheduler.next_deadline_ms()
    }

    /// Measurement descriptors of every registered quantity.
    pub fn measurement_configs(&self) -> impl Iterator<Item = (Quantity, SensorConfig)> + '_ {
        self.channels
            .iter()
            .flatten()
            .flat_map(|c| c.configs().iter().copied())
    }

    pub fn log_summary(&self) {
        for id in ChannelId::ALL {
            match self.period_ms(id) {
                Some(p) => info!("NodeService: '{}' every {} ms", id.name(), p),
                None => info!("NodeService: '{}' disabled", id.name()),
            }
        }
    }
}
