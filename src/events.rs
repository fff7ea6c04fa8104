//! Deferred-work queue.
//!
//! Timer expiry never touches the bus.  It only submits the channel's work
//! item here; the main loop drains the queue and runs the measurement
//! handlers one at a time in FIFO order.
//!
//! ```text
//! ┌──────────────┐  submit   ┌──────────────┐  drain   ┌──────────────┐
//! │ TempHumidity │──────────▶│              │─────────▶│              │
//! │ AmbientLight │──────────▶│  WorkQueue   │          │  Main Loop   │
//! │ Pressure     │──────────▶│  (bounded)   │          │  (handlers)  │
//! │ FuelGauge    │──────────▶│              │          │              │
//! └──────────────┘           └──────────────┘          └──────────────┘
//! ```
//!
//! A work item that is already queued is not queued twice: a timer that
//! expires again before its previous measurement started is coalesced
//! into the pending item.  The pending flag clears when the handler starts,
//! so an expiry during a running measurement queues a fresh item.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

/// Queue depth.  One slot per channel is enough; the rest is headroom.
pub const WORK_QUEUE_DEPTH: usize = 8;

/// Number of measurement channels.
pub const CHANNEL_COUNT: usize = 4;

/// Identifies one periodic measurement channel and its work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelId {
    /// Si7020 temperature + relative humidity.
    TempHumidity = 0,
    /// TSL4531 illuminance.
    AmbientLight = 1,
    /// BMP280 barometric pressure.
    Pressure = 2,
    /// Battery voltage / state of charge.
    FuelGauge = 3,
}

impl ChannelId {
    pub const ALL: [Self; CHANNEL_COUNT] = [
        Self::TempHumidity,
        Self::AmbientLight,
        Self::Pressure,
        Self::FuelGauge,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TempHumidity => "temp-humidity",
            Self::AmbientLight => "ambient-light",
            Self::Pressure => "pressure",
            Self::FuelGauge => "fuel-gauge",
        }
    }
}

/// Outcome of [`WorkQueue::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    /// Item appended to the queue.
    Queued,
    /// Item was already pending; nothing added.
    AlreadyPending,
    /// Queue full; item dropped.
    Dropped,
}

/// Bounded FIFO of pending measurement work.
pub struct WorkQueue {
    channel: Channel<CriticalSectionRawMutex, ChannelId, WORK_QUEUE_DEPTH>,
    pending: [AtomicBool; CHANNEL_COUNT],
}

/// Queue shared by the firmware's timers and main loop.
pub static WORK_QUEUE: WorkQueue = WorkQueue::new();

impl WorkQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            pending: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        }
    }

    /// Submit a work item.  Never blocks; safe from timer context.
    pub fn submit(&self, id: ChannelId) -> Submit {
        let flag = &self.pending[id.index()];
        if flag.swap(true, Ordering::AcqRel) {
            return Submit::AlreadyPending;
        }
        if self.channel.try_send(id).is_err() {
            flag.store(false, Ordering::Release);
            warn!("WorkQueue: full, dropped '{}'", id.name());
            return Submit::Dropped;
        }
        Submit::Queued
    }

    /// Pop the next item, clearing its pending flag.
    pub fn pop(&self) -> Option<ChannelId> {
        let id = self.channel.try_receive().ok()?;
        self.pending[id.index()].store(false, Ordering::Release);
        Some(id)
    }

    /// Run `handler` for every queued item in FIFO order.
    /// Returns the number of items processed.
    pub fn drain(&self, mut handler: impl FnMut(ChannelId)) -> usize {
        let mut count = 0;
        while let Some(id) = self.pop() {
            handler(id);
            count += 1;
        }
        count
    }

    pub fn is_pending(&self, id: ChannelId) -> bool {
        self.pending[id.index()].load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
