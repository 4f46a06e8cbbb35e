//! Session clocks and the shared fixed-rate frame scheduler.
//!
//! Elapsed time is always the wall-clock delta since a clock was started,
//! never `ticks * interval`, so long sessions do not accumulate timer drift.
//! The [`FrameScheduler`] is the one driver every running game subscribes
//! to; cancelling a subscription removes it before the next `due` call can
//! observe it.

use smallvec::SmallVec;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use crate::constants::{DEFAULT_FRAME_HZ, MAX_FRAME_HZ, MIN_FRAME_HZ};

/// Source of monotonic milliseconds.
pub trait TimeSource {
    fn now_ms(&self) -> u64;
}

/// Production time source backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Hand-driven time source. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Rc<Cell<u64>>,
}

impl ManualTime {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.set(now_ms.max(self.now.get()));
    }

    pub fn advance(&self, delta_ms: u64) -> u64 {
        let next = self.now.get().saturating_add(delta_ms);
        self.now.set(next);
        next
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Start/stop clock reporting wall-clock elapsed time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    started_at: Option<u64>,
}

impl Clock {
    #[must_use]
    pub const fn new() -> Self {
        Self { started_at: None }
    }

    /// Start (or restart) the clock at `now_ms`.
    pub const fn start(&mut self, now_ms: u64) {
        self.started_at = Some(now_ms);
    }

    pub const fn stop(&mut self) {
        self.started_at = None;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Elapsed milliseconds since start, `None` while stopped.
    #[must_use]
    pub fn elapsed(&self, now_ms: u64) -> Option<u64> {
        self.started_at.map(|start| now_ms.saturating_sub(start))
    }
}

/// Handle for a scheduler subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// One due tick for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub id: SubscriptionId,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    clock: Clock,
    next_due: u64,
}

/// Shared fixed-rate driver for every running session.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval_ms: u64,
    next_id: u64,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::at_hz(DEFAULT_FRAME_HZ)
    }
}

impl FrameScheduler {
    /// Scheduler ticking at `hz`, clamped to a sane range.
    #[must_use]
    pub fn at_hz(hz: u32) -> Self {
        let hz = hz.clamp(MIN_FRAME_HZ, MAX_FRAME_HZ);
        Self::with_interval(1_000 / u64::from(hz))
    }

    #[must_use]
    pub fn with_interval(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            next_id: 0,
            subscriptions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Subscribe a new clock started at `now_ms`; the first tick is due one interval later.
    pub fn subscribe(&mut self, now_ms: u64) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        let mut clock = Clock::new();
        clock.start(now_ms);
        self.subscriptions.insert(
            id,
            Subscription {
                clock,
                next_due: now_ms.saturating_add(self.interval_ms),
            },
        );
        id
    }

    /// Restart an existing subscription's clock from zero.
    pub fn restart(&mut self, id: SubscriptionId, now_ms: u64) -> bool {
        let interval = self.interval_ms;
        self.subscriptions.get_mut(&id).is_some_and(|sub| {
            sub.clock.start(now_ms);
            sub.next_due = now_ms.saturating_add(interval);
            true
        })
    }

    /// Cancel a subscription. It can never be returned by [`Self::due`] again.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    #[must_use]
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Elapsed time of a subscription's clock.
    #[must_use]
    pub fn elapsed(&self, id: SubscriptionId, now_ms: u64) -> Option<u64> {
        self.subscriptions
            .get(&id)
            .and_then(|sub| sub.clock.elapsed(now_ms))
    }

    /// Collect the ticks due at `now_ms`. Late frames coalesce into a single tick.
    pub fn due(&mut self, now_ms: u64) -> SmallVec<[Tick; 4]> {
        let interval = self.interval_ms;
        let mut ticks = SmallVec::new();
        for (id, sub) in &mut self.subscriptions {
            if now_ms < sub.next_due {
                continue;
            }
            let Some(elapsed_ms) = sub.clock.elapsed(now_ms) else {
                continue;
            };
            let behind = now_ms - sub.next_due;
            sub.next_due = sub.next_due + interval * (behind / interval + 1);
            ticks.push(Tick {
                id: *id,
                elapsed_ms,
            });
        }
        ticks
    }
}
