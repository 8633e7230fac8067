//! Delayed, gated and cancellable message delivery for a single consumer.

use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::error::KymeraError;

/// Messages carry a key that cancellation matches on.
pub trait Keyed {
    type Key: Copy + PartialEq;

    fn key(&self) -> Self::Key;
}

/// Condition a queued message waits on before it may be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gate {
    Open,
    /// Held while any starting-lock bit is set.
    Lock,
    /// Held while the current state is busy.
    BusyLock,
}

struct Entry<M> {
    msg: M,
    gate: Gate,
    due: Instant,
    seq: u64,
}

impl<M> Entry<M> {
    fn order(&self) -> (Instant, u64) {
        (self.due, self.seq)
    }
}

/// Bounded message queue ordered by due time, then by insertion.
///
/// Entries whose gate is closed are skipped but keep their place, so
/// messages waiting on the same gate come out in the order they were sent.
pub struct MessageQueue<M: Keyed, const N: usize> {
    entries: Vec<Entry<M>, N>,
    next_seq: u64,
}

impl<M: Keyed, const N: usize> Default for MessageQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Keyed, const N: usize> MessageQueue<M, N> {
    pub const fn new() -> Self {
        Self { entries: Vec::new(), next_seq: 0 }
    }

    pub fn push(
        &mut self,
        msg: M,
        gate: Gate,
        due: Instant,
    ) -> Result<(), KymeraError> {
        let seq = self.next_seq;
        self.entries
            .push(Entry { msg, gate, due, seq })
            .map_err(|_| KymeraError::QueueFull)?;
        self.next_seq += 1;
        Ok(())
    }

    pub fn send(&mut self, msg: M, now: Instant) -> Result<(), KymeraError> {
        self.push(msg, Gate::Open, now)
    }

    pub fn send_later(
        &mut self,
        msg: M,
        now: Instant,
        delay: Duration,
    ) -> Result<(), KymeraError> {
        self.push(msg, Gate::Open, now + delay)
    }

    pub fn send_conditionally(
        &mut self,
        msg: M,
        now: Instant,
        gate: Gate,
    ) -> Result<(), KymeraError> {
        self.push(msg, gate, now)
    }

    /// Remove the first pending message with `key`, in delivery order.
    pub fn cancel_first(&mut self, key: M::Key) -> Option<M> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.msg.key() == key)
            .min_by_key(|(_, e)| e.order())
            .map(|(i, _)| i)?;
        Some(self.entries.remove(index).msg)
    }

    /// Remove every pending message with `key`, returning how many went.
    pub fn cancel_all(&mut self, key: M::Key) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.msg.key() != key);
        before - self.entries.len()
    }

    pub fn contains(&self, key: M::Key) -> bool {
        self.entries.iter().any(|e| e.msg.key() == key)
    }

    /// Sequence number the next pushed message gets.
    pub fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Take the next deliverable message: due by `now` and behind an open
    /// gate.
    pub fn pop_ready(
        &mut self,
        now: Instant,
        is_open: impl Fn(Gate) -> bool,
    ) -> Option<M> {
        self.pop_ready_before(now, u64::MAX, is_open)
    }

    /// Like [`MessageQueue::pop_ready`], ignoring messages pushed at or
    /// after `watermark`.
    pub fn pop_ready_before(
        &mut self,
        now: Instant,
        watermark: u64,
        is_open: impl Fn(Gate) -> bool,
    ) -> Option<M> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.seq < watermark && e.due <= now && is_open(e.gate))
            .min_by_key(|(_, e)| e.order())
            .map(|(i, _)| i)?;
        Some(self.entries.remove(index).msg)
    }

    /// Earliest due time among messages whose gate is open. Gated messages
    /// only become deliverable through a handler, which is followed by
    /// another poll anyway.
    pub fn next_deadline(&self, is_open: impl Fn(Gate) -> bool) -> Option<Instant> {
        self.entries
            .iter()
            .filter(|e| is_open(e.gate))
            .map(|e| e.due)
            .min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
