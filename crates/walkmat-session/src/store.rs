use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::Serialize;

use crate::config::DeviceId;

/// One frame as published by a port reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub content: Bytes,
    pub captured_at: SystemTime,
}

impl CapturedFrame {
    /// Stamp `content` with the current time.
    pub fn now(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            captured_at: SystemTime::now(),
        }
    }
}

/// Per-device counters kept by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub frames_published: u64,
    /// Frames taken by a merge round.
    pub frames_claimed: u64,
    /// Frames overwritten before any merge claimed them.
    pub frames_superseded: u64,
    /// Whether an unclaimed frame is waiting.
    pub pending: bool,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<CapturedFrame>,
    stats: SlotStats,
}

/// Latest-frame slot per device, shared by the readers and the merger.
///
/// Every publish and every claim takes the one lock over the whole map, so
/// a merge round never sees a torn view across devices.
#[derive(Debug, Default)]
pub struct DeviceFrameStore {
    slots: Mutex<BTreeMap<DeviceId, Slot>>,
    ready: Condvar,
}

impl DeviceFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with an empty slot for each id.
    pub fn with_devices(ids: impl IntoIterator<Item = DeviceId>) -> Self {
        let store = Self::new();
        for id in ids {
            store.register(id);
        }
        store
    }

    /// Add an empty slot for `id`. Existing slots are left alone.
    pub fn register(&self, id: DeviceId) {
        self.lock().entry(id).or_default();
    }

    /// Registered device ids, ascending.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.lock().keys().copied().collect()
    }

    /// Replace the pending frame of `id` and wake the merger.
    ///
    /// Returns `false` if `id` was never registered.
    pub fn publish(&self, id: DeviceId, frame: CapturedFrame) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(&id) else {
            return false;
        };
        slot.stats.frames_published += 1;
        if slot.pending.replace(frame).is_some() {
            slot.stats.frames_superseded += 1;
        }
        drop(slots);
        self.ready.notify_all();
        true
    }

    /// Take every pending frame, in ascending id order, if and only if all
    /// registered devices have one. Otherwise nothing is taken.
    pub fn claim_all(&self) -> Option<Vec<(DeviceId, CapturedFrame)>> {
        let mut slots = self.lock();
        Self::claim_locked(&mut slots)
    }

    /// Like [`claim_all`](Self::claim_all), but wait up to `timeout` for a
    /// publish when the round is not complete yet.
    pub fn wait_claim(&self, timeout: Duration) -> Option<Vec<(DeviceId, CapturedFrame)>> {
        let mut slots = self.lock();
        if let Some(round) = Self::claim_locked(&mut slots) {
            return Some(round);
        }
        let (mut slots, _) = self
            .ready
            .wait_timeout(slots, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        Self::claim_locked(&mut slots)
    }

    /// Wake any thread blocked in [`wait_claim`](Self::wait_claim).
    pub fn notify(&self) {
        self.ready.notify_all();
    }

    pub fn stats(&self, id: DeviceId) -> Option<SlotStats> {
        self.lock().get(&id).map(|slot| SlotStats {
            pending: slot.pending.is_some(),
            ..slot.stats
        })
    }

    fn claim_locked(
        slots: &mut BTreeMap<DeviceId, Slot>,
    ) -> Option<Vec<(DeviceId, CapturedFrame)>> {
        if slots.is_empty() || slots.values().any(|slot| slot.pending.is_none()) {
            return None;
        }
        let round = slots
            .iter_mut()
            .filter_map(|(id, slot)| {
                let frame = slot.pending.take()?;
                slot.stats.frames_claimed += 1;
                Some((*id, frame))
            })
            .collect();
        Some(round)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DeviceId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
