//! Merge rounds.
//!
//! A round waits until every device has an unclaimed frame, claims them
//! all at once, reorders each block with the JQ transform and places the
//! blocks side by side in device-id order. A missing device delays the
//! round; it is never skipped or filled in.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use tracing::{debug, info, warn};
use walkmat_matrix::{
    sensor_block_matrix, ArraySize, FrameStatistics, Matrix, TransformStatus, BLOCK_LEN,
    SENSOR_COLS, SENSOR_ROWS,
};

use crate::config::{DeviceId, OverflowPolicy, SegmentOrder};
use crate::error::Result;
use crate::store::{CapturedFrame, DeviceFrameStore};

/// Log a progress line every this many merged frames.
const PROGRESS_EVERY: u64 = 100;

/// One synchronized frame across all devices.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedFrame {
    /// Row-major 32×(32·S) samples, one 32-column segment per board block.
    pub data: Vec<u8>,
    /// Session-scoped, starts at 1, no gaps.
    pub frame_number: u64,
    /// Latest capture time among the contributing frames.
    pub timestamp: SystemTime,
    /// Contributing devices, ascending.
    pub source_devices: Vec<DeviceId>,
    pub per_device_status: BTreeMap<DeviceId, TransformStatus>,
}

impl CombinedFrame {
    pub fn device_count(&self) -> usize {
        self.source_devices.len()
    }

    pub fn array_size(&self) -> ArraySize {
        ArraySize::new(SENSOR_ROWS, self.data.len() / SENSOR_ROWS)
    }

    /// Board blocks side by side in this frame.
    pub fn segment_count(&self) -> usize {
        self.data.len() / BLOCK_LEN
    }

    /// The data as a 32×(32·S) matrix.
    pub fn to_matrix(&self) -> Result<Matrix> {
        let size = self.array_size();
        Ok(Matrix::from_vec(size.rows, size.cols, self.data.clone())?)
    }

    pub fn statistics(&self) -> FrameStatistics {
        FrameStatistics::from_samples(&self.data)
    }

    /// Devices whose block went through untransformed.
    pub fn degraded_devices(&self) -> Vec<DeviceId> {
        self.per_device_status
            .iter()
            .filter(|(_, status)| status.is_degraded())
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Segment order shared between the session and the merger.
#[derive(Debug, Default)]
pub struct SharedSegmentOrder(Mutex<SegmentOrder>);

impl SharedSegmentOrder {
    pub fn new(order: SegmentOrder) -> Self {
        Self(Mutex::new(order))
    }

    pub fn get(&self) -> SegmentOrder {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, order: SegmentOrder) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = order;
    }
}

/// Build one combined frame from a claimed round.
///
/// `round` must be in ascending id order, as
/// [`DeviceFrameStore::claim_all`] returns it. A payload of several whole
/// blocks (a single-port walkway scan) is split into one segment per block.
/// With exactly three segments `order` decides which lands at each position.
pub fn merge_round(
    round: Vec<(DeviceId, CapturedFrame)>,
    order: SegmentOrder,
    frame_number: u64,
) -> Result<CombinedFrame> {
    let mut source_devices = Vec::with_capacity(round.len());
    let mut per_device_status = BTreeMap::new();
    let mut blocks = Vec::with_capacity(round.len());
    let mut timestamp = SystemTime::UNIX_EPOCH;

    for (id, frame) in round {
        let mut status = TransformStatus::Applied;
        for raw in segments(&frame.content) {
            let (block, block_status) = sensor_block_matrix(raw);
            if let TransformStatus::Degraded { reason } = &block_status {
                warn!(device = %id, len = raw.len(), reason = %reason, "block not transformed");
                if !status.is_degraded() {
                    status = block_status;
                }
            }
            blocks.push(Some(block));
        }
        timestamp = timestamp.max(frame.captured_at);
        source_devices.push(id);
        per_device_status.insert(id, status);
    }

    let placed: Vec<Matrix> = if blocks.len() == 3 && !order.is_identity() {
        order
            .as_array()
            .iter()
            .filter_map(|&slot| blocks[usize::from(slot)].take())
            .collect()
    } else {
        blocks.into_iter().flatten().collect()
    };

    let data = Matrix::hconcat(&placed)?.into_bytes();
    debug_assert_eq!(data.len() % BLOCK_LEN, 0);

    Ok(CombinedFrame {
        data,
        frame_number,
        timestamp,
        source_devices,
        per_device_status,
    })
}

fn segments(payload: &[u8]) -> Vec<&[u8]> {
    if payload.len() > BLOCK_LEN && payload.len() % BLOCK_LEN == 0 {
        payload.chunks(BLOCK_LEN).collect()
    } else {
        vec![payload]
    }
}

/// Bounded hand-off of combined frames to the consumer.
#[derive(Debug, Clone)]
pub struct OutputQueue {
    tx: Sender<CombinedFrame>,
    // Kept so drop-oldest can evict.
    rx: Receiver<CombinedFrame>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

impl OutputQueue {
    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Receiving end for consumers.
    pub fn receiver(&self) -> Receiver<CombinedFrame> {
        self.rx.clone()
    }

    /// Frames evicted under [`OverflowPolicy::DropOldest`].
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Hand `frame` to the consumer. Returns `false` if the merger should
    /// stop: the queue is gone, or `stop` was raised while blocked.
    pub fn deliver(&self, mut frame: CombinedFrame, stop: &AtomicBool, poll: Duration) -> bool {
        match self.policy {
            OverflowPolicy::DropOldest => loop {
                match self.tx.try_send(frame) {
                    Ok(()) => return true,
                    Err(TrySendError::Full(back)) => {
                        if self.rx.try_recv().is_ok() {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        frame = back;
                    }
                    Err(TrySendError::Disconnected(_)) => return false,
                }
            },
            OverflowPolicy::Block => loop {
                match self.tx.send_timeout(frame, poll) {
                    Ok(()) => return true,
                    Err(SendTimeoutError::Timeout(back)) => {
                        if stop.load(Ordering::Acquire) {
                            return false;
                        }
                        frame = back;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => return false,
                }
            },
        }
    }
}

/// The merger: owns the loop that turns store rounds into combined frames.
pub struct Synchronizer {
    store: Arc<DeviceFrameStore>,
    segment_order: Arc<SharedSegmentOrder>,
    frame_counter: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    output: OutputQueue,
    poll: Duration,
}

impl Synchronizer {
    pub fn new(
        store: Arc<DeviceFrameStore>,
        segment_order: Arc<SharedSegmentOrder>,
        frame_counter: Arc<AtomicU64>,
        stop: Arc<AtomicBool>,
        output: OutputQueue,
        poll: Duration,
    ) -> Self {
        Self {
            store,
            segment_order,
            frame_counter,
            stop,
            output,
            poll,
        }
    }

    /// Run merge rounds on a dedicated thread.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("walkmat-merger".into())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Run merge rounds until the stop flag is raised.
    pub fn run(self) {
        let devices = self.store.device_ids().len();
        info!(devices, "synchronizer started");

        while !self.stop.load(Ordering::Acquire) {
            let Some(round) = self.store.wait_claim(self.poll) else {
                continue;
            };

            let frame_number = self.frame_counter.load(Ordering::Acquire) + 1;
            let frame = match merge_round(round, self.segment_order.get(), frame_number) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "merge round failed");
                    continue;
                }
            };
            self.frame_counter.store(frame_number, Ordering::Release);

            debug!(
                frame_number,
                len = frame.data.len(),
                degraded = frame.degraded_devices().len(),
                "combined frame"
            );
            if frame_number % PROGRESS_EVERY == 0 {
                info!(
                    frame_number,
                    devices,
                    dropped = self.output.dropped(),
                    "merge progress"
                );
            }

            if !self.output.deliver(frame, &self.stop, self.poll) {
                break;
            }
        }

        info!(
            frames = self.frame_counter.load(Ordering::Acquire),
            "synchronizer stopped"
        );
    }
}
