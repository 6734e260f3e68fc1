use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use tracing::{info, warn};
use walkmat_matrix::ArraySize;
use walkmat_transport::{LinkSettings, PortOpener, SensorStream, SerialOpener};

use crate::config::{DeviceId, DeviceMode, PortConfig, SegmentOrder, SessionConfig};
use crate::discovery::{probe_port, ProbeSettings};
use crate::error::{Result, SessionError};
use crate::port_reader::{self, PortReaderHandle};
use crate::store::DeviceFrameStore;
use crate::synchronizer::{CombinedFrame, OutputQueue, SharedSegmentOrder, Synchronizer};
use crate::walkway::WalkwayAccumulator;

/// Configuration surface a device manager drives.
///
/// Mode, ports and array size can only change while disconnected; the
/// segment order can change at any time and applies from the next round.
pub trait MultiPortCapable {
    fn set_device_mode(&mut self, mode: DeviceMode) -> Result<()>;
    fn set_port_configs(&mut self, ports: Vec<PortConfig>) -> Result<()>;
    fn set_segment_order(&mut self, order: SegmentOrder);
    fn set_array_size(&mut self, rows: usize, cols: usize) -> Result<()>;
}

/// Per-device view returned by [`MultiPortSession::device_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub connected: bool,
    pub port: String,
    /// Frames the port reader decoded.
    pub frame_count: u64,
    /// Frames that went into a combined frame.
    pub frames_merged: u64,
    /// Frames overwritten before a merge claimed them.
    pub frames_superseded: u64,
    /// Bytes dropped by the buffer high-water mark.
    pub bytes_discarded: u64,
}

/// Threads and shared state of a connected session.
struct Running {
    readers: Vec<PortReaderHandle>,
    merger: JoinHandle<()>,
    store: Arc<DeviceFrameStore>,
    stop: Arc<AtomicBool>,
    output: OutputQueue,
}

/// Owns the connection lifecycle of one to three boards.
///
/// `connect` probes and opens every configured port, or none of them. Once
/// connected, one thread per port feeds the frame store and a merger
/// thread emits [`CombinedFrame`]s on [`frames`](Self::frames).
pub struct MultiPortSession {
    config: SessionConfig,
    opener: Arc<dyn PortOpener>,
    segment_order: Arc<SharedSegmentOrder>,
    frame_counter: Arc<AtomicU64>,
    running: Option<Running>,
}

impl MultiPortSession {
    pub fn new(config: SessionConfig, opener: impl PortOpener + 'static) -> Self {
        Self {
            segment_order: Arc::new(SharedSegmentOrder::new(config.segment_order)),
            config,
            opener: Arc::new(opener),
            frame_counter: Arc::new(AtomicU64::new(0)),
            running: None,
        }
    }

    /// Session over real serial ports.
    pub fn serial(config: SessionConfig) -> Self {
        Self::new(config, SerialOpener)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect every configured port, then start readers and the merger.
    ///
    /// If any port fails its liveness test or cannot be opened, ports
    /// already opened in this attempt are closed and the session stays
    /// disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        self.config.validate()?;

        let streams = self.open_all()?;
        let running = self.start(streams)?;
        self.running = Some(running);

        info!(
            mode = %self.config.mode,
            devices = self.config.ports.len(),
            transport = self.opener.transport_name(),
            "session connected"
        );
        Ok(())
    }

    /// Switch to single-board mode on `port` (device 0) and connect.
    pub fn connect_single(&mut self, port: impl Into<String>) -> Result<()> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        self.config.mode = DeviceMode::Single;
        self.config.array_size = self.config.expected_array_size();
        self.config.ports = vec![PortConfig::new(port, DeviceId(0))];
        self.connect()
    }

    /// Stop readers and the merger and close every port. Idempotent.
    pub fn disconnect(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.stop.store(true, Ordering::Release);
        running.store.notify();
        for reader in running.readers {
            let device = reader.device_id();
            reader.join();
            info!(device = %device, "device disconnected");
        }
        if running.merger.join().is_err() {
            warn!("merger thread panicked");
        }
        info!(
            frames = self.frame_count(),
            dropped = running.output.dropped(),
            "session disconnected"
        );
    }

    /// True while running and every port reader still has its link.
    pub fn is_connected(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.readers.iter().all(PortReaderHandle::is_connected))
    }

    /// Combined frames emitted since the last connect.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }

    /// Frames evicted from a full output queue.
    pub fn frames_dropped(&self) -> u64 {
        self.running.as_ref().map_or(0, |r| r.output.dropped())
    }

    pub fn device_status(&self) -> BTreeMap<DeviceId, DeviceStatus> {
        let Some(running) = &self.running else {
            return BTreeMap::new();
        };
        running
            .readers
            .iter()
            .map(|reader| {
                let slot = running.store.stats(reader.device_id()).unwrap_or_default();
                let status = DeviceStatus {
                    connected: reader.is_connected(),
                    port: reader.port_name().to_string(),
                    frame_count: reader.frame_count(),
                    frames_merged: slot.frames_claimed,
                    frames_superseded: slot.frames_superseded,
                    bytes_discarded: reader.bytes_discarded(),
                };
                (reader.device_id(), status)
            })
            .collect()
    }

    /// Receiving end of the combined-frame queue.
    pub fn frames(&self) -> Result<Receiver<CombinedFrame>> {
        self.running
            .as_ref()
            .map(|r| r.output.receiver())
            .ok_or(SessionError::NotConnected)
    }

    /// Next combined frame, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<CombinedFrame>> {
        let rx = self.frames()?;
        match rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::NotConnected),
        }
    }

    /// Up to `max` frames that are already queued.
    pub fn drain(&self, max: usize) -> Vec<CombinedFrame> {
        self.running
            .as_ref()
            .map(|r| r.output.receiver().try_iter().take(max).collect())
            .unwrap_or_default()
    }

    pub fn segment_order(&self) -> SegmentOrder {
        self.segment_order.get()
    }

    /// Treat the single port as a walkway that sends its three segments as
    /// consecutive blocks. Takes effect on the next connect.
    pub fn set_walkway_mode(&mut self, enabled: bool) -> Result<()> {
        self.ensure_disconnected()?;
        if enabled && self.config.mode != DeviceMode::Single {
            return Err(SessionError::Config(format!(
                "single-port walkway needs single mode, got {}",
                self.config.mode
            )));
        }
        self.config.walkway = enabled;
        self.config.array_size = self.config.expected_array_size();
        Ok(())
    }

    fn open_all(&self) -> Result<Vec<(PortConfig, SensorStream)>> {
        let link = self.config.link_settings();
        let probe = self.config.probe_settings();
        let mut opened = Vec::with_capacity(self.config.ports.len());

        for port in &self.config.ports {
            match self.open_one(port, &link, &probe) {
                Ok(stream) => {
                    info!(device = %port.device_id, port = %port.port_name, "device connected");
                    opened.push((port.clone(), stream));
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        opened = opened.len(),
                        "connect failed; closing ports opened in this attempt"
                    );
                    drop(opened);
                    return Err(err);
                }
            }
        }
        Ok(opened)
    }

    fn open_one(
        &self,
        port: &PortConfig,
        link: &LinkSettings,
        probe: &ProbeSettings,
    ) -> Result<SensorStream> {
        let failed = |reason: String| SessionError::ConnectFailed {
            device_id: port.device_id,
            port: port.port_name.clone(),
            reason,
        };

        if self.config.probe_before_connect {
            let report = probe_port(self.opener.as_ref(), &port.port_name, link, probe)
                .map_err(|err| failed(err.to_string()))?;
            if !report.alive {
                return Err(failed(format!(
                    "liveness test received {} byte(s)",
                    report.bytes_received
                )));
            }
        }
        self.opener
            .open(&port.port_name, link)
            .map_err(|err| failed(err.to_string()))
    }

    fn start(&self, streams: Vec<(PortConfig, SensorStream)>) -> Result<Running> {
        let store = Arc::new(DeviceFrameStore::with_devices(
            streams.iter().map(|(port, _)| port.device_id),
        ));
        let stop = Arc::new(AtomicBool::new(false));
        let output = OutputQueue::bounded(self.config.queue_capacity, self.config.overflow_policy);
        self.frame_counter.store(0, Ordering::Release);

        let mut readers = Vec::with_capacity(streams.len());
        for (port, stream) in streams {
            let walkway = self.config.walkway.then(WalkwayAccumulator::default);
            match port_reader::spawn(
                port.device_id,
                stream,
                self.config.frame_config(),
                walkway,
                Arc::clone(&store),
                Arc::clone(&stop),
            ) {
                Ok(reader) => readers.push(reader),
                Err(err) => {
                    Self::abort(&stop, readers);
                    return Err(err);
                }
            }
        }

        let merger = Synchronizer::new(
            Arc::clone(&store),
            Arc::clone(&self.segment_order),
            Arc::clone(&self.frame_counter),
            Arc::clone(&stop),
            output.clone(),
            self.config.merge_poll(),
        )
        .spawn();
        let merger = match merger {
            Ok(merger) => merger,
            Err(err) => {
                Self::abort(&stop, readers);
                return Err(err);
            }
        };

        Ok(Running {
            readers,
            merger,
            store,
            stop,
            output,
        })
    }

    fn abort(stop: &AtomicBool, readers: Vec<PortReaderHandle>) {
        stop.store(true, Ordering::Release);
        for reader in readers {
            reader.join();
        }
    }

    fn ensure_disconnected(&self) -> Result<()> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        Ok(())
    }
}

impl MultiPortCapable for MultiPortSession {
    /// Also resets the array size to the mode's size.
    fn set_device_mode(&mut self, mode: DeviceMode) -> Result<()> {
        self.ensure_disconnected()?;
        self.config.mode = mode;
        if mode != DeviceMode::Single {
            self.config.walkway = false;
        }
        self.config.array_size = self.config.expected_array_size();
        Ok(())
    }

    fn set_port_configs(&mut self, ports: Vec<PortConfig>) -> Result<()> {
        self.ensure_disconnected()?;
        let mut ids: Vec<DeviceId> = ports.iter().map(|p| p.device_id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != ports.len() {
            return Err(SessionError::Config("device ids must be unique".into()));
        }
        self.config.ports = ports;
        Ok(())
    }

    fn set_segment_order(&mut self, order: SegmentOrder) {
        self.config.segment_order = order;
        self.segment_order.set(order);
        info!(order = %order, "segment order updated");
    }

    fn set_array_size(&mut self, rows: usize, cols: usize) -> Result<()> {
        self.ensure_disconnected()?;
        let size = ArraySize::new(rows, cols);
        let expected = self.config.expected_array_size();
        if size != expected {
            return Err(SessionError::Config(format!(
                "array size {size} does not match {} mode ({expected})",
                self.config.mode
            )));
        }
        self.config.array_size = size;
        Ok(())
    }
}

impl Drop for MultiPortSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
