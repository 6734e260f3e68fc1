use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use walkmat_frame::{FrameConfig, FrameError, FrameReader};
use walkmat_transport::SensorStream;

use crate::config::DeviceId;
use crate::error::Result;
use crate::store::{CapturedFrame, DeviceFrameStore};
use crate::walkway::WalkwayAccumulator;

/// Counters shared between a reader thread and its handle.
#[derive(Debug, Default)]
struct ReaderShared {
    connected: AtomicBool,
    frames: AtomicU64,
    bytes_discarded: AtomicU64,
}

/// Handle to a running port reader thread.
#[derive(Debug)]
pub struct PortReaderHandle {
    device_id: DeviceId,
    port_name: String,
    shared: Arc<ReaderShared>,
    thread: Option<JoinHandle<()>>,
}

impl PortReaderHandle {
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// False once the link closed or failed.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Frames this reader published.
    pub fn frame_count(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    /// Bytes dropped by the buffer high-water mark.
    pub fn bytes_discarded(&self) -> u64 {
        self.shared.bytes_discarded.load(Ordering::Relaxed)
    }

    /// Wait for the thread to exit. The caller raises the stop flag first;
    /// a dropped handle detaches the thread instead.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(device = %self.device_id, "port reader thread panicked");
            }
        }
        self.shared.connected.store(false, Ordering::Release);
    }
}

/// Start a reader thread that decodes frames from `stream` and publishes
/// them to `store` under `device_id` until `stop` is raised or the link
/// goes away. With `walkway` set, full blocks are grouped into scans
/// before they are published.
pub fn spawn(
    device_id: DeviceId,
    stream: SensorStream,
    config: FrameConfig,
    walkway: Option<WalkwayAccumulator>,
    store: Arc<DeviceFrameStore>,
    stop: Arc<AtomicBool>,
) -> Result<PortReaderHandle> {
    let port_name = stream.port_name().to_string();
    let reader = FrameReader::with_config_link(stream, config)?;

    let shared = Arc::new(ReaderShared::default());
    shared.connected.store(true, Ordering::Release);

    let thread = {
        let shared = Arc::clone(&shared);
        let port_name = port_name.clone();
        thread::Builder::new()
            .name(format!("walkmat-reader-{device_id}"))
            .spawn(move || {
                read_loop(device_id, &port_name, reader, walkway, &store, &stop, &shared)
            })?
    };

    Ok(PortReaderHandle {
        device_id,
        port_name,
        shared,
        thread: Some(thread),
    })
}

fn read_loop(
    device_id: DeviceId,
    port_name: &str,
    mut reader: FrameReader<SensorStream>,
    mut walkway: Option<WalkwayAccumulator>,
    store: &DeviceFrameStore,
    stop: &AtomicBool,
    shared: &ReaderShared,
) {
    info!(device = %device_id, port = port_name, "port reader started");

    while !stop.load(Ordering::Acquire) {
        // One link read per pass, so a raised stop flag is seen even while
        // the link streams bytes that never form a frame.
        let result = reader.poll_frame();
        shared
            .bytes_discarded
            .store(reader.stats().bytes_discarded, Ordering::Relaxed);

        match result {
            Ok(None) => continue,
            Ok(Some(frame)) => {
                let count = shared.frames.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(device = %device_id, len = frame.len(), count, "frame received");
                let payload = match walkway.as_mut() {
                    Some(acc) => acc.push(frame.content),
                    None => Some(frame.content),
                };
                if let Some(payload) = payload {
                    store.publish(device_id, CapturedFrame::now(payload));
                }
            }
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                info!(device = %device_id, port = port_name, "link closed");
                break;
            }
            Err(err) => {
                warn!(device = %device_id, port = port_name, error = %err, "link failed");
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::Release);
    info!(
        device = %device_id,
        frames = shared.frames.load(Ordering::Relaxed),
        "port reader stopped"
    );
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    use walkmat_frame::HEADER;

    use super::*;

    fn wire(bodies: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for body in bodies {
            out.extend_from_slice(&HEADER);
            out.extend_from_slice(body);
        }
        out.extend_from_slice(&HEADER);
        out
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn publishes_frames_then_reports_closed_link() {
        let store = Arc::new(DeviceFrameStore::with_devices([DeviceId(4)]));
        let stop = Arc::new(AtomicBool::new(false));
        let stream = SensorStream::from_reader("cursor", Cursor::new(wire(&[b"ab", b"cd"])));

        let handle = spawn(
            DeviceId(4),
            stream,
            FrameConfig::default(),
            None,
            Arc::clone(&store),
            Arc::clone(&stop),
        )
        .unwrap();

        assert!(wait_until(|| !handle.is_connected()));
        assert_eq!(handle.frame_count(), 2);
        assert_eq!(handle.port_name(), "cursor");

        let stats = store.stats(DeviceId(4)).unwrap();
        assert_eq!(stats.frames_published, 2);
        assert_eq!(stats.frames_superseded, 1);
        let round = store.claim_all().unwrap();
        assert_eq!(round[0].1.content.as_ref(), b"cd");
        handle.join();
    }

    /// Streams `HEADER` once, then body bytes forever.
    struct UnterminatedBody {
        started: bool,
    }

    impl std::io::Read for UnterminatedBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            thread::sleep(Duration::from_millis(1));
            if !self.started {
                self.started = true;
                buf[..HEADER.len()].copy_from_slice(&HEADER);
                return Ok(HEADER.len());
            }
            let n = buf.len().min(64);
            buf[..n].fill(0x42);
            Ok(n)
        }
    }

    #[test]
    fn stop_flag_ends_reader_on_unframed_stream() {
        let store = Arc::new(DeviceFrameStore::with_devices([DeviceId(0)]));
        let stop = Arc::new(AtomicBool::new(false));
        let stream = SensorStream::from_reader("noisy", UnterminatedBody { started: false });
        let config = FrameConfig {
            high_water_mark: 512,
            retain_on_overflow: 64,
            ..FrameConfig::default()
        };

        let handle = spawn(
            DeviceId(0),
            stream,
            config,
            None,
            Arc::clone(&store),
            Arc::clone(&stop),
        )
        .unwrap();
        assert!(wait_until(|| handle.bytes_discarded() > 0));
        assert!(handle.is_connected());

        stop.store(true, Ordering::Release);
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            handle.join();
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(Duration::from_secs(2)).is_ok(),
            "reader kept running after stop"
        );
        assert_eq!(store.stats(DeviceId(0)).unwrap().frames_published, 0);
    }

    #[test]
    fn walkway_reader_publishes_whole_scans() {
        let blocks: Vec<Vec<u8>> = (1..=4u8).map(|f| vec![f; walkmat_matrix::BLOCK_LEN]).collect();
        let bodies: Vec<&[u8]> = blocks.iter().map(Vec::as_slice).collect();
        let store = Arc::new(DeviceFrameStore::with_devices([DeviceId(0)]));
        let stream = SensorStream::from_reader("walkway", Cursor::new(wire(&bodies)));

        let handle = spawn(
            DeviceId(0),
            stream,
            FrameConfig::default(),
            Some(WalkwayAccumulator::default()),
            Arc::clone(&store),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        assert!(wait_until(|| !handle.is_connected()));
        assert_eq!(handle.frame_count(), 4);
        // The fourth block starts a scan that never completes.
        assert_eq!(store.stats(DeviceId(0)).unwrap().frames_published, 1);
        let round = store.claim_all().unwrap();
        assert_eq!(round[0].1.content.len(), 3 * walkmat_matrix::BLOCK_LEN);
        handle.join();
    }

    #[test]
    fn stop_flag_ends_idle_reader() {
        let store = Arc::new(DeviceFrameStore::with_devices([DeviceId(0)]));
        let stop = Arc::new(AtomicBool::new(false));
        let opener = walkmat_transport::MemoryOpener::new().with_port("idle", Vec::<u8>::new());
        let settings = walkmat_transport::LinkSettings {
            read_timeout: Duration::from_millis(5),
            ..Default::default()
        };
        let stream = walkmat_transport::PortOpener::open(&opener, "idle", &settings).unwrap();

        let handle = spawn(
            DeviceId(0),
            stream,
            FrameConfig::default(),
            None,
            store,
            Arc::clone(&stop),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(handle.is_connected());

        stop.store(true, Ordering::Release);
        handle.join();
        assert_eq!(opener.open_handles(), 0);
    }
}
