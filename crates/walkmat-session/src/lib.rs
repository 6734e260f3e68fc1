//! Multi-port capture sessions.
//!
//! This is the "just works" layer. Configure one to three boards, connect,
//! and receive one [`CombinedFrame`] per synchronized round:
//!
//! - one reader thread per port decodes frames into a [`DeviceFrameStore`]
//! - a merger thread claims a frame from every device at once, applies the
//!   JQ reorder and joins the blocks in device-id order
//! - connect is all-or-nothing; a failing port rolls back the attempt
//!
//! A single walkway port that sends its three segments back to back is
//! grouped per scan by [`WalkwayAccumulator`].

pub mod config;
pub mod discovery;
pub mod error;
pub mod port_reader;
pub mod session;
pub mod store;
pub mod synchronizer;
pub mod walkway;

pub use config::{
    DeviceId, DeviceMode, OverflowPolicy, PortConfig, SegmentOrder, SessionConfig, MAX_MERGE_POLL,
};
pub use discovery::{
    check_sensor_block, find_working_port, probe_port, ProbeReport, ProbeSettings, SensorBlockCheck,
};
pub use error::{Result, SessionError};
pub use port_reader::PortReaderHandle;
pub use session::{DeviceStatus, MultiPortCapable, MultiPortSession};
pub use store::{CapturedFrame, DeviceFrameStore, SlotStats};
pub use synchronizer::{merge_round, CombinedFrame, OutputQueue, SharedSegmentOrder, Synchronizer};
pub use walkway::{WalkwayAccumulator, WALKWAY_SEGMENTS};
