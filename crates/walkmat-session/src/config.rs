use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use walkmat_frame::{FrameConfig, DEFAULT_HIGH_WATER_MARK, DEFAULT_RETAIN_ON_OVERFLOW};
use walkmat_matrix::{ArraySize, SENSOR_COLS, SENSOR_ROWS};
use walkmat_transport::{LinkSettings, DEFAULT_BAUD_RATE};

use crate::discovery::ProbeSettings;
use crate::error::{Result, SessionError};
use crate::walkway::WALKWAY_SEGMENTS;

/// Longest the merger may wait between checks of the frame store.
pub const MAX_MERGE_POLL: Duration = Duration::from_millis(2);

/// Identifies one board within a session. Merges are ordered by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u8);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for DeviceId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// One board: the port it is attached to and its device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub port_name: String,
    pub device_id: DeviceId,
}

impl PortConfig {
    pub fn new(port_name: impl Into<String>, device_id: impl Into<DeviceId>) -> Self {
        Self {
            port_name: port_name.into(),
            device_id: device_id.into(),
        }
    }
}

/// How many boards make up the array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// One 32×32 board.
    #[default]
    Single,
    /// Two boards side by side (32×64).
    Dual,
    /// Three walkway segments (32×96).
    Triple,
}

impl DeviceMode {
    pub fn device_count(&self) -> usize {
        match self {
            DeviceMode::Single => 1,
            DeviceMode::Dual => 2,
            DeviceMode::Triple => 3,
        }
    }

    /// Array size of the combined matrix.
    pub fn array_size(&self) -> ArraySize {
        ArraySize::new(SENSOR_ROWS, SENSOR_COLS * self.device_count())
    }

    pub fn from_device_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(DeviceMode::Single),
            2 => Some(DeviceMode::Dual),
            3 => Some(DeviceMode::Triple),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceMode::Single => "single",
            DeviceMode::Dual => "dual",
            DeviceMode::Triple => "triple",
        })
    }
}

impl FromStr for DeviceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(DeviceMode::Single),
            "dual" => Ok(DeviceMode::Dual),
            "triple" | "walkway" => Ok(DeviceMode::Triple),
            other => Err(format!("unknown device mode {other:?}")),
        }
    }
}

/// Left-to-right placement of the three walkway segments.
///
/// `order[k]` names which segment (0 = lowest device id) is placed at
/// position `k`. The identity keeps ascending device-id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u8; 3]", into = "[u8; 3]")]
pub struct SegmentOrder([u8; 3]);

impl SegmentOrder {
    pub const IDENTITY: SegmentOrder = SegmentOrder([0, 1, 2]);

    /// Accepts only permutations of `{0, 1, 2}`.
    pub fn new(order: [u8; 3]) -> Result<Self> {
        let mut seen = [false; 3];
        for &slot in &order {
            match seen.get_mut(usize::from(slot)) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    return Err(SessionError::Config(format!(
                        "segment order {order:?} is not a permutation of 0,1,2"
                    )))
                }
            }
        }
        Ok(Self(order))
    }

    pub fn as_array(&self) -> [u8; 3] {
        self.0
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for SegmentOrder {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TryFrom<[u8; 3]> for SegmentOrder {
    type Error = SessionError;

    fn try_from(order: [u8; 3]) -> Result<Self> {
        Self::new(order)
    }
}

impl From<SegmentOrder> for [u8; 3] {
    fn from(order: SegmentOrder) -> Self {
        order.0
    }
}

impl fmt::Display for SegmentOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a},{b},{c}")
    }
}

impl FromStr for SegmentOrder {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<u8> = s
            .split(',')
            .map(|p| p.trim().parse::<u8>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| SessionError::Config(format!("invalid segment order {s:?}")))?;
        let order: [u8; 3] = parts.try_into().map_err(|_| {
            SessionError::Config(format!("segment order needs three entries, got {s:?}"))
        })?;
        Self::new(order)
    }
}

/// What the merger does when the output queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait for the consumer.
    Block,
    /// Evict the oldest queued frame.
    #[default]
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropOldest => "drop-oldest",
        })
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "block" => Ok(OverflowPolicy::Block),
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!("unknown overflow policy {other:?}")),
        }
    }
}

/// Everything a session needs to connect and run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub mode: DeviceMode,
    pub ports: Vec<PortConfig>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Run the liveness test on every port before opening it for capture.
    pub probe_before_connect: bool,
    pub probe_settle_ms: u64,
    pub probe_sample_len: usize,
    /// A probe succeeds when more than this many bytes arrive.
    pub probe_min_bytes: usize,
    pub segment_order: SegmentOrder,
    /// One port carries all three walkway segments as consecutive blocks.
    /// Single mode only.
    pub walkway: bool,
    pub array_size: ArraySize,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub merge_poll_ms: u64,
    pub high_water_mark: usize,
    pub retain_on_overflow: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: DeviceMode::Single,
            ports: Vec::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 1000,
            probe_before_connect: true,
            probe_settle_ms: 100,
            probe_sample_len: 50,
            probe_min_bytes: 10,
            segment_order: SegmentOrder::IDENTITY,
            walkway: false,
            array_size: DeviceMode::Single.array_size(),
            queue_capacity: 64,
            overflow_policy: OverflowPolicy::DropOldest,
            merge_poll_ms: 1,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            retain_on_overflow: DEFAULT_RETAIN_ON_OVERFLOW,
        }
    }
}

/// On-disk form: the config plus when it was written.
#[derive(Serialize)]
struct SavedConfig<'a> {
    saved_at: u64,
    config: &'a SessionConfig,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SavedConfigFile {
    #[allow(dead_code)]
    saved_at: u64,
    config: SessionConfig,
}

impl SessionConfig {
    /// Config for `mode` with ports assigned device ids 0, 1, 2 in order.
    pub fn for_ports<I, S>(mode: DeviceMode, port_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ports = port_names
            .into_iter()
            .zip(0u8..)
            .map(|(name, id)| PortConfig::new(name, id))
            .collect();
        Self {
            mode,
            ports,
            array_size: mode.array_size(),
            ..Self::default()
        }
    }

    /// Reject configs a session cannot run.
    pub fn validate(&self) -> Result<()> {
        let expected = self.mode.device_count();
        if self.ports.len() != expected {
            return Err(SessionError::Config(format!(
                "{} mode needs {expected} port(s), got {}",
                self.mode,
                self.ports.len()
            )));
        }

        let mut ids = BTreeSet::new();
        for port in &self.ports {
            if !ids.insert(port.device_id) {
                return Err(SessionError::Config(format!(
                    "device id {} is used more than once",
                    port.device_id
                )));
            }
            if port.port_name.trim().is_empty() {
                return Err(SessionError::Config(format!(
                    "device {} has an empty port name",
                    port.device_id
                )));
            }
        }

        if self.walkway && self.mode != DeviceMode::Single {
            return Err(SessionError::Config(format!(
                "single-port walkway needs single mode, got {}",
                self.mode
            )));
        }
        if self.array_size != self.expected_array_size() {
            return Err(SessionError::Config(format!(
                "array size {} does not match {} mode ({})",
                self.array_size,
                self.mode,
                self.expected_array_size()
            )));
        }
        if self.baud_rate == 0 {
            return Err(SessionError::Config("baud rate must be positive".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(SessionError::Config("read timeout must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(SessionError::Config("queue capacity must be positive".into()));
        }
        let poll = Duration::from_millis(self.merge_poll_ms);
        if poll.is_zero() || poll > MAX_MERGE_POLL {
            return Err(SessionError::Config(format!(
                "merge poll interval must be 1..={} ms, got {}",
                MAX_MERGE_POLL.as_millis(),
                self.merge_poll_ms
            )));
        }
        if self.retain_on_overflow >= self.high_water_mark {
            return Err(SessionError::Config(format!(
                "retained bytes ({}) must be below the high-water mark ({})",
                self.retain_on_overflow, self.high_water_mark
            )));
        }
        Ok(())
    }

    /// Size of the combined frames this config produces.
    pub fn expected_array_size(&self) -> ArraySize {
        if self.walkway {
            ArraySize::new(SENSOR_ROWS, SENSOR_COLS * WALKWAY_SEGMENTS)
        } else {
            self.mode.array_size()
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            read_timeout: self.read_timeout(),
        }
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            high_water_mark: self.high_water_mark,
            retain_on_overflow: self.retain_on_overflow,
            read_timeout: Some(self.read_timeout()),
            ..FrameConfig::default()
        }
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            settle: Duration::from_millis(self.probe_settle_ms),
            sample_len: self.probe_sample_len,
            min_bytes: self.probe_min_bytes,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn merge_poll(&self) -> Duration {
        Duration::from_millis(self.merge_poll_ms)
    }

    /// Load a config written by [`save`](Self::save), or a bare config
    /// object.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        // `saved_at` marks the wrapped form; anything else is a bare config.
        let config = if value.get("saved_at").is_some() {
            serde_json::from_value::<SavedConfigFile>(value)?.config
        } else {
            serde_json::from_value(value)?
        };
        Ok(config)
    }

    /// Write the config as pretty JSON stamped with the current unix time.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let json = serde_json::to_string_pretty(&SavedConfig {
            saved_at,
            config: self,
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
