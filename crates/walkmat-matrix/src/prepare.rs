use std::fmt;

use serde::Serialize;

/// How [`prepare_data`] changed the input length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Adjustment {
    /// Input was shorter and was repeated cyclically.
    Padded { from: usize, to: usize },
    /// Input was longer and its tail was dropped.
    Trimmed { from: usize, to: usize },
    /// Input already had the target length.
    Exact,
}

impl Adjustment {
    /// True when input bytes were discarded.
    pub fn lost_data(&self) -> bool {
        matches!(self, Adjustment::Trimmed { .. })
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::Padded { from, to } => write!(f, "Padded ({from}->{to})"),
            Adjustment::Trimmed { from, to } => write!(f, "Trimmed ({from}->{to})"),
            Adjustment::Exact => write!(f, "Perfect match"),
        }
    }
}

/// Raw bytes resized to a target length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub data: Vec<u8>,
    pub adjustment: Adjustment,
}

impl Prepared {
    /// Human-readable note, e.g. `Padded (1000->1024)`.
    pub fn note(&self) -> String {
        self.adjustment.to_string()
    }
}

/// Resize `raw` to exactly `target_len` bytes.
///
/// Shorter input is padded by repeating it from the start; an empty input
/// becomes all zeros. Longer input keeps its first `target_len` bytes.
pub fn prepare_data(raw: &[u8], target_len: usize) -> Prepared {
    let from = raw.len();
    if from == target_len {
        return Prepared {
            data: raw.to_vec(),
            adjustment: Adjustment::Exact,
        };
    }

    if from > target_len {
        return Prepared {
            data: raw[..target_len].to_vec(),
            adjustment: Adjustment::Trimmed {
                from,
                to: target_len,
            },
        };
    }

    let data = if raw.is_empty() {
        vec![0u8; target_len]
    } else {
        raw.iter().copied().cycle().take(target_len).collect()
    };
    Prepared {
        data,
        adjustment: Adjustment::Padded {
            from,
            to: target_len,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_pads_with_zeros() {
        let prepared = prepare_data(&[], 1024);
        assert_eq!(prepared.data, vec![0u8; 1024]);
        assert_eq!(prepared.note(), "Padded (0->1024)");
    }

    #[test]
    fn long_input_is_trimmed() {
        let raw: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
        let prepared = prepare_data(&raw, 1024);

        assert_eq!(prepared.data, raw[..1024].to_vec());
        assert_eq!(prepared.note(), "Trimmed (2048->1024)");
        assert!(prepared.adjustment.lost_data());
    }

    #[test]
    fn exact_input_passes_through() {
        let raw = vec![5u8; 1024];
        let prepared = prepare_data(&raw, 1024);

        assert_eq!(prepared.data, raw);
        assert_eq!(prepared.adjustment, Adjustment::Exact);
        assert_eq!(prepared.note(), "Perfect match");
    }

    #[test]
    fn short_input_repeats_cyclically() {
        let prepared = prepare_data(&[1, 2, 3], 8);
        assert_eq!(prepared.data, vec![1, 2, 3, 1, 2, 3, 1, 2]);
        assert_eq!(prepared.adjustment, Adjustment::Padded { from: 3, to: 8 });
        assert!(!prepared.adjustment.lost_data());
    }
}
