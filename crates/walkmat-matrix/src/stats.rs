use ndarray::{ArrayView, ArrayView1, Dimension};
use serde::Serialize;

/// Summary statistics over a pressure matrix.
///
/// `std` is the population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStatistics {
    pub max: u8,
    pub min: u8,
    pub mean: f64,
    pub std: f64,
    pub sum: u64,
    pub nonzero_count: usize,
    pub total_points: usize,
}

impl FrameStatistics {
    /// Statistics over a flat sample slice.
    pub fn from_samples(samples: &[u8]) -> Self {
        Self::from_array(ArrayView1::from(samples))
    }

    /// Statistics over an array of any shape.
    pub fn from_array<D: Dimension>(samples: ArrayView<'_, u8, D>) -> Self {
        if samples.is_empty() {
            return Self {
                max: 0,
                min: 0,
                mean: 0.0,
                std: 0.0,
                sum: 0,
                nonzero_count: 0,
                total_points: 0,
            };
        }

        let values = samples.mapv(f64::from);
        let mean = values.mean().unwrap_or(0.0);
        let variance = values.mapv(|x| (x - mean).powi(2)).mean().unwrap_or(0.0);

        Self {
            max: samples.fold(u8::MIN, |m, &s| m.max(s)),
            min: samples.fold(u8::MAX, |m, &s| m.min(s)),
            mean,
            std: variance.sqrt(),
            sum: samples.fold(0u64, |acc, &s| acc + u64::from(s)),
            nonzero_count: samples.iter().filter(|&&s| s != 0).count(),
            total_points: samples.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_over_known_values() {
        let stats = FrameStatistics::from_samples(&[0, 2, 4, 4, 4, 5, 5, 7, 9, 0]);

        assert_eq!(stats.max, 9);
        assert_eq!(stats.min, 0);
        assert_eq!(stats.sum, 40);
        assert_eq!(stats.nonzero_count, 8);
        assert_eq!(stats.total_points, 10);
        assert!((stats.mean - 4.0).abs() < 1e-12);
        // Population variance: (16+4+0+0+0+1+1+9+25+16)/10 = 7.2
        assert!((stats.std - 7.2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn statistics_over_empty_input() {
        let stats = FrameStatistics::from_samples(&[]);
        assert_eq!(stats.total_points, 0);
        assert_eq!(stats.sum, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn two_dimensional_input_matches_flat_input() {
        let samples = [0u8, 3, 6, 9, 12, 0];
        let grid = ndarray::Array2::from_shape_vec((2, 3), samples.to_vec()).unwrap();

        assert_eq!(
            FrameStatistics::from_array(grid.view()),
            FrameStatistics::from_samples(&samples)
        );
    }

    #[test]
    fn uniform_matrix_has_zero_spread() {
        let stats = FrameStatistics::from_samples(&[255; 1024]);
        assert_eq!(stats.max, 255);
        assert_eq!(stats.min, 255);
        assert_eq!(stats.std, 0.0);
        assert_eq!(stats.sum, 255 * 1024);
    }
}
