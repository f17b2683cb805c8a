use crate::config::StagingConfig;
use crate::preprocessing::RepairedEpochs;
use log::debug;

/// Per-epoch features fed to the classifier
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariabilityFeatures {
    pub hrv: Vec<f64>,
    pub brv: Vec<f64>,
    pub body_movement: Vec<f64>,
}

/// Windowed lag-1 roughness of an epoch series.
///
/// `v[i]` is the mean of `|x[k] - x[k + 1]|` for `k` in
/// `[max(0, i - q), min(i + q, n - 2)]`. Away from the ends this is the mean
/// absolute difference between the window `[i - q, i + q]` and the same window
/// shifted forward by one epoch; at the tail the pairing is cut to the shorter
/// window. With `q = 0` the last epoch reuses the final pair.
pub fn local_variability(values: &[f64], half_window: usize) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let diffs: Vec<f64> = values.windows(2).map(|w| (w[0] - w[1]).abs()).collect();
    let last_pair = diffs.len() - 1;

    (0..n)
        .map(|i| {
            let hi = (i + half_window).min(last_pair);
            let lo = i.saturating_sub(half_window).min(hi);
            let window = &diffs[lo..=hi];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// log2(offset + activity); the offset keeps zero activity finite
pub fn body_movement(activity: &[f64], offset: f64) -> Vec<f64> {
    activity.iter().map(|a| (offset + a).log2()).collect()
}

pub fn extract_features(epochs: &RepairedEpochs, config: &StagingConfig) -> VariabilityFeatures {
    let q = config.variability_window;
    let features = VariabilityFeatures {
        hrv: local_variability(&epochs.heart_rate, q),
        brv: local_variability(&epochs.breathing_rate, q),
        body_movement: body_movement(&epochs.activity, config.movement_offset),
    };
    debug!(
        "Computed variability over {} epochs (q = {})",
        features.hrv.len(),
        q
    );
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn window_clips_at_both_ends() {
        // lag-1 differences are [1, 2, 3]
        let v = local_variability(&[0.0, 1.0, 3.0, 6.0], 1);
        assert_eq!(v, vec![1.5, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn constant_series_has_no_variability() {
        let v = local_variability(&[72.0; 30], 20);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn alternating_series_has_unit_variability_everywhere() {
        let series: Vec<f64> = (0..50).map(|i| (i % 2) as f64).collect();
        let v = local_variability(&series, 5);
        assert_eq!(v, vec![1.0; 50]);
    }

    #[test]
    fn rough_stretch_stands_out_locally() {
        let mut series = vec![60.0; 60];
        for (i, value) in series.iter_mut().enumerate().skip(30).take(10) {
            *value = if i % 2 == 0 { 55.0 } else { 65.0 };
        }
        let v = local_variability(&series, 3);

        assert_eq!(v[5], 0.0);
        assert!(v[35] > 5.0);
        assert_eq!(v[55], 0.0);
    }

    #[test]
    fn zero_half_window_uses_single_pair() {
        let v = local_variability(&[1.0, 4.0, 2.0], 0);
        assert_eq!(v, vec![3.0, 2.0, 2.0]);
    }

    #[test]
    fn short_series() {
        assert!(local_variability(&[], 20).is_empty());
        assert_eq!(local_variability(&[5.0], 20), vec![0.0]);
    }

    #[test]
    fn body_movement_is_log_compressed() {
        let bm = body_movement(&[0.0, 0.99, 3.99], 0.01);
        assert_eq!(bm[0], 0.01_f64.log2());
        assert!(bm[0].is_finite());
        assert!(bm[1].abs() < 1e-12);
        assert!((bm[2] - 2.0).abs() < 1e-12);
    }
}
