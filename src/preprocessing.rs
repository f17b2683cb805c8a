use crate::config::{EpochAlignment, StagingConfig};
use crate::data_loading::{ChannelKind, Recording};
use crate::error::{Result, StagingError};
use log::{debug, warn};

/// Per-channel epoch means before repair; `None` marks an epoch without a valid sample
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelEpochs {
    /// Time of each epoch's first sample, in seconds
    pub start: Vec<f64>,
    pub heart_rate: Vec<Option<f64>>,
    pub breathing_rate: Vec<Option<f64>>,
    pub activity: Vec<Option<f64>>,
}

impl ChannelEpochs {
    pub fn len(&self) -> usize {
        self.heart_rate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_empty()
    }

    fn truncate(&mut self, len: usize) {
        self.start.truncate(len);
        self.heart_rate.truncate(len);
        self.breathing_rate.truncate(len);
        self.activity.truncate(len);
    }
}

/// Repaired per-channel epoch means, all of equal length
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepairedEpochs {
    pub start: Vec<f64>,
    pub heart_rate: Vec<f64>,
    pub breathing_rate: Vec<f64>,
    pub activity: Vec<f64>,
}

/// Population mean and standard deviation over the finite values
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len() as f64;
    if finite.is_empty() {
        return None;
    }

    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite
        .iter()
        .map(|&x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;

    Some((mean, variance.sqrt()))
}

/// Epoch ordinal of every sample.
///
/// An epoch opens at the first sample's time; a sample whose time is at least
/// `epoch_length` past the current epoch's start opens the next epoch at its
/// own time. Boundaries therefore follow the data rather than a fixed grid.
pub fn epoch_assignments(times: &[f64], epoch_length: f64) -> Result<Vec<usize>> {
    let Some(&first) = times.first() else {
        return Ok(Vec::new());
    };

    let mut ordinals = Vec::with_capacity(times.len());
    times.iter().enumerate().try_fold(
        (first, first, 0usize),
        |(start, previous, ordinal), (index, &t)| {
            if !t.is_finite() {
                return Err(StagingError::NonFiniteTime(index));
            }
            if t < previous {
                return Err(StagingError::NonMonotonicTime {
                    index,
                    previous,
                    current: t,
                });
            }

            let (start, ordinal) = if t - start < epoch_length {
                (start, ordinal)
            } else {
                (t, ordinal + 1)
            };
            ordinals.push(ordinal);
            Ok((start, t, ordinal))
        },
    )?;

    Ok(ordinals)
}

/// Mean of the present values in each epoch
fn epoch_means(ordinals: &[usize], values: &[Option<f64>]) -> Vec<Option<f64>> {
    let count = ordinals.last().map_or(0, |&o| o + 1);
    let mut sums = vec![(0.0_f64, 0usize); count];

    for (&ordinal, value) in ordinals.iter().zip(values) {
        if let Some(v) = value {
            sums[ordinal].0 += v;
            sums[ordinal].1 += 1;
        }
    }

    sums.into_iter()
        .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
        .collect()
}

/// Time of the first sample in each epoch
fn epoch_starts(times: &[f64], ordinals: &[usize]) -> Vec<f64> {
    let mut starts = Vec::new();
    for (&t, &ordinal) in times.iter().zip(ordinals) {
        if ordinal == starts.len() {
            starts.push(t);
        }
    }
    starts
}

/// Segment one channel's valid samples into per-epoch means
pub fn segment_channel(times: &[f64], values: &[f64], epoch_length: f64) -> Result<Vec<f64>> {
    let ordinals = epoch_assignments(times, epoch_length)?;
    let present: Vec<Option<f64>> = values.iter().map(|&v| Some(v)).collect();
    Ok(epoch_means(&ordinals, &present).into_iter().flatten().collect())
}

fn segment_ordinal(recording: &Recording, epoch_length: f64) -> Result<ChannelEpochs> {
    // Rows missing every channel still have to keep the time axis ordered
    epoch_assignments(&recording.times(), epoch_length)?;

    let segment = |kind: ChannelKind| -> Result<(Vec<f64>, Vec<Option<f64>>)> {
        let (times, values) = recording.channel(kind);
        if values.is_empty() {
            return Err(StagingError::EmptyChannel(kind.name()));
        }
        let ordinals = epoch_assignments(&times, epoch_length)?;
        let present: Vec<Option<f64>> = values.iter().map(|&v| Some(v)).collect();
        let means = epoch_means(&ordinals, &present);
        debug!("{}: {} samples -> {} epochs", kind.name(), values.len(), means.len());
        Ok((epoch_starts(&times, &ordinals), means))
    };

    // Epoch start times follow the heart-rate channel
    let (start, heart_rate) = segment(ChannelKind::HeartRate)?;
    let (_, breathing_rate) = segment(ChannelKind::BreathingRate)?;
    let (_, activity) = segment(ChannelKind::Activity)?;
    let mut epochs = ChannelEpochs {
        start,
        heart_rate,
        breathing_rate,
        activity,
    };

    let lengths = [
        epochs.heart_rate.len(),
        epochs.breathing_rate.len(),
        epochs.activity.len(),
    ];
    let shortest = lengths.iter().copied().min().unwrap_or(0);
    if lengths.iter().any(|&n| n != shortest) {
        warn!(
            "Channel epoch counts differ (hr {}, br {}, activity {}), truncating to {}",
            lengths[0], lengths[1], lengths[2], shortest
        );
        epochs.truncate(shortest);
    }

    Ok(epochs)
}

fn segment_shared_grid(recording: &Recording, epoch_length: f64) -> Result<ChannelEpochs> {
    for kind in ChannelKind::ALL {
        if recording.samples.iter().all(|s| s.value(kind).is_none()) {
            return Err(StagingError::EmptyChannel(kind.name()));
        }
    }

    let times = recording.times();
    let ordinals = epoch_assignments(&times, epoch_length)?;
    let column = |kind: ChannelKind| -> Vec<Option<f64>> {
        let values: Vec<Option<f64>> = recording.samples.iter().map(|s| s.value(kind)).collect();
        epoch_means(&ordinals, &values)
    };

    let epochs = ChannelEpochs {
        start: epoch_starts(&times, &ordinals),
        heart_rate: column(ChannelKind::HeartRate),
        breathing_rate: column(ChannelKind::BreathingRate),
        activity: column(ChannelKind::Activity),
    };
    debug!("Shared grid: {} samples -> {} epochs", recording.len(), epochs.len());
    Ok(epochs)
}

/// Cut a recording into equal-length per-channel epoch series
pub fn segment_recording(recording: &Recording, config: &StagingConfig) -> Result<ChannelEpochs> {
    if recording.is_empty() {
        return Err(StagingError::EmptyRecording);
    }

    match config.alignment {
        EpochAlignment::Ordinal => segment_ordinal(recording, config.epoch_length),
        EpochAlignment::SharedGrid => segment_shared_grid(recording, config.epoch_length),
    }
}

/// Mark values further than `threshold` standard deviations from the mean as missing.
/// Mean and deviation ignore values that are already missing.
pub fn detect_artifacts(values: &[Option<f64>], threshold: f64) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let Some((mean, std)) = mean_std(&present) else {
        return values.to_vec();
    };

    values
        .iter()
        .map(|value| match value {
            Some(v) if v.is_finite() && (v - mean).abs() <= threshold * std => Some(*v),
            _ => None,
        })
        .collect()
}

/// Forward-fill gaps with the last valid value; a leading gap takes the first valid value
pub fn fill_with_last_valid(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let Some(mut last_valid) = values.iter().flatten().copied().next() else {
        return values.to_vec();
    };

    values
        .iter()
        .map(|value| {
            if let Some(v) = value {
                last_valid = *v;
            }
            Some(last_valid)
        })
        .collect()
}

/// Detect and repair artifacts in one channel.
/// A channel without any valid value comes back as NaN.
pub fn repair_artifacts(values: &[Option<f64>], threshold: f64) -> Vec<f64> {
    let repaired = fill_with_last_valid(&detect_artifacts(values, threshold));
    let flagged = values
        .iter()
        .zip(&repaired)
        .filter(|(before, after)| before.is_some() && *before != *after)
        .count();
    if flagged > 0 {
        debug!("Repaired {} artifact epochs", flagged);
    }

    repaired.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

pub fn repair_epochs(epochs: &ChannelEpochs, threshold: f64) -> RepairedEpochs {
    RepairedEpochs {
        start: epochs.start.clone(),
        heart_rate: repair_artifacts(&epochs.heart_rate, threshold),
        breathing_rate: repair_artifacts(&epochs.breathing_rate, threshold),
        activity: repair_artifacts(&epochs.activity, threshold),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loading::RawSample;
    use pretty_assertions::assert_eq;

    fn sample(time: f64, hr: Option<f64>, br: Option<f64>, act: Option<f64>) -> RawSample {
        RawSample {
            time,
            heart_rate: hr,
            breathing_rate: br,
            activity: act,
        }
    }

    fn steady_with_outlier(index: usize) -> Vec<Option<f64>> {
        let mut values: Vec<Option<f64>> = (0..20)
            .map(|i| Some(if i % 2 == 0 { 60.0 } else { 62.0 }))
            .collect();
        values.insert(index, Some(300.0));
        values
    }

    #[test]
    fn epochs_open_at_the_sample_that_crosses_the_boundary() {
        let times = [0.0, 5.0, 19.9, 20.0, 41.0, 42.0];
        let values = [1.0, 2.0, 3.0, 10.0, 4.0, 6.0];

        assert_eq!(epoch_assignments(&times, 20.0).unwrap(), vec![0, 0, 0, 1, 2, 2]);
        assert_eq!(
            segment_channel(&times, &values, 20.0).unwrap(),
            vec![2.0, 10.0, 5.0]
        );
    }

    #[test]
    fn evenly_spaced_samples_fill_half_open_windows() {
        let times: Vec<f64> = (0..=100).map(|t| t as f64).collect();
        let values: Vec<f64> = times.clone();

        let means = segment_channel(&times, &values, 20.0).unwrap();
        // [0,20) [20,40) [40,60) [60,80) [80,100) and the tail sample at 100
        assert_eq!(means, vec![9.5, 29.5, 49.5, 69.5, 89.5, 100.0]);
    }

    #[test]
    fn decreasing_time_is_rejected() {
        let err = epoch_assignments(&[0.0, 10.0, 5.0], 20.0).unwrap_err();
        assert!(matches!(err, StagingError::NonMonotonicTime { index: 2, .. }));
    }

    #[test]
    fn non_finite_time_is_rejected() {
        let err = epoch_assignments(&[0.0, f64::NAN], 20.0).unwrap_err();
        assert!(matches!(err, StagingError::NonFiniteTime(1)));
    }

    #[test]
    fn empty_time_axis_yields_no_epochs() {
        assert!(epoch_assignments(&[], 20.0).unwrap().is_empty());
    }

    #[test]
    fn ordinal_segmentation_uses_each_channels_own_times() {
        let recording = Recording::new(vec![
            sample(0.0, Some(60.0), None, Some(0.1)),
            sample(10.0, Some(62.0), Some(14.0), Some(0.3)),
            sample(25.0, Some(64.0), Some(16.0), Some(0.5)),
            sample(35.0, Some(66.0), Some(18.0), Some(0.7)),
        ]);

        let epochs = segment_recording(&recording, &StagingConfig::default()).unwrap();
        assert_eq!(epochs.heart_rate, vec![Some(61.0), Some(65.0)]);
        // br's first epoch opens at 10s and spans up to 30s
        assert_eq!(epochs.breathing_rate, vec![Some(15.0), Some(18.0)]);
        assert_eq!(epochs.activity.len(), 2);
    }

    #[test]
    fn ordinal_segmentation_truncates_to_shortest_channel() {
        let recording = Recording::new(vec![
            sample(0.0, Some(60.0), Some(14.0), Some(0.1)),
            sample(20.0, Some(62.0), Some(15.0), None),
            sample(40.0, Some(64.0), Some(16.0), None),
        ]);

        let epochs = segment_recording(&recording, &StagingConfig::default()).unwrap();
        assert_eq!(epochs.len(), 1);
        assert_eq!(epochs.breathing_rate.len(), 1);
        assert_eq!(epochs.activity, vec![Some(0.1)]);
    }

    #[test]
    fn shared_grid_leaves_gaps_for_the_repairer() {
        let recording = Recording::new(vec![
            sample(0.0, Some(60.0), Some(14.0), Some(0.1)),
            sample(20.0, Some(62.0), None, Some(0.2)),
            sample(40.0, Some(64.0), Some(16.0), Some(0.3)),
        ]);
        let config = StagingConfig {
            alignment: EpochAlignment::SharedGrid,
            ..Default::default()
        };

        let epochs = segment_recording(&recording, &config).unwrap();
        assert_eq!(epochs.breathing_rate, vec![Some(14.0), None, Some(16.0)]);

        let repaired = repair_epochs(&epochs, 3.0);
        assert_eq!(repaired.breathing_rate, vec![14.0, 14.0, 16.0]);
        assert_eq!(repaired.heart_rate, vec![60.0, 62.0, 64.0]);
    }

    #[test]
    fn channel_without_samples_is_an_input_error() {
        let recording = Recording::new(vec![
            sample(0.0, Some(60.0), Some(14.0), None),
            sample(1.0, Some(61.0), Some(15.0), None),
        ]);
        let err = segment_recording(&recording, &StagingConfig::default()).unwrap_err();
        assert!(matches!(err, StagingError::EmptyChannel("activity")));
    }

    #[test]
    fn empty_recording_is_rejected() {
        let err = segment_recording(&Recording::default(), &StagingConfig::default()).unwrap_err();
        assert!(matches!(err, StagingError::EmptyRecording));
    }

    #[test]
    fn epoch_starts_follow_samples_across_a_gap() {
        let recording = Recording::new(vec![
            sample(0.0, Some(60.0), Some(14.0), Some(0.1)),
            sample(20.0, Some(61.0), Some(14.0), Some(0.1)),
            sample(620.0, Some(62.0), Some(15.0), Some(0.2)),
            sample(645.0, Some(63.0), Some(15.0), Some(0.2)),
        ]);

        for alignment in [EpochAlignment::Ordinal, EpochAlignment::SharedGrid] {
            let config = StagingConfig {
                alignment,
                ..Default::default()
            };
            let epochs = segment_recording(&recording, &config).unwrap();
            assert_eq!(epochs.start, vec![0.0, 20.0, 620.0, 645.0]);
            assert_eq!(repair_epochs(&epochs, 3.0).start, epochs.start);
        }
    }

    #[test]
    fn ordinal_start_times_come_from_heart_rate() {
        let recording = Recording::new(vec![
            sample(0.0, None, Some(14.0), Some(0.1)),
            sample(5.0, Some(60.0), Some(14.0), Some(0.1)),
            sample(30.0, Some(61.0), Some(15.0), Some(0.2)),
        ]);

        let epochs = segment_recording(&recording, &StagingConfig::default()).unwrap();
        assert_eq!(epochs.start, vec![5.0, 30.0]);
    }

    #[test]
    fn time_on_rows_without_values_is_still_checked() {
        let recording = Recording::new(vec![
            sample(0.0, Some(60.0), Some(14.0), Some(0.1)),
            sample(50.0, None, None, None),
            sample(10.0, None, None, None),
            sample(60.0, Some(61.0), Some(15.0), Some(0.2)),
        ]);
        let err = segment_recording(&recording, &StagingConfig::default()).unwrap_err();
        assert!(matches!(err, StagingError::NonMonotonicTime { index: 2, .. }));

        let recording = Recording::new(vec![
            sample(0.0, Some(60.0), Some(14.0), Some(0.1)),
            sample(f64::INFINITY, None, None, None),
        ]);
        let err = segment_recording(&recording, &StagingConfig::default()).unwrap_err();
        assert!(matches!(err, StagingError::NonFiniteTime(1)));
    }

    #[test]
    fn outlier_takes_preceding_value() {
        let values = steady_with_outlier(7);
        let repaired = repair_artifacts(&values, 3.0);

        assert_eq!(repaired[7], repaired[6]);
        assert_eq!(repaired[7], 60.0);
        assert!(repaired.iter().all(|v| *v == 60.0 || *v == 62.0));
    }

    #[test]
    fn leading_outlier_takes_first_later_value() {
        let values = steady_with_outlier(0);
        let repaired = repair_artifacts(&values, 3.0);

        let untouched: Vec<f64> = values[1..].iter().flatten().copied().collect();
        assert_eq!(repaired[0], 60.0);
        assert_eq!(repaired[1..].to_vec(), untouched);
    }

    #[test]
    fn repair_preserves_unflagged_values_and_fills_every_gap() {
        let values = vec![None, Some(5.0), None, None, Some(7.0), None];
        let repaired = repair_artifacts(&values, 3.0);
        assert_eq!(repaired, vec![5.0, 5.0, 5.0, 5.0, 7.0, 7.0]);
    }

    #[test]
    fn repair_is_idempotent_on_clean_series() {
        let values: Vec<Option<f64>> = [60.0, 61.0, 59.5, 62.0, 60.5].iter().map(|&v| Some(v)).collect();
        let once = repair_artifacts(&values, 3.0);
        let twice = repair_artifacts(&once.iter().map(|&v| Some(v)).collect::<Vec<_>>(), 3.0);

        assert_eq!(once, vec![60.0, 61.0, 59.5, 62.0, 60.5]);
        assert_eq!(once, twice);
    }

    #[test]
    fn constant_series_flags_nothing() {
        let values = vec![Some(0.0); 10];
        assert_eq!(detect_artifacts(&values, 3.0), values);
    }

    #[test]
    fn all_missing_series_is_returned_unchanged() {
        let values: Vec<Option<f64>> = vec![None; 4];
        assert_eq!(fill_with_last_valid(&values), values);
        assert!(repair_artifacts(&values, 3.0).iter().all(|v| v.is_nan()));
    }
}
