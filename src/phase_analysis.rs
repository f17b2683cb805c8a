use crate::config::ThresholdSet;
use crate::error::{Result, StagingError};
use crate::preprocessing::mean_std;
use crate::variability::VariabilityFeatures;
use log::{debug, warn};
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SleepStage {
    Wake,
    Nrem,
    Rem,
}

impl SleepStage {
    pub const ALL: [SleepStage; 3] = [SleepStage::Wake, SleepStage::Nrem, SleepStage::Rem];

    /// Integer code used in exported tables: 0 = Wake, 1 = NREM, 2 = REM
    pub fn code(&self) -> u8 {
        match self {
            SleepStage::Wake => 0,
            SleepStage::Nrem => 1,
            SleepStage::Rem => 2,
        }
    }

    pub fn is_sleep(&self) -> bool {
        !matches!(self, SleepStage::Wake)
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SleepStage::Wake => "Wake",
            SleepStage::Nrem => "NREM",
            SleepStage::Rem => "REM",
        };
        f.write_str(name)
    }
}

impl Serialize for SleepStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Whole-night mean of a feature; NaN when no finite value exists
fn night_mean(values: &[f64], name: &str) -> f64 {
    match mean_std(values) {
        Some((mean, _)) => mean,
        None => {
            warn!("Mean of {} is undefined, its threshold never fires", name);
            f64::NAN
        }
    }
}

/// Label every epoch against thresholds relative to the whole-night means.
///
/// REM needs high hrv, high brv and low movement; otherwise movement above its
/// threshold is Wake; everything else is NREM. All comparisons are strict, and
/// any comparison with NaN fails, so undefined features fall through to NREM.
pub fn classify(features: &VariabilityFeatures, thresholds: &ThresholdSet) -> Vec<SleepStage> {
    if features.hrv.is_empty() {
        return Vec::new();
    }

    let hrv_cut = thresholds.k1 * night_mean(&features.hrv, "hrv");
    let brv_cut = thresholds.k2 * night_mean(&features.brv, "brv");
    let movement_cut = thresholds.k3 * night_mean(&features.body_movement, "body movement");

    let stages: Vec<SleepStage> = features
        .hrv
        .iter()
        .zip(&features.brv)
        .zip(&features.body_movement)
        .map(|((&hrv, &brv), &movement)| {
            if hrv > hrv_cut && brv > brv_cut && movement < movement_cut {
                SleepStage::Rem
            } else if movement > movement_cut {
                SleepStage::Wake
            } else {
                SleepStage::Nrem
            }
        })
        .collect();

    debug!(
        "Classified {} epochs with k = ({}, {}, {})",
        stages.len(),
        thresholds.k1,
        thresholds.k2,
        thresholds.k3
    );
    stages
}

/// First and last sleeping epoch of a corrected night
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SleepWindow {
    pub onset: usize,
    pub offset: usize,
}

/// Force Wake before sleep onset and after sleep offset.
///
/// The first `lead_in` epochs are always Wake. Onset is the first NREM epoch at
/// or after `lead_in`; offset is the last NREM or REM epoch once everything
/// before onset has been forced to Wake.
pub fn apply_boundary_correction(
    stages: &[SleepStage],
    lead_in: usize,
) -> Result<(Vec<SleepStage>, SleepWindow)> {
    let onset = stages
        .iter()
        .enumerate()
        .skip(lead_in)
        .find(|(_, stage)| **stage == SleepStage::Nrem)
        .map(|(i, _)| i)
        .ok_or(StagingError::OnsetNotFound {
            lead_in,
            epochs: stages.len(),
        })?;

    let mut corrected = stages.to_vec();
    corrected[..onset].fill(SleepStage::Wake);

    // onset itself is NREM, so a last sleeping epoch always exists
    let offset = corrected
        .iter()
        .rposition(SleepStage::is_sleep)
        .unwrap_or(onset);
    corrected[offset + 1..].fill(SleepStage::Wake);

    debug!("Sleep onset at epoch {}, offset at epoch {}", onset, offset);
    Ok((corrected, SleepWindow { onset, offset }))
}

/// Time spent in each stage over one night
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub epochs: usize,
    pub wake_epochs: usize,
    pub nrem_epochs: usize,
    pub rem_epochs: usize,
    pub wake_minutes: f64,
    pub nrem_minutes: f64,
    pub rem_minutes: f64,
    pub total_sleep_minutes: f64,
    /// Sleeping epochs over all epochs, 0 for an empty night
    pub sleep_efficiency: f64,
}

pub fn summarize_stages(stages: &[SleepStage], epoch_length: f64) -> StageSummary {
    let count = |target: SleepStage| stages.iter().filter(|s| **s == target).count();
    let minutes = |n: usize| n as f64 * epoch_length / 60.0;

    let wake_epochs = count(SleepStage::Wake);
    let nrem_epochs = count(SleepStage::Nrem);
    let rem_epochs = count(SleepStage::Rem);
    let sleep_epochs = nrem_epochs + rem_epochs;

    StageSummary {
        epochs: stages.len(),
        wake_epochs,
        nrem_epochs,
        rem_epochs,
        wake_minutes: minutes(wake_epochs),
        nrem_minutes: minutes(nrem_epochs),
        rem_minutes: minutes(rem_epochs),
        total_sleep_minutes: minutes(sleep_epochs),
        sleep_efficiency: if stages.is_empty() {
            0.0
        } else {
            sleep_epochs as f64 / stages.len() as f64
        },
    }
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total Time in Each Stage:")?;
        writeln!(f, "------------------------")?;
        for (stage, minutes) in [
            (SleepStage::Wake, self.wake_minutes),
            (SleepStage::Nrem, self.nrem_minutes),
            (SleepStage::Rem, self.rem_minutes),
        ] {
            let whole = minutes.round() as i64;
            writeln!(f, "{}: {}h {}min", stage, whole / 60, whole % 60)?;
        }
        write!(f, "Sleep efficiency: {:.1}%", self.sleep_efficiency * 100.0)
    }
}
