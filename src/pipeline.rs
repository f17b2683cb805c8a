//! Per-recording staging: segment, repair, extract, classify, correct

use crate::config::StagingConfig;
use crate::data_loading::{self, Recording};
use crate::error::Result;
use crate::phase_analysis::{self, SleepStage, SleepWindow, StageSummary};
use crate::preprocessing::{self, RepairedEpochs};
use crate::variability::{self, VariabilityFeatures};
use log::debug;
use serde::Serialize;
use std::path::Path;

/// Epoch means, derived features and labels of one classification pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagingResult {
    /// Time of each epoch's first sample, in seconds since the recording's time origin
    pub epoch_start: Vec<f64>,
    pub hr_mean: Vec<f64>,
    pub br_mean: Vec<f64>,
    pub activity_mean: Vec<f64>,
    pub hrv: Vec<f64>,
    pub brv: Vec<f64>,
    pub body_movement: Vec<f64>,
    pub classification: Vec<SleepStage>,
}

impl StagingResult {
    fn new(
        epochs: &RepairedEpochs,
        features: &VariabilityFeatures,
        classification: Vec<SleepStage>,
    ) -> Self {
        StagingResult {
            epoch_start: epochs.start.clone(),
            hr_mean: epochs.heart_rate.clone(),
            br_mean: epochs.breathing_rate.clone(),
            activity_mean: epochs.activity.clone(),
            hrv: features.hrv.clone(),
            brv: features.brv.clone(),
            body_movement: features.body_movement.clone(),
            classification,
        }
    }

    pub fn len(&self) -> usize {
        self.classification.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classification.is_empty()
    }

    /// Labels as 0 = Wake, 1 = NREM, 2 = REM
    pub fn codes(&self) -> Vec<u8> {
        self.classification.iter().map(SleepStage::code).collect()
    }

    pub fn summary(&self, epoch_length: f64) -> StageSummary {
        phase_analysis::summarize_stages(&self.classification, epoch_length)
    }
}

/// Both classification passes of one night
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NightAnalysis {
    pub uncorrected: StagingResult,
    pub corrected: StagingResult,
    pub sleep_window: SleepWindow,
}

pub fn analyze_recording(recording: &Recording, config: &StagingConfig) -> Result<NightAnalysis> {
    config.validate()?;

    let epochs = preprocessing::segment_recording(recording, config)?;
    let repaired = preprocessing::repair_epochs(&epochs, config.artifact_threshold);
    let features = variability::extract_features(&repaired, config);

    let primary = phase_analysis::classify(&features, &config.thresholds);
    let secondary = phase_analysis::classify(&features, &config.corrected_thresholds);
    let (corrected, sleep_window) =
        phase_analysis::apply_boundary_correction(&secondary, config.lead_in_epochs)?;

    debug!(
        "Staged {} epochs, sleep window {}..={}",
        primary.len(),
        sleep_window.onset,
        sleep_window.offset
    );

    Ok(NightAnalysis {
        uncorrected: StagingResult::new(&repaired, &features, primary),
        corrected: StagingResult::new(&repaired, &features, corrected),
        sleep_window,
    })
}

pub fn process_file(path: &Path, config: &StagingConfig) -> Result<NightAnalysis> {
    let recording = data_loading::read_csv_file(path, &config.columns, config.time_scale)?;
    analyze_recording(&recording, config)
}
