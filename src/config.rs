use crate::error::{Result, StagingError};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Ratios applied against the whole-night means of hrv, brv and body movement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub k1: f64, // hrv
    pub k2: f64, // brv
    pub k3: f64, // body movement
}

impl ThresholdSet {
    pub const PRIMARY: ThresholdSet = ThresholdSet {
        k1: 0.5,
        k2: 1.1,
        k3: 0.6,
    };

    pub const CORRECTED: ThresholdSet = ThresholdSet {
        k1: 0.5,
        k2: 1.2,
        k3: 0.6,
    };
}

impl FromStr for ThresholdSet {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| format!("Invalid threshold set {:?}: {}", s, e))?;

        match parts.as_slice() {
            [k1, k2, k3] => Ok(ThresholdSet {
                k1: *k1,
                k2: *k2,
                k3: *k3,
            }),
            _ => Err(format!(
                "Invalid threshold set {:?}: expected three comma-separated ratios (k1,k2,k3)",
                s
            )),
        }
    }
}

/// How the three channels are cut into epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochAlignment {
    /// Each channel is segmented on its own valid-sample time subset and the
    /// resulting series are paired by epoch ordinal.
    #[default]
    Ordinal,
    /// One epoch grid is cut from the full time axis and shared by all channels.
    SharedGrid,
}

/// Header names of the input table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub time: String,
    pub heart_rate: String,
    pub breathing_rate: String,
    pub activity: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            time: "time [s/256]".to_string(),
            heart_rate: "heart_rate [bpm](/api/datatype/19/)".to_string(),
            breathing_rate: "breathing_rate [rpm](/api/datatype/33/)".to_string(),
            activity: "activity [g](/api/datatype/49/)".to_string(),
        }
    }
}

/// Every tunable of the staging pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Epoch length in seconds
    pub epoch_length: f64,
    pub thresholds: ThresholdSet,
    pub corrected_thresholds: ThresholdSet,
    /// Artifact cut-off in standard deviations from the channel mean
    pub artifact_threshold: f64,
    /// Half-window radius of the variability measure, in epochs
    pub variability_window: usize,
    /// Additive offset inside log2 for body movement
    pub movement_offset: f64,
    /// Number of leading epochs forced to Wake by the corrected pass
    pub lead_in_epochs: usize,
    /// Divisor turning the raw time column into seconds
    pub time_scale: f64,
    pub alignment: EpochAlignment,
    pub columns: ColumnNames,
}

impl Default for StagingConfig {
    fn default() -> Self {
        StagingConfig {
            epoch_length: 20.0,
            thresholds: ThresholdSet::PRIMARY,
            corrected_thresholds: ThresholdSet::CORRECTED,
            artifact_threshold: 3.0,
            variability_window: 20,
            movement_offset: 0.01,
            lead_in_epochs: 12,
            time_scale: 256.0,
            alignment: EpochAlignment::Ordinal,
            columns: ColumnNames::default(),
        }
    }
}

impl StagingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.epoch_length.is_finite() && self.epoch_length > 0.0) {
            return Err(StagingError::InvalidConfig(format!(
                "epoch_length must be positive, got {}",
                self.epoch_length
            )));
        }
        if !(self.time_scale.is_finite() && self.time_scale > 0.0) {
            return Err(StagingError::InvalidConfig(format!(
                "time_scale must be positive, got {}",
                self.time_scale
            )));
        }
        if !(self.artifact_threshold.is_finite() && self.artifact_threshold > 0.0) {
            return Err(StagingError::InvalidConfig(format!(
                "artifact_threshold must be positive, got {}",
                self.artifact_threshold
            )));
        }
        if !(self.movement_offset.is_finite() && self.movement_offset >= 0.0) {
            return Err(StagingError::InvalidConfig(format!(
                "movement_offset must be non-negative, got {}",
                self.movement_offset
            )));
        }
        Ok(())
    }
}

/// Classify sleep stages from wearable heart rate, breathing rate and activity
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input CSV file or folder of CSV files
    #[arg(help = "Input CSV file or folder of CSV files")]
    pub input_path: PathBuf,

    /// Directory receiving per-file epoch tables and summary.json
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Descend into sub-folders when the input is a folder
    #[arg(long)]
    pub recursive: bool,

    /// JSON file with a full staging configuration; flags below override it
    #[arg(long, env = "SLEEP_STAGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Epoch length in seconds [default: 20]
    #[arg(long)]
    pub epoch_length: Option<f64>,

    /// Primary thresholds as k1,k2,k3 [default: 0.5,1.1,0.6]
    #[arg(long)]
    pub thresholds: Option<ThresholdSet>,

    /// Thresholds of the corrected pass as k1,k2,k3 [default: 0.5,1.2,0.6]
    #[arg(long)]
    pub corrected_thresholds: Option<ThresholdSet>,

    /// Artifact cut-off in standard deviations [default: 3]
    #[arg(long)]
    pub artifact_threshold: Option<f64>,

    /// Variability half-window in epochs [default: 20]
    #[arg(long)]
    pub variability_window: Option<usize>,

    /// Offset added to activity before log2 [default: 0.01]
    #[arg(long)]
    pub movement_offset: Option<f64>,

    /// Leading epochs forced to Wake in the corrected pass [default: 12]
    #[arg(long)]
    pub lead_in_epochs: Option<usize>,

    /// Divisor converting the time column to seconds [default: 256]
    #[arg(long)]
    pub time_scale: Option<f64>,

    /// Cut one shared epoch grid from the full time axis
    #[arg(long)]
    pub shared_grid: bool,

    /// Wall-clock start of the recording (RFC 3339), adds timestamps to epoch tables
    #[arg(long)]
    pub recording_start: Option<chrono::DateTime<chrono::FixedOffset>>,
}

impl Args {
    /// Apply explicit flags on top of `base`
    pub fn apply_to(&self, mut base: StagingConfig) -> StagingConfig {
        if let Some(v) = self.epoch_length {
            base.epoch_length = v;
        }
        if let Some(v) = self.thresholds {
            base.thresholds = v;
        }
        if let Some(v) = self.corrected_thresholds {
            base.corrected_thresholds = v;
        }
        if let Some(v) = self.artifact_threshold {
            base.artifact_threshold = v;
        }
        if let Some(v) = self.variability_window {
            base.variability_window = v;
        }
        if let Some(v) = self.movement_offset {
            base.movement_offset = v;
        }
        if let Some(v) = self.lead_in_epochs {
            base.lead_in_epochs = v;
        }
        if let Some(v) = self.time_scale {
            base.time_scale = v;
        }
        if self.shared_grid {
            base.alignment = EpochAlignment::SharedGrid;
        }
        base
    }
}
