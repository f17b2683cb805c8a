use crate::batch::FileOutcome;
use crate::error::Result;
use crate::phase_analysis::{SleepWindow, StageSummary};
use crate::pipeline::StagingResult;
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat};
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::{Component, Path};

fn format_value(v: f64) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        String::new()
    }
}

/// Stem for a file's output tables: its path below `root` without the
/// extension, directories joined with `_`. Keeps nested recordings that share
/// a file name apart.
pub fn output_stem(root: &Path, path: &Path) -> String {
    let relative = path
        .strip_prefix(root)
        .ok()
        .filter(|r| !r.as_os_str().is_empty())
        .or_else(|| path.file_name().map(Path::new))
        .unwrap_or(path)
        .with_extension("");

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        "results".to_string()
    } else {
        parts.join("_")
    }
}

/// Write one row per epoch.
///
/// `offset_seconds` is the time of the epoch's first sample; with a recording
/// start it is also rendered as an RFC 3339 timestamp.
pub fn write_epochs_csv(
    path: &Path,
    result: &StagingResult,
    recording_start: Option<DateTime<FixedOffset>>,
) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    info!("Writing epochs to {}", path.display());
    let file = std::fs::File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = vec!["epoch", "offset_seconds"];
    if recording_start.is_some() {
        header.push("timestamp");
    }
    header.extend([
        "hr_mean",
        "br_mean",
        "activity_mean",
        "hrv",
        "brv",
        "body_movement",
        "stage",
    ]);
    writer.write_record(&header)?;

    for (i, stage) in result.classification.iter().enumerate() {
        let offset = result.epoch_start[i];
        let mut record = vec![i.to_string(), offset.to_string()];
        if let Some(start) = recording_start {
            let at = start + Duration::milliseconds((offset * 1000.0).round() as i64);
            record.push(at.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        record.extend([
            format_value(result.hr_mean[i]),
            format_value(result.br_mean[i]),
            format_value(result.activity_mean[i]),
            format_value(result.hrv[i]),
            format_value(result.brv[i]),
            format_value(result.body_movement[i]),
            stage.code().to_string(),
        ]);
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Per-file line of the run summary
#[derive(Debug, Serialize)]
pub struct FileSummary<'a> {
    pub file_name: &'a str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_window: Option<SleepWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncorrected: Option<StageSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected: Option<StageSummary>,
}

impl<'a> FileSummary<'a> {
    pub fn from_outcome(outcome: &'a FileOutcome, epoch_length: f64) -> Self {
        match outcome {
            FileOutcome::Processed {
                file_name,
                analysis,
                ..
            } => FileSummary {
                file_name,
                status: "ok",
                error: None,
                sleep_window: Some(analysis.sleep_window),
                uncorrected: Some(analysis.uncorrected.summary(epoch_length)),
                corrected: Some(analysis.corrected.summary(epoch_length)),
            },
            FileOutcome::Failed {
                file_name, error, ..
            } => FileSummary {
                file_name,
                status: "failed",
                error: Some(error.to_string()),
                sleep_window: None,
                uncorrected: None,
                corrected: None,
            },
        }
    }
}

pub fn write_summary_json(path: &Path, outcomes: &[FileOutcome], epoch_length: f64) -> Result<()> {
    let summaries: Vec<FileSummary> = outcomes
        .iter()
        .map(|o| FileSummary::from_outcome(o, epoch_length))
        .collect();

    info!("Writing summary to {}", path.display());
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &summaries).map_err(std::io::Error::from)?;
    writer.flush()?;
    Ok(())
}
