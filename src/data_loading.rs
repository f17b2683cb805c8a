use crate::config::ColumnNames;
use crate::error::{Result, StagingError};
use log::debug;
use std::io::Read;
use std::path::Path;

/// The three physiological channels carried by a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    HeartRate,
    BreathingRate,
    Activity,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::HeartRate,
        ChannelKind::BreathingRate,
        ChannelKind::Activity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::HeartRate => "heart_rate",
            ChannelKind::BreathingRate => "breathing_rate",
            ChannelKind::Activity => "activity",
        }
    }
}

/// One row of the input table, time already in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub time: f64,
    pub heart_rate: Option<f64>,
    pub breathing_rate: Option<f64>,
    pub activity: Option<f64>,
}

impl RawSample {
    pub fn value(&self, kind: ChannelKind) -> Option<f64> {
        match kind {
            ChannelKind::HeartRate => self.heart_rate,
            ChannelKind::BreathingRate => self.breathing_rate,
            ChannelKind::Activity => self.activity,
        }
    }
}

/// A full night of samples in file order
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub samples: Vec<RawSample>,
}

impl Recording {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Recording { samples }
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Valid samples of one channel paired with their own timestamps
    pub fn channel(&self, kind: ChannelKind) -> (Vec<f64>, Vec<f64>) {
        self.samples
            .iter()
            .filter_map(|s| s.value(kind).map(|v| (s.time, v)))
            .unzip()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| StagingError::MissingColumn(name.to_string()))
}

/// Empty cells and the usual NaN spellings are missing values
fn parse_cell(raw: Option<&str>, row: usize, column: &str) -> Result<Option<f64>> {
    let cell = raw.unwrap_or("").trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("na") {
        return Ok(None);
    }

    match cell.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(StagingError::InvalidValue {
            row,
            column: column.to_string(),
            value: cell.to_string(),
        }),
    }
}

pub fn read_recording<R: Read>(
    reader: R,
    columns: &ColumnNames,
    time_scale: f64,
) -> Result<Recording> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true) // Trailing columns are often ragged in exports
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let time_idx = column_index(&headers, &columns.time)?;
    let hr_idx = column_index(&headers, &columns.heart_rate)?;
    let br_idx = column_index(&headers, &columns.breathing_rate)?;
    let act_idx = column_index(&headers, &columns.activity)?;

    let mut samples = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;

        let time = parse_cell(record.get(time_idx), row, &columns.time)?.ok_or_else(|| {
            StagingError::InvalidValue {
                row,
                column: columns.time.clone(),
                value: String::new(),
            }
        })?;

        samples.push(RawSample {
            time: time / time_scale,
            heart_rate: parse_cell(record.get(hr_idx), row, &columns.heart_rate)?,
            breathing_rate: parse_cell(record.get(br_idx), row, &columns.breathing_rate)?,
            activity: parse_cell(record.get(act_idx), row, &columns.activity)?,
        });
    }

    debug!("Loaded {} samples", samples.len());
    Ok(Recording::new(samples))
}

pub fn read_csv_file(path: &Path, columns: &ColumnNames, time_scale: f64) -> Result<Recording> {
    let file = std::fs::File::open(path)?;
    read_recording(std::io::BufReader::new(file), columns, time_scale)
}
