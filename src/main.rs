use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use sleep_stager::batch::{self, FileOutcome, FolderProcessor};
use sleep_stager::config::{Args, StagingConfig};
use sleep_stager::output;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn load_config(args: &Args) -> Result<StagingConfig> {
    let base = match &args.config {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config: {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        }
        None => StagingConfig::default(),
    };

    let config = args.apply_to(base);
    config.validate()?;
    Ok(config)
}

fn write_outputs(
    dir: &Path,
    outcome: &FileOutcome,
    args: &Args,
) -> Result<()> {
    let FileOutcome::Processed { path, analysis, .. } = outcome else {
        return Ok(());
    };
    let stem = output::output_stem(&args.input_path, path);

    for (suffix, result) in [
        ("uncorrected", &analysis.uncorrected),
        ("corrected", &analysis.corrected),
    ] {
        let target = dir.join(format!("{}_{}.csv", stem, suffix));
        output::write_epochs_csv(&target, result, args.recording_start)
            .with_context(|| format!("Failed to write {}", target.display()))?;
    }
    Ok(())
}

fn print_outcome(outcome: &FileOutcome, epoch_length: f64) {
    match outcome {
        FileOutcome::Processed {
            file_name,
            analysis,
            ..
        } => {
            println!("\nResults for {}:", file_name);
            println!(
                "  Sleep onset: epoch {}, sleep offset: epoch {}",
                analysis.sleep_window.onset, analysis.sleep_window.offset
            );
            println!("\nWithout corrections:");
            println!("{}", analysis.uncorrected.summary(epoch_length));
            println!("\nWith corrections:");
            println!("{}", analysis.corrected.summary(epoch_length));
        }
        FileOutcome::Failed {
            file_name, error, ..
        } => {
            println!("\nFailed to process {}: {}", file_name, error);
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let outcomes = if args.input_path.is_dir() {
        let mut processor =
            FolderProcessor::new(&args.input_path, config.clone()).recursive(args.recursive);
        processor
            .process_all_files()
            .with_context(|| format!("Failed to scan {}", args.input_path.display()))?;
        processor.into_outcomes()
    } else {
        vec![batch::process_path(&args.input_path, &config)]
    };

    for outcome in &outcomes {
        print_outcome(outcome, config.epoch_length);
    }

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for outcome in &outcomes {
            write_outputs(dir, outcome, &args)?;
        }
        output::write_summary_json(&dir.join("summary.json"), &outcomes, config.epoch_length)
            .context("Failed to write summary.json")?;
    }

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    info!("Processed {} files, {} failed", outcomes.len(), failed);
    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, outcomes.len());
    }

    Ok(())
}
