use std::{fs::File, path::Path};

use anyhow::Context;
use arrow::record_batch::RecordBatch;
use clap::Parser;
use comfy_table::Table;
use flexi_logger::{Duplicate, FileSpec, Logger};
use itertools::Itertools;

use fmi_check::{
    check,
    models::{
        bouncing_ball::BouncingBall, dahlquist::Dahlquist, feedthrough::Feedthrough, stair::Stair,
        ModelImport, MODEL_NAMES,
    },
    options::FmiCheckOptions,
    traits::Interface,
    CheckReport,
};

fn run_model(name: &str, options: &FmiCheckOptions) -> anyhow::Result<CheckReport> {
    let report = match name {
        "BouncingBall" => check(&ModelImport::<BouncingBall>::new(), options)?,
        "Dahlquist" => check(&ModelImport::<Dahlquist>::new(), options)?,
        "Feedthrough" => check(&ModelImport::<Feedthrough>::new(), options)?,
        "Stair" => check(&ModelImport::<Stair>::new(), options)?,
        _ => anyhow::bail!(
            "Unknown model '{name}', expected one of: {}",
            MODEL_NAMES.iter().join(", ")
        ),
    };
    Ok(report)
}

fn summary(report: &CheckReport) -> Table {
    let mut table = Table::new();
    table.set_header([
        "Interface", "Result", "End time", "Steps", "Events", "Warnings", "Errors",
    ]);
    for run in &report.runs {
        let (result, end_time, steps, events) = match &run.result {
            Ok(stats) => (
                if stats.discarded {
                    "discarded"
                } else if stats.terminated_by_model {
                    "terminated by model"
                } else {
                    "passed"
                },
                stats.end_time.to_string(),
                stats.num_steps.to_string(),
                stats.num_events.to_string(),
            ),
            Err(_) => ("failed", "-".into(), "-".into(), "-".into()),
        };
        table.add_row([
            run.interface.to_string(),
            result.to_owned(),
            end_time,
            steps,
            events,
            run.messages.warnings.to_string(),
            run.messages.errors.to_string(),
        ]);
    }
    table
}

/// With both interfaces checked, each gets its own file: `out.csv` becomes `out_me.csv` and
/// `out_cs.csv`.
fn output_path(path: &Path, interface: Interface, multiple: bool) -> std::path::PathBuf {
    if !multiple {
        return path.to_owned();
    }
    let suffix = match interface {
        Interface::ModelExchange => "me",
        Interface::CoSimulation => "cs",
    };
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(name)
}

fn write_csv(batch: &RecordBatch, path: &Path, separator: char) -> anyhow::Result<()> {
    let delimiter = u8::try_from(separator)
        .with_context(|| format!("Separator '{separator}' is not a single-byte character"))?;
    let file = File::create(path)
        .with_context(|| format!("Could not create output file {}", path.display()))?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_delimiter(delimiter)
        .build(file);
    writer.write(batch)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let options = FmiCheckOptions::parse();

    let level = options.verbose.log_level_filter();
    let logger = Logger::try_with_env_or_str(level.as_str())?.set_palette("b1;3;2;4;6".to_string());
    let _handle = match &options.error_log {
        Some(path) => logger
            .log_to_file(FileSpec::try_from(path)?)
            .duplicate_to_stderr(Duplicate::All)
            .start()?,
        None => logger.start()?,
    };

    if options.list {
        println!("{}", MODEL_NAMES.iter().join("\n"));
        return Ok(());
    }

    let name = options
        .model
        .as_deref()
        .context("No model given, use --list to see the built-in models")?;

    let report = run_model(name, &options).context("Model check failed")?;

    let multiple = report.runs.len() > 1;
    for run in &report.runs {
        let Some(batch) = &run.output else { continue };
        match &options.output_file {
            Some(path) => {
                let path = output_path(path, run.interface, multiple);
                write_csv(batch, &path, options.separator)?;
                log::info!("Wrote {} output to {}", run.interface, path.display());
            }
            None => println!(
                "{} outputs:\n{}",
                run.interface,
                arrow::util::pretty::pretty_format_batches(std::slice::from_ref(batch))?
            ),
        }
    }

    println!("{}", summary(&report));

    for run in report.runs.iter().filter(|run| !run.passed()) {
        match &run.result {
            Err(e) => log::error!("{} simulation failed: {e}", run.interface),
            Ok(stats) => log::error!(
                "{} simulation was discarded at t = {}",
                run.interface,
                stats.end_time
            ),
        }
    }

    anyhow::ensure!(report.passed(), "The model did not pass all checks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        let path = Path::new("out/result.csv");
        assert_eq!(
            output_path(path, Interface::CoSimulation, true),
            Path::new("out/result_cs.csv")
        );
        assert_eq!(output_path(path, Interface::ModelExchange, false), path);
    }
}
