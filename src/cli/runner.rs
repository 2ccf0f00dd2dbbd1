use std::fs;
use std::path::Path;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use satmatch::api::{self, Operation};
use satmatch::core::feedback::LogFeedback;
use satmatch::core::processing::pipeline::{EqualizeInputs, MatchInputs, To8BitsInputs};
use satmatch::types::RunStatus;
use satmatch::MatchParams;

use super::args::{BatchArgs, CliArgs, Command, EqualizeArgs, MatchArgs, To8BitsArgs};
use super::errors::AppError;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn require(path: &Path) -> Result<(), AppError> {
    if !path.exists() {
        return Err(AppError::InputNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

fn ensure_parent(output: &Path) -> Result<(), AppError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| AppError::OutputDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

/// Config file first, then explicit flags on top
fn match_params(args: &MatchArgs) -> Result<MatchParams, AppError> {
    let mut params = match &args.config {
        Some(path) => {
            require(path)?;
            MatchParams::from_json_file(path)?
        }
        None => MatchParams::default(),
    };
    if let Some(d) = args.desaturation {
        params.desaturation = d;
    }
    if let Some(s) = args.saturation {
        params.saturation = s;
    }
    if let Some(cell) = args.cell_size {
        params.tile.cell_size = cell;
    }
    if let Some(res) = args.vrt_resolution {
        params.vrt_resolution = res;
    }
    if let Some(resampling) = args.overview_resampling {
        params.overview_resampling = resampling;
    }
    params.validate()?;
    Ok(params)
}

fn equalize_operation(args: &EqualizeArgs) -> Result<Operation, AppError> {
    for path in [&args.input, &args.reference, &args.work_area] {
        require(path)?;
    }
    Ok(Operation::Equalize(EqualizeInputs {
        source: args.input.clone(),
        reference: args.reference.clone(),
        work_area: args.work_area.clone(),
        style: args.style.clone(),
    }))
}

fn match_operation(args: &MatchArgs) -> Result<Operation, AppError> {
    for path in [&args.input, &args.reference, &args.work_area] {
        require(path)?;
    }
    if let Some(cutout) = &args.cutout {
        require(cutout)?;
    }
    ensure_parent(&args.output)?;
    Ok(Operation::HistogramMatch(MatchInputs {
        source: args.input.clone(),
        reference: args.reference.clone(),
        work_area: args.work_area.clone(),
        cutout: args.cutout.clone(),
        output: args.output.clone(),
        params: match_params(args)?,
    }))
}

fn to8bits_operation(args: &To8BitsArgs) -> Result<Operation, AppError> {
    require(&args.input)?;
    if let Some(cutout) = &args.cutout {
        require(cutout)?;
    }
    ensure_parent(&args.output)?;
    Ok(Operation::To8Bits(To8BitsInputs {
        source: args.input.clone(),
        style: args.style.clone(),
        cutout: args.cutout.clone(),
        output: args.output.clone(),
    }))
}

fn run_batch(args: &BatchArgs, feedback: &LogFeedback) -> Result<(), AppError> {
    require(&args.operations)?;
    let ops = api::load_operations(&args.operations)?;
    info!("Running {} operations from {:?}", ops.len(), args.operations);
    let report = api::run_all(&ops, feedback, args.continue_on_error)?;

    info!("Batch processing complete!");
    info!("Completed: {}", report.completed);
    info!("Cancelled: {}", report.cancelled);
    for (name, error) in &report.errors {
        warn!("{} failed: {}", name, error);
    }
    if !report.errors.is_empty() {
        return Err(AppError::BatchFailed {
            failed: report.errors.len(),
            total: ops.len(),
        });
    }
    Ok(())
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        init_logging();
    }
    let feedback = LogFeedback::new();

    let op = match &args.command {
        Command::Equalize(a) => equalize_operation(a)?,
        Command::Match(a) => match_operation(a)?,
        Command::To8Bits(a) => to8bits_operation(a)?,
        Command::Batch(batch) => {
            run_batch(batch, &feedback)?;
            return Ok(());
        }
    };
    match api::run(&op, &feedback).map_err(AppError::from)? {
        RunStatus::Completed(_) => info!("Successfully processed: {}", op.name()),
        RunStatus::Cancelled => warn!("{} was cancelled", op.name()),
    }
    Ok(())
}
