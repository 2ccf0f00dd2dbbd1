//! High-level library API: the three operations as one tagged enum, a single
//! `run` entry point, and convenience wrappers that log progress through
//! `tracing`. Prefer these over the low-level pipeline functions when
//! integrating SATMATCH.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::feedback::{Feedback, LogFeedback};
use crate::core::params::MatchParams;
use crate::core::processing::pipeline::{
    EqualizeInputs, EqualizeReport, MatchInputs, TileReport, To8BitsInputs, To8BitsReport,
    run_equalize, run_histogram_match, run_to8bits,
};
use crate::error::Result;
use crate::types::RunStatus;

/// One processing run and its inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// Two-point stretch bounds, persisted as a style file
    Equalize(EqualizeInputs),
    /// Lookup-table matching, tiles, VRT and overviews
    HistogramMatch(MatchInputs),
    /// 8-bit export between the bounds of a style file
    #[serde(rename = "to8bits")]
    To8Bits(To8BitsInputs),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Equalize(_) => "equalize",
            Operation::HistogramMatch(_) => "histogram_match",
            Operation::To8Bits(_) => "to8bits",
        }
    }
}

/// Outcome of a completed `Operation`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationReport {
    Equalize(EqualizeReport),
    HistogramMatch(TileReport),
    To8Bits(To8BitsReport),
}

/// Run `op`, reporting progress to `feedback`.
pub fn run(op: &Operation, feedback: &dyn Feedback) -> Result<RunStatus<OperationReport>> {
    info!("Starting {}", op.name());
    let status = match op {
        Operation::Equalize(inputs) => {
            run_equalize(inputs, feedback)?.map(OperationReport::Equalize)
        }
        Operation::HistogramMatch(inputs) => {
            run_histogram_match(inputs, feedback)?.map(OperationReport::HistogramMatch)
        }
        Operation::To8Bits(inputs) => run_to8bits(inputs, feedback)?.map(OperationReport::To8Bits),
    };
    if status.is_completed() {
        info!("{} completed", op.name());
    } else {
        info!("{} cancelled", op.name());
    }
    Ok(status)
}

/// Compute stretch bounds of `source` against `reference` and write them to a style file
pub fn equalize(
    source: &Path,
    reference: &Path,
    work_area: &Path,
    style: Option<&Path>,
) -> Result<RunStatus<EqualizeReport>> {
    let inputs = EqualizeInputs {
        source: source.to_path_buf(),
        reference: reference.to_path_buf(),
        work_area: work_area.to_path_buf(),
        style: style.map(Path::to_path_buf),
    };
    run_equalize(&inputs, &LogFeedback::new())
}

/// Match `source` onto `reference`, write the tiles next to `output` and the VRT at `output`
pub fn histogram_match(
    source: &Path,
    reference: &Path,
    work_area: &Path,
    cutout: Option<&Path>,
    output: &Path,
    params: &MatchParams,
) -> Result<RunStatus<TileReport>> {
    let inputs = MatchInputs {
        source: source.to_path_buf(),
        reference: reference.to_path_buf(),
        work_area: work_area.to_path_buf(),
        cutout: cutout.map(Path::to_path_buf),
        output: output.to_path_buf(),
        params: params.clone(),
    };
    run_histogram_match(&inputs, &LogFeedback::new())
}

/// Rescale `source` to 8 bits using the bounds of a style file
pub fn to8bits(
    source: &Path,
    style: Option<&Path>,
    cutout: Option<&Path>,
    output: &Path,
) -> Result<RunStatus<To8BitsReport>> {
    let inputs = To8BitsInputs {
        source: source.to_path_buf(),
        style: style.map(Path::to_path_buf),
        cutout: cutout.map(Path::to_path_buf),
        output: output.to_path_buf(),
    };
    run_to8bits(&inputs, &LogFeedback::new())
}

/// Load a list of operations from a JSON file (an array of tagged operations)
pub fn load_operations(path: &Path) -> Result<Vec<Operation>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Summary of a sequence of operations
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub completed: usize,
    pub cancelled: usize,
    pub errors: Vec<(String, String)>,
    pub outputs: Vec<PathBuf>,
}

/// Run operations in order. Failures are collected when `continue_on_error` is set,
/// otherwise the first one is returned. A cancellation stops the sequence.
pub fn run_all(
    ops: &[Operation],
    feedback: &dyn Feedback,
    continue_on_error: bool,
) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    for op in ops {
        match run(op, feedback) {
            Ok(RunStatus::Completed(done)) => {
                report.completed += 1;
                report.outputs.push(match done {
                    OperationReport::Equalize(r) => r.style_path,
                    OperationReport::HistogramMatch(r) => r.vrt,
                    OperationReport::To8Bits(r) => r.output,
                });
            }
            Ok(RunStatus::Cancelled) => {
                report.cancelled += 1;
                break;
            }
            Err(e) if continue_on_error => {
                report.errors.push((op.name().to_string(), e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_parse_from_tagged_json() {
        let json = r#"[
            { "operation": "equalize", "source": "a.tif", "reference": "r.tif",
              "work_area": "zone.gpkg" },
            { "operation": "histogram_match", "source": "a.tif", "reference": "r.tif",
              "work_area": "zone.gpkg", "cutout": null, "output": "out/mosaic.vrt",
              "params": { "desaturation": 3 } },
            { "operation": "to8bits", "source": "a.tif", "output": "a_8bits.tif" }
        ]"#;
        let ops: Vec<Operation> = serde_json::from_str(json).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].name(), "equalize");
        match &ops[1] {
            Operation::HistogramMatch(inputs) => {
                assert_eq!(inputs.params.desaturation, 3);
                assert_eq!(inputs.params.saturation, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ops[2].name(), "to8bits");
    }

    #[test]
    fn failing_operations_are_collected_on_demand() {
        let ops = vec![Operation::To8Bits(To8BitsInputs {
            source: PathBuf::from("/nonexistent/a.tif"),
            style: Some(PathBuf::from("/nonexistent/a.style.json")),
            cutout: None,
            output: PathBuf::from("/nonexistent/out.tif"),
        })];
        let fb = LogFeedback::new();
        let report = run_all(&ops, &fb, true).unwrap();
        assert_eq!(report.completed, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "to8bits");
        assert!(run_all(&ops, &fb, false).is_err());
    }
}
