//! Argument handling behind the `nf-dropna` command.

use std::path::PathBuf;

use clap::Parser;
use log::info;
use nf_frame::{Axis, AxisArg, DropNaArgs, LabelArg};
use nf_index::{Index, IndexLabel};
use nf_runtime::{ExecutionLedger, RuntimePolicy};

use crate::{IoError, read_csv_path, write_csv_string};

/// Drop rows or columns with missing values from a CSV table.
#[derive(Debug, Clone, Parser)]
#[command(name = "nf-dropna", version)]
pub struct DropNaCommand {
    /// Input CSV with a header row.
    pub input: PathBuf,
    /// 0/index/rows or 1/columns.
    #[arg(long, default_value = "0")]
    pub axis: String,
    /// any or all.
    #[arg(long)]
    pub how: Option<String>,
    /// Minimum non-missing cells a line needs to be kept.
    #[arg(long)]
    pub thresh: Option<usize>,
    /// Comma-separated labels on the opposite axis.
    #[arg(long, value_delimiter = ',')]
    pub subset: Option<Vec<String>>,
    /// Promote this column to the row labels before filtering.
    #[arg(long)]
    pub index_col: Option<String>,
    /// Run in hardened mode, capping column-axis fallbacks at this many rows.
    #[arg(long)]
    pub fallback_row_cap: Option<usize>,
    /// Print backend operation counts as JSON on stderr.
    #[arg(long)]
    pub ledger: bool,
}

/// Output of one command run: the filtered CSV and, with `--ledger`, the
/// counts JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropNaOutput {
    pub csv: String,
    pub ledger_json: Option<String>,
}

/// Integers are axis positions; anything else is an axis name.
#[must_use]
pub fn axis_arg(raw: &str) -> AxisArg {
    raw.parse::<i64>()
        .map_or_else(|_| AxisArg::Name(raw.to_owned()), AxisArg::Position)
}

/// Column names are always strings. Row labels are read as integers when
/// the frame has a matching integer label.
#[must_use]
pub fn subset_labels(raw: Vec<String>, row_index: Option<&Index>) -> Vec<LabelArg> {
    raw.into_iter()
        .map(|label| match (label.parse::<i64>(), row_index) {
            (Ok(v), Some(index)) if index.contains(&IndexLabel::Int64(v)) => LabelArg::Int(v),
            _ => LabelArg::Name(label),
        })
        .collect()
}

pub fn run_dropna(command: &DropNaCommand) -> Result<DropNaOutput, IoError> {
    let mut frame = read_csv_path(&command.input)?;
    if let Some(column) = &command.index_col {
        frame = frame.set_index(column, true)?;
    }

    let axis = axis_arg(&command.axis);
    let row_index = matches!(axis.resolve(), Ok(Axis::Columns)).then(|| frame.index());
    let args = DropNaArgs {
        subset: command
            .subset
            .clone()
            .map(|raw| subset_labels(raw, row_index)),
        axis,
        how: command.how.clone(),
        thresh: command.thresh,
    };

    let policy = match command.fallback_row_cap {
        Some(cap) => RuntimePolicy::hardened(Some(cap)),
        None => RuntimePolicy::strict(),
    };
    let mut ledger = ExecutionLedger::new();
    let out = frame.dropna_with_policy(&args, &policy, &mut ledger)?;
    info!(
        "kept {} of {} rows, {} of {} columns",
        out.len(),
        frame.len(),
        out.num_columns(),
        frame.num_columns()
    );

    let ledger_json = if command.ledger {
        Some(serde_json::to_string(&ledger.counts())?)
    } else {
        None
    };
    Ok(DropNaOutput {
        csv: write_csv_string(&out, command.index_col.is_some())?,
        ledger_json,
    })
}
