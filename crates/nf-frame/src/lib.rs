#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use nf_columnar::{Column, ColumnError};
use nf_index::{Index, IndexError, IndexLabel, PositionIndex, format_label_list};
use nf_runtime::{BackendOpKind, ExecutionLedger};
use nf_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod dropna;

pub use dropna::{
    Axis, AxisArg, DropNaArgs, DropNaError, DropNaErrorKind, DropNaHow, DropNaRequest, LabelArg,
    RetentionRule, Subset,
};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("index length ({index_len}) does not match column length ({column_len})")]
    LengthMismatch { index_len: usize, column_len: usize },
    #[error("compatibility gate rejected operation: {0}")]
    CompatibilityRejected(String),
    #[error(transparent)]
    DropNa(#[from] DropNaError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Column-oriented table with a label index and a dense position index.
///
/// Columns are stored by name; `column_order` carries the observable order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    index: Index,
    positions: PositionIndex,
    columns: BTreeMap<String, Column>,
    column_order: Vec<String>,
}

/// A single row, as returned by `iloc[n]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub label: IndexLabel,
    pub cells: Vec<(String, Scalar)>,
}

impl Row {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.cells
            .iter()
            .find_map(|(name, value)| (name == column).then_some(value))
    }
}

fn scalar_to_index_label(value: &Scalar) -> Result<IndexLabel, FrameError> {
    match value {
        Scalar::Int64(v) => Ok(IndexLabel::Int64(*v)),
        Scalar::Utf8(v) => Ok(IndexLabel::Utf8(v.clone())),
        v if v.is_missing() => Ok(IndexLabel::Missing),
        _ => Err(FrameError::CompatibilityRejected(format!(
            "set_index currently supports Int64/Utf8 labels; found {:?}",
            value.dtype()
        ))),
    }
}

fn compare_non_missing_scalars_for_sort(left: &Scalar, right: &Scalar) -> Ordering {
    match (left, right) {
        (Scalar::Bool(lhs), Scalar::Bool(rhs)) => lhs.cmp(rhs),
        (Scalar::Int64(lhs), Scalar::Int64(rhs)) => lhs.cmp(rhs),
        (Scalar::Float64(lhs), Scalar::Float64(rhs)) => {
            lhs.partial_cmp(rhs).unwrap_or(Ordering::Equal)
        }
        (Scalar::Utf8(lhs), Scalar::Utf8(rhs)) => lhs.cmp(rhs),
        (Scalar::Timestamp(lhs), Scalar::Timestamp(rhs)) => lhs.cmp(rhs),
        // Columns are dtype-homogeneous; mixed values only reach here through
        // hand-built fixtures.
        _ => left.dtype().cmp(&right.dtype()),
    }
}

fn compare_scalars_with_na_last(left: &Scalar, right: &Scalar, ascending: bool) -> Ordering {
    match (left.is_missing(), right.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let order = compare_non_missing_scalars_for_sort(left, right);
            if ascending { order } else { order.reverse() }
        }
    }
}

impl DataFrame {
    fn validate_column_lengths(
        index: &Index,
        columns: &BTreeMap<String, Column>,
    ) -> Result<(), FrameError> {
        for column in columns.values() {
            if column.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    index_len: index.len(),
                    column_len: column.len(),
                });
            }
        }
        Ok(())
    }

    fn normalize_column_order(
        columns: &BTreeMap<String, Column>,
        column_order: Vec<String>,
    ) -> Result<Vec<String>, FrameError> {
        if column_order.is_empty() {
            return Ok(columns.keys().cloned().collect());
        }

        let mut normalized = Vec::with_capacity(columns.len());
        let mut seen = BTreeSet::new();
        for name in column_order {
            if !columns.contains_key(&name) {
                return Err(FrameError::CompatibilityRejected(format!(
                    "column '{name}' not found in data"
                )));
            }
            if seen.insert(name.clone()) {
                normalized.push(name);
            }
        }

        for name in columns.keys() {
            if !seen.contains(name) {
                normalized.push(name.clone());
            }
        }

        Ok(normalized)
    }

    pub fn new(index: Index, columns: BTreeMap<String, Column>) -> Result<Self, FrameError> {
        Self::new_with_column_order(index, columns, Vec::new())
    }

    pub fn new_with_column_order(
        index: Index,
        columns: BTreeMap<String, Column>,
        column_order: Vec<String>,
    ) -> Result<Self, FrameError> {
        Self::validate_column_lengths(&index, &columns)?;
        let column_order = Self::normalize_column_order(&columns, column_order)?;
        Ok(Self {
            positions: PositionIndex::new(index.len()),
            index,
            columns,
            column_order,
        })
    }

    /// Construct a DataFrame from a dict of column vectors.
    ///
    /// Matches `pd.DataFrame({"a": [1, 2], "b": [3, 4]})`: labels default to
    /// `0..n`. `column_order` controls observable column order; when empty,
    /// input order is used.
    pub fn from_dict(
        column_order: &[&str],
        data: Vec<(&str, Vec<Scalar>)>,
    ) -> Result<Self, FrameError> {
        let n = data.first().map_or(0, |(_, values)| values.len());
        let mut frame = Self::from_dict_with_index(data, Index::range(n).labels().to_vec())?;

        if !column_order.is_empty() {
            let mut explicit = Vec::with_capacity(column_order.len());
            for &name in column_order {
                if explicit.iter().any(|existing: &String| existing == name) {
                    return Err(FrameError::CompatibilityRejected(format!(
                        "duplicate column selector: '{name}'"
                    )));
                }
                explicit.push(name.to_owned());
            }
            frame.column_order = Self::normalize_column_order(&frame.columns, explicit)?;
        }
        Ok(frame)
    }

    /// Construct a DataFrame from a dict of column vectors with explicit labels.
    ///
    /// Matches `pd.DataFrame({"a": [1, 2]}, index=["x", "y"])`.
    pub fn from_dict_with_index(
        data: Vec<(&str, Vec<Scalar>)>,
        index_labels: Vec<IndexLabel>,
    ) -> Result<Self, FrameError> {
        let n = index_labels.len();
        let index = Index::new(index_labels);

        let mut columns = BTreeMap::new();
        let mut input_order = Vec::with_capacity(data.len());
        for (name, values) in data {
            if values.len() != n {
                return Err(FrameError::LengthMismatch {
                    index_len: n,
                    column_len: values.len(),
                });
            }
            if columns
                .insert(name.to_owned(), Column::from_values(values)?)
                .is_some()
            {
                return Err(FrameError::CompatibilityRejected(format!(
                    "duplicate column label '{name}'"
                )));
            }
            input_order.push(name.to_owned());
        }

        Self::new_with_column_order(index, columns, input_order)
    }

    /// Return the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.column_order.len()
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn positions(&self) -> &PositionIndex {
        &self.positions
    }

    #[must_use]
    pub fn columns(&self) -> &BTreeMap<String, Column> {
        &self.columns
    }

    /// Column names in observable order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&String> {
        self.column_order.iter().collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    fn ordered_columns(&self) -> impl Iterator<Item = (&String, &Column)> + '_ {
        self.column_order
            .iter()
            .filter_map(|name| self.columns.get(name).map(|column| (name, column)))
    }

    /// Gather rows by position. Labels travel with their rows; the position
    /// index is rebuilt densely.
    fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.len()) {
            return Err(FrameError::CompatibilityRejected(format!(
                "row position {bad} out of bounds for length {}",
                self.len()
            )));
        }

        let mut columns = BTreeMap::new();
        for (name, column) in self.ordered_columns() {
            columns.insert(name.clone(), column.take(positions)?);
        }

        Self::new_with_column_order(
            self.index.take(positions),
            columns,
            self.column_order.clone(),
        )
    }

    /// Keep only the named columns, in the given order. Rows are untouched.
    fn select_columns(&self, names: Vec<String>) -> Result<Self, FrameError> {
        let mut columns = BTreeMap::new();
        for name in &names {
            let column = self.columns.get(name).ok_or_else(|| {
                FrameError::CompatibilityRejected(format!("column '{name}' not found"))
            })?;
            columns.insert(name.clone(), column.clone());
        }

        Ok(Self {
            index: self.index.clone(),
            positions: self.positions,
            columns,
            column_order: names,
        })
    }

    /// Promote a column to the label index.
    ///
    /// Matches `df.set_index(column, drop=...)`. Missing cells become the
    /// `Missing` label rather than an error.
    pub fn set_index(&self, column: &str, drop: bool) -> Result<Self, FrameError> {
        let source = self.columns.get(column).ok_or_else(|| {
            FrameError::CompatibilityRejected(format!("column '{column}' not found"))
        })?;

        let labels = source
            .values()
            .iter()
            .map(scalar_to_index_label)
            .collect::<Result<Vec<_>, _>>()?;
        let index = Index::new(labels);
        debug!(
            "set_index column={column} drop={drop} duplicates={}",
            index.has_duplicates()
        );

        if !drop {
            return Self::new_with_column_order(
                index,
                self.columns.clone(),
                self.column_order.clone(),
            );
        }

        let mut columns = self.columns.clone();
        columns.remove(column);
        let column_order = self
            .column_order
            .iter()
            .filter(|name| name.as_str() != column)
            .cloned()
            .collect::<Vec<_>>();
        Self::new_with_column_order(index, columns, column_order)
    }

    /// Return a new DataFrame sorted by a column's values.
    ///
    /// Matches `df.sort_values(by=column, ascending=...)` with
    /// `na_position='last'` and a stable sort.
    pub fn sort_values(&self, column: &str, ascending: bool) -> Result<Self, FrameError> {
        let sort_column = self.columns.get(column).ok_or_else(|| {
            FrameError::CompatibilityRejected(format!("column '{column}' not found"))
        })?;

        let mut order = (0..self.len()).collect::<Vec<_>>();
        order.sort_by(|&left_pos, &right_pos| {
            compare_scalars_with_na_last(
                &sort_column.values()[left_pos],
                &sort_column.values()[right_pos],
                ascending,
            )
        });

        self.take_rows(&order)
    }

    /// Label-based row selection for list-like indexers.
    ///
    /// Matches `df.loc[[...]]`: selector order and duplicate labels are
    /// preserved. Unknown labels fail with the pandas label list.
    pub fn loc(&self, labels: &[IndexLabel]) -> Result<Self, FrameError> {
        let map = self.index.position_map();
        let mut positions = Vec::with_capacity(labels.len());
        let mut missing = Vec::new();
        for requested in labels {
            match map.get(requested) {
                Some(found) => positions.extend_from_slice(found),
                None => missing.push(requested.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(FrameError::CompatibilityRejected(format!(
                "{} not in index",
                format_label_list(&missing)
            )));
        }

        self.take_rows(&positions)
    }

    /// Position-based row selection. Negative positions count from the end.
    pub fn iloc(&self, positions: &[i64]) -> Result<Self, FrameError> {
        let mut ledger = ExecutionLedger::new();
        self.iloc_with_ledger(positions, &mut ledger)
    }

    /// Positional lookups never fall back, so no policy applies; the ledger
    /// gets one join per successful call.
    pub fn iloc_with_ledger(
        &self,
        positions: &[i64],
        ledger: &mut ExecutionLedger,
    ) -> Result<Self, FrameError> {
        let resolved = positions
            .iter()
            .map(|&position| self.positions.resolve(position))
            .collect::<Result<Vec<_>, _>>()?;
        ledger.record(
            BackendOpKind::Join,
            "iloc",
            format!("positions={}", resolved.len()),
        );
        self.take_rows(&resolved)
    }

    /// Single-row positional lookup, `df.iloc[n]`.
    pub fn iloc_row(&self, position: i64) -> Result<Row, FrameError> {
        let mut ledger = ExecutionLedger::new();
        self.iloc_row_with_ledger(position, &mut ledger)
    }

    pub fn iloc_row_with_ledger(
        &self,
        position: i64,
        ledger: &mut ExecutionLedger,
    ) -> Result<Row, FrameError> {
        let resolved = self.positions.resolve(position)?;
        ledger.record(BackendOpKind::Join, "iloc", format!("position={position}"));

        let label = self.index.labels()[resolved].clone();
        let cells = self
            .ordered_columns()
            .map(|(name, column)| {
                let value = column
                    .value(resolved)
                    .cloned()
                    .unwrap_or_else(|| Scalar::missing_for_dtype(column.dtype()));
                (name.clone(), value)
            })
            .collect();
        Ok(Row { label, cells })
    }
}

#[cfg(test)]
mod tests {
    use nf_index::{IndexError, IndexLabel};
    use nf_runtime::{ExecutionCounts, ExecutionLedger};
    use nf_types::{DType, NullKind, Scalar};

    use super::{DataFrame, FrameError};

    fn utf8(v: &str) -> Scalar {
        Scalar::Utf8(v.to_owned())
    }

    fn sample() -> DataFrame {
        DataFrame::from_dict(
            &["name", "toy", "born"],
            vec![
                ("name", vec![utf8("Alfred"), utf8("Batman"), utf8("Catwoman")]),
                (
                    "toy",
                    vec![Scalar::Null(NullKind::NaN), utf8("Batmobile"), utf8("Bullwhip")],
                ),
                (
                    "born",
                    vec![
                        Scalar::Null(NullKind::NaT),
                        Scalar::Timestamp(-936_835_200_000_000_000),
                        Scalar::Null(NullKind::NaT),
                    ],
                ),
            ],
        )
        .expect("sample frame")
    }

    #[test]
    fn from_dict_preserves_column_order_and_default_labels() {
        let df = sample();
        assert_eq!(df.column_names(), vec!["name", "toy", "born"]);
        assert_eq!(df.len(), 3);
        assert_eq!(df.num_columns(), 3);
        assert_eq!(
            df.index().labels(),
            &[IndexLabel::Int64(0), IndexLabel::Int64(1), IndexLabel::Int64(2)]
        );
        assert_eq!(df.positions().len(), 3);
        assert_eq!(df.column("toy").unwrap().dtype(), DType::Utf8);
        assert_eq!(
            df.column("toy").unwrap().values()[0],
            Scalar::Null(NullKind::Null)
        );
        assert_eq!(df.column("born").unwrap().dtype(), DType::Timestamp);
    }

    #[test]
    fn from_dict_rejects_ragged_columns() {
        let err = DataFrame::from_dict(
            &[],
            vec![
                ("a", vec![Scalar::Int64(1), Scalar::Int64(2)]),
                ("b", vec![Scalar::Int64(1)]),
            ],
        )
        .expect_err("ragged");
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                index_len: 2,
                column_len: 1
            }
        ));
    }

    #[test]
    fn empty_dict_builds_empty_frame() {
        let df = DataFrame::from_dict(&[], vec![]).unwrap();
        assert!(df.is_empty());
        assert_eq!(df.num_columns(), 0);
    }

    #[test]
    fn set_index_promotes_missing_as_label() {
        let df = sample().set_index("toy", true).unwrap();
        assert_eq!(df.column_names(), vec!["name", "born"]);
        assert_eq!(
            df.index().labels(),
            &[
                IndexLabel::Missing,
                "Batmobile".into(),
                "Bullwhip".into()
            ]
        );

        let kept = sample().set_index("name", false).unwrap();
        assert_eq!(kept.num_columns(), 3);
        assert!(sample().set_index("born", true).is_err());
        assert!(sample().set_index("nope", true).is_err());
    }

    #[test]
    fn sort_values_places_missing_last_and_rebuilds_positions() {
        let df = DataFrame::from_dict(
            &["col0", "col1"],
            vec![
                (
                    "col0",
                    vec![Scalar::Int64(3), Scalar::Null(NullKind::Null), Scalar::Int64(1)],
                ),
                ("col1", vec![utf8("c"), utf8("n"), utf8("a")]),
            ],
        )
        .unwrap();

        let sorted = df.sort_values("col0", true).unwrap();
        assert_eq!(
            sorted.index().labels(),
            &[IndexLabel::Int64(2), IndexLabel::Int64(0), IndexLabel::Int64(1)]
        );
        assert_eq!(
            sorted.column("col1").unwrap().values(),
            &[utf8("a"), utf8("c"), utf8("n")]
        );
        assert_eq!(sorted.positions().positions().collect::<Vec<_>>(), vec![0, 1, 2]);

        let descending = df.sort_values("col0", false).unwrap();
        assert_eq!(
            descending.index().labels(),
            &[IndexLabel::Int64(0), IndexLabel::Int64(2), IndexLabel::Int64(1)]
        );
    }

    #[test]
    fn loc_preserves_selector_order_and_reports_unknown_labels() {
        let df = sample().set_index("name", true).unwrap();
        let picked = df.loc(&["Catwoman".into(), "Alfred".into()]).unwrap();
        assert_eq!(
            picked.index().labels(),
            &[IndexLabel::from("Catwoman"), IndexLabel::from("Alfred")]
        );

        let err = df.loc(&["Robin".into()]).expect_err("unknown label");
        assert_eq!(
            err.to_string(),
            "compatibility gate rejected operation: ['Robin'] not in index"
        );
    }

    #[test]
    fn iloc_row_reads_through_position_index() {
        let df = sample();
        let row = df.iloc_row(-1).unwrap();
        assert_eq!(row.label, IndexLabel::Int64(2));
        assert_eq!(row.get("name"), Some(&utf8("Catwoman")));
        assert_eq!(row.get("born"), Some(&Scalar::Null(NullKind::NaT)));
        assert_eq!(row.get("missing"), None);

        let err = df.iloc_row(3).expect_err("out of bounds");
        assert!(matches!(
            err,
            FrameError::Index(IndexError::PositionOutOfBounds { position: 3, len: 3 })
        ));
    }

    #[test]
    fn iloc_records_one_join() {
        let df = sample();
        let mut ledger = ExecutionLedger::new();
        let out = df
            .iloc_with_ledger(&[2, 0], &mut ledger)
            .unwrap();
        assert_eq!(
            out.index().labels(),
            &[IndexLabel::Int64(2), IndexLabel::Int64(0)]
        );
        assert_eq!(
            ledger.counts(),
            ExecutionCounts {
                queries: 0,
                joins: 1,
                fallbacks: 0
            }
        );

        let mut failed = ExecutionLedger::new();
        assert!(df.iloc_with_ledger(&[7], &mut failed).is_err());
        assert!(failed.is_empty());

        let mut rows = ExecutionLedger::new();
        df.iloc_row_with_ledger(-1, &mut rows).unwrap();
        assert!(df.iloc_row_with_ledger(3, &mut rows).is_err());
        assert_eq!(rows.counts().joins, 1);
    }
}
