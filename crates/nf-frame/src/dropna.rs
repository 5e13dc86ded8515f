//! Missing-value filtering: `df.dropna(axis=..., how=..., thresh=..., subset=...)`.
//!
//! Arguments arrive loosely typed ([`DropNaArgs`]), are validated against the
//! frame into a [`DropNaRequest`], and only then evaluated. Validation always
//! runs in the same order: axis, `how`/`thresh` exclusivity, `how` value,
//! subset labels.

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, warn};
use nf_index::{IndexLabel, format_label_list};
use nf_runtime::{BackendOpKind, DecisionAction, ExecutionLedger, RuntimePolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DataFrame, FrameError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Rows,
    Columns,
}

impl Axis {
    /// The axis whose labels a subset refers to.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Rows => Self::Columns,
            Self::Columns => Self::Rows,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows => write!(f, "rows"),
            Self::Columns => write!(f, "columns"),
        }
    }
}

/// A label as a caller writes it: `"toy"`, `3`, or `null` for a missing label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelArg {
    Int(i64),
    Name(String),
    Missing,
}

impl LabelArg {
    #[must_use]
    pub fn to_index_label(&self) -> IndexLabel {
        match self {
            Self::Int(v) => IndexLabel::Int64(*v),
            Self::Name(v) => IndexLabel::Utf8(v.clone()),
            Self::Missing => IndexLabel::Missing,
        }
    }
}

impl From<&str> for LabelArg {
    fn from(value: &str) -> Self {
        Self::Name(value.to_owned())
    }
}

impl From<i64> for LabelArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// The `axis=` argument before validation. Any list, even an empty one,
/// means "multiple axes".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisArg {
    Position(i64),
    Name(String),
    Many(Vec<LabelArg>),
}

impl Default for AxisArg {
    fn default() -> Self {
        Self::Position(0)
    }
}

impl From<i64> for AxisArg {
    fn from(position: i64) -> Self {
        Self::Position(position)
    }
}

impl From<&str> for AxisArg {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<Axis> for AxisArg {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::Rows => Self::Position(0),
            Axis::Columns => Self::Position(1),
        }
    }
}

impl AxisArg {
    pub fn resolve(&self) -> Result<Axis, DropNaError> {
        match self {
            Self::Many(_) => Err(DropNaError::MultipleAxes),
            Self::Position(0) => Ok(Axis::Rows),
            Self::Position(1) => Ok(Axis::Columns),
            Self::Position(other) => Err(DropNaError::InvalidAxis {
                axis: other.to_string(),
            }),
            Self::Name(name) => match name.as_str() {
                "index" | "rows" => Ok(Axis::Rows),
                "columns" => Ok(Axis::Columns),
                _ => Err(DropNaError::InvalidAxis { axis: name.clone() }),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropNaHow {
    Any,
    All,
}

impl DropNaHow {
    pub fn parse(raw: &str) -> Result<Self, DropNaError> {
        match raw {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            _ => Err(DropNaError::InvalidHow {
                how: raw.to_owned(),
            }),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

/// How many present cells a line needs to survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RetentionRule {
    How(DropNaHow),
    Thresh(usize),
}

impl Default for RetentionRule {
    fn default() -> Self {
        Self::How(DropNaHow::Any)
    }
}

impl RetentionRule {
    #[must_use]
    pub fn keeps(self, present: usize, total: usize) -> bool {
        match self {
            Self::How(DropNaHow::Any) => present == total,
            Self::How(DropNaHow::All) => present > 0,
            Self::Thresh(min) => present >= min,
        }
    }
}

impl fmt::Display for RetentionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::How(how) => write!(f, "how={}", how.as_str()),
            Self::Thresh(n) => write!(f, "thresh={n}"),
        }
    }
}

/// Raw `dropna` keyword arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropNaArgs {
    #[serde(default)]
    pub axis: AxisArg,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresh: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<Vec<LabelArg>>,
}

impl DropNaArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn axis(mut self, axis: impl Into<AxisArg>) -> Self {
        self.axis = axis.into();
        self
    }

    #[must_use]
    pub fn how(mut self, how: impl Into<String>) -> Self {
        self.how = Some(how.into());
        self
    }

    #[must_use]
    pub fn thresh(mut self, thresh: usize) -> Self {
        self.thresh = Some(thresh);
        self
    }

    #[must_use]
    pub fn subset<L: Into<LabelArg>>(mut self, labels: impl IntoIterator<Item = L>) -> Self {
        self.subset = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    /// Validate against `frame` without evaluating.
    pub fn validate(&self, frame: &DataFrame) -> Result<DropNaRequest, DropNaError> {
        let axis = self.axis.resolve()?;

        if self.how.is_some() && self.thresh.is_some() {
            return Err(DropNaError::HowAndThresh);
        }

        let rule = match (&self.how, self.thresh) {
            (Some(how), _) => RetentionRule::How(DropNaHow::parse(how)?),
            (None, Some(n)) => RetentionRule::Thresh(n),
            (None, None) => RetentionRule::default(),
        };

        let subset = match &self.subset {
            None => None,
            Some(labels) => {
                let subset = Subset::from_args(axis, labels);
                subset.check_against(frame)?;
                Some(subset.deduplicated())
            }
        };

        Ok(DropNaRequest { axis, rule, subset })
    }
}

/// Subset labels on the axis opposite the one being filtered.
///
/// Evaluation treats the subset as a set: a label named twice is considered
/// once. Unknown labels are reported as requested, repeats included, so
/// `subset=["x", "x"]` on a frame without `x` fails with `['x', 'x']`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "labels", rename_all = "snake_case")]
pub enum Subset {
    /// Column labels, for row filtering. Column names are strings, so only
    /// `Utf8` labels can match.
    Columns(Vec<IndexLabel>),
    /// Row labels, for column filtering.
    Rows(Vec<IndexLabel>),
}

impl Subset {
    fn from_args(axis: Axis, args: &[LabelArg]) -> Self {
        let labels = args.iter().map(LabelArg::to_index_label).collect();
        match axis {
            Axis::Rows => Self::Columns(labels),
            Axis::Columns => Self::Rows(labels),
        }
    }

    fn deduplicated(self) -> Self {
        let dedup = |labels: Vec<IndexLabel>| {
            let mut seen = BTreeSet::new();
            labels
                .into_iter()
                .filter(|label| seen.insert(label.clone()))
                .collect()
        };
        match self {
            Self::Columns(labels) => Self::Columns(dedup(labels)),
            Self::Rows(labels) => Self::Rows(dedup(labels)),
        }
    }

    fn check_against(&self, frame: &DataFrame) -> Result<(), DropNaError> {
        let unknown = match self {
            Self::Columns(labels) => labels
                .iter()
                .filter(|label| column_name(label).is_none_or(|n| !frame.columns.contains_key(n)))
                .cloned()
                .collect::<Vec<_>>(),
            Self::Rows(labels) => labels
                .iter()
                .filter(|label| !frame.index.contains(label))
                .cloned()
                .collect::<Vec<_>>(),
        };

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(DropNaError::UnknownLabels { labels: unknown })
        }
    }
}

fn column_name(label: &IndexLabel) -> Option<&str> {
    match label {
        IndexLabel::Utf8(name) => Some(name),
        IndexLabel::Int64(_) | IndexLabel::Missing => None,
    }
}

/// A validated filter request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropNaRequest {
    pub axis: Axis,
    pub rule: RetentionRule,
    pub subset: Option<Subset>,
}

impl DropNaRequest {
    #[must_use]
    pub fn new(axis: Axis, rule: RetentionRule) -> Self {
        Self {
            axis,
            rule,
            subset: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropNaErrorKind {
    /// Python `TypeError`: the arguments have the wrong shape.
    ArgumentShape,
    /// Python `ValueError`: an argument has an unsupported value.
    InvalidValue,
    /// Python `KeyError`: a subset label does not exist.
    UnknownLabel,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DropNaError {
    #[error("supplying multiple axes to axis is no longer supported.")]
    MultipleAxes,
    #[error("No axis named {axis} for object type DataFrame")]
    InvalidAxis { axis: String },
    #[error("You cannot set both the how and thresh arguments at the same time.")]
    HowAndThresh,
    #[error("invalid how option: {how}")]
    InvalidHow { how: String },
    #[error("{}", format_label_list(.labels))]
    UnknownLabels { labels: Vec<IndexLabel> },
}

impl DropNaError {
    #[must_use]
    pub fn kind(&self) -> DropNaErrorKind {
        match self {
            Self::MultipleAxes | Self::HowAndThresh => DropNaErrorKind::ArgumentShape,
            Self::InvalidAxis { .. } | Self::InvalidHow { .. } => DropNaErrorKind::InvalidValue,
            Self::UnknownLabels { .. } => DropNaErrorKind::UnknownLabel,
        }
    }
}

fn how_subset_args(how: DropNaHow, subset: Option<&[String]>) -> DropNaArgs {
    DropNaArgs {
        how: Some(how.as_str().to_owned()),
        subset: subset.map(|names| names.iter().map(|n| LabelArg::Name(n.clone())).collect()),
        ..DropNaArgs::default()
    }
}

fn row_label_subset(subset: Option<&[IndexLabel]>) -> Option<Vec<LabelArg>> {
    subset.map(|labels| {
        labels
            .iter()
            .map(|label| match label {
                IndexLabel::Int64(v) => LabelArg::Int(*v),
                IndexLabel::Utf8(v) => LabelArg::Name(v.clone()),
                IndexLabel::Missing => LabelArg::Missing,
            })
            .collect()
    })
}

impl DataFrame {
    /// Drop rows containing any missing value, `df.dropna()`.
    pub fn dropna(&self) -> Result<Self, FrameError> {
        self.dropna_args(&DropNaArgs::default())
    }

    /// `df.dropna(how=..., subset=[columns...])`.
    pub fn dropna_with_options(
        &self,
        how: DropNaHow,
        subset: Option<&[String]>,
    ) -> Result<Self, FrameError> {
        self.dropna_args(&how_subset_args(how, subset))
    }

    /// `df.dropna(thresh=..., subset=[columns...])`.
    pub fn dropna_with_threshold(
        &self,
        thresh: usize,
        subset: Option<&[String]>,
    ) -> Result<Self, FrameError> {
        let args = DropNaArgs {
            thresh: Some(thresh),
            subset: subset.map(|names| names.iter().map(|n| LabelArg::Name(n.clone())).collect()),
            ..DropNaArgs::default()
        };
        self.dropna_args(&args)
    }

    /// Drop columns containing any missing value, `df.dropna(axis=1)`.
    pub fn dropna_columns(&self) -> Result<Self, FrameError> {
        self.dropna_args(&DropNaArgs::new().axis(Axis::Columns))
    }

    /// `df.dropna(axis=1, how=..., subset=[row labels...])`.
    pub fn dropna_columns_with_options(
        &self,
        how: DropNaHow,
        subset: Option<&[IndexLabel]>,
    ) -> Result<Self, FrameError> {
        let args = DropNaArgs {
            axis: Axis::Columns.into(),
            how: Some(how.as_str().to_owned()),
            thresh: None,
            subset: row_label_subset(subset),
        };
        self.dropna_args(&args)
    }

    /// `df.dropna(axis=1, thresh=..., subset=[row labels...])`.
    pub fn dropna_columns_with_threshold(
        &self,
        thresh: usize,
        subset: Option<&[IndexLabel]>,
    ) -> Result<Self, FrameError> {
        let args = DropNaArgs {
            axis: Axis::Columns.into(),
            how: None,
            thresh: Some(thresh),
            subset: row_label_subset(subset),
        };
        self.dropna_args(&args)
    }

    pub fn dropna_args(&self, args: &DropNaArgs) -> Result<Self, FrameError> {
        let mut ledger = ExecutionLedger::new();
        self.dropna_with_policy(args, &RuntimePolicy::strict(), &mut ledger)
    }

    /// Validate and evaluate, recording backend operations in `ledger`.
    ///
    /// Row filtering is one query. Column filtering has no row-predicate
    /// form, so it takes a fallback (subject to `policy`) plus one query.
    /// Invalid arguments record nothing.
    pub fn dropna_with_policy(
        &self,
        args: &DropNaArgs,
        policy: &RuntimePolicy,
        ledger: &mut ExecutionLedger,
    ) -> Result<Self, FrameError> {
        let request = args.validate(self)?;

        match request.axis {
            Axis::Rows => {
                ledger.record(BackendOpKind::Query, "dropna", format!("axis=rows {}", request.rule));
            }
            Axis::Columns => {
                let subject = "dropna(axis=columns)";
                if policy.decide_fallback(subject, self.len(), ledger) == DecisionAction::Reject {
                    warn!("{subject} rejected by policy: rows={}", self.len());
                    return Err(FrameError::CompatibilityRejected(format!(
                        "{subject} requires a client-side fallback over {} rows",
                        self.len()
                    )));
                }
                ledger.record(
                    BackendOpKind::Fallback,
                    "dropna",
                    format!("axis=columns {}", request.rule),
                );
                ledger.record(
                    BackendOpKind::Query,
                    "dropna",
                    format!("axis=columns {}", request.rule),
                );
            }
        }

        self.dropna_request(&request)
    }

    /// Evaluate an already-validated request.
    pub fn dropna_request(&self, request: &DropNaRequest) -> Result<Self, FrameError> {
        if let Some(subset) = &request.subset {
            let labels_opposite_axis = matches!(
                (request.axis, subset),
                (Axis::Rows, Subset::Columns(_)) | (Axis::Columns, Subset::Rows(_))
            );
            if !labels_opposite_axis {
                return Err(FrameError::CompatibilityRejected(format!(
                    "subset does not label the {} axis",
                    request.axis.opposite()
                )));
            }
            subset.check_against(self)?;
        }

        match request.axis {
            Axis::Rows => self.dropna_rows(request.rule, request.subset.as_ref()),
            Axis::Columns => self.dropna_columns_by(request.rule, request.subset.as_ref()),
        }
    }

    fn dropna_rows(&self, rule: RetentionRule, subset: Option<&Subset>) -> Result<Self, FrameError> {
        let columns = match subset {
            Some(Subset::Columns(labels)) => labels
                .iter()
                .filter_map(|label| column_name(label).and_then(|name| self.columns.get(name)))
                .collect::<Vec<_>>(),
            _ => self.ordered_columns().map(|(_, column)| column).collect(),
        };
        let total = columns.len();

        let keep = self
            .positions
            .positions()
            .filter(|&row| {
                let present = columns.iter().filter(|column| column.is_present(row)).count();
                rule.keeps(present, total)
            })
            .collect::<Vec<_>>();

        debug!(
            "dropna axis=rows {rule} considered_columns={total} kept={}/{}",
            keep.len(),
            self.len()
        );
        self.take_rows(&keep)
    }

    fn dropna_columns_by(
        &self,
        rule: RetentionRule,
        subset: Option<&Subset>,
    ) -> Result<Self, FrameError> {
        let rows: Option<Vec<usize>> = match subset {
            Some(Subset::Rows(labels)) => {
                let map = self.index.position_map();
                let positions = labels
                    .iter()
                    .filter_map(|label| map.get(label))
                    .flatten()
                    .copied()
                    .collect::<BTreeSet<_>>();
                Some(positions.into_iter().collect())
            }
            _ => None,
        };
        let total = rows.as_ref().map_or(self.len(), Vec::len);

        let mut kept = Vec::with_capacity(self.column_order.len());
        for (name, column) in self.ordered_columns() {
            let present = match &rows {
                Some(rows) => column.validity().count_valid_at(rows),
                None => column.validity().count_valid(),
            };
            if rule.keeps(present, total) {
                kept.push(name.clone());
            }
        }

        debug!(
            "dropna axis=columns {rule} considered_rows={total} kept={}/{}",
            kept.len(),
            self.num_columns()
        );
        self.select_columns(kept)
    }
}

#[cfg(test)]
mod tests {
    use nf_index::IndexLabel;
    use nf_runtime::{
        DecisionAction, ExecutionCounts, ExecutionLedger, RuntimeMode, RuntimePolicy,
    };
    use nf_types::{NullKind, Scalar};

    use super::{
        Axis, AxisArg, DropNaArgs, DropNaError, DropNaErrorKind, DropNaHow, LabelArg,
        RetentionRule, Subset,
    };
    use crate::{DataFrame, FrameError};

    const BATMAN_BORN_NS: i64 = -936_835_200_000_000_000;

    fn utf8(v: &str) -> Scalar {
        Scalar::Utf8(v.to_owned())
    }

    fn heroes() -> DataFrame {
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
                        Scalar::Timestamp(BATMAN_BORN_NS),
                        Scalar::Null(NullKind::NaT),
                    ],
                ),
            ],
        )
        .expect("heroes frame")
    }

    fn labels(df: &DataFrame) -> Vec<IndexLabel> {
        df.index().labels().to_vec()
    }

    fn int_labels(values: &[i64]) -> Vec<IndexLabel> {
        values.iter().copied().map(IndexLabel::Int64).collect()
    }

    fn err_of(result: Result<DataFrame, FrameError>) -> DropNaError {
        match result {
            Err(FrameError::DropNa(err)) => err,
            Err(other) => panic!("expected dropna error, got {other:?}"),
            Ok(df) => panic!("expected dropna error, got frame {df:?}"),
        }
    }

    #[test]
    fn default_drops_rows_with_any_missing() {
        let out = heroes().dropna().unwrap();
        assert_eq!(labels(&out), int_labels(&[1]));
        assert_eq!(out.column("name").unwrap().values(), &[utf8("Batman")]);
        assert_eq!(out.column("toy").unwrap().values(), &[utf8("Batmobile")]);
        assert_eq!(
            out.column("born").unwrap().values(),
            &[Scalar::Timestamp(BATMAN_BORN_NS)]
        );
        assert_eq!(out.column_names(), vec!["name", "toy", "born"]);
    }

    #[test]
    fn basic_argument_variants() {
        let df = heroes();
        let cases: Vec<(DropNaArgs, Vec<i64>)> = vec![
            (DropNaArgs::new().how("any"), vec![1]),
            (DropNaArgs::new().how("all"), vec![0, 1, 2]),
            (DropNaArgs::new().subset(["toy"]), vec![1, 2]),
            (DropNaArgs::new().thresh(1), vec![0, 1, 2]),
            (DropNaArgs::new().thresh(2), vec![1, 2]),
            (DropNaArgs::new().thresh(3), vec![1]),
            (DropNaArgs::new().thresh(4), vec![]),
            (DropNaArgs::new().thresh(0), vec![0, 1, 2]),
        ];
        for (args, expected) in cases {
            let out = df.dropna_args(&args).unwrap();
            assert_eq!(labels(&out), int_labels(&expected), "args={args:?}");
        }
    }

    #[test]
    fn how_all_with_subset_keeps_rows_with_any_present_subset_cell() {
        let df = DataFrame::from_dict(
            &["name", "toy", "born"],
            vec![
                ("name", vec![Scalar::Null(NullKind::Null), utf8("Batman"), utf8("Catwoman")]),
                (
                    "toy",
                    vec![Scalar::Null(NullKind::NaN), utf8("Batmobile"), Scalar::Null(NullKind::Null)],
                ),
                (
                    "born",
                    vec![
                        Scalar::Timestamp(0),
                        Scalar::Null(NullKind::NaT),
                        Scalar::Null(NullKind::NaT),
                    ],
                ),
            ],
        )
        .unwrap();

        let out = df
            .dropna_args(&DropNaArgs::new().how("all").subset(["name", "toy"]))
            .unwrap();
        assert_eq!(labels(&out), int_labels(&[1, 2]));
    }

    #[test]
    fn label_index_survives_filtering_and_positions_are_dense() {
        let df = heroes().set_index("toy", true).unwrap();
        let out = df.dropna().unwrap();
        assert_eq!(labels(&out), vec![IndexLabel::from("Batmobile")]);
        assert_eq!(out.positions().positions().collect::<Vec<_>>(), vec![0]);
        assert_eq!(out.column_names(), vec!["name", "born"]);

        let out = heroes().dropna_args(&DropNaArgs::new().subset(["toy"])).unwrap();
        assert_eq!(labels(&out), int_labels(&[1, 2]));
        assert_eq!(out.positions().positions().collect::<Vec<_>>(), vec![0, 1]);
        let row = out.iloc_row(0).unwrap();
        assert_eq!(row.label, IndexLabel::Int64(1));
        assert_eq!(row.get("name"), Some(&utf8("Batman")));
    }

    #[test]
    fn column_axis_mirrors_row_axis() {
        let df = heroes();

        let out = df.dropna_columns().unwrap();
        assert_eq!(out.column_names(), vec!["name"]);
        assert_eq!(labels(&out), int_labels(&[0, 1, 2]));
        assert_eq!(out.positions().len(), 3);

        let out = df
            .dropna_args(&DropNaArgs::new().axis("columns").how("all"))
            .unwrap();
        assert_eq!(out.column_names(), vec!["name", "toy", "born"]);

        let out = df.dropna_columns_with_threshold(2, None).unwrap();
        assert_eq!(out.column_names(), vec!["name", "toy"]);

        let subset = [IndexLabel::Int64(1), IndexLabel::Int64(2)];
        let out = df
            .dropna_columns_with_options(DropNaHow::Any, Some(&subset))
            .unwrap();
        assert_eq!(out.column_names(), vec!["name", "toy"]);

        let only_first = [IndexLabel::Int64(0)];
        let out = df
            .dropna_columns_with_options(DropNaHow::All, Some(&only_first))
            .unwrap();
        assert_eq!(out.column_names(), vec!["name"]);
    }

    #[test]
    fn column_axis_subset_covers_every_duplicate_label() {
        let df = DataFrame::from_dict_with_index(
            vec![
                ("a", vec![Scalar::Int64(1), Scalar::Null(NullKind::Null), Scalar::Int64(3)]),
                ("b", vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)]),
            ],
            vec!["x".into(), "x".into(), "y".into()],
        )
        .unwrap();

        let out = df
            .dropna_args(&DropNaArgs::new().axis(1_i64).subset(["x"]))
            .unwrap();
        assert_eq!(out.column_names(), vec!["b"]);

        let out = df
            .dropna_args(&DropNaArgs::new().axis(1_i64).thresh(2).subset(["x", "x"]))
            .unwrap();
        assert_eq!(out.column_names(), vec!["b"]);
    }

    #[test]
    fn empty_subset_uses_formula_without_special_cases() {
        let df = heroes();
        let empty: [&str; 0] = [];
        let out = df.dropna_args(&DropNaArgs::new().subset(empty)).unwrap();
        assert_eq!(out.len(), 3);
        let out = df
            .dropna_args(&DropNaArgs::new().how("all").subset(empty))
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.num_columns(), 3);
    }

    #[test]
    fn empty_frame_filters_to_empty_frame() {
        let df = DataFrame::from_dict(&["a"], vec![("a", vec![])]).unwrap();
        let out = df.dropna().unwrap();
        assert!(out.is_empty());
        assert_eq!(out.column_names(), vec!["a"]);

        let out = df
            .dropna_args(&DropNaArgs::new().axis(1_i64).how("all"))
            .unwrap();
        assert_eq!(out.num_columns(), 0);
    }

    #[test]
    fn filtering_after_sort_keeps_sorted_order() {
        let df = DataFrame::from_dict(
            &["col0", "col1"],
            vec![
                (
                    "col0",
                    vec![Scalar::Int64(3), Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(0)],
                ),
                (
                    "col1",
                    vec![
                        Scalar::Float64(1.0),
                        Scalar::Null(NullKind::NaN),
                        Scalar::Float64(2.0),
                        Scalar::Float64(4.0),
                    ],
                ),
            ],
        )
        .unwrap();

        let out = df.sort_values("col0", true).unwrap().dropna().unwrap();
        assert_eq!(labels(&out), int_labels(&[3, 2, 0]));
        assert_eq!(
            out.column("col0").unwrap().values(),
            &[Scalar::Int64(0), Scalar::Int64(2), Scalar::Int64(3)]
        );
    }

    #[test]
    fn dropna_is_idempotent() {
        let once = heroes().dropna().unwrap();
        let twice = once.dropna().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn thresh_one_matches_how_all() {
        let df = heroes();
        for subset in [vec!["toy"], vec!["born"], vec!["toy", "born"], vec!["name", "born"]] {
            let by_thresh = df
                .dropna_args(&DropNaArgs::new().thresh(1).subset(subset.clone()))
                .unwrap();
            let by_all = df
                .dropna_args(&DropNaArgs::new().how("all").subset(subset))
                .unwrap();
            assert_eq!(by_thresh, by_all);
        }
    }

    #[test]
    fn negative_cases_match_pandas_messages() {
        let df = heroes();

        let err = err_of(df.dropna_args(&DropNaArgs::new().axis(AxisArg::Many(vec![]))));
        assert_eq!(err, DropNaError::MultipleAxes);
        assert_eq!(err.kind(), DropNaErrorKind::ArgumentShape);
        assert_eq!(
            err.to_string(),
            "supplying multiple axes to axis is no longer supported."
        );

        let err = err_of(df.dropna_args(&DropNaArgs::new().how("invalid")));
        assert_eq!(err.kind(), DropNaErrorKind::InvalidValue);
        assert_eq!(err.to_string(), "invalid how option: invalid");

        let err = err_of(df.dropna_args(&DropNaArgs::new().how("any").thresh(1)));
        assert_eq!(err.kind(), DropNaErrorKind::ArgumentShape);
        assert_eq!(
            err.to_string(),
            "You cannot set both the how and thresh arguments at the same time."
        );

        let err = err_of(df.dropna_args(&DropNaArgs::new().subset(["invalid"])));
        assert_eq!(err.kind(), DropNaErrorKind::UnknownLabel);
        assert_eq!(err.to_string(), "['invalid']");

        let err = err_of(df.dropna_args(&DropNaArgs::new().axis(1_i64).subset(["invalid"])));
        assert_eq!(err.to_string(), "['invalid']");

        let err = err_of(df.dropna_args(&DropNaArgs::new().axis("foo")));
        assert_eq!(err.kind(), DropNaErrorKind::InvalidValue);
        assert_eq!(err.to_string(), "No axis named foo for object type DataFrame");
    }

    #[test]
    fn validation_order_is_axis_then_exclusivity_then_how_then_subset() {
        let df = heroes();
        let everything_wrong = DropNaArgs {
            axis: AxisArg::Many(vec![LabelArg::Int(0), LabelArg::Int(1)]),
            how: Some("invalid".into()),
            thresh: Some(1),
            subset: Some(vec!["invalid".into()]),
        };
        assert_eq!(err_of(df.dropna_args(&everything_wrong)), DropNaError::MultipleAxes);

        let args = DropNaArgs {
            axis: AxisArg::Position(0),
            ..everything_wrong
        };
        assert_eq!(err_of(df.dropna_args(&args)), DropNaError::HowAndThresh);

        let args = DropNaArgs { thresh: None, ..args };
        assert!(matches!(
            err_of(df.dropna_args(&args)),
            DropNaError::InvalidHow { .. }
        ));

        let args = DropNaArgs {
            how: Some("any".into()),
            ..args
        };
        assert!(matches!(
            err_of(df.dropna_args(&args)),
            DropNaError::UnknownLabels { .. }
        ));
    }

    #[test]
    fn unknown_labels_are_listed_in_request_order() {
        let err = err_of(
            heroes().dropna_args(&DropNaArgs::new().subset(vec![
                LabelArg::from("zeta"),
                LabelArg::from("toy"),
                LabelArg::from(5_i64),
                LabelArg::from("zeta"),
            ])),
        );
        assert_eq!(err.to_string(), "['zeta', 5, 'zeta']");
    }

    #[test]
    fn repeated_unknown_label_is_repeated_in_message() {
        let err = err_of(heroes().dropna_args(&DropNaArgs::new().subset(["x", "x"])));
        assert_eq!(err.kind(), DropNaErrorKind::UnknownLabel);
        assert_eq!(err.to_string(), "['x', 'x']");
    }

    #[test]
    fn row_label_subset_on_string_index() {
        let df = heroes().set_index("name", true).unwrap();
        let out = df
            .dropna_args(&DropNaArgs::new().axis("columns").subset(["Batman"]))
            .unwrap();
        assert_eq!(out.column_names(), vec!["toy", "born"]);

        let err = err_of(df.dropna_args(&DropNaArgs::new().axis(1_i64).subset([0_i64])));
        assert_eq!(err.to_string(), "[0]");
    }

    #[test]
    fn ledger_counts_follow_axis() {
        let df = heroes();
        let policy = RuntimePolicy::strict();

        let mut ledger = ExecutionLedger::new();
        df.dropna_with_policy(&DropNaArgs::new(), &policy, &mut ledger)
            .unwrap();
        assert_eq!(
            ledger.counts(),
            ExecutionCounts {
                queries: 1,
                joins: 0,
                fallbacks: 0
            }
        );
        assert!(ledger.decisions().is_empty());

        let mut ledger = ExecutionLedger::new();
        df.dropna_with_policy(&DropNaArgs::new().axis(1_i64), &policy, &mut ledger)
            .unwrap();
        assert_eq!(
            ledger.counts(),
            ExecutionCounts {
                queries: 1,
                joins: 0,
                fallbacks: 1
            }
        );
        assert_eq!(ledger.decisions()[0].action, DecisionAction::Allow);

        let mut ledger = ExecutionLedger::new();
        let _ = df.dropna_with_policy(&DropNaArgs::new().how("invalid"), &policy, &mut ledger);
        assert!(ledger.is_empty());
    }

    #[test]
    fn hardened_policy_caps_column_fallback() {
        let df = heroes();
        let policy = RuntimePolicy::hardened(Some(2));
        assert_eq!(policy.mode, RuntimeMode::Hardened);

        let mut ledger = ExecutionLedger::new();
        let err = df
            .dropna_with_policy(&DropNaArgs::new().axis(1_i64), &policy, &mut ledger)
            .expect_err("over cap");
        assert!(matches!(err, FrameError::CompatibilityRejected(_)));
        assert_eq!(ledger.counts(), ExecutionCounts::default());
        assert_eq!(ledger.decisions()[0].action, DecisionAction::Reject);

        // Row filtering never falls back, so the cap does not apply.
        let mut ledger = ExecutionLedger::new();
        df.dropna_with_policy(&DropNaArgs::new(), &policy, &mut ledger)
            .unwrap();
        assert_eq!(ledger.counts().queries, 1);
    }

    #[test]
    fn validated_request_shape() {
        let df = heroes();
        let request = DropNaArgs::new()
            .axis(Axis::Columns)
            .thresh(2)
            .subset([0_i64, 0])
            .validate(&df)
            .unwrap();
        assert_eq!(request.axis, Axis::Columns);
        assert_eq!(request.rule, RetentionRule::Thresh(2));
        assert_eq!(request.subset, Some(Subset::Rows(vec![IndexLabel::Int64(0)])));
        let out = df.dropna_request(&request).unwrap();
        assert!(out.column_names().is_empty());
    }

    #[test]
    fn args_deserialize_from_keyword_json() {
        let args: DropNaArgs =
            serde_json::from_str(r#"{"axis":"columns","how":"all","subset":[0,"x",null]}"#)
                .unwrap();
        assert_eq!(args.axis, AxisArg::Name("columns".into()));
        assert_eq!(
            args.subset,
            Some(vec![LabelArg::Int(0), LabelArg::Name("x".into()), LabelArg::Missing])
        );

        let args: DropNaArgs = serde_json::from_str(r#"{"axis":[]}"#).unwrap();
        assert_eq!(args.axis, AxisArg::Many(vec![]));

        let args: DropNaArgs = serde_json::from_str("{}").unwrap();
        assert_eq!(args, DropNaArgs::default());
    }

    #[test]
    fn retention_rule_formula() {
        assert!(RetentionRule::How(DropNaHow::Any).keeps(0, 0));
        assert!(!RetentionRule::How(DropNaHow::All).keeps(0, 0));
        assert!(RetentionRule::How(DropNaHow::All).keeps(1, 3));
        assert!(!RetentionRule::How(DropNaHow::Any).keeps(2, 3));
        assert!(RetentionRule::Thresh(2).keeps(2, 3));
        assert!(!RetentionRule::Thresh(2).keeps(1, 3));
    }
}
