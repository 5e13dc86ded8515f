#![forbid(unsafe_code)]

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Row label. `Missing` appears when a column holding missing cells is
/// promoted to the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
    Missing,
}

impl IndexLabel {
    /// Python-style repr, as it appears inside a `KeyError` label list.
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Self::Int64(v) => v.to_string(),
            Self::Missing => "nan".to_owned(),
            Self::Utf8(v) => {
                if v.contains('\'') && !v.contains('"') {
                    format!("\"{v}\"")
                } else {
                    let escaped = v.replace('\\', "\\\\").replace('\'', "\\'");
                    format!("'{escaped}'")
                }
            }
        }
    }
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Missing => write!(f, "NaN"),
        }
    }
}

/// Render labels as a Python list literal: `['a', 3, nan]`.
#[must_use]
pub fn format_label_list(labels: &[IndexLabel]) -> String {
    let inner = labels
        .iter()
        .map(IndexLabel::repr)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{inner}]")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortOrder {
    Unsorted,
    /// All labels are `Int64` and strictly ascending.
    AscendingInt64,
    /// All labels are `Utf8` and strictly ascending.
    AscendingUtf8,
}

fn detect_sort_order(labels: &[IndexLabel]) -> SortOrder {
    if labels.len() <= 1 {
        return match labels.first() {
            Some(IndexLabel::Int64(_)) | None => SortOrder::AscendingInt64,
            Some(IndexLabel::Utf8(_)) => SortOrder::AscendingUtf8,
            Some(IndexLabel::Missing) => SortOrder::Unsorted,
        };
    }

    let int_sorted = labels.windows(2).all(|w| match (&w[0], &w[1]) {
        (IndexLabel::Int64(a), IndexLabel::Int64(b)) => a < b,
        _ => false,
    });
    if int_sorted {
        return SortOrder::AscendingInt64;
    }

    let utf8_sorted = labels.windows(2).all(|w| match (&w[0], &w[1]) {
        (IndexLabel::Utf8(a), IndexLabel::Utf8(b)) => a < b,
        _ => false,
    });
    if utf8_sorted {
        return SortOrder::AscendingUtf8;
    }

    SortOrder::Unsorted
}

fn detect_duplicates(labels: &[IndexLabel]) -> bool {
    let mut seen = HashSet::<&IndexLabel>::with_capacity(labels.len());
    labels.iter().any(|label| !seen.insert(label))
}

/// Label index: row identity that survives filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<IndexLabel>,
    #[serde(skip)]
    duplicate_cache: OnceCell<bool>,
    #[serde(skip)]
    sort_order_cache: OnceCell<SortOrder>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for Index {}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self {
            labels,
            duplicate_cache: OnceCell::new(),
            sort_order_cache: OnceCell::new(),
        }
    }

    /// Default `0..len` integer labels.
    #[must_use]
    pub fn range(len: usize) -> Self {
        Self::new((0..len as i64).map(IndexLabel::Int64).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        *self
            .duplicate_cache
            .get_or_init(|| detect_duplicates(&self.labels))
    }

    fn sort_order(&self) -> SortOrder {
        *self
            .sort_order_cache
            .get_or_init(|| detect_sort_order(&self.labels))
    }

    /// First position of `needle`. Binary search on sorted indexes, linear
    /// scan otherwise.
    #[must_use]
    pub fn position(&self, needle: &IndexLabel) -> Option<usize> {
        match (self.sort_order(), needle) {
            (SortOrder::AscendingInt64, IndexLabel::Int64(target)) => self
                .labels
                .binary_search_by(|label| match label {
                    IndexLabel::Int64(v) => v.cmp(target),
                    _ => std::cmp::Ordering::Less,
                })
                .ok(),
            (SortOrder::AscendingUtf8, IndexLabel::Utf8(target)) => self
                .labels
                .binary_search_by(|label| match label {
                    IndexLabel::Utf8(v) => v.as_str().cmp(target.as_str()),
                    _ => std::cmp::Ordering::Less,
                })
                .ok(),
            (SortOrder::AscendingInt64 | SortOrder::AscendingUtf8, _) => None,
            (SortOrder::Unsorted, _) => self.labels.iter().position(|label| label == needle),
        }
    }

    #[must_use]
    pub fn contains(&self, label: &IndexLabel) -> bool {
        self.position(label).is_some()
    }

    /// Map each label to all of its positions.
    #[must_use]
    pub fn position_map(&self) -> HashMap<&IndexLabel, Vec<usize>> {
        let mut map = HashMap::<&IndexLabel, Vec<usize>>::with_capacity(self.labels.len());
        for (idx, label) in self.labels.iter().enumerate() {
            map.entry(label).or_default().push(idx);
        }
        map
    }

    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        Self::new(indices.iter().map(|&i| self.labels[i].clone()).collect())
    }
}

/// Dense row positions `0..len`. Never carries gaps; a filtered or sorted
/// frame gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionIndex {
    len: usize,
}

impl PositionIndex {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { len }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn positions(&self) -> Range<usize> {
        0..self.len
    }

    /// Resolve a possibly-negative position. Negative values count from
    /// the end, as in `iloc[-1]`.
    pub fn resolve(&self, position: i64) -> Result<usize, IndexError> {
        let len = self.len as i64;
        let resolved = if position < 0 { len + position } else { position };
        if resolved < 0 || resolved >= len {
            return Err(IndexError::PositionOutOfBounds {
                position,
                len: self.len,
            });
        }
        Ok(resolved as usize)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("single positional indexer is out-of-bounds: position {position} for length {len}")]
    PositionOutOfBounds { position: i64, len: usize },
}
