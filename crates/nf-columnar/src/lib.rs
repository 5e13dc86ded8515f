#![forbid(unsafe_code)]

use nf_types::{DType, Scalar, TypeError, cast_scalar_owned, infer_dtype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Packed presence bits, one per cell. A set bit means the cell holds a
/// non-missing value.
#[derive(Debug, Clone, Eq)]
pub struct ValidityMask {
    words: Vec<u64>,
    len: usize,
}

impl ValidityMask {
    #[must_use]
    pub fn from_values(values: &[Scalar]) -> Self {
        let len = values.len();
        let word_count = len.div_ceil(64);
        let mut words = vec![0_u64; word_count];
        for (idx, value) in values.iter().enumerate() {
            if value.is_present() {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Self { words, len }
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        let full_words = self.len / 64;
        let mut count: u32 = self.words[..full_words]
            .iter()
            .map(|w| w.count_ones())
            .sum();
        let remainder = self.len % 64;
        if remainder > 0 && full_words < self.words.len() {
            let mask = (1_u64 << remainder) - 1;
            count += (self.words[full_words] & mask).count_ones();
        }
        count as usize
    }

    /// Count set bits among `positions`. Repeated positions count repeatedly;
    /// out-of-range positions count as invalid.
    #[must_use]
    pub fn count_valid_at(&self, positions: &[usize]) -> usize {
        positions.iter().filter(|&&idx| self.get(idx)).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }
}

impl PartialEq for ValidityMask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bits().eq(other.bits())
    }
}

impl Serialize for ValidityMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let bits: Vec<bool> = self.bits().collect();
        let mut state = serializer.serialize_struct("ValidityMask", 1)?;
        state.serialize_field("bits", &bits)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ValidityMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bits: Vec<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let len = raw.bits.len();
        let word_count = len.div_ceil(64);
        let mut words = vec![0_u64; word_count];
        for (idx, &valid) in raw.bits.iter().enumerate() {
            if valid {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Ok(Self { words, len })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
    validity: ValidityMask,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("row position {position} out of bounds for column of length {len}")]
    PositionOutOfBounds { position: usize, len: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl Column {
    /// Construct a column, coercing values to `dtype` and normalizing every
    /// missing cell to the dtype's own marker.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let coerced = values
            .into_iter()
            .map(|value| cast_scalar_owned(value, dtype))
            .collect::<Result<Vec<_>, _>>()?;
        let validity = ValidityMask::from_values(&coerced);

        Ok(Self {
            dtype,
            values: coerced,
            validity,
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype(&values)?;
        Self::new(dtype, values)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    #[must_use]
    pub fn is_present(&self, idx: usize) -> bool {
        self.validity.get(idx)
    }

    /// Gather rows by position, in the order given. The dtype is kept even
    /// when every selected cell is missing.
    pub fn take(&self, positions: &[usize]) -> Result<Self, ColumnError> {
        let mut values = Vec::with_capacity(positions.len());
        for &position in positions {
            let value = self
                .values
                .get(position)
                .ok_or(ColumnError::PositionOutOfBounds {
                    position,
                    len: self.values.len(),
                })?;
            values.push(value.clone());
        }
        let validity = ValidityMask::from_values(&values);
        Ok(Self {
            dtype: self.dtype,
            values,
            validity,
        })
    }
}

#[cfg(test)]
mod tests {
    use nf_types::{DType, NullKind, Scalar};

    use super::{Column, ColumnError, ValidityMask};

    #[test]
    fn new_normalizes_missing_markers_per_dtype() {
        let column = Column::from_values(vec![
            Scalar::Null(NullKind::Null),
            Scalar::Timestamp(0),
            Scalar::Null(NullKind::NaN),
        ])
        .expect("timestamp column");

        assert_eq!(column.dtype(), DType::Timestamp);
        assert_eq!(
            column.values(),
            &[
                Scalar::Null(NullKind::NaT),
                Scalar::Timestamp(0),
                Scalar::Null(NullKind::NaT),
            ]
        );
        assert_eq!(column.validity().count_valid(), 1);
    }

    #[test]
    fn nan_payload_counts_as_missing() {
        let column = Column::from_values(vec![Scalar::Float64(f64::NAN), Scalar::Int64(2)])
            .expect("float column");
        assert_eq!(column.dtype(), DType::Float64);
        assert!(!column.is_present(0));
        assert!(column.is_present(1));
    }

    #[test]
    fn take_preserves_order_and_dtype() {
        let column = Column::from_values(vec![
            Scalar::Utf8("a".into()),
            Scalar::Null(NullKind::Null),
            Scalar::Utf8("c".into()),
        ])
        .unwrap();

        let out = column.take(&[2, 0]).unwrap();
        assert_eq!(
            out.values(),
            &[Scalar::Utf8("c".into()), Scalar::Utf8("a".into())]
        );

        let only_missing = column.take(&[1]).unwrap();
        assert_eq!(only_missing.dtype(), DType::Utf8);
        assert_eq!(only_missing.validity().count_valid(), 0);

        let empty = column.take(&[]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.dtype(), DType::Utf8);
    }

    #[test]
    fn take_rejects_out_of_bounds() {
        let column = Column::from_values(vec![Scalar::Int64(1)]).unwrap();
        let err = column.take(&[3]).expect_err("must fail");
        assert_eq!(err, ColumnError::PositionOutOfBounds { position: 3, len: 1 });
    }

    #[test]
    fn validity_counts_across_word_boundaries() {
        let values: Vec<Scalar> = (0..130)
            .map(|i| {
                if i % 3 == 0 {
                    Scalar::Null(NullKind::Null)
                } else {
                    Scalar::Int64(i)
                }
            })
            .collect();
        let mask = ValidityMask::from_values(&values);
        assert_eq!(mask.len(), 130);
        assert_eq!(mask.count_valid(), 130 - 44);
        assert_eq!(mask.count_valid_at(&[0, 1, 2, 64, 129]), 3);
        assert_eq!(mask.count_valid_at(&[500]), 0);

        let full = ValidityMask::from_values(&vec![Scalar::Float64(1.0); 70]);
        assert_eq!(full.count_valid(), 70);
        assert_eq!(full.count_valid_at(&[63, 64, 69]), 3);
    }

    #[test]
    fn validity_serde_uses_bit_list() {
        let mask = ValidityMask::from_values(&[Scalar::Int64(1), Scalar::Null(NullKind::Null)]);
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(json, r#"{"bits":[true,false]}"#);
        let back: ValidityMask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mask);
    }
}
