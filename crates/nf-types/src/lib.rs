#![forbid(unsafe_code)]

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Timestamp,
}

/// Flavor of the missing marker. All three are equally "missing" for
/// filtering; the flavor only survives for display and round-tripping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullKind {
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "nan")]
    NaN,
    #[serde(rename = "nat")]
    NaT,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    /// Nanoseconds since the UNIX epoch, UTC.
    Timestamp(i64),
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
            Self::Timestamp(_) => DType::Timestamp,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.is_missing()
    }

    #[must_use]
    pub fn missing_for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::Float64 => Self::Null(NullKind::NaN),
            DType::Timestamp => Self::Null(NullKind::NaT),
            DType::Null | DType::Bool | DType::Int64 | DType::Utf8 => Self::Null(NullKind::Null),
        }
    }

    /// Equality where any two missing markers compare equal, regardless of
    /// flavor. Used by frame comparison, where pandas treats `None`, `NaN`
    /// and `NaT` in the same slot as matching.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_missing() && b.is_missing() => true,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(NullKind::Null) => write!(f, "None"),
            Self::Null(NullKind::NaN) => write!(f, "NaN"),
            Self::Null(NullKind::NaT) => write!(f, "NaT"),
            Self::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) if v.is_nan() => write!(f, "NaN"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Timestamp(ns) => write!(f, "{}", format_timestamp_nanos(*ns)),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("dtype coercion from {left:?} to {right:?} has no compatible common type")]
    IncompatibleDtypes { left: DType, right: DType },
    #[error("cannot cast scalar of dtype {from:?} to {to:?}")]
    InvalidCast { from: DType, to: DType },
    #[error("cannot cast float {value} to int64 without loss")]
    LossyFloatToInt { value: f64 },
    #[error("expected 0/1 for bool cast from int64 but found {value}")]
    InvalidBoolInt { value: i64 },
    #[error("invalid timestamp literal {value:?}")]
    InvalidTimestamp { value: String },
}

pub fn common_dtype(left: DType, right: DType) -> Result<DType, TypeError> {
    use DType::{Bool, Float64, Int64, Null};

    let out = match (left, right) {
        (a, b) if a == b => a,
        (Null, other) | (other, Null) => other,
        (Bool, Int64) | (Int64, Bool) => Int64,
        (Bool, Float64) | (Float64, Bool) => Float64,
        (Int64, Float64) | (Float64, Int64) => Float64,
        _ => return Err(TypeError::IncompatibleDtypes { left, right }),
    };

    Ok(out)
}

pub fn infer_dtype(values: &[Scalar]) -> Result<DType, TypeError> {
    let mut current = DType::Null;
    for value in values {
        current = common_dtype(current, value.dtype())?;
    }
    Ok(current)
}

/// Cast a scalar to a target dtype, taking ownership so identity casts are free.
pub fn cast_scalar_owned(value: Scalar, target: DType) -> Result<Scalar, TypeError> {
    let from = value.dtype();
    if value.is_missing() {
        return Ok(Scalar::missing_for_dtype(target));
    }
    if from == target {
        return Ok(value);
    }

    match target {
        DType::Null => Ok(Scalar::Null(NullKind::Null)),
        DType::Bool => match &value {
            Scalar::Int64(v) => match *v {
                0 => Ok(Scalar::Bool(false)),
                1 => Ok(Scalar::Bool(true)),
                _ => Err(TypeError::InvalidBoolInt { value: *v }),
            },
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Int64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Int64(i64::from(*v))),
            Scalar::Float64(v) => {
                if !v.is_finite() || *v != v.trunc() {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                if *v < i64::MIN as f64 || *v > i64::MAX as f64 {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                Ok(Scalar::Int64(*v as i64))
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Float64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Float64(if *v { 1.0 } else { 0.0 })),
            Scalar::Int64(v) => Ok(Scalar::Float64(*v as f64)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Utf8 | DType::Timestamp => Err(TypeError::InvalidCast { from, to: target }),
    }
}

// ── Timestamps ─────────────────────────────────────────────────────────

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse `YYYY-MM-DD` or an ISO-8601 date-time (no offset, UTC assumed).
pub fn parse_timestamp_nanos(raw: &str) -> Result<i64, TypeError> {
    let invalid = || TypeError::InvalidTimestamp {
        value: raw.to_owned(),
    };
    let trimmed = raw.trim();

    let naive = if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?
    } else {
        DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .ok_or_else(invalid)?
    };

    naive.and_utc().timestamp_nanos_opt().ok_or_else(invalid)
}

/// Inverse of [`parse_timestamp_nanos`]. Midnight values render as a bare date.
#[must_use]
pub fn format_timestamp_nanos(nanos: i64) -> String {
    let dt = DateTime::from_timestamp_nanos(nanos).naive_utc();
    if dt.time() == NaiveTime::MIN {
        dt.date().format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DType, NullKind, Scalar, TypeError, cast_scalar_owned, common_dtype,
        format_timestamp_nanos, infer_dtype, parse_timestamp_nanos,
    };

    const BATMAN_BORN_NS: i64 = -936_835_200_000_000_000;

    #[test]
    fn dtype_inference_coerces_numeric_values() {
        let values = vec![Scalar::Bool(true), Scalar::Int64(7), Scalar::Float64(3.5)];
        assert_eq!(
            infer_dtype(&values).expect("dtype should infer"),
            DType::Float64
        );
    }

    #[test]
    fn dtype_inference_keeps_timestamps_with_nat() {
        let values = vec![
            Scalar::Null(NullKind::NaT),
            Scalar::Timestamp(BATMAN_BORN_NS),
            Scalar::Null(NullKind::NaT),
        ];
        assert_eq!(infer_dtype(&values).unwrap(), DType::Timestamp);
    }

    #[test]
    fn missing_values_get_target_missing_marker() {
        let missing = Scalar::Null(NullKind::Null);
        let cast = cast_scalar_owned(missing.clone(), DType::Float64).expect("missing casts");
        assert_eq!(cast, Scalar::Null(NullKind::NaN));

        let cast = cast_scalar_owned(missing, DType::Timestamp).expect("missing casts");
        assert_eq!(cast, Scalar::Null(NullKind::NaT));

        let nan = Scalar::Float64(f64::NAN);
        let cast = cast_scalar_owned(nan, DType::Utf8).expect("nan payload is missing");
        assert_eq!(cast, Scalar::Null(NullKind::Null));
    }

    #[test]
    fn semantic_eq_treats_every_missing_flavor_as_equal() {
        let nan = Scalar::Float64(f64::NAN);
        assert!(nan.semantic_eq(&Scalar::Null(NullKind::NaN)));
        assert!(nan.semantic_eq(&Scalar::Null(NullKind::NaT)));
        assert!(Scalar::Null(NullKind::Null).semantic_eq(&Scalar::Null(NullKind::NaT)));
        assert!(!Scalar::Int64(0).semantic_eq(&Scalar::Null(NullKind::Null)));
        assert!(Scalar::Float64(1.5).semantic_eq(&Scalar::Float64(1.5)));
    }

    #[test]
    fn common_dtype_rejects_string_numeric_mix() {
        let err = common_dtype(DType::Utf8, DType::Int64).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "dtype coercion from Utf8 to Int64 has no compatible common type"
        );
        assert!(common_dtype(DType::Timestamp, DType::Float64).is_err());
    }

    #[test]
    fn presence_counts_skip_every_missing_flavor() {
        let vals = vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Float64(f64::NAN),
            Scalar::Null(NullKind::NaT),
            Scalar::Utf8(String::new()),
        ];
        assert_eq!(vals.iter().filter(|v| v.is_present()).count(), 2);
        assert_eq!(vals.iter().filter(|v| v.is_missing()).count(), 3);
        for v in &vals {
            assert_ne!(v.is_missing(), v.is_present());
        }
    }

    #[test]
    fn timestamp_parse_and_format() {
        assert_eq!(parse_timestamp_nanos("1940-04-25").unwrap(), BATMAN_BORN_NS);
        assert_eq!(
            parse_timestamp_nanos("1970-01-01T00:00:01").unwrap(),
            1_000_000_000
        );
        assert_eq!(format_timestamp_nanos(BATMAN_BORN_NS), "1940-04-25");
        assert_eq!(
            format_timestamp_nanos(1_500_000_000),
            "1970-01-01T00:00:01.500"
        );
        assert!(matches!(
            parse_timestamp_nanos("Bullwhip"),
            Err(TypeError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn scalar_serde_uses_tagged_snake_case() {
        let json = serde_json::to_string(&Scalar::Null(NullKind::NaT)).unwrap();
        assert_eq!(json, r#"{"kind":"null","value":"nat"}"#);
        let back: Scalar = serde_json::from_str(r#"{"kind":"timestamp","value":0}"#).unwrap();
        assert_eq!(back, Scalar::Timestamp(0));
    }

    #[test]
    fn display_matches_pandas_repr_for_missing() {
        assert_eq!(Scalar::Null(NullKind::NaT).to_string(), "NaT");
        assert_eq!(Scalar::Float64(f64::NAN).to_string(), "NaN");
        assert_eq!(Scalar::Timestamp(BATMAN_BORN_NS).to_string(), "1940-04-25");
    }
}
