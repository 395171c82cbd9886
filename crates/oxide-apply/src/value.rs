//! Cell values and parameter handling.
//!
//! Every value that reaches a statement travels as a bound parameter. The
//! inline (literal) form only exists for previews and is produced by the
//! dialect, see [`crate::dialect::Dialect::format_literal`].

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A scalar cell value.
///
/// Deserializes from plain JSON scalars, so a change set written by hand
/// reads naturally: `{"id": 1, "name": "Terry", "note": null}`. Arrays of
/// bytes are blobs. Strings always stay text; dates and timestamps are
/// written as `{"date": "2024-02-29"}` and
/// `{"timestamp": "2024-02-29T13:05:00"}`. Integers that do not fit an
/// `i64` are rejected (serde_json hands integers past `u64::MAX` over as
/// floats).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time without zone.
    Timestamp(NaiveDateTime),
}

const DATE_KEY: &str = "date";
const TIMESTAMP_KEY: &str = "timestamp";

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Blob(b) => b.serialize(serializer),
            Self::Date(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(DATE_KEY, d)?;
                map.end()
            }
            Self::Timestamp(ts) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(TIMESTAMP_KEY, ts)?;
                map.end()
            }
        }
    }
}

struct SqlValueVisitor;

impl<'de> Visitor<'de> for SqlValueVisitor {
    type Value = SqlValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null, a boolean, a number, a string, a byte array or a date object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<SqlValue, E> {
        Ok(SqlValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<SqlValue, E> {
        Ok(SqlValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<SqlValue, D::Error> {
        SqlValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<SqlValue, E> {
        Ok(SqlValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<SqlValue, E> {
        Ok(SqlValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<SqlValue, E> {
        i64::try_from(v)
            .map(SqlValue::Int)
            .map_err(|_| E::custom(format!("integer {v} is out of range for a 64-bit signed value")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<SqlValue, E> {
        Ok(SqlValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<SqlValue, E> {
        Ok(SqlValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<SqlValue, E> {
        Ok(SqlValue::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<SqlValue, E> {
        Ok(SqlValue::Blob(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<SqlValue, E> {
        Ok(SqlValue::Blob(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<SqlValue, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(SqlValue::Blob(bytes))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<SqlValue, A::Error> {
        let key: String = map
            .next_key()?
            .ok_or_else(|| <A::Error as de::Error>::invalid_length(0, &"one entry"))?;
        let value = match key.as_str() {
            DATE_KEY => SqlValue::Date(map.next_value()?),
            TIMESTAMP_KEY => SqlValue::Timestamp(map.next_value()?),
            other => return Err(de::Error::unknown_field(other, &[DATE_KEY, TIMESTAMP_KEY])),
        };
        if map.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(2, &"one entry"));
        }
        Ok(value)
    }
}

impl<'de> Deserialize<'de> for SqlValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SqlValueVisitor)
    }
}

impl SqlValue {
    /// Returns true for [`SqlValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the ANSI literal form of the value.
    ///
    /// Dialects override pieces of this (booleans, blobs, escaping) in
    /// their own `format_literal`.
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Self::Int(n) => format!("{n}"),
            Self::Float(f) => format_float(*f),
            Self::Text(s) => quote_text(s),
            Self::Blob(b) => format!("X'{}'", hex(b)),
            Self::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Self::Timestamp(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

/// Wraps text in single quotes, doubling embedded quotes.
#[must_use]
pub fn quote_text(s: &str) -> String {
    let escaped = s.replace('\'', "''");
    format!("'{escaped}'")
}

/// Uppercase hex encoding used by blob literals.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_finite() {
        format!("{f:?}")
    } else {
        // No portable literal exists for NaN or infinities.
        String::from("NULL")
    }
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

impl ToSqlValue for i64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(self)
    }
}

impl ToSqlValue for i32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for u32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(String::from(self))
    }
}

impl ToSqlValue for NaiveDate {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Date(self)
    }
}

impl ToSqlValue for NaiveDateTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Timestamp(self)
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null,
        }
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

macro_rules! impl_from_via_to_sql_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    value.to_sql_value()
                }
            }
        )*
    };
}

impl_from_via_to_sql_value!(bool, i64, i32, f64, String, &str, Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_text_escaping() {
        assert_eq!(
            SqlValue::Text(String::from("O'Brien")).to_sql_inline(),
            "'O''Brien'"
        );
    }

    #[test]
    fn test_inline_injection_is_quoted() {
        let value = SqlValue::Text(String::from("'; DROP TABLE users; --"));
        assert_eq!(value.to_sql_inline(), "'''; DROP TABLE users; --'");
    }

    #[test]
    fn test_inline_float_keeps_decimal_point() {
        assert_eq!(SqlValue::Float(1.0).to_sql_inline(), "1.0");
        assert_eq!(SqlValue::Float(f64::NAN).to_sql_inline(), "NULL");
    }

    #[test]
    fn test_inline_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(SqlValue::Date(date).to_sql_inline(), "'2024-02-29'");
        let ts = date.and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(
            SqlValue::Timestamp(ts).to_sql_inline(),
            "'2024-02-29 13:05:00'"
        );
    }

    #[test]
    fn test_deserialize_json_scalars() {
        let values: Vec<SqlValue> =
            serde_json::from_str(r#"[null, true, 7, 2.5, "Terry", [1, 2]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                SqlValue::Null,
                SqlValue::Bool(true),
                SqlValue::Int(7),
                SqlValue::Float(2.5),
                SqlValue::Text(String::from("Terry")),
                SqlValue::Blob(vec![1, 2]),
            ]
        );
    }

    #[test]
    fn test_dates_round_trip_through_json() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let values = vec![
            SqlValue::Date(date),
            SqlValue::Timestamp(date.and_hms_opt(13, 5, 0).unwrap()),
            SqlValue::Text(String::from("2024-02-29")),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(
            json,
            r#"[{"date":"2024-02-29"},{"timestamp":"2024-02-29T13:05:00"},"2024-02-29"]"#
        );
        assert_eq!(serde_json::from_str::<Vec<SqlValue>>(&json).unwrap(), values);
    }

    #[test]
    fn test_out_of_range_integer_is_rejected() {
        let max = serde_json::to_string(&i64::MAX).unwrap();
        assert_eq!(serde_json::from_str::<SqlValue>(&max).unwrap(), SqlValue::Int(i64::MAX));
        assert!(serde_json::from_str::<SqlValue>("9223372036854775808").is_err());
        assert!(serde_json::from_str::<SqlValue>(r#"{"time": "13:05"}"#).is_err());
    }

    #[test]
    fn test_to_sql_value_conversions() {
        assert_eq!(42_i32.to_sql_value(), SqlValue::Int(42));
        assert_eq!("hello".to_sql_value(), SqlValue::Text(String::from("hello")));
        assert_eq!(None::<i32>.to_sql_value(), SqlValue::Null);
    }
}
