//! Bindable query values.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One argument or result cell.
///
/// `List` only appears as an argument for `In` slots and literal `in (:name)`
/// placeholders. `Real` and `Blob` come back from aggregates and native
/// projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Unix epoch milliseconds.
    Timestamp(i64),
    List(Vec<QueryValue>),
    Blob(Vec<u8>),
}

impl QueryValue {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) | Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(value) => Some(*value),
            Self::Integer(value) | Self::Timestamp(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Converts a scalar into a SQLite bind value, `None` for a list.
    ///
    /// Lists must be expanded into one placeholder per element first.
    pub(crate) fn to_sql_value(&self) -> Option<Value> {
        match self {
            Self::Null => Some(Value::Null),
            Self::Integer(value) | Self::Timestamp(value) => Some(Value::Integer(*value)),
            Self::Real(value) => Some(Value::Real(*value)),
            Self::Text(value) => Some(Value::Text(value.clone())),
            Self::Blob(bytes) => Some(Value::Blob(bytes.clone())),
            Self::List(_) => None,
        }
    }

    /// Bind values for `self`, one per list element for lists.
    pub(crate) fn sql_values(&self) -> Vec<Value> {
        match self {
            Self::List(items) => items.iter().flat_map(Self::sql_values).collect(),
            scalar => scalar.to_sql_value().into_iter().collect(),
        }
    }

    pub(crate) fn from_sql_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Integer(value) => Self::Integer(value),
            Value::Real(value) => Self::Real(value),
            Value::Text(value) => Self::Text(value),
            Value::Blob(bytes) => Self::Blob(bytes),
        }
    }
}

impl Display for QueryValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(value) | Self::Timestamp(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Blob(bytes) => {
                write!(f, "X'")?;
                for byte in bytes {
                    write!(f, "{byte:02X}")?;
                }
                write!(f, "'")
            }
            Self::Text(value) => write!(f, "'{}'", value.replace('\'', "''")),
            Self::List(values) => {
                write!(f, "(")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::QueryValue;
    use rusqlite::types::Value;

    #[test]
    fn sql_values_keep_their_storage_class() {
        assert_eq!(
            QueryValue::from_sql_value(Value::Real(1.5)),
            QueryValue::Real(1.5)
        );
        assert_eq!(
            QueryValue::from_sql_value(Value::Blob(vec![0xff, 0x00])),
            QueryValue::Blob(vec![0xff, 0x00])
        );
        assert_eq!(
            QueryValue::Real(2.25).to_sql_value(),
            Some(Value::Real(2.25))
        );
        assert_eq!(QueryValue::from(vec![1, 2]).to_sql_value(), None);
    }

    #[test]
    fn display_renders_sql_literals() {
        assert_eq!(QueryValue::Real(1.5).to_string(), "1.5");
        assert_eq!(QueryValue::Blob(vec![0xab, 0x01]).to_string(), "X'AB01'");
        assert_eq!(QueryValue::from("o'neil").to_string(), "'o''neil'");
    }
}
