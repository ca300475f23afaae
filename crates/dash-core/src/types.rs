use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Declared type of a query parameter.
///
/// Names follow the warehouse's standard SQL type names and are parsed
/// case-insensitively from definition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParameterType {
    String,
    Int64,
    Float64,
    Numeric,
    Bool,
    Date,
    Datetime,
    Timestamp,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "STRING",
            ParameterType::Int64 => "INT64",
            ParameterType::Float64 => "FLOAT64",
            ParameterType::Numeric => "NUMERIC",
            ParameterType::Bool => "BOOL",
            ParameterType::Date => "DATE",
            ParameterType::Datetime => "DATETIME",
            ParameterType::Timestamp => "TIMESTAMP",
        }
    }

    /// Whether a scalar of this shape may be bound to a parameter of this type.
    ///
    /// Integer literals are valid numerics; temporal types are bound as their
    /// textual form.
    pub fn accepts(&self, value: &ScalarValue) -> bool {
        match (self, value) {
            (ParameterType::Int64, ScalarValue::Int64(_)) => true,
            (ParameterType::Float64 | ParameterType::Numeric, ScalarValue::Float64(_)) => true,
            (ParameterType::Float64 | ParameterType::Numeric, ScalarValue::Int64(_)) => true,
            (ParameterType::Bool, ScalarValue::Bool(_)) => true,
            (
                ParameterType::String
                | ParameterType::Date
                | ParameterType::Datetime
                | ParameterType::Timestamp,
                ScalarValue::String(_),
            ) => true,
            _ => false,
        }
    }

    /// Bring an accepted value to the one form this type is keyed by, so
    /// that `1` and `1.0` bound to a FLOAT64 parameter are the same value.
    pub fn coerce(&self, value: ScalarValue) -> ScalarValue {
        match (self, value) {
            (ParameterType::Float64 | ParameterType::Numeric, ScalarValue::Int64(v)) => {
                ScalarValue::Float64(v as f64)
            }
            (_, value) => value,
        }
    }
}

impl FromStr for ParameterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(ParameterType::String),
            "INT64" | "INTEGER" | "INT" => Ok(ParameterType::Int64),
            "FLOAT64" | "FLOAT" => Ok(ParameterType::Float64),
            "NUMERIC" | "DECIMAL" => Ok(ParameterType::Numeric),
            "BOOL" | "BOOLEAN" => Ok(ParameterType::Bool),
            "DATE" => Ok(ParameterType::Date),
            "DATETIME" => Ok(ParameterType::Datetime),
            "TIMESTAMP" => Ok(ParameterType::Timestamp),
            other => Err(format!("unknown parameter type '{}'", other)),
        }
    }
}

impl TryFrom<String> for ParameterType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ParameterType> for String {
    fn from(value: ParameterType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single concrete parameter value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

impl ScalarValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Int64(_) => "int64",
            ScalarValue::Float64(_) => "float64",
            ScalarValue::String(_) => "string",
        }
    }

    // -0.0 and 0.0 compare equal, all NaNs collapse to one key
    fn float_bits(v: f64) -> u64 {
        if v == 0.0 {
            0.0f64.to_bits()
        } else if v.is_nan() {
            f64::NAN.to_bits()
        } else {
            v.to_bits()
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => a == b,
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a == b,
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => {
                Self::float_bits(*a) == Self::float_bits(*b)
            }
            (ScalarValue::String(a), ScalarValue::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ScalarValue::Bool(v) => v.hash(state),
            ScalarValue::Int64(v) => v.hash(state),
            ScalarValue::Float64(v) => Self::float_bits(*v).hash(state),
            ScalarValue::String(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{:?}", v),
            ScalarValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int64(v as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::String(v)
    }
}

/// A value bound to a named parameter: either a scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Scalar(ScalarValue),
    Array(Vec<ScalarValue>),
}

impl ParameterValue {
    pub fn is_array(&self) -> bool {
        matches!(self, ParameterValue::Array(_))
    }

    pub fn array<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        ParameterValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Scalar(v) => write!(f, "{}", v),
            ParameterValue::Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<ScalarValue> for ParameterValue {
    fn from(v: ScalarValue) -> Self {
        ParameterValue::Scalar(v)
    }
}

macro_rules! scalar_parameter_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ParameterValue {
                fn from(v: $ty) -> Self {
                    ParameterValue::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_parameter_from!(bool, i64, i32, f64, &str, String);

impl<T: Into<ScalarValue>> From<Vec<T>> for ParameterValue {
    fn from(values: Vec<T>) -> Self {
        ParameterValue::Array(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_coerce_integers_for_float_types() {
        assert_eq!(
            ParameterType::Float64.coerce(ScalarValue::Int64(2)),
            ScalarValue::Float64(2.0)
        );
        assert_eq!(
            ParameterType::Numeric.coerce(ScalarValue::Int64(-1)),
            ScalarValue::Float64(-1.0)
        );
        assert_eq!(
            ParameterType::Int64.coerce(ScalarValue::Int64(2)),
            ScalarValue::Int64(2)
        );
    }

    #[test]
    fn test_parameter_type_parsing() {
        assert_eq!("int64".parse::<ParameterType>(), Ok(ParameterType::Int64));
        assert_eq!(" String ".parse::<ParameterType>(), Ok(ParameterType::String));
        assert_eq!("BOOLEAN".parse::<ParameterType>(), Ok(ParameterType::Bool));
        assert!("GEOGRAPHY".parse::<ParameterType>().is_err());
    }

    #[test]
    fn test_type_acceptance() {
        assert!(ParameterType::Int64.accepts(&ScalarValue::Int64(3)));
        assert!(!ParameterType::Int64.accepts(&ScalarValue::Float64(3.0)));
        assert!(ParameterType::Numeric.accepts(&ScalarValue::Int64(3)));
        assert!(ParameterType::Date.accepts(&"2024-01-01".into()));
        assert!(!ParameterType::Bool.accepts(&"true".into()));
    }

    #[test]
    fn test_float_keys_are_normalized() {
        let mut set = HashSet::new();
        set.insert(ScalarValue::Float64(0.0));
        set.insert(ScalarValue::Float64(-0.0));
        set.insert(ScalarValue::Float64(f64::NAN));
        set.insert(ScalarValue::Float64(f64::NAN));
        assert_eq!(set.len(), 2);
        assert_ne!(ScalarValue::Float64(1.0), ScalarValue::Int64(1));
    }

    #[test]
    fn test_untagged_yaml_values() {
        let value: ParameterValue = serde_yaml::from_str("[1, 2, 3]").unwrap();
        assert_eq!(value, ParameterValue::array([1i64, 2, 3]));

        let value: ParameterValue = serde_yaml::from_str("2.5").unwrap();
        assert_eq!(value, ParameterValue::from(2.5));

        let value: ParameterValue = serde_yaml::from_str("europe").unwrap();
        assert_eq!(value, ParameterValue::from("europe"));
    }

    #[test]
    fn test_display() {
        assert_eq!(ParameterValue::array(["a", "b"]).to_string(), r#"["a","b"]"#);
        assert_eq!(ParameterValue::from(2.0).to_string(), "2.0");
        assert_eq!(ParameterValue::from(true).to_string(), "true");
    }
}
