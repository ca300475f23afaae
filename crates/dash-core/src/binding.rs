//! Parameter bindings and their validation against a definition.

use crate::definition::QueryDefinition;
use crate::error::{DashError, Result};
use crate::types::ParameterValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Concrete values for a query's named parameters.
///
/// Backed by a sorted map, so two bindings built from the same pairs in any
/// order are equal, hash identically and render the same canonical text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBinding {
    values: BTreeMap<String, ParameterValue>,
}

impl ParameterBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a binding from caller-supplied pairs and validate it against
    /// the definition's parameter specification.
    pub fn bind<I, K, V>(definition: &QueryDefinition, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParameterValue>,
    {
        let mut binding = Self::new();
        for (name, value) in values {
            let name = name.into();
            if binding.values.contains_key(&name) {
                return Err(DashError::binding(
                    &definition.id,
                    format!("parameter '{}' supplied more than once", name),
                ));
            }
            binding.values.insert(name, value.into());
        }
        binding.validate(definition)?;
        binding.coerce(definition);
        Ok(binding)
    }

    fn coerce(&mut self, definition: &QueryDefinition) {
        for spec in &definition.parameters {
            if let Some(value) = self.values.remove(&spec.name) {
                let value = match value {
                    ParameterValue::Scalar(v) => ParameterValue::Scalar(spec.param_type.coerce(v)),
                    ParameterValue::Array(items) => ParameterValue::Array(
                        items
                            .into_iter()
                            .map(|v| spec.param_type.coerce(v))
                            .collect(),
                    ),
                };
                self.values.insert(spec.name.clone(), value);
            }
        }
    }

    /// Check that every declared parameter is bound, that no unknown names
    /// are present, and that each value matches its declared arity and type.
    pub fn validate(&self, definition: &QueryDefinition) -> Result<()> {
        for spec in &definition.parameters {
            let value = self.values.get(&spec.name).ok_or_else(|| {
                DashError::binding(
                    &definition.id,
                    format!("parameter '{}' is not specified", spec.name),
                )
            })?;

            match (spec.array, value) {
                (false, ParameterValue::Scalar(v)) => {
                    if !spec.param_type.accepts(v) {
                        return Err(DashError::binding(
                            &definition.id,
                            format!(
                                "parameter '{}' expects {}, got {}",
                                spec.name,
                                spec.param_type,
                                v.kind()
                            ),
                        ));
                    }
                }
                (true, ParameterValue::Array(items)) => {
                    if let Some(bad) = items.iter().find(|v| !spec.param_type.accepts(v)) {
                        return Err(DashError::binding(
                            &definition.id,
                            format!(
                                "parameter '{}' expects ARRAY<{}>, got element of type {}",
                                spec.name,
                                spec.param_type,
                                bad.kind()
                            ),
                        ));
                    }
                }
                (true, ParameterValue::Scalar(_)) => {
                    return Err(DashError::binding(
                        &definition.id,
                        format!("parameter '{}' expects a list", spec.name),
                    ));
                }
                (false, ParameterValue::Array(_)) => {
                    return Err(DashError::binding(
                        &definition.id,
                        format!("parameter '{}' expects a scalar, got a list", spec.name),
                    ));
                }
            }
        }

        if let Some(unknown) = self
            .values
            .keys()
            .find(|name| definition.parameter(name).is_none())
        {
            return Err(DashError::binding(
                &definition.id,
                format!("unknown parameter '{}'", unknown),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<ParameterValue>> FromIterator<(K, V)> for ParameterBinding {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ParameterSpec;
    use crate::types::ParameterType;

    fn sales() -> QueryDefinition {
        QueryDefinition::new("sales", "Sales", "SELECT {{regions}}, {{year}}")
            .with_parameter(ParameterSpec::array("regions", ParameterType::String))
            .with_parameter(ParameterSpec::scalar("year", ParameterType::Int64))
    }

    #[test]
    fn test_order_independent() {
        let a = ParameterBinding::new().with("a", 1i64).with("b", 2i64);
        let b = ParameterBinding::new().with("b", 2i64).with("a", 1i64);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{a=1,b=2}");
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_bind_valid() {
        let binding = ParameterBinding::bind(
            &sales(),
            [
                ("year", ParameterValue::from(2024i64)),
                ("regions", ParameterValue::array(["eu", "us"])),
            ],
        )
        .unwrap();
        assert_eq!(binding.len(), 2);
        assert_eq!(binding.to_string(), r#"{regions=["eu","us"],year=2024}"#);
    }

    #[test]
    fn test_bind_integer_to_float_parameter() {
        let definition = QueryDefinition::new("q", "Q", "SELECT {{x}}, {{xs}}")
            .with_parameter(ParameterSpec::scalar("x", ParameterType::Float64))
            .with_parameter(ParameterSpec::array("xs", ParameterType::Numeric));

        let ints = ParameterBinding::bind(
            &definition,
            [("x", ParameterValue::from(1i64)), ("xs", vec![2i64, 3].into())],
        )
        .unwrap();
        let floats = ParameterBinding::bind(
            &definition,
            [("x", ParameterValue::from(1.0)), ("xs", vec![2.0f64, 3.0].into())],
        )
        .unwrap();

        assert_eq!(ints, floats);
        assert_eq!(ints.to_string(), "{x=1.0,xs=[2.0,3.0]}");
    }

    #[test]
    fn test_bind_missing_parameter() {
        let err = ParameterBinding::bind(&sales(), [("year", 2024i64)]).unwrap_err();
        assert!(matches!(err, DashError::ParameterBinding { .. }));
        assert!(err.to_string().contains("'regions' is not specified"));
    }

    #[test]
    fn test_bind_unknown_parameter() {
        let err = ParameterBinding::bind(
            &sales(),
            [
                ("year", ParameterValue::from(2024i64)),
                ("regions", ParameterValue::array(["eu"])),
                ("limit", ParameterValue::from(10i64)),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown parameter 'limit'"));
    }

    #[test]
    fn test_bind_arity_mismatch() {
        let err = ParameterBinding::bind(
            &sales(),
            [
                ("year", ParameterValue::from(2024i64)),
                ("regions", ParameterValue::from("eu")),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("expects a list"));

        let err = ParameterBinding::bind(
            &sales(),
            [
                ("year", ParameterValue::array([2024i64])),
                ("regions", ParameterValue::array(["eu"])),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("expects a scalar"));
    }

    #[test]
    fn test_bind_type_mismatch() {
        let err = ParameterBinding::bind(
            &sales(),
            [
                ("year", ParameterValue::from("2024")),
                ("regions", ParameterValue::array(["eu"])),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("expects INT64"));

        let err = ParameterBinding::bind(
            &sales(),
            [
                ("year", ParameterValue::from(2024i64)),
                ("regions", ParameterValue::array([1i64])),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("ARRAY<STRING>"));
    }

    #[test]
    fn test_empty_binding_for_unparameterized_query() {
        let def = QueryDefinition::new("a", "A", "SELECT 1");
        assert!(ParameterBinding::new().validate(&def).is_ok());
        assert!(ParameterBinding::new().with("x", 1i64).validate(&def).is_err());
    }
}
